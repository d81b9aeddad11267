mod support;

use std::sync::Arc;
use std::time::Duration;

use cache_store::{FileStore, DASHBOARD_SNAPSHOT_KEY};
use dashboard_api::{DashboardApiError, StatusCode};
use followsync::{AuthEvent, ListVerdict, NoticeLevel, OrchestratorError, SessionState};
use support::{dashboard_data, FakeBackend, HarnessBuilder};

#[tokio::test]
async fn mount_with_empty_cache_fetches_once_and_persists() {
    let harness = HarnessBuilder::new().signed_in().await;

    let snapshot = harness.orchestrator.mount().await.expect("snapshot");
    assert_eq!(harness.backend.fetch_calls(), 1);
    assert_eq!(snapshot.followers_count, 10);
    assert_eq!(snapshot.usernames(), vec!["alice", "bob"]);
    assert!(harness.store.raw(DASHBOARD_SNAPSHOT_KEY).is_some());

    harness.orchestrator.unmount();
    let again = harness.orchestrator.mount().await.expect("cached");
    assert_eq!(again, snapshot);
    assert_eq!(harness.backend.fetch_calls(), 1);
}

#[tokio::test]
async fn failed_refresh_leaves_cache_byte_identical() {
    let harness = HarnessBuilder::new().signed_in().await;
    harness.orchestrator.check_data().await.expect("first refresh");
    let before = harness.store.raw(DASHBOARD_SNAPSHOT_KEY).expect("cached");

    harness.backend.fail_next_fetch(DashboardApiError::Status(
        StatusCode::INTERNAL_SERVER_ERROR,
        "database offline".to_string(),
    ));
    let error = harness
        .orchestrator
        .check_data()
        .await
        .expect_err("backend failure");

    assert!(matches!(error, OrchestratorError::Backend(_)));
    assert!(error.is_recoverable());
    assert_eq!(harness.store.raw(DASHBOARD_SNAPSHOT_KEY), Some(before));
    let notices = harness.orchestrator.notices();
    assert_eq!(
        notices.last().map(|notice| notice.level),
        Some(NoticeLevel::Warning)
    );
}

#[tokio::test]
async fn exclusion_removes_only_that_user_and_persists_without_backend_call() {
    let harness = HarnessBuilder::new().signed_in().await;
    harness.orchestrator.mount().await.expect("snapshot");

    let updated = harness
        .orchestrator
        .exclude_user("1")
        .expect("exclude")
        .expect("cached snapshot");
    assert_eq!(updated.usernames(), vec!["bob"]);
    assert_eq!(updated.followers_count, 10);
    assert_eq!(harness.orchestrator.snapshot(), Some(updated.clone()));
    assert_eq!(harness.backend.fetch_calls(), 1);

    let unchanged = harness
        .orchestrator
        .exclude_user("404")
        .expect("exclude")
        .expect("cached snapshot");
    assert_eq!(unchanged, updated);
}

#[tokio::test]
async fn exclusion_without_cache_is_a_no_op() {
    let harness = HarnessBuilder::new().signed_in().await;
    assert_eq!(harness.orchestrator.exclude_user("1").expect("exclude"), None);
    assert!(harness.store.raw(DASHBOARD_SNAPSHOT_KEY).is_none());
}

#[tokio::test]
async fn duplicate_ids_keep_first_occurrence() {
    let backend = FakeBackend::with_dashboard(dashboard_data(
        3,
        5,
        &[("7", "carol"), ("7", "carol-again"), ("8", "dave")],
    ));
    let harness = HarnessBuilder::new().backend(backend).signed_in().await;

    let snapshot = harness.orchestrator.check_data().await.expect("refresh");
    assert_eq!(snapshot.usernames(), vec!["carol", "dave"]);
}

#[tokio::test]
async fn regenerate_with_counts_and_no_non_followers_needs_acknowledgement() {
    let backend = FakeBackend::with_dashboard(dashboard_data(120, 140, &[]));
    let harness = HarnessBuilder::new().backend(backend).signed_in().await;

    let regeneration = harness
        .orchestrator
        .regenerate_non_followers()
        .await
        .expect("regenerate");

    assert_eq!(regeneration.verdict, ListVerdict::EveryoneFollowsBack);
    assert_eq!(harness.backend.compare_calls(), 1);
    assert_eq!(harness.backend.fetch_calls(), 1);
    assert!(harness.orchestrator.everyone_follows_back_pending());

    assert!(harness.orchestrator.acknowledge_everyone_follows_back());
    assert!(!harness.orchestrator.everyone_follows_back_pending());
    assert!(!harness.orchestrator.acknowledge_everyone_follows_back());
}

#[tokio::test]
async fn regenerate_without_any_scan_reports_no_scan_yet() {
    let backend = FakeBackend::with_dashboard(dashboard_data(0, 0, &[]));
    let harness = HarnessBuilder::new().backend(backend).signed_in().await;

    let regeneration = harness
        .orchestrator
        .regenerate_non_followers()
        .await
        .expect("regenerate");

    assert_eq!(regeneration.verdict, ListVerdict::NoScanYet);
    assert!(!harness.orchestrator.everyone_follows_back_pending());
    let notices = harness.orchestrator.take_notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NoticeLevel::Info);
    assert!(harness.orchestrator.notices().is_empty());
}

#[tokio::test]
async fn new_data_flag_and_stats_pass_through() {
    let harness = HarnessBuilder::new().signed_in().await;
    harness.backend.set_new_data(true);

    assert!(harness.orchestrator.check_new_data().await.expect("flag"));
    let stats = harness.orchestrator.follow_stats().await.expect("stats");
    assert_eq!((stats.followers, stats.following), (10, 12));
    let status = harness.orchestrator.bot_status().await.expect("bot status");
    assert!(!status.is_running);
}

#[tokio::test]
async fn corrupt_cache_counts_as_miss_and_is_replaced() {
    let harness = HarnessBuilder::new().signed_in().await;
    cache_store::KeyValueStore::set(harness.store.as_ref(), DASHBOARD_SNAPSHOT_KEY, "{not json")
        .expect("seed corrupt entry");

    assert!(harness.orchestrator.snapshot().is_none());
    assert!(harness.store.raw(DASHBOARD_SNAPSHOT_KEY).is_none());

    let snapshot = harness.orchestrator.mount().await.expect("fetched");
    assert_eq!(harness.backend.fetch_calls(), 1);
    assert_eq!(harness.orchestrator.snapshot(), Some(snapshot));
}

#[tokio::test]
async fn file_backed_cache_survives_restart() {
    let dir = tempfile::tempdir().expect("tempdir");

    let first = HarnessBuilder::new()
        .store(Arc::new(FileStore::open(dir.path()).expect("open")))
        .signed_in()
        .await;
    let snapshot = first.orchestrator.check_data().await.expect("refresh");
    first.orchestrator.exclude_user("2").expect("exclude");
    drop(first);

    let second = HarnessBuilder::new()
        .store(Arc::new(FileStore::open(dir.path()).expect("reopen")))
        .signed_in()
        .await;
    let restored = second.orchestrator.mount().await.expect("cached");

    assert_eq!(second.backend.fetch_calls(), 0);
    assert_eq!(restored.captured_at, snapshot.captured_at);
    assert_eq!(restored.usernames(), vec!["alice"]);
}

#[tokio::test]
async fn regenerate_refetches_the_list_and_keeps_cached_counts() {
    let harness = HarnessBuilder::new().signed_in().await;
    harness.orchestrator.check_data().await.expect("refresh");
    harness
        .backend
        .set_dashboard(dashboard_data(50, 60, &[("2", "bob"), ("3", "erin")]));

    let regeneration = harness
        .orchestrator
        .regenerate_non_followers()
        .await
        .expect("regenerate");

    assert_eq!(harness.backend.compare_calls(), 1);
    assert_eq!(harness.backend.non_follower_calls(), 1);
    assert_eq!(harness.backend.fetch_calls(), 1);
    assert_eq!(regeneration.verdict, ListVerdict::NonFollowersFound(2));
    assert_eq!(regeneration.snapshot.followers_count, 10);
    assert_eq!(regeneration.snapshot.usernames(), vec!["bob", "erin"]);
    assert_eq!(harness.orchestrator.snapshot(), Some(regeneration.snapshot));
}

#[tokio::test(start_paused = true)]
async fn refresh_in_flight_at_sign_out_is_discarded() {
    let backend = FakeBackend::with_dashboard(dashboard_data(10, 12, &[("1", "alice")]))
        .with_fetch_delay(Duration::from_millis(100));
    let harness = HarnessBuilder::new().backend(backend).signed_in().await;

    let (refreshed, signed_out) = tokio::join!(harness.orchestrator.check_data(), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        harness.orchestrator.on_auth_event(AuthEvent::SignedOut).await
    });

    assert!(signed_out.is_ok());
    assert!(matches!(refreshed, Err(OrchestratorError::SessionChanged)));
    assert!(harness.store.raw(DASHBOARD_SNAPSHOT_KEY).is_none());
    assert!(harness.orchestrator.snapshot().is_none());
    assert!(harness.orchestrator.notices().is_empty());
}

#[tokio::test(start_paused = true)]
async fn refresh_from_a_previous_session_does_not_reach_the_next_one() {
    let backend = FakeBackend::with_dashboard(dashboard_data(10, 12, &[("1", "alice")]))
        .with_fetch_delay(Duration::from_millis(100));
    let harness = HarnessBuilder::new().backend(backend).signed_in().await;

    let (refreshed, signed_in_again) = tokio::join!(harness.orchestrator.check_data(), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        harness
            .orchestrator
            .on_auth_event(AuthEvent::SignedOut)
            .await
            .expect("sign out");
        harness
            .orchestrator
            .on_auth_event(AuthEvent::SignedIn(harness.identity.principal()))
            .await
    });

    assert_eq!(signed_in_again.expect("sign in"), SessionState::Ready);
    assert!(matches!(refreshed, Err(OrchestratorError::SessionChanged)));
    assert!(harness.store.raw(DASHBOARD_SNAPSHOT_KEY).is_none());
}

#[tokio::test(start_paused = true)]
async fn regenerate_in_flight_at_sign_out_is_discarded() {
    let backend = FakeBackend::with_dashboard(dashboard_data(10, 12, &[("1", "alice")]))
        .with_compare_delay(Duration::from_millis(100));
    let harness = HarnessBuilder::new().backend(backend).signed_in().await;

    let (regenerated, signed_out) = tokio::join!(
        harness.orchestrator.regenerate_non_followers(),
        async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            harness.orchestrator.on_auth_event(AuthEvent::SignedOut).await
        }
    );

    assert!(signed_out.is_ok());
    assert!(matches!(regenerated, Err(OrchestratorError::SessionChanged)));
    assert_eq!(harness.backend.non_follower_calls(), 0);
    assert!(harness.store.raw(DASHBOARD_SNAPSHOT_KEY).is_none());
    assert!(!harness.orchestrator.everyone_follows_back_pending());
}

#[tokio::test]
async fn exclusion_after_sign_out_is_rejected() {
    let harness = HarnessBuilder::new().signed_in().await;
    harness.orchestrator.mount().await.expect("snapshot");
    harness
        .orchestrator
        .on_auth_event(AuthEvent::SignedOut)
        .await
        .expect("sign out");

    let error = harness
        .orchestrator
        .exclude_user("1")
        .expect_err("signed out");
    assert!(matches!(error, OrchestratorError::SessionNotReady { .. }));
    assert!(harness.store.raw(DASHBOARD_SNAPSHOT_KEY).is_none());
}
