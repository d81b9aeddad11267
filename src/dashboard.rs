//! Cached dashboard snapshot and the policy for refreshing it.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};

use cache_store::{
    now_rfc3339, KeyOwner, NonFollowerRecord, ScopedStore, SnapshotRecord, DASHBOARD_SNAPSHOT_KEY,
    SNAPSHOT_VERSION,
};
use dashboard_api::{
    BotStatusReport, DashboardApiError, DashboardBackend, DashboardData, FollowStats, NonFollower,
};

use crate::credential::Credential;
use crate::error::OrchestratorError;
use crate::lock_unpoisoned;
use crate::session::SessionContext;
use crate::token_relay::TokenRelay;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardSnapshot {
    pub followers_count: u64,
    pub following_count: u64,
    pub last_sync_time: Option<String>,
    pub non_followers: Vec<NonFollower>,
    pub captured_at: String,
}

/// How the non-follower list should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListVerdict {
    NonFollowersFound(usize),
    /// Counts are known and nobody is missing; needs explicit acknowledgement.
    EveryoneFollowsBack,
    /// No scan has produced counts yet.
    NoScanYet,
}

impl DashboardSnapshot {
    /// Builds a snapshot from a backend response. Duplicate ids keep their
    /// first occurrence.
    pub fn from_data(data: DashboardData, captured_at: String) -> Self {
        let mut seen = HashSet::new();
        let non_followers = data
            .non_followers
            .into_iter()
            .filter(|entry| seen.insert(entry.id.clone()))
            .collect();
        Self {
            followers_count: data.followers_count,
            following_count: data.following_count,
            last_sync_time: data.last_sync_time,
            non_followers,
            captured_at,
        }
    }

    #[must_use]
    pub fn verdict(&self) -> ListVerdict {
        if !self.non_followers.is_empty() {
            ListVerdict::NonFollowersFound(self.non_followers.len())
        } else if self.followers_count > 0 || self.following_count > 0 {
            ListVerdict::EveryoneFollowsBack
        } else {
            ListVerdict::NoScanYet
        }
    }

    #[must_use]
    pub fn usernames(&self) -> Vec<String> {
        self.non_followers
            .iter()
            .map(|entry| entry.username.clone())
            .collect()
    }

    fn to_record(&self) -> SnapshotRecord {
        SnapshotRecord {
            version: SNAPSHOT_VERSION,
            followers_count: self.followers_count,
            following_count: self.following_count,
            last_sync_time: self.last_sync_time.clone(),
            non_followers: self
                .non_followers
                .iter()
                .map(|entry| NonFollowerRecord {
                    id: entry.id.clone(),
                    username: entry.username.clone(),
                })
                .collect(),
            captured_at: self.captured_at.clone(),
        }
    }

    fn from_record(record: SnapshotRecord) -> Self {
        Self {
            followers_count: record.followers_count,
            following_count: record.following_count,
            last_sync_time: record.last_sync_time,
            non_followers: record
                .non_followers
                .into_iter()
                .map(|entry| NonFollower::new(entry.id, entry.username))
                .collect(),
            captured_at: record.captured_at,
        }
    }
}

/// Result of regenerating the non-follower list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Regeneration {
    pub snapshot: DashboardSnapshot,
    pub verdict: ListVerdict,
}

pub struct DashboardManager {
    session: Arc<SessionContext>,
    relay: Arc<TokenRelay>,
    backend: Arc<dyn DashboardBackend>,
    store: ScopedStore,
    write_lock: Mutex<()>,
}

impl DashboardManager {
    pub fn new(
        session: Arc<SessionContext>,
        relay: Arc<TokenRelay>,
        backend: Arc<dyn DashboardBackend>,
    ) -> Self {
        let store = session.scoped_store(KeyOwner::Dashboard);
        Self {
            session,
            relay,
            backend,
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// Reads the cached snapshot. Unreadable entries count as a miss and are
    /// dropped so the next refresh starts clean.
    #[must_use]
    pub fn load_from_cache(&self) -> Option<DashboardSnapshot> {
        let raw = match self.store.get(DASHBOARD_SNAPSHOT_KEY) {
            Ok(raw) => raw?,
            Err(error) => {
                tracing::debug!(error = %error, "dashboard cache unreadable");
                return None;
            }
        };

        match SnapshotRecord::decode(DASHBOARD_SNAPSHOT_KEY, &raw) {
            Ok(record) => Some(DashboardSnapshot::from_record(record)),
            Err(error) => {
                tracing::debug!(error = %error, "discarding corrupt dashboard cache");
                let _guard = lock_unpoisoned(&self.write_lock);
                let unchanged = matches!(
                    self.store.get(DASHBOARD_SNAPSHOT_KEY),
                    Ok(Some(current)) if current == raw
                );
                if unchanged {
                    let _ = self.store.remove(DASHBOARD_SNAPSHOT_KEY);
                }
                None
            }
        }
    }

    /// Returns the cached snapshot when `force` is false and one exists;
    /// otherwise fetches, and on success replaces the cache wholesale. A
    /// failed fetch leaves the cache untouched, and so does a fetch that
    /// outlives its session.
    pub async fn refresh(&self, force: bool) -> Result<DashboardSnapshot, OrchestratorError> {
        let epoch = self.session.ready_epoch()?;
        if !force {
            if let Some(cached) = self.load_from_cache() {
                return Ok(cached);
            }
        }

        let snapshot = self.fetch_snapshot(epoch).await?;
        self.store_if_current(epoch, &snapshot)?;
        tracing::info!(
            followers = snapshot.followers_count,
            following = snapshot.following_count,
            non_followers = snapshot.non_followers.len(),
            "dashboard refreshed"
        );
        Ok(snapshot)
    }

    /// Removes `id` from the cached list and persists immediately. No backend
    /// round trip. Returns `None` when there is no cached snapshot.
    pub fn exclude_user(&self, id: &str) -> Result<Option<DashboardSnapshot>, OrchestratorError> {
        let epoch = self.session.ready_epoch()?;
        self.session.run_if_current(epoch, || {
            let _guard = lock_unpoisoned(&self.write_lock);
            let Some(mut snapshot) = self.load_unlocked() else {
                return Ok(None);
            };

            let before = snapshot.non_followers.len();
            snapshot.non_followers.retain(|entry| entry.id != id);
            if snapshot.non_followers.len() != before {
                self.write_unlocked(&snapshot)?;
                tracing::debug!(id, "excluded user from non-follower list");
            }
            Ok(Some(snapshot))
        })?
    }

    /// Asks the backend to recompute the diff, then re-fetches the resulting
    /// non-follower list. Counts come from the cached snapshot, or from a
    /// dashboard fetch when nothing is cached.
    pub async fn regenerate_non_followers(&self) -> Result<Regeneration, OrchestratorError> {
        let epoch = self.session.ready_epoch()?;

        let backend = Arc::clone(&self.backend);
        let compare = self
            .with_credential(epoch, move |credential| {
                let backend = Arc::clone(&backend);
                async move { backend.compare_non_followers(credential.token()).await }
            })
            .await?;
        tracing::debug!(status = ?compare.status, "non-follower diff recomputed");
        self.session.run_if_current(epoch, || ())?;

        let backend = Arc::clone(&self.backend);
        let non_followers = self
            .with_credential(epoch, move |credential| {
                let backend = Arc::clone(&backend);
                async move { backend.fetch_non_followers(credential.token()).await }
            })
            .await?;

        let base = match self.load_from_cache() {
            Some(cached) => cached,
            None => self.fetch_snapshot(epoch).await?,
        };
        let data = DashboardData {
            followers_count: base.followers_count,
            following_count: base.following_count,
            last_sync_time: base.last_sync_time,
            non_followers,
        };
        let snapshot = DashboardSnapshot::from_data(data, now_rfc3339()?);
        self.store_if_current(epoch, &snapshot)?;
        tracing::info!(
            non_followers = snapshot.non_followers.len(),
            "non-follower list regenerated"
        );

        let verdict = snapshot.verdict();
        Ok(Regeneration { snapshot, verdict })
    }

    /// Posts the cached usernames to the backend so its list matches local
    /// exclusions, and returns them as the unfollow payload.
    pub async fn submit_exclusions(&self) -> Result<Vec<String>, OrchestratorError> {
        let epoch = self.session.ready_epoch()?;
        let usernames = self
            .load_from_cache()
            .map(|snapshot| snapshot.usernames())
            .unwrap_or_default();
        if usernames.is_empty() {
            return Err(OrchestratorError::EmptyUnfollowList);
        }

        let backend = Arc::clone(&self.backend);
        let list = usernames.clone();
        self.with_credential(epoch, move |credential| {
            let backend = Arc::clone(&backend);
            let list = list.clone();
            async move {
                backend
                    .submit_non_follower_list(credential.token(), &list)
                    .await
            }
        })
        .await?;
        Ok(usernames)
    }

    pub async fn check_new_data(&self) -> Result<bool, OrchestratorError> {
        let epoch = self.session.ready_epoch()?;
        let backend = Arc::clone(&self.backend);
        self.with_credential(epoch, move |credential| {
            let backend = Arc::clone(&backend);
            async move { backend.new_data_available(credential.token()).await }
        })
        .await
    }

    pub async fn follow_stats(&self) -> Result<FollowStats, OrchestratorError> {
        let epoch = self.session.ready_epoch()?;
        let backend = Arc::clone(&self.backend);
        self.with_credential(epoch, move |credential| {
            let backend = Arc::clone(&backend);
            async move { backend.follow_stats(credential.token()).await }
        })
        .await
    }

    pub async fn bot_status(&self) -> Result<BotStatusReport, OrchestratorError> {
        let epoch = self.session.ready_epoch()?;
        let backend = Arc::clone(&self.backend);
        self.with_credential(epoch, move |credential| {
            let backend = Arc::clone(&backend);
            async move { backend.bot_status(credential.token()).await }
        })
        .await
    }

    /// Drops the cached snapshot (sign-out).
    pub fn clear(&self) {
        let _guard = lock_unpoisoned(&self.write_lock);
        if let Err(error) = self.store.remove(DASHBOARD_SNAPSHOT_KEY) {
            tracing::error!(error = %error, "failed to clear dashboard cache");
        }
    }

    /// Runs a backend call with a credential. An unauthorized answer earns
    /// one retry with a force-refreshed credential.
    ///
    /// Failures that land after the session at `epoch` ended come back as
    /// [`OrchestratorError::SessionChanged`], so they never drive the
    /// sign-out policy of a later session.
    async fn with_credential<T, F, Fut>(&self, epoch: u64, call: F) -> Result<T, OrchestratorError>
    where
        F: Fn(Credential) -> Fut,
        Fut: Future<Output = Result<T, DashboardApiError>>,
    {
        let result = self.call_with_retry(call).await;
        match result {
            Err(_) if self.session.epoch() != epoch => Err(OrchestratorError::SessionChanged),
            other => other,
        }
    }

    async fn call_with_retry<T, F, Fut>(&self, call: F) -> Result<T, OrchestratorError>
    where
        F: Fn(Credential) -> Fut,
        Fut: Future<Output = Result<T, DashboardApiError>>,
    {
        let credential = self.relay.ensure_fresh_credential(false).await?;
        match call(credential).await {
            Err(error) if error.is_unauthorized() => {
                tracing::debug!(error = %error, "backend rejected credential; forcing refresh");
                let refreshed = self.relay.ensure_fresh_credential(true).await?;
                call(refreshed).await.map_err(OrchestratorError::from)
            }
            other => other.map_err(OrchestratorError::from),
        }
    }

    async fn fetch_snapshot(&self, epoch: u64) -> Result<DashboardSnapshot, OrchestratorError> {
        let backend = Arc::clone(&self.backend);
        let data = self
            .with_credential(epoch, move |credential| {
                let backend = Arc::clone(&backend);
                async move { backend.fetch_dashboard(credential.token()).await }
            })
            .await?;
        Ok(DashboardSnapshot::from_data(data, now_rfc3339()?))
    }

    /// Replaces the cache only while the session at `epoch` is still live.
    fn store_if_current(
        &self,
        epoch: u64,
        snapshot: &DashboardSnapshot,
    ) -> Result<(), OrchestratorError> {
        let stored = self.session.run_if_current(epoch, || {
            let _guard = lock_unpoisoned(&self.write_lock);
            self.write_unlocked(snapshot)
        });
        if matches!(stored, Err(OrchestratorError::SessionChanged)) {
            tracing::debug!("session ended mid-fetch; dropping dashboard response");
        }
        stored?
    }

    fn load_unlocked(&self) -> Option<DashboardSnapshot> {
        let raw = self.store.get(DASHBOARD_SNAPSHOT_KEY).ok().flatten()?;
        SnapshotRecord::decode(DASHBOARD_SNAPSHOT_KEY, &raw)
            .ok()
            .map(DashboardSnapshot::from_record)
    }

    fn write_unlocked(&self, snapshot: &DashboardSnapshot) -> Result<(), OrchestratorError> {
        let encoded = snapshot.to_record().encode(DASHBOARD_SNAPSHOT_KEY)?;
        self.store.set(DASHBOARD_SNAPSHOT_KEY, &encoded)?;
        Ok(())
    }
}
