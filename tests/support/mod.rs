#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use agent_channel::InboundHub;
use agent_channel_mock::MockAgent;
use async_trait::async_trait;
use cache_store::{CacheStoreError, KeyValueStore, MemoryStore};
use dashboard_api::{
    BotStatusReport, CompareResponse, DashboardApiError, DashboardBackend, DashboardData,
    FollowStats, NonFollower, UpdateListResponse,
};
use followsync::{
    AuthEvent, Collaborators, Credential, CredentialSource, CredentialSourceError, Orchestrator,
    OrchestratorSettings, Principal,
};

pub const ACCOUNT: &str = "account-1";

#[derive(Default)]
struct IdentityState {
    principal: Option<Principal>,
    generation: u64,
    calls: usize,
    forced_calls: usize,
    failures: VecDeque<CredentialSourceError>,
    delay: Option<Duration>,
}

/// Identity provider stand-in. Forced refreshes mint `token-N+1`; plain
/// calls return the current token.
#[derive(Default)]
pub struct FakeIdentity {
    state: Mutex<IdentityState>,
}

impl FakeIdentity {
    pub fn signed_in(uid: &str) -> Self {
        let identity = Self::default();
        lock_unpoisoned(&identity.state).principal = Some(Principal::new(uid));
        identity
    }

    pub fn principal(&self) -> Principal {
        lock_unpoisoned(&self.state)
            .principal
            .clone()
            .expect("fake identity has no principal")
    }

    pub fn sign_out(&self) {
        lock_unpoisoned(&self.state).principal = None;
    }

    /// Every later `get_credential` call sleeps for `delay` first.
    pub fn set_delay(&self, delay: Duration) {
        lock_unpoisoned(&self.state).delay = Some(delay);
    }

    pub fn fail_next(&self, error: CredentialSourceError) {
        lock_unpoisoned(&self.state).failures.push_back(error);
    }

    pub fn calls(&self) -> usize {
        lock_unpoisoned(&self.state).calls
    }

    pub fn forced_calls(&self) -> usize {
        lock_unpoisoned(&self.state).forced_calls
    }

    pub fn current_token(&self) -> String {
        format!("token-{}", lock_unpoisoned(&self.state).generation)
    }
}

#[async_trait]
impl CredentialSource for FakeIdentity {
    async fn get_credential(
        &self,
        force_refresh: bool,
    ) -> Result<Credential, CredentialSourceError> {
        let delay = lock_unpoisoned(&self.state).delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = lock_unpoisoned(&self.state);
        state.calls += 1;
        if force_refresh {
            state.forced_calls += 1;
        }
        if let Some(error) = state.failures.pop_front() {
            return Err(error);
        }
        if state.principal.is_none() {
            return Err(CredentialSourceError::NotSignedIn);
        }
        if force_refresh || state.generation == 0 {
            state.generation += 1;
        }
        Ok(Credential::new(format!("token-{}", state.generation)))
    }

    fn current_principal(&self) -> Option<Principal> {
        lock_unpoisoned(&self.state).principal.clone()
    }
}

#[derive(Default)]
struct BackendState {
    dashboard: DashboardData,
    fetch_calls: usize,
    compare_calls: usize,
    non_follower_calls: usize,
    submitted_lists: Vec<Vec<String>>,
    credentials_seen: Vec<String>,
    rejected_tokens: HashSet<String>,
    fetch_failures: VecDeque<DashboardApiError>,
    new_data: bool,
}

/// In-memory backend with call counters and scripted failures.
#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<BackendState>,
    fetch_delay: Option<Duration>,
    compare_delay: Option<Duration>,
}

impl FakeBackend {
    pub fn with_dashboard(dashboard: DashboardData) -> Self {
        let backend = Self::default();
        lock_unpoisoned(&backend.state).dashboard = dashboard;
        backend
    }

    #[must_use]
    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }

    #[must_use]
    pub fn with_compare_delay(mut self, delay: Duration) -> Self {
        self.compare_delay = Some(delay);
        self
    }

    pub fn set_dashboard(&self, dashboard: DashboardData) {
        lock_unpoisoned(&self.state).dashboard = dashboard;
    }

    pub fn set_new_data(&self, new_data: bool) {
        lock_unpoisoned(&self.state).new_data = new_data;
    }

    pub fn reject_token(&self, token: &str) {
        lock_unpoisoned(&self.state)
            .rejected_tokens
            .insert(token.to_string());
    }

    pub fn fail_next_fetch(&self, error: DashboardApiError) {
        lock_unpoisoned(&self.state).fetch_failures.push_back(error);
    }

    pub fn fetch_calls(&self) -> usize {
        lock_unpoisoned(&self.state).fetch_calls
    }

    pub fn compare_calls(&self) -> usize {
        lock_unpoisoned(&self.state).compare_calls
    }

    pub fn non_follower_calls(&self) -> usize {
        lock_unpoisoned(&self.state).non_follower_calls
    }

    pub fn submitted_lists(&self) -> Vec<Vec<String>> {
        lock_unpoisoned(&self.state).submitted_lists.clone()
    }

    pub fn credentials_seen(&self) -> Vec<String> {
        lock_unpoisoned(&self.state).credentials_seen.clone()
    }

    fn authorize(&self, credential: &str) -> Result<(), DashboardApiError> {
        let mut state = lock_unpoisoned(&self.state);
        state.credentials_seen.push(credential.to_string());
        if state.rejected_tokens.contains(credential) {
            return Err(DashboardApiError::Unauthorized("token expired".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DashboardBackend for FakeBackend {
    async fn fetch_dashboard(&self, credential: &str) -> Result<DashboardData, DashboardApiError> {
        lock_unpoisoned(&self.state).fetch_calls += 1;
        if let Some(delay) = self.fetch_delay {
            tokio::time::sleep(delay).await;
        }
        self.authorize(credential)?;
        let mut state = lock_unpoisoned(&self.state);
        if let Some(error) = state.fetch_failures.pop_front() {
            return Err(error);
        }
        Ok(state.dashboard.clone())
    }

    async fn compare_non_followers(
        &self,
        credential: &str,
    ) -> Result<CompareResponse, DashboardApiError> {
        if let Some(delay) = self.compare_delay {
            tokio::time::sleep(delay).await;
        }
        self.authorize(credential)?;
        let mut state = lock_unpoisoned(&self.state);
        state.compare_calls += 1;
        Ok(CompareResponse {
            status: Some("ok".to_string()),
            non_followers: Some(state.dashboard.non_followers.clone()),
        })
    }

    async fn fetch_non_followers(
        &self,
        credential: &str,
    ) -> Result<Vec<NonFollower>, DashboardApiError> {
        self.authorize(credential)?;
        let mut state = lock_unpoisoned(&self.state);
        state.non_follower_calls += 1;
        Ok(state.dashboard.non_followers.clone())
    }

    async fn submit_non_follower_list(
        &self,
        credential: &str,
        usernames: &[String],
    ) -> Result<UpdateListResponse, DashboardApiError> {
        self.authorize(credential)?;
        lock_unpoisoned(&self.state)
            .submitted_lists
            .push(usernames.to_vec());
        Ok(UpdateListResponse {
            message: Some("updated".to_string()),
        })
    }

    async fn follow_stats(&self, credential: &str) -> Result<FollowStats, DashboardApiError> {
        self.authorize(credential)?;
        let state = lock_unpoisoned(&self.state);
        Ok(FollowStats {
            followers: state.dashboard.followers_count,
            following: state.dashboard.following_count,
            last_followers_scan: state.dashboard.last_sync_time.clone(),
            last_following_scan: state.dashboard.last_sync_time.clone(),
        })
    }

    async fn new_data_available(&self, credential: &str) -> Result<bool, DashboardApiError> {
        self.authorize(credential)?;
        Ok(lock_unpoisoned(&self.state).new_data)
    }

    async fn bot_status(&self, credential: &str) -> Result<BotStatusReport, DashboardApiError> {
        self.authorize(credential)?;
        Ok(BotStatusReport::default())
    }
}

pub fn dashboard_data(followers: u64, following: u64, non_followers: &[(&str, &str)]) -> DashboardData {
    DashboardData {
        followers_count: followers,
        following_count: following,
        last_sync_time: Some("2026-10-01T12:00:00Z".to_string()),
        non_followers: non_followers
            .iter()
            .map(|(id, username)| NonFollower::new(*id, *username))
            .collect(),
    }
}

/// Store wrapper that records every removal in order.
pub struct RecordingStore {
    inner: Arc<dyn KeyValueStore>,
    removals: Mutex<Vec<String>>,
}

impl RecordingStore {
    pub fn new(inner: Arc<dyn KeyValueStore>) -> Self {
        Self {
            inner,
            removals: Mutex::new(Vec::new()),
        }
    }

    pub fn removals(&self) -> Vec<String> {
        lock_unpoisoned(&self.removals).clone()
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.inner.get(key).expect("store read")
    }
}

impl KeyValueStore for RecordingStore {
    fn get(&self, key: &str) -> Result<Option<String>, CacheStoreError> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CacheStoreError> {
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), CacheStoreError> {
        lock_unpoisoned(&self.removals).push(key.to_string());
        self.inner.remove(key)
    }
}

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub identity: Arc<FakeIdentity>,
    pub backend: Arc<FakeBackend>,
    pub agent: Arc<MockAgent>,
    pub store: Arc<RecordingStore>,
}

pub struct HarnessBuilder {
    backend: FakeBackend,
    remember_session: bool,
    store: Arc<dyn KeyValueStore>,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            backend: FakeBackend::with_dashboard(dashboard_data(
                10,
                12,
                &[("1", "alice"), ("2", "bob")],
            )),
            remember_session: false,
            store: Arc::new(MemoryStore::new()),
        }
    }

    pub fn backend(mut self, backend: FakeBackend) -> Self {
        self.backend = backend;
        self
    }

    pub fn remember_session(mut self, remember: bool) -> Self {
        self.remember_session = remember;
        self
    }

    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = store;
        self
    }

    pub fn build(self) -> Harness {
        let identity = Arc::new(FakeIdentity::signed_in(ACCOUNT));
        let backend = Arc::new(self.backend);
        let agent = Arc::new(MockAgent::with_hub(InboundHub::new()));
        let store = Arc::new(RecordingStore::new(self.store));

        let settings = OrchestratorSettings {
            api_base_url: "http://127.0.0.1:8000/".to_string(),
            channel_timeout: Duration::from_millis(500),
            remember_session: self.remember_session,
        };
        let orchestrator = Orchestrator::new(
            settings,
            Collaborators {
                credentials: identity.clone(),
                channel: agent.clone(),
                backend: backend.clone(),
                store: store.clone() as Arc<dyn KeyValueStore>,
                hub: agent.hub().clone(),
            },
        )
        .expect("orchestrator");

        Harness {
            orchestrator,
            identity,
            backend,
            agent,
            store,
        }
    }

    /// Builds the harness and completes sign-in.
    pub async fn signed_in(self) -> Harness {
        let harness = self.build();
        harness
            .orchestrator
            .on_auth_event(AuthEvent::SignedIn(harness.identity.principal()))
            .await
            .expect("sign in");
        harness
    }
}

pub fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
