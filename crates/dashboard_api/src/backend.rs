use async_trait::async_trait;

use crate::error::DashboardApiError;
use crate::payload::{
    BotStatusReport, CompareResponse, DashboardData, FollowStats, NonFollower, UpdateListResponse,
};

/// Backend operations the orchestrator depends on. Implemented by
/// [`crate::DashboardApiClient`]; tests substitute in-memory fakes.
#[async_trait]
pub trait DashboardBackend: Send + Sync + 'static {
    async fn fetch_dashboard(&self, credential: &str) -> Result<DashboardData, DashboardApiError>;

    async fn compare_non_followers(
        &self,
        credential: &str,
    ) -> Result<CompareResponse, DashboardApiError>;

    async fn fetch_non_followers(
        &self,
        credential: &str,
    ) -> Result<Vec<NonFollower>, DashboardApiError>;

    async fn submit_non_follower_list(
        &self,
        credential: &str,
        usernames: &[String],
    ) -> Result<UpdateListResponse, DashboardApiError>;

    async fn follow_stats(&self, credential: &str) -> Result<FollowStats, DashboardApiError>;

    async fn new_data_available(&self, credential: &str) -> Result<bool, DashboardApiError>;

    async fn bot_status(&self, credential: &str) -> Result<BotStatusReport, DashboardApiError>;
}
