//! Transport-only client for the follow-graph backend.
//!
//! Every call takes the bearer credential explicitly; the client never caches
//! or refreshes credentials. Idempotent GETs retry transient failures, POSTs
//! are sent exactly once.

pub mod backend;
pub mod client;
pub mod config;
pub mod error;
pub mod headers;
pub mod payload;
pub mod retry;
pub mod url;

pub use backend::DashboardBackend;
pub use client::DashboardApiClient;
pub use config::DashboardApiConfig;
pub use error::DashboardApiError;
pub use payload::{
    BotStatusReport, CompareResponse, DashboardData, FollowStats, NewDataFlag, NonFollower,
    NonFollowersResponse, UpdateListRequest, UpdateListResponse,
};
pub use reqwest::StatusCode;
pub use url::{join_endpoint, normalize_base_url, DEFAULT_API_BASE_URL};
