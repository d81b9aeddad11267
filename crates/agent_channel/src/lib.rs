//! Contract between the orchestrator and the external automation agent.
//!
//! The agent runs outside the application's trust boundary and is reached over
//! a one-way, best-effort message channel. This crate defines the outbound
//! configuration messages, the inbound run-status push shape, and the
//! [`ActionChannel`] trait hosts implement for their transport. It contains no
//! transport of its own.

pub mod hub;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use hub::{InboundHub, ListenerKey, Subscription, SubscriptionHandle};

/// Inbound `action` value carried by agent status pushes.
pub const RUN_STATUS_UPDATE_ACTION: &str = "runStatusUpdate";
/// Older agent builds announce status under this action name.
pub const LEGACY_STATUS_UPDATE_ACTION: &str = "botStatusUpdate";

/// Long-running social-graph operation the agent can be configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    ScanFollowers,
    ScanFollowing,
    SyncAll,
    Unfollow,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::ScanFollowers,
        Operation::ScanFollowing,
        Operation::SyncAll,
        Operation::Unfollow,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ScanFollowers => "scan-followers",
            Self::ScanFollowing => "scan-following",
            Self::SyncAll => "sync-all",
            Self::Unfollow => "unfollow",
        }
    }

    /// Human-readable label shown by the agent while the operation is selected.
    #[must_use]
    pub fn default_label(self) -> &'static str {
        match self {
            Self::ScanFollowers => "Scan Followers",
            Self::ScanFollowing => "Scan Following",
            Self::SyncAll => "Sync All Data",
            Self::Unfollow => "Unfollow listed users",
        }
    }

    /// Backend path the agent posts its results to, relative to the API base URL.
    #[must_use]
    pub fn endpoint_path(self) -> &'static str {
        match self {
            Self::ScanFollowers => "get-followers",
            Self::ScanFollowing => "get-following",
            Self::SyncAll => "api/sync-all/",
            Self::Unfollow => "unfollow",
        }
    }

    /// Returns true when the dispatch sequence ends with an explicit username payload.
    #[must_use]
    pub fn carries_payload(self) -> bool {
        matches!(self, Self::Unfollow)
    }

    /// Resolves an agent-reported label back to an operation.
    ///
    /// Accepts both the stable identifier (`sync-all`) and the default label
    /// (`Sync All Data`), case-insensitively.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL.into_iter().find(|operation| {
            operation.as_str().eq_ignore_ascii_case(label)
                || operation.default_label().eq_ignore_ascii_case(label)
        })
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outbound configuration message pushed to the agent.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ChannelMessage {
    SaveCredential { token: String },
    SetTargetEndpoint { endpoint: String },
    SetSelectedAction { label: String },
    SetUnfollowList { usernames: Vec<String> },
    ClearSelectedAction {},
}

impl ChannelMessage {
    /// Wire name of the message, as carried in the `action` field.
    #[must_use]
    pub fn action_name(&self) -> &'static str {
        match self {
            Self::SaveCredential { .. } => "saveCredential",
            Self::SetTargetEndpoint { .. } => "setTargetEndpoint",
            Self::SetSelectedAction { .. } => "setSelectedAction",
            Self::SetUnfollowList { .. } => "setUnfollowList",
            Self::ClearSelectedAction {} => "clearSelectedAction",
        }
    }

    pub fn to_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

// Tokens never reach logs through `{:?}`.
impl fmt::Debug for ChannelMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SaveCredential { token } => f
                .debug_struct("SaveCredential")
                .field("token", &format_args!("<{} bytes redacted>", token.len()))
                .finish(),
            Self::SetTargetEndpoint { endpoint } => f
                .debug_struct("SetTargetEndpoint")
                .field("endpoint", endpoint)
                .finish(),
            Self::SetSelectedAction { label } => f
                .debug_struct("SetSelectedAction")
                .field("label", label)
                .finish(),
            Self::SetUnfollowList { usernames } => f
                .debug_struct("SetUnfollowList")
                .field("usernames", &usernames.len())
                .finish(),
            Self::ClearSelectedAction {} => f.write_str("ClearSelectedAction"),
        }
    }
}

/// Acknowledgement returned by the agent for one delivered message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ack {
    pub response: Option<Value>,
}

impl Ack {
    #[must_use]
    pub fn empty() -> Self {
        Self { response: None }
    }

    #[must_use]
    pub fn with_response(response: impl Into<Value>) -> Self {
        Self {
            response: Some(response.into()),
        }
    }
}

/// Failure while delivering configuration to the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// No agent answered (not installed, disabled, or the host has no runtime).
    Unreachable { message: String },
    /// The agent answered but refused the message.
    Rejected {
        action: &'static str,
        message: String,
    },
    /// No acknowledgement arrived within the bounded send window.
    TimedOut {
        action: &'static str,
        after: Duration,
    },
    /// A dispatch sequence stopped midway; the agent is only partially configured.
    PartialDelivery {
        delivered: Vec<&'static str>,
        failed: &'static str,
        cause: Box<ChannelError>,
    },
}

impl ChannelError {
    #[must_use]
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::Unreachable {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn rejected(action: &'static str, message: impl Into<String>) -> Self {
        Self::Rejected {
            action,
            message: message.into(),
        }
    }

    /// Returns true when at least one message of the sequence reached the agent.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        matches!(self, Self::PartialDelivery { delivered, .. } if !delivered.is_empty())
    }
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreachable { message } => write!(f, "automation agent unreachable: {message}"),
            Self::Rejected { action, message } => {
                write!(f, "automation agent rejected {action}: {message}")
            }
            Self::TimedOut { action, after } => write!(
                f,
                "automation agent did not acknowledge {action} within {}ms",
                after.as_millis()
            ),
            Self::PartialDelivery {
                delivered,
                failed,
                cause,
            } => {
                if delivered.is_empty() {
                    write!(f, "dispatch failed at {failed}: {cause}")
                } else {
                    write!(
                        f,
                        "dispatch stopped at {failed} after delivering {}: {cause}",
                        delivered.join(", ")
                    )
                }
            }
        }
    }
}

impl std::error::Error for ChannelError {}

/// Agent-reported run lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Finished,
    Error,
}

/// Outcome attached to a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The agent changed server-side data.
    Success,
    /// The agent completed without finding anything new.
    NoChange,
}

impl RunOutcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::NoChange => "no_change",
        }
    }
}

/// Status push delivered by the agent, out of band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatusUpdate {
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_label: Option<String>,
    #[serde(default, alias = "finalStatus", skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunStatusUpdate {
    #[must_use]
    pub fn running(operation_label: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Running,
            operation_label: Some(operation_label.into()),
            outcome: None,
            error: None,
        }
    }

    #[must_use]
    pub fn finished(outcome: RunOutcome) -> Self {
        Self {
            status: RunStatus::Finished,
            operation_label: None,
            outcome: Some(outcome.as_str().to_string()),
            error: None,
        }
    }

    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Error,
            operation_label: None,
            outcome: None,
            error: Some(error.into()),
        }
    }

    #[must_use]
    pub fn with_operation_label(mut self, label: impl Into<String>) -> Self {
        self.operation_label = Some(label.into());
        self
    }

    /// Outcome of a finished run. Missing or unrecognized values count as success.
    #[must_use]
    pub fn run_outcome(&self) -> RunOutcome {
        match self.outcome.as_deref().map(str::trim) {
            Some(value) if value.eq_ignore_ascii_case("no_change") => RunOutcome::NoChange,
            _ => RunOutcome::Success,
        }
    }

    #[must_use]
    pub fn operation(&self) -> Option<Operation> {
        self.operation_label.as_deref().and_then(Operation::from_label)
    }

    /// Error reason with a stable fallback for agents that omit it.
    #[must_use]
    pub fn error_reason(&self) -> String {
        self.error
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or("Unknown error")
            .to_string()
    }
}

/// Parses a raw inbound message, ignoring anything that is not a status push.
pub fn parse_inbound(value: &Value) -> Result<Option<RunStatusUpdate>, serde_json::Error> {
    let action = value.get("action").and_then(Value::as_str);
    if !matches!(
        action,
        Some(RUN_STATUS_UPDATE_ACTION) | Some(LEGACY_STATUS_UPDATE_ACTION)
    ) {
        return Ok(None);
    }

    serde_json::from_value::<RunStatusUpdate>(value.clone()).map(Some)
}

/// Run flag the agent persists across page reloads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedRunFlag {
    #[serde(default, alias = "bot_is_running")]
    pub is_running: bool,
    #[serde(default, alias = "selectedActionLabel")]
    pub selected_action_label: Option<String>,
}

/// Transport to the external automation agent.
///
/// Implementations must bound every call in time: a send either completes or
/// fails, it never blocks indefinitely.
#[async_trait]
pub trait ActionChannel: Send + Sync + 'static {
    /// Delivers one configuration message and waits for its acknowledgement.
    async fn send(&self, message: &ChannelMessage) -> Result<Ack, ChannelError>;

    /// Reads the agent's own persisted run flag.
    ///
    /// Agents without persisted state report idle.
    async fn persisted_run_flag(&self) -> Result<PersistedRunFlag, ChannelError> {
        Ok(PersistedRunFlag::default())
    }
}

/// Channel used when no agent is installed in the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedChannel;

#[async_trait]
impl ActionChannel for DetachedChannel {
    async fn send(&self, message: &ChannelMessage) -> Result<Ack, ChannelError> {
        Err(ChannelError::unreachable(format!(
            "no automation agent is installed (dropped {})",
            message.action_name()
        )))
    }

    async fn persisted_run_flag(&self) -> Result<PersistedRunFlag, ChannelError> {
        Err(ChannelError::unreachable("no automation agent is installed"))
    }
}
