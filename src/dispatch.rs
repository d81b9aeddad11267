//! Encoding and ordered delivery of one action request.

use std::time::Duration;

use agent_channel::{Ack, ActionChannel, ChannelError, ChannelMessage, Operation};
use dashboard_api::{join_endpoint, DashboardApiError};

use crate::credential::Credential;

/// Fully resolved request for the agent. Built right before dispatch and
/// never stored.
#[derive(Debug, Clone)]
pub struct ActionDescriptor {
    pub operation: Operation,
    pub label: String,
    pub endpoint: String,
    pub credential: Credential,
    pub payload: Option<Vec<String>>,
}

impl ActionDescriptor {
    pub fn new(
        operation: Operation,
        api_base_url: &str,
        credential: Credential,
    ) -> Result<Self, DashboardApiError> {
        Ok(Self {
            operation,
            label: operation.default_label().to_string(),
            endpoint: join_endpoint(api_base_url, operation.endpoint_path())?,
            credential,
            payload: None,
        })
    }

    #[must_use]
    pub fn with_payload(mut self, usernames: Vec<String>) -> Self {
        self.payload = Some(usernames);
        self
    }

    /// The fixed message order: credential, endpoint, label, then the
    /// username list for operations that carry one.
    #[must_use]
    pub fn messages(&self) -> Vec<ChannelMessage> {
        let mut messages = vec![
            ChannelMessage::SaveCredential {
                token: self.credential.token().to_string(),
            },
            ChannelMessage::SetTargetEndpoint {
                endpoint: self.endpoint.clone(),
            },
            ChannelMessage::SetSelectedAction {
                label: self.label.clone(),
            },
        ];
        if self.operation.carries_payload() {
            messages.push(ChannelMessage::SetUnfollowList {
                usernames: self.payload.clone().unwrap_or_default(),
            });
        }
        messages
    }
}

/// Sends one message, failing with [`ChannelError::TimedOut`] when the agent
/// does not acknowledge within `timeout`.
pub async fn send_with_timeout(
    channel: &dyn ActionChannel,
    message: &ChannelMessage,
    timeout: Duration,
) -> Result<Ack, ChannelError> {
    match tokio::time::timeout(timeout, channel.send(message)).await {
        Ok(result) => result,
        Err(_) => Err(ChannelError::TimedOut {
            action: message.action_name(),
            after: timeout,
        }),
    }
}

/// Delivers the descriptor's messages in order, each acknowledged before the
/// next is sent. Stops at the first failure.
pub async fn dispatch(
    channel: &dyn ActionChannel,
    descriptor: &ActionDescriptor,
    timeout: Duration,
) -> Result<Vec<Ack>, ChannelError> {
    let messages = descriptor.messages();
    let mut acks = Vec::with_capacity(messages.len());
    let mut delivered = Vec::with_capacity(messages.len());

    for message in &messages {
        match send_with_timeout(channel, message, timeout).await {
            Ok(ack) => {
                delivered.push(message.action_name());
                acks.push(ack);
            }
            Err(cause) => {
                tracing::warn!(
                    operation = %descriptor.operation,
                    failed = message.action_name(),
                    delivered = delivered.len(),
                    error = %cause,
                    "dispatch sequence interrupted"
                );
                return Err(ChannelError::PartialDelivery {
                    delivered,
                    failed: message.action_name(),
                    cause: Box::new(cause),
                });
            }
        }
    }

    tracing::info!(
        operation = %descriptor.operation,
        credential = %descriptor.credential.fingerprint(),
        messages = acks.len(),
        "dispatch sequence acknowledged"
    );
    Ok(acks)
}
