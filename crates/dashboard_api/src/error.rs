use std::fmt;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Error as JsonError, Value};

#[derive(Debug)]
pub enum DashboardApiError {
    MissingCredential,
    InvalidBaseUrl(String),
    InvalidHeader(String),
    Request(reqwest::Error),
    Unauthorized(String),
    Status(StatusCode, String),
    Serde(JsonError),
    RetryExhausted {
        status: Option<StatusCode>,
        last_error: Option<String>,
    },
}

impl DashboardApiError {
    /// True when the backend rejected the credential itself.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }

    /// HTTP status attached to the failure, when one was received.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Unauthorized(_) => Some(StatusCode::UNAUTHORIZED),
            Self::Status(status, _) => Some(*status),
            Self::RetryExhausted { status, .. } => *status,
            _ => None,
        }
    }
}

impl fmt::Display for DashboardApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingCredential => write!(f, "bearer credential is required"),
            Self::InvalidBaseUrl(value) => write!(f, "invalid base URL: {value}"),
            Self::InvalidHeader(message) => write!(f, "invalid header: {message}"),
            Self::Request(error) => write!(f, "request error: {error}"),
            Self::Unauthorized(message) => write!(f, "unauthorized: {message}"),
            Self::Status(status, message) => write!(f, "HTTP {status} {message}"),
            Self::Serde(error) => write!(f, "serialization error: {error}"),
            Self::RetryExhausted { status, last_error } => {
                let status = status
                    .map(|status| status.as_u16().to_string())
                    .unwrap_or_else(|| "n/a".to_owned());
                write!(
                    f,
                    "retry exhausted after max attempts (status: {status}, last_error: {last_error:?})"
                )
            }
        }
    }
}

impl std::error::Error for DashboardApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Request(error) => Some(error),
            Self::Serde(error) => Some(error),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for DashboardApiError {
    fn from(error: reqwest::Error) -> Self {
        Self::Request(error)
    }
}

impl From<JsonError> for DashboardApiError {
    fn from(error: JsonError) -> Self {
        Self::Serde(error)
    }
}

/// Backend error bodies are either `{"error": "text"}`,
/// `{"error": {"message": "text"}}` or `{"message": "text"}`.
#[derive(Debug, Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    message: Option<String>,
}

impl ErrorPayload {
    fn message(&self) -> Option<String> {
        let from_error = match &self.error {
            Some(Value::String(text)) => Some(text.as_str()),
            Some(Value::Object(fields)) => fields.get("message").and_then(Value::as_str),
            _ => None,
        };
        from_error
            .or(self.message.as_deref())
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_owned)
    }
}

pub fn parse_error_message(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ErrorPayload>(body) {
        if let Some(message) = payload.message() {
            return message;
        }
    }

    if body.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        body.to_string()
    }
}

/// Classify a non-success response.
pub fn status_error(status: StatusCode, body: &str) -> DashboardApiError {
    let message = parse_error_message(status, body);
    if status == StatusCode::UNAUTHORIZED {
        DashboardApiError::Unauthorized(message)
    } else {
        DashboardApiError::Status(status, message)
    }
}
