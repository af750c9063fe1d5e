use std::fmt;

use reqwest::StatusCode;
use serde_json::{Error as JsonError, Value};

#[derive(Debug)]
pub enum ChatApiError {
    MissingAccessToken,
    InvalidBaseUrl(String),
    InvalidHeader(String),
    Request(reqwest::Error),
    Status(StatusCode, String),
    Serde(JsonError),
    Cancelled,
    Unknown(String),
}

impl ChatApiError {
    /// HTTP status of a non-success response, if that is what failed.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status(status, _) => Some(*status),
            _ => None,
        }
    }
}

impl fmt::Display for ChatApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingAccessToken => write!(f, "access token is required"),
            Self::InvalidBaseUrl(value) => write!(f, "invalid base URL: {value}"),
            Self::InvalidHeader(message) => write!(f, "invalid header: {message}"),
            Self::Request(error) => write!(f, "request error: {error}"),
            Self::Status(status, message) => write!(f, "HTTP {} {message}", status.as_u16()),
            Self::Serde(error) => write!(f, "malformed response body: {error}"),
            Self::Cancelled => write!(f, "request was cancelled"),
            Self::Unknown(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for ChatApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Request(error) => Some(error),
            Self::Serde(error) => Some(error),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ChatApiError {
    fn from(error: reqwest::Error) -> Self {
        Self::Request(error)
    }
}

impl From<JsonError> for ChatApiError {
    fn from(error: JsonError) -> Self {
        Self::Serde(error)
    }
}

/// Extracts a human-readable message from an error response body.
///
/// Recognizes `{"detail": ..}`, `{"error": {"message": ..}}`, `{"error": ".."}`
/// and `{"message": ..}`; otherwise falls back to the raw body, then to the
/// status' canonical reason.
pub fn parse_error_message(status: StatusCode, body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return canonical_reason(status);
    }

    let Ok(parsed) = serde_json::from_str::<Value>(trimmed) else {
        return trimmed.to_string();
    };

    let candidates = [
        parsed.get("detail"),
        parsed.get("error").and_then(|error| error.get("message")),
        parsed.get("error"),
        parsed.get("message"),
    ];

    let message = candidates
        .into_iter()
        .flatten()
        .find_map(message_text)
        .unwrap_or_else(|| trimmed.to_string());
    message
}

fn message_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        // Validation errors arrive as a list of `{"msg": ..}` objects.
        Value::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .filter_map(|item| {
                    item.get("msg")
                        .and_then(message_text)
                        .or_else(|| message_text(item))
                })
                .collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join("; "))
            }
        }
        _ => None,
    }
}

fn canonical_reason(status: StatusCode) -> String {
    status
        .canonical_reason()
        .unwrap_or("request failed")
        .to_string()
}
