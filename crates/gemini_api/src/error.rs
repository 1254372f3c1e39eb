use std::fmt;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Error as JsonError;

#[derive(Debug)]
pub enum GeminiApiError {
    MissingApiKey,
    InvalidRequestPayload(String),
    InvalidHeader(String),
    Request(reqwest::Error),
    Status(StatusCode, String),
    MalformedChunk(String),
    Serde(JsonError),
    SafetyBlocked {
        reason: String,
    },
    RetryExhausted {
        status: Option<StatusCode>,
        last_error: Option<String>,
    },
    StreamFailed {
        code: Option<String>,
        message: String,
    },
    Cancelled,
    Runtime(String),
}

impl GeminiApiError {
    /// True when the failure came from a content filter rather than transport.
    pub fn is_safety_block(&self) -> bool {
        matches!(self, Self::SafetyBlocked { .. })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorPayload {
    #[serde(rename = "error")]
    pub value: Option<ErrorPayloadFields>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorPayloadFields {
    pub code: Option<i64>,
    pub message: Option<String>,
    pub status: Option<String>,
}

impl ErrorPayloadFields {
    fn describe(&self) -> Option<String> {
        let message = self.message.as_deref().map(str::trim).filter(|m| !m.is_empty())?;
        match self.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(status) => Some(format!("{status}: {message}")),
            None => Some(message.to_owned()),
        }
    }
}

impl fmt::Display for GeminiApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingApiKey => write!(f, "GEMINI_API_KEY is not set"),
            Self::InvalidRequestPayload(message) => write!(f, "invalid request payload: {message}"),
            Self::InvalidHeader(message) => write!(f, "invalid header: {message}"),
            Self::Request(error) => write!(f, "request error: {error}"),
            Self::Status(status, message) => write!(f, "HTTP {status} {message}"),
            Self::MalformedChunk(message) => write!(f, "malformed stream chunk: {message}"),
            Self::Serde(error) => write!(f, "serialization error: {error}"),
            Self::SafetyBlocked { reason } => write!(f, "blocked by safety filters ({reason})"),
            Self::RetryExhausted { status, last_error } => {
                let status = status
                    .map(|status| status.as_u16().to_string())
                    .unwrap_or_else(|| "n/a".to_owned());
                write!(
                    f,
                    "retry exhausted after max attempts (status: {status}, last_error: {last_error:?})"
                )
            }
            Self::StreamFailed { code, message } => match code {
                Some(code) if !code.trim().is_empty() => {
                    write!(f, "stream failed ({code}): {message}")
                }
                _ => write!(f, "stream failed: {message}"),
            },
            Self::Cancelled => write!(f, "request was cancelled"),
            Self::Runtime(message) => write!(f, "async runtime failure: {message}"),
        }
    }
}

impl std::error::Error for GeminiApiError {}

impl From<reqwest::Error> for GeminiApiError {
    fn from(error: reqwest::Error) -> Self {
        Self::Request(error)
    }
}

impl From<JsonError> for GeminiApiError {
    fn from(error: JsonError) -> Self {
        Self::Serde(error)
    }
}

/// Extract a readable message from a non-success response body.
pub fn parse_error_message(status: StatusCode, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorPayload>(body) {
        if let Some(message) = parsed.value.as_ref().and_then(ErrorPayloadFields::describe) {
            return message;
        }
    }

    if body.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        body.trim().to_string()
    }
}
