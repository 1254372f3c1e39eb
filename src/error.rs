use std::fmt;

use llm_provider::ProviderError;
use thiserror::Error;

/// When a token budget check tripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetPhase {
    /// Estimated from the prompt before any network I/O.
    PreFlight,
    /// Reported by the service after the reply was streamed.
    PostFlight,
}

impl fmt::Display for BudgetPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PreFlight => f.write_str("estimated request (with margin) would exceed limit"),
            Self::PostFlight => f.write_str("limit exceeded after response"),
        }
    }
}

/// Terminal failure of one conversational turn.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TurnError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("token limit exceeded: {used}/{limit} tokens ({phase})")]
    BudgetExceeded {
        phase: BudgetPhase,
        used: u64,
        limit: u64,
    },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("response blocked by safety filters: {0}")]
    SafetyBlocked(String),

    #[error("turn cancelled")]
    Cancelled,

    #[error("a turn is already in flight")]
    TurnInFlight,
}

impl From<ProviderError> for TurnError {
    fn from(error: ProviderError) -> Self {
        match error {
            ProviderError::Configuration(message) => Self::Configuration(message),
            ProviderError::Transport(message) => Self::Transport(message),
            ProviderError::Protocol(message) => Self::Protocol(message),
            ProviderError::SafetyBlocked(reason) => Self::SafetyBlocked(reason),
            ProviderError::Cancelled => Self::Cancelled,
        }
    }
}
