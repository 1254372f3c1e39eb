//! Minimal provider-agnostic contract for streaming one conversational turn.
//!
//! This crate defines the conversation log replayed to the model and the
//! lifecycle types a provider emits while streaming a reply. It excludes
//! transport details, wire payloads, and session-level policy.

use std::fmt;
use std::sync::{atomic::AtomicBool, Arc};

use thiserror::Error;

mod history;

pub use history::{History, HistoryEntry, HistoryMark, Role, WireContent, WireRole};

/// Identifier for one conversational turn.
pub type TurnId = u64;

/// Shared cancellation flag for a turn.
pub type CancelSignal = Arc<AtomicBool>;

/// Error returned while constructing/configuring a provider before any turn starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderInitError {
    message: String,
}

impl ProviderInitError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ProviderInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ProviderInitError {}

impl From<String> for ProviderInitError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// Token consumption reported by the remote model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl TokenUsage {
    #[must_use]
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }

    pub fn accumulate(&mut self, other: TokenUsage) {
        self.prompt_tokens = self.prompt_tokens.saturating_add(other.prompt_tokens);
        self.completion_tokens = self
            .completion_tokens
            .saturating_add(other.completion_tokens);
    }
}

/// Input required to stream one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnRequest {
    pub turn_id: TurnId,
    pub contents: Vec<WireContent>,
    pub system_instruction: Option<String>,
}

/// Provider-emitted unit of progress, in network order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    /// Incremental reply text.
    Text(String),
    /// Usage so far for this turn. Later values supersede earlier ones.
    Usage(TokenUsage),
}

/// Failure of a single provider turn.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("provider is not configured: {0}")]
    Configuration(String),
    #[error("{0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    Protocol(String),
    #[error("response blocked by safety filters: {0}")]
    SafetyBlocked(String),
    #[error("turn was cancelled")]
    Cancelled,
}

/// Immutable metadata describing a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderProfile {
    pub provider_id: String,
    pub model_id: String,
}

/// Provider interface for streaming one turn.
pub trait TurnProvider: Send + Sync + 'static {
    fn profile(&self) -> ProviderProfile;

    /// Reports whether a credential is available. Checked before any turn starts.
    fn credential_configured(&self) -> bool {
        true
    }

    /// Streams one turn, emitting events in the order the network produced them.
    ///
    /// Returns `Ok(())` only when the remote side completed the reply normally.
    /// Implementations must observe `cancel` and return
    /// [`ProviderError::Cancelled`] promptly once it is set.
    fn stream_turn(
        &self,
        req: TurnRequest,
        cancel: CancelSignal,
        emit: &mut dyn FnMut(ProviderEvent),
    ) -> Result<(), ProviderError>;
}
