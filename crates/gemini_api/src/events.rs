use serde::{Deserialize, Serialize};

/// Why a candidate stopped producing text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinishReason {
    Stop,
    MaxTokens,
    Safety,
    Recitation,
    Blocklist,
    ProhibitedContent,
    Spii,
    Other(String),
}

impl FinishReason {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "STOP" => Self::Stop,
            "MAX_TOKENS" => Self::MaxTokens,
            "SAFETY" => Self::Safety,
            "RECITATION" => Self::Recitation,
            "BLOCKLIST" => Self::Blocklist,
            "PROHIBITED_CONTENT" => Self::ProhibitedContent,
            "SPII" => Self::Spii,
            other => Self::Other(other.to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Stop => "STOP",
            Self::MaxTokens => "MAX_TOKENS",
            Self::Safety => "SAFETY",
            Self::Recitation => "RECITATION",
            Self::Blocklist => "BLOCKLIST",
            Self::ProhibitedContent => "PROHIBITED_CONTENT",
            Self::Spii => "SPII",
            Self::Other(value) => value,
        }
    }

    /// Reasons produced by content filtering.
    pub fn is_safety(&self) -> bool {
        matches!(
            self,
            Self::Safety | Self::Blocklist | Self::ProhibitedContent | Self::Spii
        )
    }

    /// Reasons after which the accumulated text is a usable reply.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Stop | Self::MaxTokens)
    }
}

/// Token accounting reported alongside stream chunks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageMetadata {
    pub prompt_token_count: u64,
    pub candidates_token_count: u64,
    pub total_token_count: u64,
}

/// Stream event emitted by the parser after normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GeminiStreamEvent {
    TextDelta {
        text: String,
    },
    Usage(UsageMetadata),
    Finished {
        reason: FinishReason,
    },
    PromptBlocked {
        reason: String,
    },
    Error {
        code: Option<i64>,
        status: Option<String>,
        message: Option<String>,
    },
}
