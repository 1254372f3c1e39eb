//! Transport-only Gemini API client primitives.
//!
//! This crate owns request building, SSE parsing, and error mapping for the
//! `streamGenerateContent` endpoint only. It holds no conversation state and
//! has no UI coupling.
//!
//! Streams are normalized into [`GeminiStreamEvent`] values in network order.
//! Safety-filtered candidates and blocked prompts abort the stream with
//! [`GeminiApiError::SafetyBlocked`].

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod headers;
pub mod payload;
pub mod retry;
pub mod sse;
pub mod url;

pub use client::{CancellationSignal, GeminiApiClient, StreamResult};
pub use config::GeminiApiConfig;
pub use error::GeminiApiError;
pub use events::{FinishReason, GeminiStreamEvent, UsageMetadata};
pub use payload::{Content, GenerateContentRequest, GenerationConfig, Part, SafetySetting};
pub use sse::SseStreamParser;
pub use url::stream_endpoint;
