//! Terminal mock-interview coach.
//!
//! ## Layout
//!
//! - [`client`] owns the conversation history and streams one turn at a time
//!   from an `llm_provider::TurnProvider` on a worker thread.
//! - [`bridge`] carries the streamed text to the event loop and serializes
//!   cancellation against the worker's final outcome.
//! - [`interview`] is the session state machine. It never blocks; all side
//!   effects go through [`interview::HostOps`].
//! - [`runtime`] implements `HostOps` and runs the single-threaded event loop.
//!
//! ## Conversation contract
//!
//! A turn that fails or is cancelled leaves the history exactly as it was
//! before the turn started. The model ends a question with `<NEXT>` and ends
//! the interview with `<ROAST>`; both markers are stripped before display.
//!
//! ## Provider bootstrap
//!
//! `prepf mock --provider gemini` (the default) requires `GEMINI_API_KEY` or
//! an `api_key` entry in `~/.config/prepf/config.json`. `--provider mock`
//! plays a canned interview offline. See [`config`] for the file format.

pub mod bridge;
pub mod client;
pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod grade;
pub mod interview;
pub mod logging;
pub mod prompts;
pub mod providers;
pub mod runtime;
pub mod signals;
pub mod topics;
pub mod tui;

pub use crate::client::{ChatClient, ChatClientOptions, UsageStats};
pub use crate::error::{BudgetPhase, TurnError};
pub use crate::grade::{Grade, ReportCard};
pub use crate::interview::{HostOps, InterviewSession, InterviewState, SessionLimits};
