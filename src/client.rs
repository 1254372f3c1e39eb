//! Streaming chat client that owns the conversation history.
//!
//! Each turn appends the user prompt, replays the whole history to the
//! provider on a dedicated worker thread, and hands text back through a
//! [`TurnStream`]. A turn that ends in any error, cancellation included, is
//! rolled back so the history never keeps an unanswered prompt. Cancellation
//! rolls back on the cancelling thread, before the consumer sees `Cancelled`.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use llm_provider::{
    CancelSignal, History, HistoryEntry, HistoryMark, ProviderEvent, ProviderProfile, Role,
    TokenUsage, TurnId, TurnProvider, TurnRequest,
};

use crate::bridge::{self, ChunkSender, StreamChunk, TurnStream, DEFAULT_QUEUE_CAPACITY};
use crate::error::{BudgetPhase, TurnError};

/// Safety margin added to the character-based prompt estimate.
pub const TOKEN_ESTIMATION_MARGIN_PERCENT: u64 = 20;

const MISSING_CREDENTIAL: &str = "no API credential is configured (set GEMINI_API_KEY)";
const EMPTY_COMPLETION: &str = "response contained no text";

/// Rough token cost of `prompt`: one token per four bytes plus the margin.
pub fn estimate_prompt_tokens(prompt: &str) -> u64 {
    let base = (prompt.len() / 4) as u64;
    base + base * TOKEN_ESTIMATION_MARGIN_PERCENT / 100
}

#[derive(Debug, Clone)]
pub struct ChatClientOptions {
    /// Cumulative token budget. Zero disables both budget checks.
    pub token_limit: u64,
    pub system_instruction: Option<String>,
    pub queue_capacity: usize,
}

impl Default for ChatClientOptions {
    fn default() -> Self {
        Self {
            token_limit: 0,
            system_instruction: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

#[derive(Debug, Default)]
struct ClientState {
    history: History,
    current: TokenUsage,
    cumulative: TokenUsage,
    in_flight: Option<TurnId>,
}

pub struct ChatClient {
    provider: Arc<dyn TurnProvider>,
    state: Arc<Mutex<ClientState>>,
    options: ChatClientOptions,
    next_turn_id: TurnId,
}

impl ChatClient {
    pub fn new(provider: Arc<dyn TurnProvider>, options: ChatClientOptions) -> Self {
        Self {
            provider,
            state: Arc::new(Mutex::new(ClientState::default())),
            options,
            next_turn_id: 1,
        }
    }

    pub fn profile(&self) -> ProviderProfile {
        self.provider.profile()
    }

    pub fn token_limit(&self) -> u64 {
        self.options.token_limit
    }

    pub fn set_token_limit(&mut self, token_limit: u64) {
        self.options.token_limit = token_limit;
    }

    /// Starts one turn and returns the stream its reply arrives on.
    ///
    /// Fails without touching history or the network when a turn is already
    /// running, no credential is configured, or the estimated prompt cost
    /// would overrun the token budget.
    pub fn start_turn(&mut self, prompt: &str) -> Result<TurnStream, TurnError> {
        let turn_id = self.next_turn_id;

        let (request, mark) = {
            let mut state = lock_unpoisoned(&self.state);
            if state.in_flight.is_some() {
                return Err(TurnError::TurnInFlight);
            }
            if !self.provider.credential_configured() {
                return Err(TurnError::Configuration(MISSING_CREDENTIAL.to_string()));
            }
            if self.options.token_limit > 0 {
                let projected = state
                    .cumulative
                    .total()
                    .saturating_add(estimate_prompt_tokens(prompt));
                if projected > self.options.token_limit {
                    tracing::warn!(
                        turn_id,
                        projected,
                        limit = self.options.token_limit,
                        "turn rejected by token budget"
                    );
                    return Err(TurnError::BudgetExceeded {
                        phase: BudgetPhase::PreFlight,
                        used: projected,
                        limit: self.options.token_limit,
                    });
                }
            }

            let mark = state.history.mark();
            state.history.add(Role::User, prompt);
            state.in_flight = Some(turn_id);
            let request = TurnRequest {
                turn_id,
                contents: state.history.to_wire_format(),
                system_instruction: self.options.system_instruction.clone(),
            };
            (request, mark)
        };
        self.next_turn_id += 1;

        let cancel: CancelSignal = Arc::new(AtomicBool::new(false));
        let rollback_state = Arc::clone(&self.state);
        let (sender, stream) =
            bridge::channel(turn_id, self.options.queue_capacity, cancel, move || {
                let mut state = lock_unpoisoned(&rollback_state);
                if state.in_flight == Some(turn_id) {
                    let removed = state.history.rollback_to(mark);
                    state.in_flight = None;
                    tracing::info!(turn_id, removed, "turn cancelled; history rolled back");
                }
            });

        let worker = TurnWorker {
            provider: Arc::clone(&self.provider),
            state: Arc::clone(&self.state),
            token_limit: self.options.token_limit,
            mark,
        };
        tracing::info!(
            turn_id,
            history_len = request.contents.len(),
            "starting turn"
        );
        let spawned = thread::Builder::new()
            .name(format!("prepf-turn-{turn_id}"))
            .spawn(move || worker.run(request, sender));

        if let Err(error) = spawned {
            let mut state = lock_unpoisoned(&self.state);
            state.history.rollback_to(mark);
            state.in_flight = None;
            return Err(TurnError::Transport(format!(
                "failed to spawn turn worker: {error}"
            )));
        }

        Ok(stream)
    }

    pub fn is_turn_in_flight(&self) -> bool {
        lock_unpoisoned(&self.state).in_flight.is_some()
    }

    /// Starts a new logical conversation. Refused while a turn is streaming.
    pub fn clear_history(&mut self) -> Result<(), TurnError> {
        let mut state = lock_unpoisoned(&self.state);
        if state.in_flight.is_some() {
            return Err(TurnError::TurnInFlight);
        }
        state.history.clear();
        Ok(())
    }

    pub fn history_len(&self) -> usize {
        lock_unpoisoned(&self.state).history.count()
    }

    pub fn history_entries(&self) -> Vec<HistoryEntry> {
        lock_unpoisoned(&self.state).history.entries()
    }

    /// Usage reported for the most recent turn.
    pub fn current_usage(&self) -> TokenUsage {
        lock_unpoisoned(&self.state).current
    }

    pub fn cumulative_usage(&self) -> TokenUsage {
        lock_unpoisoned(&self.state).cumulative
    }

    pub fn reset_current_usage(&mut self) {
        lock_unpoisoned(&self.state).current = TokenUsage::default();
    }

    pub fn reset_cumulative_usage(&mut self) {
        let mut state = lock_unpoisoned(&self.state);
        state.current = TokenUsage::default();
        state.cumulative = TokenUsage::default();
    }

    pub fn usage_stats(&self) -> UsageStats {
        let state = lock_unpoisoned(&self.state);
        UsageStats {
            request: state.current,
            cumulative: state.cumulative,
            token_limit: self.options.token_limit,
        }
    }
}

struct TurnWorker {
    provider: Arc<dyn TurnProvider>,
    state: Arc<Mutex<ClientState>>,
    token_limit: u64,
    mark: HistoryMark,
}

impl TurnWorker {
    fn run(self, request: TurnRequest, sender: ChunkSender) {
        let turn_id = request.turn_id;
        let cancel = sender.cancel_signal();
        let mut reply = String::new();
        let mut usage: Option<TokenUsage> = None;

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            self.provider
                .stream_turn(request, Arc::clone(&cancel), &mut |event| match event {
                    ProviderEvent::Text(text) => {
                        if text.is_empty() {
                            return;
                        }
                        reply.push_str(&text);
                        sender.send_text(text);
                    }
                    // Usage is cumulative within a turn; keep only the latest.
                    ProviderEvent::Usage(reported) => usage = Some(reported),
                })
        }));

        let result = match outcome {
            Ok(Ok(())) if reply.trim().is_empty() => {
                Err(TurnError::Protocol(EMPTY_COMPLETION.to_string()))
            }
            Ok(Ok(())) => Ok(()),
            Ok(Err(error)) => Err(TurnError::from(error)),
            Err(_) => Err(TurnError::Transport("provider panicked".to_string())),
        };

        sender.finish_with(|cancelled| self.settle(turn_id, result, cancelled, reply, usage));
    }

    fn settle(
        &self,
        turn_id: TurnId,
        result: Result<(), TurnError>,
        cancelled: bool,
        reply: String,
        usage: Option<TokenUsage>,
    ) -> StreamChunk {
        let mut state = lock_unpoisoned(&self.state);

        // Tokens that were reported have been spent, whatever the outcome.
        if let Some(usage) = usage {
            state.current = usage;
            state.cumulative.accumulate(usage);
        }

        // The cancel path already rolled back and released the turn; a newer
        // turn may own the history by now.
        if cancelled {
            tracing::debug!(turn_id, "cancelled turn worker finished");
            return StreamChunk::Error(TurnError::Cancelled);
        }
        state.in_flight = None;

        let result = result.and_then(|()| {
            let used = state.cumulative.total();
            if self.token_limit > 0 && used > self.token_limit {
                Err(TurnError::BudgetExceeded {
                    phase: BudgetPhase::PostFlight,
                    used,
                    limit: self.token_limit,
                })
            } else {
                Ok(())
            }
        });

        match result {
            Ok(()) => {
                state.history.add(Role::Assistant, reply);
                tracing::info!(
                    turn_id,
                    history_len = state.history.count(),
                    "turn completed"
                );
                StreamChunk::Done
            }
            Err(error) => {
                let removed = state.history.rollback_to(self.mark);
                tracing::warn!(turn_id, removed, %error, "turn failed; history rolled back");
                StreamChunk::Error(error)
            }
        }
    }
}

/// Snapshot of token accounting for display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageStats {
    pub request: TokenUsage,
    pub cumulative: TokenUsage,
    pub token_limit: u64,
}

impl fmt::Display for UsageStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.request.total() > 0 {
            parts.push(format!(
                "Request: {} in, {} out",
                self.request.prompt_tokens, self.request.completion_tokens
            ));
        }
        if self.cumulative.total() > 0 {
            parts.push(format!(
                "Total: {} in, {} out ({})",
                self.cumulative.prompt_tokens,
                self.cumulative.completion_tokens,
                self.cumulative.total()
            ));
        }
        if self.token_limit > 0 {
            let used = self.cumulative.total();
            let percentage = used as f64 / self.token_limit as f64 * 100.0;
            parts.push(format!(
                "Limit: {used}/{} ({percentage:.1}%)",
                self.token_limit
            ));
        }

        if parts.is_empty() {
            f.write_str("Tokens: 0")
        } else {
            write!(f, "Tokens: {}", parts.join(" | "))
        }
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
