//! Deterministic mock implementation of the shared `llm_provider` contract.
//!
//! This crate contains no transport/protocol logic and is intended for
//! offline runs and contract-level integration testing.

use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use llm_provider::{
    CancelSignal, ProviderError, ProviderEvent, ProviderProfile, TokenUsage, TurnProvider,
    TurnRequest,
};

/// Stable provider identifier used for explicit startup selection.
pub const MOCK_PROVIDER_ID: &str = "mock";

const CANCEL_POLL: Duration = Duration::from_millis(10);

/// One pre-recorded provider outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedTurn {
    /// Streams `text` word by word, then reports `usage` if present.
    Reply {
        text: String,
        usage: Option<TokenUsage>,
    },
    /// Streams `partial` word by word, then fails.
    FailAfter {
        partial: String,
        error: ProviderError,
    },
    /// Emits nothing until the turn is cancelled.
    StallUntilCancelled,
    /// Panics inside the provider, as a crashed backend would.
    Panic,
}

impl ScriptedTurn {
    #[must_use]
    pub fn reply(text: impl Into<String>) -> Self {
        Self::Reply {
            text: text.into(),
            usage: None,
        }
    }

    #[must_use]
    pub fn reply_with_usage(text: impl Into<String>, usage: TokenUsage) -> Self {
        Self::Reply {
            text: text.into(),
            usage: Some(usage),
        }
    }

    #[must_use]
    pub fn fail(error: ProviderError) -> Self {
        Self::FailAfter {
            partial: String::new(),
            error,
        }
    }
}

#[derive(Debug, Default)]
struct ScriptState {
    turns: VecDeque<ScriptedTurn>,
    served: usize,
    requests: Vec<TurnRequest>,
}

/// Provider that replays scripted turns, then falls back to a canned interviewer.
#[derive(Debug)]
pub struct ScriptedProvider {
    state: Mutex<ScriptState>,
    token_delay: Duration,
    credential: bool,
}

impl ScriptedProvider {
    #[must_use]
    pub fn new(turns: Vec<ScriptedTurn>) -> Self {
        Self {
            state: Mutex::new(ScriptState {
                turns: turns.into(),
                ..ScriptState::default()
            }),
            token_delay: Duration::ZERO,
            credential: true,
        }
    }

    /// Unscripted provider that plays a short interview, for offline runs.
    #[must_use]
    pub fn interviewer() -> Self {
        Self::new(Vec::new()).with_token_delay(Duration::from_millis(30))
    }

    #[must_use]
    pub fn with_token_delay(mut self, delay: Duration) -> Self {
        self.token_delay = delay;
        self
    }

    /// Simulates a provider whose credential is missing.
    #[must_use]
    pub fn without_credential(mut self) -> Self {
        self.credential = false;
        self
    }

    pub fn push(&self, turn: ScriptedTurn) {
        lock_unpoisoned(&self.state).turns.push_back(turn);
    }

    /// Every request received so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<TurnRequest> {
        lock_unpoisoned(&self.state).requests.clone()
    }

    fn next_turn(&self, req: &TurnRequest) -> ScriptedTurn {
        let mut state = lock_unpoisoned(&self.state);
        state.requests.push(req.clone());
        let index = state.served;
        state.served += 1;
        match state.turns.pop_front() {
            Some(turn) => turn,
            None => ScriptedTurn::reply(canned_reply(index, req)),
        }
    }

    fn stream_words(
        &self,
        text: &str,
        cancel: &CancelSignal,
        emit: &mut dyn FnMut(ProviderEvent),
    ) -> Result<(), ProviderError> {
        let mut pending_token = String::new();
        for ch in text.chars() {
            pending_token.push(ch);
            if matches!(ch, ' ' | '\n') {
                self.emit_token(std::mem::take(&mut pending_token), cancel, emit)?;
            }
        }
        if !pending_token.is_empty() {
            self.emit_token(pending_token, cancel, emit)?;
        }
        Ok(())
    }

    fn emit_token(
        &self,
        token: String,
        cancel: &CancelSignal,
        emit: &mut dyn FnMut(ProviderEvent),
    ) -> Result<(), ProviderError> {
        if cancel.load(Ordering::SeqCst) {
            return Err(ProviderError::Cancelled);
        }
        emit(ProviderEvent::Text(token));
        if !self.token_delay.is_zero() {
            thread::sleep(self.token_delay);
        }
        Ok(())
    }
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::interviewer()
    }
}

impl TurnProvider for ScriptedProvider {
    fn profile(&self) -> ProviderProfile {
        ProviderProfile {
            provider_id: MOCK_PROVIDER_ID.to_string(),
            model_id: "mock-interviewer".to_string(),
        }
    }

    fn credential_configured(&self) -> bool {
        self.credential
    }

    fn stream_turn(
        &self,
        req: TurnRequest,
        cancel: CancelSignal,
        emit: &mut dyn FnMut(ProviderEvent),
    ) -> Result<(), ProviderError> {
        if cancel.load(Ordering::SeqCst) {
            return Err(ProviderError::Cancelled);
        }

        let prompt_chars: usize = req.contents.iter().map(|content| content.text.len()).sum();
        match self.next_turn(&req) {
            ScriptedTurn::Reply { text, usage } => {
                self.stream_words(&text, &cancel, emit)?;
                let usage = usage.unwrap_or_else(|| {
                    TokenUsage::new((prompt_chars / 4) as u64, (text.len() / 4) as u64)
                });
                emit(ProviderEvent::Usage(usage));
                Ok(())
            }
            ScriptedTurn::FailAfter { partial, error } => {
                self.stream_words(&partial, &cancel, emit)?;
                Err(error)
            }
            ScriptedTurn::StallUntilCancelled => loop {
                if cancel.load(Ordering::SeqCst) {
                    return Err(ProviderError::Cancelled);
                }
                thread::sleep(CANCEL_POLL);
            },
            ScriptedTurn::Panic => panic!("scripted provider panic"),
        }
    }
}

const QUESTION_BANK: [&str; 5] = [
    "Walk me through how a hash map handles collisions.",
    "How would you design a rate limiter for a public API?",
    "What trade-offs do you weigh when choosing between a B-tree and an LSM-tree?",
    "Explain how you would debug a deadlock in production.",
    "How do you decide where to draw service boundaries in a growing system?",
];

fn canned_reply(index: usize, req: &TurnRequest) -> String {
    let last_prompt = req
        .contents
        .last()
        .map(|content| content.text.to_ascii_lowercase())
        .unwrap_or_default();
    if last_prompt.starts_with("user surrenders") {
        return "No worries. The short version: think about the invariants first, then the data structure.".to_string();
    }

    match QUESTION_BANK.get(index) {
        Some(question) if index == 0 => format!("Let's begin. {question}"),
        Some(question) => format!("Good. Next question: {question} <NEXT>"),
        None => "That covers everything I wanted to ask. Thanks for your time. <ROAST>".to_string(),
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    use llm_provider::WireContent;
    use pretty_assertions::assert_eq;

    use super::*;

    fn request(prompt: &str) -> TurnRequest {
        TurnRequest {
            turn_id: 7,
            contents: vec![WireContent::user(prompt)],
            system_instruction: None,
        }
    }

    fn collect(
        provider: &ScriptedProvider,
        prompt: &str,
        cancel: CancelSignal,
    ) -> (String, Vec<ProviderEvent>, Result<(), ProviderError>) {
        let mut events = Vec::new();
        let result = provider.stream_turn(request(prompt), cancel, &mut |event| events.push(event));
        let text = events
            .iter()
            .filter_map(|event| match event {
                ProviderEvent::Text(text) => Some(text.as_str()),
                ProviderEvent::Usage(_) => None,
            })
            .collect();
        (text, events, result)
    }

    #[test]
    fn profile_exposes_explicit_mock_provider_identity() {
        let profile = ScriptedProvider::new(Vec::new()).profile();
        assert_eq!(profile.provider_id, MOCK_PROVIDER_ID);
        assert!(ScriptedProvider::new(Vec::new()).credential_configured());
        assert!(!ScriptedProvider::new(Vec::new())
            .without_credential()
            .credential_configured());
    }

    #[test]
    fn reply_streams_word_tokens_then_usage() {
        let provider = ScriptedProvider::new(vec![ScriptedTurn::reply_with_usage(
            "one two",
            TokenUsage::new(3, 2),
        )]);

        let (text, events, result) = collect(&provider, "hi", Arc::new(AtomicBool::new(false)));

        assert_eq!(result, Ok(()));
        assert_eq!(text, "one two");
        assert_eq!(
            events,
            vec![
                ProviderEvent::Text("one ".to_string()),
                ProviderEvent::Text("two".to_string()),
                ProviderEvent::Usage(TokenUsage::new(3, 2)),
            ]
        );
        assert_eq!(provider.requests().len(), 1);
    }

    #[test]
    fn fail_after_streams_partial_text_then_errors() {
        let provider = ScriptedProvider::new(vec![ScriptedTurn::FailAfter {
            partial: "half".to_string(),
            error: ProviderError::Transport("connection reset".to_string()),
        }]);

        let (text, _, result) = collect(&provider, "hi", Arc::new(AtomicBool::new(false)));

        assert_eq!(text, "half");
        assert_eq!(
            result,
            Err(ProviderError::Transport("connection reset".to_string()))
        );
    }

    #[test]
    fn cancelled_before_start_reports_cancelled() {
        let provider = ScriptedProvider::new(vec![ScriptedTurn::reply("ignored")]);
        let (_, events, result) = collect(&provider, "hi", Arc::new(AtomicBool::new(true)));

        assert!(events.is_empty());
        assert_eq!(result, Err(ProviderError::Cancelled));
    }

    #[test]
    fn stall_returns_once_cancel_is_set() {
        let provider = Arc::new(ScriptedProvider::new(vec![ScriptedTurn::StallUntilCancelled]));
        let cancel: CancelSignal = Arc::new(AtomicBool::new(false));

        let worker = {
            let provider = Arc::clone(&provider);
            let cancel = Arc::clone(&cancel);
            thread::spawn(move || provider.stream_turn(request("hi"), cancel, &mut |_| {}))
        };
        thread::sleep(Duration::from_millis(30));
        cancel.store(true, Ordering::SeqCst);

        let result = worker.join().expect("stalled worker should not panic");
        assert_eq!(result, Err(ProviderError::Cancelled));
    }

    #[test]
    fn unscripted_turns_play_a_short_interview() {
        let provider = ScriptedProvider::new(Vec::new());
        let no_cancel = || Arc::new(AtomicBool::new(false));

        let (first, _, _) = collect(&provider, "start", no_cancel());
        assert!(first.starts_with("Let's begin."));
        assert!(!first.contains("<NEXT>"));

        let (second, _, _) = collect(&provider, "my answer", no_cancel());
        assert!(second.ends_with("<NEXT>"));

        let (feedback, _, _) = collect(
            &provider,
            "User surrenders. Give a snappy 1-2 sentence correction and move on.",
            no_cancel(),
        );
        assert!(!feedback.contains("<NEXT>"));

        for _ in 0..QUESTION_BANK.len() {
            collect(&provider, "answer", no_cancel());
        }
        let (last, _, _) = collect(&provider, "answer", no_cancel());
        assert!(last.ends_with("<ROAST>"));
    }
}
