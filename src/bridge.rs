//! Bounded hand-off between a turn worker thread and the event loop.
//!
//! The worker pushes text through a [`ChunkSender`]; the event loop pulls one
//! chunk at a time from the paired [`TurnStream`], normally from a background
//! waiter so the loop itself never blocks. Exactly one terminal chunk is
//! delivered per stream and nothing follows it.
//!
//! Cancellation and the worker's final decision are serialized through the
//! terminal slot: whichever happens first wins. A winning cancel decides the
//! outcome itself and runs the stream's cancel hook before the consumer can
//! observe it. A cancel that loses the race (the outcome was already decided)
//! is a no-op, and the real outcome is delivered instead.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use llm_provider::{CancelSignal, TurnId};

use crate::error::TurnError;

pub const DEFAULT_QUEUE_CAPACITY: usize = 20;

const POLL_INTERVAL: Duration = Duration::from_millis(25);
const MISSING_TERMINAL: &str = "provider exited without terminal event";

/// One unit delivered to the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamChunk {
    Text(String),
    Done,
    Error(TurnError),
}

impl StreamChunk {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Text(_))
    }
}

/// Discrete event handed to the interview controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Started { turn_id: TurnId },
    Chunk { turn_id: TurnId, text: String },
    Done { turn_id: TurnId },
    Failed { turn_id: TurnId, error: TurnError },
    Cancelled { turn_id: TurnId },
}

impl StreamEvent {
    pub fn turn_id(&self) -> TurnId {
        match self {
            Self::Started { turn_id }
            | Self::Done { turn_id }
            | Self::Cancelled { turn_id } => *turn_id,
            Self::Chunk { turn_id, .. } | Self::Failed { turn_id, .. } => *turn_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Done { .. } | Self::Failed { .. } | Self::Cancelled { .. }
        )
    }

    fn from_chunk(turn_id: TurnId, chunk: StreamChunk) -> Self {
        match chunk {
            StreamChunk::Text(text) => Self::Chunk { turn_id, text },
            StreamChunk::Done => Self::Done { turn_id },
            StreamChunk::Error(TurnError::Cancelled) => Self::Cancelled { turn_id },
            StreamChunk::Error(error) => Self::Failed { turn_id, error },
        }
    }
}

/// Runs once, under the terminal lock, when a cancel wins the race.
pub type CancelHook = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct TerminalSlot {
    outcome: Option<StreamChunk>,
    decided: bool,
    on_cancel: Option<CancelHook>,
}

struct Shared {
    terminal: Mutex<TerminalSlot>,
    cancel: CancelSignal,
}

impl Shared {
    fn request_cancel(&self) -> bool {
        let mut slot = lock_unpoisoned(&self.terminal);
        if slot.decided {
            return false;
        }
        slot.decided = true;
        slot.outcome = Some(StreamChunk::Error(TurnError::Cancelled));
        if let Some(hook) = slot.on_cancel.take() {
            hook();
        }
        // Set last so a consumer that sees the flag also sees the hook's work.
        self.cancel.store(true, Ordering::SeqCst);
        true
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

/// Creates a bounded stream for `turn_id`. A capacity of zero is raised to one.
///
/// `on_cancel` runs at most once, only if a cancel request decides the outcome.
pub fn channel(
    turn_id: TurnId,
    capacity: usize,
    cancel: CancelSignal,
    on_cancel: impl FnOnce() + Send + 'static,
) -> (ChunkSender, TurnStream) {
    let (tx, rx) = mpsc::sync_channel(capacity.max(1));
    let shared = Arc::new(Shared {
        terminal: Mutex::new(TerminalSlot {
            on_cancel: Some(Box::new(on_cancel)),
            ..TerminalSlot::default()
        }),
        cancel,
    });

    let sender = ChunkSender {
        tx: Some(tx),
        shared: Arc::clone(&shared),
    };
    let stream = TurnStream {
        turn_id,
        inner: Arc::new(StreamInner {
            rx: Mutex::new(rx),
            shared,
            closed: AtomicBool::new(false),
        }),
    };
    (sender, stream)
}

/// Producer half, owned by the turn worker.
pub struct ChunkSender {
    tx: Option<SyncSender<String>>,
    shared: Arc<Shared>,
}

impl ChunkSender {
    pub fn cancel_signal(&self) -> CancelSignal {
        Arc::clone(&self.shared.cancel)
    }

    /// Queues one fragment, waiting while the queue is full.
    ///
    /// Returns `false` once the stream was cancelled or the consumer is gone;
    /// the fragment is dropped in that case.
    pub fn send_text(&self, text: String) -> bool {
        let Some(tx) = self.tx.as_ref() else {
            return false;
        };
        if text.is_empty() {
            return true;
        }

        let mut pending = text;
        loop {
            if self.shared.is_cancelled() {
                return false;
            }
            match tx.try_send(pending) {
                Ok(()) => return true,
                Err(TrySendError::Full(text)) => {
                    pending = text;
                    thread::sleep(POLL_INTERVAL);
                }
                Err(TrySendError::Disconnected(_)) => return false,
            }
        }
    }

    /// Decides the terminal outcome and closes the stream.
    ///
    /// `decide` runs while cancellation is locked out and receives whether a
    /// cancel request already decided the outcome; its result is discarded in
    /// that case.
    pub fn finish_with(mut self, decide: impl FnOnce(bool) -> StreamChunk) {
        {
            let mut slot = lock_unpoisoned(&self.shared.terminal);
            let cancelled = slot.decided;
            let outcome = decide(cancelled);
            debug_assert!(outcome.is_terminal());
            if !cancelled {
                slot.outcome = Some(outcome);
                slot.decided = true;
            }
            slot.on_cancel = None;
        }
        self.tx.take();
    }
}

impl Drop for ChunkSender {
    fn drop(&mut self) {
        if self.tx.is_none() {
            return;
        }
        let mut slot = lock_unpoisoned(&self.shared.terminal);
        if !slot.decided {
            slot.outcome = Some(StreamChunk::Error(TurnError::Protocol(
                MISSING_TERMINAL.to_string(),
            )));
            slot.decided = true;
        }
        slot.on_cancel = None;
    }
}

struct StreamInner {
    rx: Mutex<Receiver<String>>,
    shared: Arc<Shared>,
    closed: AtomicBool,
}

impl Drop for StreamInner {
    fn drop(&mut self) {
        // Nobody is left to read the reply; stop the network work.
        self.shared.request_cancel();
    }
}

/// Consumer half and cancellation handle for one turn. Clones share state.
#[derive(Clone)]
pub struct TurnStream {
    turn_id: TurnId,
    inner: Arc<StreamInner>,
}

impl std::fmt::Debug for TurnStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnStream")
            .field("turn_id", &self.turn_id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl TurnStream {
    pub fn turn_id(&self) -> TurnId {
        self.turn_id
    }

    /// True once the terminal chunk has been handed out.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Requests cancellation. Idempotent, and a no-op after the outcome is decided.
    ///
    /// Returns whether this call is the one that cancelled the turn.
    pub fn cancel(&self) -> bool {
        self.inner.shared.request_cancel()
    }

    /// Blocks until the next chunk is available.
    ///
    /// Returns `None` after the terminal chunk was delivered.
    pub fn next_chunk(&self) -> Option<StreamChunk> {
        let rx = lock_unpoisoned(&self.inner.rx);
        if self.is_closed() {
            return None;
        }

        loop {
            if self.inner.shared.is_cancelled() {
                self.inner.closed.store(true, Ordering::SeqCst);
                return Some(StreamChunk::Error(TurnError::Cancelled));
            }

            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(text) => return Some(StreamChunk::Text(text)),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    self.inner.closed.store(true, Ordering::SeqCst);
                    let outcome = lock_unpoisoned(&self.inner.shared.terminal).outcome.take();
                    return Some(outcome.unwrap_or_else(|| {
                        StreamChunk::Error(TurnError::Protocol(MISSING_TERMINAL.to_string()))
                    }));
                }
            }
        }
    }

    /// [`TurnStream::next_chunk`] tagged with this stream's turn id.
    pub fn next_event(&self) -> Option<StreamEvent> {
        self.next_chunk()
            .map(|chunk| StreamEvent::from_chunk(self.turn_id, chunk))
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
