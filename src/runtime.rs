//! Single-threaded event loop and the host side of [`HostOps`].
//!
//! Background threads (stdin reader, ticker, resume loader, chunk waiter)
//! only produce [`AppEvent`]s; the session is mutated on the loop thread.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};

use llm_provider::TurnId;

use crate::bridge::{StreamEvent, TurnStream};
use crate::client::ChatClient;
use crate::context::{load_context, ContextError};
use crate::error::TurnError;
use crate::interview::{HostOps, InterviewSession};
use crate::tui::Presenter;

pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub enum AppEvent {
    Input(String),
    InputClosed,
    Tick,
    ContextLoaded(Result<String, ContextError>),
    Stream(StreamEvent),
}

/// Owns the chat client and turns host requests into background work.
pub struct RuntimeHost {
    client: ChatClient,
    events: Sender<AppEvent>,
    waiter: Sender<TurnStream>,
    active: Option<TurnStream>,
    render_requested: bool,
    stop_requested: bool,
}

impl RuntimeHost {
    pub fn new(client: ChatClient, events: Sender<AppEvent>) -> io::Result<Self> {
        let waiter = spawn_chunk_waiter(events.clone())?;
        Ok(Self {
            client,
            events,
            waiter,
            active: None,
            render_requested: false,
            stop_requested: false,
        })
    }

    pub fn client(&self) -> &ChatClient {
        &self.client
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested
    }

    pub fn take_render_request(&mut self) -> bool {
        std::mem::take(&mut self.render_requested)
    }

    fn active_stream(&self, turn_id: TurnId) -> Option<&TurnStream> {
        self.active
            .as_ref()
            .filter(|stream| stream.turn_id() == turn_id)
    }

    fn send(&self, event: AppEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("event loop is gone; dropping event");
        }
    }
}

impl HostOps for RuntimeHost {
    fn start_turn(&mut self, prompt: String) -> Result<TurnId, TurnError> {
        let stream = self.client.start_turn(&prompt)?;
        let turn_id = stream.turn_id();
        self.active = Some(stream);
        self.send(AppEvent::Stream(StreamEvent::Started { turn_id }));
        Ok(turn_id)
    }

    fn await_next_chunk(&mut self, turn_id: TurnId) {
        let Some(stream) = self.active_stream(turn_id).cloned() else {
            return;
        };
        if self.waiter.send(stream).is_err() {
            tracing::warn!(turn_id, "chunk waiter is gone");
        }
    }

    fn cancel_turn(&mut self, turn_id: TurnId) {
        if let Some(stream) = self.active_stream(turn_id) {
            if stream.cancel() {
                tracing::info!(turn_id, "turn cancellation requested");
            }
        }
    }

    fn load_context(&mut self, path: Option<PathBuf>) {
        let events = self.events.clone();
        let spawned = thread::Builder::new()
            .name("prepf-context".to_string())
            .spawn(move || {
                let result = match path {
                    Some(path) => load_context(&path),
                    None => Ok(String::new()),
                };
                let _ = events.send(AppEvent::ContextLoaded(result));
            });

        if let Err(error) = spawned {
            tracing::warn!(%error, "failed to spawn context loader; continuing without resume");
            self.send(AppEvent::ContextLoaded(Ok(String::new())));
        }
    }

    fn request_render(&mut self) {
        self.render_requested = true;
    }

    fn request_stop(&mut self) {
        self.stop_requested = true;
    }
}

/// One background thread serves every wait request in order.
fn spawn_chunk_waiter(events: Sender<AppEvent>) -> io::Result<Sender<TurnStream>> {
    let (tx, rx) = mpsc::channel::<TurnStream>();
    thread::Builder::new()
        .name("prepf-chunk-waiter".to_string())
        .spawn(move || {
            for stream in rx {
                if let Some(event) = stream.next_event() {
                    if events.send(AppEvent::Stream(event)).is_err() {
                        break;
                    }
                }
            }
        })?;
    Ok(tx)
}

pub fn spawn_input_reader(events: Sender<AppEvent>) -> io::Result<()> {
    thread::Builder::new()
        .name("prepf-input".to_string())
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(line) => {
                        if events.send(AppEvent::Input(line)).is_err() {
                            return;
                        }
                    }
                    Err(_) => break,
                }
            }
            let _ = events.send(AppEvent::InputClosed);
        })?;
    Ok(())
}

pub fn spawn_ticker(events: Sender<AppEvent>, interval: Duration) -> io::Result<()> {
    thread::Builder::new()
        .name("prepf-ticker".to_string())
        .spawn(move || loop {
            thread::sleep(interval);
            if events.send(AppEvent::Tick).is_err() {
                return;
            }
        })?;
    Ok(())
}

pub struct EventLoop<W: Write> {
    session: InterviewSession,
    host: RuntimeHost,
    events: Receiver<AppEvent>,
    presenter: Presenter<W>,
}

impl<W: Write> EventLoop<W> {
    pub fn new(
        session: InterviewSession,
        host: RuntimeHost,
        events: Receiver<AppEvent>,
        presenter: Presenter<W>,
    ) -> Self {
        Self {
            session,
            host,
            events,
            presenter,
        }
    }

    pub fn session(&self) -> &InterviewSession {
        &self.session
    }

    /// Applies one event to the session and renders if it asked for it.
    pub fn dispatch(&mut self, event: AppEvent) -> io::Result<()> {
        let now = Instant::now();
        match event {
            AppEvent::Input(line) => self.session.on_input(&line, now, &mut self.host),
            AppEvent::InputClosed => self.session.on_quit(&mut self.host),
            AppEvent::Tick => self.session.on_tick(now, &mut self.host),
            AppEvent::ContextLoaded(result) => {
                self.session.on_context_loaded(result, &mut self.host)
            }
            AppEvent::Stream(event) => self.session.on_stream_event(event, now, &mut self.host),
        }

        if self.host.take_render_request() {
            self.render(now)?;
        }
        Ok(())
    }

    pub fn render(&mut self, now: Instant) -> io::Result<()> {
        let usage = self.host.client().usage_stats();
        self.presenter.render(&self.session, usage, now)
    }

    /// Dispatches events until `done` holds or the loop has to stop.
    pub fn run_until(&mut self, mut done: impl FnMut(&InterviewSession) -> bool) -> io::Result<()> {
        while !self.host.stop_requested() && !done(&self.session) {
            let Ok(event) = self.events.recv() else {
                break;
            };
            self.dispatch(event)?;
        }
        Ok(())
    }

    /// Runs the whole session and hands back its final state and the writer.
    pub fn run(mut self) -> io::Result<(InterviewSession, W)> {
        self.render(Instant::now())?;
        self.run_until(InterviewSession::should_exit)?;

        if let Some(turn_id) = self.session.active_turn_id() {
            self.host.cancel_turn(turn_id);
        }
        Ok((self.session, self.presenter.into_inner()))
    }
}
