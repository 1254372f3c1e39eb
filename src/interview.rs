//! Interview session controller.
//!
//! `InterviewSession` is mutated only by the event loop. Everything that
//! leaves the process (model turns, resume loading, rendering, shutdown) goes
//! through [`HostOps`], so the controller can be driven directly in tests.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use llm_provider::TurnId;

use crate::bridge::StreamEvent;
use crate::commands::{parse_slash_command, SlashCommand, HELP_TEXT};
use crate::context::ContextError;
use crate::error::TurnError;
use crate::grade::ReportCard;
use crate::prompts::{answer_prompt, initial_prompt, CONTINUE_PROMPT, SURRENDER_PROMPT};
use crate::signals::parse_signals;
use crate::topics::TopicSelection;

pub const DEFAULT_MAX_QUESTIONS: u32 = 10;
pub const DEFAULT_MAX_DURATION: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLimits {
    pub max_questions: u32,
    pub max_duration: Duration,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_questions: DEFAULT_MAX_QUESTIONS,
            max_duration: DEFAULT_MAX_DURATION,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPurpose {
    /// The model is asking (or following up on) a question.
    Question,
    /// The model is correcting a surrendered question.
    SurrenderFeedback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnStatus {
    Streaming { turn_id: TurnId },
    Failed { error: TurnError },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub purpose: TurnPurpose,
    pub prompt: String,
    pub status: TurnStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterviewState {
    Configuring,
    Waiting,
    Thinking(Turn),
    AwaitingAnswer,
    Grading(ReportCard),
}

impl InterviewState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Configuring => "configuring",
            Self::Waiting => "waiting",
            Self::Thinking(turn) => match turn.purpose {
                TurnPurpose::Question => "thinking",
                TurnPurpose::SurrenderFeedback => "surrender-feedback",
            },
            Self::AwaitingAnswer => "awaiting-answer",
            Self::Grading(_) => "grading",
        }
    }
}

pub trait HostOps {
    fn start_turn(&mut self, prompt: String) -> Result<TurnId, TurnError>;
    /// Arms exactly one wait; its result comes back as one [`StreamEvent`].
    fn await_next_chunk(&mut self, turn_id: TurnId);
    fn cancel_turn(&mut self, turn_id: TurnId);
    /// Loads resume text in the background; the result comes back through
    /// [`InterviewSession::on_context_loaded`].
    fn load_context(&mut self, path: Option<PathBuf>);
    fn request_render(&mut self);
    fn request_stop(&mut self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterviewSession {
    state: InterviewState,
    limits: SessionLimits,
    started_at: Option<Instant>,
    resume_path: Option<PathBuf>,
    resume: String,
    topics: TopicSelection,
    question_count: u32,
    surrender_count: u32,
    buffer: String,
    current_question: String,
    micro_feedback: Option<String>,
    notices: Vec<String>,
    should_exit: bool,
}

impl InterviewSession {
    pub fn new(limits: SessionLimits, resume_path: Option<PathBuf>) -> Self {
        Self {
            state: InterviewState::Configuring,
            limits,
            started_at: None,
            resume_path,
            resume: String::new(),
            topics: TopicSelection::default(),
            question_count: 0,
            surrender_count: 0,
            buffer: String::new(),
            current_question: String::new(),
            micro_feedback: None,
            notices: Vec::new(),
            should_exit: false,
        }
    }

    pub fn state(&self) -> &InterviewState {
        &self.state
    }

    pub fn limits(&self) -> SessionLimits {
        self.limits
    }

    pub fn topics(&self) -> &TopicSelection {
        &self.topics
    }

    pub fn question_count(&self) -> u32 {
        self.question_count
    }

    pub fn surrender_count(&self) -> u32 {
        self.surrender_count
    }

    /// Raw text streamed so far for the current turn.
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Last question text with control markers removed.
    pub fn current_question(&self) -> &str {
        &self.current_question
    }

    pub fn micro_feedback(&self) -> Option<&str> {
        self.micro_feedback.as_deref()
    }

    pub fn resume(&self) -> &str {
        &self.resume
    }

    /// Informational and error lines, oldest first.
    pub fn notices(&self) -> &[String] {
        &self.notices
    }

    pub fn should_exit(&self) -> bool {
        self.should_exit
    }

    pub fn active_turn_id(&self) -> Option<TurnId> {
        match &self.state {
            InterviewState::Thinking(Turn {
                status: TurnStatus::Streaming { turn_id },
                ..
            }) => Some(*turn_id),
            _ => None,
        }
    }

    pub fn report(&self) -> Option<&ReportCard> {
        match &self.state {
            InterviewState::Grading(report) => Some(report),
            _ => None,
        }
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        self.started_at
            .map(|started_at| now.saturating_duration_since(started_at))
            .unwrap_or_default()
    }

    /// True once the next answer would use up the question allowance.
    pub fn is_final_question(&self) -> bool {
        self.question_count.saturating_add(1) >= self.limits.max_questions
    }

    pub fn is_limit_reached(&self, now: Instant) -> bool {
        self.question_count >= self.limits.max_questions || self.is_time_up(now)
    }

    fn is_time_up(&self, now: Instant) -> bool {
        self.started_at.is_some() && self.elapsed(now) >= self.limits.max_duration
    }

    /// `Question n/max | Time: mm:ss`, flagged on the final question.
    pub fn status_line(&self, now: Instant) -> String {
        let elapsed = self.elapsed(now).as_secs();
        let mut status = format!(
            "Question {}/{} | Time: {:02}:{:02}",
            self.question_count,
            self.limits.max_questions,
            elapsed / 60,
            elapsed % 60
        );
        if self.is_final_question() && !matches!(self.state, InterviewState::Grading(_)) {
            status.push_str(" | [FINAL QUESTION]");
        }
        status
    }

    /// Handles one submitted line: slash commands anywhere, answers while awaiting one.
    pub fn on_input(&mut self, line: &str, now: Instant, host: &mut dyn HostOps) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        if let Some(command) = parse_slash_command(line) {
            self.on_command(command, now, host);
            return;
        }

        match self.state {
            InterviewState::AwaitingAnswer => self.on_answer_submit(line, host),
            InterviewState::Configuring => {
                self.push_notice("Pick topics with /focus and /exclude, then /start (or /skip).");
                host.request_render();
            }
            InterviewState::Waiting | InterviewState::Thinking(_) => {
                self.push_notice("The interviewer is still talking. Wait for the question.");
                host.request_render();
            }
            InterviewState::Grading(_) => {
                self.push_notice("The interview is over. Type /quit to exit.");
                host.request_render();
            }
        }
    }

    fn on_command(&mut self, command: SlashCommand, now: Instant, host: &mut dyn HostOps) {
        match command {
            SlashCommand::Help => {
                self.push_notice(HELP_TEXT);
                host.request_render();
            }
            SlashCommand::Quit => self.on_quit(host),
            SlashCommand::Skip => self.on_config_skipped(now, host),
            SlashCommand::Start => self.on_config_submitted(now, host),
            SlashCommand::Focus(topics) => self.on_topics_changed(topics, true, host),
            SlashCommand::Exclude(topics) => self.on_topics_changed(topics, false, host),
            SlashCommand::Surrender => self.on_surrender(host),
            SlashCommand::Retry => self.on_retry(host),
            SlashCommand::Unknown(command) => {
                self.push_notice(format!("Unknown command: {command}"));
                host.request_render();
            }
        }
    }

    fn on_topics_changed(&mut self, topics: Vec<String>, focus: bool, host: &mut dyn HostOps) {
        if self.state != InterviewState::Configuring {
            self.push_notice("Topics can only be changed before the interview starts.");
            host.request_render();
            return;
        }

        let names: Vec<&str> = topics.iter().map(String::as_str).collect();
        let result = if focus {
            self.topics.set_focus(&names)
        } else {
            self.topics.set_exclude(&names)
        };
        match result {
            Ok(()) if focus => self.push_notice(format!("Focus: {}", describe(self.topics.focus()))),
            Ok(()) => self.push_notice(format!("Exclude: {}", describe(self.topics.exclude()))),
            Err(error) => self.push_notice(format!("Topic error: {error}")),
        }
        host.request_render();
    }

    /// Finishes configuration with the chosen topics and starts loading the resume.
    pub fn on_config_submitted(&mut self, now: Instant, host: &mut dyn HostOps) {
        if self.state != InterviewState::Configuring {
            self.push_notice("The interview has already started.");
            host.request_render();
            return;
        }
        self.begin_waiting(now, host);
    }

    /// Finishes configuration with every topic allowed.
    pub fn on_config_skipped(&mut self, now: Instant, host: &mut dyn HostOps) {
        if self.state != InterviewState::Configuring {
            self.push_notice("The interview has already started.");
            host.request_render();
            return;
        }
        self.topics = TopicSelection::default();
        self.begin_waiting(now, host);
    }

    fn begin_waiting(&mut self, now: Instant, host: &mut dyn HostOps) {
        self.started_at = Some(now);
        self.transition(InterviewState::Waiting);
        host.load_context(self.resume_path.clone());
        host.request_render();
    }

    /// Resume text arrived (or failed to); the interview starts either way.
    pub fn on_context_loaded(
        &mut self,
        result: Result<String, ContextError>,
        host: &mut dyn HostOps,
    ) {
        if self.state != InterviewState::Waiting {
            return;
        }

        self.resume = match result {
            Ok(resume) => resume,
            Err(error) => {
                tracing::warn!(%error, "continuing without resume");
                self.push_notice(format!("Could not load resume ({error}); continuing without it."));
                String::new()
            }
        };

        let prompt = initial_prompt(&self.resume, &self.topics.instructions());
        self.begin_turn(TurnPurpose::Question, prompt, host);
        host.request_render();
    }

    pub fn on_stream_event(&mut self, event: StreamEvent, now: Instant, host: &mut dyn HostOps) {
        match event {
            StreamEvent::Started { turn_id } => self.on_stream_started(turn_id, host),
            StreamEvent::Chunk { turn_id, text } => self.on_stream_chunk(turn_id, &text, host),
            StreamEvent::Done { turn_id } => self.on_stream_done(turn_id, now, host),
            StreamEvent::Failed { turn_id, error } => self.on_stream_failed(turn_id, error, host),
            StreamEvent::Cancelled { turn_id } => {
                self.on_stream_failed(turn_id, TurnError::Cancelled, host)
            }
        }
    }

    pub fn on_stream_started(&mut self, turn_id: TurnId, host: &mut dyn HostOps) {
        if !self.is_active_turn(turn_id) {
            return;
        }
        host.await_next_chunk(turn_id);
        host.request_render();
    }

    pub fn on_stream_chunk(&mut self, turn_id: TurnId, text: &str, host: &mut dyn HostOps) {
        if !self.is_active_turn(turn_id) {
            return;
        }
        self.buffer.push_str(text);
        host.await_next_chunk(turn_id);
        host.request_render();
    }

    pub fn on_stream_done(&mut self, turn_id: TurnId, now: Instant, host: &mut dyn HostOps) {
        if !self.is_active_turn(turn_id) {
            return;
        }
        let purpose = match &self.state {
            InterviewState::Thinking(turn) => turn.purpose,
            _ => return,
        };

        let parsed = parse_signals(&self.buffer);
        match purpose {
            TurnPurpose::SurrenderFeedback => {
                self.micro_feedback = Some(parsed.content).filter(|text| !text.is_empty());
                if self.is_limit_reached(now) {
                    self.grade(None);
                } else {
                    self.begin_turn(TurnPurpose::Question, CONTINUE_PROMPT.to_string(), host);
                }
            }
            TurnPurpose::Question => {
                self.current_question = parsed.content;
                if parsed.has_roast {
                    let closing = self.current_question.clone();
                    self.grade(Some(&closing));
                } else if self.is_limit_reached(now) {
                    self.grade(None);
                } else {
                    self.transition(InterviewState::AwaitingAnswer);
                }
            }
        }
        host.request_render();
    }

    /// The turn ended without a reply. The session waits in `Thinking` for
    /// `/retry` or `/quit`; history was already rolled back by the client.
    pub fn on_stream_failed(&mut self, turn_id: TurnId, error: TurnError, host: &mut dyn HostOps) {
        if !self.is_active_turn(turn_id) {
            return;
        }
        let InterviewState::Thinking(turn) = &mut self.state else {
            return;
        };

        tracing::warn!(turn_id, %error, "turn failed");
        self.notices.push(format!(
            "Error: {error}. Type /retry to try again or /quit to exit."
        ));
        turn.status = TurnStatus::Failed { error };
        host.request_render();
    }

    pub fn on_answer_submit(&mut self, answer: &str, host: &mut dyn HostOps) {
        if self.state != InterviewState::AwaitingAnswer {
            return;
        }
        let answer = answer.trim();
        if answer.is_empty() {
            return;
        }

        self.question_count += 1;
        self.micro_feedback = None;
        self.begin_turn(TurnPurpose::Question, answer_prompt(answer), host);
        host.request_render();
    }

    /// Gives up on the current question. Counts as a question and a surrender.
    pub fn on_surrender(&mut self, host: &mut dyn HostOps) {
        if self.state != InterviewState::AwaitingAnswer {
            self.push_notice("There is no open question to surrender.");
            host.request_render();
            return;
        }

        self.surrender_count += 1;
        self.question_count += 1;
        self.micro_feedback = None;
        self.begin_turn(
            TurnPurpose::SurrenderFeedback,
            SURRENDER_PROMPT.to_string(),
            host,
        );
        host.request_render();
    }

    /// Re-sends the prompt of a failed turn.
    pub fn on_retry(&mut self, host: &mut dyn HostOps) {
        let retry = match &self.state {
            InterviewState::Thinking(Turn {
                purpose,
                prompt,
                status: TurnStatus::Failed { .. },
            }) => Some((*purpose, prompt.clone())),
            _ => None,
        };

        match retry {
            Some((purpose, prompt)) => self.begin_turn(purpose, prompt, host),
            None => self.push_notice("Nothing to retry."),
        }
        host.request_render();
    }

    /// Periodic timer. Only the time limit is checked here.
    pub fn on_tick(&mut self, now: Instant, host: &mut dyn HostOps) {
        if matches!(
            self.state,
            InterviewState::Configuring | InterviewState::Grading(_)
        ) {
            return;
        }
        if !self.is_time_up(now) {
            return;
        }

        if let Some(turn_id) = self.active_turn_id() {
            host.cancel_turn(turn_id);
        }
        tracing::info!(elapsed_secs = self.elapsed(now).as_secs(), "session time limit reached");
        self.grade(None);
        host.request_render();
    }

    pub fn on_quit(&mut self, host: &mut dyn HostOps) {
        if let Some(turn_id) = self.active_turn_id() {
            host.cancel_turn(turn_id);
        }
        self.should_exit = true;
        host.request_stop();
        host.request_render();
    }

    fn begin_turn(&mut self, purpose: TurnPurpose, prompt: String, host: &mut dyn HostOps) {
        self.buffer.clear();
        let status = match host.start_turn(prompt.clone()) {
            Ok(turn_id) => TurnStatus::Streaming { turn_id },
            Err(error) => {
                tracing::warn!(%error, "turn could not start");
                self.push_notice(format!(
                    "Error: {error}. Type /retry to try again or /quit to exit."
                ));
                TurnStatus::Failed { error }
            }
        };
        self.transition(InterviewState::Thinking(Turn {
            purpose,
            prompt,
            status,
        }));
    }

    fn grade(&mut self, closing_remarks: Option<&str>) {
        let report = ReportCard::new(self.question_count, self.surrender_count, closing_remarks);
        tracing::info!(
            grade = report.grade.letter(),
            questions = self.question_count,
            surrenders = self.surrender_count,
            "interview graded"
        );
        self.transition(InterviewState::Grading(report));
    }

    fn transition(&mut self, next: InterviewState) {
        tracing::debug!(from = self.state.label(), to = next.label(), "interview state change");
        self.state = next;
    }

    fn is_active_turn(&self, turn_id: TurnId) -> bool {
        self.active_turn_id() == Some(turn_id)
    }

    fn push_notice(&mut self, notice: impl Into<String>) {
        self.notices.push(notice.into());
    }
}

fn describe(topics: &[String]) -> String {
    if topics.is_empty() {
        "(none)".to_string()
    } else {
        topics.join(", ")
    }
}
