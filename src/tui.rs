//! Line-oriented terminal presenter.
//!
//! Output is append-only: each render prints whatever changed since the last
//! one (new notices, newly streamed text, a state the user has not seen yet).

use std::io::{self, Write};
use std::time::Instant;

use llm_provider::{ProviderProfile, TurnId};

use crate::client::UsageStats;
use crate::grade::ReportCard;
use crate::interview::{InterviewSession, InterviewState, TurnPurpose, TurnStatus};
use crate::signals::{strip_markers, visible_text};
use crate::topics::VALID_INTERVIEW_TOPICS;

#[derive(Debug, Clone, Copy)]
struct Palette {
    color: bool,
}

impl Palette {
    fn wrap(self, text: &str, prefix: &str, suffix: &str) -> String {
        if self.color {
            format!("{prefix}{text}{suffix}")
        } else {
            text.to_string()
        }
    }

    fn dim(self, text: &str) -> String {
        self.wrap(text, "\x1b[2m", "\x1b[22m")
    }

    fn bold(self, text: &str) -> String {
        self.wrap(text, "\x1b[1m", "\x1b[22m")
    }

    fn cyan(self, text: &str) -> String {
        self.wrap(text, "\x1b[36m", "\x1b[39m")
    }

    fn yellow(self, text: &str) -> String {
        self.wrap(text, "\x1b[33m", "\x1b[39m")
    }

    fn red(self, text: &str) -> String {
        self.wrap(text, "\x1b[31m", "\x1b[39m")
    }

    fn green(self, text: &str) -> String {
        self.wrap(text, "\x1b[32m", "\x1b[39m")
    }
}

#[derive(Debug, Default)]
struct StreamCursor {
    turn_id: TurnId,
    printed: usize,
}

pub struct Presenter<W: Write> {
    out: W,
    palette: Palette,
    printed_notices: usize,
    last_state: Option<&'static str>,
    stream: Option<StreamCursor>,
}

impl<W: Write> Presenter<W> {
    pub fn new(out: W, color: bool) -> Self {
        Self {
            out,
            palette: Palette { color },
            printed_notices: 0,
            last_state: None,
            stream: None,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn render_banner(&mut self, profile: &ProviderProfile) -> io::Result<()> {
        let p = self.palette;
        writeln!(
            self.out,
            "{} {}",
            p.bold("prepf mock interview"),
            p.dim(&format!("({} / {})", profile.provider_id, profile.model_id))
        )?;
        self.out.flush()
    }

    pub fn render(
        &mut self,
        session: &InterviewSession,
        usage: UsageStats,
        now: Instant,
    ) -> io::Result<()> {
        let state = session.state();
        let label = state.label();
        let entered = self.last_state != Some(label);

        // A turn that just ended still has its tail to print.
        if entered && !matches!(state, InterviewState::Thinking(_)) {
            let reply = matches!(
                state,
                InterviewState::AwaitingAnswer | InterviewState::Grading(_)
            )
            .then(|| session.buffer());
            self.finish_stream(reply)?;
        }

        self.render_notices(session)?;

        match state {
            InterviewState::Configuring if entered => self.render_configuring()?,
            InterviewState::Waiting if entered => {
                writeln!(self.out, "{}", self.palette.dim("Loading resume..."))?;
            }
            InterviewState::Thinking(turn) => match turn.status {
                TurnStatus::Streaming { turn_id } => {
                    self.render_stream(session, turn.purpose, turn_id)?
                }
                TurnStatus::Failed { .. } => self.finish_stream(None)?,
            },
            InterviewState::AwaitingAnswer if entered => {
                let status = self.status_line(session, now);
                writeln!(self.out)?;
                writeln!(self.out, "{status}")?;
                writeln!(
                    self.out,
                    "{}",
                    self.palette.dim("Your answer (or /surrender):")
                )?;
            }
            InterviewState::Grading(report) if entered => {
                self.render_report(report, usage)?;
            }
            _ => {}
        }

        self.last_state = Some(label);
        self.out.flush()
    }

    fn render_notices(&mut self, session: &InterviewSession) -> io::Result<()> {
        let notices = session.notices();
        if self.printed_notices >= notices.len() {
            return Ok(());
        }
        if self.stream.is_some() {
            writeln!(self.out)?;
        }
        for notice in &notices[self.printed_notices..] {
            let line = if notice.starts_with("Error") {
                self.palette.red(notice)
            } else {
                self.palette.yellow(notice)
            };
            writeln!(self.out, "{line}")?;
        }
        self.printed_notices = notices.len();
        Ok(())
    }

    fn render_configuring(&mut self) -> io::Result<()> {
        let p = self.palette;
        writeln!(self.out, "{}", p.bold("Configure your interview"))?;
        writeln!(
            self.out,
            "{} {}",
            p.dim("Topics:"),
            VALID_INTERVIEW_TOPICS.join(", ")
        )?;
        writeln!(
            self.out,
            "{}",
            p.dim("Use /focus a, b and /exclude c, then /start. /skip allows every topic.")
        )
    }

    fn render_stream(
        &mut self,
        session: &InterviewSession,
        purpose: TurnPurpose,
        turn_id: TurnId,
    ) -> io::Result<()> {
        let is_new_turn = self
            .stream
            .as_ref()
            .map_or(true, |cursor| cursor.turn_id != turn_id);
        if is_new_turn {
            self.finish_stream(None)?;
            let heading = match purpose {
                TurnPurpose::Question => self.palette.cyan("Interviewer:"),
                TurnPurpose::SurrenderFeedback => self.palette.yellow("Feedback:"),
            };
            writeln!(self.out)?;
            writeln!(self.out, "{heading}")?;
            self.stream = Some(StreamCursor {
                turn_id,
                printed: 0,
            });
        }

        let visible = visible_text(session.buffer());
        self.print_stream_tail(&visible)
    }

    /// Ends the current stream block, first printing what is left of `reply`.
    fn finish_stream(&mut self, reply: Option<&str>) -> io::Result<()> {
        if self.stream.is_none() {
            return Ok(());
        }
        if let Some(reply) = reply {
            let finished = strip_markers(reply);
            self.print_stream_tail(finished.trim_end())?;
        }
        writeln!(self.out)?;
        self.stream = None;
        Ok(())
    }

    fn print_stream_tail(&mut self, visible: &str) -> io::Result<()> {
        let Some(cursor) = self.stream.as_mut() else {
            return Ok(());
        };
        if visible.len() <= cursor.printed || !visible.is_char_boundary(cursor.printed) {
            return Ok(());
        }
        write!(self.out, "{}", &visible[cursor.printed..])?;
        cursor.printed = visible.len();
        Ok(())
    }

    fn status_line(&self, session: &InterviewSession, now: Instant) -> String {
        let status = session.status_line(now);
        match status.strip_suffix(" | [FINAL QUESTION]") {
            Some(head) => format!(
                "{} | {}",
                self.palette.dim(head),
                self.palette.bold(&self.palette.red("[FINAL QUESTION]"))
            ),
            None => self.palette.dim(&status),
        }
    }

    fn render_report(&mut self, report: &ReportCard, usage: UsageStats) -> io::Result<()> {
        let p = self.palette;
        writeln!(self.out)?;
        writeln!(self.out, "{}", p.bold("Interview complete"))?;
        writeln!(
            self.out,
            "{} {}  {}",
            p.dim("Grade:"),
            p.bold(report.grade.letter()),
            p.bold(&p.green(report.persona))
        )?;
        writeln!(
            self.out,
            "{} {} answered, {} surrendered",
            p.dim("Questions:"),
            report.questions,
            report.surrenders
        )?;
        writeln!(self.out, "{} {}", p.dim("Feedback:"), report.feedback)?;
        if !report.remediation.is_empty() {
            let buttons: Vec<String> = report
                .remediation
                .iter()
                .map(|topic| format!("[ {topic} ]"))
                .collect();
            writeln!(self.out, "{} {}", p.dim("Study next:"), buttons.join(" "))?;
        }
        writeln!(self.out, "{}", p.dim(&usage.to_string()))?;
        writeln!(self.out, "{}", p.dim("Type /quit to exit."))
    }
}
