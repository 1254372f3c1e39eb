//! Final grade for a finished session.

use std::fmt;

/// Feedback used when the session ended on a limit instead of the model's closing remarks.
pub const LIMIT_FEEDBACK: &str = "Great job completing the interview!";

/// Remediation topics suggested with every report card.
pub const DEFAULT_REMEDIATION: [&str; 3] = ["Data Structures", "Algorithms", "System Design"];

/// At most this many remediation topics are shown.
pub const MAX_REMEDIATION_TOPICS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    /// Step function of the surrender count alone.
    pub fn from_surrenders(surrenders: u32) -> Self {
        match surrenders {
            0 => Self::A,
            1..=2 => Self::B,
            3..=4 => Self::C,
            5..=6 => Self::D,
            _ => Self::F,
        }
    }

    pub fn letter(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
            Self::F => "F",
        }
    }

    pub fn persona(self) -> &'static str {
        match self {
            Self::A => "ARCHITECT MATERIAL",
            Self::B => "SOLID CANDIDATE",
            Self::C => "NEEDS WORK",
            Self::D => "JUNIOR AT BEST",
            Self::F => "TERMINATED",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.letter())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportCard {
    pub grade: Grade,
    pub persona: &'static str,
    pub feedback: String,
    pub remediation: Vec<String>,
    pub questions: u32,
    pub surrenders: u32,
}

impl ReportCard {
    /// Builds the card; blank closing remarks fall back to [`LIMIT_FEEDBACK`].
    pub fn new(questions: u32, surrenders: u32, closing_remarks: Option<&str>) -> Self {
        let grade = Grade::from_surrenders(surrenders);
        let feedback = closing_remarks
            .map(str::trim)
            .filter(|remarks| !remarks.is_empty())
            .unwrap_or(LIMIT_FEEDBACK)
            .to_string();

        Self {
            grade,
            persona: grade.persona(),
            feedback,
            remediation: DEFAULT_REMEDIATION
                .iter()
                .take(MAX_REMEDIATION_TOPICS)
                .map(|topic| (*topic).to_string())
                .collect(),
            questions,
            surrenders,
        }
    }
}
