//! Interview topic selection.

use thiserror::Error;

pub const VALID_INTERVIEW_TOPICS: [&str; 10] = [
    "Data Structures",
    "Algorithms",
    "System Design",
    "Databases",
    "Networking",
    "Concurrency",
    "Operating Systems",
    "Security",
    "Testing",
    "Behavioral",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopicError {
    #[error("unknown topic: {0}")]
    Unknown(String),
    #[error("topic is both focused and excluded: {0}")]
    Conflict(String),
}

/// Focus and exclusion lists chosen while configuring a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicSelection {
    focus: Vec<String>,
    exclude: Vec<String>,
}

impl TopicSelection {
    pub fn focus(&self) -> &[String] {
        &self.focus
    }

    pub fn exclude(&self) -> &[String] {
        &self.exclude
    }

    pub fn is_empty(&self) -> bool {
        self.focus.is_empty() && self.exclude.is_empty()
    }

    /// Replaces the focus list. Names are matched case-insensitively.
    pub fn set_focus(&mut self, names: &[&str]) -> Result<(), TopicError> {
        let topics = canonical_topics(names)?;
        if let Some(conflict) = topics.iter().find(|topic| self.exclude.contains(topic)) {
            return Err(TopicError::Conflict(conflict.clone()));
        }
        self.focus = topics;
        Ok(())
    }

    pub fn set_exclude(&mut self, names: &[&str]) -> Result<(), TopicError> {
        let topics = canonical_topics(names)?;
        if let Some(conflict) = topics.iter().find(|topic| self.focus.contains(topic)) {
            return Err(TopicError::Conflict(conflict.clone()));
        }
        self.exclude = topics;
        Ok(())
    }

    /// Instruction block placed ahead of the opening prompt; empty when nothing was chosen.
    pub fn instructions(&self) -> String {
        let mut lines = Vec::new();
        if !self.focus.is_empty() {
            lines.push(format!(
                "Focus the interview on these topics: {}.",
                self.focus.join(", ")
            ));
        }
        if !self.exclude.is_empty() {
            lines.push(format!(
                "Avoid asking about these topics: {}.",
                self.exclude.join(", ")
            ));
        }
        lines.join("\n")
    }
}

/// Resolves a topic name to its canonical spelling.
pub fn canonical_topic(name: &str) -> Option<&'static str> {
    let name = name.trim();
    VALID_INTERVIEW_TOPICS
        .iter()
        .copied()
        .find(|topic| topic.eq_ignore_ascii_case(name))
}

fn canonical_topics(names: &[&str]) -> Result<Vec<String>, TopicError> {
    let mut topics: Vec<String> = Vec::new();
    for name in names.iter().map(|name| name.trim()).filter(|name| !name.is_empty()) {
        let topic = canonical_topic(name).ok_or_else(|| TopicError::Unknown(name.to_string()))?;
        if !topics.iter().any(|existing| existing == topic) {
            topics.push(topic.to_string());
        }
    }
    Ok(topics)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topics_resolve_case_insensitively_and_dedupe() {
        let mut selection = TopicSelection::default();
        selection
            .set_focus(&["system design", " ALGORITHMS ", "System Design", ""])
            .expect("known topics");

        assert_eq!(selection.focus(), ["System Design", "Algorithms"]);
    }

    #[test]
    fn unknown_and_conflicting_topics_are_rejected() {
        let mut selection = TopicSelection::default();
        assert_eq!(
            selection.set_focus(&["Cooking"]),
            Err(TopicError::Unknown("Cooking".to_string()))
        );

        selection.set_focus(&["Testing"]).expect("known topic");
        assert_eq!(
            selection.set_exclude(&["testing"]),
            Err(TopicError::Conflict("Testing".to_string()))
        );
    }

    #[test]
    fn instructions_list_focus_then_exclusions() {
        let mut selection = TopicSelection::default();
        assert_eq!(selection.instructions(), "");

        selection.set_focus(&["Databases"]).expect("known topic");
        selection.set_exclude(&["Behavioral", "Security"]).expect("known topics");
        assert_eq!(
            selection.instructions(),
            "Focus the interview on these topics: Databases.\nAvoid asking about these topics: Behavioral, Security."
        );
    }
}
