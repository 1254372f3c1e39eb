//! In-band control markers the interviewer model appends to its replies.

use std::sync::OnceLock;

use regex::Regex;

/// Marker asking the session to move on to the next question.
pub const NEXT_MARKER: &str = "<NEXT>";
/// Marker asking the session to end and grade.
pub const ROAST_MARKER: &str = "<ROAST>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSignals {
    pub content: String,
    pub has_next: bool,
    pub has_roast: bool,
}

/// Strips every `<NEXT>`/`<ROAST>` marker (any case) and trims the rest.
pub fn parse_signals(text: &str) -> ParsedSignals {
    let Some(pattern) = marker_pattern() else {
        return ParsedSignals {
            content: text.trim().to_string(),
            has_next: false,
            has_roast: false,
        };
    };

    let mut has_next = false;
    let mut has_roast = false;
    for captures in pattern.captures_iter(text) {
        match captures.get(1).map(|name| name.as_str().to_ascii_uppercase()) {
            Some(name) if name == "NEXT" => has_next = true,
            Some(_) => has_roast = true,
            None => {}
        }
    }

    ParsedSignals {
        content: pattern.replace_all(text, "").trim().to_string(),
        has_next,
        has_roast,
    }
}

/// Text safe to show while a reply is still streaming.
///
/// Complete markers are removed and a trailing fragment that could still grow
/// into a marker is held back. Unlike [`parse_signals`] nothing is trimmed,
/// so the result only ever grows as more text arrives.
pub fn visible_text(partial: &str) -> String {
    let stripped = strip_markers(partial);
    match stripped.rfind('<') {
        Some(start) if is_marker_prefix(&stripped[start..]) => stripped[..start].to_string(),
        _ => stripped,
    }
}

/// Removes complete markers and nothing else. Use for a finished reply.
pub fn strip_markers(text: &str) -> String {
    match marker_pattern() {
        Some(pattern) => pattern.replace_all(text, "").into_owned(),
        None => text.to_string(),
    }
}

fn is_marker_prefix(tail: &str) -> bool {
    [NEXT_MARKER, ROAST_MARKER].iter().any(|marker| {
        tail.len() < marker.len()
            && marker
                .get(..tail.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(tail))
    })
}

fn marker_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)<(NEXT|ROAST)>").ok())
        .as_ref()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_markers_anywhere_in_text() {
        let parsed = parse_signals("Good.<NEXT> Now tell me <next>about queues.");
        assert_eq!(parsed.content, "Good. Now tell me about queues.");
        assert!(parsed.has_next);
        assert!(!parsed.has_roast);
    }

    #[test]
    fn single_markers_and_reparse_are_stable() {
        let next = parse_signals("Question? <NEXT>");
        assert_eq!(
            next,
            ParsedSignals {
                content: "Question?".to_string(),
                has_next: true,
                has_roast: false,
            }
        );
        let roast = parse_signals("Done <ROAST>");
        assert_eq!(roast.content, "Done");
        assert!(!roast.has_next && roast.has_roast);

        let again = parse_signals(&next.content);
        assert_eq!(again.content, "Question?");
        assert!(!again.has_next && !again.has_roast);
    }

    #[test]
    fn both_markers_can_appear_together() {
        let parsed = parse_signals("That's all. <NEXT> <Roast>");
        assert_eq!(parsed.content, "That's all.");
        assert!(parsed.has_next);
        assert!(parsed.has_roast);
    }

    #[test]
    fn visible_text_holds_back_partial_markers_only() {
        assert_eq!(visible_text("Next one <NE"), "Next one ");
        assert_eq!(visible_text("Next one <NEXT>"), "Next one ");
        assert_eq!(visible_text("if a < b then"), "if a < b then");
        assert_eq!(visible_text("Bye <ro"), "Bye ");
    }

    #[test]
    fn finished_text_keeps_a_trailing_angle_bracket() {
        assert_eq!(visible_text("is a <"), "is a ");
        assert_eq!(strip_markers("is a <"), "is a <");
        assert_eq!(strip_markers("  Go on. <NEXT>"), "  Go on. ");
    }
}
