//! Append-only conversation log replayed to the model on every turn.

/// Author of one conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Parses a free-form role label.
    ///
    /// Anything that is not recognizably model-authored is coerced to
    /// [`Role::User`] so a stray label never fails an otherwise valid request.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "assistant" | "model" => Self::Assistant,
            _ => Self::User,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    #[must_use]
    pub fn wire_role(self) -> WireRole {
        match self {
            Self::User => WireRole::User,
            Self::Assistant => WireRole::Model,
        }
    }
}

impl From<&str> for Role {
    fn from(label: &str) -> Self {
        Self::from_label(label)
    }
}

/// One turn of the conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
}

impl HistoryEntry {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// The two role tokens understood by the remote protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireRole {
    User,
    Model,
}

impl WireRole {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
        }
    }
}

/// Wire-format content block, one per history entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireContent {
    pub role: WireRole,
    pub text: String,
}

impl WireContent {
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: WireRole::User,
            text: text.into(),
        }
    }

    #[must_use]
    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: WireRole::Model,
            text: text.into(),
        }
    }
}

/// Opaque position in a [`History`], used to undo a failed turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryMark(usize);

/// Ordered conversation log.
///
/// Entries are only ever appended through [`History::add`]; the single
/// exception is [`History::rollback_to`], which discards everything after a
/// previously taken mark.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct History {
    entries: Vec<HistoryEntry>,
}

impl History {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, role: impl Into<Role>, content: impl Into<String>) {
        self.entries.push(HistoryEntry::new(role.into(), content));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns a copy of every entry in insertion order.
    #[must_use]
    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.clone()
    }

    #[must_use]
    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    /// Converts the log into wire content blocks, preserving order.
    #[must_use]
    pub fn to_wire_format(&self) -> Vec<WireContent> {
        self.entries
            .iter()
            .map(|entry| WireContent {
                role: entry.role.wire_role(),
                text: entry.content.clone(),
            })
            .collect()
    }

    #[must_use]
    pub fn mark(&self) -> HistoryMark {
        HistoryMark(self.entries.len())
    }

    /// Drops every entry appended after `mark`. Returns how many were removed.
    pub fn rollback_to(&mut self, mark: HistoryMark) -> usize {
        let removed = self.entries.len().saturating_sub(mark.0);
        self.entries.truncate(mark.0);
        removed
    }
}
