//! Conversation model: roles, turns and the append-only history.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A participant role in the pipeline conversation.
///
/// The four worker roles rotate in a fixed order; `Moderator` is reserved
/// for synthetic directive turns injected by the workflow manager, which do
/// not consume a slot in the rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Generate,
    Build,
    Run,
    Validate,
    Moderator,
}

impl Role {
    /// The fixed round-robin rotation.
    pub const ROTATION: [Role; 4] = [Role::Generate, Role::Build, Role::Run, Role::Validate];

    /// Next worker role in the rotation. `Moderator` is not part of the
    /// rotation and maps back to `Generate`.
    pub fn next(self) -> Role {
        match self {
            Role::Generate => Role::Build,
            Role::Build => Role::Run,
            Role::Run => Role::Validate,
            Role::Validate | Role::Moderator => Role::Generate,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Generate => "generate",
            Role::Build => "build",
            Role::Run => "run",
            Role::Validate => "validate",
            Role::Moderator => "moderator",
        };
        write!(f, "{}", name)
    }
}

/// A single contribution to the conversation history.
///
/// Immutable once appended; the history is the sole owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// The role that authored this turn.
    pub role: Role,
    /// The full text of the turn.
    pub content: String,
    /// Position in the history, starting at 0.
    pub index: usize,
    /// Timestamp when the turn was appended (ISO 8601 format).
    pub timestamp: String,
}

/// Ordered, append-only sequence of conversation turns.
///
/// Only the pipeline driver appends; every other component reads by
/// reference.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationHistory {
    turns: Vec<ConversationTurn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a turn and returns a reference to it.
    pub fn append(&mut self, role: Role, content: impl Into<String>) -> &ConversationTurn {
        let turn = ConversationTurn {
            role,
            content: content.into(),
            index: self.turns.len(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        self.turns.push(turn);
        // Safe to unwrap because we just pushed an element
        self.turns.last().unwrap()
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&ConversationTurn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Most recent turn authored by `role`, if any.
    pub fn last_of(&self, role: Role) -> Option<&ConversationTurn> {
        self.turns.iter().rev().find(|t| t.role == role)
    }
}

/// Tracks the last full text seen per role so streamed or repeated output
/// is only surfaced once.
///
/// A role that re-emits its previous text plus a tail only contributes the
/// tail; unrelated text replaces the tracked value wholesale.
#[derive(Debug, Default)]
pub struct DeltaTracker {
    last_seen: HashMap<Role, String>,
}

impl DeltaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the portion of `full_text` not yet seen for `role` and
    /// updates the tracked text.
    pub fn novel_suffix<'a>(&mut self, role: Role, full_text: &'a str) -> &'a str {
        let novel = match self.last_seen.get(&role) {
            Some(prev) if full_text.starts_with(prev.as_str()) => &full_text[prev.len()..],
            _ => full_text,
        };
        self.last_seen.insert(role, full_text.to_string());
        novel
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_order() {
        assert_eq!(Role::Generate.next(), Role::Build);
        assert_eq!(Role::Build.next(), Role::Run);
        assert_eq!(Role::Run.next(), Role::Validate);
        assert_eq!(Role::Validate.next(), Role::Generate);
    }

    #[test]
    fn test_history_append_assigns_indices() {
        let mut history = ConversationHistory::new();
        history.append(Role::Generate, "first");
        let turn = history.append(Role::Build, "second");

        assert_eq!(turn.index, 1);
        assert_eq!(history.len(), 2);
        assert_eq!(history.turns()[0].content, "first");
    }

    #[test]
    fn test_last_of_role() {
        let mut history = ConversationHistory::new();
        history.append(Role::Generate, "a");
        history.append(Role::Build, "b");
        history.append(Role::Generate, "c");

        assert_eq!(history.last_of(Role::Generate).unwrap().content, "c");
        assert_eq!(history.last_of(Role::Build).unwrap().content, "b");
        assert!(history.last_of(Role::Validate).is_none());
    }

    #[test]
    fn test_delta_tracker_returns_only_unseen_tail() {
        let mut tracker = DeltaTracker::new();
        assert_eq!(tracker.novel_suffix(Role::Generate, "hello"), "hello");
        assert_eq!(tracker.novel_suffix(Role::Generate, "hello world"), " world");
        // Unrelated text replaces the tracked value
        assert_eq!(tracker.novel_suffix(Role::Generate, "fresh"), "fresh");
    }

    #[test]
    fn test_delta_tracker_is_per_role() {
        let mut tracker = DeltaTracker::new();
        tracker.novel_suffix(Role::Generate, "gen");
        assert_eq!(tracker.novel_suffix(Role::Validate, "gen"), "gen");
    }
}
