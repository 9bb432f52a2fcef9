//! The trait seam between the pipeline and role implementations.
//!
//! Generation and validation are backed by external collaborators; build
//! and run are backed by local tool invocations. The driver only sees this
//! trait.

use crate::conversation::{ConversationHistory, Role};
use crate::error::Result;
use async_trait::async_trait;

/// A participant that can produce one turn of conversation text.
#[async_trait]
pub trait RoleAgent: Send + Sync {
    /// The role this agent speaks for.
    fn role(&self) -> Role;

    /// Produces the turn text for the current state of the conversation.
    ///
    /// Implementations read the history; only the driver appends to it.
    async fn take_turn(&self, history: &ConversationHistory) -> Result<String>;
}
