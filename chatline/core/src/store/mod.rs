//! Conversation Store
//!
//! Chat history lives behind the [`ChatStore`] trait: a small async record
//! store for conversations and their messages.
//!
//! - [`MemoryChatStore`]: process-lifetime storage, used by tests and
//!   `--ephemeral` sessions
//! - [`JsonFileStore`]: a single JSON document on disk, rewritten atomically
//!   after every change
//!
//! Both share [`StoreData`], so ordering and title rules are identical.

mod json;
mod memory;

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crate::backend::Role;
pub(crate) use json::write_atomic;
pub use json::{JsonFileStore, STORE_FILE};
pub use memory::MemoryChatStore;

/// Title given to conversations before their first user message
pub const PLACEHOLDER_TITLE: &str = "New Conversation";

/// Characters of the first user message kept in a derived title
const TITLE_CHARS: usize = 30;

// ============================================================================
// Identifiers
// ============================================================================

/// Conversation identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    /// Generate a new random ID
    #[must_use]
    pub fn new() -> Self {
        Self(format!("conv_{}", uuid::Uuid::new_v4().simple()))
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Message identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    /// Generate a new random ID
    #[must_use]
    pub fn new() -> Self {
        Self(format!("msg_{}", uuid::Uuid::new_v4().simple()))
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Records
// ============================================================================

/// A stored conversation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Identifier
    pub id: ConversationId,
    /// Display title
    pub title: String,
    /// Model the conversation was started with
    pub model: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Time of the last change
    pub updated_at: DateTime<Utc>,
    /// Number of messages
    pub message_count: u32,
}

/// A stored message
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Identifier
    pub id: MessageId,
    /// Owning conversation
    pub conversation_id: ConversationId,
    /// Author
    pub role: Role,
    /// Text
    pub content: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// The answer was cut short (stall, stop)
    #[serde(default)]
    pub truncated: bool,
}

/// A message to append
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewMessage {
    /// Owning conversation
    pub conversation_id: ConversationId,
    /// Author
    pub role: Role,
    /// Text
    pub content: String,
    /// The answer was cut short
    pub truncated: bool,
}

impl NewMessage {
    /// A complete message
    pub fn new(conversation_id: ConversationId, role: Role, content: impl Into<String>) -> Self {
        Self {
            conversation_id,
            role,
            content: content.into(),
            truncated: false,
        }
    }

    /// Mark as truncated
    #[must_use]
    pub fn truncated(mut self, truncated: bool) -> Self {
        self.truncated = truncated;
        self
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors from a chat store
#[derive(Debug, Error)]
pub enum StoreError {
    /// No conversation with this ID
    #[error("conversation not found: {0}")]
    NotFound(ConversationId),

    /// Reading or writing the backing file failed
    #[error("store I/O error at {path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// The backing file is not valid store JSON
    #[error("store file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

// ============================================================================
// Store Trait
// ============================================================================

/// Async CRUD over conversations and messages
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Create a conversation and return its ID
    async fn create_conversation(
        &self,
        title: &str,
        model: &str,
    ) -> Result<ConversationId, StoreError>;

    /// Fetch one conversation
    async fn get_conversation(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, StoreError>;

    /// All conversations, most recently updated first
    async fn list_conversations(&self) -> Result<Vec<Conversation>, StoreError>;

    /// Append a message, bumping the conversation's count and timestamp
    ///
    /// A user message on a conversation still titled [`PLACEHOLDER_TITLE`]
    /// also sets the title.
    async fn append(&self, message: NewMessage) -> Result<MessageId, StoreError>;

    /// Append a complete message
    async fn append_message(
        &self,
        conversation_id: &ConversationId,
        role: Role,
        content: &str,
    ) -> Result<MessageId, StoreError> {
        self.append(NewMessage::new(conversation_id.clone(), role, content))
            .await
    }

    /// Messages of a conversation, oldest first
    async fn list_messages(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Message>, StoreError>;

    /// Delete a conversation and its messages; `false` if it did not exist
    async fn delete_conversation(&self, id: &ConversationId) -> Result<bool, StoreError>;
}

// ============================================================================
// Shared Model
// ============================================================================

/// Title derived from the first user message
///
/// The first 30 characters, with `...` appended when the message is longer.
#[must_use]
pub fn derive_title(content: &str) -> String {
    let content = content.trim();
    let mut title: String = content.chars().take(TITLE_CHARS).collect();
    if content.chars().count() > TITLE_CHARS {
        title.push_str("...");
    }
    title
}

/// In-memory store contents, also the on-disk document
///
/// Conversations are kept most-recently-updated first.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreData {
    conversations: Vec<Conversation>,
    messages: Vec<Message>,
}

impl StoreData {
    fn position(&self, id: &ConversationId) -> Option<usize> {
        self.conversations.iter().position(|c| &c.id == id)
    }

    /// Insert a new conversation at the front
    pub fn create_conversation(&mut self, title: &str, model: &str) -> ConversationId {
        let now = Utc::now();
        let id = ConversationId::new();
        self.conversations.insert(
            0,
            Conversation {
                id: id.clone(),
                title: title.to_string(),
                model: model.to_string(),
                created_at: now,
                updated_at: now,
                message_count: 0,
            },
        );
        id
    }

    /// Look up a conversation
    #[must_use]
    pub fn get_conversation(&self, id: &ConversationId) -> Option<&Conversation> {
        self.conversations.iter().find(|c| &c.id == id)
    }

    /// Conversations, most recently updated first
    #[must_use]
    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    /// Append a message and move its conversation to the front
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if the conversation does not exist.
    pub fn append(&mut self, message: NewMessage) -> Result<MessageId, StoreError> {
        let index = self
            .position(&message.conversation_id)
            .ok_or_else(|| StoreError::NotFound(message.conversation_id.clone()))?;

        let now = Utc::now();
        let mut conversation = self.conversations.remove(index);
        conversation.message_count += 1;
        conversation.updated_at = now;
        if message.role == Role::User && conversation.title == PLACEHOLDER_TITLE {
            let title = derive_title(&message.content);
            if !title.is_empty() {
                conversation.title = title;
            }
        }
        self.conversations.insert(0, conversation);

        let id = MessageId::new();
        self.messages.push(Message {
            id: id.clone(),
            conversation_id: message.conversation_id,
            role: message.role,
            content: message.content,
            created_at: now,
            truncated: message.truncated,
        });
        Ok(id)
    }

    /// Messages of a conversation in insertion order
    #[must_use]
    pub fn messages(&self, conversation_id: &ConversationId) -> Vec<Message> {
        self.messages
            .iter()
            .filter(|m| &m.conversation_id == conversation_id)
            .cloned()
            .collect()
    }

    /// Remove a conversation and its messages
    pub fn delete_conversation(&mut self, id: &ConversationId) -> bool {
        let Some(index) = self.position(id) else {
            return false;
        };
        self.conversations.remove(index);
        self.messages.retain(|m| &m.conversation_id != id);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_derive_title() {
        assert_eq!(derive_title("What is Rust?"), "What is Rust?");
        assert_eq!(
            derive_title("Explain the borrow checker like I am five please"),
            "Explain the borrow checker lik..."
        );
        assert_eq!(derive_title(&"é".repeat(30)), "é".repeat(30));
        assert_eq!(derive_title("  padded  "), "padded");
    }

    #[test]
    fn test_append_sets_title_once() {
        let mut data = StoreData::default();
        let id = data.create_conversation(PLACEHOLDER_TITLE, "llama3.2");

        data.append(NewMessage::new(id.clone(), Role::System, "be nice"))
            .unwrap();
        assert_eq!(data.get_conversation(&id).unwrap().title, PLACEHOLDER_TITLE);

        data.append(NewMessage::new(id.clone(), Role::User, "First question"))
            .unwrap();
        data.append(NewMessage::new(id.clone(), Role::User, "Second question"))
            .unwrap();
        let conv = data.get_conversation(&id).unwrap();
        assert_eq!(conv.title, "First question");
        assert_eq!(conv.message_count, 3);
    }

    #[test]
    fn test_recency_order() {
        let mut data = StoreData::default();
        let a = data.create_conversation("a", "m");
        let b = data.create_conversation("b", "m");
        assert_eq!(data.conversations()[0].id, b);

        data.append(NewMessage::new(a.clone(), Role::User, "bump")).unwrap();
        let order: Vec<_> = data.conversations().iter().map(|c| c.id.clone()).collect();
        assert_eq!(order, vec![a, b]);
    }

    #[test]
    fn test_append_to_missing_conversation() {
        let mut data = StoreData::default();
        let err = data
            .append(NewMessage::new(ConversationId::new(), Role::User, "hi"))
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn test_delete_removes_messages() {
        let mut data = StoreData::default();
        let keep = data.create_conversation("keep", "m");
        let drop = data.create_conversation("drop", "m");
        data.append(NewMessage::new(keep.clone(), Role::User, "k")).unwrap();
        data.append(NewMessage::new(drop.clone(), Role::User, "d")).unwrap();

        assert!(data.delete_conversation(&drop));
        assert!(!data.delete_conversation(&drop));
        assert!(data.messages(&drop).is_empty());
        assert_eq!(data.messages(&keep).len(), 1);
    }
}
