//! In-memory chat store

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{
    ChatStore, Conversation, ConversationId, Message, MessageId, NewMessage, StoreData, StoreError,
};

/// Chat store that lives as long as the process
#[derive(Debug, Default)]
pub struct MemoryChatStore {
    data: RwLock<StoreData>,
}

impl MemoryChatStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    async fn create_conversation(
        &self,
        title: &str,
        model: &str,
    ) -> Result<ConversationId, StoreError> {
        Ok(self.data.write().create_conversation(title, model))
    }

    async fn get_conversation(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, StoreError> {
        Ok(self.data.read().get_conversation(id).cloned())
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>, StoreError> {
        Ok(self.data.read().conversations().to_vec())
    }

    async fn append(&self, message: NewMessage) -> Result<MessageId, StoreError> {
        self.data.write().append(message)
    }

    async fn list_messages(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Message>, StoreError> {
        Ok(self.data.read().messages(conversation_id))
    }

    async fn delete_conversation(&self, id: &ConversationId) -> Result<bool, StoreError> {
        Ok(self.data.write().delete_conversation(id))
    }
}
