//! JSON file-backed chat store
//!
//! The whole store is one JSON document. It is loaded once at open and
//! rewritten after each change: serialized to a sibling temp file, then
//! renamed over the original so a crash never leaves a half-written store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{
    ChatStore, Conversation, ConversationId, Message, MessageId, NewMessage, StoreData, StoreError,
};

/// File name used inside a data directory
pub const STORE_FILE: &str = "conversations.json";

/// Chat store persisted to a JSON file
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    data: Mutex<StoreData>,
}

impl JsonFileStore {
    /// Open the store at `path`, starting empty if the file does not exist
    ///
    /// # Errors
    ///
    /// [`StoreError::Io`] if the file exists but cannot be read,
    /// [`StoreError::Corrupt`] if it is not a valid store document.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let data = match tokio::fs::read_to_string(&path).await {
            Ok(content) if content.trim().is_empty() => StoreData::default(),
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No store file yet, starting empty");
                StoreData::default()
            }
            Err(e) => return Err(io_error(&path, e)),
        };

        tracing::info!(
            path = %path.display(),
            conversations = data.conversations().len(),
            "Opened chat store"
        );
        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    /// Open `conversations.json` inside `dir`
    ///
    /// # Errors
    ///
    /// See [`JsonFileStore::open`].
    pub async fn open_in_dir(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open(dir.as_ref().join(STORE_FILE)).await
    }

    /// Backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, data: &StoreData) -> Result<(), StoreError> {
        write_atomic(&self.path, &serde_json::to_vec_pretty(data)?).await
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Write `bytes` to `path` via a temp file and rename
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| io_error(parent, e))?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(|e| io_error(&tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| io_error(path, e))
}

#[async_trait]
impl ChatStore for JsonFileStore {
    async fn create_conversation(
        &self,
        title: &str,
        model: &str,
    ) -> Result<ConversationId, StoreError> {
        let mut data = self.data.lock().await;
        let id = data.create_conversation(title, model);
        self.persist(&data).await?;
        Ok(id)
    }

    async fn get_conversation(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, StoreError> {
        Ok(self.data.lock().await.get_conversation(id).cloned())
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>, StoreError> {
        Ok(self.data.lock().await.conversations().to_vec())
    }

    async fn append(&self, message: NewMessage) -> Result<MessageId, StoreError> {
        let mut data = self.data.lock().await;
        let id = data.append(message)?;
        self.persist(&data).await?;
        Ok(id)
    }

    async fn list_messages(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Message>, StoreError> {
        Ok(self.data.lock().await.messages(conversation_id))
    }

    async fn delete_conversation(&self, id: &ConversationId) -> Result<bool, StoreError> {
        let mut data = self.data.lock().await;
        let removed = data.delete_conversation(id);
        if removed {
            self.persist(&data).await?;
        }
        Ok(removed)
    }
}
