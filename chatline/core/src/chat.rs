//! Chat Session
//!
//! Glue between the streaming client and the chat store. A [`ChatSession`]
//! makes sure a conversation exists, records the user's message, starts the
//! generation and, when the session ends, writes the assistant's answer to
//! history exactly once.
//!
//! # What gets persisted
//!
//! | Session end               | Stored assistant message              |
//! |---------------------------|---------------------------------------|
//! | finished / end of stream  | full text                             |
//! | stalled                   | accumulated text, `truncated = true`  |
//! | stopped / superseded      | partial text, `truncated = true`      |
//! |                           | (nothing if no text had arrived)      |
//! | error, some text          | partial text, `truncated = true`      |
//! | error, no text            | [`APOLOGY`]                           |
//!
//! Sending while a reply is still streaming supersedes it, and the new
//! prompt is stored only after the superseded reply has been saved.

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{oneshot, watch};

use crate::backend::GenerateRequest;
use crate::client::StreamingClient;
use crate::error::StreamError;
use crate::state::AppStateFile;
use crate::store::{
    ChatStore, ConversationId, Message, MessageId, NewMessage, Role, StoreError, PLACEHOLDER_TITLE,
};
use crate::streaming::{Completion, GenerationObserver, SessionId};

/// Stored in place of an answer when generation failed before any text
pub const APOLOGY: &str = "Sorry, an error occurred.";

/// Errors from chat orchestration
#[derive(Debug, Error)]
pub enum ChatError {
    /// The store rejected an operation
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The reply was never reconciled (runtime shut down mid-session)
    #[error("reply was dropped before it was saved")]
    ReplyDropped,
}

/// How a reply ended, after it was written to history
#[derive(Debug)]
pub enum ReplyOutcome {
    /// The generation completed (possibly partially)
    Completed {
        /// Stored assistant message, `None` when there was nothing to store
        message_id: Option<MessageId>,
        /// The completion as the controller reported it
        completion: Completion,
    },
    /// The generation failed
    Failed {
        /// Stored assistant message (partial text or apology)
        message_id: Option<MessageId>,
        /// What went wrong
        error: StreamError,
    },
}

/// Handle to a reply being generated
#[derive(Debug)]
pub struct PendingReply {
    session_id: SessionId,
    conversation_id: ConversationId,
    saved: oneshot::Receiver<Result<ReplyOutcome, StoreError>>,
}

impl PendingReply {
    /// Generation session producing this reply
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Conversation the reply belongs to
    #[must_use]
    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    /// Wait until the reply has ended and been written to history
    ///
    /// # Errors
    ///
    /// [`ChatError::Store`] if saving failed, [`ChatError::ReplyDropped`] if
    /// the session was torn down before it could be saved.
    pub async fn wait(self) -> Result<ReplyOutcome, ChatError> {
        match self.saved.await {
            Ok(result) => Ok(result?),
            Err(_) => Err(ChatError::ReplyDropped),
        }
    }
}

/// One chat with history
pub struct ChatSession {
    client: Arc<StreamingClient>,
    store: Arc<dyn ChatStore>,
    state_file: Option<AppStateFile>,
    conversation: Mutex<Option<ConversationId>>,
    model: Mutex<String>,
    /// Flips to `true` once the latest reply is in the store
    last_reply: Mutex<Option<watch::Receiver<bool>>>,
}

impl ChatSession {
    /// Create a session that starts a new conversation on first send
    pub fn new(
        client: Arc<StreamingClient>,
        store: Arc<dyn ChatStore>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            store,
            state_file: None,
            conversation: Mutex::new(None),
            model: Mutex::new(model.into()),
            last_reply: Mutex::new(None),
        }
    }

    /// Remember the model used in `state_file`
    #[must_use]
    pub fn with_state_file(mut self, state_file: AppStateFile) -> Self {
        self.state_file = Some(state_file);
        self
    }

    /// The client
    #[must_use]
    pub fn client(&self) -> &Arc<StreamingClient> {
        &self.client
    }

    /// Current model
    #[must_use]
    pub fn model(&self) -> String {
        self.model.lock().clone()
    }

    /// Switch model for subsequent sends
    pub fn set_model(&self, model: impl Into<String>) {
        *self.model.lock() = model.into();
    }

    /// Current conversation, if one has been started
    #[must_use]
    pub fn conversation_id(&self) -> Option<ConversationId> {
        self.conversation.lock().clone()
    }

    /// Start over: the next send creates a new conversation
    pub fn new_conversation(&self) {
        self.client.stop();
        *self.conversation.lock() = None;
    }

    /// Continue an existing conversation
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if it does not exist.
    pub async fn resume(&self, id: &ConversationId) -> Result<(), ChatError> {
        let conversation = self
            .store
            .get_conversation(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        self.set_model(conversation.model);
        *self.conversation.lock() = Some(conversation.id);
        Ok(())
    }

    /// Messages of the current conversation
    ///
    /// # Errors
    ///
    /// Store errors.
    pub async fn history(&self) -> Result<Vec<Message>, ChatError> {
        match self.conversation_id() {
            Some(id) => Ok(self.store.list_messages(&id).await?),
            None => Ok(Vec::new()),
        }
    }

    /// Stop the running reply, keeping its partial text
    pub fn stop(&self) -> bool {
        self.client.stop()
    }

    /// Supersede the previous reply and wait until it has been saved
    async fn settle_previous_reply(&self) {
        let Some(mut saved) = self.last_reply.lock().take() else {
            return;
        };
        if self.client.supersede() {
            tracing::debug!("Superseding reply still in progress");
        }
        // A closed channel means the reply was torn down without saving
        let _ = saved.wait_for(|done| *done).await;
    }

    async fn ensure_conversation(&self, model: &str) -> Result<ConversationId, ChatError> {
        if let Some(id) = self.conversation_id() {
            return Ok(id);
        }
        let id = self
            .store
            .create_conversation(PLACEHOLDER_TITLE, model)
            .await?;
        tracing::info!(conversation_id = %id, model, "Started conversation");
        *self.conversation.lock() = Some(id.clone());
        Ok(id)
    }

    /// Record `prompt` and start generating the reply
    ///
    /// `observer` sees the reply as it streams; the returned handle resolves
    /// once the reply has been saved.
    ///
    /// # Errors
    ///
    /// Store errors while creating the conversation or saving the prompt.
    pub async fn send(
        &self,
        prompt: &str,
        observer: impl GenerationObserver,
    ) -> Result<PendingReply, ChatError> {
        self.settle_previous_reply().await;

        let model = self.model();
        let conversation_id = self.ensure_conversation(&model).await?;
        self.store
            .append_message(&conversation_id, Role::User, prompt)
            .await?;

        if let Some(ref state_file) = self.state_file {
            if let Err(e) = state_file.remember_model(&model).await {
                tracing::warn!(error = %e, "Could not save last used model");
            }
        }

        let (saved_tx, saved_rx) = oneshot::channel();
        let (done_tx, done_rx) = watch::channel(false);
        *self.last_reply.lock() = Some(done_rx);
        let reconciler = Reconciler {
            inner: Box::new(observer),
            store: Arc::clone(&self.store),
            conversation_id: conversation_id.clone(),
            live: String::new(),
            saved: Some((saved_tx, done_tx)),
        };
        let session_id = self
            .client
            .start_generation(GenerateRequest::new(prompt, &model), reconciler);

        Ok(PendingReply {
            session_id,
            conversation_id,
            saved: saved_rx,
        })
    }
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("conversation", &self.conversation_id())
            .field("model", &self.model())
            .finish_non_exhaustive()
    }
}

/// Observer that forwards to the caller and saves the reply once
struct Reconciler {
    inner: Box<dyn GenerationObserver>,
    store: Arc<dyn ChatStore>,
    conversation_id: ConversationId,
    live: String,
    saved: Option<(
        oneshot::Sender<Result<ReplyOutcome, StoreError>>,
        watch::Sender<bool>,
    )>,
}

impl Reconciler {
    /// Save `message` (if any) in the background and resolve the handle
    fn reconcile<F>(&mut self, message: Option<NewMessage>, outcome: F)
    where
        F: FnOnce(Option<MessageId>) -> ReplyOutcome + Send + 'static,
    {
        // The controller calls exactly one terminal method; this guards the
        // handle against any second call regardless
        let Some((saved, done)) = self.saved.take() else {
            return;
        };
        let store = Arc::clone(&self.store);

        tokio::spawn(async move {
            let stored = match message {
                Some(message) => store.append(message).await.map(Some),
                None => Ok(None),
            };
            if let Err(ref e) = stored {
                tracing::error!(error = %e, "Failed to save assistant reply");
            }
            done.send_replace(true);
            let _ = saved.send(stored.map(outcome));
        });
    }
}

impl GenerationObserver for Reconciler {
    fn on_tokens(&mut self, batch: &str) {
        self.live.push_str(batch);
        self.inner.on_tokens(batch);
    }

    fn on_complete(&mut self, completion: &Completion) {
        self.inner.on_complete(completion);

        let message = if completion.content.is_empty() && completion.is_partial() {
            None
        } else {
            Some(
                NewMessage::new(
                    self.conversation_id.clone(),
                    Role::Assistant,
                    completion.content.clone(),
                )
                .truncated(completion.is_partial()),
            )
        };
        let completion = completion.clone();
        self.reconcile(message, move |message_id| ReplyOutcome::Completed {
            message_id,
            completion,
        });
    }

    fn on_error(&mut self, error: &StreamError) {
        self.inner.on_error(error);

        let message = if self.live.is_empty() {
            NewMessage::new(self.conversation_id.clone(), Role::Assistant, APOLOGY)
        } else {
            NewMessage::new(
                self.conversation_id.clone(),
                Role::Assistant,
                std::mem::take(&mut self.live),
            )
            .truncated(true)
        };
        let error = error.clone();
        self.reconcile(Some(message), move |message_id| ReplyOutcome::Failed {
            message_id,
            error,
        });
    }
}
