//! Streaming Client
//!
//! [`StreamingClient`] is the one object a front end holds. It owns the
//! transport, the [`RequestGate`] and at most one active [`StreamSession`].
//!
//! # Generation policy
//!
//! Starting a generation while another is running cancels and replaces the
//! old one. The old session still gets its terminal callback, a completion
//! with [`CompletionReason::Superseded`] carrying its partial text.
//!
//! [`CompletionReason::Superseded`]: crate::streaming::CompletionReason::Superseded

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;

use crate::backend::{ChatMessage, GenerateRequest, ModelInfo, OllamaTransport, Transport};
use crate::config::ClientConfig;
use crate::error::StreamError;
use crate::gate::{CachePolicy, GateConfig, GateStats, RequestGate};
use crate::streaming::{
    Completion, GenerationCallbacks, GenerationObserver, SessionId, SessionSnapshot,
    StreamConfig, StreamSession,
};

/// Client for one inference server
pub struct StreamingClient {
    transport: Arc<dyn Transport>,
    gate: Arc<RequestGate>,
    stream_config: StreamConfig,
    active: Mutex<Option<StreamSession>>,
}

impl StreamingClient {
    /// Create a client talking to Ollama as configured
    ///
    /// # Errors
    ///
    /// [`StreamError::Unknown`] if the HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self, StreamError> {
        let transport = OllamaTransport::new(
            config.base_url.clone(),
            config.request_timeout,
            config.connect_timeout,
        )?;
        Ok(Self::with_transport(
            Arc::new(transport),
            config.stream,
            config.gate,
        ))
    }

    /// Create a client over any transport
    #[must_use]
    pub fn with_transport(
        transport: Arc<dyn Transport>,
        stream_config: StreamConfig,
        gate_config: GateConfig,
    ) -> Self {
        Self {
            transport,
            gate: Arc::new(RequestGate::new(gate_config)),
            stream_config,
            active: Mutex::new(None),
        }
    }

    /// Server base URL
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.transport.base_url()
    }

    // ========================================================================
    // Streaming
    // ========================================================================

    /// Start a streaming generation, superseding any running one
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_generation(
        &self,
        request: GenerateRequest,
        observer: impl GenerationObserver,
    ) -> SessionId {
        let mut active = self.active.lock();
        if let Some(previous) = active.take() {
            if previous.supersede() {
                tracing::info!(session_id = %previous.id(), "Superseding running generation");
            }
        }

        let session = StreamSession::spawn_gated(
            Arc::clone(&self.transport),
            Some(Arc::clone(&self.gate)),
            request,
            self.stream_config,
            Box::new(observer),
        );
        let id = session.id().clone();
        *active = Some(session);
        id
    }

    /// Closure flavour of [`StreamingClient::start_generation`]
    pub fn generate<T, C, E>(
        &self,
        prompt: &str,
        model: &str,
        on_token: T,
        on_complete: C,
        on_error: E,
    ) -> SessionId
    where
        T: FnMut(&str) + Send + 'static,
        C: FnMut(&Completion) + Send + 'static,
        E: FnMut(&StreamError) + Send + 'static,
    {
        self.start_generation(
            GenerateRequest::new(prompt, model),
            GenerationCallbacks::new(on_token, on_complete, on_error),
        )
    }

    /// Stop the running generation, keeping its partial text
    ///
    /// Returns `false` when nothing was running.
    pub fn stop(&self) -> bool {
        self.active.lock().as_ref().is_some_and(StreamSession::stop)
    }

    /// End the running generation as superseded, without starting another
    pub(crate) fn supersede(&self) -> bool {
        self.active
            .lock()
            .as_ref()
            .is_some_and(StreamSession::supersede)
    }

    /// Whether a generation is running
    #[must_use]
    pub fn is_generating(&self) -> bool {
        self.active
            .lock()
            .as_ref()
            .is_some_and(StreamSession::is_active)
    }

    /// View of the current (or last) session
    #[must_use]
    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        self.active.lock().as_ref().map(StreamSession::snapshot)
    }

    // ========================================================================
    // Gated Requests
    // ========================================================================

    /// Installed model names
    ///
    /// # Errors
    ///
    /// Transport errors, or [`StreamError::Unknown`] for an unexpected reply.
    pub async fn list_models(&self) -> Result<Vec<String>, StreamError> {
        Ok(self
            .list_model_info()
            .await?
            .into_iter()
            .map(|m| m.name)
            .collect())
    }

    /// Installed models with details
    ///
    /// # Errors
    ///
    /// See [`StreamingClient::list_models`].
    pub async fn list_model_info(&self) -> Result<Vec<ModelInfo>, StreamError> {
        let reply = self
            .gate
            .execute("api/tags", &serde_json::Value::Null, CachePolicy::Long, || {
                self.transport.get_json("api/tags")
            })
            .await?;
        parse_model_list(&reply, "api/tags")
    }

    /// Models currently loaded in memory (never cached)
    ///
    /// # Errors
    ///
    /// See [`StreamingClient::list_models`].
    pub async fn running_models(&self) -> Result<Vec<String>, StreamError> {
        let reply = self
            .gate
            .execute("api/ps", &serde_json::Value::Null, CachePolicy::Uncached, || {
                self.transport.get_json("api/ps")
            })
            .await?;
        Ok(parse_model_list(&reply, "api/ps")?
            .into_iter()
            .map(|m| m.name)
            .collect())
    }

    /// Non-streaming generation
    ///
    /// # Errors
    ///
    /// Transport errors, or [`StreamError::Unknown`] for an unexpected reply.
    pub async fn generate_once(&self, request: &GenerateRequest) -> Result<String, StreamError> {
        let body = serde_json::to_value(request.clone().with_stream(false))
            .map_err(|e| StreamError::Unknown(e.to_string()))?;
        let reply = self.post("api/generate", body, CachePolicy::Short).await?;
        string_field(&reply, "response", "api/generate")
    }

    /// Chat completion over a message history
    ///
    /// # Errors
    ///
    /// Transport errors, or [`StreamError::Unknown`] for an unexpected reply.
    pub async fn chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<ChatMessage, StreamError> {
        let body = json!({ "model": model, "messages": messages, "stream": false });
        let reply = self.post("api/chat", body, CachePolicy::Short).await?;
        reply
            .get("message")
            .cloned()
            .and_then(|m| serde_json::from_value(m).ok())
            .ok_or_else(|| unexpected("api/chat"))
    }

    /// Model details (template, parameters, license, ...)
    ///
    /// # Errors
    ///
    /// Transport errors.
    pub async fn model_info(&self, model: &str) -> Result<serde_json::Value, StreamError> {
        self.post("api/show", json!({ "model": model }), CachePolicy::Long)
            .await
    }

    /// Server version string
    ///
    /// # Errors
    ///
    /// Transport errors, or [`StreamError::Unknown`] for an unexpected reply.
    pub async fn version(&self) -> Result<String, StreamError> {
        let reply = self
            .gate
            .execute(
                "api/version",
                &serde_json::Value::Null,
                CachePolicy::Long,
                || self.transport.get_json("api/version"),
            )
            .await?;
        string_field(&reply, "version", "api/version")
    }

    /// Embedding vector for `prompt`
    ///
    /// # Errors
    ///
    /// Transport errors, or [`StreamError::Unknown`] for an unexpected reply.
    pub async fn embeddings(&self, model: &str, prompt: &str) -> Result<Vec<f64>, StreamError> {
        let body = json!({ "model": model, "prompt": prompt });
        let reply = self.post("api/embeddings", body, CachePolicy::Short).await?;
        reply
            .get("embedding")
            .and_then(|v| v.as_array())
            .map(|values| values.iter().filter_map(serde_json::Value::as_f64).collect())
            .ok_or_else(|| unexpected("api/embeddings"))
    }

    /// Whether the server answers at all
    pub async fn health_check(&self) -> bool {
        let result = self
            .gate
            .execute(
                "api/version",
                &serde_json::Value::Null,
                CachePolicy::Uncached,
                || self.transport.get_json("api/version"),
            )
            .await;
        if let Err(ref e) = result {
            tracing::debug!(error = %e, "Health check failed");
        }
        result.is_ok()
    }

    async fn post(
        &self,
        path: &str,
        body: serde_json::Value,
        policy: CachePolicy,
    ) -> Result<serde_json::Value, StreamError> {
        self.gate
            .execute(path, &body, policy, || self.transport.post_json(path, &body))
            .await
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Gate counters
    #[must_use]
    pub fn gate_stats(&self) -> GateStats {
        self.gate.stats()
    }

    /// Drop cached replies (e.g. after pulling a new model)
    pub fn invalidate_cache(&self) {
        self.gate.clear_cache();
    }

    /// Stop the running generation and reset the gate
    pub fn shutdown(&self) {
        self.stop();
        self.gate.cleanup();
    }
}

impl std::fmt::Debug for StreamingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingClient")
            .field("backend", &self.transport.name())
            .field("base_url", &self.transport.base_url())
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

impl Drop for StreamingClient {
    fn drop(&mut self) {
        if let Some(session) = self.active.get_mut().as_ref() {
            session.stop();
        }
    }
}

fn unexpected(endpoint: &str) -> StreamError {
    StreamError::Unknown(format!("unexpected reply from {endpoint}"))
}

fn string_field(
    reply: &serde_json::Value,
    field: &str,
    endpoint: &str,
) -> Result<String, StreamError> {
    reply
        .get(field)
        .and_then(|v| v.as_str())
        .map(String::from)
        .ok_or_else(|| unexpected(endpoint))
}

fn parse_model_list(
    reply: &serde_json::Value,
    endpoint: &str,
) -> Result<Vec<ModelInfo>, StreamError> {
    let models = reply
        .get("models")
        .and_then(|m| m.as_array())
        .ok_or_else(|| unexpected(endpoint))?;
    Ok(models.iter().filter_map(ModelInfo::from_tag).collect())
}
