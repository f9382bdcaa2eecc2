//! Transport Traits
//!
//! The streaming controller and the request gate never talk HTTP directly.
//! They go through [`Transport`], which has two jobs:
//!
//! - open a generation request and hand back the raw response body as a
//!   stream of byte chunks
//! - perform plain request/response JSON calls
//!
//! [`super::OllamaTransport`] is the production implementation. Tests script
//! their own.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::StreamError;

/// Raw response body of a streaming request
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StreamError>> + Send>>;

/// Body of a `/api/generate` request
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Model to use
    pub model: String,
    /// The prompt text
    pub prompt: String,
    /// Whether the server should stream NDJSON
    pub stream: bool,
    /// Optional system prompt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Sampling options (temperature, `num_predict`, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<serde_json::Value>,
}

impl GenerateRequest {
    /// Create a streaming request
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            stream: true,
            system: None,
            options: None,
        }
    }

    /// Set streaming mode
    #[must_use]
    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Set system prompt
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set temperature (clamped to 0.0-2.0)
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.set_option("temperature", serde_json::json!(temperature.clamp(0.0, 2.0)));
        self
    }

    /// Limit generated tokens
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        if max_tokens > 0 {
            self.set_option("num_predict", serde_json::json!(max_tokens));
        }
        self
    }

    fn set_option(&mut self, key: &str, value: serde_json::Value) {
        let options = self
            .options
            .get_or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
        if let Some(map) = options.as_object_mut() {
            map.insert(key.to_string(), value);
        }
    }
}

/// Role of a chat message on the wire
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions
    System,
    /// The human
    User,
    /// The model
    Assistant,
}

impl Role {
    /// Wire name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message of a `/api/chat` exchange
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who said it
    pub role: Role,
    /// What was said
    pub content: String,
}

impl ChatMessage {
    /// Create a message
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Information about an installed model
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelInfo {
    /// Model identifier
    pub name: String,
    /// Size on disk in bytes
    pub size: Option<u64>,
    /// Last modification time
    pub modified_at: Option<String>,
    /// Parameter count label (e.g. "3.2B")
    pub parameter_size: Option<String>,
    /// Quantization label (e.g. "`Q4_K_M`")
    pub quantization_level: Option<String>,
}

impl ModelInfo {
    /// Build from one entry of the `/api/tags` `models` array
    #[must_use]
    pub fn from_tag(entry: &serde_json::Value) -> Option<Self> {
        let name = entry.get("name")?.as_str()?.to_string();
        let details = entry.get("details");
        let detail = |key: &str| {
            details
                .and_then(|d| d.get(key))
                .and_then(|v| v.as_str())
                .map(String::from)
        };
        Some(Self {
            name,
            size: entry.get("size").and_then(serde_json::Value::as_u64),
            modified_at: entry
                .get("modified_at")
                .and_then(|v| v.as_str())
                .map(String::from),
            parameter_size: detail("parameter_size"),
            quantization_level: detail("quantization_level"),
        })
    }
}

/// HTTP seam for the inference server
#[async_trait]
pub trait Transport: Send + Sync {
    /// Human-readable backend name
    fn name(&self) -> &str;

    /// Base URL requests are sent to
    fn base_url(&self) -> &str;

    /// Send a streaming generation request and return the response body
    ///
    /// Connection failures map to [`StreamError::ServiceUnreachable`];
    /// non-success statuses to [`StreamError::Status`].
    async fn open_stream(&self, request: &GenerateRequest) -> Result<ByteStream, StreamError>;

    /// GET a JSON document
    async fn get_json(&self, path: &str) -> Result<serde_json::Value, StreamError>;

    /// POST a JSON body and return the JSON reply
    async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, StreamError>;
}
