//! Ollama Transport
//!
//! HTTP transport for a local Ollama server.
//!
//! # Ollama API
//!
//! - `/api/generate` - completions, streamed as NDJSON
//! - `/api/chat` - chat completions with message history
//! - `/api/tags` - installed models
//! - `/api/show`, `/api/version`, `/api/embeddings`, `/api/ps`
//!
//! The client carries only a connect timeout. Request/response calls get a
//! per-request timeout; the generation stream is bounded by the controller's
//! read timeout instead, since a long answer can legitimately take minutes.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use super::traits::{ByteStream, GenerateRequest, Transport};
use crate::error::StreamError;

/// Default Ollama address
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// reqwest-backed transport for Ollama
#[derive(Clone, Debug)]
pub struct OllamaTransport {
    /// Base URL without trailing slash
    base_url: String,
    /// Per-request bound for non-streaming calls
    request_timeout: Duration,
    /// HTTP client
    http_client: reqwest::Client,
}

impl OllamaTransport {
    /// Create a transport for `base_url`
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Unknown`] if the HTTP client cannot be built
    /// (e.g. the TLS backend fails to initialise).
    pub fn new(
        base_url: impl Into<String>,
        request_timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self, StreamError> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| StreamError::Unknown(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            request_timeout,
            http_client,
        })
    }

    /// Create from `OLLAMA_API_URL`, or `OLLAMA_HOST`/`OLLAMA_PORT`
    ///
    /// # Errors
    ///
    /// See [`OllamaTransport::new`].
    pub fn from_env() -> Result<Self, StreamError> {
        Self::new(
            base_url_from_env(),
            Duration::from_secs(30),
            Duration::from_secs(5),
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn read_json(
        &self,
        url: &str,
        response: reqwest::Response,
    ) -> Result<serde_json::Value, StreamError> {
        let response = check_status(response).await?;
        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| StreamError::from_reqwest(url, &e, self.request_timeout))
    }
}

/// Resolve the server address from the environment
///
/// `OLLAMA_API_URL` wins; otherwise `OLLAMA_HOST` (which may already carry a
/// scheme and port) combined with `OLLAMA_PORT`.
#[must_use]
pub fn base_url_from_env() -> String {
    if let Ok(url) = std::env::var("OLLAMA_API_URL") {
        if !url.trim().is_empty() {
            return url.trim().trim_end_matches('/').to_string();
        }
    }

    let host = std::env::var("OLLAMA_HOST").unwrap_or_else(|_| "localhost".to_string());
    let port: u16 = std::env::var("OLLAMA_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(11434);
    base_url_from_parts(&host, port)
}

/// Build a base URL from a host (bare or with scheme/port) and a fallback port
#[must_use]
pub fn base_url_from_parts(host: &str, port: u16) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        return host.to_string();
    }
    if host.contains(':') {
        format!("http://{host}")
    } else {
        format!("http://{host}:{port}")
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, StreamError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(StreamError::Status { status, body })
}

#[async_trait]
impl Transport for OllamaTransport {
    fn name(&self) -> &str {
        "Ollama"
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn open_stream(&self, request: &GenerateRequest) -> Result<ByteStream, StreamError> {
        let url = self.url("api/generate");
        tracing::debug!(url = %url, model = %request.model, "Opening generation stream");

        let response = self
            .http_client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| StreamError::from_reqwest(&url, &e, self.request_timeout))?;
        let response = check_status(response).await?;

        let timeout = self.request_timeout;
        let stream = response
            .bytes_stream()
            .map(move |chunk| chunk.map_err(|e| StreamError::from_reqwest(&url, &e, timeout)));
        Ok(Box::pin(stream))
    }

    async fn get_json(&self, path: &str) -> Result<serde_json::Value, StreamError> {
        let url = self.url(path);
        let response = self
            .http_client
            .get(&url)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| StreamError::from_reqwest(&url, &e, self.request_timeout))?;
        self.read_json(&url, response).await
    }

    async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, StreamError> {
        let url = self.url(path);
        let response = self
            .http_client
            .post(&url)
            .json(body)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| StreamError::from_reqwest(&url, &e, self.request_timeout))?;
        self.read_json(&url, response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_from_parts() {
        assert_eq!(base_url_from_parts("localhost", 11434), "http://localhost:11434");
        assert_eq!(base_url_from_parts("10.0.0.2:9000", 11434), "http://10.0.0.2:9000");
        assert_eq!(
            base_url_from_parts("https://ollama.lan/", 11434),
            "https://ollama.lan"
        );
    }

    #[test]
    fn test_url_joining() {
        let transport = OllamaTransport::new(
            "http://localhost:11434/",
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(transport.base_url(), "http://localhost:11434");
        assert_eq!(
            transport.url("/api/tags"),
            "http://localhost:11434/api/tags"
        );
        assert_eq!(transport.name(), "Ollama");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_service_unreachable() {
        // Port 9 (discard) on loopback is closed in any sane test environment
        let transport = OllamaTransport::new(
            "http://127.0.0.1:9",
            Duration::from_secs(2),
            Duration::from_secs(2),
        )
        .unwrap();
        let err = transport.get_json("api/tags").await.unwrap_err();
        assert!(err.is_service_offline(), "unexpected error: {err:?}");
    }
}
