//! Inference Server Transport
//!
//! Abstracted access to the inference server through [`Transport`].
//!
//! # Usage
//!
//! ```ignore
//! use chatline_core::backend::{GenerateRequest, OllamaTransport, Transport};
//!
//! let transport = OllamaTransport::from_env()?;
//! let body = transport.open_stream(&GenerateRequest::new("Hello!", "llama3.2")).await?;
//! ```

mod ollama;
mod traits;

pub use ollama::{base_url_from_env, base_url_from_parts, OllamaTransport, DEFAULT_BASE_URL};
pub use traits::{ByteStream, ChatMessage, GenerateRequest, ModelInfo, Role, Transport};
