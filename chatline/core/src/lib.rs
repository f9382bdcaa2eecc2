//! Chatline Core - Streaming Chat Pipeline for Local LLM Servers
//!
//! This crate turns the chunked NDJSON body of an Ollama-compatible
//! `/api/generate` request into a smooth stream of UI updates, and fronts
//! every other server request with a concurrency-limited, caching gate. It
//! has no terminal or GUI dependencies; the `chatline` binary is one surface
//! built on top of it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      Surface (CLI, desktop, ...)                  │
//! │        on_tokens(batch) / on_complete / on_error   stop()         │
//! └───────────────▲──────────────────────────────────────┬───────────┘
//!                 │                                      │
//! ┌───────────────┴──────────────────────────────────────▼───────────┐
//! │                        StreamingClient                            │
//! │  ┌─────────────────────────────────────┐   ┌──────────────────┐  │
//! │  │ StreamSession (one driver task)     │   │   RequestGate    │  │
//! │  │                                     │   │  FIFO permits +  │  │
//! │  │  bytes ─► ChunkDecoder              │   │  TTL cache       │  │
//! │  │        ─► LineReassembler           │   └────────▲─────────┘  │
//! │  │        ─► RecordParser              │            │            │
//! │  │        ─► TokenThrottle ─► observer │  tags, show, version,   │
//! │  │  watchdog, read timeout, cancel     │  chat, embeddings ...   │
//! │  └──────────────────┬──────────────────┘            │            │
//! └─────────────────────┼───────────────────────────────┼────────────┘
//!                       │          Transport            │
//!                       ▼                               ▼
//!                   Ollama HTTP API (localhost:11434 by default)
//! ```
//!
//! # Key Types
//!
//! - [`StreamingClient`]: owns the transport, the gate and the active session
//! - [`StreamSession`]: one generation, stoppable, with exactly one terminal
//!   callback
//! - [`GenerationObserver`]: receives token batches and the terminal result
//! - [`RequestGate`]: bounds concurrent non-streaming requests and caches
//!   their replies
//! - [`ChatSession`]: persists prompts and replies through a [`ChatStore`]
//!
//! # Quick Start
//!
//! ```ignore
//! use chatline_core::{load_config, ChannelObserver, GenerationEvent, StreamingClient};
//! use chatline_core::backend::GenerateRequest;
//!
//! let config = load_config()?;
//! let client = StreamingClient::new(&config)?;
//!
//! let (observer, mut events) = ChannelObserver::new();
//! client.start_generation(GenerateRequest::new("Why is the sky blue?", "llama3.2"), observer);
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         GenerationEvent::Tokens(batch) => print!("{batch}"),
//!         GenerationEvent::Complete(_) | GenerationEvent::Error(_) => break,
//!     }
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`backend`]: transport abstraction and the Ollama HTTP transport
//! - [`streaming`]: decoder, reassembler, parser, throttle and session driver
//! - [`gate`]: request gate and response cache
//! - [`client`]: the client facade
//! - [`chat`]: chat orchestration over a store
//! - [`store`]: conversation storage (memory and JSON file)
//! - [`state`]: last-used model and model selection
//! - [`config`]: layered configuration
//! - [`error`]: error taxonomy

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod chat;
pub mod client;
pub mod config;
pub mod error;
pub mod gate;
pub mod state;
pub mod store;
pub mod streaming;

// Re-exports for convenience
pub use chat::{ChatError, ChatSession, PendingReply, ReplyOutcome, APOLOGY};
pub use client::StreamingClient;
pub use config::{
    default_config_path, load_config, load_config_from_path, ClientConfig, ConfigError,
    ConfigOverrides, ConfigSource,
};
pub use error::{ErrorKind, StreamError};
pub use gate::{CachePolicy, GateConfig, GateStats, RequestGate};
pub use state::{select_model, AppState, AppStateFile};
pub use store::{
    derive_title, ChatStore, Conversation, ConversationId, JsonFileStore, MemoryChatStore,
    Message, MessageId, NewMessage, StoreError, PLACEHOLDER_TITLE,
};
pub use streaming::{
    ChannelObserver, Completion, CompletionReason, GenerationCallbacks, GenerationEvent,
    GenerationObserver, GenerationStats, SessionId, SessionSnapshot, SessionState, StreamConfig,
    StreamSession, ThrottleConfig,
};
