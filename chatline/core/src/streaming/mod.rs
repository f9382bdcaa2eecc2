//! Streaming Response Pipeline
//!
//! Turns the chunked body of a generation request into throttled token
//! batches and one terminal result.
//!
//! # Stages
//!
//! - [`ChunkDecoder`]: bytes to UTF-8 text, across chunk boundaries
//! - [`LineReassembler`]: text to complete NDJSON lines
//! - [`RecordParser`]: lines to [`StreamRecord`]s, skipping malformed ones
//! - [`TokenThrottle`]: fragments to batches at a bounded rate
//! - [`StreamSession`]: drives the above, owns cancellation and the stall
//!   watchdog

mod controller;
mod decoder;
mod lines;
mod record;
mod throttle;

pub use controller::{
    ChannelObserver, Completion, CompletionReason, GenerationCallbacks, GenerationEvent,
    GenerationObserver, SessionId, SessionSnapshot, SessionState, StreamConfig, StreamSession,
};
pub use decoder::ChunkDecoder;
pub use lines::LineReassembler;
pub use record::{GenerationStats, ParserOptions, RecordParser, StreamRecord};
pub use throttle::{FlushTimer, ThrottleConfig, TokenThrottle};
