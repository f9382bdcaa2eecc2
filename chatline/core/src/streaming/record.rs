//! Stream records and the tolerant line parser
//!
//! Each line of a `/api/generate` response is one JSON object. The parser
//! never fails the stream: a line that does not decode is logged and skipped.

use serde::{Deserialize, Serialize};

use crate::error::StreamError;

/// Opening reasoning tag some models emit around hidden chain-of-thought
const THINK_OPEN: &str = "<think>";
/// Closing reasoning tag
const THINK_CLOSE: &str = "</think>";

/// One decoded line of the generation stream
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamRecord {
    /// Model that produced this record
    pub model: String,
    /// Server timestamp (RFC 3339)
    pub created_at: String,
    /// Incremental text fragment (may be empty)
    pub response: String,
    /// Terminal marker; nothing after the first `done` record is read
    pub done: bool,
    /// Why generation stopped (`stop`, `length`, ...), final record only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub done_reason: Option<String>,
    /// Opaque conversation context, final record only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Vec<i64>>,
    /// Total wall time in nanoseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_duration: Option<u64>,
    /// Model load time in nanoseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_duration: Option<u64>,
    /// Prompt tokens evaluated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_eval_count: Option<u64>,
    /// Prompt evaluation time in nanoseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_eval_duration: Option<u64>,
    /// Tokens generated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eval_count: Option<u64>,
    /// Generation time in nanoseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eval_duration: Option<u64>,
    /// In-band error reported by the server
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StreamRecord {
    /// Usage counters carried by a final record
    #[must_use]
    pub fn stats(&self) -> Option<GenerationStats> {
        if !self.done {
            return None;
        }
        Some(GenerationStats {
            total_duration_ns: self.total_duration,
            load_duration_ns: self.load_duration,
            prompt_eval_count: self.prompt_eval_count,
            eval_count: self.eval_count,
            eval_duration_ns: self.eval_duration,
            done_reason: self.done_reason.clone(),
        })
    }
}

/// Timing and usage reported with the final record
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationStats {
    /// Total wall time in nanoseconds
    pub total_duration_ns: Option<u64>,
    /// Model load time in nanoseconds
    pub load_duration_ns: Option<u64>,
    /// Prompt tokens evaluated
    pub prompt_eval_count: Option<u64>,
    /// Tokens generated
    pub eval_count: Option<u64>,
    /// Generation time in nanoseconds
    pub eval_duration_ns: Option<u64>,
    /// Why generation stopped
    pub done_reason: Option<String>,
}

impl GenerationStats {
    /// Generation throughput, when the server reported enough to compute it
    #[must_use]
    pub fn tokens_per_second(&self) -> Option<f64> {
        let count = self.eval_count?;
        let duration = self.eval_duration_ns?;
        if duration == 0 {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        Some(count as f64 / (duration as f64 / 1_000_000_000.0))
    }
}

/// Parser settings
#[derive(Clone, Copy, Debug)]
pub struct ParserOptions {
    /// Treat fragments containing `<think>`/`</think>` as undeliverable
    pub filter_think_tags: bool,
    /// Treat whitespace-only fragments as undeliverable
    pub skip_blank_fragments: bool,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            filter_think_tags: true,
            skip_blank_fragments: true,
        }
    }
}

/// Tolerant NDJSON record parser
#[derive(Debug, Default)]
pub struct RecordParser {
    options: ParserOptions,
    parsed: u64,
    malformed: u64,
}

impl RecordParser {
    /// Create a parser with the given options
    #[must_use]
    pub fn new(options: ParserOptions) -> Self {
        Self {
            options,
            parsed: 0,
            malformed: 0,
        }
    }

    /// Parse one complete line
    ///
    /// Blank lines and lines that fail to decode yield `None`; the latter are
    /// logged as [`StreamError::MalformedStream`] and counted.
    pub fn parse(&mut self, line: &str) -> Option<StreamRecord> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        match serde_json::from_str::<StreamRecord>(trimmed) {
            Ok(record) => {
                self.parsed += 1;
                if let Some(ref error) = record.error {
                    tracing::warn!(error = %error, "Server reported an in-band error");
                }
                Some(record)
            }
            Err(e) => {
                self.malformed += 1;
                let err = StreamError::malformed(trimmed, e.to_string());
                tracing::warn!(error = %err, "Skipping malformed stream line");
                None
            }
        }
    }

    /// The fragment of `record` that should reach the UI, if any
    #[must_use]
    pub fn deliverable<'a>(&self, record: &'a StreamRecord) -> Option<&'a str> {
        let fragment = record.response.as_str();
        if fragment.is_empty() {
            return None;
        }
        if self.options.skip_blank_fragments && fragment.trim().is_empty() {
            return None;
        }
        if self.options.filter_think_tags
            && (fragment.contains(THINK_OPEN) || fragment.contains(THINK_CLOSE))
        {
            return None;
        }
        Some(fragment)
    }

    /// Records successfully decoded
    #[must_use]
    pub fn parsed_count(&self) -> u64 {
        self.parsed
    }

    /// Lines skipped because they failed to decode
    #[must_use]
    pub fn malformed_count(&self) -> u64 {
        self.malformed
    }
}
