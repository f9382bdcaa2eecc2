//! Error Taxonomy
//!
//! Every failure the streaming pipeline or the request gate can surface is a
//! [`StreamError`]. Surfaces route on [`StreamError::kind`]: a
//! [`ErrorKind::ServiceUnreachable`] gets the full-screen "service offline"
//! treatment, everything else is shown inline.
//!
//! `MalformedStream` never reaches a caller's error callback. It exists so the
//! record parser can report what it skipped through the same type.

use std::time::Duration;

use thiserror::Error;

/// Coarse error category used by surfaces to pick a presentation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Connection refused, DNS failure, or any other network-level failure
    ServiceUnreachable,
    /// A request exceeded its time bound
    Timeout,
    /// User-initiated stop or gate shutdown
    Aborted,
    /// A line of the stream could not be parsed
    MalformedStream,
    /// Anything else
    Unknown,
}

/// Errors surfaced by the streaming client and request gate
#[derive(Clone, Debug, Error)]
pub enum StreamError {
    /// The inference server could not be reached
    #[error("inference service unreachable at {url}: {reason}")]
    ServiceUnreachable {
        /// URL that was being contacted
        url: String,
        /// Underlying transport message
        reason: String,
    },

    /// The request exceeded its time bound
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The operation was cancelled before it finished
    #[error("operation aborted")]
    Aborted,

    /// A stream line could not be decoded as a record
    #[error("malformed stream line: {reason}")]
    MalformedStream {
        /// The offending line (truncated for logging)
        line: String,
        /// Parser message
        reason: String,
    },

    /// The server answered with a non-success status
    #[error("server returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body (may be empty)
        body: String,
    },

    /// Unclassified failure
    #[error("{0}")]
    Unknown(String),
}

impl StreamError {
    /// Map this error to its coarse category
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ServiceUnreachable { .. } => ErrorKind::ServiceUnreachable,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Aborted => ErrorKind::Aborted,
            Self::MalformedStream { .. } => ErrorKind::MalformedStream,
            Self::Status { .. } | Self::Unknown(_) => ErrorKind::Unknown,
        }
    }

    /// Whether the UI should show the "service offline" screen
    #[must_use]
    pub fn is_service_offline(&self) -> bool {
        self.kind() == ErrorKind::ServiceUnreachable
    }

    /// Build a malformed-line error, keeping at most 120 characters of the line
    pub(crate) fn malformed(line: &str, reason: impl Into<String>) -> Self {
        let line: String = line.chars().take(120).collect();
        Self::MalformedStream {
            line,
            reason: reason.into(),
        }
    }

    /// Classify a reqwest error against the URL it was sent to
    pub(crate) fn from_reqwest(url: &str, err: &reqwest::Error, timeout: Duration) -> Self {
        if err.is_connect() {
            Self::ServiceUnreachable {
                url: url.to_string(),
                reason: err.to_string(),
            }
        } else if err.is_timeout() {
            Self::Timeout(timeout)
        } else {
            Self::Unknown(err.to_string())
        }
    }
}
