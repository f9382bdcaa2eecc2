//! Token buffering and UI throttling
//!
//! Tokens arrive at network speed; surfaces want a bounded repaint rate.
//! [`TokenThrottle`] accumulates fragments and releases them as one batch
//! when either
//!
//! - `batch_size` fragments are pending, or
//! - `flush_interval` has passed since the last flush.
//!
//! The interval trigger is driven by an explicit [`FlushTimer`] so a slow
//! trickle (one fragment, then silence) still reaches the screen on time.
//! Whatever is pending when the stream ends is released by [`TokenThrottle::finish`].

use std::time::Duration;

use futures::future::{self, Either};
use tokio::time::{Instant, Sleep};

/// Cancelable one-shot deadline
///
/// Owns nothing but the deadline: the driver asks for [`FlushTimer::sleep`]
/// each time round its select loop, so cancelling is just clearing the
/// deadline and no callback can outlive the session.
#[derive(Debug, Default)]
pub struct FlushTimer {
    deadline: Option<Instant>,
}

impl FlushTimer {
    /// Create a disarmed timer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the timer for `at`, replacing any earlier deadline
    pub fn schedule(&mut self, at: Instant) {
        self.deadline = Some(at);
    }

    /// Disarm the timer
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    /// Whether a deadline is set
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// The current deadline
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether the deadline has passed
    #[must_use]
    pub fn is_due(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|d| now >= d)
    }

    /// Future that resolves at the deadline, or never when disarmed
    #[must_use]
    pub fn sleep(&self) -> Either<Sleep, future::Pending<()>> {
        match self.deadline {
            Some(at) => Either::Left(tokio::time::sleep_until(at)),
            None => Either::Right(future::pending()),
        }
    }
}

/// Throttle tuning
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ThrottleConfig {
    /// Pending fragments that force a flush
    pub batch_size: usize,
    /// Maximum time a fragment waits before it is flushed
    pub flush_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            flush_interval: Duration::from_millis(32),
        }
    }
}

/// Fragment accumulator with count and time flush triggers
#[derive(Debug)]
pub struct TokenThrottle {
    config: ThrottleConfig,
    pending: String,
    pending_fragments: usize,
    last_flush: Instant,
    timer: FlushTimer,
    batches_emitted: u32,
    fragments_seen: u32,
}

impl TokenThrottle {
    /// Create a throttle; the interval clock starts now
    #[must_use]
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            config,
            pending: String::new(),
            pending_fragments: 0,
            last_flush: Instant::now(),
            timer: FlushTimer::new(),
            batches_emitted: 0,
            fragments_seen: 0,
        }
    }

    /// Take in one fragment, returning a batch if a trigger fired
    pub fn on_token(&mut self, fragment: &str) -> Option<String> {
        self.pending.push_str(fragment);
        self.pending_fragments += 1;
        self.fragments_seen += 1;

        let interval_elapsed = self.last_flush.elapsed() >= self.config.flush_interval;
        if self.pending_fragments >= self.config.batch_size.max(1) || interval_elapsed {
            return self.flush();
        }

        if !self.timer.is_armed() {
            self.timer
                .schedule(self.last_flush + self.config.flush_interval);
        }
        None
    }

    /// Called when the flush timer fires
    pub fn on_timer(&mut self) -> Option<String> {
        if self.timer.is_due(Instant::now()) {
            self.flush()
        } else {
            None
        }
    }

    /// Release everything pending regardless of triggers
    pub fn flush(&mut self) -> Option<String> {
        self.timer.cancel();
        self.last_flush = Instant::now();
        if self.pending.is_empty() {
            return None;
        }
        self.pending_fragments = 0;
        self.batches_emitted += 1;
        Some(std::mem::take(&mut self.pending))
    }

    /// Final flush at end of stream; also disarms the timer
    pub fn finish(&mut self) -> Option<String> {
        self.flush()
    }

    /// The flush timer, for the driver's select loop
    #[must_use]
    pub fn timer(&self) -> &FlushTimer {
        &self.timer
    }

    /// Text waiting for the next flush
    #[must_use]
    pub fn pending(&self) -> &str {
        &self.pending
    }

    /// Batches released so far
    #[must_use]
    pub fn batches_emitted(&self) -> u32 {
        self.batches_emitted
    }

    /// Fragments taken in so far
    #[must_use]
    pub fn fragments_seen(&self) -> u32 {
        self.fragments_seen
    }
}
