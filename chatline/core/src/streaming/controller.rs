//! Stream Controller
//!
//! One [`StreamSession`] per generation. The session owns a driver task that
//! runs the whole pipeline:
//!
//! ```text
//!   transport bytes ─► ChunkDecoder ─► LineReassembler ─► RecordParser
//!                                                             │
//!                 observer.on_tokens ◄── TokenThrottle ◄──────┘
//! ```
//!
//! The driver selects over external cancellation, the next chunk, the
//! throttle's flush timer, the stall watchdog and a read deadline. All of
//! them run on the same task, so there is no shared-memory race, only
//! interleaving. Every terminal path goes through one guarded `finish`/`fail`
//! pair, which makes the terminal callback fire exactly once.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::decoder::ChunkDecoder;
use super::lines::LineReassembler;
use super::record::{GenerationStats, ParserOptions, RecordParser};
use super::throttle::{ThrottleConfig, TokenThrottle};
use crate::backend::{ByteStream, GenerateRequest, Transport};
use crate::error::StreamError;
use crate::gate::RequestGate;

// ============================================================================
// Configuration
// ============================================================================

/// Tuning for one generation session
#[derive(Clone, Copy, Debug)]
pub struct StreamConfig {
    /// Batching and repaint rate
    pub throttle: ThrottleConfig,
    /// Fragment filtering
    pub parser: ParserOptions,
    /// Byte-level silence after which a started stream is force-completed
    pub stall_timeout: Duration,
    /// How often the watchdog checks for a stall
    pub watchdog_interval: Duration,
    /// Bound on waiting for the response head, and on silence before the
    /// first byte
    pub read_timeout: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            throttle: ThrottleConfig::default(),
            parser: ParserOptions::default(),
            stall_timeout: Duration::from_secs(30),
            watchdog_interval: Duration::from_secs(1),
            read_timeout: Duration::from_secs(120),
        }
    }
}

// ============================================================================
// Session Types
// ============================================================================

/// Session identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a new unique session ID
    #[must_use]
    pub fn new() -> Self {
        Self(format!("gen_{}", uuid::Uuid::new_v4().simple()))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of a session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Created, driver not yet running
    Idle,
    /// Request sent, waiting for the response head
    Requesting,
    /// Reading the body; the only state that delivers tokens
    Streaming,
    /// Finished with a completion (including stall-forced)
    Completed,
    /// Finished with an error
    Errored,
    /// Stopped or superseded; partial text was delivered as a completion
    Cancelled,
}

impl SessionState {
    /// Whether the session has reached a final state
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Errored | Self::Cancelled)
    }
}

/// How a session reached its completion
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletionReason {
    /// The server sent its final `done` record
    Finished,
    /// The body ended without a `done` record
    EndOfStream,
    /// The watchdog forced completion after the stream went quiet
    Stalled,
    /// `stop()` was called
    Stopped,
    /// A newer generation replaced this one
    Superseded,
}

/// Terminal result of a successful (or salvaged) session
#[derive(Clone, Debug, PartialEq)]
pub struct Completion {
    /// Session this belongs to
    pub session_id: SessionId,
    /// Full accumulated text
    pub content: String,
    /// Path that ended the session
    pub reason: CompletionReason,
    /// Deliverable fragments received
    pub token_count: u32,
    /// Raw bytes received
    pub bytes_received: u64,
    /// Wall time from start to completion
    pub duration: Duration,
    /// Server-reported counters, when a final record arrived
    pub stats: Option<GenerationStats>,
}

impl Completion {
    /// Whether the answer may be shorter than what the model would have said
    #[must_use]
    pub fn is_partial(&self) -> bool {
        matches!(
            self.reason,
            CompletionReason::Stalled | CompletionReason::Stopped | CompletionReason::Superseded
        )
    }
}

/// Point-in-time view of a session
#[derive(Clone, Debug)]
pub struct SessionSnapshot {
    /// Session identifier
    pub id: SessionId,
    /// Model generating
    pub model: String,
    /// Current state
    pub state: SessionState,
    /// Length in bytes of the accumulated text
    pub text_len: usize,
    /// Raw bytes received
    pub bytes_received: u64,
    /// Deliverable fragments received
    pub token_count: u32,
    /// Wall-clock start
    pub started_at: DateTime<Utc>,
    /// Time since the last chunk arrived (or since the stream opened)
    pub idle_for: Option<Duration>,
}

// ============================================================================
// Observers
// ============================================================================

/// Receives the output of one session
///
/// All methods are called from the session's driver task, in order, never
/// concurrently. Exactly one of `on_complete`/`on_error` is called, last.
pub trait GenerationObserver: Send + 'static {
    /// A batch of text is ready for display
    fn on_tokens(&mut self, batch: &str);

    /// The session completed; `completion.content` is the full text
    fn on_complete(&mut self, completion: &Completion);

    /// The session failed
    fn on_error(&mut self, error: &StreamError);
}

type TokenFn = Box<dyn FnMut(&str) + Send>;
type CompleteFn = Box<dyn FnMut(&Completion) + Send>;
type ErrorFn = Box<dyn FnMut(&StreamError) + Send>;

/// Observer built from three closures
pub struct GenerationCallbacks {
    on_token: TokenFn,
    on_complete: CompleteFn,
    on_error: ErrorFn,
}

impl GenerationCallbacks {
    /// Create from token, completion and error closures
    pub fn new<T, C, E>(on_token: T, on_complete: C, on_error: E) -> Self
    where
        T: FnMut(&str) + Send + 'static,
        C: FnMut(&Completion) + Send + 'static,
        E: FnMut(&StreamError) + Send + 'static,
    {
        Self {
            on_token: Box::new(on_token),
            on_complete: Box::new(on_complete),
            on_error: Box::new(on_error),
        }
    }
}

impl fmt::Debug for GenerationCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationCallbacks").finish_non_exhaustive()
    }
}

impl GenerationObserver for GenerationCallbacks {
    fn on_tokens(&mut self, batch: &str) {
        (self.on_token)(batch);
    }

    fn on_complete(&mut self, completion: &Completion) {
        (self.on_complete)(completion);
    }

    fn on_error(&mut self, error: &StreamError) {
        (self.on_error)(error);
    }
}

/// Session output as a channel message
#[derive(Clone, Debug)]
pub enum GenerationEvent {
    /// A batch of text
    Tokens(String),
    /// Terminal: completed
    Complete(Completion),
    /// Terminal: failed
    Error(StreamError),
}

impl GenerationEvent {
    /// Whether this is the last event of its session
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Tokens(_))
    }
}

/// Observer that forwards everything into an mpsc channel
#[derive(Clone, Debug)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<GenerationEvent>,
}

impl ChannelObserver {
    /// Create an observer and the receiving end of its channel
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<GenerationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: GenerationEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("Generation event receiver dropped");
        }
    }
}

impl GenerationObserver for ChannelObserver {
    fn on_tokens(&mut self, batch: &str) {
        self.send(GenerationEvent::Tokens(batch.to_string()));
    }

    fn on_complete(&mut self, completion: &Completion) {
        self.send(GenerationEvent::Complete(completion.clone()));
    }

    fn on_error(&mut self, error: &StreamError) {
        self.send(GenerationEvent::Error(error.clone()));
    }
}

// ============================================================================
// Session Handle
// ============================================================================

/// State shared between the handle and the driver
#[derive(Debug)]
struct SessionShared {
    state: SessionState,
    cancel_reason: Option<CompletionReason>,
    text_len: usize,
    bytes_received: u64,
    token_count: u32,
    last_activity: Option<Instant>,
}

/// Handle to one running generation
///
/// Dropping the handle does not stop the driver; use [`StreamSession::stop`].
#[derive(Debug)]
pub struct StreamSession {
    id: SessionId,
    model: String,
    started_at: DateTime<Utc>,
    cancel: CancellationToken,
    shared: Arc<Mutex<SessionShared>>,
    task: JoinHandle<()>,
}

impl StreamSession {
    /// Start a generation on the current tokio runtime
    ///
    /// The cancellation token exists before the driver first runs, so a
    /// `stop()` issued immediately still takes effect.
    pub fn spawn(
        transport: Arc<dyn Transport>,
        request: GenerateRequest,
        config: StreamConfig,
        observer: Box<dyn GenerationObserver>,
    ) -> Self {
        Self::spawn_gated(transport, None, request, config, observer)
    }

    /// Start a generation whose request waits for a slot in `gate`
    ///
    /// The slot is held only until the response head arrives.
    pub fn spawn_gated(
        transport: Arc<dyn Transport>,
        gate: Option<Arc<RequestGate>>,
        request: GenerateRequest,
        config: StreamConfig,
        observer: Box<dyn GenerationObserver>,
    ) -> Self {
        let id = SessionId::new();
        let cancel = CancellationToken::new();
        let shared = Arc::new(Mutex::new(SessionShared {
            state: SessionState::Idle,
            cancel_reason: None,
            text_len: 0,
            bytes_received: 0,
            token_count: 0,
            last_activity: None,
        }));

        let model = request.model.clone();
        let driver = Driver::new(
            id.clone(),
            transport,
            gate,
            request,
            config,
            observer,
            cancel.clone(),
            Arc::clone(&shared),
        );
        let task = tokio::spawn(driver.run());

        Self {
            id,
            model,
            started_at: Utc::now(),
            cancel,
            shared,
            task,
        }
    }

    /// Session identifier
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Stop the generation, keeping whatever text has arrived
    ///
    /// Returns `false` if the session had already ended (a no-op).
    pub fn stop(&self) -> bool {
        self.cancel_with(CompletionReason::Stopped)
    }

    /// Stop because a newer generation takes over
    pub(crate) fn supersede(&self) -> bool {
        self.cancel_with(CompletionReason::Superseded)
    }

    fn cancel_with(&self, reason: CompletionReason) -> bool {
        {
            let mut shared = self.shared.lock();
            if shared.state.is_terminal() || shared.cancel_reason.is_some() {
                return false;
            }
            shared.cancel_reason = Some(reason);
        }
        tracing::debug!(session_id = %self.id, ?reason, "Cancelling generation");
        self.cancel.cancel();
        true
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.shared.lock().state
    }

    /// Whether the session can still produce output
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.state().is_terminal() && !self.task.is_finished()
    }

    /// Point-in-time view
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        let shared = self.shared.lock();
        SessionSnapshot {
            id: self.id.clone(),
            model: self.model.clone(),
            state: shared.state,
            text_len: shared.text_len,
            bytes_received: shared.bytes_received,
            token_count: shared.token_count,
            started_at: self.started_at,
            idle_for: shared.last_activity.map(|at| at.elapsed()),
        }
    }

    /// Wait for the driver to finish
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            tracing::error!(session_id = %self.id, error = %e, "Generation task failed");
        }
    }
}

// ============================================================================
// Driver
// ============================================================================

/// What woke the driver
enum Wake {
    Cancelled,
    Chunk(Bytes),
    Failed(StreamError),
    EndOfStream,
    FlushDue,
    Watchdog,
    ReadTimeout,
}

/// Outcome of feeding one chunk
enum Fed {
    More,
    Done,
    ServerError(String),
}

/// Wait for a gate slot (no bound on the wait), then send the request and
/// wait at most `read_timeout` for the response head
async fn open_stream(
    transport: &dyn Transport,
    gate: Option<&RequestGate>,
    request: &GenerateRequest,
    read_timeout: Duration,
) -> Result<ByteStream, StreamError> {
    let _permit = match gate {
        Some(gate) => Some(gate.acquire().await?),
        None => None,
    };
    tokio::time::timeout(read_timeout, transport.open_stream(request))
        .await
        .map_err(|_| StreamError::Timeout(read_timeout))?
}

struct Driver {
    id: SessionId,
    transport: Arc<dyn Transport>,
    gate: Option<Arc<RequestGate>>,
    request: GenerateRequest,
    config: StreamConfig,
    observer: Box<dyn GenerationObserver>,
    cancel: CancellationToken,
    shared: Arc<Mutex<SessionShared>>,

    decoder: ChunkDecoder,
    lines: LineReassembler,
    parser: RecordParser,
    throttle: TokenThrottle,

    text: String,
    token_count: u32,
    bytes_received: u64,
    started: Instant,
    last_activity: Instant,
    stats: Option<GenerationStats>,
    finished: bool,
}

impl Driver {
    #[allow(clippy::too_many_arguments)]
    fn new(
        id: SessionId,
        transport: Arc<dyn Transport>,
        gate: Option<Arc<RequestGate>>,
        request: GenerateRequest,
        config: StreamConfig,
        observer: Box<dyn GenerationObserver>,
        cancel: CancellationToken,
        shared: Arc<Mutex<SessionShared>>,
    ) -> Self {
        let now = Instant::now();
        Self {
            id,
            transport,
            gate,
            request,
            config,
            observer,
            cancel,
            shared,
            decoder: ChunkDecoder::new(),
            lines: LineReassembler::new(),
            parser: RecordParser::new(config.parser),
            throttle: TokenThrottle::new(config.throttle),
            text: String::new(),
            token_count: 0,
            bytes_received: 0,
            started: now,
            last_activity: now,
            stats: None,
            finished: false,
        }
    }

    async fn run(mut self) {
        self.set_state(SessionState::Requesting);
        tracing::info!(
            session_id = %self.id,
            model = %self.request.model,
            backend = self.transport.name(),
            "Starting generation"
        );

        let opened = tokio::select! {
            biased;
            () = self.cancel.cancelled() => None,
            result = open_stream(
                self.transport.as_ref(),
                self.gate.as_deref(),
                &self.request,
                self.config.read_timeout,
            ) => Some(result),
        };

        let mut stream = match opened {
            None => {
                self.finish(self.cancel_reason());
                return;
            }
            Some(Ok(stream)) => stream,
            Some(Err(e)) => {
                self.fail(e);
                return;
            }
        };

        self.last_activity = Instant::now();
        self.set_state(SessionState::Streaming);

        let period = self.config.watchdog_interval;
        let mut watchdog = tokio::time::interval_at(Instant::now() + period, period);
        watchdog.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let read_deadline = self.last_activity + self.config.read_timeout;
            let wake = tokio::select! {
                biased;
                () = self.cancel.cancelled() => Wake::Cancelled,
                next = stream.next() => match next {
                    Some(Ok(chunk)) => Wake::Chunk(chunk),
                    Some(Err(e)) => Wake::Failed(e),
                    None => Wake::EndOfStream,
                },
                () = self.throttle.timer().sleep() => Wake::FlushDue,
                _ = watchdog.tick() => Wake::Watchdog,
                () = tokio::time::sleep_until(read_deadline) => Wake::ReadTimeout,
            };

            match wake {
                Wake::Cancelled => {
                    self.finish(self.cancel_reason());
                    break;
                }
                Wake::Chunk(chunk) => match self.feed(&chunk) {
                    Fed::More => {}
                    Fed::Done => {
                        self.finish(CompletionReason::Finished);
                        break;
                    }
                    Fed::ServerError(message) => {
                        self.fail(StreamError::Unknown(message));
                        break;
                    }
                },
                Wake::Failed(e) => {
                    self.fail(e);
                    break;
                }
                Wake::EndOfStream => {
                    self.finish(CompletionReason::EndOfStream);
                    break;
                }
                Wake::FlushDue => {
                    if let Some(batch) = self.throttle.on_timer() {
                        self.deliver(&batch);
                    }
                }
                Wake::Watchdog => {
                    if self.is_stalled() {
                        tracing::warn!(
                            session_id = %self.id,
                            bytes_received = self.bytes_received,
                            idle_ms = self.last_activity.elapsed().as_millis() as u64,
                            "Stream stalled, completing with accumulated text"
                        );
                        self.finish(CompletionReason::Stalled);
                        break;
                    }
                }
                Wake::ReadTimeout => {
                    if self.bytes_received > 0 {
                        tracing::warn!(
                            session_id = %self.id,
                            "Read timeout after partial response, completing with accumulated text"
                        );
                        self.finish(CompletionReason::Stalled);
                    } else {
                        self.fail(StreamError::Timeout(self.config.read_timeout));
                    }
                    break;
                }
            }
        }

        // Dropping the body aborts the underlying connection
        drop(stream);
    }

    /// Route one chunk through decoder, reassembler, parser and throttle
    fn feed(&mut self, chunk: &[u8]) -> Fed {
        self.bytes_received += chunk.len() as u64;
        self.last_activity = Instant::now();

        let text = self.decoder.decode(chunk);
        let mut outcome = Fed::More;

        for line in self.lines.push(&text) {
            let Some(record) = self.parser.parse(&line) else {
                continue;
            };

            if let Some(fragment) = self.parser.deliverable(&record) {
                self.text.push_str(fragment);
                self.token_count += 1;
                if let Some(batch) = self.throttle.on_token(fragment) {
                    self.deliver(&batch);
                }
            }

            if let Some(error) = &record.error {
                outcome = Fed::ServerError(error.clone());
                break;
            }
            if record.done {
                self.stats = record.stats();
                outcome = Fed::Done;
                break;
            }
        }

        let mut shared = self.shared.lock();
        shared.bytes_received = self.bytes_received;
        shared.text_len = self.text.len();
        shared.token_count = self.token_count;
        shared.last_activity = Some(self.last_activity);
        outcome
    }

    fn deliver(&mut self, batch: &str) {
        if self.shared.lock().state != SessionState::Streaming {
            return;
        }
        tracing::debug!(session_id = %self.id, len = batch.len(), "Flushing token batch");
        self.observer.on_tokens(batch);
    }

    fn is_stalled(&self) -> bool {
        self.bytes_received > 0 && self.last_activity.elapsed() >= self.config.stall_timeout
    }

    fn cancel_reason(&self) -> CompletionReason {
        self.shared
            .lock()
            .cancel_reason
            .unwrap_or(CompletionReason::Stopped)
    }

    fn set_state(&self, state: SessionState) {
        let mut shared = self.shared.lock();
        shared.state = state;
        if state == SessionState::Streaming {
            shared.last_activity = Some(self.last_activity);
        }
    }

    /// Flush what is pending and drop incomplete input
    fn drain(&mut self) {
        if let Some(batch) = self.throttle.finish() {
            self.deliver(&batch);
        }
        self.decoder.finish();
        let dropped = self.lines.discard();
        if dropped > 0 {
            tracing::debug!(session_id = %self.id, dropped, "Discarding unterminated line");
        }
    }

    fn finish(&mut self, reason: CompletionReason) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.drain();

        let state = match reason {
            CompletionReason::Stopped | CompletionReason::Superseded => SessionState::Cancelled,
            _ => SessionState::Completed,
        };
        self.set_state(state);

        let completion = Completion {
            session_id: self.id.clone(),
            content: std::mem::take(&mut self.text),
            reason,
            token_count: self.token_count,
            bytes_received: self.bytes_received,
            duration: self.started.elapsed(),
            stats: self.stats.take(),
        };
        tracing::info!(
            session_id = %self.id,
            ?reason,
            tokens = completion.token_count,
            bytes = completion.bytes_received,
            malformed = self.parser.malformed_count(),
            duration_ms = completion.duration.as_millis() as u64,
            "Generation complete"
        );
        self.observer.on_complete(&completion);
    }

    fn fail(&mut self, error: StreamError) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.drain();
        self.set_state(SessionState::Errored);
        tracing::error!(session_id = %self.id, error = %error, "Generation failed");
        self.observer.on_error(&error);
    }
}
