//! Shared test infrastructure: a scripted in-memory transport

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::mpsc;

use chatline_core::backend::{ByteStream, GenerateRequest, Transport};
use chatline_core::{
    Completion, GateConfig, GenerationEvent, StreamConfig, StreamError, StreamingClient,
};

/// How a scripted body ends after its last chunk
#[derive(Clone, Debug)]
pub enum End {
    /// Clean end of stream
    Close,
    /// Never yields again
    Hang,
    /// Yields a transport error
    Fail(StreamError),
}

/// One scripted answer to `open_stream`
#[derive(Clone, Debug)]
pub enum Reply {
    /// Serve chunks, each after its delay
    Stream {
        steps: Vec<(Duration, Vec<u8>)>,
        end: End,
    },
    /// Fail to open
    Refuse(StreamError),
}

impl Reply {
    /// Chunks served back to back
    pub fn chunks(chunks: &[&str], end: End) -> Self {
        Self::paced(Duration::ZERO, chunks, end)
    }

    /// Chunks served `gap` apart
    pub fn paced(gap: Duration, chunks: &[&str], end: End) -> Self {
        Self::Stream {
            steps: chunks
                .iter()
                .map(|c| (gap, c.as_bytes().to_vec()))
                .collect(),
            end,
        }
    }
}

/// Transport answering from a script
///
/// Each `open_stream` pops the next [`Reply`]; when the script runs dry the
/// stream hangs. JSON calls sleep `json_delay`, count themselves and echo
/// back a fixed model list and version.
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Reply>>,
    json_delay: Duration,
    json_calls: AtomicUsize,
    opened: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Arc<Self> {
        Self::with_json_delay(replies, Duration::ZERO)
    }

    pub fn with_json_delay(replies: impl IntoIterator<Item = Reply>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().collect()),
            json_delay: delay,
            json_calls: AtomicUsize::new(0),
            opened: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    /// Transport used only for JSON calls
    pub fn json_only() -> Arc<Self> {
        Self::new(Vec::<Reply>::new())
    }

    pub fn json_calls(&self) -> usize {
        self.json_calls.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    async fn json_reply(&self, path: &str, body: serde_json::Value) -> serde_json::Value {
        let call = self.json_calls.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.json_delay).await;
        json!({
            "path": path,
            "call": call,
            "echo": body,
            "models": [{ "name": "llama3.2:latest" }, { "name": "phi3:mini" }],
            "version": "0.5.1",
            "response": "pong",
        })
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn name(&self) -> &str {
        "scripted"
    }

    fn base_url(&self) -> &str {
        "scripted://local"
    }

    async fn open_stream(&self, request: &GenerateRequest) -> Result<ByteStream, StreamError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(request.prompt.clone());

        let reply = self.replies.lock().pop_front();
        let (steps, end) = match reply {
            Some(Reply::Refuse(e)) => return Err(e),
            Some(Reply::Stream { steps, end }) => (steps, end),
            None => (Vec::new(), End::Hang),
        };

        let body = futures::stream::iter(steps)
            .then(|(delay, chunk)| async move {
                tokio::time::sleep(delay).await;
                Ok::<_, StreamError>(Bytes::from(chunk))
            })
            .chain(futures::stream::once(async move {
                match end {
                    End::Close => None,
                    End::Hang => futures::future::pending().await,
                    End::Fail(e) => Some(Err(e)),
                }
            })
            .filter_map(futures::future::ready));
        Ok(Box::pin(body))
    }

    async fn get_json(&self, path: &str) -> Result<serde_json::Value, StreamError> {
        Ok(self.json_reply(path, serde_json::Value::Null).await)
    }

    async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, StreamError> {
        Ok(self.json_reply(path, body.clone()).await)
    }
}

/// Streaming tuned for fast tests: stall after 2s, watchdog every 100ms
pub fn test_stream_config() -> StreamConfig {
    StreamConfig {
        stall_timeout: Duration::from_secs(2),
        watchdog_interval: Duration::from_millis(100),
        read_timeout: Duration::from_secs(10),
        ..StreamConfig::default()
    }
}

pub fn client(transport: Arc<ScriptedTransport>) -> StreamingClient {
    StreamingClient::with_transport(transport, test_stream_config(), GateConfig::default())
}

/// Drain events up to and including the terminal one
pub async fn until_terminal(rx: &mut mpsc::UnboundedReceiver<GenerationEvent>) -> Vec<GenerationEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        let terminal = event.is_terminal();
        events.push(event);
        if terminal {
            break;
        }
    }
    events
}

/// Token batches in arrival order
pub fn batches(events: &[GenerationEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            GenerationEvent::Tokens(batch) => Some(batch.clone()),
            _ => None,
        })
        .collect()
}

/// The single completion, panicking on anything else
pub fn completion(events: &[GenerationEvent]) -> &Completion {
    let terminals: Vec<_> = events.iter().filter(|e| e.is_terminal()).collect();
    assert_eq!(terminals.len(), 1, "expected one terminal event: {events:?}");
    match terminals[0] {
        GenerationEvent::Complete(done) => done,
        other => panic!("expected completion, got {other:?}"),
    }
}

/// The single error, panicking on anything else
pub fn error(events: &[GenerationEvent]) -> &StreamError {
    let terminals: Vec<_> = events.iter().filter(|e| e.is_terminal()).collect();
    assert_eq!(terminals.len(), 1, "expected one terminal event: {events:?}");
    match terminals[0] {
        GenerationEvent::Error(e) => e,
        other => panic!("expected error, got {other:?}"),
    }
}
