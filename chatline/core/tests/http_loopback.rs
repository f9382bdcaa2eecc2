//! The Ollama transport against a real HTTP server on loopback
//!
//! The server is a few lines of `tokio::net`: it reads one request and
//! answers with whatever bytes the test scripted, chunk by chunk, so chunk
//! boundaries can fall anywhere in a record.

mod common;

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use chatline_core::backend::{GenerateRequest, OllamaTransport};
use chatline_core::{
    ChannelObserver, CompletionReason, ErrorKind, GateConfig, StreamConfig, StreamError,
    StreamingClient,
};

use common::{completion, error, until_terminal};

const NDJSON_HEAD: &str = "HTTP/1.1 200 OK\r\n\
    Content-Type: application/x-ndjson\r\n\
    Transfer-Encoding: chunked\r\n\r\n";

/// Read one HTTP request (head plus `Content-Length` body), returning it
async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf);
        if let Some(head_end) = text.find("\r\n\r\n") {
            let length = text[..head_end]
                .lines()
                .find_map(|l| {
                    let (name, value) = l.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buf.len() >= head_end + 4 + length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn chunked(part: &[u8]) -> Vec<u8> {
    let mut out = format!("{:x}\r\n", part.len()).into_bytes();
    out.extend_from_slice(part);
    out.extend_from_slice(b"\r\n");
    out
}

/// Serve one connection: `head`, then each part after its delay
///
/// With `linger` the connection stays open afterwards instead of closing.
async fn serve_once(
    head: &str,
    parts: Vec<(Duration, Vec<u8>)>,
    linger: bool,
) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let head = head.to_string();

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        socket.write_all(head.as_bytes()).await.unwrap();
        for (delay, part) in parts {
            tokio::time::sleep(delay).await;
            socket.write_all(&part).await.unwrap();
            socket.flush().await.unwrap();
        }
        if linger {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        request
    });
    (base_url, server)
}

fn http_client(base_url: &str, stream: StreamConfig) -> StreamingClient {
    let transport = OllamaTransport::new(base_url, Duration::from_secs(5), Duration::from_secs(2))
        .unwrap();
    StreamingClient::with_transport(Arc::new(transport), stream, GateConfig::default())
}

#[tokio::test]
async fn test_generation_streams_over_http() {
    let body = "{\"response\":\"Hel\",\"done\":false}\n\
                {\"response\":\"lo, caf\u{e9}\",\"done\":false}\n\
                {\"response\":\"\",\"done\":true,\"eval_count\":2}\n"
        .as_bytes();
    let split_in_char = body.iter().position(|&b| b == 0xC3).unwrap() + 1;
    let gap = Duration::from_millis(20);
    let parts = vec![
        (gap, chunked(&body[..10])),
        (gap, chunked(&body[10..split_in_char])),
        (gap, chunked(&body[split_in_char..])),
        (gap, b"0\r\n\r\n".to_vec()),
    ];
    let (base_url, server) = serve_once(NDJSON_HEAD, parts, false).await;
    let client = http_client(&base_url, StreamConfig::default());

    let (observer, mut rx) = ChannelObserver::new();
    client.start_generation(GenerateRequest::new("greet me", "llama3.2"), observer);
    let events = until_terminal(&mut rx).await;

    let done = completion(&events);
    assert_eq!(done.content, "Hello, caf\u{e9}");
    assert_eq!(done.reason, CompletionReason::Finished);
    assert_eq!(done.stats.as_ref().and_then(|s| s.eval_count), Some(2));

    let request = server.await.unwrap();
    assert!(request.starts_with("POST /api/generate "), "{request}");
    assert!(request.contains("\"prompt\":\"greet me\""), "{request}");
    assert!(request.contains("\"stream\":true"), "{request}");
}

#[tokio::test]
async fn test_error_status_is_surfaced() {
    let body = "{\"error\":\"model 'nope' not found\"}";
    let head = format!(
        "HTTP/1.1 404 Not Found\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    );
    let (base_url, _server) = serve_once(&head, Vec::new(), false).await;
    let client = http_client(&base_url, StreamConfig::default());

    let (observer, mut rx) = ChannelObserver::new();
    client.start_generation(GenerateRequest::new("hi", "nope"), observer);
    let events = until_terminal(&mut rx).await;

    match error(&events) {
        StreamError::Status { status, body } => {
            assert_eq!(*status, 404);
            assert!(body.contains("not found"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_refused_connection_is_service_offline() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let client = http_client(&base_url, StreamConfig::default());

    let (observer, mut rx) = ChannelObserver::new();
    client.start_generation(GenerateRequest::new("hi", "llama3.2"), observer);
    let events = until_terminal(&mut rx).await;
    assert_eq!(error(&events).kind(), ErrorKind::ServiceUnreachable);

    let err = client.list_models().await.unwrap_err();
    assert!(err.is_service_offline(), "{err:?}");
    assert!(!client.health_check().await);
}

#[tokio::test]
async fn test_model_list_over_http() {
    let body = r#"{"models":[{"name":"llama3.2:latest","size":2019393189,"details":{"parameter_size":"3.2B","quantization_level":"Q4_K_M"}}]}"#;
    let head = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    );
    let (base_url, server) = serve_once(&head, Vec::new(), false).await;
    let client = http_client(&base_url, StreamConfig::default());

    let models = client.list_model_info().await.unwrap();
    assert_eq!(models.len(), 1);
    assert_eq!(models[0].name, "llama3.2:latest");

    // Second call is a cache hit; the one-shot server would refuse it
    assert_eq!(client.list_models().await.unwrap(), vec!["llama3.2:latest"]);

    let request = server.await.unwrap();
    assert!(request.starts_with("GET /api/tags "), "{request}");
}

#[tokio::test]
async fn test_stalled_http_stream_completes_with_text() {
    let parts = vec![(
        Duration::ZERO,
        chunked(b"{\"response\":\"Thinking about\",\"done\":false}\n"),
    )];
    let (base_url, _server) = serve_once(NDJSON_HEAD, parts, true).await;
    let client = http_client(
        &base_url,
        StreamConfig {
            stall_timeout: Duration::from_millis(300),
            watchdog_interval: Duration::from_millis(50),
            read_timeout: Duration::from_secs(10),
            ..StreamConfig::default()
        },
    );

    let (observer, mut rx) = ChannelObserver::new();
    client.start_generation(GenerateRequest::new("hmm", "llama3.2"), observer);
    let events = tokio::time::timeout(Duration::from_secs(5), until_terminal(&mut rx))
        .await
        .expect("stall watchdog should fire well before 5s");

    let done = completion(&events);
    assert_eq!(done.reason, CompletionReason::Stalled);
    assert_eq!(done.content, "Thinking about");
}
