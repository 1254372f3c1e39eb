use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use gemini_api::{
    Content, FinishReason, GeminiApiClient, GeminiApiConfig, GeminiApiError, GenerateContentRequest,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration};

const LOCAL_INTEGRATION_ENV: &str = "GEMINI_API_ALLOW_LOCAL_INTEGRATION";

/// These tests bind a loopback socket, so they only run when opted in.
fn local_integration_enabled() -> bool {
    matches!(
        std::env::var(LOCAL_INTEGRATION_ENV).as_deref(),
        Ok("1" | "true" | "yes")
    )
}

/// One write on the wire, optionally after a pause.
#[derive(Clone)]
struct Segment {
    pause: Duration,
    body: Vec<u8>,
}

impl Segment {
    fn now(body: Vec<u8>) -> Self {
        Self {
            pause: Duration::ZERO,
            body,
        }
    }

    fn after(millis: u64, body: Vec<u8>) -> Self {
        Self {
            pause: Duration::from_millis(millis),
            body,
        }
    }
}

/// What the fake endpoint does with the n-th connection.
#[derive(Clone)]
enum Reply {
    Http {
        status: u16,
        mime: &'static str,
        segments: Vec<Segment>,
    },
    /// Close the socket without answering.
    Hangup,
}

/// Loopback stand-in for the Gemini endpoint that answers from a script.
struct FakeGemini {
    base_url: String,
    hits: Arc<AtomicUsize>,
    accept_loop: JoinHandle<()>,
}

impl FakeGemini {
    async fn start(replies: Vec<Reply>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind loopback listener");
        let base_url = format!("http://{}", listener.local_addr().expect("listener address"));
        let replies = Arc::new(replies);
        let hits = Arc::new(AtomicUsize::new(0));

        let accept_loop = tokio::spawn({
            let replies = Arc::clone(&replies);
            let hits = Arc::clone(&hits);
            async move {
                while let Ok((socket, _)) = listener.accept().await {
                    let index = hits.fetch_add(1, Ordering::SeqCst);
                    let reply = replies.get(index).cloned().unwrap_or_else(|| {
                        json_reply(500, r#"{"error":{"message":"unexpected request"}}"#)
                    });
                    tokio::spawn(answer(socket, reply));
                }
            }
        });

        Self {
            base_url,
            hits,
            accept_loop,
        }
    }

    fn client(&self) -> GeminiApiClient {
        let config = GeminiApiConfig::new("test-key").with_base_url(&self.base_url);
        GeminiApiClient::new(config).expect("client")
    }

    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

impl Drop for FakeGemini {
    fn drop(&mut self) {
        self.accept_loop.abort();
    }
}

fn request() -> GenerateContentRequest {
    GenerateContentRequest::new(vec![Content::user("Ask me something")])
}

fn text_frame(text: &str) -> String {
    format!(r#"{{"candidates":[{{"content":{{"parts":[{{"text":"{text}"}}],"role":"model"}}}}]}}"#)
}

fn finish_frame(reason: &str) -> String {
    format!(
        r#"{{"candidates":[{{"content":{{"parts":[],"role":"model"}},"finishReason":"{reason}"}}],"usageMetadata":{{"promptTokenCount":7,"candidatesTokenCount":3,"totalTokenCount":10}}}}"#
    )
}

fn sse_reply(status: u16, frames: &[String]) -> Reply {
    Reply::Http {
        status,
        mime: "text/event-stream",
        segments: vec![Segment::now(sse_body(frames))],
    }
}

fn json_reply(status: u16, body: &str) -> Reply {
    Reply::Http {
        status,
        mime: "application/json",
        segments: vec![Segment::now(body.as_bytes().to_vec())],
    }
}

fn sse_body(frames: &[String]) -> Vec<u8> {
    frames
        .iter()
        .map(|frame| format!("data: {frame}\r\n\r\n"))
        .collect::<String>()
        .into_bytes()
}

#[tokio::test]
async fn streamed_question_completes_with_stop() {
    if !local_integration_enabled() {
        return;
    }
    let server = FakeGemini::start(vec![sse_reply(
        200,
        &[text_frame("What is "), text_frame("a B-tree?"), finish_frame("STOP")],
    )])
    .await;

    let result = server
        .client()
        .stream(&request(), None)
        .await
        .expect("stream succeeds");

    assert_eq!(result.finish, Some(FinishReason::Stop));
    assert_eq!(result.text(), "What is a B-tree?");
}

#[tokio::test]
async fn safety_finish_fails_the_stream() {
    if !local_integration_enabled() {
        return;
    }
    let server = FakeGemini::start(vec![sse_reply(
        200,
        &[text_frame("partial"), finish_frame("SAFETY")],
    )])
    .await;

    let error = server
        .client()
        .stream(&request(), None)
        .await
        .expect_err("safety finish fails");

    assert!(error.is_safety_block());
}

#[tokio::test]
async fn overloaded_model_is_retried_once_then_streams() {
    if !local_integration_enabled() {
        return;
    }
    let server = FakeGemini::start(vec![
        json_reply(
            503,
            r#"{"error":{"code":503,"message":"The model is overloaded.","status":"UNAVAILABLE"}}"#,
        ),
        sse_reply(200, &[text_frame("ok"), finish_frame("STOP")]),
    ])
    .await;

    let result = timeout(Duration::from_secs(12), server.client().stream(&request(), None))
        .await
        .expect("retry finishes in time")
        .expect("second attempt succeeds");

    assert_eq!(result.finish, Some(FinishReason::Stop));
    assert_eq!(server.hits(), 2);
}

#[tokio::test]
async fn invalid_key_is_reported_without_retry() {
    if !local_integration_enabled() {
        return;
    }
    let server = FakeGemini::start(vec![json_reply(
        400,
        r#"{"error":{"code":400,"message":"API key not valid.","status":"INVALID_ARGUMENT"}}"#,
    )])
    .await;

    let error = server
        .client()
        .stream(&request(), None)
        .await
        .expect_err("bad request fails");

    match &error {
        GeminiApiError::Status(code, message) => {
            assert_eq!(code.as_u16(), 400);
            assert!(message.contains("API key not valid"));
        }
        other => panic!("expected a status error, got {other:?}"),
    }
    assert_eq!(server.hits(), 1);
}

#[tokio::test]
async fn cancel_flag_aborts_a_slow_stream() {
    if !local_integration_enabled() {
        return;
    }
    let server = FakeGemini::start(vec![Reply::Http {
        status: 200,
        mime: "text/event-stream",
        segments: vec![
            Segment::now(sse_body(&[text_frame("stream")])),
            Segment::after(300, sse_body(&[finish_frame("STOP")])),
        ],
    }])
    .await;

    let client = server.client();
    let cancel = Arc::new(AtomicBool::new(false));
    let flip = {
        let cancel = Arc::clone(&cancel);
        async move {
            sleep(Duration::from_millis(120)).await;
            cancel.store(true, Ordering::SeqCst);
        }
    };

    let req = request();
    let (result, ()) = tokio::join!(
        timeout(Duration::from_secs(5), client.stream(&req, Some(&cancel))),
        flip
    );
    let error = result
        .expect("cancelled stream resolves")
        .expect_err("cancel aborts the stream");

    assert!(matches!(error, GeminiApiError::Cancelled));
}

#[tokio::test]
async fn repeated_hangups_exhaust_retries() {
    if !local_integration_enabled() {
        return;
    }
    let server = FakeGemini::start(vec![Reply::Hangup; 4]).await;

    let error = timeout(Duration::from_secs(20), server.client().stream(&request(), None))
        .await
        .expect("retries finish in time")
        .expect_err("hangups surface as a failure");

    assert!(matches!(
        error,
        GeminiApiError::RetryExhausted { status: None, .. }
    ));
    assert!(server.hits() >= 4);
}

async fn answer(mut socket: TcpStream, reply: Reply) {
    if skip_request_head(&mut socket).await.is_err() {
        return;
    }
    let Reply::Http {
        status,
        mime,
        segments,
    } = reply
    else {
        return;
    };

    let reason = match status {
        200 => "OK",
        400 => "Bad Request",
        503 => "Service Unavailable",
        _ => "Error",
    };
    let head = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: {mime}\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n"
    );
    if socket.write_all(head.as_bytes()).await.is_err() {
        return;
    }

    for segment in segments {
        if !segment.pause.is_zero() {
            sleep(segment.pause).await;
        }
        let mut framed = format!("{:X}\r\n", segment.body.len()).into_bytes();
        framed.extend_from_slice(&segment.body);
        framed.extend_from_slice(b"\r\n");
        if socket.write_all(&framed).await.is_err() {
            return;
        }
    }
    let _ = socket.write_all(b"0\r\n\r\n").await;
    let _ = socket.shutdown().await;
}

/// Reads until the blank line ending the request head; the body is ignored.
async fn skip_request_head(socket: &mut TcpStream) -> std::io::Result<()> {
    let mut seen = Vec::with_capacity(1024);
    let mut buf = [0_u8; 1024];
    while !seen.windows(4).any(|window| window == b"\r\n\r\n") {
        let read = socket.read(&mut buf).await?;
        if read == 0 {
            break;
        }
        seen.extend_from_slice(&buf[..read]);
    }
    Ok(())
}
