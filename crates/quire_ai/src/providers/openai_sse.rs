//! SSE parsing for OpenAI-compatible chat completion streams.
//!
//! ```text
//! data: {"id":"...","choices":[{"delta":{"content":"Hello"},...}]}
//! data: {"id":"...","choices":[{"delta":{"content":" world"},...}]}
//! data: [DONE]
//! ```
//!
//! The driver reads the response body, splits it into lines and forwards
//! [`StreamEvent`]s over an mpsc channel. Bytes are buffered until a full
//! line is available, so a multi-byte character split across two network
//! chunks is decoded correctly.

use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::ProviderError;
use crate::stream::{CancelHandle, StreamEvent};
use crate::types::TokenUsage;

// ---------------------------------------------------------------------------
// Wire types (deserialization only)
// ---------------------------------------------------------------------------

/// Top-level SSE JSON frame from `/chat/completions` (streaming).
#[derive(Debug, Deserialize)]
pub(crate) struct SseFrame {
    #[serde(default)]
    pub choices: Vec<SseChoice>,
    pub usage: Option<SseUsage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SseChoice {
    pub delta: Option<SseDelta>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SseDelta {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SseUsage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

impl SseUsage {
    fn to_usage(&self) -> TokenUsage {
        let p = self.prompt_tokens.unwrap_or(0);
        let c = self.completion_tokens.unwrap_or(0);
        TokenUsage {
            prompt_tokens: p,
            completion_tokens: c,
            total_tokens: self.total_tokens.unwrap_or(p + c),
        }
    }
}

/// What a single line of the body means to the driver.
#[derive(Debug, PartialEq)]
pub(crate) enum SseLine {
    Delta(String),
    Usage(TokenUsage),
    Done,
    Skip,
}

/// Interpret one line (without its trailing newline).
pub(crate) fn parse_line(line: &str) -> SseLine {
    let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else {
        // Blank separators, comments (`:`) and other SSE fields.
        return SseLine::Skip;
    };
    let data = data.trim_start();

    if data == "[DONE]" {
        return SseLine::Done;
    }

    match serde_json::from_str::<SseFrame>(data) {
        Ok(frame) => {
            let content = frame
                .choices
                .first()
                .and_then(|c| c.delta.as_ref())
                .and_then(|d| d.content.clone())
                .unwrap_or_default();
            if !content.is_empty() {
                SseLine::Delta(content)
            } else if let Some(u) = &frame.usage {
                SseLine::Usage(u.to_usage())
            } else {
                SseLine::Skip
            }
        }
        Err(e) => {
            debug!("Skipping malformed SSE JSON: {e} -- data: {data}");
            SseLine::Skip
        }
    }
}

// ---------------------------------------------------------------------------
// SSE stream driver
// ---------------------------------------------------------------------------

/// Consume a `reqwest::Response` carrying SSE chat completion deltas and
/// forward them on `tx`.
///
/// Stops reading as soon as `[DONE]` arrives, `cancel` fires or the
/// receiver goes away; the response body is dropped on return.
/// Meant to be spawned via `tokio::spawn`.
pub(crate) async fn drive_sse_stream(
    resp: reqwest::Response,
    tx: mpsc::Sender<StreamEvent>,
    cancel: CancelHandle,
) {
    let mut body = resp.bytes_stream();
    let mut pending: Vec<u8> = Vec::new();
    let mut usage: Option<TokenUsage> = None;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("SSE stream cancelled");
                let _ = tx.try_send(StreamEvent::Cancelled);
                return;
            }
            _ = tx.closed() => {
                debug!("SSE receiver dropped; abandoning stream");
                return;
            }
            next = body.next() => next,
        };

        let bytes = match next {
            Some(Ok(b)) => b,
            Some(Err(e)) => {
                warn!("SSE stream read error: {e}");
                let _ = tx
                    .send(StreamEvent::Error(ProviderError::Network(e.to_string())))
                    .await;
                return;
            }
            None => break,
        };

        pending.extend_from_slice(&bytes);

        // Process complete lines.
        while let Some(newline_pos) = pending.iter().position(|b| *b == b'\n') {
            let line_bytes: Vec<u8> = pending.drain(..=newline_pos).collect();
            let line = String::from_utf8_lossy(&line_bytes);

            match parse_line(&line) {
                SseLine::Delta(content) => {
                    if tx.send(StreamEvent::Delta(content)).await.is_err() {
                        return; // receiver dropped
                    }
                }
                SseLine::Usage(u) => usage = Some(u),
                SseLine::Done => {
                    let _ = tx.send(StreamEvent::Done { usage }).await;
                    return;
                }
                SseLine::Skip => {}
            }
        }
    }

    // Transport ended; a final unterminated line may still hold data.
    if !pending.is_empty() {
        let line = String::from_utf8_lossy(&pending).into_owned();
        match parse_line(&line) {
            SseLine::Delta(content) => {
                if tx.send(StreamEvent::Delta(content)).await.is_err() {
                    return;
                }
            }
            SseLine::Done => {
                let _ = tx.send(StreamEvent::Done { usage }).await;
                return;
            }
            SseLine::Usage(_) | SseLine::Skip => {}
        }
    }

    debug!("SSE stream ended without [DONE]");
    let _ = tx.send(StreamEvent::Closed).await;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{CompletionStream, STREAM_CHANNEL_CAPACITY};
    use crate::types::{FinishReason, ProviderKind};

    fn mock_response<S>(body: S) -> reqwest::Response
    where
        S: futures::Stream<Item = Result<bytes::Bytes, std::io::Error>> + Send + 'static,
    {
        let resp = http::Response::builder()
            .status(200)
            .body(reqwest::Body::wrap_stream(body))
            .unwrap();
        reqwest::Response::from(resp)
    }

    fn chunks(parts: Vec<&'static [u8]>) -> reqwest::Response {
        mock_response(futures::stream::iter(
            parts
                .into_iter()
                .map(|p| Ok::<_, std::io::Error>(bytes::Bytes::from_static(p))),
        ))
    }

    async fn run(resp: reqwest::Response) -> Vec<StreamEvent> {
        let (tx, mut rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        tokio::spawn(drive_sse_stream(resp, tx, CancelHandle::new()));
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    fn delta(text: &str) -> String {
        format!(
            "data: {{\"id\":\"1\",\"choices\":[{{\"delta\":{{\"content\":{}}},\"index\":0}}]}}\n\n",
            serde_json::to_string(text).unwrap()
        )
    }

    #[test]
    fn parse_line_variants() {
        assert_eq!(parse_line(&delta("Hello")), SseLine::Delta("Hello".into()));
        assert_eq!(parse_line("data: [DONE]"), SseLine::Done);
        assert_eq!(parse_line("data:[DONE]\r"), SseLine::Done);
        assert_eq!(parse_line(""), SseLine::Skip);
        assert_eq!(parse_line(": keep-alive"), SseLine::Skip);
        assert_eq!(parse_line("event: message"), SseLine::Skip);
        assert_eq!(parse_line("data: {not json"), SseLine::Skip);
        assert_eq!(
            parse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
            SseLine::Skip
        );
        assert_eq!(
            parse_line(
                r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}],"usage":{"prompt_tokens":3,"completion_tokens":2}}"#
            ),
            SseLine::Usage(TokenUsage {
                prompt_tokens: 3,
                completion_tokens: 2,
                total_tokens: 5
            })
        );
    }

    #[tokio::test]
    async fn drive_sse_stream_parses_chunks() {
        let payload = format!(
            "{}{}{}{}data: [DONE]\n\n",
            r#"data: {"id":"1","choices":[{"delta":{"role":"assistant"},"index":0}]}"#.to_string() + "\n\n",
            delta("Hello"),
            delta(" world"),
            r#"data: {"id":"1","choices":[{"delta":{},"finish_reason":"stop"}],"usage":{"prompt_tokens":3,"completion_tokens":2,"total_tokens":5}}"#.to_string() + "\n\n",
        );
        let resp = mock_response(futures::stream::once(async move {
            Ok::<_, std::io::Error>(bytes::Bytes::from(payload))
        }));

        let events = run(resp).await;
        assert_eq!(events.len(), 3, "{events:?}");
        assert!(matches!(&events[0], StreamEvent::Delta(t) if t == "Hello"));
        assert!(matches!(&events[1], StreamEvent::Delta(t) if t == " world"));
        match &events[2] {
            StreamEvent::Done { usage: Some(u) } => assert_eq!(u.total_tokens, 5),
            other => panic!("expected Done with usage, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn lines_split_across_chunks_are_reassembled() {
        // "é" is two bytes; split the frame in the middle of it.
        let line = delta("caf\u{e9}");
        let bytes: &'static [u8] = Box::leak(line.into_bytes().into_boxed_slice());
        let split = bytes.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let resp = chunks(vec![&bytes[..split], &bytes[split..], &b"data: [DONE]\n"[..]]);

        let events = run(resp).await;
        assert!(matches!(&events[0], StreamEvent::Delta(t) if t == "caf\u{e9}"));
        assert!(matches!(&events[1], StreamEvent::Done { .. }));
    }

    #[tokio::test]
    async fn malformed_frames_are_skipped() {
        let good = delta("ok");
        let bytes: &'static [u8] = Box::leak(good.into_bytes().into_boxed_slice());
        let resp = chunks(vec![&b"data: {\"choices\": [\n"[..], bytes, &b"data: [DONE]\n"[..]]);

        let events = run(resp).await;
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], StreamEvent::Delta(t) if t == "ok"));
    }

    #[tokio::test]
    async fn done_stops_reading_before_transport_ends() {
        // The body never ends after [DONE]; the driver must not wait for it.
        let head = futures::stream::iter(vec![Ok::<_, std::io::Error>(bytes::Bytes::from(
            format!("{}data: [DONE]\n", delta("Hi")),
        ))]);
        let resp = mock_response(head.chain(futures::stream::pending()));

        let events = tokio::time::timeout(std::time::Duration::from_secs(2), run(resp))
            .await
            .expect("driver should return after [DONE]");
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[1], StreamEvent::Done { .. }));
    }

    #[tokio::test]
    async fn end_without_done_reports_closed() {
        let resp = chunks(vec![&b"data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}"[..]]);
        let events = run(resp).await;
        assert!(matches!(&events[0], StreamEvent::Delta(t) if t == "tail"));
        assert!(matches!(&events[1], StreamEvent::Closed));
    }

    #[tokio::test]
    async fn read_error_becomes_network_error() {
        let body = futures::stream::iter(vec![
            Ok(bytes::Bytes::from(delta("a"))),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ]);
        let events = run(mock_response(body)).await;
        assert!(matches!(&events[0], StreamEvent::Delta(_)));
        assert!(matches!(&events[1], StreamEvent::Error(ProviderError::Network(_))));
    }

    #[tokio::test]
    async fn cancel_stops_a_hanging_stream() {
        let head = futures::stream::iter(vec![Ok::<_, std::io::Error>(bytes::Bytes::from(
            delta("partial"),
        ))]);
        let resp = mock_response(head.chain(futures::stream::pending()));

        let cancel = CancelHandle::new();
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let driver = tokio::spawn(drive_sse_stream(resp, tx, cancel.clone()));
        let stream = CompletionStream::new(rx, cancel.clone(), "gpt-4o", ProviderKind::OpenAI);

        let mut seen = Vec::new();
        let canceller = cancel.clone();
        let result = stream
            .collect_with(|text| {
                seen.push(text.to_string());
                canceller.cancel();
            })
            .await
            .unwrap();

        assert_eq!(seen, vec!["partial"]);
        assert_eq!(result.text, "partial");
        assert_eq!(result.finish, FinishReason::Cancelled);
        tokio::time::timeout(std::time::Duration::from_secs(2), driver)
            .await
            .expect("driver should stop after cancel")
            .unwrap();
    }
}
