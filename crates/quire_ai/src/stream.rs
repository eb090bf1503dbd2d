//! The consumer side of a streaming completion.
//!
//! A provider hands back a [`CompletionStream`]: an async sequence of
//! [`StreamEvent`]s fed by a background task. The stream can be cancelled
//! through a [`CancelHandle`] at any point; dropping it also stops the
//! producer, which watches for the receiving side to close.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::formatting::format_api_response;
use crate::providers::ProviderError;
use crate::types::{CompletionResult, FinishReason, ProviderKind, TokenUsage};

/// Capacity of the channel between the SSE driver and the consumer.
pub const STREAM_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug)]
pub enum StreamEvent {
    /// Newly received text. Never empty.
    Delta(String),
    /// The server signaled the end of the completion.
    Done { usage: Option<TokenUsage> },
    /// The transport closed without an end-of-stream sentinel.
    Closed,
    Cancelled,
    Error(ProviderError),
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Cloneable handle that stops an in-flight stream.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`CancelHandle::cancel`] has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so `wait_for` only errors if it is
        // dropped, which cannot happen while we hold it.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// CompletionStream
// ---------------------------------------------------------------------------

pub struct CompletionStream {
    rx: mpsc::Receiver<StreamEvent>,
    cancel: CancelHandle,
    model: String,
    provider: ProviderKind,
}

impl CompletionStream {
    pub fn new(
        rx: mpsc::Receiver<StreamEvent>,
        cancel: CancelHandle,
        model: impl Into<String>,
        provider: ProviderKind,
    ) -> Self {
        Self {
            rx,
            cancel,
            model: model.into(),
            provider,
        }
    }

    /// A stream that yields the given events and then ends. Used by
    /// providers that answer without a network round trip.
    pub fn from_events(
        events: Vec<StreamEvent>,
        model: impl Into<String>,
        provider: ProviderKind,
    ) -> Self {
        let (tx, rx) = mpsc::channel(events.len().max(1));
        for event in events {
            // Capacity matches the event count, so this cannot fail.
            let _ = tx.try_send(event);
        }
        Self::new(rx, CancelHandle::new(), model, provider)
    }

    /// Tie the stream to an existing cancel handle.
    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn provider(&self) -> ProviderKind {
        self.provider
    }

    /// Drain the stream, calling `on_update` with the cumulative formatted
    /// text after every delta. Returns the final formatted text.
    ///
    /// Errors reported by the producer are returned as-is; a cancelled
    /// stream returns the partial text with [`FinishReason::Cancelled`].
    pub async fn collect_with<F>(mut self, mut on_update: F) -> Result<CompletionResult, ProviderError>
    where
        F: FnMut(&str),
    {
        let mut buffer = StreamBuffer::new();
        let mut usage = None;
        let finish = loop {
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break FinishReason::Cancelled,
                event = self.rx.recv() => event,
            };
            match event {
                Some(StreamEvent::Delta(text)) => {
                    let formatted = buffer.push(&text);
                    on_update(formatted);
                }
                Some(StreamEvent::Done { usage: u }) => {
                    usage = u;
                    break FinishReason::Done;
                }
                Some(StreamEvent::Closed) | None => break FinishReason::EndOfStream,
                Some(StreamEvent::Cancelled) => break FinishReason::Cancelled,
                Some(StreamEvent::Error(e)) => return Err(e),
            }
        };
        debug!(
            "Completion from {} finished ({finish:?}, {} chars)",
            self.model,
            buffer.raw().len()
        );
        Ok(CompletionResult {
            text: buffer.into_text(),
            model: self.model,
            provider: self.provider,
            usage,
            finish,
        })
    }
}

impl Stream for CompletionStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.cancel.is_cancelled() {
            self.rx.close();
        }
        self.rx.poll_recv(cx)
    }
}

// ---------------------------------------------------------------------------
// StreamBuffer
// ---------------------------------------------------------------------------

/// Accumulates raw deltas for one in-flight completion and keeps the
/// formatted rendition of the whole text current.
#[derive(Debug, Default, Clone)]
pub struct StreamBuffer {
    raw: String,
    formatted: String,
}

impl StreamBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a delta and return the formatted cumulative text.
    pub fn push(&mut self, delta: &str) -> &str {
        self.raw.push_str(delta);
        self.formatted = format_api_response(&self.raw);
        &self.formatted
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn formatted(&self) -> &str {
        &self.formatted
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Consume the buffer, yielding the finalized text.
    pub fn into_text(self) -> String {
        self.formatted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn stream_of(events: Vec<StreamEvent>) -> CompletionStream {
        CompletionStream::from_events(events, "gpt-4.1-mini", ProviderKind::OpenAI)
    }

    #[tokio::test]
    async fn callback_receives_cumulative_formatted_text() {
        let stream = stream_of(vec![
            StreamEvent::Delta("Hel".into()),
            StreamEvent::Delta("lo".into()),
            StreamEvent::Done { usage: None },
        ]);

        let mut updates = Vec::new();
        let result = stream
            .collect_with(|text| updates.push(text.to_string()))
            .await
            .unwrap();

        assert_eq!(updates, vec!["Hel", "Hello"]);
        assert_eq!(result.text, "Hello");
        assert_eq!(result.finish, FinishReason::Done);
        assert_eq!(result.model, "gpt-4.1-mini");
    }

    #[tokio::test]
    async fn closed_without_sentinel_returns_accumulated_text() {
        let stream = stream_of(vec![StreamEvent::Delta("partial answer  ".into())]);
        let result = stream.collect_with(|_| {}).await.unwrap();
        assert_eq!(result.text, "partial answer");
        assert_eq!(result.finish, FinishReason::EndOfStream);
    }

    #[tokio::test]
    async fn error_event_is_returned() {
        let stream = stream_of(vec![
            StreamEvent::Delta("a".into()),
            StreamEvent::Error(ProviderError::Network("reset".into())),
        ]);
        let err = stream.collect_with(|_| {}).await.unwrap_err();
        assert!(matches!(err, ProviderError::Network(_)));
    }

    #[tokio::test]
    async fn cancelled_before_start_yields_empty_cancelled_result() {
        let stream = stream_of(vec![StreamEvent::Delta("never".into())]);
        stream.cancel();
        let mut calls = 0;
        let result = stream.collect_with(|_| calls += 1).await.unwrap();
        assert_eq!(calls, 0);
        assert_eq!(result.finish, FinishReason::Cancelled);
        assert!(result.text.is_empty());
    }

    #[tokio::test]
    async fn cancel_from_another_task_stops_pending_stream() {
        let (tx, rx) = mpsc::channel(4);
        let stream = CompletionStream::new(rx, CancelHandle::new(), "m", ProviderKind::OpenAI);
        let handle = stream.cancel_handle();
        tx.send(StreamEvent::Delta("first".into())).await.unwrap();

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            handle.cancel();
        });

        let result = stream.collect_with(|_| {}).await.unwrap();
        canceller.await.unwrap();
        assert_eq!(result.finish, FinishReason::Cancelled);
        assert_eq!(result.text, "first");
        // Keep the sender alive until the end so the stream could not
        // have finished on its own.
        drop(tx);
    }

    #[tokio::test]
    async fn stream_trait_yields_events_in_order() {
        let mut stream = stream_of(vec![
            StreamEvent::Delta("x".into()),
            StreamEvent::Done { usage: None },
        ]);
        assert!(matches!(stream.next().await, Some(StreamEvent::Delta(t)) if t == "x"));
        assert!(matches!(stream.next().await, Some(StreamEvent::Done { .. })));
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn buffer_formats_cumulative_text() {
        let mut buffer = StreamBuffer::new();
        assert!(buffer.is_empty());
        assert_eq!(buffer.push("## Ti"), "## Ti");
        assert_eq!(buffer.push("tle\r\n\r\n\r\nBody"), "## Title\n\nBody");
        assert_eq!(buffer.raw(), "## Title\r\n\r\n\r\nBody");
        assert_eq!(buffer.into_text(), "## Title\n\nBody");
    }
}
