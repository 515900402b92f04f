//! Server-sent-event relay.
//!
//! # Data Flow
//! ```text
//! open_stream() picked a backend
//!     → StreamRelay::run(sink)
//!         → POST upstream, read body chunk by chunk (idle timeout per chunk)
//!         → sink.write(chunk) + sink.flush() for every chunk
//!         → "[DONE]" seen? otherwise append "data: [DONE]\n\n"
//!     → on error: one "data: {error}\n\n" event, then close
//!     → attribute latency/outcome to the backend exactly once
//! ```
//!
//! # Design Decisions
//! - The relay writes to an `EventSink`, so buffering and flushing are explicit
//! - A closed sink means the caller went away: the upstream body is dropped,
//!   which cancels the outbound call, and the exchange counts as a success
//! - A half-delivered stream is never retried

use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::dispatch::outbound::{auth_headers, build_url};
use crate::error::ProxyError;
use crate::observability::metrics;
use crate::registry::PoolEntry;
use crate::stats::{StatsTracker, UsageTracker};

/// Terminal marker appended when the upstream never sent one.
pub const DONE_EVENT: &[u8] = b"data: [DONE]\n\n";

const DONE_MARKER: &[u8] = b"[DONE]";

/// The caller side of the stream is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkClosed;

/// Destination of relayed events.
#[async_trait]
pub trait EventSink: Send {
    async fn write(&mut self, chunk: Bytes) -> Result<(), SinkClosed>;
    async fn flush(&mut self) -> Result<(), SinkClosed>;
}

/// Sink feeding a response body through a bounded channel.
///
/// Writes accumulate until `flush`, which hands them to the body as one frame.
pub struct ChannelSink {
    tx: mpsc::Sender<Bytes>,
    buf: BytesMut,
}

impl ChannelSink {
    /// Sink plus the body stream it feeds.
    pub fn pair(capacity: usize) -> (Self, impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let body = futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|chunk| (Ok(chunk), rx))
        });
        (Self { tx, buf: BytesMut::new() }, body)
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn write(&mut self, chunk: Bytes) -> Result<(), SinkClosed> {
        if self.tx.is_closed() {
            return Err(SinkClosed);
        }
        self.buf.extend_from_slice(&chunk);
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SinkClosed> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let frame = self.buf.split().freeze();
        self.tx.send(frame).await.map_err(|_| SinkClosed)
    }
}

/// How a relay ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Upstream finished; `synthesized` when the proxy appended the marker.
    Completed { synthesized: bool },
    /// The caller disconnected before the end.
    ClientGone,
    /// Upstream failed; an error event was sent.
    Failed(String),
}

enum RelayEnd {
    Completed { synthesized: bool },
    ClientGone,
}

/// Finds the marker across chunk boundaries.
#[derive(Default)]
struct DoneDetector {
    tail: Vec<u8>,
    seen: bool,
}

impl DoneDetector {
    fn feed(&mut self, chunk: &[u8]) {
        if self.seen {
            return;
        }
        let mut window = std::mem::take(&mut self.tail);
        window.extend_from_slice(chunk);
        if window.windows(DONE_MARKER.len()).any(|w| w == DONE_MARKER) {
            self.seen = true;
            return;
        }
        let keep = window.len().min(DONE_MARKER.len() - 1);
        self.tail = window.split_off(window.len() - keep);
    }
}

/// Frame a JSON value as one SSE event.
pub fn sse_event(value: &Value) -> Bytes {
    Bytes::from(format!("data: {}\n\n", value))
}

/// One streamed exchange with a chosen backend.
pub struct StreamRelay {
    entry: Arc<PoolEntry>,
    endpoint: String,
    payload: Value,
    model: String,
    client: reqwest::Client,
    stats: Arc<StatsTracker>,
    usage: Arc<UsageTracker>,
    idle_timeout: Duration,
}

impl StreamRelay {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        entry: Arc<PoolEntry>,
        endpoint: String,
        payload: Value,
        model: String,
        client: reqwest::Client,
        stats: Arc<StatsTracker>,
        usage: Arc<UsageTracker>,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            entry,
            endpoint,
            payload,
            model,
            client,
            stats,
            usage,
            idle_timeout,
        }
    }

    pub fn backend_name(&self) -> &str {
        &self.entry.descriptor.name
    }

    /// Relay the upstream stream into `sink` and attribute the outcome.
    pub async fn run<S: EventSink>(self, sink: &mut S) -> RelayOutcome {
        let started = Instant::now();
        let result = self.relay(sink).await;
        let latency_ms = started.elapsed().as_millis() as u64;
        let name = self.entry.descriptor.name.as_str();

        match result {
            Ok(RelayEnd::Completed { synthesized }) => {
                self.stats.record_request(self.entry.id(), latency_ms, true);
                self.usage.record(name, &self.model, 200, latency_ms);
                metrics::record_request(&self.endpoint, 200, name, started);
                metrics::record_stream(if synthesized { "completed_synthesized" } else { "completed" });
                tracing::info!(
                    backend = %name,
                    endpoint = %self.endpoint,
                    model = %self.model,
                    latency_ms,
                    synthesized_done = synthesized,
                    "Stream relayed"
                );
                RelayOutcome::Completed { synthesized }
            }
            Ok(RelayEnd::ClientGone) => {
                self.stats.record_request(self.entry.id(), latency_ms, true);
                self.usage.record(name, &self.model, 200, latency_ms);
                metrics::record_request(&self.endpoint, 200, name, started);
                metrics::record_stream("client_disconnected");
                tracing::info!(backend = %name, endpoint = %self.endpoint, latency_ms, "Client disconnected, upstream stream cancelled");
                RelayOutcome::ClientGone
            }
            Err(details) => {
                self.stats.record_request(self.entry.id(), latency_ms, false);
                self.usage.record(name, &self.model, 500, latency_ms);
                metrics::record_request(&self.endpoint, 500, name, started);
                metrics::record_stream("failed");
                tracing::error!(
                    backend = %name,
                    endpoint = %self.endpoint,
                    model = %self.model,
                    error = %details,
                    latency_ms,
                    "Stream request failed"
                );
                let event = sse_event(&ProxyError::Stream(details.clone()).body());
                if sink.write(event).await.is_ok() {
                    let _ = sink.flush().await;
                }
                RelayOutcome::Failed(details)
            }
        }
    }

    async fn relay<S: EventSink>(&self, sink: &mut S) -> Result<RelayEnd, String> {
        let d = &self.entry.descriptor;
        let headers = auth_headers(&d.name, &d.base_url, &d.credential).map_err(|e| e.to_string())?;

        let request = self
            .client
            .post(build_url(&d.base_url, &self.endpoint))
            .headers(headers)
            .json(&self.payload)
            .send();
        let response = tokio::time::timeout(self.idle_timeout, request)
            .await
            .map_err(|_| format!("upstream did not respond within {}s", self.idle_timeout.as_secs()))?
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("upstream returned status {}", status.as_u16()));
        }

        let mut body = response.bytes_stream();
        let mut done = DoneDetector::default();

        loop {
            let next = tokio::time::timeout(self.idle_timeout, body.next())
                .await
                .map_err(|_| format!("upstream stream idle for {}s", self.idle_timeout.as_secs()))?;
            let Some(chunk) = next else { break };
            let chunk = chunk.map_err(|e| e.to_string())?;
            if chunk.is_empty() {
                continue;
            }

            done.feed(&chunk);
            if sink.write(chunk).await.is_err() || sink.flush().await.is_err() {
                return Ok(RelayEnd::ClientGone);
            }
        }

        if done.seen {
            return Ok(RelayEnd::Completed { synthesized: false });
        }
        if sink.write(Bytes::from_static(DONE_EVENT)).await.is_err() || sink.flush().await.is_err() {
            return Ok(RelayEnd::ClientGone);
        }
        Ok(RelayEnd::Completed { synthesized: true })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_done_detector_across_chunks() {
        let mut d = DoneDetector::default();
        d.feed(b"data: {\"x\":1}\n\ndata: [DO");
        assert!(!d.seen);
        d.feed(b"NE]\n\n");
        assert!(d.seen);
    }

    #[test]
    fn test_done_detector_ignores_lookalikes() {
        let mut d = DoneDetector::default();
        d.feed(b"data: {\"text\":\"DONE\"}\n\n");
        assert!(!d.seen);
    }

    #[tokio::test]
    async fn test_channel_sink_frames_on_flush() {
        let (mut sink, body) = ChannelSink::pair(4);
        sink.write(Bytes::from_static(b"data: a\n\n")).await.unwrap();
        sink.write(Bytes::from_static(b"data: b\n\n")).await.unwrap();
        sink.flush().await.unwrap();
        drop(sink);

        let frames: Vec<Bytes> = body.map(|r| r.unwrap()).collect().await;
        assert_eq!(frames, vec![Bytes::from_static(b"data: a\n\ndata: b\n\n")]);
    }

    #[tokio::test]
    async fn test_channel_sink_reports_closed_body() {
        let (mut sink, body) = ChannelSink::pair(1);
        drop(body);
        assert_eq!(sink.write(Bytes::from_static(b"x")).await, Err(SinkClosed));
    }

    #[test]
    fn test_sse_event_framing() {
        let event = sse_event(&serde_json::json!({"error": "x"}));
        assert_eq!(&event[..], b"data: {\"error\":\"x\"}\n\n");
    }
}
