//! # Stream Client
//!
//! Consumes an event-stream body in arbitrarily sized chunks. Chunks are
//! buffered as raw bytes and split on the blank-line terminator, so a frame
//! (or a multi-byte character) cut across chunk boundaries is reassembled
//! before decoding. Each progress event is handed to the caller's callback;
//! the terminal event resolves the result.

use futures::{Stream, StreamExt};
use std::fmt;
use thiserror::Error;

use crate::pipeline::{ProgressEvent, ResearchPayload, StreamFrame};

/// Why a stream did not yield a result
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("stream ended without a result")]
    NoResult,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
}

/// A frame that could not be decoded
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame is not valid UTF-8")]
    InvalidUtf8,
    #[error("line without data marker: {0:?}")]
    MissingMarker(String),
    #[error("invalid frame JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Reassembles frames from arbitrary chunk boundaries
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and drain every frame it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        // CRLF line endings are accepted; compact JSON never carries a raw CR
        self.buf.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut frames = Vec::new();
        while let Some(end) = self.buf.windows(2).position(|w| w == b"\n\n") {
            let frame: Vec<u8> = self.buf.drain(..end + 2).take(end).collect();
            if !frame.is_empty() {
                frames.push(frame);
            }
        }
        frames
    }

    /// Bytes of an incomplete trailing frame
    pub fn remainder(&self) -> &[u8] {
        &self.buf
    }
}

/// Decode one frame. Comment-only frames (heartbeats) decode to `None`.
pub fn decode_frame(raw: &[u8]) -> Result<Option<StreamFrame>, FrameError> {
    let text = std::str::from_utf8(raw).map_err(|_| FrameError::InvalidUtf8)?;

    let mut data: Option<String> = None;
    for line in text.split('\n') {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("data:") {
            let rest = rest.strip_prefix(' ').unwrap_or(rest);
            match data.as_mut() {
                Some(existing) => {
                    existing.push('\n');
                    existing.push_str(rest);
                }
                None => data = Some(rest.to_string()),
            }
            continue;
        }
        let field = line.split(':').next().unwrap_or_default();
        if matches!(field, "event" | "id" | "retry") {
            continue;
        }
        return Err(FrameError::MissingMarker(line.chars().take(40).collect()));
    }

    match data {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

/// Incremental consumer of one progress stream
pub struct StreamClient<F> {
    buffer: FrameBuffer,
    on_progress: F,
    result: Option<ResearchPayload>,
    delivered: usize,
    skipped: usize,
}

impl<F> fmt::Debug for StreamClient<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamClient")
            .field("delivered", &self.delivered)
            .field("skipped", &self.skipped)
            .field("has_result", &self.result.is_some())
            .finish()
    }
}

impl<F> StreamClient<F>
where
    F: FnMut(&ProgressEvent),
{
    pub fn new(on_progress: F) -> Self {
        Self {
            buffer: FrameBuffer::new(),
            on_progress,
            result: None,
            delivered: 0,
            skipped: 0,
        }
    }

    /// Feed one chunk of the body
    pub fn feed(&mut self, chunk: &[u8]) {
        for raw in self.buffer.push(chunk) {
            match decode_frame(&raw) {
                Ok(Some(StreamFrame::Progress(event))) => {
                    self.delivered += 1;
                    (self.on_progress)(&event);
                }
                Ok(Some(StreamFrame::Terminal(terminal))) => {
                    if self.result.is_some() {
                        tracing::warn!("Ignoring duplicate terminal event");
                    } else {
                        self.result = Some(terminal.result);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    self.skipped += 1;
                    tracing::warn!("Skipping malformed frame: {}", e);
                }
            }
        }
    }

    /// Progress events handed to the callback so far
    pub fn delivered(&self) -> usize {
        self.delivered
    }

    /// Frames dropped as malformed so far
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Close the stream and resolve. A partial trailing frame is discarded.
    pub fn finish(self) -> Result<ResearchPayload, StreamError> {
        if !self.buffer.remainder().is_empty() {
            tracing::debug!(
                bytes = self.buffer.remainder().len(),
                "Discarding incomplete trailing frame"
            );
        }
        self.result.ok_or(StreamError::NoResult)
    }

    /// Drive the client over a chunked body until it closes.
    ///
    /// A transport error after the terminal event still resolves with the
    /// result already received.
    pub async fn consume<S, B, E>(mut self, body: S) -> Result<ResearchPayload, StreamError>
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: fmt::Display,
    {
        let mut body = std::pin::pin!(body);
        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => self.feed(bytes.as_ref()),
                Err(e) if self.result.is_some() => {
                    tracing::warn!("Transport error after result, keeping result: {}", e);
                    break;
                }
                Err(e) => return Err(StreamError::Transport(e.to_string())),
            }
        }
        self.finish()
    }
}

/// Consume `body`, forwarding every progress event to `on_progress`
pub async fn consume_stream<S, B, E, F>(
    body: S,
    on_progress: F,
) -> Result<ResearchPayload, StreamError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: fmt::Display,
    F: FnMut(&ProgressEvent),
{
    StreamClient::new(on_progress).consume(body).await
}
