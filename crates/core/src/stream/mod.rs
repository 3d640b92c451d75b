//! # Progress Streaming
//!
//! Wire format shared by the server and its clients: each frame is the
//! line `data: <json>` followed by a blank line. Progress frames carry a
//! [`ProgressEvent`](crate::pipeline::ProgressEvent); the last frame of a
//! successful run has `status: "done"` and the full result.

pub mod board;
pub mod client;
pub mod encoder;
pub mod http;

pub use board::{ProgressBoard, RunState};
pub use client::{
    consume_stream, decode_frame, FrameBuffer, FrameError, StreamClient, StreamError,
};
pub use encoder::{
    encode_frame, ProgressStream, ProgressStreamEncoder, EVENT_STREAM_CONTENT_TYPE, HEARTBEAT_FRAME,
};
pub use http::ResearchClient;
