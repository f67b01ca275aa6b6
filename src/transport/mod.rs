//! # Transport Layer
//!
//! Adapters that turn a physical duplex connection into a pair of frame
//! halves a [`Channel`](crate::service::channel::Channel) can drive.
//!
//! ## Adapters
//! - **WebSocket**: `connect(url)` for clients, `accept(stream)` for servers
//! - **Memory**: linked in-process endpoints, for tests and embedding
//!
//! Each adapter classifies its own failures into
//! [`ChannelError`](crate::error::ChannelError) before they reach the channel,
//! so the channel never sees transport-specific error types.

use futures::{Sink, Stream};
use std::pin::Pin;

use crate::core::frame::Frame;
use crate::error::{ChannelError, Result};

pub mod memory;
pub mod websocket;

/// Write half of a transport
pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = ChannelError> + Send>>;

/// Read half of a transport. `None` means the connection ended without a close frame.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame>> + Send>>;

/// An open duplex connection, split into its write and read halves.
pub struct Transport {
    sink: FrameSink,
    stream: FrameStream,
}

impl Transport {
    /// Wrap any sink/stream pair of frames as a transport
    pub fn new<Si, St>(sink: Si, stream: St) -> Self
    where
        Si: Sink<Frame, Error = ChannelError> + Send + 'static,
        St: Stream<Item = Result<Frame>> + Send + 'static,
    {
        Self {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        }
    }

    pub(crate) fn into_parts(self) -> (FrameSink, FrameStream) {
        (self.sink, self.stream)
    }
}
