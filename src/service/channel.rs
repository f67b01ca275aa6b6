//! # Typed Channel
//!
//! A [`Channel`] wraps one physical duplex connection and exposes typed
//! `send`, `receive_once`, `receive` and `close`.
//!
//! ## Concurrency
//! - Writes go through an internal writer lock: callers on several tasks are
//!   serialized and each caller's frames keep their issue order.
//! - Reads go through a separate reader lock, so a pending receive never blocks
//!   a send.
//! - `close()` wakes a pending receive, which then returns
//!   [`ChannelError::Closed`]. A send stuck behind a peer that stopped reading
//!   is abandoned the same way.
//!
//! ## Lifecycle
//! ```text
//! Open ──close()──▶ Closing ──close frame written──▶ Closed
//!   └──────── peer close / stream end ────────────────▶ Closed
//! ```
//!
//! ## Example
//! ```no_run
//! use futures::StreamExt;
//! use realtime_sync::config::ClientConfig;
//! use realtime_sync::protocol::message::IncomingMessage;
//! use realtime_sync::service::channel::ClientChannel;
//!
//! # async fn run() -> realtime_sync::error::Result<()> {
//! let channel = ClientChannel::connect("ws://127.0.0.1:9000", &ClientConfig::default()).await?;
//! channel.send(&IncomingMessage::Add { text: "Buy milk".into() }).await?;
//!
//! let mut updates = std::pin::pin!(channel.receive());
//! while let Some(update) = updates.next().await {
//!     println!("{:?}", update?);
//! }
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use bytes::Bytes;
use futures::{SinkExt, Stream, StreamExt};
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::config::{ClientConfig, CLOSE_TIMEOUT};
use crate::core::codec;
use crate::core::frame::{CloseCode, Frame};
use crate::error::constants::ERR_UNEXPECTED_TEXT_FRAME;
use crate::error::{ChannelError, Result};
use crate::protocol::message::{IncomingMessage, OutgoingMessage};
use crate::transport::{websocket, FrameSink, FrameStream, Transport};
use crate::utils::metrics::global_metrics;

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

const OPEN: u8 = 0;
const CLOSING: u8 = 1;
const CLOSED: u8 = 2;

/// Process-unique channel identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(u64);

impl ChannelId {
    fn next() -> Self {
        Self(NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Open,
    Closing,
    Closed,
}

/// Client side of the item protocol: sends client messages, receives server messages
pub type ClientChannel = Channel<OutgoingMessage, IncomingMessage>;

/// Server side of the item protocol
pub type ServerChannel = Channel<IncomingMessage, OutgoingMessage>;

/// Typed bidirectional channel receiving `I` and sending `O`.
pub struct Channel<I, O> {
    id: ChannelId,
    writer: Mutex<FrameSink>,
    reader: Mutex<FrameStream>,
    state: AtomicU8,
    shutdown: CancellationToken,
    _messages: PhantomData<fn(O) -> I>,
}

impl<I, O> Channel<I, O>
where
    I: DeserializeOwned,
    O: Serialize,
{
    /// Wrap an open transport
    pub fn new(transport: Transport) -> Self {
        let (writer, reader) = transport.into_parts();
        Self {
            id: ChannelId::next(),
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
            state: AtomicU8::new(OPEN),
            shutdown: CancellationToken::new(),
            _messages: PhantomData,
        }
    }

    /// Open a WebSocket channel to `url`
    #[instrument(skip(config))]
    pub async fn connect(url: &str, config: &ClientConfig) -> Result<Self> {
        let transport = websocket::connect(url, config).await.map_err(|e| {
            global_metrics().connection_error();
            e
        })?;
        let channel = Self::new(transport);
        debug!(channel_id = %channel.id, "Channel open");
        Ok(channel)
    }

    /// Open a WebSocket channel to the URL in `config`
    pub async fn connect_with(config: &ClientConfig) -> Result<Self> {
        Self::connect(&config.url, config).await
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn state(&self) -> ChannelState {
        match self.state.load(Ordering::Acquire) {
            OPEN => ChannelState::Open,
            CLOSING => ChannelState::Closing,
            _ => ChannelState::Closed,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state.load(Ordering::Acquire) == OPEN
    }

    /// Encode `message` and write it as one binary frame.
    pub async fn send(&self, message: &O) -> Result<()> {
        self.ensure_open()?;
        let payload = codec::encode(message)?;
        self.send_encoded(payload).await
    }

    /// Write an already encoded payload as one binary frame.
    ///
    /// A write held up by a slow peer is abandoned with
    /// [`ChannelError::Closed`] as soon as the channel starts closing.
    pub async fn send_encoded(&self, payload: Bytes) -> Result<()> {
        self.ensure_open()?;
        let len = payload.len() as u64;

        let write = async {
            let mut writer = self.writer.lock().await;
            // close() may have taken the writer while we waited
            self.ensure_open()?;
            writer.send(Frame::Binary(payload)).await
        };
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Err(ChannelError::Closed),
            written = write => written?,
        }

        global_metrics().message_sent(len);
        Ok(())
    }

    /// Wait for the next frame and decode it.
    ///
    /// Must not race with itself; concurrent calls are queued on the reader lock.
    pub async fn receive_once(&self) -> Result<I> {
        self.ensure_open()?;
        let mut reader = self.reader.lock().await;

        let frame = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Err(ChannelError::Closed),
            frame = reader.next() => frame,
        };

        match frame {
            Some(Ok(Frame::Binary(payload))) => {
                global_metrics().message_received(payload.len() as u64);
                codec::decode(&payload).map_err(|e| {
                    global_metrics().decode_error();
                    e
                })
            }
            Some(Ok(Frame::Text(_))) => {
                global_metrics().decode_error();
                Err(ChannelError::DecodingError(
                    ERR_UNEXPECTED_TEXT_FRAME.to_string(),
                ))
            }
            Some(Ok(Frame::Close(code))) => {
                self.mark_closed();
                debug!(channel_id = %self.id, ?code, "Peer closed channel");
                Err(match code {
                    None | Some(CloseCode::Normal) | Some(CloseCode::GoingAway) => {
                        ChannelError::Disconnected
                    }
                    Some(other) => {
                        ChannelError::TransportError(format!("peer closed with code {other}"))
                    }
                })
            }
            Some(Err(e)) => {
                if e.is_terminal() {
                    self.mark_closed();
                }
                Err(e)
            }
            None => {
                self.mark_closed();
                Err(ChannelError::Disconnected)
            }
        }
    }

    /// Unbounded stream of received messages.
    ///
    /// The stream ends without an error when the channel is closed or the
    /// stream is dropped; any other error is yielded once and ends it.
    /// Dropping the stream leaves the channel open.
    pub fn receive(&self) -> impl Stream<Item = Result<I>> + '_ {
        self.receive_until(CancellationToken::new())
    }

    /// Like [`receive`](Self::receive), also ending cleanly once `cancel` fires.
    pub fn receive_until(&self, cancel: CancellationToken) -> impl Stream<Item = Result<I>> + '_ {
        futures::stream::unfold(Some(cancel), move |cancel| async move {
            let cancel = cancel?;
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                next = self.receive_once() => next,
            };
            match next {
                Ok(message) => Some((Ok(message), Some(cancel))),
                Err(ChannelError::Closed) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }

    /// Close normally. Idempotent.
    pub async fn close(&self) {
        self.close_with(CloseCode::Normal).await
    }

    /// Close with an explicit code. Only the first close call writes a frame.
    pub async fn close_with(&self, code: CloseCode) {
        if self
            .state
            .compare_exchange(OPEN, CLOSING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        self.shutdown.cancel();

        let mut writer = self.writer.lock().await;
        let handshake = async {
            writer.send(Frame::Close(Some(code))).await?;
            writer.close().await
        };
        match tokio::time::timeout(CLOSE_TIMEOUT, handshake).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(channel_id = %self.id, error = %e, "Close frame not delivered"),
            Err(_) => debug!(channel_id = %self.id, "Peer not draining, abandoning close frame"),
        }

        self.state.store(CLOSED, Ordering::Release);
        debug!(channel_id = %self.id, %code, "Channel closed");
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(ChannelError::Closed)
        }
    }

    fn mark_closed(&self) {
        self.state.store(CLOSED, Ordering::Release);
        self.shutdown.cancel();
    }
}

impl<I, O> fmt::Debug for Channel<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("state", &self.state.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
