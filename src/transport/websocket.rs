//! # WebSocket Transport
//!
//! Binary-frame WebSocket connections backed by `tokio-tungstenite`.
//!
//! ## Responsibilities
//! - Open client connections by URL, bounded by the configured timeout
//! - Perform the server side of the upgrade on accepted TCP streams
//! - Translate tungstenite messages to and from [`Frame`]s
//! - Classify tungstenite errors into the channel error taxonomy
//!
//! Ping/pong control frames never surface; tungstenite answers pings while
//! reading and writing.

use std::borrow::Cow;
use std::io;

use bytes::Bytes;
use futures::{future, SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::error::{Error as WsError, ProtocolError as WsProtocolError};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, WebSocketConfig};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async_with_config, connect_async_with_config, WebSocketStream};
use tracing::{debug, instrument};

use crate::config::ClientConfig;
use crate::core::frame::{CloseCode, Frame};
use crate::error::constants::{ERR_CONNECT_TIMEOUT, ERR_HANDSHAKE_FAILED};
use crate::error::{ChannelError, Result};
use crate::transport::Transport;

/// Open a WebSocket connection to `url`.
///
/// Any failure before the connection is open, including the timeout, is
/// reported as [`ChannelError::ConnectionError`].
#[instrument(skip(config), fields(timeout_ms = config.connection_timeout.as_millis() as u64))]
pub async fn connect(url: &str, config: &ClientConfig) -> Result<Transport> {
    let connecting = connect_async_with_config(url, Some(limits(config.max_frame_size)), false);

    let (ws, response) = tokio::time::timeout(config.connection_timeout, connecting)
        .await
        .map_err(|_| ChannelError::ConnectionError(ERR_CONNECT_TIMEOUT.to_string()))?
        .map_err(|e| ChannelError::ConnectionError(e.to_string()))?;

    debug!(status = %response.status(), "WebSocket connection open");
    Ok(into_transport(ws))
}

/// Complete the server side of the WebSocket upgrade on an accepted stream.
#[instrument(skip(stream))]
pub async fn accept<S>(stream: S, max_frame_size: usize) -> Result<Transport>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let ws = accept_async_with_config(stream, Some(limits(max_frame_size)))
        .await
        .map_err(|e| ChannelError::ConnectionError(format!("{ERR_HANDSHAKE_FAILED}: {e}")))?;

    Ok(into_transport(ws))
}

fn limits(max_frame_size: usize) -> WebSocketConfig {
    let mut config = WebSocketConfig::default();
    config.max_message_size = Some(max_frame_size);
    config.max_frame_size = Some(max_frame_size);
    config
}

fn into_transport<S>(ws: WebSocketStream<S>) -> Transport
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sink, stream) = ws.split();

    let sink = sink
        .sink_map_err(classify)
        .with(|frame: Frame| future::ready(Ok::<_, ChannelError>(to_message(frame))));

    let stream = stream.filter_map(|item| {
        future::ready(match item {
            Ok(message) => from_message(message).map(Ok),
            Err(e) => Some(Err(classify(e))),
        })
    });

    Transport::new(sink, stream)
}

fn to_message(frame: Frame) -> Message {
    match frame {
        Frame::Binary(payload) => Message::Binary(payload.to_vec()),
        Frame::Text(text) => Message::Text(text),
        Frame::Close(code) => Message::Close(code.map(|code| CloseFrame {
            code: WsCloseCode::from(code.as_u16()),
            reason: Cow::Borrowed(""),
        })),
    }
}

fn from_message(message: Message) -> Option<Frame> {
    match message {
        Message::Binary(data) => Some(Frame::Binary(Bytes::from(data))),
        Message::Text(text) => Some(Frame::Text(text)),
        Message::Close(frame) => Some(Frame::Close(
            frame.map(|frame| CloseCode::from_u16(u16::from(frame.code))),
        )),
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => None,
    }
}

fn classify(err: WsError) -> ChannelError {
    match err {
        WsError::ConnectionClosed | WsError::AlreadyClosed => ChannelError::Closed,
        WsError::Protocol(WsProtocolError::ResetWithoutClosingHandshake) => {
            ChannelError::Disconnected
        }
        WsError::Io(e)
            if matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ) =>
        {
            ChannelError::Disconnected
        }
        other => ChannelError::TransportError(other.to_string()),
    }
}
