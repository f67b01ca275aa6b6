//! # Error Types
//!
//! Error handling for channels, the item server and configuration.
//!
//! Every fallible operation in the crate returns [`ChannelError`]. The first six
//! variants form the channel taxonomy and are produced by classifying the
//! transport's close/error signal at the moment of failure.
//!
//! ## Error Categories
//! - **Connection**: the transport never reached an open state
//! - **Lifecycle**: the peer went away (`Disconnected`) or this side closed (`Closed`)
//! - **Codec**: frames that do not decode, messages that do not encode
//! - **Transport**: any other failure reported by the underlying connection
//! - **Local**: socket binding and configuration problems
//!
//! ## Example Usage
//! ```rust
//! use realtime_sync::error::{ChannelError, Result};
//! use tracing::{info, warn};
//!
//! fn classify(result: Result<()>) {
//!     match result {
//!         Ok(()) => info!("delivered"),
//!         Err(ChannelError::Disconnected) => info!("peer went away, reconnect later"),
//!         Err(e) => warn!(error = %e, "send failed"),
//!     }
//! }
//!
//! classify(Err(ChannelError::Closed));
//! ```

use std::io;
use thiserror::Error;

/// Error message constants shared by transports and the server.
pub mod constants {
    /// Frame-level errors
    pub const ERR_UNEXPECTED_TEXT_FRAME: &str = "Expected a binary frame, received text";
    pub const ERR_PEER_GONE: &str = "Peer endpoint dropped";

    /// Connection errors
    pub const ERR_CONNECT_TIMEOUT: &str = "Timed out waiting for the connection to open";
    pub const ERR_HANDSHAKE_FAILED: &str = "WebSocket handshake failed";
}

/// Primary error type for channel, server and configuration operations.
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Disconnected by peer")]
    Disconnected,

    #[error("Channel closed")]
    Closed,

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Decoding error: {0}")]
    DecodingError(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ChannelError {
    /// True for errors that end the connection as seen from the transport:
    /// the peer left, this side closed, or the link failed.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ChannelError::Disconnected | ChannelError::Closed | ChannelError::TransportError(_)
        )
    }
}

/// Type alias for Results using ChannelError
pub type Result<T> = std::result::Result<T, ChannelError>;
