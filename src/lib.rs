//! # realtime-sync
//!
//! Typed real-time channels and a fan-out item server.
//!
//! A [`Channel`](service::channel::Channel) wraps one duplex connection and
//! carries typed messages in both directions. The [`server`] keeps a shared
//! item list: each connection receives a snapshot when it joins, and every
//! successful add, update or delete is broadcast to all connected peers.
//!
//! ## Modules
//! - [`core`]: frames and the tagged-union JSON codec
//! - [`protocol`]: item message schemas
//! - [`transport`]: WebSocket and in-memory transports
//! - [`service`]: the typed channel
//! - [`server`]: item store, connection registry, handler and accept loop
//! - [`config`], [`error`], [`utils`]: configuration, errors, logging and metrics
//!
//! ## Quick Start
//! ```no_run
//! use realtime_sync::config::SyncConfig;
//! use realtime_sync::server::Server;
//!
//! # async fn run() -> realtime_sync::error::Result<()> {
//! let config = SyncConfig::from_env()?;
//! let server = Server::bind(config.server).await?;
//! server.run_until_ctrl_c().await
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod server;
pub mod service;
pub mod transport;
pub mod utils;

pub use crate::core::frame::CloseCode;
pub use crate::error::{ChannelError, Result};
pub use crate::protocol::message::{IncomingMessage, Item, ItemId, OutgoingMessage};
pub use crate::service::channel::{Channel, ChannelId, ChannelState, ClientChannel, ServerChannel};
