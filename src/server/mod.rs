//! # Item Server
//!
//! Accepts WebSocket connections and keeps every client in sync with one
//! shared item list.
//!
//! ## Architecture
//! ```text
//! TcpListener ──accept──▶ WebSocket upgrade ──▶ ServerChannel
//!                                                  │
//!                         handle_connection (one task per connection)
//!                           │ mutations              │ broadcasts
//!                           ▼                        ▼
//!                       ItemStore            ConnectionRegistry ──▶ outbox per channel
//!                                                                     │ writer task
//!                                                                     ▼
//!                                                                  channel
//! ```
//!
//! A connection whose outbox fills up is disconnected with `GoingAway`; the
//! others are unaffected.
//!
//! ## Shutdown
//! On shutdown the server stops accepting, closes each connection with
//! `GoingAway` and waits up to `shutdown_timeout` for handlers to finish.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, instrument, warn};

use crate::config::ServerConfig;
use crate::core::frame::CloseCode;
use crate::error::Result;
use crate::protocol::message::{IncomingMessage, Item, OutgoingMessage};
use crate::service::channel::ServerChannel;
use crate::transport::websocket;
use crate::utils::metrics::global_metrics;

pub mod handler;
pub mod registry;
pub mod store;

pub use handler::handle_connection;
pub use registry::ConnectionRegistry;
pub use store::ItemStore;

/// Registry of server-side item channels
pub type ItemRegistry = ConnectionRegistry<IncomingMessage, OutgoingMessage>;

/// State shared by every connection task
#[derive(Default)]
pub struct ServerState {
    pub store: ItemStore,
    pub registry: ItemRegistry,
}

impl ServerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// State whose store starts with `items`
    pub fn with_items(items: impl IntoIterator<Item = Item>) -> Self {
        Self {
            store: ItemStore::with_items(items),
            registry: ItemRegistry::new(),
        }
    }
}

pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
    state: Arc<ServerState>,
}

impl Server {
    /// Bind the listen address from `config` with an empty store
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let state = ServerState {
            store: ItemStore::new(),
            registry: ItemRegistry::with_outbox_capacity(config.outbox_capacity),
        };
        Self::bind_with_state(config, Arc::new(state)).await
    }

    /// Bind with caller-provided state. The state's registry keeps its own
    /// outbox capacity.
    #[instrument(skip(config, state), fields(address = %config.address))]
    pub async fn bind_with_state(config: ServerConfig, state: Arc<ServerState>) -> Result<Self> {
        let listener = TcpListener::bind(&config.address).await?;
        info!(address = %listener.local_addr()?, "Listening for WebSocket connections");
        Ok(Self {
            listener,
            config,
            state,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn state(&self) -> Arc<ServerState> {
        Arc::clone(&self.state)
    }

    /// Serve connections until `shutdown` completes, then shut down gracefully.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Server {
            listener,
            config,
            state,
        } = self;
        let tracker = TaskTracker::new();
        let closing = CancellationToken::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,

                accept_result = listener.accept() => match accept_result {
                    Ok((stream, peer)) => {
                        if tracker.len() >= config.max_connections {
                            warn!(%peer, max = config.max_connections, "Connection limit reached, rejecting");
                            global_metrics().connection_rejected();
                            continue;
                        }
                        tracker.spawn(serve(
                            stream,
                            peer,
                            config.max_frame_size,
                            Arc::clone(&state),
                            closing.clone(),
                        ));
                    }
                    Err(e) => error!(error = %e, "Error accepting connection"),
                },
            }
        }

        info!(
            connections = tracker.len(),
            "Shutting down server. Waiting for connections to close..."
        );
        drop(listener);
        tracker.close();
        closing.cancel();

        if tokio::time::timeout(config.shutdown_timeout, tracker.wait())
            .await
            .is_err()
        {
            warn!(remaining = tracker.len(), "Shutdown timeout reached, forcing exit");
        } else {
            info!("All connections closed, shutting down");
        }

        global_metrics().log_metrics();
        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to install ctrl-c handler");
                std::future::pending::<()>().await;
            }
            info!("Received CTRL+C signal, shutting down");
        })
        .await
    }
}

async fn serve(
    stream: TcpStream,
    peer: SocketAddr,
    max_frame_size: usize,
    state: Arc<ServerState>,
    closing: CancellationToken,
) {
    let transport = match websocket::accept(stream, max_frame_size).await {
        Ok(transport) => transport,
        Err(e) => {
            global_metrics().connection_error();
            warn!(%peer, error = %e, "WebSocket upgrade failed");
            return;
        }
    };

    let channel = Arc::new(ServerChannel::new(transport));
    global_metrics().connection_established();
    info!(%peer, channel_id = %channel.id(), "Connection established");

    let handler = handle_connection(Arc::clone(&channel), state);
    tokio::pin!(handler);
    tokio::select! {
        _ = &mut handler => {}
        _ = closing.cancelled() => {
            channel.close_with(CloseCode::GoingAway).await;
            handler.await;
        }
    }

    global_metrics().connection_closed();
    info!(%peer, channel_id = %channel.id(), "Connection closed");
}
