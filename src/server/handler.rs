use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use crate::core::frame::CloseCode;
use crate::error::ChannelError;
use crate::protocol::message::{IncomingMessage, OutgoingMessage};
use crate::server::ServerState;
use crate::service::channel::ServerChannel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandlerState {
    Connected,
    Closing,
}

/// Drive one connection until it ends.
///
/// Registers the channel with an `Items` snapshot as its first frame, then
/// applies each received message to the store and broadcasts the result.
/// Undecodable input closes the connection with `UnacceptableData`; transport
/// termination ends the loop without further I/O. The channel is always
/// deregistered on exit.
#[instrument(skip_all, fields(channel_id = %channel.id()))]
pub async fn handle_connection(channel: Arc<ServerChannel>, state: Arc<ServerState>) {
    let store = &state.store;
    let registered = state
        .registry
        .add_with(Arc::clone(&channel), || async move {
            OutgoingMessage::Items {
                items: store.list().await,
            }
        })
        .await;
    if let Err(e) = registered {
        error!(error = %e, "Snapshot could not be encoded, dropping connection");
        return;
    }

    let mut phase = HandlerState::Connected;
    while phase == HandlerState::Connected {
        match channel.receive_once().await {
            Ok(message) => apply(&state, message).await,
            Err(ChannelError::DecodingError(reason)) => {
                warn!(%reason, "Unacceptable data, closing connection");
                channel.close_with(CloseCode::UnacceptableData).await;
                phase = HandlerState::Closing;
            }
            Err(e) => {
                debug!(error = %e, "Connection ended");
                phase = HandlerState::Closing;
            }
        }
    }

    state.registry.remove(channel.id()).await;
    info!("Connection deregistered");
}

async fn apply(state: &ServerState, message: IncomingMessage) {
    let kind = message.kind();

    let change = match message {
        IncomingMessage::Add { text } => Some(OutgoingMessage::Added {
            item: state.store.add(text).await,
        }),
        IncomingMessage::Update { id, text } => {
            let updated = state.store.update(id, text).await;
            if updated.is_none() {
                debug!(kind, %id, "Unknown item id, dropping");
            }
            updated.map(|item| OutgoingMessage::Updated { item })
        }
        IncomingMessage::Delete { id } => {
            let deleted = state.store.delete(id).await;
            if deleted.is_none() {
                debug!(kind, %id, "Unknown item id, dropping");
            }
            deleted.map(|item| OutgoingMessage::Deleted { item })
        }
    };

    let Some(change) = change else {
        return;
    };

    match state.registry.broadcast(&change).await {
        Ok(delivered) => debug!(kind, delivered, "Change broadcast"),
        Err(e) => error!(kind, error = %e, "Change could not be encoded"),
    }
}
