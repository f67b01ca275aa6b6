use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::DEFAULT_OUTBOX_CAPACITY;
use crate::core::codec;
use crate::core::frame::CloseCode;
use crate::error::Result;
use crate::service::channel::{Channel, ChannelId};
use crate::utils::metrics::{global_metrics, Timer};

struct Member<I, O> {
    channel: Arc<Channel<I, O>>,
    outbox: mpsc::Sender<Bytes>,
}

/// Set of live channels, keyed by channel id.
///
/// Each member owns a bounded outbox drained by its own writer task. The
/// registry lock only covers enqueueing, never network writes, so one slow
/// peer cannot hold up the others. Broadcasts are enqueued under the lock, so
/// every member observes them in the order they were issued.
pub struct ConnectionRegistry<I, O> {
    members: Mutex<HashMap<ChannelId, Member<I, O>>>,
    outbox_capacity: usize,
}

impl<I, O> Default for ConnectionRegistry<I, O> {
    fn default() -> Self {
        Self::with_outbox_capacity(DEFAULT_OUTBOX_CAPACITY)
    }
}

impl<I, O> ConnectionRegistry<I, O> {
    /// Registry whose members may fall `capacity` broadcasts behind before
    /// being dropped. A capacity of zero is treated as one.
    pub fn with_outbox_capacity(capacity: usize) -> Self {
        Self {
            members: Mutex::new(HashMap::new()),
            outbox_capacity: capacity.max(1),
        }
    }
}

impl<I, O> ConnectionRegistry<I, O>
where
    I: DeserializeOwned + 'static,
    O: Serialize + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel. Returns `false` if it was already registered.
    pub async fn add(&self, channel: Arc<Channel<I, O>>) -> bool {
        let mut members = self.members.lock().await;
        if members.contains_key(&channel.id()) {
            return false;
        }
        members.insert(channel.id(), self.member(channel));
        true
    }

    /// Register a channel with `greeting` as the first message in its outbox.
    ///
    /// `greeting` runs under the registry lock, so no broadcast can be queued
    /// ahead of it or slip between building it and registering. Fails only if
    /// the greeting cannot be encoded, in which case nothing is registered.
    pub async fn add_with<F, Fut>(&self, channel: Arc<Channel<I, O>>, greeting: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = O>,
    {
        let mut members = self.members.lock().await;
        let payload = codec::encode(&greeting().await)?;

        let member = self.member(channel);
        // A fresh outbox always has room for one message
        if member.outbox.try_send(payload).is_err() {
            warn!(channel_id = %member.channel.id(), "Greeting not queued");
        }
        members.insert(member.channel.id(), member);
        Ok(())
    }

    /// Deregister a channel. Removing an unknown id is a no-op.
    ///
    /// Broadcasts already queued for the channel are still written.
    pub async fn remove(&self, id: ChannelId) -> Option<Arc<Channel<I, O>>> {
        self.members
            .lock()
            .await
            .remove(&id)
            .map(|member| member.channel)
    }

    pub async fn contains(&self, id: ChannelId) -> bool {
        self.members.lock().await.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.members.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.members.lock().await.is_empty()
    }

    /// Encode `message` once and queue it for every registered channel.
    ///
    /// A member whose writer has stopped, or whose outbox is full, is removed;
    /// a full outbox also closes that channel with `GoingAway`. Returns the
    /// number of channels the message was queued for. The only error is an
    /// encoding failure, before anything is queued.
    pub async fn broadcast(&self, message: &O) -> Result<usize> {
        let _timer = Timer::start("broadcast");
        let payload = codec::encode(message)?;
        global_metrics().broadcast();

        let mut members = self.members.lock().await;
        let mut dropped = Vec::new();
        for (id, member) in members.iter() {
            match member.outbox.try_send(payload.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(channel_id = %id, "Peer not keeping up, disconnecting");
                    dropped.push(*id);
                    let channel = Arc::clone(&member.channel);
                    tokio::spawn(async move { channel.close_with(CloseCode::GoingAway).await });
                }
                Err(TrySendError::Closed(_)) => {
                    warn!(channel_id = %id, "Broadcast write failed, removing channel");
                    dropped.push(*id);
                }
            }
        }

        for id in &dropped {
            global_metrics().broadcast_failure();
            members.remove(id);
        }

        let delivered = members.len();
        debug!(delivered, dropped = dropped.len(), "Broadcast queued");
        Ok(delivered)
    }

    fn member(&self, channel: Arc<Channel<I, O>>) -> Member<I, O> {
        let (outbox, queued) = mpsc::channel(self.outbox_capacity);
        tokio::spawn(drain(Arc::clone(&channel), queued));
        Member { channel, outbox }
    }
}

/// Writer task: forwards queued payloads until the outbox is dropped or a
/// write fails.
async fn drain<I, O>(channel: Arc<Channel<I, O>>, mut queued: mpsc::Receiver<Bytes>)
where
    I: DeserializeOwned,
    O: Serialize,
{
    while let Some(payload) = queued.recv().await {
        if let Err(e) = channel.send_encoded(payload).await {
            debug!(channel_id = %channel.id(), error = %e, "Outbox writer stopped");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::protocol::message::{IncomingMessage, Item, ItemId, OutgoingMessage};
    use crate::service::channel::{ClientChannel, ServerChannel};
    use crate::transport::memory;

    type Registry = ConnectionRegistry<IncomingMessage, OutgoingMessage>;

    fn connect() -> (ClientChannel, Arc<ServerChannel>) {
        let (client, server) = memory::pair(16);
        (Channel::new(client), Arc::new(Channel::new(server)))
    }

    fn added(text: &str) -> OutgoingMessage {
        OutgoingMessage::Added {
            item: Item {
                id: ItemId::new(),
                text: text.into(),
            },
        }
    }

    #[tokio::test]
    async fn add_and_remove_are_idempotent() {
        let registry = Registry::new();
        let (_client, server) = connect();

        assert!(registry.add(Arc::clone(&server)).await);
        assert!(!registry.add(Arc::clone(&server)).await);
        assert_eq!(registry.len().await, 1);

        assert!(registry.remove(server.id()).await.is_some());
        assert!(registry.remove(server.id()).await.is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn broadcast_reaches_every_member_once() {
        let registry = Registry::new();
        let mut clients = Vec::new();
        for _ in 0..5 {
            let (client, server) = connect();
            registry.add(server).await;
            clients.push(client);
        }

        let message = added("Buy milk");
        assert_eq!(registry.broadcast(&message).await.expect("encode"), 5);

        for client in &clients {
            assert_eq!(client.receive_once().await.expect("receive"), message);
        }
    }

    #[tokio::test]
    async fn failed_member_is_removed_and_others_still_receive() {
        let registry = Registry::new();
        let (healthy, healthy_server) = connect();
        let (gone, gone_server) = connect();
        registry.add(healthy_server).await;
        registry.add(Arc::clone(&gone_server)).await;
        drop(gone);

        let first = added("Buy eggs");
        registry.broadcast(&first).await.expect("encode");
        // The writer for the dropped peer fails and stops
        tokio::time::sleep(Duration::from_millis(50)).await;

        let second = added("Buy bread");
        assert_eq!(registry.broadcast(&second).await.expect("encode"), 1);
        assert!(!registry.contains(gone_server.id()).await);
        assert_eq!(registry.len().await, 1);
        assert_eq!(healthy.receive_once().await.expect("receive"), first);
        assert_eq!(healthy.receive_once().await.expect("receive"), second);
    }

    #[tokio::test]
    async fn stalled_member_does_not_block_others() {
        let registry = Registry::new();
        let (healthy, healthy_server) = connect();
        // Room for one frame, and nobody reads it
        let (_stalled, stalled_end) = memory::pair(1);
        let stalled_server: Arc<ServerChannel> = Arc::new(Channel::new(stalled_end));
        registry.add(healthy_server).await;
        registry.add(Arc::clone(&stalled_server)).await;

        for i in 0..5 {
            let message = added(&format!("item {i}"));
            let queued = tokio::time::timeout(Duration::from_secs(1), registry.broadcast(&message))
                .await
                .expect("broadcast must not wait on a stalled peer")
                .expect("encode");
            assert_eq!(queued, 2);
            assert_eq!(healthy.receive_once().await.expect("receive"), message);
        }

        let (_late, late_server) = connect();
        tokio::time::timeout(Duration::from_secs(1), registry.add(late_server))
            .await
            .expect("registration must not wait on a stalled peer");
        assert!(stalled_server.is_open());
    }

    #[tokio::test]
    async fn member_with_full_outbox_is_disconnected() {
        let registry = Registry::with_outbox_capacity(2);
        let (healthy, healthy_server) = connect();
        let (_stalled, stalled_end) = memory::pair(1);
        let stalled_server: Arc<ServerChannel> = Arc::new(Channel::new(stalled_end));
        registry.add(healthy_server).await;
        registry.add(Arc::clone(&stalled_server)).await;

        let failures_before = global_metrics().snapshot().broadcast_failures;
        for i in 0..10 {
            registry
                .broadcast(&added(&format!("item {i}")))
                .await
                .expect("encode");
            // Let the writer tasks run
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert!(!registry.contains(stalled_server.id()).await);
        assert_eq!(registry.len().await, 1);
        assert!(global_metrics().snapshot().broadcast_failures > failures_before);
        tokio::time::timeout(Duration::from_secs(1), async {
            while stalled_server.is_open() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("evicted channel should close");

        for _ in 0..10 {
            assert!(matches!(
                healthy.receive_once().await.expect("receive"),
                OutgoingMessage::Added { .. }
            ));
        }
    }

    #[tokio::test]
    async fn greeting_precedes_registration() {
        let registry = Registry::new();
        let (client, server) = connect();

        registry
            .add_with(Arc::clone(&server), || async {
                OutgoingMessage::Items { items: Vec::new() }
            })
            .await
            .expect("greeting");
        assert!(registry.contains(server.id()).await);
        assert_eq!(
            client.receive_once().await.expect("receive"),
            OutgoingMessage::Items { items: Vec::new() }
        );
    }
}
