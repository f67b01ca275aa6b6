#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Channel lifecycle, receive-stream and concurrency behaviour over the
//! in-memory transport.

use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use realtime_sync::transport::memory;
use realtime_sync::{
    Channel, ChannelError, ChannelState, ClientChannel, IncomingMessage, Item, ItemId,
    OutgoingMessage, ServerChannel,
};
use tokio_util::sync::CancellationToken;

fn linked() -> (ClientChannel, ServerChannel) {
    let (client, server) = memory::pair(64);
    (Channel::new(client), Channel::new(server))
}

fn add(text: &str) -> IncomingMessage {
    IncomingMessage::Add { text: text.into() }
}

#[tokio::test]
async fn receive_yields_messages_in_order() {
    let (client, server) = linked();

    for i in 0..10 {
        client.send(&add(&format!("item {i}"))).await.unwrap();
    }

    let received: Vec<_> = server.receive().take(10).collect().await;
    for (i, message) in received.into_iter().enumerate() {
        assert_eq!(message.unwrap(), add(&format!("item {i}")));
    }
}

#[tokio::test]
async fn receive_after_close_ends_without_error() {
    let (client, _server) = linked();
    client.close().await;

    let mut stream = pin!(client.receive());
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn close_ends_pending_receive_stream() {
    let (client, server) = linked();
    let server = Arc::new(server);

    let reader = {
        let server = Arc::clone(&server);
        tokio::spawn(async move {
            let mut stream = pin!(server.receive());
            let mut count = 0;
            while let Some(message) = stream.next().await {
                message.unwrap();
                count += 1;
            }
            count
        })
    };

    client.send(&add("one")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    server.close().await;

    let count = tokio::time::timeout(Duration::from_secs(1), reader)
        .await
        .expect("stream should end after close")
        .unwrap();
    assert_eq!(count, 1);
    drop(client);
}

#[tokio::test]
async fn cancelled_stream_leaves_channel_open() {
    let (client, server) = linked();
    let cancel = CancellationToken::new();

    {
        let mut stream = pin!(server.receive_until(cancel.clone()));
        client.send(&add("first")).await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), add("first"));

        cancel.cancel();
        assert!(stream.next().await.is_none());
    }

    assert_eq!(server.state(), ChannelState::Open);
    client.send(&add("second")).await.unwrap();
    let mut fresh = pin!(server.receive());
    assert_eq!(fresh.next().await.unwrap().unwrap(), add("second"));
}

#[tokio::test]
async fn dropped_stream_does_not_lose_later_messages() {
    let (client, server) = linked();

    {
        let mut stream = pin!(server.receive());
        let pending = tokio::time::timeout(Duration::from_millis(20), stream.next()).await;
        assert!(pending.is_err(), "nothing sent yet");
    }

    client.send(&add("after drop")).await.unwrap();
    assert_eq!(server.receive_once().await.unwrap(), add("after drop"));
}

#[tokio::test]
async fn stream_reports_disconnect_once_then_ends() {
    let (client, server) = linked();
    client.close().await;

    let mut stream = pin!(server.receive());
    assert!(matches!(
        stream.next().await,
        Some(Err(ChannelError::Disconnected))
    ));
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn send_proceeds_while_receive_is_pending() {
    let (client, server) = linked();
    let client = Arc::new(client);

    let reader = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.receive_once().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    tokio::time::timeout(Duration::from_secs(1), client.send(&add("while reading")))
        .await
        .expect("send must not wait for the reader")
        .unwrap();
    assert_eq!(server.receive_once().await.unwrap(), add("while reading"));

    let item = Item {
        id: ItemId::new(),
        text: "reply".into(),
    };
    server
        .send(&OutgoingMessage::Added { item: item.clone() })
        .await
        .unwrap();
    assert_eq!(
        reader.await.unwrap().unwrap(),
        OutgoingMessage::Added { item }
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_senders_keep_their_own_order() {
    use tokio::task::JoinSet;

    // Room for every frame, since nothing reads until the senders finish
    let (client, server) = memory::pair(128);
    let client: Arc<ClientChannel> = Arc::new(Channel::new(client));
    let server: ServerChannel = Channel::new(server);
    let mut tasks = JoinSet::new();

    for sender in 0..4 {
        let client = Arc::clone(&client);
        tasks.spawn(async move {
            for seq in 0..25 {
                client
                    .send(&add(&format!("{sender}:{seq}")))
                    .await
                    .unwrap();
            }
        });
    }
    while let Some(result) = tasks.join_next().await {
        result.unwrap();
    }

    let mut last_seen = [-1i32; 4];
    for _ in 0..100 {
        let IncomingMessage::Add { text } = server.receive_once().await.unwrap() else {
            panic!("Expected Add");
        };
        let (sender, seq) = text.split_once(':').unwrap();
        let sender: usize = sender.parse().unwrap();
        let seq: i32 = seq.parse().unwrap();
        assert!(seq > last_seen[sender], "sender {sender} reordered");
        last_seen[sender] = seq;
    }
    assert_eq!(last_seen, [24; 4]);
}
