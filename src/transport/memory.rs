//! In-process transport.
//!
//! [`pair`] returns two linked endpoints; frames written to one are read from
//! the other. Closing or dropping one side ends the other side's stream, and
//! writes toward a dropped endpoint fail with a transport error.

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::PollSender;

use crate::core::frame::Frame;
use crate::error::constants::ERR_PEER_GONE;
use crate::error::ChannelError;
use crate::transport::Transport;

/// Create two linked endpoints, each buffering up to `capacity` frames.
pub fn pair(capacity: usize) -> (Transport, Transport) {
    let (left_tx, left_rx) = mpsc::channel(capacity);
    let (right_tx, right_rx) = mpsc::channel(capacity);
    (endpoint(left_tx, right_rx), endpoint(right_tx, left_rx))
}

fn endpoint(tx: mpsc::Sender<Frame>, rx: mpsc::Receiver<Frame>) -> Transport {
    let sink = PollSender::new(tx)
        .sink_map_err(|_| ChannelError::TransportError(ERR_PEER_GONE.to_string()));
    let stream = ReceiverStream::new(rx).map(Ok);
    Transport::new(sink, stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[tokio::test]
    async fn frames_cross_between_endpoints() {
        let (left, right) = pair(4);
        let (mut left_sink, _left_stream) = left.into_parts();
        let (_right_sink, mut right_stream) = right.into_parts();

        left_sink
            .send(Frame::Binary(Bytes::from_static(b"hello")))
            .await
            .expect("send");
        let frame = right_stream.next().await.expect("frame").expect("ok");
        assert_eq!(frame, Frame::Binary(Bytes::from_static(b"hello")));
    }

    #[tokio::test]
    async fn write_to_dropped_peer_fails() {
        let (left, right) = pair(4);
        let (mut left_sink, _left_stream) = left.into_parts();
        drop(right);

        let result = left_sink.send(Frame::Text("late".into())).await;
        assert!(matches!(result, Err(ChannelError::TransportError(_))));
    }

    #[tokio::test]
    async fn closing_sink_ends_peer_stream() {
        let (left, right) = pair(4);
        let (mut left_sink, _left_stream) = left.into_parts();
        let (_right_sink, mut right_stream) = right.into_parts();

        left_sink.close().await.expect("close");
        assert!(right_stream.next().await.is_none());
    }
}
