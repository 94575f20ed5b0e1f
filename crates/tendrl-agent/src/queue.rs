//! Bounded FIFO between connection handlers and the egress worker.
//!
//! A thin wrapper over a bounded `tokio::sync::mpsc` channel. Producers block
//! in [`QueueSender::offer`] once the queue is at capacity (backpressure);
//! the single consumer closes the queue at shutdown and drains whatever is
//! left. Per-producer ordering is the channel's FIFO guarantee; ordering
//! across producers is unspecified.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use crate::messages::Message;

/// Creates a queue of the given capacity.
///
/// The receiver is handed to the egress worker; sender clones go to every
/// connection handler.
#[must_use]
pub fn channel(capacity: usize) -> (QueueSender, QueueReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        QueueSender { tx },
        QueueReceiver { rx, capacity },
    )
}

/// Returned by [`QueueSender::offer`] once the queue has been closed for
/// shutdown; the message is handed back so the caller can account for it.
#[derive(Debug, thiserror::Error)]
#[error("message queue is closed")]
pub struct QueueClosed(pub Message);

/// Producer half; cheap to clone.
#[derive(Debug, Clone)]
pub struct QueueSender {
    tx: mpsc::Sender<Message>,
}

impl QueueSender {
    /// Enqueues a message, waiting for capacity when the queue is full.
    pub async fn offer(&self, message: Message) -> Result<(), QueueClosed> {
        self.tx
            .send(message)
            .await
            .map_err(|e| QueueClosed(e.0))
    }
}

/// Consumer half; exactly one exists per queue.
#[derive(Debug)]
pub struct QueueReceiver {
    rx: mpsc::Receiver<Message>,
    capacity: usize,
}

impl QueueReceiver {
    /// Next message, or `None` once the queue is closed and fully drained.
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Result<Message, TryRecvError> {
        self.rx.try_recv()
    }

    /// Disallows further offers. Messages already buffered (and offers that
    /// had already reserved a slot) remain receivable until [`recv`] returns
    /// `None`.
    ///
    /// [`recv`]: QueueReceiver::recv
    pub fn close(&mut self) {
        self.rx.close();
    }

    /// Number of messages currently buffered.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.rx.len()
    }

    /// Queue depth as a percentage of capacity, in `[0, 100]`.
    #[must_use]
    pub fn load_percent(&self) -> f64 {
        (self.depth() as f64 / self.capacity as f64 * 100.0).min(100.0)
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::MsgType;
    use std::time::Duration;
    use tokio::time::timeout;

    fn message(data: &str) -> Message {
        Message {
            data: Some(data.to_string()),
            msg_type: Some(MsgType::Publish),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn preserves_per_producer_order() {
        let (tx, mut rx) = channel(16);
        for i in 0..5 {
            tx.offer(message(&format!("m{i}"))).await.expect("offer");
        }
        for i in 0..5 {
            let msg = rx.recv().await.expect("message");
            assert_eq!(msg.data.as_deref(), Some(format!("m{i}").as_str()));
        }
    }

    #[tokio::test]
    async fn offer_blocks_at_capacity_until_a_receive() {
        let (tx, mut rx) = channel(1);
        tx.offer(message("first")).await.expect("offer");

        // Queue is full: the next offer must not complete yet.
        let blocked = tx.offer(message("second"));
        tokio::pin!(blocked);
        assert!(timeout(Duration::from_millis(50), blocked.as_mut())
            .await
            .is_err());

        // Receiving frees a slot and unblocks the pending offer.
        let first = rx.recv().await.expect("message");
        assert_eq!(first.data.as_deref(), Some("first"));
        timeout(Duration::from_millis(200), blocked)
            .await
            .expect("offer unblocked")
            .expect("offer succeeded");
    }

    #[tokio::test]
    async fn close_rejects_new_offers_but_drains_buffered() {
        let (tx, mut rx) = channel(8);
        tx.offer(message("kept")).await.expect("offer");
        rx.close();

        let err = tx.offer(message("rejected")).await.expect_err("closed");
        assert_eq!(err.0.data.as_deref(), Some("rejected"));

        let kept = rx.recv().await.expect("buffered message survives close");
        assert_eq!(kept.data.as_deref(), Some("kept"));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn depth_and_load_track_buffered_messages() {
        let (tx, mut rx) = channel(10);
        assert_eq!(rx.depth(), 0);
        assert_eq!(rx.load_percent(), 0.0);

        for _ in 0..5 {
            tx.offer(message("x")).await.expect("offer");
        }
        assert_eq!(rx.depth(), 5);
        assert_eq!(rx.load_percent(), 50.0);

        let _ = rx.recv().await;
        assert_eq!(rx.depth(), 4);
    }

    #[tokio::test]
    async fn recv_returns_none_after_all_senders_drop() {
        let (tx, mut rx) = channel(4);
        tx.offer(message("only")).await.expect("offer");
        drop(tx);
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }
}
