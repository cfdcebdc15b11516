/*!
 * Bounded queue of messages waiting for the MQTT link.
 *
 * Producers run on the radio receive path and must never wait on the broker,
 * so a full queue rejects the new message with a warning instead of blocking.
 */
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{trace, warn};

use crate::message::OutboundMessage;

/// Sending half of the publish queue
#[derive(Debug, Clone)]
pub struct PublishQueue {
    sender: mpsc::Sender<OutboundMessage>,
    dropped: Arc<AtomicU64>,
}

impl PublishQueue {
    /// Create a queue holding at most `capacity` messages
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<OutboundMessage>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            receiver,
        )
    }

    /// Enqueue a message without waiting
    ///
    /// Returns `false` if the message was dropped.
    pub fn publish(&self, message: OutboundMessage) -> bool {
        match self.sender.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(message)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Publish queue full, dropping message for topic '{}'",
                    message.topic
                );
                trace!("Dropped payload: {}", message.payload);
                false
            }
            Err(mpsc::error::TrySendError::Closed(message)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Publish queue closed, dropping message for topic '{}'",
                    message.topic
                );
                false
            }
        }
    }

    /// Number of messages dropped since the queue was created
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
