//! Async message bus between channels and the agent runner.
//!
//! Two bounded tokio mpsc queues: inbound (channel → agent) and
//! outbound (agent → channel manager).

use super::types::{InboundMessage, OutboundMessage};
use tokio::sync::{mpsc, Mutex};

/// Default queue depth for both directions.
pub const DEFAULT_BUS_CAPACITY: usize = 100;

pub struct MessageBus {
    inbound_tx: mpsc::Sender<InboundMessage>,
    inbound_rx: Mutex<mpsc::Receiver<InboundMessage>>,
    outbound_tx: mpsc::Sender<OutboundMessage>,
    outbound_rx: Mutex<mpsc::Receiver<OutboundMessage>>,
}

impl MessageBus {
    pub fn new(capacity: usize) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(capacity);
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
        MessageBus {
            inbound_tx,
            inbound_rx: Mutex::new(inbound_rx),
            outbound_tx,
            outbound_rx: Mutex::new(outbound_rx),
        }
    }

    pub async fn publish_inbound(&self, msg: InboundMessage) -> anyhow::Result<()> {
        self.inbound_tx
            .send(msg)
            .await
            .map_err(|_| anyhow::anyhow!("inbound queue closed"))
    }

    /// Next inbound message; `None` once every sender is gone.
    pub async fn consume_inbound(&self) -> Option<InboundMessage> {
        self.inbound_rx.lock().await.recv().await
    }

    pub async fn publish_outbound(&self, msg: OutboundMessage) -> anyhow::Result<()> {
        self.outbound_tx
            .send(msg)
            .await
            .map_err(|_| anyhow::anyhow!("outbound queue closed"))
    }

    pub async fn consume_outbound(&self) -> Option<OutboundMessage> {
        self.outbound_rx.lock().await.recv().await
    }

    /// Sender handle for channels that publish from their own tasks.
    pub fn inbound_sender(&self) -> mpsc::Sender<InboundMessage> {
        self.inbound_tx.clone()
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}
