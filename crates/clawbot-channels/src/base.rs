//! The `Channel` trait every chat-platform adapter implements.

use async_trait::async_trait;
use clawbot_core::bus::OutboundMessage;

/// A chat platform connected to the message bus.
///
/// `start` runs the adapter's receive loop and publishes inbound messages
/// until `stop` is called; `send` delivers agent replies.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Matches `OutboundMessage::channel` for replies routed here.
    fn name(&self) -> &str;

    async fn start(&self) -> anyhow::Result<()>;

    async fn stop(&self) -> anyhow::Result<()>;

    async fn send(&self, msg: &OutboundMessage) -> anyhow::Result<()>;
}
