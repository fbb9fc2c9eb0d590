//! Channel manager: runs every registered channel and routes replies.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use clawbot_core::bus::MessageBus;

use crate::base::Channel;

pub struct ChannelManager {
    channels: HashMap<String, Arc<dyn Channel>>,
    bus: Arc<MessageBus>,
    shutdown: Arc<Notify>,
}

impl ChannelManager {
    pub fn new(bus: Arc<MessageBus>) -> Self {
        Self {
            channels: HashMap::new(),
            bus,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Register a channel, replacing any with the same name.
    pub fn register(&mut self, channel: Arc<dyn Channel>) {
        let name = channel.name().to_string();
        info!(channel = %name, "registered channel");
        self.channels.insert(name, channel);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Channel>> {
        self.channels.get(name)
    }

    /// Registered channel names, sorted.
    pub fn channel_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Spawn each channel's receive loop and the outbound router.
    ///
    /// Returns immediately; the tasks run until [`stop_all`](Self::stop_all).
    pub fn start_all(&self) -> Vec<JoinHandle<()>> {
        if self.channels.is_empty() {
            warn!("no channels registered, nothing to start");
            return Vec::new();
        }
        info!(channels = ?self.channel_names(), "starting channels");

        let mut handles: Vec<JoinHandle<()>> = self
            .channels
            .iter()
            .map(|(name, channel)| {
                let (name, channel) = (name.clone(), channel.clone());
                tokio::spawn(async move {
                    if let Err(e) = channel.start().await {
                        error!(channel = %name, error = %e, "channel failed");
                    }
                    info!(channel = %name, "channel stopped");
                })
            })
            .collect();

        handles.push(tokio::spawn(route_outbound(
            self.bus.clone(),
            self.channels.clone(),
            self.shutdown.clone(),
        )));
        handles
    }

    /// Stop the router, then every channel.
    pub async fn stop_all(&self) {
        self.shutdown.notify_one();
        for (name, channel) in &self.channels {
            debug!(channel = %name, "stopping channel");
            if let Err(e) = channel.stop().await {
                error!(channel = %name, error = %e, "channel stop failed");
            }
        }
        info!("all channels stopped");
    }
}

/// Deliver outbound bus messages to the channel they name.
async fn route_outbound(
    bus: Arc<MessageBus>,
    channels: HashMap<String, Arc<dyn Channel>>,
    shutdown: Arc<Notify>,
) {
    loop {
        tokio::select! {
            msg = bus.consume_outbound() => {
                let Some(msg) = msg else {
                    info!("outbound queue closed, router exiting");
                    break;
                };
                match channels.get(&msg.channel) {
                    Some(channel) => {
                        debug!(channel = %msg.channel, chat_id = %msg.chat_id, len = msg.content.len(), "routing reply");
                        if let Err(e) = channel.send(&msg).await {
                            error!(channel = %msg.channel, error = %e, "failed to deliver reply");
                        }
                    }
                    None => warn!(channel = %msg.channel, "no channel registered for reply"),
                }
            }
            _ = shutdown.notified() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use clawbot_core::bus::OutboundMessage;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::sync::Mutex;

    struct RecordingChannel {
        name: String,
        stopped: AtomicBool,
        stop_signal: Notify,
        sent: Mutex<Vec<String>>,
    }

    impl RecordingChannel {
        fn new(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.into(),
                stopped: AtomicBool::new(false),
                stop_signal: Notify::new(),
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Channel for RecordingChannel {
        fn name(&self) -> &str {
            &self.name
        }

        async fn start(&self) -> anyhow::Result<()> {
            self.stop_signal.notified().await;
            Ok(())
        }

        async fn stop(&self) -> anyhow::Result<()> {
            self.stopped.store(true, Ordering::SeqCst);
            self.stop_signal.notify_one();
            Ok(())
        }

        async fn send(&self, msg: &OutboundMessage) -> anyhow::Result<()> {
            self.sent.lock().await.push(format!("{}:{}", msg.chat_id, msg.content));
            Ok(())
        }
    }

    #[test]
    fn test_register_replaces_and_sorts() {
        let mut mgr = ChannelManager::new(Arc::new(MessageBus::new(8)));
        assert!(mgr.is_empty());
        mgr.register(RecordingChannel::new("telegram"));
        mgr.register(RecordingChannel::new("cli"));
        mgr.register(RecordingChannel::new("telegram"));
        assert_eq!(mgr.len(), 2);
        assert_eq!(mgr.channel_names(), vec!["cli", "telegram"]);
        assert!(mgr.get("telegram").is_some());
        assert!(mgr.get("slack").is_none());
    }

    #[tokio::test]
    async fn test_start_all_empty() {
        let mgr = ChannelManager::new(Arc::new(MessageBus::new(8)));
        assert!(mgr.start_all().is_empty());
    }

    #[tokio::test]
    async fn test_replies_reach_their_channel() {
        let bus = Arc::new(MessageBus::new(8));
        let telegram = RecordingChannel::new("telegram");
        let other = RecordingChannel::new("other");
        let mut mgr = ChannelManager::new(bus.clone());
        mgr.register(telegram.clone());
        mgr.register(other.clone());
        let handles = mgr.start_all();
        assert_eq!(handles.len(), 3);

        bus.publish_outbound(OutboundMessage::new("telegram", "1", "hello")).await.unwrap();
        bus.publish_outbound(OutboundMessage::new("nowhere", "2", "dropped")).await.unwrap();
        bus.publish_outbound(OutboundMessage::new("telegram", "3", "again")).await.unwrap();

        for _ in 0..100 {
            if telegram.sent.lock().await.len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(*telegram.sent.lock().await, vec!["1:hello", "3:again"]);
        assert!(other.sent.lock().await.is_empty());

        mgr.stop_all().await;
        assert!(telegram.stopped.load(Ordering::SeqCst));
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
        }
    }
}
