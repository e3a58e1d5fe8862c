//! In-process channel
//!
//! Connects a [`BridgeClient`](crate::BridgeClient) to a surface living in the
//! same process, through tokio channels. Embedders whose host runs the surface
//! in-process use it directly; the integration tests use it to play the
//! surface side.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace};

use hwkeyring_core::{Error, Result};

use crate::channel::{ChannelConnector, Inbox, ListenerId, MessageChannel};
use crate::message::WireMessage;

/// Bridge side of an in-process channel
pub struct LocalChannel {
    listeners: Mutex<HashMap<ListenerId, mpsc::UnboundedSender<WireMessage>>>,
    next_listener: AtomicU64,
    outbound: mpsc::UnboundedSender<WireMessage>,
}

/// Surface side of an in-process channel
pub struct RemoteEnd {
    channel: Arc<LocalChannel>,
    inbound: mpsc::UnboundedReceiver<WireMessage>,
}

impl LocalChannel {
    /// Create a connected channel and its surface side
    pub fn pair() -> (Arc<LocalChannel>, RemoteEnd) {
        let (outbound, inbound) = mpsc::unbounded_channel();
        let channel = Arc::new(LocalChannel {
            listeners: Mutex::new(HashMap::new()),
            next_listener: AtomicU64::new(0),
            outbound,
        });
        let remote = RemoteEnd {
            channel: channel.clone(),
            inbound,
        };
        (channel, remote)
    }

    /// Number of currently registered listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().map(|l| l.len()).unwrap_or(0)
    }

    fn deliver(&self, message: WireMessage) -> usize {
        let Ok(mut listeners) = self.listeners.lock() else {
            return 0;
        };
        // drop listeners whose inbox is gone
        listeners.retain(|_, tx| tx.send(message.clone()).is_ok());
        listeners.len()
    }
}

#[async_trait]
impl MessageChannel for LocalChannel {
    async fn post(&self, message: WireMessage) -> Result<()> {
        trace!(kind = %message.kind, id = ?message.id, "Posting to surface");
        self.outbound
            .send(message)
            .map_err(|_| Error::Channel("Remote side detached".to_string()))
    }

    fn add_listener(&self) -> (ListenerId, Inbox) {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.insert(id, tx);
        }
        (id, rx)
    }

    fn remove_listener(&self, id: ListenerId) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.remove(&id);
        }
    }
}

impl RemoteEnd {
    /// Next message posted by the bridge
    pub async fn recv(&mut self) -> Option<WireMessage> {
        self.inbound.recv().await
    }

    /// Deliver a message to every bridge listener, returning how many got it
    pub fn send(&self, message: WireMessage) -> usize {
        self.channel.deliver(message)
    }

    pub fn channel(&self) -> &Arc<LocalChannel> {
        &self.channel
    }
}

/// Connector that hands out the first [`LocalChannel`] attached under the
/// requested name
pub struct LocalConnector {
    attached: watch::Sender<Option<(String, Arc<LocalChannel>)>>,
}

impl LocalConnector {
    pub fn new() -> Self {
        let (attached, _) = watch::channel(None);
        Self { attached }
    }

    /// Attach a surface under `name`, returning its side of the channel
    pub fn connect(&self, name: &str) -> RemoteEnd {
        let (channel, remote) = LocalChannel::pair();
        debug!(name, "Surface attached");
        self.attached.send_replace(Some((name.to_string(), channel)));
        remote
    }
}

impl Default for LocalConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelConnector for LocalConnector {
    async fn attach(&self, name: &str) -> Result<Arc<dyn MessageChannel>> {
        let mut rx = self.attached.subscribe();
        loop {
            let found = match &*rx.borrow_and_update() {
                Some((attached_name, channel)) if attached_name == name => Some(channel.clone()),
                _ => None,
            };
            if let Some(channel) = found {
                return Ok(channel as Arc<dyn MessageChannel>);
            }
            rx.changed()
                .await
                .map_err(|_| Error::Channel("Connector dropped".to_string()))?;
        }
    }
}
