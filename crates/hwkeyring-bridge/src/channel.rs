//! Message channel abstraction
//!
//! The host provides a duplex channel to the signing surface. The bridge
//! attaches to it once, then registers one listener per request and removes
//! it when the request settles.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use hwkeyring_core::Result;

use crate::message::WireMessage;

/// Handle for a registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Receiving side of a registered listener
pub type Inbox = mpsc::UnboundedReceiver<WireMessage>;

/// Duplex channel to the signing surface
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Post a message to the remote side
    async fn post(&self, message: WireMessage) -> Result<()>;

    /// Register a listener; every inbound message is delivered to every listener
    fn add_listener(&self) -> (ListenerId, Inbox);

    /// Unregister a listener; its inbox sees no further messages
    fn remove_listener(&self, id: ListenerId);
}

/// Source of the channel, resolved once the remote side attaches
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    /// Wait until a remote side announcing `name` attaches
    async fn attach(&self, name: &str) -> Result<Arc<dyn MessageChannel>>;
}
