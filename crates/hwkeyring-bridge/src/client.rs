//! Bridge client
//!
//! Runs one device operation at a time through a transient signing surface:
//! wait for the channel, open or refocus the surface, post the request, wait
//! for the matching response or a terminal message, then tear everything
//! down whatever the outcome.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{Mutex, MutexGuard, OnceCell};
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use hwkeyring_core::{Address, Error, ExtendedPublicKey, LegacyTransaction, Result};

use crate::channel::{ChannelConnector, Inbox, ListenerId, MessageChannel};
use crate::config::BridgeConfig;
use crate::message::{Inbound, Operation, Request};
use crate::surface::{SigningSurface, SurfaceHost};

/// Reported for any error the surface raises internally
pub const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong. Please try again";

/// Client for the hardware device, reached through the signing surface
pub struct BridgeClient {
    config: BridgeConfig,
    connector: Arc<dyn ChannelConnector>,
    channel: OnceCell<Arc<dyn MessageChannel>>,
    next_id: AtomicU64,
    /// Held for the whole request; one surface, one request in flight
    surface: Mutex<SigningSurface>,
}

impl BridgeClient {
    pub fn new(
        config: BridgeConfig,
        connector: Arc<dyn ChannelConnector>,
        host: Arc<dyn SurfaceHost>,
    ) -> Self {
        let surface = SigningSurface::new(host, config.surface_url.clone());
        Self {
            config,
            connector,
            channel: OnceCell::new(),
            next_id: AtomicU64::new(0),
            surface: Mutex::new(surface),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Wait for the remote side to attach
    ///
    /// The channel is cached after the first successful attach. With an
    /// attach timeout configured, expiry fails with `Channel` and the next
    /// call waits again.
    pub async fn wait_for_attach(&self) -> Result<Arc<dyn MessageChannel>> {
        self.channel
            .get_or_try_init(|| async {
                let name = self.config.channel_name.as_str();
                debug!(name, "Waiting for signing surface channel");
                let attach = self.connector.attach(name);
                let channel = match self.config.attach_timeout() {
                    Some(limit) => timeout(limit, attach).await.map_err(|_| {
                        Error::Channel(format!(
                            "Remote side did not attach within {}s",
                            limit.as_secs()
                        ))
                    })??,
                    None => attach.await?,
                };
                info!(name, "Signing surface channel attached");
                Ok::<_, Error>(channel)
            })
            .await
            .cloned()
    }

    /// Fetch the extended public key at `derivation_path`
    pub async fn fetch_extended_public_key(
        &self,
        derivation_path: &str,
    ) -> Result<ExtendedPublicKey> {
        let payload = self
            .execute(Request::FetchExtendedPublicKey {
                derivation_path: derivation_path.to_string(),
            })
            .await?;
        string_payload(payload)?.parse()
    }

    /// Sign a legacy transaction, returning the device's signed RLP as hex
    pub async fn sign_transaction(
        &self,
        address: &Address,
        derivation_path: &str,
        transaction: LegacyTransaction,
    ) -> Result<String> {
        let payload = self
            .execute(Request::SignTransaction {
                address: *address,
                derivation_path: derivation_path.to_string(),
                transaction,
            })
            .await?;
        string_payload(payload)
    }

    /// Sign a personal message given as hex
    pub async fn sign_message(&self, derivation_path: &str, message_hex: &str) -> Result<String> {
        let payload = self
            .execute(Request::SignMessage {
                derivation_path: derivation_path.to_string(),
                message: message_hex.to_string(),
            })
            .await?;
        string_payload(payload)
    }

    /// Sign canonical typed-data JSON
    pub async fn sign_typed_data(&self, derivation_path: &str, typed_data: String) -> Result<String> {
        let payload = self
            .execute(Request::SignTypedData {
                derivation_path: derivation_path.to_string(),
                typed_data,
            })
            .await?;
        string_payload(payload)
    }

    fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn execute(&self, request: Request) -> Result<Value> {
        let operation = request.operation();
        let channel = self.wait_for_attach().await?;

        let mut surface = SurfaceLease(self.surface.lock().await);
        let id = self.next_request_id();
        info!(%operation, id, "Device request started");

        // registered before the surface opens so no reply can slip past
        let (listener, mut inbox) = channel.add_listener();
        let _listener = ListenerLease {
            channel: channel.as_ref(),
            id: listener,
        };
        let outcome = self
            .round_trip(channel.as_ref(), &mut surface, &request, id, &mut inbox)
            .await;

        surface.teardown().await;

        match &outcome {
            Ok(_) => info!(%operation, id, "Device request completed"),
            Err(e) => info!(%operation, id, error = %e, "Device request failed"),
        }
        outcome
    }

    async fn round_trip(
        &self,
        channel: &dyn MessageChannel,
        surface: &mut SigningSurface,
        request: &Request,
        id: u64,
        inbox: &mut Inbox,
    ) -> Result<Value> {
        let operation = request.operation();
        let exchange = async {
            surface.acquire().await?;
            channel.post(request.to_wire(id)?).await?;
            debug!(%operation, id, "Request posted");
            await_response(operation, id, inbox).await
        };

        match self.config.request_timeout() {
            Some(limit) => match timeout(limit, exchange).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(%operation, id, secs = limit.as_secs(), "Device request timed out");
                    Err(Error::OperationAborted(operation.aborted_message().to_string()))
                }
            },
            None => exchange.await,
        }
    }
}

/// Surface held for one request
///
/// Dropping it before teardown, as happens when the caller drops the request
/// future, hands the surface to a background close.
struct SurfaceLease<'a>(MutexGuard<'a, SigningSurface>);

impl Deref for SurfaceLease<'_> {
    type Target = SigningSurface;

    fn deref(&self) -> &SigningSurface {
        &self.0
    }
}

impl DerefMut for SurfaceLease<'_> {
    fn deref_mut(&mut self) -> &mut SigningSurface {
        &mut self.0
    }
}

impl Drop for SurfaceLease<'_> {
    fn drop(&mut self) {
        // no-op once teardown has run
        self.0.abandon();
    }
}

/// Listener registration removed on drop
struct ListenerLease<'a> {
    channel: &'a dyn MessageChannel,
    id: ListenerId,
}

impl Drop for ListenerLease<'_> {
    fn drop(&mut self) {
        self.channel.remove_listener(self.id);
    }
}

async fn await_response(operation: Operation, id: u64, inbox: &mut Inbox) -> Result<Value> {
    while let Some(message) = inbox.recv().await {
        trace!(kind = %message.kind, id = ?message.id, "Inbound message");
        match Inbound::classify(&message) {
            Some(Inbound::Closed) => {
                info!(%operation, id, "Signing surface closed by user");
                return Err(Error::OperationAborted(operation.aborted_message().to_string()));
            }
            Some(Inbound::SurfaceError(payload)) => {
                warn!(%operation, id, %payload, "Signing surface reported an error");
                return Err(Error::OperationFailed(GENERIC_FAILURE_MESSAGE.to_string()));
            }
            Some(Inbound::Completed {
                operation: kind,
                id: got,
                payload,
            }) => {
                if kind == operation && got == id {
                    return Ok(payload);
                }
                warn!(expected = id, got, kind = %kind, "Ignoring stray response");
            }
            None => {}
        }
    }
    Err(Error::Channel(
        "Channel closed while awaiting a response".to_string(),
    ))
}

fn string_payload(payload: Value) -> Result<String> {
    match payload {
        Value::String(s) => Ok(s),
        other => Err(Error::MalformedDeviceResponse(format!(
            "Expected a string payload, got {}",
            other
        ))),
    }
}
