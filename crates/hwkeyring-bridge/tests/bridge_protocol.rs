//! Integration tests for the bridge request/response protocol
//!
//! The surface side is played by a task on the far end of an in-process
//! channel; the host window manager is a fake that records what it was asked
//! to do.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use alloy_primitives::U256;
use bip32::{DerivationPath, XPrv};
use serde_json::{json, Value};

use hwkeyring_bridge::*;
use hwkeyring_core::{Address, Error, ErrorKind, ExtendedPublicKey, LegacyTransaction, Result};

// ============================================================================
// Fixtures
// ============================================================================

#[derive(Default, Debug, Clone)]
struct HostLog {
    opened: Vec<Placement>,
    closed: Vec<u64>,
    focused: Vec<u64>,
    open_now: usize,
    max_open: usize,
}

#[derive(Default)]
struct FakeHost {
    normal_tab: Option<TabRef>,
    fail_open: bool,
    open_delay: Option<Duration>,
    next_tab: AtomicU64,
    log: Mutex<HostLog>,
}

impl FakeHost {
    fn beside(tab: TabRef) -> Self {
        Self {
            normal_tab: Some(tab),
            ..Default::default()
        }
    }

    fn log(&self) -> HostLog {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl SurfaceHost for FakeHost {
    async fn active_normal_tab(&self) -> Result<Option<TabRef>> {
        Ok(self.normal_tab)
    }

    async fn open(&self, _url: &str, placement: &Placement) -> Result<TabRef> {
        if let Some(delay) = self.open_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_open {
            return Err(Error::Surface("window manager unavailable".to_string()));
        }
        let mut log = self.log.lock().unwrap();
        log.opened.push(*placement);
        log.open_now += 1;
        log.max_open = log.max_open.max(log.open_now);
        Ok(TabRef {
            id: 1000 + self.next_tab.fetch_add(1, Ordering::SeqCst),
            window_id: 1,
        })
    }

    async fn focus(&self, tab: &TabRef) -> Result<()> {
        self.log.lock().unwrap().focused.push(tab.id);
        Ok(())
    }

    async fn close(&self, tab: &TabRef) -> Result<()> {
        let mut log = self.log.lock().unwrap();
        log.closed.push(tab.id);
        log.open_now = log.open_now.saturating_sub(1);
        Ok(())
    }
}

type Seen = Arc<Mutex<Vec<WireMessage>>>;

/// Play the surface: answer every request with whatever `respond` returns
fn spawn_surface<F>(mut remote: RemoteEnd, mut respond: F) -> Seen
where
    F: FnMut(&WireMessage) -> Vec<WireMessage> + Send + 'static,
{
    let seen: Seen = Arc::default();
    let record = seen.clone();
    tokio::spawn(async move {
        while let Some(message) = remote.recv().await {
            record.lock().unwrap().push(message.clone());
            for reply in respond(&message) {
                remote.send(reply);
            }
        }
    });
    seen
}

/// Poll until `done` holds; background cleanup is not awaited by anyone
async fn wait_until(mut done: impl FnMut() -> bool) {
    for _ in 0..200 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}

fn test_xpub() -> ExtendedPublicKey {
    let path: DerivationPath = "m/44'/60'/0'/0".parse().unwrap();
    let xprv = XPrv::derive_from_path([0x11; 64], &path).unwrap();
    ExtendedPublicKey::new(xprv.public_key())
}

struct Harness {
    client: Arc<BridgeClient>,
    host: Arc<FakeHost>,
    listeners: Arc<LocalChannel>,
}

fn harness_with<F>(config: BridgeConfig, host: FakeHost, respond: F) -> (Harness, Seen)
where
    F: FnMut(&WireMessage) -> Vec<WireMessage> + Send + 'static,
{
    let connector = Arc::new(LocalConnector::new());
    let remote = connector.connect(&config.channel_name);
    let listeners = remote.channel().clone();
    let host = Arc::new(host);
    let client = Arc::new(BridgeClient::new(config, connector, host.clone()));
    let seen = spawn_surface(remote, respond);
    (
        Harness {
            client,
            host,
            listeners,
        },
        seen,
    )
}

fn harness<F>(respond: F) -> (Harness, Seen)
where
    F: FnMut(&WireMessage) -> Vec<WireMessage> + Send + 'static,
{
    harness_with(BridgeConfig::default(), FakeHost::default(), respond)
}

/// Reply `payload` to every request with the correct response tag and id
fn answer_with(payload: Value) -> impl FnMut(&WireMessage) -> Vec<WireMessage> + Send + 'static {
    move |request| {
        let operation = [
            Operation::FetchExtendedPublicKey,
            Operation::SignTransaction,
            Operation::SignMessage,
            Operation::SignTypedData,
        ]
        .into_iter()
        .find(|op| op.request_tag() == request.kind)
        .unwrap();
        vec![WireMessage::completed(
            operation,
            request.id.unwrap(),
            payload.clone(),
        )]
    }
}

// ============================================================================
// Happy path
// ============================================================================

#[tokio::test]
async fn test_fetch_extended_public_key() {
    let xpub = test_xpub();
    let (h, seen) = harness(answer_with(json!(xpub.to_xpub_string())));

    let fetched = h
        .client
        .fetch_extended_public_key("m/44'/60'/0'/0")
        .await
        .unwrap();
    assert_eq!(fetched.public_key_bytes(), xpub.public_key_bytes());

    let requests = seen.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].kind, tags::GET_XPUB);
    assert_eq!(requests[0].payload["derivationPath"], "m/44'/60'/0'/0");

    let log = h.host.log();
    assert_eq!(log.opened.len(), 1);
    assert_eq!(log.closed.len(), 1);
    assert_eq!(h.listeners.listener_count(), 0);
}

#[tokio::test]
async fn test_sign_transaction_payload() {
    let (h, seen) = harness(answer_with(json!("0xf86c")));
    let address: Address = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed".parse().unwrap();
    let transaction = LegacyTransaction {
        nonce: U256::from(9u64),
        gas_price: U256::from(20_000_000_000u64),
        gas_limit: U256::from(21_000u64),
        ..Default::default()
    };

    let signed = h
        .client
        .sign_transaction(&address, "m/44'/60'/0'/0/0", transaction)
        .await
        .unwrap();
    assert_eq!(signed, "0xf86c");

    let request = seen.lock().unwrap()[0].clone();
    assert_eq!(request.kind, tags::SIGN_TRANSACTION);
    assert_eq!(
        request.payload["address"],
        "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"
    );
    assert_eq!(request.payload["derivationPath"], "m/44'/60'/0'/0/0");
    assert_eq!(request.payload["transaction"]["gasPrice"], "0x4a817c800");
}

#[tokio::test]
async fn test_sign_typed_data_payload() {
    let (h, seen) = harness(answer_with(json!("0xsig")));

    h.client
        .sign_typed_data("m/44'/60'/0'/0/0", r#"{"types":{}}"#.to_string())
        .await
        .unwrap();

    let request = seen.lock().unwrap()[0].clone();
    assert_eq!(request.kind, tags::SIGN_TYPED_DATA);
    assert_eq!(request.payload["typedData"], r#"{"types":{}}"#);
}

#[tokio::test]
async fn test_ids_increase_per_request() {
    let (h, seen) = harness(answer_with(json!("0xsig")));

    h.client.sign_message("m/0", "0x01").await.unwrap();
    h.client.sign_message("m/0", "0x02").await.unwrap();

    let ids: Vec<u64> = seen
        .lock()
        .unwrap()
        .iter()
        .map(|m| m.id.unwrap())
        .collect();
    assert_eq!(ids.len(), 2);
    assert!(ids[1] > ids[0]);

    // fresh surface per request
    let log = h.host.log();
    assert_eq!(log.opened.len(), 2);
    assert_eq!(log.closed.len(), 2);
}

// ============================================================================
// Terminal messages and stray responses
// ============================================================================

#[tokio::test]
async fn test_mismatched_id_ignored_then_closed_aborts() {
    let (h, _) = harness(|request| {
        vec![
            WireMessage::completed(
                Operation::FetchExtendedPublicKey,
                request.id.unwrap() + 100,
                json!("xpub-from-a-superseded-request"),
            ),
            WireMessage::closed(),
        ]
    });

    let err = h
        .client
        .fetch_extended_public_key("m/44'/60'/0'/0")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OperationAborted);
    assert_eq!(err.to_string(), "Account adding was aborted");

    assert_eq!(h.host.log().closed.len(), 1);
    assert_eq!(h.listeners.listener_count(), 0);
}

#[tokio::test]
async fn test_closed_message_is_operation_specific() {
    let (h, _) = harness(|_| vec![WireMessage::closed()]);

    let err = h.client.sign_message("m/0", "0x01").await.unwrap_err();
    assert_eq!(err.to_string(), "Message signing was aborted");

    let err = h
        .client
        .sign_transaction(&Address::new([1; 20]), "m/0", LegacyTransaction::default())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Transaction signing was aborted");
}

#[tokio::test]
async fn test_surface_error_is_generic_failure() {
    let (h, _) = harness(|_| vec![WireMessage::surface_error(json!({"code": 27013}))]);

    let err = h.client.sign_message("m/0", "0x01").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OperationFailed);
    assert_eq!(err.to_string(), GENERIC_FAILURE_MESSAGE);
    assert_eq!(h.host.log().closed.len(), 1);
}

#[tokio::test]
async fn test_wrong_kind_with_right_id_is_ignored() {
    let (h, _) = harness(|request| {
        let id = request.id.unwrap();
        vec![
            WireMessage::completed(Operation::SignTransaction, id, json!("wrong")),
            WireMessage::completed(Operation::SignMessage, id, json!("0xright")),
        ]
    });

    let sig = h.client.sign_message("m/0", "0x01").await.unwrap();
    assert_eq!(sig, "0xright");
}

#[tokio::test]
async fn test_closed_outside_request_is_ignored() {
    let config = BridgeConfig::default();
    let connector = Arc::new(LocalConnector::new());
    let remote = connector.connect(&config.channel_name);
    let client = BridgeClient::new(config, connector, Arc::new(FakeHost::default()));
    client.wait_for_attach().await.unwrap();

    // nothing pending, so nobody is listening
    assert_eq!(remote.send(WireMessage::closed()), 0);

    spawn_surface(remote, answer_with(json!("0xsig")));
    assert_eq!(client.sign_message("m/0", "0x01").await.unwrap(), "0xsig");
}

// ============================================================================
// Failures and timeouts
// ============================================================================

#[tokio::test]
async fn test_malformed_xpub_payload() {
    let (h, _) = harness(answer_with(json!("definitely not an xpub")));

    let err = h
        .client
        .fetch_extended_public_key("m/44'/60'/0'/0")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedDeviceResponse);
    assert_eq!(h.host.log().closed.len(), 1);
}

#[tokio::test]
async fn test_non_string_payload_is_malformed() {
    let (h, _) = harness(answer_with(json!({"v": 27})));

    let err = h.client.sign_message("m/0", "0x01").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedDeviceResponse);
}

#[tokio::test]
async fn test_host_failure_propagates_unchanged() {
    let host = FakeHost {
        fail_open: true,
        ..Default::default()
    };
    let (h, seen) = harness_with(BridgeConfig::default(), host, answer_with(json!("0xsig")));

    let err = h.client.sign_message("m/0", "0x01").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Surface);
    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(h.listeners.listener_count(), 0);
}

#[tokio::test]
async fn test_request_timeout_aborts_and_tears_down() {
    let config = BridgeConfig {
        request_timeout_secs: Some(1),
        ..Default::default()
    };
    let (h, _) = harness_with(config, FakeHost::default(), |_| Vec::new());

    let err = h.client.sign_message("m/0", "0x01").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OperationAborted);
    assert_eq!(err.to_string(), "Message signing was aborted");

    let log = h.host.log();
    assert_eq!(log.opened.len(), 1);
    assert_eq!(log.closed.len(), 1);
    assert_eq!(h.listeners.listener_count(), 0);
}

#[tokio::test]
async fn test_dropped_request_closes_surface_and_next_opens_fresh() {
    let mut answer = answer_with(json!("0xsig"));
    let mut first = true;
    let (h, seen) = harness(move |request| {
        // the first request is never answered
        if std::mem::take(&mut first) {
            Vec::new()
        } else {
            answer(request)
        }
    });

    let dropped = tokio::time::timeout(
        Duration::from_millis(50),
        h.client.sign_message("m/0", "0x01"),
    )
    .await;
    assert!(dropped.is_err());
    assert_eq!(h.listeners.listener_count(), 0);

    let host = h.host.clone();
    wait_until(move || host.log().closed == vec![1000]).await;

    assert_eq!(h.client.sign_message("m/0", "0x02").await.unwrap(), "0xsig");

    let log = h.host.log();
    assert_eq!(log.opened.len(), 2);
    assert_eq!(log.closed, vec![1000, 1001]);
    assert!(log.focused.is_empty());
    assert_eq!(log.max_open, 1);
    assert_eq!(seen.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_request_timeout_during_slow_open_still_closes_tab() {
    let config = BridgeConfig {
        request_timeout_secs: Some(1),
        ..Default::default()
    };
    let host = FakeHost {
        open_delay: Some(Duration::from_millis(1500)),
        ..Default::default()
    };
    let (h, seen) = harness_with(config, host, answer_with(json!("0xsig")));

    let err = h.client.sign_message("m/0", "0x01").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OperationAborted);

    let log = h.host.log();
    assert_eq!(log.opened.len(), 1);
    assert_eq!(log.closed, vec![1000]);
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_attach_timeout_then_late_attach() {
    let config = BridgeConfig {
        attach_timeout_secs: Some(1),
        ..Default::default()
    };
    let connector = Arc::new(LocalConnector::new());
    let host = Arc::new(FakeHost::default());
    let client = BridgeClient::new(config.clone(), connector.clone(), host.clone());

    let err = client.sign_message("m/0", "0x01").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Channel);
    assert!(host.log().opened.is_empty());

    let remote = connector.connect(&config.channel_name);
    spawn_surface(remote, answer_with(json!("0xlate")));
    assert_eq!(client.sign_message("m/0", "0x01").await.unwrap(), "0xlate");
}

#[tokio::test]
async fn test_attach_ignores_other_channel_names() {
    let config = BridgeConfig {
        attach_timeout_secs: Some(1),
        ..Default::default()
    };
    let connector = Arc::new(LocalConnector::new());
    let _stranger = connector.connect("someone-else");
    let client = BridgeClient::new(config, connector, Arc::new(FakeHost::default()));

    let err = client.wait_for_attach().await.err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Channel);
}

// ============================================================================
// Surface placement and concurrency
// ============================================================================

#[tokio::test]
async fn test_opener_tab_is_refocused() {
    let opener = TabRef { id: 7, window_id: 3 };
    let (h, _) = harness_with(
        BridgeConfig::default(),
        FakeHost::beside(opener),
        answer_with(json!("0xsig")),
    );

    h.client.sign_message("m/0", "0x01").await.unwrap();

    let log = h.host.log();
    assert_eq!(log.opened, vec![Placement::AdjacentTo(opener)]);
    assert_eq!(log.focused, vec![7]);
}

#[tokio::test]
async fn test_new_window_without_normal_tab() {
    let (h, _) = harness(answer_with(json!("0xsig")));

    h.client.sign_message("m/0", "0x01").await.unwrap();

    let log = h.host.log();
    assert_eq!(log.opened, vec![Placement::NewWindow]);
    assert!(log.focused.is_empty());
}

#[tokio::test]
async fn test_concurrent_callers_share_one_surface_at_a_time() {
    let (h, seen) = harness(answer_with(json!("0xsig")));

    let tasks: Vec<_> = (0..4)
        .map(|i| {
            let client = h.client.clone();
            tokio::spawn(async move { client.sign_message("m/0", &format!("0x0{}", i)).await })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), "0xsig");
    }

    let log = h.host.log();
    assert_eq!(log.max_open, 1);
    assert_eq!(log.opened.len(), 4);
    assert_eq!(log.closed.len(), 4);

    let mut ids: Vec<u64> = seen.lock().unwrap().iter().map(|m| m.id.unwrap()).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 4);

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(h.listeners.listener_count(), 0);
}
