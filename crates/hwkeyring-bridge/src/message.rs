//! Bridge wire messages
//!
//! Every message on the channel is `{type, id, payload}`. Requests carry a
//! correlation id; the surface answers with a `Completed` message of the
//! matching response type and the same id. `Closed` and `SurfaceError` are
//! terminal regardless of id.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use hwkeyring_core::{Address, LegacyTransaction, Result};

/// Message type tags
pub mod tags {
    pub const SURFACE_CLOSED: &str = "hwkeyring-surface-closed";
    pub const SURFACE_ERROR: &str = "hwkeyring-surface-error";

    pub const GET_XPUB: &str = "hwkeyring-get-xpub";
    pub const GET_XPUB_RESPONSE: &str = "hwkeyring-get-xpub-response";
    pub const SIGN_TRANSACTION: &str = "hwkeyring-sign-transaction";
    pub const SIGN_TRANSACTION_RESPONSE: &str = "hwkeyring-sign-transaction-response";
    pub const SIGN_MESSAGE: &str = "hwkeyring-sign-message";
    pub const SIGN_MESSAGE_RESPONSE: &str = "hwkeyring-sign-message-response";
    pub const SIGN_TYPED_DATA: &str = "hwkeyring-sign-typed-data";
    pub const SIGN_TYPED_DATA_RESPONSE: &str = "hwkeyring-sign-typed-data-response";
}

/// Message as it travels over the channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default)]
    pub payload: Value,
}

impl WireMessage {
    pub fn new(kind: impl Into<String>, id: Option<u64>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            id,
            payload,
        }
    }

    /// Surface dismissed by the user
    pub fn closed() -> Self {
        Self::new(tags::SURFACE_CLOSED, None, Value::Null)
    }

    /// Surface reported an internal error
    pub fn surface_error(payload: Value) -> Self {
        Self::new(tags::SURFACE_ERROR, None, payload)
    }

    /// Successful response to the request with `id`
    pub fn completed(operation: Operation, id: u64, payload: Value) -> Self {
        Self::new(operation.response_tag(), Some(id), payload)
    }
}

/// One logical device operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    FetchExtendedPublicKey,
    SignTransaction,
    SignMessage,
    SignTypedData,
}

impl Operation {
    const ALL: [Operation; 4] = [
        Operation::FetchExtendedPublicKey,
        Operation::SignTransaction,
        Operation::SignMessage,
        Operation::SignTypedData,
    ];

    pub fn request_tag(&self) -> &'static str {
        match self {
            Operation::FetchExtendedPublicKey => tags::GET_XPUB,
            Operation::SignTransaction => tags::SIGN_TRANSACTION,
            Operation::SignMessage => tags::SIGN_MESSAGE,
            Operation::SignTypedData => tags::SIGN_TYPED_DATA,
        }
    }

    pub fn response_tag(&self) -> &'static str {
        match self {
            Operation::FetchExtendedPublicKey => tags::GET_XPUB_RESPONSE,
            Operation::SignTransaction => tags::SIGN_TRANSACTION_RESPONSE,
            Operation::SignMessage => tags::SIGN_MESSAGE_RESPONSE,
            Operation::SignTypedData => tags::SIGN_TYPED_DATA_RESPONSE,
        }
    }

    /// Message reported when the user dismisses the surface mid-operation
    pub fn aborted_message(&self) -> &'static str {
        match self {
            Operation::FetchExtendedPublicKey => "Account adding was aborted",
            Operation::SignTransaction => "Transaction signing was aborted",
            Operation::SignMessage => "Message signing was aborted",
            Operation::SignTypedData => "Typed data signing was aborted",
        }
    }

    fn from_response_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.response_tag() == tag)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::FetchExtendedPublicKey => "fetch-extended-public-key",
            Operation::SignTransaction => "sign-transaction",
            Operation::SignMessage => "sign-message",
            Operation::SignTypedData => "sign-typed-data",
        };
        f.write_str(name)
    }
}

/// Outbound request with its payload
#[derive(Debug, Clone)]
pub enum Request {
    FetchExtendedPublicKey {
        derivation_path: String,
    },
    SignTransaction {
        address: Address,
        derivation_path: String,
        transaction: LegacyTransaction,
    },
    SignMessage {
        derivation_path: String,
        message: String,
    },
    SignTypedData {
        derivation_path: String,
        typed_data: String,
    },
}

impl Request {
    pub fn operation(&self) -> Operation {
        match self {
            Request::FetchExtendedPublicKey { .. } => Operation::FetchExtendedPublicKey,
            Request::SignTransaction { .. } => Operation::SignTransaction,
            Request::SignMessage { .. } => Operation::SignMessage,
            Request::SignTypedData { .. } => Operation::SignTypedData,
        }
    }

    fn payload(&self) -> Result<Value> {
        let payload = match self {
            Request::FetchExtendedPublicKey { derivation_path } => {
                json!({ "derivationPath": derivation_path })
            }
            Request::SignTransaction {
                address,
                derivation_path,
                transaction,
            } => json!({
                "address": address,
                "derivationPath": derivation_path,
                "transaction": serde_json::to_value(transaction)?,
            }),
            Request::SignMessage {
                derivation_path,
                message,
            } => json!({ "derivationPath": derivation_path, "message": message }),
            Request::SignTypedData {
                derivation_path,
                typed_data,
            } => json!({ "derivationPath": derivation_path, "typedData": typed_data }),
        };
        Ok(payload)
    }

    /// Wire form carrying correlation id `id`
    pub fn to_wire(&self, id: u64) -> Result<WireMessage> {
        Ok(WireMessage::new(
            self.operation().request_tag(),
            Some(id),
            self.payload()?,
        ))
    }
}

/// Inbound message, classified
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Closed,
    SurfaceError(Value),
    Completed {
        operation: Operation,
        id: u64,
        payload: Value,
    },
}

impl Inbound {
    /// Classify a wire message; `None` for anything that is not an inbound
    /// surface message (including responses without an id)
    pub fn classify(message: &WireMessage) -> Option<Self> {
        match message.kind.as_str() {
            tags::SURFACE_CLOSED => Some(Inbound::Closed),
            tags::SURFACE_ERROR => Some(Inbound::SurfaceError(message.payload.clone())),
            tag => {
                let operation = Operation::from_response_tag(tag)?;
                let id = message.id?;
                Some(Inbound::Completed {
                    operation,
                    id,
                    payload: message.payload.clone(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape() {
        let request = Request::SignMessage {
            derivation_path: "m/44'/60'/0'/0/0".to_string(),
            message: "0xdeadbeef".to_string(),
        };
        let wire = serde_json::to_value(request.to_wire(7).unwrap()).unwrap();
        assert_eq!(wire["type"], tags::SIGN_MESSAGE);
        assert_eq!(wire["id"], 7);
        assert_eq!(wire["payload"]["derivationPath"], "m/44'/60'/0'/0/0");
        assert_eq!(wire["payload"]["message"], "0xdeadbeef");
    }

    #[test]
    fn test_classify_terminal_messages_without_id() {
        let closed: WireMessage =
            serde_json::from_str(r#"{"type":"hwkeyring-surface-closed"}"#).unwrap();
        assert_eq!(Inbound::classify(&closed), Some(Inbound::Closed));

        let error: WireMessage =
            serde_json::from_str(r#"{"type":"hwkeyring-surface-error","payload":"error"}"#)
                .unwrap();
        assert_eq!(
            Inbound::classify(&error),
            Some(Inbound::SurfaceError(Value::String("error".to_string())))
        );
    }

    #[test]
    fn test_classify_completed() {
        let msg = WireMessage::completed(Operation::SignTransaction, 3, json!("f86c"));
        assert_eq!(
            Inbound::classify(&msg),
            Some(Inbound::Completed {
                operation: Operation::SignTransaction,
                id: 3,
                payload: json!("f86c"),
            })
        );
    }

    #[test]
    fn test_classify_ignores_requests_and_idless_responses() {
        let request = WireMessage::new(tags::GET_XPUB, Some(1), Value::Null);
        assert_eq!(Inbound::classify(&request), None);

        let idless = WireMessage::new(tags::GET_XPUB_RESPONSE, None, json!("xpub"));
        assert_eq!(Inbound::classify(&idless), None);
    }

    #[test]
    fn test_aborted_messages_are_operation_specific() {
        assert_eq!(
            Operation::FetchExtendedPublicKey.aborted_message(),
            "Account adding was aborted"
        );
        assert_eq!(
            Operation::SignTransaction.aborted_message(),
            "Transaction signing was aborted"
        );
    }
}
