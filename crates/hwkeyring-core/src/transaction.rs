//! Transaction field model and envelope narrowing
//!
//! The device signs exactly one envelope: the legacy (type 0) transaction
//! with a single `gasPrice`. Fee-market input is narrowed before it is sent
//! to the device, and the signed result is rebuilt as a legacy transaction
//! from the narrowed fields plus the device's `v`, `r`, `s`.

use alloy_primitives::{Bytes, U256};
use alloy_rlp::{Encodable, Header, EMPTY_STRING_CODE};
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::crypto::keccak256;
use crate::error::{Error, Result};
use crate::strip_hex_prefix;

/// Envelope type of fee-market transactions
pub const FEE_MARKET_TX_TYPE: u64 = 2;

/// Unsigned transaction fields as supplied by the wallet
///
/// Numeric fields are `0x`-prefixed hex strings on the wire. Fee-market
/// fields and the access list are accepted but never reach the device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionFields {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub tx_type: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<U256>,
    #[serde(default)]
    pub nonce: U256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_fee_per_gas: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_priority_fee_per_gas: Option<U256>,
    #[serde(default)]
    pub gas_limit: U256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<Address>,
    #[serde(default)]
    pub value: U256,
    #[serde(default)]
    pub data: Bytes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_list: Option<serde_json::Value>,
}

impl TransactionFields {
    /// Whether the input carries a fee-market fee structure
    pub fn is_fee_market(&self) -> bool {
        self.max_fee_per_gas.is_some()
            || self.max_priority_fee_per_gas.is_some()
            || self.tx_type == Some(U256::from(FEE_MARKET_TX_TYPE))
    }

    /// Narrow to the single envelope the device signs
    ///
    /// `gasPrice` is kept when present, otherwise taken from `maxFeePerGas`.
    pub fn to_legacy(&self) -> LegacyTransaction {
        let gas_price = self
            .gas_price
            .or(self.max_fee_per_gas)
            .unwrap_or(U256::ZERO);

        LegacyTransaction {
            chain_id: self.chain_id,
            nonce: self.nonce,
            gas_price,
            gas_limit: self.gas_limit,
            to: self.to,
            value: self.value,
            data: self.data.clone(),
        }
    }
}

/// Legacy (type 0) transaction fields, as sent to the device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyTransaction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<U256>,
    pub nonce: U256,
    pub gas_price: U256,
    pub gas_limit: U256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<Address>,
    pub value: U256,
    pub data: Bytes,
}

/// `v`, `r`, `s` of an ECDSA transaction signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureParts {
    pub v: U256,
    pub r: U256,
    pub s: U256,
}

impl SignatureParts {
    /// Extract the signature from a device-signed legacy transaction (hex)
    pub fn from_signed_hex(raw: &str) -> Result<Self> {
        let bytes = hex::decode(strip_hex_prefix(raw.trim())).map_err(|e| {
            Error::MalformedDeviceResponse(format!("Signed transaction is not hex: {}", e))
        })?;
        Self::from_signed_rlp(&bytes)
    }

    /// Extract the signature from RLP bytes
    /// `[nonce, gasPrice, gasLimit, to, value, data, v, r, s]`
    pub fn from_signed_rlp(bytes: &[u8]) -> Result<Self> {
        let mut buf = bytes;
        let mut payload = Header::decode_bytes(&mut buf, true).map_err(malformed)?;
        if !buf.is_empty() {
            return Err(Error::MalformedDeviceResponse(
                "Trailing bytes after signed transaction".to_string(),
            ));
        }

        let mut items = Vec::with_capacity(9);
        while !payload.is_empty() {
            items.push(Header::decode_bytes(&mut payload, false).map_err(malformed)?);
        }
        if items.len() != 9 {
            return Err(Error::MalformedDeviceResponse(format!(
                "Expected 9 transaction fields, got {}",
                items.len()
            )));
        }

        Ok(Self {
            v: scalar(items[6], "v")?,
            r: scalar(items[7], "r")?,
            s: scalar(items[8], "s")?,
        })
    }
}

fn malformed(e: alloy_rlp::Error) -> Error {
    Error::MalformedDeviceResponse(format!("Invalid signed transaction: {}", e))
}

fn scalar(bytes: &[u8], name: &str) -> Result<U256> {
    U256::try_from_be_slice(bytes)
        .ok_or_else(|| Error::MalformedDeviceResponse(format!("Signature field {} too long", name)))
}

/// Signed legacy transaction rebuilt from narrowed fields and a device signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedLegacyTransaction {
    #[serde(flatten)]
    pub transaction: LegacyTransaction,
    pub v: U256,
    pub r: U256,
    pub s: U256,
}

impl SignedLegacyTransaction {
    /// Merge the device signature into the fields that were signed
    pub fn new(transaction: LegacyTransaction, signature: SignatureParts) -> Self {
        Self {
            transaction,
            v: signature.v,
            r: signature.r,
            s: signature.s,
        }
    }

    /// Envelope type, always legacy
    pub fn tx_type(&self) -> u8 {
        0
    }

    pub fn signature(&self) -> SignatureParts {
        SignatureParts {
            v: self.v,
            r: self.r,
            s: self.s,
        }
    }

    /// RLP encoding ready for broadcast
    pub fn rlp(&self) -> Vec<u8> {
        let tx = &self.transaction;
        let mut payload = Vec::with_capacity(128 + tx.data.len());
        tx.nonce.encode(&mut payload);
        tx.gas_price.encode(&mut payload);
        tx.gas_limit.encode(&mut payload);
        match &tx.to {
            Some(to) => to.inner().encode(&mut payload),
            None => payload.push(EMPTY_STRING_CODE),
        }
        tx.value.encode(&mut payload);
        tx.data.encode(&mut payload);
        self.v.encode(&mut payload);
        self.r.encode(&mut payload);
        self.s.encode(&mut payload);

        let mut out = Vec::with_capacity(payload.len() + 9);
        Header {
            list: true,
            payload_length: payload.len(),
        }
        .encode(&mut out);
        out.extend_from_slice(&payload);
        out
    }

    /// Transaction hash, `keccak256(rlp)`
    pub fn hash(&self) -> [u8; 32] {
        keccak256(&self.rlp())
    }

    /// `0x`-prefixed hex of [`Self::rlp`]
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.rlp()))
    }
}
