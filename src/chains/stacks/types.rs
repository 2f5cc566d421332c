//! Wire types for the Stacks read side: transaction status, native transfers,
//! contract calls, and the memo convention shared by both transfer kinds.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

static STACKS_ADDRESS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(SP|SM|ST)[0-9A-Z]{20,50}$").unwrap());

/// Matches `^(SP|SM|ST)[0-9A-Z]{20,50}$` per the settlement engine's address
/// validation rule (spec §4.8).
pub fn is_valid_stacks_address(address: &str) -> bool {
    STACKS_ADDRESS_RE.is_match(address)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Success,
    Pending,
    AbortByResponse,
    AbortByPostCondition,
    DroppedReplaceByFee,
    DroppedTooExpensive,
    DroppedStaleGarbageCollect,
    Other(String),
}

impl TxStatus {
    pub fn from_wire(s: &str) -> Self {
        match s {
            "success" => Self::Success,
            "pending" => Self::Pending,
            "abort_by_response" => Self::AbortByResponse,
            "abort_by_post_condition" => Self::AbortByPostCondition,
            "dropped_replace_by_fee" => Self::DroppedReplaceByFee,
            "dropped_too_expensive" => Self::DroppedTooExpensive,
            "dropped_stale_garbage_collect" => Self::DroppedStaleGarbageCollect,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn is_dropped(&self) -> bool {
        matches!(
            self,
            Self::DroppedReplaceByFee | Self::DroppedTooExpensive | Self::DroppedStaleGarbageCollect
        )
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::AbortByResponse | Self::AbortByPostCondition)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NativeTransfer {
    pub recipient: String,
    pub amount: u64,
    pub memo: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractCall {
    pub function_name: String,
    pub args: Vec<Value>,
    pub events: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tx {
    pub tx_id: String,
    pub status: TxStatus,
    pub block_height: Option<i64>,
    pub sender_address: String,
    pub native_transfer: Option<NativeTransfer>,
    pub contract_call: Option<ContractCall>,
}

/// Decode a 34-byte null-padded hex memo to UTF-8, trimming trailing nulls.
/// Never reject a valid reference for having trailing nulls (spec §9).
pub fn decode_memo_hex(memo_hex: &str) -> String {
    let hex_str = memo_hex.trim_start_matches("0x");
    match hex::decode(hex_str) {
        Ok(bytes) => {
            let trimmed: Vec<u8> = bytes.into_iter().take_while(|b| *b != 0).collect();
            String::from_utf8_lossy(&trimmed).to_string()
        }
        Err(_) => String::new(),
    }
}

/// Encode a reference string into the 34-byte null-padded memo buffer,
/// hex-on-wire, used for outbound native transfers.
pub fn encode_memo_hex(reference: &str) -> String {
    let mut buf = [0u8; 34];
    let bytes = reference.as_bytes();
    let n = bytes.len().min(34);
    buf[..n].copy_from_slice(&bytes[..n]);
    format!("0x{}", hex::encode(buf))
}

/// Sum `fungible_token_asset` event amounts for a given asset id prefix and
/// recipient (spec §4.4/§4.6 SIP-010 path).
pub fn extract_sip010_amount(events: &[Value], asset_id_prefix: &str, recipient: &str) -> u64 {
    events
        .iter()
        .filter_map(|event| {
            if event.get("event_type")?.as_str()? != "fungible_token_asset" {
                return None;
            }
            let asset = event.get("asset")?;
            let asset_id = asset.get("asset_id")?.as_str()?;
            if !asset_id.starts_with(asset_id_prefix) {
                return None;
            }
            if asset.get("recipient")?.as_str()? != recipient {
                return None;
            }
            asset.get("amount")?.as_str()?.parse::<u64>().ok()
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn validates_stacks_addresses() {
        assert!(is_valid_stacks_address("ST2CY5V39NHDPWSXMW9QDT3HC3GD6Q6XX4CFRK9AG"));
        assert!(is_valid_stacks_address("SP2J6ZY48GV1EZ5V2V5RB9MP66SW86PYKKNRV9EJ7"));
        assert!(!is_valid_stacks_address("GXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXX"));
        assert!(!is_valid_stacks_address("short"));
    }

    #[test]
    fn decodes_memo_trimming_nulls() {
        let reference = "SSWAP_OFFRAMP_abc123_deadbeef";
        let memo = encode_memo_hex(reference);
        let decoded = decode_memo_hex(&memo);
        assert_eq!(decoded, reference);
    }

    #[test]
    fn sums_sip010_events_for_recipient() {
        let events = vec![
            json!({
                "event_type": "fungible_token_asset",
                "asset": {
                    "asset_id": "SP000.usdc-token::usdc",
                    "recipient": "SPPLATFORM",
                    "amount": "5000000"
                }
            }),
            json!({
                "event_type": "fungible_token_asset",
                "asset": {
                    "asset_id": "SP000.usdc-token::usdc",
                    "recipient": "SPOTHER",
                    "amount": "1000000"
                }
            }),
        ];
        let total = extract_sip010_amount(&events, "SP000.usdc-token", "SPPLATFORM");
        assert_eq!(total, 5_000_000);
    }

    #[test]
    fn dropped_status_classification() {
        assert!(TxStatus::from_wire("dropped_replace_by_fee").is_dropped());
        assert!(TxStatus::from_wire("abort_by_post_condition").is_aborted());
        assert!(!TxStatus::from_wire("success").is_dropped());
    }
}
