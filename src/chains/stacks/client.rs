//! Read side of the blockchain adapter (C4): fetches transaction status and
//! history from the Stacks REST API (Hiro-style `/extended/v1` endpoints).

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use super::config::{StacksConfig, StacksNetwork};
use super::errors::StacksError;
use super::types::{ContractCall, NativeTransfer, Tx, TxStatus};

const READ_TIMEOUT_SECS: u64 = 12;

#[derive(Clone)]
pub struct StacksClient {
    http: Client,
    config: StacksConfig,
}

impl StacksClient {
    pub fn new(config: StacksConfig) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(READ_TIMEOUT_SECS))
            .build()
            .expect("failed to build Stacks HTTP client");
        Self { http, config }
    }

    pub fn network(&self) -> StacksNetwork {
        self.config.network
    }

    pub fn config(&self) -> &StacksConfig {
        &self.config
    }

    pub async fn health_check(&self) -> Result<(), StacksError> {
        let url = format!("{}/extended/v1/status", self.config.api_url);
        self.http
            .get(&url)
            .send()
            .await
            .map_err(|e| StacksError::RequestFailed(e.to_string()))?;
        Ok(())
    }

    /// `GetAddressTransactions(address, limit, offset) -> [Tx]`, most recent first.
    pub async fn get_address_transactions(
        &self,
        address: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Tx>, StacksError> {
        let url = format!(
            "{}/extended/v1/address/{}/transactions?limit={}&offset={}",
            self.config.api_url, address, limit, offset
        );
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| StacksError::RequestFailed(e.to_string()))?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::UNAUTHORIZED => return Err(StacksError::Unauthorized(url)),
            StatusCode::NOT_FOUND => return Err(StacksError::NotFound),
            other => return Err(StacksError::RequestFailed(format!("status {other}"))),
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| StacksError::Decode(e.to_string()))?;

        let results = body
            .get("results")
            .and_then(|r| r.as_array())
            .cloned()
            .unwrap_or_default();

        Ok(results.iter().filter_map(parse_tx).collect())
    }

    /// `GetTxById(txId) -> Tx`.
    pub async fn get_tx_by_id(&self, tx_id: &str) -> Result<Tx, StacksError> {
        let url = format!("{}/extended/v1/tx/{}", self.config.api_url, tx_id);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| StacksError::RequestFailed(e.to_string()))?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => return Err(StacksError::NotFound),
            StatusCode::UNAUTHORIZED => return Err(StacksError::Unauthorized(url)),
            other => return Err(StacksError::RequestFailed(format!("status {other}"))),
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| StacksError::Decode(e.to_string()))?;

        parse_tx(&body).ok_or_else(|| StacksError::Decode("unrecognized tx shape".to_string()))
    }

    /// The next nonce to use when signing a transaction from `address`,
    /// required before the onramp write path (§4 write side) can broadcast.
    pub async fn get_account_nonce(&self, address: &str) -> Result<u64, StacksError> {
        let url = format!("{}/extended/v1/address/{}/nonces", self.config.api_url, address);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| StacksError::RequestFailed(e.to_string()))?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::UNAUTHORIZED => return Err(StacksError::Unauthorized(url)),
            other => return Err(StacksError::RequestFailed(format!("status {other}"))),
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| StacksError::Decode(e.to_string()))?;
        body.get("possible_next_nonce")
            .and_then(|v| v.as_i64())
            .map(|n| n as u64)
            .ok_or_else(|| StacksError::Decode("missing possible_next_nonce".to_string()))
    }

    pub async fn get_current_block_height(&self) -> Result<i64, StacksError> {
        let url = format!("{}/extended/v1/block?limit=1", self.config.api_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| StacksError::RequestFailed(e.to_string()))?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| StacksError::Decode(e.to_string()))?;
        body.get("results")
            .and_then(|r| r.as_array())
            .and_then(|arr| arr.first())
            .and_then(|b| b.get("height"))
            .and_then(|h| h.as_i64())
            .ok_or_else(|| StacksError::Decode("missing block height".to_string()))
    }
}

fn parse_tx(raw: &Value) -> Option<Tx> {
    let tx_id = raw.get("tx_id")?.as_str()?.to_string();
    let status = TxStatus::from_wire(raw.get("tx_status")?.as_str()?);
    let block_height = raw.get("block_height").and_then(|v| v.as_i64());
    let sender_address = raw.get("sender_address")?.as_str()?.to_string();
    let tx_type = raw.get("tx_type").and_then(|v| v.as_str()).unwrap_or_default();

    let native_transfer = if tx_type == "token_transfer" {
        raw.get("token_transfer").and_then(|tt| {
            Some(NativeTransfer {
                recipient: tt.get("recipient_address")?.as_str()?.to_string(),
                amount: tt.get("amount")?.as_str()?.parse::<u64>().ok()?,
                memo: tt.get("memo").and_then(|m| m.as_str()).unwrap_or("").to_string(),
            })
        })
    } else {
        None
    };

    let contract_call = if tx_type == "contract_call" {
        raw.get("contract_call").and_then(|cc| {
            let function_name = cc.get("function_name")?.as_str()?.to_string();
            let args = cc
                .get("function_args")
                .and_then(|a| a.as_array())
                .cloned()
                .unwrap_or_default();
            let events = raw
                .get("events")
                .and_then(|e| e.as_array())
                .cloned()
                .unwrap_or_default();
            Some(ContractCall {
                function_name,
                args,
                events,
            })
        })
    } else {
        None
    };

    if native_transfer.is_none() && contract_call.is_none() {
        debug!(tx_id = %tx_id, tx_type = %tx_type, "Ignoring tx of unhandled type");
    }

    Some(Tx {
        tx_id,
        status,
        block_height,
        sender_address,
        native_transfer,
        contract_call,
    })
}

/// True if the response status represents a transient network condition
/// worth retrying rather than a permanent rejection.
pub fn is_transient(err: &StacksError) -> bool {
    matches!(err, StacksError::RequestFailed(_) | StacksError::Timeout)
}

#[allow(dead_code)]
fn warn_unauthorized(context: &str) {
    warn!(context = %context, "Stacks API returned 401 — check INTERNAL_API_KEY / node auth");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_native_transfer_tx() {
        let raw = json!({
            "tx_id": "0xabc",
            "tx_status": "success",
            "block_height": 100,
            "sender_address": "ST1SENDER",
            "tx_type": "token_transfer",
            "token_transfer": {
                "recipient_address": "ST2PLATFORM",
                "amount": "100000000",
                "memo": "0x1234"
            }
        });
        let tx = parse_tx(&raw).unwrap();
        assert_eq!(tx.status, TxStatus::Success);
        let transfer = tx.native_transfer.unwrap();
        assert_eq!(transfer.amount, 100_000_000);
        assert_eq!(transfer.recipient, "ST2PLATFORM");
    }

    #[test]
    fn parses_contract_call_tx() {
        let raw = json!({
            "tx_id": "0xdef",
            "tx_status": "success",
            "block_height": 101,
            "sender_address": "ST1SENDER",
            "tx_type": "contract_call",
            "contract_call": {
                "function_name": "transfer",
                "function_args": []
            },
            "events": []
        });
        let tx = parse_tx(&raw).unwrap();
        assert!(tx.contract_call.is_some());
        assert_eq!(tx.contract_call.unwrap().function_name, "transfer");
    }

    #[test]
    fn missing_required_field_returns_none() {
        let raw = json!({ "tx_status": "success" });
        assert!(parse_tx(&raw).is_none());
    }
}
