//! Chain Indexer (C6): a singleton long-lived task scanning the platform
//! deposit address and the USDC contract address for inbound transfers
//! matching the reference memo convention, and calling the settlement
//! engine's `confirm_receipt` for each one it recognizes.
//!
//! Grounded on the teacher's `offramp_processor.rs::run_cycle` shape — a
//! ticking loop with a bounded per-cycle work list and per-item error
//! handling that never aborts the cycle — generalized from the teacher's
//! own four-stage DB-driven cycle to a single chain-scanning cycle guarded
//! by an in-memory processed-set instead of DB row claims.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::chains::stacks::client::StacksClient;
use crate::chains::stacks::types::{decode_memo_hex, extract_sip010_amount, TxStatus};
use crate::config::IndexerConfig;
use crate::database::Token;
use crate::settlement::SettlementEngine;

const OFFRAMP_MEMO_PREFIX: &str = "SSWAP_OFFRAMP_";

pub struct ChainIndexer {
    client: Arc<StacksClient>,
    engine: Arc<SettlementEngine>,
    config: IndexerConfig,
    usdc_contract_id: String,
    confirmation_blocks: u64,
    processed_tx_ids: HashSet<String>,
}

impl ChainIndexer {
    pub fn new(
        client: Arc<StacksClient>,
        engine: Arc<SettlementEngine>,
        config: IndexerConfig,
        usdc_contract_id: String,
        confirmation_blocks: u64,
    ) -> Self {
        Self {
            client,
            engine,
            config,
            usdc_contract_id,
            confirmation_blocks,
            processed_tx_ids: HashSet::new(),
        }
    }

    /// Runs forever, ticking every `POLL_INTERVAL_MS`, until `shutdown` fires.
    /// Only one instance of this task should ever run per process (§5).
    pub async fn run(mut self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut ticker = interval(self.config.poll_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_cycle().await {
                        error!(error = %e, "indexer cycle failed unexpectedly, continuing on next tick");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("chain indexer shutting down");
                        return;
                    }
                }
            }
        }
    }

    async fn run_cycle(&mut self) -> Result<(), crate::chains::stacks::StacksError> {
        let Some(platform_address) = self.config.platform_stx_address.clone() else {
            return Ok(());
        };

        let native_txs = self
            .client
            .get_address_transactions(&platform_address, self.config.history_limit, 0)
            .await?;
        let contract_txs = if self.usdc_contract_id.contains('.') {
            let contract_address = self.usdc_contract_id.split('.').next().unwrap_or_default();
            self.client
                .get_address_transactions(contract_address, self.config.history_limit, 0)
                .await
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        let current_height = if self.confirmation_blocks > 0 {
            match self.client.get_current_block_height().await {
                Ok(height) => Some(height),
                Err(e) => {
                    warn!(error = %e, "failed to fetch current block height, deferring confirmation checks this cycle");
                    None
                }
            }
        } else {
            None
        };

        let mut stop_cycle = false;
        for tx in native_txs.into_iter().chain(contract_txs.into_iter()) {
            if stop_cycle {
                break;
            }
            if tx.status != TxStatus::Success {
                continue;
            }
            if self.processed_tx_ids.contains(&tx.tx_id) {
                continue;
            }
            if self.confirmation_blocks > 0 && !self.has_required_confirmations(&tx, current_height) {
                debug!(tx_id = %tx.tx_id, "deposit not yet at required confirmation depth, retrying next cycle");
                continue;
            }

            let Some((reference, token_amount, token)) =
                extract_deposit(&tx, &platform_address, &self.usdc_contract_id)
            else {
                continue;
            };

            let outcome = self
                .engine
                .confirm_receipt(&reference, &tx.tx_id, token_amount, token, &tx.sender_address)
                .await;

            match outcome {
                Ok(_) => {
                    self.processed_tx_ids.insert(tx.tx_id.clone());
                }
                Err(e) if e.status_code() == 404 => {
                    debug!(tx_id = %tx.tx_id, reference = %reference, "record not yet persisted, retrying next cycle");
                }
                Err(e) if e.status_code() == 401 => {
                    error!(tx_id = %tx.tx_id, "confirm-receipt returned unauthorized — check INTERNAL_API_KEY configuration");
                    stop_cycle = true;
                }
                Err(e) => {
                    warn!(tx_id = %tx.tx_id, reference = %reference, error = %e, "confirm-receipt failed, will retry next cycle");
                }
            }
        }

        Ok(())
    }

    /// Re-org safety gate (§4.4/§8): only act on a tx once
    /// `current_height - tx.block_height >= confirmation_blocks`.
    fn has_required_confirmations(&self, tx: &crate::chains::stacks::Tx, current_height: Option<i64>) -> bool {
        let (Some(current_height), Some(block_height)) = (current_height, tx.block_height) else {
            return false;
        };
        current_height - block_height >= self.confirmation_blocks as i64
    }
}

/// Recognizes an offramp deposit in a single transaction and decodes its
/// reference memo, per the native/SIP-010 paths in §4.6. Kept free of `self`
/// so it can be unit-tested without constructing the full indexer.
fn extract_deposit(
    tx: &crate::chains::stacks::Tx,
    platform_address: &str,
    usdc_contract_id: &str,
) -> Option<(String, f64, Token)> {
    if let Some(transfer) = &tx.native_transfer {
        if transfer.recipient != platform_address {
            return None;
        }
        let memo = decode_memo_hex(&transfer.memo);
        if !memo.starts_with(OFFRAMP_MEMO_PREFIX) {
            return None;
        }
        let amount = transfer.amount as f64 / 1_000_000.0;
        return Some((memo, amount, Token::Stx));
    }

    if let Some(call) = &tx.contract_call {
        if call.function_name != "transfer" {
            return None;
        }
        let raw_amount = extract_sip010_amount(&call.events, usdc_contract_id, platform_address);
        if raw_amount == 0 {
            return None;
        }
        let memo_arg = call.args.get(3)?;
        let memo_hex = memo_arg.as_str().unwrap_or_default();
        let memo = decode_memo_hex(memo_hex);
        if !memo.starts_with(OFFRAMP_MEMO_PREFIX) {
            return None;
        }
        let amount = raw_amount as f64 / 1_000_000.0;
        return Some((memo, amount, Token::Usdc));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const USDC_ID: &str = "ST000000000000000000002AMW42H.usdc-token";

    #[test]
    fn ignores_memo_without_offramp_prefix() {
        let tx = crate::chains::stacks::Tx {
            tx_id: "0x1".to_string(),
            status: TxStatus::Success,
            block_height: Some(1),
            sender_address: "ST1SENDER".to_string(),
            native_transfer: Some(crate::chains::stacks::NativeTransfer {
                recipient: "ST2PLATFORM".to_string(),
                amount: 1_000_000,
                memo: crate::chains::stacks::encode_memo_hex("NOT_A_REFERENCE"),
            }),
            contract_call: None,
        };
        assert!(extract_deposit(&tx, "ST2PLATFORM", USDC_ID).is_none());
    }

    #[test]
    fn extracts_native_deposit_with_matching_memo() {
        let reference = "SSWAP_OFFRAMP_abc123_deadbeef";
        let tx = crate::chains::stacks::Tx {
            tx_id: "0x2".to_string(),
            status: TxStatus::Success,
            block_height: Some(1),
            sender_address: "ST1SENDER".to_string(),
            native_transfer: Some(crate::chains::stacks::NativeTransfer {
                recipient: "ST2PLATFORM".to_string(),
                amount: 5_000_000,
                memo: crate::chains::stacks::encode_memo_hex(reference),
            }),
            contract_call: None,
        };
        let (found_reference, amount, token) = extract_deposit(&tx, "ST2PLATFORM", USDC_ID).unwrap();
        assert_eq!(found_reference, reference);
        assert_eq!(amount, 5.0);
        assert_eq!(token, Token::Stx);
    }

    #[test]
    fn extracts_sip010_deposit_from_events_and_memo_arg() {
        let reference = "SSWAP_OFFRAMP_def456_cafebabe";
        let tx = crate::chains::stacks::Tx {
            tx_id: "0x3".to_string(),
            status: TxStatus::Success,
            block_height: Some(1),
            sender_address: "ST1SENDER".to_string(),
            native_transfer: None,
            contract_call: Some(crate::chains::stacks::ContractCall {
                function_name: "transfer".to_string(),
                args: vec![
                    json!("u10000000"),
                    json!("ST1SENDER"),
                    json!("ST2PLATFORM"),
                    json!(crate::chains::stacks::encode_memo_hex(reference)),
                ],
                events: vec![json!({
                    "event_type": "fungible_token_asset",
                    "asset": {
                        "asset_id": "ST000000000000000000002AMW42H.usdc-token::usdc",
                        "recipient": "ST2PLATFORM",
                        "amount": "10000000"
                    }
                })],
            }),
        };
        let (found_reference, amount, token) = extract_deposit(&tx, "ST2PLATFORM", USDC_ID).unwrap();
        assert_eq!(found_reference, reference);
        assert_eq!(amount, 10.0);
        assert_eq!(token, Token::Usdc);
    }
}
