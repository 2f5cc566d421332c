//! Per-Transaction Watcher (C7): spawned by the notify-tx endpoint after a
//! user's wallet reports a broadcast. Polls a single chain tx id up to 120
//! times at 5 s intervals (10 min max), racing the indexer to call
//! `confirm_receipt` — whichever wins the engine's conditional update
//! proceeds to the payout, the other observes the claimed status and exits.
//!
//! Grounded on the same fire-and-forget background-task shape the teacher
//! uses for its queue workers, scaled down from a shared polling loop over
//! many rows to one task per chain tx id.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use crate::chains::stacks::TxStatus;
use crate::database::{Token, TxStatus as RecordStatus};
use crate::settlement::SettlementEngine;

const MAX_ITERATIONS: u32 = 120;
const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Spawns the watcher as a detached background task. The caller (the
/// notify-tx handler) does not await this; it returns to the client
/// immediately per §4.7.
pub fn spawn_watcher(
    engine: Arc<SettlementEngine>,
    reference: String,
    chain_tx_id: String,
    token: Token,
    sender_address: String,
    confirmation_blocks: u64,
) {
    tokio::spawn(async move {
        watch(engine, reference, chain_tx_id, token, sender_address, confirmation_blocks).await;
    });
}

async fn watch(
    engine: Arc<SettlementEngine>,
    reference: String,
    chain_tx_id: String,
    token: Token,
    sender_address: String,
    confirmation_blocks: u64,
) {
    for attempt in 0..MAX_ITERATIONS {
        match engine.stacks_client().get_tx_by_id(&chain_tx_id).await {
            Ok(tx) if tx.status == TxStatus::Success => {
                if !reached_confirmation_depth(engine.stacks_client(), &tx, confirmation_blocks).await {
                    info!(reference = %reference, attempt, "tx succeeded but hasn't reached the required confirmation depth yet");
                    sleep(POLL_INTERVAL).await;
                    continue;
                }
                match engine.transactions().find_by_reference(&reference).await {
                    Ok(Some(record))
                        if matches!(
                            record.status,
                            RecordStatus::Processing | RecordStatus::Settling | RecordStatus::Confirmed
                        ) =>
                    {
                        info!(reference = %reference, "watcher observed record already claimed, exiting");
                        return;
                    }
                    Ok(_) => {
                        let token_amount = native_or_sip010_amount(engine.stacks_client(), &tx, token);
                        if let Err(e) = engine
                            .confirm_receipt(&reference, &chain_tx_id, token_amount, token, &sender_address)
                            .await
                        {
                            warn!(reference = %reference, error = %e, "watcher's confirm-receipt call failed");
                        }
                        return;
                    }
                    Err(e) => {
                        warn!(reference = %reference, error = %e, "watcher failed to re-read record, retrying");
                    }
                }
            }
            Ok(tx) if tx.status.is_aborted() => {
                mark_failed(&engine, &reference, &format!("chain tx aborted: {:?}", tx.status)).await;
                return;
            }
            Ok(tx) if tx.status.is_dropped() => {
                info!(reference = %reference, attempt, "watched tx dropped, continuing to poll for a rebroadcast");
            }
            Ok(_) => {}
            Err(e) if matches!(e, crate::chains::stacks::StacksError::NotFound) => {}
            Err(e) => {
                warn!(reference = %reference, error = %e, "watcher poll failed, retrying");
            }
        }
        sleep(POLL_INTERVAL).await;
    }

    if let Ok(Some(record)) = engine.transactions().find_by_reference(&reference).await {
        if record.status == RecordStatus::Pending {
            mark_failed(&engine, &reference, "poll timeout").await;
        }
    }
}

async fn mark_failed(engine: &Arc<SettlementEngine>, reference: &str, reason: &str) {
    let result = engine
        .transactions()
        .conditional_transition(
            reference,
            RecordStatus::Pending,
            RecordStatus::Failed,
            None,
            None,
            Some(serde_json::json!({ "failureReason": reason })),
            None,
        )
        .await;
    if let Err(e) = result {
        warn!(reference = %reference, error = %e, "failed to mark watcher timeout/abort");
    }
}

/// Re-org safety gate (§4.4/§8): a succeeded tx is only actionable once
/// `current_height - tx.block_height >= confirmation_blocks`. With
/// `confirmation_blocks == 0` (the default) every succeeded tx clears
/// immediately, matching the prior unconfirmed-success behavior.
async fn reached_confirmation_depth(
    client: &crate::chains::stacks::StacksClient,
    tx: &crate::chains::stacks::Tx,
    confirmation_blocks: u64,
) -> bool {
    if confirmation_blocks == 0 {
        return true;
    }
    let Some(block_height) = tx.block_height else { return false };
    match client.get_current_block_height().await {
        Ok(current_height) => current_height - block_height >= confirmation_blocks as i64,
        Err(e) => {
            warn!(error = %e, "failed to read current block height, deferring confirmation");
            false
        }
    }
}

fn native_or_sip010_amount(
    client: &crate::chains::stacks::StacksClient,
    tx: &crate::chains::stacks::Tx,
    token: Token,
) -> f64 {
    match token {
        Token::Stx => tx
            .native_transfer
            .as_ref()
            .map(|t| t.amount as f64 / 1_000_000.0)
            .unwrap_or(0.0),
        Token::Usdc => {
            let Some(call) = &tx.contract_call else { return 0.0 };
            let usdc_contract_id = client.config().usdc_contract_id();
            let platform_address = client.config().platform_address.clone().unwrap_or_default();
            crate::chains::stacks::extract_sip010_amount(&call.events, &usdc_contract_id, &platform_address) as f64
                / 1_000_000.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_budget_is_ten_minutes() {
        assert_eq!(MAX_ITERATIONS as u64 * POLL_INTERVAL.as_secs(), 600);
    }
}
