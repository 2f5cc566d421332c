//! Onramp Engine: symmetric to the offramp settlement engine but simpler,
//! specified at the interface level only (§2). A payment-provider (Monnify)
//! webhook confirming NGN receipt drives a platform-signed blockchain send
//! instead of a user-signed deposit driving a bank payout.
//!
//! Reuses the offramp status machine's transitions (`pending → processing →
//! settling → confirmed`) by reinterpreting each stage for the onramp
//! direction: `processing` means "NGN payment confirmed, broadcast pending",
//! `settling` means "broadcast succeeded, awaiting chain confirmation".

use std::sync::Arc;
use std::time::Duration;

use bigdecimal::ToPrimitive;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::chains::stacks::client::StacksClient;
use crate::chains::stacks::signer::StacksSigner;
use crate::chains::stacks::types::{encode_memo_hex, is_valid_stacks_address, TxStatus as ChainTxStatus};
use crate::config::MonnifyConfig;
use crate::database::{Direction, Token, TransactionRepository, TxStatus};
use crate::error::{AppError, AppErrorKind, ValidationError};
use crate::services::PriceOracleCache;

type HmacSha256 = Hmac<Sha256>;

const WATCH_ITERATIONS: u32 = 120;
const WATCH_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_STX_FEE: u64 = 1_000;
const DEFAULT_SIP010_FEE: u64 = 3_000;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeOnrampRequest {
    pub token: Token,
    pub ngn_amount: i64,
    pub recipient_address: String,
}

/// Result of the onramp quote computation, surfaced by the rate-preview
/// endpoint and reused internally by `initialize_onramp`.
#[derive(Debug, Clone, Copy, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnrampQuote {
    pub token: Token,
    pub ngn_amount: i64,
    pub rate_ngn_per_token: f64,
    pub fee_ngn: i64,
    pub token_amount: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonnifyWebhookPayload {
    #[serde(rename = "eventType")]
    pub event_type: String,
    #[serde(rename = "eventData")]
    pub event_data: MonnifyEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonnifyEventData {
    #[serde(rename = "paymentReference")]
    pub payment_reference: String,
}

pub struct OnrampEngine {
    transactions: Arc<TransactionRepository>,
    price_oracle: Arc<PriceOracleCache>,
    stacks_client: Arc<StacksClient>,
    signer: Arc<dyn StacksSigner>,
    monnify: Option<MonnifyConfig>,
    flat_fee_ngn: i64,
}

impl OnrampEngine {
    pub fn new(
        transactions: Arc<TransactionRepository>,
        price_oracle: Arc<PriceOracleCache>,
        stacks_client: Arc<StacksClient>,
        signer: Arc<dyn StacksSigner>,
        monnify: Option<MonnifyConfig>,
        flat_fee_ngn: i64,
    ) -> Self {
        Self {
            transactions,
            price_oracle,
            stacks_client,
            signer,
            monnify,
            flat_fee_ngn,
        }
    }

    /// Computes the current onramp quote for an NGN amount without touching
    /// the store, shared by the rate-preview endpoint and `initialize_onramp`.
    pub async fn quote_onramp(&self, token: Token, ngn_amount: i64) -> Result<OnrampQuote, AppError> {
        if ngn_amount <= self.flat_fee_ngn {
            return Err(AppError::new(
                AppErrorKind::Validation(ValidationError::InvalidAmount {
                    amount: ngn_amount.to_string(),
                    reason: "must exceed the flat fee".to_string(),
                }),
                "NGN amount is too small to cover the flat fee",
            ));
        }
        let snapshot = self.price_oracle.get_current().await;
        let rate = PriceOracleCache::rate_for(&snapshot, token);
        let net_ngn = (ngn_amount - self.flat_fee_ngn) as f64;
        let token_amount = net_ngn / rate;
        Ok(OnrampQuote {
            token,
            ngn_amount,
            rate_ngn_per_token: rate,
            fee_ngn: self.flat_fee_ngn,
            token_amount,
        })
    }

    pub async fn initialize_onramp(
        &self,
        req: InitializeOnrampRequest,
    ) -> Result<crate::database::Transaction, AppError> {
        if !is_valid_stacks_address(&req.recipient_address) {
            return Err(AppError::new(
                AppErrorKind::Validation(ValidationError::InvalidWalletAddress {
                    address: req.recipient_address.clone(),
                    reason: "does not match the Stacks address format".to_string(),
                }),
                "invalid recipient address",
            ));
        }

        let quote = self.quote_onramp(req.token, req.ngn_amount).await?;

        let reference = crate::database::models::generate_reference(Direction::Onramp);
        let token_amount_bd = bigdecimal::BigDecimal::try_from(quote.token_amount).unwrap_or_default();
        let rate_bd = bigdecimal::BigDecimal::try_from(quote.rate_ngn_per_token).unwrap_or_default();

        let record = self
            .transactions
            .create(
                &reference,
                req.token,
                Direction::Onramp,
                token_amount_bd,
                req.ngn_amount,
                self.flat_fee_ngn,
                rate_bd,
                &req.recipient_address,
                &req.recipient_address,
                None,
                None,
                json!({}),
            )
            .await?;

        Ok(record)
    }

    fn verify_monnify_signature(&self, raw_body: &[u8], signature_header: &str) -> bool {
        let Some(monnify) = &self.monnify else { return false };
        let Ok(mut mac) = HmacSha256::new_from_slice(monnify.webhook_secret.as_bytes()) else {
            return false;
        };
        mac.update(raw_body);
        let Ok(signature_bytes) = hex::decode(signature_header) else {
            return false;
        };
        mac.verify_slice(&signature_bytes).is_ok()
    }

    /// Verifies the Monnify webhook signature, and on a successful-payment
    /// event, transitions the matching record and broadcasts the chain send.
    pub async fn handle_payment_webhook(
        self: &Arc<Self>,
        raw_body: &[u8],
        signature_header: &str,
    ) -> Result<(), AppError> {
        if !self.verify_monnify_signature(raw_body, signature_header) {
            return Err(AppError::new(
                AppErrorKind::Validation(ValidationError::MissingField {
                    field: "monnify-signature".to_string(),
                }),
                "invalid webhook signature",
            )
            .with_status_code(axum::http::StatusCode::UNAUTHORIZED));
        }

        let payload: MonnifyWebhookPayload = serde_json::from_slice(raw_body)
            .map_err(|e| AppError::internal_error(format!("malformed Monnify webhook body: {e}")))?;

        if payload.event_type != "SUCCESSFUL_TRANSACTION" {
            return Ok(());
        }

        let reference = payload.event_data.payment_reference;
        let won = self
            .transactions
            .conditional_transition(
                &reference,
                TxStatus::Pending,
                TxStatus::Processing,
                None,
                None,
                Some(json!({ "paymentReceivedAt": chrono::Utc::now() })),
                None,
            )
            .await?;

        let Some(record) = won else {
            info!(reference = %reference, "onramp payment webhook replay, already processed");
            return Ok(());
        };

        let amount_subunits =
            (record.token_amount.to_f64().unwrap_or(0.0) * record.token.subunit_scale() as f64) as u64;
        let memo = encode_memo_hex(&reference);

        let platform_address = self
            .stacks_client
            .config()
            .platform_address
            .clone()
            .ok_or_else(|| AppError::internal_error("platform Stacks address not configured"))?;
        let nonce = self.stacks_client.get_account_nonce(&platform_address).await?;

        let broadcast = match record.token {
            Token::Stx => {
                self.signer
                    .send_native(&record.recipient_address, amount_subunits, &memo, nonce, DEFAULT_STX_FEE)
                    .await
            }
            Token::Usdc => {
                self.signer
                    .send_sip010(&record.recipient_address, amount_subunits, &memo, nonce, DEFAULT_SIP010_FEE)
                    .await
            }
        };

        match broadcast {
            Ok(receipt) => {
                self.transactions
                    .conditional_transition(
                        &reference,
                        TxStatus::Processing,
                        TxStatus::Settling,
                        Some(&receipt.tx_id),
                        None,
                        None,
                        None,
                    )
                    .await?;
                let engine = Arc::clone(self);
                let reference_owned = reference.clone();
                let tx_id_owned = receipt.tx_id.clone();
                tokio::spawn(async move {
                    engine.watch_broadcast(reference_owned, tx_id_owned).await;
                });
                Ok(())
            }
            Err(e) => {
                error!(reference = %reference, error = %e, "onramp broadcast failed after payment receipt — requires manual settlement");
                self.transactions
                    .conditional_transition(
                        &reference,
                        TxStatus::Processing,
                        TxStatus::Failed,
                        None,
                        None,
                        Some(json!({ "requiresManualSettlement": true, "failureReason": e.to_string() })),
                        None,
                    )
                    .await?;
                Err(AppError::from(e))
            }
        }
    }

    async fn watch_broadcast(&self, reference: String, chain_tx_id: String) {
        for _ in 0..WATCH_ITERATIONS {
            match self.stacks_client.get_tx_by_id(&chain_tx_id).await {
                Ok(tx) if tx.status == ChainTxStatus::Success => {
                    let _ = self
                        .transactions
                        .conditional_transition(
                            &reference,
                            TxStatus::Settling,
                            TxStatus::Confirmed,
                            None,
                            None,
                            None,
                            Some(chrono::Utc::now()),
                        )
                        .await;
                    return;
                }
                Ok(tx) if tx.status.is_aborted() => {
                    let _ = self
                        .transactions
                        .conditional_transition(
                            &reference,
                            TxStatus::Settling,
                            TxStatus::Failed,
                            None,
                            None,
                            Some(json!({ "failureReason": "onramp broadcast aborted on-chain" })),
                            None,
                        )
                        .await;
                    return;
                }
                Ok(_) => {}
                Err(e) => warn!(reference = %reference, error = %e, "onramp confirmation poll failed, retrying"),
            }
            sleep(WATCH_INTERVAL).await;
        }
        warn!(reference = %reference, "onramp confirmation watcher timed out after 120 attempts");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watch_interval_is_five_seconds() {
        assert_eq!(WATCH_INTERVAL, Duration::from_secs(5));
    }
}
