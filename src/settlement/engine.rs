//! Settlement Engine (C8): the coordinator and sole owner of the status
//! machine. Every transition funnels through
//! [`crate::database::TransactionRepository::conditional_transition`] — the
//! document store's atomic `UPDATE ... WHERE status = $expected` is the only
//! lock this engine trusts (§9: "the store is the lock").
//!
//! Grounded on the teacher's `offramp_processor.rs` state machine shape
//! (`OfframpState`, `can_transition_to`, structured failure logging) but
//! restructured from a polling worker that drives its own transitions into a
//! request/event-driven engine whose transitions are won by whichever
//! caller's conditional update succeeds first.

use std::sync::Arc;

use bigdecimal::{BigDecimal, ToPrimitive};
use serde_json::json;
use tracing::{error, info, warn};

use crate::chains::stacks::client::StacksClient;
use crate::chains::stacks::types::{encode_memo_hex, is_valid_stacks_address};
use crate::config::{AppConfig, OfframpConfig, UnderDeliveryPolicy};
use crate::database::{BankDetails, Direction, Token, Transaction, TransactionRepository, TxStatus};
use crate::error::{AppError, AppErrorKind, DomainError, ValidationError};
use crate::payments::types::PayoutWebhookPayload;
use crate::payments::PaymentProvider;
use crate::services::{LiquidityCheck, LiquidityGuard, PriceOracleCache};

use super::types::{
    ConfirmReceiptResult, DepositInstructions, InitializeOfframpRequest, NotifyTxResult, OfframpInitResult,
    OfframpQuote,
};

/// Fraction of the quoted token amount tolerated as under/over-delivery
/// before the amount-mismatch policy in `OfframpConfig::underdelivery_policy`
/// kicks in (§4.8, §9 open question).
const MISMATCH_TOLERANCE: f64 = 0.001;

pub struct SettlementEngine {
    transactions: Arc<TransactionRepository>,
    price_oracle: Arc<PriceOracleCache>,
    liquidity_guard: Arc<LiquidityGuard>,
    payment_provider: Arc<dyn PaymentProvider>,
    stacks_client: Arc<StacksClient>,
    offramp: OfframpConfig,
    platform_deposit_address: Option<String>,
}

impl SettlementEngine {
    pub fn new(
        transactions: Arc<TransactionRepository>,
        price_oracle: Arc<PriceOracleCache>,
        liquidity_guard: Arc<LiquidityGuard>,
        payment_provider: Arc<dyn PaymentProvider>,
        stacks_client: Arc<StacksClient>,
        config: &AppConfig,
    ) -> Self {
        Self {
            transactions,
            price_oracle,
            liquidity_guard,
            payment_provider,
            stacks_client,
            offramp: config.offramp.clone(),
            platform_deposit_address: config.indexer.platform_stx_address.clone(),
        }
    }

    pub fn stacks_client(&self) -> &Arc<StacksClient> {
        &self.stacks_client
    }

    pub fn transactions(&self) -> &Arc<TransactionRepository> {
        &self.transactions
    }

    /// Computes the current offramp quote for a token amount without
    /// touching the store (§4.8 step 3), shared by the rate-preview endpoint
    /// and `initialize_offramp`.
    pub async fn quote_offramp(&self, token: Token, token_amount: f64) -> Result<OfframpQuote, AppError> {
        if token_amount < self.offramp.min_token || token_amount > self.offramp.max_token {
            return Err(AppError::new(
                AppErrorKind::Validation(ValidationError::OutOfRange {
                    field: "tokenAmount".to_string(),
                    min: Some(self.offramp.min_token.to_string()),
                    max: Some(self.offramp.max_token.to_string()),
                }),
                "token amount is outside the allowed range",
            ));
        }

        let snapshot = self.price_oracle.get_current().await;
        let rate = PriceOracleCache::rate_for(&snapshot, token);
        let gross = token_amount * rate;
        let ngn_amount = (gross - self.offramp.flat_fee_ngn as f64).floor() as i64;
        if ngn_amount <= 0 {
            return Err(AppError::new(
                AppErrorKind::Domain(DomainError::InvalidAmount {
                    amount: ngn_amount.to_string(),
                    reason: "quoted NGN amount is not positive after fees".to_string(),
                }),
                "token amount is too small to cover the flat fee",
            ));
        }

        Ok(OfframpQuote {
            token,
            token_amount,
            rate_ngn_per_token: rate,
            fee_ngn: self.offramp.flat_fee_ngn,
            ngn_amount,
        })
    }

    /// `InitializeOfframp(req)` (§4.8).
    pub async fn initialize_offramp(&self, req: InitializeOfframpRequest) -> Result<OfframpInitResult, AppError> {
        self.validate_init_request(&req)?;

        let resolved = self
            .payment_provider
            .resolve_account(&req.bank_code, &req.account_number)
            .await?;

        let deposit_address = self.platform_deposit_address.clone().ok_or_else(|| {
            AppError::new(
                AppErrorKind::Infrastructure(crate::error::InfrastructureError::ConfigMissing {
                    variable: "PLATFORM_STX_ADDRESS".to_string(),
                }),
                "platform deposit address is not configured",
            )
            .with_status_code(axum::http::StatusCode::SERVICE_UNAVAILABLE)
        })?;

        let quote = self.quote_offramp(req.token, req.token_amount).await?;
        let ngn_amount = quote.ngn_amount;

        match self.liquidity_guard.check_liquidity(ngn_amount).await {
            LiquidityCheck::Ok => {}
            LiquidityCheck::Insufficient => {
                let max_order_ngn = self.liquidity_guard.get_max_order_ngn().await.unwrap_or(0);
                return Err(AppError::new(
                    AppErrorKind::Domain(DomainError::InsufficientLiquidity {
                        available_ngn: max_order_ngn + self.offramp.min_buffer_ngn,
                        shortfall_ngn: (ngn_amount - max_order_ngn).max(0),
                        max_order_ngn,
                    }),
                    "insufficient liquidity to service this offramp",
                )
                .with_details(json!({ "maxOrderNGN": max_order_ngn })));
            }
            LiquidityCheck::Unknown => {
                return Err(AppError::new(
                    AppErrorKind::Domain(DomainError::LiquidityUnknown),
                    "unable to verify available liquidity, try again shortly",
                ));
            }
        }

        let reference = crate::database::models::generate_reference(Direction::Offramp);
        let expires_at = chrono::Utc::now() + chrono::Duration::minutes(self.offramp.expiry_minutes);

        let token_amount_bd = BigDecimal::try_from(req.token_amount)
            .map_err(|_| AppError::new(
                AppErrorKind::Validation(ValidationError::InvalidAmount {
                    amount: req.token_amount.to_string(),
                    reason: "not representable as a decimal".to_string(),
                }),
                "invalid token amount",
            ))?;
        let rate_bd = BigDecimal::try_from(quote.rate_ngn_per_token).unwrap_or_default();

        let bank_details = BankDetails {
            bank_code: req.bank_code.clone(),
            account_number: req.account_number.clone(),
            account_name: resolved.account_name.clone(),
            bank_name: resolved.bank_name.clone(),
        };

        let meta = json!({ "balanceAtOrderTime": self.liquidity_guard.get_max_order_ngn().await });

        let transaction = self
            .transactions
            .create(
                &reference,
                req.token,
                Direction::Offramp,
                token_amount_bd,
                ngn_amount,
                self.offramp.flat_fee_ngn,
                rate_bd,
                &req.sender_address,
                &deposit_address,
                Some(bank_details.clone()),
                Some(expires_at),
                meta,
            )
            .await?;

        Ok(OfframpInitResult {
            deposit: DepositInstructions {
                deposit_address,
                exact_amount: req.token_amount,
                memo: encode_memo_hex(&reference),
                token: req.token,
                expires_at,
            },
            bank_details,
            transaction,
        })
    }

    fn validate_init_request(&self, req: &InitializeOfframpRequest) -> Result<(), AppError> {
        if !is_valid_stacks_address(&req.sender_address) {
            return Err(AppError::new(
                AppErrorKind::Validation(ValidationError::InvalidWalletAddress {
                    address: req.sender_address.clone(),
                    reason: "does not match the Stacks address format".to_string(),
                }),
                "invalid sender address",
            ));
        }
        if !req.account_number.chars().all(|c| c.is_ascii_digit()) || req.account_number.len() != 10 {
            return Err(AppError::new(
                AppErrorKind::Validation(ValidationError::InvalidAccountNumber {
                    account_number: req.account_number.clone(),
                }),
                "account number must be exactly 10 digits",
            ));
        }
        Ok(())
    }

    /// `NotifyTxBroadcast(reference, chainTxId)` (§4.8). Caller is
    /// responsible for spawning the watcher on [`NotifyTxResult::Watching`].
    pub async fn notify_tx_broadcast(
        &self,
        reference: &str,
        chain_tx_id: &str,
    ) -> Result<NotifyTxResult, AppError> {
        let existing = self
            .transactions
            .find_by_reference(reference)
            .await?
            .ok_or_else(|| not_found(reference))?;

        if matches!(existing.status, TxStatus::Processing | TxStatus::Settling | TxStatus::Confirmed) {
            return Ok(NotifyTxResult::AlreadyProcessing);
        }

        self.transactions.attach_chain_tx_id(reference, chain_tx_id).await?;
        Ok(NotifyTxResult::Watching)
    }

    /// `ConfirmReceipt(reference, chainTxId, tokenAmount, token,
    /// senderAddress)` (§4.8). Called only from the indexer (C6) or the
    /// per-transaction watcher (C7).
    pub async fn confirm_receipt(
        &self,
        reference: &str,
        chain_tx_id: &str,
        token_amount: f64,
        _token: Token,
        _sender_address: &str,
    ) -> Result<ConfirmReceiptResult, AppError> {
        let meta_patch = json!({ "tokenReceivedAt": chrono::Utc::now() });
        let won = self
            .transactions
            .conditional_transition(
                reference,
                TxStatus::Pending,
                TxStatus::Processing,
                Some(chain_tx_id),
                None,
                Some(meta_patch),
                None,
            )
            .await?;

        let record = match won {
            Some(record) => record,
            None => {
                let existing = self.transactions.find_by_reference(reference).await?;
                return match existing {
                    Some(existing)
                        if matches!(existing.status, TxStatus::Processing | TxStatus::Settling | TxStatus::Confirmed) =>
                    {
                        Ok(ConfirmReceiptResult::AlreadyProcessed)
                    }
                    Some(existing) => Err(AppError::new(
                        AppErrorKind::Domain(DomainError::ConflictOfState {
                            reference: reference.to_string(),
                            current_status: existing.status.as_str().to_string(),
                            reason: "record is in an unexpected terminal state".to_string(),
                        }),
                        "transaction is not in a state that accepts a receipt",
                    )),
                    None => Err(not_found(reference)),
                };
            }
        };

        self.check_amount_and_enforce_policy(&record, token_amount).await?;

        let bank_details = record
            .bank_details
            .clone()
            .ok_or_else(|| AppError::internal_error("processing record missing bank details"))?
            .0;

        let transfer = self
            .payment_provider
            .initiate_transfer(record.ngn_amount, &bank_details.bank_code, &bank_details.account_number, reference)
            .await;

        self.liquidity_guard.invalidate().await;

        match transfer {
            Ok(result) => {
                self.transactions
                    .conditional_transition(
                        reference,
                        TxStatus::Processing,
                        TxStatus::Settling,
                        None,
                        Some(&result.transfer_id),
                        None,
                        None,
                    )
                    .await?;
                info!(reference = %reference, transfer_id = %result.transfer_id, "payout initiated, awaiting provider webhook");
                Ok(ConfirmReceiptResult::Processing)
            }
            Err(payment_err) => {
                let failure_reason = payment_err.to_string();
                error!(
                    reference = %reference,
                    chain_tx_id = %chain_tx_id,
                    ngn_amount = record.ngn_amount,
                    bank_code = %bank_details.bank_code,
                    error = %failure_reason,
                    "payout failed after tokens were received — requires manual settlement"
                );
                self.transactions
                    .conditional_transition(
                        reference,
                        TxStatus::Processing,
                        TxStatus::Failed,
                        None,
                        None,
                        Some(json!({ "requiresManualSettlement": true, "failureReason": failure_reason })),
                        None,
                    )
                    .await?;
                Err(AppError::from(payment_err).with_status_code(axum::http::StatusCode::INTERNAL_SERVER_ERROR))
            }
        }
    }

    /// Enforces `OfframpConfig::underdelivery_policy` when the delivered
    /// token amount drifts from the quoted amount by more than
    /// `MISMATCH_TOLERANCE` (§4.8, §9 open question). `AcceptAndFlag` logs and
    /// proceeds to payout at the NGN amount fixed at init; `Reject` fails the
    /// record instead of ever calling the payout provider.
    async fn check_amount_and_enforce_policy(&self, record: &Transaction, delivered: f64) -> Result<(), AppError> {
        let expected = record.token_amount.to_f64().unwrap_or(delivered);
        if expected <= 0.0 {
            return Ok(());
        }
        let drift = (delivered - expected).abs() / expected;
        if drift <= MISMATCH_TOLERANCE {
            return Ok(());
        }

        match self.offramp.underdelivery_policy {
            UnderDeliveryPolicy::AcceptAndFlag => {
                warn!(
                    reference = %record.reference,
                    expected,
                    delivered,
                    "token amount mismatch beyond tolerance, accepting payout as flagged (NGN amount was fixed at init)"
                );
                Ok(())
            }
            UnderDeliveryPolicy::Reject => {
                let reason = format!(
                    "delivered amount {delivered} diverges from quoted {expected} beyond tolerance"
                );
                error!(
                    reference = %record.reference,
                    expected,
                    delivered,
                    "token amount mismatch beyond tolerance, rejecting per configured underdelivery policy"
                );
                self.transactions
                    .conditional_transition(
                        &record.reference,
                        TxStatus::Processing,
                        TxStatus::Failed,
                        None,
                        None,
                        Some(json!({ "failureReason": reason.clone() })),
                        None,
                    )
                    .await?;
                Err(AppError::new(
                    AppErrorKind::Domain(DomainError::InvalidAmount { amount: delivered.to_string(), reason }),
                    "delivered amount does not match the quoted amount",
                ))
            }
        }
    }

    /// `HandlePayoutWebhook(rawBody, signature)` (§4.8). Signature is
    /// verified by the caller (the HTTP handler) against the provider's raw
    /// body before the payload is parsed and handed here.
    pub async fn handle_payout_webhook(&self, payload: PayoutWebhookPayload) -> Result<(), AppError> {
        let reference = &payload.data.reference;
        match payload.event.as_str() {
            "transfer.completed" => {
                self.transactions
                    .conditional_transition(
                        reference,
                        TxStatus::Settling,
                        TxStatus::Confirmed,
                        None,
                        None,
                        None,
                        Some(chrono::Utc::now()),
                    )
                    .await?;
                Ok(())
            }
            "transfer.failed" | "transfer.reversed" => {
                let reason = payload.data.reason.clone().unwrap_or_else(|| "payout provider reported failure".to_string());
                let updated = self
                    .transactions
                    .conditional_transition(
                        reference,
                        TxStatus::Settling,
                        TxStatus::Failed,
                        None,
                        None,
                        Some(json!({ "failureReason": reason })),
                        None,
                    )
                    .await?;
                if let Some(record) = updated {
                    error!(
                        reference = %reference,
                        sender_address = %record.sender_address,
                        "payout reversed/failed after token receipt — manual refund to sender required"
                    );
                }
                Ok(())
            }
            other => {
                warn!(event = %other, reference = %reference, "ignoring unrecognized payout webhook event");
                Ok(())
            }
        }
    }

    /// Reaps a single expired `pending` record (§8 scenario 6). Intended to
    /// be called on a ticking interval or lazily on status lookup.
    pub async fn expire_if_overdue(&self, reference: &str) -> Result<bool, AppError> {
        let Some(record) = self.transactions.find_by_reference(reference).await? else {
            return Ok(false);
        };
        if record.status != TxStatus::Pending {
            return Ok(false);
        }
        let Some(expires_at) = record.expires_at else {
            return Ok(false);
        };
        if expires_at > chrono::Utc::now() {
            return Ok(false);
        }
        let updated = self
            .transactions
            .conditional_transition(
                reference,
                TxStatus::Pending,
                TxStatus::Failed,
                None,
                None,
                Some(json!({ "failureReason": "poll timeout" })),
                None,
            )
            .await?;
        Ok(updated.is_some())
    }
}

fn not_found(reference: &str) -> AppError {
    AppError::new(
        AppErrorKind::Domain(DomainError::TransactionNotFound {
            transaction_id: reference.to_string(),
        }),
        "transaction not found",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatch_tolerance_is_small_fraction() {
        assert!(MISMATCH_TOLERANCE < 0.01);
    }
}
