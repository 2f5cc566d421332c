//! DTOs for the Settlement Engine (C8), shared between the HTTP layer and
//! the engine itself.

use serde::{Deserialize, Serialize};

use crate::database::{BankDetails, Token, Transaction};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeOfframpRequest {
    pub token: Token,
    pub token_amount: f64,
    pub sender_address: String,
    pub bank_code: String,
    pub account_number: String,
}

/// Result of the offramp quote computation (§4.8 step 3), surfaced directly
/// by the rate-preview endpoint and reused internally by `initialize_offramp`.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OfframpQuote {
    pub token: Token,
    pub token_amount: f64,
    pub rate_ngn_per_token: f64,
    pub fee_ngn: i64,
    pub ngn_amount: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositInstructions {
    pub deposit_address: String,
    pub exact_amount: f64,
    pub memo: String,
    pub token: Token,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OfframpInitResult {
    pub transaction: Transaction,
    pub deposit: DepositInstructions,
    pub bank_details: BankDetails,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NotifyTxResult {
    Watching,
    AlreadyProcessing,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConfirmReceiptResult {
    Processing,
    AlreadyProcessed,
}
