//! `PaymentProvider` trait (C3): the payout-provider adapter stays
//! provider-generic, grounded on the teacher's multi-provider
//! `PaymentProviderFactory` pattern, even though this crate registers only
//! `LencoProvider` (spec names a single payout provider).

use async_trait::async_trait;

use super::error::PaymentError;
use super::types::{AccountBalance, Bank, ResolvedAccount, TransferResult};

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// `ResolveAccount(bankCode, accountNumber) -> {accountName, bankName}`.
    async fn resolve_account(
        &self,
        bank_code: &str,
        account_number: &str,
    ) -> Result<ResolvedAccount, PaymentError>;

    /// `ListBanks() -> [{code, name}]`, cached 24h by the caller.
    async fn list_banks(&self) -> Result<Vec<Bank>, PaymentError>;

    /// `InitiateTransfer(amountNGN, bankCode, accountNumber, reference) ->
    /// {transferId, providerReference, status}`. `reference` doubles as the
    /// provider-side idempotency key.
    async fn initiate_transfer(
        &self,
        amount_ngn: i64,
        bank_code: &str,
        account_number: &str,
        reference: &str,
    ) -> Result<TransferResult, PaymentError>;

    /// `GetAccountBalance() -> NGN`, 30s cached by the caller. `Unknown` is
    /// distinct from zero (§4.3).
    async fn get_account_balance(&self) -> Result<AccountBalance, PaymentError>;

    /// HMAC verification over the raw request body, constant-time.
    fn verify_webhook_signature(&self, raw_body: &[u8], signature_header: &str) -> bool;
}
