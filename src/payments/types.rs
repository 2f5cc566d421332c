//! Wire-agnostic types for the payout provider adapter (C3), shared by every
//! concrete `PaymentProvider` implementation.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedAccount {
    pub account_name: String,
    pub bank_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bank {
    pub code: String,
    pub name: String,
}

/// Fintech-first ordering convention: these bank codes are sorted to the
/// top of `ListBanks` results regardless of the provider's own ordering
/// (§8 testable property: "the fintech-priority list appears in the
/// specified order at the top").
pub const FINTECH_PRIORITY_BANK_CODES: &[&str] = &["090267", "090110", "090175", "100004"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferResult {
    pub transfer_id: String,
    pub provider_reference: String,
    pub status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountBalance {
    Known(i64),
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PayoutWebhookPayload {
    pub event: String,
    pub data: PayoutWebhookData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PayoutWebhookData {
    pub reference: String,
    #[serde(default)]
    pub transfer_id: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

pub fn sort_banks_fintech_first(mut banks: Vec<Bank>) -> Vec<Bank> {
    banks.sort_by_key(|bank| {
        FINTECH_PRIORITY_BANK_CODES
            .iter()
            .position(|code| *code == bank.code)
            .unwrap_or(FINTECH_PRIORITY_BANK_CODES.len())
    });
    banks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fintech_banks_sort_to_top_in_priority_order() {
        let banks = vec![
            Bank { code: "011".to_string(), name: "First Bank".to_string() },
            Bank { code: "090175".to_string(), name: "Fintech B".to_string() },
            Bank { code: "090267".to_string(), name: "Fintech A".to_string() },
        ];
        let sorted = sort_banks_fintech_first(banks);
        assert_eq!(sorted[0].code, "090267");
        assert_eq!(sorted[1].code, "090175");
        assert_eq!(sorted[2].code, "011");
    }
}
