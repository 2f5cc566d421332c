//! Row types for the transaction store (C2), realized over Postgres/sqlx per
//! `SPEC_FULL.md` §3: the document-store shape of §3 of the distilled spec,
//! with a JSONB `meta` column standing in for the open audit map.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "UPPERCASE")]
pub enum Token {
    Stx,
    Usdc,
}

impl Token {
    pub fn as_str(&self) -> &'static str {
        match self {
            Token::Stx => "STX",
            Token::Usdc => "USDC",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "STX" => Some(Token::Stx),
            "USDC" => Some(Token::Usdc),
            _ => None,
        }
    }

    /// Units on chain: 6-decimal subunits for both STX (microSTX) and USDC.
    pub fn subunit_scale(&self) -> u64 {
        1_000_000
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Onramp,
    Offramp,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Onramp => "onramp",
            Direction::Offramp => "offramp",
        }
    }
}

/// The settlement status machine, §4.8. Transitions are enforced by
/// [`TxStatus::can_transition_to`] and, authoritatively, by the
/// `ConditionalUpdate` SQL predicate in `transaction_repository`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Pending,
    Processing,
    Settling,
    Confirmed,
    Failed,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Pending => "pending",
            TxStatus::Processing => "processing",
            TxStatus::Settling => "settling",
            TxStatus::Confirmed => "confirmed",
            TxStatus::Failed => "failed",
        }
    }

    /// §4.8 status machine edges. Any pair not listed here is rejected.
    pub fn can_transition_to(&self, next: &TxStatus) -> bool {
        matches!(
            (self, next),
            (TxStatus::Pending, TxStatus::Processing)
                | (TxStatus::Pending, TxStatus::Failed)
                | (TxStatus::Processing, TxStatus::Settling)
                | (TxStatus::Processing, TxStatus::Failed)
                | (TxStatus::Settling, TxStatus::Confirmed)
                | (TxStatus::Settling, TxStatus::Failed)
        )
    }

    /// §3 invariant: processing/settling/confirmed records must carry a chain tx id.
    pub fn requires_chain_tx_id(&self) -> bool {
        matches!(self, TxStatus::Processing | TxStatus::Settling | TxStatus::Confirmed)
    }

    /// §3 invariant: settling/confirmed records must carry a payout provider tx id.
    pub fn requires_payout_tx_id(&self) -> bool {
        matches!(self, TxStatus::Settling | TxStatus::Confirmed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BankDetails {
    pub bank_code: String,
    pub account_number: String,
    pub account_name: String,
    pub bank_name: String,
}

/// The central entity, one record per swap attempt (§3).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: Uuid,
    pub reference: String,
    pub token: Token,
    pub direction: Direction,
    /// Whole-token amount, stored with full on-chain precision.
    pub token_amount: bigdecimal::BigDecimal,
    pub ngn_amount: i64,
    pub fee_ngn: i64,
    pub rate_at_time: bigdecimal::BigDecimal,
    pub sender_address: String,
    pub recipient_address: String,
    pub chain_tx_id: Option<String>,
    pub payout_provider_tx_id: Option<String>,
    pub status: TxStatus,
    pub bank_details: Option<sqlx::types::Json<BankDetails>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub meta: sqlx::types::Json<JsonValue>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    pub fn meta_value(&self) -> &JsonValue {
        &self.meta.0
    }
}

/// Append-only price time series (§3). Never read by the oracle itself —
/// history queries only.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PriceSnapshot {
    pub id: Uuid,
    pub token: Token,
    pub price_usd: f64,
    pub price_ngn: f64,
    pub usd_to_ngn: f64,
    pub fetched_at: DateTime<Utc>,
}

/// Reference format `SSWAP_<DIRECTION>_<ts36>_<rand8hex>` (§6 glossary).
pub fn generate_reference(direction: Direction) -> String {
    let ts36 = to_base36(Utc::now().timestamp_millis() as u64);
    let rand8 = Uuid::new_v4().simple().to_string()[..8].to_string();
    let direction_label = match direction {
        Direction::Onramp => "ONRAMP",
        Direction::Offramp => "OFFRAMP",
    };
    format!("SSWAP_{direction_label}_{ts36}_{rand8}")
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_machine_allows_only_named_edges() {
        assert!(TxStatus::Pending.can_transition_to(&TxStatus::Processing));
        assert!(TxStatus::Processing.can_transition_to(&TxStatus::Settling));
        assert!(TxStatus::Settling.can_transition_to(&TxStatus::Confirmed));
        assert!(!TxStatus::Pending.can_transition_to(&TxStatus::Settling));
        assert!(!TxStatus::Confirmed.can_transition_to(&TxStatus::Failed));
        assert!(!TxStatus::Failed.can_transition_to(&TxStatus::Pending));
    }

    #[test]
    fn requires_chain_tx_id_invariant() {
        assert!(TxStatus::Processing.requires_chain_tx_id());
        assert!(TxStatus::Settling.requires_chain_tx_id());
        assert!(TxStatus::Confirmed.requires_chain_tx_id());
        assert!(!TxStatus::Pending.requires_chain_tx_id());
    }

    #[test]
    fn requires_payout_tx_id_invariant() {
        assert!(TxStatus::Settling.requires_payout_tx_id());
        assert!(TxStatus::Confirmed.requires_payout_tx_id());
        assert!(!TxStatus::Processing.requires_payout_tx_id());
    }

    #[test]
    fn reference_format_matches_convention() {
        let reference = generate_reference(Direction::Offramp);
        assert!(reference.starts_with("SSWAP_OFFRAMP_"));
        let parts: Vec<&str> = reference.split('_').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[3].len(), 8);
    }

    #[test]
    fn token_round_trips_through_str() {
        assert_eq!(Token::from_str_loose("stx"), Some(Token::Stx));
        assert_eq!(Token::from_str_loose("USDC"), Some(Token::Usdc));
        assert_eq!(Token::from_str_loose("btc"), None);
    }
}
