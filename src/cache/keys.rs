//! Typed cache key builders. Centralizing the `format!` calls here keeps the
//! key convention (and its TTL) next to its name instead of scattered across
//! every call site.

use std::fmt;

/// `offramp:rate:{token}` — not cached itself (prices come from the oracle),
/// but used to namespace short-lived per-request rate lookups.
pub struct RateKey<'a> {
    pub token: &'a str,
}

impl fmt::Display for RateKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rate:{}", self.token)
    }
}

/// `status:{direction}:{reference}` — cached status-lookup responses.
pub struct StatusKey<'a> {
    pub direction: &'a str,
    pub reference: &'a str,
}

impl fmt::Display for StatusKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "api:{}:status:{}", self.direction, self.reference)
    }
}

/// `payout:banks` — 24h cached bank list.
pub const BANK_LIST_KEY: &str = "payout:banks";

/// `payout:balance` — 30s cached account balance.
pub const BALANCE_KEY: &str = "payout:balance";

/// `liquidity:max_order` — short-lived cache of the derived max order size.
pub const MAX_ORDER_KEY: &str = "liquidity:max_order";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_key_format() {
        let key = StatusKey {
            direction: "offramp",
            reference: "SSWAP_OFFRAMP_abc123_deadbeef",
        };
        assert_eq!(key.to_string(), "api:offramp:status:SSWAP_OFFRAMP_abc123_deadbeef");
    }

    #[test]
    fn rate_key_format() {
        let key = RateKey { token: "STX" };
        assert_eq!(key.to_string(), "rate:STX");
    }
}
