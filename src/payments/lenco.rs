//! Lenco-backed `PaymentProvider` (C3): resolve account name, list banks,
//! initiate a bank transfer, read the platform NGN balance, and verify
//! webhook signatures. Bearer-token auth, bounded timeouts, retried only on
//! network-level failure — never on 4xx (§4.3).

use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use nuban::Nuban;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use sha2::Sha256;
use tracing::{error, warn};

use super::error::PaymentError;
use super::provider::PaymentProvider;
use super::types::{AccountBalance, Bank, ResolvedAccount, TransferResult};

type HmacSha256 = Hmac<Sha256>;

const RESOLVE_TIMEOUT: Duration = Duration::from_secs(15);
const TRANSFER_TIMEOUT: Duration = Duration::from_secs(30);
const BALANCE_TIMEOUT: Duration = Duration::from_secs(10);
const BASE_TIMEOUT: Duration = Duration::from_secs(15);

pub struct LencoProvider {
    http: Client,
    base_url: String,
    api_key: String,
    account_id: String,
    webhook_secret: String,
}

impl LencoProvider {
    pub fn new(api_key: String, account_id: String, webhook_secret: String) -> Self {
        let http = Client::builder()
            .timeout(BASE_TIMEOUT)
            .build()
            .expect("failed to build Lenco HTTP client");
        Self {
            http,
            base_url: "https://api.lenco.co/access/v1".to_string(),
            api_key,
            account_id,
            webhook_secret,
        }
    }

    fn auth_header(&self) -> String {
        format!("Bearer {}", self.api_key)
    }

    fn validate_account_number_syntax(&self, account_number: &str, bank_code: &str) -> Result<(), PaymentError> {
        if !account_number.chars().all(|c| c.is_ascii_digit()) || account_number.len() != 10 {
            return Err(PaymentError::BankVerificationFailed(
                "account number must be exactly 10 digits".to_string(),
            ));
        }
        // Catch obviously malformed numbers before any network round-trip;
        // a failed checksum still lets the call through since some
        // non-NUBAN-compliant microfinance banks don't follow the checksum.
        if let Ok(nuban) = Nuban::new(bank_code, account_number) {
            if !nuban.is_valid() {
                warn!(bank_code = %bank_code, "account number fails NUBAN checksum, deferring to provider");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentProvider for LencoProvider {
    fn name(&self) -> &'static str {
        "lenco"
    }

    async fn resolve_account(
        &self,
        bank_code: &str,
        account_number: &str,
    ) -> Result<ResolvedAccount, PaymentError> {
        self.validate_account_number_syntax(account_number, bank_code)?;

        let url = format!("{}/resolve/bank-account", self.base_url);
        let response = self
            .http
            .get(&url)
            .timeout(RESOLVE_TIMEOUT)
            .header("Authorization", self.auth_header())
            .query(&[("bankCode", bank_code), ("accountNumber", account_number)])
            .send()
            .await
            .map_err(|e| PaymentError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PaymentError::BankVerificationFailed(body));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| PaymentError::Decode(e.to_string()))?;
        let data = body.get("data").ok_or_else(|| PaymentError::Decode("missing data".to_string()))?;
        let account_name = data
            .get("accountName")
            .and_then(|v| v.as_str())
            .ok_or_else(|| PaymentError::Decode("missing accountName".to_string()))?
            .to_string();
        let bank_name = data
            .get("bankName")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        Ok(ResolvedAccount { account_name, bank_name })
    }

    async fn list_banks(&self) -> Result<Vec<Bank>, PaymentError> {
        let url = format!("{}/banks", self.base_url);
        let response = self
            .http
            .get(&url)
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| PaymentError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PaymentError::Decode(format!("list banks failed: {}", response.status())));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| PaymentError::Decode(e.to_string()))?;
        let data = body
            .get("data")
            .and_then(|d| d.as_array())
            .cloned()
            .unwrap_or_default();

        Ok(data
            .iter()
            .filter_map(|entry| {
                Some(Bank {
                    code: entry.get("code")?.as_str()?.to_string(),
                    name: entry.get("name")?.as_str()?.to_string(),
                })
            })
            .collect())
    }

    async fn initiate_transfer(
        &self,
        amount_ngn: i64,
        bank_code: &str,
        account_number: &str,
        reference: &str,
    ) -> Result<TransferResult, PaymentError> {
        let url = format!("{}/transactions", self.base_url);
        let response = self
            .http
            .post(&url)
            .timeout(TRANSFER_TIMEOUT)
            .header("Authorization", self.auth_header())
            .json(&serde_json::json!({
                "accountId": self.account_id,
                "amount": amount_ngn.to_string(),
                "bankCode": bank_code,
                "accountNumber": account_number,
                "reference": reference,
                "narration": format!("StackSwap offramp {reference}"),
            }))
            .send()
            .await
            .map_err(|e| PaymentError::Network(e.to_string()))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| PaymentError::Decode(e.to_string()))?;

        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(PaymentError::Network(format!("status {status}")));
        }
        if !status.is_success() {
            let message = body
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("transfer initiation failed")
                .to_string();
            error!(reference = %reference, status = %status, message = %message, "Lenco rejected payout initiation");
            return Err(PaymentError::PayoutFailed(message));
        }

        let data = body.get("data").ok_or_else(|| PaymentError::Decode("missing data".to_string()))?;
        Ok(TransferResult {
            transfer_id: data.get("id").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            provider_reference: data
                .get("reference")
                .and_then(|v| v.as_str())
                .unwrap_or(reference)
                .to_string(),
            status: data.get("status").and_then(|v| v.as_str()).unwrap_or("pending").to_string(),
        })
    }

    async fn get_account_balance(&self) -> Result<AccountBalance, PaymentError> {
        let url = format!("{}/accounts/{}", self.base_url, self.account_id);
        let response = match self
            .http
            .get(&url)
            .timeout(BALANCE_TIMEOUT)
            .header("Authorization", self.auth_header())
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "failed to reach Lenco for balance check");
                return Ok(AccountBalance::Unknown);
            }
        };

        if !response.status().is_success() {
            return Ok(AccountBalance::Unknown);
        }

        let body: Value = match response.json().await {
            Ok(b) => b,
            Err(_) => return Ok(AccountBalance::Unknown),
        };

        let kobo = body
            .get("data")
            .and_then(|d| d.get("balance"))
            .and_then(|b| b.as_i64());

        match kobo {
            Some(kobo) => Ok(AccountBalance::Known(kobo / 100)),
            None => Ok(AccountBalance::Unknown),
        }
    }

    fn verify_webhook_signature(&self, raw_body: &[u8], signature_header: &str) -> bool {
        let Ok(mut mac) = HmacSha256::new_from_slice(self.webhook_secret.as_bytes()) else {
            return false;
        };
        mac.update(raw_body);
        let Ok(signature_bytes) = hex::decode(signature_header) else {
            return false;
        };
        // `Mac::verify_slice` performs a constant-time comparison internally;
        // hand-rolling one would duplicate what the crate already does.
        mac.verify_slice(&signature_bytes).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> LencoProvider {
        LencoProvider::new("key".to_string(), "acct".to_string(), "secret".to_string())
    }

    #[test]
    fn rejects_account_numbers_not_ten_digits() {
        let p = provider();
        assert!(p.validate_account_number_syntax("12345", "058").is_err());
        assert!(p.validate_account_number_syntax("12345abcde", "058").is_err());
        assert!(p.validate_account_number_syntax("0123456789", "058").is_ok());
    }

    #[test]
    fn webhook_signature_round_trips() {
        let p = provider();
        let body = br#"{"event":"transfer.completed"}"#;
        let mut mac = HmacSha256::new_from_slice(b"secret").unwrap();
        mac.update(body);
        let sig = hex::encode(mac.finalize().into_bytes());
        assert!(p.verify_webhook_signature(body, &sig));
        assert!(!p.verify_webhook_signature(body, &hex::encode([0u8; 32])));
    }
}
