//! Write side of the blockchain adapter (C4): signs and broadcasts the two
//! payout primitives the settlement engine needs — a native STX transfer and
//! a SIP-010 `transfer` contract call — as a black-box primitive behind the
//! [`StacksSigner`] trait (spec §4.4).
//!
//! The concrete implementation hand-encodes the Stacks transaction wire
//! format (single-signature, P2PKH spending condition) rather than shelling
//! out to an external signing service, since the platform key never leaves
//! this process.

use async_trait::async_trait;
use c32::{decode, encode};
use ripemd::Ripemd160;
use secp256k1::{ecdsa::RecoverableSignature, Message, PublicKey, Secp256k1, SecretKey};
use sha2::{Digest, Sha256};

use super::config::{StacksConfig, StacksNetwork};
use super::errors::StacksError;

const TX_VERSION_MAINNET: u8 = 0x00;
const TX_VERSION_TESTNET: u8 = 0x80;
const ANCHOR_MODE_ANY: u8 = 0x03;
const POST_CONDITION_MODE_DENY: u8 = 0x02;
const AUTH_TYPE_STANDARD: u8 = 0x04;
const PUBKEY_ENCODING_COMPRESSED: u8 = 0x00;
const HASH_MODE_P2PKH: u8 = 0x00;

const PAYLOAD_TOKEN_TRANSFER: u8 = 0x00;
const PAYLOAD_CONTRACT_CALL: u8 = 0x02;

const PRINCIPAL_STANDARD: u8 = 0x05;
const ASSET_INFO_ID_NONE: u8 = 0x00;

const CLARITY_UINT: u8 = 0x01;
const CLARITY_BUFFER: u8 = 0x02;
const CLARITY_OPTIONAL_SOME: u8 = 0x0a;
#[allow(dead_code)]
const CLARITY_OPTIONAL_NONE: u8 = 0x09; // memo is always Some in this settlement engine's usage

const POST_CONDITION_FUNGIBLE: u8 = 0x02;
const POST_CONDITION_STX: u8 = 0x00;
const FUNGIBLE_CONDITION_LE: u8 = 0x01; // amount sent <= bound

/// Result of a broadcast attempt: the id the chain assigned, used by
/// [`crate::chains::stacks::client::StacksClient`] to poll for confirmation.
#[derive(Debug, Clone)]
pub struct BroadcastReceipt {
    pub tx_id: String,
}

#[async_trait]
pub trait StacksSigner: Send + Sync {
    /// Sign and broadcast a native STX transfer, memo-tagged with the
    /// offramp/onramp reference so the indexer can match it back to a
    /// transaction record.
    async fn send_native(
        &self,
        recipient: &str,
        amount_ustx: u64,
        memo: &str,
        nonce: u64,
        fee: u64,
    ) -> Result<BroadcastReceipt, StacksError>;

    /// Sign and broadcast a SIP-010 `transfer(uint, principal, principal,
    /// optional buff 34)` contract call against the configured USDC token
    /// contract.
    async fn send_sip010(
        &self,
        recipient: &str,
        amount_micro_usdc: u64,
        memo: &str,
        nonce: u64,
        fee: u64,
    ) -> Result<BroadcastReceipt, StacksError>;
}

/// Signs transactions with a platform-controlled secp256k1 key and
/// broadcasts them through `POST /v2/transactions`.
pub struct PlatformStacksSigner {
    http: reqwest::Client,
    config: StacksConfig,
    secret_key: SecretKey,
    public_key: PublicKey,
}

impl PlatformStacksSigner {
    pub fn new(config: StacksConfig) -> Result<Self, StacksError> {
        let raw = config
            .platform_private_key
            .as_ref()
            .ok_or_else(|| StacksError::Signing("PLATFORM_STX_PRIVATE_KEY not configured".into()))?;
        let key_hex = raw.trim_end_matches("01"); // Stacks WIF-less hex keys append a compression flag byte
        let key_bytes = hex::decode(key_hex)
            .map_err(|e| StacksError::Signing(format!("invalid private key hex: {e}")))?;
        let secp = Secp256k1::new();
        let secret_key = SecretKey::from_slice(&key_bytes)
            .map_err(|e| StacksError::Signing(format!("invalid private key: {e}")))?;
        let public_key = PublicKey::from_secret_key(&secp, &secret_key);
        Ok(Self {
            http: reqwest::Client::new(),
            config,
            secret_key,
            public_key,
        })
    }

    fn version_byte(&self) -> u8 {
        match self.config.network {
            StacksNetwork::Mainnet => TX_VERSION_MAINNET,
            StacksNetwork::Testnet => TX_VERSION_TESTNET,
        }
    }

    fn hash160_of_pubkey(&self) -> [u8; 20] {
        let compressed = self.public_key.serialize();
        let sha = Sha256::digest(compressed);
        let ripe = Ripemd160::digest(sha);
        let mut out = [0u8; 20];
        out.copy_from_slice(&ripe);
        out
    }

    /// The platform's own c32-checked Stacks address, derived from its public key.
    pub fn address(&self) -> Result<String, StacksError> {
        let version = self.config.network.address_version();
        encode(version, &self.hash160_of_pubkey())
            .map_err(|e| StacksError::Signing(format!("c32 encode failed: {e:?}")))
    }

    fn principal_bytes(&self, address: &str) -> Result<Vec<u8>, StacksError> {
        let (version, hash160) =
            decode(address).map_err(|_| StacksError::InvalidAddress(address.to_string()))?;
        let mut out = vec![PRINCIPAL_STANDARD, version];
        out.extend_from_slice(&hash160);
        Ok(out)
    }

    /// Clarity `(buff 34)` encoding of the memo convention used throughout
    /// the settlement engine (spec §9): the reference string, null-padded.
    fn memo_buffer(&self, memo: &str) -> [u8; 34] {
        let mut buf = [0u8; 34];
        let bytes = memo.as_bytes();
        let n = bytes.len().min(34);
        buf[..n].copy_from_slice(&bytes[..n]);
        buf
    }

    fn build_common_header(&self, nonce: u64, fee: u64, out: &mut Vec<u8>) {
        out.push(self.version_byte());
        out.extend_from_slice(&self.config.network.chain_id().to_be_bytes());
        out.push(AUTH_TYPE_STANDARD);
        out.push(HASH_MODE_P2PKH);
        out.extend_from_slice(&self.hash160_of_pubkey());
        out.extend_from_slice(&nonce.to_be_bytes());
        out.extend_from_slice(&fee.to_be_bytes());
        out.push(0x02); // recoverable ECDSA signature auth field id
        out.extend_from_slice(&[0u8; 65]); // signature placeholder, filled after signing
        out.push(ANCHOR_MODE_ANY);
        out.push(POST_CONDITION_MODE_DENY);
    }

    fn token_transfer_payload(&self, recipient: &str, amount: u64, memo: &str) -> Result<Vec<u8>, StacksError> {
        let mut payload = vec![PAYLOAD_TOKEN_TRANSFER];
        payload.extend(self.principal_bytes(recipient)?);
        payload.extend_from_slice(&amount.to_be_bytes());
        payload.extend_from_slice(&self.memo_buffer(memo));
        Ok(payload)
    }

    fn contract_call_payload(
        &self,
        recipient: &str,
        amount: u64,
        memo: &str,
    ) -> Result<Vec<u8>, StacksError> {
        if self.config.usdc_contract_address.is_empty() {
            return Err(StacksError::Signing("USDC_CONTRACT_ADDRESS not configured".into()));
        }
        let contract_address = self.config.usdc_contract_address.clone();
        let contract_name = self.config.usdc_contract_name.clone();

        let mut payload = vec![PAYLOAD_CONTRACT_CALL];
        let (version, hash160) = decode(&contract_address)
            .map_err(|_| StacksError::InvalidAddress(contract_address.clone()))?;
        payload.push(version);
        payload.extend_from_slice(&hash160);
        payload.push(contract_name.len() as u8);
        payload.extend_from_slice(contract_name.as_bytes());
        let function_name = "transfer";
        payload.push(function_name.len() as u8);
        payload.extend_from_slice(function_name.as_bytes());

        let sender_bytes = self.principal_bytes(&self.address()?)?;
        let recipient_bytes = self.principal_bytes(recipient)?;
        let memo_bytes = self.memo_buffer(memo);

        // args: (amount uint) (sender principal) (recipient principal) (memo (optional (buff 34)))
        payload.extend_from_slice(&4u32.to_be_bytes());
        payload.push(CLARITY_UINT);
        payload.extend_from_slice(&(amount as u128).to_be_bytes());
        payload.extend(sender_bytes);
        payload.extend(recipient_bytes);
        payload.push(CLARITY_OPTIONAL_SOME);
        payload.push(CLARITY_BUFFER);
        payload.extend_from_slice(&34u32.to_be_bytes());
        payload.extend_from_slice(&memo_bytes);

        Ok(payload)
    }

    /// A single fungible-token post-condition bounding the transfer to
    /// exactly `amount`, so a compromised payload can never move more than
    /// the settlement engine authorized.
    fn sip010_post_condition(&self, amount: u64) -> Result<Vec<u8>, StacksError> {
        let mut pc = vec![
            POST_CONDITION_FUNGIBLE,
            PRINCIPAL_STANDARD,
            self.config.network.address_version(),
        ];
        pc.extend_from_slice(&self.hash160_of_pubkey());
        pc.push(ASSET_INFO_ID_NONE);
        pc.push(FUNGIBLE_CONDITION_LE);
        pc.extend_from_slice(&(amount as u128).to_be_bytes());
        Ok(pc)
    }

    fn native_post_condition(&self, amount: u64) -> Vec<u8> {
        let mut pc = vec![POST_CONDITION_STX];
        pc.push(PRINCIPAL_STANDARD);
        pc.extend_from_slice(&self.hash160_of_pubkey());
        pc.push(FUNGIBLE_CONDITION_LE);
        pc.extend_from_slice(&(amount as u128).to_be_bytes());
        pc
    }

    fn sign_and_finalize(&self, header: &mut Vec<u8>, payload: &[u8], post_conditions: Vec<u8>) -> Vec<u8> {
        let mut unsigned = header.clone();
        unsigned.extend_from_slice(&1u32.to_be_bytes()); // one post-condition
        unsigned.extend(post_conditions.clone());
        unsigned.extend_from_slice(payload);

        let digest = Sha256::digest(Sha256::digest(&unsigned));
        let message = Message::from_digest_slice(&digest).expect("sha256 digest is 32 bytes");
        let secp = Secp256k1::new();
        let signature: RecoverableSignature = secp.sign_ecdsa_recoverable(&message, &self.secret_key);
        let (recovery_id, sig_bytes) = signature.serialize_compact();

        // Patch the placeholder signature bytes in the header (recovery id + 64-byte sig).
        let sig_offset = header.len() - 66;
        header[sig_offset] = (i32::from(recovery_id) as u8) + 27;
        header[sig_offset + 1..sig_offset + 65].copy_from_slice(&sig_bytes);

        let mut tx = header.clone();
        tx.extend_from_slice(&1u32.to_be_bytes());
        tx.extend(post_conditions);
        tx.extend_from_slice(payload);
        tx
    }

    async fn broadcast(&self, raw_tx: Vec<u8>) -> Result<BroadcastReceipt, StacksError> {
        let url = format!("{}/v2/transactions", self.config.api_url);
        let response = self
            .http
            .post(&url)
            .header("Content-Type", "application/octet-stream")
            .body(raw_tx)
            .send()
            .await
            .map_err(|e| StacksError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StacksError::RequestFailed(format!("broadcast rejected: {body}")));
        }

        let tx_id: String = response
            .json()
            .await
            .map_err(|e| StacksError::Decode(e.to_string()))?;
        Ok(BroadcastReceipt { tx_id })
    }
}

#[async_trait]
impl StacksSigner for PlatformStacksSigner {
    async fn send_native(
        &self,
        recipient: &str,
        amount_ustx: u64,
        memo: &str,
        nonce: u64,
        fee: u64,
    ) -> Result<BroadcastReceipt, StacksError> {
        let mut header = Vec::new();
        self.build_common_header(nonce, fee, &mut header);
        let payload = self.token_transfer_payload(recipient, amount_ustx, memo)?;
        let post_condition = self.native_post_condition(amount_ustx);
        let raw_tx = self.sign_and_finalize(&mut header, &payload, post_condition);
        self.broadcast(raw_tx).await
    }

    async fn send_sip010(
        &self,
        recipient: &str,
        amount_micro_usdc: u64,
        memo: &str,
        nonce: u64,
        fee: u64,
    ) -> Result<BroadcastReceipt, StacksError> {
        let mut header = Vec::new();
        self.build_common_header(nonce, fee, &mut header);
        let payload = self.contract_call_payload(recipient, amount_micro_usdc, memo)?;
        let post_condition = self.sip010_post_condition(amount_micro_usdc)?;
        let raw_tx = self.sign_and_finalize(&mut header, &payload, post_condition);
        self.broadcast(raw_tx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> StacksConfig {
        StacksConfig {
            network: StacksNetwork::Testnet,
            api_url: "https://api.testnet.hiro.so".to_string(),
            usdc_contract_address: "ST000000000000000000002AMW42H".to_string(),
            usdc_contract_name: "usdc-token".to_string(),
            platform_address: None,
            // 32 zero bytes + compression flag, a syntactically valid secp256k1 key for encoding tests
            platform_private_key: Some(format!("{}01", "00".repeat(31) + "01")),
        }
    }

    #[test]
    fn derives_address_from_private_key() {
        let signer = PlatformStacksSigner::new(test_config()).unwrap();
        let address = signer.address().unwrap();
        assert!(address.starts_with('S'));
    }

    #[test]
    fn token_transfer_payload_starts_with_payload_id() {
        let signer = PlatformStacksSigner::new(test_config()).unwrap();
        let recipient = signer.address().unwrap();
        let payload = signer
            .token_transfer_payload(&recipient, 1_000_000, "ref-123")
            .unwrap();
        assert_eq!(payload[0], PAYLOAD_TOKEN_TRANSFER);
    }

    #[test]
    fn contract_call_payload_encodes_function_name() {
        let signer = PlatformStacksSigner::new(test_config()).unwrap();
        let recipient = signer.address().unwrap();
        let payload = signer
            .contract_call_payload(&recipient, 500_000, "ref-456")
            .unwrap();
        assert_eq!(payload[0], PAYLOAD_CONTRACT_CALL);
    }

    #[test]
    fn memo_buffer_is_34_bytes_and_null_padded() {
        let signer = PlatformStacksSigner::new(test_config()).unwrap();
        let buf = signer.memo_buffer("short");
        assert_eq!(buf.len(), 34);
        assert_eq!(&buf[..5], b"short");
        assert_eq!(buf[5], 0);
    }
}
