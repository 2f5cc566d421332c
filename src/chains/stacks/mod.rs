//! Stacks blockchain adapter (C4): the settlement engine's only dependency
//! on chain specifics. Everything upstream of this module speaks in
//! `Tx`/`TxStatus`/`BroadcastReceipt`, never raw wire bytes.

pub mod client;
pub mod config;
pub mod errors;
pub mod signer;
pub mod types;

pub use client::StacksClient;
pub use config::{StacksConfig, StacksNetwork};
pub use errors::StacksError;
pub use signer::{BroadcastReceipt, PlatformStacksSigner, StacksSigner};
pub use types::{
    decode_memo_hex, encode_memo_hex, extract_sip010_amount, is_valid_stacks_address, ContractCall,
    NativeTransfer, Tx, TxStatus,
};
