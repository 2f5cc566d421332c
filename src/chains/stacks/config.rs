//! Stacks network/client configuration, read once at startup.

use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StacksNetwork {
    Mainnet,
    Testnet,
}

impl StacksNetwork {
    pub fn from_env() -> Self {
        match env::var("STACKS_NETWORK")
            .unwrap_or_else(|_| "testnet".to_string())
            .to_lowercase()
            .as_str()
        {
            "mainnet" => Self::Mainnet,
            _ => Self::Testnet,
        }
    }

    /// The version byte used to encode/decode standard (single-sig) principal
    /// addresses. Values per the Stacks address protocol.
    pub fn address_version(&self) -> u8 {
        match self {
            Self::Mainnet => 22,
            Self::Testnet => 26,
        }
    }

    pub fn chain_id(&self) -> u32 {
        match self {
            Self::Mainnet => 0x0000_0001,
            Self::Testnet => 0x8000_0000,
        }
    }

    pub fn explorer_name(&self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Testnet => "testnet",
        }
    }
}

#[derive(Debug, Clone)]
pub struct StacksConfig {
    pub network: StacksNetwork,
    pub api_url: String,
    pub usdc_contract_address: String,
    pub usdc_contract_name: String,
    pub platform_address: Option<String>,
    pub platform_private_key: Option<String>,
}

impl StacksConfig {
    pub fn from_env() -> Self {
        Self {
            network: StacksNetwork::from_env(),
            api_url: env::var("STACKS_API_URL")
                .unwrap_or_else(|_| "https://api.testnet.hiro.so".to_string()),
            usdc_contract_address: env::var("USDC_CONTRACT_ADDRESS").unwrap_or_default(),
            usdc_contract_name: env::var("USDC_CONTRACT_NAME").unwrap_or_else(|_| "usdc-token".to_string()),
            platform_address: env::var("PLATFORM_STX_ADDRESS").ok(),
            platform_private_key: env::var("PLATFORM_STX_PRIVATE_KEY").ok(),
        }
    }

    /// Fully-qualified contract id, e.g. `SP2...ABC.usdc-token`.
    pub fn usdc_contract_id(&self) -> String {
        format!("{}.{}", self.usdc_contract_address, self.usdc_contract_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usdc_contract_id_format() {
        let config = StacksConfig {
            network: StacksNetwork::Testnet,
            api_url: "https://api.testnet.hiro.so".to_string(),
            usdc_contract_address: "ST000000000000000000002AMW42H".to_string(),
            usdc_contract_name: "usdc-token".to_string(),
            platform_address: None,
            platform_private_key: None,
        };
        assert_eq!(
            config.usdc_contract_id(),
            "ST000000000000000000002AMW42H.usdc-token"
        );
    }
}
