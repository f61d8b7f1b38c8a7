use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Supported deployment target networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Ethereum,
    Base,
    Polygon,
    Arbitrum,
}

impl Network {
    /// Human-readable label for the network.
    pub fn label(&self) -> &'static str {
        match self {
            Network::Ethereum => "Ethereum Mainnet",
            Network::Base => "Base Mainnet",
            Network::Polygon => "Polygon Mainnet",
            Network::Arbitrum => "Arbitrum One",
        }
    }

    /// EVM chain ID.
    pub fn chain_id(&self) -> u64 {
        match self {
            Network::Ethereum => 1,
            Network::Base => 8453,
            Network::Polygon => 137,
            Network::Arbitrum => 42161,
        }
    }

    /// Ticker of the currency used to pay for gas on this network.
    pub fn native_symbol(&self) -> &'static str {
        match self {
            Network::Polygon => "POL",
            _ => "ETH",
        }
    }

    /// All supported networks, in a stable order.
    pub fn all() -> [Network; 4] {
        [
            Network::Ethereum,
            Network::Base,
            Network::Polygon,
            Network::Arbitrum,
        ]
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Static configuration for one network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub name: String,
    pub chain_id: u64,
    pub rpc_url: String,
    pub explorer_url: String,
}

/// Returns default configurations for all supported networks.
pub fn default_network_configs() -> HashMap<Network, NetworkConfig> {
    let mut configs = HashMap::new();

    configs.insert(
        Network::Ethereum,
        NetworkConfig {
            name: "Ethereum Mainnet".to_string(),
            chain_id: 1,
            rpc_url: "https://eth.llamarpc.com".to_string(),
            explorer_url: "https://etherscan.io".to_string(),
        },
    );

    configs.insert(
        Network::Base,
        NetworkConfig {
            name: "Base Mainnet".to_string(),
            chain_id: 8453,
            rpc_url: "https://mainnet.base.org".to_string(),
            explorer_url: "https://basescan.org".to_string(),
        },
    );

    configs.insert(
        Network::Polygon,
        NetworkConfig {
            name: "Polygon Mainnet".to_string(),
            chain_id: 137,
            rpc_url: "https://polygon-rpc.com".to_string(),
            explorer_url: "https://polygonscan.com".to_string(),
        },
    );

    configs.insert(
        Network::Arbitrum,
        NetworkConfig {
            name: "Arbitrum One".to_string(),
            chain_id: 42161,
            rpc_url: "https://arb1.arbitrum.io/rpc".to_string(),
            explorer_url: "https://arbiscan.io".to_string(),
        },
    );

    configs
}

/// Validate that a URL is well-formed and uses HTTP or HTTPS.
pub fn validate_url(url: &str) -> bool {
    match url::Url::parse(url) {
        Ok(parsed) => {
            let scheme = parsed.scheme();
            (scheme == "http" || scheme == "https") && parsed.host().is_some()
        }
        Err(_) => false,
    }
}
