//! Per-network deployment policies.
//!
//! A [`NetworkPolicy`] is read-only at orchestration time: it fixes how a
//! deployment on one network is priced, confirmed, and timed out. The
//! [`PolicyStore`] holds one policy per network with built-in defaults and
//! custom override support, and can be persisted to a JSON file.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::network::Network;

/// Deployment policy for a single network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkPolicy {
    /// Multiplier applied to the base gas price when estimating cost.
    pub gas_multiplier: f64,
    /// Hard cap on the gas price in gwei.
    pub max_gas_price_gwei: u64,
    /// Confirmation depth required before a transaction counts as final.
    pub required_confirmations: u32,
    /// Ceiling on one deployment attempt, submission through confirmation.
    pub deployment_timeout_secs: u64,
    /// Ceiling on waiting for confirmations after submission.
    pub confirmation_timeout_secs: u64,
    /// Extra wait after confirmation before declaring success, to absorb
    /// short-lived reorganizations. Zero disables the verification phase.
    pub verification_delay_secs: u64,
    /// Interval between transaction status polls.
    pub poll_interval_ms: u64,
    /// Maximum transient-failure retries while monitoring a transaction.
    pub max_retries: u32,
}

impl NetworkPolicy {
    /// Built-in default policy for a network. L1 waits for a deeper
    /// confirmation depth at a higher fee multiplier; L2s poll faster.
    pub fn default_for(network: Network) -> Self {
        match network {
            Network::Ethereum => NetworkPolicy {
                gas_multiplier: 1.2,
                max_gas_price_gwei: 300,
                required_confirmations: 3,
                deployment_timeout_secs: 600,
                confirmation_timeout_secs: 300,
                verification_delay_secs: 15,
                poll_interval_ms: 12_000,
                max_retries: 3,
            },
            Network::Base => NetworkPolicy {
                gas_multiplier: 1.1,
                max_gas_price_gwei: 50,
                required_confirmations: 1,
                deployment_timeout_secs: 180,
                confirmation_timeout_secs: 90,
                verification_delay_secs: 5,
                poll_interval_ms: 2_000,
                max_retries: 3,
            },
            Network::Polygon => NetworkPolicy {
                gas_multiplier: 1.3,
                max_gas_price_gwei: 500,
                required_confirmations: 5,
                deployment_timeout_secs: 300,
                confirmation_timeout_secs: 180,
                verification_delay_secs: 10,
                poll_interval_ms: 3_000,
                max_retries: 3,
            },
            Network::Arbitrum => NetworkPolicy {
                gas_multiplier: 1.1,
                max_gas_price_gwei: 10,
                required_confirmations: 1,
                deployment_timeout_secs: 180,
                confirmation_timeout_secs: 90,
                verification_delay_secs: 5,
                poll_interval_ms: 1_000,
                max_retries: 3,
            },
        }
    }
}

/// Manages per-network deployment policies with custom override support.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyStore {
    policies: HashMap<Network, NetworkPolicy>,
}

impl PolicyStore {
    /// Create a store populated with built-in defaults for every network.
    pub fn with_defaults() -> Self {
        let policies = Network::all()
            .into_iter()
            .map(|n| (n, NetworkPolicy::default_for(n)))
            .collect();
        Self { policies }
    }

    /// Get the policy for a network, falling back to the built-in default.
    pub fn policy(&self, network: Network) -> NetworkPolicy {
        self.policies
            .get(&network)
            .cloned()
            .unwrap_or_else(|| NetworkPolicy::default_for(network))
    }

    /// Override the policy for a network.
    pub fn set_policy(&mut self, network: Network, policy: NetworkPolicy) {
        info!(network = %network, "network policy overridden");
        self.policies.insert(network, policy);
    }

    /// Reset a network's policy back to the built-in default.
    pub fn reset_to_default(&mut self, network: Network) {
        self.policies
            .insert(network, NetworkPolicy::default_for(network));
    }

    /// Persist the store to a JSON file.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json =
            serde_json::to_string_pretty(self).context("failed to serialize policy store")?;
        std::fs::write(path, json).context("failed to write policy store file")?;

        // Restrict file permissions to owner-only on Unix (0o600 = rw-------).
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
                .context("failed to set policy store file permissions")?;
        }

        info!(path = %path.display(), "policy store saved");
        Ok(())
    }

    /// Load a store from a JSON file. Returns defaults if the file does not
    /// exist.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "policy store file not found, using defaults");
            return Ok(Self::with_defaults());
        }
        let json = std::fs::read_to_string(path).context("failed to read policy store file")?;
        let store: Self =
            serde_json::from_str(&json).context("failed to deserialize policy store")?;
        info!(path = %path.display(), "policy store loaded");
        Ok(store)
    }
}

impl Default for PolicyStore {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_all_networks() {
        let store = PolicyStore::with_defaults();
        for network in Network::all() {
            let policy = store.policy(network);
            assert!(policy.required_confirmations >= 1);
            assert!(policy.poll_interval_ms > 0);
        }
    }

    #[test]
    fn ethereum_waits_deeper_than_base() {
        let store = PolicyStore::with_defaults();
        let eth = store.policy(Network::Ethereum);
        let base = store.policy(Network::Base);
        assert!(eth.required_confirmations > base.required_confirmations);
        assert!(eth.poll_interval_ms > base.poll_interval_ms);
    }

    #[test]
    fn set_policy_overrides_default() {
        let mut store = PolicyStore::with_defaults();
        let mut custom = NetworkPolicy::default_for(Network::Base);
        custom.required_confirmations = 12;
        store.set_policy(Network::Base, custom);

        assert_eq!(store.policy(Network::Base).required_confirmations, 12);
    }

    #[test]
    fn reset_restores_default() {
        let mut store = PolicyStore::with_defaults();
        let mut custom = NetworkPolicy::default_for(Network::Polygon);
        custom.max_retries = 99;
        store.set_policy(Network::Polygon, custom);

        store.reset_to_default(Network::Polygon);
        assert_eq!(
            store.policy(Network::Polygon),
            NetworkPolicy::default_for(Network::Polygon)
        );
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policies.json");

        let mut store = PolicyStore::with_defaults();
        let mut custom = NetworkPolicy::default_for(Network::Ethereum);
        custom.gas_multiplier = 2.0;
        store.set_policy(Network::Ethereum, custom.clone());

        store.save_to_file(&path).unwrap();
        let loaded = PolicyStore::load_from_file(&path).unwrap();

        assert_eq!(loaded.policy(Network::Ethereum), custom);
        assert_eq!(
            loaded.policy(Network::Base),
            NetworkPolicy::default_for(Network::Base)
        );
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let path = std::env::temp_dir().join("nonexistent-forge-policy-store.json");
        let store = PolicyStore::load_from_file(&path).unwrap();
        assert_eq!(
            store.policy(Network::Arbitrum),
            NetworkPolicy::default_for(Network::Arbitrum)
        );
    }
}
