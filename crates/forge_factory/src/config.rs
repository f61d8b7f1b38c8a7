//! Token deployment configuration and its pure validation.

use forge_core::{Address, Network, hash_bytes};
use serde::{Deserialize, Serialize};

use crate::error::FactoryError;

/// The capability set frozen into a token at initialization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlags {
    pub mintable: bool,
    pub burnable: bool,
    pub pausable: bool,
    pub capped: bool,
}

impl FeatureFlags {
    /// Number of enabled features.
    pub fn enabled_count(&self) -> usize {
        [self.mintable, self.burnable, self.pausable, self.capped]
            .iter()
            .filter(|f| **f)
            .count()
    }
}

/// A requested token deployment. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenConfig {
    pub name: String,
    pub symbol: String,
    pub total_supply: u128,
    pub decimals: u8,
    pub initial_owner: Address,
    pub features: FeatureFlags,
    pub max_supply: Option<u128>,
    pub network: Network,
}

const NAME_MAX_LEN: usize = 50;
const SYMBOL_MAX_LEN: usize = 10;
const DECIMALS_MAX: u8 = 18;

/// Validate a configuration.
///
/// Pure, so clients can run the same pre-flight check before paying gas.
/// The first failing rule is reported as a human-readable reason.
pub fn validate_config(config: &TokenConfig) -> Result<(), FactoryError> {
    let invalid = |reason: String| Err(FactoryError::InvalidConfiguration(reason));

    if config.name.is_empty() || config.name.len() > NAME_MAX_LEN {
        return invalid(format!(
            "name must be 1-{NAME_MAX_LEN} characters, got {}",
            config.name.len()
        ));
    }
    if config.symbol.is_empty() || config.symbol.len() > SYMBOL_MAX_LEN {
        return invalid(format!(
            "symbol must be 1-{SYMBOL_MAX_LEN} characters, got {}",
            config.symbol.len()
        ));
    }
    if config.total_supply == 0 {
        return invalid("total supply must be greater than zero".to_string());
    }
    if config.decimals > DECIMALS_MAX {
        return invalid(format!(
            "decimals must be at most {DECIMALS_MAX}, got {}",
            config.decimals
        ));
    }
    if config.initial_owner.is_zero() {
        return invalid("initial owner must not be the zero address".to_string());
    }
    if config.features.capped {
        match config.max_supply {
            None | Some(0) => {
                return invalid("capped token requires a max supply greater than zero".to_string());
            }
            Some(max) if max < config.total_supply => {
                return invalid(format!(
                    "max supply {max} is below total supply {}",
                    config.total_supply
                ));
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Hash of the canonical JSON encoding of a configuration.
///
/// Emitted with the creation event so off-chain auditors can verify a config
/// without the factory storing the full struct.
pub fn config_hash(config: &TokenConfig) -> [u8; 32] {
    let bytes = serde_json::to_vec(config).expect("config serializes");
    hash_bytes(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> TokenConfig {
        TokenConfig {
            name: "Test Token".into(),
            symbol: "TEST".into(),
            total_supply: 1_000_000,
            decimals: 18,
            initial_owner: Address([0x11; 20]),
            features: FeatureFlags::default(),
            max_supply: None,
            network: Network::Ethereum,
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(validate_config(&base_config()).is_ok());
    }

    #[test]
    fn rejects_empty_and_oversized_name() {
        let mut config = base_config();
        config.name = String::new();
        assert!(validate_config(&config).is_err());

        config.name = "x".repeat(51);
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, FactoryError::InvalidConfiguration(ref r) if r.contains("name")));
    }

    #[test]
    fn rejects_bad_symbol() {
        let mut config = base_config();
        config.symbol = String::new();
        assert!(validate_config(&config).is_err());

        config.symbol = "TOOLONGSYMBOL".into();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn rejects_zero_supply() {
        let mut config = base_config();
        config.total_supply = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn rejects_decimals_over_18() {
        let mut config = base_config();
        config.decimals = 19;
        assert!(validate_config(&config).is_err());

        config.decimals = 18;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn rejects_zero_owner() {
        let mut config = base_config();
        config.initial_owner = Address::ZERO;
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, FactoryError::InvalidConfiguration(ref r) if r.contains("owner")));
    }

    #[test]
    fn capped_requires_max_supply_at_least_total() {
        let mut config = base_config();
        config.features.capped = true;
        config.features.mintable = true;

        config.max_supply = None;
        assert!(validate_config(&config).is_err());

        config.max_supply = Some(0);
        assert!(validate_config(&config).is_err());

        // The spec scenario: max below total is rejected before any
        // deployment attempt.
        config.total_supply = 1_000_000;
        config.max_supply = Some(500_000);
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, FactoryError::InvalidConfiguration(_)));

        config.max_supply = Some(1_000_000);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn uncapped_ignores_max_supply() {
        let mut config = base_config();
        config.max_supply = Some(1);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn enabled_count_counts_flags() {
        assert_eq!(FeatureFlags::default().enabled_count(), 0);
        let flags = FeatureFlags {
            mintable: true,
            burnable: false,
            pausable: true,
            capped: false,
        };
        assert_eq!(flags.enabled_count(), 2);
    }

    #[test]
    fn config_hash_is_stable_and_input_sensitive() {
        let a = base_config();
        let mut b = base_config();
        assert_eq!(config_hash(&a), config_hash(&b));

        b.symbol = "OTHER".into();
        assert_ne!(config_hash(&a), config_hash(&b));
    }

    #[test]
    fn config_serde_round_trip() {
        let config = base_config();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: TokenConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
