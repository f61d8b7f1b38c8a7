//! Deployment gas and cost estimation.

use forge_core::NetworkPolicy;
use forge_factory::TokenConfig;
use serde::{Deserialize, Serialize};

/// Gas for deploying and initializing a clone with no features enabled
/// (typical minimal-proxy ERC-20 deployment).
pub const BASE_DEPLOYMENT_GAS: u64 = 1_200_000;

/// Additional gas per enabled feature (extra storage writes and gate code).
pub const FEATURE_GAS_INCREMENT: u64 = 150_000;

const WEI_PER_GWEI: u128 = 1_000_000_000;

/// Estimated gas limit for deploying a configuration.
pub fn estimate_deployment_gas(config: &TokenConfig) -> u64 {
    BASE_DEPLOYMENT_GAS + FEATURE_GAS_INCREMENT * config.features.enabled_count() as u64
}

/// A priced deployment estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub gas_limit: u64,
    pub gas_price_gwei: u64,
    pub total_cost_wei: u128,
}

/// Price a deployment under a network policy.
///
/// The policy's multiplier is applied to the observed base gas price, then
/// clamped at the policy's maximum.
pub fn estimate_cost(
    config: &TokenConfig,
    policy: &NetworkPolicy,
    base_gas_price_gwei: u64,
) -> CostEstimate {
    let gas_limit = estimate_deployment_gas(config);
    let multiplied = (base_gas_price_gwei as f64 * policy.gas_multiplier).ceil() as u64;
    let gas_price_gwei = multiplied.min(policy.max_gas_price_gwei);
    let total_cost_wei = gas_limit as u128 * gas_price_gwei as u128 * WEI_PER_GWEI;

    CostEstimate {
        gas_limit,
        gas_price_gwei,
        total_cost_wei,
    }
}
