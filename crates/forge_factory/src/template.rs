//! Token templates — selection rules and the parameterized instance.
//!
//! Rather than a BASIC/MINTABLE/FULL_FEATURED class hierarchy, a deployed
//! token is one value type carrying the feature-flag set frozen at
//! initialization. Each mutating operation checks its own required flag.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use forge_core::Address;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{FeatureFlags, TokenConfig};
use crate::error::TokenError;

/// Identifier of a registered token implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TemplateKind {
    Basic,
    Mintable,
    FullFeatured,
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TemplateKind::Basic => "BASIC",
            TemplateKind::Mintable => "MINTABLE",
            TemplateKind::FullFeatured => "FULL_FEATURED",
        };
        f.write_str(name)
    }
}

/// Select the template for a feature set.
///
/// Pure decision table: more than one enabled feature, or mintable combined
/// with pausable, selects the full-featured template; mintable alone selects
/// the mintable template; anything else gets the basic one.
pub fn select_template(features: &FeatureFlags) -> TemplateKind {
    if features.enabled_count() > 1 || (features.mintable && features.pausable) {
        TemplateKind::FullFeatured
    } else if features.mintable {
        TemplateKind::Mintable
    } else {
        TemplateKind::Basic
    }
}

/// A deployed token instance behind a clone.
///
/// Created exactly once per deployment via [`TokenInstance::initialize`];
/// the feature flags, cap, and owner set there are permanent for the
/// instance. Calls to disabled features fail with
/// [`TokenError::FeatureNotEnabled`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenInstance {
    address: Address,
    template: TemplateKind,
    name: String,
    symbol: String,
    decimals: u8,
    total_supply: u128,
    max_supply: Option<u128>,
    features: FeatureFlags,
    owner: Option<Address>,
    paused: bool,
    balances: HashMap<Address, u128>,
    allowances: HashMap<Address, HashMap<Address, u128>>,
    initialized_at: DateTime<Utc>,
}

impl TokenInstance {
    /// Initialize a clone at `address` with the full configuration. The
    /// initial supply is credited to the configured owner.
    pub fn initialize(address: Address, config: &TokenConfig, template: TemplateKind) -> Self {
        let mut balances = HashMap::new();
        balances.insert(config.initial_owner, config.total_supply);

        info!(token = %address, symbol = %config.symbol, template = %template, "token initialized");
        Self {
            address,
            template,
            name: config.name.clone(),
            symbol: config.symbol.clone(),
            decimals: config.decimals,
            total_supply: config.total_supply,
            max_supply: if config.features.capped {
                config.max_supply
            } else {
                None
            },
            features: config.features,
            owner: Some(config.initial_owner),
            paused: false,
            balances,
            allowances: HashMap::new(),
            initialized_at: Utc::now(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn template(&self) -> TemplateKind {
        self.template
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn total_supply(&self) -> u128 {
        self.total_supply
    }

    pub fn max_supply(&self) -> Option<u128> {
        self.max_supply
    }

    pub fn features(&self) -> &FeatureFlags {
        &self.features
    }

    /// Current owner, or `None` after renunciation.
    pub fn owner(&self) -> Option<Address> {
        self.owner
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn balance_of(&self, account: Address) -> u128 {
        self.balances.get(&account).copied().unwrap_or(0)
    }

    pub fn allowance(&self, owner: Address, spender: Address) -> u128 {
        self.allowances
            .get(&owner)
            .and_then(|m| m.get(&spender))
            .copied()
            .unwrap_or(0)
    }

    fn require_feature(&self, enabled: bool, name: &'static str) -> Result<(), TokenError> {
        if enabled {
            Ok(())
        } else {
            Err(TokenError::FeatureNotEnabled(name))
        }
    }

    fn require_owner(&self, caller: Address) -> Result<(), TokenError> {
        if self.owner == Some(caller) {
            Ok(())
        } else {
            Err(TokenError::NotOwner)
        }
    }

    fn require_not_paused(&self) -> Result<(), TokenError> {
        if self.paused {
            Err(TokenError::Paused)
        } else {
            Ok(())
        }
    }

    fn debit(&mut self, from: Address, amount: u128) -> Result<(), TokenError> {
        let balance = self.balance_of(from);
        if balance < amount {
            return Err(TokenError::InsufficientBalance {
                available: balance,
                needed: amount,
            });
        }
        self.balances.insert(from, balance - amount);
        Ok(())
    }

    fn credit(&mut self, to: Address, amount: u128) {
        *self.balances.entry(to).or_insert(0) += amount;
    }

    /// Transfer `amount` from the caller to `to`. Pause is checked first.
    pub fn transfer(&mut self, caller: Address, to: Address, amount: u128) -> Result<(), TokenError> {
        self.require_not_paused()?;
        if to.is_zero() {
            return Err(TokenError::ZeroAddress);
        }
        self.debit(caller, amount)?;
        self.credit(to, amount);
        Ok(())
    }

    /// Set the caller's allowance for `spender`.
    pub fn approve(
        &mut self,
        caller: Address,
        spender: Address,
        amount: u128,
    ) -> Result<(), TokenError> {
        if spender.is_zero() {
            return Err(TokenError::ZeroAddress);
        }
        self.allowances
            .entry(caller)
            .or_default()
            .insert(spender, amount);
        Ok(())
    }

    /// Transfer on behalf of `from`, consuming the caller's allowance.
    pub fn transfer_from(
        &mut self,
        caller: Address,
        from: Address,
        to: Address,
        amount: u128,
    ) -> Result<(), TokenError> {
        self.require_not_paused()?;
        if to.is_zero() {
            return Err(TokenError::ZeroAddress);
        }
        self.spend_allowance(from, caller, amount)?;
        self.debit(from, amount)?;
        self.credit(to, amount);
        Ok(())
    }

    fn spend_allowance(
        &mut self,
        owner: Address,
        spender: Address,
        amount: u128,
    ) -> Result<(), TokenError> {
        let current = self.allowance(owner, spender);
        if current < amount {
            return Err(TokenError::InsufficientAllowance {
                available: current,
                needed: amount,
            });
        }
        self.allowances
            .entry(owner)
            .or_default()
            .insert(spender, current - amount);
        Ok(())
    }

    /// Mint `amount` to `to`. Requires the mintable flag and the owner;
    /// rejects the zero target and any mint that would exceed the cap.
    pub fn mint(&mut self, caller: Address, to: Address, amount: u128) -> Result<(), TokenError> {
        self.require_feature(self.features.mintable, "mintable")?;
        self.require_owner(caller)?;
        if to.is_zero() {
            return Err(TokenError::ZeroAddress);
        }
        let attempted = self.total_supply.saturating_add(amount);
        if let Some(cap) = self.max_supply {
            if attempted > cap {
                return Err(TokenError::CapExceeded { cap, attempted });
            }
        }
        self.total_supply = attempted;
        self.credit(to, amount);
        Ok(())
    }

    /// Burn `amount` from the caller's balance. Requires the burnable flag.
    pub fn burn(&mut self, caller: Address, amount: u128) -> Result<(), TokenError> {
        self.require_feature(self.features.burnable, "burnable")?;
        self.debit(caller, amount)?;
        self.total_supply -= amount;
        Ok(())
    }

    /// Burn from `from` using the caller's allowance. Requires the burnable
    /// flag.
    pub fn burn_from(
        &mut self,
        caller: Address,
        from: Address,
        amount: u128,
    ) -> Result<(), TokenError> {
        self.require_feature(self.features.burnable, "burnable")?;
        self.spend_allowance(from, caller, amount)?;
        self.debit(from, amount)?;
        self.total_supply -= amount;
        Ok(())
    }

    /// Stop transfers. Requires the pausable flag and the owner.
    pub fn pause(&mut self, caller: Address) -> Result<(), TokenError> {
        self.require_feature(self.features.pausable, "pausable")?;
        self.require_owner(caller)?;
        self.paused = true;
        Ok(())
    }

    /// Resume transfers. Requires the pausable flag and the owner.
    pub fn unpause(&mut self, caller: Address) -> Result<(), TokenError> {
        self.require_feature(self.features.pausable, "pausable")?;
        self.require_owner(caller)?;
        self.paused = false;
        Ok(())
    }

    /// Hand ownership to `new_owner`. Rejects the zero address.
    pub fn transfer_ownership(
        &mut self,
        caller: Address,
        new_owner: Address,
    ) -> Result<(), TokenError> {
        self.require_owner(caller)?;
        if new_owner.is_zero() {
            return Err(TokenError::ZeroAddress);
        }
        self.owner = Some(new_owner);
        Ok(())
    }

    /// Give up ownership permanently.
    pub fn renounce_ownership(&mut self, caller: Address) -> Result<(), TokenError> {
        self.require_owner(caller)?;
        self.owner = None;
        Ok(())
    }

    pub fn initialized_at(&self) -> DateTime<Utc> {
        self.initialized_at
    }
}
