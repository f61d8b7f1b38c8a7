//! The deployment factory.
//!
//! [`TokenFactory`] owns every registry the original design kept global:
//! the template map, the deployed-symbol set, per-creator indexes, and the
//! instantiated tokens. The factory instance is the sole mutator; all access
//! goes through its methods.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use forge_core::{Address, Network, hash_bytes};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{TokenConfig, config_hash, validate_config};
use crate::error::FactoryError;
use crate::events::FactoryEvent;
use crate::registry::TemplateRegistry;
use crate::template::{TemplateKind, TokenInstance, select_template};

/// Bookkeeping for one successful deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployedTokenRecord {
    pub token_address: Address,
    pub creator: Address,
    pub symbol: String,
    pub network: Network,
    pub config_hash: String,
    pub created_at: DateTime<Utc>,
}

/// What `create_token` hands back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateReceipt {
    pub token_address: Address,
    pub fee_paid: u128,
    pub refund: u128,
}

/// External value-transfer seam used for overpayment refunds and fee
/// withdrawal. A failed transfer aborts the surrounding call entirely.
pub trait Settlement: Send + Sync {
    fn transfer(&mut self, to: Address, amount: u128) -> Result<(), String>;
}

/// Settlement that always succeeds. The default for a factory.
#[derive(Debug, Default)]
pub struct NoopSettlement;

impl Settlement for NoopSettlement {
    fn transfer(&mut self, _to: Address, _amount: u128) -> Result<(), String> {
        Ok(())
    }
}

/// Deterministic clone address from (factory, implementation, salt).
///
/// Pure: reproducible before any state-mutating call, and `create_token`
/// deploys to exactly this address for the same inputs.
pub fn derive_clone_address(factory: Address, implementation: Address, salt: [u8; 32]) -> Address {
    let mut buf = Vec::with_capacity(1 + 20 + 32 + 32);
    buf.push(0xff);
    buf.extend_from_slice(factory.as_bytes());
    buf.extend_from_slice(&salt);
    buf.extend_from_slice(&hash_bytes(implementation.as_bytes()));
    Address::from_digest(&hash_bytes(&buf))
}

/// The on-chain deployment factory.
pub struct TokenFactory {
    address: Address,
    owner: Address,
    registry: TemplateRegistry,
    service_fee: u128,
    fee_recipient: Address,
    accumulated_fees: u128,
    paused: bool,
    nonce: u64,
    /// Time component of the salt. Advanced only by successful deployments,
    /// so address prediction stays stable between them.
    last_deployed_at: DateTime<Utc>,
    symbols: HashSet<String>,
    records: Vec<DeployedTokenRecord>,
    by_creator: HashMap<Address, Vec<Address>>,
    tokens: HashMap<Address, TokenInstance>,
    total_created: u64,
    events: Vec<FactoryEvent>,
    settlement: Box<dyn Settlement>,
}

impl TokenFactory {
    /// Create a factory at `address`, owned by `owner`.
    pub fn new(address: Address, owner: Address, service_fee: u128, fee_recipient: Address) -> Self {
        Self {
            address,
            owner,
            registry: TemplateRegistry::new(owner),
            service_fee,
            fee_recipient,
            accumulated_fees: 0,
            paused: false,
            nonce: 0,
            last_deployed_at: Utc::now(),
            symbols: HashSet::new(),
            records: Vec::new(),
            by_creator: HashMap::new(),
            tokens: HashMap::new(),
            total_created: 0,
            events: Vec::new(),
            settlement: Box::new(NoopSettlement),
        }
    }

    /// Replace the settlement implementation.
    pub fn with_settlement(mut self, settlement: Box<dyn Settlement>) -> Self {
        self.settlement = settlement;
        self
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn service_fee(&self) -> u128 {
        self.service_fee
    }

    pub fn fee_recipient(&self) -> Address {
        self.fee_recipient
    }

    pub fn accumulated_fees(&self) -> u128 {
        self.accumulated_fees
    }

    pub fn total_tokens_created(&self) -> u64 {
        self.total_created
    }

    /// The append-only event log.
    pub fn events(&self) -> &[FactoryEvent] {
        &self.events
    }

    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    fn require_owner(&self, caller: Address) -> Result<(), FactoryError> {
        if caller == self.owner {
            Ok(())
        } else {
            Err(FactoryError::NotOwner)
        }
    }

    // -----------------------------------------------------------------------
    // Template administration
    // -----------------------------------------------------------------------

    pub fn add_template(
        &mut self,
        caller: Address,
        kind: TemplateKind,
        implementation: Address,
    ) -> Result<(), FactoryError> {
        let event = self.registry.add_template(caller, kind, implementation)?;
        self.events.push(event);
        Ok(())
    }

    pub fn remove_template(
        &mut self,
        caller: Address,
        kind: TemplateKind,
    ) -> Result<(), FactoryError> {
        let event = self.registry.remove_template(caller, kind)?;
        self.events.push(event);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Deployment
    // -----------------------------------------------------------------------

    fn compute_salt(&self, creator: Address, name: &str, symbol: &str) -> [u8; 32] {
        let mut buf = Vec::new();
        buf.extend_from_slice(creator.as_bytes());
        buf.extend_from_slice(name.as_bytes());
        buf.push(0);
        buf.extend_from_slice(symbol.as_bytes());
        buf.push(0);
        buf.extend_from_slice(&self.nonce.to_be_bytes());
        buf.extend_from_slice(&self.last_deployed_at.timestamp_millis().to_be_bytes());
        hash_bytes(&buf)
    }

    fn resolve_deployment(
        &self,
        config: &TokenConfig,
        creator: Address,
    ) -> Result<(TemplateKind, Address, [u8; 32], Address), FactoryError> {
        let kind = select_template(&config.features);
        let implementation = self
            .registry
            .get_template(kind)
            .ok_or(FactoryError::TemplateNotFound(kind))?;
        let salt = self.compute_salt(creator, &config.name, &config.symbol);
        let token_address = derive_clone_address(self.address, implementation, salt);
        Ok((kind, implementation, salt, token_address))
    }

    /// Predict the address the next `create_token(config)` from `creator`
    /// deploys to.
    ///
    /// Uses the current deployment nonce, so the prediction is only valid
    /// until the next successful deployment advances it. Callers that care
    /// about staleness must re-predict immediately before submitting.
    pub fn predict_token_address(
        &self,
        config: &TokenConfig,
        creator: Address,
    ) -> Result<Address, FactoryError> {
        let (_, _, _, token_address) = self.resolve_deployment(config, creator)?;
        Ok(token_address)
    }

    /// Validate, select a template, deploy a clone at a deterministic
    /// address, initialize it, collect the service fee, and refund any
    /// overpayment.
    ///
    /// Atomic: every fallible step, including the refund transfer, runs
    /// before the first state mutation, so a failure leaves the factory
    /// exactly as it was.
    pub fn create_token(
        &mut self,
        caller: Address,
        payment: u128,
        config: &TokenConfig,
    ) -> Result<CreateReceipt, FactoryError> {
        if self.paused {
            return Err(FactoryError::FactoryPaused);
        }
        validate_config(config)?;
        if payment < self.service_fee {
            return Err(FactoryError::InsufficientServiceFee {
                required: self.service_fee,
                provided: payment,
            });
        }
        if self.symbols.contains(&config.symbol) {
            return Err(FactoryError::SymbolAlreadyExists(config.symbol.clone()));
        }

        let (kind, _implementation, _salt, token_address) =
            self.resolve_deployment(config, caller)?;

        // Refund the overpayment before committing anything; a failed refund
        // aborts the whole call.
        let refund = payment - self.service_fee;
        if refund > 0 {
            self.settlement
                .transfer(caller, refund)
                .map_err(FactoryError::TransferFailed)?;
        }

        let token = TokenInstance::initialize(token_address, config, kind);
        let hash_hex = hex::encode(config_hash(config));

        self.tokens.insert(token_address, token);
        self.symbols.insert(config.symbol.clone());
        self.records.push(DeployedTokenRecord {
            token_address,
            creator: caller,
            symbol: config.symbol.clone(),
            network: config.network,
            config_hash: hash_hex.clone(),
            created_at: Utc::now(),
        });
        self.by_creator.entry(caller).or_default().push(token_address);
        self.total_created += 1;
        self.nonce += 1;
        self.last_deployed_at = Utc::now();
        self.accumulated_fees += self.service_fee;

        self.events.push(FactoryEvent::TokenCreated {
            token: token_address,
            creator: caller,
            name: config.name.clone(),
            symbol: config.symbol.clone(),
            total_supply: config.total_supply,
            decimals: config.decimals,
            config_hash: hash_hex,
        });

        info!(
            token = %token_address,
            creator = %caller,
            symbol = %config.symbol,
            template = %kind,
            "token created"
        );

        Ok(CreateReceipt {
            token_address,
            fee_paid: self.service_fee,
            refund,
        })
    }

    // -----------------------------------------------------------------------
    // Fee administration
    // -----------------------------------------------------------------------

    pub fn set_service_fee(&mut self, caller: Address, fee: u128) -> Result<(), FactoryError> {
        self.require_owner(caller)?;
        self.service_fee = fee;
        self.events.push(FactoryEvent::ServiceFeeUpdated { fee });
        Ok(())
    }

    pub fn set_fee_recipient(
        &mut self,
        caller: Address,
        recipient: Address,
    ) -> Result<(), FactoryError> {
        self.require_owner(caller)?;
        self.fee_recipient = recipient;
        self.events
            .push(FactoryEvent::FeeRecipientUpdated { recipient });
        Ok(())
    }

    /// Pay accumulated fees out to the fee recipient. A zero balance is a
    /// no-op, not an error.
    pub fn withdraw_fees(&mut self, caller: Address) -> Result<u128, FactoryError> {
        self.require_owner(caller)?;
        let amount = self.accumulated_fees;
        if amount == 0 {
            return Ok(0);
        }
        self.settlement
            .transfer(self.fee_recipient, amount)
            .map_err(FactoryError::TransferFailed)?;
        self.accumulated_fees = 0;
        self.events.push(FactoryEvent::FeesWithdrawn {
            recipient: self.fee_recipient,
            amount,
        });
        info!(recipient = %self.fee_recipient, amount, "fees withdrawn");
        Ok(amount)
    }

    /// Emergency stop: blocks `create_token` until `unpause`.
    pub fn pause(&mut self, caller: Address) -> Result<(), FactoryError> {
        self.require_owner(caller)?;
        self.paused = true;
        self.events.push(FactoryEvent::FactoryPaused);
        warn!(factory = %self.address, "factory paused");
        Ok(())
    }

    pub fn unpause(&mut self, caller: Address) -> Result<(), FactoryError> {
        self.require_owner(caller)?;
        self.paused = false;
        self.events.push(FactoryEvent::FactoryUnpaused);
        info!(factory = %self.address, "factory unpaused");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Addresses of every token this creator deployed, in creation order.
    pub fn tokens_by_creator(&self, creator: Address) -> Vec<Address> {
        self.by_creator.get(&creator).cloned().unwrap_or_default()
    }

    /// Whether a symbol has been used by this factory instance.
    pub fn is_token_deployed(&self, symbol: &str) -> bool {
        self.symbols.contains(symbol)
    }

    pub fn deployed_records(&self) -> &[DeployedTokenRecord] {
        &self.records
    }

    pub fn get_token(&self, address: Address) -> Option<&TokenInstance> {
        self.tokens.get(&address)
    }

    pub fn get_token_mut(&mut self, address: Address) -> Option<&mut TokenInstance> {
        self.tokens.get_mut(&address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeatureFlags;

    const FACTORY_ADDR: Address = Address([0xfa; 20]);
    const OWNER: Address = Address([0x01; 20]);
    const FEE_SINK: Address = Address([0x02; 20]);
    const CREATOR: Address = Address([0xcc; 20]);
    const IMPL_BASIC: Address = Address([0xb0; 20]);
    const IMPL_MINTABLE: Address = Address([0xb1; 20]);
    const IMPL_FULL: Address = Address([0xb2; 20]);

    const FEE: u128 = 1_000;

    fn factory_with_templates() -> TokenFactory {
        let mut factory = TokenFactory::new(FACTORY_ADDR, OWNER, FEE, FEE_SINK);
        factory
            .add_template(OWNER, TemplateKind::Basic, IMPL_BASIC)
            .unwrap();
        factory
            .add_template(OWNER, TemplateKind::Mintable, IMPL_MINTABLE)
            .unwrap();
        factory
            .add_template(OWNER, TemplateKind::FullFeatured, IMPL_FULL)
            .unwrap();
        factory
    }

    fn config(symbol: &str) -> TokenConfig {
        TokenConfig {
            name: "Test Token".into(),
            symbol: symbol.into(),
            total_supply: 1_000_000,
            decimals: 18,
            initial_owner: CREATOR,
            features: FeatureFlags::default(),
            max_supply: None,
            network: Network::Base,
        }
    }

    /// Settlement that rejects every transfer.
    struct FailingSettlement;

    impl Settlement for FailingSettlement {
        fn transfer(&mut self, _to: Address, _amount: u128) -> Result<(), String> {
            Err("recipient rejected the transfer".into())
        }
    }

    #[test]
    fn basic_creation_scenario() {
        let mut factory = factory_with_templates();
        let receipt = factory.create_token(CREATOR, FEE, &config("TEST")).unwrap();

        assert_eq!(receipt.fee_paid, FEE);
        assert_eq!(receipt.refund, 0);
        assert!(factory.is_token_deployed("TEST"));
        assert_eq!(factory.total_tokens_created(), 1);
        assert_eq!(factory.accumulated_fees(), FEE);
        assert_eq!(factory.tokens_by_creator(CREATOR), vec![receipt.token_address]);

        let token = factory.get_token(receipt.token_address).unwrap();
        assert_eq!(token.template(), TemplateKind::Basic);
        assert_eq!(token.balance_of(CREATOR), 1_000_000);

        let created: Vec<_> = factory
            .events()
            .iter()
            .filter(|e| matches!(e, FactoryEvent::TokenCreated { .. }))
            .collect();
        assert_eq!(created.len(), 1);
    }

    #[test]
    fn prediction_is_stable_and_matches_deployment() {
        let mut factory = factory_with_templates();
        let cfg = config("TEST");

        let first = factory.predict_token_address(&cfg, CREATOR).unwrap();
        let second = factory.predict_token_address(&cfg, CREATOR).unwrap();
        assert_eq!(first, second);

        let receipt = factory.create_token(CREATOR, FEE, &cfg).unwrap();
        assert_eq!(receipt.token_address, first);
    }

    #[test]
    fn prediction_changes_after_a_deployment() {
        let mut factory = factory_with_templates();
        let before = factory
            .predict_token_address(&config("OTHER"), CREATOR)
            .unwrap();
        factory.create_token(CREATOR, FEE, &config("TEST")).unwrap();
        let after = factory
            .predict_token_address(&config("OTHER"), CREATOR)
            .unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn derivation_is_pure() {
        let salt = [7u8; 32];
        let a = derive_clone_address(FACTORY_ADDR, IMPL_BASIC, salt);
        let b = derive_clone_address(FACTORY_ADDR, IMPL_BASIC, salt);
        assert_eq!(a, b);
        assert_ne!(a, derive_clone_address(FACTORY_ADDR, IMPL_MINTABLE, salt));
        assert_ne!(a, derive_clone_address(FACTORY_ADDR, IMPL_BASIC, [8u8; 32]));
    }

    #[test]
    fn duplicate_symbol_rejected_without_state_change() {
        let mut factory = factory_with_templates();
        let receipt = factory.create_token(CREATOR, FEE, &config("TEST")).unwrap();

        let err = factory
            .create_token(CREATOR, FEE, &config("TEST"))
            .unwrap_err();
        assert_eq!(err, FactoryError::SymbolAlreadyExists("TEST".into()));

        // First deployment is unaffected, no new event or counter bump.
        assert_eq!(factory.total_tokens_created(), 1);
        assert!(factory.get_token(receipt.token_address).is_some());
        let created = factory
            .events()
            .iter()
            .filter(|e| matches!(e, FactoryEvent::TokenCreated { .. }))
            .count();
        assert_eq!(created, 1);
    }

    #[test]
    fn overpayment_refunded_exactly() {
        let mut factory = factory_with_templates();
        let receipt = factory
            .create_token(CREATOR, FEE + 250, &config("TEST"))
            .unwrap();

        assert_eq!(receipt.refund, 250);
        assert_eq!(receipt.fee_paid, FEE);
        // Accumulation increases by the fee, not the full payment.
        assert_eq!(factory.accumulated_fees(), FEE);
    }

    #[test]
    fn underpayment_rejected() {
        let mut factory = factory_with_templates();
        let err = factory
            .create_token(CREATOR, FEE - 1, &config("TEST"))
            .unwrap_err();
        assert_eq!(
            err,
            FactoryError::InsufficientServiceFee {
                required: FEE,
                provided: FEE - 1
            }
        );
        assert!(!factory.is_token_deployed("TEST"));
    }

    #[test]
    fn invalid_config_rejected_before_deployment() {
        let mut factory = factory_with_templates();
        let mut cfg = config("TEST");
        cfg.features.mintable = true;
        cfg.features.capped = true;
        cfg.max_supply = Some(500_000);

        let err = factory.create_token(CREATOR, FEE, &cfg).unwrap_err();
        assert!(matches!(err, FactoryError::InvalidConfiguration(_)));
        assert_eq!(factory.total_tokens_created(), 0);
    }

    #[test]
    fn missing_template_rejected() {
        let mut factory = TokenFactory::new(FACTORY_ADDR, OWNER, FEE, FEE_SINK);
        let err = factory.create_token(CREATOR, FEE, &config("TEST")).unwrap_err();
        assert_eq!(err, FactoryError::TemplateNotFound(TemplateKind::Basic));
    }

    #[test]
    fn template_selection_drives_instance() {
        let mut factory = factory_with_templates();

        let mut mintable = config("MINT");
        mintable.features.mintable = true;
        let receipt = factory.create_token(CREATOR, FEE, &mintable).unwrap();
        assert_eq!(
            factory.get_token(receipt.token_address).unwrap().template(),
            TemplateKind::Mintable
        );

        let mut full = config("FULL");
        full.features.mintable = true;
        full.features.pausable = true;
        let receipt = factory.create_token(CREATOR, FEE, &full).unwrap();
        assert_eq!(
            factory.get_token(receipt.token_address).unwrap().template(),
            TemplateKind::FullFeatured
        );
    }

    #[test]
    fn refund_failure_aborts_atomically() {
        let mut factory = factory_with_templates().with_settlement(Box::new(FailingSettlement));

        // Exact payment needs no refund, so it succeeds.
        factory.create_token(CREATOR, FEE, &config("EXACT")).unwrap();

        // Overpayment triggers a refund, which fails and must leave no trace.
        let err = factory
            .create_token(CREATOR, FEE + 1, &config("TEST"))
            .unwrap_err();
        assert!(matches!(err, FactoryError::TransferFailed(_)));
        assert!(!factory.is_token_deployed("TEST"));
        assert_eq!(factory.total_tokens_created(), 1);
        assert_eq!(factory.accumulated_fees(), FEE);
    }

    #[test]
    fn paused_factory_blocks_creation() {
        let mut factory = factory_with_templates();
        factory.pause(OWNER).unwrap();

        let err = factory.create_token(CREATOR, FEE, &config("TEST")).unwrap_err();
        assert_eq!(err, FactoryError::FactoryPaused);

        factory.unpause(OWNER).unwrap();
        factory.create_token(CREATOR, FEE, &config("TEST")).unwrap();
    }

    #[test]
    fn admin_operations_are_owner_gated() {
        let mut factory = factory_with_templates();
        assert_eq!(factory.set_service_fee(CREATOR, 5), Err(FactoryError::NotOwner));
        assert_eq!(
            factory.set_fee_recipient(CREATOR, FEE_SINK),
            Err(FactoryError::NotOwner)
        );
        assert_eq!(factory.pause(CREATOR), Err(FactoryError::NotOwner));
        assert_eq!(factory.withdraw_fees(CREATOR), Err(FactoryError::NotOwner));
    }

    #[test]
    fn set_service_fee_applies_to_next_creation() {
        let mut factory = factory_with_templates();
        factory.set_service_fee(OWNER, 2_000).unwrap();
        assert_eq!(factory.service_fee(), 2_000);

        let err = factory.create_token(CREATOR, FEE, &config("TEST")).unwrap_err();
        assert!(matches!(err, FactoryError::InsufficientServiceFee { required: 2_000, .. }));
    }

    #[test]
    fn withdraw_fees_pays_out_then_noop_at_zero() {
        let mut factory = factory_with_templates();
        factory.create_token(CREATOR, FEE, &config("TEST")).unwrap();

        assert_eq!(factory.withdraw_fees(OWNER).unwrap(), FEE);
        assert_eq!(factory.accumulated_fees(), 0);

        // Zero balance: no-op, no event.
        let events_before = factory.events().len();
        assert_eq!(factory.withdraw_fees(OWNER).unwrap(), 0);
        assert_eq!(factory.events().len(), events_before);
    }

    #[test]
    fn withdraw_failure_keeps_balance() {
        let mut factory = factory_with_templates();
        factory.create_token(CREATOR, FEE, &config("TEST")).unwrap();

        let mut factory = factory.with_settlement(Box::new(FailingSettlement));
        let err = factory.withdraw_fees(OWNER).unwrap_err();
        assert!(matches!(err, FactoryError::TransferFailed(_)));
        assert_eq!(factory.accumulated_fees(), FEE);
    }

    #[test]
    fn created_token_is_mutable_through_factory() {
        let mut factory = factory_with_templates();
        let mut cfg = config("MINT");
        cfg.features.mintable = true;
        let receipt = factory.create_token(CREATOR, FEE, &cfg).unwrap();

        let token = factory.get_token_mut(receipt.token_address).unwrap();
        token.mint(CREATOR, CREATOR, 500).unwrap();
        assert_eq!(token.total_supply(), 1_000_500);
    }

    #[test]
    fn records_carry_config_hash() {
        let mut factory = factory_with_templates();
        let cfg = config("TEST");
        factory.create_token(CREATOR, FEE, &cfg).unwrap();

        let record = &factory.deployed_records()[0];
        assert_eq!(record.symbol, "TEST");
        assert_eq!(record.network, Network::Base);
        assert_eq!(record.config_hash, hex::encode(config_hash(&cfg)));
    }
}
