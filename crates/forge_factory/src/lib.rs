// On-chain token factory subsystem, modeled as explicitly owned state.

pub mod config;
pub mod error;
pub mod events;
pub mod factory;
pub mod registry;
pub mod template;

// Re-export primary types for convenient access.
pub use config::{FeatureFlags, TokenConfig, config_hash, validate_config};
pub use error::{FactoryError, TokenError};
pub use events::FactoryEvent;
pub use factory::{
    CreateReceipt, DeployedTokenRecord, NoopSettlement, Settlement, TokenFactory,
    derive_clone_address,
};
pub use registry::TemplateRegistry;
pub use template::{TemplateKind, TokenInstance, select_template};
