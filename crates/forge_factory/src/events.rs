//! Factory events.
//!
//! Event names are the wire contract and are preserved exactly; off-chain
//! consumers match on the variant name in the serialized form.

use forge_core::Address;
use serde::{Deserialize, Serialize};

use crate::template::TemplateKind;

/// An entry in the factory's append-only event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FactoryEvent {
    /// A token was created. `config_hash` covers the full configuration so
    /// auditors can verify it without the factory storing the struct.
    TokenCreated {
        token: Address,
        creator: Address,
        name: String,
        symbol: String,
        total_supply: u128,
        decimals: u8,
        config_hash: String,
    },
    /// A template implementation was registered or overwritten.
    TemplateUpdated {
        kind: TemplateKind,
        implementation: Address,
    },
    /// A template implementation was removed.
    TemplateRemoved { kind: TemplateKind },
    /// The service fee changed.
    ServiceFeeUpdated { fee: u128 },
    /// The fee recipient changed.
    FeeRecipientUpdated { recipient: Address },
    /// Accumulated fees were paid out.
    FeesWithdrawn { recipient: Address, amount: u128 },
    /// The factory-wide emergency stop was engaged.
    FactoryPaused,
    /// The factory-wide emergency stop was released.
    FactoryUnpaused,
}
