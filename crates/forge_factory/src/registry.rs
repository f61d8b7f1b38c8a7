//! Owner-managed template registry.

use std::collections::HashMap;

use forge_core::Address;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::FactoryError;
use crate::events::FactoryEvent;
use crate::template::TemplateKind;

/// Maps template kinds to implementation addresses.
///
/// Invariant: a kind maps to at most one non-zero implementation at a time,
/// and the enumeration list never contains duplicates. Mutations are
/// owner-only and return the event they emit so the owning factory can
/// append it to its log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateRegistry {
    owner: Address,
    templates: HashMap<TemplateKind, Address>,
    kinds: Vec<TemplateKind>,
}

impl TemplateRegistry {
    /// Create an empty registry owned by `owner`.
    pub fn new(owner: Address) -> Self {
        Self {
            owner,
            templates: HashMap::new(),
            kinds: Vec::new(),
        }
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    fn require_owner(&self, caller: Address) -> Result<(), FactoryError> {
        if caller == self.owner {
            Ok(())
        } else {
            Err(FactoryError::NotOwner)
        }
    }

    /// Register an implementation for a template kind.
    ///
    /// Idempotent on re-registration: the implementation is overwritten and
    /// the enumeration list is not duplicated.
    pub fn add_template(
        &mut self,
        caller: Address,
        kind: TemplateKind,
        implementation: Address,
    ) -> Result<FactoryEvent, FactoryError> {
        self.require_owner(caller)?;
        if implementation.is_zero() {
            return Err(FactoryError::ZeroImplementation);
        }

        if self.templates.insert(kind, implementation).is_none() {
            self.kinds.push(kind);
        }
        info!(template = %kind, implementation = %implementation, "template registered");
        Ok(FactoryEvent::TemplateUpdated {
            kind,
            implementation,
        })
    }

    /// Remove a template kind. Fails if it was never registered.
    pub fn remove_template(
        &mut self,
        caller: Address,
        kind: TemplateKind,
    ) -> Result<FactoryEvent, FactoryError> {
        self.require_owner(caller)?;
        if self.templates.remove(&kind).is_none() {
            return Err(FactoryError::TemplateNotFound(kind));
        }
        self.kinds.retain(|k| *k != kind);
        info!(template = %kind, "template removed");
        Ok(FactoryEvent::TemplateRemoved { kind })
    }

    /// Implementation address for a kind, if registered.
    pub fn get_template(&self, kind: TemplateKind) -> Option<Address> {
        self.templates.get(&kind).copied()
    }

    /// Registered kinds in registration order.
    pub fn template_kinds(&self) -> &[TemplateKind] {
        &self.kinds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: Address = Address([0x01; 20]);
    const INTRUDER: Address = Address([0x02; 20]);
    const IMPL_A: Address = Address([0xa1; 20]);
    const IMPL_B: Address = Address([0xa2; 20]);

    #[test]
    fn add_and_get() {
        let mut registry = TemplateRegistry::new(OWNER);
        let event = registry
            .add_template(OWNER, TemplateKind::Basic, IMPL_A)
            .unwrap();
        assert_eq!(
            event,
            FactoryEvent::TemplateUpdated {
                kind: TemplateKind::Basic,
                implementation: IMPL_A
            }
        );
        assert_eq!(registry.get_template(TemplateKind::Basic), Some(IMPL_A));
        assert_eq!(registry.get_template(TemplateKind::Mintable), None);
    }

    #[test]
    fn re_registration_overwrites_without_duplicating() {
        let mut registry = TemplateRegistry::new(OWNER);
        registry
            .add_template(OWNER, TemplateKind::Basic, IMPL_A)
            .unwrap();
        registry
            .add_template(OWNER, TemplateKind::Basic, IMPL_B)
            .unwrap();

        assert_eq!(registry.get_template(TemplateKind::Basic), Some(IMPL_B));
        assert_eq!(registry.template_kinds(), &[TemplateKind::Basic]);
    }

    #[test]
    fn remove_unregistered_fails() {
        let mut registry = TemplateRegistry::new(OWNER);
        let err = registry
            .remove_template(OWNER, TemplateKind::FullFeatured)
            .unwrap_err();
        assert_eq!(err, FactoryError::TemplateNotFound(TemplateKind::FullFeatured));
    }

    #[test]
    fn remove_clears_enumeration_entry() {
        let mut registry = TemplateRegistry::new(OWNER);
        registry
            .add_template(OWNER, TemplateKind::Basic, IMPL_A)
            .unwrap();
        registry
            .add_template(OWNER, TemplateKind::Mintable, IMPL_B)
            .unwrap();

        let event = registry.remove_template(OWNER, TemplateKind::Basic).unwrap();
        assert_eq!(event, FactoryEvent::TemplateRemoved { kind: TemplateKind::Basic });
        assert_eq!(registry.template_kinds(), &[TemplateKind::Mintable]);
        assert_eq!(registry.get_template(TemplateKind::Basic), None);
    }

    #[test]
    fn non_owner_mutations_rejected() {
        let mut registry = TemplateRegistry::new(OWNER);
        assert_eq!(
            registry.add_template(INTRUDER, TemplateKind::Basic, IMPL_A),
            Err(FactoryError::NotOwner)
        );
        registry
            .add_template(OWNER, TemplateKind::Basic, IMPL_A)
            .unwrap();
        assert_eq!(
            registry.remove_template(INTRUDER, TemplateKind::Basic),
            Err(FactoryError::NotOwner)
        );
    }

    #[test]
    fn zero_implementation_rejected() {
        let mut registry = TemplateRegistry::new(OWNER);
        assert_eq!(
            registry.add_template(OWNER, TemplateKind::Basic, Address::ZERO),
            Err(FactoryError::ZeroImplementation)
        );
    }
}
