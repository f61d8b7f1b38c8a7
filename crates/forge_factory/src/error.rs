//! Factory and token error types.

use crate::template::TemplateKind;

/// Errors from the factory surface.
///
/// Configuration, fee, and uniqueness failures abort the whole call with no
/// partial state change; none of them is retried automatically.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FactoryError {
    /// The requested configuration failed validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The attached payment does not cover the service fee.
    #[error("Insufficient service fee: required {required}, provided {provided}")]
    InsufficientServiceFee { required: u128, provided: u128 },

    /// The symbol has already been used by this factory instance.
    #[error("Symbol already exists: {0}")]
    SymbolAlreadyExists(String),

    /// No implementation is registered for the selected template.
    #[error("Template not found: {0}")]
    TemplateNotFound(TemplateKind),

    /// A non-owner called an owner-only operation.
    #[error("Caller is not the owner")]
    NotOwner,

    /// The factory's emergency stop is engaged.
    #[error("Factory is paused")]
    FactoryPaused,

    /// The overpayment refund (or fee withdrawal) transfer failed.
    #[error("Value transfer failed: {0}")]
    TransferFailed(String),

    /// The implementation address must be non-zero.
    #[error("Implementation address must not be zero")]
    ZeroImplementation,
}

/// Errors from a deployed token instance.
///
/// A call to a disabled feature fails with [`TokenError::FeatureNotEnabled`],
/// never a generic error, so callers can distinguish "feature off" from
/// "bad input".
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TokenError {
    /// The required feature flag was not enabled at initialization.
    #[error("Feature not enabled: {0}")]
    FeatureNotEnabled(&'static str),

    /// Transfers are paused.
    #[error("Token is paused")]
    Paused,

    /// Minting would push total supply over the cap.
    #[error("Cap exceeded: cap {cap}, attempted total {attempted}")]
    CapExceeded { cap: u128, attempted: u128 },

    /// The zero address is not a valid target.
    #[error("Zero address is not allowed")]
    ZeroAddress,

    /// A non-owner called an owner-only operation.
    #[error("Caller is not the token owner")]
    NotOwner,

    /// The sender's balance does not cover the amount.
    #[error("Insufficient balance: have {available}, need {needed}")]
    InsufficientBalance { available: u128, needed: u128 },

    /// The spender's allowance does not cover the amount.
    #[error("Insufficient allowance: have {available}, need {needed}")]
    InsufficientAllowance { available: u128, needed: u128 },
}
