//! Deployment orchestration error types.

use forge_core::Network;

/// Errors that can occur while orchestrating a deployment.
///
/// Variants are grouped by the spec's taxonomy: network errors carry a
/// suggested remedy in their message, transaction-lifecycle errors stay
/// distinguishable so callers can offer retry vs. speed-up vs. give up, and
/// economic errors are surfaced without automatic retry.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DeployError {
    /// No query provider or policy is known for the target network.
    #[error("Unsupported network: {0}")]
    UnsupportedNetwork(Network),

    /// The signer is not connected.
    #[error("Signer not connected")]
    SignerNotConnected,

    /// Switching the signer to the target network failed.
    #[error("Failed to switch to {network}: {reason}")]
    NetworkSwitchFailed { network: Network, reason: String },

    /// The signer cannot afford the deployment.
    #[error("Insufficient funds: need {needed} wei, have {available} wei")]
    InsufficientFunds { needed: u128, available: u128 },

    /// Broadcasting the transaction failed.
    #[error("Transaction submission failed: {0}")]
    SubmissionFailed(String),

    /// The transaction was mined but reverted.
    #[error("Transaction reverted: {0}")]
    TransactionReverted(String),

    /// The transaction disappeared from the network.
    #[error("Transaction dropped")]
    TransactionDropped,

    /// The transaction was replaced by another (speed-up or cancel).
    #[error("Transaction replaced by {0}")]
    TransactionReplaced(String),

    /// Status monitoring gave up after exhausting its retry budget.
    #[error("Monitoring failed after max retries ({attempts} attempts)")]
    MonitoringExhausted { attempts: u32 },

    /// A policy timeout elapsed. Distinct from an explicit network error.
    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },

    /// Tracking was cancelled by the caller.
    #[error("Cancelled")]
    Cancelled,

    /// The RPC endpoint returned an error or unparseable response.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// The operation is not valid for the transaction's current status.
    #[error("Invalid transaction state: {0}")]
    InvalidTransaction(String),
}
