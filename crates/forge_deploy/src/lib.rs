// Off-chain deployment orchestration: monitoring, per-network coordination,
// and multi-network fan-out.

pub mod coordinator;
pub mod error;
pub mod gas;
pub mod monitor;
pub mod orchestrator;
pub mod provider;

// Re-export primary types for convenient access.
pub use coordinator::{
    ChainDeploymentCoordinator, ChainDeploymentState, DeployPhase, DeploymentCallbacks,
    DeploymentRequest,
};
pub use error::DeployError;
pub use gas::{CostEstimate, estimate_cost, estimate_deployment_gas};
pub use monitor::{MonitorStats, TransactionMonitor, TransactionRecord, TxFailureReason, TxStatus};
pub use orchestrator::{DeploymentStrategy, DeploymentTarget, MultiChainOrchestrator, MultiChainResult};
pub use provider::{NetworkQuery, RpcClient, Signer, TxReceipt, TxRequest};
