//! Per-network deployment coordinator.
//!
//! [`ChainDeploymentCoordinator`] drives one deployment through a strict
//! forward sequence: prepare the signer, estimate cost, submit, monitor to
//! confirmation, optionally verify, complete. `Failed` is reachable from any
//! non-terminal phase; `RolledBack` only from `Completed`, and only by an
//! orchestrator-level decision.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use forge_core::{Address, Network, NetworkPolicy};
use forge_factory::TokenConfig;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::error::DeployError;
use crate::gas::estimate_cost;
use crate::monitor::{TransactionMonitor, TxFailureReason, TxStatus};
use crate::provider::{NetworkQuery, Signer, TxRequest};

const WEI_PER_GWEI: u128 = 1_000_000_000;

/// Phase of one per-network deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployPhase {
    Idle,
    Preparing,
    Estimating,
    Deploying,
    Verifying,
    Completed,
    Failed,
    RolledBack,
}

impl DeployPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeployPhase::Completed | DeployPhase::Failed | DeployPhase::RolledBack
        )
    }
}

/// Observable state of one deployment on one network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainDeploymentState {
    pub network: Network,
    pub phase: DeployPhase,
    /// 0-100, monotonically increasing within one attempt.
    pub progress: u8,
    pub current_step: String,
    pub tx_hash: Option<String>,
    pub contract_address: Option<Address>,
    pub gas_estimate: Option<u64>,
    pub cost_wei: Option<u128>,
    pub error: Option<String>,
    pub can_retry: bool,
    pub retry_count: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ChainDeploymentState {
    fn new(network: Network) -> Self {
        Self {
            network,
            phase: DeployPhase::Idle,
            progress: 0,
            current_step: "Idle".into(),
            tx_hash: None,
            contract_address: None,
            gas_estimate: None,
            cost_wei: None,
            error: None,
            can_retry: false,
            retry_count: 0,
            started_at: None,
            completed_at: None,
        }
    }
}

/// One deployment order for a coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRequest {
    pub config: TokenConfig,
    /// The factory the deployment transaction calls into.
    pub factory_address: Address,
    /// Address predicted before submission, used when the receipt does not
    /// carry one.
    pub predicted_address: Option<Address>,
    /// Service fee attached as transaction value.
    pub service_fee: u128,
    /// Observed base gas price, before the policy multiplier.
    pub base_gas_price_gwei: u64,
}

pub type ProgressHandler = Arc<dyn Fn(u8, &str) + Send + Sync>;
pub type SubmittedHandler = Arc<dyn Fn(&str, Network) + Send + Sync>;
pub type CompletedHandler = Arc<dyn Fn(Network, &ChainDeploymentState) + Send + Sync>;
pub type ErrorHandler = Arc<dyn Fn(Network, &str) + Send + Sync>;

/// Outward progress/result callbacks.
#[derive(Clone, Default)]
pub struct DeploymentCallbacks {
    pub on_progress: Option<ProgressHandler>,
    pub on_transaction_submitted: Option<SubmittedHandler>,
    pub on_chain_completed: Option<CompletedHandler>,
    pub on_error: Option<ErrorHandler>,
}

/// Drives one deployment on one network.
pub struct ChainDeploymentCoordinator {
    network: Network,
    policy: NetworkPolicy,
    monitor: TransactionMonitor,
    state: Arc<RwLock<ChainDeploymentState>>,
    callbacks: DeploymentCallbacks,
    /// Held from network switch through submission when a signer is shared
    /// across concurrently running coordinators.
    signer_gate: Option<Arc<Mutex<()>>>,
}

impl ChainDeploymentCoordinator {
    pub fn new(network: Network, policy: NetworkPolicy, monitor: TransactionMonitor) -> Self {
        Self {
            network,
            policy,
            monitor,
            state: Arc::new(RwLock::new(ChainDeploymentState::new(network))),
            callbacks: DeploymentCallbacks::default(),
            signer_gate: None,
        }
    }

    pub fn with_callbacks(mut self, callbacks: DeploymentCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn with_signer_gate(mut self, gate: Arc<Mutex<()>>) -> Self {
        self.signer_gate = Some(gate);
        self
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Snapshot of the current state.
    pub async fn state(&self) -> ChainDeploymentState {
        self.state.read().await.clone()
    }

    /// Clear the state back to `Idle`, keeping nothing from prior attempts.
    pub async fn reset(&self) {
        *self.state.write().await = ChainDeploymentState::new(self.network);
    }

    /// Relabel a completed deployment as rolled back. Bookkeeping only: the
    /// deployed contract is untouched on-chain.
    pub async fn mark_rolled_back(&self) -> Result<(), DeployError> {
        let mut state = self.state.write().await;
        if state.phase != DeployPhase::Completed {
            return Err(DeployError::InvalidTransaction(
                "only completed deployments can be rolled back".into(),
            ));
        }
        state.phase = DeployPhase::RolledBack;
        state.current_step = "Rolled back".into();
        warn!(network = %self.network, "deployment relabeled as rolled back");
        Ok(())
    }

    async fn set_phase(&self, phase: DeployPhase, progress: u8, step: &str) {
        let progress = {
            let mut state = self.state.write().await;
            state.phase = phase;
            state.progress = state.progress.max(progress);
            state.current_step = step.to_string();
            state.progress
        };
        info!(network = %self.network, ?phase, progress, step, "deployment progress");
        if let Some(on_progress) = &self.callbacks.on_progress {
            on_progress(progress, step);
        }
    }

    async fn fail(&self, error: DeployError, can_retry: bool) -> DeployError {
        let message = error.to_string();
        {
            let mut state = self.state.write().await;
            state.phase = DeployPhase::Failed;
            state.current_step = "Failed".into();
            state.error = Some(message.clone());
            state.can_retry = can_retry;
        }
        warn!(network = %self.network, error = %message, can_retry, "deployment failed");
        if let Some(on_error) = &self.callbacks.on_error {
            on_error(self.network, &message);
        }
        error
    }

    /// Run one deployment to a terminal phase.
    ///
    /// Returns the final state on success. On failure the error is also
    /// recorded in the state together with whether a retry makes sense.
    /// Calling `run` again after a retryable failure starts a fresh attempt
    /// and increments `retry_count`.
    pub async fn run(
        &self,
        request: &DeploymentRequest,
        signer: &dyn Signer,
        query: &dyn NetworkQuery,
    ) -> Result<ChainDeploymentState, DeployError> {
        {
            let mut state = self.state.write().await;
            match state.phase {
                DeployPhase::Idle => {}
                DeployPhase::Failed if state.can_retry => {
                    let retry_count = state.retry_count + 1;
                    *state = ChainDeploymentState::new(self.network);
                    state.retry_count = retry_count;
                }
                _ => {
                    return Err(DeployError::InvalidTransaction(format!(
                        "deployment is {:?}, not restartable",
                        state.phase
                    )));
                }
            }
            state.started_at = Some(Utc::now());
        }

        let timeout = std::time::Duration::from_secs(self.policy.deployment_timeout_secs);
        match tokio::time::timeout(timeout, self.run_inner(request, signer, query)).await {
            Ok(Ok(())) => Ok(self.state().await),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(self
                .fail(
                    DeployError::Timeout {
                        operation: "deployment".into(),
                        secs: self.policy.deployment_timeout_secs,
                    },
                    true,
                )
                .await),
        }
    }

    async fn run_inner(
        &self,
        request: &DeploymentRequest,
        signer: &dyn Signer,
        query: &dyn NetworkQuery,
    ) -> Result<(), DeployError> {
        // Preparing: signer connected and on the target network.
        self.set_phase(DeployPhase::Preparing, 5, "Connecting signer").await;

        // A shared signer is serialized from here through submission; the
        // network switch is itself the serialization boundary.
        let gate = match &self.signer_gate {
            Some(gate) => Some(gate.clone().lock_owned().await),
            None => None,
        };

        if let Err(e) = signer.connect().await {
            return Err(self.fail(e, true).await);
        }
        let active = match signer.active_network().await {
            Ok(active) => active,
            Err(e) => return Err(self.fail(e, true).await),
        };
        if active != self.network {
            self.set_phase(DeployPhase::Preparing, 10, "Switching network").await;
            if let Err(e) = signer.switch_network(self.network).await {
                let error = DeployError::NetworkSwitchFailed {
                    network: self.network,
                    reason: e.to_string(),
                };
                return Err(self.fail(error, true).await);
            }
        }

        // Estimating: price the deployment and check the signer can afford it.
        self.set_phase(DeployPhase::Estimating, 25, "Estimating deployment cost")
            .await;
        let estimate = estimate_cost(&request.config, &self.policy, request.base_gas_price_gwei);
        {
            let mut state = self.state.write().await;
            state.gas_estimate = Some(estimate.gas_limit);
            state.cost_wei = Some(estimate.total_cost_wei);
        }
        let balance = match signer.get_balance().await {
            Ok(balance) => balance,
            Err(e) => return Err(self.fail(e, true).await),
        };
        let needed = estimate.total_cost_wei + request.service_fee;
        if balance < needed {
            let error = DeployError::InsufficientFunds {
                needed,
                available: balance,
            };
            return Err(self.fail(error, true).await);
        }

        // Deploying: submit, then hand the hash to the monitor.
        self.set_phase(DeployPhase::Deploying, 40, "Submitting deployment transaction")
            .await;
        let tx_request = TxRequest {
            to: Some(request.factory_address),
            value: request.service_fee,
            data: deployment_calldata(&request.config),
            gas_limit: estimate.gas_limit,
            gas_price_gwei: estimate.gas_price_gwei,
        };
        let tx_hash = match signer.send_transaction(tx_request.clone()).await {
            Ok(hash) => hash,
            Err(e) => {
                let error = DeployError::SubmissionFailed(e.to_string());
                return Err(self.fail(error, true).await);
            }
        };
        drop(gate);

        self.state.write().await.tx_hash = Some(tx_hash.clone());
        if let Some(on_submitted) = &self.callbacks.on_transaction_submitted {
            on_submitted(&tx_hash, self.network);
        }
        self.set_phase(DeployPhase::Deploying, 60, "Waiting for confirmations")
            .await;

        self.monitor
            .track(self.network, &tx_hash, Some(tx_request))
            .await;
        let record = self.monitor.watch(self.network, &tx_hash, query).await?;
        if record.status != TxStatus::Confirmed {
            let can_retry = record.status != TxStatus::Cancelled;
            return Err(self.fail(monitor_outcome_error(&record.status, &record), can_retry).await);
        }
        self.set_phase(DeployPhase::Deploying, 85, "Transaction confirmed")
            .await;

        // Verifying: wait out short-lived reorganizations, then re-check.
        if self.policy.verification_delay_secs > 0 {
            self.set_phase(DeployPhase::Verifying, 90, "Verifying deployment")
                .await;
            tokio::time::sleep(std::time::Duration::from_secs(
                self.policy.verification_delay_secs,
            ))
            .await;
        }
        let receipt = match query.transaction_receipt(&tx_hash).await {
            Ok(Some(receipt)) => receipt,
            Ok(None) => return Err(self.fail(DeployError::TransactionDropped, true).await),
            Err(e) => return Err(self.fail(e, true).await),
        };
        if !receipt.status {
            let error = DeployError::TransactionReverted("execution reverted".into());
            return Err(self.fail(error, true).await);
        }

        // Completed.
        {
            let mut state = self.state.write().await;
            state.contract_address = receipt.contract_address.or(request.predicted_address);
            state.cost_wei =
                Some(receipt.gas_used as u128 * estimate.gas_price_gwei as u128 * WEI_PER_GWEI);
            state.completed_at = Some(Utc::now());
        }
        self.set_phase(DeployPhase::Completed, 100, "Deployment complete")
            .await;

        let state = self.state().await;
        info!(
            network = %self.network,
            contract = ?state.contract_address,
            cost_wei = ?state.cost_wei,
            "deployment completed"
        );
        if let Some(on_completed) = &self.callbacks.on_chain_completed {
            on_completed(self.network, &state);
        }
        Ok(())
    }
}

/// Calldata for the factory's create call.
fn deployment_calldata(config: &TokenConfig) -> Vec<u8> {
    serde_json::to_vec(config).expect("config serializes")
}

fn monitor_outcome_error(
    status: &TxStatus,
    record: &crate::monitor::TransactionRecord,
) -> DeployError {
    match status {
        TxStatus::Dropped => DeployError::TransactionDropped,
        TxStatus::Cancelled => DeployError::Cancelled,
        TxStatus::Replaced => DeployError::TransactionReplaced(
            record.replaced_by.clone().unwrap_or_default(),
        ),
        _ => match &record.failure {
            Some(TxFailureReason::Reverted(reason)) => {
                DeployError::TransactionReverted(reason.clone())
            }
            Some(TxFailureReason::ConfirmationTimeout { secs }) => DeployError::Timeout {
                operation: "confirmation".into(),
                secs: *secs,
            },
            Some(TxFailureReason::RetriesExhausted { attempts }) => {
                DeployError::MonitoringExhausted {
                    attempts: *attempts,
                }
            }
            None => DeployError::SubmissionFailed("transaction failed".into()),
        },
    }
}
