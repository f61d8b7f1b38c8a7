//! Multi-network deployment orchestration.
//!
//! Runs one [`ChainDeploymentCoordinator`] per target network. Networks are
//! independent: there is no cross-chain atomicity, and the optional rollback
//! is bookkeeping only — it relabels completed deployments, it cannot undo
//! them on-chain.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use forge_core::{Address, Network, PolicyStore};
use forge_factory::TokenConfig;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::coordinator::{
    ChainDeploymentCoordinator, ChainDeploymentState, DeployPhase, DeploymentCallbacks,
    DeploymentRequest,
};
use crate::error::DeployError;
use crate::gas::estimate_cost;
use crate::monitor::TransactionMonitor;
use crate::provider::{NetworkQuery, Signer};

/// How the per-network coordinators are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStrategy {
    /// All coordinators start concurrently; no ordering between networks.
    Parallel,
    /// One coordinator at a time, in target-list order.
    Sequential,
    /// Cheapest estimated network first, then sequential semantics.
    Optimized,
}

/// One network's deployment order within a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentTarget {
    pub network: Network,
    pub config: TokenConfig,
    /// Predicted contract address, if the caller ran a prediction.
    pub predicted_address: Option<Address>,
    /// Observed base gas price on this network.
    pub base_gas_price_gwei: u64,
}

/// Aggregated outcome of one batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiChainResult {
    pub batch_id: String,
    pub states: HashMap<Network, ChainDeploymentState>,
    pub succeeded: Vec<Network>,
    pub failed: Vec<Network>,
    pub rolled_back: Vec<Network>,
    /// Actual cost across deployments that ran to completion.
    pub total_cost_wei: u128,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Deploys one token configuration per target network.
pub struct MultiChainOrchestrator {
    factory_address: Address,
    policies: PolicyStore,
    monitor: TransactionMonitor,
    signer: Arc<dyn Signer>,
    queries: HashMap<Network, Arc<dyn NetworkQuery>>,
    callbacks: DeploymentCallbacks,
    service_fee: u128,
    coordinators: HashMap<Network, Arc<ChainDeploymentCoordinator>>,
}

impl MultiChainOrchestrator {
    pub fn new(
        factory_address: Address,
        policies: PolicyStore,
        signer: Arc<dyn Signer>,
        service_fee: u128,
    ) -> Self {
        let monitor = TransactionMonitor::new(policies.clone());
        Self {
            factory_address,
            policies,
            monitor,
            signer,
            queries: HashMap::new(),
            callbacks: DeploymentCallbacks::default(),
            service_fee,
            coordinators: HashMap::new(),
        }
    }

    pub fn with_callbacks(mut self, callbacks: DeploymentCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Register the query provider for a network. Targets without one are
    /// rejected at deploy time.
    pub fn add_network_query(&mut self, network: Network, query: Arc<dyn NetworkQuery>) {
        self.queries.insert(network, query);
    }

    /// The shared transaction monitor.
    pub fn monitor(&self) -> &TransactionMonitor {
        &self.monitor
    }

    /// State snapshot of one network's coordinator from the current batch.
    pub async fn chain_state(&self, network: Network) -> Option<ChainDeploymentState> {
        match self.coordinators.get(&network) {
            Some(coordinator) => Some(coordinator.state().await),
            None => None,
        }
    }

    /// Drop all coordinator state from the previous batch.
    pub fn reset(&mut self) {
        self.coordinators.clear();
    }

    fn validate_targets(&self, targets: &[DeploymentTarget]) -> Result<(), DeployError> {
        if targets.is_empty() {
            return Err(DeployError::InvalidTransaction(
                "no deployment targets".into(),
            ));
        }
        let mut seen = HashSet::new();
        for target in targets {
            if !seen.insert(target.network) {
                return Err(DeployError::InvalidTransaction(format!(
                    "duplicate target network: {}",
                    target.network
                )));
            }
            if !self.queries.contains_key(&target.network) {
                return Err(DeployError::UnsupportedNetwork(target.network));
            }
        }
        Ok(())
    }

    fn request_for(&self, target: &DeploymentTarget) -> DeploymentRequest {
        DeploymentRequest {
            config: target.config.clone(),
            factory_address: self.factory_address,
            predicted_address: target.predicted_address,
            service_fee: self.service_fee,
            base_gas_price_gwei: target.base_gas_price_gwei,
        }
    }

    /// Deploy to every target under the chosen strategy.
    ///
    /// Failures are local to their network. In sequential mode with
    /// `rollback_on_failure`, a failure stops the batch and relabels every
    /// already-completed deployment as rolled back; without it, the
    /// remaining targets still run. Rollback never applies in parallel mode.
    pub async fn deploy(
        &mut self,
        targets: Vec<DeploymentTarget>,
        strategy: DeploymentStrategy,
        rollback_on_failure: bool,
    ) -> Result<MultiChainResult, DeployError> {
        self.validate_targets(&targets)?;

        let batch_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        info!(
            batch = %batch_id,
            networks = targets.len(),
            ?strategy,
            rollback_on_failure,
            "starting multi-chain deployment"
        );

        self.coordinators.clear();
        let shared_gate = Arc::new(Mutex::new(()));
        for target in &targets {
            let mut coordinator = ChainDeploymentCoordinator::new(
                target.network,
                self.policies.policy(target.network),
                self.monitor.clone(),
            )
            .with_callbacks(self.callbacks.clone());
            if strategy == DeploymentStrategy::Parallel {
                coordinator = coordinator.with_signer_gate(Arc::clone(&shared_gate));
            }
            self.coordinators
                .insert(target.network, Arc::new(coordinator));
        }

        match strategy {
            DeploymentStrategy::Parallel => self.run_parallel(&targets).await,
            DeploymentStrategy::Sequential => {
                self.run_sequential(&targets, rollback_on_failure).await;
            }
            DeploymentStrategy::Optimized => {
                let ordered = order_targets_by_cost(&self.policies, targets.clone());
                self.run_sequential(&ordered, rollback_on_failure).await;
            }
        }

        Ok(self.collect_result(batch_id, started_at).await)
    }

    async fn run_parallel(&self, targets: &[DeploymentTarget]) {
        let runs = targets.iter().map(|target| {
            let coordinator = Arc::clone(&self.coordinators[&target.network]);
            let request = self.request_for(target);
            let signer = Arc::clone(&self.signer);
            let query = Arc::clone(&self.queries[&target.network]);
            async move {
                // A failure here is already recorded in the coordinator's
                // state; sibling networks are unaffected.
                let _ = coordinator
                    .run(&request, signer.as_ref(), query.as_ref())
                    .await;
            }
        });
        futures::future::join_all(runs).await;
    }

    async fn run_sequential(&self, targets: &[DeploymentTarget], rollback_on_failure: bool) {
        let mut completed: Vec<Network> = Vec::new();
        for target in targets {
            let coordinator = &self.coordinators[&target.network];
            let request = self.request_for(target);
            let result = coordinator
                .run(&request, self.signer.as_ref(), self.queries[&target.network].as_ref())
                .await;

            match result {
                Ok(_) => completed.push(target.network),
                Err(e) => {
                    warn!(network = %target.network, error = %e, "sequential deployment failed");
                    if rollback_on_failure {
                        self.rollback(&completed).await;
                        break;
                    }
                }
            }
        }
    }

    /// Relabel completed deployments in this batch. Label-only: the deployed
    /// contracts still exist on their networks.
    async fn rollback(&self, completed: &[Network]) {
        for network in completed {
            if let Some(coordinator) = self.coordinators.get(network) {
                if let Err(e) = coordinator.mark_rolled_back().await {
                    warn!(network = %network, error = %e, "rollback relabel failed");
                }
            }
        }
    }

    async fn collect_result(&self, batch_id: String, started_at: DateTime<Utc>) -> MultiChainResult {
        let mut states = HashMap::new();
        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        let mut rolled_back = Vec::new();
        let mut total_cost_wei = 0u128;

        for (network, coordinator) in &self.coordinators {
            let state = coordinator.state().await;
            match state.phase {
                DeployPhase::Completed => succeeded.push(*network),
                DeployPhase::Failed => failed.push(*network),
                DeployPhase::RolledBack => rolled_back.push(*network),
                _ => {}
            }
            if state.completed_at.is_some() {
                total_cost_wei += state.cost_wei.unwrap_or(0);
            }
            states.insert(*network, state);
        }

        succeeded.sort_by_key(|n| n.chain_id());
        failed.sort_by_key(|n| n.chain_id());
        rolled_back.sort_by_key(|n| n.chain_id());

        let result = MultiChainResult {
            batch_id,
            states,
            succeeded,
            failed,
            rolled_back,
            total_cost_wei,
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            batch = %result.batch_id,
            succeeded = result.succeeded.len(),
            failed = result.failed.len(),
            rolled_back = result.rolled_back.len(),
            "multi-chain deployment finished"
        );
        result
    }
}

/// Order targets by estimated deployment cost, cheapest first.
fn order_targets_by_cost(
    policies: &PolicyStore,
    mut targets: Vec<DeploymentTarget>,
) -> Vec<DeploymentTarget> {
    targets.sort_by_key(|target| {
        estimate_cost(
            &target.config,
            &policies.policy(target.network),
            target.base_gas_price_gwei,
        )
        .total_cost_wei
    });
    targets
}
