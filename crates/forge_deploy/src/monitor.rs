//! Transaction monitor — polls submitted transactions to completion.
//!
//! Each poll is independent and idempotent: the monitor queries the receipt
//! and latest block through the [`NetworkQuery`] seam, so the same loop runs
//! against a live endpoint or a scripted one in tests. Aggregate statistics
//! are recomputed from the full record set on read rather than maintained
//! incrementally, so they cannot drift.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use forge_core::{Network, PolicyStore};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::DeployError;
use crate::provider::{NetworkQuery, Signer, TxRequest};

/// Lifecycle status of a tracked transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed,
    Dropped,
    Replaced,
    Cancelled,
}

impl TxStatus {
    /// Whether the status is final.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TxStatus::Pending)
    }
}

/// Why a tracked transaction ended up `Failed`. The variants stay
/// distinguishable so the caller can offer retry vs. speed-up vs. give up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TxFailureReason {
    /// The transaction was mined but execution reverted.
    Reverted(String),
    /// No confirmation within the policy window.
    ConfirmationTimeout { secs: u64 },
    /// Status queries kept failing until the retry budget ran out.
    RetriesExhausted { attempts: u32 },
}

impl fmt::Display for TxFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxFailureReason::Reverted(reason) => write!(f, "transaction reverted: {reason}"),
            TxFailureReason::ConfirmationTimeout { secs } => {
                write!(f, "confirmation timeout after {secs}s")
            }
            TxFailureReason::RetriesExhausted { attempts } => {
                write!(f, "monitoring failed after max retries ({attempts} attempts)")
            }
        }
    }
}

/// Bookkeeping for one tracked transaction, keyed by (network, hash).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub network: Network,
    pub tx_hash: String,
    pub status: TxStatus,
    pub confirmations: u32,
    pub required_confirmations: u32,
    pub retry_count: u32,
    pub max_retries: u32,
    /// Hash of the replacement transaction, if this one was sped up.
    pub replaced_by: Option<String>,
    pub failure: Option<TxFailureReason>,
    /// Original request, kept so a speed-up can rebuild it at a higher fee.
    pub request: Option<TxRequest>,
    pub submitted_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl TransactionRecord {
    /// Whether a failed record still has retry budget left.
    pub fn can_retry(&self) -> bool {
        self.status == TxStatus::Failed && self.retry_count < self.max_retries
    }
}

/// Aggregate monitor statistics, derived from the full record set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorStats {
    pub total: usize,
    pub pending: usize,
    pub confirmed: usize,
    pub failed: usize,
    pub dropped: usize,
    pub replaced: usize,
    pub cancelled: usize,
    pub by_network: HashMap<Network, usize>,
    /// Mean submission-to-confirmation latency over confirmed records.
    pub average_confirmation_secs: f64,
    /// Confirmed share of terminal records.
    pub success_rate: f64,
}

type TxKey = (Network, String);

/// Tracks submitted transactions across networks.
#[derive(Clone)]
pub struct TransactionMonitor {
    records: Arc<RwLock<HashMap<TxKey, TransactionRecord>>>,
    policies: PolicyStore,
}

impl TransactionMonitor {
    pub fn new(policies: PolicyStore) -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            policies,
        }
    }

    fn key(network: Network, tx_hash: &str) -> TxKey {
        (network, tx_hash.to_string())
    }

    /// Register a submitted transaction as `Pending`. Idempotent: an already
    /// tracked transaction is returned unchanged.
    pub async fn track(
        &self,
        network: Network,
        tx_hash: &str,
        request: Option<TxRequest>,
    ) -> TransactionRecord {
        let policy = self.policies.policy(network);
        let mut records = self.records.write().await;
        records
            .entry(Self::key(network, tx_hash))
            .or_insert_with(|| {
                info!(network = %network, tx = %tx_hash, "tracking transaction");
                TransactionRecord {
                    network,
                    tx_hash: tx_hash.to_string(),
                    status: TxStatus::Pending,
                    confirmations: 0,
                    required_confirmations: policy.required_confirmations,
                    retry_count: 0,
                    max_retries: policy.max_retries,
                    replaced_by: None,
                    failure: None,
                    request,
                    submitted_at: Utc::now(),
                    confirmed_at: None,
                }
            })
            .clone()
    }

    /// Snapshot of one record.
    pub async fn get(&self, network: Network, tx_hash: &str) -> Option<TransactionRecord> {
        self.records
            .read()
            .await
            .get(&Self::key(network, tx_hash))
            .cloned()
    }

    /// Snapshot of all records.
    pub async fn records(&self) -> Vec<TransactionRecord> {
        self.records.read().await.values().cloned().collect()
    }

    async fn mark_failed(&self, key: &TxKey, reason: TxFailureReason) -> TransactionRecord {
        let mut records = self.records.write().await;
        let record = records.get_mut(key).expect("record exists while watched");
        record.status = TxStatus::Failed;
        warn!(network = %record.network, tx = %record.tx_hash, %reason, "transaction failed");
        record.failure = Some(reason);
        record.clone()
    }

    /// Count one transient query failure. Returns the updated record and
    /// whether the retry budget is now exhausted.
    async fn count_transient_failure(&self, key: &TxKey) -> (TransactionRecord, bool) {
        let mut records = self.records.write().await;
        let record = records.get_mut(key).expect("record exists while watched");
        record.retry_count += 1;
        let exhausted = record.retry_count >= record.max_retries;
        (record.clone(), exhausted)
    }

    /// Poll a transaction until it reaches a terminal status and return the
    /// final record.
    ///
    /// Polling runs on the network policy's fixed interval. Transient query
    /// failures retry up to the record's remaining budget with the same
    /// fixed delay; exhausting it is a terminal, visible failure. A record
    /// that another task cancels or replaces is returned as-is.
    pub async fn watch(
        &self,
        network: Network,
        tx_hash: &str,
        query: &dyn NetworkQuery,
    ) -> Result<TransactionRecord, DeployError> {
        let key = Self::key(network, tx_hash);
        self.track(network, tx_hash, None).await;

        let policy = self.policies.policy(network);
        let poll = std::time::Duration::from_millis(policy.poll_interval_ms);
        let timeout = std::time::Duration::from_secs(policy.confirmation_timeout_secs);
        let started = tokio::time::Instant::now();

        loop {
            // Another task may have cancelled or replaced the record.
            if let Some(record) = self.records.read().await.get(&key) {
                if matches!(record.status, TxStatus::Cancelled | TxStatus::Replaced) {
                    return Ok(record.clone());
                }
            }

            if started.elapsed() >= timeout {
                let reason = TxFailureReason::ConfirmationTimeout {
                    secs: policy.confirmation_timeout_secs,
                };
                return Ok(self.mark_failed(&key, reason).await);
            }

            match query.transaction_receipt(tx_hash).await {
                Err(e) => {
                    warn!(network = %network, tx = %tx_hash, error = %e, "status query failed");
                    let (record, exhausted) = self.count_transient_failure(&key).await;
                    if exhausted {
                        let reason = TxFailureReason::RetriesExhausted {
                            attempts: record.retry_count,
                        };
                        return Ok(self.mark_failed(&key, reason).await);
                    }
                }
                Ok(None) => {
                    // A receipt that was seen before and is now gone means the
                    // transaction fell out of the chain.
                    let seen_before = self
                        .records
                        .read()
                        .await
                        .get(&key)
                        .is_some_and(|r| r.confirmations > 0);
                    if seen_before {
                        let mut records = self.records.write().await;
                        let record = records.get_mut(&key).expect("record exists while watched");
                        record.status = TxStatus::Dropped;
                        warn!(network = %network, tx = %tx_hash, "transaction dropped");
                        return Ok(record.clone());
                    }
                }
                Ok(Some(receipt)) if !receipt.status => {
                    let reason = TxFailureReason::Reverted("execution reverted".into());
                    return Ok(self.mark_failed(&key, reason).await);
                }
                Ok(Some(receipt)) => match query.block_number().await {
                    Err(e) => {
                        warn!(network = %network, tx = %tx_hash, error = %e, "block query failed");
                        let (record, exhausted) = self.count_transient_failure(&key).await;
                        if exhausted {
                            let reason = TxFailureReason::RetriesExhausted {
                                attempts: record.retry_count,
                            };
                            return Ok(self.mark_failed(&key, reason).await);
                        }
                    }
                    Ok(block) => {
                        let depth =
                            (block.saturating_sub(receipt.block_number) + 1).min(u32::MAX as u64)
                                as u32;
                        let mut records = self.records.write().await;
                        let record = records.get_mut(&key).expect("record exists while watched");
                        // Confirmations never decrease across polls.
                        record.confirmations = record.confirmations.max(depth);
                        if record.confirmations >= record.required_confirmations {
                            record.status = TxStatus::Confirmed;
                            record.confirmed_at = Some(Utc::now());
                            info!(
                                network = %network,
                                tx = %tx_hash,
                                confirmations = record.confirmations,
                                "transaction confirmed"
                            );
                            return Ok(record.clone());
                        }
                    }
                },
            }

            tokio::time::sleep(poll).await;
        }
    }

    /// Re-arm monitoring on a failed record, bounded by its remaining retry
    /// budget.
    pub async fn retry_transaction(
        &self,
        network: Network,
        tx_hash: &str,
        query: &dyn NetworkQuery,
    ) -> Result<TransactionRecord, DeployError> {
        {
            let mut records = self.records.write().await;
            let record = records
                .get_mut(&Self::key(network, tx_hash))
                .ok_or_else(|| {
                    DeployError::InvalidTransaction(format!("unknown transaction: {tx_hash}"))
                })?;
            if record.status != TxStatus::Failed {
                return Err(DeployError::InvalidTransaction(
                    "only failed transactions can be retried".into(),
                ));
            }
            if record.retry_count >= record.max_retries {
                return Err(DeployError::MonitoringExhausted {
                    attempts: record.retry_count,
                });
            }
            record.status = TxStatus::Pending;
            record.failure = None;
            info!(network = %network, tx = %tx_hash, retry = record.retry_count, "re-arming monitor");
        }
        self.watch(network, tx_hash, query).await
    }

    /// Submit a replacement at a higher fee and link old to new.
    ///
    /// Only valid while the original is `Pending`. Returns the replacement
    /// hash; the replacement is tracked as a fresh `Pending` record.
    pub async fn speed_up_transaction(
        &self,
        network: Network,
        tx_hash: &str,
        signer: &dyn Signer,
    ) -> Result<String, DeployError> {
        let request = {
            let records = self.records.read().await;
            let record = records.get(&Self::key(network, tx_hash)).ok_or_else(|| {
                DeployError::InvalidTransaction(format!("unknown transaction: {tx_hash}"))
            })?;
            if record.status != TxStatus::Pending {
                return Err(DeployError::InvalidTransaction(
                    "only pending transactions can be sped up".into(),
                ));
            }
            record.request.clone().ok_or_else(|| {
                DeployError::InvalidTransaction(
                    "original request unavailable, cannot rebuild at a higher fee".into(),
                )
            })?
        };

        let mut bumped = request;
        bumped.gas_price_gwei += (bumped.gas_price_gwei / 5).max(1);
        let new_hash = signer.send_transaction(bumped.clone()).await?;

        {
            let mut records = self.records.write().await;
            let record = records
                .get_mut(&Self::key(network, tx_hash))
                .expect("record checked above");
            record.status = TxStatus::Replaced;
            record.replaced_by = Some(new_hash.clone());
        }
        self.track(network, &new_hash, Some(bumped)).await;
        info!(network = %network, old = %tx_hash, new = %new_hash, "transaction sped up");
        Ok(new_hash)
    }

    /// Stop tracking a pending transaction.
    ///
    /// Cooperative: this stops further status updates but cannot recall an
    /// already-broadcast transaction; use a replacement for a network-level
    /// cancel.
    pub async fn cancel_transaction(
        &self,
        network: Network,
        tx_hash: &str,
    ) -> Result<(), DeployError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&Self::key(network, tx_hash))
            .ok_or_else(|| {
                DeployError::InvalidTransaction(format!("unknown transaction: {tx_hash}"))
            })?;
        if record.status != TxStatus::Pending {
            return Err(DeployError::InvalidTransaction(
                "only pending transactions can be cancelled".into(),
            ));
        }
        record.status = TxStatus::Cancelled;
        info!(network = %network, tx = %tx_hash, "transaction cancelled");
        Ok(())
    }

    /// Persist the record set to a JSON file.
    pub async fn save_history(&self, path: &std::path::Path) -> anyhow::Result<()> {
        use anyhow::Context;

        let records: Vec<TransactionRecord> =
            self.records.read().await.values().cloned().collect();
        let json = serde_json::to_string_pretty(&records)
            .context("failed to serialize transaction history")?;
        std::fs::write(path, json).context("failed to write transaction history file")?;
        info!(path = %path.display(), count = records.len(), "transaction history saved");
        Ok(())
    }

    /// Replace the record set from a JSON file. A missing file loads as an
    /// empty history.
    pub async fn load_history(&self, path: &std::path::Path) -> anyhow::Result<()> {
        use anyhow::Context;

        if !path.exists() {
            info!(path = %path.display(), "transaction history file not found, starting empty");
            return Ok(());
        }
        let json = std::fs::read_to_string(path).context("failed to read transaction history")?;
        let loaded: Vec<TransactionRecord> =
            serde_json::from_str(&json).context("failed to deserialize transaction history")?;

        let mut records = self.records.write().await;
        records.clear();
        for record in loaded {
            records.insert((record.network, record.tx_hash.clone()), record);
        }
        info!(path = %path.display(), count = records.len(), "transaction history loaded");
        Ok(())
    }

    /// Remove terminal records. Returns how many were pruned.
    pub async fn prune_history(&self) -> usize {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, r| !r.status.is_terminal());
        before - records.len()
    }

    /// Aggregate statistics, recomputed from the full record set.
    pub async fn stats(&self) -> MonitorStats {
        let records = self.records.read().await;

        let mut stats = MonitorStats {
            total: records.len(),
            pending: 0,
            confirmed: 0,
            failed: 0,
            dropped: 0,
            replaced: 0,
            cancelled: 0,
            by_network: HashMap::new(),
            average_confirmation_secs: 0.0,
            success_rate: 0.0,
        };

        let mut confirmation_secs = Vec::new();
        for record in records.values() {
            match record.status {
                TxStatus::Pending => stats.pending += 1,
                TxStatus::Confirmed => stats.confirmed += 1,
                TxStatus::Failed => stats.failed += 1,
                TxStatus::Dropped => stats.dropped += 1,
                TxStatus::Replaced => stats.replaced += 1,
                TxStatus::Cancelled => stats.cancelled += 1,
            }
            *stats.by_network.entry(record.network).or_insert(0) += 1;
            if let Some(confirmed_at) = record.confirmed_at {
                let secs = confirmed_at
                    .signed_duration_since(record.submitted_at)
                    .num_milliseconds() as f64
                    / 1_000.0;
                confirmation_secs.push(secs);
            }
        }

        if !confirmation_secs.is_empty() {
            stats.average_confirmation_secs =
                confirmation_secs.iter().sum::<f64>() / confirmation_secs.len() as f64;
        }
        let terminal = stats.total - stats.pending;
        if terminal > 0 {
            stats.success_rate = stats.confirmed as f64 / terminal as f64;
        }
        stats
    }
}
