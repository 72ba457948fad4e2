//! Periodic reconciliation of the node registry with the coordination store.
//!
//! Every cycle lists the whole data-node discovery prefix once and adds any
//! exported node the registry does not know about. Nothing is ever removed
//! here; removals only come from the watch feed.

use std::sync::Arc;
use std::time::Duration;

use redcloud_common::discovery::discovery_prefix;
use redcloud_common::{CoordinationStore, DiscoveryRecord, MetricsSink};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::DiscoveryConfig;
use crate::registry::NodeRegistry;

pub const METRIC_SCAN_COMM_ERRORS: &str = "discovery.reconcile.comm_errors";
pub const METRIC_SCAN_DECODE_ERRORS: &str = "discovery.reconcile.decode_errors";
pub const METRIC_DISCOVERED: &str = "discovery.reconcile.nodes_discovered";

const MIN_SCAN_INTERVAL: Duration = Duration::from_millis(1);

/// Result of one reconciliation cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Every listed record was checked.
    Completed { listed: usize, discovered: usize },
    /// A record failed to decode; it and every record after it were left
    /// for the next cycle.
    Abandoned {
        key: String,
        checked: usize,
        discovered: usize,
    },
    /// The listing itself failed or timed out.
    Skipped,
}

pub struct Reconciler {
    config: DiscoveryConfig,
    store: Arc<dyn CoordinationStore>,
    registry: Arc<dyn NodeRegistry>,
    metrics: Arc<dyn MetricsSink>,
}

impl Reconciler {
    pub fn new(
        config: DiscoveryConfig,
        store: Arc<dyn CoordinationStore>,
        registry: Arc<dyn NodeRegistry>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            config,
            store,
            registry,
            metrics,
        }
    }

    pub async fn scan_once(&self) -> ScanOutcome {
        let prefix = discovery_prefix(&self.config.instance);
        let listing = tokio::time::timeout(self.config.scan_timeout, self.store.get_prefix(&prefix)).await;
        let records = match listing {
            Ok(Ok(records)) => records,
            Ok(Err(err)) => {
                self.metrics.incr(METRIC_SCAN_COMM_ERRORS);
                tracing::warn!(prefix = %prefix, error = ?err, "reconciliation listing failed");
                return ScanOutcome::Skipped;
            }
            Err(_) => {
                self.metrics.incr(METRIC_SCAN_COMM_ERRORS);
                tracing::warn!(
                    prefix = %prefix,
                    timeout = ?self.config.scan_timeout,
                    "reconciliation listing timed out"
                );
                return ScanOutcome::Skipped;
            }
        };

        let listed = records.len();
        let mut discovered = 0usize;
        for (checked, kv) in records.into_iter().enumerate() {
            let record = match DiscoveryRecord::decode(&kv.value) {
                Ok(record) => record,
                Err(err) => {
                    self.metrics.incr(METRIC_SCAN_DECODE_ERRORS);
                    tracing::warn!(
                        key = %kv.key,
                        error = ?err,
                        "undecodable discovery record; abandoning this reconciliation cycle"
                    );
                    return ScanOutcome::Abandoned {
                        key: kv.key,
                        checked,
                        discovered,
                    };
                }
            };

            let address = record.endpoint();
            if self.registry.get_node_by_address(&address).await.is_some() {
                continue;
            }
            discovered += 1;
            self.metrics.incr(METRIC_DISCOVERED);
            tracing::info!(key = %kv.key, address = %address, "adding node found by reconciliation");
            match tokio::time::timeout(
                self.config.registry_timeout,
                self.registry.add(&record.protocol, &address),
            )
            .await
            {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    tracing::warn!(address = %address, error = ?err, "failed to add node");
                }
                Err(_) => {
                    tracing::warn!(address = %address, "adding node timed out");
                }
            }
        }

        tracing::debug!(listed, discovered, "reconciliation cycle complete");
        ScanOutcome::Completed { listed, discovered }
    }

    /// Sleeps a full `scan_interval`, then scans, until `shutdown` fires.
    /// The gap between two scans never shrinks by the time a scan takes.
    pub async fn run(&self, shutdown: CancellationToken) {
        let period = self.config.scan_interval.max(MIN_SCAN_INTERVAL);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(period) => {}
            }
            if let ScanOutcome::Abandoned { key, .. } = self.scan_once().await {
                tracing::debug!(key = %key, "records from this key on wait for the next cycle");
            }
        }
        tracing::info!("reconciliation scanner stopped");
    }
}

/// Runs `reconciler` on a background task.
pub fn spawn(reconciler: Arc<Reconciler>, shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move { reconciler.run(shutdown).await })
}
