//! Event-driven membership tracking.
//!
//! The sink subscribes to the change feed over the data-node discovery prefix
//! and mirrors every appearing or disappearing record into the node registry.
//! Pushed notifications can be lost, which is what the reconciliation scanner
//! covers.

use std::sync::Arc;

use futures_util::StreamExt;
use redcloud_common::discovery::discovery_prefix;
use redcloud_common::{CoordinationStore, DiscoveryRecord, MetricsSink, WatchEvent, WatchStream};
use tokio_util::sync::CancellationToken;

use crate::config::DiscoveryConfig;
use crate::error::WatchError;
use crate::registry::NodeRegistry;

pub const METRIC_CHANGE_REPORTS: &str = "discovery.watch.change_reports";
pub const METRIC_WATCH_ERRORS: &str = "discovery.watch.errors";
pub const METRIC_WATCH_DECODE_ERRORS: &str = "discovery.watch.decode_errors";
pub const METRIC_REGISTRY_FAILURES: &str = "discovery.watch.registry_failures";

/// Why [`WatchSink::run`] returned without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchExit {
    /// The shutdown token fired.
    Shutdown,
    /// The feed ended and resubscribing is disabled.
    Cancelled,
}

pub struct WatchSink {
    config: DiscoveryConfig,
    store: Arc<dyn CoordinationStore>,
    registry: Arc<dyn NodeRegistry>,
    metrics: Arc<dyn MetricsSink>,
}

impl WatchSink {
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

    /// Applies one feed notification to the registry.
    ///
    /// Only [`WatchEvent::Fatal`] produces an error. Registry failures and
    /// undecodable records are logged and counted.
    pub async fn handle_event(&self, event: WatchEvent) -> Result<(), WatchError> {
        match event {
            WatchEvent::Put {
                key,
                value,
                created: true,
            } => {
                self.metrics
                    .incr_labeled(METRIC_CHANGE_REPORTS, "change_type", "NEW");
                let Some(record) = self.decode(&key, &value) else {
                    return Ok(());
                };
                let address = record.endpoint();
                tracing::info!(key = %key, address = %address, "adding node");
                let res = tokio::time::timeout(
                    self.config.registry_timeout,
                    self.registry.add(&record.protocol, &address),
                )
                .await;
                self.note_registry_result("add", &address, res);
            }
            WatchEvent::Put { key, .. } => {
                self.metrics
                    .incr_labeled(METRIC_CHANGE_REPORTS, "change_type", "UNKNOWN");
                tracing::debug!(key = %key, "ignoring update of existing discovery record");
            }
            WatchEvent::Delete { key, prev_value } => {
                self.metrics
                    .incr_labeled(METRIC_CHANGE_REPORTS, "change_type", "DELETED");
                let Some(prev_value) = prev_value else {
                    self.metrics.incr(METRIC_WATCH_DECODE_ERRORS);
                    tracing::warn!(key = %key, "deleted discovery record carries no previous value");
                    return Ok(());
                };
                let Some(record) = self.decode(&key, &prev_value) else {
                    return Ok(());
                };
                let address = record.endpoint();
                tracing::info!(key = %key, address = %address, "removing node");
                let res =
                    tokio::time::timeout(self.config.registry_timeout, self.registry.remove(&address))
                        .await;
                self.note_registry_result("remove", &address, res);
            }
            WatchEvent::Error(err) => {
                self.metrics
                    .incr_labeled(METRIC_WATCH_ERRORS, "error_type", "error");
                tracing::warn!(error = ?err, "error watching for data node changes");
            }
            WatchEvent::Fatal(err) => {
                self.metrics
                    .incr_labeled(METRIC_WATCH_ERRORS, "error_type", "fatal");
                tracing::error!(error = ?err, "fatal error from membership feed");
                return Err(WatchError::Fatal(err));
            }
        }
        Ok(())
    }

    /// Consumes the change feed until shutdown, a fatal feed error, or the
    /// feed ending with resubscription disabled.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<WatchExit, WatchError> {
        let prefix = discovery_prefix(&self.config.instance);
        let mut feed = self.subscribe(&prefix).await?;
        tracing::info!(prefix = %prefix, "membership watch started");

        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("membership watch stopped");
                    return Ok(WatchExit::Shutdown);
                }
                event = feed.next() => event,
            };
            if let Some(event) = event {
                self.handle_event(event).await?;
                continue;
            }

            self.metrics
                .incr_labeled(METRIC_WATCH_ERRORS, "error_type", "cancelled");
            if !self.config.resubscribe_on_cancel {
                tracing::warn!(prefix = %prefix, "membership feed cancelled; not resubscribing");
                return Ok(WatchExit::Cancelled);
            }
            tracing::warn!(
                prefix = %prefix,
                backoff = ?self.config.resubscribe_backoff,
                "membership feed cancelled; resubscribing"
            );
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(WatchExit::Shutdown),
                _ = tokio::time::sleep(self.config.resubscribe_backoff) => {}
            }
            feed = self.subscribe(&prefix).await?;
        }
    }

    async fn subscribe(&self, prefix: &str) -> Result<WatchStream, WatchError> {
        self.store
            .watch_prefix(prefix)
            .await
            .map_err(WatchError::Subscribe)
    }

    fn decode(&self, key: &str, raw: &[u8]) -> Option<DiscoveryRecord> {
        match DiscoveryRecord::decode(raw) {
            Ok(record) => Some(record),
            Err(err) => {
                self.metrics.incr(METRIC_WATCH_DECODE_ERRORS);
                tracing::warn!(key = %key, error = ?err, "skipping undecodable discovery record");
                None
            }
        }
    }

    fn note_registry_result(
        &self,
        op: &'static str,
        address: &str,
        res: Result<anyhow::Result<()>, tokio::time::error::Elapsed>,
    ) {
        let err = match res {
            Ok(Ok(())) => return,
            Ok(Err(err)) => err,
            Err(_) => anyhow::anyhow!("registry {op} timed out after {:?}", self.config.registry_timeout),
        };
        self.metrics.incr_labeled(METRIC_REGISTRY_FAILURES, "op", op);
        tracing::warn!(address = %address, op, error = ?err, "registry update failed");
    }
}
