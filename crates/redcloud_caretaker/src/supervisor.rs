//! Wires the watch sink and the reconciliation scanner together.

use std::sync::Arc;

use redcloud_common::{CoordinationStore, MetricsSink};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::DiscoveryConfig;
use crate::error::WatchError;
use crate::reconcile::{self, Reconciler};
use crate::registry::NodeRegistry;
use crate::watch::{WatchExit, WatchSink};

/// Running membership discovery for one instance.
///
/// The watch sink and the scanner run as independent tasks sharing one
/// shutdown token. A fatal feed error is handed back by
/// [`Discovery::run_until_fatal`]; the embedding process is expected to exit
/// on it.
pub struct Discovery {
    shutdown: CancellationToken,
    watch: JoinHandle<Result<WatchExit, WatchError>>,
    reconcile: JoinHandle<()>,
}

impl Discovery {
    pub fn start(
        config: DiscoveryConfig,
        store: Arc<dyn CoordinationStore>,
        registry: Arc<dyn NodeRegistry>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let sink = WatchSink::new(config.clone(), store.clone(), registry.clone(), metrics.clone());
        let reconciler = Arc::new(Reconciler::new(config.clone(), store, registry, metrics));

        let token = shutdown.clone();
        let watch = tokio::spawn(async move { sink.run(token).await });
        let reconcile = reconcile::spawn(reconciler, shutdown.clone());
        tracing::info!(instance = %config.instance, "membership discovery started");

        Self {
            shutdown,
            watch,
            reconcile,
        }
    }

    /// Token that stops both tasks when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stops both tasks and waits for them.
    pub async fn shutdown(self) -> Result<(), WatchError> {
        self.shutdown.cancel();
        self.run_until_fatal().await
    }

    /// Waits until discovery ends.
    ///
    /// Returns the fatal feed error, or `Ok` once the shutdown token fired.
    /// A feed that is cancelled without resubscription leaves the scanner
    /// running until shutdown.
    pub async fn run_until_fatal(self) -> Result<(), WatchError> {
        let Self {
            shutdown,
            watch,
            reconcile,
        } = self;

        let res = match watch.await {
            Ok(res) => res,
            Err(err) => Err(WatchError::Fatal(anyhow::anyhow!("membership watch task failed: {err}"))),
        };
        match res {
            Ok(WatchExit::Shutdown) => {}
            Ok(WatchExit::Cancelled) => shutdown.cancelled().await,
            Err(err) => {
                shutdown.cancel();
                if let Err(join_err) = reconcile.await {
                    tracing::warn!(error = ?join_err, "reconciliation task failed");
                }
                return Err(err);
            }
        }

        if let Err(join_err) = reconcile.await {
            tracing::warn!(error = ?join_err, "reconciliation task failed");
        }
        tracing::info!("membership discovery stopped");
        Ok(())
    }
}
