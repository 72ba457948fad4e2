//! Data-access client: Get / GetRange / Insert routed through the location
//! cache.
//!
//! Point operations retry on "tablet not loaded" by forcing a refresh of the
//! table's locations, for as long as the caller's deadline allows. Range reads
//! are not retried: the first failure of any node aborts the whole request.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use redcloud_common::{CoordinationStore, KeyRange, MetricsSink, NoopMetrics};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result, RpcError};
use crate::location_cache::{LocationCache, RouteQuery, TabletRoute};
use crate::rpc::{Column, ColumnSet, Dialer, GetRangeRequest, GetRequest, InsertRequest};

pub const METRIC_TABLET_NOT_LOADED: &str = "client.tablet_not_loaded";
pub const METRIC_AMBIGUOUS_READS: &str = "client.ambiguous_reads";
pub const METRIC_AMBIGUOUS_WRITES: &str = "client.ambiguous_writes_rejected";

/// Deadline and cancellation of one client call.
#[derive(Clone, Debug, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl CallContext {
    /// No deadline; only explicit cancellation ends the call.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fails once the call was cancelled or its deadline has passed.
    pub fn check(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(ClientError::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Runs `fut` bounded by this context.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output> {
        let bounded = async {
            match self.deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, fut)
                    .await
                    .map_err(|_| ClientError::DeadlineExceeded),
                None => Ok(fut.await),
            }
        };
        tokio::select! {
            _ = self.cancel.cancelled() => Err(ClientError::Cancelled),
            res = bounded => res,
        }
    }
}

/// Client for reading and writing red-cloud tables without knowing which
/// data node serves which key.
pub struct DataAccessClient {
    config: ClientConfig,
    cache: LocationCache,
    metrics: Arc<dyn MetricsSink>,
}

impl DataAccessClient {
    pub fn new(
        config: ClientConfig,
        store: Arc<dyn CoordinationStore>,
        dialer: Arc<dyn Dialer>,
    ) -> Self {
        Self::with_metrics(config, store, dialer, Arc::new(NoopMetrics))
    }

    pub fn with_metrics(
        config: ClientConfig,
        store: Arc<dyn CoordinationStore>,
        dialer: Arc<dyn Dialer>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let cache = LocationCache::new(
            config.instance.clone(),
            store,
            dialer,
            metrics.clone(),
            config.metadata_timeout,
        );
        Self {
            config,
            cache,
            metrics,
        }
    }

    /// Reads the latest version of one column.
    pub async fn get(&self, ctx: &CallContext, req: &GetRequest) -> Result<Column> {
        let span = tracing::debug_span!("data_access.get", table = %req.table);
        self.get_inner(ctx, req).instrument(span).await
    }

    /// Streams every row of the requested range into `sink`.
    ///
    /// Only tablets lying wholly inside `[start_key, end_key)` are read. A
    /// failing node aborts the request, including on "tablet not loaded",
    /// which is reported as [`ClientError::TabletNotLoaded`] rather than retried.
    pub async fn get_range(
        &self,
        ctx: &CallContext,
        req: &GetRangeRequest,
        sink: &mpsc::Sender<ColumnSet>,
    ) -> Result<()> {
        let span = tracing::debug_span!("data_access.get_range", table = %req.table);
        self.get_range_inner(ctx, req, sink).instrument(span).await
    }

    /// Writes a new version of one column.
    ///
    /// Fails with [`ClientError::AmbiguousRouting`] without contacting any
    /// node when more than one tablet claims the key.
    pub async fn insert(&self, ctx: &CallContext, req: &InsertRequest) -> Result<()> {
        let span = tracing::debug_span!("data_access.insert", table = %req.table);
        self.insert_inner(ctx, req).instrument(span).await
    }

    /// Drops the cached locations of `table`.
    pub async fn invalidate(&self, table: &str) -> bool {
        self.cache.invalidate(table).await
    }

    pub async fn cached_ranges(&self, table: &str) -> Option<Vec<(KeyRange, String)>> {
        self.cache.cached_ranges(table).await
    }

    pub async fn pooled_endpoints(&self) -> Vec<String> {
        self.cache.pooled_endpoints().await
    }

    async fn get_inner(&self, ctx: &CallContext, req: &GetRequest) -> Result<Column> {
        ctx.check()?;
        let mut routes = self.locate_key(ctx, &req.table, &req.key, false).await?;
        self.warn_if_ambiguous(&req.table, &req.key, &routes);

        loop {
            let mut refreshed = None;
            for route in &routes {
                match self.call(ctx, route.node.get(req)).await? {
                    Ok(column) => return Ok(column),
                    Err(RpcError::TabletNotLoaded) => {
                        self.note_tablet_not_loaded(route);
                        refreshed = Some(self.locate_key(ctx, &req.table, &req.key, true).await?);
                        break;
                    }
                    Err(RpcError::Transport(source)) => {
                        return Err(ClientError::Rpc {
                            endpoint: route.endpoint.clone(),
                            source,
                        })
                    }
                }
            }
            if let Some(next) = refreshed {
                self.warn_if_ambiguous(&req.table, &req.key, &next);
                routes = next;
            }
            ctx.check()?;
            // Keep a spinning retry from monopolizing the worker.
            tokio::task::yield_now().await;
        }
    }

    async fn insert_inner(&self, ctx: &CallContext, req: &InsertRequest) -> Result<()> {
        ctx.check()?;
        let mut routes = self.locate_key(ctx, &req.table, &req.key, false).await?;
        self.reject_if_ambiguous(&req.table, &req.key, &routes)?;

        loop {
            let mut refreshed = None;
            for route in &routes {
                match self.call(ctx, route.node.insert(req)).await? {
                    Ok(()) => return Ok(()),
                    Err(RpcError::TabletNotLoaded) => {
                        self.note_tablet_not_loaded(route);
                        refreshed = Some(self.locate_key(ctx, &req.table, &req.key, true).await?);
                        break;
                    }
                    Err(RpcError::Transport(source)) => {
                        return Err(ClientError::Rpc {
                            endpoint: route.endpoint.clone(),
                            source,
                        })
                    }
                }
            }
            if let Some(next) = refreshed {
                self.reject_if_ambiguous(&req.table, &req.key, &next)?;
                routes = next;
            }
            ctx.check()?;
            tokio::task::yield_now().await;
        }
    }

    async fn get_range_inner(
        &self,
        ctx: &CallContext,
        req: &GetRangeRequest,
        sink: &mpsc::Sender<ColumnSet>,
    ) -> Result<()> {
        ctx.check()?;
        let range = KeyRange::new(req.start_key.to_vec(), req.end_key.to_vec());
        let routes = ctx
            .run(self.cache.resolve(&req.table, RouteQuery::Range(&range), false, ctx.deadline()))
            .await??;
        tracing::debug!(range = %range, num_ranges = routes.len(), "range resolved");

        for route in &routes {
            let mut stream = self
                .call(ctx, route.node.get_range(req))
                .await?
                .map_err(|err| range_failure(route, err))?;

            let mut rows = 0usize;
            while let Some(item) = ctx.run(stream.next()).await? {
                let set = item.map_err(|err| range_failure(route, err))?;
                ctx.run(sink.send(set))
                    .await?
                    .map_err(|_| ClientError::SinkClosed)?;
                rows += 1;
            }
            tracing::debug!(endpoint = %route.endpoint, rows, "range stream complete");
        }
        Ok(())
    }

    /// Routes a point key; a key no cached tablet covers gets one forced
    /// refresh before it is reported as uncovered.
    async fn locate_key(
        &self,
        ctx: &CallContext,
        table: &str,
        key: &[u8],
        force_refresh: bool,
    ) -> Result<Vec<TabletRoute>> {
        let routes = ctx
            .run(self.cache.resolve(table, RouteQuery::Key(key), force_refresh, ctx.deadline()))
            .await??;
        if !routes.is_empty() {
            return Ok(routes);
        }
        let routes = if force_refresh {
            routes
        } else {
            ctx.run(self.cache.resolve(table, RouteQuery::Key(key), true, ctx.deadline()))
                .await??
        };
        if routes.is_empty() {
            return Err(ClientError::NoDataNodes {
                table: table.to_string(),
            });
        }
        Ok(routes)
    }

    /// Issues one RPC bounded by the per-RPC timeout and the call context.
    /// The outer error is the context's deadline or cancellation.
    async fn call<T, F>(&self, ctx: &CallContext, rpc: F) -> Result<std::result::Result<T, RpcError>>
    where
        F: Future<Output = std::result::Result<T, RpcError>>,
    {
        let timeout = self.config.rpc_timeout;
        match ctx.run(tokio::time::timeout(timeout, rpc)).await? {
            Ok(res) => Ok(res),
            Err(_) => Ok(Err(RpcError::Transport(anyhow::anyhow!(
                "rpc timed out after {timeout:?}"
            )))),
        }
    }

    fn note_tablet_not_loaded(&self, route: &TabletRoute) {
        self.metrics.incr(METRIC_TABLET_NOT_LOADED);
        tracing::debug!(
            endpoint = %route.endpoint,
            range = %route.range,
            "tablet not loaded; refreshing table locations"
        );
    }

    fn warn_if_ambiguous(&self, table: &str, key: &[u8], routes: &[TabletRoute]) {
        if routes.len() > 1 {
            self.metrics.incr(METRIC_AMBIGUOUS_READS);
            tracing::warn!(
                table = %table,
                key = ?String::from_utf8_lossy(key),
                matches = routes.len(),
                "multiple data nodes registered for key"
            );
        }
    }

    fn reject_if_ambiguous(&self, table: &str, key: &[u8], routes: &[TabletRoute]) -> Result<()> {
        if routes.len() <= 1 {
            return Ok(());
        }
        self.metrics.incr(METRIC_AMBIGUOUS_WRITES);
        tracing::warn!(
            table = %table,
            key = ?String::from_utf8_lossy(key),
            matches = routes.len(),
            "refusing write: multiple data nodes registered for key"
        );
        Err(ClientError::AmbiguousRouting {
            table: table.to_string(),
            key: key.to_vec(),
            matches: routes.len(),
        })
    }
}

fn range_failure(route: &TabletRoute, err: RpcError) -> ClientError {
    match err {
        RpcError::TabletNotLoaded => ClientError::TabletNotLoaded {
            endpoint: route.endpoint.clone(),
        },
        RpcError::Transport(source) => ClientError::Rpc {
            endpoint: route.endpoint.clone(),
            source,
        },
    }
}
