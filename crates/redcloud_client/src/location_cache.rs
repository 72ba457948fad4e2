//! Table → tablet location cache and the shared data-node connection pool.
//!
//! Each table maps to the full ordered list of its tablets and the pooled
//! connection to each tablet's owner. A table's list is only ever replaced
//! as a whole: a refresh builds the new list off to the side and publishes it
//! once every tablet has a connection, so readers see either the previous
//! mapping or the new one.
//!
//! One lock guards both the cache and the pool, across all tables. A refresh
//! holds it exclusively while it reads the coordination store and dials new
//! endpoints, which blocks lookups of unrelated tables for that time.
//! Sharding the lock per table would keep the whole-table replacement
//! semantics and is a valid future change.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use redcloud_common::discovery::table_config_path;
use redcloud_common::metadata::decode_table_metadata;
use redcloud_common::{CoordinationStore, KeyRange, MetricsSink};
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::error::{ClientError, Result};
use crate::rpc::{DataNode, Dialer};

pub const METRIC_CACHE_HITS: &str = "client.location_cache.hits";
pub const METRIC_CACHE_REFRESHES: &str = "client.location_cache.refreshes";
pub const METRIC_REFRESH_FAILURES: &str = "client.location_cache.refresh_failures";

/// What a caller wants routed.
#[derive(Debug, Clone, Copy)]
pub enum RouteQuery<'a> {
    /// Single key: selects every tablet whose range holds the key.
    Key(&'a [u8]),
    /// Key range: selects every tablet whose range lies wholly inside it.
    Range(&'a KeyRange),
}

impl RouteQuery<'_> {
    pub fn selects(&self, tablet: &KeyRange) -> bool {
        match self {
            RouteQuery::Key(key) => tablet.contains_key(key),
            RouteQuery::Range(range) => range.contains_range(tablet),
        }
    }
}

/// Cached location of one tablet.
#[derive(Clone)]
pub struct TabletRoute {
    pub range: KeyRange,
    pub endpoint: String,
    pub node: Arc<dyn DataNode>,
}

impl fmt::Debug for TabletRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TabletRoute")
            .field("range", &self.range)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct RoutingState {
    tables: HashMap<String, Arc<[TabletRoute]>>,
    pool: HashMap<String, Arc<dyn DataNode>>,
}

pub struct LocationCache {
    instance: String,
    store: Arc<dyn CoordinationStore>,
    dialer: Arc<dyn Dialer>,
    metrics: Arc<dyn MetricsSink>,
    metadata_timeout: Duration,
    state: RwLock<RoutingState>,
}

impl LocationCache {
    pub fn new(
        instance: impl Into<String>,
        store: Arc<dyn CoordinationStore>,
        dialer: Arc<dyn Dialer>,
        metrics: Arc<dyn MetricsSink>,
        metadata_timeout: Duration,
    ) -> Self {
        Self {
            instance: instance.into(),
            store,
            dialer,
            metrics,
            metadata_timeout,
            state: RwLock::new(RoutingState::default()),
        }
    }

    /// Returns the cached routes of `table` selected by `query`.
    ///
    /// Unless `force_refresh` is set, a cached table is answered under the
    /// shared lock without touching the coordination store. Otherwise the
    /// table's entry is dropped and rebuilt from one metadata read; the
    /// returned routes are the ones selected during that rebuild.
    pub async fn resolve(
        &self,
        table: &str,
        query: RouteQuery<'_>,
        force_refresh: bool,
        deadline: Option<Instant>,
    ) -> Result<Vec<TabletRoute>> {
        if !force_refresh {
            let state = self.state.read().await;
            if let Some(routes) = state.tables.get(table) {
                self.metrics.incr(METRIC_CACHE_HITS);
                let selected = select(routes, query);
                tracing::debug!(table = %table, num_ranges = selected.len(), "routes served from cache");
                return Ok(selected);
            }
        }

        let mut state = self.state.write().await;
        if !force_refresh {
            // Another caller may have filled the entry while we waited.
            if let Some(routes) = state.tables.get(table) {
                self.metrics.incr(METRIC_CACHE_HITS);
                return Ok(select(routes, query));
            }
        }
        state.tables.remove(table);
        self.metrics.incr(METRIC_CACHE_REFRESHES);

        match self.rebuild(&mut state, table, deadline).await {
            Ok(routes) => {
                let selected = select(&routes, query);
                tracing::debug!(
                    table = %table,
                    tablets = routes.len(),
                    num_ranges = selected.len(),
                    force_refresh,
                    "refreshed table locations"
                );
                state.tables.insert(table.to_string(), routes);
                Ok(selected)
            }
            Err(err) => {
                self.metrics
                    .incr_labeled(METRIC_REFRESH_FAILURES, "reason", failure_reason(&err));
                tracing::warn!(table = %table, error = ?err, "table location refresh failed");
                Err(err)
            }
        }
    }

    /// Drops the cached mapping of `table`; returns whether one existed.
    pub async fn invalidate(&self, table: &str) -> bool {
        self.state.write().await.tables.remove(table).is_some()
    }

    /// Snapshot of the cached `(range, endpoint)` pairs of `table`.
    pub async fn cached_ranges(&self, table: &str) -> Option<Vec<(KeyRange, String)>> {
        let state = self.state.read().await;
        state.tables.get(table).map(|routes| {
            routes
                .iter()
                .map(|route| (route.range.clone(), route.endpoint.clone()))
                .collect()
        })
    }

    pub async fn pooled_endpoints(&self) -> Vec<String> {
        let state = self.state.read().await;
        let mut endpoints: Vec<String> = state.pool.keys().cloned().collect();
        endpoints.sort();
        endpoints
    }

    async fn rebuild(
        &self,
        state: &mut RoutingState,
        table: &str,
        deadline: Option<Instant>,
    ) -> Result<Arc<[TabletRoute]>> {
        let path = table_config_path(&self.instance, table);
        let mut fetch_deadline = Instant::now() + self.metadata_timeout;
        let mut caller_bound = false;
        if let Some(deadline) = deadline {
            if deadline < fetch_deadline {
                fetch_deadline = deadline;
                caller_bound = true;
            }
        }

        let fetched = match tokio::time::timeout_at(fetch_deadline, self.store.get(&path)).await {
            Ok(res) => res.map_err(ClientError::Coordination)?,
            Err(_) if caller_bound => return Err(ClientError::DeadlineExceeded),
            Err(_) => {
                return Err(ClientError::Coordination(anyhow::anyhow!(
                    "table metadata read for {path} timed out"
                )))
            }
        };
        let Some(kv) = fetched else {
            return Err(ClientError::NoDataNodes {
                table: table.to_string(),
            });
        };
        let md = decode_table_metadata(&kv.value).map_err(|source| ClientError::CorruptMetadata {
            table: table.to_string(),
            source,
        })?;
        if md.tablet.is_empty() {
            return Err(ClientError::NoDataNodes {
                table: table.to_string(),
            });
        }

        let mut routes = Vec::with_capacity(md.tablet.len());
        for tablet in &md.tablet {
            let range = tablet.key_range();
            if !range.is_well_formed() {
                return Err(ClientError::CorruptMetadata {
                    table: table.to_string(),
                    source: anyhow::anyhow!("tablet {range} starts after its end"),
                });
            }
            let endpoint = tablet.endpoint();
            let node = match state.pool.get(&endpoint) {
                Some(node) => node.clone(),
                None => {
                    let node = self.dialer.dial(&endpoint).await.map_err(|source| {
                        ClientError::EndpointUnreachable {
                            endpoint: endpoint.clone(),
                            source,
                        }
                    })?;
                    state.pool.insert(endpoint.clone(), node.clone());
                    node
                }
            };
            routes.push(TabletRoute {
                range,
                endpoint,
                node,
            });
        }
        Ok(routes.into())
    }
}

fn select(routes: &[TabletRoute], query: RouteQuery<'_>) -> Vec<TabletRoute> {
    routes
        .iter()
        .filter(|route| query.selects(&route.range))
        .cloned()
        .collect()
}

fn failure_reason(err: &ClientError) -> &'static str {
    match err {
        ClientError::NoDataNodes { .. } => "no_data_nodes",
        ClientError::CorruptMetadata { .. } => "corrupt_metadata",
        ClientError::EndpointUnreachable { .. } => "endpoint_unreachable",
        ClientError::DeadlineExceeded | ClientError::Cancelled => "deadline",
        _ => "coordination",
    }
}
