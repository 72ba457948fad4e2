//! Shared fakes for data-access client integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use redcloud_client::{
    Column, ColumnSet, ColumnSetStream, DataAccessClient, DataNode, Dialer, GetRangeRequest,
    GetRequest, InsertRequest, RpcError,
};
use redcloud_client::ClientConfig;
use redcloud_common::discovery::table_config_path;
use redcloud_common::metadata::{encode_table_metadata, ServerTableMetadata, ServerTabletMetadata};
use redcloud_common::{CoordinationStore, CounterMetrics, KeyValue, MemoryStore, WatchStream};

pub const INSTANCE: &str = "it";

/// How a fake node answers point requests.
#[derive(Clone, Debug)]
pub enum Behavior {
    Serve,
    NotLoaded,
    Fail,
}

/// In-process data node that records how often it was called.
pub struct FakeNode {
    pub endpoint: String,
    behavior: Mutex<Behavior>,
    rows: Mutex<Vec<ColumnSet>>,
    range_failure: Mutex<Option<Behavior>>,
    pub gets: AtomicUsize,
    pub inserts: AtomicUsize,
    pub ranges: AtomicUsize,
    pub written: Mutex<Vec<InsertRequest>>,
}

impl FakeNode {
    pub fn new(endpoint: &str, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            endpoint: endpoint.to_string(),
            behavior: Mutex::new(behavior),
            rows: Mutex::new(Vec::new()),
            range_failure: Mutex::new(None),
            gets: AtomicUsize::new(0),
            inserts: AtomicUsize::new(0),
            ranges: AtomicUsize::new(0),
            written: Mutex::new(Vec::new()),
        })
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn set_rows(&self, rows: Vec<ColumnSet>) {
        *self.rows.lock().unwrap() = rows;
    }

    /// Makes range reads fail: `NotLoaded` on open, `Fail` mid-stream.
    pub fn fail_ranges(&self, behavior: Behavior) {
        *self.range_failure.lock().unwrap() = Some(behavior);
    }

    pub fn calls(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
            + self.inserts.load(Ordering::SeqCst)
            + self.ranges.load(Ordering::SeqCst)
    }

    fn answer(&self) -> Result<(), RpcError> {
        match &*self.behavior.lock().unwrap() {
            Behavior::Serve => Ok(()),
            Behavior::NotLoaded => Err(RpcError::TabletNotLoaded),
            Behavior::Fail => Err(RpcError::Transport(anyhow::anyhow!("disk on fire"))),
        }
    }
}

#[async_trait]
impl DataNode for FakeNode {
    async fn get(&self, req: &GetRequest) -> Result<Column, RpcError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.answer()?;
        Ok(Column {
            name: req.column.clone(),
            content: Bytes::from(self.endpoint.clone()),
            timestamp: 1,
        })
    }

    async fn get_range(&self, _req: &GetRangeRequest) -> Result<ColumnSetStream, RpcError> {
        self.ranges.fetch_add(1, Ordering::SeqCst);
        let mut items: Vec<Result<ColumnSet, RpcError>> =
            self.rows.lock().unwrap().iter().cloned().map(Ok).collect();
        match self.range_failure.lock().unwrap().clone() {
            Some(Behavior::NotLoaded) => return Err(RpcError::TabletNotLoaded),
            Some(Behavior::Fail) => {
                items.push(Err(RpcError::Transport(anyhow::anyhow!("stream reset"))));
            }
            _ => {}
        }
        Ok(futures_util::stream::iter(items).boxed())
    }

    async fn insert(&self, req: &InsertRequest) -> Result<(), RpcError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.answer()?;
        self.written.lock().unwrap().push(req.clone());
        Ok(())
    }
}

/// Hands out registered fake nodes; unknown endpoints fail to dial.
#[derive(Default)]
pub struct FakeDialer {
    nodes: Mutex<HashMap<String, Arc<FakeNode>>>,
    pub dials: AtomicUsize,
}

impl FakeDialer {
    pub fn with_nodes(nodes: &[Arc<FakeNode>]) -> Arc<Self> {
        let dialer = Self::default();
        for node in nodes {
            dialer
                .nodes
                .lock()
                .unwrap()
                .insert(node.endpoint.clone(), node.clone());
        }
        Arc::new(dialer)
    }
}

#[async_trait]
impl Dialer for FakeDialer {
    async fn dial(&self, endpoint: &str) -> anyhow::Result<Arc<dyn DataNode>> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        let node = self
            .nodes
            .lock()
            .unwrap()
            .get(endpoint)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no route to {endpoint}"))?;
        Ok(node as Arc<dyn DataNode>)
    }
}

pub fn tablet(start: &str, end: &str, host: &str, port: i32) -> ServerTabletMetadata {
    ServerTabletMetadata {
        start_key: start.as_bytes().to_vec(),
        end_key: end.as_bytes().to_vec(),
        host: host.to_string(),
        port,
        sstable_path: Vec::new(),
    }
}

pub fn publish(store: &MemoryStore, table: &str, tablets: Vec<ServerTabletMetadata>) {
    let md = ServerTableMetadata {
        name: table.to_string(),
        tablet: tablets,
        ..Default::default()
    };
    store.put(
        table_config_path(INSTANCE, table),
        encode_table_metadata(&md).expect("encode"),
    );
}

/// Coordination store that delays point reads of chosen tables.
pub struct SlowStore {
    inner: Arc<MemoryStore>,
    delays: Mutex<HashMap<String, Duration>>,
    pub slow_reads: AtomicUsize,
}

impl SlowStore {
    pub fn new(inner: Arc<MemoryStore>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            delays: Mutex::new(HashMap::new()),
            slow_reads: AtomicUsize::new(0),
        })
    }

    pub fn delay_table(&self, table: &str, delay: Duration) {
        self.delays
            .lock()
            .unwrap()
            .insert(table_config_path(INSTANCE, table), delay);
    }
}

#[async_trait]
impl CoordinationStore for SlowStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<KeyValue>> {
        let delay = self.delays.lock().unwrap().get(key).copied();
        if let Some(delay) = delay {
            self.slow_reads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
        }
        self.inner.get(key).await
    }

    async fn get_prefix(&self, prefix: &str) -> anyhow::Result<Vec<KeyValue>> {
        self.inner.get_prefix(prefix).await
    }

    async fn watch_prefix(&self, prefix: &str) -> anyhow::Result<WatchStream> {
        self.inner.watch_prefix(prefix).await
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub dialer: Arc<FakeDialer>,
    pub metrics: Arc<CounterMetrics>,
    pub client: Arc<DataAccessClient>,
}

pub fn harness(nodes: &[Arc<FakeNode>]) -> Harness {
    let store = Arc::new(MemoryStore::new());
    build_harness(nodes, store.clone(), store)
}

/// Harness whose client reads metadata through a [`SlowStore`].
pub fn slow_harness(nodes: &[Arc<FakeNode>]) -> (Harness, Arc<SlowStore>) {
    let store = Arc::new(MemoryStore::new());
    let slow = SlowStore::new(store.clone());
    (build_harness(nodes, store, slow.clone()), slow)
}

fn build_harness(
    nodes: &[Arc<FakeNode>],
    store: Arc<MemoryStore>,
    client_store: Arc<dyn CoordinationStore>,
) -> Harness {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let dialer = FakeDialer::with_nodes(nodes);
    let metrics = Arc::new(CounterMetrics::new());
    let client = Arc::new(DataAccessClient::with_metrics(
        ClientConfig::new(INSTANCE),
        client_store,
        dialer.clone(),
        metrics.clone(),
    ));
    Harness {
        store,
        dialer,
        metrics,
        client,
    }
}

pub fn get(table: &str, key: &str) -> GetRequest {
    GetRequest {
        table: table.to_string(),
        key: Bytes::from(key.to_string()),
        column_family: "cf".to_string(),
        column: "col".to_string(),
    }
}

pub fn insert(table: &str, key: &str, value: &str) -> InsertRequest {
    InsertRequest {
        table: table.to_string(),
        key: Bytes::from(key.to_string()),
        column_family: "cf".to_string(),
        column: "col".to_string(),
        value: Bytes::from(value.to_string()),
    }
}

pub fn get_range(table: &str, start: &str, end: &str) -> GetRangeRequest {
    GetRangeRequest {
        table: table.to_string(),
        start_key: Bytes::from(start.to_string()),
        end_key: Bytes::from(end.to_string()),
        column_family: "cf".to_string(),
        columns: vec!["col".to_string()],
    }
}

pub fn row(key: &str) -> ColumnSet {
    ColumnSet {
        key: Bytes::from(key.to_string()),
        column_family: "cf".to_string(),
        columns: vec![Column {
            name: "col".to_string(),
            content: Bytes::from(format!("value-{key}")),
            timestamp: 1,
        }],
    }
}
