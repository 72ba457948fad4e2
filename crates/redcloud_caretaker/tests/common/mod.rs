#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use redcloud_caretaker::{DiscoveryConfig, NodeRegistry, RegisteredNode};
use redcloud_common::discovery::discovery_prefix;
use redcloud_common::{CoordinationStore, DiscoveryRecord, KeyValue, MemoryStore, WatchStream};

pub const INSTANCE: &str = "it";

/// Registry double that records every mutation.
#[derive(Default)]
pub struct FakeRegistry {
    nodes: Mutex<BTreeMap<String, String>>,
    pub adds: AtomicUsize,
    pub removes: AtomicUsize,
}

impl FakeRegistry {
    pub fn with_nodes(addresses: &[&str]) -> Arc<Self> {
        let registry = Self::default();
        for address in addresses {
            registry
                .nodes
                .lock()
                .unwrap()
                .insert(address.to_string(), "grpc".to_string());
        }
        Arc::new(registry)
    }

    pub fn contains(&self, address: &str) -> bool {
        self.nodes.lock().unwrap().contains_key(address)
    }

    pub fn addresses(&self) -> Vec<String> {
        self.nodes.lock().unwrap().keys().cloned().collect()
    }

    pub fn add_count(&self) -> usize {
        self.adds.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NodeRegistry for FakeRegistry {
    async fn add(&self, protocol: &str, address: &str) -> anyhow::Result<()> {
        self.adds.fetch_add(1, Ordering::SeqCst);
        self.nodes
            .lock()
            .unwrap()
            .insert(address.to_string(), protocol.to_string());
        Ok(())
    }

    async fn remove(&self, address: &str) -> anyhow::Result<()> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        self.nodes.lock().unwrap().remove(address);
        Ok(())
    }

    async fn get_node_by_address(&self, address: &str) -> Option<RegisteredNode> {
        self.nodes.lock().unwrap().get(address).map(|protocol| RegisteredNode {
            protocol: protocol.clone(),
            address: address.to_string(),
        })
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn config() -> DiscoveryConfig {
    DiscoveryConfig::new(INSTANCE)
}

pub fn node_key(name: &str) -> String {
    format!("{}{name}", discovery_prefix(INSTANCE))
}

pub fn export(store: &MemoryStore, name: &str, host: &str, port: i32) {
    let record = DiscoveryRecord::new(host, port, "grpc");
    store.put(node_key(name), record.encode().expect("encode"));
}

pub fn encoded(host: &str, port: i32) -> bytes::Bytes {
    bytes::Bytes::from(DiscoveryRecord::new(host, port, "grpc").encode().expect("encode"))
}

/// Polls `cond` until it holds, failing the test after five seconds.
pub async fn eventually(what: &str, cond: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Coordination store whose prefix listings take `listing_delay` to answer.
pub struct SlowStore {
    pub inner: Arc<MemoryStore>,
    listing_delay: Mutex<Duration>,
    pub listings: AtomicUsize,
}

impl SlowStore {
    pub fn new(inner: Arc<MemoryStore>, listing_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner,
            listing_delay: Mutex::new(listing_delay),
            listings: AtomicUsize::new(0),
        })
    }

    pub fn listing_count(&self) -> usize {
        self.listings.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CoordinationStore for SlowStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<KeyValue>> {
        self.inner.get(key).await
    }

    async fn get_prefix(&self, prefix: &str) -> anyhow::Result<Vec<KeyValue>> {
        self.listings.fetch_add(1, Ordering::SeqCst);
        let delay = *self.listing_delay.lock().unwrap();
        tokio::time::sleep(delay).await;
        self.inner.get_prefix(prefix).await
    }

    async fn watch_prefix(&self, prefix: &str) -> anyhow::Result<WatchStream> {
        self.inner.watch_prefix(prefix).await
    }
}
