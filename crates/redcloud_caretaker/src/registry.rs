//! Node registry capability.
//!
//! The registry itself (storage, health tracking, load balancing) lives
//! outside this crate. Discovery only adds, removes and looks up data nodes
//! by `host:port`. Implementations must tolerate repeated adds and removes
//! of the same address, since the watch sink and the reconciliation scanner
//! race on it.

use async_trait::async_trait;

/// What the registry knows about one data node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredNode {
    pub protocol: String,
    pub address: String,
}

#[async_trait]
pub trait NodeRegistry: Send + Sync + 'static {
    async fn add(&self, protocol: &str, address: &str) -> anyhow::Result<()>;

    async fn remove(&self, address: &str) -> anyhow::Result<()>;

    async fn get_node_by_address(&self, address: &str) -> Option<RegisteredNode>;
}
