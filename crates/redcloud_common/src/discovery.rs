//! Exported-service discovery records and coordination-store key layout.

use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::store::CoordinationStore;

/// Root of every per-instance key.
const SERVICE_ROOT: &str = "/ns/service/red-cloud";

/// One exported endpoint of a running service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryRecord {
    pub address: String,
    pub port: i32,
    #[serde(default)]
    pub protocol: String,
}

impl DiscoveryRecord {
    pub fn new(address: impl Into<String>, port: i32, protocol: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            port,
            protocol: protocol.into(),
        }
    }

    /// `host:port` of the exported endpoint.
    pub fn endpoint(&self) -> String {
        join_host_port(&self.address, self.port)
    }

    pub fn decode(raw: &[u8]) -> anyhow::Result<Self> {
        serde_json::from_slice(raw).context("decode discovery record")
    }

    pub fn encode(&self) -> anyhow::Result<Vec<u8>> {
        serde_json::to_vec(self).context("encode discovery record")
    }
}

/// Joins host and port, bracketing IPv6 literals.
pub fn join_host_port(host: &str, port: i32) -> String {
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

/// Prefix under which data nodes of `instance` export themselves.
pub fn discovery_prefix(instance: &str) -> String {
    format!("{SERVICE_ROOT}/{instance}/data-node/")
}

/// Prefix under which the master of `instance` exports itself.
pub fn master_prefix(instance: &str) -> String {
    format!("{SERVICE_ROOT}/{instance}/master/")
}

/// Key holding the serialized `ServerTableMetadata` of `table`.
pub fn table_config_path(instance: &str, table: &str) -> String {
    format!("{SERVICE_ROOT}/{instance}/table/{table}")
}

/// Finds the endpoint of the master exported under `instance`.
///
/// Undecodable records are skipped; the first decodable one wins.
pub async fn resolve_master(
    store: &dyn CoordinationStore,
    instance: &str,
    timeout: Duration,
) -> anyhow::Result<DiscoveryRecord> {
    let prefix = master_prefix(instance);
    let records = tokio::time::timeout(timeout, store.get_prefix(&prefix))
        .await
        .map_err(|_| anyhow::anyhow!("master lookup under {prefix} timed out"))?
        .with_context(|| format!("list master records under {prefix}"))?;

    for kv in records {
        match DiscoveryRecord::decode(&kv.value) {
            Ok(record) => return Ok(record),
            Err(err) => {
                tracing::warn!(key = %kv.key, error = ?err, "skipping undecodable master record");
            }
        }
    }
    anyhow::bail!("no master exported under {prefix}")
}
