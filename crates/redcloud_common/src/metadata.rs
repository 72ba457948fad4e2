//! Table and tablet descriptors stored in the coordination store.
//!
//! These are plain data. The per-table routing table (`ServerTableMetadata`)
//! is what clients fetch to locate the data node serving a key.

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::discovery::join_host_port;
use crate::key_range::KeyRange;

/// Split threshold used when a table does not configure one (128MB).
pub const DEFAULT_SPLIT_SIZE: i64 = 128 * 1024 * 1024;

/// Data-sensitivity classification of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataUsage {
    SensitivePersonalInformation,
    InternalBusinessData,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Column family descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnFamilyMetadata {
    pub name: String,
}

/// Schema and versioning policy of a table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TableMetadata {
    pub name: String,
    /// Tablet split threshold in bytes; 0 means unset.
    #[serde(default)]
    pub split_size: i64,
    /// Maximum cell versions kept; 0 means unlimited.
    #[serde(default)]
    pub max_versions: i64,
    /// Maximum version age in milliseconds; 0 means unlimited.
    #[serde(default)]
    pub max_version_age: i64,
    #[serde(default)]
    pub path_prefix: String,
    #[serde(default)]
    pub column_family: Vec<ColumnFamilyMetadata>,
    #[serde(default)]
    pub data_usage: DataUsage,
}

impl TableMetadata {
    pub fn effective_split_size(&self) -> i64 {
        if self.split_size > 0 {
            self.split_size
        } else {
            DEFAULT_SPLIT_SIZE
        }
    }

    pub fn versions_unlimited(&self) -> bool {
        self.max_versions == 0
    }

    pub fn age_unlimited(&self) -> bool {
        self.max_version_age == 0
    }

    pub fn column_family(&self, name: &str) -> Option<&ColumnFamilyMetadata> {
        self.column_family.iter().find(|cf| cf.name == name)
    }
}

/// On-disk table files belonging to one column family of a tablet.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SsTablePathDescription {
    pub column_family: String,
    #[serde(default)]
    pub major_sstable_path: String,
    #[serde(default)]
    pub minor_sstable_path: String,
    /// Journal files not yet folded into the minor table.
    #[serde(default)]
    pub relevant_journal_paths: Vec<String>,
    #[serde(default)]
    pub major_sstable_size: i64,
    #[serde(default)]
    pub minor_sstable_size: i64,
}

/// One tablet and the data node currently owning it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServerTabletMetadata {
    #[serde(default)]
    pub start_key: Vec<u8>,
    #[serde(default)]
    pub end_key: Vec<u8>,
    pub host: String,
    pub port: i32,
    #[serde(default)]
    pub sstable_path: Vec<SsTablePathDescription>,
}

impl ServerTabletMetadata {
    pub fn key_range(&self) -> KeyRange {
        KeyRange::new(self.start_key.clone(), self.end_key.clone())
    }

    /// `host:port` of the owning data node.
    pub fn endpoint(&self) -> String {
        join_host_port(&self.host, self.port)
    }
}

/// Authoritative routing table of one table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServerTableMetadata {
    pub name: String,
    #[serde(default)]
    pub table_md: TableMetadata,
    #[serde(default)]
    pub tablet: Vec<ServerTabletMetadata>,
}

pub fn decode_table_metadata(raw: &[u8]) -> anyhow::Result<ServerTableMetadata> {
    serde_json::from_slice(raw).context("decode server table metadata")
}

pub fn encode_table_metadata(md: &ServerTableMetadata) -> anyhow::Result<Vec<u8>> {
    serde_json::to_vec(md).context("encode server table metadata")
}
