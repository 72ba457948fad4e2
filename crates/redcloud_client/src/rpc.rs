//! Data-node RPC surface consumed by the client.
//!
//! The data-node service itself lives elsewhere; this module only names the
//! calls the client makes and the messages it exchanges.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;

use crate::error::RpcError;

/// One version of one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub content: Bytes,
    /// Version timestamp in milliseconds since the epoch.
    pub timestamp: i64,
}

/// All requested columns of one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSet {
    pub key: Bytes,
    pub column_family: String,
    pub columns: Vec<Column>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetRequest {
    pub table: String,
    pub key: Bytes,
    pub column_family: String,
    pub column: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetRangeRequest {
    pub table: String,
    pub start_key: Bytes,
    /// Exclusive; empty means unbounded.
    pub end_key: Bytes,
    pub column_family: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertRequest {
    pub table: String,
    pub key: Bytes,
    pub column_family: String,
    pub column: String,
    pub value: Bytes,
}

/// Streamed range results; the stream ending signals completion.
pub type ColumnSetStream = BoxStream<'static, Result<ColumnSet, RpcError>>;

/// Open channel to one data node.
#[async_trait]
pub trait DataNode: Send + Sync + 'static {
    async fn get(&self, req: &GetRequest) -> Result<Column, RpcError>;

    async fn get_range(&self, req: &GetRangeRequest) -> Result<ColumnSetStream, RpcError>;

    async fn insert(&self, req: &InsertRequest) -> Result<(), RpcError>;
}

/// Opens channels to data nodes by `host:port`.
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    async fn dial(&self, endpoint: &str) -> anyhow::Result<Arc<dyn DataNode>>;
}
