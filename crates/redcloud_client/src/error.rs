//! Error kinds surfaced by the data-access client.

use thiserror::Error;

/// Failure reported by a single data-node RPC.
#[derive(Error, Debug)]
pub enum RpcError {
    /// The node does not (or no longer) serve the tablet holding the key.
    /// The only condition that invalidates cached routing.
    #[error("tablet not loaded on data node")]
    TabletNotLoaded,

    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

/// Failure of a Get / GetRange / Insert call.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The table's routing entry exists but lists no tablets, or no entry
    /// covers the requested key.
    #[error("no data nodes could be found for table {table}")]
    NoDataNodes { table: String },

    #[error("table metadata for {table} is corrupt")]
    CorruptMetadata {
        table: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("data node {endpoint} is unreachable")]
    EndpointUnreachable {
        endpoint: String,
        #[source]
        source: anyhow::Error,
    },

    /// More than one tablet claims the same key.
    #[error("{matches} tablets of table {table} claim key {key:?}")]
    AmbiguousRouting {
        table: String,
        key: Vec<u8>,
        matches: usize,
    },

    #[error("coordination store request failed")]
    Coordination(#[source] anyhow::Error),

    #[error("data node {endpoint} request failed")]
    Rpc {
        endpoint: String,
        #[source]
        source: anyhow::Error,
    },

    /// Returned only by range reads, which are not retried on this condition.
    #[error("tablet not loaded on data node {endpoint}")]
    TabletNotLoaded { endpoint: String },

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("request cancelled")]
    Cancelled,

    /// The caller dropped the receiving side of a range result sink.
    #[error("range result sink closed")]
    SinkClosed,
}

impl ClientError {
    /// Returns `true` for the caller's own deadline or cancellation.
    pub fn is_terminal_context(&self) -> bool {
        matches!(self, ClientError::DeadlineExceeded | ClientError::Cancelled)
    }
}

pub type Result<T, E = ClientError> = std::result::Result<T, E>;
