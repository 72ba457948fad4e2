//! Client library for red-cloud tables.
//!
//! Users address data by (table, key, column family, column); the client
//! finds the data node serving each key from table metadata in the
//! coordination store, caches that mapping, and refreshes it when a node
//! reports that it no longer serves the tablet.

pub mod client;
pub mod config;
pub mod error;
pub mod location_cache;
pub mod rpc;

pub use client::{CallContext, DataAccessClient};
pub use config::{ClientArgs, ClientConfig};
pub use error::{ClientError, RpcError};
pub use location_cache::{LocationCache, RouteQuery, TabletRoute};
pub use rpc::{
    Column, ColumnSet, ColumnSetStream, DataNode, Dialer, GetRangeRequest, GetRequest,
    InsertRequest,
};
