//! Shared types for red-cloud clients and cluster services.
//!
//! Key ranges, the table metadata schema, discovery records and the
//! coordination-store key layout, plus the capability traits other crates
//! consume (coordination store, metrics sink).

pub mod discovery;
pub mod key_range;
pub mod metadata;
pub mod metrics;
pub mod store;

pub use discovery::DiscoveryRecord;
pub use key_range::KeyRange;
pub use metadata::{ServerTableMetadata, ServerTabletMetadata, TableMetadata};
pub use metrics::{CounterMetrics, MetricsSink, NoopMetrics};
pub use store::{CoordinationStore, KeyValue, MemoryStore, WatchEvent, WatchStream};
