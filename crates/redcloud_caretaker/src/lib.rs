//! Data-node membership discovery for the red-cloud caretaker.
//!
//! Two independent consumers keep a [`NodeRegistry`] in step with the data
//! nodes exported in the coordination store: the [`WatchSink`] applies
//! pushed change notifications, and the [`Reconciler`] periodically lists
//! the discovery prefix to pick up nodes whose notifications were missed.
//! Both only call idempotent add/remove, so their races converge.

pub mod config;
pub mod error;
pub mod reconcile;
pub mod registry;
pub mod supervisor;
pub mod watch;

pub use config::{DiscoveryArgs, DiscoveryConfig};
pub use error::WatchError;
pub use reconcile::{Reconciler, ScanOutcome};
pub use registry::{NodeRegistry, RegisteredNode};
pub use supervisor::Discovery;
pub use watch::{WatchExit, WatchSink};
