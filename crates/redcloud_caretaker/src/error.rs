use thiserror::Error;

/// Conditions that end membership discovery.
#[derive(Error, Debug)]
pub enum WatchError {
    /// The change feed reported that it cannot make progress. The owning
    /// process is expected to terminate.
    #[error("membership feed failed fatally")]
    Fatal(#[source] anyhow::Error),

    /// Subscribing to the change feed failed.
    #[error("failed to subscribe to membership feed")]
    Subscribe(#[source] anyhow::Error),
}
