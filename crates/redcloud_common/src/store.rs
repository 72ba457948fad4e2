//! Coordination-store capability and an in-memory implementation.
//!
//! The store is an etcd-like strongly consistent key/value service. Only the
//! three calls this workspace needs are modelled: point get, prefix listing,
//! and a prefix-scoped change feed.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{BoxStream, StreamExt};
use tokio::sync::mpsc;

/// One stored key/value pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: Bytes,
}

/// Notification delivered by a prefix watch.
///
/// The stream ending means the subscription was cancelled.
#[derive(Debug)]
pub enum WatchEvent {
    /// A key was written. `created` is false when an existing key was overwritten.
    Put {
        key: String,
        value: Bytes,
        created: bool,
    },
    /// A key was removed; `prev_value` is the value it held, when known.
    Delete {
        key: String,
        prev_value: Option<Bytes>,
    },
    /// Recoverable feed error; the subscription stays active.
    Error(anyhow::Error),
    /// The feed cannot make progress any more.
    Fatal(anyhow::Error),
}

pub type WatchStream = BoxStream<'static, WatchEvent>;

#[async_trait]
pub trait CoordinationStore: Send + Sync + 'static {
    async fn get(&self, key: &str) -> anyhow::Result<Option<KeyValue>>;

    /// Lists every key starting with `prefix`, in key order.
    async fn get_prefix(&self, prefix: &str) -> anyhow::Result<Vec<KeyValue>>;

    async fn watch_prefix(&self, prefix: &str) -> anyhow::Result<WatchStream>;
}

struct Watcher {
    prefix: String,
    tx: mpsc::UnboundedSender<WatchEvent>,
}

/// Process-local coordination store.
///
/// Reads can be made to fail with [`MemoryStore::set_unavailable`], and
/// watchers can be sent errors or closed, so callers' failure handling can
/// be exercised without a real cluster.
#[derive(Default)]
pub struct MemoryStore {
    data: RwLock<BTreeMap<String, Bytes>>,
    watchers: Mutex<Vec<Watcher>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, key: impl Into<String>, value: impl Into<Bytes>) {
        let key = key.into();
        let value = value.into();
        let Ok(mut data) = self.data.write() else {
            return;
        };
        let created = data.insert(key.clone(), value.clone()).is_none();
        // Held across notify: watchers see writes in apply order.
        self.notify(&key, || WatchEvent::Put {
            key: key.clone(),
            value: value.clone(),
            created,
        });
    }

    /// Removes `key`, returning whether it existed.
    pub fn delete(&self, key: &str) -> bool {
        let Ok(mut data) = self.data.write() else {
            return false;
        };
        let Some(prev) = data.remove(key) else {
            return false;
        };
        self.notify(key, || WatchEvent::Delete {
            key: key.to_string(),
            prev_value: Some(prev.clone()),
        });
        true
    }

    /// Makes `get`/`get_prefix` fail while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Sends an error to every active watcher.
    pub fn fail_watchers(&self, fatal: bool, message: &str) {
        let Ok(mut watchers) = self.watchers.lock() else {
            return;
        };
        watchers.retain(|w| {
            let err = anyhow::anyhow!("{message}");
            let event = if fatal {
                WatchEvent::Fatal(err)
            } else {
                WatchEvent::Error(err)
            };
            w.tx.send(event).is_ok()
        });
    }

    /// Ends every active watch stream.
    pub fn close_watchers(&self) {
        if let Ok(mut watchers) = self.watchers.lock() {
            watchers.clear();
        }
    }

    pub fn watcher_count(&self) -> usize {
        self.watchers
            .lock()
            .map(|mut watchers| {
                watchers.retain(|w| !w.tx.is_closed());
                watchers.len()
            })
            .unwrap_or(0)
    }

    fn notify(&self, key: &str, event: impl Fn() -> WatchEvent) {
        let Ok(mut watchers) = self.watchers.lock() else {
            return;
        };
        watchers.retain(|w| !key.starts_with(&w.prefix) || w.tx.send(event()).is_ok());
    }

    fn check_available(&self) -> anyhow::Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            anyhow::bail!("coordination store unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<KeyValue>> {
        self.check_available()?;
        let guard = self
            .data
            .read()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        Ok(guard.get(key).map(|value| KeyValue {
            key: key.to_string(),
            value: value.clone(),
        }))
    }

    async fn get_prefix(&self, prefix: &str) -> anyhow::Result<Vec<KeyValue>> {
        self.check_available()?;
        let guard = self
            .data
            .read()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        Ok(guard
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| KeyValue {
                key: key.clone(),
                value: value.clone(),
            })
            .collect())
    }

    async fn watch_prefix(&self, prefix: &str) -> anyhow::Result<WatchStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.watchers
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?
            .push(Watcher {
                prefix: prefix.to_string(),
                tx,
            });
        let stream = futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });
        Ok(stream.boxed())
    }
}
