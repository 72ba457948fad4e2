//! Observability sink injected into the client and discovery components.
//!
//! Components only emit named counters; which backend receives them is up to
//! whoever assembles the process.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

pub trait MetricsSink: Send + Sync + 'static {
    fn incr(&self, name: &'static str);

    fn incr_labeled(&self, name: &'static str, label: &'static str, value: &'static str);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn incr(&self, _name: &'static str) {}

    fn incr_labeled(&self, _name: &'static str, _label: &'static str, _value: &'static str) {}
}

type CounterKey = (&'static str, Option<(&'static str, &'static str)>);

/// In-process counters keyed by name and optional label pair.
#[derive(Debug, Default)]
pub struct CounterMetrics {
    counters: Mutex<BTreeMap<CounterKey, Arc<AtomicU64>>>,
}

impl CounterMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &'static str) -> u64 {
        self.load(&(name, None))
    }

    pub fn get_labeled(&self, name: &'static str, label: &'static str, value: &'static str) -> u64 {
        self.load(&(name, Some((label, value))))
    }

    /// Current value of every counter, rendered as `name` or `name{label=value}`.
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        let Ok(counters) = self.counters.lock() else {
            return BTreeMap::new();
        };
        counters
            .iter()
            .map(|((name, labels), counter)| {
                let key = match labels {
                    Some((label, value)) => format!("{name}{{{label}={value}}}"),
                    None => (*name).to_string(),
                };
                (key, counter.load(Ordering::Relaxed))
            })
            .collect()
    }

    fn counter(&self, key: CounterKey) -> Option<Arc<AtomicU64>> {
        let mut counters = self.counters.lock().ok()?;
        Some(counters.entry(key).or_default().clone())
    }

    fn load(&self, key: &CounterKey) -> u64 {
        self.counters
            .lock()
            .ok()
            .and_then(|counters| counters.get(key).map(|c| c.load(Ordering::Relaxed)))
            .unwrap_or(0)
    }
}

impl MetricsSink for CounterMetrics {
    fn incr(&self, name: &'static str) {
        if let Some(counter) = self.counter((name, None)) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn incr_labeled(&self, name: &'static str, label: &'static str, value: &'static str) {
        if let Some(counter) = self.counter((name, Some((label, value)))) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }
}
