use std::time::Duration;

/// Configuration of the membership watch sink and reconciliation scanner.
#[derive(Clone, Debug)]
pub struct DiscoveryConfig {
    /// Cluster instance whose data nodes are tracked.
    pub instance: String,
    /// Period between reconciliation scans.
    pub scan_interval: Duration,
    /// Upper bound for one reconciliation prefix scan.
    pub scan_timeout: Duration,
    /// Upper bound for each registry add/remove issued by the watch sink.
    pub registry_timeout: Duration,
    /// Subscribe again after the change feed ends instead of stopping.
    pub resubscribe_on_cancel: bool,
    /// Pause before resubscribing.
    pub resubscribe_backoff: Duration,
}

impl DiscoveryConfig {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
            ..Self::default()
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            instance: "default".to_string(),
            scan_interval: Duration::from_secs(5 * 60),
            scan_timeout: Duration::from_secs(20),
            registry_timeout: Duration::from_secs(20),
            resubscribe_on_cancel: false,
            resubscribe_backoff: Duration::from_secs(1),
        }
    }
}

#[derive(clap::Args, Debug, Clone)]
pub struct DiscoveryArgs {
    /// red-cloud instance name.
    #[arg(long = "instance", env = "REDCLOUD_INSTANCE", default_value = "default")]
    pub instance: String,

    /// Period between reconciliation scans.
    #[arg(long, env = "REDCLOUD_SCAN_INTERVAL_MS", default_value_t = 300_000)]
    pub scan_interval_ms: u64,

    /// Timeout for one reconciliation scan.
    #[arg(long, env = "REDCLOUD_SCAN_TIMEOUT_MS", default_value_t = 20_000)]
    pub scan_timeout_ms: u64,

    /// Timeout for registry updates issued from watch events.
    #[arg(long, env = "REDCLOUD_REGISTRY_TIMEOUT_MS", default_value_t = 20_000)]
    pub registry_timeout_ms: u64,

    /// Resubscribe to the membership feed when it is cancelled.
    #[arg(long, env = "REDCLOUD_RESUBSCRIBE_ON_CANCEL")]
    pub resubscribe_on_cancel: bool,

    #[arg(long, env = "REDCLOUD_RESUBSCRIBE_BACKOFF_MS", default_value_t = 1_000)]
    pub resubscribe_backoff_ms: u64,
}

impl From<DiscoveryArgs> for DiscoveryConfig {
    fn from(args: DiscoveryArgs) -> Self {
        Self {
            instance: args.instance,
            scan_interval: Duration::from_millis(args.scan_interval_ms.max(1)),
            scan_timeout: Duration::from_millis(args.scan_timeout_ms.max(1)),
            registry_timeout: Duration::from_millis(args.registry_timeout_ms.max(1)),
            resubscribe_on_cancel: args.resubscribe_on_cancel,
            resubscribe_backoff: Duration::from_millis(args.resubscribe_backoff_ms),
        }
    }
}
