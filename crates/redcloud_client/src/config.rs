use std::time::Duration;

/// Runtime configuration of a [`crate::DataAccessClient`].
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Cluster instance whose tables are accessed.
    pub instance: String,
    /// Upper bound for one table-metadata read from the coordination store.
    pub metadata_timeout: Duration,
    /// Upper bound for one data-node RPC, further capped by the call deadline.
    pub rpc_timeout: Duration,
}

impl ClientConfig {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
            ..Self::default()
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            instance: "default".to_string(),
            metadata_timeout: Duration::from_secs(10),
            rpc_timeout: Duration::from_secs(10),
        }
    }
}

/// Command-line / environment options for embedding binaries.
#[derive(clap::Args, Debug, Clone)]
pub struct ClientArgs {
    /// red-cloud instance name.
    #[arg(long = "instance", env = "REDCLOUD_INSTANCE", default_value = "default")]
    pub instance: String,

    /// Timeout for table metadata reads.
    #[arg(long, env = "REDCLOUD_METADATA_TIMEOUT_MS", default_value_t = 10_000)]
    pub metadata_timeout_ms: u64,

    /// Timeout for individual data node RPCs.
    #[arg(long, env = "REDCLOUD_RPC_TIMEOUT_MS", default_value_t = 10_000)]
    pub rpc_timeout_ms: u64,
}

impl From<ClientArgs> for ClientConfig {
    fn from(args: ClientArgs) -> Self {
        Self {
            instance: args.instance,
            metadata_timeout: Duration::from_millis(args.metadata_timeout_ms.max(1)),
            rpc_timeout: Duration::from_millis(args.rpc_timeout_ms.max(1)),
        }
    }
}
