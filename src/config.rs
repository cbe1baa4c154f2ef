use serde::{Deserialize, Serialize};

/// Library configuration
///
/// Everything has a sensible default so embedders can construct the registry
/// without a config file; `load_config` overlays `flow_trace.*` file values
/// and `FLOW_TRACE__`-prefixed environment variables.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FlowTraceConfig {
    pub store: StoreConfig,
    pub notifier: NotifierConfig,
    pub cleanup: CleanupSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database URL for the durable store
    pub database_url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Max pending change events before drop-oldest kicks in
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CleanupSettings {
    pub enabled: bool,
    /// Terminal sessions older than this are purged (cascading to steps,
    /// logs, and transparency records)
    pub ttl_days: i64,
    /// Hour of day (0-23) to run the purge
    pub cleanup_hour: u32,
    pub check_interval_seconds: u64,
}

impl Default for FlowTraceConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            notifier: NotifierConfig::default(),
            cleanup: CleanupSettings::default(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:./data/flow_trace.db".to_string(),
        }
    }
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
        }
    }
}

impl Default for CleanupSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_days: 30,
            cleanup_hour: 3,
            check_interval_seconds: 3600,
        }
    }
}

pub fn load_config() -> anyhow::Result<FlowTraceConfig> {
    let config = config::Config::builder()
        .add_source(config::File::with_name("flow_trace").required(false))
        .add_source(config::Environment::with_prefix("FLOW_TRACE").separator("__"))
        .build()?;

    let cfg: FlowTraceConfig = config.try_deserialize()?;
    validate_config(&cfg)?;

    Ok(cfg)
}

fn validate_config(cfg: &FlowTraceConfig) -> anyhow::Result<()> {
    if cfg.store.database_url.is_empty() {
        anyhow::bail!("store.database_url must not be empty");
    }

    if cfg.notifier.queue_capacity == 0 {
        anyhow::bail!("notifier.queue_capacity must be at least 1");
    }

    if cfg.cleanup.ttl_days <= 0 {
        anyhow::bail!("cleanup.ttl_days must be positive");
    }

    if cfg.cleanup.cleanup_hour > 23 {
        anyhow::bail!("cleanup.cleanup_hour must be 0-23");
    }

    Ok(())
}
