use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address.
    #[serde(default = "default_address")]
    pub address: String,
    /// gRPC listen address.
    #[serde(default = "default_grpc_address")]
    pub grpc_address: String,
    /// Seconds between background flushes; `0` switches to sync mode, where
    /// every write is flushed before its call returns.
    #[serde(default = "default_store_interval_secs")]
    pub store_interval_secs: u64,
    /// Snapshot file path; unset disables the file back-end.
    #[serde(default)]
    pub file_storage_path: Option<String>,
    /// Database path; set, it takes precedence over the snapshot file.
    #[serde(default)]
    pub database_dsn: Option<String>,
    /// Replay the durable state into memory on startup.
    #[serde(default = "default_restore")]
    pub restore: bool,
    /// Shared secret for the body MAC; verification is off when unset.
    #[serde(default)]
    pub hash_key: Option<String>,
    /// Path to the private key PEM; body decryption is off when unset.
    #[serde(default)]
    pub crypto_key: Option<String>,
    /// Trusted CIDR for the ingress filter; unset admits every peer.
    #[serde(default)]
    pub trusted_subnet: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            grpc_address: default_grpc_address(),
            store_interval_secs: default_store_interval_secs(),
            file_storage_path: None,
            database_dsn: None,
            restore: default_restore(),
            hash_key: None,
            crypto_key: None,
            trusted_subnet: None,
            log_level: default_log_level(),
        }
    }
}

fn default_address() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_grpc_address() -> String {
    "127.0.0.1:9090".to_string()
}

fn default_store_interval_secs() -> u64 {
    300
}

fn default_restore() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ServerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn is_sync_mode(&self) -> bool {
        self.store_interval_secs == 0
    }
}
