use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Http,
    Grpc,
}

#[derive(Debug, Deserialize)]
pub struct AgentConfig {
    /// Server base URL (`http://host:port`).
    pub server_url: String,
    #[serde(default = "default_transport")]
    pub transport: TransportKind,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,
    /// Send-pool worker count.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: usize,
    /// Shared secret for the body MAC; signing is off when unset.
    pub hash_key: Option<String>,
    /// Path to the server's public key PEM; encryption is off when unset.
    pub crypto_key: Option<String>,
}

fn default_transport() -> TransportKind {
    TransportKind::Http
}

fn default_poll_interval() -> u64 {
    2
}

fn default_report_interval() -> u64 {
    10
}

fn default_rate_limit() -> usize {
    4
}

impl AgentConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_fills_defaults() {
        let config: AgentConfig = toml::from_str(r#"server_url = "http://127.0.0.1:8080""#).unwrap();
        assert_eq!(config.transport, TransportKind::Http);
        assert_eq!(config.poll_interval_secs, 2);
        assert_eq!(config.report_interval_secs, 10);
        assert_eq!(config.rate_limit, 4);
        assert!(config.hash_key.is_none());
    }

    #[test]
    fn grpc_transport_parses() {
        let config: AgentConfig = toml::from_str(
            r#"
server_url = "http://127.0.0.1:9090"
transport = "grpc"
rate_limit = 2
hash_key = "s3cret"
"#,
        )
        .unwrap();
        assert_eq!(config.transport, TransportKind::Grpc);
        assert_eq!(config.rate_limit, 2);
        assert_eq!(config.hash_key.as_deref(), Some("s3cret"));
    }
}
