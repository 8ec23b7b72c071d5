use chrono::{DateTime, Utc};
use ipnet::IpNet;
use metrion_common::crypto::BodyDecryptor;
use metrion_storage::SyncStorage;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn SyncStorage>,
    /// Shared secret for MAC verification; `None` skips the check.
    pub hash_key: Option<Arc<String>>,
    /// Private key for body decryption; `None` skips the stage.
    pub decryptor: Option<Arc<BodyDecryptor>>,
    /// Ingress filter CIDR; `None` admits every peer.
    pub trusted_subnet: Option<IpNet>,
    pub start_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(storage: Arc<dyn SyncStorage>) -> Self {
        Self {
            storage,
            hash_key: None,
            decryptor: None,
            trusted_subnet: None,
            start_time: Utc::now(),
        }
    }

    pub fn with_hash_key(mut self, key: impl Into<String>) -> Self {
        self.hash_key = Some(Arc::new(key.into()));
        self
    }

    pub fn with_decryptor(mut self, decryptor: Arc<BodyDecryptor>) -> Self {
        self.decryptor = Some(decryptor);
        self
    }

    pub fn with_trusted_subnet(mut self, subnet: IpNet) -> Self {
        self.trusted_subnet = Some(subnet);
        self
    }
}
