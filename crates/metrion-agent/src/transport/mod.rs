//! Pluggable report transports.
//!
//! The send pool hands every transport the same artifact: the (possibly
//! compressed, possibly encrypted) payload bytes plus the pipeline headers.
//! HTTP carries the headers literally; gRPC carries them as request
//! metadata and maps the response status back onto HTTP-equivalent codes so
//! the shipper reports uniformly.

pub mod grpc;
pub mod http;

use async_trait::async_trait;

pub use grpc::GrpcTransport;
pub use http::HttpTransport;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("rpc transport failed: {0}")]
    Rpc(String),
    #[error("header value is not transmittable: {0}")]
    BadHeader(String),
}

/// Outcome of one delivered request, normalized to HTTP semantics.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub message: String,
}

impl Reply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Transport name for logging.
    fn name(&self) -> &'static str;

    /// Whether the pool must gzip the payload itself. The gRPC channel
    /// compresses frames on its own; HTTP bodies are compressed by the pool.
    fn needs_manual_compression(&self) -> bool;

    /// Delivers one payload. Protocol-level rejections come back as a
    /// [`Reply`] with a non-2xx status; only delivery failures are `Err`.
    async fn post(
        &self,
        url: &str,
        body: &[u8],
        headers: &[(String, String)],
    ) -> Result<Reply, TransportError>;
}
