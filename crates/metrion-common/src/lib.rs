//! Shared metric model and payload pipeline for the metrion agent and server.
//!
//! The wire envelope ([`metric::Metric`]) and its JSON shape are identical on
//! the HTTP and gRPC ingest paths; the gRPC frame simply wraps the same JSON
//! array in a bytes field.

pub mod compress;
pub mod crypto;
pub mod metric;
pub mod sign;

pub mod proto {
    #![allow(clippy::pedantic)]
    #![allow(clippy::missing_errors_doc)]
    #![allow(clippy::doc_markdown)]
    #![allow(clippy::default_trait_access)]
    tonic::include_proto!("metrion");
}

/// Request header carrying the hex HMAC-SHA-256 of the (pre-compression)
/// request body.
pub const HASH_HEADER: &str = "HashSHA256";

/// Request header flagging an RSA-OAEP encrypted body.
pub const ENCRYPTED_HEADER: &str = "X-Body-Encrypted";

/// Request header carrying the originating agent IP for the subnet filter.
pub const REAL_IP_HEADER: &str = "X-Real-IP";

/// `Content-Encoding` value understood by both sides.
pub const GZIP_ENCODING: &str = "gzip";
