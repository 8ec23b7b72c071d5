//! Ingest middleware chain.
//!
//! Runtime order on the request path: subnet filter, decrypt, decompress,
//! MAC verify, handler. Decryption runs before decompression because the
//! agent encrypts the already-compressed payload; the MAC is verified last
//! because it covers the plain pre-compression bytes.

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use std::net::IpAddr;

use crate::api::error_response;
use crate::state::AppState;
use metrion_common::{compress, ENCRYPTED_HEADER, GZIP_ENCODING, HASH_HEADER, REAL_IP_HEADER};

const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

/// Rejects requests whose `X-Real-IP` lies outside the trusted subnet.
/// Without a configured subnet every peer is admitted.
pub async fn subnet_filter(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(subnet) = state.trusted_subnet else {
        return next.run(req).await;
    };

    let peer_ip = req
        .headers()
        .get(REAL_IP_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<IpAddr>().ok());

    match peer_ip {
        Some(ip) if subnet.contains(&ip) => next.run(req).await,
        _ => {
            tracing::warn!(subnet = %subnet, "request rejected by subnet filter");
            error_response(StatusCode::FORBIDDEN, "ip is wrong")
        }
    }
}

/// Replaces an `X-Body-Encrypted` body with its RSA-OAEP decryption.
/// Passes through untouched when the header is absent or no private key is
/// configured.
pub async fn decrypt_request(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let flagged = req.headers().contains_key(ENCRYPTED_HEADER);
    let Some(decryptor) = state.decryptor.filter(|_| flagged) else {
        return next.run(req).await;
    };

    let (mut parts, body) = req.into_parts();
    let body_bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, "cannot read encrypted body");
            return error_response(StatusCode::BAD_REQUEST, "cannot read body");
        }
    };

    match decryptor.decrypt(&body_bytes) {
        Ok(plain) => {
            parts.headers.remove(ENCRYPTED_HEADER);
            next.run(Request::from_parts(parts, Body::from(plain))).await
        }
        Err(e) => {
            tracing::warn!(error = %e, "body decryption failed");
            error_response(StatusCode::BAD_REQUEST, "cannot decrypt body")
        }
    }
}

/// Inflates a `Content-Encoding: gzip` body before it reaches the handlers.
pub async fn decompress_request(req: Request, next: Next) -> Response {
    let is_gzip = req
        .headers()
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case(GZIP_ENCODING))
        .unwrap_or(false);
    if !is_gzip {
        return next.run(req).await;
    }

    let (mut parts, body) = req.into_parts();
    let body_bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(error = %e, "cannot read compressed body");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "cannot read body");
        }
    };

    match compress::decode(&body_bytes) {
        Ok(plain) => {
            parts.headers.remove(header::CONTENT_ENCODING);
            next.run(Request::from_parts(parts, Body::from(plain))).await
        }
        Err(e) => {
            tracing::error!(error = %e, "body decompression failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "cannot decompress body")
        }
    }
}

/// Verifies the `HashSHA256` body MAC when both the secret and the header
/// are present. Either one missing skips the check.
pub async fn verify_mac(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let provided = req
        .headers()
        .get(HASH_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let (Some(key), Some(mac)) = (state.hash_key, provided) else {
        return next.run(req).await;
    };

    let (parts, body) = req.into_parts();
    let body_bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, "cannot read body for MAC check");
            return error_response(StatusCode::BAD_REQUEST, "cannot read body");
        }
    };

    if !metrion_common::sign::verify(&key, &body_bytes, &mac) {
        tracing::warn!("body MAC mismatch");
        return error_response(StatusCode::BAD_REQUEST, "signature mismatch");
    }

    next.run(Request::from_parts(parts, Body::from(body_bytes))).await
}
