//! gRPC ingest service.
//!
//! `HandleMetrics` carries the same JSON array as the HTTP `/updates` path
//! inside a bytes frame, with the pipeline headers as request metadata. The
//! middleware stages run inline here, in the same order as the HTTP chain:
//! subnet, decrypt, MAC, parse, apply.

use crate::state::AppState;
use metrion_common::metric::merge_batch;
use metrion_common::metric::Metric;
use metrion_common::proto::metrics_service_server::MetricsService;
use metrion_common::proto::{MetricsRequest, MetricsResponse};
use metrion_common::sign;
use std::net::IpAddr;
use tonic::{Request, Response, Status};

pub struct MetricsServiceImpl {
    state: AppState,
}

impl MetricsServiceImpl {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

fn metadata_str<'a>(request: &'a Request<MetricsRequest>, key: &str) -> Option<&'a str> {
    request.metadata().get(key).and_then(|v| v.to_str().ok())
}

#[tonic::async_trait]
impl MetricsService for MetricsServiceImpl {
    async fn handle_metrics(
        &self,
        request: Request<MetricsRequest>,
    ) -> Result<Response<MetricsResponse>, Status> {
        if let Some(subnet) = self.state.trusted_subnet {
            let peer_ip = metadata_str(&request, "x-real-ip").and_then(|v| v.parse::<IpAddr>().ok());
            match peer_ip {
                Some(ip) if subnet.contains(&ip) => {}
                _ => {
                    tracing::warn!(subnet = %subnet, "rpc request rejected by subnet filter");
                    return Err(Status::permission_denied("ip is wrong"));
                }
            }
        }

        let encrypted = request.metadata().contains_key("x-body-encrypted");
        let provided_mac = metadata_str(&request, "hashsha256").map(str::to_string);
        let body = request.into_inner().body;

        let body = match (&self.state.decryptor, encrypted) {
            (Some(decryptor), true) => decryptor.decrypt(&body).map_err(|e| {
                tracing::warn!(error = %e, "rpc body decryption failed");
                Status::invalid_argument("cannot decrypt body")
            })?,
            _ => body,
        };

        if let (Some(key), Some(mac)) = (&self.state.hash_key, provided_mac) {
            if !sign::verify(key, &body, &mac) {
                tracing::warn!("rpc body MAC mismatch");
                return Err(Status::invalid_argument("signature mismatch"));
            }
        }

        let batch: Vec<Metric> = serde_json::from_slice(&body)
            .map_err(|e| Status::invalid_argument(format!("invalid json: {e}")))?;
        let merged =
            merge_batch(&batch).map_err(|e| Status::invalid_argument(e.to_string()))?;

        if let Err(e) = self.state.storage.set_gauges(&merged.gauges).await {
            tracing::error!(error = %e, "rpc gauge update failed");
            return Err(Status::internal("storage failure"));
        }
        if let Err(e) = self.state.storage.add_counters(&merged.counters).await {
            tracing::error!(error = %e, "rpc counter update failed");
            return Err(Status::internal("storage failure"));
        }

        tracing::debug!(count = merged.len(), "rpc batch ingested");

        Ok(Response::new(MetricsResponse {
            status: "ok".to_string(),
            message: format!("{} metrics applied", merged.len()),
        }))
    }
}
