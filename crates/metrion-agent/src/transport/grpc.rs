use super::{Reply, Transport, TransportError};
use async_trait::async_trait;
use metrion_common::proto::metrics_service_client::MetricsServiceClient;
use metrion_common::proto::MetricsRequest;
use tonic::metadata::{MetadataKey, MetadataValue};
use tonic::transport::Channel;
use tonic::Code;

pub struct GrpcTransport {
    // lazily connected and reused across requests; a send failure drops the
    // channel so the next request reconnects
    client: tokio::sync::Mutex<Option<MetricsServiceClient<Channel>>>,
}

impl GrpcTransport {
    pub fn new() -> Self {
        Self {
            client: tokio::sync::Mutex::new(None),
        }
    }
}

/// Maps an RPC status onto its HTTP-equivalent code for uniform reporting.
pub fn http_status_for(code: Code) -> u16 {
    match code {
        Code::Ok => 200,
        Code::InvalidArgument => 400,
        Code::Unauthenticated => 401,
        Code::PermissionDenied => 403,
        Code::NotFound => 404,
        Code::Cancelled => 408,
        Code::AlreadyExists | Code::Aborted => 409,
        Code::FailedPrecondition => 412,
        Code::ResourceExhausted => 429,
        Code::Internal | Code::DataLoss => 500,
        Code::Unimplemented => 501,
        Code::Unavailable => 503,
        Code::DeadlineExceeded => 504,
        _ => 418,
    }
}

#[async_trait]
impl Transport for GrpcTransport {
    fn name(&self) -> &'static str {
        "grpc"
    }

    fn needs_manual_compression(&self) -> bool {
        false
    }

    async fn post(
        &self,
        url: &str,
        body: &[u8],
        headers: &[(String, String)],
    ) -> Result<Reply, TransportError> {
        let mut guard = self.client.lock().await;
        if guard.is_none() {
            let client = MetricsServiceClient::connect(url.to_string())
                .await
                .map_err(|e| TransportError::Rpc(e.to_string()))?;
            *guard = Some(client);
        }
        let client = guard.as_mut().expect("client connected above");

        let mut request = tonic::Request::new(MetricsRequest {
            body: body.to_vec(),
        });
        for (name, value) in headers {
            let key = MetadataKey::from_bytes(name.to_ascii_lowercase().as_bytes())
                .map_err(|_| TransportError::BadHeader(name.clone()))?;
            let value: MetadataValue<_> = value
                .parse()
                .map_err(|_| TransportError::BadHeader(value.clone()))?;
            request.metadata_mut().insert(key, value);
        }

        match client.handle_metrics(request).await {
            Ok(response) => {
                let response = response.into_inner();
                Ok(Reply {
                    status: 200,
                    message: response.message,
                })
            }
            Err(status) if status.code() == Code::Unavailable => {
                // connection went away; reconnect on the next attempt
                *guard = None;
                Ok(Reply {
                    status: http_status_for(Code::Unavailable),
                    message: status.message().to_string(),
                })
            }
            Err(status) => Ok(Reply {
                status: http_status_for(status.code()),
                message: status.message().to_string(),
            }),
        }
    }
}
