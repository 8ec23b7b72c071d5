use super::{Reply, Transport, TransportError};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use std::time::Duration;

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    fn needs_manual_compression(&self) -> bool {
        true
    }

    async fn post(
        &self,
        url: &str,
        body: &[u8],
        headers: &[(String, String)],
    ) -> Result<Reply, TransportError> {
        let mut header_map = HeaderMap::new();
        header_map.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for (name, value) in headers {
            let name: HeaderName = name
                .parse()
                .map_err(|_| TransportError::BadHeader(name.clone()))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| TransportError::BadHeader(value.clone()))?;
            header_map.insert(name, value);
        }

        let response = self
            .client
            .post(format!("{}/updates", url.trim_end_matches('/')))
            .headers(header_map)
            .body(body.to_vec())
            .send()
            .await?;

        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        Ok(Reply { status, message })
    }
}
