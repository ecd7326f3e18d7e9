//! Push gateway transport

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::payload::PushPayload;
use crate::types::{HeraldError, Result};

/// Delivers one push payload
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn send(&self, payload: &PushPayload) -> Result<()>;
}

/// Push gateway reached over HTTP (`POST <base>/push`)
pub struct HttpPushGateway {
    endpoint: String,
    http_client: reqwest::Client,
}

impl HttpPushGateway {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("herald/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| HeraldError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: format!("{}/push", base_url.trim_end_matches('/')),
            http_client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl PushTransport for HttpPushGateway {
    async fn send(&self, payload: &PushPayload) -> Result<()> {
        let response = self.http_client.post(&self.endpoint).json(payload).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HeraldError::Upstream(format!(
                "push gateway returned HTTP {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        debug!(platform = %payload.platform, "Push accepted by gateway");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_base() {
        let gateway = HttpPushGateway::new("http://push.local:9101/", Duration::from_secs(1)).unwrap();
        assert_eq!(gateway.endpoint(), "http://push.local:9101/push");
    }
}
