use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::config::UpstreamSection;

use super::error::{FetchError, ProxyError, ProxyResult};
use super::types::UpstreamResponse;

/// Outbound GET used by the proxy. A transport failure is returned as
/// [`FetchError`], never as a response.
#[async_trait]
pub trait UpstreamFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<UpstreamResponse, FetchError>;
}

/// reqwest-backed fetcher: follows redirects, bounded by a total timeout,
/// buffers the whole body.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &UpstreamSection) -> ProxyResult<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout())
            .build()
            .map_err(|err| ProxyError::Client(err.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl UpstreamFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<UpstreamResponse, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let final_url = response.url().clone();
        let body = response.bytes().await?;
        debug!(%url, final_url = %final_url, %status, bytes = body.len(), "upstream fetched");
        Ok(UpstreamResponse {
            status,
            headers,
            final_url,
            body,
        })
    }
}
