mod error;
mod fetch;
mod headers;
pub mod rewrite;
pub mod server;
mod types;

use std::fmt;
use std::sync::Arc;

use axum::http::header;
use bytes::Bytes;
use tracing::{info, warn};

use crate::config::UpstreamSection;

pub use error::{FetchError, ProxyError, ProxyResult};
pub use fetch::{HttpFetcher, UpstreamFetcher};
pub use headers::{is_manifest, sanitize_headers, STRIPPED_HEADERS};
pub use rewrite::{ManifestLine, RewriteContext};
pub use server::{router, ProxyServer, ServerError};
pub use types::{normalize_base, ProxyRequest, ProxyResponse, UpstreamResponse};

/// How an upstream body is returned to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Manifest,
    Opaque,
}

/// Stateless HLS proxy: fetch, classify, rewrite playlists, relax CORS.
pub struct ManifestProxy {
    fetcher: Arc<dyn UpstreamFetcher>,
}

impl fmt::Debug for ManifestProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManifestProxy").finish_non_exhaustive()
    }
}

impl ManifestProxy {
    pub fn new(config: &UpstreamSection) -> ProxyResult<Self> {
        Ok(Self::with_fetcher(Arc::new(HttpFetcher::new(config)?)))
    }

    pub fn with_fetcher(fetcher: Arc<dyn UpstreamFetcher>) -> Self {
        Self { fetcher }
    }

    pub async fn handle(&self, request: ProxyRequest) -> ProxyResponse {
        match self.proxy(&request).await {
            Ok(response) => response,
            Err(error) => {
                warn!(url = ?request.url, %error, "proxy request failed");
                ProxyResponse::from_error(&error)
            }
        }
    }

    async fn proxy(&self, request: &ProxyRequest) -> ProxyResult<ProxyResponse> {
        let url = request.target().ok_or(ProxyError::MissingUrl)?;
        let upstream = self.fetcher.fetch(url).await?;
        let kind = if upstream.status.is_success()
            && is_manifest(upstream.content_type(), url)
        {
            BodyKind::Manifest
        } else {
            BodyKind::Opaque
        };
        info!(%url, status = %upstream.status, ?kind, "proxying upstream response");
        Ok(build_response(upstream, kind, url, &request.proxy_base))
    }
}

fn build_response(
    upstream: UpstreamResponse,
    kind: BodyKind,
    url: &str,
    proxy_base: &url::Url,
) -> ProxyResponse {
    let mut headers = sanitize_headers(&upstream.headers);
    if kind == BodyKind::Opaque {
        return ProxyResponse {
            status: upstream.status,
            headers,
            body: upstream.body,
        };
    }

    let context = RewriteContext::new(upstream.final_url.clone(), proxy_base.clone());
    let rewritten =
        std::str::from_utf8(&upstream.body).map(|text| rewrite::rewrite_manifest(text, &context));
    match rewritten {
        Ok(rewritten) => {
            headers.remove(header::CONTENT_LENGTH);
            ProxyResponse {
                status: upstream.status,
                headers,
                body: Bytes::from(rewritten),
            }
        }
        Err(error) => {
            warn!(%url, %error, "manifest body is not utf-8; passing through unmodified");
            ProxyResponse {
                status: upstream.status,
                headers,
                body: upstream.body,
            }
        }
    }
}
