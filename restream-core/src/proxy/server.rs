use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, Method};
use axum::routing::get;
use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use url::Url;

use crate::config::RestreamConfig;

use super::types::normalize_base;
use super::{ManifestProxy, ProxyError, ProxyRequest, ProxyResponse};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("proxy setup failed: {0}")]
    Proxy(#[from] ProxyError),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
    #[error("invalid public base url {url}: {source}")]
    BaseUrl {
        url: String,
        source: url::ParseError,
    },
    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

#[derive(Clone)]
struct AppState {
    proxy: Arc<ManifestProxy>,
    public_base: Option<Url>,
    fallback_base: Url,
}

impl AppState {
    /// Configured public base, else `http://<Host>/`, else the listen address.
    fn proxy_base(&self, headers: &HeaderMap) -> Url {
        if let Some(base) = &self.public_base {
            return base.clone();
        }
        headers
            .get(header::HOST)
            .and_then(|value| value.to_str().ok())
            .and_then(|host| Url::parse(&format!("http://{host}/")).ok())
            .unwrap_or_else(|| self.fallback_base.clone())
    }
}

/// Builds the `/proxy` + `/healthz` router around `proxy`.
///
/// `public_base` pins the base used for rewritten links; without it the
/// request `Host` header decides, and `fallback_base` covers requests that
/// carry none.
pub fn router(proxy: Arc<ManifestProxy>, public_base: Option<Url>, fallback_base: Url) -> Router {
    let state = AppState {
        proxy,
        public_base: public_base.map(normalize_base),
        fallback_base: normalize_base(fallback_base),
    };
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/proxy", get(proxy_handler))
        .route("/healthz", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn proxy_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<Vec<(String, String)>>,
) -> ProxyResponse {
    let url = first_url_param(params);
    let request = ProxyRequest::new(url, state.proxy_base(&headers));
    state.proxy.handle(request).await
}

/// A repeated `url` parameter resolves to its first occurrence.
fn first_url_param(params: Vec<(String, String)>) -> Option<String> {
    params
        .into_iter()
        .find(|(key, _)| key == "url")
        .map(|(_, value)| value)
}

async fn health_handler() -> &'static str {
    "ok"
}

/// Bound proxy listener, ready to serve.
pub struct ProxyServer {
    listener: TcpListener,
    app: Router,
    local_addr: SocketAddr,
}

impl ProxyServer {
    pub async fn bind(config: &RestreamConfig) -> Result<Self, ServerError> {
        let public_base = config
            .server
            .public_base_url
            .as_deref()
            .map(|url| {
                Url::parse(url).map_err(|source| ServerError::BaseUrl {
                    url: url.to_string(),
                    source,
                })
            })
            .transpose()?;

        let addr = config.server.listen_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        let fallback_base = Url::parse(&format!("http://{local_addr}/")).map_err(|source| {
            ServerError::BaseUrl {
                url: local_addr.to_string(),
                source,
            }
        })?;

        let proxy = Arc::new(ManifestProxy::new(&config.upstream)?);
        let app = router(proxy, public_base, fallback_base);
        Ok(Self {
            listener,
            app,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves until `shutdown` resolves, then drains in-flight requests.
    pub async fn serve<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!(addr = %self.local_addr, "manifest proxy listening");
        axum::serve(self.listener, self.app)
            .with_graceful_shutdown(shutdown)
            .await?;
        info!("manifest proxy stopped");
        Ok(())
    }
}
