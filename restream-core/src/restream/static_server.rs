use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::RestreamError;

/// Read-only HTTP view of the transcoder output directory.
pub struct StaticServer {
    listener: TcpListener,
    dir: PathBuf,
    local_addr: SocketAddr,
}

impl StaticServer {
    pub async fn bind(addr: &str, dir: impl Into<PathBuf>) -> Result<Self, RestreamError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| RestreamError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| RestreamError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        Ok(Self {
            listener,
            dir: dir.into(),
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn serve<F>(self, shutdown: F) -> Result<(), RestreamError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = Router::new()
            .fallback_service(ServeDir::new(&self.dir))
            .layer(TraceLayer::new_for_http());
        info!(addr = %self.local_addr, dir = %self.dir.display(), "static server started");
        axum::serve(self.listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(RestreamError::Serve)
    }
}
