use axum::http::StatusCode;
use thiserror::Error;

/// Failure of the outbound fetch. Every variant maps to a gateway error.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{0}")]
    Transport(String),
    #[error("invalid upstream url: {0}")]
    InvalidUrl(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_builder() {
            FetchError::InvalidUrl(error.to_string())
        } else {
            FetchError::Transport(error.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Missing url param")]
    MissingUrl,
    #[error("Upstream fetch failed: {0}")]
    Upstream(#[from] FetchError),
    #[error("http client error: {0}")]
    Client(String),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::MissingUrl => StatusCode::BAD_REQUEST,
            ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Client(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type ProxyResult<T> = Result<T, ProxyError>;
