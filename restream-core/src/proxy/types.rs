use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use url::Url;

use super::error::ProxyError;

/// Incoming `/proxy` call.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub url: Option<String>,
    /// Externally visible base of this proxy, always ending with `/`.
    pub proxy_base: Url,
}

impl ProxyRequest {
    pub fn new(url: Option<String>, proxy_base: Url) -> Self {
        Self {
            url,
            proxy_base: normalize_base(proxy_base),
        }
    }

    /// The target url, or `None` when absent or empty.
    pub fn target(&self) -> Option<&str> {
        self.url.as_deref().filter(|url| !url.is_empty())
    }
}

/// Appends a trailing slash so that joining `proxy` stays under the base path.
pub fn normalize_base(mut base: Url) -> Url {
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.set_query(None);
    base.set_fragment(None);
    base
}

#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Location after redirects; relative playlist entries resolve against it.
    pub final_url: Url,
    pub body: Bytes,
}

impl UpstreamResponse {
    pub fn content_type(&self) -> &str {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
    }
}

#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ProxyResponse {
    pub fn plain_text(status: StatusCode, message: impl Into<String>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        Self {
            status,
            headers,
            body: Bytes::from(message.into()),
        }
    }

    pub fn from_error(error: &ProxyError) -> Self {
        Self::plain_text(error.status(), error.to_string())
    }

    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }
}

impl IntoResponse for ProxyResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}
