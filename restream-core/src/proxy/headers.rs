use axum::http::{header, HeaderMap, HeaderName, HeaderValue};

/// Headers that describe the upstream connection or encoding rather than the
/// resource; never forwarded.
pub const STRIPPED_HEADERS: [HeaderName; 3] = [
    header::CONTENT_ENCODING,
    header::TRANSFER_ENCODING,
    header::CONNECTION,
];

/// Copies upstream headers minus [`STRIPPED_HEADERS`] and forces
/// `Access-Control-Allow-Origin: *`.
pub fn sanitize_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(upstream.len() + 1);
    for (name, value) in upstream {
        if STRIPPED_HEADERS.contains(name) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers
}

/// Manifest when the content type mentions `mpegurl` or the requested url
/// ends with `.m3u8`, both case-insensitive.
pub fn is_manifest(content_type: &str, url: &str) -> bool {
    content_type.to_ascii_lowercase().contains("mpegurl")
        || url.to_ascii_lowercase().ends_with(".m3u8")
}
