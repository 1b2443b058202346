use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower::ServiceExt;
use url::form_urlencoded::byte_serialize;
use url::Url;

use restream_core::proxy::router;
use restream_core::{ManifestProxy, ProxyServer, RestreamConfig, UpstreamSection};

const SEGMENT: &[u8] = b"\x47\x40\x00\x10\x00\xff\xfe binary segment";

const MANIFEST: &str = "#EXTM3U\n\
#EXT-X-VERSION:3\n\
#EXT-X-TARGETDURATION:6\n\
\n\
#EXTINF:6.0,\n\
seg001.ts\n\
#EXTINF:6.0,\n\
https://10.0.0.5:1935/live/seg002.ts\n\
#EXTINF:6.0,\n\
https://10.0.0.6:8443/live/seg003.ts\n";

async fn manifest() -> Response {
    (
        [(header::CONTENT_TYPE, "application/vnd.apple.mpegurl")],
        MANIFEST,
    )
        .into_response()
}

async fn segment() -> Response {
    (
        [
            (header::CONTENT_TYPE, "video/mp2t"),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "https://origin.only"),
            (header::CACHE_CONTROL, "max-age=6"),
        ],
        SEGMENT,
    )
        .into_response()
}

async fn spawn_upstream() -> SocketAddr {
    let app = Router::new()
        .route("/live/index.m3u8", get(manifest))
        .route("/live/seg001.ts", get(segment))
        .route("/playlist", get(manifest))
        .route(
            "/old/index.m3u8",
            get(|| async { Redirect::temporary("/live/index.m3u8") }),
        )
        .route(
            "/gone/index.m3u8",
            get(|| async { (StatusCode::NOT_FOUND, "Not Found\n") }),
        )
        .route(
            "/missing.ts",
            get(|| async { (StatusCode::NOT_FOUND, "no such segment") }),
        );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn proxy_app(public_base: Option<&str>) -> Router {
    let proxy = Arc::new(ManifestProxy::new(&UpstreamSection::default()).unwrap());
    router(
        proxy,
        public_base.map(|base| Url::parse(base).unwrap()),
        Url::parse("http://127.0.0.1:5000/").unwrap(),
    )
}

fn proxy_uri(target: &str) -> String {
    let encoded: String = byte_serialize(target.as_bytes()).collect();
    format!("/proxy?url={encoded}")
}

async fn get_response(app: &Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, body.to_vec())
}

fn decoded_target(link: &str) -> String {
    Url::parse(link)
        .unwrap()
        .query_pairs()
        .find(|(key, _)| key == "url")
        .map(|(_, value)| value.into_owned())
        .unwrap()
}

#[tokio::test]
async fn missing_url_is_rejected() {
    let app = proxy_app(Some("http://myhost/"));
    for uri in ["/proxy", "/proxy?url="] {
        let (status, _, body) = get_response(&app, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, b"Missing url param");
    }
}

#[tokio::test]
async fn unreachable_upstream_is_bad_gateway() {
    let app = proxy_app(Some("http://myhost/"));
    let (status, headers, body) = get_response(&app, &proxy_uri("http://127.0.0.1:1/x.ts")).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(headers[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
    let text = String::from_utf8(body).unwrap();
    assert!(text.starts_with("Upstream fetch failed: "), "{text}");
}

#[tokio::test]
async fn segments_pass_through_byte_exact() {
    let upstream = spawn_upstream().await;
    let app = proxy_app(Some("http://myhost/"));
    let target = format!("http://{upstream}/live/seg001.ts");
    let (status, headers, body) = get_response(&app, &proxy_uri(&target)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, SEGMENT);
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert_eq!(headers[header::CONTENT_TYPE], "video/mp2t");
    assert_eq!(headers[header::CACHE_CONTROL], "max-age=6");
    assert!(headers.get(header::CONTENT_ENCODING).is_none());
    assert!(headers.get(header::TRANSFER_ENCODING).is_none());
}

#[tokio::test]
async fn manifests_are_rewritten_through_the_proxy() {
    let upstream = spawn_upstream().await;
    let app = proxy_app(Some("http://myhost/"));
    let target = format!("http://{upstream}/live/index.m3u8");
    let (status, headers, body) = get_response(&app, &proxy_uri(&target)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert!(headers.get(header::CONTENT_LENGTH).is_none());

    let text = String::from_utf8(body).unwrap();
    let lines: Vec<&str> = text.split('\n').collect();
    assert_eq!(lines[0], "#EXTM3U");
    assert_eq!(lines[1], "#EXT-X-VERSION:3");
    assert_eq!(lines[3], "");
    assert_eq!(lines[4], "#EXTINF:6.0,");
    assert!(lines[5].starts_with("http://myhost/proxy?url="));
    assert_eq!(
        decoded_target(lines[5]),
        format!("http://{upstream}/live/seg001.ts")
    );
    assert_eq!(
        decoded_target(lines[7]),
        "http://10.0.0.5:1935/live/seg002.ts"
    );
    assert_eq!(
        decoded_target(lines[9]),
        "https://10.0.0.6:8443/live/seg003.ts"
    );
    assert_eq!(lines.last(), Some(&""));
}

#[tokio::test]
async fn content_type_alone_marks_a_manifest() {
    let upstream = spawn_upstream().await;
    let app = proxy_app(Some("http://myhost/"));
    let target = format!("http://{upstream}/playlist");
    let (_, headers, body) = get_response(&app, &proxy_uri(&target)).await;
    assert!(headers.get(header::CONTENT_LENGTH).is_none());
    let text = String::from_utf8(body).unwrap();
    let reference = text.lines().nth(5).unwrap();
    assert_eq!(
        decoded_target(reference),
        format!("http://{upstream}/seg001.ts")
    );
}

#[tokio::test]
async fn relative_references_resolve_after_redirects() {
    let upstream = spawn_upstream().await;
    let app = proxy_app(Some("http://myhost/"));
    let target = format!("http://{upstream}/old/index.m3u8");
    let (status, _, body) = get_response(&app, &proxy_uri(&target)).await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    let reference = text.lines().nth(5).unwrap();
    assert_eq!(
        decoded_target(reference),
        format!("http://{upstream}/live/seg001.ts")
    );
}

#[tokio::test]
async fn rewritten_links_recurse_into_the_proxy() {
    let upstream = spawn_upstream().await;
    let app = proxy_app(Some("http://myhost/"));
    let target = format!("http://{upstream}/live/index.m3u8");
    let (_, _, body) = get_response(&app, &proxy_uri(&target)).await;
    let text = String::from_utf8(body).unwrap();
    let link = Url::parse(text.lines().nth(5).unwrap()).unwrap();
    let uri = format!("{}?{}", link.path(), link.query().unwrap());

    let (status, _, segment_body) = get_response(&app, &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(segment_body, SEGMENT);
}

#[tokio::test]
async fn first_url_parameter_wins() {
    let upstream = spawn_upstream().await;
    let app = proxy_app(Some("http://myhost/"));
    let first = proxy_uri(&format!("http://{upstream}/live/seg001.ts"));
    let uri = format!("{first}&url=http%3A%2F%2F127.0.0.1%3A1%2Fx.ts");
    let (status, _, body) = get_response(&app, &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, SEGMENT);
}

#[tokio::test]
async fn error_body_for_playlist_url_is_not_rewritten() {
    let upstream = spawn_upstream().await;
    let app = proxy_app(Some("http://myhost/"));
    let target = format!("http://{upstream}/gone/index.m3u8");
    let (status, _, body) = get_response(&app, &proxy_uri(&target)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, b"Not Found\n");
}

#[tokio::test]
async fn upstream_errors_are_mirrored() {
    let upstream = spawn_upstream().await;
    let app = proxy_app(Some("http://myhost/"));
    let target = format!("http://{upstream}/missing.ts");
    let (status, headers, body) = get_response(&app, &proxy_uri(&target)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, b"no such segment");
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
}

#[tokio::test]
async fn host_header_sets_link_base() {
    let upstream = spawn_upstream().await;
    let app = proxy_app(None);
    let target = format!("http://{upstream}/live/index.m3u8");
    let request = Request::builder()
        .uri(proxy_uri(&target))
        .header(header::HOST, HeaderValue::from_static("edge.local:5000"))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text
        .lines()
        .nth(5)
        .unwrap()
        .starts_with("http://edge.local:5000/proxy?url="));
}

#[tokio::test]
async fn cors_preflight_is_answered() {
    let app = proxy_app(Some("http://myhost/"));
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/proxy?url=http%3A%2F%2Fexample.com%2Fa.m3u8")
        .header(header::ORIGIN, "https://player.example")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert!(response.status().is_success());
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "*"
    );
}

#[tokio::test]
async fn server_binds_and_shuts_down() {
    let mut config = RestreamConfig::default();
    config.server.bind = "127.0.0.1".into();
    config.server.port = 0;
    let server = ProxyServer::bind(&config).await.unwrap();
    let addr = server.local_addr();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let handle = tokio::spawn(server.serve(async move {
        let _ = stop_rx.await;
    }));

    let health = reqwest::get(format!("http://{addr}/healthz"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(health, "ok");

    let missing = reqwest::get(format!("http://{addr}/proxy")).await.unwrap();
    assert_eq!(missing.status().as_u16(), 400);

    stop_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();
}
