pub mod config;
pub mod error;
pub mod proxy;
pub mod restream;

pub use config::{
    load_restream_config, RestreamConfig, RestreamSection, ServerSection, UpstreamSection,
};
pub use error::{ConfigError, Result};
pub use proxy::{
    FetchError, HttpFetcher, ManifestProxy, ProxyError, ProxyRequest, ProxyResponse,
    ProxyResult, ProxyServer, ServerError, UpstreamFetcher, UpstreamResponse,
};
pub use restream::{
    RestreamError, RestreamReport, RestreamResult, Restreamer, StaticServer, TranscodeJob,
};
