use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct RestreamConfig {
    pub server: ServerSection,
    pub upstream: UpstreamSection,
    pub restream: RestreamSection,
}

impl RestreamConfig {
    /// Checks values that serde cannot: the public base URL must parse and
    /// the upstream timeout must be non-zero.
    pub fn validate(&self) -> Result<()> {
        if let Some(base) = &self.server.public_base_url {
            Url::parse(base).map_err(|err| ConfigError::Invalid {
                field: "server.public_base_url",
                reason: err.to_string(),
            })?;
        }
        if self.upstream.timeout_seconds == 0 {
            return Err(ConfigError::Invalid {
                field: "upstream.timeout_seconds",
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind: String,
    pub port: u16,
    pub public_base_url: Option<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 5000,
            public_base_url: None,
        }
    }
}

impl ServerSection {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamSection {
    pub timeout_seconds: u64,
    pub user_agent: String,
}

impl Default for UpstreamSection {
    fn default() -> Self {
        Self {
            timeout_seconds: 15,
            user_agent: "restream-proxy/0.1".into(),
        }
    }
}

impl UpstreamSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RestreamSection {
    pub ffmpeg: PathBuf,
    pub output_dir: PathBuf,
    pub segment_seconds: u32,
    pub list_size: u32,
    pub delete_segments: bool,
    pub static_bind: String,
    pub static_port: u16,
    pub log_level: String,
    pub stop_timeout_seconds: u64,
}

impl Default for RestreamSection {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            output_dir: PathBuf::from("hls_out"),
            segment_seconds: 6,
            list_size: 6,
            delete_segments: true,
            static_bind: "0.0.0.0".into(),
            static_port: 8081,
            log_level: "info".into(),
            stop_timeout_seconds: 10,
        }
    }
}

pub fn load_restream_config<P: AsRef<Path>>(path: P) -> Result<RestreamConfig> {
    let config: RestreamConfig = load_toml(path)?;
    config.validate()?;
    Ok(config)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}
