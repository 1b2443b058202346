use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use restream_core::{
    load_restream_config, ProxyServer, RestreamConfig, RestreamReport, Restreamer, TranscodeJob,
};
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] restream_core::ConfigError),
    #[error("proxy server error: {0}")]
    Server(#[from] restream_core::ServerError),
    #[error("restream error: {0}")]
    Restream(#[from] restream_core::RestreamError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "HLS manifest proxy and ffmpeg restream launcher", long_about = None)]
pub struct Cli {
    /// Path to restream.toml; built-in defaults apply when omitted
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    pub log_level: String,
    /// Output format for reports
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve GET /proxy?url=<playlist or segment>
    Proxy(ProxyArgs),
    /// Restream a source into rolling HLS and serve the output directory
    Restream(RestreamArgs),
}

#[derive(Args, Debug, Default)]
pub struct ProxyArgs {
    /// Listen address
    #[arg(long)]
    pub bind: Option<String>,
    /// Listen port
    #[arg(long)]
    pub port: Option<u16>,
    /// Base URL clients use to reach this proxy
    #[arg(long)]
    pub public_base_url: Option<String>,
    /// Upstream fetch timeout in seconds
    #[arg(long)]
    pub timeout_seconds: Option<u64>,
}

#[derive(Args, Debug)]
pub struct RestreamArgs {
    /// Source stream URL
    #[arg(short, long)]
    pub source: String,
    /// Output directory for the HLS playlist and segments
    #[arg(short, long)]
    pub outdir: Option<PathBuf>,
    /// HLS segment duration in seconds
    #[arg(short = 't', long)]
    pub segment: Option<u32>,
    /// Number of segments kept in the playlist
    #[arg(long)]
    pub list_size: Option<u32>,
    /// Static file server port
    #[arg(long)]
    pub port: Option<u16>,
    /// ffmpeg binary
    #[arg(long)]
    pub ffmpeg: Option<PathBuf>,
}

pub fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    match &cli.command {
        Commands::Proxy(args) => {
            let config = apply_proxy_args(config, args)?;
            let server = ProxyServer::bind(&config).await?;
            server.serve(shutdown_signal()).await?;
        }
        Commands::Restream(args) => {
            let config = apply_restream_args(config, args);
            let job = TranscodeJob::from_config(args.source.clone(), &config.restream);
            let restreamer = Restreamer::new(&config.restream, job);
            info!("press Ctrl+C to stop");
            let report = restreamer.run(shutdown_signal()).await?;
            render(&report, cli.format)?;
        }
    }
    Ok(())
}

fn load_config(cli: &Cli) -> Result<RestreamConfig> {
    match &cli.config {
        Some(path) => Ok(load_restream_config(path)?),
        None => Ok(RestreamConfig::default()),
    }
}

fn apply_proxy_args(mut config: RestreamConfig, args: &ProxyArgs) -> Result<RestreamConfig> {
    if let Some(bind) = &args.bind {
        config.server.bind = bind.clone();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(base) = &args.public_base_url {
        config.server.public_base_url = Some(base.clone());
    }
    if let Some(timeout) = args.timeout_seconds {
        config.upstream.timeout_seconds = timeout;
    }
    config.validate()?;
    Ok(config)
}

fn apply_restream_args(mut config: RestreamConfig, args: &RestreamArgs) -> RestreamConfig {
    if let Some(outdir) = &args.outdir {
        config.restream.output_dir = outdir.clone();
    }
    if let Some(segment) = args.segment {
        config.restream.segment_seconds = segment;
    }
    if let Some(list_size) = args.list_size {
        config.restream.list_size = list_size;
    }
    if let Some(port) = args.port {
        config.restream.static_port = port;
    }
    if let Some(ffmpeg) = &args.ffmpeg {
        config.restream.ffmpeg = ffmpeg.clone();
    }
    config
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT (ctrl-c)"),
        _ = terminate => info!("received SIGTERM"),
    }
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

impl DisplayFallback for RestreamReport {
    fn display(&self) -> String {
        let pid = self
            .pid
            .map(|pid| pid.to_string())
            .unwrap_or_else(|| "-".into());
        let code = self
            .exit_code
            .map(|code| code.to_string())
            .unwrap_or_else(|| "signal".into());
        let mut lines = vec![
            format!("transcoder pid {pid} exited with {code}"),
            format!("playlist: {}", self.playlist.display()),
        ];
        if let Some(addr) = &self.static_addr {
            lines.push(format!("served at: http://{addr}/"));
        }
        lines.push(format!(
            "runtime: {}s{}",
            (self.finished_at - self.started_at).num_seconds(),
            if self.interrupted { " (interrupted)" } else { "" }
        ));
        lines.join("\n")
    }
}
