mod job;
mod static_server;

use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::RestreamSection;

pub use job::{TranscodeJob, PLAYLIST_NAME};
pub use static_server::StaticServer;

#[derive(Debug, Error)]
pub enum RestreamError {
    #[error("transcoder binary not found: {path}")]
    BinaryNotFound { path: PathBuf },
    #[error("failed to spawn {command}: {source}")]
    Spawn { command: String, source: io::Error },
    #[error("io error at {path}: {source}")]
    Io { source: io::Error, path: PathBuf },
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: String, source: io::Error },
    #[error("static server error: {0}")]
    Serve(io::Error),
    #[error("failed waiting for transcoder: {0}")]
    Wait(io::Error),
}

pub type RestreamResult<T> = Result<T, RestreamError>;

#[derive(Debug, Clone, Serialize)]
pub struct RestreamReport {
    pub pid: Option<u32>,
    pub exit_code: Option<i32>,
    pub interrupted: bool,
    pub playlist: PathBuf,
    pub static_addr: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Runs ffmpeg next to a static file server for its output directory.
#[derive(Debug, Clone)]
pub struct Restreamer {
    ffmpeg: PathBuf,
    job: TranscodeJob,
    static_addr: String,
    stop_timeout: Duration,
}

impl Restreamer {
    pub fn new(config: &RestreamSection, job: TranscodeJob) -> Self {
        Self {
            ffmpeg: config.ffmpeg.clone(),
            job,
            static_addr: format!("{}:{}", config.static_bind, config.static_port),
            stop_timeout: Duration::from_secs(config.stop_timeout_seconds),
        }
    }

    /// Runs until ffmpeg exits on its own or `shutdown` resolves. On shutdown
    /// ffmpeg gets an interrupt so it can finish the segment in progress.
    pub async fn run<F>(&self, shutdown: F) -> RestreamResult<RestreamReport>
    where
        F: Future<Output = ()>,
    {
        let output_dir = &self.job.output_dir;
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|source| RestreamError::Io {
                source,
                path: output_dir.clone(),
            })?;

        let started_at = Utc::now();
        let mut child = self.spawn_transcoder()?;
        let pid = child.id();
        info!(
            ?pid,
            source = %self.job.source,
            playlist = %self.job.playlist_path().display(),
            "transcoder started"
        );

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let mut static_addr = None;
        let static_task = match StaticServer::bind(&self.static_addr, output_dir.clone()).await {
            Ok(server) => {
                static_addr = Some(server.local_addr().to_string());
                Some(tokio::spawn(server.serve(async move {
                    let _ = stop_rx.await;
                })))
            }
            Err(err) => {
                warn!(error = %err, "static server failed to start; transcoder keeps running");
                None
            }
        };

        tokio::pin!(shutdown);
        let (status, interrupted) = tokio::select! {
            status = child.wait() => (status.map_err(RestreamError::Wait)?, false),
            _ = &mut shutdown => {
                info!("stopping transcoder");
                (self.stop_transcoder(&mut child).await?, true)
            }
        };
        if !interrupted {
            warn!(code = status.code(), "transcoder exited");
        }

        let _ = stop_tx.send(());
        if let Some(task) = static_task {
            match task.await {
                Ok(Ok(())) => debug!("static server stopped"),
                Ok(Err(err)) => error!(error = %err, "static server failed"),
                Err(err) => error!(error = %err, "static server task panicked"),
            }
        }

        Ok(RestreamReport {
            pid,
            exit_code: status.code(),
            interrupted,
            playlist: self.job.playlist_path(),
            static_addr,
            started_at,
            finished_at: Utc::now(),
        })
    }

    fn spawn_transcoder(&self) -> RestreamResult<Child> {
        let args = self.job.args();
        debug!(
            command = %format!("{} {}", self.ffmpeg.display(), args.join(" ")),
            "spawning transcoder"
        );
        let mut command = Command::new(&self.ffmpeg);
        command.args(&args).stdin(Stdio::null()).kill_on_drop(true);
        command.spawn().map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                RestreamError::BinaryNotFound {
                    path: self.ffmpeg.clone(),
                }
            } else {
                RestreamError::Spawn {
                    command: self.ffmpeg.display().to_string(),
                    source,
                }
            }
        })
    }

    /// Interrupt, wait up to `stop_timeout`, then kill.
    async fn stop_transcoder(&self, child: &mut Child) -> RestreamResult<ExitStatus> {
        if !send_interrupt(child).await {
            let _ = child.start_kill();
        }
        match timeout(self.stop_timeout, child.wait()).await {
            Ok(status) => status.map_err(RestreamError::Wait),
            Err(_) => {
                warn!(timeout = ?self.stop_timeout, "transcoder ignored interrupt; killing");
                child.kill().await.map_err(RestreamError::Wait)?;
                child.wait().await.map_err(RestreamError::Wait)
            }
        }
    }
}

#[cfg(unix)]
async fn send_interrupt(child: &Child) -> bool {
    let Some(pid) = child.id() else {
        return false;
    };
    match Command::new("kill")
        .args(["-s", "INT", &pid.to_string()])
        .status()
        .await
    {
        Ok(status) if status.success() => true,
        Ok(status) => {
            warn!(code = status.code(), "kill -s INT failed");
            false
        }
        Err(err) => {
            warn!(error = %err, "could not run kill");
            false
        }
    }
}

#[cfg(not(unix))]
async fn send_interrupt(_child: &Child) -> bool {
    false
}
