use std::path::PathBuf;

use crate::config::RestreamSection;

pub const PLAYLIST_NAME: &str = "index.m3u8";

/// One ffmpeg HLS restream: copy codecs from `source` into a rolling playlist.
#[derive(Debug, Clone)]
pub struct TranscodeJob {
    pub source: String,
    pub output_dir: PathBuf,
    pub segment_seconds: u32,
    pub list_size: u32,
    pub delete_segments: bool,
    pub log_level: String,
}

impl TranscodeJob {
    pub fn from_config(source: impl Into<String>, config: &RestreamSection) -> Self {
        Self {
            source: source.into(),
            output_dir: config.output_dir.clone(),
            segment_seconds: config.segment_seconds,
            list_size: config.list_size,
            delete_segments: config.delete_segments,
            log_level: config.log_level.clone(),
        }
    }

    pub fn playlist_path(&self) -> PathBuf {
        self.output_dir.join(PLAYLIST_NAME)
    }

    pub fn hls_flags(&self) -> String {
        if self.delete_segments {
            "delete_segments+append_list".to_string()
        } else {
            "append_list".to_string()
        }
    }

    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            self.log_level.clone(),
        ];
        args.push("-i".to_string());
        args.push(self.source.clone());
        args.push("-c:v".to_string());
        args.push("copy".to_string());
        args.push("-c:a".to_string());
        args.push("copy".to_string());
        args.push("-f".to_string());
        args.push("hls".to_string());
        args.push("-hls_time".to_string());
        args.push(self.segment_seconds.to_string());
        args.push("-hls_list_size".to_string());
        args.push(self.list_size.to_string());
        args.push("-hls_flags".to_string());
        args.push(self.hls_flags());
        args.push(self.playlist_path().to_string_lossy().to_string());
        args
    }
}
