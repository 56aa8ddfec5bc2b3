//! Music DL - A Rust CLI tool for downloading, transcoding and tagging audio
//!
//! This library drives `yt-dlp` to pull audio from a remote URL, optionally re-encodes it
//! with `ffmpeg`, writes ID3 metadata into the result and moves it to its final location.

pub mod cli;
pub mod config;
pub mod extract;
pub mod fetch;
pub mod pipeline;
pub mod placement;
pub mod tagger;
pub mod tools;
pub mod transcode;
pub mod utils;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use extract::{AudioExtractor, YtDlpExtractor};
pub use fetch::{get_buffer_from_url, RemoteFetcher};
pub use pipeline::{
    download_yt, download_yt_and_save, DownloadJob, DownloadPipeline, DownloadReport,
    PipelineConfig, PipelineState, TrackDescriptor,
};
pub use tagger::{Cover, TagPayload};
pub use tools::{Platform, ToolPaths};
pub use transcode::{AudioTranscoder, FfmpegTranscoder, TranscodeConfig};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Coarse classification of a [`MusicDlError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UnsupportedPlatform,
    ToolNotInstalled,
    Fetch,
    Move,
    TagWrite,
    Extraction,
    Transcode,
    Timeout,
    Cancelled,
}

/// Error types specific to music-dl
#[derive(thiserror::Error, Debug)]
pub enum MusicDlError {
    #[error("Unsupported operating system: {0}")]
    UnsupportedPlatform(String),

    #[error("{0} is not installed")]
    ToolNotInstalled(String),

    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Error moving file to: {destination}")]
    Move {
        destination: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Error writing ID3 tags: {0}")]
    TagWrite(String),

    #[error("Audio extraction failed: {0}")]
    Extraction(String),

    #[error("Transcoding failed: {0}")]
    Transcode(String),

    #[error("{0} timed out after {1:?}")]
    Timeout(String, std::time::Duration),

    #[error("{0} was cancelled")]
    Cancelled(String),
}

impl MusicDlError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MusicDlError::UnsupportedPlatform(_) => ErrorKind::UnsupportedPlatform,
            MusicDlError::ToolNotInstalled(_) => ErrorKind::ToolNotInstalled,
            MusicDlError::Fetch(_) => ErrorKind::Fetch,
            MusicDlError::Move { .. } => ErrorKind::Move,
            MusicDlError::TagWrite(_) => ErrorKind::TagWrite,
            MusicDlError::Extraction(_) => ErrorKind::Extraction,
            MusicDlError::Transcode(_) => ErrorKind::Transcode,
            MusicDlError::Timeout(..) => ErrorKind::Timeout,
            MusicDlError::Cancelled(_) => ErrorKind::Cancelled,
        }
    }
}

/// Find the [`ErrorKind`] of a domain error anywhere in an `anyhow` chain
pub fn error_kind(err: &anyhow::Error) -> Option<ErrorKind> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<MusicDlError>())
        .map(MusicDlError::kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_error_kind_survives_context() {
        let err = Err::<(), _>(MusicDlError::Fetch("HTTP 404".into()))
            .context("while fetching cover")
            .unwrap_err();
        assert_eq!(error_kind(&err), Some(ErrorKind::Fetch));
    }

    #[test]
    fn test_error_kind_absent_for_foreign_errors() {
        let err = anyhow::anyhow!("something else");
        assert_eq!(error_kind(&err), None);
    }

    #[test]
    fn test_move_error_message() {
        let err = MusicDlError::Move {
            destination: "/music/a.mp3".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        assert_eq!(err.to_string(), "Error moving file to: /music/a.mp3");
        assert_eq!(err.kind(), ErrorKind::Move);
    }
}
