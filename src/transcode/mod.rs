use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::tools::{run_tool, stderr_summary};
use crate::{MusicDlError, Result};

/// Settings for the optional re-encoding stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscodeConfig {
    pub bitrate_kbps: u32,
}

impl TranscodeConfig {
    pub const DEFAULT_BITRATE_KBPS: u32 = 192;
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            bitrate_kbps: Self::DEFAULT_BITRATE_KBPS,
        }
    }
}

/// Trait for re-encoding a local audio file
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AudioTranscoder: Send + Sync {
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        cancel: &CancellationToken,
        timeout: Option<Duration>,
    ) -> Result<()>;

    /// Target bitrate in kbps
    fn bitrate_kbps(&self) -> u32;
}

/// Transcoder backed by ffmpeg
pub struct FfmpegTranscoder {
    ffmpeg_path: PathBuf,
    bitrate_kbps: u32,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg_path: impl Into<PathBuf>, config: TranscodeConfig) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            bitrate_kbps: config.bitrate_kbps,
        }
    }

    pub fn build_args(input: &Path, output: &Path, bitrate_kbps: u32) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-vn".to_string(),
            "-codec:a".to_string(),
            "libmp3lame".to_string(),
            "-b:a".to_string(),
            format!("{}k", bitrate_kbps),
            output.to_string_lossy().to_string(),
        ]
    }
}

#[async_trait]
impl AudioTranscoder for FfmpegTranscoder {
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        cancel: &CancellationToken,
        timeout: Option<Duration>,
    ) -> Result<()> {
        tracing::debug!(
            input = %input.display(),
            output = %output.display(),
            bitrate_kbps = self.bitrate_kbps,
            "Running ffmpeg"
        );

        let mut command = Command::new(&self.ffmpeg_path);
        command.args(Self::build_args(input, output, self.bitrate_kbps));

        let result = run_tool(command, "ffmpeg", cancel, timeout).await?;

        if !result.status.success() {
            return Err(MusicDlError::Transcode(stderr_summary(&result)).into());
        }

        if !output.exists() {
            return Err(MusicDlError::Transcode(format!(
                "ffmpeg did not produce expected file: {}",
                output.display()
            ))
            .into());
        }

        Ok(())
    }

    fn bitrate_kbps(&self) -> u32 {
        self.bitrate_kbps
    }
}
