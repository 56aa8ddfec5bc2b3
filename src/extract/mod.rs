use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::tools::{ensure_installed, run_tool, stderr_summary};
use crate::{MusicDlError, Result};

/// Extension the extractor is asked to convert to
pub const AUDIO_FORMAT: &str = "mp3";

/// Trait for turning a remote source URL into a local audio file
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AudioExtractor: Send + Sync {
    /// Extract audio from `source_url` into `<output_stem>.mp3` and return that path
    async fn extract(
        &self,
        source_url: &str,
        output_stem: &Path,
        cancel: &CancellationToken,
        timeout: Option<Duration>,
    ) -> Result<PathBuf>;

    /// Fail early when the backing tool cannot run
    async fn ensure_available(&self) -> Result<()>;

    /// Name used in logs and error messages
    fn name(&self) -> &'static str;
}

/// Audio extractor backed by yt-dlp
pub struct YtDlpExtractor {
    yt_dlp_path: PathBuf,
}

impl YtDlpExtractor {
    pub fn new(yt_dlp_path: impl Into<PathBuf>) -> Self {
        Self {
            yt_dlp_path: yt_dlp_path.into(),
        }
    }

    /// Fixed option set passed to yt-dlp
    pub fn build_args(source_url: &str, output_template: &str) -> Vec<String> {
        [
            "--extract-audio",
            "--audio-format",
            AUDIO_FORMAT,
            // yt-dlp's oauth2 plugin expects this username with an empty password
            "--username",
            "oauth2",
            "--password",
            "",
            "--audio-quality",
            "0",
            "--no-playlist",
            "--output",
            output_template,
            "--referer",
            source_url,
            source_url,
        ]
        .into_iter()
        .map(String::from)
        .collect()
    }
}

#[async_trait]
impl AudioExtractor for YtDlpExtractor {
    async fn extract(
        &self,
        source_url: &str,
        output_stem: &Path,
        cancel: &CancellationToken,
        timeout: Option<Duration>,
    ) -> Result<PathBuf> {
        let output_template = format!("{}.%(ext)s", output_stem.display());
        let expected = output_stem.with_extension(AUDIO_FORMAT);

        tracing::debug!(url = %source_url, output = %expected.display(), "Running yt-dlp");

        let mut command = Command::new(&self.yt_dlp_path);
        command.args(Self::build_args(source_url, &output_template));

        let output = run_tool(command, self.name(), cancel, timeout).await?;

        if !output.status.success() {
            return Err(MusicDlError::Extraction(stderr_summary(&output)).into());
        }

        if !expected.exists() {
            return Err(MusicDlError::Extraction(format!(
                "yt-dlp did not produce expected file: {}",
                expected.display()
            ))
            .into());
        }

        Ok(expected)
    }

    async fn ensure_available(&self) -> Result<()> {
        ensure_installed(&self.yt_dlp_path).await
    }

    fn name(&self) -> &'static str {
        "yt-dlp"
    }
}
