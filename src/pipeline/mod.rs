use anyhow::Context;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::extract::{AudioExtractor, YtDlpExtractor, AUDIO_FORMAT};
use crate::fetch::RemoteFetcher;
use crate::placement;
use crate::tagger::{self, Cover, TagPayload, UNKNOWN_ARTIST, UNKNOWN_TITLE};
use crate::tools::ToolPaths;
use crate::transcode::{AudioTranscoder, FfmpegTranscoder, TranscodeConfig};
use crate::utils::{random_suffix, sanitize_filename};
use crate::{MusicDlError, Result};

/// Caller-supplied description of the track being downloaded
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackDescriptor {
    /// Track title
    pub name: Option<String>,

    /// Artist names, in credit order
    #[serde(default)]
    pub artists: Vec<String>,

    /// Album the track belongs to
    pub album_name: Option<String>,

    /// Cover art to embed in the tag
    #[serde(default)]
    pub cover_url: Option<String>,
}

impl TrackDescriptor {
    /// Artists joined the way they are displayed and tagged
    pub fn display_artists(&self) -> String {
        self.artists
            .iter()
            .map(|artist| artist.trim())
            .filter(|artist| !artist.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// `"{artists} - {title}.mp3"`, safe to use as a single path component
    pub fn file_name(&self) -> String {
        let artists = self.display_artists();
        let artists = if artists.is_empty() {
            UNKNOWN_ARTIST
        } else {
            artists.as_str()
        };
        let title = self
            .name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(UNKNOWN_TITLE);

        format!(
            "{}.{}",
            sanitize_filename(&format!("{} - {}", artists, title)),
            AUDIO_FORMAT
        )
    }
}

/// A single download request. Jobs are never retried or reused.
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub source_url: String,
    pub track: TrackDescriptor,
    pub destination_dir: PathBuf,
    pub file_name: Option<String>,
}

impl DownloadJob {
    pub fn new(
        source_url: impl Into<String>,
        track: TrackDescriptor,
        destination_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source_url: source_url.into(),
            track,
            destination_dir: destination_dir.into(),
            file_name: None,
        }
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    /// Where the finished file will land.
    ///
    /// A custom name that sanitizes to nothing (`".."`, `""`) falls back to the track name.
    pub fn destination_path(&self) -> PathBuf {
        let file_name = self
            .file_name
            .as_deref()
            .map(sanitize_filename)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| self.track.file_name());
        self.destination_dir.join(file_name)
    }
}

/// Stages of a download job
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Extracting,
    Transcoding,
    Tagging,
    Placing,
    Done,
    Failed,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineState::Idle => write!(f, "idle"),
            PipelineState::Extracting => write!(f, "extracting"),
            PipelineState::Transcoding => write!(f, "transcoding"),
            PipelineState::Tagging => write!(f, "tagging"),
            PipelineState::Placing => write!(f, "placing"),
            PipelineState::Done => write!(f, "done"),
            PipelineState::Failed => write!(f, "failed"),
        }
    }
}

/// Forward-only state tracker for one job
struct JobProgress<'a> {
    url: &'a str,
    current: PipelineState,
    history: Vec<PipelineState>,
    progress: &'a ProgressBar,
}

impl<'a> JobProgress<'a> {
    fn new(url: &'a str, progress: &'a ProgressBar) -> Self {
        Self {
            url,
            current: PipelineState::Idle,
            history: vec![PipelineState::Idle],
            progress,
        }
    }

    fn advance(&mut self, next: PipelineState) {
        debug_assert!(next > self.current, "{} -> {} goes backwards", self.current, next);
        tracing::debug!(url = %self.url, from = %self.current, to = %next, "Pipeline transition");
        self.current = next;
        self.history.push(next);
        self.progress.set_message(format!("{}: {}", next, self.url));
    }

    /// Only the external-process and placement stages may fail a job
    fn fail(&mut self, err: &anyhow::Error) {
        debug_assert!(matches!(
            self.current,
            PipelineState::Idle
                | PipelineState::Extracting
                | PipelineState::Transcoding
                | PipelineState::Placing
        ));
        tracing::error!(url = %self.url, state = %self.current, error = %err, "Pipeline failed");
        self.current = PipelineState::Failed;
        self.history.push(PipelineState::Failed);
    }
}

/// Runtime configuration of a [`DownloadPipeline`]
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// External programs to invoke
    pub tools: ToolPaths,

    /// Root for per-job scratch directories; the OS temp dir when unset
    pub temp_root: Option<PathBuf>,

    /// Re-encode stage; skipped when `None`
    pub transcode: Option<TranscodeConfig>,

    /// Applied to each external process
    pub timeout: Option<Duration>,
}

impl PipelineConfig {
    pub fn new(tools: ToolPaths) -> Self {
        Self {
            tools,
            temp_root: None,
            transcode: Some(TranscodeConfig::default()),
            timeout: None,
        }
    }
}

/// Outcome of a successful job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadReport {
    pub final_path: PathBuf,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub transcoded_bitrate_kbps: Option<u32>,
    pub tags_written: bool,
    pub cover_embedded: bool,
    pub size_bytes: u64,
    pub stages: Vec<PipelineState>,
    pub completed_at: chrono::DateTime<chrono::Utc>,
}

/// Download, optionally transcode, tag and place a single track
pub struct DownloadPipeline {
    extractor: Box<dyn AudioExtractor>,
    transcoder: Option<Box<dyn AudioTranscoder>>,
    fetcher: RemoteFetcher,
    temp_root: PathBuf,
    timeout: Option<Duration>,
    progress: Option<MultiProgress>,
}

impl DownloadPipeline {
    /// Create a pipeline backed by yt-dlp and ffmpeg
    pub fn new(config: PipelineConfig) -> Self {
        let extractor: Box<dyn AudioExtractor> =
            Box::new(YtDlpExtractor::new(config.tools.yt_dlp.clone()));
        let transcoder = config.transcode.map(|transcode| {
            Box::new(FfmpegTranscoder::new(config.tools.ffmpeg.clone(), transcode))
                as Box<dyn AudioTranscoder>
        });

        Self::with_stages(config, extractor, transcoder, RemoteFetcher::new())
    }

    /// Create a pipeline from explicit stage implementations.
    ///
    /// `config.tools` and `config.transcode` are ignored here; the stages given win.
    pub fn with_stages(
        config: PipelineConfig,
        extractor: Box<dyn AudioExtractor>,
        transcoder: Option<Box<dyn AudioTranscoder>>,
        fetcher: RemoteFetcher,
    ) -> Self {
        Self {
            extractor,
            transcoder,
            fetcher,
            temp_root: config.temp_root.unwrap_or_else(std::env::temp_dir),
            timeout: config.timeout,
            progress: None,
        }
    }

    /// Show a spinner per job on stderr while jobs run
    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.progress = enabled.then(MultiProgress::new);
        self
    }

    /// Fresh spinner for one job; hidden unless progress is enabled
    fn job_spinner(&self) -> ProgressBar {
        let Some(multi) = &self.progress else {
            return ProgressBar::hidden();
        };

        let spinner = multi.add(ProgressBar::new_spinner());
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.enable_steady_tick(Duration::from_millis(120));
        spinner
    }

    /// Run a job to completion or failure
    pub async fn run(
        &self,
        job: &DownloadJob,
        cancel: &CancellationToken,
    ) -> Result<DownloadReport> {
        let spinner = self.job_spinner();
        let mut state = JobProgress::new(&job.source_url, &spinner);

        match self.run_stages(job, cancel, &mut state).await {
            Ok(mut report) => {
                state.advance(PipelineState::Done);
                report.stages = state.history;
                spinner.finish_with_message(format!("Saved {}", report.final_path.display()));
                Ok(report)
            }
            Err(err) => {
                state.fail(&err);
                spinner.abandon_with_message(format!("Failed: {}", job.source_url));
                Err(err)
            }
        }
    }

    async fn run_stages(
        &self,
        job: &DownloadJob,
        cancel: &CancellationToken,
        state: &mut JobProgress<'_>,
    ) -> Result<DownloadReport> {
        checkpoint(cancel, "download")?;
        self.extractor.ensure_available().await?;

        // Dropping the guard removes the scratch dir, on failure as well as success
        let scratch = self.scratch_dir().await?;
        let stem = scratch.path().join(random_suffix());

        state.advance(PipelineState::Extracting);
        tracing::info!("Extracting audio from {} with {}", job.source_url, self.extractor.name());
        let extracted = self
            .extractor
            .extract(&job.source_url, &stem, cancel, self.timeout)
            .await?;

        let (working, transcoded_bitrate_kbps) = match &self.transcoder {
            Some(transcoder) => {
                checkpoint(cancel, "transcode")?;
                state.advance(PipelineState::Transcoding);

                let transcoded = stem.with_extension(format!("transcoded.{}", AUDIO_FORMAT));
                tracing::info!("Transcoding to {} kbps", transcoder.bitrate_kbps());
                transcoder
                    .transcode(&extracted, &transcoded, cancel, self.timeout)
                    .await?;

                if let Err(e) = fs_err::tokio::remove_file(&extracted).await {
                    tracing::warn!("Failed to remove intermediate file: {}", e);
                }
                (transcoded, Some(transcoder.bitrate_kbps()))
            }
            None => (extracted, None),
        };

        checkpoint(cancel, "tagging")?;
        state.advance(PipelineState::Tagging);
        let payload = TagPayload::from_track(&job.track);
        let cover = self.fetch_cover(&job.track).await;
        let tags_written = self.write_tags(&working, &payload, cover.as_ref()).await;

        state.advance(PipelineState::Placing);
        checkpoint(cancel, "placement")?;
        let final_path = job.destination_path();
        fs_err::tokio::create_dir_all(&job.destination_dir)
            .await
            .map_err(|e| MusicDlError::Move {
                destination: final_path.display().to_string(),
                source: e,
            })?;
        placement::place(&working, &final_path, true).await?;

        let size_bytes = fs_err::tokio::metadata(&final_path).await?.len();

        if let Err(e) = scratch.close() {
            tracing::warn!("Failed to remove scratch directory: {}", e);
        }

        Ok(DownloadReport {
            final_path,
            title: payload.title,
            artist: payload.artist,
            album: payload.album,
            transcoded_bitrate_kbps,
            tags_written,
            cover_embedded: tags_written && cover.is_some(),
            size_bytes,
            stages: Vec::new(),
            completed_at: chrono::Utc::now(),
        })
    }

    /// Per-job scratch directory with a random suffix under the temp root
    async fn scratch_dir(&self) -> Result<TempDir> {
        fs_err::tokio::create_dir_all(&self.temp_root).await?;

        tempfile::Builder::new()
            .prefix("musicdl-")
            .tempdir_in(&self.temp_root)
            .with_context(|| {
                format!("Failed to create scratch directory in {}", self.temp_root.display())
            })
    }

    async fn fetch_cover(&self, track: &TrackDescriptor) -> Option<Cover> {
        let url = track.cover_url.as_deref()?;

        match self.fetcher.download_image(url).await {
            Ok(cover) => Some(cover),
            Err(e) => {
                tracing::warn!("Error downloading cover image, continuing without it: {}", e);
                None
            }
        }
    }

    /// Best effort: failures are logged and reported as `false`
    async fn write_tags(&self, path: &Path, payload: &TagPayload, cover: Option<&Cover>) -> bool {
        let path = path.to_path_buf();
        let payload = payload.clone();
        let cover = cover.cloned();

        let result = tokio::task::spawn_blocking(move || {
            tagger::write_tags(&path, &payload, cover.as_ref())
        })
        .await;

        match result {
            Ok(Ok(())) => {
                tracing::info!("ID3 tags written successfully");
                true
            }
            Ok(Err(e)) => {
                tracing::warn!("Error writing ID3 tags: {}", e);
                false
            }
            Err(e) => {
                tracing::warn!("Tag writer task failed: {}", e);
                false
            }
        }
    }

    /// Run the pipeline and return the final file's bytes
    pub async fn download_yt(
        &self,
        track: &TrackDescriptor,
        url: &str,
        destination_dir: &Path,
    ) -> Result<Vec<u8>> {
        let job = DownloadJob::new(url, track.clone(), destination_dir);
        let report = self.run(&job, &CancellationToken::new()).await?;

        let audio = fs_err::tokio::read(&report.final_path).await?;
        Ok(audio)
    }

    /// Run the pipeline and return where the file was saved
    pub async fn download_yt_and_save(
        &self,
        track: &TrackDescriptor,
        url: &str,
        file_name: Option<&str>,
        destination_dir: &Path,
    ) -> Result<PathBuf> {
        let mut job = DownloadJob::new(url, track.clone(), destination_dir);
        if let Some(file_name) = file_name {
            job = job.with_file_name(file_name);
        }

        let report = self.run(&job, &CancellationToken::new()).await?;
        Ok(report.final_path)
    }
}

fn checkpoint(cancel: &CancellationToken, stage: &str) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(MusicDlError::Cancelled(stage.to_string()).into());
    }
    Ok(())
}

/// Download `url` into `destination_dir` and return the audio bytes
pub async fn download_yt(
    config: PipelineConfig,
    track: &TrackDescriptor,
    url: &str,
    destination_dir: &Path,
) -> Result<Vec<u8>> {
    DownloadPipeline::new(config)
        .download_yt(track, url, destination_dir)
        .await
}

/// Download `url` into `destination_dir` and return the saved path
pub async fn download_yt_and_save(
    config: PipelineConfig,
    track: &TrackDescriptor,
    url: &str,
    file_name: Option<&str>,
    destination_dir: &Path,
) -> Result<PathBuf> {
    DownloadPipeline::new(config)
        .download_yt_and_save(track, url, file_name, destination_dir)
        .await
}
