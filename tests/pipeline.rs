#![cfg(unix)]

mod common;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use music_dl::pipeline::{
    DownloadJob, DownloadPipeline, PipelineConfig, PipelineState, TrackDescriptor,
};
use music_dl::tagger::read_tags;
use music_dl::tools::ToolPaths;
use music_dl::transcode::TranscodeConfig;
use music_dl::{download_yt_and_save, error_kind, ErrorKind};
use tokio_util::sync::CancellationToken;

use common::{dir_is_empty, fake_ffmpeg, fake_yt_dlp, write_script, FAILING_YT_DLP};

struct Fixture {
    _bin: tempfile::TempDir,
    temp_root: tempfile::TempDir,
    dest: tempfile::TempDir,
    yt_dlp: PathBuf,
    ffmpeg: PathBuf,
}

impl Fixture {
    fn new(yt_dlp_delay_secs: u32) -> Self {
        let bin = tempfile::tempdir().unwrap();
        let yt_dlp = fake_yt_dlp(bin.path(), yt_dlp_delay_secs);
        let ffmpeg = fake_ffmpeg(bin.path());
        Self {
            _bin: bin,
            temp_root: tempfile::tempdir().unwrap(),
            dest: tempfile::tempdir().unwrap(),
            yt_dlp,
            ffmpeg,
        }
    }

    fn failing() -> Self {
        let fixture = Self::new(0);
        let yt_dlp = write_script(fixture._bin.path(), "yt-dlp-failing", FAILING_YT_DLP);
        Self { yt_dlp, ..fixture }
    }

    fn config(&self, transcode: Option<TranscodeConfig>) -> PipelineConfig {
        PipelineConfig {
            tools: ToolPaths {
                yt_dlp: self.yt_dlp.clone(),
                ffmpeg: self.ffmpeg.clone(),
            },
            temp_root: Some(self.temp_root.path().to_path_buf()),
            transcode,
            timeout: None,
        }
    }

    fn dest(&self) -> &Path {
        self.dest.path()
    }
}

fn track() -> TrackDescriptor {
    TrackDescriptor {
        name: Some("Under Pressure".to_string()),
        artists: vec!["Queen".to_string(), "David Bowie".to_string()],
        album_name: Some("Hot Space".to_string()),
        cover_url: None,
    }
}

#[tokio::test]
async fn test_full_pipeline_with_transcoding() {
    let fixture = Fixture::new(0);
    let config = fixture.config(Some(TranscodeConfig { bitrate_kbps: 160 }));
    let pipeline = DownloadPipeline::new(config);

    let url = "https://www.youtube.com/watch?v=a01QQZyl-_I";
    let job = DownloadJob::new(url, track(), fixture.dest());
    let report = pipeline.run(&job, &CancellationToken::new()).await.unwrap();

    assert_eq!(
        report.final_path,
        fixture.dest().join("Queen, David Bowie - Under Pressure.mp3")
    );
    assert_eq!(
        report.stages,
        vec![
            PipelineState::Idle,
            PipelineState::Extracting,
            PipelineState::Transcoding,
            PipelineState::Tagging,
            PipelineState::Placing,
            PipelineState::Done,
        ]
    );
    assert_eq!(report.transcoded_bitrate_kbps, Some(160));

    let tags = read_tags(&report.final_path).unwrap();
    assert_eq!(tags.title, "Under Pressure");
    assert_eq!(tags.artist, "Queen, David Bowie");
    assert_eq!(tags.album, "Hot Space");

    let content = std::fs::read(&report.final_path).unwrap();
    let expected = format!("transcoded:audio from {}", url);
    assert!(content.ends_with(expected.as_bytes()));

    assert!(dir_is_empty(fixture.temp_root.path()), "temporary files left behind");
}

#[tokio::test]
async fn test_pipeline_without_transcoding_skips_ffmpeg() {
    let fixture = Fixture::new(0);
    let pipeline = DownloadPipeline::new(fixture.config(None));

    let job = DownloadJob::new("https://youtu.be/abc", track(), fixture.dest());
    let report = pipeline.run(&job, &CancellationToken::new()).await.unwrap();

    assert!(!report.stages.contains(&PipelineState::Transcoding));
    let content = std::fs::read(&report.final_path).unwrap();
    assert!(content.ends_with(b"audio from https://youtu.be/abc"));
    assert!(dir_is_empty(fixture.temp_root.path()));
}

#[tokio::test]
async fn test_extraction_failure_rejects_with_transcoding_enabled() {
    let fixture = Fixture::failing();
    let pipeline = DownloadPipeline::new(fixture.config(Some(TranscodeConfig::default())));

    let job = DownloadJob::new("https://youtu.be/abc", track(), fixture.dest());
    let err = pipeline.run(&job, &CancellationToken::new()).await.unwrap_err();

    assert_eq!(error_kind(&err), Some(ErrorKind::Extraction));
    assert!(err.to_string().contains("Video unavailable"));
    assert!(!job.destination_path().exists());
    assert!(dir_is_empty(fixture.temp_root.path()));
}

#[tokio::test]
async fn test_concurrent_jobs_do_not_collide() {
    let fixture = Fixture::new(1);
    let config = fixture.config(Some(TranscodeConfig::default()));
    let pipeline = Arc::new(DownloadPipeline::new(config));

    let first = DownloadJob::new("https://youtu.be/first", track(), fixture.dest())
        .with_file_name("first.mp3");
    let second = DownloadJob::new("https://youtu.be/second", track(), fixture.dest())
        .with_file_name("second.mp3");

    let cancel = CancellationToken::new();
    let (a, b) = tokio::join!(pipeline.run(&first, &cancel), pipeline.run(&second, &cancel));
    let (a, b) = (a.unwrap(), b.unwrap());

    let first_content = std::fs::read(&a.final_path).unwrap();
    let second_content = std::fs::read(&b.final_path).unwrap();
    assert!(first_content.ends_with(b"transcoded:audio from https://youtu.be/first"));
    assert!(second_content.ends_with(b"transcoded:audio from https://youtu.be/second"));
    assert!(dir_is_empty(fixture.temp_root.path()));
}

#[tokio::test]
async fn test_hung_extractor_times_out() {
    let fixture = Fixture::new(10);
    let mut config = fixture.config(None);
    config.timeout = Some(Duration::from_millis(300));
    let pipeline = DownloadPipeline::new(config);

    let job = DownloadJob::new("https://youtu.be/abc", track(), fixture.dest());
    let err = pipeline.run(&job, &CancellationToken::new()).await.unwrap_err();

    assert_eq!(error_kind(&err), Some(ErrorKind::Timeout));
    assert!(!job.destination_path().exists());
    assert!(dir_is_empty(fixture.temp_root.path()));
}

#[tokio::test]
async fn test_cancellation_kills_extractor() {
    let fixture = Fixture::new(10);
    let pipeline = DownloadPipeline::new(fixture.config(None));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let job = DownloadJob::new("https://youtu.be/abc", track(), fixture.dest());
    let err = tokio::time::timeout(Duration::from_secs(5), pipeline.run(&job, &cancel))
        .await
        .expect("cancellation did not interrupt the job")
        .unwrap_err();

    assert_eq!(error_kind(&err), Some(ErrorKind::Cancelled));
    assert!(!job.destination_path().exists());
}

#[tokio::test]
async fn test_missing_extractor_is_tool_not_installed() {
    let fixture = Fixture::new(0);
    let mut config = fixture.config(None);
    config.tools.yt_dlp = fixture.dest().join("no-such-yt-dlp");
    let pipeline = DownloadPipeline::new(config);

    let job = DownloadJob::new("https://youtu.be/abc", track(), fixture.dest());
    let err = pipeline.run(&job, &CancellationToken::new()).await.unwrap_err();

    assert_eq!(error_kind(&err), Some(ErrorKind::ToolNotInstalled));
}

#[tokio::test]
async fn test_download_yt_and_save_overwrites_existing_file() {
    let fixture = Fixture::new(0);
    let existing = fixture.dest().join("track.mp3");
    std::fs::write(&existing, b"old download").unwrap();

    let path = download_yt_and_save(
        fixture.config(None),
        &track(),
        "https://youtu.be/new",
        Some("track.mp3"),
        fixture.dest(),
    )
    .await
    .unwrap();

    assert_eq!(path, existing);
    let content = std::fs::read(&path).unwrap();
    assert!(content.ends_with(b"audio from https://youtu.be/new"));
}
