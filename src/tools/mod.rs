use anyhow::Context;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::config::ToolsConfig;
use crate::{MusicDlError, Result};

const YT_DLP: &str = "yt-dlp";
const FFMPEG: &str = "ffmpeg";
const STDERR_TAIL_LINES: usize = 5;

/// Host operating system as far as tool lookup is concerned
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
    Other(String),
}

impl Platform {
    /// Platform of the running process
    pub fn current() -> Self {
        Self::from(std::env::consts::OS)
    }
}

impl From<&str> for Platform {
    fn from(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "windows" | "win32" => Platform::Windows,
            "macos" | "darwin" => Platform::MacOs,
            "linux" => Platform::Linux,
            other => Platform::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Windows => write!(f, "windows"),
            Platform::MacOs => write!(f, "macos"),
            Platform::Linux => write!(f, "linux"),
            Platform::Other(name) => write!(f, "{}", name),
        }
    }
}

/// Static per-platform location of yt-dlp. Does not check the file exists.
pub fn resolve_tool_path(platform: &Platform) -> Result<PathBuf> {
    match platform {
        Platform::Windows => Ok(PathBuf::from("../../yt-dlp.exe")),
        Platform::MacOs => Ok(PathBuf::from("/usr/local/bin/yt-dlp")),
        Platform::Linux => Ok(PathBuf::from("/usr/local/bin/yt-dlp")),
        Platform::Other(name) => Err(MusicDlError::UnsupportedPlatform(name.clone()).into()),
    }
}

/// Resolved locations of the external programs a job needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub yt_dlp: PathBuf,
    pub ffmpeg: PathBuf,
}

impl ToolPaths {
    /// Resolve tool paths for the running platform
    pub fn resolve(config: &ToolsConfig) -> Result<Self> {
        Self::resolve_for(config, &Platform::current())
    }

    /// Resolve tool paths, preferring explicit configuration over the platform default.
    ///
    /// When the platform default does not exist on disk the bare program name is used
    /// so that `PATH` lookup still gets a chance.
    pub fn resolve_for(config: &ToolsConfig, platform: &Platform) -> Result<Self> {
        let yt_dlp = match &config.yt_dlp_path {
            Some(path) => path.clone(),
            None => {
                let default = resolve_tool_path(platform)?;
                if default.exists() {
                    default
                } else {
                    PathBuf::from(YT_DLP)
                }
            }
        };

        let ffmpeg = config
            .ffmpeg_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(FFMPEG));

        tracing::debug!(
            yt_dlp = %yt_dlp.display(),
            ffmpeg = %ffmpeg.display(),
            "Resolved tool paths"
        );

        Ok(Self { yt_dlp, ffmpeg })
    }
}

/// Check whether `program --version` runs and exits successfully
pub async fn is_tool_installed(program: &Path) -> bool {
    Command::new(program)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Fail with [`MusicDlError::ToolNotInstalled`] unless the program answers `--version`
pub async fn ensure_installed(program: &Path) -> Result<()> {
    if !is_tool_installed(program).await {
        return Err(MusicDlError::ToolNotInstalled(program.display().to_string()).into());
    }
    Ok(())
}

/// Check if the current environment has required tools
pub async fn check_dependencies(paths: &ToolPaths) -> Vec<String> {
    let mut missing = Vec::new();

    if !is_tool_installed(&paths.yt_dlp).await {
        missing.push(format!(
            "yt-dlp ({}) - required for audio extraction",
            paths.yt_dlp.display()
        ));
    }

    // ffmpeg accepts --version as an alias of -version
    if !is_tool_installed(&paths.ffmpeg).await {
        missing.push(format!(
            "ffmpeg ({}) - required for transcoding",
            paths.ffmpeg.display()
        ));
    }

    missing
}

/// Run an external tool to completion, honouring cancellation and an optional timeout.
///
/// The child is killed if the returned future is dropped, which is what happens when
/// the token fires or the timeout elapses. A non-zero exit is not an error here; the
/// caller decides what a failed status means.
pub async fn run_tool(
    mut command: Command,
    label: &str,
    cancel: &CancellationToken,
    timeout: Option<Duration>,
) -> Result<Output> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = match command.spawn() {
        Ok(child) => child,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let program = command.as_std().get_program().to_string_lossy().to_string();
            return Err(MusicDlError::ToolNotInstalled(program).into());
        }
        Err(e) => return Err(e).with_context(|| format!("Failed to start {}", label)),
    };

    let wait = async move {
        let output = child.wait_with_output();
        match timeout {
            Some(limit) => tokio::time::timeout(limit, output)
                .await
                .map_err(|_| MusicDlError::Timeout(label.to_string(), limit)),
            None => Ok(output.await),
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::warn!("{} cancelled, killing child process", label);
            Err(MusicDlError::Cancelled(label.to_string()).into())
        }
        result = wait => {
            let output = result?.with_context(|| format!("Failed to wait for {}", label))?;
            Ok(output)
        }
    }
}

/// Last non-empty stderr lines of a finished process, for error messages
pub fn stderr_summary(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    if lines.is_empty() {
        return format!("exited with {}", output.status);
    }
    lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n")
}
