use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::pipeline::PipelineConfig;
use crate::tools::ToolPaths;
use crate::transcode::TranscodeConfig;

/// Highest MP3 bitrate the transcoder will be asked for
pub const MAX_BITRATE_KBPS: u32 = 320;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// External tool locations
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Download pipeline settings
    #[serde(default)]
    pub pipeline: PipelineSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Explicit yt-dlp binary; the platform default is used when unset
    pub yt_dlp_path: Option<PathBuf>,

    /// Explicit ffmpeg binary; `ffmpeg` on PATH when unset
    pub ffmpeg_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Root for per-job scratch directories (OS temp dir when unset)
    pub temp_dir: Option<PathBuf>,

    /// Default destination directory for downloads
    pub output_dir: Option<PathBuf>,

    /// Re-encode extracted audio with ffmpeg
    pub transcode: bool,

    /// Target bitrate for the transcoding stage
    pub bitrate_kbps: u32,

    /// Per-process timeout for yt-dlp and ffmpeg
    pub timeout_secs: Option<u64>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            temp_dir: None,
            output_dir: None,
            transcode: true,
            bitrate_kbps: TranscodeConfig::DEFAULT_BITRATE_KBPS,
            timeout_secs: None,
        }
    }
}

impl Config {
    /// Load configuration from file or create default
    pub async fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = fs_err::tokio::read_to_string(&config_path)
                .await
                .context("Failed to read config file")?;

            let config = Self::from_yaml(&content)?;
            tracing::debug!("Loaded configuration from {}", config_path.display());
            Ok(config)
        } else {
            let config = Self::default();
            config.save().await?;
            Ok(config)
        }
    }

    /// Parse and validate a YAML document
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Config =
            serde_yaml::from_str(content).context("Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs_err::tokio::create_dir_all(parent).await?;
        }

        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;

        fs_err::tokio::write(&config_path, content)
            .await
            .context("Failed to write config file")?;

        tracing::info!("Wrote default configuration to {}", config_path.display());
        Ok(())
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir().context("Could not determine config directory")?;

        Ok(config_dir.join("music-dl").join("config.yaml"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let bitrate = self.pipeline.bitrate_kbps;
        if bitrate == 0 || bitrate > MAX_BITRATE_KBPS {
            anyhow::bail!(
                "Bitrate must be between 1 and {} kbps, got {}",
                MAX_BITRATE_KBPS,
                bitrate
            );
        }

        if self.pipeline.timeout_secs == Some(0) {
            anyhow::bail!("Timeout must be at least one second");
        }

        Ok(())
    }

    /// Destination directory used when the caller does not pass one
    pub fn output_dir(&self) -> PathBuf {
        self.pipeline
            .output_dir
            .clone()
            .or_else(|| dirs::audio_dir().map(|dir| dir.join("MusicDL")))
            .unwrap_or_else(|| PathBuf::from("MusicDL"))
    }

    /// Build the runtime pipeline configuration, resolving tool paths now
    pub fn to_pipeline_config(&self) -> Result<PipelineConfig> {
        let tools = ToolPaths::resolve(&self.tools)?;

        Ok(PipelineConfig {
            tools,
            temp_root: self.pipeline.temp_dir.clone(),
            transcode: self.pipeline.transcode.then(|| TranscodeConfig {
                bitrate_kbps: self.pipeline.bitrate_kbps,
            }),
            timeout: self.pipeline.timeout_secs.map(Duration::from_secs),
        })
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        match &self.tools.yt_dlp_path {
            Some(path) => println!("  yt-dlp: {}", path.display()),
            None => println!("  yt-dlp: (platform default)"),
        }
        match &self.tools.ffmpeg_path {
            Some(path) => println!("  ffmpeg: {}", path.display()),
            None => println!("  ffmpeg: (from PATH)"),
        }
        println!("  Output Dir: {}", self.output_dir().display());
        if let Some(temp_dir) = &self.pipeline.temp_dir {
            println!("  Temp Dir: {}", temp_dir.display());
        }
        if self.pipeline.transcode {
            println!("  Transcode: {} kbps", self.pipeline.bitrate_kbps);
        } else {
            println!("  Transcode: disabled");
        }
        match self.pipeline.timeout_secs {
            Some(secs) => println!("  Timeout: {}s", secs),
            None => println!("  Timeout: none"),
        }
    }
}
