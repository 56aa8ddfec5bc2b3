use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use music_dl::cli::{Cli, Commands};
use music_dl::config::Config;
use music_dl::fetch::RemoteFetcher;
use music_dl::pipeline::{DownloadJob, DownloadPipeline, TrackDescriptor};
use music_dl::tools::{self, Platform, ToolPaths};
use music_dl::transcode::TranscodeConfig;
use music_dl::utils;

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "music_dl=debug,musicdl=debug"
    } else {
        "music_dl=info,musicdl=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    if std::env::var_os("MUSICDL_LOG_JSON").is_some() {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::load().await?;

    match cli.command {
        Commands::Download {
            url,
            title,
            artists,
            album,
            cover_url,
            dest,
            filename,
            bitrate,
            no_transcode,
            timeout,
            json,
        } => {
            let mut pipeline_config = config.to_pipeline_config()?;
            if no_transcode {
                pipeline_config.transcode = None;
            } else if let Some(bitrate_kbps) = bitrate {
                pipeline_config.transcode = Some(TranscodeConfig { bitrate_kbps });
            }
            if let Some(secs) = timeout {
                pipeline_config.timeout = Some(Duration::from_secs(secs));
            }

            // Non-fatal: the pipeline reports the precise failure if a tool is really missing
            let missing = tools::check_dependencies(&pipeline_config.tools).await;
            for dep in missing {
                if dep.starts_with("ffmpeg") && pipeline_config.transcode.is_none() {
                    continue;
                }
                eprintln!("{} {}", style("warning:").yellow().bold(), dep);
            }

            let cancel = CancellationToken::new();
            let on_ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupted, cancelling download");
                    on_ctrl_c.cancel();
                }
            });

            let track = TrackDescriptor {
                name: title,
                artists,
                album_name: album,
                cover_url,
            };
            let mut job = DownloadJob::new(url, track, dest.unwrap_or_else(|| config.output_dir()));
            if let Some(filename) = filename {
                job = job.with_file_name(filename);
            }

            let pipeline =
                DownloadPipeline::new(pipeline_config).with_progress(!cli.quiet && !json);

            tracing::info!("Starting download for URL: {}", job.source_url);
            let started = Instant::now();
            let report = pipeline.run(&job, &cancel).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "{} {} - {} ({})",
                    style("Saved").green().bold(),
                    report.artist,
                    report.title,
                    report.album
                );
                println!("  Path: {}", report.final_path.display());
                println!(
                    "  Size: {} in {}",
                    utils::format_file_size(report.size_bytes),
                    utils::format_elapsed(started.elapsed())
                );
                if let Some(kbps) = report.transcoded_bitrate_kbps {
                    println!("  Bitrate: {} kbps", kbps);
                }
                if !report.tags_written {
                    println!("  {}", style("ID3 tags could not be written").yellow());
                }
            }
        }
        Commands::Fetch { url, output } => {
            let path = match output {
                Some(path) => path,
                None => utils::file_name_from_url(&url)
                    .map(PathBuf::from)
                    .context("Could not derive a file name from the URL, pass --output")?,
            };

            let written = RemoteFetcher::new().download_to_file(&url, &path).await?;
            println!(
                "Saved {} to {}",
                utils::format_file_size(written),
                path.display()
            );
        }
        Commands::Check => {
            let platform = Platform::current();
            println!("Platform: {}", platform);

            let paths = ToolPaths::resolve(&config.tools)?;
            let mut all_present = true;
            for (name, path) in [("yt-dlp", &paths.yt_dlp), ("ffmpeg", &paths.ffmpeg)] {
                if tools::is_tool_installed(path).await {
                    println!("  {} {} ({})", style("✓").green(), name, path.display());
                } else {
                    all_present = false;
                    println!("  {} {} ({})", style("✗").red(), name, path.display());
                }
            }

            if !all_present {
                anyhow::bail!("Some required tools are missing");
            }
        }
        Commands::Config { show } => {
            if show {
                config.display();
            } else {
                println!("Configuration file: {}", Config::config_path()?.display());
                println!("Edit it to change tool paths, output directory or transcoding.");
            }
        }
    }

    Ok(())
}
