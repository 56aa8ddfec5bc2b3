use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "musicdl",
    about = "Music DL - Download audio with yt-dlp, transcode it and tag it with ID3 metadata",
    version,
    long_about = "A CLI tool that downloads audio from YouTube and other yt-dlp supported sites, optionally re-encodes it with ffmpeg, writes title/artist/album tags and moves the result into your music folder."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download a track, tag it and save it to the destination directory
    Download {
        /// Source URL handed to yt-dlp
        #[arg(value_name = "URL")]
        url: String,

        /// Track title
        #[arg(short, long)]
        title: Option<String>,

        /// Artist name (repeat for multiple artists)
        #[arg(short, long = "artist", value_name = "ARTIST")]
        artists: Vec<String>,

        /// Album name
        #[arg(short = 'A', long)]
        album: Option<String>,

        /// Cover image URL to embed in the tag
        #[arg(long, value_name = "URL")]
        cover_url: Option<String>,

        /// Destination directory (defaults to the configured output directory)
        #[arg(short, long, value_name = "DIR")]
        dest: Option<PathBuf>,

        /// File name to save as (defaults to "<artists> - <title>.mp3")
        #[arg(short, long, value_name = "NAME")]
        filename: Option<String>,

        /// Transcode bitrate in kbps (overrides the configured value)
        #[arg(
            short,
            long,
            value_name = "KBPS",
            value_parser = clap::value_parser!(u32).range(1..=320)
        )]
        bitrate: Option<u32>,

        /// Skip the ffmpeg transcoding stage
        #[arg(long, conflicts_with = "bitrate")]
        no_transcode: bool,

        /// Kill yt-dlp/ffmpeg if a single run exceeds this many seconds
        #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
        timeout: Option<u64>,

        /// Print the download report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Fetch a URL and save its raw bytes to a file
    Fetch {
        /// URL to fetch
        #[arg(value_name = "URL")]
        url: String,

        /// Output file path (derived from the URL if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Check that yt-dlp and ffmpeg are installed
    Check,

    /// Show or initialise the configuration file
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },
}
