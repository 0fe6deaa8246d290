//! CLI argument definitions using clap derive macros.
//!
//! Every run option is optional here: an unset flag falls back to the config
//! file, then to the built-in default.

use std::path::PathBuf;

use annex_sync_core::ArchiveFormat;
use clap::Parser;

/// Keep a local copy of the ANS procedure-list annexes.
///
/// Fetches the update page, downloads Anexo I and Anexo II, and packs them
/// into a single archive.
#[derive(Parser, Debug)]
#[command(name = "annex-sync")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Config file (default: $XDG_CONFIG_HOME/annex-sync/config.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Page that lists the annex links
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,

    /// Per-request timeout in seconds (1-3600)
    #[arg(short = 't', long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub timeout: Option<u64>,

    /// Delay after the page fetch and between sequential downloads, in milliseconds
    #[arg(long, value_name = "MS", value_parser = clap::value_parser!(u64).range(0..=600_000))]
    pub delay: Option<u64>,

    /// Maximum concurrent downloads (1-100)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub max_parallel: Option<u8>,

    /// Attempts per file, first try included (1-20)
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u32).range(1..=20))]
    pub max_attempts: Option<u32>,

    /// Delay between attempts of one file, in milliseconds
    #[arg(long, value_name = "MS", value_parser = clap::value_parser!(u64).range(0..=600_000))]
    pub retry_delay: Option<u64>,

    /// Re-download files that already exist
    #[arg(long, value_name = "BOOL", num_args = 0..=1, default_missing_value = "true")]
    pub overwrite_files: Option<bool>,

    /// Empty the files folder before downloading
    #[arg(long, value_name = "BOOL", num_args = 0..=1, default_missing_value = "true")]
    pub clear_downloads: Option<bool>,

    /// Download with the worker pool (false: one file at a time)
    #[arg(long, value_name = "BOOL", num_args = 0..=1, default_missing_value = "true")]
    pub parallel: Option<bool>,

    /// Root folder for downloads and the archive
    #[arg(short = 'o', long, value_name = "DIR")]
    pub downloads_dir: Option<PathBuf>,

    /// Subfolder of the downloads root that receives the files
    #[arg(long, value_name = "NAME")]
    pub files_subdir: Option<PathBuf>,

    /// Archive format: zip, tar, tar.gz, tar.bz2, tar.xz or 7z
    #[arg(short = 'f', long, value_name = "FORMAT", value_parser = parse_archive_format)]
    pub archive_format: Option<ArchiveFormat>,

    /// Archive file name without extension
    #[arg(long, value_name = "NAME")]
    pub archive_name: Option<String>,

    /// Replace an existing archive
    #[arg(long, value_name = "BOOL", num_args = 0..=1, default_missing_value = "true")]
    pub overwrite_archive: Option<bool>,
}

fn parse_archive_format(raw: &str) -> Result<ArchiveFormat, String> {
    raw.parse::<ArchiveFormat>().map_err(|e| e.to_string())
}
