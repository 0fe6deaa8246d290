//! CLI entry point for annex-sync.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::{debug, error, info};

mod app;
mod app_config;
mod cli;

use app::{config_runtime, runtime};
use cli::Args;

/// How the run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    /// Every annex obtained and archived.
    Success,
    /// Some annexes obtained; the rest were missing or failed.
    Partial,
    /// Nothing obtained, or an unrecoverable error.
    Failure,
}

impl ProcessExit {
    pub(crate) fn code(self) -> u8 {
        match self {
            Self::Success | Self::Partial => 0,
            Self::Failure => 1,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();
    config_runtime::init_tracing(config_runtime::resolve_default_log_level(&args));

    match run(&args).await {
        Ok(exit) => ExitCode::from(exit.code()),
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(ProcessExit::Failure.code())
        }
    }
}

async fn run(args: &Args) -> Result<ProcessExit> {
    debug!(?args, "CLI arguments parsed");

    let loaded = app_config::load_config(args.config.as_deref())?;
    if let (Some(path), Some(_)) = (&loaded.path, &loaded.config) {
        info!(path = %path.display(), "loaded config file");
    }

    let settings = config_runtime::resolve_settings(args, loaded.config.as_ref())?;
    info!("annex-sync starting");

    let exit = runtime::run_pipeline(&settings).await?;
    if exit == ProcessExit::Partial {
        info!("finished with some annexes missing");
    }
    Ok(exit)
}
