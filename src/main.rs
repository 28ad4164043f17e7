//! Main application entry point (CLI binary).
//!
//! This is a thin wrapper around the `tag_inspector` library that handles:
//! - Command-line argument parsing
//! - Logger initialization
//! - Reading the URL list and writing JSON Lines results
//!
//! All core functionality is implemented in the library crate.

use anyhow::{Context, Result};
use clap::Parser;
use std::process;

use tag_inspector::export::export_jsonl;
use tag_inspector::initialization::init_logger_with;
use tag_inspector::{print_detection_summary, read_urls, run_detection, Config, Opt};

#[tokio::main]
async fn main() -> Result<()> {
    let opt = Opt::parse();
    let input = opt.file.clone();
    let output = opt.output.clone();
    let config = Config::from(opt);

    init_logger_with(config.log_level.clone().into(), config.log_format.clone())
        .context("Failed to initialize logger")?;

    let result = async {
        let urls = read_urls(&input).await?;
        let report = run_detection(config, urls).await?;
        let written = export_jsonl(&report.results, output.as_deref())?;
        if let Some(path) = &output {
            log::info!("Wrote {} results to {}", written, path.display());
        }
        print_detection_summary(&report);
        Ok::<_, anyhow::Error>(())
    }
    .await;

    if let Err(e) = result {
        eprintln!("tag_inspector error: {:#}", e);
        process::exit(1);
    }
    Ok(())
}
