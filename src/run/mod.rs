//! Run orchestration: input reading, the worker pool, and the run report.

mod resources;
mod task;

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use log::{info, warn};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::analysis::{BrowserDriver, ChromiumDriver};
use crate::app::{log_progress, print_error_statistics};
use crate::config::{Config, LOGGING_INTERVAL};
use crate::error_handling::ErrorType;
use crate::fetch::ReqwestHttp;
use crate::initialization::{init_client, init_semaphore};
use crate::models::{UrlResult, UrlStatus};
use crate::registry::Registry;

pub use resources::RunContext;
pub use task::process_url_task;

/// Results of a detection run.
#[derive(Debug, Clone)]
pub struct DetectionReport {
    /// Number of input URLs, invalid ones included
    pub total_urls: usize,
    /// URLs whose pipeline ran to completion
    pub completed: usize,
    /// URLs that could not be checked (invalid, unreachable, aborted)
    pub failed: usize,
    /// URLs cut off by the per-URL timeout
    pub timed_out: usize,
    /// Elapsed time in seconds
    pub elapsed_seconds: f64,
    /// Per plugin display name, the number of URLs it was detected on (registration order)
    pub detections: Vec<(String, usize)>,
    /// One record per input URL, in input order
    pub results: Vec<UrlResult>,
}

/// Reads URLs from a file, or from stdin when `path` is `-`.
///
/// Blank lines and lines starting with `#` are skipped. Lines are returned trimmed
/// but otherwise unvalidated; validation happens per URL during the run.
pub async fn read_urls(path: &Path) -> Result<Vec<String>> {
    if path.as_os_str() == "-" {
        info!("Reading URLs from stdin");
        read_url_lines(BufReader::new(tokio::io::stdin())).await
    } else {
        let file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("Failed to open input file {}", path.display()))?;
        let urls = read_url_lines(BufReader::new(file)).await?;
        info!("Total URLs in file: {}", urls.len());
        Ok(urls)
    }
}

async fn read_url_lines<R: AsyncBufRead + Unpin>(reader: R) -> Result<Vec<String>> {
    let mut lines = reader.lines();
    let mut urls = Vec::new();
    while let Some(line) = lines.next_line().await.context("Failed to read input line")? {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        urls.push(trimmed.to_string());
    }
    Ok(urls)
}

/// Runs a full detection with the built-in registry, a reqwest client and,
/// when enabled, a headless Chromium.
///
/// A browser that fails to launch does not abort the run: every URL then
/// records a failed dynamic pass and keeps its static-only verdicts.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the HTTP client cannot be built.
pub async fn run_detection(config: Config, urls: Vec<String>) -> Result<DetectionReport> {
    let registry = Arc::new(
        Registry::builtin(&config.calibration.weights).context("Failed to build tag registry")?,
    );
    info!("Loaded {} detector plugins:", registry.len());
    for tag in registry.tags() {
        info!("   {} v{} ({})", tag.plugin().name(), tag.plugin().version(), tag.key());
    }

    let client = init_client(&config).context("Failed to initialize HTTP client")?;
    let http = Arc::new(ReqwestHttp::new(client));

    let browser: Option<Arc<dyn BrowserDriver>> = if config.use_dynamic_analysis {
        match ChromiumDriver::launch(&config).await {
            Ok(driver) => {
                info!("Headless browser started");
                Some(Arc::new(driver) as Arc<dyn BrowserDriver>)
            }
            Err(e) => {
                warn!("{}. Continuing with static analysis only.", e);
                None
            }
        }
    } else {
        info!("Dynamic analysis disabled");
        None
    };

    let ctx = Arc::new(
        RunContext::new(config, registry, http, browser.clone())
            .context("Invalid run configuration")?,
    );
    let report = run_urls(Arc::clone(&ctx), urls).await;

    if let Some(driver) = browser {
        driver.shutdown().await;
    }
    Ok(report)
}

/// Processes `urls` with at most `max_workers` in flight and returns one
/// record per URL in input order.
pub async fn run_urls(ctx: Arc<RunContext>, urls: Vec<String>) -> DetectionReport {
    let start_time = Instant::now();
    let total_urls = urls.len();
    info!(
        "Checking {} URLs with {} workers (dynamic analysis: {})",
        total_urls,
        ctx.config.max_workers,
        if ctx.dynamic.is_some() { "on" } else { "off" }
    );

    let completed_urls = Arc::new(AtomicUsize::new(0));
    let failed_urls = Arc::new(AtomicUsize::new(0));

    let cancel = CancellationToken::new();
    let cancel_logging = cancel.child_token();
    let logging_task = {
        let completed_urls = Arc::clone(&completed_urls);
        let failed_urls = Arc::clone(&failed_urls);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(LOGGING_INTERVAL));
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        log_progress(start_time, total_urls, &completed_urls, &failed_urls);
                    }
                    _ = cancel_logging.cancelled() => {
                        break;
                    }
                }
            }
        })
    };

    let semaphore = init_semaphore(ctx.config.max_workers);
    let mut tasks = FuturesUnordered::new();

    for (index, url) in urls.iter().enumerate() {
        let permit = match Arc::clone(&semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                warn!("Worker pool closed, skipping URL: {url}");
                continue;
            }
        };

        let ctx = Arc::clone(&ctx);
        let url = url.clone();
        let completed_urls = Arc::clone(&completed_urls);
        let failed_urls = Arc::clone(&failed_urls);
        let handle = tokio::spawn(async move {
            let _permit = permit;
            let result = process_url_task(ctx, url).await;
            if result.is_completed() {
                completed_urls.fetch_add(1, Ordering::SeqCst);
            } else {
                failed_urls.fetch_add(1, Ordering::SeqCst);
            }
            result
        });
        tasks.push(async move { (index, handle.await) });
    }

    let mut slots: Vec<Option<UrlResult>> = vec![None; total_urls];
    while let Some((index, joined)) = tasks.next().await {
        let result = match joined {
            Ok(result) => result,
            Err(join_error) => {
                warn!("Worker for {} died: {:?}", urls[index], join_error);
                failed_urls.fetch_add(1, Ordering::SeqCst);
                ctx.stats.increment_error(ErrorType::TaskAborted);
                UrlResult::aborted(
                    urls[index].as_str(),
                    &format!("worker aborted: {join_error}"),
                    start_time.elapsed().as_millis() as u64,
                )
            }
        };
        slots[index] = Some(result);
    }

    cancel.cancel();
    if let Err(e) = logging_task.await {
        warn!("Progress logger stopped abnormally: {:?}", e);
    }
    log_progress(start_time, total_urls, &completed_urls, &failed_urls);
    print_error_statistics(&ctx.stats);

    // Slots left empty were skipped because the pool closed; record them too.
    let results: Vec<UrlResult> = slots
        .into_iter()
        .zip(urls.iter())
        .map(|(slot, url)| {
            slot.unwrap_or_else(|| UrlResult::aborted(url.as_str(), "worker pool closed", 0))
        })
        .collect();

    build_report(&ctx, results, start_time.elapsed().as_secs_f64())
}

fn build_report(ctx: &RunContext, results: Vec<UrlResult>, elapsed_seconds: f64) -> DetectionReport {
    let mut completed = 0;
    let mut failed = 0;
    let mut timed_out = 0;
    for result in &results {
        match result.status {
            UrlStatus::Completed => completed += 1,
            UrlStatus::TimedOut { .. } => timed_out += 1,
            UrlStatus::FetchFailed { .. } | UrlStatus::Aborted { .. } => failed += 1,
        }
    }

    let detections = ctx
        .registry
        .tags()
        .iter()
        .map(|tag| {
            let count = results
                .iter()
                .filter(|r| r.verdict(tag.key()).is_some_and(|v| v.detected))
                .count();
            (tag.plugin().name().to_string(), count)
        })
        .collect();

    DetectionReport {
        total_urls: results.len(),
        completed,
        failed,
        timed_out,
        elapsed_seconds,
        detections,
        results,
    }
}
