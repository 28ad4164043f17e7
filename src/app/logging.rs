//! Progress logging utilities.

use log::info;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Logs how many URLs have finished so far and the current rate.
pub fn log_progress(
    start_time: std::time::Instant,
    total_urls: usize,
    completed_urls: &Arc<AtomicUsize>,
    failed_urls: &Arc<AtomicUsize>,
) {
    let elapsed_secs = start_time.elapsed().as_secs_f64();
    let completed = completed_urls.load(Ordering::SeqCst);
    let failed = failed_urls.load(Ordering::SeqCst);
    let done = completed + failed;
    let rate = if elapsed_secs > 0.0 {
        done as f64 / elapsed_secs
    } else {
        0.0
    };
    info!(
        "Checked {}/{} URLs ({} failed) in {:.2} seconds (~{:.2} URLs/sec)",
        done, total_urls, failed, elapsed_secs, rate
    );
}
