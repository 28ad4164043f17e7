//! Configuration constants.
//!
//! This module defines the default values used throughout the application,
//! including timeouts, retry settings and size limits.

use std::time::Duration;

/// Interval between progress log lines, in seconds.
pub const LOGGING_INTERVAL: u64 = 5;

/// Default User-Agent string for HTTP requests and browser sessions.
///
/// Users can override this via the `--user-agent` CLI flag.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

// Fetch timeouts
/// Baseline fetch timeout used for domains without history.
pub const DEFAULT_FETCH_TIMEOUT_BASELINE: Duration = Duration::from_secs(10);
/// Hard ceiling for the adaptive fetch timeout.
pub const DEFAULT_FETCH_TIMEOUT_CEILING: Duration = Duration::from_secs(30);
/// TCP connection timeout in seconds
pub const TCP_CONNECT_TIMEOUT_SECS: u64 = 5;

// Retry strategy
/// Number of retries after the initial attempt (attempts = retries + 1).
pub const DEFAULT_MAX_RETRIES: u32 = 2;
/// Base of the retry delay: `backoff_factor × 2^attempt_index` seconds.
pub const DEFAULT_BACKOFF_FACTOR: f64 = 1.0;
/// Upper bound of the random jitter added to each retry delay, in seconds.
pub const DEFAULT_RETRY_JITTER_SECS: f64 = 0.0;
/// Largest single retry delay we are willing to sleep, regardless of factor.
pub const RETRY_MAX_DELAY: Duration = Duration::from_secs(60);

// Concurrency
/// Default number of URL workers.
pub const DEFAULT_MAX_WORKERS: usize = 2;
/// Default number of browser contexts open at the same time.
pub const DEFAULT_MAX_BROWSER_CONTEXTS: usize = 2;

// Dynamic analysis
/// Total time the dynamic analyzer may keep observing after the initial load.
pub const DEFAULT_DYNAMIC_WAIT_BUDGET: Duration = Duration::from_secs(8);
/// Length of one progressive observation increment.
pub const DEFAULT_WAIT_INCREMENT: Duration = Duration::from_millis(500);
/// Observation window right after navigation.
pub const INITIAL_OBSERVATION: Duration = Duration::from_millis(250);
/// Browser navigation timeout.
pub const BROWSER_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(20);
/// Extra time allowed for one page evaluation on top of the observation it follows.
pub const BROWSER_EVALUATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-URL processing ceiling (fetch, static, dynamic and merge together).
pub const DEFAULT_URL_PROCESSING_TIMEOUT: Duration = Duration::from_secs(60);

// Response and script size limits
/// Maximum response body size in bytes (5MB)
pub const MAX_RESPONSE_BODY_SIZE: usize = 5 * 1024 * 1024;
/// Maximum inline script content kept per script tag (100KB)
pub const MAX_SCRIPT_CONTENT_SIZE: usize = 100 * 1024;
/// Maximum length of an error message carried in a result record
pub const MAX_ERROR_MESSAGE_LENGTH: usize = 500;

/// Maximum URL length accepted from the input.
pub const MAX_URL_LENGTH: usize = 2048;
