//! Configuration types and CLI options.
//!
//! This module defines enums and structs used for command-line argument parsing
//! and configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::config::calibration::{AdaptiveTimeoutConfig, Calibration};
use crate::config::constants::*;
use crate::error_handling::ConfigurationError;

/// Logging level for the application.
///
/// Controls the verbosity of log output, from most restrictive (Error) to most
/// verbose (Trace).
#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    /// Only error messages
    Error,
    /// Error and warning messages
    Warn,
    /// Error, warning, and informational messages
    Info,
    /// All messages except trace
    Debug,
    /// All messages including trace
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(l: LogLevel) -> Self {
        match l {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Log output format.
///
/// Controls how log messages are formatted:
/// - `Plain`: Human-readable format with colors (default)
/// - `Json`: Structured JSON format for machine parsing
#[derive(Clone, Debug, ValueEnum)]
pub enum LogFormat {
    /// Human-readable format with colors (default)
    Plain,
    /// Structured JSON format for machine parsing
    Json,
}

/// Library configuration (no CLI dependencies).
///
/// This is the core configuration struct used by the library. It can be
/// constructed programmatically without any CLI dependencies.
///
/// # Examples
///
/// ```no_run
/// use tag_inspector::Config;
/// use std::time::Duration;
///
/// let config = Config {
///     max_workers: 4,
///     use_dynamic_analysis: false,
///     fetch_timeout_baseline: Duration::from_secs(5),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Run the headless browser pass after static analysis
    pub use_dynamic_analysis: bool,

    /// Fetch timeout for domains without latency history
    pub fetch_timeout_baseline: Duration,

    /// Upper bound of the adaptive fetch timeout
    pub fetch_timeout_ceiling: Duration,

    /// Retries after the first attempt
    pub max_retries: u32,

    /// Retry delay base in seconds (`backoff_factor × 2^attempt_index`)
    pub backoff_factor: f64,

    /// Upper bound of random jitter added to each retry delay, in seconds
    pub retry_jitter: f64,

    /// URLs processed concurrently
    pub max_workers: usize,

    /// Browser contexts open concurrently
    pub max_browser_contexts: usize,

    /// Total progressive observation time after the initial page load
    pub dynamic_wait_budget: Duration,

    /// Length of one progressive observation increment
    pub wait_increment: Duration,

    /// Ceiling on the whole pipeline for one URL
    pub url_timeout: Duration,

    /// HTTP and browser User-Agent
    pub user_agent: String,

    /// Chromium/Chrome executable; auto-detected when `None`
    pub chromium_path: Option<PathBuf>,

    /// Scoring calibration
    pub calibration: Calibration,

    /// Log level
    pub log_level: LogLevel,

    /// Log format
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            use_dynamic_analysis: true,
            fetch_timeout_baseline: DEFAULT_FETCH_TIMEOUT_BASELINE,
            fetch_timeout_ceiling: DEFAULT_FETCH_TIMEOUT_CEILING,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            retry_jitter: DEFAULT_RETRY_JITTER_SECS,
            max_workers: DEFAULT_MAX_WORKERS,
            max_browser_contexts: DEFAULT_MAX_BROWSER_CONTEXTS,
            dynamic_wait_budget: DEFAULT_DYNAMIC_WAIT_BUDGET,
            wait_increment: DEFAULT_WAIT_INCREMENT,
            url_timeout: DEFAULT_URL_PROCESSING_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            chromium_path: None,
            calibration: Calibration::default(),
            log_level: LogLevel::Info,
            log_format: LogFormat::Plain,
        }
    }
}

impl Config {
    /// Rejects settings that would make a run inconsistent. Called before any URL is processed.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.max_workers == 0 {
            return Err(ConfigurationError::InvalidSetting(
                "max_workers must be at least 1".to_string(),
            ));
        }
        if self.max_browser_contexts == 0 {
            return Err(ConfigurationError::InvalidSetting(
                "max_browser_contexts must be at least 1".to_string(),
            ));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 0.0 {
            return Err(ConfigurationError::InvalidSetting(format!(
                "backoff_factor must be a non-negative number, got {}",
                self.backoff_factor
            )));
        }
        if !self.retry_jitter.is_finite() || self.retry_jitter < 0.0 {
            return Err(ConfigurationError::InvalidSetting(format!(
                "retry_jitter must be a non-negative number, got {}",
                self.retry_jitter
            )));
        }
        if self.fetch_timeout_baseline.is_zero() {
            return Err(ConfigurationError::InvalidSetting(
                "fetch_timeout_baseline must be positive".to_string(),
            ));
        }
        if self.fetch_timeout_baseline > self.fetch_timeout_ceiling {
            return Err(ConfigurationError::InvalidSetting(format!(
                "fetch_timeout_baseline ({:?}) exceeds fetch_timeout_ceiling ({:?})",
                self.fetch_timeout_baseline, self.fetch_timeout_ceiling
            )));
        }
        if self.use_dynamic_analysis && self.wait_increment.is_zero() {
            return Err(ConfigurationError::InvalidSetting(
                "wait_increment must be positive when dynamic analysis is enabled".to_string(),
            ));
        }
        if self.url_timeout.is_zero() {
            return Err(ConfigurationError::InvalidSetting(
                "url_timeout must be positive".to_string(),
            ));
        }
        self.calibration.validate()
    }

    /// Adaptive timeout parameters derived from the baseline and ceiling.
    pub fn adaptive_timeout(&self) -> AdaptiveTimeoutConfig {
        AdaptiveTimeoutConfig {
            baseline: self.fetch_timeout_baseline,
            ceiling: self.fetch_timeout_ceiling,
            ..Default::default()
        }
    }
}

/// Command-line options.
///
/// # Examples
///
/// ```bash
/// # Static analysis only, results to a file
/// tag_inspector urls.txt --no-dynamic --output results.jsonl
///
/// # Read URLs from stdin with four workers
/// cat urls.txt | tag_inspector - --max-workers 4
/// ```
#[derive(Debug, Parser)]
#[command(
    name = "tag_inspector",
    about = "Detects marketing and analytics tags on a list of URLs."
)]
pub struct Opt {
    /// File with one URL per line (`-` reads stdin)
    #[arg(value_parser)]
    pub file: PathBuf,

    /// JSON Lines output file (stdout when omitted)
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Log level: error|warn|info|debug|trace
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Log format: plain|json
    #[arg(long, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,

    /// Skip the headless browser pass
    #[arg(long)]
    pub no_dynamic: bool,

    /// URLs processed concurrently
    #[arg(long, default_value_t = DEFAULT_MAX_WORKERS)]
    pub max_workers: usize,

    /// Browser contexts open concurrently
    #[arg(long, default_value_t = DEFAULT_MAX_BROWSER_CONTEXTS)]
    pub max_browser_contexts: usize,

    /// Retries after the first fetch attempt
    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,

    /// Retry delay base in seconds
    #[arg(long, default_value_t = DEFAULT_BACKOFF_FACTOR)]
    pub backoff_factor: f64,

    /// Random jitter bound added to each retry delay, in seconds
    #[arg(long, default_value_t = DEFAULT_RETRY_JITTER_SECS)]
    pub retry_jitter: f64,

    /// Fetch timeout in seconds for domains without history
    #[arg(long, default_value_t = DEFAULT_FETCH_TIMEOUT_BASELINE.as_secs())]
    pub timeout_seconds: u64,

    /// Upper bound of the adaptive fetch timeout, in seconds
    #[arg(long, default_value_t = DEFAULT_FETCH_TIMEOUT_CEILING.as_secs())]
    pub timeout_ceiling_seconds: u64,

    /// Progressive observation budget after page load, in milliseconds
    #[arg(long, default_value_t = DEFAULT_DYNAMIC_WAIT_BUDGET.as_millis() as u64)]
    pub wait_budget_ms: u64,

    /// Progressive observation increment, in milliseconds
    #[arg(long, default_value_t = DEFAULT_WAIT_INCREMENT.as_millis() as u64)]
    pub wait_increment_ms: u64,

    /// Ceiling on the processing of a single URL, in seconds
    #[arg(long, default_value_t = DEFAULT_URL_PROCESSING_TIMEOUT.as_secs())]
    pub url_timeout_seconds: u64,

    /// HTTP and browser User-Agent
    #[arg(long, default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,

    /// Chromium/Chrome executable (auto-detected when omitted)
    #[arg(long)]
    pub chromium_path: Option<PathBuf>,
}

impl From<Opt> for Config {
    fn from(opt: Opt) -> Self {
        Self {
            use_dynamic_analysis: !opt.no_dynamic,
            fetch_timeout_baseline: Duration::from_secs(opt.timeout_seconds),
            fetch_timeout_ceiling: Duration::from_secs(opt.timeout_ceiling_seconds),
            max_retries: opt.max_retries,
            backoff_factor: opt.backoff_factor,
            retry_jitter: opt.retry_jitter,
            max_workers: opt.max_workers,
            max_browser_contexts: opt.max_browser_contexts,
            dynamic_wait_budget: Duration::from_millis(opt.wait_budget_ms),
            wait_increment: Duration::from_millis(opt.wait_increment_ms),
            url_timeout: Duration::from_secs(opt.url_timeout_seconds),
            user_agent: opt.user_agent,
            chromium_path: opt.chromium_path,
            calibration: Calibration::default(),
            log_level: opt.log_level,
            log_format: opt.log_format,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(
            log::LevelFilter::from(LogLevel::Error),
            log::LevelFilter::Error
        );
        assert_eq!(
            log::LevelFilter::from(LogLevel::Warn),
            log::LevelFilter::Warn
        );
        assert_eq!(
            log::LevelFilter::from(LogLevel::Info),
            log::LevelFilter::Info
        );
        assert_eq!(
            log::LevelFilter::from(LogLevel::Debug),
            log::LevelFilter::Debug
        );
        assert_eq!(
            log::LevelFilter::from(LogLevel::Trace),
            log::LevelFilter::Trace
        );
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(config.use_dynamic_analysis);
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.backoff_factor, 1.0);
        assert_eq!(config.max_workers, 2);
        assert_eq!(config.fetch_timeout_baseline, Duration::from_secs(10));
        assert!(config.chromium_path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let config = Config {
            max_workers: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_workers"));
    }

    #[test]
    fn test_validate_rejects_baseline_above_ceiling() {
        let config = Config {
            fetch_timeout_baseline: Duration::from_secs(40),
            fetch_timeout_ceiling: Duration::from_secs(30),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_negative_backoff() {
        let config = Config {
            backoff_factor: -1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_checks_calibration() {
        let mut config = Config::default();
        config.calibration.thresholds.confirmed = 0.3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_opt_into_config() {
        let opt = Opt::parse_from([
            "tag_inspector",
            "urls.txt",
            "--no-dynamic",
            "--max-workers",
            "8",
            "--max-retries",
            "5",
            "--wait-increment-ms",
            "250",
        ]);
        assert_eq!(opt.file, PathBuf::from("urls.txt"));
        let config = Config::from(opt);
        assert!(!config.use_dynamic_analysis);
        assert_eq!(config.max_workers, 8);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.wait_increment, Duration::from_millis(250));
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
    }

    #[test]
    fn test_adaptive_timeout_uses_config_bounds() {
        let config = Config {
            fetch_timeout_baseline: Duration::from_secs(3),
            fetch_timeout_ceiling: Duration::from_secs(9),
            ..Default::default()
        };
        let adaptive = config.adaptive_timeout();
        assert_eq!(adaptive.baseline, Duration::from_secs(3));
        assert_eq!(adaptive.ceiling, Duration::from_secs(9));
        assert_eq!(adaptive.window, 20);
    }
}
