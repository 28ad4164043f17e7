//! Shared resources of a detection run.

use std::sync::Arc;

use crate::analysis::{BrowserDriver, DynamicAnalyzer};
use crate::config::Config;
use crate::confidence::Merger;
use crate::error_handling::{ConfigurationError, ProcessingStats};
use crate::fetch::{DomainStatsTracker, Fetcher, HttpGet, RetryPolicy};
use crate::initialization::init_semaphore;
use crate::registry::Registry;

/// Everything a worker needs to process one URL.
///
/// Built once per run, validated before the first URL, and shared read-only
/// through an `Arc`. The only state mutated across workers is the fetcher's
/// domain statistics and the processing counters.
pub struct RunContext {
    pub config: Config,
    pub registry: Arc<Registry>,
    pub fetcher: Fetcher,
    /// `None` when dynamic analysis is off or no browser could be provided.
    pub dynamic: Option<DynamicAnalyzer>,
    pub merger: Merger,
    pub stats: Arc<ProcessingStats>,
}

impl RunContext {
    /// Assembles a run from its collaborators.
    ///
    /// With `use_dynamic_analysis` on and no `browser`, every URL records a failed
    /// dynamic pass and falls back to static-only verdicts.
    pub fn new(
        config: Config,
        registry: Arc<Registry>,
        http: Arc<dyn HttpGet>,
        browser: Option<Arc<dyn BrowserDriver>>,
    ) -> Result<Self, ConfigurationError> {
        config.validate()?;
        if registry.is_empty() {
            return Err(ConfigurationError::EmptyRegistry);
        }

        let domains = Arc::new(DomainStatsTracker::new(config.adaptive_timeout()));
        let fetcher = Fetcher::new(http, domains, RetryPolicy::from(&config));

        let dynamic = match (config.use_dynamic_analysis, browser) {
            (true, Some(driver)) => Some(DynamicAnalyzer::new(
                driver,
                init_semaphore(config.max_browser_contexts),
                config.wait_increment,
            )),
            _ => None,
        };

        Ok(Self {
            merger: Merger::new(config.calibration.clone()),
            config,
            registry,
            fetcher,
            dynamic,
            stats: Arc::new(ProcessingStats::new()),
        })
    }
}
