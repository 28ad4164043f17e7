// Shared test helpers: a scripted browser and run-context builders.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use tag_inspector::analysis::{BrowserDriver, BrowserSession, PageSnapshot};
use tag_inspector::error_handling::BrowserError;
use tag_inspector::fetch::ReqwestHttp;
use tag_inspector::initialization::init_client;
use tag_inspector::models::{DomSnapshot, NetworkRequest};
use tag_inspector::{Config, LogFormat, LogLevel, Registry, RunContext};

/// A snapshot with the given requests and `window` globals.
#[allow(dead_code)]
pub fn page(requests: &[&str], globals: &[&str], loading: bool) -> PageSnapshot {
    PageSnapshot {
        requests: requests.iter().map(|url| NetworkRequest::new(*url)).collect(),
        console_logs: Vec::new(),
        dom: DomSnapshot {
            html: "<html><body></body></html>".to_string(),
            globals: globals.iter().map(|g| g.to_string()).collect(),
        },
        current_url: "http://fake.test/".to_string(),
        loading,
    }
}

/// What a fake session does once its scripted samples are used up.
#[allow(dead_code)]
#[derive(Clone, Copy)]
enum AfterSamples {
    RepeatLast,
    Stall,
    Crash,
}

/// Browser that "renders" every URL as a scripted sequence of samples.
pub struct FakeBrowser {
    samples: Vec<PageSnapshot>,
    /// Slept before each sample.
    delay: Duration,
    after: AfterSamples,
}

#[allow(dead_code)]
impl FakeBrowser {
    pub fn new(requests: &[&str], globals: &[&str]) -> Arc<Self> {
        Self::sequence(vec![page(requests, globals, false)])
    }

    pub fn sequence(samples: Vec<PageSnapshot>) -> Arc<Self> {
        Arc::new(Self {
            samples,
            delay: Duration::ZERO,
            after: AfterSamples::RepeatLast,
        })
    }

    /// Plays `samples`, then never answers again.
    pub fn stalling_after(samples: Vec<PageSnapshot>) -> Arc<Self> {
        Arc::new(Self {
            samples,
            delay: Duration::ZERO,
            after: AfterSamples::Stall,
        })
    }

    /// Plays `samples`, then reports a crashed page.
    pub fn crashing_after(samples: Vec<PageSnapshot>) -> Arc<Self> {
        Arc::new(Self {
            samples,
            delay: Duration::ZERO,
            after: AfterSamples::Crash,
        })
    }

    /// A browser whose every sample hangs for `delay`.
    pub fn hanging(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            samples: vec![PageSnapshot::default()],
            delay,
            after: AfterSamples::RepeatLast,
        })
    }
}

struct FakeSession {
    samples: Vec<PageSnapshot>,
    next: usize,
    delay: Duration,
    after: AfterSamples,
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn observe(&mut self, duration: Duration) -> Result<PageSnapshot, BrowserError> {
        if self.next >= self.samples.len() {
            match self.after {
                AfterSamples::RepeatLast => {}
                AfterSamples::Stall => std::future::pending::<()>().await,
                AfterSamples::Crash => return Err(BrowserError::Crashed("renderer gone".to_string())),
            }
        }
        tokio::time::sleep(duration.min(Duration::from_millis(5)) + self.delay).await;
        let index = self.next.min(self.samples.len() - 1);
        self.next += 1;
        Ok(self.samples[index].clone())
    }

    async fn interact(&mut self) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn close(self: Box<Self>) {}
}

#[async_trait]
impl BrowserDriver for FakeBrowser {
    async fn open(
        &self,
        _url: &str,
        _watched: &[String],
        _navigation_timeout: Duration,
    ) -> Result<Box<dyn BrowserSession>, BrowserError> {
        Ok(Box::new(FakeSession {
            samples: self.samples.clone(),
            next: 0,
            delay: self.delay,
            after: self.after,
        }))
    }
}

/// Fast settings for local mock servers: no retry delays, short waits.
pub fn test_config(use_dynamic_analysis: bool) -> Config {
    Config {
        use_dynamic_analysis,
        fetch_timeout_baseline: Duration::from_secs(5),
        fetch_timeout_ceiling: Duration::from_secs(10),
        max_retries: 2,
        backoff_factor: 0.0,
        retry_jitter: 0.0,
        max_workers: 4,
        max_browser_contexts: 2,
        dynamic_wait_budget: Duration::from_millis(50),
        wait_increment: Duration::from_millis(10),
        url_timeout: Duration::from_secs(10),
        user_agent: "tag_inspector_test/1.0".to_string(),
        log_level: LogLevel::Error,
        log_format: LogFormat::Plain,
        ..Default::default()
    }
}

/// Builds a run context with the built-in registry and a real HTTP client.
#[allow(dead_code)]
pub fn context(config: Config, browser: Option<Arc<dyn BrowserDriver>>) -> Arc<RunContext> {
    let registry = Registry::builtin(&config.calibration.weights).expect("builtin registry");
    context_with_registry(config, registry, browser)
}

pub fn context_with_registry(
    config: Config,
    registry: Registry,
    browser: Option<Arc<dyn BrowserDriver>>,
) -> Arc<RunContext> {
    let client = init_client(&config).expect("http client");
    let http = Arc::new(ReqwestHttp::new(client));
    Arc::new(RunContext::new(config, Arc::new(registry), http, browser).expect("valid run context"))
}
