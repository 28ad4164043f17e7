//! Retrying page fetcher.
//!
//! The [`Fetcher`] wraps an [`HttpGet`] capability with the run's [`RetryPolicy`]
//! and a shared [`DomainStatsTracker`]. Every attempt gets its own adaptive
//! timeout and is recorded against the URL's domain whatever its outcome.
//! A successful body is scanned for `<script>` references; nothing is executed.

mod client;
mod domain_stats;
mod retry;
mod scripts;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, warn};
use tokio_retry::RetryIf;

pub use client::{HttpGet, HttpResponse, ReqwestHttp};
pub use domain_stats::{DomainStats, DomainStatsTracker};
pub use retry::RetryPolicy;
pub use scripts::{extract_scripts, ExtractedScripts};

use crate::app::url::domain_of;
use crate::error_handling::{FetchError, ParseError};
use crate::models::ScriptRef;

/// A page that was fetched with a 2xx answer.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    pub final_url: String,
    pub status: u16,
    pub html: String,
    pub scripts: Vec<ScriptRef>,
    pub parse_errors: Vec<ParseError>,
    pub elapsed: Duration,
    pub attempts: u32,
}

/// The retry policy gave up.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchFailure {
    /// Error of the last attempt.
    pub error: FetchError,
    pub attempts: u32,
    pub elapsed: Duration,
}

pub struct Fetcher {
    client: Arc<dyn HttpGet>,
    domains: Arc<DomainStatsTracker>,
    policy: RetryPolicy,
}

impl Fetcher {
    pub fn new(client: Arc<dyn HttpGet>, domains: Arc<DomainStatsTracker>, policy: RetryPolicy) -> Self {
        Self {
            client,
            domains,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn domains(&self) -> &Arc<DomainStatsTracker> {
        &self.domains
    }

    /// Fetches `url`, retrying transient failures.
    ///
    /// The timeout of each attempt is the domain's adaptive timeout, lowered to
    /// `timeout_hint` when one is given. At most `max_retries + 1` attempts are made;
    /// permanent failures (most 4xx answers, invalid URLs) stop immediately.
    pub async fn fetch(&self, url: &str, timeout_hint: Option<Duration>) -> Result<FetchedPage, FetchFailure> {
        self.fetch_counted(url, timeout_hint, &AtomicU32::new(0)).await
    }

    /// [`Fetcher::fetch`] that counts attempts into `attempts` as they start, so the
    /// count is still readable if this future is dropped.
    pub async fn fetch_counted(
        &self,
        url: &str,
        timeout_hint: Option<Duration>,
        attempts: &AtomicU32,
    ) -> Result<FetchedPage, FetchFailure> {
        let start = Instant::now();
        let domain = domain_of(url);
        let domain = domain.as_str();

        let outcome = RetryIf::spawn(
            self.policy.delays(),
            || self.attempt(url, domain, timeout_hint, attempts),
            |e: &FetchError| e.is_retriable(),
        )
        .await;

        let attempts = attempts.load(Ordering::SeqCst);
        match outcome {
            Ok(response) => {
                let extracted = extract_scripts(&response.body, &response.final_url);
                debug!(
                    "Fetched {} ({} bytes, {} scripts) in {} attempt(s)",
                    url,
                    response.body.len(),
                    extracted.scripts.len(),
                    attempts
                );
                Ok(FetchedPage {
                    url: url.to_string(),
                    final_url: response.final_url,
                    status: response.status,
                    html: response.body,
                    scripts: extracted.scripts,
                    parse_errors: extracted.parse_errors,
                    elapsed: start.elapsed(),
                    attempts,
                })
            }
            Err(error) => Err(FetchFailure {
                error,
                attempts,
                elapsed: start.elapsed(),
            }),
        }
    }

    async fn attempt(
        &self,
        url: &str,
        domain: &str,
        timeout_hint: Option<Duration>,
        attempts: &AtomicU32,
    ) -> Result<HttpResponse, FetchError> {
        let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let adaptive = self.domains.timeout_for(domain).await;
        let timeout = timeout_hint.map_or(adaptive, |hint| hint.min(adaptive));
        debug!(
            "Fetching {} (attempt {}/{}, timeout {:?})",
            url,
            attempt,
            self.policy.attempts(),
            timeout
        );

        let started = Instant::now();
        let outcome = self.client.get(url, timeout).await;
        let elapsed = match &outcome {
            Ok(response) => response.elapsed,
            Err(_) => started.elapsed(),
        };
        let outcome = outcome.and_then(|response| {
            if (200..300).contains(&response.status) {
                Ok(response)
            } else {
                Err(FetchError::Status(response.status))
            }
        });

        // A definitive answer (even a 404) says the domain is reachable.
        let healthy = !matches!(&outcome, Err(e) if e.is_retriable());
        self.domains.record(domain, elapsed, healthy).await;

        if let Err(e) = &outcome {
            warn!(
                "Attempt {}/{} for {} failed: {}",
                attempt,
                self.policy.attempts(),
                url,
                e
            );
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdaptiveTimeoutConfig;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Plays back a fixed list of outcomes, repeating the last one.
    struct ScriptedHttp {
        outcomes: Vec<Result<HttpResponse, FetchError>>,
        calls: AtomicU32,
        timeouts: Mutex<Vec<Duration>>,
    }

    impl ScriptedHttp {
        fn new(outcomes: Vec<Result<HttpResponse, FetchError>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes,
                calls: AtomicU32::new(0),
                timeouts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl HttpGet for ScriptedHttp {
        async fn get(&self, _url: &str, timeout: Duration) -> Result<HttpResponse, FetchError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            self.timeouts.lock().unwrap().push(timeout);
            let index = call.min(self.outcomes.len() - 1);
            self.outcomes[index].clone()
        }
    }

    fn ok(body: &str) -> Result<HttpResponse, FetchError> {
        Ok(HttpResponse {
            status: 200,
            body: body.to_string(),
            elapsed: Duration::from_millis(40),
            final_url: "https://example.com/".to_string(),
        })
    }

    fn fetcher(http: Arc<ScriptedHttp>, max_retries: u32) -> Fetcher {
        Fetcher::new(
            http,
            Arc::new(DomainStatsTracker::new(AdaptiveTimeoutConfig::default())),
            RetryPolicy::new(max_retries, 0.0),
        )
    }

    #[tokio::test]
    async fn test_permanent_failure_makes_exactly_max_retries_plus_one_attempts() {
        let http = ScriptedHttp::new(vec![Err(FetchError::Connect("refused".into()))]);
        let fetcher = fetcher(http.clone(), 2);

        let failure = fetcher.fetch("https://down.test/", None).await.unwrap_err();

        assert_eq!(failure.attempts, 3);
        assert_eq!(http.calls.load(Ordering::SeqCst), 3);
        assert_eq!(failure.error, FetchError::Connect("refused".into()));
        let stats = fetcher.domains().snapshot("down.test").await.unwrap();
        assert_eq!(stats.samples, 3);
        assert_eq!(stats.failures, 3);
    }

    #[tokio::test]
    async fn test_success_is_not_retried() {
        let http = ScriptedHttp::new(vec![ok("<html></html>")]);
        let page = fetcher(http.clone(), 5).fetch("https://example.com/", None).await.unwrap();
        assert_eq!(page.attempts, 1);
        assert_eq!(http.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_then_success() {
        let http = ScriptedHttp::new(vec![
            Err(FetchError::Timeout(Duration::from_secs(10))),
            ok(r#"<script src="https://www.googletagmanager.com/gtm.js?id=GTM-ABCD"></script>"#),
        ]);
        let page = fetcher(http.clone(), 2).fetch("https://example.com/", None).await.unwrap();
        assert_eq!(page.attempts, 2);
        assert_eq!(page.scripts.len(), 1);
        assert_eq!(page.status, 200);
    }

    #[tokio::test]
    async fn test_client_error_status_is_permanent() {
        let http = ScriptedHttp::new(vec![Ok(HttpResponse {
            status: 404,
            body: String::new(),
            elapsed: Duration::from_millis(10),
            final_url: "https://example.com/missing".to_string(),
        })]);
        let fetcher = fetcher(http.clone(), 3);
        let failure = fetcher.fetch("https://example.com/missing", None).await.unwrap_err();
        assert_eq!(failure.error, FetchError::Status(404));
        assert_eq!(failure.attempts, 1);
        let stats = fetcher.domains().snapshot("example.com").await.unwrap();
        assert_eq!(stats.failures, 0);
    }

    #[tokio::test]
    async fn test_server_error_status_is_retried() {
        let http = ScriptedHttp::new(vec![Ok(HttpResponse {
            status: 503,
            body: String::new(),
            elapsed: Duration::from_millis(10),
            final_url: "https://example.com/".to_string(),
        })]);
        let failure = fetcher(http.clone(), 1)
            .fetch("https://example.com/", None)
            .await
            .unwrap_err();
        assert_eq!(failure.error, FetchError::Status(503));
        assert_eq!(failure.attempts, 2);
    }

    #[tokio::test]
    async fn test_attempt_count_is_visible_while_fetch_is_pending() {
        struct Hanging {
            calls: AtomicU32,
        }

        #[async_trait]
        impl HttpGet for Hanging {
            async fn get(&self, _url: &str, _timeout: Duration) -> Result<HttpResponse, FetchError> {
                if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    return Err(FetchError::Status(503));
                }
                std::future::pending().await
            }
        }

        let fetcher = Fetcher::new(
            Arc::new(Hanging {
                calls: AtomicU32::new(0),
            }),
            Arc::new(DomainStatsTracker::new(AdaptiveTimeoutConfig::default())),
            RetryPolicy::new(5, 0.0),
        );
        let attempts = AtomicU32::new(0);
        let outcome = tokio::time::timeout(
            Duration::from_millis(200),
            fetcher.fetch_counted("https://slow.test/", None, &attempts),
        )
        .await;

        assert!(outcome.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_timeout_hint_lowers_adaptive_timeout() {
        let http = ScriptedHttp::new(vec![ok("")]);
        fetcher(http.clone(), 0)
            .fetch("https://example.com/", Some(Duration::from_secs(3)))
            .await
            .unwrap();
        fetcher(http.clone(), 0)
            .fetch("https://example.com/", Some(Duration::from_secs(60)))
            .await
            .unwrap();
        let timeouts = http.timeouts.lock().unwrap().clone();
        assert_eq!(timeouts, vec![Duration::from_secs(3), Duration::from_secs(10)]);
    }
}
