//! Dynamic analysis: load the page in a browser and watch what it does.
//!
//! The browser is consumed through [`BrowserDriver`] / [`BrowserSession`]; the
//! Chromium implementation lives in [`chromium`]. [`DynamicAnalyzer`] owns the
//! progressive-load strategy: after the initial observation it keeps sampling in
//! bounded increments while the page shows continuing activity, up to the wait
//! budget. Every sample is run through the plugins and folded into the evidence
//! gathered so far; hits first seen after the initial observation are flagged
//! progressive. The folded evidence is published to a [`DynamicProgress`] after
//! each sample so a caller that abandons the pass still has it.

mod chromium;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{debug, warn};
use tokio::sync::{Mutex, Semaphore};
use tokio::time::timeout;

pub use chromium::ChromiumDriver;

use crate::analysis::{run_isolated, EvidenceMap, TagEvidence};
use crate::config::{BROWSER_EVALUATION_TIMEOUT, BROWSER_NAVIGATION_TIMEOUT, INITIAL_OBSERVATION};
use crate::error_handling::BrowserError;
use crate::models::{DomSnapshot, Evidence, NetworkRequest};
use crate::registry::Registry;

/// Everything the page has done since navigation started, sampled at one instant.
///
/// Requests and console lines are cumulative across samples of the same session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageSnapshot {
    pub requests: Vec<NetworkRequest>,
    pub console_logs: Vec<String>,
    pub dom: DomSnapshot,
    pub current_url: String,
    /// The document has not finished loading yet.
    pub loading: bool,
}

impl PageSnapshot {
    /// Whether the page was still doing something between `earlier` and `self`:
    /// new requests, a changed DOM, a route change, or a document still loading.
    pub fn activity_since(&self, earlier: &PageSnapshot) -> bool {
        self.loading
            || self.requests.len() != earlier.requests.len()
            || self.current_url != earlier.current_url
            || self.dom.html != earlier.dom.html
    }
}

/// Opens browser sessions.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Navigates a fresh context to `url`. `watched` are the `window` globals to report in snapshots.
    async fn open(
        &self,
        url: &str,
        watched: &[String],
        navigation_timeout: Duration,
    ) -> Result<Box<dyn BrowserSession>, BrowserError>;

    /// Releases the browser. Sessions still open afterwards fail.
    async fn shutdown(&self) {}
}

/// One open browser context.
#[async_trait]
pub trait BrowserSession: Send {
    /// Waits `duration`, then samples the page.
    async fn observe(&mut self, duration: Duration) -> Result<PageSnapshot, BrowserError>;

    /// Scrolls and moves the pointer once.
    async fn interact(&mut self) -> Result<(), BrowserError>;

    async fn close(self: Box<Self>);
}

/// Result of a completed dynamic pass.
#[derive(Debug, Clone, Default)]
pub struct DynamicOutcome {
    pub evidence: EvidenceMap,
    /// Increments observed after the initial sample.
    pub extensions: u32,
    pub interacted: bool,
    pub final_url: String,
}

impl DynamicOutcome {
    /// Tags with at least one progressive hit.
    pub fn progressive_tags(&self) -> usize {
        self.evidence
            .values()
            .filter(|tag| tag.evidence.is_progressive())
            .count()
    }
}

/// Evidence folded by a dynamic pass that may still be running.
#[derive(Debug, Default)]
pub struct DynamicProgress {
    evidence: Mutex<Option<EvidenceMap>>,
}

impl DynamicProgress {
    async fn publish(&self, evidence: &EvidenceMap) {
        *self.evidence.lock().await = Some(evidence.clone());
    }

    /// Evidence from every sample taken so far, or `None` before the first one.
    pub async fn snapshot(&self) -> Option<EvidenceMap> {
        self.evidence.lock().await.clone()
    }
}

struct Observation {
    evidence: EvidenceMap,
    final_url: String,
    extensions: u32,
    interacted: bool,
}

/// Drives one browser session per URL, bounded by its own context semaphore.
pub struct DynamicAnalyzer {
    driver: Arc<dyn BrowserDriver>,
    contexts: Arc<Semaphore>,
    wait_increment: Duration,
    navigation_timeout: Duration,
}

impl DynamicAnalyzer {
    pub fn new(driver: Arc<dyn BrowserDriver>, contexts: Arc<Semaphore>, wait_increment: Duration) -> Self {
        Self {
            driver,
            contexts,
            wait_increment,
            navigation_timeout: BROWSER_NAVIGATION_TIMEOUT,
        }
    }

    pub fn with_navigation_timeout(mut self, navigation_timeout: Duration) -> Self {
        self.navigation_timeout = navigation_timeout;
        self
    }

    pub fn driver(&self) -> &Arc<dyn BrowserDriver> {
        &self.driver
    }

    /// Loads `url`, observes it progressively for at most `wait_budget` after the
    /// initial sample, and runs every plugin's `detect_dynamic` on each sample.
    ///
    /// `spa_hint` forces one simulated interaction followed by at least one extra
    /// increment. The session is closed on every path; if this future is dropped
    /// the session's own cleanup takes over and `progress` keeps what was seen.
    pub async fn analyze(
        &self,
        url: &str,
        registry: &Registry,
        wait_budget: Duration,
        spa_hint: bool,
        progress: &DynamicProgress,
    ) -> Result<DynamicOutcome, BrowserError> {
        let _permit = self
            .contexts
            .acquire()
            .await
            .map_err(|_| BrowserError::Unavailable("browser context pool closed".to_string()))?;

        let watched = registry.watched_globals();
        let ceiling = self.navigation_timeout + BROWSER_EVALUATION_TIMEOUT;
        let mut session = match timeout(
            ceiling,
            self.driver.open(url, &watched, self.navigation_timeout),
        )
        .await
        {
            Ok(opened) => opened?,
            Err(_) => return Err(BrowserError::NavigationTimeout(self.navigation_timeout)),
        };

        let observed = self
            .observe_progressively(session.as_mut(), registry, wait_budget, spa_hint, progress)
            .await;
        session.close().await;
        let observation = observed?;

        debug!(
            "Dynamic pass for {} finished after {} extension(s){}",
            url,
            observation.extensions,
            if observation.interacted { " with interaction" } else { "" }
        );

        Ok(DynamicOutcome {
            evidence: observation.evidence,
            extensions: observation.extensions,
            interacted: observation.interacted,
            final_url: observation.final_url,
        })
    }

    async fn sample(
        &self,
        session: &mut dyn BrowserSession,
        duration: Duration,
    ) -> Result<PageSnapshot, BrowserError> {
        match timeout(duration + BROWSER_EVALUATION_TIMEOUT, session.observe(duration)).await {
            Ok(snapshot) => snapshot,
            Err(_) => Err(BrowserError::Evaluation(format!(
                "page sample did not return within {:?}",
                duration + BROWSER_EVALUATION_TIMEOUT
            ))),
        }
    }

    async fn observe_progressively(
        &self,
        session: &mut dyn BrowserSession,
        registry: &Registry,
        wait_budget: Duration,
        spa_hint: bool,
        progress: &DynamicProgress,
    ) -> Result<Observation, BrowserError> {
        let at_load = self.sample(session, Duration::ZERO).await?;
        let mut evidence = detect(registry, &at_load);
        progress.publish(&evidence).await;

        let initial = self.sample(session, INITIAL_OBSERVATION).await?;
        evidence = fold(evidence, detect(registry, &initial), Evidence::union);
        progress.publish(&evidence).await;

        let deadline = Instant::now() + wait_budget;
        let mut active = initial.activity_since(&at_load);
        let mut pending_interaction = spa_hint;
        let mut interacted = false;
        let mut extensions = 0;
        let mut latest = initial;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || !(active || pending_interaction) {
                break;
            }
            if pending_interaction {
                pending_interaction = false;
                match timeout(BROWSER_EVALUATION_TIMEOUT, session.interact()).await {
                    Ok(Ok(())) => interacted = true,
                    Ok(Err(e)) => warn!("Simulated interaction failed: {}", e),
                    Err(_) => warn!("Simulated interaction timed out"),
                }
            }
            let next = self
                .sample(session, self.wait_increment.min(remaining))
                .await?;
            extensions += 1;
            evidence = fold(evidence, detect(registry, &next), Evidence::with_progressive);
            progress.publish(&evidence).await;
            active = next.activity_since(&latest);
            latest = next;
        }

        Ok(Observation {
            evidence,
            final_url: latest.current_url,
            extensions,
            interacted,
        })
    }
}

fn detect(registry: &Registry, snapshot: &PageSnapshot) -> EvidenceMap {
    registry
        .tags()
        .iter()
        .map(|tag| {
            let plugin = tag.plugin();
            let outcome = run_isolated(plugin.name(), || {
                plugin.detect_dynamic(
                    &snapshot.requests,
                    &snapshot.console_logs,
                    &snapshot.dom,
                    tag.pattern(),
                )
            });
            (tag.key().to_string(), outcome)
        })
        .collect()
}

/// Folds one sample's detections into the evidence gathered so far.
fn fold(
    gathered: EvidenceMap,
    mut sample: EvidenceMap,
    combine: fn(&Evidence, &Evidence) -> Evidence,
) -> EvidenceMap {
    let mut folded: EvidenceMap = gathered
        .into_iter()
        .map(|(key, earlier)| {
            let later = sample.remove(&key).unwrap_or_default();
            let evidence = combine(&earlier.evidence, &later.evidence);
            let fault = later.fault.or(earlier.fault);
            (key, TagEvidence { evidence, fault })
        })
        .collect();
    for (key, later) in sample {
        let evidence = combine(&Evidence::empty(), &later.evidence);
        folded.insert(
            key,
            TagEvidence {
                evidence,
                fault: later.fault,
            },
        );
    }
    folded
}
