//! Per-URL pipeline.
//!
//! Each URL walks the state machine
//! `Pending → Fetching → {FetchFailed | Fetched → StaticAnalyzed →
//! {DynamicSkipped | DynamicAnalyzing → {DynamicFailed | DynamicAnalyzed}}} → Merged`
//! under the per-URL ceiling. Progress is mirrored into a [`UrlProgress`] so a
//! timed-out URL still reports how far it got and what both passes had gathered.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use log::{debug, warn};
use tokio::sync::Mutex;

use crate::analysis::{analyze_static, DynamicOutcome, DynamicProgress, EvidenceMap, PageSignals};
use crate::app::{truncate_message, validate_and_normalize_url};
use crate::confidence::DynamicEvidence;
use crate::error_handling::{BrowserError, ErrorType, InfoType, WarningType};
use crate::models::{DynamicStatus, Phase, TagVerdict, UrlResult, UrlStatus};

use super::RunContext;

/// What is known about a URL so far.
#[derive(Debug)]
struct UrlState {
    url: String,
    phase: Phase,
    http_status: Option<u16>,
    static_evidence: Option<EvidenceMap>,
    page_warnings: Vec<String>,
}

impl UrlState {
    fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            phase: Phase::Pending,
            http_status: None,
            static_evidence: None,
            page_warnings: Vec::new(),
        }
    }

    fn advance(&mut self, next: Phase) {
        if !self.phase.can_advance_to(next) {
            warn!("Unexpected transition for {}: {} -> {}", self.url, self.phase, next);
        }
        debug!("{}: {} -> {}", self.url, self.phase, next);
        self.phase = next;
    }
}

/// Everything a timed-out URL can still report. Only `state` needs the lock;
/// the counters are written by futures that may be dropped mid-await.
#[derive(Debug)]
struct UrlProgress {
    state: Mutex<UrlState>,
    attempts: AtomicU32,
    dynamic: DynamicProgress,
}

impl UrlProgress {
    fn new(url: &str) -> Self {
        Self {
            state: Mutex::new(UrlState::new(url)),
            attempts: AtomicU32::new(0),
            dynamic: DynamicProgress::default(),
        }
    }

    fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

enum DynamicRun {
    Skipped,
    /// The error, plus the evidence of any samples taken before it.
    Failed(BrowserError, Option<EvidenceMap>),
    Completed(DynamicOutcome),
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// Runs one input line through the pipeline. Always yields exactly one [`UrlResult`].
pub async fn process_url_task(ctx: Arc<RunContext>, input: String) -> UrlResult {
    let start = Instant::now();

    let url = match validate_and_normalize_url(&input) {
        Ok(url) => url,
        Err(e) => {
            warn!("Skipping invalid URL '{}': {}", input.trim(), e);
            ctx.stats.increment_error(e.error_type());
            return UrlResult::fetch_failed(input.trim(), &e, 0, elapsed_ms(start));
        }
    };

    let progress = UrlProgress::new(&url);
    match tokio::time::timeout(ctx.config.url_timeout, run_pipeline(&ctx, &url, &progress, start)).await {
        Ok(result) => result,
        Err(_) => {
            ctx.stats.increment_error(ErrorType::ProcessUrlTimeout);
            let state = progress.state.lock().await;
            warn!(
                "Timeout processing URL {} after {:?} (phase: {}, attempts: {})",
                url,
                ctx.config.url_timeout,
                state.phase,
                progress.attempts()
            );
            let partial = if state.phase == Phase::DynamicAnalyzing {
                progress.dynamic.snapshot().await
            } else {
                None
            };
            timed_out_result(&ctx, &state, progress.attempts(), partial.as_ref(), start)
        }
    }
}

fn timed_out_result(
    ctx: &RunContext,
    state: &UrlState,
    attempts: u32,
    partial: Option<&EvidenceMap>,
    start: Instant,
) -> UrlResult {
    let in_dynamic = state.phase == Phase::DynamicAnalyzing;
    // Samples already taken count; a tag the pass never reached is static-only.
    let verdicts = state
        .static_evidence
        .as_ref()
        .map(|evidence| {
            merge_all(ctx, evidence, |key| match partial.and_then(|map| map.get(key)) {
                Some(observed) => DynamicEvidence::Partial(observed),
                None if in_dynamic => DynamicEvidence::Failed,
                None => DynamicEvidence::NotRun,
            })
        })
        .unwrap_or_default();
    let message = format!(
        "URL processing exceeded {:?} during {}",
        ctx.config.url_timeout, state.phase
    );

    UrlResult {
        url: state.url.clone(),
        status: UrlStatus::TimedOut { phase: state.phase },
        http_status: state.http_status,
        attempts,
        elapsed_ms: elapsed_ms(start),
        dynamic: if in_dynamic {
            DynamicStatus::Failed("timed out".to_string())
        } else {
            DynamicStatus::Skipped
        },
        verdicts,
        page_warnings: state.page_warnings.clone(),
        error: Some(message),
    }
}

async fn run_pipeline(ctx: &RunContext, url: &str, progress: &UrlProgress, start: Instant) -> UrlResult {
    let state = &progress.state;
    state.lock().await.advance(Phase::Fetching);

    let page = match ctx.fetcher.fetch_counted(url, None, &progress.attempts).await {
        Ok(page) => page,
        Err(failure) => {
            {
                let mut state = state.lock().await;
                state.advance(Phase::FetchFailed);
                state.advance(Phase::Merged);
            }
            warn!(
                "Failed to fetch {} after {} attempt(s): {}",
                url, failure.attempts, failure.error
            );
            ctx.stats.increment_error(failure.error.error_type());
            if failure.attempts > 1 {
                ctx.stats.increment_info(InfoType::FetchRetried);
            }
            return UrlResult::fetch_failed(url, &failure.error, failure.attempts, elapsed_ms(start));
        }
    };

    if page.attempts > 1 {
        ctx.stats.increment_info(InfoType::FetchRetried);
    }
    if !page.parse_errors.is_empty() {
        ctx.stats.increment_warning(WarningType::MarkupParseError);
        for error in &page.parse_errors {
            debug!("{}: {}", url, error);
        }
    }
    {
        let mut state = state.lock().await;
        state.http_status = Some(page.status);
        state.advance(Phase::Fetched);
    }

    // Static pass
    let signals = PageSignals::detect(&page.html);
    let static_evidence = analyze_static(&page.html, &page.scripts, &ctx.registry);
    let mut page_warnings = Vec::new();
    for (kind, message) in signals.warnings() {
        ctx.stats.increment_warning(kind);
        page_warnings.push(message.to_string());
    }
    {
        let mut state = state.lock().await;
        state.static_evidence = Some(static_evidence.clone());
        state.page_warnings = page_warnings.clone();
        state.advance(Phase::StaticAnalyzed);
    }

    // Dynamic pass
    let dynamic = if !ctx.config.use_dynamic_analysis {
        state.lock().await.advance(Phase::DynamicSkipped);
        DynamicRun::Skipped
    } else {
        state.lock().await.advance(Phase::DynamicAnalyzing);
        let outcome = match &ctx.dynamic {
            Some(analyzer) => {
                analyzer
                    .analyze(
                        url,
                        &ctx.registry,
                        ctx.config.dynamic_wait_budget,
                        signals.spa_framework,
                        &progress.dynamic,
                    )
                    .await
            }
            None => Err(BrowserError::Unavailable("no browser available for this run".to_string())),
        };
        match outcome {
            Ok(outcome) => {
                state.lock().await.advance(Phase::DynamicAnalyzed);
                if outcome.extensions > 0 {
                    ctx.stats.increment_info(InfoType::ProgressiveExtension);
                }
                if outcome.interacted {
                    ctx.stats.increment_info(InfoType::SimulatedInteraction);
                }
                DynamicRun::Completed(outcome)
            }
            Err(e) => {
                state.lock().await.advance(Phase::DynamicFailed);
                warn!("Dynamic analysis failed for {}: {}", url, e);
                ctx.stats.increment_error(ErrorType::BrowserSessionError);
                let partial = progress.dynamic.snapshot().await;
                let scope = if partial.is_some() {
                    "verdicts use the samples taken before the failure"
                } else {
                    "verdicts are static-only"
                };
                page_warnings.push(truncate_message(&format!("Dynamic analysis failed ({}); {}", e, scope)));
                DynamicRun::Failed(e, partial)
            }
        }
    };

    // Merge
    let verdicts = match &dynamic {
        DynamicRun::Skipped => merge_all(ctx, &static_evidence, |_| DynamicEvidence::NotRun),
        DynamicRun::Failed(_, partial) => merge_all(ctx, &static_evidence, |key| {
            match partial.as_ref().and_then(|map| map.get(key)) {
                Some(evidence) => DynamicEvidence::Partial(evidence),
                None => DynamicEvidence::Failed,
            }
        }),
        DynamicRun::Completed(outcome) => merge_all(ctx, &static_evidence, |key| {
            match outcome.evidence.get(key) {
                Some(evidence) => DynamicEvidence::Observed(evidence),
                None => DynamicEvidence::Failed,
            }
        }),
    };
    state.lock().await.advance(Phase::Merged);

    let detected = verdicts.iter().filter(|v| v.detected).count();
    debug!(
        "{}: {} of {} tags detected in {}ms",
        url,
        detected,
        verdicts.len(),
        elapsed_ms(start)
    );

    UrlResult {
        url: url.to_string(),
        status: UrlStatus::Completed,
        http_status: Some(page.status),
        attempts: page.attempts,
        elapsed_ms: elapsed_ms(start),
        dynamic: match dynamic {
            DynamicRun::Skipped => DynamicStatus::Skipped,
            DynamicRun::Failed(e, _) => DynamicStatus::Failed(truncate_message(&e.to_string())),
            DynamicRun::Completed(_) => DynamicStatus::Completed,
        },
        verdicts,
        page_warnings,
        error: None,
    }
}

/// One verdict per registered tag, in registration order.
fn merge_all<'a, F>(ctx: &RunContext, static_evidence: &EvidenceMap, dynamic_for: F) -> Vec<TagVerdict>
where
    F: Fn(&str) -> DynamicEvidence<'a>,
{
    ctx.registry
        .tags()
        .iter()
        .map(|tag| {
            let static_tag = static_evidence.get(tag.key()).cloned().unwrap_or_default();
            let merged = ctx
                .merger
                .merge(tag.key(), tag.plugin().name(), &static_tag, dynamic_for(tag.key()));
            for kind in &merged.warning_types {
                ctx.stats.increment_warning(*kind);
            }
            if merged.corroborated {
                ctx.stats.increment_info(InfoType::CorroboratedDetection);
            }
            if merged.verdict.progressive {
                ctx.stats.increment_info(InfoType::ProgressiveDetection);
            }
            merged.verdict
        })
        .collect()
}
