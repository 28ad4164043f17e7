//! Data carried between the pipeline stages: evidence, verdicts, and per-URL results.

use std::fmt;

use serde::Serialize;
use strum_macros::EnumIter;

use crate::error_handling::FetchError;

/// One independent detection method that can contribute evidence for a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, EnumIter)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    // Static methods
    ContainerId,
    ScriptUrl,
    InlineCall,
    DynamicInsertion,
    Noscript,
    // Dynamic methods
    NetworkRequest,
    GlobalObject,
    RenderedDom,
    ConsoleMessage,
}

impl DetectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::ContainerId => "Container ID Detection",
            DetectionMethod::ScriptUrl => "Script URL Detection",
            DetectionMethod::InlineCall => "Inline Function Call",
            DetectionMethod::DynamicInsertion => "Dynamic Script Insertion",
            DetectionMethod::Noscript => "Noscript Fallback",
            DetectionMethod::NetworkRequest => "Network Request",
            DetectionMethod::GlobalObject => "Global Object",
            DetectionMethod::RenderedDom => "Rendered DOM",
            DetectionMethod::ConsoleMessage => "Console Message",
        }
    }

    pub fn is_static(&self) -> bool {
        matches!(
            self,
            DetectionMethod::ContainerId
                | DetectionMethod::ScriptUrl
                | DetectionMethod::InlineCall
                | DetectionMethod::DynamicInsertion
                | DetectionMethod::Noscript
        )
    }

    /// Static methods that show the tag is wired to execute. Noscript markup alone does not.
    pub fn is_independent_static(&self) -> bool {
        self.is_static() && *self != DetectionMethod::Noscript
    }

    /// Dynamic methods that show the tag actually ran.
    pub fn is_independent_dynamic(&self) -> bool {
        matches!(
            self,
            DetectionMethod::NetworkRequest | DetectionMethod::GlobalObject
        )
    }
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a tag gets onto the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadingMethod {
    #[default]
    Unknown,
    /// A `<script src>` element pointing at the vendor loader.
    DirectScript,
    /// An inline `createElement('script')` snippet.
    DynamicInsertion,
    /// A self-invoking loader function.
    AsyncFunction,
    /// Only seen executing at runtime.
    JavascriptExecution,
}

impl LoadingMethod {
    pub fn is_known(&self) -> bool {
        *self != LoadingMethod::Unknown
    }
}

/// A single (method, matched value, weight) hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvidenceItem {
    pub method: DetectionMethod,
    pub value: String,
    pub weight: f64,
    /// Container, pixel, or measurement ID captured from the match, if any.
    pub identifier: Option<String>,
    /// Observed only after the initial page load.
    pub progressive: bool,
}

/// Ordered set of hits contributed by one analysis pass for one tag on one URL.
///
/// Built once through [`EvidenceBuilder`] and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Evidence {
    items: Vec<EvidenceItem>,
    loading: LoadingMethod,
}

impl Evidence {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builder() -> EvidenceBuilder {
        EvidenceBuilder::default()
    }

    pub fn items(&self) -> &[EvidenceItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn has_method(&self, method: DetectionMethod) -> bool {
        self.items.iter().any(|item| item.method == method)
    }

    pub fn is_progressive(&self) -> bool {
        self.items.iter().any(|item| item.progressive)
    }

    pub fn loading(&self) -> LoadingMethod {
        self.loading
    }

    /// Union of an initial sample and a later one.
    ///
    /// Items of `later` that were not already in `initial` are marked progressive.
    /// Weights are carried over untouched.
    pub fn with_progressive(initial: &Evidence, later: &Evidence) -> Evidence {
        Self::extended(initial, later, true)
    }

    /// Union of two samples taken before the page settled; nothing is marked progressive.
    pub fn union(first: &Evidence, second: &Evidence) -> Evidence {
        Self::extended(first, second, false)
    }

    fn extended(initial: &Evidence, later: &Evidence, progressive: bool) -> Evidence {
        let mut builder = EvidenceBuilder {
            items: initial.items.clone(),
            loading: if initial.loading.is_known() {
                initial.loading
            } else {
                later.loading
            },
        };
        for item in &later.items {
            if !initial.contains(item) {
                builder.items.push(EvidenceItem {
                    progressive: progressive || item.progressive,
                    ..item.clone()
                });
            }
        }
        builder.build()
    }

    fn contains(&self, other: &EvidenceItem) -> bool {
        self.items
            .iter()
            .any(|item| item.method == other.method && item.value == other.value)
    }
}

/// Accumulates hits for one tag. Duplicate (method, value) pairs are kept once.
#[derive(Debug, Default)]
pub struct EvidenceBuilder {
    items: Vec<EvidenceItem>,
    loading: LoadingMethod,
}

impl EvidenceBuilder {
    /// Records how the tag is loaded. A later call overrides an earlier one.
    pub fn loading(&mut self, method: LoadingMethod) -> &mut Self {
        self.loading = method;
        self
    }

    pub fn hit(&mut self, method: DetectionMethod, value: impl Into<String>, weight: f64) -> &mut Self {
        self.push(method, value.into(), weight, None)
    }

    pub fn hit_with_id(
        &mut self,
        method: DetectionMethod,
        value: impl Into<String>,
        weight: f64,
        identifier: Option<String>,
    ) -> &mut Self {
        self.push(method, value.into(), weight, identifier)
    }

    fn push(
        &mut self,
        method: DetectionMethod,
        value: String,
        weight: f64,
        identifier: Option<String>,
    ) -> &mut Self {
        self.items.push(EvidenceItem {
            method,
            value,
            weight,
            identifier,
            progressive: false,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn build(self) -> Evidence {
        let mut items: Vec<EvidenceItem> = Vec::with_capacity(self.items.len());
        for item in self.items {
            if !items
                .iter()
                .any(|kept| kept.method == item.method && kept.value == item.value)
            {
                items.push(item);
            }
        }
        Evidence {
            items,
            loading: self.loading,
        }
    }
}

/// External or inline `<script>` element found in fetched markup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScriptRef {
    /// `src` attribute, resolved against the page URL when possible.
    pub src: Option<String>,
    /// Inline body, truncated to `MAX_SCRIPT_CONTENT_SIZE`.
    pub content: String,
}

/// Outbound request observed by the browser.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct NetworkRequest {
    pub url: String,
    pub query: Option<String>,
}

impl NetworkRequest {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let query = url::Url::parse(&url)
            .ok()
            .and_then(|parsed| parsed.query().map(str::to_string));
        Self { url, query }
    }
}

/// Rendered DOM plus the designated global objects found on `window`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DomSnapshot {
    pub html: String,
    pub globals: Vec<String>,
}

impl DomSnapshot {
    pub fn has_global(&self, name: &str) -> bool {
        self.globals.iter().any(|g| g == name)
    }
}

/// Verdict category derived from confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Category {
    Confirmed,
    Likely,
    Possible,
    #[serde(rename = "Not Detected")]
    NotDetected,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Confirmed => "Confirmed",
            Category::Likely => "Likely",
            Category::Possible => "Possible",
            Category::NotDetected => "Not Detected",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final per-tag verdict for one URL.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagVerdict {
    /// Registry key, e.g. `gtm`.
    pub tag: String,
    /// Display name reported by the plugin.
    pub name: String,
    pub detected: bool,
    pub confidence: f64,
    pub category: Category,
    pub identifiers: Vec<String>,
    pub methods: Vec<String>,
    pub warnings: Vec<String>,
    pub loading_method: LoadingMethod,
    pub progressive: bool,
    /// Dynamic analysis was requested but failed or was cut short.
    pub degraded: bool,
}

/// Pipeline state of one URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Pending,
    Fetching,
    FetchFailed,
    Fetched,
    StaticAnalyzed,
    DynamicSkipped,
    DynamicAnalyzing,
    DynamicFailed,
    DynamicAnalyzed,
    Merged,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Pending => "pending",
            Phase::Fetching => "fetching",
            Phase::FetchFailed => "fetch_failed",
            Phase::Fetched => "fetched",
            Phase::StaticAnalyzed => "static_analyzed",
            Phase::DynamicSkipped => "dynamic_skipped",
            Phase::DynamicAnalyzing => "dynamic_analyzing",
            Phase::DynamicFailed => "dynamic_failed",
            Phase::DynamicAnalyzed => "dynamic_analyzed",
            Phase::Merged => "merged",
        }
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_advance_to(&self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (Pending, Fetching)
                | (Fetching, FetchFailed)
                | (Fetching, Fetched)
                | (Fetched, StaticAnalyzed)
                | (StaticAnalyzed, DynamicSkipped)
                | (StaticAnalyzed, DynamicAnalyzing)
                | (DynamicAnalyzing, DynamicFailed)
                | (DynamicAnalyzing, DynamicAnalyzed)
                | (FetchFailed, Merged)
                | (DynamicSkipped, Merged)
                | (DynamicFailed, Merged)
                | (DynamicAnalyzed, Merged)
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal status of one URL.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum UrlStatus {
    Completed,
    FetchFailed { kind: String, message: String },
    /// The per-URL ceiling expired while in `phase`.
    TimedOut { phase: Phase },
    Aborted { message: String },
}

/// Outcome of the dynamic pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum DynamicStatus {
    Skipped,
    Completed,
    Failed(String),
}

/// One record per input URL.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UrlResult {
    pub url: String,
    pub status: UrlStatus,
    pub http_status: Option<u16>,
    /// Fetch attempts made, retries included.
    pub attempts: u32,
    pub elapsed_ms: u64,
    pub dynamic: DynamicStatus,
    /// One verdict per registered plugin, in registration order. Empty when the fetch failed.
    pub verdicts: Vec<TagVerdict>,
    pub page_warnings: Vec<String>,
    pub error: Option<String>,
}

impl UrlResult {
    pub fn fetch_failed(url: impl Into<String>, error: &FetchError, attempts: u32, elapsed_ms: u64) -> Self {
        let message = crate::app::truncate_message(&error.to_string());
        Self {
            url: url.into(),
            status: UrlStatus::FetchFailed {
                kind: error.error_type().as_str().to_string(),
                message: message.clone(),
            },
            http_status: match error {
                FetchError::Status(code) => Some(*code),
                _ => None,
            },
            attempts,
            elapsed_ms,
            dynamic: DynamicStatus::Skipped,
            verdicts: Vec::new(),
            page_warnings: Vec::new(),
            error: Some(message),
        }
    }

    /// The worker processing this URL died before producing a record.
    pub fn aborted(url: impl Into<String>, message: &str, elapsed_ms: u64) -> Self {
        let message = crate::app::truncate_message(message);
        Self {
            url: url.into(),
            status: UrlStatus::Aborted {
                message: message.clone(),
            },
            http_status: None,
            attempts: 0,
            elapsed_ms,
            dynamic: DynamicStatus::Skipped,
            verdicts: Vec::new(),
            page_warnings: Vec::new(),
            error: Some(message),
        }
    }

    /// Verdicts with any evidence at all.
    pub fn detected(&self) -> impl Iterator<Item = &TagVerdict> {
        self.verdicts.iter().filter(|v| v.detected)
    }

    pub fn verdict(&self, tag: &str) -> Option<&TagVerdict> {
        self.verdicts.iter().find(|v| v.tag == tag)
    }

    /// The pipeline ran to completion (as opposed to "could not be checked").
    pub fn is_completed(&self) -> bool {
        self.status == UrlStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_drops_duplicate_hits() {
        let mut builder = Evidence::builder();
        builder
            .hit(DetectionMethod::ContainerId, "GTM-ABC123", 0.6)
            .hit(DetectionMethod::ContainerId, "GTM-ABC123", 0.6)
            .hit(DetectionMethod::ScriptUrl, "gtm.js", 0.55);
        let evidence = builder.build();
        assert_eq!(evidence.items().len(), 2);
        assert_eq!(evidence.items()[0].method, DetectionMethod::ContainerId);
    }

    #[test]
    fn test_with_progressive_marks_only_new_items() {
        let mut first = Evidence::builder();
        first.hit(DetectionMethod::GlobalObject, "dataLayer", 0.45);
        let initial = first.build();

        let mut second = Evidence::builder();
        second
            .hit(DetectionMethod::GlobalObject, "dataLayer", 0.45)
            .hit(DetectionMethod::NetworkRequest, "googletagmanager.com", 0.6);
        let later = second.build();

        let merged = Evidence::with_progressive(&initial, &later);
        assert_eq!(merged.items().len(), 2);
        assert!(!merged.items()[0].progressive);
        assert!(merged.items()[1].progressive);
        assert_eq!(merged.items()[1].weight, 0.6);
        assert!(merged.is_progressive());
    }

    #[test]
    fn test_union_keeps_items_immediate_and_first_loading_method() {
        let mut first = Evidence::builder();
        first.hit(DetectionMethod::GlobalObject, "ttq", 0.45);
        let mut second = Evidence::builder();
        second
            .hit(DetectionMethod::NetworkRequest, "analytics.tiktok.com", 0.6)
            .loading(LoadingMethod::JavascriptExecution);

        let merged = Evidence::union(&first.build(), &second.build());
        assert_eq!(merged.items().len(), 2);
        assert!(!merged.is_progressive());
        assert_eq!(merged.loading(), LoadingMethod::JavascriptExecution);
    }

    #[test]
    fn test_progressive_flag_survives_later_folds() {
        let mut late = Evidence::builder();
        late.hit(DetectionMethod::GlobalObject, "ttq", 0.45);
        let folded = Evidence::with_progressive(&Evidence::empty(), &late.build());
        let refolded = Evidence::union(&Evidence::empty(), &folded);
        assert!(refolded.items()[0].progressive);
    }

    #[test]
    fn test_method_classes() {
        assert!(DetectionMethod::Noscript.is_static());
        assert!(!DetectionMethod::Noscript.is_independent_static());
        assert!(DetectionMethod::ContainerId.is_independent_static());
        assert!(DetectionMethod::NetworkRequest.is_independent_dynamic());
        assert!(!DetectionMethod::ConsoleMessage.is_independent_dynamic());
        assert!(!DetectionMethod::RenderedDom.is_static());
    }

    #[test]
    fn test_network_request_splits_query() {
        let request = NetworkRequest::new("https://www.facebook.com/tr?id=123&ev=PageView");
        assert_eq!(request.query.as_deref(), Some("id=123&ev=PageView"));
        assert_eq!(NetworkRequest::new("not a url").query, None);
    }

    #[test]
    fn test_phase_transitions() {
        assert!(Phase::Pending.can_advance_to(Phase::Fetching));
        assert!(Phase::FetchFailed.can_advance_to(Phase::Merged));
        assert!(Phase::DynamicFailed.can_advance_to(Phase::Merged));
        assert!(!Phase::Fetched.can_advance_to(Phase::Merged));
        assert!(!Phase::FetchFailed.can_advance_to(Phase::StaticAnalyzed));
    }

    #[test]
    fn test_fetch_failed_result_has_no_verdicts() {
        let result = UrlResult::fetch_failed("https://example.com", &FetchError::Status(503), 3, 1200);
        assert!(result.verdicts.is_empty());
        assert_eq!(result.attempts, 3);
        assert_eq!(result.http_status, Some(503));
        assert!(!result.is_completed());
        match &result.status {
            UrlStatus::FetchFailed { kind, .. } => assert_eq!(kind, "Service Unavailable (503)"),
            other => panic!("unexpected status {:?}", other),
        }
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_value(UrlStatus::TimedOut {
            phase: Phase::DynamicAnalyzing,
        })
        .unwrap();
        assert_eq!(json["state"], "timed_out");
        assert_eq!(json["phase"], "dynamic_analyzing");
        let json = serde_json::to_value(Category::NotDetected).unwrap();
        assert_eq!(json, "Not Detected");
    }
}
