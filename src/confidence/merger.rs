//! Fuses static and dynamic evidence into one verdict per tag.

use std::collections::BTreeMap;

use crate::analysis::TagEvidence;
use crate::config::Calibration;
use crate::error_handling::WarningType;
use crate::models::{Category, DetectionMethod, Evidence, EvidenceItem, LoadingMethod, TagVerdict};

/// What the dynamic pass produced for one tag.
#[derive(Debug, Clone, Copy)]
pub enum DynamicEvidence<'a> {
    /// Dynamic analysis was disabled for the run.
    NotRun,
    /// The browser session failed; verdicts are static-only and flagged degraded.
    Failed,
    Observed(&'a TagEvidence),
    /// Samples taken before the pass was cut short. Scored, but flagged degraded.
    Partial(&'a TagEvidence),
}

/// Score of one evidence combination, before labeling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score {
    pub confidence: f64,
    pub corroborated: bool,
    pub dynamic_only: bool,
}

/// A verdict plus the warning categories behind its warnings.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedTag {
    pub verdict: TagVerdict,
    pub warning_types: Vec<WarningType>,
    pub corroborated: bool,
}

#[derive(Debug, Clone)]
pub struct Merger {
    calibration: Calibration,
}

fn strongest_per_method<'a>(items: impl Iterator<Item = &'a EvidenceItem>) -> BTreeMap<DetectionMethod, f64> {
    let mut strongest = BTreeMap::new();
    for item in items {
        let weight = item.weight.clamp(0.0, 1.0);
        strongest
            .entry(item.method)
            .and_modify(|w: &mut f64| *w = w.max(weight))
            .or_insert(weight);
    }
    strongest
}

impl Merger {
    pub fn new(calibration: Calibration) -> Self {
        Self { calibration }
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    /// Probabilistic-OR over the distinct methods of both sources.
    ///
    /// Each method counts once, at its strongest hit. Cross-source corroboration
    /// (an independent static method and an independent dynamic method) is boosted;
    /// dynamic-only evidence is capped below the confirmed threshold. Pure function
    /// of its inputs and the calibration.
    pub fn score(&self, static_evidence: &Evidence, dynamic_evidence: Option<&Evidence>) -> Score {
        let dynamic_items = dynamic_evidence.map(Evidence::items).unwrap_or_default();
        let methods = strongest_per_method(static_evidence.items().iter().chain(dynamic_items));
        if methods.is_empty() {
            return Score {
                confidence: 0.0,
                corroborated: false,
                dynamic_only: false,
            };
        }

        let raw = 1.0 - methods.values().map(|w| 1.0 - w).product::<f64>();
        let corroborated = methods.keys().any(DetectionMethod::is_independent_static)
            && methods.keys().any(DetectionMethod::is_independent_dynamic);
        let dynamic_only = !methods.keys().any(DetectionMethod::is_static);

        let mut confidence = if corroborated {
            1.0 - (1.0 - raw) * (1.0 - self.calibration.corroboration_boost)
        } else {
            raw
        };
        if dynamic_only {
            confidence = confidence.min(self.calibration.dynamic_only_cap);
        }
        Score {
            confidence: confidence.min(self.calibration.max_confidence),
            corroborated,
            dynamic_only,
        }
    }

    pub fn category(&self, confidence: f64) -> Category {
        let thresholds = &self.calibration.thresholds;
        if confidence >= thresholds.confirmed {
            Category::Confirmed
        } else if confidence >= thresholds.likely {
            Category::Likely
        } else if confidence > 0.0 {
            Category::Possible
        } else {
            Category::NotDetected
        }
    }

    /// Builds the verdict for one tag on one URL.
    pub fn merge(
        &self,
        tag: &str,
        name: &str,
        static_evidence: &TagEvidence,
        dynamic: DynamicEvidence<'_>,
    ) -> MergedTag {
        let observed = match dynamic {
            DynamicEvidence::Observed(tag_evidence) | DynamicEvidence::Partial(tag_evidence) => {
                Some(tag_evidence)
            }
            DynamicEvidence::NotRun | DynamicEvidence::Failed => None,
        };
        let completed = matches!(dynamic, DynamicEvidence::Observed(_));
        let score = self.score(&static_evidence.evidence, observed.map(|t| &t.evidence));
        let category = self.category(score.confidence);
        let detected = score.confidence > 0.0;

        let items: Vec<&EvidenceItem> = static_evidence
            .evidence
            .items()
            .iter()
            .chain(observed.map(|t| t.evidence.items()).unwrap_or_default())
            .collect();

        let mut warnings = Vec::new();
        let mut warning_types = Vec::new();
        let mut warn = |kind: WarningType, message: String| {
            warning_types.push(kind);
            warnings.push(message);
        };

        for fault in [&static_evidence.fault, &observed.and_then(|t| t.fault.clone())]
            .into_iter()
            .flatten()
        {
            warn(WarningType::PluginFault, fault.to_string());
        }

        if score.dynamic_only {
            warn(
                WarningType::DynamicOnlyDetection,
                "Seen only at runtime; the tag may be consent-gated or lazy-loaded".to_string(),
            );
        }

        let noscript_only = !items.is_empty()
            && items
                .iter()
                .filter(|item| item.method.is_static())
                .all(|item| item.method == DetectionMethod::Noscript)
            && !items.iter().any(|item| item.method.is_independent_dynamic());
        if noscript_only && static_evidence.evidence.has_method(DetectionMethod::Noscript) && completed {
            warn(
                WarningType::PossiblyInactive,
                "Only a noscript fallback was found and no runtime activity confirmed it; the tag is possibly inactive"
                    .to_string(),
            );
        }

        let degraded = match dynamic {
            DynamicEvidence::Failed => {
                if detected {
                    warn(
                        WarningType::DynamicDegraded,
                        "Dynamic analysis failed; verdict is based on static evidence only".to_string(),
                    );
                }
                true
            }
            DynamicEvidence::Partial(_) => {
                if detected {
                    warn(
                        WarningType::DynamicDegraded,
                        "Dynamic analysis was cut short; verdict uses the runtime activity seen so far"
                            .to_string(),
                    );
                }
                true
            }
            DynamicEvidence::NotRun | DynamicEvidence::Observed(_) => false,
        };

        // How the page loads the tag says more than the bare fact that it ran.
        let static_loading = static_evidence.evidence.loading();
        let loading_method = if static_loading.is_known() {
            static_loading
        } else {
            observed.map_or(LoadingMethod::Unknown, |t| t.evidence.loading())
        };

        let mut methods: BTreeMap<DetectionMethod, bool> = BTreeMap::new();
        for item in &items {
            methods
                .entry(item.method)
                .and_modify(|only_progressive| *only_progressive &= item.progressive)
                .or_insert(item.progressive);
        }
        let method_labels = methods
            .iter()
            .map(|(method, only_progressive)| {
                if *only_progressive {
                    format!("{} (progressive)", method)
                } else {
                    method.to_string()
                }
            })
            .collect();

        let mut identifiers: Vec<String> = items.iter().filter_map(|item| item.identifier.clone()).collect();
        identifiers.sort();
        identifiers.dedup();

        MergedTag {
            verdict: TagVerdict {
                tag: tag.to_string(),
                name: name.to_string(),
                detected,
                confidence: score.confidence,
                category,
                identifiers,
                methods: method_labels,
                warnings,
                loading_method,
                progressive: items.iter().any(|item| item.progressive),
                degraded,
            },
            warning_types,
            corroborated: score.corroborated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_handling::PluginError;
    use strum::IntoEnumIterator;

    fn merger() -> Merger {
        Merger::new(Calibration::default())
    }

    fn evidence(hits: &[(DetectionMethod, &str)]) -> Evidence {
        let weights = Calibration::default().weights;
        let mut builder = Evidence::builder();
        for (method, value) in hits {
            builder.hit(*method, *value, weights.weight(*method));
        }
        builder.build()
    }

    fn tag_evidence(hits: &[(DetectionMethod, &str)]) -> TagEvidence {
        TagEvidence {
            evidence: evidence(hits),
            fault: None,
        }
    }

    #[test]
    fn test_container_id_plus_network_request_is_confirmed() {
        let static_ev = TagEvidence {
            evidence: {
                let mut builder = Evidence::builder();
                builder.hit_with_id(DetectionMethod::ContainerId, "GTM-ABC1234", 0.6, Some("GTM-ABC1234".into()));
                builder.build()
            },
            fault: None,
        };
        let dynamic_ev = tag_evidence(&[(
            DetectionMethod::NetworkRequest,
            "https://www.googletagmanager.com/gtm.js?id=GTM-ABC1234",
        )]);

        let merged = merger().merge("gtm", "Google Tag Manager", &static_ev, DynamicEvidence::Observed(&dynamic_ev));

        let verdict = merged.verdict;
        assert_eq!(verdict.category, Category::Confirmed);
        assert!(verdict.confidence >= 0.8);
        assert!(verdict.methods.contains(&"Container ID Detection".to_string()));
        assert!(verdict.methods.contains(&"Network Request".to_string()));
        assert_eq!(verdict.identifiers, vec!["GTM-ABC1234".to_string()]);
        assert!(merged.corroborated);
        assert!(verdict.warnings.is_empty());
    }

    #[test]
    fn test_noscript_only_with_quiet_runtime_is_possibly_inactive() {
        let static_ev = tag_evidence(&[(DetectionMethod::Noscript, "GTM-ABC1234")]);
        let dynamic_ev = TagEvidence::default();

        let merged = merger().merge("gtm", "Google Tag Manager", &static_ev, DynamicEvidence::Observed(&dynamic_ev));

        assert!(matches!(merged.verdict.category, Category::Possible | Category::Likely));
        assert!(merged.verdict.confidence < 0.8);
        assert_eq!(merged.warning_types, vec![WarningType::PossiblyInactive]);
        assert!(merged.verdict.warnings[0].contains("possibly inactive"));
    }

    #[test]
    fn test_noscript_without_dynamic_pass_has_no_runtime_warning() {
        let static_ev = tag_evidence(&[(DetectionMethod::Noscript, "GTM-ABC1234")]);
        let merged = merger().merge("gtm", "Google Tag Manager", &static_ev, DynamicEvidence::NotRun);
        assert!(merged.verdict.warnings.is_empty());
        assert!(!merged.verdict.degraded);
    }

    #[test]
    fn test_dynamic_only_is_capped_below_confirmed() {
        let dynamic_ev = tag_evidence(&[
            (DetectionMethod::NetworkRequest, "https://analytics.tiktok.com/i18n/pixel/events.js"),
            (DetectionMethod::GlobalObject, "ttq"),
            (DetectionMethod::RenderedDom, "ttq.load('C1')"),
            (DetectionMethod::ConsoleMessage, "tiktok"),
        ]);
        let merged = merger().merge(
            "tiktok_pixel",
            "TikTok Pixel",
            &TagEvidence::default(),
            DynamicEvidence::Observed(&dynamic_ev),
        );

        assert!(merged.verdict.confidence < 0.8);
        assert_eq!(merged.verdict.category, Category::Likely);
        assert_eq!(merged.warning_types, vec![WarningType::DynamicOnlyDetection]);
    }

    #[test]
    fn test_failed_dynamic_pass_degrades() {
        let static_ev = tag_evidence(&[(DetectionMethod::ScriptUrl, "https://connect.facebook.net/en_US/fbevents.js")]);
        let merged = merger().merge("meta_pixel", "Meta Pixel", &static_ev, DynamicEvidence::Failed);
        assert!(merged.verdict.degraded);
        assert_eq!(merged.warning_types, vec![WarningType::DynamicDegraded]);
        assert!((merged.verdict.confidence - 0.55).abs() < 1e-9);
    }

    #[test]
    fn test_partial_dynamic_pass_scores_but_degrades() {
        let dynamic_ev = tag_evidence(&[(
            DetectionMethod::NetworkRequest,
            "https://analytics.tiktok.com/i18n/pixel/events.js",
        )]);
        let merged = merger().merge(
            "tiktok_pixel",
            "TikTok Pixel",
            &TagEvidence::default(),
            DynamicEvidence::Partial(&dynamic_ev),
        );
        assert!(merged.verdict.detected);
        assert!((merged.verdict.confidence - 0.6).abs() < 1e-9);
        assert!(merged.verdict.degraded);
        assert_eq!(
            merged.warning_types,
            vec![WarningType::DynamicOnlyDetection, WarningType::DynamicDegraded]
        );
    }

    #[test]
    fn test_noscript_with_partial_pass_is_not_called_inactive() {
        let static_ev = tag_evidence(&[(DetectionMethod::Noscript, "GTM-ABC1234")]);
        let quiet = TagEvidence::default();
        let merged = merger().merge("gtm", "Google Tag Manager", &static_ev, DynamicEvidence::Partial(&quiet));
        assert!(!merged.warning_types.contains(&WarningType::PossiblyInactive));
        assert!(merged.verdict.degraded);
    }

    #[test]
    fn test_static_loading_method_wins_over_runtime() {
        let mut direct = Evidence::builder();
        direct
            .hit(DetectionMethod::ScriptUrl, "https://connect.facebook.net/en_US/fbevents.js", 0.55)
            .loading(LoadingMethod::DirectScript);
        let static_ev = TagEvidence {
            evidence: direct.build(),
            fault: None,
        };
        let mut ran = Evidence::builder();
        ran.hit(DetectionMethod::NetworkRequest, "https://www.facebook.com/tr?id=1", 0.6)
            .loading(LoadingMethod::JavascriptExecution);
        let dynamic_ev = TagEvidence {
            evidence: ran.build(),
            fault: None,
        };

        let both = merger().merge("meta_pixel", "Meta Pixel", &static_ev, DynamicEvidence::Observed(&dynamic_ev));
        assert_eq!(both.verdict.loading_method, LoadingMethod::DirectScript);

        let runtime_only = merger().merge(
            "meta_pixel",
            "Meta Pixel",
            &TagEvidence::default(),
            DynamicEvidence::Observed(&dynamic_ev),
        );
        assert_eq!(runtime_only.verdict.loading_method, LoadingMethod::JavascriptExecution);

        let nothing = merger().merge("meta_pixel", "Meta Pixel", &TagEvidence::default(), DynamicEvidence::NotRun);
        assert_eq!(nothing.verdict.loading_method, LoadingMethod::Unknown);
    }

    #[test]
    fn test_no_evidence_is_not_detected() {
        let merged = merger().merge("snap_pixel", "Snap Pixel", &TagEvidence::default(), DynamicEvidence::NotRun);
        assert!(!merged.verdict.detected);
        assert_eq!(merged.verdict.confidence, 0.0);
        assert_eq!(merged.verdict.category, Category::NotDetected);
        assert!(merged.verdict.methods.is_empty());
    }

    #[test]
    fn test_repeated_method_counts_once() {
        let one = evidence(&[(DetectionMethod::InlineCall, "fbq('init', '1')")]);
        let two = evidence(&[
            (DetectionMethod::InlineCall, "fbq('init', '1')"),
            (DetectionMethod::InlineCall, "fbq('track', 'PageView')"),
        ]);
        assert_eq!(merger().score(&one, None), merger().score(&two, None));
    }

    #[test]
    fn test_score_is_deterministic() {
        let static_ev = evidence(&[
            (DetectionMethod::ContainerId, "G-ABCDEFGHIJ"),
            (DetectionMethod::InlineCall, "gtag('config', 'G-ABCDEFGHIJ')"),
        ]);
        let dynamic_ev = evidence(&[(DetectionMethod::GlobalObject, "gtag")]);
        let first = merger().score(&static_ev, Some(&dynamic_ev));
        for _ in 0..10 {
            assert_eq!(merger().score(&static_ev, Some(&dynamic_ev)), first);
        }
    }

    #[test]
    fn test_adding_any_method_never_lowers_confidence() {
        let merger = merger();
        let all: Vec<DetectionMethod> = DetectionMethod::iter().collect();
        // Every subset of methods, split into static and dynamic evidence.
        for mask in 0u32..(1 << all.len()) {
            let chosen: Vec<DetectionMethod> = all
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, m)| *m)
                .collect();
            let split = |methods: &[DetectionMethod]| {
                let statics: Vec<(DetectionMethod, &str)> =
                    methods.iter().filter(|m| m.is_static()).map(|m| (*m, "x")).collect();
                let dynamics: Vec<(DetectionMethod, &str)> =
                    methods.iter().filter(|m| !m.is_static()).map(|m| (*m, "x")).collect();
                (evidence(&statics), evidence(&dynamics))
            };
            let (base_static, base_dynamic) = split(&chosen);
            let base = merger.score(&base_static, Some(&base_dynamic)).confidence;

            for extra in all.iter().filter(|m| !chosen.contains(m)) {
                let mut extended = chosen.clone();
                extended.push(*extra);
                let (s, d) = split(&extended);
                let more = merger.score(&s, Some(&d)).confidence;
                assert!(more >= base, "adding {:?} to {:?} lowered {} to {}", extra, chosen, base, more);
            }
        }
    }

    #[test]
    fn test_progressive_method_is_labeled_without_changing_score() {
        let initial = Evidence::empty();
        let later = evidence(&[(DetectionMethod::NetworkRequest, "https://www.facebook.com/tr?id=1")]);
        let progressive = TagEvidence {
            evidence: Evidence::with_progressive(&initial, &later),
            fault: None,
        };
        let immediate = TagEvidence {
            evidence: later.clone(),
            fault: None,
        };
        let static_ev = tag_evidence(&[(DetectionMethod::ScriptUrl, "fbevents.js")]);

        let late = merger().merge("meta_pixel", "Meta Pixel", &static_ev, DynamicEvidence::Observed(&progressive));
        let early = merger().merge("meta_pixel", "Meta Pixel", &static_ev, DynamicEvidence::Observed(&immediate));

        assert_eq!(late.verdict.confidence, early.verdict.confidence);
        assert!(late.verdict.progressive);
        assert!(late.verdict.methods.contains(&"Network Request (progressive)".to_string()));
        assert!(early.verdict.methods.contains(&"Network Request".to_string()));
    }

    #[test]
    fn test_plugin_fault_becomes_warning() {
        let static_ev = TagEvidence {
            evidence: Evidence::empty(),
            fault: Some(PluginError::Panicked {
                plugin: "Custom".into(),
                message: "boom".into(),
            }),
        };
        let merged = merger().merge("custom", "Custom", &static_ev, DynamicEvidence::NotRun);
        assert_eq!(merged.warning_types, vec![WarningType::PluginFault]);
        assert!(!merged.verdict.detected);
    }
}
