//! Detector plugin contract and the signature-driven implementation used by every built-in tag.

use std::sync::LazyLock;

use regex::Regex;

use crate::error_handling::PluginError;
use crate::models::{DetectionMethod, DomSnapshot, Evidence, LoadingMethod, NetworkRequest, ScriptRef};
use crate::registry::pattern::TagPattern;

/// Longest matched value kept in an evidence item.
const MAX_EVIDENCE_VALUE_LEN: usize = 200;

/// Capability set every tag type implements.
///
/// Plugins are registered by name in the registry and receive their own pattern
/// bundle on every call. They must not share state across calls.
pub trait DetectorPlugin: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    /// Inspects fetched markup and the scripts extracted from it.
    fn detect_static(
        &self,
        html: &str,
        scripts: &[ScriptRef],
        pattern: &TagPattern,
    ) -> Result<Evidence, PluginError>;

    /// Inspects activity captured by the browser.
    fn detect_dynamic(
        &self,
        requests: &[NetworkRequest],
        console_logs: &[String],
        dom: &DomSnapshot,
        pattern: &TagPattern,
    ) -> Result<Evidence, PluginError>;
}

pub(crate) fn compile_regex_unsafe(pattern: &str, context: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| {
        panic!(
            "Failed to compile regex pattern '{}' in {}: {}. This is a programming error.",
            pattern, context, e
        )
    })
}

static NOSCRIPT_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    compile_regex_unsafe(r"(?is)<noscript\b[^>]*>.*?</noscript\s*>", "NOSCRIPT_BLOCK")
});

/// Markup with `<noscript>` blocks removed, so fallback-only IDs stay noscript evidence.
pub(crate) fn strip_noscript(html: &str) -> std::borrow::Cow<'_, str> {
    NOSCRIPT_BLOCK.replace_all(html, " ")
}

fn clip(value: &str) -> String {
    let value = value.trim();
    if value.len() <= MAX_EVIDENCE_VALUE_LEN {
        return value.to_string();
    }
    let mut cut = MAX_EVIDENCE_VALUE_LEN;
    while !value.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…", &value[..cut])
}

/// Plugin driven entirely by its pattern bundle.
///
/// All built-in tags use this; they differ only in name and signatures.
#[derive(Debug, Clone)]
pub struct SignaturePlugin {
    name: String,
    version: String,
}

impl SignaturePlugin {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl DetectorPlugin for SignaturePlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn detect_static(
        &self,
        html: &str,
        scripts: &[ScriptRef],
        pattern: &TagPattern,
    ) -> Result<Evidence, PluginError> {
        let weights = &pattern.weights;
        let mut evidence = Evidence::builder();
        let markup = strip_noscript(html);

        if let Some(regex) = &pattern.container_id {
            for caps in regex.captures_iter(&markup) {
                let id = pattern.identifier(&caps);
                let value = id.clone().unwrap_or_default();
                evidence.hit_with_id(DetectionMethod::ContainerId, value, weights.container_id, id);
            }
        }

        if let Some(regex) = &pattern.script_url {
            for src in scripts.iter().filter_map(|s| s.src.as_deref()) {
                if let Some(caps) = regex.captures(src) {
                    // A bare URL match carries no identifier.
                    let id = if caps.len() > 1 {
                        pattern.identifier(&caps)
                    } else {
                        None
                    };
                    evidence
                        .hit_with_id(DetectionMethod::ScriptUrl, clip(src), weights.script_url, id)
                        .loading(LoadingMethod::DirectScript);
                }
            }
        }

        let inline: String = scripts
            .iter()
            .filter(|s| !s.content.is_empty())
            .map(|s| s.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        for regex in &pattern.inline_calls {
            if let Some(found) = regex.find(&inline) {
                evidence.hit(DetectionMethod::InlineCall, clip(found.as_str()), weights.inline_call);
            }
        }

        if let Some(regex) = &pattern.async_loader {
            if let Some(found) = regex.find(&markup) {
                evidence
                    .hit(DetectionMethod::InlineCall, clip(found.as_str()), weights.inline_call)
                    .loading(LoadingMethod::AsyncFunction);
            }
        }

        if let Some(regex) = &pattern.dynamic_insertion {
            if regex.is_match(&inline) {
                evidence
                    .hit(
                        DetectionMethod::DynamicInsertion,
                        format!("createElement('script') loading {}", pattern.tag),
                        weights.dynamic_insertion,
                    )
                    .loading(LoadingMethod::DynamicInsertion);
            }
        }

        if let Some(regex) = &pattern.noscript {
            for caps in regex.captures_iter(html) {
                let id = if caps.len() > 1 {
                    pattern.identifier(&caps)
                } else {
                    None
                };
                let value = id.clone().unwrap_or_else(|| "noscript fallback".to_string());
                evidence.hit_with_id(DetectionMethod::Noscript, value, weights.noscript, id);
            }
        }

        Ok(evidence.build())
    }

    fn detect_dynamic(
        &self,
        requests: &[NetworkRequest],
        console_logs: &[String],
        dom: &DomSnapshot,
        pattern: &TagPattern,
    ) -> Result<Evidence, PluginError> {
        let weights = &pattern.weights;
        let mut evidence = Evidence::builder();

        if !pattern.request_hosts.is_empty() {
            for request in requests {
                let lower = request.url.to_lowercase();
                if pattern.request_hosts.iter().any(|host| lower.contains(host)) {
                    let id = pattern
                        .request_id
                        .as_ref()
                        .and_then(|regex| regex.captures(&request.url))
                        .and_then(|caps| pattern.identifier(&caps));
                    evidence
                        .hit_with_id(
                            DetectionMethod::NetworkRequest,
                            clip(&request.url),
                            weights.network_request,
                            id,
                        )
                        .loading(LoadingMethod::JavascriptExecution);
                }
            }
        }

        for global in &pattern.globals {
            if dom.has_global(global) {
                evidence.hit(DetectionMethod::GlobalObject, global.clone(), weights.global_object);
            }
        }

        if !pattern.console_keywords.is_empty() {
            for line in console_logs {
                let lower = line.to_lowercase();
                if pattern.console_keywords.iter().any(|k| lower.contains(k)) {
                    evidence.hit(DetectionMethod::ConsoleMessage, clip(line), weights.console_message);
                }
            }
        }

        if !pattern.dom_markers.is_empty() {
            let rendered = strip_noscript(&dom.html);
            for regex in &pattern.dom_markers {
                if let Some(caps) = regex.captures(&rendered) {
                    let id = pattern.identifier(&caps);
                    let value = id.clone().unwrap_or_default();
                    evidence.hit_with_id(DetectionMethod::RenderedDom, value, weights.rendered_dom, id);
                }
            }
        }

        Ok(evidence.build())
    }
}
