//! Per-tag signature bundles.

use regex::Regex;

use crate::config::MethodWeights;
use crate::error_handling::ConfigurationError;

/// Static and dynamic signatures of one tag type.
///
/// Compiled once when the registry is built and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct TagPattern {
    pub(crate) tag: String,
    // Static signatures
    pub(crate) container_id: Option<Regex>,
    pub(crate) script_url: Option<Regex>,
    pub(crate) inline_calls: Vec<Regex>,
    pub(crate) dynamic_insertion: Option<Regex>,
    pub(crate) async_loader: Option<Regex>,
    pub(crate) noscript: Option<Regex>,
    // Dynamic signatures
    pub(crate) request_hosts: Vec<String>,
    pub(crate) request_id: Option<Regex>,
    pub(crate) globals: Vec<String>,
    pub(crate) console_keywords: Vec<String>,
    pub(crate) dom_markers: Vec<Regex>,
    pub(crate) uppercase_ids: bool,
    pub(crate) weights: MethodWeights,
    /// Weights were set on the builder rather than left to the registry.
    pub(crate) explicit_weights: bool,
}

impl TagPattern {
    pub fn builder(tag: impl Into<String>) -> TagPatternBuilder {
        TagPatternBuilder {
            tag: tag.into(),
            container_id: None,
            script_url: None,
            inline_calls: Vec::new(),
            dynamic_insertion: None,
            async_loader: None,
            noscript: None,
            request_hosts: Vec::new(),
            request_id: None,
            globals: Vec::new(),
            console_keywords: Vec::new(),
            dom_markers: Vec::new(),
            uppercase_ids: false,
            weights: None,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Global objects the browser should look up for this tag.
    pub fn globals(&self) -> &[String] {
        &self.globals
    }

    pub fn weights(&self) -> &MethodWeights {
        &self.weights
    }

    /// Extracts an identifier from a regex match.
    ///
    /// Without capture groups the whole match is the identifier. With groups, the
    /// participating ones are joined with `/`, and none participating means no identifier.
    pub(crate) fn identifier(&self, captures: &regex::Captures<'_>) -> Option<String> {
        let raw = if captures.len() == 1 {
            captures.get(0)?.as_str().to_string()
        } else {
            let groups: Vec<&str> = captures
                .iter()
                .skip(1)
                .flatten()
                .map(|m| m.as_str())
                .filter(|s| !s.is_empty())
                .collect();
            if groups.is_empty() {
                return None;
            }
            groups.join("/")
        };
        Some(if self.uppercase_ids {
            raw.to_uppercase()
        } else {
            raw
        })
    }
}

/// Builder for [`TagPattern`]. Regexes are compiled in [`TagPatternBuilder::build`].
#[derive(Debug, Clone)]
pub struct TagPatternBuilder {
    tag: String,
    container_id: Option<String>,
    script_url: Option<String>,
    inline_calls: Vec<String>,
    dynamic_insertion: Option<String>,
    async_loader: Option<String>,
    noscript: Option<String>,
    request_hosts: Vec<String>,
    request_id: Option<String>,
    globals: Vec<String>,
    console_keywords: Vec<String>,
    dom_markers: Vec<String>,
    uppercase_ids: bool,
    weights: Option<MethodWeights>,
}

impl TagPatternBuilder {
    pub fn container_id(mut self, regex: &str) -> Self {
        self.container_id = Some(regex.to_string());
        self
    }

    pub fn script_url(mut self, regex: &str) -> Self {
        self.script_url = Some(regex.to_string());
        self
    }

    pub fn inline_call(mut self, regex: &str) -> Self {
        self.inline_calls.push(regex.to_string());
        self
    }

    pub fn dynamic_insertion(mut self, regex: &str) -> Self {
        self.dynamic_insertion = Some(regex.to_string());
        self
    }

    /// Self-invoking function that pulls the vendor loader, matched against the markup.
    pub fn async_loader(mut self, regex: &str) -> Self {
        self.async_loader = Some(regex.to_string());
        self
    }

    pub fn noscript(mut self, regex: &str) -> Self {
        self.noscript = Some(regex.to_string());
        self
    }

    /// Substrings of request URLs that belong to the tag (matched case-insensitively).
    pub fn request_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.request_hosts
            .extend(hosts.into_iter().map(|h| h.into().to_lowercase()));
        self
    }

    pub fn request_id(mut self, regex: &str) -> Self {
        self.request_id = Some(regex.to_string());
        self
    }

    pub fn globals<I, S>(mut self, globals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.globals.extend(globals.into_iter().map(Into::into));
        self
    }

    pub fn console_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.console_keywords
            .extend(keywords.into_iter().map(|k| k.into().to_lowercase()));
        self
    }

    pub fn dom_marker(mut self, regex: &str) -> Self {
        self.dom_markers.push(regex.to_string());
        self
    }

    pub fn uppercase_ids(mut self) -> Self {
        self.uppercase_ids = true;
        self
    }

    /// Pins the method weights. Without this the registry's weights apply.
    pub fn weights(mut self, weights: MethodWeights) -> Self {
        self.weights = Some(weights);
        self
    }

    pub fn build(self) -> Result<TagPattern, ConfigurationError> {
        let tag = self.tag;
        let compile = |pattern: &str| -> Result<Regex, ConfigurationError> {
            Regex::new(pattern).map_err(|e| ConfigurationError::InvalidPattern {
                tag: tag.clone(),
                message: e.to_string(),
            })
        };
        let compile_opt = |pattern: Option<String>| pattern.as_deref().map(compile).transpose();

        let container_id = compile_opt(self.container_id)?;
        let script_url = compile_opt(self.script_url)?;
        let dynamic_insertion = compile_opt(self.dynamic_insertion)?;
        let async_loader = compile_opt(self.async_loader)?;
        let noscript = compile_opt(self.noscript)?;
        let request_id = compile_opt(self.request_id)?;
        let inline_calls = self
            .inline_calls
            .iter()
            .map(|p| compile(p))
            .collect::<Result<Vec<_>, _>>()?;
        let dom_markers = self
            .dom_markers
            .iter()
            .map(|p| compile(p))
            .collect::<Result<Vec<_>, _>>()?;

        let has_static = container_id.is_some()
            || script_url.is_some()
            || !inline_calls.is_empty()
            || dynamic_insertion.is_some()
            || async_loader.is_some()
            || noscript.is_some();
        let has_dynamic = !self.request_hosts.is_empty()
            || !self.globals.is_empty()
            || !self.console_keywords.is_empty()
            || !dom_markers.is_empty();
        if !has_static && !has_dynamic {
            return Err(ConfigurationError::InvalidPattern {
                tag,
                message: "pattern bundle has no signatures".to_string(),
            });
        }

        Ok(TagPattern {
            tag,
            container_id,
            script_url,
            inline_calls,
            dynamic_insertion,
            async_loader,
            noscript,
            request_hosts: self.request_hosts,
            request_id,
            globals: self.globals,
            console_keywords: self.console_keywords,
            dom_markers,
            uppercase_ids: self.uppercase_ids,
            explicit_weights: self.weights.is_some(),
            weights: self.weights.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_regex_is_configuration_error() {
        let err = TagPattern::builder("broken")
            .container_id("([unclosed")
            .build()
            .unwrap_err();
        match err {
            ConfigurationError::InvalidPattern { tag, .. } => assert_eq!(tag, "broken"),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_empty_bundle_rejected() {
        assert!(TagPattern::builder("nothing").build().is_err());
    }

    #[test]
    fn test_identifier_prefers_groups() {
        let pattern = TagPattern::builder("t")
            .script_url(r"utag/([^/]+)/([^/]+)/([^/]+)/utag\.js")
            .build()
            .unwrap();
        let regex = pattern.script_url.as_ref().unwrap();
        let caps = regex
            .captures("https://tags.tiqcdn.com/utag/acme/main/prod/utag.js")
            .unwrap();
        assert_eq!(pattern.identifier(&caps).as_deref(), Some("acme/main/prod"));
    }

    #[test]
    fn test_identifier_uppercased_when_requested() {
        let pattern = TagPattern::builder("gtm")
            .container_id(r"(?i)\bGTM-[A-Z0-9]{4,}\b")
            .uppercase_ids()
            .build()
            .unwrap();
        let caps = pattern
            .container_id
            .as_ref()
            .unwrap()
            .captures("id=gtm-ab12cd")
            .unwrap();
        assert_eq!(pattern.identifier(&caps).as_deref(), Some("GTM-AB12CD"));
    }
}
