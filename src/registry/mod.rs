//! Pattern and plugin registry.
//!
//! The registry pairs every [`DetectorPlugin`] with the [`TagPattern`] bundle
//! registered under the same key. It is assembled through [`RegistryBuilder`]
//! at start-up and frozen into an immutable [`Registry`] before the first URL
//! is processed; workers share it through an `Arc` without locking.

mod builtin;
mod pattern;
mod plugin;

use std::collections::HashMap;
use std::sync::Arc;

pub use builtin::{builtin_tags, BuiltinTag, BUILTIN_VERSION};
pub use pattern::{TagPattern, TagPatternBuilder};
pub use plugin::{DetectorPlugin, SignaturePlugin};
pub(crate) use plugin::compile_regex_unsafe;

use crate::config::MethodWeights;
use crate::error_handling::ConfigurationError;

/// A plugin together with its pattern bundle.
#[derive(Clone)]
pub struct RegisteredTag {
    key: String,
    plugin: Arc<dyn DetectorPlugin>,
    pattern: Arc<TagPattern>,
}

impl RegisteredTag {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn plugin(&self) -> &dyn DetectorPlugin {
        self.plugin.as_ref()
    }

    pub fn pattern(&self) -> &TagPattern {
        &self.pattern
    }
}

impl std::fmt::Debug for RegisteredTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredTag")
            .field("key", &self.key)
            .field("plugin", &self.plugin.name())
            .field("version", &self.plugin.version())
            .finish()
    }
}

/// Frozen set of registered tags, in registration order.
#[derive(Debug)]
pub struct Registry {
    tags: Vec<RegisteredTag>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Registry with the built-in catalogue only.
    pub fn builtin(weights: &MethodWeights) -> Result<Registry, ConfigurationError> {
        RegistryBuilder::with_builtin(weights)?.build()
    }

    pub fn tags(&self) -> &[RegisteredTag] {
        &self.tags
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&RegisteredTag> {
        self.tags.iter().find(|t| t.key == key)
    }

    /// Pattern bundle for a tag.
    pub fn pattern(&self, key: &str) -> Result<&TagPattern, ConfigurationError> {
        self.get(key)
            .map(RegisteredTag::pattern)
            .ok_or_else(|| ConfigurationError::MissingPattern(key.to_string()))
    }

    /// Every global object some pattern asks the browser to check, deduplicated.
    pub fn watched_globals(&self) -> Vec<String> {
        let mut watched: Vec<String> = Vec::new();
        for tag in &self.tags {
            for global in tag.pattern.globals() {
                if !watched.contains(global) {
                    watched.push(global.clone());
                }
            }
        }
        watched
    }
}

/// Mutable registration phase of a [`Registry`].
///
/// Pattern bundles added without their own weights take the builder's weights.
#[derive(Default)]
pub struct RegistryBuilder {
    plugins: Vec<(String, Arc<dyn DetectorPlugin>)>,
    patterns: HashMap<String, TagPattern>,
    weights: MethodWeights,
}

impl RegistryBuilder {
    /// Empty builder whose unweighted patterns use `weights`.
    pub fn with_weights(weights: &MethodWeights) -> Self {
        Self {
            weights: weights.clone(),
            ..Self::default()
        }
    }

    /// Builder pre-populated with the eight built-in tags.
    pub fn with_builtin(weights: &MethodWeights) -> Result<Self, ConfigurationError> {
        let mut builder = Self::with_weights(weights);
        for tag in builtin_tags(weights)? {
            builder.register(tag.key, tag.plugin)?;
            builder.add_pattern(tag.key, tag.pattern)?;
        }
        Ok(builder)
    }

    /// Registers a plugin under a unique name.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        plugin: Arc<dyn DetectorPlugin>,
    ) -> Result<&mut Self, ConfigurationError> {
        let name = name.into();
        if self.plugins.iter().any(|(existing, _)| *existing == name) {
            return Err(ConfigurationError::DuplicatePlugin(name));
        }
        self.plugins.push((name, plugin));
        Ok(self)
    }

    /// Adds the pattern bundle for a plugin name.
    pub fn add_pattern(
        &mut self,
        name: impl Into<String>,
        mut pattern: TagPattern,
    ) -> Result<&mut Self, ConfigurationError> {
        let name = name.into();
        if self.patterns.contains_key(&name) {
            return Err(ConfigurationError::DuplicatePattern(name));
        }
        if !pattern.explicit_weights {
            pattern.weights = self.weights.clone();
        }
        self.patterns.insert(name, pattern);
        Ok(self)
    }

    /// Freezes the registry. Every plugin needs a pattern bundle under its name.
    pub fn build(mut self) -> Result<Registry, ConfigurationError> {
        if self.plugins.is_empty() {
            return Err(ConfigurationError::EmptyRegistry);
        }

        let mut tags = Vec::with_capacity(self.plugins.len());
        for (key, plugin) in self.plugins {
            let pattern = self
                .patterns
                .remove(&key)
                .ok_or_else(|| ConfigurationError::MissingPattern(key.clone()))?;
            tags.push(RegisteredTag {
                key,
                plugin,
                pattern: Arc::new(pattern),
            });
        }

        for orphan in self.patterns.keys() {
            log::warn!("Pattern bundle '{}' has no registered plugin; ignoring it", orphan);
        }

        Ok(Registry { tags })
    }
}
