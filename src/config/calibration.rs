//! Calibration constants for confidence scoring and adaptive timeouts.
//!
//! Every value here is tunable. The merger and the fetcher only ever read
//! these structs, so a run can be re-calibrated without touching their code.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error_handling::ConfigurationError;
use crate::models::DetectionMethod;

/// Base weight of every detection method, each in (0, 1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodWeights {
    pub container_id: f64,
    pub script_url: f64,
    pub inline_call: f64,
    pub dynamic_insertion: f64,
    pub noscript: f64,
    pub network_request: f64,
    pub global_object: f64,
    pub rendered_dom: f64,
    pub console_message: f64,
}

impl Default for MethodWeights {
    fn default() -> Self {
        Self {
            container_id: 0.60,
            script_url: 0.55,
            inline_call: 0.35,
            dynamic_insertion: 0.40,
            noscript: 0.20,
            network_request: 0.60,
            global_object: 0.45,
            rendered_dom: 0.30,
            console_message: 0.10,
        }
    }
}

impl MethodWeights {
    pub fn weight(&self, method: DetectionMethod) -> f64 {
        match method {
            DetectionMethod::ContainerId => self.container_id,
            DetectionMethod::ScriptUrl => self.script_url,
            DetectionMethod::InlineCall => self.inline_call,
            DetectionMethod::DynamicInsertion => self.dynamic_insertion,
            DetectionMethod::Noscript => self.noscript,
            DetectionMethod::NetworkRequest => self.network_request,
            DetectionMethod::GlobalObject => self.global_object,
            DetectionMethod::RenderedDom => self.rendered_dom,
            DetectionMethod::ConsoleMessage => self.console_message,
        }
    }

    fn all(&self) -> [(&'static str, f64); 9] {
        [
            ("container_id", self.container_id),
            ("script_url", self.script_url),
            ("inline_call", self.inline_call),
            ("dynamic_insertion", self.dynamic_insertion),
            ("noscript", self.noscript),
            ("network_request", self.network_request),
            ("global_object", self.global_object),
            ("rendered_dom", self.rendered_dom),
            ("console_message", self.console_message),
        ]
    }
}

/// Lower bounds of the verdict categories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryThresholds {
    pub confirmed: f64,
    pub likely: f64,
}

impl Default for CategoryThresholds {
    fn default() -> Self {
        Self {
            confirmed: 0.8,
            likely: 0.4,
        }
    }
}

/// Scoring calibration consumed by the confidence merger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub weights: MethodWeights,
    /// Extra evidence credited when a static and a dynamic method agree.
    pub corroboration_boost: f64,
    /// Confidence never reaches 1.0; this is the ceiling.
    pub max_confidence: f64,
    /// Ceiling for tags seen only at runtime. Must stay below `thresholds.confirmed`.
    pub dynamic_only_cap: f64,
    pub thresholds: CategoryThresholds,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            weights: MethodWeights::default(),
            corroboration_boost: 0.5,
            max_confidence: 0.99,
            dynamic_only_cap: 0.79,
            thresholds: CategoryThresholds::default(),
        }
    }
}

impl Calibration {
    /// Checks that the calibration can satisfy the scoring contract.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        for (name, weight) in self.weights.all() {
            if !(weight > 0.0 && weight < 1.0) {
                return Err(ConfigurationError::InvalidSetting(format!(
                    "weight '{name}' must be in (0, 1), got {weight}"
                )));
            }
        }
        if !(0.0..1.0).contains(&self.corroboration_boost) {
            return Err(ConfigurationError::InvalidSetting(format!(
                "corroboration_boost must be in [0, 1), got {}",
                self.corroboration_boost
            )));
        }
        if !(self.max_confidence > 0.0 && self.max_confidence < 1.0) {
            return Err(ConfigurationError::InvalidSetting(format!(
                "max_confidence must be in (0, 1), got {}",
                self.max_confidence
            )));
        }
        let t = &self.thresholds;
        if !(0.0 < t.likely && t.likely < t.confirmed && t.confirmed <= self.max_confidence) {
            return Err(ConfigurationError::InvalidSetting(format!(
                "thresholds must satisfy 0 < likely ({}) < confirmed ({}) <= max_confidence",
                t.likely, t.confirmed
            )));
        }
        if self.dynamic_only_cap >= t.confirmed || self.dynamic_only_cap <= 0.0 {
            return Err(ConfigurationError::InvalidSetting(format!(
                "dynamic_only_cap ({}) must be positive and below the confirmed threshold ({})",
                self.dynamic_only_cap, t.confirmed
            )));
        }
        Ok(())
    }
}

/// Parameters of the per-domain adaptive timeout.
#[derive(Debug, Clone, PartialEq)]
pub struct AdaptiveTimeoutConfig {
    pub baseline: Duration,
    pub ceiling: Duration,
    /// Multiplier applied to the observed p90/moving-average latency.
    pub headroom: f64,
    /// Number of recent latencies kept per domain.
    pub window: usize,
    /// Smoothing factor of the moving average.
    pub ewma_alpha: f64,
    /// Fraction of the baseline added per recorded failure.
    pub failure_step: f64,
    pub max_failure_steps: u64,
}

impl Default for AdaptiveTimeoutConfig {
    fn default() -> Self {
        Self {
            baseline: crate::config::DEFAULT_FETCH_TIMEOUT_BASELINE,
            ceiling: crate::config::DEFAULT_FETCH_TIMEOUT_CEILING,
            headroom: 1.5,
            window: 20,
            ewma_alpha: 0.3,
            failure_step: 0.25,
            max_failure_steps: 4,
        }
    }
}
