//! Application configuration and constants.
//!
//! This module provides:
//! - Configuration constants (timeouts, limits, etc.)
//! - Calibration constants for confidence scoring and adaptive timeouts
//! - CLI option types and parsing

mod calibration;
mod constants;
mod types;

// Re-export all constants
pub use calibration::{AdaptiveTimeoutConfig, Calibration, CategoryThresholds, MethodWeights};
pub use constants::*;
pub use types::{Config, LogFormat, LogLevel, Opt};
