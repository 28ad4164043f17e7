//! Error handling and processing statistics.
//!
//! This module provides:
//! - The error taxonomy of a detection run (fetch, parse, browser, plugin, configuration)
//! - Processing statistics tracking (errors, warnings, info metrics)
//! - Categorization of transport errors
//!
//! Error types are categorized into:
//! - **Errors**: Failures that prevent a URL from being checked
//! - **Warnings**: Conditions that weaken or explain a verdict
//! - **Info**: Informational metrics (retries, progressive hits, etc.)

mod categorization;
mod stats;
mod types;

// Re-export public API
pub use stats::ProcessingStats;
pub use types::{
    BrowserError, ConfigurationError, ErrorType, FetchError, InfoType, InitializationError,
    ParseError, PluginError, WarningType,
};
