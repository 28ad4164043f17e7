//! Main application modules.
//!
//! This module provides utilities for URL validation, progress logging,
//! message sanitizing and statistics printing used by the run loop.

pub mod logging;
pub mod sanitize;
pub mod statistics;
pub mod url;

// Re-export public API
pub use logging::log_progress;
pub use sanitize::truncate_message;
pub use statistics::{print_detection_summary, print_error_statistics};
pub use url::validate_and_normalize_url;
