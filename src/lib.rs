//! tag_inspector library: marketing and analytics tag detection
//!
//! This library checks URLs for tags such as Google Tag Manager, Google
//! Analytics 4 and the Meta Pixel. Each URL is fetched with retries and
//! analyzed statically (markup and scripts), then optionally observed in a
//! headless browser. Both passes feed a confidence merger that labels every
//! tag as confirmed, likely, possible or not detected.
//!
//! # Example
//!
//! ```no_run
//! use tag_inspector::{run_detection, Config};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config {
//!     use_dynamic_analysis: false,
//!     max_workers: 8,
//!     ..Default::default()
//! };
//!
//! let report = run_detection(config, vec!["https://example.com".to_string()]).await?;
//! for result in &report.results {
//!     for verdict in result.detected() {
//!         println!("{}: {} ({:.2})", result.url, verdict.name, verdict.confidence);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Requirements
//!
//! This library requires a Tokio runtime. Dynamic analysis additionally needs a
//! Chromium or Chrome executable; without one, runs fall back to static-only verdicts.

pub mod analysis;
mod app;
pub mod confidence;
pub mod config;
pub mod error_handling;
pub mod export;
pub mod fetch;
pub mod initialization;
pub mod models;
pub mod registry;
mod run;

// Re-export public API
pub use app::print_detection_summary;
pub use config::{Config, LogFormat, LogLevel, Opt};
pub use models::{Category, LoadingMethod, TagVerdict, UrlResult, UrlStatus};
pub use registry::{DetectorPlugin, Registry, RegistryBuilder, TagPattern};
pub use run::{process_url_task, read_urls, run_detection, run_urls, DetectionReport, RunContext};
