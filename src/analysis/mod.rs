//! Evidence collection.
//!
//! - [`analyze_static`] runs every plugin over fetched markup
//! - [`DynamicAnalyzer`] drives a browser session and runs every plugin over the captured activity
//! - [`PageSignals`] flags consent managers, lazy loading and SPA frameworks
//!
//! Both analyzers return an [`EvidenceMap`] keyed by registry key. A plugin that
//! fails or panics contributes empty evidence plus the fault; it never affects the
//! other plugins.

pub mod dynamic;
mod signals;
mod static_analyzer;

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};

use log::warn;

pub use dynamic::{
    BrowserDriver, BrowserSession, ChromiumDriver, DynamicAnalyzer, DynamicOutcome, DynamicProgress, PageSnapshot,
};
pub use signals::PageSignals;
pub use static_analyzer::analyze_static;

use crate::error_handling::PluginError;
use crate::models::Evidence;

/// Outcome of one plugin on one URL for one analysis pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagEvidence {
    pub evidence: Evidence,
    pub fault: Option<PluginError>,
}

pub type EvidenceMap = HashMap<String, TagEvidence>;

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs one plugin call, turning an error or a panic into empty evidence plus a fault.
pub(crate) fn run_isolated<F>(plugin: &str, detect: F) -> TagEvidence
where
    F: FnOnce() -> Result<Evidence, PluginError>,
{
    match panic::catch_unwind(AssertUnwindSafe(detect)) {
        Ok(Ok(evidence)) => TagEvidence {
            evidence,
            fault: None,
        },
        Ok(Err(error)) => {
            warn!("{}", error);
            TagEvidence {
                evidence: Evidence::empty(),
                fault: Some(error),
            }
        }
        Err(payload) => {
            let error = PluginError::Panicked {
                plugin: plugin.to_string(),
                message: panic_message(payload.as_ref()),
            };
            warn!("{}", error);
            TagEvidence {
                evidence: Evidence::empty(),
                fault: Some(error),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DetectionMethod;

    #[test]
    fn test_run_isolated_passes_evidence_through() {
        let result = run_isolated("ok", || {
            let mut builder = Evidence::builder();
            builder.hit(DetectionMethod::ScriptUrl, "gtm.js", 0.55);
            Ok(builder.build())
        });
        assert!(result.fault.is_none());
        assert_eq!(result.evidence.items().len(), 1);
    }

    #[test]
    fn test_run_isolated_catches_panics() {
        let result = run_isolated("broken", || panic!("index out of bounds"));
        assert!(result.evidence.is_empty());
        assert_eq!(
            result.fault,
            Some(PluginError::Panicked {
                plugin: "broken".into(),
                message: "index out of bounds".into()
            })
        );
    }

    #[test]
    fn test_run_isolated_keeps_plugin_errors() {
        let result = run_isolated("failing", || {
            Err(PluginError::Failed {
                plugin: "failing".into(),
                message: "bad input".into(),
            })
        });
        assert!(result.evidence.is_empty());
        assert!(matches!(result.fault, Some(PluginError::Failed { .. })));
    }
}
