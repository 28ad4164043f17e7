//! Static analysis over fetched markup.

use log::debug;

use crate::analysis::{run_isolated, EvidenceMap};
use crate::models::ScriptRef;
use crate::registry::Registry;

/// Runs `detect_static` of every registered plugin against its own pattern bundle.
///
/// Every registered tag gets an entry, empty when nothing matched.
pub fn analyze_static(html: &str, scripts: &[ScriptRef], registry: &Registry) -> EvidenceMap {
    let mut results = EvidenceMap::with_capacity(registry.len());
    for tag in registry.tags() {
        let plugin = tag.plugin();
        let outcome = run_isolated(plugin.name(), || {
            plugin.detect_static(html, scripts, tag.pattern())
        });
        if !outcome.evidence.is_empty() {
            debug!(
                "Static evidence for {}: {} hit(s)",
                tag.key(),
                outcome.evidence.items().len()
            );
        }
        results.insert(tag.key().to_string(), outcome);
    }
    results
}
