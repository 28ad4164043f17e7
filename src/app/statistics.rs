//! Statistics printing.

use log::info;
use strum::IntoEnumIterator;

use crate::error_handling::{ErrorType, InfoType, ProcessingStats, WarningType};
use crate::DetectionReport;

/// Prints error, warning, and info statistics to the log.
pub fn print_error_statistics(error_stats: &ProcessingStats) {
    let total_errors = error_stats.total_errors();
    let total_warnings = error_stats.total_warnings();
    let total_info = error_stats.total_info();

    if total_errors > 0 {
        info!("Error Counts ({} total):", total_errors);
        for error_type in ErrorType::iter() {
            let count = error_stats.get_error_count(error_type);
            if count > 0 {
                info!("   {}: {}", error_type.as_str(), count);
            }
        }
    }

    if total_warnings > 0 {
        info!("Warning Counts ({} total):", total_warnings);
        for warning_type in WarningType::iter() {
            let count = error_stats.get_warning_count(warning_type);
            if count > 0 {
                info!("   {}: {}", warning_type.as_str(), count);
            }
        }
    }

    if total_info > 0 {
        info!("Info Counts ({} total):", total_info);
        for info_type in InfoType::iter() {
            let count = error_stats.get_info_count(info_type);
            if count > 0 {
                info!("   {}: {}", info_type.as_str(), count);
            }
        }
    }
}

/// Logs the run totals and how many URLs each tag was detected on.
pub fn print_detection_summary(report: &DetectionReport) {
    info!(
        "✅ Checked {} URL{} ({} completed, {} failed, {} timed out) in {:.1}s",
        report.total_urls,
        if report.total_urls == 1 { "" } else { "s" },
        report.completed,
        report.failed,
        report.timed_out,
        report.elapsed_seconds
    );
    for (name, count) in &report.detections {
        if *count > 0 {
            info!("   {}: detected on {} URL{}", name, count, if *count == 1 { "" } else { "s" });
        }
    }
}
