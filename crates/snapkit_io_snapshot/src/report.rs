//! Export statistics model and mutable report builder.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Aggregate counters and diagnostics for one export run.
#[derive(Debug, Default, Clone)]
pub struct ReportExport {
    /// Number of items materialized across all categories.
    pub cnt_items: u64,
    /// Number of files produced as hard links.
    pub cnt_linked: u64,
    /// Number of files produced as byte copies.
    pub cnt_copied: u64,
    /// Items whose link source came from a candidate folder.
    pub cnt_candidate_hits: u64,
    /// Items materialized from the authoritative source asset.
    pub cnt_source_fallbacks: u64,
    /// Cumulative time spent creating hard links.
    pub dur_link_total: Duration,
    /// Non-fatal warnings, e.g. failed best-effort cleanup.
    pub warnings: Vec<String>,
}

impl ReportExport {
    /// Number of collected warnings.
    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    /// Machine-readable counters.
    pub fn to_dict(&self) -> BTreeMap<String, u64> {
        let mut dict_counts = BTreeMap::new();
        dict_counts.insert("cnt_items".to_string(), self.cnt_items);
        dict_counts.insert("cnt_linked".to_string(), self.cnt_linked);
        dict_counts.insert("cnt_copied".to_string(), self.cnt_copied);
        dict_counts.insert("cnt_candidate_hits".to_string(), self.cnt_candidate_hits);
        dict_counts.insert(
            "cnt_source_fallbacks".to_string(),
            self.cnt_source_fallbacks,
        );
        dict_counts.insert(
            "ms_link_total".to_string(),
            self.dur_link_total.as_millis() as u64,
        );
        dict_counts.insert("cnt_warnings".to_string(), self.warning_count() as u64);
        dict_counts
    }

    /// Human-readable one-line summary.
    pub fn format(&self, prefix: &str) -> String {
        format!(
            "{prefix} items={} linked={} copied={} candidate_hits={} source_fallbacks={} link_ms={} warnings={}",
            self.cnt_items,
            self.cnt_linked,
            self.cnt_copied,
            self.cnt_candidate_hits,
            self.cnt_source_fallbacks,
            self.dur_link_total.as_millis(),
            self.warning_count()
        )
    }
}

impl fmt::Display for ReportExport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format("[EXPORT]"))
    }
}

/// Mutable accumulator for export statistics.
///
/// Written by the exporter, materializer and finalizer of a single run; read
/// only after [`ReportExportBuilder::build`].
#[derive(Debug, Default, Clone)]
pub struct ReportExportBuilder {
    cnt_items: u64,
    cnt_linked: u64,
    cnt_copied: u64,
    cnt_candidate_hits: u64,
    cnt_source_fallbacks: u64,
    dur_link_total: Duration,
    warnings: Vec<String>,
}

impl ReportExportBuilder {
    pub fn add_item(&mut self) {
        self.cnt_items += 1;
    }

    /// Record one hard link and the time it took.
    pub fn add_linked(&mut self, dur_link: Duration) {
        self.cnt_linked += 1;
        self.dur_link_total += dur_link;
    }

    pub fn add_copied(&mut self) {
        self.cnt_copied += 1;
    }

    pub fn add_candidate_hit(&mut self) {
        self.cnt_candidate_hits += 1;
    }

    pub fn add_source_fallback(&mut self) {
        self.cnt_source_fallbacks += 1;
    }

    /// Add warning message.
    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    /// Linked count so far.
    pub fn cnt_linked(&self) -> u64 {
        self.cnt_linked
    }

    /// Copied count so far.
    pub fn cnt_copied(&self) -> u64 {
        self.cnt_copied
    }

    /// Finalize builder into immutable report.
    pub fn build(self) -> ReportExport {
        ReportExport {
            cnt_items: self.cnt_items,
            cnt_linked: self.cnt_linked,
            cnt_copied: self.cnt_copied,
            cnt_candidate_hits: self.cnt_candidate_hits,
            cnt_source_fallbacks: self.cnt_source_fallbacks,
            dur_link_total: self.dur_link_total,
            warnings: self.warnings,
        }
    }
}
