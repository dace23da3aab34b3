//! Prometheus-style metrics for the reconciliation phases
//!
//! Recording functions are grouped by phase. They are cheap no-ops until a recorder is
//! installed with [`init`], so library code and tests can call them freely.

use std::fmt;
use std::sync::OnceLock;
use std::time::Instant;
use tracing::info;

/// Enum representing all metric names used by the reconciler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Matching
    MatchStrategyTotal,
    MatchAmbiguousTotal,
    ExtractsRejectedTotal,

    // Merge
    RecordsCreatedTotal,
    ExtractsMergedTotal,
    MergesSkippedTotal,
    DerivedPositionsTotal,

    // Harmonize
    HarmonizeLociRequestedTotal,
    HarmonizeLociMappedTotal,
    HarmonizeLociUnmappedTotal,
    HarmonizeTimeoutsTotal,
    HarmonizeMemoHitsTotal,
    HarmonizeHopDuration,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::MatchStrategyTotal => "marker_match_strategy_total",
            MetricName::MatchAmbiguousTotal => "marker_match_ambiguous_total",
            MetricName::ExtractsRejectedTotal => "marker_extracts_rejected_total",

            MetricName::RecordsCreatedTotal => "marker_records_created_total",
            MetricName::ExtractsMergedTotal => "marker_extracts_merged_total",
            MetricName::MergesSkippedTotal => "marker_merges_skipped_total",
            MetricName::DerivedPositionsTotal => "marker_derived_positions_total",

            MetricName::HarmonizeLociRequestedTotal => "marker_harmonize_loci_requested_total",
            MetricName::HarmonizeLociMappedTotal => "marker_harmonize_loci_mapped_total",
            MetricName::HarmonizeLociUnmappedTotal => "marker_harmonize_loci_unmapped_total",
            MetricName::HarmonizeTimeoutsTotal => "marker_harmonize_timeouts_total",
            MetricName::HarmonizeMemoHitsTotal => "marker_harmonize_memo_hits_total",
            MetricName::HarmonizeHopDuration => "marker_harmonize_hop_duration_seconds",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

static METRICS_HANDLE: OnceLock<metrics_exporter_prometheus::PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Calling it twice is an error.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    let handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {}", e))?;
    METRICS_HANDLE
        .set(handle)
        .map_err(|_| "Metrics recorder already initialized")?;
    info!("Metrics system initialized");
    Ok(())
}

/// Prometheus text exposition of everything recorded so far
pub fn render() -> Option<String> {
    METRICS_HANDLE.get().map(|handle| handle.render())
}

/// Records elapsed time into a histogram when dropped
pub struct TimingGuard {
    start: Instant,
    name: MetricName,
    labels: Vec<(&'static str, String)>,
}

impl TimingGuard {
    pub fn new(name: MetricName) -> Self {
        Self {
            start: Instant::now(),
            name,
            labels: Vec::new(),
        }
    }

    pub fn with_label(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.labels.push((key, value.into()));
        self
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        let labels: Vec<::metrics::Label> = self
            .labels
            .iter()
            .map(|(k, v)| ::metrics::Label::new(*k, v.clone()))
            .collect();
        ::metrics::histogram!(self.name.as_str(), labels).record(self.start.elapsed().as_secs_f64());
    }
}

// ============================================================================
// Matching Metrics
// ============================================================================

pub mod matching {
    use super::MetricName;
    use crate::domain::MatchStrategyKind;

    pub fn strategy_matched(kind: MatchStrategyKind) {
        ::metrics::counter!(MetricName::MatchStrategyTotal.as_str(), "strategy" => kind.as_str())
            .increment(1);
    }

    pub fn strategy_ambiguous(kind: MatchStrategyKind) {
        ::metrics::counter!(MetricName::MatchAmbiguousTotal.as_str(), "strategy" => kind.as_str())
            .increment(1);
    }

    pub fn extract_rejected() {
        ::metrics::counter!(MetricName::ExtractsRejectedTotal.as_str()).increment(1);
    }
}

// ============================================================================
// Merge Metrics
// ============================================================================

pub mod merge {
    use super::MetricName;
    use crate::domain::Build;

    pub fn record_created() {
        ::metrics::counter!(MetricName::RecordsCreatedTotal.as_str()).increment(1);
    }

    pub fn extract_merged() {
        ::metrics::counter!(MetricName::ExtractsMergedTotal.as_str()).increment(1);
    }

    /// Extract was already reflected on its record
    pub fn merge_skipped() {
        ::metrics::counter!(MetricName::MergesSkippedTotal.as_str()).increment(1);
    }

    pub fn derived_committed(build: Build) {
        ::metrics::counter!(MetricName::DerivedPositionsTotal.as_str(), "build" => build.as_str())
            .increment(1);
    }
}

// ============================================================================
// Harmonize Metrics
// ============================================================================

pub mod harmonize {
    use super::{MetricName, TimingGuard};
    use crate::domain::Build;

    fn pair_label(source: Build, target: Build) -> String {
        format!("{}->{}", source, target)
    }

    pub fn hop_completed(source: Build, target: Build, requested: usize, mapped: usize) {
        let pair = pair_label(source, target);
        ::metrics::counter!(MetricName::HarmonizeLociRequestedTotal.as_str(), "pair" => pair.clone())
            .increment(requested as u64);
        ::metrics::counter!(MetricName::HarmonizeLociMappedTotal.as_str(), "pair" => pair.clone())
            .increment(mapped as u64);
        ::metrics::counter!(MetricName::HarmonizeLociUnmappedTotal.as_str(), "pair" => pair)
            .increment(requested.saturating_sub(mapped) as u64);
    }

    pub fn hop_timed_out(source: Build, target: Build) {
        ::metrics::counter!(MetricName::HarmonizeTimeoutsTotal.as_str(), "pair" => pair_label(source, target))
            .increment(1);
    }

    pub fn memo_hits(count: usize) {
        ::metrics::counter!(MetricName::HarmonizeMemoHitsTotal.as_str()).increment(count as u64);
    }

    /// Times one hop job; the duration is recorded when the guard drops
    pub fn time_hop(source: Build, target: Build) -> TimingGuard {
        TimingGuard::new(MetricName::HarmonizeHopDuration).with_label("pair", pair_label(source, target))
    }
}
