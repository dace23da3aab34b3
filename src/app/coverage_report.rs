use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;
use uuid::Uuid;

use crate::app::ports::OutputSummary;
use crate::domain::{Build, MatchStrategyKind, PositionOrigin};
use crate::pipeline::processing::harmonize::{HopStats, HopStatus};
use crate::pipeline::processing::matching::DataQualitySignal;
use crate::pipeline::storage::Registry;

/// Per-version extract counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VersionSummary {
    pub version: String,
    pub extracts: usize,
    pub unreadable_lines: usize,
    pub rejected: usize,
    pub attached: usize,
    pub created: usize,
    /// Attached extracts that were already reflected on their record
    pub unchanged: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BuildCoverage {
    pub direct: usize,
    pub derived: usize,
    pub missing: usize,
}

/// Totals for one `(source, target)` transform pair across the run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HopTotals {
    pub jobs: usize,
    pub requested: usize,
    pub mapped: usize,
    pub unmapped: usize,
    pub memo_hits: usize,
    pub timed_out: usize,
    pub unavailable: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputDigest {
    pub path: String,
    pub records: usize,
    pub sha256: String,
}

/// What a run did, so gaps and conflicts are auditable
#[derive(Debug, Clone, Serialize)]
pub struct CoverageReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub versions: Vec<VersionSummary>,
    pub extracts_seen: usize,
    pub extracts_rejected: usize,
    pub matches_by_strategy: BTreeMap<MatchStrategyKind, usize>,
    pub records_created: usize,
    pub records_total: usize,
    pub legacy_records: usize,
    pub derived_positions_committed: usize,
    pub builds: BTreeMap<Build, BuildCoverage>,
    pub hops: BTreeMap<String, HopTotals>,
    pub signals: Vec<DataQualitySignal>,
    pub output: Option<OutputDigest>,
}

impl Default for CoverageReport {
    fn default() -> Self {
        Self::new()
    }
}

impl CoverageReport {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            versions: Vec::new(),
            extracts_seen: 0,
            extracts_rejected: 0,
            matches_by_strategy: BTreeMap::new(),
            records_created: 0,
            records_total: 0,
            legacy_records: 0,
            derived_positions_committed: 0,
            builds: BTreeMap::new(),
            hops: BTreeMap::new(),
            signals: Vec::new(),
            output: None,
        }
    }

    pub fn add_version(&mut self, summary: VersionSummary) {
        self.extracts_seen += summary.extracts;
        self.extracts_rejected += summary.rejected;
        self.records_created += summary.created;
        self.versions.push(summary);
    }

    pub fn record_match(&mut self, kind: MatchStrategyKind) {
        *self.matches_by_strategy.entry(kind).or_default() += 1;
    }

    pub fn add_signals(&mut self, signals: impl IntoIterator<Item = DataQualitySignal>) {
        self.signals.extend(signals);
    }

    pub fn add_hops(&mut self, hops: &[HopStats]) {
        for hop in hops {
            let totals = self
                .hops
                .entry(format!("{}->{}", hop.source, hop.target))
                .or_default();
            totals.jobs += 1;
            totals.requested += hop.requested;
            totals.mapped += hop.mapped;
            totals.unmapped += hop.unmapped;
            totals.memo_hits += hop.memo_hits;
            match hop.status {
                HopStatus::TimedOut => totals.timed_out += 1,
                HopStatus::Unavailable => totals.unavailable += 1,
                HopStatus::Completed | HopStatus::Memoized | HopStatus::Skipped => {}
            }
        }
    }

    /// Take per-build coverage from the final registry
    pub fn finalize(&mut self, registry: &Registry) {
        self.records_total = registry.len();
        self.legacy_records = registry.iter().filter(|r| r.is_legacy).count();
        self.builds = Build::ALL
            .iter()
            .map(|build| (*build, BuildCoverage::default()))
            .collect();

        for record in registry.iter() {
            for build in Build::ALL {
                let Some(coverage) = self.builds.get_mut(&build) else {
                    continue;
                };
                match record.position(build).map(|p| p.origin) {
                    Some(PositionOrigin::Direct) => coverage.direct += 1,
                    Some(PositionOrigin::Derived) => coverage.derived += 1,
                    None => coverage.missing += 1,
                }
            }
        }
    }

    pub fn set_output(&mut self, summary: &OutputSummary) {
        self.output = Some(OutputDigest {
            path: summary.path.display().to_string(),
            records: summary.records,
            sha256: summary.sha256.clone(),
        });
    }

    pub async fn write_json(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    pub fn console_summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Reconciliation run {}", self.run_id);
        let _ = writeln!(
            out,
            "  versions: {}  extracts: {}  rejected: {}",
            self.versions.len(),
            self.extracts_seen,
            self.extracts_rejected
        );
        let _ = writeln!(
            out,
            "  records: {}  created: {}  legacy: {}",
            self.records_total, self.records_created, self.legacy_records
        );
        for (kind, count) in &self.matches_by_strategy {
            let _ = writeln!(out, "  matched by {}: {}", kind, count);
        }
        if !self.signals.is_empty() {
            let _ = writeln!(out, "  data-quality signals: {}", self.signals.len());
        }
        for (build, coverage) in &self.builds {
            let _ = writeln!(
                out,
                "  {}: {} direct, {} derived, {} missing",
                build, coverage.direct, coverage.derived, coverage.missing
            );
        }
        for (pair, totals) in &self.hops {
            let _ = writeln!(
                out,
                "  {}: {}/{} mapped, {} timed out, {} unavailable",
                pair, totals.mapped, totals.requested, totals.timed_out, totals.unavailable
            );
        }
        if let Some(output) = &self.output {
            let _ = writeln!(out, "  output: {} (sha256 {})", output.path, output.sha256);
        }
        out
    }
}
