use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::app::coverage_report::{CoverageReport, VersionSummary};
use crate::app::ports::{CanonicalOutputPort, CoordinateTransformPort, ExtractFeedPort, OutputSummary};
use crate::domain::{compare_versions, ExtractState, MarkerExtract, VersionBatch};
use crate::error::ReconcileError;
use crate::observability::metrics;
use crate::pipeline::processing::catalog::{MergeEngine, MergeOutcome};
use crate::pipeline::processing::harmonize::{CoordinateHarmonizer, HarmonizerSettings};
use crate::pipeline::processing::matching::{MatchCascade, MatchContext};
use crate::pipeline::processing::normalize::clean_extract;
use crate::pipeline::storage::Registry;

#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    pub harmonizer: HarmonizerSettings,
    /// Lift each batch's extract positions onto missing builds before matching
    pub project_extract_positions: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            harmonizer: HarmonizerSettings::default(),
            project_extract_positions: true,
        }
    }
}

/// Result of a completed run
pub struct ReconcileOutcome {
    pub registry: Registry,
    pub report: CoverageReport,
    pub output: OutputSummary,
}

/// Drives a full reconciliation: feed -> match -> merge -> harmonize, batch by batch,
/// then writes the canonical dataset.
pub struct ReconcileUseCase {
    feed: Arc<dyn ExtractFeedPort>,
    output: Arc<dyn CanonicalOutputPort>,
    harmonizer: CoordinateHarmonizer,
    cascade: MatchCascade,
    merge: MergeEngine,
    registry: Registry,
    options: ReconcileOptions,
    last_version: Option<String>,
}

impl ReconcileUseCase {
    pub fn new(
        feed: Arc<dyn ExtractFeedPort>,
        transform: Arc<dyn CoordinateTransformPort>,
        output: Arc<dyn CanonicalOutputPort>,
        options: ReconcileOptions,
    ) -> Self {
        Self {
            feed,
            output,
            harmonizer: CoordinateHarmonizer::new(transform, options.harmonizer.clone()),
            cascade: MatchCascade::default(),
            merge: MergeEngine::new(),
            registry: Registry::new(),
            options,
            last_version: None,
        }
    }

    /// Run to completion. Feed failures abort before anything is written.
    pub async fn run(mut self) -> Result<ReconcileOutcome> {
        let batches = self
            .feed
            .load()
            .await
            .context("Failed to load extract feed")?;

        let mut report = CoverageReport::new();
        info!("Reconciling {} versions (run {})", batches.len(), report.run_id);

        for batch in batches {
            self.process_batch(batch, &mut report).await?;
        }

        report.finalize(&self.registry);

        let records: Vec<_> = self.registry.iter().cloned().collect();
        let output = self
            .output
            .write(&records)
            .await
            .context("Failed to write canonical dataset")?;
        report.set_output(&output);

        info!(
            "Reconciliation complete: {} records, {} legacy",
            report.records_total, report.legacy_records
        );
        Ok(ReconcileOutcome {
            registry: self.registry,
            report,
            output,
        })
    }

    /// Match and merge one version's extracts, then harmonize the registry. Versions must
    /// arrive in strictly ascending order.
    pub async fn process_batch(&mut self, batch: VersionBatch, report: &mut CoverageReport) -> Result<()> {
        if let Some(previous) = &self.last_version {
            if compare_versions(previous, &batch.version).is_ge() {
                return Err(ReconcileError::FeedOutOfOrder {
                    previous: previous.clone(),
                    next: batch.version.clone(),
                }
                .into());
            }
        }
        self.last_version = Some(batch.version.clone());

        let span = info_span!("version", version = %batch.version);
        self.reconcile_batch(batch, report).instrument(span).await
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    async fn reconcile_batch(&mut self, batch: VersionBatch, report: &mut CoverageReport) -> Result<()> {
        let mut summary = VersionSummary {
            version: batch.version.clone(),
            extracts: batch.extracts.len(),
            unreadable_lines: batch.unreadable_lines,
            ..Default::default()
        };
        info!("Processing {} extracts", batch.extracts.len());

        let mut accepted: Vec<MarkerExtract> = Vec::with_capacity(batch.extracts.len());
        for extract in batch.extracts {
            let extract = clean_extract(extract);
            if let Err(e) = extract.validate() {
                ExtractState::Unseen.advance(ExtractState::Rejected)?;
                warn!("Rejected extract: {}", e);
                metrics::matching::extract_rejected();
                summary.rejected += 1;
                continue;
            }
            accepted.push(extract);
        }

        let projections = if self.options.project_extract_positions {
            let (projections, hops) = self.harmonizer.project_extracts(&accepted).await;
            report.add_hops(&hops);
            projections
        } else {
            vec![BTreeMap::new(); accepted.len()]
        };

        for (extract, projected) in accepted.iter().zip(projections.iter()) {
            let state = ExtractState::Unseen.advance(ExtractState::MatchAttempted)?;
            let ctx = MatchContext { extract, projected };
            let outcome = self.cascade.resolve_with(&ctx, &self.registry);
            report.add_signals(outcome.signals);

            let (state, canonical_id) = match outcome.canonical_id {
                Some(id) => (state.advance(ExtractState::Attached)?, id),
                None => (state.advance(ExtractState::Created)?, extract.name.clone()),
            };

            let merged = self
                .merge
                .apply(extract, &canonical_id, &mut self.registry, outcome.matched_by)?;
            let state = state.advance(ExtractState::Merged)?;

            match merged {
                MergeOutcome::Created => summary.created += 1,
                MergeOutcome::Merged => summary.attached += 1,
                MergeOutcome::Unchanged => {
                    summary.attached += 1;
                    summary.unchanged += 1;
                }
            }
            if let Some(kind) = outcome.matched_by {
                report.record_match(kind);
            }
            debug!("{} -> {} ({})", extract.name, canonical_id, state);
        }

        let harmonized = self
            .harmonizer
            .harmonize_registry(&mut self.registry, &self.merge)
            .await;
        report.add_hops(&harmonized.hops);
        report.derived_positions_committed += harmonized.derived_committed;

        info!(
            "Version {}: {} attached, {} created, {} rejected",
            summary.version, summary.attached, summary.created, summary.rejected
        );
        report.add_version(summary);
        Ok(())
    }
}
