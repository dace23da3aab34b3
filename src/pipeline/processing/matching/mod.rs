//! Fixed-priority cascade resolving an extract to at most one canonical record.

mod strategies;

pub use strategies::{ExactNameStrategy, NormalizedNameStrategy, PositionStrategy, ReferenceIdStrategy};

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use crate::domain::{Build, MarkerExtract, MatchStrategyKind};
use crate::observability::metrics;
use crate::pipeline::processing::normalize::NameNormalizer;
use crate::pipeline::storage::Registry;

/// What one strategy found for one extract
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyResult {
    NoMatch,
    Unique(String),
    Ambiguous(BTreeSet<String>),
}

impl StrategyResult {
    pub fn from_candidates(mut candidates: BTreeSet<String>) -> Self {
        match candidates.len() {
            0 => StrategyResult::NoMatch,
            1 => match candidates.pop_first() {
                Some(id) => StrategyResult::Unique(id),
                None => StrategyResult::NoMatch,
            },
            _ => StrategyResult::Ambiguous(candidates),
        }
    }
}

/// Inputs a strategy may look at besides the registry
#[derive(Debug, Clone, Copy)]
pub struct MatchContext<'a> {
    pub extract: &'a MarkerExtract,
    /// Extract positions lifted onto builds the extract did not report
    pub projected: &'a BTreeMap<Build, u64>,
}

/// One step of the cascade. Strategies are pure: they read the registry and never
/// mutate it.
pub trait MatchStrategy: Send + Sync {
    fn kind(&self) -> MatchStrategyKind;
    fn candidates(&self, ctx: &MatchContext<'_>, registry: &Registry) -> StrategyResult;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    NameAmbiguous,
    NormalizedNameAmbiguous,
    ReferenceIdAmbiguous,
    PositionAmbiguous,
}

impl SignalKind {
    fn for_strategy(kind: MatchStrategyKind) -> Self {
        match kind {
            MatchStrategyKind::ExactName => SignalKind::NameAmbiguous,
            MatchStrategyKind::NormalizedName => SignalKind::NormalizedNameAmbiguous,
            MatchStrategyKind::ReferenceId => SignalKind::ReferenceIdAmbiguous,
            MatchStrategyKind::Position => SignalKind::PositionAmbiguous,
        }
    }
}

/// A strategy matched several records; the cascade treated it as no match
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataQualitySignal {
    pub kind: SignalKind,
    pub version: String,
    pub extract_name: String,
    pub candidates: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchOutcome {
    pub canonical_id: Option<String>,
    pub matched_by: Option<MatchStrategyKind>,
    pub signals: Vec<DataQualitySignal>,
}

pub struct MatchCascade {
    strategies: Vec<Box<dyn MatchStrategy>>,
}

impl Default for MatchCascade {
    fn default() -> Self {
        Self::new(NameNormalizer::new())
    }
}

impl MatchCascade {
    /// Exact name, normalized name, reference id, position
    pub fn new(normalizer: NameNormalizer) -> Self {
        Self::with_strategies(vec![
            Box::new(ExactNameStrategy),
            Box::new(NormalizedNameStrategy::new(normalizer)),
            Box::new(ReferenceIdStrategy),
            Box::new(PositionStrategy),
        ])
    }

    pub fn with_strategies(strategies: Vec<Box<dyn MatchStrategy>>) -> Self {
        Self { strategies }
    }

    /// Id of the record `extract` belongs to, if any
    pub fn resolve(&self, extract: &MarkerExtract, registry: &Registry) -> Option<String> {
        let projected = BTreeMap::new();
        self.resolve_with(&MatchContext { extract, projected: &projected }, registry)
            .canonical_id
    }

    /// Run the strategies in order, stopping at the first unique candidate. Ambiguous
    /// strategies are reported as signals and fall through.
    pub fn resolve_with(&self, ctx: &MatchContext<'_>, registry: &Registry) -> MatchOutcome {
        let mut outcome = MatchOutcome::default();

        for strategy in &self.strategies {
            match strategy.candidates(ctx, registry) {
                StrategyResult::NoMatch => {}
                StrategyResult::Unique(id) => {
                    debug!(
                        "{} matched '{}' ({}) to {}",
                        strategy.kind(),
                        ctx.extract.name,
                        ctx.extract.version,
                        id
                    );
                    metrics::matching::strategy_matched(strategy.kind());
                    outcome.canonical_id = Some(id);
                    outcome.matched_by = Some(strategy.kind());
                    return outcome;
                }
                StrategyResult::Ambiguous(candidates) => {
                    warn!(
                        "{} is ambiguous for '{}' ({}): {} candidates",
                        strategy.kind(),
                        ctx.extract.name,
                        ctx.extract.version,
                        candidates.len()
                    );
                    metrics::matching::strategy_ambiguous(strategy.kind());
                    outcome.signals.push(DataQualitySignal {
                        kind: SignalKind::for_strategy(strategy.kind()),
                        version: ctx.extract.version.clone(),
                        extract_name: ctx.extract.name.clone(),
                        candidates: candidates.into_iter().collect(),
                    });
                }
            }
        }

        outcome
    }
}
