use std::collections::BTreeSet;

use super::{MatchContext, MatchStrategy, StrategyResult};
use crate::domain::MatchStrategyKind;
use crate::pipeline::processing::normalize::NameNormalizer;
use crate::pipeline::storage::Registry;

/// Extract name (or, failing that, one of its declared aliases) equals a `canonical_id`
/// or a stored alias. A `canonical_id` hit on the name beats alias hits.
pub struct ExactNameStrategy;

impl MatchStrategy for ExactNameStrategy {
    fn kind(&self) -> MatchStrategyKind {
        MatchStrategyKind::ExactName
    }

    fn candidates(&self, ctx: &MatchContext<'_>, registry: &Registry) -> StrategyResult {
        let name = ctx.extract.name.as_str();
        if registry.contains(name) {
            return StrategyResult::Unique(name.to_string());
        }

        let by_name = registry.ids_with_alias(name);
        if !by_name.is_empty() {
            return StrategyResult::from_candidates(by_name);
        }

        let mut by_alias = BTreeSet::new();
        for alias in &ctx.extract.aliases {
            if registry.contains(alias) {
                by_alias.insert(alias.clone());
            }
            by_alias.extend(registry.ids_with_alias(alias));
        }
        StrategyResult::from_candidates(by_alias)
    }
}

/// Any normalized variant of the extract name equals a normalized variant of a
/// `canonical_id` or alias.
pub struct NormalizedNameStrategy {
    normalizer: NameNormalizer,
}

impl NormalizedNameStrategy {
    pub fn new(normalizer: NameNormalizer) -> Self {
        Self { normalizer }
    }
}

impl MatchStrategy for NormalizedNameStrategy {
    fn kind(&self) -> MatchStrategyKind {
        MatchStrategyKind::NormalizedName
    }

    fn candidates(&self, ctx: &MatchContext<'_>, registry: &Registry) -> StrategyResult {
        let found = self
            .normalizer
            .variants(&ctx.extract.name)
            .iter()
            .flat_map(|variant| registry.ids_with_variant(variant))
            .collect();
        StrategyResult::from_candidates(found)
    }
}

/// Extract reference id equals the stored reference id of exactly one record
pub struct ReferenceIdStrategy;

impl MatchStrategy for ReferenceIdStrategy {
    fn kind(&self) -> MatchStrategyKind {
        MatchStrategyKind::ReferenceId
    }

    fn candidates(&self, ctx: &MatchContext<'_>, registry: &Registry) -> StrategyResult {
        match ctx.extract.reference_id.as_deref() {
            Some(reference_id) => {
                StrategyResult::from_candidates(registry.ids_with_reference(reference_id))
            }
            None => StrategyResult::NoMatch,
        }
    }
}

/// An observed or projected `(build, position)` pair of the extract coincides with a
/// direct position stored on exactly one record.
pub struct PositionStrategy;

impl MatchStrategy for PositionStrategy {
    fn kind(&self) -> MatchStrategyKind {
        MatchStrategyKind::Position
    }

    fn candidates(&self, ctx: &MatchContext<'_>, registry: &Registry) -> StrategyResult {
        if ctx.extract.positions.is_empty() {
            return StrategyResult::NoMatch;
        }

        let found = ctx
            .extract
            .positions
            .iter()
            .chain(ctx.projected.iter())
            .flat_map(|(build, position)| registry.ids_with_direct_position(*build, *position))
            .collect();
        StrategyResult::from_candidates(found)
    }
}
