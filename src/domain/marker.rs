use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::Build;

/// Whether a stored coordinate was reported by an archive or computed by chaining transforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionOrigin {
    Direct,
    Derived,
}

impl fmt::Display for PositionOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionOrigin::Direct => write!(f, "direct"),
            PositionOrigin::Derived => write!(f, "derived"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredPosition {
    pub value: u64,
    pub origin: PositionOrigin,
}

impl StoredPosition {
    pub fn direct(value: u64) -> Self {
        Self {
            value,
            origin: PositionOrigin::Direct,
        }
    }

    pub fn derived(value: u64) -> Self {
        Self {
            value,
            origin: PositionOrigin::Derived,
        }
    }

    pub fn is_direct(&self) -> bool {
        self.origin == PositionOrigin::Direct
    }
}

/// Cascade strategies, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategyKind {
    ExactName,
    NormalizedName,
    ReferenceId,
    Position,
}

impl MatchStrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStrategyKind::ExactName => "exact_name",
            MatchStrategyKind::NormalizedName => "normalized_name",
            MatchStrategyKind::ReferenceId => "reference_id",
            MatchStrategyKind::Position => "position",
        }
    }
}

impl fmt::Display for MatchStrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Snapshot appended to a record each time an extract is merged into it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceEntry {
    pub version: String,
    pub haplogroup: String,
    pub status: Option<String>,
    /// Aliases first introduced by this merge, sorted
    pub alias_delta: Vec<String>,
    /// Strategy that attached the extract; `None` when the extract created the record
    pub matched_by: Option<MatchStrategyKind>,
}

/// The reconciled representation of one physical marker across every processed version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalMarker {
    /// Name of the extract that created the record; never changes
    pub canonical_id: String,
    pub haplogroup: String,
    pub status_tags: BTreeSet<String>,
    pub aliases: BTreeSet<String>,
    pub reference_id: Option<String>,
    pub positions: BTreeMap<Build, StoredPosition>,
    pub mutation: Option<String>,
    pub provenance: Vec<ProvenanceEntry>,
    pub is_legacy: bool,
}

impl CanonicalMarker {
    pub(crate) fn new(canonical_id: impl Into<String>, is_legacy: bool) -> Self {
        Self {
            canonical_id: canonical_id.into(),
            haplogroup: String::new(),
            status_tags: BTreeSet::new(),
            aliases: BTreeSet::new(),
            reference_id: None,
            positions: BTreeMap::new(),
            mutation: None,
            provenance: Vec::new(),
            is_legacy,
        }
    }

    pub fn position(&self, build: Build) -> Option<StoredPosition> {
        self.positions.get(&build).copied()
    }

    pub fn direct_position(&self, build: Build) -> Option<u64> {
        self.position(build).filter(|p| p.is_direct()).map(|p| p.value)
    }

    /// Builds holding a direct observation
    pub fn direct_builds(&self) -> Vec<Build> {
        self.positions
            .iter()
            .filter(|(_, p)| p.is_direct())
            .map(|(b, _)| *b)
            .collect()
    }

    pub fn missing_builds(&self) -> Vec<Build> {
        Build::ALL
            .iter()
            .copied()
            .filter(|b| !self.positions.contains_key(b))
            .collect()
    }

    /// Store a directly observed coordinate. Direct observations always win over derived
    /// ones, and a later direct observation replaces an earlier one.
    ///
    /// Any change drops every derived position, since they may have been lifted from the
    /// value being replaced; the next harmonization rebuilds them from direct data.
    pub(crate) fn record_direct(&mut self, build: Build, value: u64) -> bool {
        let next = StoredPosition::direct(value);
        if self.positions.get(&build) == Some(&next) {
            return false;
        }
        self.positions.retain(|_, position| position.is_direct());
        self.positions.insert(build, next);
        true
    }

    /// Store a derived coordinate unless the build already holds a direct one.
    pub(crate) fn record_derived(&mut self, build: Build, value: u64) -> bool {
        match self.positions.get(&build) {
            Some(existing) if existing.is_direct() => false,
            Some(existing) if existing.value == value => false,
            _ => {
                self.positions.insert(build, StoredPosition::derived(value));
                true
            }
        }
    }

    pub fn first_version(&self) -> Option<&str> {
        self.provenance.first().map(|p| p.version.as_str())
    }

    pub fn last_version(&self) -> Option<&str> {
        self.provenance.last().map(|p| p.version.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_never_overwrites_direct() {
        let mut marker = CanonicalMarker::new("M269", true);
        assert!(marker.record_direct(Build::B36, 100));
        assert!(!marker.record_derived(Build::B36, 999));
        assert_eq!(marker.position(Build::B36), Some(StoredPosition::direct(100)));
    }

    #[test]
    fn test_direct_replaces_derived() {
        let mut marker = CanonicalMarker::new("M269", true);
        assert!(marker.record_derived(Build::B37, 500));
        assert!(marker.record_direct(Build::B37, 501));
        assert_eq!(marker.position(Build::B37), Some(StoredPosition::direct(501)));
        assert_eq!(marker.direct_builds(), vec![Build::B37]);
    }

    #[test]
    fn test_changed_direct_drops_derived_positions() {
        let mut marker = CanonicalMarker::new("M1", true);
        marker.record_direct(Build::B37, 500);
        marker.record_derived(Build::B36, 400);
        marker.record_derived(Build::B35, 300);

        assert!(!marker.record_direct(Build::B37, 500));
        assert_eq!(marker.position(Build::B35), Some(StoredPosition::derived(300)));

        assert!(marker.record_direct(Build::B36, 410));
        assert_eq!(marker.position(Build::B35), None);
        assert_eq!(marker.position(Build::B36), Some(StoredPosition::direct(410)));
        assert_eq!(marker.position(Build::B37), Some(StoredPosition::direct(500)));
    }

    #[test]
    fn test_missing_builds() {
        let mut marker = CanonicalMarker::new("L21", true);
        marker.record_direct(Build::B37, 1);
        marker.record_derived(Build::B36, 2);
        assert_eq!(
            marker.missing_builds(),
            vec![Build::B33, Build::B34, Build::B35, Build::B38]
        );
    }
}
