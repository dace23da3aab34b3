use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::domain::{Build, CanonicalMarker, VersionBatch};
use crate::error::Result;

/// One batched lift request: every locus shares the same source and target build
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransformRequest {
    pub source: Build,
    pub target: Build,
    /// `(locus_id, 1-based position)` pairs; locus ids are unique within a request
    pub loci: Vec<(String, u64)>,
}

/// Lifts coordinates between two builds joined by a direct transform.
///
/// The response is partial: loci the service could not map are simply absent. A whole
/// pair being unusable (missing chain file, tool not installed) is
/// `ReconcileError::TransformUnavailable`.
#[async_trait]
pub trait CoordinateTransformPort: Send + Sync {
    async fn transform(&self, request: TransformRequest) -> Result<BTreeMap<String, u64>>;
}

/// Source of version batches, oldest version first
#[async_trait]
pub trait ExtractFeedPort: Send + Sync {
    async fn load(&self) -> Result<Vec<VersionBatch>>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputSummary {
    pub path: PathBuf,
    pub records: usize,
    /// Hex sha256 of the written artifact
    pub sha256: String,
}

/// Writes the canonical dataset
#[async_trait]
pub trait CanonicalOutputPort: Send + Sync {
    async fn write(&self, records: &[CanonicalMarker]) -> Result<OutputSummary>;
}
