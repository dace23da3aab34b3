use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::app::ports::{CoordinateTransformPort, TransformRequest};
use crate::constants::chain_file_name;
use crate::domain::Build;
use crate::error::{ReconcileError, Result};

/// Coordinate transform backed by the UCSC `liftOver` tool and its chain files
#[derive(Debug, Clone)]
pub struct LiftOverAdapter {
    binary: PathBuf,
    chain_dir: PathBuf,
    chromosome: String,
}

/// Whether the chain file for one direct pair is present
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainStatus {
    pub source: Build,
    pub target: Build,
    pub path: PathBuf,
    pub present: bool,
}

impl LiftOverAdapter {
    pub fn new(binary: impl Into<PathBuf>, chain_dir: impl Into<PathBuf>, chromosome: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            chain_dir: chain_dir.into(),
            chromosome: chromosome.into(),
        }
    }

    pub fn chain_path(&self, source: Build, target: Build) -> PathBuf {
        self.chain_dir.join(chain_file_name(source, target))
    }

    pub fn chain_statuses(&self) -> Vec<ChainStatus> {
        Build::direct_pairs()
            .into_iter()
            .map(|(source, target)| {
                let path = self.chain_path(source, target);
                let present = path.is_file();
                ChainStatus {
                    source,
                    target,
                    path,
                    present,
                }
            })
            .collect()
    }

    /// True when the binary can be spawned. A bare name is resolved through `PATH`.
    pub async fn binary_available(&self) -> bool {
        if self.binary.components().count() > 1 {
            return self.binary.is_file();
        }
        match Command::new(&self.binary).kill_on_drop(true).output().await {
            Ok(_) => true,
            Err(e) => e.kind() != std::io::ErrorKind::NotFound,
        }
    }

    fn unavailable(request: &TransformRequest, reason: impl Into<String>) -> ReconcileError {
        ReconcileError::TransformUnavailable {
            source_build: request.source,
            target_build: request.target,
            reason: reason.into(),
        }
    }

    /// BED rows `chrom  pos-1  pos  L<idx>`; liftOver mangles some names, so loci
    /// travel under their index.
    fn bed_rows(&self, loci: &[(String, u64)]) -> String {
        let mut bed = String::new();
        for (idx, (_, position)) in loci.iter().enumerate() {
            let _ = writeln!(
                bed,
                "{}\t{}\t{}\tL{}",
                self.chromosome,
                position.saturating_sub(1),
                position,
                idx
            );
        }
        bed
    }
}

/// Lifted `end` column (the 1-based position) of each output row, keyed by locus index
pub fn parse_lifted_bed(contents: &str) -> BTreeMap<usize, u64> {
    contents
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 4 {
                return None;
            }
            let idx = fields[3].trim().strip_prefix('L')?.parse().ok()?;
            let end = fields[2].trim().parse().ok()?;
            Some((idx, end))
        })
        .collect()
}

async fn read_if_exists(path: &Path) -> Result<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(contents),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl CoordinateTransformPort for LiftOverAdapter {
    async fn transform(&self, request: TransformRequest) -> Result<BTreeMap<String, u64>> {
        if request.loci.is_empty() {
            return Ok(BTreeMap::new());
        }

        let chain = self.chain_path(request.source, request.target);
        if !chain.is_file() {
            return Err(Self::unavailable(
                &request,
                format!("chain file {} not found", chain.display()),
            ));
        }

        let workdir = tempfile::tempdir()?;
        let input = workdir.path().join("input.bed");
        let output = workdir.path().join("lifted.bed");
        let unmapped = workdir.path().join("unmapped.bed");
        tokio::fs::write(&input, self.bed_rows(&request.loci)).await?;

        debug!(
            "Running {} for {} loci {}->{}",
            self.binary.display(),
            request.loci.len(),
            request.source,
            request.target
        );
        let result = Command::new(&self.binary)
            .arg(&input)
            .arg(&chain)
            .arg(&output)
            .arg(&unmapped)
            .kill_on_drop(true)
            .output()
            .await;

        let run = match result {
            Ok(run) => run,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Self::unavailable(
                    &request,
                    format!("{} not found", self.binary.display()),
                ));
            }
            Err(e) => return Err(e.into()),
        };
        if !run.status.success() {
            return Err(Self::unavailable(
                &request,
                format!(
                    "liftOver exited with {:?}: {}",
                    run.status.code(),
                    String::from_utf8_lossy(&run.stderr).trim()
                ),
            ));
        }

        let lifted = parse_lifted_bed(&read_if_exists(&output).await?);
        let unmapped_rows = read_if_exists(&unmapped)
            .await?
            .lines()
            .filter(|l| !l.starts_with('#') && !l.trim().is_empty())
            .count();
        if unmapped_rows > 0 {
            warn!(
                "{} of {} loci unmapped {}->{}",
                unmapped_rows,
                request.loci.len(),
                request.source,
                request.target
            );
        }

        Ok(request
            .loci
            .into_iter()
            .enumerate()
            .filter_map(|(idx, (id, _))| lifted.get(&idx).map(|value| (id, *value)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bed_rows_are_zero_based_half_open() {
        let adapter = LiftOverAdapter::new("liftOver", "chains", "chrY");
        let rows = adapter.bed_rows(&[("M269".to_string(), 100), ("L21".to_string(), 1)]);
        assert_eq!(rows, "chrY\t99\t100\tL0\nchrY\t0\t1\tL1\n");
    }

    #[test]
    fn test_parse_lifted_bed_reads_end_column() {
        let parsed = parse_lifted_bed("chrY\t97\t98\tL0\nchrY\t5\tbad\tL1\nshort\n");
        assert_eq!(parsed, BTreeMap::from([(0, 98)]));
    }

    #[tokio::test]
    async fn test_missing_chain_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = LiftOverAdapter::new("liftOver", dir.path(), "chrY");
        let err = adapter
            .transform(TransformRequest {
                source: Build::B36,
                target: Build::B37,
                loci: vec![("M269".to_string(), 100)],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::TransformUnavailable { .. }));
    }

    #[test]
    fn test_chain_statuses_cover_every_direct_pair() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hg18ToHg19.over.chain.gz"), b"").unwrap();
        let adapter = LiftOverAdapter::new("liftOver", dir.path(), "chrY");

        let statuses = adapter.chain_statuses();
        assert_eq!(statuses.len(), 10);
        let present: Vec<_> = statuses.iter().filter(|s| s.present).collect();
        assert_eq!(present.len(), 1);
        assert_eq!((present[0].source, present[0].target), (Build::B36, Build::B37));
    }
}
