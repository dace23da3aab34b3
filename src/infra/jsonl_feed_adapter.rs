use async_trait::async_trait;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::app::ports::ExtractFeedPort;
use crate::constants::FEED_FILE_EXTENSION;
use crate::domain::{chronological_key, compare_versions, MarkerExtract, VersionBatch};
use crate::error::{ReconcileError, Result};

/// Reads one `<version>.jsonl` file of extracts per archive version
pub struct JsonlFeedAdapter {
    dir: PathBuf,
    /// Explicit version order; discovered from the directory when absent
    versions: Option<Vec<String>>,
}

impl JsonlFeedAdapter {
    pub fn new(dir: impl Into<PathBuf>, versions: Option<Vec<String>>) -> Self {
        Self {
            dir: dir.into(),
            versions,
        }
    }

    fn unavailable(&self, reason: impl Into<String>) -> ReconcileError {
        ReconcileError::FeedUnavailable {
            path: self.dir.display().to_string(),
            reason: reason.into(),
        }
    }

    async fn discover_versions(&self) -> Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut versions = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(FEED_FILE_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                versions.push(stem.to_string());
            }
        }
        versions.sort_by(|a, b| chronological_key(a).cmp(&chronological_key(b)));
        Ok(versions)
    }

    fn check_order(versions: &[String]) -> Result<()> {
        for pair in versions.windows(2) {
            if compare_versions(&pair[0], &pair[1]) != Ordering::Less {
                return Err(ReconcileError::FeedOutOfOrder {
                    previous: pair[0].clone(),
                    next: pair[1].clone(),
                });
            }
        }
        Ok(())
    }

    async fn read_batch(&self, version: &str) -> Result<VersionBatch> {
        let path = self.dir.join(format!("{}.{}", version, FEED_FILE_EXTENSION));
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(self.unavailable(format!("missing {}", path.display())));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(parse_batch(version, &contents, &path))
    }
}

/// Decode a JSON Lines batch. Undecodable lines are counted and skipped; records without
/// a version label inherit the file's.
pub fn parse_batch(version: &str, contents: &str, origin: &Path) -> VersionBatch {
    let mut batch = VersionBatch {
        version: version.to_string(),
        ..Default::default()
    };

    for (line_no, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<MarkerExtract>(line) {
            Ok(mut extract) => {
                if extract.version.is_empty() {
                    extract.version = version.to_string();
                } else if extract.version != version {
                    warn!(
                        "{}:{} labelled '{}', treating as '{}'",
                        origin.display(),
                        line_no + 1,
                        extract.version,
                        version
                    );
                    extract.version = version.to_string();
                }
                batch.extracts.push(extract);
            }
            Err(e) => {
                warn!("Skipping unreadable line {}:{}: {}", origin.display(), line_no + 1, e);
                batch.unreadable_lines += 1;
            }
        }
    }
    batch
}

#[async_trait]
impl ExtractFeedPort for JsonlFeedAdapter {
    async fn load(&self) -> Result<Vec<VersionBatch>> {
        if !self.dir.is_dir() {
            return Err(self.unavailable("directory does not exist"));
        }

        let versions = match &self.versions {
            Some(versions) => versions.clone(),
            None => self.discover_versions().await?,
        };
        if versions.is_empty() {
            return Err(self.unavailable(format!("no *.{} files", FEED_FILE_EXTENSION)));
        }
        Self::check_order(&versions)?;

        let mut batches = Vec::with_capacity(versions.len());
        for version in &versions {
            let batch = self.read_batch(version).await?;
            debug!("Loaded {} extracts for version {}", batch.extracts.len(), version);
            batches.push(batch);
        }
        info!("Loaded {} versions from {}", batches.len(), self.dir.display());
        Ok(batches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_discovers_versions_in_chronological_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("2019-2020.jsonl"), r#"{"name":"M269","haplogroup":"R1b1a1b"}"#).unwrap();
        std::fs::write(dir.path().join("2009.jsonl"), "{\"name\":\"M269\",\"haplogroup\":\"R1b1b2\"}\nnot json\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let batches = JsonlFeedAdapter::new(dir.path(), None).load().await.unwrap();
        let versions: Vec<_> = batches.iter().map(|b| b.version.as_str()).collect();
        assert_eq!(versions, vec!["2009", "2019-2020"]);
        assert_eq!(batches[0].unreadable_lines, 1);
        assert_eq!(batches[0].extracts[0].version, "2009");
    }

    #[tokio::test]
    async fn test_explicit_order_must_ascend() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = JsonlFeedAdapter::new(dir.path(), Some(vec!["2013".into(), "2010".into()]));
        let err = adapter.load().await.unwrap_err();
        assert!(matches!(err, ReconcileError::FeedOutOfOrder { .. }));
    }

    #[tokio::test]
    async fn test_missing_directory_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = JsonlFeedAdapter::new(dir.path().join("absent"), None);
        assert!(matches!(adapter.load().await, Err(ReconcileError::FeedUnavailable { .. })));

        let empty = JsonlFeedAdapter::new(dir.path(), None);
        assert!(matches!(empty.load().await, Err(ReconcileError::FeedUnavailable { .. })));
    }
}
