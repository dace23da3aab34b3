use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::app::ports::{CanonicalOutputPort, OutputSummary};
use crate::domain::{Build, CanonicalMarker};
use crate::error::{ReconcileError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Tsv,
    Jsonl,
}

/// Writes the canonical dataset to a single file, atomically.
///
/// Rows are sorted by `canonical_id`, so identical registries produce identical bytes.
pub struct FileOutputAdapter {
    path: PathBuf,
    format: OutputFormat,
}

impl FileOutputAdapter {
    pub fn new(path: impl Into<PathBuf>, format: OutputFormat) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }

    pub fn render(&self, records: &[CanonicalMarker]) -> Result<String> {
        let mut sorted: Vec<&CanonicalMarker> = records.iter().collect();
        sorted.sort_by(|a, b| a.canonical_id.cmp(&b.canonical_id));

        match self.format {
            OutputFormat::Tsv => render_tsv(&sorted),
            OutputFormat::Jsonl => {
                let mut out = String::new();
                for record in sorted {
                    out.push_str(&serde_json::to_string(record)?);
                    out.push('\n');
                }
                Ok(out)
            }
        }
    }
}

fn tsv_header() -> String {
    let mut columns = vec![
        "canonical_id".to_string(),
        "haplogroup".to_string(),
        "status_tags".to_string(),
        "aliases".to_string(),
        "reference_id".to_string(),
        "mutation".to_string(),
    ];
    for build in Build::ALL {
        let prefix = build.as_str().to_lowercase();
        columns.push(format!("{}_position", prefix));
        columns.push(format!("{}_origin", prefix));
    }
    columns.push("is_legacy".to_string());
    columns.push("provenance".to_string());
    columns.join("\t")
}

/// Tabs and newlines would break the row structure
fn cell(value: &str) -> String {
    value.replace(['\t', '\n', '\r'], " ")
}

fn render_tsv(records: &[&CanonicalMarker]) -> Result<String> {
    let mut out = tsv_header();
    out.push('\n');

    for record in records {
        let mut row = vec![
            cell(&record.canonical_id),
            cell(&record.haplogroup),
            cell(&record.status_tags.iter().cloned().collect::<Vec<_>>().join(";")),
            cell(&record.aliases.iter().cloned().collect::<Vec<_>>().join(";")),
            cell(record.reference_id.as_deref().unwrap_or("")),
            cell(record.mutation.as_deref().unwrap_or("")),
        ];
        for build in Build::ALL {
            match record.position(build) {
                Some(position) => {
                    row.push(position.value.to_string());
                    row.push(position.origin.to_string());
                }
                None => {
                    row.push(String::new());
                    row.push(String::new());
                }
            }
        }
        row.push(record.is_legacy.to_string());
        row.push(cell(&serde_json::to_string(&record.provenance)?));

        out.push_str(&row.join("\t"));
        out.push('\n');
    }
    Ok(out)
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[async_trait]
impl CanonicalOutputPort for FileOutputAdapter {
    async fn write(&self, records: &[CanonicalMarker]) -> Result<OutputSummary> {
        let rendered = self.render(records)?;
        let sha256 = sha256_hex(rendered.as_bytes());

        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        tokio::fs::create_dir_all(&parent).await?;

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
            tmp.write_all(rendered.as_bytes())?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path).map_err(|e| ReconcileError::Io(e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| ReconcileError::Io(std::io::Error::other(e.to_string())))??;

        debug!("Wrote {} records to {}", records.len(), self.path.display());
        info!("Canonical dataset written: {} ({})", self.path.display(), sha256);
        Ok(OutputSummary {
            path: self.path.clone(),
            records: records.len(),
            sha256,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<CanonicalMarker> {
        let mut b = CanonicalMarker::new("P312", true);
        b.haplogroup = "R1b1a1b1a1a2".to_string();
        b.record_direct(Build::B37, 22_157_311);
        let mut a = CanonicalMarker::new("L21", true);
        a.aliases.insert("S145".to_string());
        a.record_derived(Build::B36, 14_000_000);
        vec![b, a]
    }

    #[test]
    fn test_tsv_rows_sorted_with_origins() {
        let adapter = FileOutputAdapter::new("unused.tsv", OutputFormat::Tsv);
        let rendered = adapter.render(&sample()).unwrap();
        let lines: Vec<&str> = rendered.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("canonical_id\thaplogroup"));
        assert!(lines[1].starts_with("L21\t"));
        assert!(lines[1].contains("\t14000000\tderived\t"));
        assert!(lines[2].starts_with("P312\t"));
        assert!(lines[2].contains("\t22157311\tdirect\t"));
    }

    #[tokio::test]
    async fn test_write_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = FileOutputAdapter::new(dir.path().join("out/markers.jsonl"), OutputFormat::Jsonl);

        let first = adapter.write(&sample()).await.unwrap();
        let mut reversed = sample();
        reversed.reverse();
        let second = adapter.write(&reversed).await.unwrap();

        assert_eq!(first.sha256, second.sha256);
        assert_eq!(first.records, 2);
        let written = std::fs::read_to_string(dir.path().join("out/markers.jsonl")).unwrap();
        assert_eq!(sha256_hex(written.as_bytes()), first.sha256);
        assert!(written.starts_with("{\"canonical_id\":\"L21\""));
    }
}
