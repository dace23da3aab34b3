use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{
    DEFAULT_CHAIN_DIR, DEFAULT_CHROMOSOME, DEFAULT_FEED_DIR, DEFAULT_LIFTOVER_BINARY,
    DEFAULT_LOG_DIR, DEFAULT_OUTPUT_PATH, DEFAULT_REPORT_PATH,
};
use crate::error::{ReconcileError, Result};
use crate::infra::OutputFormat;
use crate::pipeline::processing::harmonize::HarmonizerSettings;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub feed: FeedConfig,
    pub liftover: LiftOverConfig,
    pub harmonize: HarmonizeConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub dir: PathBuf,
    /// Explicit version order, oldest first
    pub versions: Option<Vec<String>>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_FEED_DIR),
            versions: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LiftOverConfig {
    pub binary: PathBuf,
    pub chain_dir: PathBuf,
    pub chromosome: String,
    pub timeout_seconds: u64,
}

impl Default for LiftOverConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from(DEFAULT_LIFTOVER_BINARY),
            chain_dir: PathBuf::from(DEFAULT_CHAIN_DIR),
            chromosome: DEFAULT_CHROMOSOME.to_string(),
            timeout_seconds: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HarmonizeConfig {
    pub max_concurrent_jobs: usize,
    /// Lift each batch's extract positions before matching
    pub project_extract_positions: bool,
}

impl Default for HarmonizeConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
            project_extract_positions: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub path: PathBuf,
    pub format: OutputFormat,
    pub report_path: PathBuf,
    pub metrics_path: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_OUTPUT_PATH),
            format: OutputFormat::Tsv,
            report_path: PathBuf::from(DEFAULT_REPORT_PATH),
            metrics_path: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_LOG_DIR),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ReconcileError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults when `path` does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.harmonize.max_concurrent_jobs == 0 {
            return Err(ReconcileError::Config(
                "harmonize.max_concurrent_jobs must be at least 1".to_string(),
            ));
        }
        if self.liftover.timeout_seconds == 0 {
            return Err(ReconcileError::Config(
                "liftover.timeout_seconds must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn harmonizer_settings(&self) -> HarmonizerSettings {
        HarmonizerSettings {
            max_concurrent_jobs: self.harmonize.max_concurrent_jobs,
            timeout: Duration::from_secs(self.liftover.timeout_seconds),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [feed]
            dir = "data/extracts"
            versions = ["2006", "2010"]

            [output]
            format = "jsonl"
            "#,
        )
        .unwrap();

        assert_eq!(config.feed.dir, PathBuf::from("data/extracts"));
        assert_eq!(config.feed.versions.as_deref().map(|v| v.len()), Some(2));
        assert_eq!(config.output.format, OutputFormat::Jsonl);
        assert_eq!(config.liftover.chromosome, "chrY");
        assert!(config.harmonize.project_extract_positions);
    }

    #[test]
    fn test_load_rejects_zero_concurrency() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reconcile.toml");
        std::fs::write(&path, "[harmonize]\nmax_concurrent_jobs = 0\n").unwrap();
        assert!(matches!(Config::load(&path), Err(ReconcileError::Config(_))));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.harmonizer_settings().timeout, Duration::from_secs(120));
    }
}
