use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use super::Build;
use crate::error::{ReconcileError, Result};

/// One observation of a marker in one archive version, as delivered by the feed.
///
/// Extracts are immutable inputs; every field except `name` may be absent.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MarkerExtract {
    #[serde(default)]
    pub name: String,
    /// Raw haplogroup label, possibly carrying a status suffix such as `(Notes)` or `~`
    #[serde(default)]
    pub haplogroup: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    /// External reference id (dbSNP rs number)
    #[serde(default)]
    pub reference_id: Option<String>,
    /// 1-based positions as reported by the archive for each build
    #[serde(default)]
    pub positions: BTreeMap<Build, u64>,
    #[serde(default)]
    pub mutation: Option<String>,
    /// Source version label, filled in by the feed when absent from the record
    #[serde(default)]
    pub version: String,
}

impl MarkerExtract {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ..Default::default()
        }
    }

    pub fn with_haplogroup(mut self, haplogroup: impl Into<String>) -> Self {
        self.haplogroup = haplogroup.into();
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn with_reference_id(mut self, reference_id: impl Into<String>) -> Self {
        self.reference_id = Some(reference_id.into());
        self
    }

    pub fn with_position(mut self, build: Build, position: u64) -> Self {
        self.positions.insert(build, position);
        self
    }

    pub fn with_mutation(mut self, mutation: impl Into<String>) -> Self {
        self.mutation = Some(mutation.into());
        self
    }

    /// Reject extracts the engine cannot reconcile: no name, or nothing but a name.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ReconcileError::ExtractMalformed(format!(
                "extract in version '{}' has no name",
                self.version
            )));
        }

        let payload_empty = self.haplogroup.trim().is_empty()
            && self.aliases.iter().all(|a| a.trim().is_empty())
            && self.reference_id.is_none()
            && self.positions.is_empty()
            && self.mutation.as_deref().map_or(true, |m| m.trim().is_empty());
        if payload_empty {
            return Err(ReconcileError::ExtractMalformed(format!(
                "extract '{}' in version '{}' carries no payload",
                self.name, self.version
            )));
        }

        Ok(())
    }
}

/// Sort key giving archive version labels their chronological order.
///
/// Labels start with a year (`2006`, `2019-2020`); the leading number orders them and
/// the full label breaks ties. Labels without a leading number sort first.
pub fn chronological_key(label: &str) -> (u32, &str) {
    let digits: String = label.trim().chars().take_while(|c| c.is_ascii_digit()).collect();
    (digits.parse().unwrap_or(0), label)
}

pub fn compare_versions(a: &str, b: &str) -> Ordering {
    chronological_key(a).cmp(&chronological_key(b))
}
