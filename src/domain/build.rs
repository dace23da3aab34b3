use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ReconcileError;

/// Genome assembly generations, oldest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Build {
    B33,
    B34,
    B35,
    B36,
    B37,
    B38,
}

impl Build {
    pub const ALL: [Build; 6] = [
        Build::B33,
        Build::B34,
        Build::B35,
        Build::B36,
        Build::B37,
        Build::B38,
    ];

    /// NCBI build number
    pub fn number(&self) -> u8 {
        match self {
            Build::B33 => 33,
            Build::B34 => 34,
            Build::B35 => 35,
            Build::B36 => 36,
            Build::B37 => 37,
            Build::B38 => 38,
        }
    }

    /// UCSC assembly name, used for chain file naming
    pub fn ucsc_name(&self) -> &'static str {
        match self {
            Build::B33 => "hg15",
            Build::B34 => "hg16",
            Build::B35 => "hg17",
            Build::B36 => "hg18",
            Build::B37 => "hg19",
            Build::B38 => "hg38",
        }
    }

    /// Builds reachable from `self` with a single direct transform.
    ///
    /// Neighbour order is significant: the harmonizer explores hops in this order,
    /// so it fixes which route wins when two routes are equally short.
    pub fn direct_targets(&self) -> &'static [Build] {
        match self {
            Build::B33 => &[Build::B35],
            Build::B34 => &[Build::B35],
            Build::B35 => &[Build::B36, Build::B34, Build::B33],
            Build::B36 => &[Build::B37, Build::B38, Build::B35],
            Build::B37 => &[Build::B36],
            Build::B38 => &[Build::B36],
        }
    }

    pub fn has_direct_transform(&self, target: Build) -> bool {
        self.direct_targets().contains(&target)
    }

    /// Every (source, target) pair with a direct transform, in a stable order
    pub fn direct_pairs() -> Vec<(Build, Build)> {
        Build::ALL
            .iter()
            .flat_map(|source| source.direct_targets().iter().map(move |target| (*source, *target)))
            .collect()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Build::B33 => "B33",
            Build::B34 => "B34",
            Build::B35 => "B35",
            Build::B36 => "B36",
            Build::B37 => "B37",
            Build::B38 => "B38",
        }
    }
}

impl fmt::Display for Build {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Build {
    type Err = ReconcileError;

    /// Accepts `B36`, `36`, `build36`, `Build 36`, `NCBI36`, `hg18`, `GRCh37` and friends.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered: String = s
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
            .collect();

        let by_ucsc = match lowered.as_str() {
            "hg15" => Some(Build::B33),
            "hg16" => Some(Build::B34),
            "hg17" => Some(Build::B35),
            "hg18" => Some(Build::B36),
            "hg19" | "grch37" => Some(Build::B37),
            "hg38" | "grch38" => Some(Build::B38),
            _ => None,
        };
        if let Some(build) = by_ucsc {
            return Ok(build);
        }

        let digits = lowered
            .strip_prefix("build")
            .or_else(|| lowered.strip_prefix("ncbi"))
            .or_else(|| lowered.strip_prefix('b'))
            .unwrap_or(lowered.as_str());

        match digits {
            "33" => Ok(Build::B33),
            "34" => Ok(Build::B34),
            "35" => Ok(Build::B35),
            "36" => Ok(Build::B36),
            "37" => Ok(Build::B37),
            "38" => Ok(Build::B38),
            _ => Err(ReconcileError::UnknownBuild(s.to_string())),
        }
    }
}

impl TryFrom<String> for Build {
    type Error = ReconcileError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Build> for String {
    fn from(build: Build) -> Self {
        build.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_common_spellings() {
        assert_eq!("B36".parse::<Build>().unwrap(), Build::B36);
        assert_eq!("36".parse::<Build>().unwrap(), Build::B36);
        assert_eq!("Build 37".parse::<Build>().unwrap(), Build::B37);
        assert_eq!("hg18".parse::<Build>().unwrap(), Build::B36);
        assert_eq!("GRCh38".parse::<Build>().unwrap(), Build::B38);
        assert_eq!("NCBI35".parse::<Build>().unwrap(), Build::B35);
        assert!("hg99".parse::<Build>().is_err());
    }

    #[test]
    fn test_adjacency_is_symmetric() {
        for (source, target) in Build::direct_pairs() {
            assert!(
                target.has_direct_transform(source),
                "{} -> {} has no reverse transform",
                source,
                target
            );
        }
        assert_eq!(Build::direct_pairs().len(), 10);
        assert!(!Build::B37.has_direct_transform(Build::B38));
    }

    #[test]
    fn test_serializes_as_map_key() {
        let mut positions = std::collections::BTreeMap::new();
        positions.insert(Build::B37, 2_887_824u64);
        let json = serde_json::to_string(&positions).unwrap();
        assert_eq!(json, r#"{"B37":2887824}"#);

        let parsed: std::collections::BTreeMap<Build, u64> =
            serde_json::from_str(r#"{"hg19": 5, "38": 7}"#).unwrap();
        assert_eq!(parsed.get(&Build::B37), Some(&5));
        assert_eq!(parsed.get(&Build::B38), Some(&7));
    }
}
