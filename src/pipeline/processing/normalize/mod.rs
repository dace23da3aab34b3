//! Name and label normalization applied before extracts reach the matcher.

mod haplogroup;
mod names;

pub use haplogroup::{parse_haplogroup_label, HaplogroupLabel};
pub use names::NameNormalizer;

use crate::constants::{ALIAS_NOTE_WORDS, REFERENCE_ID_SENTINELS};
use crate::domain::MarkerExtract;

/// Tidy an extract as delivered by the feed: trim text fields, drop sentinel
/// reference ids, editorial notes in alias lists, duplicate aliases and zero positions.
pub fn clean_extract(extract: MarkerExtract) -> MarkerExtract {
    let name = extract.name.trim().to_string();

    let mut aliases: Vec<String> = Vec::with_capacity(extract.aliases.len());
    for alias in extract.aliases.iter().map(|a| a.trim()) {
        if alias.is_empty() || alias == name || is_alias_note(alias) {
            continue;
        }
        if !aliases.iter().any(|a| a == alias) {
            aliases.push(alias.to_string());
        }
    }

    let reference_id = extract
        .reference_id
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty() && !REFERENCE_ID_SENTINELS.contains(&r.to_lowercase().as_str()));

    let mutation = extract
        .mutation
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty());

    let positions = extract.positions.into_iter().filter(|(_, p)| *p > 0).collect();

    MarkerExtract {
        name,
        haplogroup: extract.haplogroup.trim().to_string(),
        aliases,
        reference_id,
        positions,
        mutation,
        version: extract.version.trim().to_string(),
    }
}

fn is_alias_note(alias: &str) -> bool {
    alias.starts_with("to ") || ALIAS_NOTE_WORDS.contains(&alias)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Build;

    #[test]
    fn test_clean_extract_drops_noise() {
        let extract = MarkerExtract::new(" M269 ", "2010")
            .with_haplogroup("R1b1b2 ")
            .with_alias("S3")
            .with_alias("to tree")
            .with_alias("added")
            .with_alias("S3")
            .with_alias("M269")
            .with_alias("")
            .with_reference_id("None")
            .with_mutation("  ")
            .with_position(Build::B36, 0)
            .with_position(Build::B37, 22_739_367);

        let cleaned = clean_extract(extract);
        assert_eq!(cleaned.name, "M269");
        assert_eq!(cleaned.haplogroup, "R1b1b2");
        assert_eq!(cleaned.aliases, vec!["S3".to_string()]);
        assert_eq!(cleaned.reference_id, None);
        assert_eq!(cleaned.mutation, None);
        assert_eq!(cleaned.positions.len(), 1);
        assert_eq!(cleaned.positions.get(&Build::B37), Some(&22_739_367));
    }

    #[test]
    fn test_clean_extract_keeps_real_reference_id() {
        let extract = MarkerExtract::new("M343", "2008").with_reference_id(" rs9786184 ");
        assert_eq!(clean_extract(extract).reference_id.as_deref(), Some("rs9786184"));
    }
}
