use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

use crate::constants::VENDOR_PREFIX;

static NUMERIC_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"[._]\d+$").expect("valid regex"));

/// Produces the comparison variants of a marker name.
///
/// Pure and total: the same name always yields the same set, and the set always
/// contains the name itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct NameNormalizer;

impl NameNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Drop a trailing `.N` / `_N` numeric suffix (`M269.1` -> `M269`).
    pub fn strip_suffix(name: &str) -> &str {
        match NUMERIC_SUFFIX.find(name) {
            Some(m) if m.start() > 0 => &name[..m.start()],
            _ => name,
        }
    }

    pub fn variants(&self, name: &str) -> BTreeSet<String> {
        let name = name.trim();
        let mut variants = BTreeSet::new();
        if name.is_empty() {
            return variants;
        }

        let mut bases = vec![name];
        let stripped = Self::strip_suffix(name);
        if stripped != name {
            bases.push(stripped);
        }

        for base in bases {
            variants.insert(base.to_string());
            if is_numeric_name(base) {
                variants.insert(format!("{}{}", VENDOR_PREFIX, base));
            }
            if let Some(bare) = base.strip_prefix(VENDOR_PREFIX) {
                if !bare.is_empty() {
                    variants.insert(bare.to_string());
                }
            }
        }

        variants
    }
}

/// `12345` or `12345-6`: digits, optionally separated by dashes, starting with a digit.
fn is_numeric_name(name: &str) -> bool {
    name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_digit() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variants(name: &str) -> Vec<String> {
        NameNormalizer::new().variants(name).into_iter().collect()
    }

    #[test]
    fn test_strips_numeric_suffixes() {
        assert_eq!(variants("M269.1"), vec!["M269", "M269.1"]);
        assert_eq!(variants("P312_2"), vec!["P312", "P312_2"]);
        assert_eq!(variants("L21"), vec!["L21"]);
    }

    #[test]
    fn test_vendor_prefix_round_trip() {
        assert_eq!(variants("21355"), vec!["21355", "IMS-JST21355"]);
        assert_eq!(variants("IMS-JST021354"), vec!["021354", "IMS-JST021354"]);
    }

    #[test]
    fn test_suffix_and_prefix_combined() {
        let v = variants("IMS-JST12.1");
        assert!(v.contains(&"IMS-JST12".to_string()));
        assert!(v.contains(&"12".to_string()));
        assert!(v.contains(&"IMS-JST12.1".to_string()));
    }

    #[test]
    fn test_suffix_only_name_is_kept() {
        assert_eq!(NameNormalizer::strip_suffix(".1"), ".1");
        assert!(variants("").is_empty());
    }
}
