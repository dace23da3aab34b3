use once_cell::sync::Lazy;
use regex::Regex;

use crate::constants::PROVISIONAL_STATUS;

static STATUS_GROUP: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(([^)]+)\)").expect("valid regex"));
static STATUS_STRIP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*\([^)]+\)\s*").expect("valid regex"));

/// A raw haplogroup label split into the clean haplogroup and its status annotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HaplogroupLabel {
    pub haplogroup: String,
    pub status: Option<String>,
}

/// Split `"R1b1a2 (Investigation)"` into `R1b1a2` + `investigation`, and `"I2a~"` into
/// `I2a` + `provisional`.
pub fn parse_haplogroup_label(raw: &str) -> HaplogroupLabel {
    let raw = raw.trim();

    if let Some(caps) = STATUS_GROUP.captures(raw) {
        let status = caps[1].trim().to_lowercase();
        let haplogroup = STATUS_STRIP.replace_all(raw, " ").trim().to_string();
        return HaplogroupLabel {
            haplogroup,
            status: (!status.is_empty()).then_some(status),
        };
    }

    if let Some(stripped) = raw.strip_suffix('~') {
        return HaplogroupLabel {
            haplogroup: stripped.trim_end_matches('~').trim().to_string(),
            status: Some(PROVISIONAL_STATUS.to_string()),
        };
    }

    HaplogroupLabel {
        haplogroup: raw.to_string(),
        status: None,
    }
}
