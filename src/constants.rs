/// Naming and file constants shared across the codebase
use crate::domain::Build;

/// Vendor prefix carried by some numeric marker names in later archives
pub const VENDOR_PREFIX: &str = "IMS-JST";

/// Status tag recorded for haplogroup labels ending in `~`
pub const PROVISIONAL_STATUS: &str = "provisional";

/// Alias list entries that are editorial notes rather than names
pub const ALIAS_NOTE_WORDS: [&str; 2] = ["added", "tree"];

/// Reference-id values the archives use to mean "none"
pub const REFERENCE_ID_SENTINELS: [&str; 2] = ["none", "n/a"];

// Default file locations (relative to the working directory)
pub const DEFAULT_FEED_DIR: &str = "extracts";
pub const DEFAULT_CHAIN_DIR: &str = "chains";
pub const DEFAULT_LIFTOVER_BINARY: &str = "liftOver";
pub const DEFAULT_CHROMOSOME: &str = "chrY";
pub const DEFAULT_OUTPUT_PATH: &str = "output/canonical_markers.tsv";
pub const DEFAULT_REPORT_PATH: &str = "output/coverage_report.json";
pub const DEFAULT_LOG_DIR: &str = "logs";

pub const FEED_FILE_EXTENSION: &str = "jsonl";

/// UCSC chain file name for a direct transform, e.g. `hg18ToHg19.over.chain.gz`
pub fn chain_file_name(source: Build, target: Build) -> String {
    let target_name = target.ucsc_name();
    let mut chars = target_name.chars();
    let capitalized = match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    };
    format!("{}To{}.over.chain.gz", source.ucsc_name(), capitalized)
}
