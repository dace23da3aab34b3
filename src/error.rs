use thiserror::Error;

use crate::domain::Build;

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Extract feed unavailable at {path}: {reason}")]
    FeedUnavailable { path: String, reason: String },

    #[error("Extract feed out of chronological order: version '{next}' follows '{previous}'")]
    FeedOutOfOrder { previous: String, next: String },

    #[error("Malformed extract: {0}")]
    ExtractMalformed(String),

    #[error("Coordinate transform {source_build}->{target_build} unavailable: {reason}")]
    TransformUnavailable {
        source_build: Build,
        target_build: Build,
        reason: String,
    },

    #[error("Coordinate transform {source_build}->{target_build} timed out after {seconds}s")]
    TransformTimeout {
        source_build: Build,
        target_build: Build,
        seconds: u64,
    },

    #[error("Canonical id '{0}' is already registered")]
    DuplicateCanonicalId(String),

    #[error("Invalid extract state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Unknown genome build: {0}")]
    UnknownBuild(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
