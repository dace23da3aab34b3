use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ReconcileError, Result};

/// Per-extract processing state. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractState {
    Unseen,
    MatchAttempted,
    Attached,
    Created,
    Merged,
    Rejected,
}

impl ExtractState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExtractState::Merged | ExtractState::Rejected)
    }

    fn allows(&self, next: ExtractState) -> bool {
        use ExtractState::*;
        matches!(
            (self, next),
            (Unseen, MatchAttempted)
                | (Unseen, Rejected)
                | (MatchAttempted, Attached)
                | (MatchAttempted, Created)
                | (MatchAttempted, Rejected)
                | (Attached, Merged)
                | (Created, Merged)
        )
    }

    pub fn advance(self, next: ExtractState) -> Result<ExtractState> {
        if self.allows(next) {
            Ok(next)
        } else {
            Err(ReconcileError::InvalidTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl fmt::Display for ExtractState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExtractState::Unseen => "unseen",
            ExtractState::MatchAttempted => "match_attempted",
            ExtractState::Attached => "attached",
            ExtractState::Created => "created",
            ExtractState::Merged => "merged",
            ExtractState::Rejected => "rejected",
        };
        write!(f, "{}", name)
    }
}
