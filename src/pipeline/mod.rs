// Reconciliation pipeline: processing stages and the canonical store

pub mod processing;
pub mod storage;
