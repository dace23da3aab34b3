pub mod coverage_report;
pub mod ports;
pub mod reconcile_use_case;

pub use coverage_report::CoverageReport;
pub use reconcile_use_case::{ReconcileOptions, ReconcileOutcome, ReconcileUseCase};
