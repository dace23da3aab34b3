// Canonical record storage

pub mod registry;

pub use registry::Registry;
