//! Cross-variant comparison reports.

pub mod aggregator;

pub use aggregator::{ComparisonReport, ReportRow, VariantKey};
