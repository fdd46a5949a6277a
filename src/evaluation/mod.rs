//! Comparative quality evaluation of encoded variants.

pub mod evaluator;
pub mod similarity;
pub mod stack;
pub mod summary;

pub use evaluator::{EvaluationOutcome, QualityEvaluator};
pub use similarity::{SimilarityMetric, Ssim};
pub use summary::EvaluationSummary;
