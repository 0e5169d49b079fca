pub mod types;
pub mod redis;
pub mod config;

// Re-export commonly used types for convenience
pub use types::{
    EvaluationOutcome, EvaluationReport, EvaluationRequest, Language, StructuredFeedback,
    SubmissionStatus, TestCase,
};
pub use config::Config;
