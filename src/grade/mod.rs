#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// First-attempt grading against the reference answer.
pub mod grader;
/// Shared grading result types.
pub mod results;

pub use grader::{Grader, GraderError};
pub use results::{Confidence, GradingResult, Verdict};
