//! # viva
//!
//! Grades free-form answers to structured questions and, when an answer
//! misses the mark, runs a bounded interactive feedback session that guides
//! the student toward the correct reasoning before finalizing the grade.

#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Folds per-question outcomes into session-wide analytics
pub mod analytics;
/// Best-effort audit sinks for finished runs
pub mod audit;
/// Runtime configuration, prompt assets, and session parameters
pub mod config;
/// The student-facing side of a feedback session
pub mod dialogue;
/// The language-model evaluation collaborator
pub mod evaluate;
/// For all things related to grading a first attempt
pub mod grade;
/// Environment readiness checks
pub mod health;
/// The end-to-end grading run
pub mod pipeline;
/// Prompt assets embedded in the binary
pub mod prompts;
/// Report assembly and rendering
pub mod report;
/// The feedback session state machine and its runner
pub mod session;
/// Question, response, and input-file loading
pub mod types;
