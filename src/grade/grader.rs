#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! First-attempt grading.
//!
//! [`Grader`] hands one (question, response) pair to an evaluator, folds the
//! judgment into an immutable [`GradingResult`], and owns the concept-tag
//! merge along the way.

use std::time::Duration;

use bon::Builder;
use itertools::Itertools;
use thiserror::Error;
use tokio::time::timeout;
use tracing::info;

use super::results::GradingResult;
use crate::{
    config,
    evaluate::{Evaluator, EvaluatorError},
    types::{Question, Response},
};

/// Fallback rationale when the evaluator returns none.
const NO_RATIONALE: &str = "No rationale provided.";

/// Failures surfaced while grading a first attempt.
#[derive(Debug, Error)]
pub enum GraderError {
    /// The response does not belong to the question being graded.
    #[error("response for question {actual} cannot be graded against question {expected}")]
    QuestionMismatch {
        /// Identifier of the question under grade.
        expected: String,
        /// Identifier the response claims to answer.
        actual:   String,
    },
    /// The evaluator failed or returned an unusable judgment.
    #[error("evaluation failed: {0}")]
    Evaluation(#[from] EvaluatorError),
    /// The evaluation call exceeded its time budget.
    #[error("evaluation timed out after {limit:?}")]
    Timeout {
        /// The time budget that was exceeded.
        limit: Duration,
    },
}

/// Grades one student response against its question.
#[derive(Clone, Builder)]
#[builder(on(String, into))]
pub struct Grader {
    /// The question under grade.
    #[builder(getter)]
    question: Question,
    /// The student's first attempt at the question.
    #[builder(getter)]
    response: Response,
    /// Time budget for the evaluation call; defaults to the configured
    /// evaluation timeout.
    timeout:  Option<Duration>,
}

impl Grader {
    /// Runs the grader against `evaluator` and returns the grading result.
    pub async fn run(self, evaluator: &dyn Evaluator) -> Result<GradingResult, GraderError> {
        if self.response.question_id != self.question.id {
            return Err(GraderError::QuestionMismatch {
                expected: self.question.id.clone(),
                actual:   self.response.question_id.clone(),
            });
        }

        info!("Grading first attempt for question {}", self.question.id);

        let limit = self.timeout.unwrap_or_else(config::session_eval_timeout);
        let evaluation = timeout(limit, evaluator.evaluate(&self.question, &self.response))
            .await
            .map_err(|_| GraderError::Timeout { limit })??;

        let concept_tags = self
            .question
            .concept_tags
            .iter()
            .chain(evaluation.concept_tags.iter())
            .unique()
            .cloned()
            .collect::<Vec<_>>();

        let rationale = if evaluation.rationale.trim().is_empty() {
            NO_RATIONALE.to_string()
        } else {
            evaluation.rationale
        };

        Ok(GradingResult::builder()
            .question_id(self.question.id)
            .verdict(evaluation.verdict)
            .confidence(evaluation.confidence)
            .concept_tags(concept_tags)
            .misconceptions(evaluation.misconceptions)
            .missing_steps(evaluation.missing_steps)
            .rationale(rationale)
            .maybe_hint(evaluation.hint)
            .build())
    }
}
