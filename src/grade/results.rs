#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::fmt::Display;

use bon::Builder;
use serde::{Deserialize, Serialize};

/// The grader's classification of a single answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Both the final answer and the reasoning are sound.
    Correct,
    /// The answer shows real understanding but has gaps or errors.
    PartiallyCorrect,
    /// The answer misses the core of the question.
    Incorrect,
}

impl Verdict {
    /// True for the `Correct` verdict.
    pub fn is_correct(self) -> bool {
        matches!(self, Verdict::Correct)
    }
}

impl Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Verdict::Correct => "Correct",
            Verdict::PartiallyCorrect => "Partially correct",
            Verdict::Incorrect => "Incorrect",
        };
        write!(f, "{s}")
    }
}

/// How certain the evaluation collaborator was about its verdict.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// The response was too ambiguous to judge firmly.
    #[default]
    Low,
    /// Reasonable certainty with some ambiguity.
    Medium,
    /// Clear-cut evaluation.
    High,
}

impl Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        };
        write!(f, "{s}")
    }
}

/// One question's grading outcome. Created once by the grader and never
/// mutated afterward; a feedback session records its own summary separately.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(on(String, into))]
pub struct GradingResult {
    /// Identifier of the graded question.
    #[builder(getter)]
    pub question_id:    String,
    /// The verdict on the student's first attempt.
    #[builder(getter)]
    pub verdict:        Verdict,
    /// The collaborator's confidence in that verdict.
    #[builder(default)]
    #[builder(getter)]
    pub confidence:     Confidence,
    /// Concept tags: the question's own tags plus any the evaluation
    /// surfaced, deduplicated in first-seen order.
    #[builder(default)]
    pub concept_tags:   Vec<String>,
    /// Specific conceptual errors the evaluation identified.
    #[builder(default)]
    pub misconceptions: Vec<String>,
    /// Reasoning or calculation steps the answer omitted.
    #[builder(default)]
    pub missing_steps:  Vec<String>,
    /// Free-text rationale for the verdict.
    #[builder(getter)]
    pub rationale:      String,
    /// Socratic opening question for a feedback session, when one is likely.
    pub hint:           Option<String>,
}

impl GradingResult {
    /// True when the first attempt needs no feedback session.
    pub fn is_correct(&self) -> bool {
        self.verdict.is_correct()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_serializes_snake_case() {
        let json = serde_json::to_string(&Verdict::PartiallyCorrect).unwrap();
        assert_eq!(json, "\"partially_correct\"");

        let v: Verdict = serde_json::from_str("\"incorrect\"").unwrap();
        assert_eq!(v, Verdict::Incorrect);
    }

    #[test]
    fn confidence_defaults_to_low() {
        assert_eq!(Confidence::default(), Confidence::Low);
        let c: Confidence = serde_json::from_str("\"high\"").unwrap();
        assert_eq!(c, Confidence::High);
    }

    #[test]
    fn builder_fills_ride_along_defaults() {
        let result = GradingResult::builder()
            .question_id("q1")
            .verdict(Verdict::Correct)
            .rationale("Clean application of the work-energy theorem.")
            .build();

        assert!(result.is_correct());
        assert_eq!(result.confidence, Confidence::Low);
        assert!(result.concept_tags.is_empty());
        assert!(result.hint.is_none());
    }
}
