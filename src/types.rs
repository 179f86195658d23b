#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Question and response model, plus ingestion of the question file.
//!
//! The expected input is JSON with either a bare array of question objects at
//! the root or an object carrying a `questions` array. Field names accept the
//! aliases used by earlier question banks (`question_text`,
//! `reference_answer`, `student_answer`, `concepts`).

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// A question as loaded from the question file. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    /// Identifier unique within the question file.
    pub id:              String,
    /// The prompt shown to the student.
    pub prompt:          String,
    /// Canonical answer or rubric the response is judged against.
    pub expected_answer: String,
    /// Concept tags associated with the question by its author.
    pub concept_tags:    Vec<String>,
}

/// A student's submitted answer to one question. Immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Identifier of the question this response answers.
    pub question_id: String,
    /// The student's answer text.
    pub answer:      String,
}

/// One completed probe/reply exchange inside a feedback session. Collaborators
/// receive the history as a slice of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    /// The tutor probe shown to the student.
    pub probe: String,
    /// The student's reply to that probe.
    pub reply: String,
}

/// Raw question-file element before validation. All fields optional so that
/// a single malformed element reports what is missing instead of failing the
/// whole file.
#[derive(Debug, Clone, Default, Deserialize)]
struct RawEntry {
    /// Question identifier.
    #[serde(default, alias = "id")]
    question_id:      Option<serde_json::Value>,
    /// Prompt text.
    #[serde(default, alias = "question_text")]
    prompt:           Option<serde_json::Value>,
    /// Canonical answer or rubric.
    #[serde(default, alias = "reference_answer", alias = "rubric")]
    expected_answer:  Option<serde_json::Value>,
    /// Student answer text.
    #[serde(default, alias = "student_answer")]
    student_response: Option<serde_json::Value>,
    /// Optional concept tags.
    #[serde(default, alias = "concepts")]
    concept_tags:     Option<Vec<String>>,
}

/// The two accepted root shapes of a question file.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum QuestionFile {
    /// Root is a bare array of question objects.
    Bare(Vec<serde_json::Value>),
    /// Root is an object with a `questions` array.
    Wrapped {
        /// The question objects.
        questions: Vec<serde_json::Value>,
    },
}

/// Errors produced while loading and validating the question file.
#[derive(Debug, Error)]
pub enum InputError {
    /// A required field is missing or empty in one element.
    #[error("element {index}: missing or empty required field `{field}`")]
    MalformedInput {
        /// Zero-based position of the element in the file.
        index: usize,
        /// Name of the offending field.
        field: &'static str,
    },
    /// An element is not a JSON object at all.
    #[error("element {index}: expected a JSON object, found {found}")]
    NotAnObject {
        /// Zero-based position of the element in the file.
        index: usize,
        /// Short description of what was found instead.
        found: String,
    },
}

impl InputError {
    /// Zero-based input position of the element this error describes.
    pub fn index(&self) -> usize {
        match self {
            InputError::MalformedInput { index, .. } => *index,
            InputError::NotAnObject { index, .. } => *index,
        }
    }
}

/// An input element that failed validation, as surfaced in the report.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedEntry {
    /// Zero-based position of the element in the file.
    pub index:  usize,
    /// Human-readable reason the element was skipped.
    pub reason: String,
}

/// Everything the loader produced from one question file: the well-formed
/// pairs in file order, and the elements it had to skip.
#[derive(Debug, Clone, Default)]
pub struct QuestionSet {
    /// Validated (question, response) pairs in input order.
    pub pairs:   Vec<(Question, Response)>,
    /// Elements skipped as malformed, in input order.
    pub skipped: Vec<SkippedEntry>,
}

impl QuestionSet {
    /// Number of well-formed pairs.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// True when no well-formed pair was loaded.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Reads and validates a question file from disk.
pub fn load_question_file(path: &Path) -> Result<QuestionSet> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Could not read question file {}", path.display()))?;
    let set = parse_question_set(&raw)
        .with_context(|| format!("Could not parse question file {}", path.display()))?;

    info!(
        "Loaded {} valid question(s) out of {} from {}",
        set.pairs.len(),
        set.pairs.len() + set.skipped.len(),
        path.display()
    );

    Ok(set)
}

/// Parses question-file JSON, validating each element independently so one
/// malformed entry never takes down its neighbours.
pub fn parse_question_set(raw: &str) -> Result<QuestionSet> {
    let file: QuestionFile = serde_json::from_str(raw)
        .context("Question file root must be an array or an object with a `questions` array")?;

    let elements = match file {
        QuestionFile::Bare(elements) => elements,
        QuestionFile::Wrapped { questions } => questions,
    };

    let mut set = QuestionSet::default();
    for (index, element) in elements.into_iter().enumerate() {
        match validate_entry(index, element) {
            Ok(pair) => set.pairs.push(pair),
            Err(e) => {
                warn!("Skipping question file element: {}", e);
                set.skipped.push(SkippedEntry {
                    index,
                    reason: e.to_string(),
                });
            }
        }
    }

    Ok(set)
}

/// Validates one raw element into a (question, response) pair.
fn validate_entry(
    index: usize,
    element: serde_json::Value,
) -> Result<(Question, Response), InputError> {
    if !element.is_object() {
        return Err(InputError::NotAnObject {
            index,
            found: json_kind(&element).to_string(),
        });
    }

    let entry: RawEntry = serde_json::from_value(element).map_err(|_| InputError::NotAnObject {
        index,
        found: "an unreadable object".to_string(),
    })?;

    let id = require_string(index, "question_id", entry.question_id)?;
    let prompt = require_string(index, "prompt", entry.prompt)?;
    let expected_answer = require_string(index, "expected_answer", entry.expected_answer)?;
    let answer = require_string(index, "student_response", entry.student_response)?;

    let question = Question {
        id: id.clone(),
        prompt,
        expected_answer,
        concept_tags: entry.concept_tags.unwrap_or_default(),
    };
    let response = Response {
        question_id: id,
        answer,
    };

    Ok((question, response))
}

/// Extracts a required non-empty string field from a raw value.
fn require_string(
    index: usize,
    field: &'static str,
    value: Option<serde_json::Value>,
) -> Result<String, InputError> {
    match value {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Ok(s),
        _ => Err(InputError::MalformedInput { index, field }),
    }
}

/// Human-readable name for a JSON value's kind.
fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_array_root() {
        let raw = r#"[{
            "question_id": "q1",
            "prompt": "State Newton's second law.",
            "expected_answer": "F = ma",
            "student_response": "Force equals mass times acceleration.",
            "concept_tags": ["Newton's Laws"]
        }]"#;

        let set = parse_question_set(raw).expect("parse");
        assert_eq!(set.pairs.len(), 1);
        assert!(set.skipped.is_empty());

        let (question, response) = &set.pairs[0];
        assert_eq!(question.id, "q1");
        assert_eq!(question.concept_tags, vec!["Newton's Laws".to_string()]);
        assert_eq!(response.question_id, "q1");
    }

    #[test]
    fn parses_wrapped_root() {
        let raw = r#"{"questions": [{
            "question_id": "q1",
            "prompt": "p",
            "expected_answer": "e",
            "student_response": "s"
        }]}"#;

        let set = parse_question_set(raw).expect("parse");
        assert_eq!(set.pairs.len(), 1);
        assert!(set.pairs[0].0.concept_tags.is_empty());
    }

    #[test]
    fn accepts_legacy_field_aliases() {
        let raw = r#"[{
            "question_id": "q1",
            "question_text": "p",
            "reference_answer": "e",
            "student_answer": "s",
            "concepts": ["kinematics"]
        }]"#;

        let set = parse_question_set(raw).expect("parse");
        assert_eq!(set.pairs.len(), 1);
        assert_eq!(set.pairs[0].0.prompt, "p");
        assert_eq!(set.pairs[0].0.expected_answer, "e");
        assert_eq!(set.pairs[0].1.answer, "s");
    }

    #[test]
    fn malformed_element_is_skipped_not_fatal() {
        let raw = r#"[
            {"question_id": "q1", "prompt": "p", "expected_answer": "e", "student_response": "s"},
            {"question_id": "q2", "prompt": "p"},
            {"question_id": "q3", "prompt": "p", "expected_answer": "e", "student_response": "s"}
        ]"#;

        let set = parse_question_set(raw).expect("parse");
        assert_eq!(set.pairs.len(), 2);
        assert_eq!(set.skipped.len(), 1);
        assert_eq!(set.skipped[0].index, 1);
        assert!(set.skipped[0].reason.contains("expected_answer"));
    }

    #[test]
    fn empty_string_field_is_malformed() {
        let raw = r#"[{"question_id": "q1", "prompt": "  ", "expected_answer": "e", "student_response": "s"}]"#;

        let set = parse_question_set(raw).expect("parse");
        assert!(set.pairs.is_empty());
        assert_eq!(set.skipped.len(), 1);
        assert!(set.skipped[0].reason.contains("prompt"));
    }

    #[test]
    fn non_object_element_is_skipped() {
        let raw = r#"[42, {"question_id": "q1", "prompt": "p", "expected_answer": "e", "student_response": "s"}]"#;

        let set = parse_question_set(raw).expect("parse");
        assert_eq!(set.pairs.len(), 1);
        assert_eq!(set.skipped.len(), 1);
        assert!(set.skipped[0].reason.contains("number"));
    }

    #[test]
    fn unsupported_root_is_an_error() {
        assert!(parse_question_set("42").is_err());
        assert!(parse_question_set(r#"{"items": []}"#).is_err());
        assert!(parse_question_set("not json").is_err());
    }
}
