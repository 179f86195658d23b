#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Model-backed evaluation of student answers and in-session replies.
//!
//! The [`Evaluator`] trait covers the two judgment calls the pipeline makes:
//! grading a first attempt, and classifying a student's reply to a probe.
//! [`OpenAiEvaluator`] is the production implementation; tests substitute
//! scripted doubles.

use anyhow::anyhow;
use async_openai::{
    Client as OpenAIClient,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::{
    config,
    grade::results::{Confidence, Verdict},
    types::{Exchange, Question, Response},
};

/// Temperature used when the environment does not override it.
const DEFAULT_TEMPERATURE: f32 = 0.6;

/// Failures surfaced by an [`Evaluator`] implementation.
#[derive(Debug, Error)]
pub enum EvaluatorError {
    /// The backing model call failed outright.
    #[error("evaluation backend failure: {0}")]
    Backend(anyhow::Error),
    /// The model replied, but the payload could not be interpreted.
    #[error("unusable evaluation payload: {detail}")]
    UnusablePayload {
        /// Parser description of what went wrong.
        detail: String,
    },
}

impl From<anyhow::Error> for EvaluatorError {
    fn from(err: anyhow::Error) -> Self {
        Self::Backend(err)
    }
}

/// Model judgment of a first attempt, before the grader folds it into an
/// immutable grading result.
#[derive(Debug, Clone, Deserialize)]
pub struct Evaluation {
    /// Verdict on the first attempt.
    pub verdict:        Verdict,
    /// Model-reported confidence in the verdict.
    #[serde(default)]
    pub confidence:     Confidence,
    /// Concepts the model saw at play in the answer.
    #[serde(default)]
    pub concept_tags:   Vec<String>,
    /// Misconceptions detected in the answer.
    #[serde(default)]
    pub misconceptions: Vec<String>,
    /// Reasoning steps the answer skipped or garbled.
    #[serde(default)]
    pub missing_steps:  Vec<String>,
    /// Short explanation of the verdict.
    #[serde(default)]
    pub rationale:      String,
    /// Optional nudge to offer the student before probing.
    #[serde(default)]
    pub hint:           Option<String>,
}

/// Classification of a student's reply to a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyAssessment {
    /// The student reached the correct understanding.
    ResolvedCorrect,
    /// The student acknowledged the gap without fully correcting it.
    ResolvedIncorrect,
    /// The student is still working toward the idea.
    Continue,
}

/// Judgment calls made against student work.
///
/// Implementations must be safe to share across the run; the pipeline holds
/// one evaluator and reuses it for every question.
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Grades a first attempt against the question's reference answer.
    async fn evaluate(
        &self,
        question: &Question,
        response: &Response,
    ) -> Result<Evaluation, EvaluatorError>;

    /// Classifies the latest reply in `exchanges`, with earlier exchanges as
    /// context. Callers pass at least one exchange.
    async fn assess_reply(
        &self,
        question: &Question,
        response: &Response,
        exchanges: &[Exchange],
    ) -> Result<ReplyAssessment, EvaluatorError>;
}

/// Wire payload returned by the reply-classification call.
#[derive(Debug, Deserialize)]
struct AssessmentPayload {
    /// Classification of the latest student reply.
    assessment: ReplyAssessment,
    /// Short justification, logged for debugging.
    #[serde(default)]
    rationale:  String,
}

/// Evaluator backed by an OpenAI-compatible chat-completion endpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiEvaluator;

impl OpenAiEvaluator {
    /// Creates a new evaluator; credentials are read from configuration at
    /// call time.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Evaluator for OpenAiEvaluator {
    async fn evaluate(
        &self,
        question: &Question,
        response: &Response,
    ) -> Result<Evaluation, EvaluatorError> {
        let prompts = config::prompts();
        let messages =
            build_messages(prompts.evaluation_system(), question_block(question, response))?;
        let payload = complete(messages).await?;
        parse_payload::<Evaluation>(&payload)
    }

    async fn assess_reply(
        &self,
        question: &Question,
        response: &Response,
        exchanges: &[Exchange],
    ) -> Result<ReplyAssessment, EvaluatorError> {
        if exchanges.is_empty() {
            return Err(EvaluatorError::Backend(anyhow!("no exchange to assess")));
        }

        let prompts = config::prompts();
        let messages = build_messages(
            prompts.assessment_system(),
            assessment_block(question, response, exchanges),
        )?;
        let payload = complete(messages).await?;
        let parsed = parse_payload::<AssessmentPayload>(&payload)?;
        debug!("reply assessment rationale: {}", parsed.rationale);
        Ok(parsed.assessment)
    }
}

/// Builds a chat client from the configured OpenAI environment.
fn chat_client(openai: &config::OpenAiEnv) -> OpenAIClient<OpenAIConfig> {
    OpenAIClient::with_config(
        OpenAIConfig::new()
            .with_api_base(openai.api_base())
            .with_api_key(openai.api_key()),
    )
}

/// Builds the system-plus-user message pair shared by both evaluator calls.
fn build_messages(
    system: &str,
    user: String,
) -> Result<Vec<ChatCompletionRequestMessage>, EvaluatorError> {
    Ok(vec![
        ChatCompletionRequestSystemMessageArgs::default()
            .content(system.to_string())
            .build()
            .map_err(|e| EvaluatorError::Backend(e.into()))?
            .into(),
        ChatCompletionRequestUserMessageArgs::default()
            .content(user)
            .build()
            .map_err(|e| EvaluatorError::Backend(e.into()))?
            .into(),
    ])
}

/// Sends a chat request and returns the first completion's content.
async fn complete(messages: Vec<ChatCompletionRequestMessage>) -> Result<String, EvaluatorError> {
    let openai = config::openai_config()
        .ok_or_else(|| EvaluatorError::Backend(anyhow!("OpenAI environment not configured")))?;
    let client = chat_client(&openai);

    let mut args = CreateChatCompletionRequestArgs::default();
    args.model(openai.model())
        .messages(messages)
        .temperature(openai.temperature().unwrap_or(DEFAULT_TEMPERATURE));
    if let Some(top_p) = openai.top_p() {
        args.top_p(top_p);
    }
    let request = args.build().map_err(|e| EvaluatorError::Backend(e.into()))?;

    let response = client
        .chat()
        .create(request)
        .await
        .map_err(|e| EvaluatorError::Backend(e.into()))?;

    response
        .choices
        .first()
        .and_then(|choice| choice.message.content.clone())
        .ok_or_else(|| EvaluatorError::UnusablePayload {
            detail: "completion contained no content".to_string(),
        })
}

/// Renders the question, reference answer, and first attempt as prompt
/// Markdown.
fn question_block(question: &Question, response: &Response) -> String {
    let mut block = String::new();
    block.push_str("## Question\n\n");
    block.push_str(&question.prompt);
    block.push_str("\n\n## Reference Answer\n\n");
    block.push_str(&question.expected_answer);
    block.push_str("\n\n## Student Answer\n\n");
    block.push_str(&response.answer);
    block.push('\n');

    if !question.concept_tags.is_empty() {
        block.push_str("\n## Concepts Under Test\n\n");
        for tag in &question.concept_tags {
            block.push_str(&format!("- {}\n", tag));
        }
    }

    block
}

/// Renders the question plus the probe/reply history for classification.
fn assessment_block(question: &Question, response: &Response, exchanges: &[Exchange]) -> String {
    let mut block = question_block(question, response);
    block.push_str("\n## Follow-up Exchanges\n\n");
    for exchange in exchanges {
        block.push_str(&format!("**Tutor:** {}\n\n", exchange.probe));
        block.push_str(&format!("**Student:** {}\n\n", exchange.reply));
    }
    block.push_str("Classify the student's latest reply.\n");
    block
}

/// Parses a JSON payload out of a model reply, tolerating Markdown fences and
/// surrounding prose.
fn parse_payload<T: serde::de::DeserializeOwned>(payload: &str) -> Result<T, EvaluatorError> {
    let candidate = strip_fence(payload);
    match serde_json::from_str(candidate) {
        Ok(value) => Ok(value),
        Err(first_err) => {
            if let Some(object) = extract_object(candidate)
                && let Ok(value) = serde_json::from_str(object)
            {
                return Ok(value);
            }
            Err(EvaluatorError::UnusablePayload {
                detail: first_err.to_string(),
            })
        }
    }
}

/// Strips a surrounding Markdown code fence from a model payload, if present.
fn strip_fence(payload: &str) -> &str {
    let trimmed = payload.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    match rest.trim_end().strip_suffix("```") {
        Some(inner) => inner.trim(),
        None => trimmed,
    }
}

/// Returns the outermost brace-delimited slice of `payload`, if any.
fn extract_object(payload: &str) -> Option<&str> {
    let start = payload.find('{')?;
    let end = payload.rfind('}')?;
    (end >= start).then(|| &payload[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_json_payload() {
        let payload = r#"{"verdict": "correct", "rationale": "Matches the reference."}"#;
        let evaluation: Evaluation = parse_payload(payload).unwrap();
        assert_eq!(evaluation.verdict, Verdict::Correct);
        assert_eq!(evaluation.confidence, Confidence::Low);
        assert!(evaluation.concept_tags.is_empty());
    }

    #[test]
    fn parses_fenced_json_payload() {
        let payload = "```json\n{\"verdict\": \"partially_correct\", \"confidence\": \
                       \"high\", \"concept_tags\": [\"newtons-second-law\"]}\n```";
        let evaluation: Evaluation = parse_payload(payload).unwrap();
        assert_eq!(evaluation.verdict, Verdict::PartiallyCorrect);
        assert_eq!(evaluation.confidence, Confidence::High);
        assert_eq!(evaluation.concept_tags, vec!["newtons-second-law"]);
    }

    #[test]
    fn recovers_json_embedded_in_prose() {
        let payload = "Here is my assessment:\n{\"assessment\": \"continue\"}\nLet me know.";
        let parsed: AssessmentPayload = parse_payload(payload).unwrap();
        assert_eq!(parsed.assessment, ReplyAssessment::Continue);
    }

    #[test]
    fn rejects_unparseable_payload() {
        let err = parse_payload::<Evaluation>("the student is basically right").unwrap_err();
        assert!(matches!(err, EvaluatorError::UnusablePayload { .. }));
    }

    #[test]
    fn assessment_labels_use_snake_case() {
        let parsed: AssessmentPayload =
            parse_payload(r#"{"assessment": "resolved_incorrect", "rationale": "gave up"}"#)
                .unwrap();
        assert_eq!(parsed.assessment, ReplyAssessment::ResolvedIncorrect);
    }

    #[test]
    fn question_block_lists_concept_tags() {
        let question = Question {
            id:              "q1".to_string(),
            prompt:          "Why does the ball slow down?".to_string(),
            expected_answer: "Friction acts against the motion.".to_string(),
            concept_tags:    vec!["friction".to_string()],
        };
        let response = Response {
            question_id: "q1".to_string(),
            answer:      "Because it runs out of force.".to_string(),
        };
        let block = question_block(&question, &response);
        assert!(block.contains("## Concepts Under Test"));
        assert!(block.contains("- friction"));
    }
}
