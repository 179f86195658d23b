#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Probe generation and student-reply collection for feedback sessions.
//!
//! [`LiveDialogue`] drives a real session: probes come from the configured
//! chat model, replies from the student's terminal. Tests substitute scripted
//! doubles for both halves.

use std::io::Write;

use anyhow::anyhow;
use async_openai::{
    Client as OpenAIClient,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;
use colored::Colorize;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use crate::{
    config,
    types::{Exchange, Question, Response},
};

/// Inputs a student can type to leave a session early.
const EXIT_KEYWORDS: [&str; 6] = ["exit", "skip", "quit", "done", "stop", "end"];

/// Substitute reply recorded when the student submits an empty line.
const UNSURE_REPLY: &str = "I'm not sure";

/// Note appended to the probe request on the session's last turn.
const FINAL_TURN_NOTE: &str = "This is the final follow-up of the session. Ask one last question \
                               the student can settle in a single reply.";

/// Temperature used when the environment does not override it.
const DEFAULT_TEMPERATURE: f32 = 0.6;

/// True when `text` is one of the recognized exit keywords.
pub fn is_exit_keyword(text: &str) -> bool {
    let normalized = text.trim().to_lowercase();
    EXIT_KEYWORDS.contains(&normalized.as_str())
}

/// A student's turn-level reply, as collected by the dialogue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StudentReply {
    /// The student answered the probe.
    Answer(String),
    /// The student left the session without answering.
    Exited,
}

/// Failures surfaced by a [`Dialogue`] implementation.
#[derive(Debug, Error)]
pub enum DialogueError {
    /// The probe backend or reply channel failed.
    #[error("dialogue backend failure: {0}")]
    Backend(anyhow::Error),
    /// The probe backend returned no usable probe text.
    #[error("dialogue produced an empty probe")]
    EmptyProbe,
}

impl From<anyhow::Error> for DialogueError {
    fn from(err: anyhow::Error) -> Self {
        Self::Backend(err)
    }
}

/// The two halves of a feedback-session turn: producing the next probe, and
/// collecting the student's reply to it.
#[async_trait]
pub trait Dialogue: Send {
    /// Produces the next probe given the question and the exchanges so far.
    /// `final_turn` is true when the session is on its last allowed turn.
    async fn next_probe(
        &mut self,
        question: &Question,
        response: &Response,
        exchanges: &[Exchange],
        final_turn: bool,
    ) -> Result<String, DialogueError>;

    /// Presents `probe` to the student and collects their reply.
    async fn student_reply(&mut self, probe: &str) -> Result<StudentReply, DialogueError>;
}

/// Production dialogue: model-generated probes, terminal-collected replies.
pub struct LiveDialogue {
    /// Line reader over the student's terminal input.
    input: Lines<BufReader<Stdin>>,
}

impl LiveDialogue {
    /// Creates a dialogue reading replies from standard input.
    pub fn new() -> Self {
        Self {
            input: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

impl Default for LiveDialogue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Dialogue for LiveDialogue {
    async fn next_probe(
        &mut self,
        question: &Question,
        response: &Response,
        exchanges: &[Exchange],
        final_turn: bool,
    ) -> Result<String, DialogueError> {
        let prompts = config::prompts();
        let openai = config::openai_config()
            .ok_or_else(|| DialogueError::Backend(anyhow!("OpenAI environment not configured")))?;

        let mut messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(prompts.probe_system().to_string())
                .build()
                .map_err(|e| DialogueError::Backend(e.into()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(context_block(question, response))
                .build()
                .map_err(|e| DialogueError::Backend(e.into()))?
                .into(),
        ];

        for exchange in exchanges {
            messages.push(
                ChatCompletionRequestAssistantMessageArgs::default()
                    .content(exchange.probe.clone())
                    .build()
                    .map_err(|e| DialogueError::Backend(e.into()))?
                    .into(),
            );
            messages.push(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(exchange.reply.clone())
                    .build()
                    .map_err(|e| DialogueError::Backend(e.into()))?
                    .into(),
            );
        }

        if final_turn {
            messages.push(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(FINAL_TURN_NOTE.to_string())
                    .build()
                    .map_err(|e| DialogueError::Backend(e.into()))?
                    .into(),
            );
        }

        let client = OpenAIClient::with_config(
            OpenAIConfig::new()
                .with_api_base(openai.api_base())
                .with_api_key(openai.api_key()),
        );

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(openai.model())
            .messages(messages)
            .temperature(openai.temperature().unwrap_or(DEFAULT_TEMPERATURE));
        if let Some(top_p) = openai.top_p() {
            args.top_p(top_p);
        }
        let request = args.build().map_err(|e| DialogueError::Backend(e.into()))?;

        let response = client
            .chat()
            .create(request)
            .await
            .map_err(|e| DialogueError::Backend(e.into()))?;

        let probe = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .map(|content| content.trim().to_string())
            .unwrap_or_default();

        if probe.is_empty() {
            return Err(DialogueError::EmptyProbe);
        }
        Ok(probe)
    }

    async fn student_reply(&mut self, probe: &str) -> Result<StudentReply, DialogueError> {
        println!();
        println!("{} {}", "Follow-up:".cyan().bold(), probe);
        print!("{} ", "Your answer:".bold());
        std::io::stdout()
            .flush()
            .map_err(|e| DialogueError::Backend(e.into()))?;

        match self.input.next_line().await {
            Ok(Some(line)) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    Ok(StudentReply::Answer(UNSURE_REPLY.to_string()))
                } else {
                    Ok(StudentReply::Answer(trimmed.to_string()))
                }
            }
            Ok(None) => Ok(StudentReply::Exited),
            Err(e) => Err(DialogueError::Backend(e.into())),
        }
    }
}

/// Renders the question and first attempt as the opening tutor context.
fn context_block(question: &Question, response: &Response) -> String {
    let mut block = String::new();
    block.push_str("## Question\n\n");
    block.push_str(&question.prompt);
    block.push_str("\n\n## Reference Answer (never reveal this)\n\n");
    block.push_str(&question.expected_answer);
    block.push_str("\n\n## Student's First Attempt\n\n");
    block.push_str(&response.answer);
    block.push('\n');
    block
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_exit_keywords_case_insensitively() {
        assert!(is_exit_keyword("exit"));
        assert!(is_exit_keyword(" QUIT "));
        assert!(is_exit_keyword("Done"));
        assert!(is_exit_keyword("stop"));
        assert!(is_exit_keyword("skip"));
        assert!(is_exit_keyword("end"));
    }

    #[test]
    fn ordinary_replies_are_not_exits() {
        assert!(!is_exit_keyword("I think friction stops it"));
        assert!(!is_exit_keyword("exits"));
        assert!(!is_exit_keyword("done?"));
        assert!(!is_exit_keyword(""));
    }

    #[test]
    fn context_block_withholds_nothing_but_labels_the_reference() {
        let question = Question {
            id:              "q1".to_string(),
            prompt:          "Why do heavier objects not fall faster?".to_string(),
            expected_answer: "Acceleration under gravity is independent of mass.".to_string(),
            concept_tags:    vec![],
        };
        let response = Response {
            question_id: "q1".to_string(),
            answer:      "Because air resistance evens things out.".to_string(),
        };

        let block = context_block(&question, &response);
        assert!(block.contains("never reveal this"));
        assert!(block.contains("Student's First Attempt"));
    }
}
