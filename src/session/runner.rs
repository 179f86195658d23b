#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Turn loop driving a live feedback session.
//!
//! The runner owns the cadence of one session: ask the dialogue for a probe,
//! collect the student's reply, short-circuit exits, and let the evaluator
//! classify everything else. Each collaborator call runs under the session
//! timeout with a single retry per turn; failures that survive the retry fold
//! into the session as an exit or an abort, never a panic.

use std::time::Duration;

use tokio::time::{error::Elapsed, timeout};
use tracing::{info, warn};

use super::state::{FeedbackSession, ReplyClassification, SessionError};
use crate::{
    dialogue::{Dialogue, StudentReply, is_exit_keyword},
    evaluate::{Evaluator, ReplyAssessment},
    types::{Exchange, Question, Response},
};

/// Failure of one collaborator call, after timeout wrapping.
#[derive(Debug)]
enum CallFailure {
    /// The call ran past its budget.
    TimedOut,
    /// The call returned an error.
    Failed(String),
}

impl std::fmt::Display for CallFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallFailure::TimedOut => write!(f, "timed out"),
            CallFailure::Failed(detail) => write!(f, "{}", detail),
        }
    }
}

/// Collapses a timeout-wrapped collaborator result into one failure channel.
fn flatten<T, E: std::fmt::Display>(
    outcome: Result<Result<T, E>, Elapsed>,
) -> Result<T, CallFailure> {
    match outcome {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(CallFailure::Failed(err.to_string())),
        Err(_) => Err(CallFailure::TimedOut),
    }
}

/// Drives one feedback session from begin to a terminal status.
pub struct SessionRunner<'a> {
    /// Judge for in-session replies.
    evaluator: &'a dyn Evaluator,
    /// Probe source and reply channel.
    dialogue:  &'a mut dyn Dialogue,
    /// Turn cap applied to the session.
    max_turns: usize,
    /// Budget for each collaborator call.
    timeout:   Duration,
}

impl<'a> SessionRunner<'a> {
    /// Creates a runner over the given collaborators and limits.
    pub fn new(
        evaluator: &'a dyn Evaluator,
        dialogue: &'a mut dyn Dialogue,
        max_turns: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            evaluator,
            dialogue,
            max_turns,
            timeout,
        }
    }

    /// Runs the session to completion and returns it in a terminal status.
    ///
    /// Collaborator trouble never escapes as an error; the only `Err` here is
    /// a session-machine misuse, which callers treat as fatal.
    pub async fn run(
        mut self,
        question: &Question,
        response: &Response,
    ) -> Result<FeedbackSession, SessionError> {
        let mut session = FeedbackSession::new(question.id.clone(), self.max_turns);
        session.begin()?;
        info!(
            "Starting feedback session for question {} (cap: {} turns)",
            question.id,
            session.max_turns()
        );

        let mut exchanges: Vec<Exchange> = Vec::new();

        while !session.is_terminal() {
            let mut retried = false;
            let final_turn = session.next_turn_is_final();

            let probe = match self
                .probe_with_retry(question, response, &exchanges, final_turn, &mut retried)
                .await
            {
                Ok(probe) => probe,
                Err(failure) => {
                    session.abort(format!("probe generation failed: {}", failure))?;
                    break;
                }
            };

            let reply = match self.reply_with_retry(&probe, &mut retried).await {
                Ok(reply) => reply,
                Err(CallFailure::TimedOut) => {
                    warn!(
                        "No reply within {:?}; treating the session as exited",
                        self.timeout
                    );
                    session.record_turn(probe, None, ReplyClassification::Exited)?;
                    continue;
                }
                Err(failure) => {
                    session.abort(format!("reply collection failed: {}", failure))?;
                    break;
                }
            };

            let text = match reply {
                StudentReply::Exited => {
                    session.record_turn(probe, None, ReplyClassification::Exited)?;
                    continue;
                }
                StudentReply::Answer(text) if is_exit_keyword(&text) => {
                    session.record_turn(probe, None, ReplyClassification::Exited)?;
                    continue;
                }
                StudentReply::Answer(text) => text,
            };

            exchanges.push(Exchange {
                probe: probe.clone(),
                reply: text.clone(),
            });

            let assessment = match self
                .assess_with_retry(question, response, &exchanges, &mut retried)
                .await
            {
                Ok(assessment) => assessment,
                Err(failure) => {
                    session.abort(format!("reply assessment failed: {}", failure))?;
                    break;
                }
            };

            session.record_turn(probe, Some(text), ReplyClassification::from(assessment))?;
        }

        info!(
            "Feedback session for question {} ended: {}",
            question.id,
            session.status()
        );
        Ok(session)
    }

    /// Requests the next probe, retrying once if the turn's retry budget is
    /// unspent.
    async fn probe_with_retry(
        &mut self,
        question: &Question,
        response: &Response,
        exchanges: &[Exchange],
        final_turn: bool,
        retried: &mut bool,
    ) -> Result<String, CallFailure> {
        let first = flatten(
            timeout(
                self.timeout,
                self.dialogue
                    .next_probe(question, response, exchanges, final_turn),
            )
            .await,
        );
        match first {
            Ok(probe) => Ok(probe),
            Err(failure) if !*retried => {
                *retried = true;
                warn!("Retrying probe generation after failure: {}", failure);
                flatten(
                    timeout(
                        self.timeout,
                        self.dialogue
                            .next_probe(question, response, exchanges, final_turn),
                    )
                    .await,
                )
            }
            Err(failure) => Err(failure),
        }
    }

    /// Collects the student's reply, retrying once if the turn's retry budget
    /// is unspent.
    async fn reply_with_retry(
        &mut self,
        probe: &str,
        retried: &mut bool,
    ) -> Result<StudentReply, CallFailure> {
        let first = flatten(timeout(self.timeout, self.dialogue.student_reply(probe)).await);
        match first {
            Ok(reply) => Ok(reply),
            Err(failure) if !*retried => {
                *retried = true;
                warn!("Retrying reply collection after failure: {}", failure);
                flatten(timeout(self.timeout, self.dialogue.student_reply(probe)).await)
            }
            Err(failure) => Err(failure),
        }
    }

    /// Classifies the latest exchange, retrying once if the turn's retry
    /// budget is unspent.
    async fn assess_with_retry(
        &mut self,
        question: &Question,
        response: &Response,
        exchanges: &[Exchange],
        retried: &mut bool,
    ) -> Result<ReplyAssessment, CallFailure> {
        let first = flatten(
            timeout(
                self.timeout,
                self.evaluator.assess_reply(question, response, exchanges),
            )
            .await,
        );
        match first {
            Ok(assessment) => Ok(assessment),
            Err(failure) if !*retried => {
                *retried = true;
                warn!("Retrying reply assessment after failure: {}", failure);
                flatten(
                    timeout(
                        self.timeout,
                        self.evaluator.assess_reply(question, response, exchanges),
                    )
                    .await,
                )
            }
            Err(failure) => Err(failure),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::Mutex,
    };

    use anyhow::anyhow;
    use async_trait::async_trait;

    use super::*;
    use crate::{
        dialogue::DialogueError,
        evaluate::{Evaluation, EvaluatorError},
        session::state::{SessionStatus, TurnOutcome},
    };

    /// Evaluator double serving scripted reply assessments.
    struct ScriptedEvaluator {
        /// Queued assessment outcomes, consumed front to back.
        assessments: Mutex<VecDeque<Result<ReplyAssessment, EvaluatorError>>>,
    }

    impl ScriptedEvaluator {
        fn new(
            assessments: impl IntoIterator<Item = Result<ReplyAssessment, EvaluatorError>>,
        ) -> Self {
            Self {
                assessments: Mutex::new(assessments.into_iter().collect()),
            }
        }

        fn remaining(&self) -> usize {
            self.assessments.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Evaluator for ScriptedEvaluator {
        async fn evaluate(
            &self,
            _question: &Question,
            _response: &Response,
        ) -> Result<Evaluation, EvaluatorError> {
            Err(EvaluatorError::Backend(anyhow!("not scripted")))
        }

        async fn assess_reply(
            &self,
            _question: &Question,
            _response: &Response,
            _exchanges: &[Exchange],
        ) -> Result<ReplyAssessment, EvaluatorError> {
            self.assessments
                .lock()
                .unwrap()
                .pop_front()
                .expect("assessment script exhausted")
        }
    }

    /// Dialogue double serving scripted probes and replies.
    struct ScriptedDialogue {
        /// Queued probe outcomes.
        probes:  VecDeque<Result<String, DialogueError>>,
        /// Queued reply outcomes.
        replies: VecDeque<Result<StudentReply, DialogueError>>,
    }

    impl ScriptedDialogue {
        fn new(
            probes: impl IntoIterator<Item = Result<String, DialogueError>>,
            replies: impl IntoIterator<Item = Result<StudentReply, DialogueError>>,
        ) -> Self {
            Self {
                probes:  probes.into_iter().collect(),
                replies: replies.into_iter().collect(),
            }
        }
    }

    #[async_trait]
    impl Dialogue for ScriptedDialogue {
        async fn next_probe(
            &mut self,
            _question: &Question,
            _response: &Response,
            _exchanges: &[Exchange],
            _final_turn: bool,
        ) -> Result<String, DialogueError> {
            self.probes.pop_front().expect("probe script exhausted")
        }

        async fn student_reply(&mut self, _probe: &str) -> Result<StudentReply, DialogueError> {
            self.replies.pop_front().expect("reply script exhausted")
        }
    }

    /// Dialogue double whose replies never arrive.
    struct SilentDialogue;

    #[async_trait]
    impl Dialogue for SilentDialogue {
        async fn next_probe(
            &mut self,
            _question: &Question,
            _response: &Response,
            _exchanges: &[Exchange],
            _final_turn: bool,
        ) -> Result<String, DialogueError> {
            Ok("What force acts on the ball?".to_string())
        }

        async fn student_reply(&mut self, _probe: &str) -> Result<StudentReply, DialogueError> {
            std::future::pending().await
        }
    }

    fn question() -> Question {
        Question {
            id:              "q1".to_string(),
            prompt:          "Why does the ball slow down?".to_string(),
            expected_answer: "Friction acts against the motion.".to_string(),
            concept_tags:    vec!["friction".to_string()],
        }
    }

    fn response() -> Response {
        Response {
            question_id: "q1".to_string(),
            answer:      "It runs out of force.".to_string(),
        }
    }

    fn answer(text: &str) -> Result<StudentReply, DialogueError> {
        Ok(StudentReply::Answer(text.to_string()))
    }

    fn probe(text: &str) -> Result<String, DialogueError> {
        Ok(text.to_string())
    }

    const LIMIT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn resolves_after_guided_turns() {
        let evaluator = ScriptedEvaluator::new([
            Ok(ReplyAssessment::Continue),
            Ok(ReplyAssessment::ResolvedCorrect),
        ]);
        let mut dialogue = ScriptedDialogue::new(
            [probe("What slows it?"), probe("And what causes that?")],
            [answer("something pushes back"), answer("friction with the ground")],
        );

        let session = SessionRunner::new(&evaluator, &mut dialogue, 3, LIMIT)
            .run(&question(), &response())
            .await
            .unwrap();

        assert_eq!(session.status(), SessionStatus::ResolvedCorrect);
        assert_eq!(session.turns_used(), 2);
        assert_eq!(session.turns()[0].outcome, TurnOutcome::Continue);
        assert_eq!(session.turns()[1].outcome, TurnOutcome::Resolved);
        assert_eq!(
            session.turns()[1].reply.as_deref(),
            Some("friction with the ground")
        );
    }

    #[tokio::test]
    async fn exit_keyword_skips_assessment() {
        let evaluator = ScriptedEvaluator::new([Ok(ReplyAssessment::Continue)]);
        let mut dialogue = ScriptedDialogue::new([probe("What slows it?")], [answer("exit")]);

        let session = SessionRunner::new(&evaluator, &mut dialogue, 3, LIMIT)
            .run(&question(), &response())
            .await
            .unwrap();

        assert_eq!(session.status(), SessionStatus::ExitedByStudent);
        assert_eq!(session.turns_used(), 1);
        assert_eq!(session.turns()[0].reply, None);
        assert_eq!(evaluator.remaining(), 1, "no assessment call should have fired");
    }

    #[tokio::test]
    async fn closed_reply_channel_counts_as_exit() {
        let evaluator = ScriptedEvaluator::new([]);
        let mut dialogue =
            ScriptedDialogue::new([probe("What slows it?")], [Ok(StudentReply::Exited)]);

        let session = SessionRunner::new(&evaluator, &mut dialogue, 3, LIMIT)
            .run(&question(), &response())
            .await
            .unwrap();

        assert_eq!(session.status(), SessionStatus::ExitedByStudent);
        assert_eq!(session.turns()[0].outcome, TurnOutcome::Exited);
    }

    #[tokio::test]
    async fn continue_at_cap_reaches_turn_limit() {
        let evaluator = ScriptedEvaluator::new([
            Ok(ReplyAssessment::Continue),
            Ok(ReplyAssessment::Continue),
            Ok(ReplyAssessment::Continue),
        ]);
        let mut dialogue = ScriptedDialogue::new(
            [probe("p1"), probe("p2"), probe("p3")],
            [answer("a1"), answer("a2"), answer("a3")],
        );

        let session = SessionRunner::new(&evaluator, &mut dialogue, 3, LIMIT)
            .run(&question(), &response())
            .await
            .unwrap();

        assert_eq!(session.status(), SessionStatus::TurnLimitReached);
        assert_eq!(session.turns_used(), 3);
    }

    #[tokio::test]
    async fn probe_failure_is_retried_once() {
        let evaluator = ScriptedEvaluator::new([Ok(ReplyAssessment::ResolvedCorrect)]);
        let mut dialogue = ScriptedDialogue::new(
            [
                Err(DialogueError::EmptyProbe),
                probe("Second try probe"),
            ],
            [answer("got it now")],
        );

        let session = SessionRunner::new(&evaluator, &mut dialogue, 3, LIMIT)
            .run(&question(), &response())
            .await
            .unwrap();

        assert_eq!(session.status(), SessionStatus::ResolvedCorrect);
        assert_eq!(session.turns()[0].probe, "Second try probe");
    }

    #[tokio::test]
    async fn repeated_probe_failure_aborts() {
        let evaluator = ScriptedEvaluator::new([]);
        let mut dialogue = ScriptedDialogue::new(
            [Err(DialogueError::EmptyProbe), Err(DialogueError::EmptyProbe)],
            [],
        );

        let session = SessionRunner::new(&evaluator, &mut dialogue, 3, LIMIT)
            .run(&question(), &response())
            .await
            .unwrap();

        assert_eq!(session.status(), SessionStatus::Aborted);
        assert!(session.turns().is_empty());
        assert!(
            session
                .abort_reason()
                .unwrap()
                .contains("probe generation failed")
        );
    }

    #[tokio::test]
    async fn repeated_assessment_failure_aborts() {
        let evaluator = ScriptedEvaluator::new([
            Err(EvaluatorError::Backend(anyhow!("model unavailable"))),
            Err(EvaluatorError::Backend(anyhow!("model unavailable"))),
        ]);
        let mut dialogue =
            ScriptedDialogue::new([probe("What slows it?")], [answer("maybe friction?")]);

        let session = SessionRunner::new(&evaluator, &mut dialogue, 3, LIMIT)
            .run(&question(), &response())
            .await
            .unwrap();

        assert_eq!(session.status(), SessionStatus::Aborted);
        assert!(
            session
                .abort_reason()
                .unwrap()
                .contains("reply assessment failed")
        );
    }

    #[tokio::test]
    async fn unanswered_probe_times_out_into_exit() {
        let evaluator = ScriptedEvaluator::new([]);
        let mut dialogue = SilentDialogue;

        let session = SessionRunner::new(&evaluator, &mut dialogue, 3, Duration::from_millis(20))
            .run(&question(), &response())
            .await
            .unwrap();

        assert_eq!(session.status(), SessionStatus::ExitedByStudent);
        assert_eq!(session.turns_used(), 1);
        assert_eq!(session.turns()[0].reply, None);
    }

    #[tokio::test]
    async fn acknowledged_resolution_is_terminal() {
        let evaluator = ScriptedEvaluator::new([Ok(ReplyAssessment::ResolvedIncorrect)]);
        let mut dialogue = ScriptedDialogue::new(
            [probe("Where does the energy go?")],
            [answer("I see my mistake but I'm still lost")],
        );

        let session = SessionRunner::new(&evaluator, &mut dialogue, 3, LIMIT)
            .run(&question(), &response())
            .await
            .unwrap();

        assert_eq!(session.status(), SessionStatus::ResolvedIncorrect);
        assert_eq!(session.turns_used(), 1);
    }
}
