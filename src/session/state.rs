#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Feedback-session state machine.
//!
//! A [`FeedbackSession`] tracks one interactive follow-up conversation for a
//! question whose first attempt fell short. Turns are append-only and every
//! transition is guarded; an out-of-order operation is an
//! [`SessionError::InvalidTransition`], never silent repair.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::evaluate::ReplyAssessment;

/// Lifecycle status of a feedback session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// No session was needed or it has not begun.
    NotStarted,
    /// The probe/reply loop is underway.
    InProgress,
    /// The student reached the correct understanding.
    ResolvedCorrect,
    /// The student acknowledged the gap without fully correcting it.
    ResolvedIncorrect,
    /// The student left before any resolution.
    ExitedByStudent,
    /// The turn cap was reached while the student was still working.
    TurnLimitReached,
    /// A collaborator failure ended the session early.
    Aborted,
}

impl SessionStatus {
    /// True once the session can accept no further turns.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::NotStarted | SessionStatus::InProgress)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SessionStatus::NotStarted => "Not started",
            SessionStatus::InProgress => "In progress",
            SessionStatus::ResolvedCorrect => "Resolved (correct)",
            SessionStatus::ResolvedIncorrect => "Resolved (acknowledged)",
            SessionStatus::ExitedByStudent => "Exited by student",
            SessionStatus::TurnLimitReached => "Turn limit reached",
            SessionStatus::Aborted => "Aborted",
        };
        write!(f, "{}", label)
    }
}

/// Outcome tag recorded on a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
    /// Probing continues after this turn.
    Continue,
    /// This turn resolved the session.
    Resolved,
    /// The student exited on this turn.
    Exited,
}

/// Session-level classification of a turn, combining the evaluator's reply
/// assessment with the channel-level exit signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyClassification {
    /// The reply shows the student got there.
    ResolvedCorrect,
    /// The reply acknowledges the gap without closing it.
    ResolvedIncorrect,
    /// The reply warrants further probing.
    Continue,
    /// The student exited instead of engaging.
    Exited,
}

impl From<ReplyAssessment> for ReplyClassification {
    fn from(assessment: ReplyAssessment) -> Self {
        match assessment {
            ReplyAssessment::ResolvedCorrect => ReplyClassification::ResolvedCorrect,
            ReplyAssessment::ResolvedIncorrect => ReplyClassification::ResolvedIncorrect,
            ReplyAssessment::Continue => ReplyClassification::Continue,
        }
    }
}

/// One probe/reply turn. Turns are recorded append-only and never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// One-based position of this turn within its session.
    pub index:   usize,
    /// The probe presented to the student.
    pub probe:   String,
    /// The student's reply; `None` when the student exited instead of
    /// replying.
    pub reply:   Option<String>,
    /// How the turn left the session.
    pub outcome: TurnOutcome,
}

/// Errors raised by out-of-order session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// An operation was applied in a state that does not allow it.
    #[error("invalid session transition: expected {expected}, session was {actual}")]
    InvalidTransition {
        /// The status the operation requires.
        expected: &'static str,
        /// The status the session was actually in.
        actual:   String,
    },
}

/// Interactive follow-up session for one question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackSession {
    /// Identifier of the question this session follows up on.
    question_id:  String,
    /// Maximum number of turns before the session is cut off.
    max_turns:    usize,
    /// Current lifecycle status.
    status:       SessionStatus,
    /// Recorded turns, in order.
    turns:        Vec<Turn>,
    /// Failure description when the session was aborted.
    abort_reason: Option<String>,
}

impl FeedbackSession {
    /// Creates a session shell for `question_id`. The session stays
    /// [`SessionStatus::NotStarted`] until [`FeedbackSession::begin`] is
    /// called; a turn cap of zero is clamped to one.
    pub fn new(question_id: impl Into<String>, max_turns: usize) -> Self {
        Self {
            question_id:  question_id.into(),
            max_turns:    max_turns.max(1),
            status:       SessionStatus::NotStarted,
            turns:        Vec::new(),
            abort_reason: None,
        }
    }

    /// Identifier of the question this session follows up on.
    pub fn question_id(&self) -> &str {
        &self.question_id
    }

    /// The configured turn cap.
    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    /// Current lifecycle status.
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Recorded turns, oldest first.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Number of turns recorded so far.
    pub fn turns_used(&self) -> usize {
        self.turns.len()
    }

    /// Failure description when the session was aborted.
    pub fn abort_reason(&self) -> Option<&str> {
        self.abort_reason.as_deref()
    }

    /// True once the session can accept no further turns.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// True when the next turn to be recorded would be the last one allowed.
    pub fn next_turn_is_final(&self) -> bool {
        self.turns.len() + 1 >= self.max_turns
    }

    /// Starts the session. Only valid from [`SessionStatus::NotStarted`].
    pub fn begin(&mut self) -> Result<(), SessionError> {
        if self.status != SessionStatus::NotStarted {
            return Err(SessionError::InvalidTransition {
                expected: "NotStarted",
                actual:   format!("{:?}", self.status),
            });
        }
        self.status = SessionStatus::InProgress;
        Ok(())
    }

    /// Records one completed turn and applies its transition. Returns the
    /// status the session is in afterwards.
    ///
    /// A resolving or exiting classification takes effect even on the final
    /// allowed turn; only a `Continue` with no turns left trips the cap into
    /// [`SessionStatus::TurnLimitReached`].
    pub fn record_turn(
        &mut self,
        probe: impl Into<String>,
        reply: Option<String>,
        classification: ReplyClassification,
    ) -> Result<SessionStatus, SessionError> {
        if self.status != SessionStatus::InProgress {
            return Err(SessionError::InvalidTransition {
                expected: "InProgress",
                actual:   format!("{:?}", self.status),
            });
        }

        let outcome = match classification {
            ReplyClassification::ResolvedCorrect | ReplyClassification::ResolvedIncorrect => {
                TurnOutcome::Resolved
            }
            ReplyClassification::Continue => TurnOutcome::Continue,
            ReplyClassification::Exited => TurnOutcome::Exited,
        };

        self.turns.push(Turn {
            index: self.turns.len() + 1,
            probe: probe.into(),
            reply,
            outcome,
        });

        self.status = match classification {
            ReplyClassification::ResolvedCorrect => SessionStatus::ResolvedCorrect,
            ReplyClassification::ResolvedIncorrect => SessionStatus::ResolvedIncorrect,
            ReplyClassification::Exited => SessionStatus::ExitedByStudent,
            ReplyClassification::Continue if self.turns.len() >= self.max_turns => {
                SessionStatus::TurnLimitReached
            }
            ReplyClassification::Continue => SessionStatus::InProgress,
        };

        Ok(self.status)
    }

    /// Ends the session after a collaborator failure. Only valid from
    /// [`SessionStatus::InProgress`].
    pub fn abort(&mut self, reason: impl Into<String>) -> Result<(), SessionError> {
        if self.status != SessionStatus::InProgress {
            return Err(SessionError::InvalidTransition {
                expected: "InProgress",
                actual:   format!("{:?}", self.status),
            });
        }
        self.status = SessionStatus::Aborted;
        self.abort_reason = Some(reason.into());
        Ok(())
    }
}
