#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Session-level analytics folded from per-question records.
//!
//! [`aggregate`] is a pure fold over the ordered run records; given the same
//! finalized records it always produces the same [`SessionAnalytics`].
//! Questions whose grading failed stay in the denominator of the success rate
//! but never in the numerator.

use std::collections::BTreeMap;

use itertools::Itertools;
use serde::Serialize;

use crate::{
    grade::results::GradingResult,
    session::{FeedbackSession, SessionStatus},
    types::{Question, Response},
};

/// Outcome of grading one question's first attempt.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GradeOutcome {
    /// Grading produced a result.
    Graded(GradingResult),
    /// The evaluation collaborator failed; no verdict exists.
    Failed {
        /// Description of the grading failure.
        reason: String,
    },
}

impl GradeOutcome {
    /// The grading result, when grading succeeded.
    pub fn result(&self) -> Option<&GradingResult> {
        match self {
            GradeOutcome::Graded(result) => Some(result),
            GradeOutcome::Failed { .. } => None,
        }
    }

    /// The failure description, when grading failed.
    pub fn failure(&self) -> Option<&str> {
        match self {
            GradeOutcome::Graded(_) => None,
            GradeOutcome::Failed { reason } => Some(reason),
        }
    }
}

/// Everything the pipeline produced for one question, in processing order.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionRecord {
    /// The question as loaded.
    pub question: Question,
    /// The student's first attempt.
    pub response: Response,
    /// The grading outcome for the first attempt.
    pub outcome:  GradeOutcome,
    /// The feedback session, present exactly when the first attempt earned
    /// one.
    pub session:  Option<FeedbackSession>,
}

impl QuestionRecord {
    /// True when an interactive session was conducted for this question.
    pub fn session_conducted(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| session.status() != SessionStatus::NotStarted)
    }

    /// Number of turns the session used, zero without a session.
    pub fn turns_used(&self) -> usize {
        self.session
            .as_ref()
            .map(FeedbackSession::turns_used)
            .unwrap_or(0)
    }
}

/// Aggregated statistics for one full run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionAnalytics {
    /// Questions processed, including grading failures.
    pub total_questions:         usize,
    /// Questions whose original verdict called for feedback.
    pub requiring_feedback:      usize,
    /// Questions correct on the first attempt.
    pub first_attempt_correct:   usize,
    /// First-attempt success percentage, zero when no questions ran.
    pub first_attempt_rate:      f64,
    /// Interactive sessions actually conducted.
    pub sessions_conducted:      usize,
    /// Turns used across all sessions.
    pub total_turns:             usize,
    /// Average turns per session, zero when no sessions ran.
    pub average_session_turns:   f64,
    /// Concept tag to the number of distinct questions it appeared in,
    /// descending by count.
    pub concept_frequency:       Vec<(String, usize)>,
    /// Misconception to its number of occurrences, descending by count.
    pub misconception_frequency: Vec<(String, usize)>,
}

/// Folds the ordered per-question records into session analytics.
///
/// The original verdict drives the first-attempt counters even when a later
/// session changed the question's displayed status; "got it right eventually"
/// and "got it right immediately" stay distinct.
pub fn aggregate(records: &[QuestionRecord]) -> SessionAnalytics {
    let mut analytics = SessionAnalytics::default();
    let mut concept_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut misconception_counts: BTreeMap<String, usize> = BTreeMap::new();

    for record in records {
        analytics.total_questions += 1;

        if let Some(result) = record.outcome.result() {
            if result.is_correct() {
                analytics.first_attempt_correct += 1;
            } else {
                analytics.requiring_feedback += 1;
            }

            // Once per distinct question, however often a tag is mentioned.
            for tag in result.concept_tags.iter().unique() {
                *concept_counts.entry(tag.clone()).or_default() += 1;
            }
            for misconception in &result.misconceptions {
                *misconception_counts.entry(misconception.clone()).or_default() += 1;
            }
        }

        if record.session_conducted() {
            analytics.sessions_conducted += 1;
            analytics.total_turns += record.turns_used();
        }
    }

    analytics.first_attempt_rate =
        percentage(analytics.first_attempt_correct, analytics.total_questions);
    analytics.average_session_turns =
        ratio(analytics.total_turns, analytics.sessions_conducted);
    analytics.concept_frequency = ranked(concept_counts);
    analytics.misconception_frequency = ranked(misconception_counts);

    analytics
}

/// Percentage of `part` in `whole`, zero-safe.
fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        100.0 * part as f64 / whole as f64
    }
}

/// Plain ratio of `part` to `whole`, zero-safe.
fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

/// Orders counts descending, breaking ties alphabetically.
fn ranked(counts: BTreeMap<String, usize>) -> Vec<(String, usize)> {
    counts
        .into_iter()
        .sorted_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)))
        .collect()
}
