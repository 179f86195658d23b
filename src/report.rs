#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Report assembly and rendering.
//!
//! [`ReportAssembler`] is a pure projection from finalized run records into
//! the fixed report schema; it performs no grading or aggregation of its own.
//! The Markdown renderer produces the artifact written to disk, the console
//! renderer a compact table for the terminal.

use std::{fmt::Display, str::FromStr};

use bon::Builder;
use serde::Serialize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Panel, Style, Width, object::Rows},
};

use crate::{
    analytics::{GradeOutcome, QuestionRecord, SessionAnalytics},
    grade::results::{Confidence, Verdict},
    session::{FeedbackSession, SessionStatus},
    types::SkippedEntry,
};

/// Policy for the final status of a question whose session ended with a
/// student exit and no resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitPolicy {
    /// An exit still counts the question as guided.
    #[default]
    NeededGuidance,
    /// An exit leaves the question unresolved.
    Unresolved,
}

impl FromStr for ExitPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "needed-guidance" | "needed_guidance" | "guidance" => Ok(ExitPolicy::NeededGuidance),
            "unresolved" => Ok(ExitPolicy::Unresolved),
            other => Err(format!(
                "unknown exit policy `{}`; expected `needed-guidance` or `unresolved`",
                other
            )),
        }
    }
}

impl Display for ExitPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ExitPolicy::NeededGuidance => "needed-guidance",
            ExitPolicy::Unresolved => "unresolved",
        };
        write!(f, "{}", label)
    }
}

/// Final displayed status of one question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalStatus {
    /// Correct on the first attempt.
    Correct,
    /// Reached understanding through the feedback session.
    NeededGuidance,
    /// Never reached a resolution.
    Unresolved,
}

impl Display for FinalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            FinalStatus::Correct => "Correct",
            FinalStatus::NeededGuidance => "Needed Guidance",
            FinalStatus::Unresolved => "Unresolved",
        };
        write!(f, "{}", label)
    }
}

/// Projects one record to its final displayed status. The session outcome
/// wins over the original verdict; the original verdict still drives the
/// analytics counters.
pub fn final_status(record: &QuestionRecord, policy: ExitPolicy) -> FinalStatus {
    let result = match &record.outcome {
        GradeOutcome::Failed { .. } => return FinalStatus::Unresolved,
        GradeOutcome::Graded(result) => result,
    };

    match (result.verdict, record.session.as_ref()) {
        (Verdict::Correct, _) => FinalStatus::Correct,
        (Verdict::PartiallyCorrect | Verdict::Incorrect, None) => FinalStatus::Unresolved,
        (Verdict::PartiallyCorrect | Verdict::Incorrect, Some(session)) => {
            session_final_status(session, policy)
        }
    }
}

/// Maps a terminal session status to the question's final status. Sessions
/// reach this projection only after the runner has finalized them.
fn session_final_status(session: &FeedbackSession, policy: ExitPolicy) -> FinalStatus {
    match session.status() {
        SessionStatus::ResolvedCorrect | SessionStatus::ResolvedIncorrect => {
            FinalStatus::NeededGuidance
        }
        SessionStatus::ExitedByStudent => match policy {
            ExitPolicy::NeededGuidance => FinalStatus::NeededGuidance,
            ExitPolicy::Unresolved => FinalStatus::Unresolved,
        },
        SessionStatus::TurnLimitReached | SessionStatus::Aborted => FinalStatus::Unresolved,
        SessionStatus::NotStarted | SessionStatus::InProgress => FinalStatus::Unresolved,
    }
}

/// One per-question row of the report, in processing order.
#[derive(Debug, Clone, Serialize)]
pub struct ReportRow {
    /// Identifier of the question.
    pub question_id:      String,
    /// Final displayed status.
    pub final_status:     FinalStatus,
    /// Whether the original verdict called for an interactive session.
    pub session_required: bool,
    /// Turns the session used, when one was conducted.
    pub turns_used:       Option<usize>,
    /// Concept tags from the grading result.
    pub concept_tags:     Vec<String>,
    /// Grading confidence, absent when grading failed.
    pub confidence:       Option<Confidence>,
    /// Rationale recorded at grading time.
    pub rationale:        Option<String>,
    /// Socratic hint the evaluation suggested, when any.
    pub hint:             Option<String>,
    /// Failure or abort detail attached to this question, when any.
    pub note:             Option<String>,
}

/// The assembled report: analytics, per-question rows, and skipped input.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    /// Short run identifier, shared with the audit sink.
    pub run_id:    String,
    /// Course the run was graded for.
    pub course:    String,
    /// Academic term of the run.
    pub term:      String,
    /// Aggregated session analytics.
    pub analytics: SessionAnalytics,
    /// Per-question rows in processing order.
    pub rows:      Vec<ReportRow>,
    /// Input elements skipped during loading.
    pub skipped:   Vec<SkippedEntry>,
}

/// Projects finalized run records into the fixed report schema.
#[derive(Builder)]
#[builder(on(String, into))]
pub struct ReportAssembler<'a> {
    /// Short run identifier.
    run_id:    String,
    /// Course identifier for the report header.
    course:    String,
    /// Academic term for the report header.
    term:      String,
    /// Aggregated analytics for the run.
    analytics: SessionAnalytics,
    /// Finalized per-question records, in processing order.
    records:   &'a [QuestionRecord],
    /// Input elements skipped during loading.
    #[builder(default)]
    skipped:   Vec<SkippedEntry>,
    /// Policy applied to exit-without-resolution sessions.
    #[builder(default)]
    policy:    ExitPolicy,
}

impl ReportAssembler<'_> {
    /// Builds the report. Pure; the input order is preserved.
    pub fn run(self) -> Report {
        let rows = self
            .records
            .iter()
            .map(|record| {
                let result = record.outcome.result();
                ReportRow {
                    question_id:      record.question.id.clone(),
                    final_status:     final_status(record, self.policy),
                    session_required: result.is_some_and(|r| !r.is_correct()),
                    turns_used:       record.session_conducted().then(|| record.turns_used()),
                    concept_tags:     result.map(|r| r.concept_tags.clone()).unwrap_or_default(),
                    confidence:       result.map(|r| r.confidence),
                    rationale:        result.map(|r| r.rationale.clone()),
                    hint:             result.and_then(|r| r.hint.clone()),
                    note:             note_for(record),
                }
            })
            .collect();

        Report {
            run_id: self.run_id,
            course: self.course,
            term: self.term,
            analytics: self.analytics,
            rows,
            skipped: self.skipped,
        }
    }
}

/// Failure or abort detail worth surfacing for one record.
fn note_for(record: &QuestionRecord) -> Option<String> {
    match &record.outcome {
        GradeOutcome::Failed { reason } => Some(format!("Grading failed: {}", reason)),
        GradeOutcome::Graded(_) => record
            .session
            .as_ref()
            .and_then(|session| session.abort_reason())
            .map(|reason| format!("Session aborted: {}", reason)),
    }
}

/// Renders the report as the Markdown artifact written to disk.
pub fn render_markdown(report: &Report) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "# Grading Report: {} ({})\n\nRun `{}`\n\n",
        report.course, report.term, report.run_id
    ));

    out.push_str("## Session Analytics Dashboard\n\n");
    let a = &report.analytics;
    out.push_str(&format!("- Total Questions: {}\n", a.total_questions));
    out.push_str(&format!("- Questions Requiring Feedback: {}\n", a.requiring_feedback));
    out.push_str(&format!("- Correct on First Attempt: {}\n", a.first_attempt_correct));
    out.push_str(&format!(
        "- First Attempt Success Rate: {:.1}%\n",
        a.first_attempt_rate
    ));
    out.push_str(&format!(
        "- Interactive Sessions Conducted: {}\n",
        a.sessions_conducted
    ));
    out.push_str(&format!("- Total Turns: {}\n", a.total_turns));
    out.push_str(&format!(
        "- Average Turns per Session: {:.1}\n\n",
        a.average_session_turns
    ));

    out.push_str("## Detailed Question Analysis\n\n");
    for row in &report.rows {
        out.push_str(&format!("### {}: {}\n\n", row.question_id, row.final_status));
        out.push_str(&format!(
            "- Interactive Session Required: {}\n",
            if row.session_required { "Yes" } else { "No" }
        ));
        if let Some(turns) = row.turns_used {
            out.push_str(&format!("- Guided Turns: {}\n", turns));
        }
        out.push_str(&format!(
            "- Analysis Confidence: {}\n",
            row.confidence
                .map(|c| c.to_string())
                .unwrap_or_else(|| "n/a".to_string())
        ));
        if !row.concept_tags.is_empty() {
            out.push_str(&format!("- Concept Tags: {}\n", row.concept_tags.join(", ")));
        }
        out.push('\n');

        if let Some(rationale) = &row.rationale {
            out.push_str(rationale);
            out.push_str("\n\n");
        }
        if let Some(hint) = &row.hint {
            out.push_str(&format!("Hint: {}\n\n", hint));
        }
        if let Some(note) = &row.note {
            out.push_str(&format!("Note: {}\n\n", note));
        }
    }

    if !report.analytics.concept_frequency.is_empty() {
        out.push_str("## Concept Frequency\n\n");
        for (tag, count) in &report.analytics.concept_frequency {
            out.push_str(&format!("- {}: Appeared in {} question(s)\n", tag, count));
        }
        out.push('\n');
    }

    if !report.analytics.misconception_frequency.is_empty() {
        out.push_str("## Common Misconceptions\n\n");
        for (misconception, count) in &report.analytics.misconception_frequency {
            out.push_str(&format!("- {}: Occurred {} time(s)\n", misconception, count));
        }
        out.push('\n');
    }

    if !report.skipped.is_empty() {
        out.push_str("## Skipped Input\n\n");
        for entry in &report.skipped {
            out.push_str(&format!("- Element {}: {}\n", entry.index, entry.reason));
        }
        out.push('\n');
    }

    out
}

/// Table row shape used for console rendering.
#[derive(Tabled)]
struct RowDisplay {
    /// Question identifier.
    #[tabled(rename = "Question")]
    question:   String,
    /// Final displayed status.
    #[tabled(rename = "Final Status")]
    status:     String,
    /// Session turn usage, or a dash without a session.
    #[tabled(rename = "Session")]
    session:    String,
    /// Grading confidence.
    #[tabled(rename = "Confidence")]
    confidence: String,
    /// Concept tags, comma separated.
    #[tabled(rename = "Concepts")]
    concepts:   String,
}

impl From<&ReportRow> for RowDisplay {
    fn from(row: &ReportRow) -> Self {
        Self {
            question:   row.question_id.clone(),
            status:     row.final_status.to_string(),
            session:    row
                .turns_used
                .map(|turns| format!("{} turn(s)", turns))
                .unwrap_or_else(|| "-".to_string()),
            confidence: row
                .confidence
                .map(|c| c.to_string())
                .unwrap_or_else(|| "n/a".to_string()),
            concepts:   row.concept_tags.join(", "),
        }
    }
}

/// Prints the report summary table to the terminal.
pub fn show_report(report: &Report) {
    let rows: Vec<RowDisplay> = report.rows.iter().map(RowDisplay::from).collect();
    let footer = format!(
        "First Attempt Success Rate: {:.1}% | Sessions: {} | Avg Turns: {:.1}",
        report.analytics.first_attempt_rate,
        report.analytics.sessions_conducted,
        report.analytics.average_session_turns
    );

    eprintln!(
        "{}",
        Table::new(&rows)
            .with(Panel::header("Session Analytics Dashboard"))
            .with(Panel::footer(footer))
            .with(Modify::new(Rows::new(1..)).with(Width::wrap(24).keep_words(true)))
            .with(
                Modify::new(Rows::first())
                    .with(Alignment::center())
                    .with(Alignment::center_vertical()),
            )
            .with(
                Modify::new(Rows::last())
                    .with(Alignment::center())
                    .with(Alignment::center_vertical()),
            )
            .with(Style::modern())
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analytics::aggregate,
        grade::results::GradingResult,
        session::ReplyClassification,
        types::{Question, Response},
    };

    fn question(id: &str, tags: &[&str]) -> Question {
        Question {
            id:              id.to_string(),
            prompt:          "prompt".to_string(),
            expected_answer: "expected".to_string(),
            concept_tags:    tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn response(id: &str) -> Response {
        Response {
            question_id: id.to_string(),
            answer:      "answer".to_string(),
        }
    }

    fn graded(id: &str, verdict: Verdict, tags: &[&str]) -> QuestionRecord {
        QuestionRecord {
            question: question(id, tags),
            response: response(id),
            outcome:  GradeOutcome::Graded(
                GradingResult::builder()
                    .question_id(id)
                    .verdict(verdict)
                    .confidence(Confidence::High)
                    .concept_tags(tags.iter().map(|t| t.to_string()).collect::<Vec<_>>())
                    .rationale("because")
                    .build(),
            ),
            session:  None,
        }
    }

    fn session_with(id: &str, classification: ReplyClassification) -> FeedbackSession {
        let mut session = FeedbackSession::new(id, 3);
        session.begin().unwrap();
        let reply = match classification {
            ReplyClassification::Exited => None,
            _ => Some("a reply".to_string()),
        };
        session.record_turn("a probe", reply, classification).unwrap();
        session
    }

    #[test]
    fn correct_first_attempt_projects_correct() {
        let record = graded("q1", Verdict::Correct, &[]);
        assert_eq!(final_status(&record, ExitPolicy::default()), FinalStatus::Correct);
    }

    #[test]
    fn grading_failure_projects_unresolved() {
        let record = QuestionRecord {
            question: question("q1", &[]),
            response: response("q1"),
            outcome:  GradeOutcome::Failed {
                reason: "no payload".to_string(),
            },
            session:  None,
        };
        assert_eq!(final_status(&record, ExitPolicy::default()), FinalStatus::Unresolved);
    }

    #[test]
    fn resolved_sessions_project_needed_guidance() {
        for classification in [
            ReplyClassification::ResolvedCorrect,
            ReplyClassification::ResolvedIncorrect,
        ] {
            let mut record = graded("q1", Verdict::Incorrect, &[]);
            record.session = Some(session_with("q1", classification));
            assert_eq!(
                final_status(&record, ExitPolicy::default()),
                FinalStatus::NeededGuidance
            );
        }
    }

    #[test]
    fn student_exit_follows_the_configured_policy() {
        let mut record = graded("q1", Verdict::Incorrect, &[]);
        record.session = Some(session_with("q1", ReplyClassification::Exited));

        assert_eq!(
            final_status(&record, ExitPolicy::NeededGuidance),
            FinalStatus::NeededGuidance
        );
        assert_eq!(final_status(&record, ExitPolicy::Unresolved), FinalStatus::Unresolved);
    }

    #[test]
    fn cap_and_abort_project_unresolved() {
        let mut capped = graded("q1", Verdict::Incorrect, &[]);
        let mut session = FeedbackSession::new("q1", 1);
        session.begin().unwrap();
        session
            .record_turn("probe", Some("hmm".to_string()), ReplyClassification::Continue)
            .unwrap();
        capped.session = Some(session);
        assert_eq!(final_status(&capped, ExitPolicy::default()), FinalStatus::Unresolved);

        let mut aborted = graded("q2", Verdict::Incorrect, &[]);
        let mut session = FeedbackSession::new("q2", 3);
        session.begin().unwrap();
        session.abort("probe generation failed").unwrap();
        aborted.session = Some(session);
        assert_eq!(final_status(&aborted, ExitPolicy::default()), FinalStatus::Unresolved);
    }

    #[test]
    fn assembled_rows_preserve_processing_order() {
        let mut second = graded("q2", Verdict::Incorrect, &["friction"]);
        second.session = Some(session_with("q2", ReplyClassification::ResolvedCorrect));
        let records = vec![graded("q1", Verdict::Correct, &["kinematics"]), second];
        let analytics = aggregate(&records);

        let report = ReportAssembler::builder()
            .run_id("run-1234")
            .course("PHYS 1101")
            .term("Fall 2025")
            .analytics(analytics)
            .records(&records)
            .build()
            .run();

        let ids: Vec<&str> = report.rows.iter().map(|r| r.question_id.as_str()).collect();
        assert_eq!(ids, vec!["q1", "q2"]);
        assert!(!report.rows[0].session_required);
        assert_eq!(report.rows[0].turns_used, None);
        assert!(report.rows[1].session_required);
        assert_eq!(report.rows[1].turns_used, Some(1));
    }

    #[test]
    fn markdown_carries_the_dashboard_labels() {
        let mut third = graded("q3", Verdict::Incorrect, &["friction"]);
        third.session = Some(session_with("q3", ReplyClassification::Exited));
        let records = vec![
            graded("q1", Verdict::Correct, &["kinematics"]),
            graded("q2", Verdict::Correct, &["kinematics"]),
            third,
        ];
        let analytics = aggregate(&records);

        let report = ReportAssembler::builder()
            .run_id("run-1234")
            .course("PHYS 1101")
            .term("Fall 2025")
            .analytics(analytics)
            .records(&records)
            .build()
            .run();
        let markdown = render_markdown(&report);

        assert!(markdown.contains("## Session Analytics Dashboard"));
        assert!(markdown.contains("- First Attempt Success Rate: 66.7%"));
        assert!(markdown.contains("- Average Turns per Session: 1.0"));
        assert!(markdown.contains("## Detailed Question Analysis"));
        assert!(markdown.contains("### q3: Needed Guidance"));
        assert!(markdown.contains("- Interactive Session Required: Yes"));
        assert!(markdown.contains("- Guided Turns: 1"));
        assert!(markdown.contains("- Analysis Confidence: high"));
        assert!(markdown.contains("Appeared in 2 question(s)"));
    }

    #[test]
    fn skipped_entries_render_their_own_section() {
        let records = vec![graded("q1", Verdict::Correct, &[])];
        let analytics = aggregate(&records);
        let report = ReportAssembler::builder()
            .run_id("run-1234")
            .course("PHYS 1101")
            .term("Fall 2025")
            .analytics(analytics)
            .records(&records)
            .skipped(vec![SkippedEntry {
                index:  1,
                reason: "element 1: missing or empty required field `prompt`".to_string(),
            }])
            .build()
            .run();

        let markdown = render_markdown(&report);
        assert!(markdown.contains("## Skipped Input"));
        assert!(markdown.contains("- Element 1:"));
    }

    #[test]
    fn exit_policy_parses_both_spellings() {
        assert_eq!(
            "needed-guidance".parse::<ExitPolicy>().unwrap(),
            ExitPolicy::NeededGuidance
        );
        assert_eq!(
            "needed_guidance".parse::<ExitPolicy>().unwrap(),
            ExitPolicy::NeededGuidance
        );
        assert_eq!("unresolved".parse::<ExitPolicy>().unwrap(), ExitPolicy::Unresolved);
        assert!("sideways".parse::<ExitPolicy>().is_err());
    }
}
