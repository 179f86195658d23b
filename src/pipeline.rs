#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! End-to-end grading run.
//!
//! Loads a question file, grades every pair in input order, escalates
//! non-correct verdicts into interactive feedback sessions, then aggregates
//! the records into a report and hands them to the audit sinks. Questions
//! fail individually; only a session-machine contract violation aborts the
//! whole run.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result, bail};
use colored::Colorize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    analytics::{self, GradeOutcome, QuestionRecord},
    audit, config,
    dialogue::{Dialogue, LiveDialogue},
    evaluate::{Evaluator, OpenAiEvaluator},
    grade::{Grader, GradingResult},
    report::{self, ReportAssembler},
    session::{SessionError, SessionRunner},
    types::{self, Question, Response},
};

/// Grades a question file end to end and renders the report.
///
/// `report_override` replaces the default report destination under the
/// configured output directory.
pub async fn run(question_file: &Path, report_override: Option<PathBuf>) -> Result<()> {
    config::ensure_initialized()?;
    if config::openai_config().is_none() {
        bail!(
            "OPENAI_ENDPOINT, OPENAI_API_KEY, and OPENAI_MODEL must be set before grading; run `check-health` for details"
        );
    }

    let set = types::load_question_file(question_file)?;
    if set.is_empty() {
        warn!(
            "No valid question/response pairs in {}; the report will only list skipped input",
            question_file.display()
        );
    }

    let evaluator = OpenAiEvaluator::new();
    let mut dialogue = LiveDialogue::new();
    let records = grade_all(
        &set.pairs,
        &evaluator,
        &mut dialogue,
        config::session_max_turns(),
        config::session_dialogue_timeout(),
    )
    .await?;

    let analytics = analytics::aggregate(&records);
    let report = ReportAssembler::builder()
        .run_id(new_run_id())
        .course(config::course())
        .term(config::term())
        .analytics(analytics)
        .records(&records)
        .skipped(set.skipped.clone())
        .policy(config::session_exit_policy())
        .build()
        .run();

    let out_dir = config::output_dir();
    let destination =
        report_override.unwrap_or_else(|| report_destination(&out_dir, &report.run_id));
    if let Some(parent) = destination.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Could not create output directory {}", parent.display()))?;
    }
    std::fs::write(&destination, report::render_markdown(&report))
        .with_context(|| format!("Could not write grading report {}", destination.display()))?;
    info!("Wrote grading report to {}", destination.display());

    report::show_report(&report);

    // Audit sinks are best-effort and never fail the run.
    if let Err(e) = audit::write_run_log(&report, &records, &out_dir) {
        warn!("Could not write the structured session log: {:#}", e);
    }
    audit::submit_audit_rows(&report, &records).await;

    Ok(())
}

/// Grades every pair in order, running a feedback session for each
/// non-correct verdict.
///
/// Grading failures are folded into the record for that question. The only
/// error is a session-machine misuse, which is fatal by contract.
pub async fn grade_all(
    pairs: &[(Question, Response)],
    evaluator: &dyn Evaluator,
    dialogue: &mut dyn Dialogue,
    max_turns: usize,
    timeout: Duration,
) -> Result<Vec<QuestionRecord>, SessionError> {
    let mut records = Vec::with_capacity(pairs.len());

    for (question, response) in pairs {
        let outcome = match Grader::builder()
            .question(question.clone())
            .response(response.clone())
            .build()
            .run(evaluator)
            .await
        {
            Ok(result) => GradeOutcome::Graded(result),
            Err(e) => {
                warn!("Grading failed for question {}: {}", question.id, e);
                GradeOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        let session = match outcome.result() {
            Some(result) if !result.is_correct() => {
                print_session_banner(question, response, result);
                let runner = SessionRunner::new(evaluator, dialogue, max_turns, timeout);
                Some(runner.run(question, response).await?)
            }
            _ => None,
        };

        records.push(QuestionRecord {
            question: question.clone(),
            response: response.clone(),
            outcome,
            session,
        });
    }

    Ok(records)
}

/// Short identifier shared by the report, the log file, and the audit rows.
fn new_run_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Default on-disk destination for the rendered report.
fn report_destination(out_dir: &Path, run_id: &str) -> PathBuf {
    out_dir.join(format!("GradingReport_{}.md", run_id))
}

/// Shows the student what the session is about before the first probe.
fn print_session_banner(question: &Question, response: &Response, result: &GradingResult) {
    println!();
    println!("{}", "Let's talk through this one.".cyan().bold());
    println!("{} {}", "Question:".bold(), question.prompt);
    println!("{} {}", "Your answer:".bold(), response.answer);
    println!(
        "{} {}",
        "Verdict:".bold(),
        result.verdict.to_string().yellow()
    );
    println!("{}", result.rationale);
    if let Some(hint) = &result.hint {
        println!("{} {}", "Hint:".bold(), hint);
    }
    println!("Type \"exit\" or \"skip\" at any time to end the session.");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_ids_are_short_and_hex() {
        let id = new_run_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn report_lands_under_the_output_directory() {
        let path = report_destination(Path::new("output"), "abcd1234");
        assert_eq!(path, Path::new("output/GradingReport_abcd1234.md"));
    }
}
