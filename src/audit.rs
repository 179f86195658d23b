#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Best-effort audit trail for finished runs.
//!
//! Two sinks: a structured JSON log written next to the report, and one row
//! per question posted to Supabase when credentials are configured. Neither
//! sink is allowed to fail the run; trouble here is logged and swallowed.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bon::Builder;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{analytics::QuestionRecord, config, report::Report};

/// Supabase table receiving one row per graded question.
const AUDIT_TABLE: &str = "viva_sessions";

/// Schema for the `viva_sessions` table.
#[derive(Serialize, Debug, Builder)]
#[builder(on(String, into))]
pub struct AuditRow {
    /// UUID of the row.
    pub(crate) id:           String,
    /// Run identifier shared with the report.
    pub(crate) run_id:       String,
    /// Course the run was graded for.
    pub(crate) course:       String,
    /// Academic term of the run.
    pub(crate) term:         String,
    /// Question this row covers.
    pub(crate) question_id:  String,
    /// Final displayed status label.
    pub(crate) final_status: String,
    /// Verdict of the first attempt, absent when grading failed.
    pub(crate) verdict:      Option<String>,
    /// Turns the feedback session used.
    pub(crate) turns_used:   usize,
    /// Serialized question record, truncated for storage.
    pub(crate) transcript:   String,
}

/// On-disk structured log payload for one run.
#[derive(Serialize)]
struct RunLog<'a> {
    /// The assembled report.
    report:  &'a Report,
    /// Finalized per-question records with full transcripts.
    records: &'a [QuestionRecord],
}

/// Writes the structured run log into `dir` and returns its path.
pub fn write_run_log(report: &Report, records: &[QuestionRecord], dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Could not create output directory {}", dir.display()))?;

    let path = dir.join(format!("StructuredLog_Session{}.json", report.run_id));
    let payload = serde_json::to_string_pretty(&RunLog { report, records })
        .context("Could not serialize the structured run log")?;
    std::fs::write(&path, payload)
        .with_context(|| format!("Could not write structured run log {}", path.display()))?;

    info!("Wrote structured session log to {}", path.display());
    Ok(path)
}

/// Posts one audit row per question to Supabase. Missing credentials or
/// insert failures never fail the run.
pub async fn submit_audit_rows(report: &Report, records: &[QuestionRecord]) {
    let Some(client) = config::postgrest_client() else {
        debug!("Supabase credentials not configured; skipping audit upload");
        return;
    };

    for (record, row) in records.iter().zip(&report.rows) {
        let audit = AuditRow::builder()
            .id(Uuid::new_v4().to_string())
            .run_id(report.run_id.clone())
            .course(report.course.clone())
            .term(report.term.clone())
            .question_id(record.question.id.clone())
            .final_status(row.final_status.to_string())
            .maybe_verdict(record.outcome.result().map(|r| r.verdict.to_string()))
            .turns_used(record.turns_used())
            .transcript(transcript_payload(record))
            .build();

        let body = match serde_json::to_string(&audit) {
            Ok(body) => body,
            Err(e) => {
                warn!("Could not serialize audit row for {}: {}", record.question.id, e);
                continue;
            }
        };

        if let Err(e) = client.from(AUDIT_TABLE).insert(body).execute().await {
            warn!("Could not write audit row for {}: {}", record.question.id, e);
        }
    }
}

/// Serializes one record for storage, truncated to the configured cap on a
/// character boundary.
fn transcript_payload(record: &QuestionRecord) -> String {
    let mut payload = serde_json::to_string(record).unwrap_or_else(|_| "{}".to_string());
    if payload.len() > config::PROMPT_TRUNCATE {
        let mut cut = config::PROMPT_TRUNCATE;
        while !payload.is_char_boundary(cut) {
            cut -= 1;
        }
        payload.truncate(cut);
        payload.push_str("...[TRUNCATED]");
    }
    payload
}
