#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Environment readiness checks.
//!
//! Reports whether the collaborators a grading run depends on are configured.
//! Missing pieces surface as warnings the operator can act on; the check
//! itself never fails.

use anyhow::Result;
use tracing::{info, warn};

use crate::config;

/// Environment variables the evaluator and dialogue collaborators require.
const REQUIRED_OPENAI_VARS: [&str; 3] = ["OPENAI_ENDPOINT", "OPENAI_API_KEY", "OPENAI_MODEL"];

/// Checks the grading environment and reports readiness.
pub fn check_health() -> Result<()> {
    info!("Checking grading environment...");
    config::ensure_initialized()?;

    match config::openai_config() {
        Some(openai) => {
            info!(
                "Evaluator and dialogue collaborators are configured (model {})",
                openai.model()
            );
        }
        None => {
            for var in REQUIRED_OPENAI_VARS {
                if std::env::var(var).map(|v| v.trim().is_empty()).unwrap_or(true) {
                    warn!("{} is not set", var);
                }
            }
            warn!(
                "Grading requires all of {}; set them in the environment or a .env file",
                REQUIRED_OPENAI_VARS.join(", ")
            );
        }
    }

    if config::postgrest_client().is_some() {
        info!("Supabase is configured; audit rows will be uploaded");
    } else {
        info!("SUPABASE_URL / SUPABASE_ANON_KEY not set; audit uploads will be skipped");
    }

    check_output_dir();

    let session = config::session_defaults();
    info!(
        "Session parameters: cap {} turn(s), dialogue timeout {}s, evaluation timeout {}s, exit policy {}",
        session.max_turns(),
        session.dialogue_timeout().as_secs(),
        session.eval_timeout().as_secs(),
        session.exit_policy()
    );
    info!("Grading for {} ({})", config::course(), config::term());

    Ok(())
}

/// Verifies the output directory exists (creating it if needed) and accepts
/// writes.
fn check_output_dir() {
    let dir = config::output_dir();
    if let Err(e) = std::fs::create_dir_all(&dir) {
        warn!("Could not create output directory {}: {}", dir.display(), e);
        return;
    }

    let probe = dir.join(".viva-health");
    match std::fs::write(&probe, b"ok") {
        Ok(()) => {
            let _ = std::fs::remove_file(&probe);
            info!("Output directory {} is writable", dir.display());
        }
        Err(e) => warn!("Output directory {} is not writable: {}", dir.display(), e),
    }
}
