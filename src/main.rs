#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! # viva
//! ## Introduction
//!
//! Grades free-form answers against a question file and, for answers that
//! miss the mark, guides the student through a short interactive feedback
//! session before finalizing the grade.
//!
//! ## Usage
//!
//! Set `OPENAI_ENDPOINT`, `OPENAI_API_KEY`, and `OPENAI_MODEL` (a `.env`
//! file works), then run `viva grade questions.json`. `viva check-health`
//! reports what is missing.

use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use bpaf::*;
use dotenvy::dotenv;
use tracing::{Level, metadata::LevelFilter};
use tracing_subscriber::{fmt, prelude::*, util::SubscriberInitExt};
use viva::{config, health, pipeline, report::ExitPolicy};

/// Top-level CLI commands.
#[derive(Debug, Clone)]
enum Cmd {
    /// Grade a question file, with optional session overrides.
    Grade {
        /// Explicit destination for the rendered report.
        report:           Option<PathBuf>,
        /// Directory for the report and the structured session log.
        output_dir:       Option<PathBuf>,
        /// Turn cap for feedback sessions.
        max_turns:        Option<usize>,
        /// Seconds to wait on each probe or student reply.
        dialogue_timeout: Option<u64>,
        /// Seconds to wait on each evaluation call.
        eval_timeout:     Option<u64>,
        /// Final status for sessions the student exits unresolved.
        exit_policy:      Option<ExitPolicy>,
        /// The question file to grade.
        question_file:    PathBuf,
    },
    /// Report whether the environment is ready to grade.
    CheckHealth,
}

/// Parse the command line arguments and return a `Cmd` enum
fn options() -> Cmd {
    let report = long("report")
        .help("Write the rendered report to this exact path")
        .argument::<PathBuf>("PATH")
        .optional();
    let output_dir = long("output-dir")
        .help("Directory for the report and session log")
        .argument::<PathBuf>("DIR")
        .optional();
    let max_turns = long("max-turns")
        .help("Turn cap for feedback sessions")
        .argument::<usize>("N")
        .optional();
    let dialogue_timeout = long("timeout")
        .help("Seconds to wait for each probe or student reply")
        .argument::<u64>("SECS")
        .optional();
    let eval_timeout = long("eval-timeout")
        .help("Seconds to wait for each evaluation call")
        .argument::<u64>("SECS")
        .optional();
    let exit_policy = long("exit-policy")
        .help("Status for unresolved student exits: needed-guidance or unresolved")
        .argument::<ExitPolicy>("POLICY")
        .optional();
    let question_file =
        positional::<PathBuf>("QUESTION_FILE").help("JSON file of question/response pairs");

    let grade = construct!(Cmd::Grade {
        report,
        output_dir,
        max_turns,
        dialogue_timeout,
        eval_timeout,
        exit_policy,
        question_file,
    })
    .to_options()
    .command("grade")
    .help("Grade a question file and run interactive feedback sessions");

    let check_health = pure(Cmd::CheckHealth)
        .to_options()
        .command("check-health")
        .help("Report whether the environment is ready to grade");

    let cmd = construct!([grade, check_health]);

    cmd.to_options()
        .descr("Interactive grading for free-form answers")
        .run()
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let fmt = fmt::layer()
        .without_time()
        .with_file(false)
        .with_line_number(false);
    let filter_layer = LevelFilter::from_level(Level::INFO);
    tracing_subscriber::registry()
        .with(fmt)
        .with(filter_layer)
        .init();

    match options() {
        Cmd::Grade {
            report,
            output_dir,
            max_turns,
            dialogue_timeout,
            eval_timeout,
            exit_policy,
            question_file,
        } => {
            config::ensure_initialized()?;
            if let Some(dir) = output_dir {
                config::set_output_dir(dir);
            }
            if let Some(cap) = max_turns {
                config::set_session_max_turns(cap);
            }
            if let Some(secs) = dialogue_timeout {
                config::set_session_dialogue_timeout(Duration::from_secs(secs));
            }
            if let Some(secs) = eval_timeout {
                config::set_session_eval_timeout(Duration::from_secs(secs));
            }
            if let Some(policy) = exit_policy {
                config::set_session_exit_policy(policy);
            }

            pipeline::run(&question_file, report).await?;
        }
        Cmd::CheckHealth => health::check_health()?,
    }

    Ok(())
}
