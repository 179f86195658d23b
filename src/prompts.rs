#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Prompt assets embedded in the binary.

/// Prompt catalog used by the evaluation and dialogue collaborators.
#[derive(Clone)]
pub struct Prompts {
    /// System prompt for first-attempt evaluation.
    evaluation_system: String,
    /// System prompt for generating the next Socratic probe.
    probe_system:      String,
    /// System prompt for classifying a student's in-session reply.
    assessment_system: String,
}

impl Prompts {
    /// Load prompt templates embedded in the binary.
    pub fn load() -> Self {
        Self {
            evaluation_system: include_str!("prompts/evaluation_system.md").to_string(),
            probe_system:      include_str!("prompts/probe_system.md").to_string(),
            assessment_system: include_str!("prompts/assessment_system.md").to_string(),
        }
    }

    /// Returns the first-attempt evaluation system prompt.
    pub fn evaluation_system(&self) -> &str {
        &self.evaluation_system
    }

    /// Returns the probe-generation system prompt.
    pub fn probe_system(&self) -> &str {
        &self.probe_system
    }

    /// Returns the reply-assessment system prompt.
    pub fn assessment_system(&self) -> &str {
        &self.assessment_system
    }
}

impl Default for Prompts {
    fn default() -> Self {
        Self::load()
    }
}
