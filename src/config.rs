#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    path::PathBuf,
    sync::{Arc, Mutex, OnceLock},
    time::Duration,
};

use anyhow::Result;
use postgrest::Postgrest;
use state::InitCell;

use crate::{prompts::Prompts, report::ExitPolicy};

/// Truncation length for transcript payloads sent to the audit sink.
pub const PROMPT_TRUNCATE: usize = 60_000;

/// Supabase credentials loaded from the environment, if available.
#[derive(Clone)]
struct SupabaseEnv {
    /// Fully qualified PostgREST endpoint.
    rest_endpoint: String,
    /// API key used for PostgREST requests.
    api_key:       String,
}

impl SupabaseEnv {
    /// Builds a Supabase credential bundle from environment-provided values.
    fn new(url: String, key: String) -> Self {
        let rest_endpoint = format!("{}/rest/v1", url.trim_end_matches('/'));
        Self {
            rest_endpoint,
            api_key: key,
        }
    }
}

/// OpenAI credentials and optional tuning parameters sourced from the
/// environment.
#[derive(Clone)]
pub struct OpenAiEnv {
    /// Base URL for the OpenAI-compatible API endpoint.
    api_base:    String,
    /// API key used to authenticate requests.
    api_key:     String,
    /// Default model identifier for chat completions.
    model:       String,
    /// Optional temperature override, if provided.
    temperature: Option<f32>,
    /// Optional top-p override, if provided.
    top_p:       Option<f32>,
}

impl OpenAiEnv {
    /// Construct an `OpenAiEnv` from environment variables; returns `None` if
    /// any required field is missing.
    fn from_env() -> Option<Self> {
        let api_base = std::env::var("OPENAI_ENDPOINT").ok()?.trim().to_owned();
        let api_key = std::env::var("OPENAI_API_KEY").ok()?.trim().to_owned();
        let model = std::env::var("OPENAI_MODEL").ok()?.trim().to_owned();

        if api_base.is_empty() || api_key.is_empty() || model.is_empty() {
            return None;
        }

        let temperature = std::env::var("OPENAI_TEMPERATURE")
            .ok()
            .and_then(|s| s.parse::<f32>().ok());
        let top_p = std::env::var("OPENAI_TOP_P")
            .ok()
            .and_then(|s| s.parse::<f32>().ok());

        Some(Self {
            api_base,
            api_key,
            model,
            temperature,
            top_p,
        })
    }

    /// Returns the API base URL used for requests.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Returns the API key used for requests.
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Returns the default model identifier.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns the configured temperature, if any.
    pub fn temperature(&self) -> Option<f32> {
        self.temperature
    }

    /// Returns the configured top_p, if any.
    pub fn top_p(&self) -> Option<f32> {
        self.top_p
    }
}

/// Parameters governing feedback sessions, overridable per run from the CLI.
#[derive(Clone)]
pub struct SessionConfig {
    /// Maximum probe/reply turns per feedback session.
    max_turns:        usize,
    /// Per-call timeout for the dialogue collaborator inside a session.
    dialogue_timeout: Duration,
    /// Timeout for first-attempt evaluation calls.
    eval_timeout:     Duration,
    /// Final status assigned when a student exits without resolution.
    exit_policy:      ExitPolicy,
}

impl SessionConfig {
    /// Builds session parameters from environment variables, with defaults.
    fn from_env() -> Self {
        Self {
            max_turns:        read_count("VIVA_MAX_TURNS", 3),
            dialogue_timeout: read_timeout_secs("VIVA_DIALOGUE_TIMEOUT_SECS", 120),
            eval_timeout:     read_timeout_secs("VIVA_EVAL_TIMEOUT_SECS", 60),
            exit_policy:      std::env::var("VIVA_EXIT_POLICY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
        }
    }

    /// Returns the turn cap.
    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    /// Sets the turn cap. A cap of zero is clamped to one turn.
    pub fn set_max_turns(&mut self, value: usize) {
        self.max_turns = value.max(1);
    }

    /// Returns the per-call dialogue timeout.
    pub fn dialogue_timeout(&self) -> Duration {
        self.dialogue_timeout
    }

    /// Sets the per-call dialogue timeout.
    pub fn set_dialogue_timeout(&mut self, value: Duration) {
        self.dialogue_timeout = value;
    }

    /// Returns the evaluation-call timeout.
    pub fn eval_timeout(&self) -> Duration {
        self.eval_timeout
    }

    /// Sets the evaluation-call timeout.
    pub fn set_eval_timeout(&mut self, value: Duration) {
        self.eval_timeout = value;
    }

    /// Returns the student-exit status policy.
    pub fn exit_policy(&self) -> ExitPolicy {
        self.exit_policy
    }

    /// Sets the student-exit status policy.
    pub fn set_exit_policy(&mut self, value: ExitPolicy) {
        self.exit_policy = value;
    }
}

/// Runtime and prompt configuration shared across the crate.
pub struct ConfigState {
    /// Supabase credentials, if configured.
    supabase:   Option<SupabaseEnv>,
    /// Lazily constructed Supabase PostgREST client.
    postgrest:  InitCell<Postgrest>,
    /// Loaded prompt catalog used by the collaborators.
    prompts:    Prompts,
    /// Course identifier attached to audit rows.
    course:     String,
    /// Academic term identifier attached to audit rows.
    term:       String,
    /// Cached OpenAI configuration, if available.
    openai:     Option<OpenAiEnv>,
    /// Session parameters, adjustable before a run starts.
    session:    Mutex<SessionConfig>,
    /// Destination directory for reports and audit logs.
    output_dir: Mutex<PathBuf>,
}

impl ConfigState {
    /// Construct a new configuration instance by reading environment and
    /// prompt assets.
    fn new() -> Result<Self> {
        let supabase =
            match (std::env::var("SUPABASE_URL").ok(), std::env::var("SUPABASE_ANON_KEY").ok()) {
                (Some(url), Some(key)) if !url.trim().is_empty() && !key.trim().is_empty() => {
                    Some(SupabaseEnv::new(url, key))
                }
                _ => None,
            };

        let course = std::env::var("VIVA_COURSE").unwrap_or_else(|_| "PHYS 1101".to_string());
        let term = std::env::var("VIVA_TERM").unwrap_or_else(|_| "Fall 2025".to_string());

        let output_dir = std::env::var("VIVA_OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("output"));

        Ok(Self {
            supabase,
            postgrest: InitCell::new(),
            prompts: Prompts::load(),
            course,
            term,
            openai: OpenAiEnv::from_env(),
            session: Mutex::new(SessionConfig::from_env()),
            output_dir: Mutex::new(output_dir),
        })
    }

    /// Returns the configured PostgREST client if credentials are available.
    pub fn postgrest(&self) -> Option<Postgrest> {
        if let Some(client) = self.postgrest.try_get() {
            return Some(client.clone());
        }

        let creds = self.supabase.as_ref()?;
        let client = Postgrest::new(creds.rest_endpoint.clone())
            .insert_header("apiKey", creds.api_key.clone());
        self.postgrest.set(client);
        Some(self.postgrest.get().clone())
    }

    /// Returns the course identifier.
    pub fn course(&self) -> &str {
        &self.course
    }

    /// Returns the academic term identifier.
    pub fn term(&self) -> &str {
        &self.term
    }

    /// Returns the prompt catalog.
    pub fn prompts(&self) -> &Prompts {
        &self.prompts
    }

    /// Returns the OpenAI configuration, if all required environment
    /// variables are present.
    pub fn openai(&self) -> Option<&OpenAiEnv> {
        self.openai.as_ref()
    }

    /// Returns a snapshot of the current session parameters.
    pub fn session_defaults(&self) -> SessionConfig {
        self.session.lock().expect("session config poisoned").clone()
    }

    /// Replaces the session parameters wholesale.
    pub fn set_session_defaults(&self, cfg: SessionConfig) {
        *self.session.lock().expect("session config poisoned") = cfg;
    }

    /// Returns the configured turn cap for feedback sessions.
    pub fn session_max_turns(&self) -> usize {
        self.session
            .lock()
            .expect("session config poisoned")
            .max_turns()
    }

    /// Sets the turn cap for feedback sessions.
    pub fn set_session_max_turns(&self, value: usize) {
        self.session
            .lock()
            .expect("session config poisoned")
            .set_max_turns(value);
    }

    /// Returns the per-call dialogue timeout for feedback sessions.
    pub fn session_dialogue_timeout(&self) -> Duration {
        self.session
            .lock()
            .expect("session config poisoned")
            .dialogue_timeout()
    }

    /// Sets the per-call dialogue timeout for feedback sessions.
    pub fn set_session_dialogue_timeout(&self, value: Duration) {
        self.session
            .lock()
            .expect("session config poisoned")
            .set_dialogue_timeout(value);
    }

    /// Returns the evaluation-call timeout.
    pub fn session_eval_timeout(&self) -> Duration {
        self.session
            .lock()
            .expect("session config poisoned")
            .eval_timeout()
    }

    /// Sets the evaluation-call timeout.
    pub fn set_session_eval_timeout(&self, value: Duration) {
        self.session
            .lock()
            .expect("session config poisoned")
            .set_eval_timeout(value);
    }

    /// Returns the student-exit status policy.
    pub fn session_exit_policy(&self) -> ExitPolicy {
        self.session
            .lock()
            .expect("session config poisoned")
            .exit_policy()
    }

    /// Sets the student-exit status policy.
    pub fn set_session_exit_policy(&self, value: ExitPolicy) {
        self.session
            .lock()
            .expect("session config poisoned")
            .set_exit_policy(value);
    }

    /// Returns the output directory for reports and audit logs.
    pub fn output_dir(&self) -> PathBuf {
        self.output_dir.lock().expect("output dir poisoned").clone()
    }

    /// Overrides the output directory.
    pub fn set_output_dir(&self, dir: PathBuf) {
        *self.output_dir.lock().expect("output dir poisoned") = dir;
    }
}

/// Borrowed view of the prompt catalog that keeps the underlying
/// configuration alive.
pub struct PromptsRef(ConfigHandle);

impl std::ops::Deref for PromptsRef {
    type Target = Prompts;

    fn deref(&self) -> &Self::Target {
        self.0.prompts()
    }
}

/// Borrowed view of the OpenAI configuration tied to the global config.
pub struct OpenAiRef(ConfigHandle);

impl std::ops::Deref for OpenAiRef {
    type Target = OpenAiEnv;

    fn deref(&self) -> &Self::Target {
        self.0.openai.as_ref().expect("OpenAI config missing")
    }
}

/// Shared configuration handle used throughout the crate.
#[derive(Clone)]
pub struct ConfigHandle(Arc<ConfigState>);

impl std::ops::Deref for ConfigHandle {
    type Target = ConfigState;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Global storage for the lazily constructed configuration state.
static CONFIG_SLOT: OnceLock<Mutex<Option<Arc<ConfigState>>>> = OnceLock::new();

/// Returns the mutex guarding the global configuration slot.
fn slot() -> &'static Mutex<Option<Arc<ConfigState>>> {
    CONFIG_SLOT.get_or_init(|| Mutex::new(None))
}

/// Builds a fresh configuration instance and wraps it in an `Arc`.
fn build_default() -> Result<Arc<ConfigState>> {
    ConfigState::new().map(Arc::new)
}

/// Ensure the global configuration has been initialized and return a handle.
pub fn ensure_initialized() -> Result<ConfigHandle> {
    let slot = slot();
    let mut guard = slot.lock().expect("config slot poisoned");
    if let Some(cfg) = guard.as_ref() {
        return Ok(ConfigHandle(Arc::clone(cfg)));
    }

    let cfg = build_default()?;
    *guard = Some(Arc::clone(&cfg));
    Ok(ConfigHandle(cfg))
}

/// Returns the active configuration, initializing it on demand.
pub fn get() -> ConfigHandle {
    ensure_initialized().expect("configuration initialization failed")
}

/// Returns the configured PostgREST client, if Supabase has been configured.
pub fn postgrest_client() -> Option<Postgrest> {
    get().postgrest()
}

/// Returns the configured course identifier.
pub fn course() -> String {
    get().course.clone()
}

/// Returns the configured term identifier.
pub fn term() -> String {
    get().term.clone()
}

/// Returns the configured prompt catalog.
pub fn prompts() -> PromptsRef {
    PromptsRef(get())
}

/// Returns the configured OpenAI environment, if set.
pub fn openai_config() -> Option<OpenAiRef> {
    let handle = get();
    if handle.openai.is_some() {
        Some(OpenAiRef(handle))
    } else {
        None
    }
}

/// Returns a snapshot of the session parameters.
pub fn session_defaults() -> SessionConfig {
    get().session_defaults()
}

/// Replaces the session parameters wholesale.
pub fn set_session_defaults(cfg: SessionConfig) {
    get().set_session_defaults(cfg);
}

/// Returns the configured turn cap for feedback sessions.
pub fn session_max_turns() -> usize {
    get().session_max_turns()
}

/// Sets the turn cap for feedback sessions.
pub fn set_session_max_turns(value: usize) {
    get().set_session_max_turns(value);
}

/// Returns the per-call dialogue timeout for feedback sessions.
pub fn session_dialogue_timeout() -> Duration {
    get().session_dialogue_timeout()
}

/// Sets the per-call dialogue timeout for feedback sessions.
pub fn set_session_dialogue_timeout(value: Duration) {
    get().set_session_dialogue_timeout(value);
}

/// Returns the evaluation-call timeout.
pub fn session_eval_timeout() -> Duration {
    get().session_eval_timeout()
}

/// Sets the evaluation-call timeout.
pub fn set_session_eval_timeout(value: Duration) {
    get().set_session_eval_timeout(value);
}

/// Returns the student-exit status policy.
pub fn session_exit_policy() -> ExitPolicy {
    get().session_exit_policy()
}

/// Sets the student-exit status policy.
pub fn set_session_exit_policy(value: ExitPolicy) {
    get().set_session_exit_policy(value);
}

/// Returns the output directory for reports and audit logs.
pub fn output_dir() -> PathBuf {
    get().output_dir()
}

/// Overrides the output directory.
pub fn set_output_dir(dir: PathBuf) {
    get().set_output_dir(dir);
}

/// Parses an environment variable into a `Duration`, falling back to
/// `default_secs` when parsing fails or the variable is missing.
fn read_timeout_secs(env: &str, default_secs: u64) -> Duration {
    std::env::var(env)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(default_secs))
}

/// Parses an environment variable into a positive count, falling back to
/// `default` when parsing fails, the variable is missing, or the value is
/// zero.
fn read_count(env: &str, default: usize) -> usize {
    std::env::var(env)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}
