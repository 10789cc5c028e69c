//! Configuration types for the oracle client.
//!
//! All configuration is loaded from environment variables: which backends
//! serve the fast and smart tiers, the per-call deadline, the rate budget,
//! and the retry policy.

use std::time::Duration;

use crate::error::OracleError;

/// Complete oracle configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct OracleConfig {
    /// Backend serving [`ModelTier::Fast`](hamlet_types::ModelTier::Fast).
    pub fast_backend: BackendConfig,
    /// Backend serving [`ModelTier::Smart`](hamlet_types::ModelTier::Smart).
    /// When absent, smart-tier stages use the fast backend.
    pub smart_backend: Option<BackendConfig>,
    /// Deadline for a single backend call.
    pub call_timeout: Duration,
    /// Rolling-window request and token ceilings.
    pub budget: BudgetConfig,
    /// Backoff and retry behavior.
    pub retry: RetryPolicy,
}

/// Configuration for a single language-model backend.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// The wire format to speak.
    pub backend_type: BackendType,
    /// Base API URL (e.g. `https://api.openai.com/v1`).
    pub api_url: String,
    /// API key for authentication.
    pub api_key: String,
    /// Model identifier.
    pub model: String,
}

/// Supported backend wire formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    /// `OpenAI`-compatible chat completions (also `DeepSeek`, Ollama, vLLM).
    OpenAi,
    /// Anthropic Messages API.
    Anthropic,
}

/// Ceilings for the rolling rate budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetConfig {
    /// Maximum requests admitted per window.
    pub requests_per_window: u32,
    /// Maximum tokens admitted per window.
    pub tokens_per_window: u32,
    /// Window length.
    pub window: Duration,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            requests_per_window: 50,
            tokens_per_window: 40_000,
            window: Duration::from_secs(60),
        }
    }
}

/// Backoff and retry behavior for [`OracleClient`](crate::client::OracleClient).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// How many times a deferred admission is retried before giving up.
    pub max_admission_retries: u32,
    /// First backoff delay; doubles on every attempt.
    pub backoff_base: Duration,
    /// Ceiling on any single backoff delay.
    pub backoff_max: Duration,
    /// Upper bound of the random delay before the one transient retry.
    pub jitter_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_admission_retries: 3,
            backoff_base: Duration::from_millis(250),
            backoff_max: Duration::from_secs(4),
            jitter_max: Duration::from_millis(500),
        }
    }
}

impl OracleConfig {
    /// Load configuration from environment variables.
    ///
    /// Required variables:
    /// - `ORACLE_FAST_BACKEND` -- fast-tier backend type (`openai`, `anthropic`, ...)
    /// - `ORACLE_FAST_API_URL` -- fast-tier API base URL
    /// - `ORACLE_FAST_API_KEY` -- fast-tier API key
    /// - `ORACLE_FAST_MODEL` -- fast-tier model name
    ///
    /// Optional variables:
    /// - `ORACLE_SMART_BACKEND`, `ORACLE_SMART_API_URL`, `ORACLE_SMART_API_KEY`,
    ///   `ORACLE_SMART_MODEL` -- smart-tier backend (all four or none)
    /// - `ORACLE_CALL_TIMEOUT_MS` -- per-call deadline (default 15000)
    /// - `ORACLE_REQUESTS_PER_WINDOW` -- request ceiling (default 50)
    /// - `ORACLE_TOKENS_PER_WINDOW` -- token ceiling (default 40000)
    /// - `ORACLE_WINDOW_SECS` -- window length (default 60)
    /// - `ORACLE_MAX_ADMISSION_RETRIES` -- deferred-admission retries (default 3)
    pub fn from_env() -> Result<Self, OracleError> {
        let fast_backend = load_backend_config("ORACLE_FAST")?;
        let smart_backend = load_backend_config("ORACLE_SMART").ok();

        let call_timeout_ms: u64 = env_or("ORACLE_CALL_TIMEOUT_MS", "15000")?;
        let requests_per_window: u32 = env_or("ORACLE_REQUESTS_PER_WINDOW", "50")?;
        let tokens_per_window: u32 = env_or("ORACLE_TOKENS_PER_WINDOW", "40000")?;
        let window_secs: u64 = env_or("ORACLE_WINDOW_SECS", "60")?;
        let max_admission_retries: u32 = env_or("ORACLE_MAX_ADMISSION_RETRIES", "3")?;

        Ok(Self {
            fast_backend,
            smart_backend,
            call_timeout: Duration::from_millis(call_timeout_ms),
            budget: BudgetConfig {
                requests_per_window,
                tokens_per_window,
                window: Duration::from_secs(window_secs),
            },
            retry: RetryPolicy {
                max_admission_retries,
                ..RetryPolicy::default()
            },
        })
    }
}

/// Read a required environment variable.
fn env_var(name: &str) -> Result<String, OracleError> {
    std::env::var(name)
        .map_err(|e| OracleError::Config(format!("missing required env var {name}: {e}")))
}

/// Read and parse an optional environment variable with a default.
fn env_or<T>(name: &str, default: &str) -> Result<T, OracleError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    std::env::var(name)
        .unwrap_or_else(|_| default.to_owned())
        .parse()
        .map_err(|e| OracleError::Config(format!("invalid {name}: {e}")))
}

/// Parse a backend type name.
pub fn parse_backend_type(name: &str) -> Result<BackendType, OracleError> {
    match name.to_lowercase().as_str() {
        "openai" | "deepseek" | "ollama" | "vllm" => Ok(BackendType::OpenAi),
        "anthropic" | "claude" => Ok(BackendType::Anthropic),
        other => Err(OracleError::Config(format!("unknown backend type: {other}"))),
    }
}

/// Load a backend config from a set of prefixed environment variables.
fn load_backend_config(prefix: &str) -> Result<BackendConfig, OracleError> {
    let backend_type = parse_backend_type(&env_var(&format!("{prefix}_BACKEND"))?)?;
    let api_url = env_var(&format!("{prefix}_API_URL"))?;
    let api_key = env_var(&format!("{prefix}_API_KEY"))?;
    let model = env_var(&format!("{prefix}_MODEL"))?;

    Ok(BackendConfig {
        backend_type,
        api_url,
        api_key,
        model,
    })
}
