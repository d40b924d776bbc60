//! Runtime configuration for the orchestrator.
//!
//! Loaded from the process environment with strict validation; every entry
//! point also accepts a custom key lookup so tests never touch the real
//! environment.

use chrono::Duration;

use crate::error::{Error, Result};
use crate::staging::StagingMode;

const ENV_DEFAULT_BACKEND: &str = "SKUA_JOBS_DEFAULT_BACKEND";
const ENV_MAX_TIME_HOURS: &str = "SKUA_JOBS_MAX_TIME_HOURS";
const ENV_TTL_HOURS: &str = "SKUA_JOBS_TTL_HOURS";
const ENV_STRICT_STAGING: &str = "SKUA_JOBS_STRICT_STAGING";
const ENV_TRANSITION_RETRIES: &str = "SKUA_JOBS_TRANSITION_RETRIES";

const DEFAULT_BACKEND: &str = "abacus";
const DEFAULT_MAX_TIME_HOURS: u64 = 200;
const DEFAULT_TTL_HOURS: u64 = 200;
const DEFAULT_TRANSITION_RETRIES: u64 = 3;

/// Orchestrator limits and policies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Backend used when a submission names none.
    pub default_backend: String,
    /// Ceiling on a submission's requested `max_time`, in hours.
    pub max_time_hours: u64,
    /// Time-to-live after which the reaper force-fails non-terminal jobs.
    pub job_ttl: Duration,
    /// Join semantics for concurrent input transfers.
    pub staging_mode: StagingMode,
    /// Bound on compare-and-swap retries in `propose_state_change`.
    pub transition_retries: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_backend: DEFAULT_BACKEND.to_string(),
            max_time_hours: DEFAULT_MAX_TIME_HOURS,
            job_ttl: Duration::hours(i64::try_from(DEFAULT_TTL_HOURS).unwrap_or(200)),
            staging_mode: StagingMode::default(),
            transition_retries: DEFAULT_TRANSITION_RETRIES,
        }
    }
}

impl OrchestratorConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when an environment value fails
    /// validation.
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Loads configuration with a custom environment source.
    ///
    /// This entry point is test-friendly and accepts a key lookup function.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a value is not a positive integer
    /// (numeric keys), not `true`/`false` (boolean keys), or out of range.
    pub fn from_env_with<F>(get_env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let default_backend =
            get_env(ENV_DEFAULT_BACKEND).unwrap_or_else(|| DEFAULT_BACKEND.to_string());
        let max_time_hours =
            parse_positive_u64_env(&get_env, ENV_MAX_TIME_HOURS, DEFAULT_MAX_TIME_HOURS)?;
        let ttl_hours = parse_positive_u64_env(&get_env, ENV_TTL_HOURS, DEFAULT_TTL_HOURS)?;
        let transition_retries = parse_positive_u64_env(
            &get_env,
            ENV_TRANSITION_RETRIES,
            DEFAULT_TRANSITION_RETRIES,
        )?;
        let staging_mode = match get_env(ENV_STRICT_STAGING).as_deref() {
            None | Some("false") => StagingMode::LetFinish,
            Some("true") => StagingMode::AbortOnFirstFailure,
            Some(other) => {
                return Err(Error::internal(format!(
                    "{ENV_STRICT_STAGING} must be 'true' or 'false', got '{other}'"
                )));
            }
        };

        let job_ttl = Duration::hours(i64::try_from(ttl_hours).map_err(|_| {
            Error::internal(format!(
                "{ENV_TTL_HOURS} value {ttl_hours} exceeds supported range"
            ))
        })?);

        Ok(Self {
            default_backend,
            max_time_hours,
            job_ttl,
            staging_mode,
            transition_retries,
        })
    }
}

fn parse_positive_u64_env<F>(get_env: &F, key: &str, default: u64) -> Result<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = get_env(key) else {
        return Ok(default);
    };

    let parsed = raw
        .parse::<u64>()
        .map_err(|_| Error::internal(format!("{key} must be a positive integer, got '{raw}'")))?;
    if parsed == 0 {
        return Err(Error::internal(format!("{key} must be greater than zero")));
    }
    Ok(parsed)
}
