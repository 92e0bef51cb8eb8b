//! Process-wide settings, resolved once at startup.
//!
//! Nothing here writes to the environment. `Settings::from_env` reads it (after
//! loading `.env` if one exists) and `Settings::from_lookup` does the same job
//! against any key lookup, which is what the tests use.

use anyhow::{Context, Result};
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_MAX_TURNS: usize = 8;

/// Everything the agent side needs: credential, model and bounds.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    /// Credential for the external runtime. `None` means "not configured".
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: Option<String>,
    /// `None` disables the per-invocation bound.
    pub timeout: Option<Duration>,
    pub max_turns: usize,
    pub pipeline_path: Option<String>,
    pub startup_check: bool,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: None,
            timeout: Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            max_turns: DEFAULT_MAX_TURNS,
            pipeline_path: None,
            startup_check: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    /// Shared secret expected in `x-api-key`.
    pub api_key: Option<String>,
    pub agent: AgentSettings,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Blank values are treated the same as missing ones.
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let port = match get("PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("PORT must be a valid port number, got '{}'", raw))?,
            None => DEFAULT_PORT,
        };

        let timeout = match get("AGENT_TIMEOUT_SECS") {
            Some(raw) => {
                let secs = raw.parse::<u64>().with_context(|| {
                    format!("AGENT_TIMEOUT_SECS must be a whole number, got '{}'", raw)
                })?;
                (secs > 0).then(|| Duration::from_secs(secs))
            }
            None => Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
        };

        let max_turns = match get("AGENT_MAX_TURNS") {
            Some(raw) => {
                let turns = raw.parse::<usize>().with_context(|| {
                    format!("AGENT_MAX_TURNS must be a whole number, got '{}'", raw)
                })?;
                anyhow::ensure!(turns > 0, "AGENT_MAX_TURNS must be at least 1");
                turns
            }
            None => DEFAULT_MAX_TURNS,
        };

        let startup_check = get("AGENT_STARTUP_CHECK")
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(false);

        Ok(Self {
            port,
            api_key: get("API_KEY"),
            agent: AgentSettings {
                api_key: get("OPENAI_API_KEY"),
                model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                base_url: get("OPENAI_BASE_URL"),
                timeout,
                max_turns,
                pipeline_path: get("AGENT_PIPELINE_PATH"),
                startup_check,
            },
        })
    }
}
