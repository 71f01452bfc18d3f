//! Orchestrator and oracle configuration.
//!
//! Values come from an optional TOML file; anything missing falls back to
//! the defaults below. Command-line flags are applied on top by the binary.
//!
//! ```toml
//! [orchestrator]
//! endpoints = ["http://localhost:5000", "http://localhost:5001"]
//! request_timeout_secs = 30
//! max_rounds = 8
//!
//! [oracle]
//! model = "gpt-4o-mini"
//! ```

use std::path::Path;
use std::time::Duration;

use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::transport::Endpoint;

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Conversation loop settings.
    pub orchestrator: OrchestratorConfig,
    /// Decision oracle settings.
    pub oracle: OracleConfig,
}

/// Orchestrator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Resource services, in registration order.
    pub endpoints: Vec<Endpoint>,
    /// Timeout for a single service call, in seconds.
    pub request_timeout_secs: u64,
    /// Timeout for a single oracle decision, in seconds.
    pub oracle_timeout_secs: u64,
    /// Oracle decisions allowed per user input.
    pub max_rounds: usize,
    /// Year assumed when the user gives a date without one.
    pub default_year: i32,
}

impl OrchestratorConfig {
    /// Service call timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Oracle decision timeout.
    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_secs(self.oracle_timeout_secs)
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            endpoints: vec![
                Endpoint::new("http://localhost:5000"),
                Endpoint::new("http://localhost:5001"),
            ],
            request_timeout_secs: 30,
            oracle_timeout_secs: 120,
            max_rounds: 8,
            default_year: Utc::now().year(),
        }
    }
}

/// OpenAI-compatible oracle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// API base, without the `/chat/completions` suffix.
    pub base_url: String,
    /// Model name.
    pub model: String,
    /// Environment variable holding the API key. Unset means no auth header.
    pub api_key_env: String,
    /// Sampling temperature.
    pub temperature: f32,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 0.2,
        }
    }
}

/// Load configuration from a TOML file, or defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => {
            debug!(path = %path.display(), "loading configuration");
            let raw = std::fs::read_to_string(path)
                .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
            parse_config(&raw)?
        }
        None => Config::default(),
    };
    Ok(config)
}

/// Parse configuration from TOML text.
pub fn parse_config(raw: &str) -> Result<Config> {
    toml::from_str(raw).map_err(|e| Error::Config(e.to_string()))
}

/// Reject configurations the orchestrator cannot run with.
pub fn validate_config(config: &Config) -> Result<()> {
    let orchestrator = &config.orchestrator;
    if orchestrator.endpoints.is_empty() {
        return Err(Error::Config("at least one endpoint is required".into()));
    }
    if orchestrator.max_rounds == 0 {
        return Err(Error::Config("max_rounds must be greater than 0".into()));
    }
    if orchestrator.request_timeout_secs == 0 || orchestrator.oracle_timeout_secs == 0 {
        return Err(Error::Config("timeouts must be greater than 0".into()));
    }
    if config.oracle.model.trim().is_empty() {
        return Err(Error::Config("oracle model must not be empty".into()));
    }
    Ok(())
}
