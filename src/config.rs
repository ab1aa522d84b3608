//! Planner configuration.
//!
//! Layered as: defaults, then a JSON file (`<config_dir>/okr-planner/config.json`
//! or an explicit path), then environment variables. CLI flags are applied
//! on top by the binary.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};

const APP_NAME: &str = "okr-planner";
const CONFIG_FILE: &str = "config.json";

pub const DEFAULT_GEMINI_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlannerConfig {
    pub server: ServerConfig,
    pub reasoning: ReasoningConfig,
    pub tracker: TrackerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins. Empty means any origin.
    pub cors_origins: Vec<String>,
    /// Requests per minute per client IP. Unlimited when unset.
    pub rate_limit: Option<u32>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors_origins: Vec::new(),
            rate_limit: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReasoningConfig {
    pub api_url: String,
    /// Without a key the offline fallback backend is used.
    pub api_key: Option<String>,
    pub temperature: f32,
    pub request_timeout_secs: u64,
    /// Upper bound on one stage's backend call, on top of the HTTP timeout.
    pub stage_timeout_secs: Option<u64>,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_GEMINI_URL.to_string(),
            api_key: None,
            temperature: 0.7,
            request_timeout_secs: 30,
            stage_timeout_secs: None,
        }
    }
}

impl ReasoningConfig {
    pub fn stage_timeout(&self) -> Option<Duration> {
        self.stage_timeout_secs.map(Duration::from_secs)
    }
}

/// Default tracker credentials. Any field may be overridden per request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrackerConfig {
    pub base_url: Option<String>,
    pub email: Option<String>,
    pub api_token: Option<String>,
    pub project_key: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            email: None,
            api_token: None,
            project_key: None,
            request_timeout_secs: 30,
        }
    }
}

impl PlannerConfig {
    /// Load from the user's config directory.
    /// Returns defaults if the file doesn't exist or fails to parse.
    pub fn load() -> Self {
        let path = match default_config_path() {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!("No config directory, using defaults: {}", e);
                return Self::default();
            }
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config, using defaults: {:#}", e);
                Self::default()
            }
        }
    }

    /// Load from an explicit file. Errors are surfaced, not swallowed.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// File layer (explicit path or default location) plus the process
    /// environment.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from(path)?,
            None => Self::load(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply environment overrides. `lookup` is `std::env::var` in
    /// production and a map in tests.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(host) = get("OKRP_HOST") {
            self.server.host = host;
        }
        if let Some(port) = get("OKRP_PORT").and_then(|v| parse_or_warn("OKRP_PORT", &v)) {
            self.server.port = port;
        }
        if let Some(origins) = get("OKRP_CORS_ORIGINS") {
            self.server.cors_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(limit) = get("OKRP_RATE_LIMIT").and_then(|v| parse_or_warn("OKRP_RATE_LIMIT", &v)) {
            self.server.rate_limit = Some(limit);
        }

        if let Some(url) = get("GEMINI_API_URL") {
            self.reasoning.api_url = url;
        }
        if let Some(key) = get("GEMINI_API_KEY") {
            self.reasoning.api_key = Some(key);
        }
        if let Some(secs) = get("OKRP_STAGE_TIMEOUT_SECS")
            .and_then(|v| parse_or_warn("OKRP_STAGE_TIMEOUT_SECS", &v))
        {
            self.reasoning.stage_timeout_secs = Some(secs);
        }

        if let Some(url) = get("JIRA_URL") {
            self.tracker.base_url = Some(url);
        }
        if let Some(email) = get("JIRA_EMAIL") {
            self.tracker.email = Some(email);
        }
        if let Some(token) = get("JIRA_API_TOKEN") {
            self.tracker.api_token = Some(token);
        }
        if let Some(key) = get("JIRA_PROJECT_KEY") {
            self.tracker.project_key = Some(key);
        }
    }
}

fn parse_or_warn<T: std::str::FromStr>(key: &str, value: &str) -> Option<T> {
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!("Ignoring invalid {}: {:?}", key, value);
            None
        }
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    let mut path =
        config_dir().ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
    path.push(APP_NAME);
    path.push(CONFIG_FILE);
    Ok(path)
}
