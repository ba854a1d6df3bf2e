//! Configuration for both binaries.
//!
//! `dotenv` is loaded once in each `main`; after that every component gets an
//! explicit config struct instead of reading the environment ambiently.

use secrecy::SecretString;
use serde::Deserialize;
use std::env;
use std::path::Path;

use crate::error::{Result, StandError};

pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8888";
pub const DEFAULT_STAND_CONFIG_PATH: &str = "stand_config.toml";
pub const DEFAULT_PROJECT_NAME: &str = "project-from-template";

/// Read a required environment variable. Empty counts as unset so that
/// `KEY=` lines in a .env file don't sneak past validation.
pub fn require_env(name: &str) -> Result<String> {
    match env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(StandError::MissingEnv(name.to_string())),
    }
}

/// Read an optional environment variable, treating empty as unset.
pub fn optional_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn optional_env_u64(name: &str) -> Result<Option<u64>> {
    match optional_env(name) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<u64>()
            .map(Some)
            .map_err(|_| StandError::ConfigError(format!("{} must be numeric, got '{}'", name, raw))),
    }
}

/// Credentials and addressing for the GitLab API client.
#[derive(Debug, Clone)]
pub struct GitLabConfig {
    pub base_url: String,
    pub token: SecretString,
    pub group_id: Option<u64>,
    pub user_id: Option<u64>,
}

impl GitLabConfig {
    pub fn from_env() -> Result<Self> {
        let base_url = require_env("GITLAB_BASE_URL")?;
        let token = SecretString::from(require_env("GITLAB_ACCESS_TOKEN")?);

        Ok(Self {
            // Trailing slashes would double up when joining /api/v4 paths.
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            group_id: optional_env_u64("GITLAB_GROUP_ID")?,
            user_id: optional_env_u64("GITLAB_USER_ID")?,
        })
    }
}

/// Settings for the webhook receiver service.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
    /// When set, inbound webhooks must carry a valid HMAC signature.
    pub webhook_secret: Option<String>,
    /// Nexus credentials are part of the stand's env contract; the receiver
    /// itself never calls Nexus, so they are held but unused here.
    pub nexus_username: Option<String>,
    pub nexus_password: Option<SecretString>,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            bind_address: optional_env("BIND_ADDRESS")
                .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string()),
            webhook_secret: optional_env("NEXUS_WEBHOOK_SECRET"),
            nexus_username: optional_env("NEXUS_USERNAME"),
            nexus_password: optional_env("NEXUS_PASSWORD").map(SecretString::from),
        }
    }
}

/// Parameters for single-project setup, resolved at point of use.
#[derive(Debug, Clone)]
pub struct SetupEnv {
    pub template_id: u64,
    pub project_name: String,
}

impl SetupEnv {
    pub fn from_env() -> Result<Self> {
        let raw_id = require_env("GITLAB_TEMPLATE_ID")?;
        let template_id = raw_id.parse::<u64>().map_err(|_| {
            StandError::ConfigError(format!(
                "GITLAB_TEMPLATE_ID must be a numeric project id, got '{}'",
                raw_id
            ))
        })?;

        Ok(Self {
            template_id,
            project_name: optional_env("PROJECT_NAME")
                .unwrap_or_else(|| DEFAULT_PROJECT_NAME.to_string()),
        })
    }
}

/// Stand bootstrap topology: one group, N module projects from one template.
#[derive(Debug, Deserialize, Clone)]
pub struct StandConfig {
    pub group_id: Option<u64>,
    pub group_name: Option<String>,
    pub template_id: u64,
    #[serde(default = "default_visibility")]
    pub visibility: String,
    #[serde(default)]
    pub module: Vec<ModuleConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModuleConfig {
    pub name: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

fn default_visibility() -> String {
    "private".to_string()
}

/// Load and parse the stand configuration file
pub fn load_stand_config(path: &Path) -> Result<StandConfig> {
    let config_str = std::fs::read_to_string(path).map_err(|e| {
        StandError::ConfigError(format!("Failed to read config file '{}': {}", path.display(), e))
    })?;

    let config: StandConfig = toml::from_str(&config_str)?;

    if config.group_id.is_none() && config.group_name.is_none() {
        return Err(StandError::ConfigError(
            "stand config needs either group_id or group_name".to_string(),
        ));
    }

    Ok(config)
}
