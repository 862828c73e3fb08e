//! Runtime configuration.
//!
//! Values are layered, later layers winning:
//! 1. built-in defaults
//! 2. an optional YAML file (`--config`)
//! 3. process environment, after a `.env` file has been loaded into it
//!
//! | Variable              | Field                         |
//! |-----------------------|-------------------------------|
//! | `OPIK_URL_OVERRIDE`   | `registry.base_url`           |
//! | `OPIK_API_KEY`        | `registry.api_key`            |
//! | `OPIK_WORKSPACE`      | `registry.workspace`          |
//! | `OPENAI_BASE_URL`     | `judge.base_url`              |
//! | `OPENAI_API_KEY`      | `judge.api_key`               |
//! | `JUDGE_MODEL`         | `judge.model`                 |
//! | `OPTIMIZER_URL`       | `optimizer.base_url`          |
//! | `OPTIMIZER_API_KEY`   | `optimizer.api_key`           |
//! | `OPTIMIZE_N_SAMPLES`  | `n_samples`                   |
//! | `OPTIMIZE_TIMEOUT_SECS` | `timeout_secs`              |

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::optimizer::OptimizerSettings;

pub const DEFAULT_REGISTRY_URL: &str = "https://www.comet.com/opik/api";
pub const DEFAULT_JUDGE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_JUDGE_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_OPTIMIZER_URL: &str = "http://localhost:8080";
/// Trials the optimizer may spend on each dataset item.
pub const DEFAULT_N_SAMPLES: usize = 10;
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while assembling the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The `.env` file exists but could not be read or parsed.
    #[error("Failed to load env file: {0}")]
    EnvFile(#[from] dotenvy::Error),

    /// The YAML config file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The YAML config file is malformed.
    #[error("Invalid config file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A setting holds a value that cannot be used.
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Where prompts and datasets are read from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_REGISTRY_URL.to_string(),
            api_key: None,
            workspace: None,
        }
    }
}

/// The model that judges answer relevance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgeSettings {
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f64,
}

impl Default for JudgeSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_JUDGE_URL.to_string(),
            api_key: None,
            model: DEFAULT_JUDGE_MODEL.to_string(),
            temperature: 0.0,
        }
    }
}

/// The optimizer service endpoint and the search parameters sent to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerServiceSettings {
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub settings: OptimizerSettings,
}

impl Default for OptimizerServiceSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OPTIMIZER_URL.to_string(),
            api_key: None,
            settings: OptimizerSettings::default(),
        }
    }
}

/// Complete configuration for one process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizeConfig {
    pub registry: RegistrySettings,
    pub judge: JudgeSettings,
    pub optimizer: OptimizerServiceSettings,
    /// Sample budget handed to the optimizer for each item.
    pub n_samples: usize,
    /// HTTP timeout for every external call.
    pub timeout_secs: u64,
}

impl Default for OptimizeConfig {
    fn default() -> Self {
        Self {
            registry: RegistrySettings::default(),
            judge: JudgeSettings::default(),
            optimizer: OptimizerServiceSettings::default(),
            n_samples: DEFAULT_N_SAMPLES,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl OptimizeConfig {
    /// Build the configuration: defaults, then `config_file`, then the
    /// process environment.
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match config_file {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::default(),
        };
        let config = base.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Read a YAML file; keys it omits keep their defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    /// Override fields from the variables `lookup` knows about.
    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("OPIK_URL_OVERRIDE") {
            self.registry.base_url = url;
        }
        if let Some(key) = get("OPIK_API_KEY") {
            self.registry.api_key = Some(key);
        }
        if let Some(workspace) = get("OPIK_WORKSPACE") {
            self.registry.workspace = Some(workspace);
        }
        if let Some(url) = get("OPENAI_BASE_URL") {
            self.judge.base_url = url;
        }
        if let Some(key) = get("OPENAI_API_KEY") {
            self.judge.api_key = Some(key);
        }
        if let Some(model) = get("JUDGE_MODEL") {
            self.judge.model = model;
        }
        if let Some(url) = get("OPTIMIZER_URL") {
            self.optimizer.base_url = url;
        }
        if let Some(key) = get("OPTIMIZER_API_KEY") {
            self.optimizer.api_key = Some(key);
        }
        if let Some(raw) = get("OPTIMIZE_N_SAMPLES") {
            self.n_samples = parse_number("OPTIMIZE_N_SAMPLES", &raw)?;
        }
        if let Some(raw) = get("OPTIMIZE_TIMEOUT_SECS") {
            self.timeout_secs = parse_number("OPTIMIZE_TIMEOUT_SECS", &raw)?;
        }

        Ok(self)
    }

    /// Reject settings no job can run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_samples == 0 {
            return Err(ConfigError::InvalidValue {
                key: "n_samples".to_string(),
                value: "0".to_string(),
            });
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "timeout_secs".to_string(),
                value: "0".to_string(),
            });
        }
        for (key, url) in [
            ("registry.base_url", &self.registry.base_url),
            ("judge.base_url", &self.judge.base_url),
            ("optimizer.base_url", &self.optimizer.base_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: url.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

/// Load a `.env` file into the process environment.
///
/// With an explicit `path` the file must exist. Without one, `.env` is
/// searched for from the working directory upwards and silently skipped when
/// there is none. Variables already set in the environment are kept.
pub fn load_env_file(path: Option<&Path>) -> Result<Option<PathBuf>, ConfigError> {
    match path {
        Some(path) => {
            dotenvy::from_path(path)?;
            Ok(Some(path.to_path_buf()))
        }
        None => match dotenvy::dotenv() {
            Ok(found) => Ok(Some(found)),
            Err(e) if e.not_found() => Ok(None),
            Err(e) => Err(e.into()),
        },
    }
}
