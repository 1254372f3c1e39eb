//! User configuration.
//!
//! Values come from `<config_dir>/config.json` and are overridden by the
//! environment. `config_dir` is `~/.config/prepf` unless `PREPF_CONFIG_DIR`
//! points elsewhere. The file is optional; unknown fields are rejected:
//!
//! ```json
//! {
//!   "api_key": "<gemini api key>",
//!   "timeout_sec": 30,
//!   "token_limit": 1000000,
//!   "model": "gemini-2.5-flash",
//!   "safety_threshold": "HIGH"
//! }
//! ```

use std::fs;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub const CONFIG_DIR_NAME: &str = "prepf";
pub const CONFIG_FILE_NAME: &str = "config.json";
pub const PROFILE_FILE_NAME: &str = "profile.md";

pub const ENV_API_KEY: &str = "GEMINI_API_KEY";
pub const ENV_CONFIG_DIR: &str = "PREPF_CONFIG_DIR";
pub const ENV_TIMEOUT: &str = "PREPF_TIMEOUT";
pub const ENV_TOKEN_LIMIT: &str = "PREPF_TOKEN_LIMIT";
pub const ENV_MODEL: &str = "PREPF_MODEL";
pub const ENV_NO_COLOR: &str = "NO_COLOR";

pub const DEFAULT_TIMEOUT_SEC: u64 = 30;
pub const DEFAULT_TOKEN_LIMIT: u64 = 1_000_000;
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_SAFETY_THRESHOLD: &str = "HIGH";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine the home directory")]
    NoHomeDir,

    #[error("I/O error while {operation} at {}: {source}", path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value for {field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

impl ConfigError {
    fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            message: message.into(),
        }
    }
}

/// Paths given on the command line, taking precedence over the defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    /// Config file to read instead of `<config_dir>/config.json`. Must exist.
    pub config_file: Option<PathBuf>,
    pub profile_path: Option<PathBuf>,
}

/// On-disk shape of `config.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub api_key: Option<String>,
    pub timeout_sec: Option<u64>,
    pub token_limit: Option<u64>,
    pub model: Option<String>,
    pub safety_threshold: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub api_key: String,
    pub timeout: Duration,
    pub token_limit: u64,
    pub model: String,
    pub safety_threshold: String,
    pub no_color: bool,
    pub is_tty: bool,
    pub config_dir: PathBuf,
    pub profile_path: PathBuf,
}

impl AppConfig {
    /// Loads from the default directory and the process environment.
    pub fn load(overrides: &ConfigOverrides) -> Result<Self, ConfigError> {
        let env = |key: &str| std::env::var(key).ok();
        let config_dir = config_dir(&env)?;
        Self::load_from(&config_dir, overrides, env)
    }

    /// Loads the config file, applies `env` overrides, then the path overrides.
    pub fn load_from(
        config_dir: &Path,
        overrides: &ConfigOverrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        fs::create_dir_all(config_dir)
            .map_err(|source| ConfigError::io("creating config directory", config_dir, source))?;

        let (path, required) = match &overrides.config_file {
            Some(path) => (path.clone(), true),
            None => (config_dir.join(CONFIG_FILE_NAME), false),
        };
        let file = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str::<FileConfig>(&raw)
                .map_err(|source| ConfigError::Parse {
                    path: path.clone(),
                    source,
                })?,
            Err(error) if error.kind() == io::ErrorKind::NotFound && !required => {
                FileConfig::default()
            }
            Err(source) => return Err(ConfigError::io("reading config file", &path, source)),
        };

        let mut config = Self::resolve(file, env, config_dir, io::stdout().is_terminal())?;
        if let Some(profile_path) = &overrides.profile_path {
            config.profile_path = profile_path.clone();
        }
        Ok(config)
    }

    /// Merges file values, environment overrides and defaults.
    pub fn resolve(
        file: FileConfig,
        env: impl Fn(&str) -> Option<String>,
        config_dir: &Path,
        is_tty: bool,
    ) -> Result<Self, ConfigError> {
        let api_key = non_empty(env(ENV_API_KEY))
            .or_else(|| non_empty(file.api_key))
            .unwrap_or_default();

        let timeout_sec = match non_empty(env(ENV_TIMEOUT)) {
            Some(raw) => parse_u64(ENV_TIMEOUT, &raw)?,
            None => file.timeout_sec.unwrap_or(DEFAULT_TIMEOUT_SEC),
        };
        if timeout_sec == 0 {
            return Err(ConfigError::invalid("timeout_sec", "must be > 0"));
        }

        let token_limit = match non_empty(env(ENV_TOKEN_LIMIT)) {
            Some(raw) => parse_u64(ENV_TOKEN_LIMIT, &raw)?,
            None => file.token_limit.unwrap_or(DEFAULT_TOKEN_LIMIT),
        };

        let model = non_empty(env(ENV_MODEL))
            .or_else(|| non_empty(file.model))
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let safety_threshold = non_empty(file.safety_threshold)
            .unwrap_or_else(|| DEFAULT_SAFETY_THRESHOLD.to_string());

        let no_color = non_empty(env(ENV_NO_COLOR)).is_some() || !is_tty;

        Ok(Self {
            api_key,
            timeout: Duration::from_secs(timeout_sec),
            token_limit,
            model,
            safety_threshold,
            no_color,
            is_tty,
            config_dir: config_dir.to_path_buf(),
            profile_path: config_dir.join(PROFILE_FILE_NAME),
        })
    }
}

/// `$PREPF_CONFIG_DIR`, or `~/.config/prepf`.
pub fn config_dir(env: &impl Fn(&str) -> Option<String>) -> Result<PathBuf, ConfigError> {
    if let Some(dir) = non_empty(env(ENV_CONFIG_DIR)) {
        return Ok(PathBuf::from(dir));
    }
    let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
    Ok(home.join(".config").join(CONFIG_DIR_NAME))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_u64(field: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.parse::<u64>()
        .map_err(|error| ConfigError::invalid(field, format!("{raw:?} ({error})")))
}
