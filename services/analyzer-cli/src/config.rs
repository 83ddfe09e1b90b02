//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The config file is optional when `ANALYZER_BASE_URL` supplies the API
//! location; tokens never go in it (they live in the credential file).

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Root configuration
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// Remote API settings
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub base_url: String,
    /// Upper bound for any single request, including the refresh exchange
    /// and long-running analysis calls.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout_secs: default_timeout(),
        }
    }
}

/// Where the signed-in session is kept between runs
#[derive(Debug, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_credentials_path")]
    pub credentials_path: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            credentials_path: default_credentials_path(),
        }
    }
}

fn default_timeout() -> u64 {
    120
}

fn default_credentials_path() -> PathBuf {
    let base = std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    base.join(".circuit-analyzer").join("credentials.json")
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Overlay:
    /// 1. ANALYZER_BASE_URL replaces `api.base_url`
    /// 2. ANALYZER_CREDENTIALS_PATH replaces `session.credentials_path`
    pub fn load(path: &Path) -> common::Result<Self> {
        let mut config: Config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str(&contents)?
        } else if std::env::var_os("ANALYZER_BASE_URL").is_some() {
            Config::default()
        } else {
            return Err(common::Error::Config(format!(
                "config file {} not found and ANALYZER_BASE_URL is not set",
                path.display()
            )));
        };

        if let Ok(url) = std::env::var("ANALYZER_BASE_URL") {
            config.api.base_url = url;
        }
        if let Some(path) = std::env::var_os("ANALYZER_CREDENTIALS_PATH") {
            config.session.credentials_path = PathBuf::from(path);
        }

        // Validate base_url is a valid URL with http(s) scheme
        if !config.api.base_url.starts_with("http://")
            && !config.api.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {:?}",
                config.api.base_url
            )));
        }

        if config.api.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        Ok(config)
    }

    /// Config file path: `--config` (or CONFIG_PATH, folded in by clap),
    /// else `circuit-analyzer.toml` in the working directory.
    pub fn resolve_path(cli_path: Option<PathBuf>) -> PathBuf {
        cli_path.unwrap_or_else(|| PathBuf::from("circuit-analyzer.toml"))
    }
}
