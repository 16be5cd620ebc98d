//! Configuration management

use std::{env, path::Path, sync::OnceLock, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::credential::DEFAULT_HEADER_NAME;
use crate::router::DEFAULT_BASE_URL;
use crate::spec::DEFAULT_SPEC_URL;
use crate::{Error, Result};

/// Prefix of the environment variables read into [`Config`]
pub const ENV_PREFIX: &str = "PORTAL_";

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Environment files loaded before environment variables are read.
    /// Paths support ~ expansion; later files do not override variables
    /// that are already set.
    pub env_files: Vec<String>,
    /// Portal da Transparência API key (`PORTAL_API_KEY`)
    ///
    /// Supports `${VAR}` and `${VAR:-default}`. Empty means no key.
    pub api_key: Option<String>,
    /// Header carrying the key
    pub header_name: String,
    /// API description URL
    pub spec_url: String,
    /// Base URL tool calls are sent to
    pub base_url: String,
    /// Endpoint probed by the remote key test; defaults to `spec_url`
    pub test_endpoint: Option<String>,
    /// Interval between checks for a changed API description
    #[serde(with = "humantime_serde")]
    pub spec_refresh: Option<Duration>,
    /// Health endpoint
    pub health: HealthConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            env_files: vec![".env".to_string()],
            api_key: None,
            header_name: DEFAULT_HEADER_NAME.to_string(),
            spec_url: DEFAULT_SPEC_URL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            test_endpoint: None,
            spec_refresh: None,
            health: HealthConfig::default(),
        }
    }
}

/// Health endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Serve `GET /health`
    pub enabled: bool,
    /// Bind host
    pub host: String,
    /// Bind port
    pub port: u16,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl Config {
    /// Load configuration from an optional YAML file and the environment
    ///
    /// Precedence, lowest first: defaults, the file, `PORTAL_*` variables
    /// (nested keys separated by `__`, e.g. `PORTAL_HEALTH__PORT`). Env
    /// files named by the first pass are loaded and the sources are read
    /// again so their variables take effect.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file does not exist or a value has
    /// the wrong type.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!("Config file not found: {}", p.display())));
            }
        }

        let first: Self = Self::figment(path)
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;
        if first.load_env_files() == 0 {
            return Ok(first.finish());
        }

        let config: Self = Self::figment(path)
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;
        Ok(config.finish())
    }

    fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::new();
        if let Some(p) = path {
            figment = figment.merge(Yaml::file(p));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load environment files into the process environment
    ///
    /// Returns how many files were loaded. Missing files are skipped.
    fn load_env_files(&self) -> usize {
        let mut loaded = 0;
        for path_str in &self.env_files {
            let expanded = expand_home(path_str);
            let path = Path::new(&expanded);
            if !path.exists() {
                tracing::debug!("Env file not found (skipped): {expanded}");
                continue;
            }
            match dotenvy::from_path(path) {
                Ok(()) => {
                    tracing::info!("Loaded env file: {expanded}");
                    loaded += 1;
                }
                Err(e) => tracing::warn!("Failed to load env file {expanded}: {e}"),
            }
        }
        loaded
    }

    /// Expand `${VAR}` references and normalize empty values
    fn finish(mut self) -> Self {
        self.api_key = self
            .api_key
            .map(|k| expand_string(&k).trim().to_string())
            .filter(|k| !k.is_empty());
        self.spec_url = expand_string(&self.spec_url);
        self.base_url = expand_string(&self.base_url);
        self.test_endpoint = self
            .test_endpoint
            .map(|e| expand_string(&e))
            .filter(|e| !e.is_empty());
        self
    }

    /// Override the description URL (CLI flag)
    #[must_use]
    pub fn with_spec_url(mut self, url: Option<String>) -> Self {
        if let Some(url) = url {
            self.spec_url = url;
        }
        self
    }

    /// Endpoint used by the remote key test
    #[must_use]
    pub fn test_endpoint(&self) -> &str {
        self.test_endpoint.as_deref().unwrap_or(&self.spec_url)
    }
}

fn expand_home(path: &str) -> String {
    match dirs::home_dir() {
        Some(home) if path.starts_with('~') => path.replacen('~', &home.display().to_string(), 1),
        _ => path.to_string(),
    }
}

/// Expand `${VAR}` and `${VAR:-default}` in a string
fn expand_string(value: &str) -> String {
    static VAR_RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::unwrap_used)]
    let re = VAR_RE.get_or_init(|| Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").unwrap());

    re.replace_all(value, |caps: &regex::Captures| {
        let var_name = &caps[1];
        let default = caps.get(2).map_or("", |m| m.as_str());
        env::var(var_name).unwrap_or_else(|_| default.to_string())
    })
    .into_owned()
}
