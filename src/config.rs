use crate::catalog::Manufacturer;
use crate::error::{ConfigError, SizectlError};
use crate::utils::ensure_parent_dir;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sizing: SizingConfig,
    pub ai: AiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SizingConfig {
    /// Used when a VM row has no (or an unrecognized) manufacturer
    pub default_manufacturer: String,
    /// Catalog location (local path or s3://bucket/key)
    pub catalog: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// OpenAI-compatible chat completions endpoint
    pub endpoint: Option<String>,
    pub model: String,
    /// Environment variable holding the API key, if the endpoint needs one
    pub api_key_env: Option<String>,
    pub max_retries: u32,
    pub timeout_secs: u64,
    pub cache_ttl_secs: u64,
    pub max_concurrency: usize,
    pub candidate_limit: usize,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            default_manufacturer: "Intel".to_string(),
            catalog: None,
        }
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            model: "us.amazon.nova-micro-v1:0".to_string(),
            api_key_env: Some("SIZECTL_AI_API_KEY".to_string()),
            max_retries: 3,
            timeout_secs: 30,
            cache_ttl_secs: 3600,
            max_concurrency: 10,
            candidate_limit: 20,
        }
    }
}

impl AiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn require_endpoint(&self) -> std::result::Result<&str, ConfigError> {
        self.endpoint
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingField("ai.endpoint".to_string()))
    }

    /// API key from the configured environment variable, if set
    pub fn api_key(&self) -> Option<String> {
        self.api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|k| !k.is_empty())
    }
}

/// `.sizectl.toml` in the working directory, else `<config_dir>/sizectl/config.toml`
fn default_config_path() -> PathBuf {
    let local = PathBuf::from(".sizectl.toml");
    if local.exists() {
        return local;
    }
    match dirs::config_dir() {
        Some(dir) => dir.join("sizectl").join("config.toml"),
        None => local,
    }
}

impl Config {
    /// Load from `path` or the default search locations; a missing file yields defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let explicit = path.is_some();
        let location = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);

        if !location.is_file() {
            if explicit {
                tracing::warn!(
                    "No config at {}, continuing with defaults (create one with 'sizectl init')",
                    location.display()
                );
            }
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(&location)
            .with_context(|| format!("Cannot read {}", location.display()))?;
        let parsed: Config = toml::from_str(&raw)
            .map_err(|e| SizectlError::from(ConfigError::ParseError(e.to_string())))
            .with_context(|| {
                format!(
                    "{} is not a valid sizectl config (expects [sizing] and [ai] tables; 'sizectl init' writes a fresh one)",
                    location.display()
                )
            })?;
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn validate(&self) -> std::result::Result<(), SizectlError> {
        self.default_manufacturer()?;
        if self.ai.max_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "ai.max_concurrency".to_string(),
                reason: "must be at least 1".to_string(),
            }
            .into());
        }
        Ok(())
    }

    pub fn default_manufacturer(&self) -> std::result::Result<Manufacturer, SizectlError> {
        Manufacturer::parse(&self.sizing.default_manufacturer).ok_or_else(|| {
            ConfigError::InvalidValue {
                field: "sizing.default_manufacturer".to_string(),
                reason: format!(
                    "'{}' is not one of Intel, AMD, AWS",
                    self.sizing.default_manufacturer
                ),
            }
            .into()
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let rendered = toml::to_string_pretty(self).context("Cannot render config as TOML")?;
        ensure_parent_dir(path)?;
        std::fs::write(path, rendered).with_context(|| format!("Cannot write {}", path.display()))
    }
}

/// Write the default config to `output`
pub fn init_config(output: &Path) -> Result<()> {
    Config::default().save(output)?;
    println!("Wrote {}", output.display());
    Ok(())
}
