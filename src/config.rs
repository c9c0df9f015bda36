//! Layered settings: built-in defaults, then a TOML file, then environment
//! variables prefixed with `CHAT_RECALL_` (`__` separates nested keys, e.g.
//! `CHAT_RECALL_SEARCH__CUTOFF=0.7`).

use anyhow::{Context, Result, bail};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_PREFIX: &str = "CHAT_RECALL_";
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub clustering: ClusteringConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("chat_history.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Maximum number of distinct inputs shortlisted per query
    pub limit: usize,
    /// Minimum similarity ratio for an input to be shortlisted
    pub cutoff: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            limit: 5,
            cutoff: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringConfig {
    pub max_clusters: usize,
    pub seed: u64,
    pub max_iterations: usize,
    /// Relative to the mean per-feature variance of the input
    pub tolerance: f64,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            max_clusters: 5,
            seed: 42,
            max_iterations: 300,
            tolerance: 1e-4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    pub base_url: String,
    pub model: String,
    pub system_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4".to_string(),
            system_prompt: "You are a helpful assistant.".to_string(),
            timeout_secs: None,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl Settings {
    /// Default location of the config file, if the platform has one.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("chat-recall").join("config.toml"))
    }

    /// Loads settings, merging `config_file` (when given) over the defaults
    /// and the environment over both. A missing file is not an error.
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()));
        if let Some(path) = config_file {
            figment = figment.merge(Toml::file(path));
        }
        let mut settings: Settings = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("Failed to load configuration")?;

        if settings.completion.api_key.is_none() {
            settings.completion.api_key = std::env::var(API_KEY_ENV)
                .ok()
                .filter(|key| !key.trim().is_empty());
        }

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.search.limit == 0 {
            bail!("search.limit must be greater than zero");
        }
        if !(0.0..=1.0).contains(&self.search.cutoff) {
            bail!("search.cutoff must be within [0, 1], got {}", self.search.cutoff);
        }
        if self.clustering.max_clusters == 0 {
            bail!("clustering.max_clusters must be greater than zero");
        }
        if self.clustering.max_iterations == 0 {
            bail!("clustering.max_iterations must be greater than zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.database.path, PathBuf::from("chat_history.db"));
        assert_eq!(settings.search.limit, 5);
        assert_eq!(settings.search.cutoff, 0.5);
        assert_eq!(settings.clustering.max_clusters, 5);
        assert_eq!(settings.clustering.seed, 42);
        assert_eq!(settings.completion.model, "gpt-4");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_toml_file_overrides_defaults() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[database]\npath = \"other.db\"\n\n[search]\nlimit = 3\ncutoff = 0.7\n",
        )?;

        let settings = Settings::load(Some(&path))?;
        assert_eq!(settings.database.path, PathBuf::from("other.db"));
        assert_eq!(settings.search.limit, 3);
        assert_eq!(settings.search.cutoff, 0.7);
        assert_eq!(settings.clustering.seed, 42);
        Ok(())
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() -> Result<()> {
        let dir = tempdir()?;
        let settings = Settings::load(Some(&dir.path().join("absent.toml")))?;
        assert_eq!(settings.search.limit, 5);
        Ok(())
    }

    #[test]
    fn test_invalid_cutoff_rejected() {
        let mut settings = Settings::default();
        settings.search.cutoff = 1.5;
        assert!(settings.validate().is_err());
    }
}
