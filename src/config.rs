use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "VitalScan";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Free-tier models tried in order when none are configured.
pub const DEFAULT_MODELS: &[&str] = &[
    "meta-llama/llama-3.3-70b-instruct:free",
    "google/gemma-2-9b-it:free",
    "mistralai/mistral-7b-instruct:free",
    "qwen/qwen-2.5-72b-instruct:free",
];

/// Tracing filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "vitalscan=info"
}

/// ~/VitalScan/ on all platforms. `None` when the home directory is unknown.
pub fn app_data_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(APP_NAME))
}

/// Default location of the optional JSON config file.
pub fn default_config_path() -> Option<PathBuf> {
    app_data_dir().map(|dir| dir.join("config.json"))
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid value for {var}: {value}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("OPENROUTER_API_KEY is not set")]
    MissingApiKey,

    #[error("At least one model must be configured")]
    NoModels,
}

/// Settings for the chat-completion backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Never written back to disk by `save`.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub base_url: String,
    /// Sent as `HTTP-Referer`.
    pub referer: String,
    /// Sent as `X-Title`.
    pub title: String,
    /// Ordered fallback list.
    pub models: Vec<String>,
    pub timeout_secs: u64,
    pub temperature: f32,
    pub max_tokens: u32,
    pub seed: u64,
    pub top_p: f32,
    /// Treat timeouts like 403/404 and move to the next model.
    pub fallback_on_timeout: bool,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            referer: "http://localhost:3000".to_string(),
            title: APP_NAME.to_string(),
            models: DEFAULT_MODELS.iter().map(|m| m.to_string()).collect(),
            timeout_secs: 120,
            temperature: 0.3,
            max_tokens: 2500,
            seed: 42,
            top_p: 0.9,
            fallback_on_timeout: false,
        }
    }
}

impl AnalyzerConfig {
    /// Defaults, then the config file (if any), then the process environment.
    /// Call [`validate`](Self::validate) before talking to the provider.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let default_path = default_config_path();
        let path = path.or(default_path.as_deref());

        let mut config = match path {
            Some(p) if p.exists() => Self::from_file(p)?,
            _ => Self::default(),
        };
        config.apply_env(|var| std::env::var(var).ok())?;

        tracing::debug!(
            base_url = %config.base_url,
            models = config.models.len(),
            timeout_secs = config.timeout_secs,
            "Analyzer configuration loaded"
        );
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write the config as pretty JSON. The API key is never persisted.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
    }

    /// Overlay environment variables. `lookup` is injectable for tests.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("OPENROUTER_API_KEY") {
            self.api_key = Some(key.trim().to_string());
        }
        if let Some(url) = get("OPENROUTER_BASE_URL") {
            self.base_url = url;
        }
        if let Some(list) = get("OPENROUTER_MODELS") {
            self.models = list
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(referer) = get("APP_URL") {
            self.referer = referer;
        }
        if let Some(title) = get("APP_TITLE") {
            self.title = title;
        }
        if let Some(raw) = get("VITALSCAN_TIMEOUT_SECS") {
            self.timeout_secs = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidEnv {
                    var: "VITALSCAN_TIMEOUT_SECS",
                    value: raw.clone(),
                })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let has_key = self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty());
        if !has_key {
            return Err(ConfigError::MissingApiKey);
        }
        if self.models.iter().all(|m| m.trim().is_empty()) {
            return Err(ConfigError::NoModels);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var: &str| map.get(var).cloned()
    }

    #[test]
    fn defaults_match_provider_expectations() {
        let config = AnalyzerConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.timeout_secs, 120);
        assert_eq!(config.models.len(), DEFAULT_MODELS.len());
        assert!(!config.fallback_on_timeout);
    }

    #[test]
    fn env_overrides_defaults() {
        let mut config = AnalyzerConfig::default();
        config
            .apply_env(env(&[
                ("OPENROUTER_API_KEY", " sk-or-abc "),
                ("OPENROUTER_MODELS", "a/one, b/two,,"),
                ("APP_URL", "https://vitalscan.example"),
                ("VITALSCAN_TIMEOUT_SECS", "45"),
            ]))
            .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("sk-or-abc"));
        assert_eq!(config.models, vec!["a/one", "b/two"]);
        assert_eq!(config.referer, "https://vitalscan.example");
        assert_eq!(config.timeout_secs, 45);
        assert_eq!(config.title, APP_NAME);
    }

    #[test]
    fn bad_timeout_env_rejected() {
        let mut config = AnalyzerConfig::default();
        let err = config
            .apply_env(env(&[("VITALSCAN_TIMEOUT_SECS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { var: "VITALSCAN_TIMEOUT_SECS", .. }));
    }

    #[test]
    fn missing_key_fails_validation() {
        let config = AnalyzerConfig::default();
        assert!(matches!(config.validate(), Err(ConfigError::MissingApiKey)));
    }

    #[test]
    fn empty_model_list_fails_validation() {
        let config = AnalyzerConfig {
            api_key: Some("k".into()),
            models: vec![],
            ..AnalyzerConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::NoModels)));
    }

    #[test]
    fn file_values_loaded_and_key_not_saved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = AnalyzerConfig {
            api_key: Some("secret".into()),
            models: vec!["x/only".into()],
            fallback_on_timeout: true,
            ..AnalyzerConfig::default()
        };
        config.save(&path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(!written.contains("secret"));

        let loaded = AnalyzerConfig::from_file(&path).unwrap();
        assert_eq!(loaded.models, vec!["x/only"]);
        assert!(loaded.fallback_on_timeout);
        assert_eq!(loaded.api_key, None);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"timeout_secs": 30}"#).unwrap();
        let loaded = AnalyzerConfig::from_file(&path).unwrap();
        assert_eq!(loaded.timeout_secs, 30);
        assert_eq!(loaded.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn malformed_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = AnalyzerConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("config.json"));
    }

    #[test]
    fn app_data_dir_under_home() {
        if let (Some(dir), Some(home)) = (app_data_dir(), dirs::home_dir()) {
            assert!(dir.starts_with(home));
            assert!(dir.ends_with(APP_NAME));
        }
    }
}
