// Configuration - TOML file with per-field defaults

use super::backends::{BackendError, GeminiSettings};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = ".wardrobe.toml";

/// Configuration for the try-on system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TryOnConfig {
    #[serde(default)]
    pub gemini: GeminiConfig,

    /// Upper bound for a single generation request
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Where generated images are written
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Overrides the platform data directory for the first-run flag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,

    #[serde(default)]
    pub watch: WatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Glob patterns for files the drop folders ignore
    #[serde(default = "default_ignore_patterns")]
    pub ignore_patterns: Vec<String>,

    #[serde(default = "default_debounce")]
    pub debounce_ms: u64,
}

fn default_request_timeout() -> u64 {
    120_000
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./tryon-results")
}

fn default_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_model() -> String {
    "gemini-2.5-flash-image-preview".to_string()
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

fn default_ignore_patterns() -> Vec<String> {
    vec!["**/*.tmp".to_string(), "**/*.part".to_string(), "**/*.crdownload".to_string()]
}

fn default_debounce() -> u64 {
    300
}

impl Default for TryOnConfig {
    fn default() -> Self {
        Self {
            gemini: GeminiConfig::default(),
            request_timeout_ms: default_request_timeout(),
            output_dir: default_output_dir(),
            state_dir: None,
            watch: WatchConfig::default(),
        }
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            api_key_env: default_api_key_env(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            ignore_patterns: default_ignore_patterns(),
            debounce_ms: default_debounce(),
        }
    }
}

impl TryOnConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Look for a config file in the current directory, then the home directory
    pub fn find() -> Option<PathBuf> {
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            return Some(local);
        }

        dirs::home_dir()
            .map(|home| home.join(CONFIG_FILE_NAME))
            .filter(|path| path.exists())
    }

    /// Load the discovered config file, or defaults when there is none
    pub fn load() -> Result<(Self, Option<PathBuf>), ConfigError> {
        match Self::find() {
            Some(path) => {
                let config = Self::from_file(&path)?;
                tracing::info!(path = %path.display(), "loaded configuration");
                Ok((config, Some(path)))
            }
            None => {
                tracing::debug!("no configuration file found, using defaults");
                Ok((Self::default(), None))
            }
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Resolve the API key and build Gemini connection settings
    pub fn gemini_settings(&self) -> Result<GeminiSettings, BackendError> {
        let api_key = std::env::var(&self.gemini.api_key_env).map_err(|_| {
            BackendError::Config(format!(
                "environment variable {} is not set",
                self.gemini.api_key_env
            ))
        })?;

        Ok(GeminiSettings {
            endpoint: self.gemini.endpoint.clone(),
            model: self.gemini.model.clone(),
            api_key,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: TryOnConfig = toml::from_str(
            r#"
            request_timeout_ms = 5000

            [gemini]
            model = "custom-image-model"
            "#,
        )
        .unwrap();

        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.gemini.model, "custom-image-model");
        assert_eq!(config.gemini.endpoint, default_endpoint());
        assert_eq!(config.gemini.api_key_env, "GEMINI_API_KEY");
        assert_eq!(config.watch.debounce_ms, 300);
        assert!(config.state_dir.is_none());
    }

    #[test]
    fn test_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        let mut config = TryOnConfig::default();
        config.output_dir = PathBuf::from("/tmp/looks");
        config.to_file(&path).unwrap();

        let loaded = TryOnConfig::from_file(&path).unwrap();
        assert_eq!(loaded.output_dir, PathBuf::from("/tmp/looks"));
        assert_eq!(loaded.request_timeout_ms, default_request_timeout());
    }

    #[test]
    fn test_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "request_timeout_ms = \"soon\"").unwrap();
        assert!(matches!(TryOnConfig::from_file(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_api_key_env() {
        let mut config = TryOnConfig::default();
        config.gemini.api_key_env = "WARDROBE_TEST_KEY_THAT_IS_NEVER_SET".to_string();
        assert!(matches!(config.gemini_settings(), Err(BackendError::Config(_))));
    }
}
