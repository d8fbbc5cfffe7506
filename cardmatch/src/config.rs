//! Service configuration.
//!
//! Config files live under `~/.giztoy/cardvault/` by default and may be YAML
//! or JSON. Every field has a default, so an empty file is valid.
//!
//! ```yaml
//! dataset: Franck-dev/CardVault
//! top_k: 3
//! threshold: 0.6
//! remote:
//!   base_url: https://huggingface.co
//!   token: $HF_TOKEN
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use cardvault_cardindex::ArtifactPaths;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const APP_NAME: &str = "cardvault";
pub const DEFAULT_DATASET: &str = "cardvault";
pub const DEFAULT_TOP_K: usize = 3;
pub const DEFAULT_THRESHOLD: f32 = 0.60;
pub const DEFAULT_BATCH_SIZE: usize = 128;
pub const DEFAULT_REVISION: &str = "main";
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Corpus identity. Artifacts are stored and fetched under this name.
    pub dataset: String,

    /// Root directory for artifacts. `None` means `~/.giztoy/cardvault/data`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    pub top_k: usize,
    pub threshold: f32,
    pub batch_size: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<RemoteConfig>,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            dataset: DEFAULT_DATASET.to_string(),
            data_dir: None,
            top_k: DEFAULT_TOP_K,
            threshold: DEFAULT_THRESHOLD,
            batch_size: DEFAULT_BATCH_SIZE,
            remote: None,
        }
    }
}

impl MatchConfig {
    /// Loads a config file. `.json` files are parsed as JSON, anything else
    /// as YAML. The result is validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("read {}: {e}", path.display())))?;

        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));

        let cfg: MatchConfig = if is_json {
            serde_json::from_str(&data).map_err(|e| ConfigError::Parse(e.to_string()))?
        } else if data.trim().is_empty() {
            MatchConfig::default()
        } else {
            serde_yaml::from_str(&data).map_err(|e| ConfigError::Parse(e.to_string()))?
        };

        cfg.validate()?;
        Ok(cfg)
    }

    /// Loads the default config file if it exists, defaults otherwise.
    pub fn load_default() -> Result<Self, ConfigError> {
        match default_config_path() {
            Some(path) if path.is_file() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dataset.trim().is_empty() {
            return Err(ConfigError::Invalid("dataset must not be empty".into()));
        }
        if self.top_k == 0 {
            return Err(ConfigError::Invalid("top_k must be at least 1".into()));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be at least 1".into()));
        }
        if !(-1.0..=1.0).contains(&self.threshold) {
            return Err(ConfigError::Invalid(format!(
                "threshold {} outside [-1, 1]",
                self.threshold
            )));
        }
        if let Some(remote) = &self.remote {
            if remote.base_url.trim().is_empty() {
                return Err(ConfigError::Invalid("remote.base_url must not be empty".into()));
            }
            if remote.timeout_secs == 0 {
                return Err(ConfigError::Invalid("remote.timeout_secs must be at least 1".into()));
            }
        }
        Ok(())
    }

    /// Root data directory.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }

    /// Directory holding this dataset's artifact pair.
    pub fn artifact_dir(&self) -> PathBuf {
        self.data_dir().join(dataset_dir_name(&self.dataset))
    }

    pub fn artifact_paths(&self) -> ArtifactPaths {
        ArtifactPaths::in_dir(self.artifact_dir())
    }

    /// Bound on the whole remote fetch.
    pub fn fetch_timeout(&self) -> Duration {
        self.remote
            .as_ref()
            .map(RemoteConfig::timeout)
            .unwrap_or(Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS))
    }
}

/// Where to fetch prebuilt artifacts from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub base_url: String,

    #[serde(default = "default_revision")]
    pub revision: String,

    /// Bearer token. `$VAR` and `${VAR}` are read from the environment.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl RemoteConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            revision: default_revision(),
            token: String::new(),
            timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Token after environment expansion; `None` when empty.
    pub fn resolved_token(&self) -> Option<String> {
        let token = expand_env(&self.token);
        if token.is_empty() { None } else { Some(token) }
    }
}

fn default_revision() -> String {
    DEFAULT_REVISION.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_FETCH_TIMEOUT_SECS
}

/// `~/.giztoy/cardvault`, or `./.giztoy/cardvault` without a home directory.
pub fn app_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".giztoy")
        .join(APP_NAME)
}

pub fn default_config_path() -> Option<PathBuf> {
    let dir = app_dir();
    ["config.yaml", "config.yml", "config.json"]
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.is_file())
}

pub fn default_data_dir() -> PathBuf {
    app_dir().join("data")
}

/// Hub dataset ids contain a slash (`owner/name`); keep them one level deep.
fn dataset_dir_name(dataset: &str) -> String {
    dataset.trim().replace(['/', '\\'], "--")
}

/// Expands a value of the form `$VAR` or `${VAR}`. Other strings are
/// returned unchanged; unset variables expand to the empty string.
pub fn expand_env(s: &str) -> String {
    let Some(rest) = s.strip_prefix('$') else {
        return s.to_string();
    };
    let name = rest
        .strip_prefix('{')
        .and_then(|r| r.strip_suffix('}'))
        .unwrap_or(rest);
    std::env::var(name).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = MatchConfig::default();
        assert_eq!(cfg.top_k, 3);
        assert_eq!(cfg.threshold, 0.60);
        assert_eq!(cfg.batch_size, 128);
        assert!(cfg.remote.is_none());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn load_yaml_with_partial_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "dataset: Franck-dev/CardVault\nthreshold: 0.7\nremote:\n  base_url: http://mirror.local\n",
        )
        .unwrap();

        let cfg = MatchConfig::load(&path).unwrap();
        assert_eq!(cfg.dataset, "Franck-dev/CardVault");
        assert_eq!(cfg.threshold, 0.7);
        assert_eq!(cfg.top_k, DEFAULT_TOP_K);
        let remote = cfg.remote.unwrap();
        assert_eq!(remote.revision, "main");
        assert_eq!(remote.timeout_secs, DEFAULT_FETCH_TIMEOUT_SECS);
    }

    #[test]
    fn load_json_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"top_k": 5, "data_dir": "/srv/cards"}"#).unwrap();

        let cfg = MatchConfig::load(&path).unwrap();
        assert_eq!(cfg.top_k, 5);
        assert_eq!(cfg.data_dir(), PathBuf::from("/srv/cards"));
    }

    #[test]
    fn empty_yaml_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "").unwrap();
        assert_eq!(MatchConfig::load(&path).unwrap(), MatchConfig::default());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let bad = [
            MatchConfig { top_k: 0, ..Default::default() },
            MatchConfig { batch_size: 0, ..Default::default() },
            MatchConfig { threshold: 1.5, ..Default::default() },
            MatchConfig { dataset: " ".into(), ..Default::default() },
            MatchConfig {
                remote: Some(RemoteConfig { timeout_secs: 0, ..RemoteConfig::new("http://x") }),
                ..Default::default()
            },
        ];
        for cfg in bad {
            assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))), "{cfg:?}");
        }
    }

    #[test]
    fn artifact_dir_flattens_hub_ids() {
        let cfg = MatchConfig {
            dataset: "Franck-dev/CardVault".into(),
            data_dir: Some(PathBuf::from("/data")),
            ..Default::default()
        };
        assert_eq!(cfg.artifact_dir(), PathBuf::from("/data/Franck-dev--CardVault"));
    }

    #[test]
    fn expand_env_forms() {
        // SAFETY: test-local variable name, no other test reads it.
        unsafe { std::env::set_var("CARDVAULT_TEST_TOKEN", "secret") };
        assert_eq!(expand_env("$CARDVAULT_TEST_TOKEN"), "secret");
        assert_eq!(expand_env("${CARDVAULT_TEST_TOKEN}"), "secret");
        assert_eq!(expand_env("plain"), "plain");
        assert_eq!(expand_env("$CARDVAULT_TEST_UNSET_VAR"), "");
    }
}
