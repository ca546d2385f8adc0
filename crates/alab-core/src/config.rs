//! Configuration for alab.
//!
//! Settings come from `~/.alab/config.yaml` (or an explicit path) and from
//! `ALAB_*` environment variables. The environment wins over the file unless
//! the file enables `develop` mode, in which case the file wins.
//!
//! ```yaml
//! apps: /project/apps
//! registry: https://aiidalab.github.io/aiidalab-registry/apps_meta.json
//! defaultGitBranch: main
//! refreshIntervalMs: 1000
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use crate::app::AppOptions;
use crate::constants::{
    CONFIG_DIR_NAME, CONFIG_FILE_NAME, DEFAULT_APPS_DIR, DEFAULT_GIT_BRANCH, DEFAULT_HOME,
    DEFAULT_PYTHON_BIN, DEFAULT_REFRESH_INTERVAL, DEFAULT_REGISTRY_CACHE_CAPACITY,
    DEFAULT_REGISTRY_CACHE_TTL, DEFAULT_REGISTRY_URL, DEFAULT_WATCH_POLL_INTERVAL, ENV_PREFIX,
};
use crate::errors::AppError;

/// Keys read verbatim from the environment; all others are parsed as YAML
/// scalars (`true`, `500`, ...).
const STRING_KEYS: &[&str] = &["home", "apps", "registry", "defaultGitBranch", "pythonBin"];

const ENV_KEYS: &[&str] = &[
    "home",
    "apps",
    "registry",
    "defaultGitBranch",
    "pythonBin",
    "liveRemoteCheck",
    "includePrereleases",
    "refreshIntervalMs",
    "watchPollIntervalMs",
    "registryCacheTtlSecs",
    "registryCacheCapacity",
];

/// Resolved configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppsConfig {
    /// Platform home directory.
    pub home: PathBuf,
    /// Directory holding one clone per installed app.
    pub apps: PathBuf,
    /// Registry document location (`https://`, `file://` or a plain path).
    pub registry: String,
    /// Release line for registry entries without one.
    pub default_git_branch: String,
    /// Let the config file override the environment.
    pub develop: bool,
    /// Interpreter whose packages decide compatibility.
    pub python_bin: String,
    /// Ask `origin` directly when the registry lacks a branch tip.
    pub live_remote_check: bool,
    /// Offer pre-release tags among available versions.
    pub include_prereleases: bool,
    pub refresh_interval_ms: u64,
    pub watch_poll_interval_ms: u64,
    pub registry_cache_ttl_secs: u64,
    pub registry_cache_capacity: usize,
}

impl Default for AppsConfig {
    fn default() -> Self {
        Self {
            home: PathBuf::from(DEFAULT_HOME),
            apps: PathBuf::from(DEFAULT_APPS_DIR),
            registry: DEFAULT_REGISTRY_URL.to_string(),
            default_git_branch: DEFAULT_GIT_BRANCH.to_string(),
            develop: false,
            python_bin: DEFAULT_PYTHON_BIN.to_string(),
            live_remote_check: false,
            include_prereleases: false,
            refresh_interval_ms: DEFAULT_REFRESH_INTERVAL.as_millis() as u64,
            watch_poll_interval_ms: DEFAULT_WATCH_POLL_INTERVAL.as_millis() as u64,
            registry_cache_ttl_secs: DEFAULT_REGISTRY_CACHE_TTL.as_secs(),
            registry_cache_capacity: DEFAULT_REGISTRY_CACHE_CAPACITY,
        }
    }
}

impl AppsConfig {
    /// Load from `~/.alab/config.yaml` plus the process environment.
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::InvalidConfig`] if the file exists but cannot be parsed.
    pub fn load_default() -> Result<Self, AppError> {
        match Self::default_path() {
            Some(path) => Self::from_path(&path),
            None => {
                tracing::debug!("Could not determine home directory, using default config");
                Self::from_sources(None, |name| env::var(name).ok())
            }
        }
    }

    /// Load from a specific file plus the process environment.
    pub fn from_path(path: &Path) -> Result<Self, AppError> {
        let file = if path.exists() {
            let content = fs::read_to_string(path).map_err(|e| {
                AppError::InvalidConfig(format!("Failed to read {}: {}", path.display(), e))
            })?;
            let mapping: Option<Mapping> = serde_yaml::from_str(&content).map_err(|e| {
                AppError::InvalidConfig(format!("Failed to parse {}: {}", path.display(), e))
            })?;
            mapping
        } else {
            tracing::debug!("Config not found at {}, using defaults", path.display());
            None
        };
        Self::from_sources(file, |name| env::var(name).ok())
    }

    /// Merge a parsed config file with environment values from `lookup`.
    pub fn from_sources<F>(file: Option<Mapping>, lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut merged = file.unwrap_or_default();
        let develop = merged
            .get("develop")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if develop {
            tracing::warn!("Develop mode: config file settings take precedence over the environment");
        }

        for key in ENV_KEYS {
            let Some(raw) = lookup(&env_var_name(key)) else {
                continue;
            };
            let key_value = Value::from(*key);
            if develop && merged.contains_key(&key_value) {
                continue;
            }
            let value = if STRING_KEYS.contains(key) {
                Value::String(raw)
            } else {
                serde_yaml::from_str(&raw).map_err(|e| {
                    AppError::InvalidConfig(format!("{}={}: {}", env_var_name(key), raw, e))
                })?
            };
            merged.insert(key_value, value);
        }

        let config: Self = serde_yaml::from_value(Value::Mapping(merged))
            .map_err(|e| AppError::InvalidConfig(e.to_string()))?;
        for warning in config.validate()? {
            tracing::warn!("Config warning: {}", warning);
        }
        Ok(config)
    }

    /// `~/.alab`
    pub fn default_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(CONFIG_DIR_NAME))
    }

    /// `~/.alab/config.yaml`
    pub fn default_path() -> Option<PathBuf> {
        Self::default_dir().map(|d| d.join(CONFIG_FILE_NAME))
    }

    /// Check the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::InvalidConfiguration`] for an empty registry location
    /// or default branch.
    ///
    /// # Warnings
    ///
    /// Zero intervals and a zero cache capacity are accepted but reported.
    pub fn validate(&self) -> Result<Vec<String>, AppError> {
        if self.registry.trim().is_empty() {
            return Err(AppError::InvalidConfiguration {
                message: "registry cannot be empty".to_string(),
                hint: "Set registry to an https:// or file:// URL of apps_meta.json".to_string(),
            });
        }
        if self.default_git_branch.trim().is_empty() {
            return Err(AppError::InvalidConfiguration {
                message: "defaultGitBranch cannot be empty".to_string(),
                hint: format!("Set defaultGitBranch, e.g. `{}`", DEFAULT_GIT_BRANCH),
            });
        }

        let mut warnings = Vec::new();
        if self.refresh_interval_ms == 0 {
            warnings.push("refreshIntervalMs=0 disables refresh throttling".to_string());
        }
        if self.watch_poll_interval_ms == 0 {
            warnings.push("watchPollIntervalMs=0 makes app watchers spin".to_string());
        }
        if self.registry_cache_capacity == 0 {
            warnings.push("registryCacheCapacity=0 is raised to 1".to_string());
        }
        if self.registry_cache_ttl_secs == 0 {
            warnings.push("registryCacheTtlSecs=0 refetches the registry on every lookup".to_string());
        }
        Ok(warnings)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn watch_poll_interval(&self) -> Duration {
        Duration::from_millis(self.watch_poll_interval_ms)
    }

    pub fn registry_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.registry_cache_ttl_secs)
    }

    /// Per-app options derived from this configuration.
    pub fn app_options(&self) -> AppOptions {
        AppOptions {
            default_branch: self.default_git_branch.clone(),
            refresh_interval: self.refresh_interval(),
            live_remote_check: self.live_remote_check,
            include_prereleases: self.include_prereleases,
        }
    }
}

/// `defaultGitBranch` -> `ALAB_DEFAULT_GIT_BRANCH`
fn env_var_name(key: &str) -> String {
    let mut name = String::from(ENV_PREFIX);
    for c in key.chars() {
        if c.is_ascii_uppercase() {
            name.push('_');
        }
        name.push(c.to_ascii_uppercase());
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn mapping(yaml: &str) -> Option<Mapping> {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_env_var_name() {
        assert_eq!(env_var_name("apps"), "ALAB_APPS");
        assert_eq!(env_var_name("defaultGitBranch"), "ALAB_DEFAULT_GIT_BRANCH");
    }

    #[test]
    fn test_defaults() {
        let config = AppsConfig::from_sources(None, env(&[])).unwrap();
        assert_eq!(config, AppsConfig::default());
        assert_eq!(config.refresh_interval(), Duration::from_secs(1));
        assert_eq!(config.app_options().default_branch, "master");
    }

    #[test]
    fn test_environment_overrides_file() {
        let config = AppsConfig::from_sources(
            mapping("apps: /from/file\nrefreshIntervalMs: 10\n"),
            env(&[("ALAB_APPS", "/from/env"), ("ALAB_LIVE_REMOTE_CHECK", "true")]),
        )
        .unwrap();
        assert_eq!(config.apps, PathBuf::from("/from/env"));
        assert_eq!(config.refresh_interval_ms, 10);
        assert!(config.live_remote_check);
    }

    #[test]
    fn test_include_prereleases_reaches_app_options() {
        assert!(!AppsConfig::default().app_options().include_prereleases);
        let config = AppsConfig::from_sources(
            mapping("includePrereleases: true\n"),
            env(&[]),
        )
        .unwrap();
        assert!(config.app_options().include_prereleases);

        let config = AppsConfig::from_sources(None, env(&[("ALAB_INCLUDE_PRERELEASES", "true")]))
            .unwrap();
        assert!(config.include_prereleases);
    }

    #[test]
    fn test_develop_mode_prefers_file() {
        let config = AppsConfig::from_sources(
            mapping("develop: true\napps: /from/file\n"),
            env(&[("ALAB_APPS", "/from/env"), ("ALAB_DEFAULT_GIT_BRANCH", "main")]),
        )
        .unwrap();
        assert!(config.develop);
        assert_eq!(config.apps, PathBuf::from("/from/file"));
        assert_eq!(config.default_git_branch, "main");
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            AppsConfig::from_sources(None, env(&[("ALAB_REFRESH_INTERVAL_MS", "soon")])),
            Err(AppError::InvalidConfig(_))
        ));
        assert!(matches!(
            AppsConfig::from_sources(mapping("registry: ''\n"), env(&[])),
            Err(AppError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_validate_warnings() {
        let config = AppsConfig {
            refresh_interval_ms: 0,
            registry_cache_capacity: 0,
            ..Default::default()
        };
        assert_eq!(config.validate().unwrap().len(), 2);
    }

    #[test]
    fn test_from_path_missing_and_present() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE_NAME);
        assert!(AppsConfig::from_path(&path).is_ok());

        fs::write(&path, "registry: file:///srv/apps_meta.json\nwatchPollIntervalMs: 250\n").unwrap();
        let config = AppsConfig::from_path(&path).unwrap();
        assert_eq!(config.registry, "file:///srv/apps_meta.json");
        assert_eq!(config.watch_poll_interval(), Duration::from_millis(250));

        fs::write(&path, "apps: [unclosed").unwrap();
        assert!(matches!(
            AppsConfig::from_path(&path),
            Err(AppError::InvalidConfig(_))
        ));
    }
}
