//! Shared constants and defaults.

use std::time::Duration;

/// Prefix of every serialized app version.
pub const VERSION_PREFIX: &str = "git:";

/// Serialized form of a version that cannot be mapped to a name.
pub const UNKNOWN_VERSION: &str = "UNKNOWN";

/// Serialized form of the version of an app that is not installed.
pub const NOT_INSTALLED_VERSION: &str = "NOT_INSTALLED";

/// Remote consulted for release lines and updates.
pub const DEFAULT_REMOTE: &str = "origin";

/// Release line used when a registry URL carries no fragment.
pub const DEFAULT_GIT_BRANCH: &str = "master";

/// Platform home directory.
pub const DEFAULT_HOME: &str = "/project";

/// Directory holding one clone per installed app.
pub const DEFAULT_APPS_DIR: &str = "/project/apps";

/// Published registry document.
pub const DEFAULT_REGISTRY_URL: &str = "https://aiidalab.github.io/aiidalab-registry/apps_meta.json";

/// Interpreter used to list installed packages.
pub const DEFAULT_PYTHON_BIN: &str = "python3";

/// Minimum spacing between two accepted `refresh()` calls.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(1000);

/// Poll granularity of the app watcher.
pub const DEFAULT_WATCH_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Lifetime of a cached registry document.
pub const DEFAULT_REGISTRY_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Number of registry documents kept in the cache.
pub const DEFAULT_REGISTRY_CACHE_CAPACITY: usize = 16;

/// Lifetime of a cached installed-package snapshot.
pub const DEFAULT_PACKAGE_CACHE_TTL: Duration = Duration::from_secs(300);

/// Per-user configuration directory name under `$HOME`.
pub const CONFIG_DIR_NAME: &str = ".alab";

/// Configuration file name inside [`CONFIG_DIR_NAME`].
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Prefix of environment variables overriding configuration values.
pub const ENV_PREFIX: &str = "ALAB_";

/// App metadata file read from each release.
pub const METADATA_FILE: &str = "metadata.json";

/// Python requirements file read from each release.
pub const REQUIREMENTS_FILE: &str = "requirements.txt";

/// API index file written by the catalog builder.
pub const API_INDEX_FILE: &str = "apps_index.json";
