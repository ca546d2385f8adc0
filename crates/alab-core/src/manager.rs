//! Entry point for front ends: config, registry and package listing wired
//! together, handing out [`App`] handles.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use regex::RegexBuilder;

use crate::app::App;
use crate::config::AppsConfig;
use crate::constants::DEFAULT_PACKAGE_CACHE_TTL;
use crate::errors::AppError;
use crate::packages::{CachedPackageSource, PackageSource, PipPackageSource};
use crate::registry::{Registry, RegistryCache, RegistryClient};

/// Owns the shared collaborators of every app.
pub struct AppManager {
    config: AppsConfig,
    registry: RegistryClient,
    packages: Arc<dyn PackageSource>,
}

impl AppManager {
    /// Manager for `~/.alab/config.yaml` and the process environment.
    pub fn with_defaults() -> Result<Self, AppError> {
        Ok(Self::from_config(AppsConfig::load_default()?))
    }

    /// Manager for an explicit config file.
    pub fn with_config(path: &Path) -> Result<Self, AppError> {
        Ok(Self::from_config(AppsConfig::from_path(path)?))
    }

    /// Build the registry cache and the pip-backed package source from `config`.
    pub fn from_config(config: AppsConfig) -> Self {
        let cache = Arc::new(RegistryCache::new(
            config.registry_cache_capacity,
            config.registry_cache_ttl(),
        ));
        let registry = RegistryClient::new(config.registry.clone(), cache);
        let packages: Arc<dyn PackageSource> = Arc::new(CachedPackageSource::new(
            Box::new(PipPackageSource::new(config.python_bin.clone())),
            DEFAULT_PACKAGE_CACHE_TTL,
        ));
        Self::with_parts(config, registry, packages)
    }

    /// Assemble from prebuilt collaborators.
    pub fn with_parts(
        config: AppsConfig,
        registry: RegistryClient,
        packages: Arc<dyn PackageSource>,
    ) -> Self {
        Self {
            config,
            registry,
            packages,
        }
    }

    pub fn config(&self) -> &AppsConfig {
        &self.config
    }

    /// The registry, or an error if it cannot be fetched.
    pub fn fetch_registry(&self) -> Result<Arc<Registry>, AppError> {
        self.registry.fetch()
    }

    /// The registry, or `None` (with a warning) if it cannot be fetched.
    pub fn registry(&self) -> Option<Arc<Registry>> {
        self.registry
            .fetch()
            .map_err(|e| tracing::warn!("{}", e))
            .ok()
    }

    /// Handle for app `id` under the apps directory.
    ///
    /// Without a reachable registry the app is treated as unregistered.
    pub fn app(&self, id: &str) -> App {
        let entry = self.registry().and_then(|r| r.get(id).cloned());
        App::new(
            id,
            self.config.apps.join(id),
            entry,
            Arc::clone(&self.packages),
            self.config.app_options(),
        )
    }

    /// Ids of the directories under the apps directory, sorted.
    pub fn installed_apps(&self) -> Result<Vec<String>, AppError> {
        let dir = &self.config.apps;
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut ids: Vec<String> = fs::read_dir(dir)?
            .filter_map(Result::ok)
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|name| !name.starts_with('.'))
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// Registry app ids matching a `*`/`?` wildcard pattern, case-insensitively.
    pub fn search(&self, pattern: &str) -> Result<Vec<String>, AppError> {
        let registry = self.fetch_registry()?;
        let mut expr = String::from("^");
        for c in pattern.chars() {
            match c {
                '*' => expr.push_str(".*"),
                '?' => expr.push('.'),
                c => expr.push_str(&regex::escape(&c.to_string())),
            }
        }
        expr.push('$');
        let re = RegexBuilder::new(&expr)
            .case_insensitive(true)
            .build()
            .map_err(|e| AppError::InvalidConfig(format!("search pattern `{}`: {}", pattern, e)))?;
        Ok(registry
            .apps
            .keys()
            .filter(|id| re.is_match(id))
            .cloned()
            .collect())
    }

    /// Forget the cached package listing.
    pub fn invalidate_packages(&self) {
        self.packages.invalidate();
    }
}
