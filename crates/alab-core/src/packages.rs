//! Installed package snapshots.
//!
//! A [`PackageSource`] lists what is importable in the active Python
//! environment. The compatibility engine only ever sees the flat snapshot.

use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::TtlCache;
use crate::errors::AppError;
use crate::specifier::Requirement;

/// Canonical package name: runs of `-`, `_` and `.` collapse to `-`, lowercase.
pub fn canonicalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_separator = false;
    for c in name.chars() {
        if matches!(c, '-' | '_' | '.') {
            if !in_separator {
                out.push('-');
            }
            in_separator = true;
        } else {
            out.push(c.to_ascii_lowercase());
            in_separator = false;
        }
    }
    out
}

/// An installed package. `version: None` satisfies any version constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

impl Package {
    pub fn new(name: &str, version: Option<&str>) -> Self {
        Self {
            name: canonicalize_name(name),
            version: version.map(str::to_string),
        }
    }

    /// True if this package satisfies `requirement`.
    pub fn fulfills(&self, requirement: &Requirement) -> bool {
        if canonicalize_name(&self.name) != canonicalize_name(&requirement.name) {
            return false;
        }
        match &self.version {
            None => true,
            Some(version) => requirement.specifier.contains_str(version),
        }
    }
}

/// Something that can list installed packages.
pub trait PackageSource: Send + Sync {
    fn installed_packages(&self) -> Result<Arc<Vec<Package>>, AppError>;

    /// Drop any cached listing. Sources without a cache ignore this.
    fn invalidate(&self) {}
}

// ============================================================================
// pip
// ============================================================================

/// Lists packages with `<python> -m pip list --format=json`.
#[derive(Debug, Clone)]
pub struct PipPackageSource {
    python_bin: String,
}

impl PipPackageSource {
    pub fn new(python_bin: impl Into<String>) -> Self {
        Self {
            python_bin: python_bin.into(),
        }
    }
}

#[derive(Deserialize)]
struct PipEntry {
    name: String,
    version: String,
}

impl PackageSource for PipPackageSource {
    fn installed_packages(&self) -> Result<Arc<Vec<Package>>, AppError> {
        tracing::debug!("Listing packages with {} -m pip list", self.python_bin);
        let output = Command::new(&self.python_bin)
            .args(["-m", "pip", "list", "--format=json", "--disable-pip-version-check"])
            .output()
            .map_err(|e| AppError::PackageListing(format!("{}: {}", self.python_bin, e)))?;
        if !output.status.success() {
            return Err(AppError::PackageListing(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        let entries: Vec<PipEntry> = serde_json::from_slice(&output.stdout)?;
        Ok(Arc::new(
            entries
                .into_iter()
                .map(|e| Package::new(&e.name, Some(&e.version)))
                .collect(),
        ))
    }
}

// ============================================================================
// Static and cached sources
// ============================================================================

/// A fixed snapshot, for tests and offline catalog builds.
#[derive(Debug, Clone, Default)]
pub struct StaticPackageSource {
    packages: Arc<Vec<Package>>,
}

impl StaticPackageSource {
    pub fn new(packages: Vec<Package>) -> Self {
        Self {
            packages: Arc::new(packages),
        }
    }
}

impl PackageSource for StaticPackageSource {
    fn installed_packages(&self) -> Result<Arc<Vec<Package>>, AppError> {
        Ok(Arc::clone(&self.packages))
    }
}

const SNAPSHOT_KEY: &str = "installed";

/// Caches another source's listing for a fixed time.
///
/// Install and update invalidate the cache so the next compatibility check
/// sees the new environment.
pub struct CachedPackageSource {
    inner: Box<dyn PackageSource>,
    cache: TtlCache<String, Arc<Vec<Package>>>,
}

impl CachedPackageSource {
    pub fn new(inner: Box<dyn PackageSource>, ttl: Duration) -> Self {
        Self {
            inner,
            cache: TtlCache::new(1, ttl),
        }
    }
}

impl PackageSource for CachedPackageSource {
    fn installed_packages(&self) -> Result<Arc<Vec<Package>>, AppError> {
        self.cache
            .get_or_refresh(SNAPSHOT_KEY.to_string(), || self.inner.installed_packages())
    }

    fn invalidate(&self) {
        self.cache.clear();
        self.inner.invalidate();
    }
}
