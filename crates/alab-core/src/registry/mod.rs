//! App registry.
//!
//! - [`Registry`] / [`RegistryEntry`]: the published `apps_meta.json` document
//! - [`RegistryClient`]: fetches it from `file://` or `http(s)://`, through an
//!   injected [`TtlCache`]
//! - [`releases`], [`fetch`], [`meta`], [`index`]: the offline catalog builder

pub mod fetch;
pub mod index;
pub mod meta;
pub mod releases;

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::cache::TtlCache;
use crate::compat::CompatibilityMap;
use crate::errors::AppError;

// ============================================================================
// Data model
// ============================================================================

/// Descriptive metadata of an app or of one of its releases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documentation_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Compatibility map: version specifier or pattern -> requirement strings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requires: Option<BTreeMap<String, Vec<String>>>,
}

/// One app as published in the registry. Read-only to clients.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Clone URL; the fragment names the release line.
    pub git_url: String,
    pub meta_url: String,
    pub metainfo: AppMetadata,
    /// Remote refs as last seen by the registry crawler: full ref -> sha.
    pub gitinfo: BTreeMap<String, String>,
    pub categories: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hosted_on: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subpage: Option<String>,
}

impl RegistryEntry {
    /// Release line from the URL fragment, else `default_branch`.
    pub fn release_line(&self, default_branch: &str) -> String {
        match self.git_url.rsplit_once('#') {
            Some((_, line)) if !line.is_empty() => line.to_string(),
            _ => default_branch.to_string(),
        }
    }

    /// The clone URL without its release-line fragment.
    pub fn clone_url(&self) -> &str {
        match self.git_url.rsplit_once('#') {
            Some((url, _)) => url,
            None => &self.git_url,
        }
    }

    /// Sha the registry last saw for `refs/heads/<branch>`.
    pub fn remote_branch_tip(&self, branch: &str) -> Option<&str> {
        self.gitinfo
            .get(&format!("refs/heads/{}", branch))
            .map(String::as_str)
    }

    pub fn compatibility(&self) -> CompatibilityMap {
        CompatibilityMap::from_requires(self.metainfo.requires.as_ref())
    }
}

/// The whole registry document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Registry {
    pub apps: BTreeMap<String, RegistryEntry>,
    pub categories: BTreeMap<String, serde_json::Value>,
}

impl Registry {
    pub fn from_json(text: &str) -> Result<Self, AppError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn get(&self, app_id: &str) -> Option<&RegistryEntry> {
        self.apps.get(app_id)
    }
}

// ============================================================================
// Client
// ============================================================================

/// Shared cache of fetched registry documents, keyed by location.
pub type RegistryCache = TtlCache<String, Arc<Registry>>;

/// Fetches the registry document, serving cached copies within their TTL.
#[derive(Clone)]
pub struct RegistryClient {
    url: String,
    cache: Arc<RegistryCache>,
}

impl RegistryClient {
    pub fn new(url: impl Into<String>, cache: Arc<RegistryCache>) -> Self {
        Self {
            url: url.into(),
            cache,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// The registry, from cache when fresh.
    ///
    /// When a refetch fails, an expired cached copy is still served.
    pub fn fetch(&self) -> Result<Arc<Registry>, AppError> {
        self.cache
            .get_or_refresh(self.url.clone(), || self.load().map(Arc::new))
    }

    /// Drop the cached copy so the next fetch hits the source.
    pub fn invalidate(&self) {
        self.cache.invalidate(&self.url);
    }

    fn load(&self) -> Result<Registry, AppError> {
        let unavailable = |reason: String| AppError::RegistryUnavailable {
            url: self.url.clone(),
            reason,
        };
        let text = match Url::parse(&self.url) {
            Ok(url) if url.scheme() == "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| unavailable("invalid file URL".to_string()))?;
                read_local(&path).map_err(|e| unavailable(e.to_string()))?
            }
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {
                tracing::debug!("Fetching registry from {}", url);
                reqwest::blocking::get(url.as_str())
                    .and_then(|r| r.error_for_status())
                    .and_then(|r| r.text())
                    .map_err(|e| unavailable(e.to_string()))?
            }
            Ok(_) => return Err(AppError::UnsupportedScheme(self.url.clone())),
            Err(_) => read_local(Path::new(&self.url)).map_err(|e| unavailable(e.to_string()))?,
        };
        Registry::from_json(&text).map_err(|e| unavailable(e.to_string()))
    }
}

fn read_local(path: &Path) -> Result<String, AppError> {
    tracing::debug!("Reading registry from {}", path.display());
    Ok(fs::read_to_string(path)?)
}
