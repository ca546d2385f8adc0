//! API v1 catalog: `apps_index.json` plus one document per app.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::API_INDEX_FILE;
use crate::errors::AppError;
use crate::registry::releases::{AppData, Release};
use crate::registry::AppMetadata;
use crate::version::sort_semantic;

/// A release tagged with its version name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedRelease {
    pub version: String,
    #[serde(flatten)]
    pub release: Release,
}

/// Per-app API document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiApp {
    pub name: String,
    pub metadata: AppMetadata,
    pub categories: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    /// Newest first.
    pub releases: Vec<VersionedRelease>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub name: String,
    pub categories: Vec<String>,
}

/// Content of `apps_index.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiIndex {
    pub apps: BTreeMap<String, IndexEntry>,
    pub categories: BTreeMap<String, serde_json::Value>,
}

/// Move legacy per-release keys onto the app and drop deprecated ones.
fn migrate(mut metadata: AppMetadata, app: &AppData) -> AppMetadata {
    if metadata.categories.is_empty() {
        metadata.categories = app.categories.clone();
    }
    if metadata.logo.is_none() {
        metadata.logo = app.logo.clone();
    }
    metadata.requires = None;
    metadata.version = None;
    metadata
}

/// Build the index and the per-app documents from gathered releases.
///
/// The latest release's metadata describes the app; apps without any
/// release are left out.
pub fn generate_apps_index(
    apps: &BTreeMap<String, AppData>,
    releases: &BTreeMap<String, Vec<(String, Release)>>,
    categories: &BTreeMap<String, serde_json::Value>,
) -> (ApiIndex, BTreeMap<String, ApiApp>) {
    let mut index = ApiIndex {
        apps: BTreeMap::new(),
        categories: categories.clone(),
    };
    let mut documents = BTreeMap::new();

    for (app_id, app) in apps {
        let by_version: BTreeMap<&str, &Release> = releases
            .get(app_id)
            .map(|list| list.iter().map(|(v, r)| (v.as_str(), r)).collect())
            .unwrap_or_default();
        if by_version.is_empty() {
            tracing::warn!("No releases found for '{}', omitting it from the index", app_id);
            continue;
        }
        let mut versions: Vec<String> = by_version.keys().map(|v| v.to_string()).collect();
        sort_semantic(&mut versions);

        let ordered: Vec<VersionedRelease> = versions
            .iter()
            .map(|v| VersionedRelease {
                version: v.clone(),
                release: by_version[v.as_str()].clone(),
            })
            .collect();
        let metadata = migrate(ordered[0].release.metadata.clone(), app);
        let name = metadata.title.clone().unwrap_or_else(|| app_id.clone());

        index.apps.insert(
            app_id.clone(),
            IndexEntry {
                name: name.clone(),
                categories: metadata.categories.clone(),
            },
        );
        documents.insert(
            app_id.clone(),
            ApiApp {
                name,
                categories: metadata.categories.clone(),
                logo: metadata.logo.clone(),
                metadata,
                releases: ordered,
            },
        );
    }
    (index, documents)
}

/// Write `apps_index.json` and `apps/<id>.json` under `out`.
pub fn build_api_v1(
    out: &Path,
    index: &ApiIndex,
    apps: &BTreeMap<String, ApiApp>,
) -> Result<Vec<PathBuf>, AppError> {
    let apps_dir = out.join("apps");
    fs::create_dir_all(&apps_dir)?;

    let mut written = Vec::with_capacity(apps.len() + 1);
    let index_path = out.join(API_INDEX_FILE);
    fs::write(&index_path, serde_json::to_string_pretty(index)?)?;
    written.push(index_path);

    for (app_id, app) in apps {
        let path = apps_dir.join(format!("{}.json", app_id));
        fs::write(&path, serde_json::to_string_pretty(app)?)?;
        written.push(path);
    }
    tracing::debug!("Wrote {} API files to {}", written.len(), out.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::releases::Environment;
    use tempfile::TempDir;

    fn release(title: &str) -> Release {
        Release {
            environment: Environment::default(),
            metadata: AppMetadata {
                title: Some(title.to_string()),
                version: Some("x".into()),
                requires: Some(BTreeMap::new()),
                ..Default::default()
            },
            url: format!("git+https://example.com/app.git@{}", title),
        }
    }

    fn sample() -> (ApiIndex, BTreeMap<String, ApiApp>) {
        let apps = BTreeMap::from([
            (
                "demo".to_string(),
                AppData {
                    categories: vec!["utilities".into()],
                    ..Default::default()
                },
            ),
            ("empty".to_string(), AppData::default()),
        ]);
        let releases = BTreeMap::from([(
            "demo".to_string(),
            vec![
                ("v1.0.0".to_string(), release("Demo 1")),
                ("main".to_string(), release("Demo main")),
                ("v1.10.0".to_string(), release("Demo 1.10")),
                ("v1.2.0".to_string(), release("Demo 1.2")),
            ],
        )]);
        generate_apps_index(&apps, &releases, &BTreeMap::new())
    }

    #[test]
    fn test_releases_ordered_and_latest_metadata_wins() {
        let (index, docs) = sample();
        assert_eq!(index.apps.keys().collect::<Vec<_>>(), vec!["demo"]);

        let demo = &docs["demo"];
        let order: Vec<&str> = demo.releases.iter().map(|r| r.version.as_str()).collect();
        assert_eq!(order, vec!["v1.10.0", "v1.2.0", "v1.0.0", "main"]);
        assert_eq!(demo.name, "Demo 1.10");
        assert_eq!(demo.categories, vec!["utilities"]);
        assert!(demo.metadata.requires.is_none());
        assert!(demo.metadata.version.is_none());
    }

    #[test]
    fn test_build_api_v1_writes_files() {
        let tmp = TempDir::new().unwrap();
        let (index, docs) = sample();
        let written = build_api_v1(tmp.path(), &index, &docs).unwrap();
        assert_eq!(written.len(), 2);

        let text = fs::read_to_string(tmp.path().join("apps").join("demo.json")).unwrap();
        let parsed: ApiApp = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, docs["demo"]);
        assert!(tmp.path().join(API_INDEX_FILE).is_file());
    }
}
