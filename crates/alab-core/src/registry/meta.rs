//! Build the published `apps_meta.json` document from registry data.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use anyhow::{anyhow, Context};
use regex::Regex;
use url::Url;

use crate::errors::AppError;
use crate::git;
use crate::registry::releases::{AppData, RegistryData};
use crate::registry::{AppMetadata, Registry, RegistryEntry};

static BRANCH_IN_PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<path>.+?)@(?P<line>[^:@]*)").expect("Invalid regex"));

/// Default registry state for apps that do not declare one.
pub const DEFAULT_STATE: &str = "registered";

/// Registry-facing subset of an app's metadata, with defaults filled in.
pub fn generate_metainfo(app_id: &str, metadata: &AppMetadata, git_url: &str) -> AppMetadata {
    AppMetadata {
        title: Some(metadata.title.clone().unwrap_or_else(|| app_id.to_string())),
        description: metadata.description.clone(),
        authors: metadata
            .authors
            .clone()
            .or_else(|| get_git_author(git_url)),
        state: Some(
            metadata
                .state
                .clone()
                .unwrap_or_else(|| DEFAULT_STATE.to_string()),
        ),
        documentation_url: metadata.documentation_url.clone(),
        external_url: metadata.external_url.clone(),
        version: metadata.version.clone(),
        requires: metadata.requires.clone(),
        logo: None,
        categories: Vec::new(),
    }
}

/// Owner segment of a hosted git URL (`https://github.com/<owner>/...`).
pub fn get_git_author(git_url: &str) -> Option<String> {
    let url = Url::parse(git_url).ok()?;
    url.path_segments()?
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// Last two labels of the URL host: `github.com`, `gitlab.com`, ...
pub fn hosted_on(url: &str) -> Option<String> {
    let host = Url::parse(url).ok()?.host_str()?.to_string();
    let labels: Vec<&str> = host.split('.').collect();
    let start = labels.len().saturating_sub(2);
    Some(labels[start..].join("."))
}

/// File name of an app's HTML page.
pub fn html_app_fname(app_id: &str) -> String {
    let safe: String = app_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    format!("{}.html", safe)
}

/// Clone URL of the first `git+https` release, with the release branch as
/// fragment.
pub fn extract_git_url_from_releases(app: &AppData) -> anyhow::Result<String> {
    for spec in &app.releases {
        let Ok(url) = Url::parse(spec.url()) else {
            continue;
        };
        if url.scheme() != "git+https" {
            continue;
        }
        let Some(caps) = BRANCH_IN_PATH_RE.captures(url.path()) else {
            continue;
        };
        let host = url.host_str().context("release URL without host")?;
        let line = &caps["line"];
        let mut git_url = format!("https://{}{}", host, &caps["path"]);
        if !line.is_empty() && line != "*" {
            git_url.push('#');
            git_url.push_str(line);
        }
        return Ok(git_url);
    }
    Err(anyhow!("no git+https release to derive a clone URL from"))
}

/// Remote refs of `git_url` as `{full ref: sha}`.
pub fn fetch_gitinfo(git_url: &str) -> Result<BTreeMap<String, String>, AppError> {
    let entry = RegistryEntry {
        git_url: git_url.to_string(),
        ..Default::default()
    };
    git::ls_remote(entry.clone_url())
}

/// Assemble the registry document.
///
/// `gitinfo` is asked for the remote refs of each app's clone URL; apps
/// whose refs cannot be listed get an empty map and a warning.
pub fn generate_apps_meta<F>(data: &RegistryData, gitinfo: F) -> Result<Registry, AppError>
where
    F: Fn(&str) -> Result<BTreeMap<String, String>, AppError>,
{
    let mut apps = BTreeMap::new();
    for (app_id, app) in &data.apps {
        let git_url = match extract_git_url_from_releases(app) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!("Skipping '{}': {}", app_id, e);
                continue;
            }
        };
        let metadata = app.metadata.clone().unwrap_or_default();
        let refs = gitinfo(&git_url).unwrap_or_else(|e| {
            tracing::warn!("Unable to list refs of '{}': {}", app_id, e);
            BTreeMap::new()
        });

        apps.insert(
            app_id.clone(),
            RegistryEntry {
                name: Some(app_id.clone()),
                metainfo: generate_metainfo(app_id, &metadata, &git_url),
                categories: if app.categories.is_empty() {
                    metadata.categories.clone()
                } else {
                    app.categories.clone()
                },
                logo: app.logo.clone().or(metadata.logo.clone()),
                hosted_on: hosted_on(&git_url),
                gitinfo: refs,
                git_url,
                meta_url: String::new(),
                subpage: Some(format!("apps/{}/index.html", app_id)),
            },
        );
    }
    Ok(Registry {
        apps,
        categories: data.categories.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::releases::ReleaseSpec;

    fn app_with(urls: &[&str]) -> AppData {
        AppData {
            releases: urls.iter().map(|u| ReleaseSpec::Url(u.to_string())).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_extract_git_url() {
        let app = app_with(&[
            "git+file:///srv/app@main:",
            "git+https://github.com/aiidalab/aiidalab-qe.git@main:v1..",
        ]);
        assert_eq!(
            extract_git_url_from_releases(&app).unwrap(),
            "https://github.com/aiidalab/aiidalab-qe.git#main"
        );
        assert!(extract_git_url_from_releases(&app_with(&["git+file:///x@main"])).is_err());
    }

    #[test]
    fn test_url_helpers() {
        assert_eq!(
            hosted_on("https://gitlab.example.org:8443/x.git").as_deref(),
            Some("example.org")
        );
        assert_eq!(
            get_git_author("https://github.com/aiidalab/app.git").as_deref(),
            Some("aiidalab")
        );
        assert_eq!(html_app_fname("my app/../x"), "myappx.html");
    }

    #[test]
    fn test_metainfo_defaults() {
        let meta = generate_metainfo(
            "demo",
            &AppMetadata {
                logo: Some("logo.png".into()),
                ..Default::default()
            },
            "https://github.com/org/demo.git",
        );
        assert_eq!(meta.title.as_deref(), Some("demo"));
        assert_eq!(meta.state.as_deref(), Some(DEFAULT_STATE));
        assert_eq!(meta.authors.as_deref(), Some("org"));
        assert!(meta.logo.is_none());
    }

    #[test]
    fn test_generate_apps_meta() {
        let mut data = RegistryData::default();
        let mut demo = app_with(&["git+https://github.com/org/demo.git@main:"]);
        demo.categories = vec!["utilities".into()];
        data.apps.insert("demo".into(), demo);
        data.apps
            .insert("local".into(), app_with(&["git+file:///srv/local@main"]));

        let registry = generate_apps_meta(&data, |url| {
            assert_eq!(url, "https://github.com/org/demo.git#main");
            Ok(BTreeMap::from([(
                "refs/heads/main".to_string(),
                "0123456789abcdef0123456789abcdef01234567".to_string(),
            )]))
        })
        .unwrap();

        assert_eq!(registry.apps.len(), 1);
        let entry = registry.get("demo").unwrap();
        assert_eq!(entry.release_line("master"), "main");
        assert_eq!(entry.hosted_on.as_deref(), Some("github.com"));
        assert_eq!(entry.categories, vec!["utilities"]);
        assert_eq!(entry.subpage.as_deref(), Some("apps/demo/index.html"));
        assert!(entry.remote_branch_tip("main").is_some());
    }
}
