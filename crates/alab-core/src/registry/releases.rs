//! Expand declarative release specs into concrete releases.
//!
//! A release spec is a URL such as
//! `git+https://github.com/org/app.git@main:v1.0.0..`, where the part after
//! the last `@` of the path selects revisions:
//!
//! | suffix          | selects                                               |
//! |-----------------|-------------------------------------------------------|
//! | `@rev`          | exactly `rev` (branch, then origin branch, then tag, then commit) |
//! | `@rev:`         | every tag merged into branch `rev`                    |
//! | `@rev:a..b`     | tags on branch `rev` whose commit is in `a..b`        |
//! | `@*:a..b`       | the range applied to every `origin` branch            |
//!
//! Open range ends default to the branch itself; an empty `rev` means the
//! clone's current branch.
//!
//! Sources without a `git+` scheme (directories and archives, see
//! [`fetch`](super::fetch)) yield one release named by the spec's `version`.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use url::Url;

use crate::constants::{DEFAULT_REMOTE, METADATA_FILE, REQUIREMENTS_FILE};
use crate::errors::AppError;
use crate::git::GitRepo;
use crate::registry::fetch::TreeSource;
use crate::registry::AppMetadata;

static SELECTOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<rev>[^:]*?)(?::(?P<rev_selection>.*))?$").expect("Invalid regex")
});

// ============================================================================
// Data model
// ============================================================================

/// What an app needs from the Python environment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Environment {
    pub python_requirements: Vec<String>,
}

/// One concrete release of an app.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Release {
    pub environment: Environment,
    pub metadata: AppMetadata,
    /// Source URL pinned to the release commit.
    pub url: String,
}

/// A release spec as written in the registry data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReleaseSpec {
    Url(String),
    Detailed {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        environment: Option<Environment>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<AppMetadata>,
    },
}

impl ReleaseSpec {
    pub fn url(&self) -> &str {
        match self {
            ReleaseSpec::Url(url) | ReleaseSpec::Detailed { url, .. } => url,
        }
    }
}

/// Registry data for one app before crawling.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppData {
    pub releases: Vec<ReleaseSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<AppMetadata>,
    pub categories: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
}

/// The registry data file: apps and the category catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryData {
    pub apps: BTreeMap<String, AppData>,
    pub categories: BTreeMap<String, serde_json::Value>,
}

impl RegistryData {
    pub fn from_yaml(text: &str) -> Result<Self, AppError> {
        Ok(serde_yaml::from_str(text)?)
    }
}

// ============================================================================
// Repository scanning
// ============================================================================

/// Metadata and environment found in an app repository at one commit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanResult {
    pub metadata: Option<AppMetadata>,
    pub environment: Environment,
}

/// Reads release information out of an app tree.
pub trait RepositoryScanner {
    /// The tree of `repo` at `commit`.
    fn scan(&self, repo: &GitRepo, commit: &str) -> Result<ScanResult, AppError>;

    /// A plain directory.
    fn scan_dir(&self, dir: &Path) -> Result<ScanResult, AppError>;
}

/// Reads `metadata.json` (top level or `.aiidalab/`) and `requirements.txt`,
/// from the git tree at the release commit or from a directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct AppTreeScanner;

impl RepositoryScanner for AppTreeScanner {
    fn scan(&self, repo: &GitRepo, commit: &str) -> Result<ScanResult, AppError> {
        scan_files(|path| repo.show_file(commit, path))
    }

    fn scan_dir(&self, dir: &Path) -> Result<ScanResult, AppError> {
        scan_files(|path| match fs::read_to_string(dir.join(path)) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        })
    }
}

fn scan_files<F>(read: F) -> Result<ScanResult, AppError>
where
    F: Fn(&str) -> Result<Option<String>, AppError>,
{
    let mut metadata = None;
    for dir in [".aiidalab/", ""] {
        if let Some(text) = read(&format!("{}{}", dir, METADATA_FILE))? {
            metadata = Some(serde_json::from_str::<AppMetadata>(&text)?);
            break;
        }
    }
    let python_requirements = read(REQUIREMENTS_FILE)?
        .map(|text| parse_requirements(&text))
        .unwrap_or_default();
    Ok(ScanResult {
        metadata,
        environment: Environment {
            python_requirements,
        },
    })
}

/// Non-empty, non-comment lines of a requirements file.
pub fn parse_requirements(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

// ============================================================================
// Release lines
// ============================================================================

/// Split `...app.git@<line>` at the last `@` of the URL path.
pub fn split_release_line(url: &str) -> (String, Option<String>) {
    let Ok(mut parsed) = Url::parse(url) else {
        return (url.to_string(), None);
    };
    let path = parsed.path().to_string();
    match path.rsplit_once('@') {
        Some((base, line)) => {
            parsed.set_path(base);
            (parsed.to_string(), Some(line.to_string()))
        }
        None => (url.to_string(), None),
    }
}

/// `(version name, commit)` pairs selected by `release_line` in `repo`.
pub fn release_commits(
    repo: &GitRepo,
    release_line: &str,
) -> Result<Vec<(String, String)>, AppError> {
    let caps = SELECTOR_RE
        .captures(release_line)
        .ok_or_else(|| AppError::InvalidReleaseLine(release_line.to_string()))?;
    let rev = caps.name("rev").map(|m| m.as_str()).unwrap_or("");
    let selection = caps.name("rev_selection").map(|m| m.as_str());

    if rev == "*" {
        let prefix = format!("refs/remotes/{}/", DEFAULT_REMOTE);
        let mut seen = HashSet::new();
        let mut selected = Vec::new();
        for entry in repo.refs()? {
            let full = entry.full_ref.path();
            let Some(branch) = full.strip_prefix(&prefix) else {
                continue;
            };
            for (tag, commit) in branch_tags(repo, branch, selection.unwrap_or(""))? {
                if seen.insert(tag.clone()) {
                    selected.push((tag, commit));
                }
            }
        }
        return Ok(selected);
    }

    let rev = if rev.is_empty() {
        repo.branch()?
    } else {
        rev.to_string()
    };
    match selection {
        None => {
            for candidate in [
                format!("refs/heads/{}", rev),
                format!("refs/remotes/{}/{}", DEFAULT_REMOTE, rev),
                format!("refs/tags/{}", rev),
            ] {
                if let Some(commit) = repo.peel(&candidate)? {
                    return Ok(vec![(rev, commit.to_string())]);
                }
            }
            let commit = repo
                .peel(&rev)?
                .ok_or_else(|| AppError::UnresolvableRef(rev.clone()))?;
            Ok(vec![(rev, commit.to_string())])
        }
        Some(selection) => branch_tags(repo, &rev, selection),
    }
}

/// Full ref of `branch`, local first, then `origin`.
fn branch_ref(repo: &GitRepo, branch: &str) -> Result<String, AppError> {
    for candidate in [
        format!("refs/heads/{}", branch),
        format!("refs/remotes/{}/{}", DEFAULT_REMOTE, branch),
    ] {
        if repo.peel(&candidate)?.is_some() {
            return Ok(candidate);
        }
    }
    Err(AppError::UnresolvableRef(branch.to_string()))
}

/// Tags merged into `branch`, limited to `selection` when it is a range.
fn branch_tags(
    repo: &GitRepo,
    branch: &str,
    selection: &str,
) -> Result<Vec<(String, String)>, AppError> {
    let reference = branch_ref(repo, branch)?;
    let tags = repo.merged_tags(&reference)?;

    let in_range: Option<HashSet<String>> = if selection.is_empty() {
        None
    } else {
        let (start, stop) = selection
            .rsplit_once("..")
            .ok_or_else(|| AppError::InvalidReleaseLine(format!("{}:{}", branch, selection)))?;
        let start = if start.is_empty() { reference.as_str() } else { start };
        let stop = if stop.is_empty() { reference.as_str() } else { stop };
        Some(
            repo.rev_list(&format!("{}..{}", start, stop))?
                .into_iter()
                .map(|c| c.to_string())
                .collect(),
        )
    };

    let mut selected = Vec::new();
    for tag in tags {
        let Some(commit) = repo.peel(&format!("refs/tags/{}", tag))? else {
            continue;
        };
        let commit = commit.to_string();
        if in_range.as_ref().is_none_or(|set| set.contains(&commit)) {
            selected.push((tag, commit));
        }
    }
    Ok(selected)
}

// ============================================================================
// Gathering
// ============================================================================

/// A repository opened for scanning; holds the scratch clone alive.
struct Checkout {
    repo: GitRepo,
    _scratch: Option<TempDir>,
}

fn open_source(base_url: &str) -> Result<(Checkout, Url), AppError> {
    let parsed =
        Url::parse(base_url).map_err(|_| AppError::UnsupportedScheme(base_url.to_string()))?;
    match parsed.scheme() {
        "git+https" | "git+http" => {
            let scratch = TempDir::new()?;
            let clone_url = base_url.trim_start_matches("git+");
            let repo = GitRepo::clone_from(clone_url, &scratch.path().join("repo"))?;
            Ok((
                Checkout {
                    repo,
                    _scratch: Some(scratch),
                },
                parsed,
            ))
        }
        "git+file" => {
            let path: PathBuf = parsed.path().into();
            let repo = GitRepo::open(path)?;
            Ok((
                Checkout {
                    repo,
                    _scratch: None,
                },
                parsed,
            ))
        }
        _ => Err(AppError::UnsupportedScheme(base_url.to_string())),
    }
}

/// Expand every release spec of `app` into `(version, release)` pairs.
///
/// Releases without metadata and without a metadata override are skipped
/// with a warning.
pub fn gather_releases(
    app: &AppData,
    scanner: &dyn RepositoryScanner,
) -> Result<Vec<(String, Release)>, AppError> {
    let mut gathered = Vec::new();
    for spec in &app.releases {
        let (version_override, environment_override, metadata_override) = match spec {
            ReleaseSpec::Url(_) => (None, None, None),
            ReleaseSpec::Detailed {
                version,
                environment,
                metadata,
                ..
            } => (
                version.clone(),
                environment.clone(),
                metadata.clone().or_else(|| app.metadata.clone()),
            ),
        };

        if !spec.url().starts_with("git+") {
            let source = TreeSource::parse(spec.url())?;
            let version = version_override
                .clone()
                .ok_or_else(|| AppError::MissingReleaseVersion(spec.url().to_string()))?;
            let tree = source.fetch()?;
            let scanned = scanner.scan_dir(tree.path())?;
            let Some(metadata) = metadata_override.clone().or(scanned.metadata) else {
                tracing::warn!(
                    "Failed to parse metadata for {} and no override specified, skipping release",
                    spec.url()
                );
                continue;
            };
            gathered.push((
                version,
                Release {
                    environment: environment_override.unwrap_or(scanned.environment),
                    metadata,
                    url: spec.url().to_string(),
                },
            ));
            continue;
        }

        let (base_url, line) = split_release_line(spec.url());
        let (checkout, mut pinned) = open_source(&base_url)?;
        let line = match line {
            Some(line) => line,
            None => checkout.repo.branch()?,
        };

        for (name, commit) in release_commits(&checkout.repo, &line)? {
            let scanned = scanner.scan(&checkout.repo, &commit)?;
            let metadata = match (metadata_override.clone(), scanned.metadata) {
                (Some(m), _) | (None, Some(m)) => m,
                (None, None) => {
                    tracing::warn!(
                        "Failed to parse metadata for {}@{} and no override specified, skipping release",
                        base_url,
                        name
                    );
                    continue;
                }
            };
            let base_path = pinned.path().to_string();
            pinned.set_path(&format!("{}@{}", base_path, commit));
            let url = pinned.to_string();
            pinned.set_path(&base_path);

            gathered.push((
                version_override.clone().unwrap_or(name),
                Release {
                    environment: environment_override
                        .clone()
                        .unwrap_or(scanned.environment),
                    metadata,
                    url,
                },
            ));
        }
    }
    Ok(gathered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::testing::*;
    use std::path::Path;

    /// master: c1 (v0.1.0) -> c2 (v1.0.0) -> c3 (v1.1.0); side: (v2.0.0a1) off c3
    fn app_repo(dir: &Path) -> (String, String, String) {
        init_repo(dir);
        commit_file(dir, METADATA_FILE, r#"{"title": "Demo", "version": "0.1.0"}"#, "meta");
        git(dir, &["tag", "v0.1.0"]);
        let v1 = commit_file(dir, REQUIREMENTS_FILE, "# deps\naiida-core~=2.0\n\n", "reqs");
        git(dir, &["tag", "-a", "v1.0.0", "-m", "1.0.0"]);
        let v11 = commit_file(dir, "app.py", "print()", "feature");
        git(dir, &["tag", "v1.1.0"]);
        git(dir, &["checkout", "--quiet", "-b", "side"]);
        commit_file(dir, "side.py", "x", "side");
        git(dir, &["tag", "v2.0.0a1"]);
        git(dir, &["checkout", "--quiet", "master"]);
        let v01 = git(dir, &["rev-parse", "v0.1.0"]);
        (v01, v1, v11)
    }

    fn names(pairs: &[(String, String)]) -> Vec<&str> {
        let mut names: Vec<&str> = pairs.iter().map(|(n, _)| n.as_str()).collect();
        names.sort();
        names
    }

    #[test]
    fn test_split_release_line() {
        assert_eq!(
            split_release_line("git+https://github.com/org/app.git@main:v1.."),
            (
                "git+https://github.com/org/app.git".to_string(),
                Some("main:v1..".to_string())
            )
        );
        assert_eq!(
            split_release_line("git+https://github.com/org/app.git"),
            ("git+https://github.com/org/app.git".to_string(), None)
        );
    }

    #[test]
    fn test_single_revision_selection() {
        let tmp = TempDir::new().unwrap();
        let (_, v1, v11) = app_repo(tmp.path());
        let repo = GitRepo::open(tmp.path()).unwrap();

        assert_eq!(
            release_commits(&repo, "master").unwrap(),
            vec![("master".to_string(), v11)]
        );
        assert_eq!(
            release_commits(&repo, "v1.0.0").unwrap(),
            vec![("v1.0.0".to_string(), v1.clone())]
        );
        assert_eq!(
            release_commits(&repo, &v1).unwrap(),
            vec![(v1.clone(), v1)]
        );
    }

    #[test]
    fn test_all_tags_on_branch() {
        let tmp = TempDir::new().unwrap();
        app_repo(tmp.path());
        let repo = GitRepo::open(tmp.path()).unwrap();
        assert_eq!(
            names(&release_commits(&repo, "master:").unwrap()),
            vec!["v0.1.0", "v1.0.0", "v1.1.0"]
        );
        assert_eq!(
            names(&release_commits(&repo, ":").unwrap()),
            vec!["v0.1.0", "v1.0.0", "v1.1.0"]
        );
    }

    #[test]
    fn test_range_selection() {
        let tmp = TempDir::new().unwrap();
        app_repo(tmp.path());
        let repo = GitRepo::open(tmp.path()).unwrap();
        assert_eq!(
            names(&release_commits(&repo, "master:v0.1.0..").unwrap()),
            vec!["v1.0.0", "v1.1.0"]
        );
        assert_eq!(
            names(&release_commits(&repo, "master:v0.1.0..v1.0.0").unwrap()),
            vec!["v1.0.0"]
        );
        assert!(matches!(
            release_commits(&repo, "master:v1.0.0"),
            Err(AppError::InvalidReleaseLine(_))
        ));
    }

    #[test]
    fn test_all_origin_branches() {
        let tmp = TempDir::new().unwrap();
        let upstream = tmp.path().join("upstream");
        app_repo(&upstream);
        let repo =
            GitRepo::clone_from(upstream.to_str().unwrap(), &tmp.path().join("clone")).unwrap();
        assert_eq!(
            names(&release_commits(&repo, "*:v1.0.0..").unwrap()),
            vec!["v1.1.0", "v2.0.0a1"]
        );
    }

    #[test]
    fn test_scanner_reads_tree_at_commit() {
        let tmp = TempDir::new().unwrap();
        let (v01, v1, _) = app_repo(tmp.path());
        let repo = GitRepo::open(tmp.path()).unwrap();

        let early = AppTreeScanner.scan(&repo, &v01).unwrap();
        assert_eq!(early.metadata.unwrap().title.as_deref(), Some("Demo"));
        assert!(early.environment.python_requirements.is_empty());

        let later = AppTreeScanner.scan(&repo, &v1).unwrap();
        assert_eq!(
            later.environment.python_requirements,
            vec!["aiida-core~=2.0"]
        );
    }

    #[test]
    fn test_gather_releases_pins_commits_and_applies_overrides() {
        let tmp = TempDir::new().unwrap();
        let (_, v1, v11) = app_repo(tmp.path());
        let base = format!("git+file://{}", tmp.path().display());

        let app = AppData {
            releases: vec![
                ReleaseSpec::Url(format!("{}@master:v0.1.0..", base)),
                ReleaseSpec::Detailed {
                    url: format!("{}@v1.0.0", base),
                    version: Some("1.0.0-legacy".to_string()),
                    environment: Some(Environment::default()),
                    metadata: None,
                },
            ],
            ..Default::default()
        };
        let releases: BTreeMap<String, Release> =
            gather_releases(&app, &AppTreeScanner).unwrap().into_iter().collect();

        assert_eq!(
            releases.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["1.0.0-legacy", "v1.0.0", "v1.1.0"]
        );
        assert!(releases["v1.1.0"].url.ends_with(&format!("@{}", v11)));
        assert_eq!(
            releases["v1.0.0"].environment.python_requirements,
            vec!["aiida-core~=2.0"]
        );
        assert!(releases["1.0.0-legacy"].url.ends_with(&format!("@{}", v1)));
        assert!(releases["1.0.0-legacy"]
            .environment
            .python_requirements
            .is_empty());
    }

    #[test]
    fn test_gather_rejects_unsupported_scheme() {
        let app = AppData {
            releases: vec![ReleaseSpec::Url("svn://example.com/app@trunk".to_string())],
            ..Default::default()
        };
        assert!(matches!(
            gather_releases(&app, &AppTreeScanner),
            Err(AppError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn test_scan_dir_reads_nested_metadata() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join(".aiidalab")).unwrap();
        fs::write(
            tmp.path().join(".aiidalab").join(METADATA_FILE),
            r#"{"title": "Nested"}"#,
        )
        .unwrap();
        let scanned = AppTreeScanner.scan_dir(tmp.path()).unwrap();
        assert_eq!(scanned.metadata.unwrap().title.as_deref(), Some("Nested"));
        assert!(scanned.environment.python_requirements.is_empty());
    }

    #[test]
    fn test_directory_release_needs_version() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("demo");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(METADATA_FILE), r#"{"title": "Demo"}"#).unwrap();
        fs::write(dir.join(REQUIREMENTS_FILE), "aiida-core>=2\n").unwrap();
        let url = format!("file://{}", dir.display());

        let unversioned = AppData {
            releases: vec![ReleaseSpec::Url(url.clone())],
            ..Default::default()
        };
        assert!(matches!(
            gather_releases(&unversioned, &AppTreeScanner),
            Err(AppError::MissingReleaseVersion(_))
        ));

        let versioned = AppData {
            releases: vec![ReleaseSpec::Detailed {
                url: url.clone(),
                version: Some("0.3.0".to_string()),
                environment: None,
                metadata: None,
            }],
            ..Default::default()
        };
        let releases = gather_releases(&versioned, &AppTreeScanner).unwrap();
        assert_eq!(releases.len(), 1);
        let (version, release) = &releases[0];
        assert_eq!(version, "0.3.0");
        assert_eq!(release.url, url);
        assert_eq!(release.metadata.title.as_deref(), Some("Demo"));
        assert_eq!(release.environment.python_requirements, vec!["aiida-core>=2"]);
    }

    #[test]
    fn test_release_spec_yaml_forms() {
        let data = RegistryData::from_yaml(
            r#"
apps:
  demo:
    releases:
      - "git+https://github.com/org/demo.git@main:"
      - url: "git+https://github.com/org/demo.git@v0.1"
        version: "0.1"
    categories: [utilities]
categories:
  utilities:
    title: Utilities
"#,
        )
        .unwrap();
        let demo = &data.apps["demo"];
        assert!(matches!(demo.releases[0], ReleaseSpec::Url(_)));
        assert!(matches!(
            &demo.releases[1],
            ReleaseSpec::Detailed { version: Some(v), .. } if v == "0.1"
        ));
    }
}
