//! App version identifiers.
//!
//! Every version an app can be at is one of:
//! - a commit ([`CommitId`], 20 or 40 hex characters)
//! - a full git reference ([`FullRef`]: local branch, tag or remote-tracking branch)
//! - [`AppVersion::Unknown`] when the installed commit has no name on the release line
//! - [`AppVersion::NotInstalled`] when there is no local clone
//!
//! The string form `git:<full-ref-or-commit>` is only produced at the edges
//! (display, JSON, registry files); the rest of the crate passes the typed values.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::constants::{NOT_INSTALLED_VERSION, UNKNOWN_VERSION, VERSION_PREFIX};
use crate::errors::AppError;
use crate::pep440::PackageVersion;

// ============================================================================
// CommitId
// ============================================================================

/// A git object id, stored lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommitId(String);

impl CommitId {
    /// Parse a hex commit id of exactly 20 or 40 characters.
    pub fn parse(s: &str) -> Result<Self, AppError> {
        if Self::is_valid(s) {
            Ok(Self(s.to_ascii_lowercase()))
        } else {
            Err(AppError::InvalidVersion(s.to_string()))
        }
    }

    /// True if `s` has the shape of a commit id.
    pub fn is_valid(s: &str) -> bool {
        (s.len() == 20 || s.len() == 40) && s.chars().all(|c| c.is_ascii_hexdigit())
    }

    /// The full hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form used for display.
    pub fn short(&self) -> &str {
        &self.0[..8]
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// FullRef
// ============================================================================

/// A complete reference path such as `refs/heads/main`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FullRef {
    /// `refs/heads/<name>`
    Head(String),
    /// `refs/tags/<name>`
    Tag(String),
    /// `refs/remotes/<remote>/<name>`
    Remote { remote: String, name: String },
}

impl FullRef {
    /// Parse a full reference path. Returns `None` for anything outside
    /// `refs/heads`, `refs/tags` and `refs/remotes/<remote>`.
    pub fn parse(path: &str) -> Option<Self> {
        if let Some(name) = path.strip_prefix("refs/heads/") {
            return (!name.is_empty()).then(|| FullRef::Head(name.to_string()));
        }
        if let Some(name) = path.strip_prefix("refs/tags/") {
            return (!name.is_empty()).then(|| FullRef::Tag(name.to_string()));
        }
        let rest = path.strip_prefix("refs/remotes/")?;
        let (remote, name) = rest.split_once('/')?;
        if remote.is_empty() || name.is_empty() {
            return None;
        }
        Some(FullRef::Remote {
            remote: remote.to_string(),
            name: name.to_string(),
        })
    }

    /// Remote-tracking ref `refs/remotes/<remote>/<name>`.
    pub fn remote(remote: &str, name: &str) -> Self {
        FullRef::Remote {
            remote: remote.to_string(),
            name: name.to_string(),
        }
    }

    /// The full reference path.
    pub fn path(&self) -> String {
        match self {
            FullRef::Head(name) => format!("refs/heads/{}", name),
            FullRef::Tag(name) => format!("refs/tags/{}", name),
            FullRef::Remote { remote, name } => format!("refs/remotes/{}/{}", remote, name),
        }
    }

    /// The name with the namespace (and remote) stripped.
    pub fn short_name(&self) -> &str {
        match self {
            FullRef::Head(name) | FullRef::Tag(name) => name,
            FullRef::Remote { name, .. } => name,
        }
    }

    /// Local and remote-tracking branches.
    pub fn is_branch(&self) -> bool {
        !self.is_tag()
    }

    pub fn is_tag(&self) -> bool {
        matches!(self, FullRef::Tag(_))
    }
}

impl fmt::Display for FullRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

// ============================================================================
// Revision
// ============================================================================

/// A concrete, nameable point on a release line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Revision {
    Commit(CommitId),
    Ref(FullRef),
}

impl Revision {
    /// The argument to pass to git to address this revision.
    pub fn rev_arg(&self) -> String {
        match self {
            Revision::Commit(id) => id.to_string(),
            Revision::Ref(r) => r.path(),
        }
    }

    /// Name without the ref namespace, e.g. `v1.0.0` or `main`.
    pub fn identifier(&self) -> String {
        match self {
            Revision::Commit(id) => id.to_string(),
            Revision::Ref(r) => r.short_name().to_string(),
        }
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", VERSION_PREFIX, self.rev_arg())
    }
}

impl From<FullRef> for Revision {
    fn from(r: FullRef) -> Self {
        Revision::Ref(r)
    }
}

impl From<CommitId> for Revision {
    fn from(id: CommitId) -> Self {
        Revision::Commit(id)
    }
}

// ============================================================================
// AppVersion
// ============================================================================

/// The version of an app as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AppVersion {
    Commit(CommitId),
    Ref(FullRef),
    /// Installed, but the current commit has no name on the release line
    /// or the working tree is modified.
    Unknown,
    NotInstalled,
}

impl AppVersion {
    /// The underlying revision, if this is a concrete version.
    pub fn revision(&self) -> Option<Revision> {
        match self {
            AppVersion::Commit(id) => Some(Revision::Commit(id.clone())),
            AppVersion::Ref(r) => Some(Revision::Ref(r.clone())),
            AppVersion::Unknown | AppVersion::NotInstalled => None,
        }
    }

    /// Identifier with the `git:` prefix and ref namespace stripped.
    ///
    /// `git:refs/tags/v1.0.0` becomes `v1.0.0`. Sentinels have no identifier.
    pub fn identifier(&self) -> Option<String> {
        self.revision().map(|r| r.identifier())
    }

    /// True for commits and refs.
    pub fn is_concrete(&self) -> bool {
        self.revision().is_some()
    }

    /// True for a tag that parses as a pre-release (`v2.0.0rc1`, `1.0.dev3`).
    /// Branches, commits and sentinels never are.
    pub fn is_prerelease(&self) -> bool {
        match self {
            AppVersion::Ref(FullRef::Tag(name)) => name
                .parse::<PackageVersion>()
                .is_ok_and(|v| v.is_prerelease()),
            _ => false,
        }
    }

    /// Human-readable form for listings.
    pub fn short_display(&self) -> String {
        match self {
            AppVersion::Commit(id) => id.short().to_string(),
            AppVersion::Ref(r) if r.is_branch() => format!("{} (latest)", r.short_name()),
            AppVersion::Ref(r) => r.short_name().to_string(),
            AppVersion::Unknown => "[unknown version]".to_string(),
            AppVersion::NotInstalled => "[not installed]".to_string(),
        }
    }
}

impl From<Revision> for AppVersion {
    fn from(rev: Revision) -> Self {
        match rev {
            Revision::Commit(id) => AppVersion::Commit(id),
            Revision::Ref(r) => AppVersion::Ref(r),
        }
    }
}

impl fmt::Display for AppVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppVersion::Unknown => f.write_str(UNKNOWN_VERSION),
            AppVersion::NotInstalled => f.write_str(NOT_INSTALLED_VERSION),
            other => match other.revision() {
                Some(rev) => write!(f, "{}", rev),
                None => Ok(()),
            },
        }
    }
}

impl FromStr for AppVersion {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            UNKNOWN_VERSION => return Ok(AppVersion::Unknown),
            NOT_INSTALLED_VERSION => return Ok(AppVersion::NotInstalled),
            _ => {}
        }
        let body = s
            .strip_prefix(VERSION_PREFIX)
            .ok_or_else(|| AppError::InvalidVersion(s.to_string()))?;
        if let Some(r) = FullRef::parse(body) {
            return Ok(AppVersion::Ref(r));
        }
        CommitId::parse(body)
            .map(AppVersion::Commit)
            .map_err(|_| AppError::InvalidVersion(s.to_string()))
    }
}

impl Serialize for AppVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AppVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Semantic ordering
// ============================================================================

/// Sort names newest first by PEP 440 precedence.
///
/// Names that do not parse as versions go after all parseable ones, ordered
/// by name.
pub fn sort_semantic(names: &mut [String]) {
    names.sort_by(|a, b| compare_semantic_desc(a, b));
}

fn compare_semantic_desc(a: &str, b: &str) -> Ordering {
    match (a.parse::<PackageVersion>(), b.parse::<PackageVersion>()) {
        (Ok(va), Ok(vb)) => vb.cmp(&va).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHA: &str = "c5349173dbda0c0b0b4c1f1a3ea3e0c7e1e0a1b2";

    #[test]
    fn test_parse_tag_version() {
        let v: AppVersion = "git:refs/tags/v1.0.0".parse().unwrap();
        assert_eq!(v, AppVersion::Ref(FullRef::Tag("v1.0.0".to_string())));
        assert_eq!(v.identifier().as_deref(), Some("v1.0.0"));
        assert_eq!(v.to_string(), "git:refs/tags/v1.0.0");
    }

    #[test]
    fn test_parse_remote_branch_version() {
        let v: AppVersion = "git:refs/remotes/origin/feature/x".parse().unwrap();
        assert_eq!(
            v,
            AppVersion::Ref(FullRef::remote("origin", "feature/x"))
        );
        assert_eq!(v.identifier().as_deref(), Some("feature/x"));
        assert_eq!(v.short_display(), "feature/x (latest)");
    }

    #[test]
    fn test_parse_commit_version() {
        let v: AppVersion = format!("git:{}", SHA.to_uppercase()).parse().unwrap();
        assert_eq!(v.to_string(), format!("git:{}", SHA));
        assert_eq!(v.short_display(), &SHA[..8]);

        let short: AppVersion = format!("git:{}", &SHA[..20]).parse().unwrap();
        assert!(matches!(short, AppVersion::Commit(_)));
    }

    #[test]
    fn test_sentinels_round_trip() {
        assert_eq!("UNKNOWN".parse::<AppVersion>().unwrap(), AppVersion::Unknown);
        assert_eq!(
            "NOT_INSTALLED".parse::<AppVersion>().unwrap(),
            AppVersion::NotInstalled
        );
        assert_eq!(AppVersion::NotInstalled.to_string(), "NOT_INSTALLED");
        assert_eq!(AppVersion::Unknown.identifier(), None);
    }

    #[test]
    fn test_rejects_malformed_versions() {
        for bad in ["refs/tags/v1", "git:", "git:abc", "git:refs/notes/x", "git:zz"] {
            assert!(bad.parse::<AppVersion>().is_err(), "{bad} should not parse");
        }
        assert!(CommitId::parse(&SHA[..21]).is_err());
    }

    #[test]
    fn test_serde_uses_string_form() {
        let v = AppVersion::Ref(FullRef::Head("main".to_string()));
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, "\"git:refs/heads/main\"");
        let back: AppVersion = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn test_sort_semantic_newest_first() {
        let mut tags: Vec<String> = ["v0.9", "test-tag", "v1.0.0", "v1.0.0rc1", "v0.10"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        sort_semantic(&mut tags);
        assert_eq!(tags, vec!["v1.0.0", "v1.0.0rc1", "v0.10", "v0.9", "test-tag"]);
    }

    #[test]
    fn test_prerelease_tags() {
        let tag = |n: &str| AppVersion::Ref(FullRef::Tag(n.to_string()));
        assert!(tag("v2.0.0rc1").is_prerelease());
        assert!(tag("1.0.dev3").is_prerelease());
        assert!(!tag("v1.0.0").is_prerelease());
        assert!(!tag("test-tag").is_prerelease());
        assert!(!AppVersion::Ref(FullRef::Head("v2.0.0rc1".to_string())).is_prerelease());
        assert!(!AppVersion::Unknown.is_prerelease());
    }
}
