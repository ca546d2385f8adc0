//! Release-line resolution.
//!
//! A release line is either a bare commit id or a short name (branch or tag).
//! [`ReleaseLine::find_versions`] maps it onto the ordered list of versions an
//! app offers: element 0 is the current/latest version, followed by every
//! other tag in the line's history.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::constants::DEFAULT_REMOTE;
use crate::errors::AppError;
use crate::git::{GitRepo, RefEntry};
use crate::version::{sort_semantic, CommitId, FullRef, Revision};

static RELEASE_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(?P<commit>(?:[0-9a-fA-F]{20}){1,2})|(?P<short_ref>.+))$")
        .expect("Invalid regex")
});

/// How an app declares its main line of development.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReleaseLineSpec {
    Commit(CommitId),
    ShortRef(String),
}

impl ReleaseLineSpec {
    pub fn parse(line: &str) -> Result<Self, AppError> {
        let caps = RELEASE_LINE_RE
            .captures(line.trim())
            .ok_or_else(|| AppError::InvalidReleaseLine(line.to_string()))?;
        if let Some(commit) = caps.name("commit") {
            return Ok(ReleaseLineSpec::Commit(CommitId::parse(commit.as_str())?));
        }
        match caps.name("short_ref") {
            Some(name) => Ok(ReleaseLineSpec::ShortRef(name.as_str().to_string())),
            None => Err(AppError::InvalidReleaseLine(line.to_string())),
        }
    }
}

impl fmt::Display for ReleaseLineSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReleaseLineSpec::Commit(id) => write!(f, "{}", id),
            ReleaseLineSpec::ShortRef(name) => f.write_str(name),
        }
    }
}

/// A release line bound to a local clone.
#[derive(Debug, Clone)]
pub struct ReleaseLine<'a> {
    repo: &'a GitRepo,
    spec: ReleaseLineSpec,
}

impl<'a> ReleaseLine<'a> {
    pub fn new(repo: &'a GitRepo, line: &str) -> Result<Self, AppError> {
        Ok(Self {
            repo,
            spec: ReleaseLineSpec::parse(line)?,
        })
    }

    pub fn spec(&self) -> &ReleaseLineSpec {
        &self.spec
    }

    /// Resolve a short name to a full ref.
    ///
    /// Remote-tracking branches are searched first (`origin` before other
    /// remotes), then local branches, then tags. A branch therefore wins over
    /// a tag of the same name.
    pub fn resolve_short_ref(&self, name: &str) -> Result<FullRef, AppError> {
        let refs = self.repo.refs()?;
        find_short_ref(&refs, name).ok_or_else(|| AppError::UnresolvableRef(name.to_string()))
    }

    /// Versions on this line, latest first.
    pub fn find_versions(&self) -> Result<Vec<Revision>, AppError> {
        match &self.spec {
            ReleaseLineSpec::Commit(commit) => {
                if !self.repo.contains_commit(commit.as_str())? {
                    return Err(AppError::ReleaseLineCommitNotFound(commit.to_string()));
                }
                Ok(vec![Revision::Commit(commit.clone())])
            }
            ReleaseLineSpec::ShortRef(name) => {
                let refs = self.repo.refs()?;
                let line_ref = find_short_ref(&refs, name)
                    .ok_or_else(|| AppError::UnresolvableRef(name.clone()))?;
                if line_ref.is_tag() {
                    return Ok(vec![Revision::Ref(line_ref)]);
                }
                self.branch_versions(&refs, line_ref)
            }
        }
    }

    fn branch_versions(
        &self,
        refs: &[RefEntry],
        line_ref: FullRef,
    ) -> Result<Vec<Revision>, AppError> {
        let mut tags_at: HashMap<&CommitId, Vec<String>> = HashMap::new();
        for entry in refs.iter().filter(|e| e.full_ref.is_tag()) {
            tags_at
                .entry(&entry.commit)
                .or_default()
                .push(entry.full_ref.short_name().to_string());
        }
        for names in tags_at.values_mut() {
            sort_semantic(names);
        }
        let as_revisions = |names: &[String]| -> Vec<Revision> {
            names
                .iter()
                .map(|n| Revision::Ref(FullRef::Tag(n.clone())))
                .collect()
        };

        let history = self.repo.rev_list(&line_ref.path())?;
        let Some((tip, older)) = history.split_first() else {
            return Ok(vec![Revision::Ref(line_ref)]);
        };

        let mut versions = match tags_at.get(tip) {
            Some(names) => as_revisions(names),
            None => vec![Revision::Ref(line_ref)],
        };
        let mut seen: HashSet<Revision> = versions.iter().cloned().collect();
        for commit in older {
            if let Some(names) = tags_at.get(commit) {
                for rev in as_revisions(names) {
                    if seen.insert(rev.clone()) {
                        versions.push(rev);
                    }
                }
            }
        }
        Ok(versions)
    }

    /// Commit a revision points at.
    pub fn resolve_commit(&self, revision: &Revision) -> Result<CommitId, AppError> {
        self.repo
            .peel(&revision.rev_arg())?
            .ok_or_else(|| AppError::UnresolvableRef(revision.rev_arg()))
    }

    /// All versions on this line that point at `commit`, or `{commit}` if none do.
    pub fn resolve_revision(&self, commit: &CommitId) -> Result<BTreeSet<Revision>, AppError> {
        let named = self.revisions_at(commit)?;
        if named.is_empty() {
            return Ok(BTreeSet::from([Revision::Commit(commit.clone())]));
        }
        Ok(named)
    }

    fn revisions_at(&self, commit: &CommitId) -> Result<BTreeSet<Revision>, AppError> {
        let mut named = BTreeSet::new();
        for rev in self.find_versions()? {
            if self.resolve_commit(&rev)? == *commit {
                named.insert(rev);
            }
        }
        Ok(named)
    }

    /// The named version the clone is currently at, `None` if HEAD is off the line.
    ///
    /// Several names for HEAD resolve to the one `find_versions` lists first.
    pub fn current_revision(&self) -> Result<Option<Revision>, AppError> {
        let head = self.repo.head()?;
        for rev in self.find_versions()? {
            if self.resolve_commit(&rev)? == head {
                return Ok(Some(rev));
            }
        }
        Ok(None)
    }

    /// The name this line uses for `revision`.
    ///
    /// A local branch named after a branch line stands for the line's branch
    /// ref (usually `refs/remotes/origin/<line>`); other revisions are kept.
    pub fn canonical(&self, revision: Revision) -> Result<Revision, AppError> {
        let ReleaseLineSpec::ShortRef(name) = &self.spec else {
            return Ok(revision);
        };
        match &revision {
            Revision::Ref(FullRef::Head(head)) if head == name => {
                let line_ref = self.resolve_short_ref(name)?;
                if line_ref.is_branch() {
                    Ok(Revision::Ref(line_ref))
                } else {
                    Ok(revision)
                }
            }
            _ => Ok(revision),
        }
    }

    /// True iff `refs/remotes/origin/<line>` exists locally.
    pub fn is_branch(&self) -> Result<bool, AppError> {
        match &self.spec {
            ReleaseLineSpec::Commit(_) => Ok(false),
            ReleaseLineSpec::ShortRef(name) => Ok(self
                .repo
                .peel(&FullRef::remote(DEFAULT_REMOTE, name).path())?
                .is_some()),
        }
    }
}

fn find_short_ref(refs: &[RefEntry], name: &str) -> Option<FullRef> {
    let first = |pred: &dyn Fn(&FullRef) -> bool| {
        refs.iter().map(|e| &e.full_ref).find(|r| pred(r)).cloned()
    };
    first(&|r| {
        matches!(r, FullRef::Remote { remote, name: n } if remote == DEFAULT_REMOTE && n == name)
    })
    .or_else(|| first(&|r| matches!(r, FullRef::Remote { name: n, .. } if n == name)))
    .or_else(|| first(&|r| matches!(r, FullRef::Head(n) if n == name)))
    .or_else(|| first(&|r| matches!(r, FullRef::Tag(n) if n == name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::testing::*;
    use tempfile::TempDir;

    fn tag(name: &str) -> Revision {
        Revision::Ref(FullRef::Tag(name.to_string()))
    }

    /// master: c1 (test-tag) -> c2 -> c3 (v1.0.0)
    fn scenario_a(dir: &std::path::Path) -> GitRepo {
        init_repo(dir);
        git(dir, &["tag", "test-tag"]);
        commit_file(dir, "a.txt", "a", "second");
        commit_file(dir, "b.txt", "b", "third");
        git(dir, &["tag", "-a", "v1.0.0", "-m", "release 1.0.0"]);
        GitRepo::open(dir).unwrap()
    }

    #[test]
    fn test_parse_release_line_spec() {
        let sha = "0123456789abcdef0123456789abcdef01234567";
        assert_eq!(
            ReleaseLineSpec::parse(sha).unwrap(),
            ReleaseLineSpec::Commit(CommitId::parse(sha).unwrap())
        );
        assert_eq!(
            ReleaseLineSpec::parse("main").unwrap(),
            ReleaseLineSpec::ShortRef("main".to_string())
        );
        assert!(ReleaseLineSpec::parse("").is_err());
    }

    #[test]
    fn test_find_versions_tagged_tip_first() {
        let tmp = TempDir::new().unwrap();
        let repo = scenario_a(tmp.path());
        let line = ReleaseLine::new(&repo, "master").unwrap();
        assert_eq!(
            line.find_versions().unwrap(),
            vec![tag("v1.0.0"), tag("test-tag")]
        );
    }

    #[test]
    fn test_find_versions_untagged_tip_yields_branch() {
        let tmp = TempDir::new().unwrap();
        let repo = scenario_a(tmp.path());
        commit_file(tmp.path(), "c.txt", "c", "unreleased");
        let line = ReleaseLine::new(&repo, "master").unwrap();
        let versions = line.find_versions().unwrap();
        assert_eq!(versions[0], Revision::Ref(FullRef::Head("master".to_string())));
        assert_eq!(&versions[1..], &[tag("v1.0.0"), tag("test-tag")]);
    }

    #[test]
    fn test_tags_off_the_line_are_excluded() {
        let tmp = TempDir::new().unwrap();
        let repo = scenario_a(tmp.path());
        git(tmp.path(), &["checkout", "--quiet", "-b", "side"]);
        commit_file(tmp.path(), "side.txt", "s", "side work");
        git(tmp.path(), &["tag", "side-tag"]);
        git(tmp.path(), &["checkout", "--quiet", "master"]);

        let line = ReleaseLine::new(&repo, "master").unwrap();
        assert!(!line.find_versions().unwrap().contains(&tag("side-tag")));
    }

    #[test]
    fn test_branch_beats_tag_of_same_name() {
        let tmp = TempDir::new().unwrap();
        let repo = scenario_a(tmp.path());
        git(tmp.path(), &["tag", "stable", "test-tag"]);
        git(tmp.path(), &["branch", "stable"]);

        let line = ReleaseLine::new(&repo, "stable").unwrap();
        assert_eq!(
            line.resolve_short_ref("stable").unwrap(),
            FullRef::Head("stable".to_string())
        );
        assert_eq!(
            line.resolve_short_ref("test-tag").unwrap(),
            FullRef::Tag("test-tag".to_string())
        );
        assert!(matches!(
            line.resolve_short_ref("nope"),
            Err(AppError::UnresolvableRef(_))
        ));
    }

    #[test]
    fn test_remote_branch_preferred_over_local() {
        let tmp = TempDir::new().unwrap();
        let upstream = tmp.path().join("upstream");
        scenario_a(&upstream);
        let repo = GitRepo::clone_from(upstream.to_str().unwrap(), &tmp.path().join("clone"))
            .unwrap();
        let line = ReleaseLine::new(&repo, "master").unwrap();
        assert_eq!(
            line.resolve_short_ref("master").unwrap(),
            FullRef::remote("origin", "master")
        );
        assert!(line.is_branch().unwrap());
        assert!(!ReleaseLine::new(&repo, "v1.0.0").unwrap().is_branch().unwrap());
    }

    #[test]
    fn test_tag_line_yields_single_tag() {
        let tmp = TempDir::new().unwrap();
        let repo = scenario_a(tmp.path());
        let line = ReleaseLine::new(&repo, "test-tag").unwrap();
        assert_eq!(line.find_versions().unwrap(), vec![tag("test-tag")]);
    }

    #[test]
    fn test_commit_line() {
        let tmp = TempDir::new().unwrap();
        let repo = scenario_a(tmp.path());
        let head = repo.head().unwrap();
        let line = ReleaseLine::new(&repo, head.as_str()).unwrap();
        assert_eq!(line.find_versions().unwrap(), vec![Revision::Commit(head.clone())]);
        assert_eq!(line.current_revision().unwrap(), Some(Revision::Commit(head)));

        let missing = ReleaseLine::new(&repo, &"ab".repeat(20)).unwrap();
        assert!(matches!(
            missing.find_versions(),
            Err(AppError::ReleaseLineCommitNotFound(_))
        ));
    }

    #[test]
    fn test_resolve_revision_is_left_inverse_of_find_versions() {
        let tmp = TempDir::new().unwrap();
        let repo = scenario_a(tmp.path());
        let line = ReleaseLine::new(&repo, "master").unwrap();
        for v in line.find_versions().unwrap() {
            let commit = line.resolve_commit(&v).unwrap();
            let named = line.resolve_revision(&commit).unwrap();
            let back = named.iter().next().unwrap();
            assert_eq!(line.resolve_commit(back).unwrap(), commit);
        }

        let off_line = CommitId::parse(&commit_file(tmp.path(), "x", "x", "x")).unwrap();
        git(tmp.path(), &["reset", "--quiet", "--hard", "HEAD~1"]);
        assert_eq!(
            line.resolve_revision(&off_line).unwrap(),
            BTreeSet::from([Revision::Commit(off_line)])
        );
    }

    #[test]
    fn test_current_revision_follows_version_order() {
        let tmp = TempDir::new().unwrap();
        let repo = scenario_a(tmp.path());
        git(tmp.path(), &["tag", "latest"]);

        let line = ReleaseLine::new(&repo, "master").unwrap();
        let versions = line.find_versions().unwrap();
        assert_eq!(&versions[..2], &[tag("v1.0.0"), tag("latest")]);
        assert_eq!(line.current_revision().unwrap(), Some(tag("v1.0.0")));
    }

    #[test]
    fn test_canonical_branch_alias() {
        let tmp = TempDir::new().unwrap();
        let upstream = tmp.path().join("upstream");
        scenario_a(&upstream);
        let repo = GitRepo::clone_from(upstream.to_str().unwrap(), &tmp.path().join("clone"))
            .unwrap();
        let line = ReleaseLine::new(&repo, "master").unwrap();

        let head = Revision::Ref(FullRef::Head("master".to_string()));
        let remote = Revision::Ref(FullRef::remote("origin", "master"));
        assert_eq!(line.canonical(head).unwrap(), remote);
        assert_eq!(line.canonical(remote.clone()).unwrap(), remote);
        assert_eq!(line.canonical(tag("v1.0.0")).unwrap(), tag("v1.0.0"));

        let other = Revision::Ref(FullRef::Head("develop".to_string()));
        assert_eq!(line.canonical(other.clone()).unwrap(), other);
    }

    #[test]
    fn test_current_revision_off_line_is_none() {
        let tmp = TempDir::new().unwrap();
        let repo = scenario_a(tmp.path());
        let line = ReleaseLine::new(&repo, "master").unwrap();
        assert_eq!(line.current_revision().unwrap(), Some(tag("v1.0.0")));

        git(tmp.path(), &["checkout", "--quiet", "-b", "side"]);
        commit_file(tmp.path(), "side.txt", "s", "side work");
        assert_eq!(line.current_revision().unwrap(), None);
    }
}
