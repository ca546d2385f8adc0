//! Local git clone inspection and mutation.
//!
//! All access goes through the `git` executable. Every invocation is logged
//! at debug level; non-zero exits become [`AppError::GitCommand`] carrying the
//! command line and captured stderr. Nothing is retried.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_REMOTE;
use crate::errors::AppError;
use crate::version::{CommitId, FullRef};

/// Relation between a local branch and the branch it tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BranchTrackingStatus {
    Behind,
    Equal,
    Ahead,
    Diverged,
}

/// A ref together with the commit it points at (annotated tags peeled).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefEntry {
    pub full_ref: FullRef,
    pub commit: CommitId,
}

// ============================================================================
// Command runner
// ============================================================================

fn git_command(cwd: Option<&Path>) -> Command {
    let mut cmd = Command::new("git");
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    cmd.env("GIT_TERMINAL_PROMPT", "0").env("LC_ALL", "C");
    cmd
}

fn describe<S: AsRef<OsStr>>(args: &[S]) -> String {
    let parts: Vec<String> = args
        .iter()
        .map(|a| a.as_ref().to_string_lossy().into_owned())
        .collect();
    format!("git {}", parts.join(" "))
}

fn output<S: AsRef<OsStr>>(cwd: Option<&Path>, args: &[S]) -> Result<Output, AppError> {
    tracing::debug!("{} (in {:?})", describe(args), cwd);
    git_command(cwd).args(args).output().map_err(|e| AppError::GitCommand {
        command: describe(args),
        stderr: e.to_string(),
    })
}

fn checked<S: AsRef<OsStr>>(cwd: Option<&Path>, args: &[S]) -> Result<String, AppError> {
    let out = output(cwd, args)?;
    if !out.status.success() {
        return Err(AppError::GitCommand {
            command: describe(args),
            stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&out.stdout).trim_end().to_string())
}

/// Map `git ls-remote` output onto `ref -> sha`.
fn parse_ls_remote(stdout: &str) -> BTreeMap<String, String> {
    stdout
        .lines()
        .filter_map(|line| {
            let (sha, name) = line.split_once('\t')?;
            Some((name.trim().to_string(), sha.trim().to_string()))
        })
        .collect()
}

/// List refs of a remote repository without cloning it.
pub fn ls_remote(url: &str) -> Result<BTreeMap<String, String>, AppError> {
    Ok(parse_ls_remote(&checked(None, &["ls-remote", url])?))
}

// ============================================================================
// GitRepo
// ============================================================================

/// Handle to one local clone.
#[derive(Debug, Clone)]
pub struct GitRepo {
    path: PathBuf,
}

impl GitRepo {
    /// True if `path` holds its own git repository.
    pub fn is_repo(path: &Path) -> bool {
        path.join(".git").exists()
    }

    /// Open an existing clone.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let path = path.into();
        if !Self::is_repo(&path) {
            return Err(AppError::NotGitRepository(path));
        }
        let repo = Self { path };
        repo.run(&["rev-parse", "--git-dir"])
            .map_err(|_| AppError::NotGitRepository(repo.path.clone()))?;
        Ok(repo)
    }

    /// Clone `url` into `dest`.
    pub fn clone_from(url: &str, dest: &Path) -> Result<Self, AppError> {
        let dest_str = dest.to_string_lossy();
        checked(None, &["clone", "--quiet", url, &*dest_str])?;
        Self::open(dest)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run git in this repository and return trimmed stdout.
    pub fn run<S: AsRef<OsStr>>(&self, args: &[S]) -> Result<String, AppError> {
        checked(Some(&self.path), args)
    }

    /// Run a predicate command: exit 0 is true, exit 1 is false.
    fn test<S: AsRef<OsStr>>(&self, args: &[S]) -> Result<bool, AppError> {
        let out = output(Some(&self.path), args)?;
        match out.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(AppError::GitCommand {
                command: describe(args),
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            }),
        }
    }

    // ------------------------------------------------------------------------
    // Object and ref lookups
    // ------------------------------------------------------------------------

    /// Commit HEAD points at.
    pub fn head(&self) -> Result<CommitId, AppError> {
        CommitId::parse(&self.run(&["rev-parse", "HEAD"])?)
    }

    /// Resolve any revision expression to a commit, `None` if it does not exist.
    pub fn peel(&self, rev: &str) -> Result<Option<CommitId>, AppError> {
        let spec = format!("{}^{{commit}}", rev);
        let out = output(Some(&self.path), &["rev-parse", "--verify", "--quiet", &spec])?;
        if !out.status.success() {
            return Ok(None);
        }
        let sha = String::from_utf8_lossy(&out.stdout).trim().to_string();
        CommitId::parse(&sha).map(Some)
    }

    /// True if the object store holds `commit`.
    pub fn contains_commit(&self, commit: &str) -> Result<bool, AppError> {
        Ok(self.peel(commit)?.is_some())
    }

    /// All branch, tag and remote-tracking refs with the commits they point at.
    ///
    /// Symbolic `refs/remotes/<remote>/HEAD` entries are skipped.
    pub fn refs(&self) -> Result<Vec<RefEntry>, AppError> {
        let stdout = self.run(&[
            "for-each-ref",
            "--format=%(refname)%09%(objectname)%09%(*objectname)",
            "refs/heads",
            "refs/tags",
            "refs/remotes",
        ])?;
        let mut entries = Vec::new();
        for line in stdout.lines() {
            let mut fields = line.split('\t');
            let (Some(name), Some(object)) = (fields.next(), fields.next()) else {
                continue;
            };
            let peeled = fields.next().filter(|s| !s.is_empty()).unwrap_or(object);
            if name.starts_with("refs/remotes/") && name.ends_with("/HEAD") {
                continue;
            }
            let (Some(full_ref), Ok(commit)) = (FullRef::parse(name), CommitId::parse(peeled))
            else {
                continue;
            };
            entries.push(RefEntry { full_ref, commit });
        }
        Ok(entries)
    }

    /// Names of the configured remotes.
    pub fn remotes(&self) -> Result<Vec<String>, AppError> {
        Ok(self
            .run(&["remote"])?
            .lines()
            .map(str::to_string)
            .collect())
    }

    /// Commits reachable from `rev`, newest first.
    pub fn rev_list(&self, rev: &str) -> Result<Vec<CommitId>, AppError> {
        self.run(&["rev-list", rev])?
            .lines()
            .map(CommitId::parse)
            .collect()
    }

    /// Tag names whose commits are reachable from `rev`.
    pub fn merged_tags(&self, rev: &str) -> Result<Vec<String>, AppError> {
        Ok(self
            .run(&["tag", "--merged", rev])?
            .lines()
            .map(str::to_string)
            .collect())
    }

    /// True if `ancestor` is reachable from `descendant`.
    pub fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool, AppError> {
        self.test(&["merge-base", "--is-ancestor", ancestor, descendant])
    }

    /// Content of `path` at `commit`, `None` if the file does not exist there.
    pub fn show_file(&self, commit: &str, path: &str) -> Result<Option<String>, AppError> {
        let object = format!("{}:{}", commit, path);
        if !output(Some(&self.path), &["cat-file", "-e", &object])?.status.success() {
            return Ok(None);
        }
        self.run(&["show", &object]).map(Some)
    }

    // ------------------------------------------------------------------------
    // Working tree and branch state
    // ------------------------------------------------------------------------

    /// True if staged or unstaged changes to tracked files exist.
    pub fn dirty(&self) -> Result<bool, AppError> {
        let status = self.run(&["status", "--porcelain", "--untracked-files=no"])?;
        Ok(!status.trim().is_empty())
    }

    /// Name of the checked-out branch.
    pub fn branch(&self) -> Result<String, AppError> {
        let out = output(Some(&self.path), &["symbolic-ref", "--short", "-q", "HEAD"])?;
        if !out.status.success() {
            return Err(AppError::DetachedHead(self.path.clone()));
        }
        Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
    }

    /// Value of a git config key, `None` if unset.
    pub fn config_get(&self, key: &str) -> Result<Option<String>, AppError> {
        let out = output(Some(&self.path), &["config", "--get", key])?;
        if !out.status.success() {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&out.stdout).trim().to_string()))
    }

    /// The ref the given (or current) branch tracks, `None` if untracked.
    pub fn get_tracked_branch(&self, branch: Option<&str>) -> Result<Option<FullRef>, AppError> {
        let branch = match branch {
            Some(b) => b.to_string(),
            None => self.branch()?,
        };
        let remote = self.config_get(&format!("branch.{}.remote", branch))?;
        let merge = self.config_get(&format!("branch.{}.merge", branch))?;
        let (Some(remote), Some(merge)) = (remote, merge) else {
            return Ok(None);
        };
        let name = merge.strip_prefix("refs/heads/").unwrap_or(&merge).to_string();
        if remote == "." {
            return Ok(Some(FullRef::Head(name)));
        }
        Ok(Some(FullRef::Remote { remote, name }))
    }

    /// Compare `branch` with the branch it tracks; `None` if untracked.
    pub fn get_branch_tracking_status(
        &self,
        branch: &str,
    ) -> Result<Option<BranchTrackingStatus>, AppError> {
        let Some(tracked) = self.get_tracked_branch(Some(branch))? else {
            return Ok(None);
        };
        let local = self
            .peel(&format!("refs/heads/{}", branch))?
            .ok_or_else(|| AppError::UnresolvableRef(branch.to_string()))?;
        let Some(remote) = self.peel(&tracked.path())? else {
            return Ok(None);
        };

        let status = if local == remote {
            BranchTrackingStatus::Equal
        } else if self.is_ancestor(local.as_str(), remote.as_str())? {
            BranchTrackingStatus::Behind
        } else if self.is_ancestor(remote.as_str(), local.as_str())? {
            BranchTrackingStatus::Ahead
        } else {
            BranchTrackingStatus::Diverged
        };
        Ok(Some(status))
    }

    /// True if the current branch is behind the branch it tracks.
    pub fn update_available(&self) -> Result<bool, AppError> {
        let branch = self.branch()?;
        Ok(self.get_branch_tracking_status(&branch)? == Some(BranchTrackingStatus::Behind))
    }

    // ------------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------------

    /// Fetch branches and tags from `origin`.
    pub fn fetch(&self) -> Result<(), AppError> {
        self.run(&["fetch", "--quiet", "--tags", DEFAULT_REMOTE])?;
        Ok(())
    }

    /// Force `branch` to `start`, make it track `start` and check it out.
    pub fn checkout_branch(&self, branch: &str, start: &str) -> Result<(), AppError> {
        self.run(&["checkout", "--quiet", "--force", "--track", "-B", branch, start])?;
        Ok(())
    }

    /// Forced detached checkout of a revision.
    pub fn checkout_detached(&self, rev: &str) -> Result<(), AppError> {
        self.run(&["checkout", "--quiet", "--force", "--detach", rev])?;
        Ok(())
    }

    pub fn reset_hard(&self, rev: &str) -> Result<(), AppError> {
        self.run(&["reset", "--quiet", "--hard", rev])?;
        Ok(())
    }

    /// Refs of `origin` as seen live on the network.
    pub fn ls_remote_origin(&self, pattern: &str) -> Result<BTreeMap<String, String>, AppError> {
        Ok(parse_ls_remote(&self.run(&["ls-remote", DEFAULT_REMOTE, pattern])?))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Helpers that build throwaway repositories for tests.

    use super::*;
    use std::fs;

    /// Run git with a fixed identity and fail the test on error.
    pub fn git(dir: &Path, args: &[&str]) -> String {
        let out = Command::new("git")
            .current_dir(dir)
            .args([
                "-c",
                "user.name=Test",
                "-c",
                "user.email=test@example.com",
                "-c",
                "init.defaultBranch=master",
                "-c",
                "commit.gpgsign=false",
                "-c",
                "tag.gpgsign=false",
            ])
            .args(args)
            .output()
            .expect("git runs");
        assert!(
            out.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&out.stderr)
        );
        String::from_utf8_lossy(&out.stdout).trim().to_string()
    }

    /// Create a repository at `dir` with one commit on `master`.
    pub fn init_repo(dir: &Path) {
        fs::create_dir_all(dir).unwrap();
        git(dir, &["init", "--quiet"]);
        git(dir, &["checkout", "--quiet", "-B", "master"]);
        commit_file(dir, "README.md", "hello\n", "initial");
    }

    /// Write a file, commit it and return the new commit id.
    pub fn commit_file(dir: &Path, name: &str, content: &str, message: &str) -> String {
        fs::write(dir.join(name), content).unwrap();
        git(dir, &["add", name]);
        git(dir, &["commit", "--quiet", "-m", message]);
        git(dir, &["rev-parse", "HEAD"])
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_open_rejects_plain_directory() {
        let tmp = TempDir::new().unwrap();
        let err = GitRepo::open(tmp.path()).unwrap_err();
        assert!(matches!(err, AppError::NotGitRepository(_)));
    }

    #[test]
    fn test_dirty_ignores_untracked_files() {
        let tmp = TempDir::new().unwrap();
        init_repo(tmp.path());
        let repo = GitRepo::open(tmp.path()).unwrap();
        assert!(!repo.dirty().unwrap());

        fs::write(tmp.path().join("scratch.txt"), "x").unwrap();
        assert!(!repo.dirty().unwrap());

        fs::write(tmp.path().join("README.md"), "changed\n").unwrap();
        assert!(repo.dirty().unwrap());

        git(tmp.path(), &["add", "README.md"]);
        assert!(repo.dirty().unwrap());
    }

    #[test]
    fn test_branch_and_detached_head() {
        let tmp = TempDir::new().unwrap();
        init_repo(tmp.path());
        let repo = GitRepo::open(tmp.path()).unwrap();
        assert_eq!(repo.branch().unwrap(), "master");

        let head = repo.head().unwrap();
        repo.checkout_detached(head.as_str()).unwrap();
        assert!(matches!(repo.branch(), Err(AppError::DetachedHead(_))));
    }

    #[test]
    fn test_refs_peel_annotated_tags() {
        let tmp = TempDir::new().unwrap();
        init_repo(tmp.path());
        let sha = git(tmp.path(), &["rev-parse", "HEAD"]);
        git(tmp.path(), &["tag", "-a", "v1.0.0", "-m", "release"]);
        git(tmp.path(), &["tag", "light"]);

        let repo = GitRepo::open(tmp.path()).unwrap();
        let refs = repo.refs().unwrap();
        for name in ["v1.0.0", "light"] {
            let entry = refs
                .iter()
                .find(|e| e.full_ref == FullRef::Tag(name.to_string()))
                .unwrap();
            assert_eq!(entry.commit.as_str(), sha);
        }
        assert!(refs.iter().any(|e| e.full_ref == FullRef::Head("master".to_string())));
    }

    #[test]
    fn test_tracking_status() {
        let tmp = TempDir::new().unwrap();
        let upstream = tmp.path().join("upstream");
        init_repo(&upstream);
        let clone_dir = tmp.path().join("clone");
        let repo =
            GitRepo::clone_from(upstream.to_str().unwrap(), &clone_dir).unwrap();

        assert_eq!(
            repo.get_tracked_branch(None).unwrap(),
            Some(FullRef::remote("origin", "master"))
        );
        assert_eq!(
            repo.get_branch_tracking_status("master").unwrap(),
            Some(BranchTrackingStatus::Equal)
        );

        commit_file(&upstream, "a.txt", "a", "upstream change");
        repo.fetch().unwrap();
        assert_eq!(
            repo.get_branch_tracking_status("master").unwrap(),
            Some(BranchTrackingStatus::Behind)
        );
        assert!(repo.update_available().unwrap());

        commit_file(&clone_dir, "b.txt", "b", "local change");
        assert_eq!(
            repo.get_branch_tracking_status("master").unwrap(),
            Some(BranchTrackingStatus::Diverged)
        );

        repo.reset_hard("origin/master").unwrap();
        commit_file(&clone_dir, "c.txt", "c", "ahead");
        assert_eq!(
            repo.get_branch_tracking_status("master").unwrap(),
            Some(BranchTrackingStatus::Ahead)
        );

        git(&clone_dir, &["checkout", "--quiet", "-b", "untracked"]);
        assert_eq!(repo.get_branch_tracking_status("untracked").unwrap(), None);
    }

    #[test]
    fn test_show_file_at_commit() {
        let tmp = TempDir::new().unwrap();
        init_repo(tmp.path());
        let first = git(tmp.path(), &["rev-parse", "HEAD"]);
        commit_file(tmp.path(), "README.md", "second\n", "second");

        let repo = GitRepo::open(tmp.path()).unwrap();
        assert_eq!(
            repo.show_file(&first, "README.md").unwrap().as_deref(),
            Some("hello")
        );
        assert_eq!(repo.show_file(&first, "missing.txt").unwrap(), None);
    }

    #[test]
    fn test_parse_ls_remote() {
        let refs = parse_ls_remote("abc\tHEAD\ndef\trefs/heads/master\n");
        assert_eq!(refs.get("refs/heads/master").map(String::as_str), Some("def"));
        assert_eq!(refs.len(), 2);
    }
}
