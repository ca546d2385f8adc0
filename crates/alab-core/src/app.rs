//! The app state machine.
//!
//! An [`App`] ties a registry entry to a local clone at a fixed path and
//! derives an [`AppState`] snapshot from both. Snapshots are recomputed as a
//! whole and published as one [`StateChange`] per recompute, so subscribers
//! never observe a partially updated state.
//!
//! Mutating operations (`install`, `update`, `uninstall`) hold the `busy`
//! flag for their duration; a second mutating call fails with
//! [`AppError::Busy`] instead of waiting.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use serde::Serialize;

use crate::compat::CompatibilityMap;
use crate::constants::{DEFAULT_GIT_BRANCH, DEFAULT_REFRESH_INTERVAL, DEFAULT_REMOTE};
use crate::errors::AppError;
use crate::git::GitRepo;
use crate::packages::{Package, PackageSource};
use crate::registry::RegistryEntry;
use crate::release_line::ReleaseLine;
use crate::throttle::Throttle;
use crate::version::{sort_semantic, AppVersion, CommitId, FullRef, Revision};

// ============================================================================
// State snapshot
// ============================================================================

/// Observable state of one app. `None` means indeterminate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppState {
    /// Newest first; versions known to be incompatible are left out, and so
    /// are pre-releases unless `include_prereleases` is set.
    pub available_versions: Vec<AppVersion>,
    pub installed_version: AppVersion,
    pub detached: Option<bool>,
    pub compatible: Option<bool>,
    pub updates_available: Option<bool>,
    /// Some compatible version of the line is a pre-release.
    pub has_prereleases: bool,
    /// Pre-releases are offered. Turns on by itself once a pre-release is
    /// installed.
    pub include_prereleases: bool,
    pub busy: bool,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            available_versions: Vec::new(),
            installed_version: AppVersion::NotInstalled,
            detached: None,
            compatible: None,
            updates_available: None,
            has_prereleases: false,
            include_prereleases: false,
            busy: false,
        }
    }
}

/// A field of [`AppState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateField {
    AvailableVersions,
    InstalledVersion,
    Detached,
    Compatible,
    UpdatesAvailable,
    HasPrereleases,
    IncludePrereleases,
    Busy,
}

impl AppState {
    /// Fields whose values differ between `self` and `other`.
    pub fn diff(&self, other: &AppState) -> Vec<StateField> {
        let mut fields = Vec::new();
        if self.available_versions != other.available_versions {
            fields.push(StateField::AvailableVersions);
        }
        if self.installed_version != other.installed_version {
            fields.push(StateField::InstalledVersion);
        }
        if self.detached != other.detached {
            fields.push(StateField::Detached);
        }
        if self.compatible != other.compatible {
            fields.push(StateField::Compatible);
        }
        if self.updates_available != other.updates_available {
            fields.push(StateField::UpdatesAvailable);
        }
        if self.has_prereleases != other.has_prereleases {
            fields.push(StateField::HasPrereleases);
        }
        if self.include_prereleases != other.include_prereleases {
            fields.push(StateField::IncludePrereleases);
        }
        if self.busy != other.busy {
            fields.push(StateField::Busy);
        }
        fields
    }
}

/// One batched state transition, delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub old: AppState,
    pub new: AppState,
    pub fields: Vec<StateField>,
}

/// What the filesystem and the local clone say right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalAppState {
    pub is_installed: bool,
    pub has_git_repo: bool,
    pub current_revision: AppVersion,
    pub dirty: bool,
    pub tracked_remote_ref: Option<FullRef>,
}

/// Tunables shared by every app of a manager.
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Release line for registry URLs without a fragment.
    pub default_branch: String,
    /// Minimum spacing between two accepted `refresh()` calls.
    pub refresh_interval: Duration,
    /// Ask `origin` directly when the registry does not know the line's tip.
    pub live_remote_check: bool,
    /// Offer pre-release tags from the start.
    pub include_prereleases: bool,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            default_branch: DEFAULT_GIT_BRANCH.to_string(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            live_remote_check: false,
            include_prereleases: false,
        }
    }
}

// ============================================================================
// App
// ============================================================================

struct AppInner {
    id: String,
    path: PathBuf,
    entry: Option<RegistryEntry>,
    compat: CompatibilityMap,
    packages: Arc<dyn PackageSource>,
    options: AppOptions,
    state: Mutex<AppState>,
    busy: AtomicBool,
    include_prereleases: AtomicBool,
    throttle: Throttle,
    /// Serializes publishers so changes are delivered in order.
    publish_lock: Mutex<()>,
    subscribers: Mutex<Vec<Sender<StateChange>>>,
}

/// An app installed (or installable) at a fixed path. Cheap to clone; clones
/// share state.
#[derive(Clone)]
pub struct App {
    inner: Arc<AppInner>,
}

/// Holds the busy flag until [`finish`](BusyGuard::finish) publishes the
/// recomputed state with `busy = false`.
struct BusyGuard<'a> {
    app: &'a App,
    finished: bool,
}

impl BusyGuard<'_> {
    /// Recompute and clear the busy flag in one batch.
    fn finish(mut self) -> AppState {
        self.finished = true;
        let app = self.app;
        let _publishing = app.inner.publish_lock.lock();
        let mut next = app.compute_state();
        next.busy = false;
        app.inner.busy.store(false, Ordering::SeqCst);
        app.publish(next)
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.app.inner.busy.store(false, Ordering::SeqCst);
            self.app.publish_busy(false);
        }
    }
}

impl App {
    pub fn new(
        id: impl Into<String>,
        path: impl Into<PathBuf>,
        entry: Option<RegistryEntry>,
        packages: Arc<dyn PackageSource>,
        options: AppOptions,
    ) -> Self {
        let compat = entry
            .as_ref()
            .map(RegistryEntry::compatibility)
            .unwrap_or_default();
        let throttle = Throttle::new(options.refresh_interval);
        let include_prereleases = options.include_prereleases;
        Self {
            inner: Arc::new(AppInner {
                id: id.into(),
                path: path.into(),
                entry,
                compat,
                packages,
                options,
                state: Mutex::new(AppState::default()),
                busy: AtomicBool::new(false),
                include_prereleases: AtomicBool::new(include_prereleases),
                throttle,
                publish_lock: Mutex::new(()),
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn entry(&self) -> Option<&RegistryEntry> {
        self.inner.entry.as_ref()
    }

    /// Last published snapshot.
    pub fn state(&self) -> AppState {
        self.inner.state.lock().clone()
    }

    pub fn is_busy(&self) -> bool {
        self.inner.busy.load(Ordering::SeqCst)
    }

    pub fn is_installed(&self) -> bool {
        self.inner.path.exists()
    }

    /// Release line declared by the registry entry.
    pub fn release_line(&self) -> Option<String> {
        self.entry()
            .map(|e| e.release_line(&self.inner.options.default_branch))
    }

    fn repo(&self) -> Option<GitRepo> {
        if !GitRepo::is_repo(&self.inner.path) {
            return None;
        }
        GitRepo::open(&self.inner.path).ok()
    }

    /// Receive one [`StateChange`] per recompute that changed something.
    pub fn subscribe(&self) -> Receiver<StateChange> {
        let (tx, rx) = unbounded();
        self.inner.subscribers.lock().push(tx);
        rx
    }

    // ------------------------------------------------------------------------
    // Derived traits
    // ------------------------------------------------------------------------

    /// Installed version: the named version at HEAD, `Unknown` when the tree
    /// is modified or HEAD is off the release line.
    pub fn installed_version(&self) -> AppVersion {
        if !self.is_installed() {
            return AppVersion::NotInstalled;
        }
        let (Some(repo), Some(line)) = (self.repo(), self.release_line()) else {
            return AppVersion::Unknown;
        };
        installed_version_in(&repo, &line).unwrap_or_else(|e| {
            tracing::debug!("Cannot determine installed version of '{}': {}", self.id(), e);
            AppVersion::Unknown
        })
    }

    /// `Some(true)` if the installation is modified or off its release line.
    /// Indeterminate without a clone or a registry entry.
    pub fn detached(&self) -> Option<bool> {
        self.detached_for(&self.installed_version())
    }

    fn detached_for(&self, installed: &AppVersion) -> Option<bool> {
        if self.entry().is_none() || self.repo().is_none() {
            return None;
        }
        Some(*installed == AppVersion::Unknown)
    }

    /// Versions that can be installed, newest first, minus known-incompatible
    /// ones and, unless admitted, pre-releases.
    pub fn available_versions(&self) -> Vec<AppVersion> {
        let admit = self.admits_prereleases(&self.installed_version());
        offered(self.compatible_versions(), admit)
    }

    /// True if some compatible version of the line is a pre-release.
    pub fn has_prereleases(&self) -> bool {
        self.compatible_versions().iter().any(AppVersion::is_prerelease)
    }

    pub fn include_prereleases(&self) -> bool {
        self.inner.include_prereleases.load(Ordering::SeqCst)
    }

    /// Offer or hide pre-releases, then recompute.
    pub fn set_include_prereleases(&self, include: bool) -> AppState {
        self.inner.include_prereleases.store(include, Ordering::SeqCst);
        self.recompute()
    }

    fn admits_prereleases(&self, installed: &AppVersion) -> bool {
        self.include_prereleases() || installed.is_prerelease()
    }

    /// The name the release line uses for `version`; a local branch named
    /// after the line becomes the line's branch version.
    pub fn normalize_version(&self, version: AppVersion) -> AppVersion {
        let Some(line_name) = self.release_line() else {
            return version;
        };
        let is_line_branch =
            matches!(&version, AppVersion::Ref(FullRef::Head(name)) if *name == line_name);
        if !is_line_branch {
            return version;
        }
        match self.repo() {
            Some(repo) => ReleaseLine::new(&repo, &line_name)
                .and_then(|line| line.canonical(Revision::Ref(FullRef::Head(line_name.clone()))))
                .map(AppVersion::from)
                .unwrap_or(version),
            None => match self.entry().and_then(|e| e.remote_branch_tip(&line_name)) {
                Some(_) => AppVersion::Ref(FullRef::remote(DEFAULT_REMOTE, &line_name)),
                None => version,
            },
        }
    }

    /// Line versions minus known-incompatible ones, pre-releases included.
    fn compatible_versions(&self) -> Vec<AppVersion> {
        let Some(entry) = self.entry() else {
            return Vec::new();
        };
        let line = entry.release_line(&self.inner.options.default_branch);
        let candidates = match self.repo() {
            Some(repo) => match ReleaseLine::new(&repo, &line).and_then(|l| l.find_versions()) {
                Ok(revisions) => revisions.into_iter().map(AppVersion::from).collect(),
                Err(e) => {
                    tracing::warn!("Cannot list versions of '{}': {}", self.id(), e);
                    Vec::new()
                }
            },
            None => registry_versions(entry, &line),
        };
        let packages = self.installed_packages();
        candidates
            .into_iter()
            .filter(|v| match &packages {
                Some(packages) => self.inner.compat.is_compatible(v, packages) != Some(false),
                None => true,
            })
            .collect()
    }

    fn installed_packages(&self) -> Option<Arc<Vec<Package>>> {
        self.inner
            .packages
            .installed_packages()
            .map_err(|e| tracing::warn!("{}", e))
            .ok()
    }

    /// Whether `version` can run in the current environment.
    pub fn is_compatible(&self, version: &AppVersion) -> Option<bool> {
        self.entry()?;
        let packages = self.installed_packages()?;
        self.inner.compat.is_compatible(version, &packages)
    }

    /// Requirements of `version` not met by the installed packages.
    pub fn missing_requirements(&self, version: &AppVersion) -> Vec<String> {
        match self.installed_packages() {
            Some(packages) => self.inner.compat.missing_requirements(version, &packages),
            None => Vec::new(),
        }
    }

    /// True if `origin` has commits on the release line that the local
    /// tracking ref does not.
    ///
    /// The registry's last-seen tip is used; with `live_remote_check` enabled
    /// a missing tip is asked from `origin` directly.
    pub fn remote_update_available(&self) -> Result<bool, AppError> {
        let entry = self.entry().ok_or_else(|| AppError::NotRegistered {
            app: self.id().to_string(),
        })?;
        let repo = self.repo().ok_or_else(|| AppError::NotInstalled {
            app: self.id().to_string(),
        })?;
        let line_name = entry.release_line(&self.inner.options.default_branch);
        let line = ReleaseLine::new(&repo, &line_name)?;
        if !line.is_branch()? {
            return Ok(false);
        }

        let remote_tip = match entry.remote_branch_tip(&line_name) {
            Some(sha) => sha.to_lowercase(),
            None if self.inner.options.live_remote_check => {
                let head = format!("refs/heads/{}", line_name);
                repo.ls_remote_origin(&head)?
                    .remove(&head)
                    .ok_or_else(|| AppError::RemoteStatusUnavailable(head.clone()))?
            }
            None => {
                return Err(AppError::RemoteStatusUnavailable(format!(
                    "registry has no tip for `{}`",
                    line_name
                )))
            }
        };

        let tracking = FullRef::remote(DEFAULT_REMOTE, &line_name).path();
        let Some(local) = repo.peel(&tracking)? else {
            return Ok(false);
        };
        if local.as_str() == remote_tip {
            return Ok(false);
        }
        if repo.contains_commit(&remote_tip)? && repo.is_ancestor(&remote_tip, local.as_str())? {
            return Ok(false);
        }
        Ok(true)
    }

    /// Update status, `None` when detached or when the remote cannot be read.
    pub fn check_for_updates(&self) -> Option<bool> {
        let installed = self.installed_version();
        let available = offered(self.compatible_versions(), self.admits_prereleases(&installed));
        self.updates_for(&installed, &available, self.detached_for(&installed))
    }

    fn updates_for(
        &self,
        installed: &AppVersion,
        available: &[AppVersion],
        detached: Option<bool>,
    ) -> Option<bool> {
        if detached != Some(false) {
            return None;
        }
        match self.remote_update_available() {
            Ok(true) => Some(true),
            Ok(false) => Some(available.first().is_some_and(|latest| latest != installed)),
            Err(e) => {
                tracing::debug!("Update status of '{}' unknown: {}", self.id(), e);
                None
            }
        }
    }

    /// Snapshot of the local clone.
    pub fn local_state(&self) -> LocalAppState {
        let repo = self.repo();
        LocalAppState {
            is_installed: self.is_installed(),
            has_git_repo: repo.is_some(),
            current_revision: self.installed_version(),
            dirty: repo.as_ref().is_some_and(|r| r.dirty().unwrap_or(false)),
            tracked_remote_ref: repo.and_then(|r| r.get_tracked_branch(None).ok().flatten()),
        }
    }

    // ------------------------------------------------------------------------
    // Recompute and publish
    // ------------------------------------------------------------------------

    fn compute_state(&self) -> AppState {
        let installed_version = self.installed_version();
        if installed_version.is_prerelease() {
            self.inner.include_prereleases.store(true, Ordering::SeqCst);
        }
        let include_prereleases = self.include_prereleases();
        let detached = self.detached_for(&installed_version);
        let candidates = self.compatible_versions();
        let has_prereleases = candidates.iter().any(AppVersion::is_prerelease);
        let available_versions = offered(candidates, include_prereleases);
        let compatible = self.is_compatible(&installed_version);
        let updates_available = self.updates_for(&installed_version, &available_versions, detached);
        AppState {
            available_versions,
            installed_version,
            detached,
            compatible,
            updates_available,
            has_prereleases,
            include_prereleases,
            busy: self.is_busy(),
        }
    }

    /// Recompute every trait and publish the result. Not throttled.
    pub fn recompute(&self) -> AppState {
        let _publishing = self.inner.publish_lock.lock();
        let next = self.compute_state();
        self.publish(next)
    }

    /// Throttled [`recompute`](Self::recompute).
    ///
    /// Returns `None` when the call was dropped: inside the throttle window,
    /// or while a mutating operation is running (it recomputes on completion).
    pub fn refresh(&self) -> Option<AppState> {
        if self.is_busy() {
            tracing::debug!("Skipping refresh of busy app '{}'", self.id());
            return None;
        }
        if !self.inner.throttle.try_acquire() {
            return None;
        }
        Some(self.recompute())
    }

    /// [`refresh`](Self::refresh) on a worker thread.
    pub fn refresh_async(&self) -> JoinHandle<Option<AppState>> {
        let app = self.clone();
        thread::spawn(move || app.refresh())
    }

    fn publish_busy(&self, busy: bool) {
        let _publishing = self.inner.publish_lock.lock();
        let mut next = self.state();
        next.busy = busy;
        self.publish(next);
    }

    /// Swap in `next` and notify subscribers if anything changed.
    fn publish(&self, next: AppState) -> AppState {
        let change = {
            let mut state = self.inner.state.lock();
            let fields = state.diff(&next);
            if fields.is_empty() {
                return next;
            }
            let old = std::mem::replace(&mut *state, next.clone());
            StateChange {
                old,
                new: next.clone(),
                fields,
            }
        };
        tracing::debug!("App '{}' changed: {:?}", self.id(), change.fields);
        self.inner
            .subscribers
            .lock()
            .retain(|tx| tx.send(change.clone()).is_ok());
        next
    }

    // ------------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------------

    fn begin_operation(&self) -> Result<BusyGuard<'_>, AppError> {
        if self
            .inner
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(AppError::Busy {
                app: self.id().to_string(),
            });
        }
        self.publish_busy(true);
        Ok(BusyGuard {
            app: self,
            finished: false,
        })
    }

    /// Run `op` under the busy flag, then recompute regardless of outcome.
    /// The recomputed state and `busy = false` arrive as one change.
    fn run_operation<F>(&self, op: F) -> Result<AppState, AppError>
    where
        F: FnOnce(&Self) -> Result<(), AppError>,
    {
        let guard = self.begin_operation()?;
        let result = op(self);
        self.inner.packages.invalidate();
        let state = guard.finish();
        result.map(|()| state)
    }

    /// Install `version`, or the latest version of the release line.
    ///
    /// Clones the app first if its directory does not exist yet. A failed
    /// install of an app that was not installed removes the fresh clone.
    pub fn install(&self, version: Option<AppVersion>) -> Result<AppState, AppError> {
        self.run_operation(|app| {
            let fresh = !app.inner.path.exists();
            let result = app.install_locked(version);
            if result.is_err() && fresh && app.inner.path.exists() {
                tracing::warn!("Removing partially installed app '{}'", app.id());
                if let Err(e) = fs::remove_dir_all(&app.inner.path) {
                    tracing::error!("Rollback of '{}' failed: {}", app.id(), e);
                }
            }
            result
        })
    }

    fn install_locked(&self, version: Option<AppVersion>) -> Result<(), AppError> {
        let entry = self.entry().ok_or_else(|| AppError::NotRegistered {
            app: self.id().to_string(),
        })?;
        let admit = self.admits_prereleases(&self.installed_version());
        let path = &self.inner.path;
        let repo = if path.exists() {
            if !GitRepo::is_repo(path) {
                return Err(AppError::PathOccupied { path: path.clone() });
            }
            GitRepo::open(path)?
        } else {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            tracing::debug!("Cloning {} into {}", entry.clone_url(), path.display());
            GitRepo::clone_from(entry.clone_url(), path)?
        };

        let line_name = entry.release_line(&self.inner.options.default_branch);
        let line = ReleaseLine::new(&repo, &line_name)?;
        let target = match version {
            Some(v) => line.canonical(
                v.revision()
                    .ok_or_else(|| AppError::InvalidVersion(v.to_string()))?,
            )?,
            None => self.latest_revision(&line, admit)?,
        };
        self.checkout_revision(&repo, &line, &line_name, &target)
    }

    /// First version of the line, skipping pre-releases unless `admit`.
    fn latest_revision(&self, line: &ReleaseLine<'_>, admit: bool) -> Result<Revision, AppError> {
        line.find_versions()?
            .into_iter()
            .find(|rev| admit || !AppVersion::from(rev.clone()).is_prerelease())
            .ok_or_else(|| AppError::NoVersionsAvailable {
                app: self.id().to_string(),
            })
    }

    /// Reset the line's branch onto `target` when the branch contains it,
    /// otherwise check `target` out detached.
    fn checkout_revision(
        &self,
        repo: &GitRepo,
        line: &ReleaseLine<'_>,
        line_name: &str,
        target: &Revision,
    ) -> Result<(), AppError> {
        let commit = line.resolve_commit(target)?;
        let tracking = FullRef::remote(DEFAULT_REMOTE, line_name).path();
        if line.is_branch()? && repo.is_ancestor(commit.as_str(), &tracking)? {
            repo.checkout_branch(line_name, &tracking)?;
            repo.reset_hard(commit.as_str())?;
        } else {
            repo.checkout_detached(commit.as_str())?;
        }
        tracing::debug!("Checked out {} ({}) for '{}'", target, commit.short(), self.id());
        Ok(())
    }

    /// Fetch when the remote moved on, then install the line's latest version.
    pub fn update(&self) -> Result<AppState, AppError> {
        self.run_operation(|app| {
            let entry = app.entry().ok_or_else(|| AppError::NotRegistered {
                app: app.id().to_string(),
            })?;
            let repo = app.repo().ok_or_else(|| AppError::NotInstalled {
                app: app.id().to_string(),
            })?;
            let admit = app.admits_prereleases(&app.installed_version());
            let remote = app.remote_update_available().unwrap_or_else(|e| {
                tracing::warn!("Unable to determine remote status of '{}': {}", app.id(), e);
                false
            });
            if remote {
                repo.fetch()?;
            }
            let line_name = entry.release_line(&app.inner.options.default_branch);
            let line = ReleaseLine::new(&repo, &line_name)?;
            let latest = app.latest_revision(&line, admit)?;
            app.checkout_revision(&repo, &line, &line_name, &latest)
        })
    }

    /// Remove the app directory.
    pub fn uninstall(&self) -> Result<AppState, AppError> {
        self.run_operation(|app| {
            let path = &app.inner.path;
            if !path.exists() {
                return Err(AppError::AlreadyUninstalled {
                    app: app.id().to_string(),
                });
            }
            tracing::debug!("Removing {}", path.display());
            fs::remove_dir_all(path)?;
            Ok(())
        })
    }
}

/// `versions` without pre-releases unless `admit`.
fn offered(versions: Vec<AppVersion>, admit: bool) -> Vec<AppVersion> {
    if admit {
        return versions;
    }
    versions.into_iter().filter(|v| !v.is_prerelease()).collect()
}

fn installed_version_in(repo: &GitRepo, line: &str) -> Result<AppVersion, AppError> {
    if repo.dirty()? {
        return Ok(AppVersion::Unknown);
    }
    Ok(ReleaseLine::new(repo, line)?
        .current_revision()?
        .map(AppVersion::from)
        .unwrap_or(AppVersion::Unknown))
}

/// Versions of a not-yet-cloned app, from the registry's ref snapshot.
///
/// Mirrors the release-line order: the tip (or the tags at the tip) first,
/// then the remaining tags by semantic version.
fn registry_versions(entry: &RegistryEntry, line: &str) -> Vec<AppVersion> {
    let mut tags: BTreeMap<String, String> = BTreeMap::new();
    for (name, sha) in &entry.gitinfo {
        let Some(tag) = name.strip_prefix("refs/tags/") else {
            continue;
        };
        match tag.strip_suffix("^{}") {
            Some(peeled) => {
                tags.insert(peeled.to_string(), sha.to_lowercase());
            }
            None => {
                tags.entry(tag.to_string()).or_insert_with(|| sha.to_lowercase());
            }
        }
    }

    let mut versions = Vec::new();
    let mut at_tip: Vec<String> = Vec::new();
    if let Some(tip) = entry.remote_branch_tip(line) {
        let tip = tip.to_lowercase();
        at_tip = tags
            .iter()
            .filter(|(_, sha)| **sha == tip)
            .map(|(name, _)| name.clone())
            .collect();
        if at_tip.is_empty() {
            versions.push(AppVersion::Ref(FullRef::remote(DEFAULT_REMOTE, line)));
        }
    } else if tags.contains_key(line) {
        return vec![AppVersion::Ref(FullRef::Tag(line.to_string()))];
    } else if let Ok(commit) = CommitId::parse(line) {
        return vec![AppVersion::Commit(commit)];
    }
    sort_semantic(&mut at_tip);

    let mut rest: Vec<String> = tags
        .into_keys()
        .filter(|name| !at_tip.contains(name))
        .collect();
    sort_semantic(&mut rest);
    versions.extend(
        at_tip
            .into_iter()
            .chain(rest)
            .map(|name| AppVersion::Ref(FullRef::Tag(name))),
    );
    versions
}
