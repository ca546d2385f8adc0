//! # alab-core
//!
//! Core library for managing git-hosted notebook apps.
//!
//! ## Overview
//!
//! An app is a git repository listed in a registry. This crate maps the
//! repository's branches, tags and commits onto an ordered set of versions,
//! works out which version is installed locally and whether it can run
//! against the installed Python packages, and drives install, update and
//! uninstall through git checkouts.
//!
//! - [`version`]: `git:`-prefixed version identifiers
//! - [`release_line`]: versions offered by a branch, tag or commit line
//! - [`git`]: the local clone (status, tracking, checkout)
//! - [`compat`]: per-version requirement maps against installed packages
//! - [`app`]: the app state machine and its change notifications
//! - [`watch`]: background refresh on filesystem changes
//! - [`registry`]: the registry document, its client, and the catalog builder
//! - [`manager`]: wiring for front ends

pub mod app;
pub mod cache;
pub mod compat;
pub mod config;
pub mod constants;
pub mod errors;
pub mod git;
pub mod manager;
pub mod packages;
pub mod pep440;
pub mod registry;
pub mod release_line;
pub mod specifier;
pub mod throttle;
pub mod version;
pub mod watch;

pub use app::{App, AppOptions, AppState, LocalAppState, StateChange, StateField};
pub use config::AppsConfig;
pub use errors::AppError;
pub use git::{BranchTrackingStatus, GitRepo};
pub use manager::AppManager;
pub use registry::{Registry, RegistryClient, RegistryEntry};
pub use release_line::{ReleaseLine, ReleaseLineSpec};
pub use version::{AppVersion, CommitId, FullRef, Revision};
pub use watch::{AppWatch, WatchHandle};
