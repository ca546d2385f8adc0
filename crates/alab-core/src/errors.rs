//! Error types for alab-core.

use std::path::PathBuf;

use thiserror::Error;

/// Domain-specific errors for app management operations.
#[derive(Error, Debug)]
pub enum AppError {
    /// A configuration value is invalid.
    #[error("Invalid configuration: {message}. {hint}")]
    InvalidConfiguration {
        /// Description of the invalid configuration.
        message: String,
        /// Actionable hint on how to fix it.
        hint: String,
    },

    /// The configuration file could not be read or parsed.
    #[error("Config invalid: {0}")]
    InvalidConfig(String),

    /// A release-line specification could not be parsed.
    #[error("Invalid release line `{0}`.")]
    InvalidReleaseLine(String),

    /// A short name matched neither a branch nor a tag.
    #[error("No such branch or tag: `{0}`.")]
    UnresolvableRef(String),

    /// The release line is pinned to a commit that is missing from the local object store.
    #[error("Release line commit `{0}` not found in repository.")]
    ReleaseLineCommitNotFound(String),

    /// A version string does not follow the `git:<ref-or-commit>` format.
    #[error("Invalid version string `{0}`.")]
    InvalidVersion(String),

    /// A PEP 440 version could not be parsed.
    #[error("Invalid package version `{0}`.")]
    InvalidPackageVersion(String),

    /// A version specifier could not be parsed.
    #[error("Invalid specifier `{0}`.")]
    InvalidSpecifier(String),

    /// A requirement string could not be parsed.
    #[error("Invalid requirement `{0}`.")]
    InvalidRequirement(String),

    /// The path is not a git working tree.
    #[error("Not a git repository: {}", .0.display())]
    NotGitRepository(PathBuf),

    /// HEAD does not point at a named branch.
    #[error("HEAD is detached in {}", .0.display())]
    DetachedHead(PathBuf),

    /// A git subprocess exited with a non-zero status.
    #[error("`{command}` failed: {stderr}")]
    GitCommand {
        /// The command line that was run.
        command: String,
        /// Captured diagnostic output.
        stderr: String,
    },

    /// Another mutating operation is in progress for this app.
    #[error("App `{app}` is busy with another operation.")]
    Busy {
        /// App identifier.
        app: String,
    },

    /// The app directory is already gone.
    #[error("App `{app}` is already uninstalled.")]
    AlreadyUninstalled {
        /// App identifier.
        app: String,
    },

    /// The install path exists but does not hold a git clone.
    #[error("Install path {} is occupied by something that is not a git repository.", .path.display())]
    PathOccupied {
        /// The occupied path.
        path: PathBuf,
    },

    /// The installation is modified or off its release line.
    #[error("App `{app}` is detached from its release line (local changes or foreign commit). Use --force to proceed.")]
    Detached {
        /// App identifier.
        app: String,
    },

    /// The app is not installed.
    #[error("App `{app}` is not installed.")]
    NotInstalled {
        /// App identifier.
        app: String,
    },

    /// The app has no registry entry.
    #[error("App `{app}` is not registered.")]
    NotRegistered {
        /// App identifier.
        app: String,
    },

    /// No version of the app could be selected for installation.
    #[error("No compatible version available for app `{app}`.")]
    NoVersionsAvailable {
        /// App identifier.
        app: String,
    },

    /// The state of the remote could not be determined.
    #[error("Remote status unavailable: {0}")]
    RemoteStatusUnavailable(String),

    /// The app registry could not be fetched or parsed.
    #[error("Registry unavailable at {url}: {reason}")]
    RegistryUnavailable {
        /// Registry location.
        url: String,
        /// Underlying failure.
        reason: String,
    },

    /// A URL uses a scheme this tool cannot handle.
    #[error("Unsupported URL scheme in `{0}`.")]
    UnsupportedScheme(String),

    /// A release archive could not be downloaded or unpacked.
    #[error("Failed to extract archive from `{location}`: {reason}")]
    Archive {
        /// Path or URL of the archive.
        location: String,
        /// Underlying failure.
        reason: String,
    },

    /// A release that is not a git repository names no version.
    #[error("Release `{0}` has no version; releases outside git need an explicit `version`.")]
    MissingReleaseVersion(String),

    /// Listing installed packages failed.
    #[error("Failed to list installed packages: {0}")]
    PackageListing(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization/deserialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Generic error wrapper for anyhow errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// True for the "already in this state" conditions that callers may
    /// want to report differently from genuine failures.
    pub fn is_state_conflict(&self) -> bool {
        matches!(
            self,
            AppError::AlreadyUninstalled { .. }
                | AppError::PathOccupied { .. }
                | AppError::Busy { .. }
                | AppError::Detached { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_conflicts_are_distinguishable() {
        let err = AppError::AlreadyUninstalled {
            app: "hello".to_string(),
        };
        assert!(err.is_state_conflict());
        assert_eq!(err.to_string(), "App `hello` is already uninstalled.");

        let err = AppError::GitCommand {
            command: "git fetch".to_string(),
            stderr: "fatal: unable to access".to_string(),
        };
        assert!(!err.is_state_conflict());
        assert!(err.to_string().contains("fatal: unable to access"));
    }
}
