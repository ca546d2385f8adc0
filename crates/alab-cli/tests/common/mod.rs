//! Shared test utilities for alab-cli integration tests.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command as StdCommand;

use assert_cmd::Command;
use serde_json::json;
use tempfile::TempDir;

/// Environment variables that would override the test config.
const ALAB_ENV: &[&str] = &[
    "ALAB_CONFIG",
    "ALAB_VERBOSE",
    "ALAB_QUIET",
    "ALAB_COLOR",
    "ALAB_HOME",
    "ALAB_APPS",
    "ALAB_REGISTRY",
    "ALAB_DEFAULT_GIT_BRANCH",
    "ALAB_DEVELOP",
    "ALAB_PYTHON_BIN",
    "ALAB_LIVE_REMOTE_CHECK",
    "ALAB_INCLUDE_PRERELEASES",
];

/// Get a Command for the alab binary.
#[allow(deprecated)]
pub fn alab_cmd() -> Command {
    let mut cmd = Command::cargo_bin("alab").expect("alab binary should exist");
    for var in ALAB_ENV {
        cmd.env_remove(var);
    }
    cmd
}

/// Run git with a fixed identity, panicking on failure.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let out = StdCommand::new("git")
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

fn commit_file(dir: &Path, name: &str, content: &str, message: &str) {
    fs::write(dir.join(name), content).expect("write file");
    git(dir, &["add", name]);
    git(dir, &["commit", "--quiet", "-m", message]);
}

/// App repository on master: metadata (test-tag) -> app.py (v1.0.0, annotated).
pub fn build_upstream(dir: &Path) {
    fs::create_dir_all(dir).expect("create upstream dir");
    git(dir, &["init", "--quiet"]);
    git(dir, &["checkout", "--quiet", "-B", "master"]);
    commit_file(dir, "metadata.json", r#"{"title": "Hello world"}"#, "metadata");
    git(dir, &["tag", "test-tag"]);
    commit_file(dir, "requirements.txt", "aiida-core>=2\n", "requirements");
    commit_file(dir, "app.py", "print('hello')\n", "release");
    git(dir, &["tag", "-a", "v1.0.0", "-m", "1.0.0"]);
}

/// A temporary home with an app repository, a registry listing it and a
/// config file pointing at both.
pub struct TestEnv {
    pub tmp: TempDir,
    pub upstream: PathBuf,
    pub apps: PathBuf,
    pub registry: PathBuf,
    pub registry_url: String,
    pub config: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let tmp = TempDir::new().expect("create temp dir");
        let upstream = tmp.path().join("upstream");
        build_upstream(&upstream);

        let registry = tmp.path().join("apps_meta.json");
        let document = json!({
            "apps": {
                "hello-world": {
                    "git_url": format!("{}#master", upstream.display()),
                    "metainfo": {"title": "Hello world", "description": "Says hello"},
                    "categories": ["demo"]
                },
                "other-app": {
                    "git_url": "https://example.invalid/other-app.git",
                    "metainfo": {"title": "Other app"}
                }
            },
            "categories": {}
        });
        fs::write(&registry, document.to_string()).expect("write registry");

        let registry_url = format!("file://{}", registry.display());
        let apps = tmp.path().join("apps");
        let config = tmp.path().join("config.yaml");
        fs::write(
            &config,
            format!(
                "apps: \"{}\"\nregistry: \"{}\"\npythonBin: /nonexistent/python\n",
                apps.display(),
                registry_url
            ),
        )
        .expect("write config");

        Self {
            tmp,
            upstream,
            apps,
            registry,
            registry_url,
            config,
        }
    }

    /// `alab --config <config> --color never`
    pub fn cmd(&self) -> Command {
        let mut cmd = alab_cmd();
        cmd.arg("--config").arg(&self.config).args(["--color", "never"]);
        cmd
    }

    /// Run `args` and parse stdout as JSON.
    pub fn json(&self, args: &[&str]) -> serde_json::Value {
        let output = self.cmd().args(args).output().expect("run alab");
        assert!(
            output.status.success(),
            "alab {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).expect("stdout is JSON")
    }
}
