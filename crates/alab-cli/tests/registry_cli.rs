//! Integration tests for `alab releases` and `alab registry build`.

mod common;

use predicates::prelude::*;
use std::fs;

use common::{git, TestEnv};

#[test]
fn test_releases_from_local_source() {
    let env = TestEnv::new();
    let url = format!("git+file://{}@master:", env.upstream.display());
    let releases = env.json(&["releases", &url, "--json"]);
    let releases = releases.as_array().unwrap();

    let versions: Vec<&str> = releases
        .iter()
        .map(|r| r["version"].as_str().unwrap())
        .collect();
    assert_eq!(versions.len(), 2);
    assert!(versions.contains(&"v1.0.0"));
    assert!(versions.contains(&"test-tag"));

    let v1 = releases.iter().find(|r| r["version"] == "v1.0.0").unwrap();
    let head = git(&env.upstream, &["rev-parse", "HEAD"]);
    assert!(v1["url"].as_str().unwrap().ends_with(&format!("@{}", head)));
    assert_eq!(v1["metadata"]["title"], "Hello world");
    assert_eq!(
        v1["environment"]["python_requirements"],
        serde_json::json!(["aiida-core>=2"])
    );
}

#[test]
fn test_releases_single_revision_table() {
    let env = TestEnv::new();
    let url = format!("git+file://{}@test-tag", env.upstream.display());
    env.cmd()
        .args(["releases", &url])
        .assert()
        .success()
        .stdout(predicate::str::contains("VERSION"))
        .stdout(predicate::str::contains("test-tag"));
}

#[test]
fn test_releases_rejects_unsupported_scheme() {
    let env = TestEnv::new();
    env.cmd()
        .args(["releases", "svn://example.com/app@trunk"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unsupported URL scheme"));
}

#[test]
fn test_releases_from_directory() {
    let env = TestEnv::new();
    let path = env.upstream.display().to_string();
    let releases = env.json(&["releases", &path, "--version", "1.0", "--json"]);
    let releases = releases.as_array().unwrap();
    assert_eq!(releases.len(), 1);
    assert_eq!(releases[0]["version"], "1.0");
    assert_eq!(releases[0]["url"], path.as_str());
    assert_eq!(releases[0]["metadata"]["title"], "Hello world");

    env.cmd()
        .args(["releases", &path])
        .assert()
        .failure()
        .stderr(predicate::str::contains("need an explicit `version`"));
}

#[test]
fn test_registry_build_writes_catalog() {
    let env = TestEnv::new();
    let data = env.tmp.path().join("apps.yaml");
    fs::write(
        &data,
        format!(
            "apps:\n  hello-world:\n    releases:\n      - \"git+file://{}@master:\"\n    categories: [demo]\ncategories:\n  demo:\n    title: Demo\n",
            env.upstream.display()
        ),
    )
    .unwrap();
    let out = env.tmp.path().join("build");

    env.cmd()
        .args(["registry", "build", "--data"])
        .arg(&data)
        .arg("--out")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("[ok] Wrote"));

    let index: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.join("apps_index.json")).unwrap()).unwrap();
    assert_eq!(index["apps"]["hello-world"]["categories"], serde_json::json!(["demo"]));
    assert_eq!(index["categories"]["demo"]["title"], "Demo");

    let app: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.join("apps").join("hello-world.json")).unwrap())
            .unwrap();
    assert_eq!(app["releases"][0]["version"], "v1.0.0");
    assert!(out.join("apps_meta.json").exists());
}
