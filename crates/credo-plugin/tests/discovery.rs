//! Discovery and startup tests with scripted plugin binaries.

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::Duration;

use credo_plugin::wire::StartupConfig;
use credo_plugin::{PluginProcess, TransportKind, discover};

fn write_executable(path: &Path, script: &str) {
    std::fs::write(path, script).unwrap();
    let mut permissions = std::fs::metadata(path).unwrap().permissions();
    permissions.set_mode(0o755);
    std::fs::set_permissions(path, permissions).unwrap();
}

const CAPABILITIES_SCRIPT: &str = r#"#!/bin/sh
if [ "$1" = "capabilities" ]; then
  echo '{"types":{"repository":[{"type":"*"}]},"configTypes":["store.config/v1"]}'
fi
"#;

#[tokio::test]
async fn discovery_probes_extensionless_regular_files() {
    let dir = tempfile::tempdir().unwrap();
    write_executable(&dir.path().join("mock-store"), CAPABILITIES_SCRIPT);

    // Files with extensions are not candidates.
    std::fs::write(dir.path().join("README.md"), "docs").unwrap();
    // Candidates that fail to probe are skipped, not fatal.
    std::fs::write(dir.path().join("broken"), "not a binary").unwrap();

    let plugins = discover(dir.path()).await.unwrap();
    assert_eq!(plugins.len(), 1);
    assert_eq!(plugins[0].id, "mock-store");

    let repository = &plugins[0].capabilities.types["repository"];
    assert_eq!(repository[0].kind, "*");
    assert_eq!(plugins[0].capabilities.config_types, ["store.config/v1"]);
}

#[tokio::test]
async fn discovery_recurses_into_subdirectories() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("store");
    std::fs::create_dir(&nested).unwrap();
    write_executable(&nested.join("vault"), CAPABILITIES_SCRIPT);

    let plugins = discover(dir.path()).await.unwrap();
    assert_eq!(plugins.len(), 1);
    assert_eq!(plugins[0].id, "vault");
}

#[tokio::test]
async fn startup_rejects_malformed_endpoint_announcements() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chatty");
    write_executable(
        &path,
        r#"#!/bin/sh
if [ "$1" = "capabilities" ]; then
  echo '{"types":{},"configTypes":[]}'
else
  echo 'hello there'
  sleep 30
fi
"#,
    );

    let plugins = discover(dir.path()).await.unwrap();
    assert_eq!(plugins.len(), 1);

    let startup = StartupConfig {
        id: plugins[0].id.clone(),
        transport: TransportKind::Tcp,
        idle_timeout_secs: 60,
        config_types: Vec::new(),
    };
    let err = PluginProcess::start(&plugins[0], &startup, Duration::from_secs(5))
        .await
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("malformed endpoint announcement"), "{message}");
}

#[tokio::test]
async fn startup_fails_when_the_plugin_never_becomes_healthy() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("deaf");
    write_executable(
        &path,
        r#"#!/bin/sh
if [ "$1" = "capabilities" ]; then
  echo '{"types":{},"configTypes":[]}'
else
  echo 'tcp://127.0.0.1:9'
  sleep 30
fi
"#,
    );

    let plugins = discover(dir.path()).await.unwrap();
    let startup = StartupConfig {
        id: plugins[0].id.clone(),
        transport: TransportKind::Tcp,
        idle_timeout_secs: 60,
        config_types: Vec::new(),
    };
    // Port 9 (discard) never answers; the health poll must give up.
    let err = PluginProcess::start(&plugins[0], &startup, Duration::from_millis(500))
        .await
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("never became healthy"), "{message}");
}
