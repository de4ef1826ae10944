//! Plugin binary discovery.
//!
//! Recursively walks a filesystem location; every regular file without an
//! extension is a candidate. Candidates are invoked with the
//! `capabilities` subcommand and must print a single JSON capabilities
//! document on stdout. Candidates that fail to probe are skipped with a
//! warning rather than aborting the walk.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::process::forward_stderr;
use crate::wire::{CAPABILITIES_SUBCOMMAND, Capabilities};

/// Tracing target for discovery.
const TRACING_TARGET: &str = "credo_plugin::discovery";

/// A plugin binary with its probed capabilities.
///
/// Probing happens once; repeated lookups reuse the cached document.
#[derive(Debug, Clone)]
pub struct DiscoveredPlugin {
    /// Plugin id, the binary's file name.
    pub id: String,
    /// Path of the binary.
    pub path: PathBuf,
    /// The capabilities the binary advertised.
    pub capabilities: Capabilities,
}

/// Walks a directory and probes every candidate plugin binary.
pub async fn discover(root: &Path) -> Result<Vec<DiscoveredPlugin>> {
    let mut plugins = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|err| Error::discovery(root, &err))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().is_some() {
            continue;
        }
        match probe(path).await {
            Ok(plugin) => {
                tracing::info!(
                    target: TRACING_TARGET,
                    id = %plugin.id,
                    path = %path.display(),
                    "discovered plugin"
                );
                plugins.push(plugin);
            }
            Err(err) => {
                tracing::warn!(
                    target: TRACING_TARGET,
                    path = %path.display(),
                    error = %err,
                    "skipping plugin candidate"
                );
            }
        }
    }
    Ok(plugins)
}

/// Invokes a candidate with the `capabilities` subcommand.
async fn probe(path: &Path) -> Result<DiscoveredPlugin> {
    let id = plugin_id(path);
    let mut child = Command::new(path)
        .arg(CAPABILITIES_SUBCOMMAND)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|err| Error::discovery(path, &err))?;

    if let Some(stderr) = child.stderr.take() {
        forward_stderr(id.clone(), stderr);
    }

    let mut document = String::new();
    if let Some(mut stdout) = child.stdout.take() {
        stdout
            .read_to_string(&mut document)
            .await
            .map_err(|err| Error::discovery(path, &err))?;
    }
    let status = child
        .wait()
        .await
        .map_err(|err| Error::discovery(path, &err))?;
    if !status.success() {
        return Err(Error::discovery(
            path,
            format!("capabilities probe exited with {status}"),
        ));
    }

    let capabilities: Capabilities = serde_json::from_str(document.trim())
        .map_err(|err| Error::discovery(path, format!("malformed capabilities: {err}")))?;
    Ok(DiscoveredPlugin {
        id,
        path: path.to_path_buf(),
        capabilities,
    })
}

/// Derives the plugin id from the binary's file name.
fn plugin_id(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
