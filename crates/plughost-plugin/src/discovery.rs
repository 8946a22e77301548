//! Plugin discovery — scans the plugins root and resolves ids to directories.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::manifest::{MANIFEST_FILE, Manifest};

/// Scans `root` for plugin directories and returns their manifests.
///
/// Subdirectories are visited in name order so scans are deterministic.
/// Each directory containing a parseable manifest contributes one entry with
/// `folderName` assigned from the directory name. Duplicate ids keep the
/// first entry scanned and skip the rest with a warning; directories without
/// a manifest and unreadable manifests are skipped and logged.
pub fn scan(root: &Path) -> Vec<Manifest> {
    let mut manifests = Vec::new();
    let mut seen_ids: HashSet<String> = HashSet::new();

    info!(root = %root.display(), "Scanning for plugins");

    for dir in subdirectories(root) {
        let folder = match dir.file_name() {
            Some(name) => name.to_string_lossy().to_string(),
            None => continue,
        };

        let manifest_path = dir.join(MANIFEST_FILE);
        if !manifest_path.is_file() {
            debug!(folder = %folder, "Directory has no manifest.json, skipping");
            continue;
        }

        let mut manifest = match Manifest::from_file(&manifest_path) {
            Ok(m) => m,
            Err(e) => {
                warn!(folder = %folder, error = %e, "Failed to read manifest, skipping");
                continue;
            }
        };

        if !seen_ids.insert(manifest.id.clone()) {
            warn!(
                plugin_id = %manifest.id,
                folder = %folder,
                "Duplicate plugin id, skipping"
            );
            continue;
        }

        manifest.folder_name = Some(folder.clone());
        info!(
            plugin_id = %manifest.id,
            name = %manifest.display_name(),
            folder = %folder,
            "Recognized plugin"
        );
        manifests.push(manifest);
    }

    info!(count = manifests.len(), "Plugin scan finished");
    manifests
}

/// Resolves a plugin id to its directory.
///
/// First matches a manifest whose declared id equals `plugin_id` (full
/// scan); failing that, falls back to a directory literally named after the
/// id. Returns `None` when neither resolves.
pub fn resolve_dir(root: &Path, plugin_id: &str) -> Option<PathBuf> {
    for dir in subdirectories(root) {
        let manifest_path = dir.join(MANIFEST_FILE);
        if !manifest_path.is_file() {
            continue;
        }
        match Manifest::from_file(&manifest_path) {
            Ok(manifest) if manifest.id == plugin_id => return Some(dir),
            Ok(_) => {}
            Err(_) => continue,
        }
    }

    let direct = root.join(plugin_id);
    if direct.is_dir() { Some(direct) } else { None }
}

/// Folder names under the plugins root, for load-failure diagnostics.
pub fn list_folder_names(root: &Path) -> Vec<String> {
    subdirectories(root)
        .iter()
        .filter_map(|d| d.file_name().map(|n| n.to_string_lossy().to_string()))
        .collect()
}

/// Subdirectories of `root` in name order; an unreadable root yields none.
fn subdirectories(root: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(root = %root.display(), error = %e, "Cannot read plugins root");
            return Vec::new();
        }
    };
    let mut dirs: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();
    dirs
}
