//! Synced file tree listing.

use std::fs;
use std::path::Path;

use kickstorm_core::models::RepoFile;
use kickstorm_core::paths;

use crate::store::WorkspaceError;

/// Walk the synced `repo/` directory and return a bounded, sorted list of
/// files with best-effort MIME types.
pub fn list_repo_files(repo_dir: &Path, limit: usize) -> Result<Vec<RepoFile>, WorkspaceError> {
    if !repo_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    walk(repo_dir, repo_dir, limit, &mut files)?;
    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

fn walk(
    root: &Path,
    dir: &Path,
    limit: usize,
    out: &mut Vec<RepoFile>,
) -> Result<(), WorkspaceError> {
    if out.len() >= limit {
        return Ok(());
    }
    let entries = fs::read_dir(dir).map_err(|e| WorkspaceError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;
    for entry in entries {
        if out.len() >= limit {
            return Ok(());
        }
        let entry = entry.map_err(|e| WorkspaceError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        if path.is_dir() {
            walk(root, &path, limit, out)?;
            continue;
        }
        if !path.is_file() {
            continue;
        }

        let Ok(rel) = path.strip_prefix(root) else {
            continue;
        };
        let joined = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        // Anything that slipped past sanitization on the way in is not
        // listed on the way out.
        let Ok(sanitized) = paths::sanitize(&joined) else {
            continue;
        };

        let size = entry
            .metadata()
            .map_err(|e| WorkspaceError::Io {
                path: path.clone(),
                source: e,
            })?
            .len();
        let mime = mime_guess::from_path(&path)
            .first()
            .map(|m| m.essence_str().to_string());

        out.push(RepoFile {
            path: sanitized,
            size,
            mime,
        });
    }
    Ok(())
}
