//! Workspace path sanitization and filtering.
//!
//! Pure functions, no I/O. `sanitize` must run before every write into the
//! workspace and every read driven by a client-supplied path; `ensure_safe`
//! gates extraction and uploads; `ensure_syncable` additionally filters
//! ephemeral files before remote publication. Safe implies maybe-syncable;
//! not safe implies never synced.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("Relative path is required")]
    Empty,
    #[error("Relative path is not valid")]
    Invalid,
    #[error("Absolute paths are not allowed")]
    Absolute,
}

/// Exact basenames that are never accepted, regardless of directory.
const BLOCKED_FILES: &[&str] = &[
    ".env",
    ".env.local",
    ".env.production",
    ".env.development",
    ".env.test",
    "id_rsa",
    "id_ed25519",
    "id_dsa",
    "secrets.yml",
    "secrets.yaml",
    "secrets.json",
    "credentials.json",
];

/// Basename suffixes that indicate key material or certificates.
const BLOCKED_SUFFIXES: &[&str] = &[
    ".key", ".pem", ".pfx", ".p12", ".crt", ".der", ".keystore", ".jks",
];

/// Basename prefixes for key files and secret bundles.
const BLOCKED_PREFIXES: &[&str] = &["id_rsa", "id_ed25519", "secrets.", "credentials."];

/// Hidden files that are allowed despite the dotfile rule.
const ALLOWED_DOTFILES: &[&str] = &[".gitignore", ".dockerignore", ".editorconfig"];

/// Path segments naming build or VCS artifact directories.
const BLOCKED_SEGMENTS: &[&str] = &[
    "__pycache__",
    "node_modules",
    ".git",
    ".venv",
    "venv",
    "dist",
    "build",
    ".idea",
    ".vscode",
    ".mypy_cache",
    ".pytest_cache",
    ".ssh",
    ".aws",
    "instance",
    "logs",
];

/// Directories excluded from sync in addition to `BLOCKED_SEGMENTS`.
const SYNC_IGNORED_SEGMENTS: &[&str] = &[
    "env",
    "ENV",
    ".tox",
    "htmlcov",
    "bower_components",
    ".egg-info",
];

/// File suffixes excluded from sync but harmless to keep staged.
const SYNC_IGNORED_SUFFIXES: &[&str] = &[
    ".pyc", ".pyo", ".pyd", ".so", ".dll", ".dylib", ".log", ".db", ".sqlite", ".sqlite3",
];

/// OS metadata files excluded from sync.
const SYNC_IGNORED_FILES: &[&str] = &[".DS_Store", "Thumbs.db"];

/// Canonicalize a client-supplied relative path.
///
/// Backslashes are treated as separators, empty / `.` / `..` segments are
/// dropped, and the result joins the remaining segments with `/`. The output
/// round-trips: splitting it on `/` yields exactly the retained segments.
pub fn sanitize(raw: &str) -> Result<String, PathError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(PathError::Empty);
    }
    if trimmed.contains('\0') {
        return Err(PathError::Invalid);
    }
    if trimmed.starts_with('/') || trimmed.starts_with('\\') {
        return Err(PathError::Absolute);
    }
    // Windows drive-letter prefix ("C:\...") counts as absolute too.
    let bytes = trimmed.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
        return Err(PathError::Absolute);
    }

    let normalized = trimmed.replace('\\', "/");
    let parts: Vec<&str> = normalized
        .split('/')
        .filter(|part| !part.is_empty() && *part != "." && *part != "..")
        .collect();

    if parts.is_empty() {
        return Err(PathError::Invalid);
    }

    Ok(parts.join("/"))
}

/// Check whether a path may be staged in the workspace at all.
///
/// Returns `Err(reason)` when the basename matches the secret blocklist, a
/// segment names a build/VCS artifact directory, or traversal is detected.
pub fn ensure_safe(path: &str) -> Result<(), String> {
    let normalized = path.replace('\\', "/");

    if normalized.contains("..") || normalized.starts_with('/') {
        return Err("path traversal detected".to_string());
    }

    let basename = normalized.rsplit('/').next().unwrap_or(&normalized);
    let lower = basename.to_ascii_lowercase();

    if BLOCKED_FILES.contains(&lower.as_str()) {
        return Err(format!("sensitive file blocked: {}", basename));
    }
    if BLOCKED_SUFFIXES.iter().any(|ext| lower.ends_with(ext)) {
        return Err(format!("sensitive extension blocked: {}", basename));
    }
    if BLOCKED_PREFIXES.iter().any(|prefix| lower.starts_with(prefix)) {
        return Err(format!("sensitive file blocked: {}", basename));
    }
    if lower.contains(".env") {
        return Err(format!("environment file blocked: {}", basename));
    }
    if lower.starts_with('.') && !ALLOWED_DOTFILES.contains(&lower.as_str()) {
        return Err(format!("hidden file blocked: {}", basename));
    }

    for segment in normalized.split('/') {
        if BLOCKED_SEGMENTS.contains(&segment) {
            return Err(format!("blocked directory: {}", segment));
        }
    }

    Ok(())
}

/// Check whether a path should be published to the remote repository.
///
/// Superset of `ensure_safe`: also drops build artifacts, compiled objects,
/// logs, local databases, and OS metadata that are harmless to stage but
/// should never reach the remote.
pub fn ensure_syncable(path: &str) -> Result<(), String> {
    let normalized = path.replace('\\', "/");
    let basename = normalized.rsplit('/').next().unwrap_or(&normalized);
    let lower = basename.to_ascii_lowercase();

    for segment in normalized.split('/') {
        if SYNC_IGNORED_SEGMENTS.contains(&segment) {
            return Err(format!("ignored directory: {}", segment));
        }
    }
    if SYNC_IGNORED_FILES.contains(&basename) {
        return Err(format!("ignored file: {}", basename));
    }
    if SYNC_IGNORED_SUFFIXES.iter().any(|ext| lower.ends_with(ext)) {
        return Err(format!("ignored extension: {}", basename));
    }

    ensure_safe(&normalized).map_err(|reason| format!("unsafe: {}", reason))
}
