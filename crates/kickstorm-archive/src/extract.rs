//! Archive extraction engine.
//!
//! Single pass per archive: enumerate entries, gate on the entry-count
//! limit, then stream each accepted entry to disk while tracking the running
//! decompressed total. Entries that fail the safety filter are skipped and
//! recorded; an entry that would resolve outside the destination root fails
//! the whole archive.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive as TarArchive;
use zip::read::ZipArchive;

use kickstorm_core::paths;

/// Extraction limits; defaults follow the workspace configuration.
#[derive(Debug, Clone, Copy)]
pub struct ArchiveLimits {
    pub max_archive_bytes: u64,
    pub max_extracted_bytes: u64,
    pub max_file_count: usize,
}

impl Default for ArchiveLimits {
    fn default() -> Self {
        Self {
            max_archive_bytes: 500 * 1024 * 1024,
            max_extracted_bytes: 1024 * 1024 * 1024,
            max_file_count: 5000,
        }
    }
}

/// Supported archive container formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    Tar,
    TarGz,
}

impl ArchiveKind {
    pub fn from_filename(filename: &str) -> Option<Self> {
        let lower = filename.to_ascii_lowercase();
        if lower.ends_with(".zip") {
            Some(ArchiveKind::Zip)
        } else if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Some(ArchiveKind::TarGz)
        } else if lower.ends_with(".tar") {
            Some(ArchiveKind::Tar)
        } else {
            None
        }
    }
}

/// One accepted entry written to the staging directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFile {
    pub path: String,
    pub size: u64,
}

/// One refused entry, with the filter's reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    pub path: String,
    pub reason: String,
}

/// Result of one extraction: accepted and skipped entries are reported
/// separately so callers can distinguish skips from hard failures.
#[derive(Debug, Default)]
pub struct Extraction {
    pub accepted: Vec<ExtractedFile>,
    pub skipped: Vec<SkippedEntry>,
}

impl Extraction {
    pub fn total_size(&self) -> u64 {
        self.accepted.iter().map(|f| f.size).sum()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("archive of {size} bytes exceeds the limit of {max} bytes")]
    ArchiveTooLarge { size: u64, max: u64 },

    #[error("{count} entries exceed the limit of {max}")]
    TooManyEntries { count: usize, max: usize },

    #[error("expanded size exceeds the limit of {max} bytes")]
    ExpandedTooLarge { max: u64 },

    #[error("unsupported archive format: {0}")]
    UnsupportedFormat(String),

    #[error("archive is corrupt: {0}")]
    Corrupt(String),

    #[error("entry resolves outside the extraction root: {0}")]
    PathEscape(String),

    #[error("entries collide on a case-insensitive filesystem: {0}")]
    CaseCollision(String),

    #[error("archive contains no valid files")]
    NoValidFiles,

    #[error("IO error during extraction: {0}")]
    Io(#[from] io::Error),
}

/// Extract an archive into `dest`, choosing the codec from the filename.
pub fn extract_archive(
    data: &[u8],
    filename: &str,
    dest: &Path,
    limits: &ArchiveLimits,
) -> Result<Extraction, ExtractError> {
    let kind = ArchiveKind::from_filename(filename)
        .ok_or_else(|| ExtractError::UnsupportedFormat(filename.to_string()))?;

    if data.len() as u64 > limits.max_archive_bytes {
        return Err(ExtractError::ArchiveTooLarge {
            size: data.len() as u64,
            max: limits.max_archive_bytes,
        });
    }

    fs::create_dir_all(dest)?;

    let extraction = match kind {
        ArchiveKind::Zip => extract_zip(data, dest, limits)?,
        ArchiveKind::Tar => extract_tar(Cursor::new(data), dest, limits)?,
        ArchiveKind::TarGz => extract_tar(GzDecoder::new(Cursor::new(data)), dest, limits)?,
    };

    tracing::info!(
        accepted = extraction.accepted.len(),
        skipped = extraction.skipped.len(),
        total_size = extraction.total_size(),
        "Archive extraction finished"
    );

    Ok(extraction)
}

/// Decide an entry's fate: `Ok(Some(sanitized))` to extract, `Ok(None)` with
/// a skip record appended, `Err` to fail the archive.
fn admit_entry(
    raw_name: &str,
    dest: &Path,
    skipped: &mut Vec<SkippedEntry>,
) -> Result<Option<(String, PathBuf)>, ExtractError> {
    if let Err(reason) = paths::ensure_safe(raw_name) {
        skipped.push(SkippedEntry {
            path: raw_name.to_string(),
            reason,
        });
        return Ok(None);
    }

    let sanitized = match paths::sanitize(raw_name) {
        Ok(sanitized) => sanitized,
        Err(e) => {
            skipped.push(SkippedEntry {
                path: raw_name.to_string(),
                reason: e.to_string(),
            });
            return Ok(None);
        }
    };

    // Zip-slip defence: the sanitized join must stay under the root. The
    // sanitizer strips traversal segments, so a violation here means the
    // archive is actively hostile and the whole extraction fails.
    let target = dest.join(&sanitized);
    if !target.starts_with(dest) || sanitized.split('/').any(|seg| seg == "..") {
        return Err(ExtractError::PathEscape(raw_name.to_string()));
    }

    Ok(Some((sanitized, target)))
}

/// Reject archives whose entries differ only by ASCII case; on
/// case-insensitive filesystems they would silently overwrite each other.
fn check_case_collisions(names: &[String]) -> Result<(), ExtractError> {
    let mut seen: HashMap<String, &str> = HashMap::new();
    for name in names {
        let lower = name.to_ascii_lowercase();
        match seen.get(lower.as_str()) {
            Some(first) if *first != name.as_str() => {
                return Err(ExtractError::CaseCollision(format!(
                    "{} vs {}",
                    first, name
                )));
            }
            _ => {
                seen.insert(lower, name);
            }
        }
    }
    Ok(())
}

/// Stream `reader` to `target`, failing once the running total would pass
/// the expanded-size limit.
fn write_limited(
    reader: &mut impl Read,
    target: &Path,
    running_total: &mut u64,
    limits: &ArchiveLimits,
) -> Result<u64, ExtractError> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut out = fs::File::create(target)?;

    let budget = limits.max_extracted_bytes.saturating_sub(*running_total);
    // Read one byte past the budget so an exactly-at-limit file passes and
    // an over-limit file is detected without draining the entry.
    let mut limited = reader.take(budget + 1);
    let written = io::copy(&mut limited, &mut out)?;
    if written > budget {
        drop(out);
        let _ = fs::remove_file(target);
        return Err(ExtractError::ExpandedTooLarge {
            max: limits.max_extracted_bytes,
        });
    }
    out.flush()?;
    *running_total += written;
    Ok(written)
}

fn extract_zip(data: &[u8], dest: &Path, limits: &ArchiveLimits) -> Result<Extraction, ExtractError> {
    let mut archive =
        ZipArchive::new(Cursor::new(data)).map_err(|e| ExtractError::Corrupt(e.to_string()))?;

    let file_names: Vec<String> = archive
        .file_names()
        .filter(|name| !name.ends_with('/'))
        .map(str::to_string)
        .collect();

    if file_names.is_empty() {
        return Err(ExtractError::NoValidFiles);
    }
    if file_names.len() > limits.max_file_count {
        return Err(ExtractError::TooManyEntries {
            count: file_names.len(),
            max: limits.max_file_count,
        });
    }
    check_case_collisions(&file_names)?;

    let mut extraction = Extraction::default();
    let mut running_total = 0u64;

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| ExtractError::Corrupt(e.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        let raw_name = entry.name().to_string();

        // Symlinked entries are never materialized.
        if let Some(mode) = entry.unix_mode() {
            if mode & 0o170000 == 0o120000 {
                extraction.skipped.push(SkippedEntry {
                    path: raw_name,
                    reason: "symbolic link".to_string(),
                });
                continue;
            }
        }

        let Some((sanitized, target)) = admit_entry(&raw_name, dest, &mut extraction.skipped)?
        else {
            continue;
        };

        let written = write_limited(&mut entry, &target, &mut running_total, limits)?;
        upsert_accepted(&mut extraction.accepted, sanitized, written);
    }

    Ok(extraction)
}

fn extract_tar<R: Read>(
    reader: R,
    dest: &Path,
    limits: &ArchiveLimits,
) -> Result<Extraction, ExtractError> {
    let mut archive = TarArchive::new(reader);
    let mut extraction = Extraction::default();
    let mut running_total = 0u64;
    let mut file_count = 0usize;
    let mut seen_lower: HashMap<String, String> = HashMap::new();

    let entries = archive
        .entries()
        .map_err(|e| ExtractError::Corrupt(e.to_string()))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| ExtractError::Corrupt(e.to_string()))?;
        let entry_type = entry.header().entry_type();
        if entry_type.is_dir() {
            continue;
        }
        let raw_name = entry
            .path()
            .map_err(|e| ExtractError::Corrupt(e.to_string()))?
            .to_string_lossy()
            .into_owned();

        if entry_type.is_symlink() || entry_type.is_hard_link() {
            extraction.skipped.push(SkippedEntry {
                path: raw_name,
                reason: "symbolic link".to_string(),
            });
            continue;
        }
        if !entry_type.is_file() {
            extraction.skipped.push(SkippedEntry {
                path: raw_name,
                reason: "special file".to_string(),
            });
            continue;
        }

        file_count += 1;
        if file_count > limits.max_file_count {
            return Err(ExtractError::TooManyEntries {
                count: file_count,
                max: limits.max_file_count,
            });
        }
        let lower = raw_name.to_ascii_lowercase();
        match seen_lower.get(&lower) {
            Some(first) if first != &raw_name => {
                return Err(ExtractError::CaseCollision(format!(
                    "{} vs {}",
                    first, raw_name
                )));
            }
            _ => {
                seen_lower.insert(lower, raw_name.clone());
            }
        }

        let Some((sanitized, target)) = admit_entry(&raw_name, dest, &mut extraction.skipped)?
        else {
            continue;
        };

        let written = write_limited(&mut entry, &target, &mut running_total, limits)?;
        upsert_accepted(&mut extraction.accepted, sanitized, written);
    }

    if file_count == 0 && extraction.skipped.is_empty() {
        return Err(ExtractError::NoValidFiles);
    }

    Ok(extraction)
}

/// Duplicate entries: last write wins, reported once.
fn upsert_accepted(accepted: &mut Vec<ExtractedFile>, path: String, size: u64) {
    match accepted.iter_mut().find(|f| f.path == path) {
        Some(existing) => existing.size = size,
        None => accepted.push(ExtractedFile { path, size }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::tempdir;
    use zip::write::FileOptions;

    fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buf);
            let options = FileOptions::default();
            for (name, content) in entries {
                writer.start_file(*name, options).unwrap();
                writer.write_all(content).unwrap();
            }
            writer.finish().unwrap();
        }
        buf.into_inner()
    }

    fn build_tar(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, content) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, *name, *content).unwrap();
        }
        builder.into_inner().unwrap()
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_archive_kind_detection() {
        assert_eq!(ArchiveKind::from_filename("a.zip"), Some(ArchiveKind::Zip));
        assert_eq!(ArchiveKind::from_filename("a.TAR"), Some(ArchiveKind::Tar));
        assert_eq!(
            ArchiveKind::from_filename("a.tar.gz"),
            Some(ArchiveKind::TarGz)
        );
        assert_eq!(ArchiveKind::from_filename("a.tgz"), Some(ArchiveKind::TarGz));
        assert_eq!(ArchiveKind::from_filename("a.rar"), None);
    }

    #[test]
    fn test_zip_extraction_blocks_env_file() {
        // Three files of 20 bytes each; the .env must be skipped.
        let content = [b'x'; 20];
        let data = build_zip(&[
            ("a.txt", &content),
            ("src/b.py", &content),
            (".env", &content),
        ]);
        let dir = tempdir().unwrap();

        let result =
            extract_archive(&data, "upload.zip", dir.path(), &ArchiveLimits::default()).unwrap();

        assert_eq!(result.accepted.len(), 2);
        assert_eq!(result.total_size(), 40);
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.skipped[0].path, ".env");
        assert!(dir.path().join("a.txt").is_file());
        assert!(dir.path().join("src/b.py").is_file());
        assert!(!dir.path().join(".env").exists());
    }

    #[test]
    fn test_zip_traversal_entry_is_skipped_and_recorded() {
        let data = build_zip(&[("../../etc/passwd", b"root"), ("ok.txt", b"fine")]);
        let dir = tempdir().unwrap();

        let result =
            extract_archive(&data, "evil.zip", dir.path(), &ArchiveLimits::default()).unwrap();

        assert_eq!(result.accepted.len(), 1);
        assert_eq!(result.accepted[0].path, "ok.txt");
        assert_eq!(result.skipped.len(), 1);
        assert!(result.skipped[0].reason.contains("traversal"));
        // Nothing escaped the root.
        assert!(!dir.path().join("../../etc/passwd").exists());
    }

    #[test]
    fn test_zip_entry_count_limit() {
        let content = b"x";
        let entries: Vec<(String, &[u8])> = (0..6)
            .map(|i| (format!("f{}.txt", i), content.as_slice()))
            .collect();
        let refs: Vec<(&str, &[u8])> = entries.iter().map(|(n, c)| (n.as_str(), *c)).collect();
        let data = build_zip(&refs);
        let dir = tempdir().unwrap();

        let limits = ArchiveLimits {
            max_file_count: 5,
            ..Default::default()
        };
        let err = extract_archive(&data, "many.zip", dir.path(), &limits).unwrap_err();
        assert!(matches!(
            err,
            ExtractError::TooManyEntries { count: 6, max: 5 }
        ));
        // Nothing written when the archive is rejected up front.
        assert!(fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[test]
    fn test_zip_expanded_size_limit() {
        let big = vec![b'y'; 4096];
        let data = build_zip(&[("a.bin", big.as_slice()), ("b.bin", big.as_slice())]);
        let dir = tempdir().unwrap();

        let limits = ArchiveLimits {
            max_extracted_bytes: 6000,
            ..Default::default()
        };
        let err = extract_archive(&data, "big.zip", dir.path(), &limits).unwrap_err();
        assert!(matches!(err, ExtractError::ExpandedTooLarge { max: 6000 }));
    }

    #[test]
    fn test_zip_archive_size_limit() {
        let data = build_zip(&[("a.txt", b"hello")]);
        let dir = tempdir().unwrap();
        let limits = ArchiveLimits {
            max_archive_bytes: 8,
            ..Default::default()
        };
        let err = extract_archive(&data, "a.zip", dir.path(), &limits).unwrap_err();
        assert!(matches!(err, ExtractError::ArchiveTooLarge { .. }));
    }

    #[test]
    fn test_zip_case_collision_fails() {
        let data = build_zip(&[("Readme.md", b"a"), ("readme.md", b"b")]);
        let dir = tempdir().unwrap();
        let err =
            extract_archive(&data, "dup.zip", dir.path(), &ArchiveLimits::default()).unwrap_err();
        assert!(matches!(err, ExtractError::CaseCollision(_)));
    }

    #[test]
    fn test_zip_exact_duplicate_last_write_wins() {
        let data = build_zip(&[("same.txt", b"first"), ("same.txt", b"second")]);
        let dir = tempdir().unwrap();
        let result =
            extract_archive(&data, "dup.zip", dir.path(), &ArchiveLimits::default()).unwrap();
        assert_eq!(result.accepted.len(), 1);
        assert_eq!(fs::read(dir.path().join("same.txt")).unwrap(), b"second");
    }

    #[test]
    fn test_empty_zip_fails() {
        let data = build_zip(&[]);
        let dir = tempdir().unwrap();
        let err =
            extract_archive(&data, "empty.zip", dir.path(), &ArchiveLimits::default()).unwrap_err();
        assert!(matches!(err, ExtractError::NoValidFiles));
    }

    #[test]
    fn test_unsupported_format() {
        let dir = tempdir().unwrap();
        let err = extract_archive(b"data", "a.rar", dir.path(), &ArchiveLimits::default())
            .unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_corrupt_zip() {
        let dir = tempdir().unwrap();
        let err = extract_archive(
            b"definitely not a zip",
            "a.zip",
            dir.path(),
            &ArchiveLimits::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ExtractError::Corrupt(_)));
    }

    #[test]
    fn test_tar_extraction() {
        let data = build_tar(&[("a.txt", b"alpha"), ("nested/b.txt", b"beta")]);
        let dir = tempdir().unwrap();

        let result =
            extract_archive(&data, "files.tar", dir.path(), &ArchiveLimits::default()).unwrap();

        assert_eq!(result.accepted.len(), 2);
        assert_eq!(fs::read(dir.path().join("a.txt")).unwrap(), b"alpha");
        assert_eq!(fs::read(dir.path().join("nested/b.txt")).unwrap(), b"beta");
    }

    #[test]
    fn test_tar_gz_extraction() {
        let data = gzip(&build_tar(&[("c.txt", b"gamma")]));
        let dir = tempdir().unwrap();

        let result =
            extract_archive(&data, "files.tar.gz", dir.path(), &ArchiveLimits::default()).unwrap();

        assert_eq!(result.accepted.len(), 1);
        assert_eq!(fs::read(dir.path().join("c.txt")).unwrap(), b"gamma");
    }

    #[test]
    fn test_tar_symlink_entry_is_skipped() {
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Symlink);
        header.set_size(0);
        header.set_cksum();
        builder
            .append_link(&mut header, "link.txt", "/etc/passwd")
            .unwrap();
        let mut file_header = tar::Header::new_gnu();
        file_header.set_size(2);
        file_header.set_mode(0o644);
        file_header.set_cksum();
        builder
            .append_data(&mut file_header, "real.txt", b"ok".as_slice())
            .unwrap();
        let data = builder.into_inner().unwrap();

        let dir = tempdir().unwrap();
        let result =
            extract_archive(&data, "links.tar", dir.path(), &ArchiveLimits::default()).unwrap();

        assert_eq!(result.accepted.len(), 1);
        assert_eq!(result.accepted[0].path, "real.txt");
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.skipped[0].reason, "symbolic link");
        assert!(!dir.path().join("link.txt").exists());
    }

    #[test]
    fn test_artifact_directories_are_skipped() {
        let data = build_zip(&[
            ("node_modules/lib/index.js", b"js"),
            ("src/__pycache__/m.pyc", b"pyc"),
            ("src/main.py", b"py"),
        ]);
        let dir = tempdir().unwrap();
        let result =
            extract_archive(&data, "deps.zip", dir.path(), &ArchiveLimits::default()).unwrap();
        assert_eq!(result.accepted.len(), 1);
        assert_eq!(result.accepted[0].path, "src/main.py");
        assert_eq!(result.skipped.len(), 2);
    }
}
