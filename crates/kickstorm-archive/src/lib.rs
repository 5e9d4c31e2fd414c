//! KICKStorm Archive – bounded extraction of uploaded archives.
//!
//! Extracts ZIP and TAR(.GZ) uploads into a session staging directory with
//! entry-count, per-archive, and total-expanded-size limits. Dangerous
//! entries are skipped and recorded rather than failing the archive;
//! zip-slip escapes fail it outright.

mod extract;

pub use extract::{
    extract_archive, ArchiveKind, ArchiveLimits, ExtractError, ExtractedFile, Extraction,
    SkippedEntry,
};
