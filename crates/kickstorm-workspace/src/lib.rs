//! KICKStorm Workspace – per-project on-disk state.
//!
//! Owns the workspace directory layout, atomic session metadata, the publish
//! history ring, the stale-session recovery sweep, and the synced file tree.
//!
//! Layout per project:
//!
//! ```text
//! <workspace_root>/<project_id>/
//!   incoming/<session_id>/
//!     metadata.json
//!     <sanitized/relative/paths…>
//!   repo/
//!   history.json
//! ```

mod store;
mod tree;

pub use store::{WorkspaceError, WorkspaceStore};
pub use tree::list_repo_files;
