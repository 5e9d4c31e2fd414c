//! Data models for the workspace pipeline
//!
//! This module contains all data structures used throughout the application,
//! organized by domain: upload sessions, publish history, the synced file
//! tree, and remote publication reports.

mod history;
mod publish;
mod session;
mod tree;

// Re-export all models for convenient imports
pub use history::*;
pub use publish::*;
pub use session::*;
pub use tree::*;
