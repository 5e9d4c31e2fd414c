//! KICKStorm API Library
//!
//! This crate provides the HTTP handlers, sync dispatcher, and application
//! setup for the workspace upload and synchronization pipeline.

// Module declarations
mod api_doc;
mod dispatch;
mod handlers;
mod telemetry;

// Public modules
pub mod auth;
pub mod error;
pub mod setup;
pub mod state;

// Re-exports
pub use error::ErrorResponse;
pub use state::{AppState, SyncDispatchResult};
pub use telemetry::init_tracing;
