//! HTTP request handlers, one module per surface.

pub mod download;
pub mod file_upload;
pub mod finalize;
pub mod health;
pub mod sessions;
pub mod sign;
pub mod sync_status;
pub mod tree;
pub mod upload_zip;
