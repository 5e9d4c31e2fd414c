//! KICKStorm Remote – versioned-store publication.
//!
//! Thin abstraction over the remote repository API plus the batch commit
//! builder that turns a session's file set into a single logical commit
//! (chunked when the tree API caps entries per request).

mod batch;
mod client;
mod http;
mod publisher;
pub mod testing;

pub use batch::{BatchCommitBuilder, RetryPolicy, TREE_BATCH_LIMIT};
pub use client::{CommitRef, RemoteError, RemoteFile, RemoteRepoClient, TreeEntry};
pub use http::HttpRemoteClient;
pub use publisher::{sanitize_repo_name, RemotePublisher};
