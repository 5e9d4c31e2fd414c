//! Publish semantics against the in-memory remote: commit counts, chunking,
//! filtering, retries, and the sequential fallback.

use std::time::Duration;

use kickstorm_core::models::PublishMethod;
use kickstorm_remote::testing::MemoryRemote;
use kickstorm_remote::{
    BatchCommitBuilder, RemoteFile, RemoteRepoClient, RetryPolicy, TREE_BATCH_LIMIT,
};

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
    }
}

fn files(n: usize) -> Vec<RemoteFile> {
    (0..n)
        .map(|i| RemoteFile::new(format!("src/file_{:03}.py", i), format!("# {}", i).into_bytes()))
        .collect()
}

async fn init_repo(remote: &MemoryRemote) -> String {
    remote.ensure_repo("demo", "test repo", false).await.unwrap()
}

#[tokio::test]
async fn test_small_publish_is_exactly_one_commit() {
    let remote = MemoryRemote::new();
    let repo = init_repo(&remote).await;
    let before = remote.commit_count(&repo, "main");

    let report = BatchCommitBuilder::with_retry(&remote, fast_retry())
        .publish(&repo, "main", files(10), None)
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.method, PublishMethod::Batch);
    assert_eq!(report.success, 10);
    assert_eq!(report.commit_refs.len(), 1);
    assert_eq!(remote.commit_count(&repo, "main") - before, 1);
    assert_eq!(
        remote.file_at_head(&repo, "main", "src/file_003.py").unwrap(),
        b"# 3"
    );
}

#[tokio::test]
async fn test_publish_chunks_at_tree_limit() {
    // 250 files against a 100-entry cap: exactly ceil(250/100) = 3 commits.
    let remote = MemoryRemote::new();
    let repo = init_repo(&remote).await;
    let before = remote.commit_count(&repo, "main");

    let report = BatchCommitBuilder::with_retry(&remote, fast_retry())
        .publish(&repo, "main", files(250), None)
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.method, PublishMethod::Batch);
    assert_eq!(report.success, 250);
    assert_eq!(report.commit_refs.len(), 3);
    assert!(report.blocked.is_empty());
    assert!(report.ignored.is_empty());
    assert_eq!(remote.commit_count(&repo, "main") - before, 3);

    // Every file from every batch is present at the final head.
    let listed = remote.files_at_head(&repo, "main");
    assert_eq!(listed.len(), 250);
}

#[tokio::test]
async fn test_publish_exact_batch_boundary() {
    let remote = MemoryRemote::new();
    let repo = init_repo(&remote).await;

    let report = BatchCommitBuilder::with_retry(&remote, fast_retry())
        .publish(&repo, "main", files(TREE_BATCH_LIMIT), None)
        .await
        .unwrap();

    assert_eq!(report.commit_refs.len(), 1);

    let report = BatchCommitBuilder::with_retry(&remote, fast_retry())
        .publish(&repo, "main", files(TREE_BATCH_LIMIT + 1), None)
        .await
        .unwrap();
    assert_eq!(report.commit_refs.len(), 2);
}

#[tokio::test]
async fn test_publish_filters_blocked_and_ignored() {
    let remote = MemoryRemote::new();
    let repo = init_repo(&remote).await;

    let mut set = files(2);
    set.push(RemoteFile::new(".env", b"SECRET=1".to_vec()));
    set.push(RemoteFile::new("debug.log", b"line".to_vec()));

    let report = BatchCommitBuilder::with_retry(&remote, fast_retry())
        .publish(&repo, "main", set, None)
        .await
        .unwrap();

    assert_eq!(report.success, 2);
    assert_eq!(report.blocked.len(), 1);
    assert_eq!(report.blocked[0].path, ".env");
    assert_eq!(report.ignored.len(), 1);
    assert_eq!(report.ignored[0].path, "debug.log");

    let listed = remote.files_at_head(&repo, "main");
    assert!(!listed.contains(&".env".to_string()));
    assert!(!listed.contains(&"debug.log".to_string()));
}

#[tokio::test]
async fn test_transient_failure_is_retried() {
    let remote = MemoryRemote::new();
    let repo = init_repo(&remote).await;

    // Two transient failures, third attempt succeeds; still batch method.
    remote.fail_next_tree_creates(2);
    let report = BatchCommitBuilder::with_retry(&remote, fast_retry())
        .publish(&repo, "main", files(5), None)
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.method, PublishMethod::Batch);
    assert_eq!(report.commit_refs.len(), 1);
}

#[tokio::test]
async fn test_exhausted_batch_falls_back_to_sequential() {
    let remote = MemoryRemote::new();
    let repo = init_repo(&remote).await;
    let before = remote.commit_count(&repo, "main");

    // Enough injected failures to exhaust all batch retries.
    remote.fail_next_tree_creates(10);
    let report = BatchCommitBuilder::with_retry(&remote, fast_retry())
        .publish(&repo, "main", files(4), None)
        .await
        .unwrap();

    assert_eq!(report.method, PublishMethod::Sequential);
    assert_eq!(report.success, 4);
    assert_eq!(report.failed, 0);
    // Sequential path costs one commit per file.
    assert_eq!(remote.commit_count(&repo, "main") - before, 4);
}

#[tokio::test]
async fn test_sequential_partial_failure_is_reported_per_file() {
    let remote = MemoryRemote::new();
    let repo = init_repo(&remote).await;

    remote.fail_next_tree_creates(10);
    // First file burns its three upload retries too.
    remote.fail_next_uploads(3);
    let report = BatchCommitBuilder::with_retry(&remote, fast_retry())
        .publish(&repo, "main", files(3), None)
        .await
        .unwrap();

    assert_eq!(report.method, PublishMethod::Sequential);
    assert_eq!(report.failed, 1);
    assert_eq!(report.success, 2);
    assert_eq!(report.errors.len(), 1);
    assert!(!report.is_success());
}

#[tokio::test]
async fn test_empty_file_set_publishes_nothing() {
    let remote = MemoryRemote::new();
    let repo = init_repo(&remote).await;
    let before = remote.commit_count(&repo, "main");

    let report = BatchCommitBuilder::with_retry(&remote, fast_retry())
        .publish(&repo, "main", Vec::new(), None)
        .await
        .unwrap();

    assert!(report.commit_refs.is_empty());
    assert_eq!(remote.commit_count(&repo, "main"), before);
}

#[tokio::test]
async fn test_ensure_repo_is_idempotent() {
    let remote = MemoryRemote::new();
    let first = remote.ensure_repo("demo", "d", false).await.unwrap();
    let count_after_first = remote.commit_count(&first, "main");
    let second = remote.ensure_repo("demo", "d", false).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(remote.commit_count(&first, "main"), count_after_first);
}

#[tokio::test]
async fn test_publish_carries_over_existing_files() {
    let remote = MemoryRemote::new();
    let repo = init_repo(&remote).await;

    BatchCommitBuilder::with_retry(&remote, fast_retry())
        .publish(
            &repo,
            "main",
            vec![RemoteFile::new("keep.txt", b"old".to_vec())],
            None,
        )
        .await
        .unwrap();

    BatchCommitBuilder::with_retry(&remote, fast_retry())
        .publish(
            &repo,
            "main",
            vec![RemoteFile::new("new.txt", b"new".to_vec())],
            None,
        )
        .await
        .unwrap();

    // The second commit's tree still carries the first commit's file.
    assert_eq!(remote.file_at_head(&repo, "main", "keep.txt").unwrap(), b"old");
    assert_eq!(remote.file_at_head(&repo, "main", "new.txt").unwrap(), b"new");
}
