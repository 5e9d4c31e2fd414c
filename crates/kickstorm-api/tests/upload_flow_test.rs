//! End-to-end upload flows: archive upload with auto-sync, chunked manual
//! uploads, finalize, and cancellation.

mod helpers;

use helpers::*;

#[tokio::test]
async fn test_zip_upload_blocks_secrets_and_publishes_one_commit() {
    let app = spawn_app();
    let payload = [b'x'; 20];
    let archive = build_zip(&[
        ("a.txt", payload.as_slice()),
        ("src/b.py", payload.as_slice()),
        (".env", payload.as_slice()),
    ]);

    let body = multipart_body(&[("file", Some("workspace.zip"), &archive)]);
    let response = app
        .request(multipart_request(
            "/api/v0/projects/1/upload-zip",
            MEMBER,
            body,
        ))
        .await;
    assert_eq!(response.status(), 200);
    let json = json_body(response).await;

    // The .env never reaches the staging area.
    assert_eq!(json["success"], true);
    assert_eq!(json["file_count"], 2);
    assert_eq!(json["total_size"], 40);
    assert_eq!(json["skipped"][0]["path"], ".env");

    // The zip path dispatches sync immediately; the fast path completes.
    assert_eq!(json["status"], "completed");
    assert_eq!(json["sync"]["method"], "git");

    // Exactly one commit on top of the auto-init commit, with both files
    // under the workspace subtree.
    let repo = app.repo_name().await.expect("repo created on first publish");
    assert_eq!(app.remote.commit_count(&repo, "main"), 2);
    assert!(app
        .remote
        .file_at_head(&repo, "main", "workspace/a.txt")
        .is_some());
    assert!(app
        .remote
        .file_at_head(&repo, "main", "workspace/src/b.py")
        .is_some());
    assert!(app
        .remote
        .file_at_head(&repo, "main", "workspace/.env")
        .is_none());
}

#[tokio::test]
async fn test_zip_upload_populates_tree_listing() {
    let app = spawn_app();
    let archive = build_zip(&[("docs/readme.md", b"# readme".as_slice())]);

    let body = multipart_body(&[("file", Some("w.zip"), &archive)]);
    let response = app
        .request(multipart_request(
            "/api/v0/projects/1/upload-zip",
            MEMBER,
            body,
        ))
        .await;
    assert_eq!(response.status(), 200);

    let response = app
        .request(get_request("/api/v0/projects/1/files/tree", MEMBER))
        .await;
    assert_eq!(response.status(), 200);
    let json = json_body(response).await;
    let files = json["files"].as_array().unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0]["path"], "docs/readme.md");
    assert_eq!(files[0]["size"], 8);
    assert_eq!(files[0]["mime"], "text/markdown");
}

#[tokio::test]
async fn test_zip_with_only_traversal_entries_stays_extracted() {
    let app = spawn_app();
    let archive = build_zip(&[("../../etc/passwd", b"root:x".as_slice())]);
    let body = multipart_body(&[("file", Some("evil.zip"), &archive)]);

    let response = app
        .request(multipart_request(
            "/api/v0/projects/1/upload-zip",
            MEMBER,
            body,
        ))
        .await;
    assert_eq!(response.status(), 200);
    let json = json_body(response).await;

    // Nothing publishable, so no sync was dispatched; the skip list tells
    // the caller why.
    assert_eq!(json["status"], "extracted");
    assert_eq!(json["file_count"], 0);
    assert!(json["skipped"][0]["reason"]
        .as_str()
        .unwrap()
        .contains("traversal"));
    assert!(json.get("sync").is_none());
    assert!(app.repo_name().await.is_none());
}

#[tokio::test]
async fn test_corrupt_zip_leaves_error_session() {
    let app = spawn_app();
    let body = multipart_body(&[("file", Some("bad.zip"), b"this is not a zip")]);
    let response = app
        .request(multipart_request(
            "/api/v0/projects/1/upload-zip",
            MEMBER,
            body,
        ))
        .await;
    assert_eq!(response.status(), 400);
    let json = json_body(response).await;
    assert_eq!(json["code"], "ARCHIVE_CORRUPT");

    // The session directory is retained with status=error for inspection.
    let sessions = app.state.store.list_sessions(PROJECT, None).unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].status.to_string(), "error");
}

#[tokio::test]
async fn test_chunked_upload_assembles_file() {
    let app = spawn_app();
    const MIB: usize = 1024 * 1024;
    let chunk = vec![0xabu8; 4 * MIB];

    let mut session_id = String::new();
    for index in 0..3u32 {
        let index_text = index.to_string();
        let session_field = session_id.clone();
        let mut parts: Vec<(&str, Option<&str>, &[u8])> = vec![
            ("relative_path", None, b"data/blob.bin".as_slice()),
            ("file", Some("blob.bin"), chunk.as_slice()),
            ("chunk_index", None, index_text.as_bytes()),
            ("total_chunks", None, b"3"),
        ];
        if !session_field.is_empty() {
            parts.push(("session_id", None, session_field.as_bytes()));
        }

        let body = multipart_body(&parts);
        let response = app
            .request(multipart_request("/api/v0/projects/1/files", MEMBER, body))
            .await;
        assert_eq!(response.status(), 200);
        let json = json_body(response).await;
        session_id = json["session_id"].as_str().unwrap().to_string();
        assert_eq!(json["path"], "data/blob.bin");
    }

    // After the final chunk the file entry is complete at 12 MiB.
    let uri = format!("/api/v0/projects/1/sync-status?session_id={}", session_id);
    let response = app.request(get_request(&uri, MEMBER)).await;
    assert_eq!(response.status(), 200);
    let json = json_body(response).await;
    let session = &json["session"];
    assert_eq!(session["status"], "in_progress");
    assert_eq!(session["files"][0]["status"], "complete");
    assert_eq!(session["files"][0]["size"], 12 * MIB as u64);
    assert_eq!(session["total_size"], 12 * MIB as u64);
}

#[tokio::test]
async fn test_finalize_publishes_manual_session() {
    let app = spawn_app();

    let body = multipart_body(&[
        ("relative_path", None, b"src/main.py".as_slice()),
        ("file", Some("main.py"), b"print('hello')".as_slice()),
    ]);
    let response = app
        .request(multipart_request("/api/v0/projects/1/files", MEMBER, body))
        .await;
    assert_eq!(response.status(), 200);
    let session_id = json_body(response).await["session_id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .request(json_request(
            "POST",
            "/api/v0/projects/1/finalize-upload",
            MEMBER,
            serde_json::json!({ "session_id": session_id }),
        ))
        .await;
    assert_eq!(response.status(), 200);
    let json = json_body(response).await;
    assert_eq!(json["status"], "completed");
    assert_eq!(json["method"], "git");

    // History records the publish with its commit ref.
    let response = app
        .request(get_request("/api/v0/projects/1/sync-status", MEMBER))
        .await;
    let json = json_body(response).await;
    assert_eq!(json["history"][0]["session_id"], session_id.as_str());
    assert_eq!(json["history"][0]["status"], "completed");
    assert!(json["history"][0]["commit_ref"].is_string());
    assert!(json["repository"]["repo_name"].is_string());
}

#[tokio::test]
async fn test_finalize_unknown_session_is_404() {
    let app = spawn_app();
    let response = app
        .request(json_request(
            "POST",
            "/api/v0/projects/1/finalize-upload",
            MEMBER,
            serde_json::json!({ "session_id": "00000000000000000000000000000000" }),
        ))
        .await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_blocked_upload_path_is_rejected() {
    let app = spawn_app();
    let body = multipart_body(&[
        ("relative_path", None, b".env".as_slice()),
        ("file", Some(".env"), b"SECRET=1".as_slice()),
    ]);
    let response = app
        .request(multipart_request("/api/v0/projects/1/files", MEMBER, body))
        .await;
    assert_eq!(response.status(), 400);
    assert_eq!(json_body(response).await["code"], "INVALID_PATH");
}

#[tokio::test]
async fn test_oversized_single_file_is_413() {
    let app = spawn_app();
    let oversized = vec![0u8; 33 * 1024 * 1024];
    let body = multipart_body(&[
        ("relative_path", None, b"big.bin".as_slice()),
        ("file", Some("big.bin"), oversized.as_slice()),
    ]);
    let response = app
        .request(multipart_request("/api/v0/projects/1/files", MEMBER, body))
        .await;
    assert_eq!(response.status(), 413);
}

#[tokio::test]
async fn test_cancel_session_respects_protected_states() {
    let app = spawn_app();

    // Stage a manual session, then cancel it.
    let body = multipart_body(&[
        ("relative_path", None, b"a.txt".as_slice()),
        ("file", Some("a.txt"), b"x".as_slice()),
    ]);
    let response = app
        .request(multipart_request("/api/v0/projects/1/files", MEMBER, body))
        .await;
    let session_id = json_body(response).await["session_id"]
        .as_str()
        .unwrap()
        .to_string();

    let uri = format!("/api/v0/projects/1/sessions/{}", session_id);
    let response = app.request(delete_request(&uri, MEMBER)).await;
    assert_eq!(response.status(), 200);

    // A second delete is a 404.
    let response = app.request(delete_request(&uri, MEMBER)).await;
    assert_eq!(response.status(), 404);

    // Completed sessions are protected.
    let archive = build_zip(&[("f.txt", b"hi".as_slice())]);
    let body = multipart_body(&[("file", Some("w.zip"), &archive)]);
    let response = app
        .request(multipart_request(
            "/api/v0/projects/1/upload-zip",
            MEMBER,
            body,
        ))
        .await;
    let json = json_body(response).await;
    assert_eq!(json["status"], "completed");
    let completed_id = json["session_id"].as_str().unwrap().to_string();

    let uri = format!("/api/v0/projects/1/sessions/{}", completed_id);
    let response = app.request(delete_request(&uri, MEMBER)).await;
    assert_eq!(response.status(), 400);
    assert_eq!(json_body(response).await["code"], "SESSION_PROTECTED");
}

#[tokio::test]
async fn test_membership_is_enforced() {
    let app = spawn_app();

    let response = app
        .request(get_request("/api/v0/projects/1/sync-status", OUTSIDER))
        .await;
    assert_eq!(response.status(), 403);
    assert_eq!(json_body(response).await["code"], "NOT_A_MEMBER");

    // Unknown project is a 404 even for valid users.
    let response = app
        .request(get_request("/api/v0/projects/777/sync-status", MEMBER))
        .await;
    assert_eq!(response.status(), 404);

    // Missing identity header is refused outright.
    let request = axum::http::Request::builder()
        .method("GET")
        .uri("/api/v0/projects/1/sync-status")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = app.request(request).await;
    assert_eq!(response.status(), 403);
}

#[tokio::test]
async fn test_finalize_without_remote_is_503() {
    let app = spawn_app_without_remote();

    let body = multipart_body(&[
        ("relative_path", None, b"a.txt".as_slice()),
        ("file", Some("a.txt"), b"x".as_slice()),
    ]);
    let response = app
        .request(multipart_request("/api/v0/projects/1/files", MEMBER, body))
        .await;
    let session_id = json_body(response).await["session_id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .request(json_request(
            "POST",
            "/api/v0/projects/1/finalize-upload",
            MEMBER,
            serde_json::json!({ "session_id": session_id }),
        ))
        .await;
    assert_eq!(response.status(), 503);
    assert_eq!(json_body(response).await["code"], "REMOTE_UNAVAILABLE");
}

#[tokio::test]
async fn test_zip_upload_without_remote_stays_extracted() {
    let app = spawn_app_without_remote();
    let archive = build_zip(&[("a.txt", b"hello".as_slice())]);
    let body = multipart_body(&[("file", Some("w.zip"), &archive)]);

    let response = app
        .request(multipart_request(
            "/api/v0/projects/1/upload-zip",
            MEMBER,
            body,
        ))
        .await;
    assert_eq!(response.status(), 200);
    let json = json_body(response).await;
    assert_eq!(json["status"], "extracted");
    assert!(json.get("sync").is_none());
}
