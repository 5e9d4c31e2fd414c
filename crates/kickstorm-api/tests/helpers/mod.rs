//! Shared fixtures for API integration tests.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request};
use axum::Router;
use tempfile::TempDir;
use tower::ServiceExt;

use kickstorm_api::setup::routes::setup_routes;
use kickstorm_api::state::AppState;
use kickstorm_core::{Config, ProjectDirectory, ProjectInfo, StaticProjectDirectory};
use kickstorm_remote::testing::MemoryRemote;
use kickstorm_remote::{RemotePublisher, RemoteRepoClient, RetryPolicy};

pub const MEMBER: i64 = 10;
pub const OUTSIDER: i64 = 99;
pub const PROJECT: i64 = 1;

pub fn test_config(root: &Path) -> Config {
    Config {
        server_port: 0,
        cors_origins: vec!["*".into()],
        environment: "test".into(),
        workspace_root: root.to_path_buf(),
        max_archive_bytes: 64 * 1024 * 1024,
        max_extracted_bytes: 128 * 1024 * 1024,
        max_files: 5000,
        max_file_bytes: 32 * 1024 * 1024,
        remote_enabled: true,
        remote_token: Some("test-token".into()),
        remote_owner: Some("kickstorm".into()),
        remote_api_base: "http://remote.invalid".into(),
        remote_branch: "main".into(),
        remote_default_private: false,
        file_token_secret: "integration-test-secret-0123456789ab".into(),
        file_token_max_age_seconds: 300,
        file_token_salt: "workspace-file-token".into(),
        session_stuck_sync_seconds: 300,
        sync_fast_path_timeout_seconds: 5,
        queue_max_workers: 2,
        queue_max_retries: 3,
        queue_retry_base_delay_seconds: 0,
        history_limit: 20,
        projects_file: None,
    }
}

pub fn test_project() -> ProjectInfo {
    ProjectInfo {
        project_id: PROJECT,
        name: "Demo Project".into(),
        description: Some("integration fixture".into()),
        repo_name: None,
        private: false,
        creator_id: MEMBER,
        members: vec![],
    }
}

pub struct TestApp {
    pub state: Arc<AppState>,
    pub router: Router,
    pub remote: Arc<MemoryRemote>,
    pub projects: Arc<StaticProjectDirectory>,
    _workspace: TempDir,
}

impl TestApp {
    pub async fn request(&self, request: Request<Body>) -> axum::response::Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// The project's remote repo name once publishing created it.
    pub async fn repo_name(&self) -> Option<String> {
        self.projects.find(PROJECT).await.and_then(|p| p.repo_name)
    }
}

pub fn spawn_app() -> TestApp {
    spawn_app_with(|_| {})
}

/// App with a config tweak applied before construction.
pub fn spawn_app_with(tweak: impl FnOnce(&mut Config)) -> TestApp {
    let workspace = tempfile::tempdir().unwrap();
    let mut config = test_config(workspace.path());
    tweak(&mut config);

    let remote = Arc::new(MemoryRemote::new());
    let client: Arc<dyn RemoteRepoClient> = remote.clone();
    let publisher = RemotePublisher::new(client, "main", false).with_retry(RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
    });

    let projects = Arc::new(StaticProjectDirectory::new(vec![test_project()]));
    let state = AppState::new(config, projects.clone(), Some(publisher));
    let router = setup_routes(&state.config, state.clone()).unwrap();

    TestApp {
        state,
        router,
        remote,
        projects,
        _workspace: workspace,
    }
}

/// App with remote publishing disabled.
pub fn spawn_app_without_remote() -> TestApp {
    let workspace = tempfile::tempdir().unwrap();
    let mut config = test_config(workspace.path());
    config.remote_enabled = false;

    let remote = Arc::new(MemoryRemote::new());
    let projects = Arc::new(StaticProjectDirectory::new(vec![test_project()]));
    let state = AppState::new(config, projects.clone(), None);
    let router = setup_routes(&state.config, state.clone()).unwrap();

    TestApp {
        state,
        router,
        remote,
        projects,
        _workspace: workspace,
    }
}

pub const BOUNDARY: &str = "kickstorm-test-boundary";

/// Build a multipart/form-data body. Each part is (name, filename, bytes);
/// parts without a filename are sent as plain fields.
pub fn multipart_body(parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, filename, content) in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match filename {
            Some(filename) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n",
                        name, filename
                    )
                    .as_bytes(),
                );
            }
            None => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name)
                        .as_bytes(),
                );
            }
        }
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn multipart_request(uri: &str, user_id: i64, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("x-user-id", user_id.to_string())
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

pub fn json_request(method: &str, uri: &str, user_id: i64, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("x-user-id", user_id.to_string())
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get_request(uri: &str, user_id: i64) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("x-user-id", user_id.to_string())
        .body(Body::empty())
        .unwrap()
}

pub fn delete_request(uri: &str, user_id: i64) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .header("x-user-id", user_id.to_string())
        .body(Body::empty())
        .unwrap()
}

pub async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Build a zip archive in memory.
pub fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        let options = zip::write::FileOptions::default();
        for (name, content) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap();
    }
    cursor.into_inner()
}
