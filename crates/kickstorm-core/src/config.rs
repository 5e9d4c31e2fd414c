//! Configuration module
//!
//! Process configuration for the workspace pipeline, loaded from the
//! environment with `from_env()` and validated before startup. Limits and
//! secrets are passed explicitly; nothing here is global state.

use std::env;
use std::path::PathBuf;

// Default limits
const MAX_ARCHIVE_MB: u64 = 500;
const MAX_FILE_MB: u64 = 100;
const MAX_FILES: usize = 5000;
const FILE_TOKEN_MAX_AGE_SECS: u64 = 300;
const FILE_TOKEN_SALT: &str = "workspace-file-token";
const SESSION_STUCK_SYNC_SECS: u64 = 300;
const SYNC_FAST_PATH_TIMEOUT_SECS: u64 = 30;
const QUEUE_MAX_WORKERS: usize = 4;
const QUEUE_MAX_RETRIES: u32 = 3;
const QUEUE_RETRY_BASE_DELAY_SECS: u64 = 60;
const HISTORY_LIMIT: usize = 20;
const REMOTE_API_BASE: &str = "https://api.github.com";
const REMOTE_BRANCH: &str = "main";

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub server_port: u16,
    pub cors_origins: Vec<String>,
    pub environment: String,

    /// Root directory holding per-project workspaces.
    pub workspace_root: PathBuf,

    // Upload limits
    pub max_archive_bytes: u64,
    pub max_extracted_bytes: u64,
    pub max_files: usize,
    pub max_file_bytes: u64,

    // Remote repository
    pub remote_enabled: bool,
    pub remote_token: Option<String>,
    pub remote_owner: Option<String>,
    pub remote_api_base: String,
    pub remote_branch: String,
    pub remote_default_private: bool,

    // Signed download tokens
    pub file_token_secret: String,
    pub file_token_max_age_seconds: u64,
    pub file_token_salt: String,

    // Session recovery and sync pacing
    pub session_stuck_sync_seconds: u64,
    pub sync_fast_path_timeout_seconds: u64,

    // Async sync queue
    pub queue_max_workers: usize,
    pub queue_max_retries: u32,
    pub queue_retry_base_delay_seconds: u64,

    pub history_limit: usize,

    /// Optional JSON file seeding the project directory.
    pub projects_file: Option<PathBuf>,
}

impl Config {
    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let cors_origins_str = env::var("CORS_ORIGINS").unwrap_or_else(|_| "*".to_string());
        let is_production =
            environment.to_lowercase() == "production" || environment.to_lowercase() == "prod";
        if is_production && cors_origins_str.trim() == "*" {
            return Err(anyhow::anyhow!(
                "CORS_ORIGINS cannot be '*' in production. Please specify explicit origins."
            ));
        }
        let cors_origins: Vec<String> = cors_origins_str
            .split(',')
            .map(|s| s.trim().to_string())
            .collect();

        let workspace_root = env::var("WORKSPACE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("instance/project_uploads"));

        let max_archive_bytes = env::var("MAX_ARCHIVE_BYTES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(MAX_ARCHIVE_MB * 1024 * 1024);

        // Extracted cap defaults to twice the archive cap.
        let max_extracted_bytes = env::var("MAX_EXTRACTED_BYTES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(max_archive_bytes * 2);

        let config = Config {
            server_port: env::var("PORT")
                .unwrap_or_else(|_| "4000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?,
            cors_origins,
            environment,
            workspace_root,
            max_archive_bytes,
            max_extracted_bytes,
            max_files: env::var("MAX_FILES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(MAX_FILES),
            max_file_bytes: env::var("MAX_FILE_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(MAX_FILE_MB * 1024 * 1024),
            remote_enabled: env::var("REMOTE_ENABLED")
                .unwrap_or_else(|_| "false".to_string())
                .to_lowercase()
                .parse()
                .unwrap_or(false),
            remote_token: env::var("REMOTE_TOKEN").ok().filter(|s| !s.is_empty()),
            remote_owner: env::var("REMOTE_OWNER")
                .or_else(|_| env::var("REMOTE_ORG"))
                .ok()
                .filter(|s| !s.is_empty()),
            remote_api_base: env::var("REMOTE_API_BASE")
                .unwrap_or_else(|_| REMOTE_API_BASE.to_string()),
            remote_branch: env::var("REMOTE_BRANCH").unwrap_or_else(|_| REMOTE_BRANCH.to_string()),
            remote_default_private: env::var("REMOTE_DEFAULT_PRIVATE")
                .unwrap_or_else(|_| "true".to_string())
                .to_lowercase()
                .parse()
                .unwrap_or(true),
            file_token_secret: env::var("FILE_TOKEN_SECRET").map_err(|_| {
                anyhow::anyhow!("FILE_TOKEN_SECRET must be set for signed downloads")
            })?,
            file_token_max_age_seconds: env::var("FILE_TOKEN_MAX_AGE_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(FILE_TOKEN_MAX_AGE_SECS),
            file_token_salt: env::var("FILE_TOKEN_SALT")
                .unwrap_or_else(|_| FILE_TOKEN_SALT.to_string()),
            session_stuck_sync_seconds: env::var("SESSION_STUCK_SYNC_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(SESSION_STUCK_SYNC_SECS),
            sync_fast_path_timeout_seconds: env::var("SYNC_FAST_PATH_TIMEOUT_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(SYNC_FAST_PATH_TIMEOUT_SECS),
            queue_max_workers: env::var("QUEUE_MAX_WORKERS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(QUEUE_MAX_WORKERS),
            queue_max_retries: env::var("QUEUE_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(QUEUE_MAX_RETRIES),
            queue_retry_base_delay_seconds: env::var("QUEUE_RETRY_BASE_DELAY_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(QUEUE_RETRY_BASE_DELAY_SECS),
            history_limit: env::var("HISTORY_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(HISTORY_LIMIT),
            projects_file: env::var("PROJECTS_FILE").ok().map(PathBuf::from),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.file_token_secret.len() < 32 {
            return Err(anyhow::anyhow!(
                "FILE_TOKEN_SECRET must be at least 32 characters long"
            ));
        }

        if self.remote_enabled {
            if self.remote_token.is_none() {
                return Err(anyhow::anyhow!(
                    "REMOTE_TOKEN must be set when REMOTE_ENABLED=true"
                ));
            }
            if self.remote_owner.is_none() {
                return Err(anyhow::anyhow!(
                    "REMOTE_OWNER must be set when REMOTE_ENABLED=true"
                ));
            }
        }

        if self.max_extracted_bytes < self.max_archive_bytes {
            return Err(anyhow::anyhow!(
                "MAX_EXTRACTED_BYTES must be at least MAX_ARCHIVE_BYTES"
            ));
        }

        if self.queue_max_workers == 0 {
            return Err(anyhow::anyhow!("QUEUE_MAX_WORKERS must be at least 1"));
        }

        Ok(())
    }
}
