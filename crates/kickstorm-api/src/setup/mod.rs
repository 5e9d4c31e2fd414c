//! Application initialisation: state, routes, server.

pub mod routes;
pub mod server;

use std::sync::Arc;

use anyhow::Result;
use kickstorm_core::{Config, ProjectDirectory, StaticProjectDirectory};
use kickstorm_remote::{HttpRemoteClient, RemotePublisher};

use crate::state::AppState;

/// Build the application state and router from configuration.
pub async fn initialize_app(config: Config) -> Result<(Arc<AppState>, axum::Router)> {
    let projects: Arc<dyn ProjectDirectory> = match &config.projects_file {
        Some(path) => Arc::new(StaticProjectDirectory::from_file(path)?),
        None => {
            tracing::warn!("PROJECTS_FILE not set; starting with an empty project directory");
            Arc::new(StaticProjectDirectory::new(Vec::new()))
        }
    };

    let publisher = if config.remote_enabled {
        let token = config
            .remote_token
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("REMOTE_TOKEN must be set when REMOTE_ENABLED"))?;
        let owner = config
            .remote_owner
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("REMOTE_OWNER must be set when REMOTE_ENABLED"))?;
        let client = HttpRemoteClient::new(&config.remote_api_base, token, owner)?;
        tracing::info!(
            api_base = %config.remote_api_base,
            owner = %owner,
            branch = %config.remote_branch,
            "Remote publishing enabled"
        );
        Some(RemotePublisher::new(
            Arc::new(client),
            &config.remote_branch,
            config.remote_default_private,
        ))
    } else {
        tracing::info!("Remote publishing disabled; uploads stage locally only");
        None
    };

    let state = AppState::new(config, projects, publisher);
    let router = routes::setup_routes(&state.config, state.clone())?;
    Ok((state, router))
}
