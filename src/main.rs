use axum::{Router, routing};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use nexus_gitlab_stand::api::{handle_nexus_webhook, queue_status, root, status};
use nexus_gitlab_stand::config::{self, GitLabConfig, ServerConfig};
use nexus_gitlab_stand::deps::DependencyManager;
use nexus_gitlab_stand::error::{Result, StandError};
use nexus_gitlab_stand::gitlab::GitLabApi;
use nexus_gitlab_stand::queue::{
    DependencyUpdateHandler, LogOnlyHandler, ReleaseHandler, ReleaseQueue,
};
use nexus_gitlab_stand::{AppState, logging};

/// Decide what the release worker does with queued events. With a group
/// configured, releases trigger a dependency sweep over that group;
/// otherwise they are only logged.
async fn build_release_handler() -> Result<Arc<dyn ReleaseHandler>> {
    if config::optional_env("GITLAB_GROUP_ID").is_none() {
        info!("GITLAB_GROUP_ID not set; webhook events will only be logged");
        return Ok(Arc::new(LogOnlyHandler));
    }

    let gitlab_config = GitLabConfig::from_env()?;
    let api = Arc::new(GitLabApi::new(&gitlab_config)?);
    api.check_connection().await?;

    let group_id = gitlab_config
        .group_id
        .ok_or_else(|| StandError::MissingEnv("GITLAB_GROUP_ID".to_string()))?;

    let manager = DependencyManager::load(api, group_id).await?;
    info!(
        "Dependency worker ready: {} project(s) in group {}",
        manager.project_count(),
        group_id
    );

    Ok(Arc::new(DependencyUpdateHandler::new(manager)))
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    logging::init();

    let server_config = ServerConfig::from_env();

    let handler = match build_release_handler().await {
        Ok(handler) => handler,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let state = Arc::new(AppState {
        config: server_config.clone(),
        queue: ReleaseQueue::start(handler),
        start_time: Instant::now(),
        started_at: Utc::now(),
    });

    let app = Router::new()
        .route("/", routing::get(root))
        .route("/webhook/nexus", routing::post(handle_nexus_webhook))
        .route("/queue-status", routing::get(queue_status))
        .route("/status", routing::get(status))
        .with_state(state);

    info!("Listening on {}", server_config.bind_address);
    let listener = tokio::net::TcpListener::bind(&server_config.bind_address)
        .await
        .unwrap();
    axum::serve(listener, app).await.unwrap();
}
