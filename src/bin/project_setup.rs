//! One-shot administrative tool: create GitLab projects from a template.
//!
//! With a `stand_config.toml` present it bootstraps the whole stand (group +
//! module projects + dependency pins); otherwise it creates the single
//! project named by `PROJECT_NAME` from `GITLAB_TEMPLATE_ID`. All failures
//! exit non-zero; the operator re-runs after fixing the cause.

use std::path::Path;
use std::sync::Arc;
use tracing::info;

use nexus_gitlab_stand::config::{
    self, DEFAULT_STAND_CONFIG_PATH, GitLabConfig, SetupEnv, load_stand_config,
};
use nexus_gitlab_stand::error::Result;
use nexus_gitlab_stand::gitlab::GitLabApi;
use nexus_gitlab_stand::logging;
use nexus_gitlab_stand::setup::ProjectCreator;

async fn run() -> Result<()> {
    let gitlab_config = GitLabConfig::from_env()?;
    let api = Arc::new(GitLabApi::new(&gitlab_config)?);
    api.check_connection().await?;

    let creator = ProjectCreator::new(Arc::clone(&api), gitlab_config.user_id);

    let config_path = config::optional_env("STAND_CONFIG")
        .unwrap_or_else(|| DEFAULT_STAND_CONFIG_PATH.to_string());

    if Path::new(&config_path).exists() {
        let stand_config = load_stand_config(Path::new(&config_path))?;
        let created = creator.bootstrap_stand(&stand_config).await?;
        info!("Created and configured {} modules", created);
    } else {
        let setup = SetupEnv::from_env()?;
        let project = creator
            .create_project_from_template(
                setup.template_id,
                &setup.project_name,
                gitlab_config.group_id,
            )
            .await?;
        info!("Project creation completed successfully: {}", project.web_url);
        println!("id={} url={}", project.id, project.web_url);
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    logging::init();

    if let Err(e) = run().await {
        eprintln!("Project setup failed: {}", e);
        std::process::exit(1);
    }
}
