//! Project bootstrap orchestration for the `project-setup` binary.

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::{ModuleConfig, StandConfig};
use crate::deps::DependencyManager;
use crate::error::{Result, StandError};
use crate::gitlab::{GitLabApi, MAINTAINER_ACCESS_LEVEL, Project};

/// A module project that was successfully created from the template.
#[derive(Debug, Clone)]
pub struct CreatedModule {
    pub project_id: u64,
    pub name: String,
    pub dependencies: Vec<String>,
}

pub struct ProjectCreator {
    api: Arc<GitLabApi>,
    user_id: Option<u64>,
}

impl ProjectCreator {
    pub fn new(api: Arc<GitLabApi>, user_id: Option<u64>) -> Self {
        Self { api, user_id }
    }

    /// Create one project from the template. With no group, the project
    /// lands in the token user's own namespace.
    pub async fn create_project_from_template(
        &self,
        template_id: u64,
        project_name: &str,
        group_id: Option<u64>,
    ) -> Result<Project> {
        let namespace_id = match group_id {
            Some(id) => Some(id),
            None => self.api.user_namespace_id().await?,
        };

        self.api
            .create_project_from_template(template_id, project_name, namespace_id)
            .await
    }

    /// Bootstrap the whole stand from a config file: resolve or create the
    /// group, create every module from the template, then write the
    /// cross-module dependency pins. Returns the number of modules created.
    pub async fn bootstrap_stand(&self, config: &StandConfig) -> Result<usize> {
        let group_id = self.resolve_group(config).await?;

        self.add_user_to_group(group_id).await;

        let created = self
            .create_modules(config.template_id, &config.module, group_id)
            .await;

        if created.is_empty() {
            return Err(StandError::ConfigError(
                "No modules were created".to_string(),
            ));
        }

        self.write_dependency_pins(group_id, &created).await?;

        Ok(created.len())
    }

    async fn resolve_group(&self, config: &StandConfig) -> Result<u64> {
        if let Some(group_id) = config.group_id {
            let group = self.api.get_group(group_id).await?;
            info!("Using existing group '{}', id={}", group.name, group.id);
            return Ok(group.id);
        }

        // load_stand_config guarantees one of the two is present
        let group_name = config.group_name.as_deref().ok_or_else(|| {
            StandError::ConfigError("stand config needs either group_id or group_name".to_string())
        })?;

        let group = self.api.create_group(group_name, &config.visibility).await?;
        Ok(group.id)
    }

    /// Membership failure is not fatal: the structure still gets created,
    /// the user just cannot push to the projects afterwards.
    async fn add_user_to_group(&self, group_id: u64) {
        let Some(user_id) = self.user_id else {
            warn!("GITLAB_USER_ID not set, skipping group membership");
            return;
        };

        if let Err(e) = self
            .api
            .add_group_member(group_id, user_id, MAINTAINER_ACCESS_LEVEL)
            .await
        {
            warn!(
                "Failed to add user {} to group id={}: {}. \
                 The structure will be created, but the projects will not be modified.",
                user_id, group_id, e
            );
        }
    }

    async fn create_modules(
        &self,
        template_id: u64,
        modules: &[ModuleConfig],
        group_id: u64,
    ) -> Vec<CreatedModule> {
        let mut created = Vec::new();

        for module in modules {
            info!("Creating module: {}", module.name);

            match self
                .api
                .create_project_from_template(template_id, &module.name, Some(group_id))
                .await
            {
                Ok(project) => {
                    created.push(CreatedModule {
                        project_id: project.id,
                        name: module.name.clone(),
                        dependencies: module.dependencies.clone(),
                    });
                    info!("Created module: {}", module.name);
                }
                Err(e) => {
                    error!("Failed to create module '{}': {}", module.name, e);
                }
            }
        }

        created
    }

    async fn write_dependency_pins(
        &self,
        group_id: u64,
        modules: &[CreatedModule],
    ) -> Result<()> {
        let mut manager = DependencyManager::load(Arc::clone(&self.api), group_id).await?;

        for module in modules {
            manager
                .init_project_dependencies(module.project_id, module.dependencies.clone())
                .await?;
        }

        info!("All dependencies updated");
        Ok(())
    }
}
