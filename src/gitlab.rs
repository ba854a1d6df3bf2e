//! Typed client for the slice of the GitLab REST API the stand uses.
//!
//! "Create from template" on GitLab is fork-and-detach: fork the template
//! project under the target namespace, then remove the fork relationship so
//! the new project stands alone.

use base64::{Engine, prelude::BASE64_STANDARD};
use reqwest::{
    Client, StatusCode,
    header::{HeaderMap, HeaderValue},
};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::GitLabConfig;
use crate::error::{Result, StandError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Maintainer access, the level module projects are shared at.
pub const MAINTAINER_ACCESS_LEVEL: u8 = 40;

/// A GitLab project, reduced to the fields the stand cares about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: u64,
    pub name: String,
    pub web_url: String,
    pub http_url_to_repo: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Group {
    pub id: u64,
    pub name: String,
    pub web_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CurrentUser {
    pub id: u64,
    pub username: String,
    pub namespace_id: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Commit {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Serialize)]
struct ForkProjectRequest<'a> {
    name: &'a str,
    path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RepositoryFile {
    content: String,
}

/// Turn a human project name into a GitLab path slug.
pub fn path_slug(name: &str) -> String {
    name.to_lowercase().replace(' ', "-")
}

pub struct GitLabApi {
    api_url: String,
    client: Client,
}

impl GitLabApi {
    pub fn new(config: &GitLabConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let token_value =
            HeaderValue::from_str(&format!("Bearer {}", config.token.expose_secret()))
                .map_err(|_| StandError::ConfigError("GITLAB_ACCESS_TOKEN is not a valid header value".to_string()))?;
        headers.insert("Authorization", token_value);

        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(REQUEST_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            api_url: format!("{}/api/v4", config.base_url),
            client,
        })
    }

    /// GET /user. Used by both binaries to fail fast on a bad token or an
    /// unreachable host before doing anything else.
    pub async fn check_connection(&self) -> Result<CurrentUser> {
        let response = self
            .client
            .get(format!("{}/user", self.api_url))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(map_api_error(status, message));
        }

        let user: CurrentUser = response.json().await?;
        info!("Connected to GitLab as '{}'", user.username);
        Ok(user)
    }

    /// Namespace id of the token's user, for project creation outside a group.
    pub async fn user_namespace_id(&self) -> Result<Option<u64>> {
        Ok(self.check_connection().await?.namespace_id)
    }

    /// Create a new project named `name` from the template project
    /// `template_id`. Not idempotent: a second call with the same name fails
    /// with `NameConflict` and leaves the first project untouched.
    pub async fn create_project_from_template(
        &self,
        template_id: u64,
        name: &str,
        namespace_id: Option<u64>,
    ) -> Result<Project> {
        let body = ForkProjectRequest {
            name,
            path: path_slug(name),
            namespace_id,
        };

        let response = self
            .client
            .post(format!("{}/projects/{}/fork", self.api_url, template_id))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            error!(
                "Failed to create '{}' from template {}: {} {}",
                name, template_id, status, message
            );
            return Err(StandError::from_status(status, message, template_id, name));
        }

        let project: Project = response.json().await?;
        info!("'{}' created from template: {}", name, project.web_url);

        // Detach from the template so the new project is not a fork.
        // Best-effort: a leftover fork relationship is cosmetic.
        self.remove_fork(project.id).await;

        Ok(project)
    }

    async fn remove_fork(&self, project_id: u64) {
        let result = self
            .client
            .delete(format!("{}/projects/{}/fork", self.api_url, project_id))
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                info!("Fork relationship removed for project id={}", project_id);
            }
            Ok(response) => {
                debug!(
                    "Could not remove fork for project id={}: {}",
                    project_id,
                    response.status()
                );
            }
            Err(e) => {
                debug!("Could not remove fork for project id={}: {}", project_id, e);
            }
        }
    }

    pub async fn create_group(&self, name: &str, visibility: &str) -> Result<Group> {
        let response = self
            .client
            .post(format!("{}/groups", self.api_url))
            .json(&json!({
                "name": name,
                "path": path_slug(name),
                "visibility": visibility,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(map_api_error(status, message));
        }

        let group: Group = response.json().await?;
        info!("Group created: {}, id={}", group.web_url, group.id);
        Ok(group)
    }

    pub async fn get_group(&self, group_id: u64) -> Result<Group> {
        let response = self
            .client
            .get(format!("{}/groups/{}", self.api_url, group_id))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(map_api_error(status, message));
        }

        Ok(response.json().await?)
    }

    pub async fn add_group_member(
        &self,
        group_id: u64,
        user_id: u64,
        access_level: u8,
    ) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/groups/{}/members", self.api_url, group_id))
            .json(&json!({
                "user_id": user_id,
                "access_level": access_level,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(map_api_error(status, message));
        }

        info!("Added user {} to group {}", user_id, group_id);
        Ok(())
    }

    pub async fn group_projects(&self, group_id: u64) -> Result<Vec<Project>> {
        let response = self
            .client
            .get(format!("{}/groups/{}/projects", self.api_url, group_id))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(map_api_error(status, message));
        }

        Ok(response.json().await?)
    }

    /// Fetch a repository file's decoded content, or None if the file does
    /// not exist on the given ref (or its content fails to decode).
    pub async fn get_repository_file(
        &self,
        project_id: u64,
        file_path: &str,
        git_ref: &str,
    ) -> Result<Option<String>> {
        let encoded_path = file_path.replace('/', "%2F");
        let response = self
            .client
            .get(format!(
                "{}/projects/{}/repository/files/{}",
                self.api_url, project_id, encoded_path
            ))
            .query(&[("ref", git_ref)])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(map_api_error(status, message));
        }

        let file: RepositoryFile = response.json().await?;
        match BASE64_STANDARD.decode(file.content.trim()) {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(content) => Ok(Some(content)),
                Err(_) => {
                    warn!(
                        "{} in project id={} is not valid UTF-8",
                        file_path, project_id
                    );
                    Ok(None)
                }
            },
            Err(e) => {
                warn!(
                    "Could not decode {} from project id={}: {}",
                    file_path, project_id, e
                );
                Ok(None)
            }
        }
    }

    /// Commit a single-file update to `branch`.
    pub async fn commit_file_update(
        &self,
        project_id: u64,
        branch: &str,
        message: &str,
        file_path: &str,
        content: &str,
    ) -> Result<Commit> {
        let response = self
            .client
            .post(format!(
                "{}/projects/{}/repository/commits",
                self.api_url, project_id
            ))
            .json(&json!({
                "branch": branch,
                "commit_message": message,
                "actions": [{
                    "action": "update",
                    "file_path": file_path,
                    "content": content,
                }],
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(map_api_error(status, message));
        }

        let commit: Commit = response.json().await?;
        info!(
            "Created commit in project id={}: {} - {}",
            project_id, commit.id, commit.title
        );
        Ok(commit)
    }
}

/// Error mapping for everything except project creation: auth failures get
/// their own kind, the rest carry status and body.
fn map_api_error(status: StatusCode, message: String) -> StandError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StandError::AuthenticationFailed,
        _ => StandError::Api {
            status: status.as_u16(),
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugifies_project_names() {
        assert_eq!(path_slug("Demo Project"), "demo-project");
        assert_eq!(path_slug("demo-1"), "demo-1");
    }

    #[test]
    fn fork_request_omits_missing_namespace() {
        let body = ForkProjectRequest {
            name: "demo-1",
            path: path_slug("demo-1"),
            namespace_id: None,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["name"], "demo-1");
        assert_eq!(value["path"], "demo-1");
        assert!(value.get("namespace_id").is_none());
    }

    #[test]
    fn fork_request_includes_namespace_when_set() {
        let body = ForkProjectRequest {
            name: "Demo Project",
            path: path_slug("Demo Project"),
            namespace_id: Some(7),
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["path"], "demo-project");
        assert_eq!(value["namespace_id"], 7);
    }

    #[test]
    fn auth_errors_keep_their_kind_for_all_operations() {
        assert!(matches!(
            map_api_error(StatusCode::UNAUTHORIZED, "nope".into()),
            StandError::AuthenticationFailed
        ));
        assert!(matches!(
            map_api_error(StatusCode::BAD_GATEWAY, "proxy".into()),
            StandError::Api { status: 502, .. }
        ));
    }
}
