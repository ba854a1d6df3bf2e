//! Cross-project dependency manager.
//!
//! Module projects in the stand's group declare their in-group dependencies
//! in `pyproject.toml` as `name @ git+<repo_url>@main` pins. This module
//! keeps those pins in sync: once at bootstrap, and again whenever Nexus
//! reports a new release of one of the packages.

use std::collections::HashMap;
use std::sync::Arc;
use toml_edit::{Array, DocumentMut, value};
use tracing::{error, info, warn};

use crate::error::Result;
use crate::gitlab::GitLabApi;
use crate::webhook::PackageRelease;

const PYPROJECT_PATH: &str = "pyproject.toml";
const DEFAULT_BRANCH: &str = "main";

/// What the manager knows about one project in the group.
#[derive(Debug, Clone)]
pub struct ProjectInfo {
    pub name: String,
    pub repo_url: String,
    pub dependencies: Vec<String>,
}

pub struct DependencyManager {
    api: Arc<GitLabApi>,
    group_id: u64,
    projects: HashMap<u64, ProjectInfo>,
}

impl DependencyManager {
    /// Load every project in the group along with its declared dependencies.
    pub async fn load(api: Arc<GitLabApi>, group_id: u64) -> Result<Self> {
        let group_projects = api.group_projects(group_id).await?;
        let mut projects = HashMap::new();

        for project in group_projects {
            let dependencies =
                match api.get_repository_file(project.id, PYPROJECT_PATH, DEFAULT_BRANCH).await? {
                    Some(content) => parse_dependency_names(&content),
                    None => {
                        warn!(
                            "pyproject.toml not found in '{}', id={}",
                            project.name, project.id
                        );
                        Vec::new()
                    }
                };

            projects.insert(
                project.id,
                ProjectInfo {
                    name: project.name,
                    repo_url: project.http_url_to_repo,
                    dependencies,
                },
            );
        }

        info!("Loaded {} projects from group {}", projects.len(), group_id);

        Ok(Self {
            api,
            group_id,
            projects,
        })
    }

    pub fn project_count(&self) -> usize {
        self.projects.len()
    }

    fn find_dependency_url(&self, dep_name: &str) -> Option<&str> {
        self.projects
            .values()
            .find(|info| info.name == dep_name)
            .map(|info| info.repo_url.as_str())
    }

    /// Set a freshly created project's dependency list and commit the
    /// rewritten `pyproject.toml`.
    pub async fn init_project_dependencies(
        &mut self,
        project_id: u64,
        dependencies: Vec<String>,
    ) -> Result<()> {
        if let Some(info) = self.projects.get_mut(&project_id) {
            info.dependencies = dependencies;
        } else {
            warn!("Project id={} is not in group {}", project_id, self.group_id);
            return Ok(());
        }

        self.commit_pins(project_id, "Update dependencies from config")
            .await
    }

    /// React to a new package release: re-pin the dependency in every group
    /// project that declares it. Per-project failures are logged and skipped
    /// so one broken project does not stall the sweep.
    pub async fn update_for_release(&mut self, release: &PackageRelease) -> usize {
        let dependents: Vec<u64> = self
            .projects
            .iter()
            .filter(|(_, info)| {
                info.dependencies.iter().any(|d| d == &release.package_name)
            })
            .map(|(id, _)| *id)
            .collect();

        if dependents.is_empty() {
            info!(
                "No projects in group {} depend on '{}'",
                self.group_id, release.package_name
            );
            return 0;
        }

        let message = format!(
            "Update {} to {}",
            release.package_name, release.version
        );
        let mut updated = 0;

        for project_id in dependents {
            match self.commit_pins(project_id, &message).await {
                Ok(()) => updated += 1,
                Err(e) => {
                    error!(
                        "Failed to update project id={} for '{}': {}",
                        project_id, release.package_name, e
                    );
                }
            }
        }

        updated
    }

    async fn commit_pins(&self, project_id: u64, message: &str) -> Result<()> {
        let info = match self.projects.get(&project_id) {
            Some(info) => info,
            None => return Ok(()),
        };

        let current = self
            .api
            .get_repository_file(project_id, PYPROJECT_PATH, DEFAULT_BRANCH)
            .await?;
        let Some(content) = current else {
            warn!("pyproject.toml for project id={} is missing, skipping", project_id);
            return Ok(());
        };

        let pins: Vec<(String, Option<String>)> = info
            .dependencies
            .iter()
            .map(|dep| {
                (
                    dep.clone(),
                    self.find_dependency_url(dep).map(String::from),
                )
            })
            .collect();

        let updated = match rewrite_dependencies(&content, &info.name, &pins) {
            Ok(updated) => updated,
            Err(e) => {
                warn!(
                    "pyproject.toml for project id={} is not valid TOML: {}",
                    project_id, e
                );
                return Ok(());
            }
        };

        self.api
            .commit_file_update(project_id, DEFAULT_BRANCH, message, PYPROJECT_PATH, &updated)
            .await?;
        Ok(())
    }
}

/// Pull the base dependency names out of a `pyproject.toml`, stripping any
/// `@ git+...` source part.
pub fn parse_dependency_names(content: &str) -> Vec<String> {
    let doc: DocumentMut = match content.parse() {
        Ok(doc) => doc,
        Err(_) => return Vec::new(),
    };

    doc.get("project")
        .and_then(|p| p.get("dependencies"))
        .and_then(|d| d.as_array())
        .map(|deps| {
            deps.iter()
                .filter_map(|dep| dep.as_str())
                .map(|dep| dep.split('@').next().unwrap_or(dep).trim().to_string())
                .collect()
        })
        .unwrap_or_default()
}

/// Rewrite `project.name` and `project.dependencies` in place, keeping the
/// rest of the document untouched. Dependencies without a resolved repo URL
/// are dropped with a warning.
pub fn rewrite_dependencies(
    content: &str,
    project_name: &str,
    pins: &[(String, Option<String>)],
) -> std::result::Result<String, toml_edit::TomlError> {
    let mut doc: DocumentMut = content.parse()?;

    doc["project"]["name"] = value(project_name);

    let mut deps = Array::new();
    for (dep_name, repo_url) in pins {
        match repo_url {
            Some(url) => {
                deps.push(format!("{} @ git+{}@{}", dep_name, url, DEFAULT_BRANCH));
            }
            None => {
                warn!("Dependency '{}' not found in group", dep_name);
            }
        }
    }
    doc["project"]["dependencies"] = value(deps);

    Ok(doc.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"[project]
name = "template"
version = "0.1.0"
dependencies = [
    "demo-core @ git+http://gitlab/demo/demo-core.git@main",
    "requests",
]

[build-system]
requires = ["hatchling"]
"#;

    #[test]
    fn parses_base_dependency_names() {
        let names = parse_dependency_names(SAMPLE);
        assert_eq!(names, vec!["demo-core".to_string(), "requests".to_string()]);
    }

    #[test]
    fn unparseable_content_yields_no_dependencies() {
        assert!(parse_dependency_names("not toml [[").is_empty());
    }

    #[test]
    fn rewrites_name_and_pins() {
        let pins = vec![(
            "demo-core".to_string(),
            Some("http://gitlab/demo/demo-core.git".to_string()),
        )];
        let updated = rewrite_dependencies(SAMPLE, "demo-api", &pins).unwrap();

        assert!(updated.contains(r#"name = "demo-api""#));
        assert!(updated.contains("demo-core @ git+http://gitlab/demo/demo-core.git@main"));
        // unrelated tables survive the rewrite
        assert!(updated.contains("[build-system]"));
        assert!(updated.contains(r#"version = "0.1.0""#));
    }

    #[test]
    fn unresolved_dependencies_are_dropped() {
        let pins = vec![("ghost".to_string(), None)];
        let updated = rewrite_dependencies(SAMPLE, "demo-api", &pins).unwrap();
        assert!(!updated.contains("ghost"));
    }
}
