//! Workspace projects
//! Finds the open ABAP project, and with it the active backend destination

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::bridge::types::Destination;

const ABAP_KIND: &str = "abap";

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("cannot read workspace file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid workspace file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Project entry of the workspace file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub name: String,
    pub destination: String,
    #[serde(default = "default_open")]
    pub open: bool,
    #[serde(default = "default_kind")]
    pub kind: String,
}

impl Project {
    pub fn is_adt_project(&self) -> bool {
        self.open && self.kind.eq_ignore_ascii_case(ABAP_KIND)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorkspaceFile {
    #[serde(default)]
    pub projects: Vec<Project>,
}

fn default_open() -> bool { true }
fn default_kind() -> String { ABAP_KIND.to_string() }

/// Source of the single active backend destination
#[async_trait]
pub trait DestinationDiscovery: Send + Sync {
    /// Current destination, or `None` when no ABAP project is open.
    /// Called once per request; implementations must not cache.
    async fn resolve_destination(&self) -> Result<Option<Destination>, WorkspaceError>;
}

/// Workspace state kept in a TOML file that other tools may rewrite at any time
pub struct Workspace {
    path: PathBuf,
}

impl Workspace {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the workspace file; a missing file is an empty workspace
    pub async fn load(&self) -> Result<WorkspaceFile, WorkspaceError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(WorkspaceFile::default());
            }
            Err(source) => {
                return Err(WorkspaceError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        toml::from_str(&content).map_err(|source| WorkspaceError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>, WorkspaceError> {
        Ok(self.load().await?.projects)
    }

    /// First open ABAP project, in file order
    pub async fn find_adt_project(&self) -> Result<Option<Project>, WorkspaceError> {
        let projects = self.list_projects().await?;
        Ok(projects.into_iter().find(Project::is_adt_project))
    }
}

#[async_trait]
impl DestinationDiscovery for Workspace {
    async fn resolve_destination(&self) -> Result<Option<Destination>, WorkspaceError> {
        let project = self.find_adt_project().await?;
        Ok(project.map(|p| Destination {
            id: p.destination,
            project: p.name,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace_with(content: &str) -> (tempfile::TempDir, Workspace) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workspace.toml");
        std::fs::write(&path, content).unwrap();
        (dir, Workspace::new(path))
    }

    #[tokio::test]
    async fn test_missing_file_means_no_projects() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(dir.path().join("absent.toml"));

        assert!(workspace.list_projects().await.unwrap().is_empty());
        assert_eq!(workspace.resolve_destination().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_first_open_abap_project_wins() {
        let (_dir, workspace) = workspace_with(
            r#"
[[projects]]
name = "docs"
destination = "NONE"
kind = "general"

[[projects]]
name = "DEV_100_closed"
destination = "DEV_100"
open = false

[[projects]]
name = "QAS_200_developer_en"
destination = "QAS_200"

[[projects]]
name = "PRD_300_developer_en"
destination = "PRD_300"
"#,
        );

        let destination = workspace.resolve_destination().await.unwrap().unwrap();
        assert_eq!(destination.id, "QAS_200");
        assert_eq!(destination.project, "QAS_200_developer_en");
        assert_eq!(workspace.list_projects().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_changes_are_seen_without_restart() {
        let (dir, workspace) = workspace_with("");
        assert_eq!(workspace.resolve_destination().await.unwrap(), None);

        std::fs::write(
            dir.path().join("workspace.toml"),
            "[[projects]]\nname = \"DEV\"\ndestination = \"DEV_100\"\n",
        )
        .unwrap();

        let destination = workspace.resolve_destination().await.unwrap().unwrap();
        assert_eq!(destination.id, "DEV_100");
    }

    #[tokio::test]
    async fn test_invalid_file_is_an_error() {
        let (_dir, workspace) = workspace_with("[[projects]]\nname = 42\n");
        let err = workspace.resolve_destination().await.unwrap_err();
        assert!(matches!(err, WorkspaceError::Parse { .. }));
    }
}
