//! Project management.
//!
//! A project is nothing more than a directory directly under the storage root. There is no
//! metadata file: a project exists exactly when its directory does.

use crate::config::CoreConfig;
use crate::helpers::remove_dir_if_exists;
use crate::resolver::PathResolver;
use crate::{StoreError, StoreResult};
use std::io::ErrorKind;
use std::sync::Arc;
use tokio::fs;

/// Service for creating, listing and deleting projects.
#[derive(Clone, Debug)]
pub struct ProjectService {
    resolver: PathResolver,
}

impl ProjectService {
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        Self {
            resolver: PathResolver::new(cfg.storage_root()),
        }
    }

    /// Ensures the project directory exists. Creating an existing project succeeds.
    ///
    /// # Errors
    ///
    /// - [`StoreError::InvalidArgument`] / [`StoreError::PathEscape`] for an unusable name.
    /// - [`StoreError::DirCreation`] if the directory cannot be created.
    pub async fn create_project(&self, name: &str) -> StoreResult<()> {
        let project_dir = self.resolver.project_dir(name).await?;
        fs::create_dir_all(&project_dir)
            .await
            .map_err(StoreError::DirCreation)?;

        tracing::info!("project ready: {}", project_dir.display());
        Ok(())
    }

    /// Lists project names (directories under the root), sorted.
    ///
    /// A missing root yields an empty list. An unreadable root is logged and also yields an
    /// empty list.
    pub async fn list_projects(&self) -> Vec<String> {
        let root = self.resolver.root();
        let mut entries = match fs::read_dir(root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("storage root {} does not exist yet", root.display());
                return Vec::new();
            }
            Err(e) => {
                tracing::warn!("failed to read storage root {}: {}", root.display(), e);
                return Vec::new();
            }
        };

        let mut projects = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("failed to read entry in {}: {}", root.display(), e);
                    break;
                }
            };

            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir {
                continue;
            }

            match entry.file_name().into_string() {
                Ok(name) => projects.push(name),
                Err(name) => tracing::warn!("skipping non UTF-8 project directory {:?}", name),
            }
        }

        projects.sort();
        projects
    }

    /// Recursively removes the project directory. Deleting a missing project succeeds.
    pub async fn delete_project(&self, name: &str) -> StoreResult<()> {
        let project_dir = self.resolver.project_dir(name).await?;
        if remove_dir_if_exists(&project_dir).await? {
            tracing::info!("deleted project: {}", project_dir.display());
        } else {
            tracing::debug!("project already absent: {}", project_dir.display());
        }
        Ok(())
    }
}
