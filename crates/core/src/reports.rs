//! Report records.
//!
//! Each report is stored as one self-contained JSON document: the caller's content fields at
//! the top level plus a reserved `_metadata` field.
//!
//! ```json
//! {
//!   "x": 1,
//!   "_metadata": {
//!     "name": "run1",
//!     "createdAt": "2024-05-01T10:00:00.000000000Z",
//!     "updatedAt": "2024-05-01T10:00:00.000000000Z"
//!   }
//! }
//! ```
//!
//! Records are written through a staged temp file, so a reader never observes a partially
//! written record. Creation publishes the record with a no-clobber link, so two concurrent
//! creates of the same name cannot both succeed.

use crate::config::CoreConfig;
use crate::constants::{METADATA_FIELD, RECORD_EXTENSION};
use crate::helpers::{create_atomic, remove_dir_if_exists, write_atomic};
use crate::locks::ReportLocks;
use crate::resolver::{validate_report_name, PathResolver};
use crate::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;

/// Caller-supplied report content: an arbitrary JSON object.
pub type ReportContent = serde_json::Map<String, serde_json::Value>;

/// Bookkeeping attached to every report record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetadata {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A full report record as persisted: content plus metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReportRecord {
    #[serde(flatten)]
    pub content: ReportContent,
    #[serde(rename = "_metadata")]
    pub metadata: ReportMetadata,
}

impl ReportRecord {
    fn new(mut content: ReportContent, metadata: ReportMetadata) -> Self {
        if content.remove(METADATA_FIELD).is_some() {
            tracing::debug!(
                "discarding caller-supplied {} for report {}",
                METADATA_FIELD,
                metadata.name
            );
        }
        Self { content, metadata }
    }

    fn to_json(&self) -> StoreResult<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(StoreError::Serialization)
    }
}

/// Service for report record CRUD within a project.
#[derive(Clone, Debug)]
pub struct ReportService {
    resolver: PathResolver,
    locks: ReportLocks,
}

impl ReportService {
    pub fn new(cfg: Arc<CoreConfig>, locks: ReportLocks) -> Self {
        Self {
            resolver: PathResolver::new(cfg.storage_root()),
            locks,
        }
    }

    /// Creates a new report record.
    ///
    /// The project's `reports/` directory is created if needed.
    ///
    /// # Errors
    ///
    /// - [`StoreError::AlreadyExists`] if a record with this name exists; it is left untouched.
    /// - [`StoreError::InvalidArgument`] / [`StoreError::PathEscape`] for unusable names.
    pub async fn create_report(
        &self,
        project: &str,
        name: &str,
        content: ReportContent,
    ) -> StoreResult<ReportMetadata> {
        let record_path = self.resolver.report_record_path(project, name).await?;
        let reports_dir = self.resolver.reports_dir(project).await?;

        let _guard = self.locks.lock(project, name).await;

        fs::create_dir_all(&reports_dir)
            .await
            .map_err(StoreError::DirCreation)?;

        let now = Utc::now();
        let record = ReportRecord::new(
            content,
            ReportMetadata {
                name: name.to_string(),
                created_at: now,
                updated_at: now,
            },
        );

        if !create_atomic(&record_path, &record.to_json()?).await? {
            return Err(StoreError::AlreadyExists(format!("{project}/{name}")));
        }

        tracing::info!("created report {}/{}", project, name);
        Ok(record.metadata)
    }

    /// Lists the metadata of every readable report in the project, sorted by name.
    ///
    /// A missing or unreadable `reports/` directory yields an empty list. Records that cannot
    /// be read or parsed are logged and skipped.
    pub async fn list_reports(&self, project: &str) -> StoreResult<Vec<ReportMetadata>> {
        let reports_dir = self.resolver.reports_dir(project).await?;

        let mut entries = match fs::read_dir(&reports_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("no reports directory at {}", reports_dir.display());
                return Ok(Vec::new());
            }
            Err(e) => {
                tracing::warn!(
                    "failed to read reports directory {}: {}",
                    reports_dir.display(),
                    e
                );
                return Ok(Vec::new());
            }
        };

        let mut reports = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("failed to read entry in {}: {}", reports_dir.display(), e);
                    break;
                }
            };

            let path = entry.path();
            let Some(name) = record_name(&path) else {
                continue;
            };
            if entry.file_type().await.map(|t| !t.is_file()).unwrap_or(true) {
                continue;
            }

            match read_record(&path, &name).await {
                Ok(record) => reports.push(record.metadata),
                Err(e) => tracing::warn!("skipping report record {}: {}", path.display(), e),
            }
        }

        reports.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(reports)
    }

    /// Returns the full record (content and metadata).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the record is absent or unreadable.
    pub async fn get_report(&self, project: &str, name: &str) -> StoreResult<ReportRecord> {
        let record_path = self.resolver.report_record_path(project, name).await?;
        read_record(&record_path, name).await
    }

    /// Replaces the content of an existing report wholesale.
    ///
    /// `createdAt` is preserved; `updatedAt` becomes the current time, never earlier than the
    /// previous `updatedAt`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no record exists.
    pub async fn update_report(
        &self,
        project: &str,
        name: &str,
        content: ReportContent,
    ) -> StoreResult<ReportMetadata> {
        let record_path = self.resolver.report_record_path(project, name).await?;

        let _guard = self.locks.lock(project, name).await;

        let existing = read_record(&record_path, name).await?;
        let updated_at = Utc::now()
            .max(existing.metadata.updated_at)
            .max(existing.metadata.created_at);

        let record = ReportRecord::new(
            content,
            ReportMetadata {
                name: name.to_string(),
                created_at: existing.metadata.created_at,
                updated_at,
            },
        );

        write_atomic(&record_path, &record.to_json()?).await?;

        tracing::info!("updated report {}/{}", project, name);
        Ok(record.metadata)
    }

    /// Deletes the report record together with its raw-results and rendered directories.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no record exists.
    pub async fn delete_report(&self, project: &str, name: &str) -> StoreResult<()> {
        let record_path = self.resolver.report_record_path(project, name).await?;
        let report_dir = self.resolver.report_dir(project, name).await?;

        let _guard = self.locks.lock(project, name).await;

        match fs::remove_file(&record_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(format!("{project}/{name}")));
            }
            Err(e) => return Err(StoreError::Removal(e)),
        }

        if remove_dir_if_exists(&report_dir).await? {
            tracing::debug!("removed report artefacts at {}", report_dir.display());
        }

        tracing::info!("deleted report {}/{}", project, name);
        Ok(())
    }
}

/// Report name for a `<name>.json` record path, if the path looks like one.
fn record_name(path: &Path) -> Option<String> {
    let file_name = path.file_name()?.to_str()?;
    let stem = file_name.strip_suffix(&format!(".{RECORD_EXTENSION}"))?;
    validate_report_name(stem).ok()?;
    Some(stem.to_string())
}

async fn read_record(path: &Path, name: &str) -> StoreResult<ReportRecord> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!("failed to read report record {}: {}", path.display(), e);
            }
            return Err(StoreError::NotFound(format!("report {name}")));
        }
    };

    let mut record: ReportRecord = serde_json::from_slice(&bytes).map_err(|e| {
        tracing::warn!("failed to parse report record {}: {}", path.display(), e);
        StoreError::NotFound(format!("report {name}"))
    })?;

    if record.metadata.name != name {
        tracing::warn!(
            "report record {} names itself '{}'; using '{}'",
            path.display(),
            record.metadata.name,
            name
        );
        record.metadata.name = name.to_string();
    }

    Ok(record)
}
