//! Raw result uploads.
//!
//! Uploaded files land flat in the report's `allure-results/` directory under their
//! caller-supplied names. Every name is validated as a single path segment before anything is
//! written, so one bad name rejects the whole batch with no partial writes. Re-uploading a name
//! replaces the earlier file.

use crate::config::CoreConfig;
use crate::constants::{RAW_RESULTS_DIR_NAME, REPORTS_DIR_NAME};
use crate::helpers::write_atomic;
use crate::locks::ReportLocks;
use crate::resolver::{ensure_contained, PathResolver};
use crate::{StoreError, StoreResult};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::fs;

/// One named blob to be stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadFile {
    pub filename: String,
    pub content: Vec<u8>,
}

impl UploadFile {
    pub fn new(filename: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
        }
    }
}

/// Description of a stored upload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub filename: String,
    /// Location relative to the project directory: `reports/<report>/allure-results/<file>`.
    pub path: String,
    pub size_bytes: u64,
    /// Hex SHA-256 digest of the stored bytes.
    pub sha256: String,
    /// Best-effort media type sniffed from the content.
    pub media_type: Option<String>,
}

/// Service persisting uploaded raw results into a report.
#[derive(Clone, Debug)]
pub struct UploadService {
    resolver: PathResolver,
    locks: ReportLocks,
}

impl UploadService {
    pub fn new(cfg: Arc<CoreConfig>, locks: ReportLocks) -> Self {
        Self {
            resolver: PathResolver::new(cfg.storage_root()),
            locks,
        }
    }

    /// Stores `files` in the report's raw-results directory, creating it if needed.
    ///
    /// # Errors
    ///
    /// - [`StoreError::InvalidArgument`] if `files` is empty or a filename is unusable.
    /// - [`StoreError::PathEscape`] if any filename would leave the raw-results directory.
    /// - [`StoreError::FileWrite`] / [`StoreError::DirCreation`] on I/O failure.
    pub async fn upload_files(
        &self,
        project: &str,
        report: &str,
        files: Vec<UploadFile>,
    ) -> StoreResult<Vec<UploadedFile>> {
        if files.is_empty() {
            return Err(StoreError::InvalidArgument("no files provided".into()));
        }

        let results_dir = self.resolver.raw_results_dir(project, report).await?;
        let mut targets = Vec::with_capacity(files.len());
        for file in &files {
            targets.push(
                self.resolver
                    .resolve_file_name(&results_dir, &file.filename)
                    .await?,
            );
        }

        let _guard = self.locks.lock(project, report).await;

        fs::create_dir_all(&results_dir)
            .await
            .map_err(StoreError::DirCreation)?;
        let results_dir = ensure_contained(self.resolver.root(), results_dir).await?;

        let mut uploaded = Vec::with_capacity(files.len());
        for (file, target) in files.into_iter().zip(targets) {
            let target = ensure_contained(&results_dir, target).await?;
            write_atomic(&target, &file.content).await?;

            tracing::debug!(
                "stored {} ({} bytes) at {}",
                file.filename,
                file.content.len(),
                target.display()
            );
            uploaded.push(describe(report, &file));
        }

        tracing::info!(
            "uploaded {} file(s) to {}/{}",
            uploaded.len(),
            project,
            report
        );
        Ok(uploaded)
    }
}

fn describe(report: &str, file: &UploadFile) -> UploadedFile {
    let digest = Sha256::digest(&file.content);
    let media_type = infer::get(&file.content).map(|kind| kind.mime_type().to_string());

    UploadedFile {
        filename: file.filename.clone(),
        path: format!(
            "{REPORTS_DIR_NAME}/{report}/{RAW_RESULTS_DIR_NAME}/{}",
            file.filename
        ),
        size_bytes: file.content.len() as u64,
        sha256: hex::encode(digest),
        media_type,
    }
}
