//! Path resolution and containment for the storage layout.
//!
//! Every path the store touches is built here. Identifiers supplied by callers (project names,
//! report names, upload filenames, static sub-paths) are validated as plain path segments before
//! they are joined, and the joined result is re-checked against its intended ancestor with
//! symlinks resolved.
//!
//! ```text
//! <root>/
//!   <project>/
//!     reports/
//!       <report>.json          # report record
//!       <report>/
//!         allure-results/      # uploaded raw results
//!         allure-report/       # rendered static site
//! ```

use crate::constants::{
    MAX_SEGMENT_LEN, RAW_RESULTS_DIR_NAME, RECORD_EXTENSION, RENDERED_REPORT_DIR_NAME,
    REPORTS_DIR_NAME,
};
use crate::helpers::is_missing;
use crate::{StoreError, StoreResult};
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

/// Validates that `value` is usable verbatim as a single directory or file name.
///
/// # Errors
///
/// - [`StoreError::InvalidArgument`] for empty, over-long, padded or control-character names.
/// - [`StoreError::PathEscape`] for `.`/`..` and anything containing a path separator.
pub fn validate_segment(what: &str, value: &str) -> StoreResult<()> {
    if value.trim().is_empty() {
        return Err(StoreError::InvalidArgument(format!("{what} cannot be empty")));
    }

    if value.len() > MAX_SEGMENT_LEN {
        return Err(StoreError::InvalidArgument(format!(
            "{what} exceeds maximum length of {MAX_SEGMENT_LEN} bytes"
        )));
    }

    if value.trim() != value {
        return Err(StoreError::InvalidArgument(format!(
            "{what} must not start or end with whitespace"
        )));
    }

    if value.chars().any(char::is_control) {
        return Err(StoreError::InvalidArgument(format!(
            "{what} contains control characters"
        )));
    }

    if value == "." || value == ".." || value.contains('/') || value.contains('\\') {
        tracing::error!("rejected {} with traversal markers: {:?}", what, value);
        return Err(StoreError::PathEscape {
            path: PathBuf::from(value),
        });
    }

    Ok(())
}

/// Longest report name whose `<name>.json` record still fits in a single path segment.
pub const MAX_REPORT_NAME_LEN: usize = MAX_SEGMENT_LEN - RECORD_EXTENSION.len() - 1;

/// Report names double as `<name>.json` record filenames next to `<name>/` directories, so a
/// name carrying the record extension would collide with another report's directory.
pub fn validate_report_name(value: &str) -> StoreResult<()> {
    validate_segment("report name", value)?;

    if value.len() > MAX_REPORT_NAME_LEN {
        return Err(StoreError::InvalidArgument(format!(
            "report name exceeds maximum length of {MAX_REPORT_NAME_LEN} bytes"
        )));
    }

    let suffix = format!(".{RECORD_EXTENSION}");
    if value.to_ascii_lowercase().ends_with(&suffix) {
        return Err(StoreError::InvalidArgument(format!(
            "report name must not end with '{suffix}'"
        )));
    }

    Ok(())
}

/// Returns true iff `candidate` lies inside `base` (or is `base` itself).
///
/// Both paths are made absolute and have symlinks resolved for their existing prefix before
/// comparison. Comparison is per path component, so `/base-evil` is not inside `/base`.
/// A path that cannot be resolved is treated as not contained.
pub async fn contained_within(base: &Path, candidate: &Path) -> bool {
    match (resolve_absolute(base).await, resolve_absolute(candidate).await) {
        (Ok(base), Ok(candidate)) => candidate.starts_with(&base),
        _ => false,
    }
}

/// Returns `candidate` if it is contained within `base`, otherwise logs and fails.
pub async fn ensure_contained(base: &Path, candidate: PathBuf) -> StoreResult<PathBuf> {
    if contained_within(base, &candidate).await {
        return Ok(candidate);
    }

    tracing::error!(
        "blocked path escape: {} is outside {}",
        candidate.display(),
        base.display()
    );
    Err(StoreError::PathEscape { path: candidate })
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(out.components().next_back(), Some(Component::Normal(_))) {
                    out.pop();
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Absolute form of `path` with symlinks resolved for the longest existing prefix.
///
/// A prefix that is a regular file ends the walk the same way a missing one does; the
/// remaining components are appended unresolved.
async fn resolve_absolute(path: &Path) -> std::io::Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    let normalized = normalize_lexically(&absolute);

    let mut existing = normalized.as_path();
    let mut tail: Vec<OsString> = Vec::new();
    loop {
        match fs::canonicalize(existing).await {
            Ok(mut resolved) => {
                for name in tail.iter().rev() {
                    resolved.push(name);
                }
                return Ok(resolved);
            }
            Err(e) if is_missing(&e) => match (existing.parent(), existing.file_name()) {
                (Some(parent), Some(name)) => {
                    tail.push(name.to_os_string());
                    existing = parent;
                }
                _ => return Err(e),
            },
            Err(e) => return Err(e),
        }
    }
}

/// Maps logical identifiers onto the storage layout under a single root.
#[derive(Clone, Debug)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<project>`
    pub async fn project_dir(&self, project: &str) -> StoreResult<PathBuf> {
        validate_segment("project name", project)?;
        ensure_contained(&self.root, self.root.join(project)).await
    }

    /// `<root>/<project>/reports`
    pub async fn reports_dir(&self, project: &str) -> StoreResult<PathBuf> {
        let dir = self.project_dir(project).await?.join(REPORTS_DIR_NAME);
        ensure_contained(&self.root, dir).await
    }

    /// `<root>/<project>/reports/<report>.json`
    pub async fn report_record_path(&self, project: &str, report: &str) -> StoreResult<PathBuf> {
        validate_report_name(report)?;
        let path = self
            .reports_dir(project)
            .await?
            .join(format!("{report}.{RECORD_EXTENSION}"));
        ensure_contained(&self.root, path).await
    }

    /// `<root>/<project>/reports/<report>`
    pub async fn report_dir(&self, project: &str, report: &str) -> StoreResult<PathBuf> {
        validate_report_name(report)?;
        let dir = self.reports_dir(project).await?.join(report);
        ensure_contained(&self.root, dir).await
    }

    /// `<root>/<project>/reports/<report>/allure-results`
    pub async fn raw_results_dir(&self, project: &str, report: &str) -> StoreResult<PathBuf> {
        let dir = self
            .report_dir(project, report)
            .await?
            .join(RAW_RESULTS_DIR_NAME);
        ensure_contained(&self.root, dir).await
    }

    /// `<root>/<project>/reports/<report>/allure-report`
    pub async fn rendered_report_dir(&self, project: &str, report: &str) -> StoreResult<PathBuf> {
        let dir = self
            .report_dir(project, report)
            .await?
            .join(RENDERED_REPORT_DIR_NAME);
        ensure_contained(&self.root, dir).await
    }

    /// Joins a caller-supplied filename onto `dir`, which must itself be inside the root.
    pub async fn resolve_file_name(&self, dir: &Path, file_name: &str) -> StoreResult<PathBuf> {
        validate_segment("file name", file_name)?;
        let dir = ensure_contained(&self.root, dir.to_path_buf()).await?;
        let path = dir.join(file_name);
        ensure_contained(&dir, path).await
    }

    /// Joins a `/`-separated relative sub-path onto `base`.
    ///
    /// Empty and `.` components are dropped; any other component must be a valid segment.
    /// Returns `base` itself when nothing remains.
    pub async fn resolve_sub_path(&self, base: &Path, sub_path: &str) -> StoreResult<PathBuf> {
        let base = ensure_contained(&self.root, base.to_path_buf()).await?;
        let mut path = base.clone();
        for segment in sub_path.split('/') {
            if segment.is_empty() || segment == "." {
                continue;
            }
            validate_segment("path segment", segment)?;
            path.push(segment);
        }
        ensure_contained(&base, path).await
    }
}
