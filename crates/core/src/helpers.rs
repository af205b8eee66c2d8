//! Filesystem helpers shared by the store services.

use crate::{StoreError, StoreResult};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Sibling temp path used to stage a write of `path`.
///
/// The name has a fixed length so that any target name the filesystem accepts can be staged.
fn staging_path(path: &Path) -> PathBuf {
    path.with_file_name(format!(".tmp-{}", uuid::Uuid::new_v4().simple()))
}

/// Whether `e` means nothing exists at the path, including a file standing in for a parent
/// directory.
pub(crate) fn is_missing(e: &std::io::Error) -> bool {
    matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory)
}

async fn write_staged(path: &Path, contents: &[u8]) -> StoreResult<PathBuf> {
    let staged = staging_path(path);
    let mut file = fs::File::create(&staged)
        .await
        .map_err(StoreError::FileWrite)?;

    let written = async {
        file.write_all(contents).await?;
        file.sync_all().await
    }
    .await;

    if let Err(e) = written {
        remove_file_quietly(&staged).await;
        return Err(StoreError::FileWrite(e));
    }

    Ok(staged)
}

async fn remove_file_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != ErrorKind::NotFound {
            tracing::warn!("failed to remove staged file {}: {}", path.display(), e);
        }
    }
}

/// Replaces `path` with `contents` so readers see either the old or the new file, never a
/// partial one.
pub(crate) async fn write_atomic(path: &Path, contents: &[u8]) -> StoreResult<()> {
    let staged = write_staged(path, contents).await?;

    if let Err(e) = fs::rename(&staged, path).await {
        remove_file_quietly(&staged).await;
        return Err(StoreError::FileWrite(e));
    }

    Ok(())
}

/// Publishes `contents` at `path` only if nothing exists there yet.
///
/// The staged file is hard-linked into place, which fails atomically when `path` is taken.
/// Returns `Ok(false)` in that case.
pub(crate) async fn create_atomic(path: &Path, contents: &[u8]) -> StoreResult<bool> {
    let staged = write_staged(path, contents).await?;

    let linked = fs::hard_link(&staged, path).await;
    remove_file_quietly(&staged).await;

    match linked {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(StoreError::FileWrite(e)),
    }
}

/// Recursively removes `dir`; an absent directory is not an error.
pub(crate) async fn remove_dir_if_exists(dir: &Path) -> StoreResult<bool> {
    match fs::remove_dir_all(dir).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StoreError::Removal(e)),
    }
}

/// Whether `path` exists as a directory. Errors other than "not found" are logged and treated
/// as absent.
pub(crate) async fn is_dir(path: &Path) -> bool {
    match fs::metadata(path).await {
        Ok(meta) => meta.is_dir(),
        Err(e) => {
            if !is_missing(&e) {
                tracing::warn!("failed to stat {}: {}", path.display(), e);
            }
            false
        }
    }
}
