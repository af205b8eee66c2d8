use std::path::PathBuf;

/// Coarse classification of a [`StoreError`], used by the API layer to pick a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    AlreadyExists,
    NotFound,
    NotRendered,
    RenderFailed,
    PathEscape,
    Storage,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("report already exists: {0}")]
    AlreadyExists(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("report has not been rendered yet: {0}")]
    NotRendered(String),
    #[error("failed to render report: {0}")]
    RenderFailed(String),
    #[error("path escapes its storage directory: {}", path.display())]
    PathEscape { path: PathBuf },

    #[error("failed to resolve path {}: {source}", path.display())]
    PathResolution {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to create directory: {0}")]
    DirCreation(std::io::Error),
    #[error("failed to write file: {0}")]
    FileWrite(std::io::Error),
    #[error("failed to read file: {0}")]
    FileRead(std::io::Error),
    #[error("failed to remove path: {0}")]
    Removal(std::io::Error),
    #[error("failed to serialize report: {0}")]
    Serialization(serde_json::Error),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            StoreError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::NotRendered(_) => ErrorKind::NotRendered,
            StoreError::RenderFailed(_) => ErrorKind::RenderFailed,
            StoreError::PathEscape { .. } => ErrorKind::PathEscape,
            StoreError::PathResolution { .. }
            | StoreError::DirCreation(_)
            | StoreError::FileWrite(_)
            | StoreError::FileRead(_)
            | StoreError::Removal(_)
            | StoreError::Serialization(_) => ErrorKind::Storage,
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
