//! # Report Store Core
//!
//! Directory-backed storage for test-execution reports grouped into projects:
//! - Projects as directories under a configured storage root
//! - Report records (caller content plus `_metadata`) as JSON files
//! - Uploaded raw result files per report
//! - Rendering raw results into a static site through an external renderer
//!
//! Every filesystem path is built by [`PathResolver`], which rejects traversal in caller
//! identifiers and re-checks containment with symlinks resolved.
//!
//! **No API concerns**: HTTP routing, request schemas and documentation belong in `api-rest`.

pub mod config;
pub mod constants;
pub mod error;
mod helpers;
pub mod locks;
pub mod projects;
pub mod render;
pub mod reports;
pub mod resolver;
pub mod uploads;

pub use config::CoreConfig;
pub use error::{ErrorKind, StoreError, StoreResult};
pub use locks::ReportLocks;
pub use projects::ProjectService;
pub use render::{AllureCommandRenderer, RenderOutput, RenderService, ReportRenderer};
pub use reports::{ReportContent, ReportMetadata, ReportRecord, ReportService};
pub use resolver::{contained_within, PathResolver};
pub use uploads::{UploadFile, UploadService, UploadedFile};

use std::sync::Arc;

/// All store services over one storage root, sharing a single per-report lock registry.
#[derive(Clone, Debug)]
pub struct ReportStore {
    pub projects: ProjectService,
    pub reports: ReportService,
    pub uploads: UploadService,
    pub renders: RenderService,
}

impl ReportStore {
    pub fn new(cfg: Arc<CoreConfig>, renderer: Arc<dyn ReportRenderer>) -> Self {
        let locks = ReportLocks::new();
        Self {
            projects: ProjectService::new(cfg.clone()),
            reports: ReportService::new(cfg.clone(), locks.clone()),
            uploads: UploadService::new(cfg.clone(), locks.clone()),
            renders: RenderService::new(cfg, renderer, locks),
        }
    }

    /// Store rendering through the Allure command line configured in `cfg`.
    pub fn with_allure(cfg: Arc<CoreConfig>) -> Self {
        let renderer = Arc::new(AllureCommandRenderer::from_config(&cfg));
        Self::new(cfg, renderer)
    }
}
