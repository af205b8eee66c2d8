//! # API REST
//!
//! REST API for the report store.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON bodies, multipart uploads, status codes, CORS, request logging)
//! - Serving rendered Allure sites as static files
//!
//! Storage semantics live in `report-store-core`; this crate only maps them onto HTTP.

#![warn(rust_2018_idioms)]

pub mod content_type;
pub mod error;
pub mod handlers;
pub mod models;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use report_store_core::ReportStore;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use error::ApiError;

/// Default cap on a multipart upload request body: 100 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

/// Application state for the REST API
///
/// Shared by every handler; cloning is cheap.
#[derive(Clone, Debug)]
pub struct AppState {
    pub store: ReportStore,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(store: ReportStore) -> Self {
        Self {
            store,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    pub fn with_max_upload_bytes(mut self, max_upload_bytes: usize) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Allure Report Storage API",
        version = "v1",
        description = "API for managing allure report projects and their storage"
    ),
    paths(
        handlers::health,
        handlers::create_project,
        handlers::list_projects,
        handlers::delete_project,
        handlers::create_report,
        handlers::list_reports,
        handlers::get_report,
        handlers::update_report,
        handlers::delete_report,
        handlers::upload_files,
        handlers::generate_allure,
        handlers::redirect_to_report_index,
        handlers::serve_report_file,
    ),
    components(schemas(
        models::HealthRes,
        models::CreateProjectReq,
        models::ProjectRes,
        models::ProjectListRes,
        models::CreateReportReq,
        models::ReportMetadataRes,
        models::ReportRes,
        models::StoredReportRes,
        models::ReportListRes,
        models::MessageRes,
        models::UploadedFileRes,
        models::UploadRes,
        models::RenderRes,
        models::ErrorRes,
    ))
)]
pub struct ApiDoc;

/// Builds the REST router: all endpoints, Swagger UI at `/ui`, OpenAPI document at `/doc`.
pub fn router(state: AppState) -> Router {
    const REPORT: &str = "/projects/:project_id/reports/:report_name";

    let upload_limit = DefaultBodyLimit::max(state.max_upload_bytes);

    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/projects",
            get(handlers::list_projects).post(handlers::create_project),
        )
        .route("/projects/:project_id", delete(handlers::delete_project))
        .route(
            "/projects/:project_id/reports",
            get(handlers::list_reports).post(handlers::create_report),
        )
        .route(
            REPORT,
            get(handlers::get_report)
                .put(handlers::update_report)
                .delete(handlers::delete_report),
        )
        .route(
            &format!("{REPORT}/files"),
            post(handlers::upload_files).layer(upload_limit),
        )
        .route(
            &format!("{REPORT}/generate-allure"),
            post(handlers::generate_allure),
        )
        .route(
            &format!("{REPORT}/allure"),
            get(handlers::redirect_to_report_index),
        )
        .route(
            &format!("{REPORT}/allure/"),
            get(handlers::serve_report_index),
        )
        .route(
            &format!("{REPORT}/allure/*path"),
            get(handlers::serve_report_file),
        )
        .merge(SwaggerUi::new("/ui").url("/doc", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
