//! Axum handlers, one per REST operation.
//!
//! Handlers only translate between HTTP and the core services; all validation of project,
//! report and file names happens in `report_store_core`.

use axum::{
    extract::{rejection::JsonRejection, Multipart, Path as AxumPath, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use report_store_core::{ReportContent, StoreError, UploadFile};

use crate::content_type::content_type_for;
use crate::error::ApiError;
use crate::models::{
    CreateProjectReq, CreateReportReq, ErrorRes, HealthRes, MessageRes, ProjectListRes,
    ProjectRes, RenderRes, ReportListRes, ReportRes, StoredReportRes, UploadRes,
};
use crate::AppState;

/// Multipart field carrying uploaded result files.
pub const UPLOAD_FIELD: &str = "files[]";

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

fn into_content(value: serde_json::Value) -> Result<ReportContent, ApiError> {
    match value {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(ApiError::BadRequest(format!(
            "report content must be a JSON object, got {}",
            json_type_name(&other)
        ))),
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for the REST API
#[axum::debug_handler]
pub async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "Report store REST API is alive".into(),
    })
}

#[utoipa::path(
    post,
    path = "/projects",
    request_body = CreateProjectReq,
    responses(
        (status = 201, description = "Project created", body = ProjectRes),
        (status = 400, description = "Invalid project name", body = ErrorRes),
        (status = 403, description = "Project name escapes the storage root", body = ErrorRes)
    )
)]
/// Create a project
///
/// Creating a project that already exists succeeds without changes.
#[axum::debug_handler]
pub async fn create_project(
    State(state): State<AppState>,
    payload: Result<Json<CreateProjectReq>, JsonRejection>,
) -> Result<(StatusCode, Json<ProjectRes>), ApiError> {
    let req = json_body(payload)?;
    state.store.projects.create_project(&req.name).await?;

    Ok((
        StatusCode::CREATED,
        Json(ProjectRes {
            message: "Project created successfully".into(),
            project: req.name,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/projects",
    responses(
        (status = 200, description = "Names of all projects", body = ProjectListRes)
    )
)]
/// List all projects
#[axum::debug_handler]
pub async fn list_projects(State(state): State<AppState>) -> Json<ProjectListRes> {
    let projects = state.store.projects.list_projects().await;
    Json(ProjectListRes { projects })
}

#[utoipa::path(
    delete,
    path = "/projects/{project_id}",
    params(
        ("project_id" = String, Path, description = "Project ID")
    ),
    responses(
        (status = 200, description = "Project deleted", body = ProjectRes),
        (status = 400, description = "Invalid project name", body = ErrorRes),
        (status = 403, description = "Project name escapes the storage root", body = ErrorRes)
    )
)]
/// Delete a project and everything stored under it
///
/// Deleting a project that does not exist succeeds.
#[axum::debug_handler]
pub async fn delete_project(
    State(state): State<AppState>,
    AxumPath(project_id): AxumPath<String>,
) -> Result<Json<ProjectRes>, ApiError> {
    state.store.projects.delete_project(&project_id).await?;

    Ok(Json(ProjectRes {
        message: "Project deleted successfully".into(),
        project: project_id,
    }))
}

#[utoipa::path(
    post,
    path = "/projects/{project_id}/reports",
    params(
        ("project_id" = String, Path, description = "Project ID")
    ),
    request_body = CreateReportReq,
    responses(
        (status = 201, description = "Report created", body = ReportRes),
        (status = 400, description = "Invalid report name or content", body = ErrorRes),
        (status = 403, description = "Name escapes the storage root", body = ErrorRes),
        (status = 409, description = "Report already exists", body = ErrorRes)
    )
)]
/// Create a report record in a project
#[axum::debug_handler]
pub async fn create_report(
    State(state): State<AppState>,
    AxumPath(project_id): AxumPath<String>,
    payload: Result<Json<CreateReportReq>, JsonRejection>,
) -> Result<(StatusCode, Json<ReportRes>), ApiError> {
    let req = json_body(payload)?;
    let content = into_content(req.content)?;

    let metadata = state
        .store
        .reports
        .create_report(&project_id, &req.name, content)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ReportRes {
            message: "Report created successfully".into(),
            report: metadata.into(),
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/projects/{project_id}/reports",
    params(
        ("project_id" = String, Path, description = "Project ID")
    ),
    responses(
        (status = 200, description = "Metadata of every report in the project", body = ReportListRes),
        (status = 400, description = "Invalid project name", body = ErrorRes)
    )
)]
/// List the reports of a project
#[axum::debug_handler]
pub async fn list_reports(
    State(state): State<AppState>,
    AxumPath(project_id): AxumPath<String>,
) -> Result<Json<ReportListRes>, ApiError> {
    let reports = state.store.reports.list_reports(&project_id).await?;
    Ok(Json(ReportListRes {
        reports: reports.into_iter().map(Into::into).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/projects/{project_id}/reports/{report_name}",
    params(
        ("project_id" = String, Path, description = "Project ID"),
        ("report_name" = String, Path, description = "Report name")
    ),
    responses(
        (status = 200, description = "Report content with its `_metadata`", body = StoredReportRes),
        (status = 404, description = "Report not found", body = ErrorRes)
    )
)]
/// Read a report record
#[axum::debug_handler]
pub async fn get_report(
    State(state): State<AppState>,
    AxumPath((project_id, report_name)): AxumPath<(String, String)>,
) -> Result<Json<StoredReportRes>, ApiError> {
    let record = state
        .store
        .reports
        .get_report(&project_id, &report_name)
        .await?;
    Ok(Json(record.into()))
}

#[utoipa::path(
    put,
    path = "/projects/{project_id}/reports/{report_name}",
    params(
        ("project_id" = String, Path, description = "Project ID"),
        ("report_name" = String, Path, description = "Report name")
    ),
    request_body(
        content = String,
        content_type = "application/json",
        description = "Replacement report content, any JSON object"
    ),
    responses(
        (status = 200, description = "Report updated", body = ReportRes),
        (status = 400, description = "Content is not a JSON object", body = ErrorRes),
        (status = 404, description = "Report not found", body = ErrorRes)
    )
)]
/// Replace the content of a report record
#[axum::debug_handler]
pub async fn update_report(
    State(state): State<AppState>,
    AxumPath((project_id, report_name)): AxumPath<(String, String)>,
    payload: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<Json<ReportRes>, ApiError> {
    let content = into_content(json_body(payload)?)?;

    let metadata = state
        .store
        .reports
        .update_report(&project_id, &report_name, content)
        .await?;

    Ok(Json(ReportRes {
        message: "Report updated successfully".into(),
        report: metadata.into(),
    }))
}

#[utoipa::path(
    delete,
    path = "/projects/{project_id}/reports/{report_name}",
    params(
        ("project_id" = String, Path, description = "Project ID"),
        ("report_name" = String, Path, description = "Report name")
    ),
    responses(
        (status = 200, description = "Report deleted", body = MessageRes),
        (status = 404, description = "Report not found", body = ErrorRes)
    )
)]
/// Delete a report record together with its uploads and rendered output
#[axum::debug_handler]
pub async fn delete_report(
    State(state): State<AppState>,
    AxumPath((project_id, report_name)): AxumPath<(String, String)>,
) -> Result<Json<MessageRes>, ApiError> {
    state
        .store
        .reports
        .delete_report(&project_id, &report_name)
        .await?;

    Ok(Json(MessageRes {
        message: "Report deleted successfully".into(),
    }))
}

#[utoipa::path(
    post,
    path = "/projects/{project_id}/reports/{report_name}/files",
    params(
        ("project_id" = String, Path, description = "Project ID"),
        ("report_name" = String, Path, description = "Report name")
    ),
    request_body(
        content = String,
        content_type = "multipart/form-data",
        description = "One or more files in the `files[]` field"
    ),
    responses(
        (status = 201, description = "Files stored", body = UploadRes),
        (status = 400, description = "No files or invalid file name", body = ErrorRes),
        (status = 403, description = "File name escapes the report directory", body = ErrorRes)
    )
)]
/// Upload raw result files into a report
#[axum::debug_handler]
pub async fn upload_files(
    State(state): State<AppState>,
    AxumPath((project_id, report_name)): AxumPath<(String, String)>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadRes>), ApiError> {
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;
        files.push(UploadFile::new(filename, data.to_vec()));
    }

    if files.is_empty() {
        return Err(ApiError::BadRequest("No files provided".into()));
    }

    let uploaded = state
        .store
        .uploads
        .upload_files(&project_id, &report_name, files)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(UploadRes {
            message: "Files uploaded successfully".into(),
            files: uploaded.into_iter().map(Into::into).collect(),
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/projects/{project_id}/reports/{report_name}/generate-allure",
    params(
        ("project_id" = String, Path, description = "Project ID"),
        ("report_name" = String, Path, description = "Report name")
    ),
    responses(
        (status = 200, description = "Report rendered", body = RenderRes),
        (status = 400, description = "Invalid project or report name", body = ErrorRes),
        (status = 502, description = "Renderer failed", body = ErrorRes)
    )
)]
/// Render the uploaded results of a report into a static Allure site
#[axum::debug_handler]
pub async fn generate_allure(
    State(state): State<AppState>,
    AxumPath((project_id, report_name)): AxumPath<(String, String)>,
) -> Result<Json<RenderRes>, ApiError> {
    let output = state
        .store
        .renders
        .render(&project_id, &report_name)
        .await?;

    Ok(Json(RenderRes {
        message: "Allure report generated successfully".into(),
        output_dir: output.output_dir.display().to_string(),
    }))
}

#[utoipa::path(
    get,
    path = "/projects/{project_id}/reports/{report_name}/allure",
    params(
        ("project_id" = String, Path, description = "Project ID"),
        ("report_name" = String, Path, description = "Report name")
    ),
    responses(
        (status = 302, description = "Redirect to the rendered site's index.html"),
        (status = 404, description = "Report has not been rendered", body = ErrorRes)
    )
)]
/// Redirect to the entry page of a rendered report
#[axum::debug_handler]
pub async fn redirect_to_report_index(
    State(state): State<AppState>,
    AxumPath((project_id, report_name)): AxumPath<(String, String)>,
) -> Result<Response, ApiError> {
    state
        .store
        .renders
        .resolve_rendered_entry_path(&project_id, &report_name)
        .await?;

    // relative to `.../allure`, so it resolves to `.../allure/index.html`
    Ok((StatusCode::FOUND, [(header::LOCATION, "allure/index.html")]).into_response())
}

/// Serve the entry page of a rendered report (`.../allure/`)
#[axum::debug_handler]
pub async fn serve_report_index(
    State(state): State<AppState>,
    AxumPath((project_id, report_name)): AxumPath<(String, String)>,
) -> Result<Response, ApiError> {
    send_rendered_file(&state, &project_id, &report_name, None).await
}

#[utoipa::path(
    get,
    path = "/projects/{project_id}/reports/{report_name}/allure/{path}",
    params(
        ("project_id" = String, Path, description = "Project ID"),
        ("report_name" = String, Path, description = "Report name"),
        ("path" = String, Path, description = "File path inside the rendered site")
    ),
    responses(
        (status = 200, description = "File content, typed by extension"),
        (status = 403, description = "Path escapes the rendered site", body = ErrorRes),
        (status = 404, description = "Report not rendered or file not found", body = ErrorRes)
    )
)]
/// Serve a file of a rendered report
#[axum::debug_handler]
pub async fn serve_report_file(
    State(state): State<AppState>,
    AxumPath((project_id, report_name, path)): AxumPath<(String, String, String)>,
) -> Result<Response, ApiError> {
    send_rendered_file(&state, &project_id, &report_name, Some(&path)).await
}

async fn send_rendered_file(
    state: &AppState,
    project_id: &str,
    report_name: &str,
    sub_path: Option<&str>,
) -> Result<Response, ApiError> {
    let file = state
        .store
        .renders
        .resolve_rendered_file(project_id, report_name, sub_path)
        .await?;

    let bytes = tokio::fs::read(&file)
        .await
        .map_err(|e| ApiError::Store(StoreError::FileRead(e)))?;
    let content_type = content_type_for(&file.to_string_lossy());

    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}
