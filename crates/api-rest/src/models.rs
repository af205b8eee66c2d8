//! Request and response bodies of the REST API.

use chrono::SecondsFormat;
use report_store_core::{ReportContent, ReportMetadata, ReportRecord, UploadedFile};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateProjectReq {
    /// Project name; a single path segment.
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProjectRes {
    pub message: String,
    pub project: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProjectListRes {
    pub projects: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateReportReq {
    /// Report name; unique within the project.
    pub name: String,
    /// Arbitrary JSON object stored with the report.
    #[schema(value_type = Object)]
    pub content: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetadataRes {
    pub name: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<ReportMetadata> for ReportMetadataRes {
    fn from(metadata: ReportMetadata) -> Self {
        Self {
            name: metadata.name,
            created_at: metadata
                .created_at
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            updated_at: metadata
                .updated_at
                .to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReportRes {
    pub message: String,
    pub report: ReportMetadataRes,
}

/// A stored report: the caller's content fields plus the reserved `_metadata` object.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StoredReportRes {
    #[serde(flatten)]
    #[schema(value_type = Object)]
    pub content: ReportContent,
    #[serde(rename = "_metadata")]
    pub metadata: ReportMetadataRes,
}

impl From<ReportRecord> for StoredReportRes {
    fn from(record: ReportRecord) -> Self {
        Self {
            content: record.content,
            metadata: record.metadata.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReportListRes {
    pub reports: Vec<ReportMetadataRes>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageRes {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFileRes {
    pub filename: String,
    /// Location relative to the project directory.
    pub path: String,
    pub size_bytes: u64,
    pub sha256: String,
    pub media_type: Option<String>,
}

impl From<UploadedFile> for UploadedFileRes {
    fn from(file: UploadedFile) -> Self {
        Self {
            filename: file.filename,
            path: file.path,
            size_bytes: file.size_bytes,
            sha256: file.sha256,
            media_type: file.media_type,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UploadRes {
    pub message: String,
    pub files: Vec<UploadedFileRes>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RenderRes {
    pub message: String,
    pub output_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorRes {
    pub error: String,
}
