use api_rest::{router, AppState};
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use report_store_core::{CoreConfig, ReportRenderer, ReportStore};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "report-store-test-boundary";

/// Writes a two-file site, or fails when `fail` is set.
#[derive(Debug)]
struct StubRenderer {
    fail: bool,
}

#[async_trait]
impl ReportRenderer for StubRenderer {
    async fn render(&self, _input_dir: &Path, output_dir: &Path) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("allure exploded");
        }
        std::fs::create_dir_all(output_dir.join("plugins"))?;
        std::fs::write(output_dir.join("index.html"), "<html>ok</html>")?;
        std::fs::write(output_dir.join("plugins/app.js"), "console.log(1)")?;
        Ok(())
    }
}

fn app_with(root: &Path, fail: bool) -> Router {
    let cfg = Arc::new(CoreConfig::with_root(root).unwrap());
    let store = ReportStore::new(cfg, Arc::new(StubRenderer { fail }));
    router(AppState::new(store))
}

fn app(root: &Path) -> Router {
    app_with(root, false)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, headers, body.to_vec())
}

async fn send_json(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let (status, _, bytes) = send(app, request).await;
    let json = if bytes.is_empty() {
        json!({})
    } else {
        serde_json::from_slice(&bytes).unwrap_or(json!({}))
    };
    (status, json)
}

fn multipart_request(uri: &str, files: &[(&str, &str, &[u8])]) -> Request<Body> {
    let mut body = Vec::new();
    for (field, filename, content) in files {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn create_report(app: &Router, project: &str, name: &str, content: Value) {
    let (status, _) = send_json(
        app,
        Method::POST,
        &format!("/projects/{project}/reports"),
        Some(json!({"name": name, "content": content})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_health_endpoint() {
    let temp = TempDir::new().unwrap();
    let app = app(temp.path());

    let (status, body) = send_json(&app, Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
}

#[tokio::test]
async fn test_project_lifecycle() {
    let temp = TempDir::new().unwrap();
    let app = app(temp.path());

    let (status, body) =
        send_json(&app, Method::POST, "/projects", Some(json!({"name": "demo"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Project created successfully");
    assert_eq!(body["project"], "demo");

    let (status, body) = send_json(&app, Method::GET, "/projects", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["projects"], json!(["demo"]));

    let (status, body) = send_json(&app, Method::DELETE, "/projects/demo", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["project"], "demo");

    let (status, body) = send_json(&app, Method::GET, "/projects", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["projects"], json!([]));
}

#[tokio::test]
async fn test_malformed_project_body_is_bad_request() {
    let temp = TempDir::new().unwrap();
    let app = app(temp.path());

    let (status, body) =
        send_json(&app, Method::POST, "/projects", Some(json!({"title": "demo"}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_traversal_in_project_name_is_forbidden() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("root");
    let app = app(&root);

    let (status, body) =
        send_json(&app, Method::POST, "/projects", Some(json!({"name": "../outside"}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Invalid path");

    let (status, _) = send_json(
        &app,
        Method::POST,
        "/projects/%2E%2E/reports",
        Some(json!({"name": "run1", "content": {}})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    assert!(!temp.path().join("outside").exists());
    assert!(!temp.path().join("reports").exists());
}

#[tokio::test]
async fn test_report_crud() {
    let temp = TempDir::new().unwrap();
    let app = app(temp.path());

    let (status, body) = send_json(
        &app,
        Method::POST,
        "/projects/demo/reports",
        Some(json!({"name": "run1", "content": {"x": 1, "_metadata": "spoofed"}})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Report created successfully");
    assert_eq!(body["report"]["name"], "run1");
    assert_eq!(body["report"]["createdAt"], body["report"]["updatedAt"]);

    let (status, body) =
        send_json(&app, Method::GET, "/projects/demo/reports/run1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["x"], 1);
    assert_eq!(body["_metadata"]["name"], "run1");

    let (status, body) = send_json(
        &app,
        Method::PUT,
        "/projects/demo/reports/run1",
        Some(json!({"y": 2})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Report updated successfully");

    let (_, body) = send_json(&app, Method::GET, "/projects/demo/reports/run1", None).await;
    assert_eq!(body["y"], 2);
    assert!(body.get("x").is_none());

    let (status, body) = send_json(&app, Method::GET, "/projects/demo/reports", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reports"].as_array().unwrap().len(), 1);
    assert_eq!(body["reports"][0]["name"], "run1");

    let (status, body) =
        send_json(&app, Method::DELETE, "/projects/demo/reports/run1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Report deleted successfully");

    let (status, body) =
        send_json(&app, Method::GET, "/projects/demo/reports/run1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());

    let (status, _) =
        send_json(&app, Method::DELETE, "/projects/demo/reports/run1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_duplicate_report_conflicts() {
    let temp = TempDir::new().unwrap();
    let app = app(temp.path());

    create_report(&app, "demo", "run1", json!({"v": 1})).await;
    let (status, _) = send_json(
        &app,
        Method::POST,
        "/projects/demo/reports",
        Some(json!({"name": "run1", "content": {"v": 2}})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, body) = send_json(&app, Method::GET, "/projects/demo/reports/run1", None).await;
    assert_eq!(body["v"], 1);
}

#[tokio::test]
async fn test_non_object_content_is_rejected() {
    let temp = TempDir::new().unwrap();
    let app = app(temp.path());

    let (status, _) = send_json(
        &app,
        Method::POST,
        "/projects/demo/reports",
        Some(json!({"name": "run1", "content": [1, 2]})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    create_report(&app, "demo", "run2", json!({})).await;
    let (status, _) = send_json(
        &app,
        Method::PUT,
        "/projects/demo/reports/run2",
        Some(json!("text")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upload_files() {
    let temp = TempDir::new().unwrap();
    let app = app(temp.path());

    let request = multipart_request(
        "/projects/demo/reports/run1/files",
        &[
            ("files[]", "result.json", b"{}"),
            ("other", "ignored.txt", b"nope"),
            ("files[]", "container.json", b"[]"),
        ],
    );
    let (status, _, bytes) = send(&app, request).await;
    let body: Value = serde_json::from_slice(&bytes).unwrap();

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Files uploaded successfully");
    let files = body["files"].as_array().unwrap();
    assert_eq!(files.len(), 2);
    assert_eq!(files[0]["filename"], "result.json");
    assert_eq!(files[0]["path"], "reports/run1/allure-results/result.json");
    assert_eq!(files[0]["sizeBytes"], 2);

    let results = temp.path().join("demo/reports/run1/allure-results");
    assert!(results.join("result.json").is_file());
    assert!(results.join("container.json").is_file());
    assert!(!results.join("ignored.txt").exists());
}

#[tokio::test]
async fn test_upload_without_files_is_bad_request() {
    let temp = TempDir::new().unwrap();
    let app = app(temp.path());

    let request = multipart_request(
        "/projects/demo/reports/run1/files",
        &[("other", "a.json", b"{}")],
    );
    let (status, _, bytes) = send(&app, request).await;
    let body: Value = serde_json::from_slice(&bytes).unwrap();

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No files provided");
}

#[tokio::test]
async fn test_upload_with_traversal_filename_writes_nothing() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("root");
    let app = app(&root);

    let request = multipart_request(
        "/projects/demo/reports/run1/files",
        &[
            ("files[]", "ok.json", b"{}"),
            ("files[]", "../../../../evil.json", b"{}"),
        ],
    );
    let (status, _, _) = send(&app, request).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(!root.join("demo").exists());
    assert!(!temp.path().join("evil.json").exists());
}

#[tokio::test]
async fn test_render_and_serve() {
    let temp = TempDir::new().unwrap();
    let app = app(temp.path());

    create_report(&app, "demo", "run1", json!({})).await;

    let (status, _) =
        send_json(&app, Method::GET, "/projects/demo/reports/run1/allure", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send_json(
        &app,
        Method::POST,
        "/projects/demo/reports/run1/generate-allure",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Allure report generated successfully");
    assert!(body["outputDir"]
        .as_str()
        .unwrap()
        .ends_with("allure-report"));

    let request = Request::builder()
        .uri("/projects/demo/reports/run1/allure")
        .body(Body::empty())
        .unwrap();
    let (status, headers, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::FOUND);
    assert_eq!(headers[header::LOCATION], "allure/index.html");

    let request = Request::builder()
        .uri("/projects/demo/reports/run1/allure/index.html")
        .body(Body::empty())
        .unwrap();
    let (status, headers, bytes) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "text/html; charset=utf-8");
    assert_eq!(bytes, b"<html>ok</html>");

    let request = Request::builder()
        .uri("/projects/demo/reports/run1/allure/plugins/app.js")
        .body(Body::empty())
        .unwrap();
    let (status, headers, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headers[header::CONTENT_TYPE],
        "application/javascript; charset=utf-8"
    );

    let request = Request::builder()
        .uri("/projects/demo/reports/run1/allure/")
        .body(Body::empty())
        .unwrap();
    let (status, _, bytes) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, b"<html>ok</html>");

    let (status, _) = send_json(
        &app,
        Method::GET,
        "/projects/demo/reports/run1/allure/missing.js",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send_json(
        &app,
        Method::GET,
        "/projects/demo/reports/run1/allure/index.html/foo",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send_json(
        &app,
        Method::GET,
        "/projects/demo/reports/run1/allure/..%2F..%2Frun1.json",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_render_failure_is_bad_gateway() {
    let temp = TempDir::new().unwrap();
    let app = app_with(temp.path(), true);

    let (status, body) = send_json(
        &app,
        Method::POST,
        "/projects/demo/reports/run1/generate-allure",
        None,
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().unwrap().contains("allure exploded"));

    let (status, _) =
        send_json(&app, Method::GET, "/projects/demo/reports/run1/allure", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let temp = TempDir::new().unwrap();
    let app = app(temp.path());

    let (status, body) = send_json(&app, Method::GET, "/doc", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["info"]["title"], "Allure Report Storage API");
    assert!(body["paths"]["/projects"].is_object());
}
