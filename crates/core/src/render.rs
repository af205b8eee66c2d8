//! Report rendering.
//!
//! Rendering turns a report's raw results into a static site using an external collaborator
//! behind the [`ReportRenderer`] trait. The default backend runs the Allure command line
//! (`allure generate <results> -o <output>`) as a subprocess with a timeout.
//!
//! A render is written into a staging directory next to the published one and swapped in only
//! once the renderer has succeeded and produced an `index.html`. Until then the previous render,
//! if any, keeps being served unchanged.

use crate::config::CoreConfig;
use crate::constants::{RENDERED_INDEX_FILE, RENDERED_REPORT_DIR_NAME};
use crate::helpers::{is_dir, remove_dir_if_exists};
use crate::locks::ReportLocks;
use crate::resolver::{ensure_contained, PathResolver};
use crate::{StoreError, StoreResult};
use async_trait::async_trait;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::process::Command;

/// External collaborator that renders a results directory into a static site.
///
/// Implementations must populate `output_dir` (which does not exist yet) with a site rooted at
/// `index.html`. Any error is reported to callers as a render failure.
#[async_trait]
pub trait ReportRenderer: Send + Sync + std::fmt::Debug {
    async fn render(&self, input_dir: &Path, output_dir: &Path) -> anyhow::Result<()>;
}

/// Renders by invoking the Allure command line.
#[derive(Clone, Debug)]
pub struct AllureCommandRenderer {
    command: String,
    timeout: Duration,
}

impl AllureCommandRenderer {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }

    pub fn from_config(cfg: &CoreConfig) -> Self {
        Self::new(cfg.render_command(), cfg.render_timeout())
    }
}

#[async_trait]
impl ReportRenderer for AllureCommandRenderer {
    async fn render(&self, input_dir: &Path, output_dir: &Path) -> anyhow::Result<()> {
        tracing::debug!(
            "running {} generate {} -o {}",
            self.command,
            input_dir.display(),
            output_dir.display()
        );

        let mut cmd = Command::new(&self.command);
        cmd.arg("generate")
            .arg(input_dir)
            .arg("-o")
            .arg(output_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| anyhow::anyhow!("{} timed out after {:?}", self.command, self.timeout))?
            .map_err(|e| anyhow::anyhow!("failed to execute {}: {}", self.command, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let detail = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            anyhow::bail!("{} exited with {}: {}", self.command, output.status, detail);
        }

        Ok(())
    }
}

/// Result of a successful render.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderOutput {
    pub output_dir: PathBuf,
}

/// Service coordinating renders and locating rendered output for serving.
#[derive(Clone, Debug)]
pub struct RenderService {
    resolver: PathResolver,
    renderer: Arc<dyn ReportRenderer>,
    locks: ReportLocks,
}

impl RenderService {
    pub fn new(cfg: Arc<CoreConfig>, renderer: Arc<dyn ReportRenderer>, locks: ReportLocks) -> Self {
        Self {
            resolver: PathResolver::new(cfg.storage_root()),
            renderer,
            locks,
        }
    }

    /// Renders the report's raw results into its `allure-report/` directory.
    ///
    /// The raw-results directory is created empty if nothing was uploaded yet.
    ///
    /// # Errors
    ///
    /// - [`StoreError::RenderFailed`] if the renderer fails, times out or produces no
    ///   `index.html`. The previously published render is left in place.
    /// - [`StoreError::InvalidArgument`] / [`StoreError::PathEscape`] for unusable names.
    pub async fn render(&self, project: &str, report: &str) -> StoreResult<RenderOutput> {
        let report_dir = self.resolver.report_dir(project, report).await?;
        let results_dir = self.resolver.raw_results_dir(project, report).await?;
        let output_dir = self.resolver.rendered_report_dir(project, report).await?;

        let _guard = self.locks.lock(project, report).await;

        fs::create_dir_all(&results_dir)
            .await
            .map_err(StoreError::DirCreation)?;
        let results_dir = ensure_contained(self.resolver.root(), results_dir).await?;
        let report_dir = ensure_contained(self.resolver.root(), report_dir).await?;

        sweep_stale_renders(&report_dir).await;

        let token = uuid::Uuid::new_v4().simple().to_string();
        let staging = report_dir.join(format!(".{RENDERED_REPORT_DIR_NAME}.staging-{token}"));

        tracing::info!("rendering report {}/{}", project, report);
        if let Err(e) = self.renderer.render(&results_dir, &staging).await {
            discard(&staging).await;
            tracing::error!("render of {}/{} failed: {:#}", project, report, e);
            return Err(StoreError::RenderFailed(format!("{e:#}")));
        }

        let has_index = fs::metadata(staging.join(RENDERED_INDEX_FILE))
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !has_index {
            discard(&staging).await;
            tracing::error!(
                "render of {}/{} produced no {}",
                project,
                report,
                RENDERED_INDEX_FILE
            );
            return Err(StoreError::RenderFailed(format!(
                "renderer produced no {RENDERED_INDEX_FILE}"
            )));
        }

        publish(&staging, &output_dir, &report_dir, &token).await?;

        tracing::info!("rendered report {}/{} at {}", project, report, output_dir.display());
        Ok(RenderOutput { output_dir })
    }

    /// Returns the rendered site directory of a report.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotRendered`] if no render has been published yet.
    pub async fn resolve_rendered_entry_path(
        &self,
        project: &str,
        report: &str,
    ) -> StoreResult<PathBuf> {
        let output_dir = self.resolver.rendered_report_dir(project, report).await?;
        if !is_dir(&output_dir).await {
            return Err(StoreError::NotRendered(format!("{project}/{report}")));
        }
        ensure_contained(self.resolver.root(), output_dir).await
    }

    /// Resolves a file of the rendered site for serving.
    ///
    /// `sub_path` is `/`-separated and relative to the site root; `None`, an empty path, or a
    /// directory resolves to its `index.html`. The final path is re-checked against the site
    /// directory with symlinks resolved.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotRendered`] if no render has been published yet.
    /// - [`StoreError::PathEscape`] if the sub-path would leave the site directory.
    /// - [`StoreError::NotFound`] if no such file exists.
    pub async fn resolve_rendered_file(
        &self,
        project: &str,
        report: &str,
        sub_path: Option<&str>,
    ) -> StoreResult<PathBuf> {
        let site_dir = self.resolve_rendered_entry_path(project, report).await?;

        let mut path = self
            .resolver
            .resolve_sub_path(&site_dir, sub_path.unwrap_or_default())
            .await?;
        if is_dir(&path).await {
            path = path.join(RENDERED_INDEX_FILE);
        }
        let path = ensure_contained(&site_dir, path).await?;

        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path),
            _ => Err(StoreError::NotFound(format!(
                "file {} in rendered report {project}/{report}",
                sub_path.unwrap_or(RENDERED_INDEX_FILE)
            ))),
        }
    }
}

/// Swaps `staging` in as `output_dir`, keeping the old render until the swap has succeeded.
async fn publish(
    staging: &Path,
    output_dir: &Path,
    report_dir: &Path,
    token: &str,
) -> StoreResult<()> {
    let previous = report_dir.join(format!(".{RENDERED_REPORT_DIR_NAME}.previous-{token}"));

    let had_previous = match fs::rename(output_dir, &previous).await {
        Ok(()) => true,
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => {
            discard(staging).await;
            return Err(StoreError::FileWrite(e));
        }
    };

    if let Err(e) = fs::rename(staging, output_dir).await {
        if had_previous {
            if let Err(restore) = fs::rename(&previous, output_dir).await {
                tracing::error!(
                    "failed to restore previous render {}: {}",
                    output_dir.display(),
                    restore
                );
            }
        }
        discard(staging).await;
        return Err(StoreError::FileWrite(e));
    }

    if had_previous {
        discard(&previous).await;
    }
    Ok(())
}

async fn discard(dir: &Path) {
    if let Err(e) = remove_dir_if_exists(dir).await {
        tracing::warn!("failed to remove {}: {}", dir.display(), e);
    }
}

/// Removes staging leftovers of renders that were interrupted mid-way.
async fn sweep_stale_renders(report_dir: &Path) {
    let prefix = format!(".{RENDERED_REPORT_DIR_NAME}.");
    let Ok(mut entries) = fs::read_dir(report_dir).await else {
        return;
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        let stale = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(&prefix));
        if stale {
            tracing::debug!("removing stale render {}", entry.path().display());
            discard(&entry.path()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Writes an index page listing the input files, or fails on demand.
    #[derive(Debug, Default)]
    struct FakeRenderer {
        fail: bool,
        skip_index: bool,
    }

    #[async_trait]
    impl ReportRenderer for FakeRenderer {
        async fn render(&self, input_dir: &Path, output_dir: &Path) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("allure exploded");
            }

            let mut names = Vec::new();
            for entry in std::fs::read_dir(input_dir)? {
                names.push(entry?.file_name().to_string_lossy().into_owned());
            }
            names.sort();

            std::fs::create_dir_all(output_dir.join("data"))?;
            std::fs::write(output_dir.join("data/files.txt"), names.join("\n"))?;
            if !self.skip_index {
                std::fs::write(output_dir.join(RENDERED_INDEX_FILE), "<html></html>")?;
            }
            Ok(())
        }
    }

    fn test_service(root: &Path, renderer: FakeRenderer) -> RenderService {
        RenderService::new(
            Arc::new(CoreConfig::with_root(root).unwrap()),
            Arc::new(renderer),
            ReportLocks::new(),
        )
    }

    #[tokio::test]
    async fn test_not_rendered_until_first_render() {
        let temp = TempDir::new().unwrap();
        let service = test_service(temp.path(), FakeRenderer::default());

        assert!(matches!(
            service.resolve_rendered_entry_path("demo", "run1").await,
            Err(StoreError::NotRendered(_))
        ));

        let output = service.render("demo", "run1").await.unwrap();
        let site = service
            .resolve_rendered_entry_path("demo", "run1")
            .await
            .unwrap();

        assert_eq!(site, output.output_dir);
        assert!(site.join("index.html").is_file());
        assert!(temp.path().join("demo/reports/run1/allure-results").is_dir());
    }

    #[tokio::test]
    async fn test_path_below_a_file_is_not_found() {
        let temp = TempDir::new().unwrap();
        let service = test_service(temp.path(), FakeRenderer::default());
        service.render("demo", "run1").await.unwrap();

        assert!(matches!(
            service
                .resolve_rendered_file("demo", "run1", Some("index.html/foo"))
                .await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            service
                .resolve_rendered_file("demo", "run1", Some("data/files.txt/x/y"))
                .await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_render_keeps_previous_output() {
        let temp = TempDir::new().unwrap();
        let ok = test_service(temp.path(), FakeRenderer::default());
        ok.render("demo", "run1").await.unwrap();

        let failing = test_service(
            temp.path(),
            FakeRenderer {
                fail: true,
                ..FakeRenderer::default()
            },
        );
        let err = failing
            .render("demo", "run1")
            .await
            .expect_err("render should fail");

        match err {
            StoreError::RenderFailed(message) => assert!(message.contains("allure exploded")),
            other => panic!("expected RenderFailed, got {other:?}"),
        }
        assert!(temp
            .path()
            .join("demo/reports/run1/allure-report/index.html")
            .is_file());
        assert_eq!(
            std::fs::read_dir(temp.path().join("demo/reports/run1"))
                .unwrap()
                .count(),
            2,
            "only allure-results and allure-report should remain"
        );
    }

    #[tokio::test]
    async fn test_render_without_index_fails() {
        let temp = TempDir::new().unwrap();
        let service = test_service(
            temp.path(),
            FakeRenderer {
                skip_index: true,
                ..FakeRenderer::default()
            },
        );

        assert!(matches!(
            service.render("demo", "run1").await,
            Err(StoreError::RenderFailed(_))
        ));
        assert!(matches!(
            service.resolve_rendered_entry_path("demo", "run1").await,
            Err(StoreError::NotRendered(_))
        ));
    }

    #[tokio::test]
    async fn test_rerender_replaces_output_and_sweeps_leftovers() {
        let temp = TempDir::new().unwrap();
        let service = test_service(temp.path(), FakeRenderer::default());
        let results = temp.path().join("demo/reports/run1/allure-results");

        service.render("demo", "run1").await.unwrap();
        std::fs::write(results.join("a.json"), "{}").unwrap();
        std::fs::create_dir_all(temp.path().join("demo/reports/run1/.allure-report.staging-old"))
            .unwrap();
        service.render("demo", "run1").await.unwrap();

        let listing = std::fs::read_to_string(
            temp.path()
                .join("demo/reports/run1/allure-report/data/files.txt"),
        )
        .unwrap();
        assert_eq!(listing, "a.json");
        assert!(!temp
            .path()
            .join("demo/reports/run1/.allure-report.staging-old")
            .exists());
    }

    #[tokio::test]
    async fn test_resolve_rendered_file() {
        let temp = TempDir::new().unwrap();
        let service = test_service(temp.path(), FakeRenderer::default());
        service.render("demo", "run1").await.unwrap();
        let site = temp.path().join("demo/reports/run1/allure-report");

        assert_eq!(
            service
                .resolve_rendered_file("demo", "run1", None)
                .await
                .unwrap(),
            site.join("index.html")
        );
        assert_eq!(
            service
                .resolve_rendered_file("demo", "run1", Some("data/files.txt"))
                .await
                .unwrap(),
            site.join("data/files.txt")
        );
        assert!(matches!(
            service
                .resolve_rendered_file("demo", "run1", Some("data"))
                .await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            service
                .resolve_rendered_file("demo", "run1", Some("missing.js"))
                .await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            service
                .resolve_rendered_file("demo", "run1", Some("../allure-results/a.json"))
                .await,
            Err(StoreError::PathEscape { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_inside_rendered_site_is_not_served() {
        let temp = TempDir::new().unwrap();
        let service = test_service(temp.path(), FakeRenderer::default());
        service.render("demo", "run1").await.unwrap();

        let secret = temp.path().join("secret.txt");
        std::fs::write(&secret, "top secret").unwrap();
        std::os::unix::fs::symlink(
            &secret,
            temp.path().join("demo/reports/run1/allure-report/leak.txt"),
        )
        .unwrap();

        assert!(matches!(
            service
                .resolve_rendered_file("demo", "run1", Some("leak.txt"))
                .await,
            Err(StoreError::PathEscape { .. })
        ));
    }

    #[cfg(unix)]
    mod command_renderer {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        fn write_script(dir: &Path, body: &str) -> PathBuf {
            let script = dir.join("fake-allure.sh");
            std::fs::write(&script, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
            script
        }

        #[tokio::test]
        async fn test_passes_generate_arguments() {
            let temp = TempDir::new().unwrap();
            // $1=generate $2=<input> $3=-o $4=<output>
            let script = write_script(
                temp.path(),
                r#"[ "$1" = generate ] && [ "$3" = -o ] || exit 2
mkdir -p "$4" && echo "<html>$2</html>" > "$4/index.html""#,
            );
            let renderer =
                AllureCommandRenderer::new(script.to_string_lossy(), Duration::from_secs(10));

            let input = temp.path().join("in");
            let output = temp.path().join("out");
            std::fs::create_dir_all(&input).unwrap();

            renderer.render(&input, &output).await.unwrap();
            assert!(output.join("index.html").is_file());
        }

        #[tokio::test]
        async fn test_non_zero_exit_reports_stderr() {
            let temp = TempDir::new().unwrap();
            let script = write_script(temp.path(), "echo 'no results found' >&2\nexit 1");
            let renderer =
                AllureCommandRenderer::new(script.to_string_lossy(), Duration::from_secs(10));

            let err = renderer
                .render(&temp.path().join("in"), &temp.path().join("out"))
                .await
                .expect_err("render should fail");
            assert!(err.to_string().contains("no results found"));
        }

        #[tokio::test]
        async fn test_hanging_renderer_times_out() {
            let temp = TempDir::new().unwrap();
            let script = write_script(temp.path(), "sleep 10");
            let renderer =
                AllureCommandRenderer::new(script.to_string_lossy(), Duration::from_millis(200));

            let started = std::time::Instant::now();
            let err = renderer
                .render(&temp.path().join("in"), &temp.path().join("out"))
                .await
                .expect_err("render should time out");

            assert!(err.to_string().contains("timed out"));
            assert!(started.elapsed() < Duration::from_secs(5));
        }

        #[tokio::test]
        async fn test_missing_command_is_a_render_failure() {
            let temp = TempDir::new().unwrap();
            let service = RenderService::new(
                Arc::new(CoreConfig::with_root(temp.path()).unwrap()),
                Arc::new(AllureCommandRenderer::new(
                    "/nonexistent/allure",
                    Duration::from_secs(1),
                )),
                ReportLocks::new(),
            );

            assert!(matches!(
                service.render("demo", "run1").await,
                Err(StoreError::RenderFailed(_))
            ));
        }
    }
}
