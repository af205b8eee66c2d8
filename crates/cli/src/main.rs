use anyhow::Context;
use clap::{Parser, Subcommand};
use report_store_core::{
    config::{
        render_command_from_env_value, render_timeout_from_env_value, storage_root_from_env_value,
    },
    CoreConfig, ReportContent, ReportStore, UploadFile,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "report-store")]
#[command(about = "Allure report store CLI")]
struct Cli {
    /// Storage root (defaults to $ROOT_DIR, then ./storage)
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    /// Allure executable used by `render` (defaults to $ALLURE_COMMAND, then `allure`)
    #[arg(long, global = true)]
    allure_command: Option<String>,
    /// Render timeout in seconds (defaults to $RENDER_TIMEOUT_SECS, then 300)
    #[arg(long, global = true)]
    render_timeout: Option<u64>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List all projects
    ListProjects,
    /// Create a project
    CreateProject {
        /// Project name
        name: String,
    },
    /// Delete a project and everything in it
    DeleteProject {
        /// Project name
        name: String,
    },
    /// List the reports of a project
    ListReports {
        /// Project name
        project: String,
    },
    /// Create a report record
    CreateReport {
        /// Project name
        project: String,
        /// Report name
        name: String,
        #[command(flatten)]
        content: ContentArgs,
    },
    /// Print a report record as JSON
    GetReport {
        /// Project name
        project: String,
        /// Report name
        name: String,
    },
    /// Replace the content of a report record
    UpdateReport {
        /// Project name
        project: String,
        /// Report name
        name: String,
        #[command(flatten)]
        content: ContentArgs,
    },
    /// Delete a report with its uploads and rendered output
    DeleteReport {
        /// Project name
        project: String,
        /// Report name
        name: String,
    },
    /// Upload raw result files into a report
    Upload {
        /// Project name
        project: String,
        /// Report name
        report: String,
        /// Files to upload; each is stored under its own file name
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Render a report's results into a static Allure site
    Render {
        /// Project name
        project: String,
        /// Report name
        report: String,
    },
    /// Print the directory of a report's rendered site
    RenderedPath {
        /// Project name
        project: String,
        /// Report name
        report: String,
    },
}

#[derive(clap::Args)]
#[group(required = false, multiple = false)]
struct ContentArgs {
    /// Report content as an inline JSON object (default: `{}`)
    #[arg(long)]
    content: Option<String>,
    /// Read report content from a JSON file
    #[arg(long)]
    content_file: Option<PathBuf>,
}

impl ContentArgs {
    fn read(&self) -> anyhow::Result<ReportContent> {
        let raw = match (&self.content, &self.content_file) {
            (Some(inline), _) => inline.clone(),
            (None, Some(path)) => std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?,
            (None, None) => return Ok(ReportContent::new()),
        };
        parse_content(&raw)
    }
}

fn parse_content(raw: &str) -> anyhow::Result<ReportContent> {
    match serde_json::from_str(raw).context("report content is not valid JSON")? {
        serde_json::Value::Object(map) => Ok(map),
        _ => anyhow::bail!("report content must be a JSON object"),
    }
}

fn build_config(cli: &Cli) -> anyhow::Result<CoreConfig> {
    let root = match &cli.root {
        Some(root) => root.clone(),
        None => storage_root_from_env_value(std::env::var("ROOT_DIR").ok()),
    };
    let command = match &cli.allure_command {
        Some(command) => command.clone(),
        None => render_command_from_env_value(std::env::var("ALLURE_COMMAND").ok()),
    };
    let timeout = match cli.render_timeout {
        Some(secs) => Duration::from_secs(secs),
        None => render_timeout_from_env_value(std::env::var("RENDER_TIMEOUT_SECS").ok())?,
    };
    Ok(CoreConfig::new(root, command, timeout)?)
}

async fn read_upload(path: &Path) -> anyhow::Result<UploadFile> {
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("{} has no usable file name", path.display()))?;
    let content = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    Ok(UploadFile::new(filename, content))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let Some(command) = cli.command.as_ref() else {
        println!("Use 'report-store --help' for commands");
        return Ok(());
    };

    let store = ReportStore::with_allure(Arc::new(build_config(&cli)?));

    match command {
        Commands::ListProjects => {
            let projects = store.projects.list_projects().await;
            if projects.is_empty() {
                println!("No projects found.");
            }
            for project in projects {
                println!("{project}");
            }
        }
        Commands::CreateProject { name } => {
            store.projects.create_project(name).await?;
            println!("Created project: {name}");
        }
        Commands::DeleteProject { name } => {
            store.projects.delete_project(name).await?;
            println!("Deleted project: {name}");
        }
        Commands::ListReports { project } => {
            let reports = store.reports.list_reports(project).await?;
            if reports.is_empty() {
                println!("No reports found.");
            }
            for report in reports {
                println!(
                    "Name: {}, Created: {}, Updated: {}",
                    report.name, report.created_at, report.updated_at
                );
            }
        }
        Commands::CreateReport {
            project,
            name,
            content,
        } => {
            let metadata = store
                .reports
                .create_report(project, name, content.read()?)
                .await?;
            println!("Created report {}/{} at {}", project, metadata.name, metadata.created_at);
        }
        Commands::GetReport { project, name } => {
            let record = store.reports.get_report(project, name).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Commands::UpdateReport {
            project,
            name,
            content,
        } => {
            let metadata = store
                .reports
                .update_report(project, name, content.read()?)
                .await?;
            println!("Updated report {}/{} at {}", project, metadata.name, metadata.updated_at);
        }
        Commands::DeleteReport { project, name } => {
            store.reports.delete_report(project, name).await?;
            println!("Deleted report {project}/{name}");
        }
        Commands::Upload {
            project,
            report,
            files,
        } => {
            let mut uploads = Vec::with_capacity(files.len());
            for path in files {
                uploads.push(read_upload(path).await?);
            }
            for file in store.uploads.upload_files(project, report, uploads).await? {
                println!(
                    "{} ({} bytes, sha256 {})",
                    file.path, file.size_bytes, file.sha256
                );
            }
        }
        Commands::Render { project, report } => {
            let output = store.renders.render(project, report).await?;
            println!("Rendered {project}/{report} to {}", output.output_dir.display());
        }
        Commands::RenderedPath { project, report } => {
            let path = store
                .renders
                .resolve_rendered_entry_path(project, report)
                .await?;
            println!("{}", path.display());
        }
    }

    Ok(())
}
