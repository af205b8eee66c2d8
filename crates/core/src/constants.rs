//! Constants used throughout the report store core crate.
//!
//! Directory and file names of the on-disk layout live here so that path construction,
//! listing and the API layer agree on them.

/// Default storage root when no explicit directory is configured.
pub const DEFAULT_STORAGE_ROOT: &str = "./storage";

/// Directory (under a project) holding report records and per-report directories.
pub const REPORTS_DIR_NAME: &str = "reports";

/// Directory (under a report) receiving uploaded raw result files.
pub const RAW_RESULTS_DIR_NAME: &str = "allure-results";

/// Directory (under a report) holding the rendered static site.
pub const RENDERED_REPORT_DIR_NAME: &str = "allure-report";

/// Extension of report record files.
pub const RECORD_EXTENSION: &str = "json";

/// Reserved field of a report record carrying its metadata.
pub const METADATA_FIELD: &str = "_metadata";

/// Entry point of a rendered report.
pub const RENDERED_INDEX_FILE: &str = "index.html";

/// Default external rendering command.
pub const DEFAULT_RENDER_COMMAND: &str = "allure";

/// Default render timeout in seconds.
pub const DEFAULT_RENDER_TIMEOUT_SECS: u64 = 300;

/// Maximum length of a single project, report or file name.
pub const MAX_SEGMENT_LEN: usize = 255;
