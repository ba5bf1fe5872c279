use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Target of every [`CatalogEvent`]; the JSONL file keeps these plus warnings.
pub const EVENT_TARGET: &str = "vitrine.obs";

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessKind {
    Engine,
    Cli,
}

impl ProcessKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessKind::Engine => "engine",
            ProcessKind::Cli => "cli",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoggingInitInfo {
    pub process: String,
    pub logs_dir: String,
    pub prefix: String,
    /// 0 keeps log files forever.
    pub retention_days: u64,
    /// Expired files removed while initializing.
    pub pruned_files: usize,
    pub initialized_at: DateTime<Utc>,
}

/// A structured lifecycle event for the catalog (record mutations, asset failures).
#[derive(Debug, Clone, Default, Serialize)]
pub struct CatalogEvent<'a> {
    pub event: &'a str,
    pub component: &'a str,
    pub project_id: Option<u64>,
    pub status: Option<&'a str>,
    pub error_code: Option<&'a str>,
    pub detail: Option<&'a str>,
}

pub fn emit_event(level: Level, process: ProcessKind, event: CatalogEvent<'_>) {
    let project_id = event.project_id.map(|id| id.to_string()).unwrap_or_default();
    match level {
        Level::ERROR => tracing::error!(
            target: EVENT_TARGET,
            process = process.as_str(),
            component = event.component,
            event = event.event,
            project_id = project_id.as_str(),
            status = event.status.unwrap_or(""),
            error_code = event.error_code.unwrap_or(""),
            detail = event.detail.unwrap_or(""),
            "catalog_event"
        ),
        Level::WARN => tracing::warn!(
            target: EVENT_TARGET,
            process = process.as_str(),
            component = event.component,
            event = event.event,
            project_id = project_id.as_str(),
            status = event.status.unwrap_or(""),
            error_code = event.error_code.unwrap_or(""),
            detail = event.detail.unwrap_or(""),
            "catalog_event"
        ),
        _ => tracing::info!(
            target: EVENT_TARGET,
            process = process.as_str(),
            component = event.component,
            event = event.event,
            project_id = project_id.as_str(),
            status = event.status.unwrap_or(""),
            error_code = event.error_code.unwrap_or(""),
            detail = event.detail.unwrap_or(""),
            "catalog_event"
        ),
    }
}

/// Installs console logging on stderr plus a daily JSONL file under `logs_dir`.
///
/// Stdout is left alone so `vitrine-engine list` output stays machine readable.
/// The file is an audit trail: it records catalog events and anything at
/// warning level or above, not the per-request trace chatter.
pub fn init_process_logging(
    process: ProcessKind,
    logs_dir: &Path,
    retention_days: u64,
) -> anyhow::Result<(WorkerGuard, LoggingInitInfo)> {
    fs::create_dir_all(logs_dir)?;
    let pruned_files = prune_expired_logs(logs_dir, process, retention_days)?;

    let file_appender = tracing_appender::rolling::Builder::new()
        .rotation(tracing_appender::rolling::Rotation::DAILY)
        .filename_prefix(log_prefix(process))
        .filename_suffix("jsonl")
        .build(logs_dir)?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let audit_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_current_span(false)
        .with_span_list(false)
        .with_filter(filter_fn(|meta| {
            meta.target() == EVENT_TARGET || *meta.level() <= Level::WARN
        }));

    let console_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_target(true);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(audit_layer)
        .try_init()
        .ok();

    let info = LoggingInitInfo {
        process: process.as_str().to_string(),
        logs_dir: logs_dir.display().to_string(),
        prefix: log_prefix(process),
        retention_days,
        pruned_files,
        initialized_at: Utc::now(),
    };

    Ok((guard, info))
}

fn log_prefix(process: ProcessKind) -> String {
    format!("vitrine.{}", process.as_str())
}

/// Date stamp of a `vitrine.<process>.YYYY-MM-DD.jsonl` file written for `process`.
fn log_file_date(file_name: &str, process: ProcessKind) -> Option<NaiveDate> {
    let stamp = file_name
        .strip_prefix(&log_prefix(process))?
        .strip_prefix('.')?
        .strip_suffix(".jsonl")?;
    NaiveDate::parse_from_str(stamp, "%Y-%m-%d").ok()
}

/// Removes this process's log files dated before the retention window and
/// returns how many went. Other processes' files are never touched.
fn prune_expired_logs(
    logs_dir: &Path,
    process: ProcessKind,
    retention_days: u64,
) -> anyhow::Result<usize> {
    if retention_days == 0 {
        return Ok(0);
    }
    let days = i64::try_from(retention_days).unwrap_or(i64::MAX);
    let cutoff = Utc::now()
        .date_naive()
        .checked_sub_signed(chrono::Duration::days(days))
        .unwrap_or(NaiveDate::MIN);

    let mut pruned = 0;
    for entry in fs::read_dir(logs_dir)?.flatten() {
        let path = entry.path();
        let Some(date) = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| log_file_date(name, process))
        else {
            continue;
        };
        if date < cutoff && path.is_file() && fs::remove_file(&path).is_ok() {
            pruned += 1;
        }
    }
    Ok(pruned)
}

pub fn canonical_logs_dir_from_root(root: &Path) -> PathBuf {
    root.join("logs")
}
