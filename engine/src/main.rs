use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::info;
use vitrine_core::{Catalog, CatalogConfig, DEFAULT_HOST, DEFAULT_PORT};
use vitrine_observability::{
    canonical_logs_dir_from_root, emit_event, init_process_logging, CatalogEvent, ProcessKind,
};
use vitrine_server::{serve, AppState, DEFAULT_BODY_LIMIT};

const SUPPORTED_REORDER_POLICIES: [&str; 2] = ["strict", "append-unlisted"];
const LOG_RETENTION_DAYS: u64 = 14;

#[derive(Parser, Debug)]
#[command(name = "vitrine-engine")]
#[command(about = "Portfolio catalog CMS backend")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Serve {
        #[arg(long, alias = "host", default_value = DEFAULT_HOST)]
        hostname: String,
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,
        #[arg(long, env = "VITRINE_LOGS_DIR")]
        logs_dir: Option<String>,
        /// Maximum accepted request body, in bytes.
        #[arg(long, default_value_t = DEFAULT_BODY_LIMIT)]
        body_limit: usize,
        #[command(flatten)]
        catalog: CatalogArgs,
    },
    /// Print the stored project list as JSON.
    List {
        #[command(flatten)]
        catalog: CatalogArgs,
        #[arg(long, env = "VITRINE_LOGS_DIR")]
        logs_dir: Option<String>,
    },
}

#[derive(Args, Debug, Clone, Default)]
struct CatalogArgs {
    #[arg(long)]
    site_root: Option<String>,
    #[arg(long)]
    config: Option<String>,
    #[arg(long)]
    data_file: Option<String>,
    #[arg(long)]
    image_dir: Option<String>,
    #[arg(long)]
    goods_dir: Option<String>,
    #[arg(long)]
    reorder_policy: Option<String>,
}

impl CatalogArgs {
    fn resolve(self) -> anyhow::Result<CatalogConfig> {
        let config_path = self.config.clone().map(PathBuf::from);
        let overrides = build_cli_overrides(self)?;
        CatalogConfig::resolve(config_path.as_deref(), overrides)
            .context("failed to resolve catalog configuration")
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            hostname,
            port,
            logs_dir,
            body_limit,
            catalog,
        } => {
            let logs_dir = resolve_logs_dir(logs_dir);
            let (_log_guard, log_info) =
                init_process_logging(ProcessKind::Engine, &logs_dir, LOG_RETENTION_DAYS)?;
            emit_event(
                tracing::Level::INFO,
                ProcessKind::Engine,
                CatalogEvent {
                    event: "logging.initialized",
                    component: "engine.main",
                    status: Some("ok"),
                    detail: Some("engine jsonl logging initialized"),
                    ..Default::default()
                },
            );
            info!("engine logging initialized: {:?}", log_info);

            let config = catalog.resolve()?;
            let addr: SocketAddr = format!("{hostname}:{port}")
                .parse()
                .context("invalid hostname or port")?;
            log_startup_paths(&config, &addr);

            let state = AppState::new(config).with_body_limit(body_limit);
            serve(addr, state)
                .await
                .with_context(|| format!("catalog endpoint failed on {addr}"))?;
        }
        Command::List { catalog, logs_dir } => {
            let (_log_guard, _) = init_process_logging(
                ProcessKind::Cli,
                &resolve_logs_dir(logs_dir),
                LOG_RETENTION_DAYS,
            )?;
            let config = catalog.resolve()?;
            let records = Catalog::new(config).with_process(ProcessKind::Cli).list();
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
    }

    Ok(())
}

fn build_cli_overrides(args: CatalogArgs) -> anyhow::Result<Option<serde_json::Value>> {
    let reorder_policy = normalize_and_validate_policy(args.reorder_policy)?;

    let mut root = serde_json::Map::new();
    for (key, value) in [
        ("site_root", args.site_root),
        ("data_file", args.data_file),
        ("image_dir", args.image_dir),
        ("goods_dir", args.goods_dir),
        ("reorder_policy", reorder_policy),
    ] {
        if let Some(value) = value {
            root.insert(key.to_string(), serde_json::Value::String(value));
        }
    }

    if root.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::Value::Object(root)))
}

fn normalize_and_validate_policy(policy: Option<String>) -> anyhow::Result<Option<String>> {
    let Some(policy) = policy else {
        return Ok(None);
    };
    let normalized = policy.trim().to_lowercase().replace('_', "-");
    if SUPPORTED_REORDER_POLICIES.contains(&normalized.as_str()) {
        return Ok(Some(normalized));
    }
    anyhow::bail!(
        "unsupported reorder policy `{}`. supported policies: {}",
        policy,
        SUPPORTED_REORDER_POLICIES.join(", ")
    );
}

fn resolve_logs_dir(explicit: Option<String>) -> PathBuf {
    if let Some(dir) = explicit.filter(|dir| !dir.trim().is_empty()) {
        return PathBuf::from(dir);
    }
    // Never under the site root: that directory is publicly served.
    let root = dirs::data_local_dir()
        .map(|dir| dir.join("vitrine"))
        .unwrap_or_else(|| PathBuf::from(".vitrine"));
    canonical_logs_dir_from_root(&root)
}

fn log_startup_paths(config: &CatalogConfig, addr: &SocketAddr) {
    info!(
        "catalog startup: addr={} site_root={} data={} images={} goods={} reorder={:?}",
        addr,
        display_path(&config.site_root),
        display_path(&config.data_path()),
        display_path(&config.image_root()),
        display_path(&config.goods_root()),
        config.reorder_policy
    );
}

fn display_path(path: &Path) -> String {
    path.display().to_string()
}
