use clap::{Parser, Subcommand, ValueEnum};
use market_sync_lib::commands::{
    apply_command, migrate_command, push_command, scrape_command, status_command,
};
use market_sync_lib::{AppConfig, ConfigOverrides, StoreKind};
use serde::Serialize;
use serde_json::{json, Value};
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "market_sync", about = "Scrape Steam market history and merge it into an append-only store")]
struct Cli {
    /// JSON config file (defaults to ./market_sync.json when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Store file; overrides config and MARKET_SYNC_STORE_PATH
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[arg(long, global = true, value_enum)]
    store_kind: Option<StoreKindArg>,

    /// Pretty-print the JSON envelope
    #[arg(long, global = true)]
    pretty: bool,

    /// Debug-level logs on stderr (RUST_LOG still wins)
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StoreKindArg {
    Sqlite,
    Csv,
}

impl From<StoreKindArg> for StoreKind {
    fn from(arg: StoreKindArg) -> Self {
        match arg {
            StoreKindArg::Sqlite => StoreKind::Sqlite,
            StoreKindArg::Csv => StoreKind::Csv,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Extract and enrich saved market history page(s); prints the batch newest first
    Scrape { source: PathBuf },
    /// Merge a sync request body (JSON array) into the store
    Apply {
        /// Read the body from this file instead of stdin
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Scrape page(s) and post the batch to the configured webhook
    Push {
        source: PathBuf,
        #[arg(long)]
        webhook_url: Option<String>,
    },
    /// Show store status
    Status,
    /// Apply embedded sqlite migrations
    Migrate,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    category: String,
    message: String,
    #[serde(rename = "type")]
    error_type: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status")]
enum Envelope {
    #[serde(rename = "success")]
    Success { payload: Value },
    #[serde(rename = "error")]
    Error { error: ErrorBody },
}

fn classify_error_message(message: &str) -> &'static str {
    if message.starts_with("invalid sync request") || message == "empty sync request body" {
        "REQUEST_ERROR"
    } else if message.starts_with("invalid config")
        || message.starts_with("read config")
        || message.contains("webhook url is required")
        || message.contains("must be at least 1")
    {
        "CONFIG_ERROR"
    } else if message.starts_with("sync delivery failed") {
        "DELIVERY_ERROR"
    } else if message.contains("store") || message.contains("database") {
        "STORE_ERROR"
    } else {
        "UNKNOWN_ERROR"
    }
}

fn read_body(input: Option<&PathBuf>) -> Result<String, String> {
    match input {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| format!("read sync request file failed: {e}")),
        None => {
            let mut raw = String::new();
            io::stdin()
                .read_to_string(&mut raw)
                .map_err(|e| format!("read stdin failed: {e}"))?;
            Ok(raw)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

async fn dispatch(cli: Cli) -> Result<Value, String> {
    let webhook_url = match &cli.command {
        Command::Push { webhook_url, .. } => webhook_url.clone(),
        _ => None,
    };
    let overrides = ConfigOverrides {
        config_path: cli.config.clone(),
        store_path: cli.store.clone(),
        store_kind: cli.store_kind.map(StoreKind::from),
        webhook_url,
    };
    let cfg = AppConfig::resolve(&overrides, |key| std::env::var(key).ok())?;

    match &cli.command {
        Command::Scrape { source } => scrape_command(source),
        Command::Apply { input } => {
            let body = read_body(input.as_ref())?;
            apply_command(&cfg, &body)
        }
        Command::Push { source, .. } => push_command(&cfg, source).await,
        Command::Status => status_command(&cfg),
        Command::Migrate => migrate_command(&cfg),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let pretty = cli.pretty;

    let (resp, ok) = match dispatch(cli).await {
        Ok(payload) => (Envelope::Success { payload }, true),
        Err(message) => {
            tracing::error!("{message}");
            let category = classify_error_message(&message).to_string();
            (
                Envelope::Error {
                    error: ErrorBody {
                        category,
                        message,
                        error_type: "MarketSyncError".to_string(),
                    },
                },
                false,
            )
        }
    };

    let out = if pretty {
        serde_json::to_string_pretty(&resp)
    } else {
        serde_json::to_string(&resp)
    }
    .unwrap_or_else(|e| {
        json!({
            "status": "error",
            "error": {
                "category": "SERIALIZE_ERROR",
                "message": format!("serialize response failed: {e}"),
                "type": "SerializeError",
            }
        })
        .to_string()
    });

    println!("{out}");
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
