use anyhow::{Context, Result};
use blastscan::config::Config;
use blastscan::discovery::cache::{Cache, ConfiguredTtlCache, MemoryCache};
use blastscan::discovery::item::Item;
use blastscan::discovery::registry::MetadataRegistry;
use blastscan::discovery::scope::{format_scope, is_wildcard, parse_scope};
use blastscan::discovery::stream::{ChannelSink, QueryResult};
use blastscan::gcp::client::GcpClient;
use blastscan::resource::{self, BootstrapOptions};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

/// Results buffered between a streaming query and the printer
const STREAM_BUFFER: usize = 64;

/// Discover GCP resources and the links between them
#[derive(Parser, Debug)]
#[command(name = "blastscan", version = blastscan::VERSION, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// GCP project to query
    #[arg(short, long, global = true)]
    project: Option<String>,

    /// Zone for zonal resource types
    #[arg(short, long, global = true)]
    location: Option<String>,

    /// Full scope (`project`, `project.zone` or `*` for every built scope),
    /// overrides --project/--location
    #[arg(short, long, global = true)]
    scope: Option<String>,

    /// Skip cached results (fresh results still refresh the cache)
    #[arg(long, global = true)]
    ignore_cache: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json", global = true)]
    output: OutputFormat,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the resource types this build can discover
    Types,
    /// Get one resource by name
    Get { item_type: String, query: String },
    /// List every resource of a type in the scope
    List { item_type: String },
    /// Search resources of a type (identifier, wildcard identifier or type-specific query)
    Search { item_type: String, query: String },
    /// Show the effective configuration
    Config {
        /// Write it to the config file
        #[arg(long)]
        write: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Yaml,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {:?}", log_path))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    // BLASTSCAN_LOG narrows logging per module, e.g. "blastscan::discovery=trace"
    let filter = EnvFilter::try_from_env("BLASTSCAN_LOG")
        .unwrap_or_else(|_| EnvFilter::new(tracing_level.to_string().to_lowercase()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("blastscan started with log level: {:?}", level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("blastscan").join("blastscan.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".blastscan").join("blastscan.log");
    }
    PathBuf::from("blastscan.log")
}

fn print<T: Serialize + ?Sized>(value: &T, format: OutputFormat) -> Result<()> {
    let rendered = match format {
        OutputFormat::Json => serde_json::to_string_pretty(value)?,
        OutputFormat::Yaml => serde_yaml::to_string(value)?,
    };
    println!("{}", rendered.trim_end());
    Ok(())
}

/// Project and zone the adapters are built for
fn resolve_target(args: &Args, config: &Config) -> Result<(String, String)> {
    if let Some(scope) = args.scope.as_ref().filter(|s| !is_wildcard(s)) {
        let (project, zone) = parse_scope(scope).map_err(|e| anyhow::anyhow!("Invalid --scope: {}", e))?;
        let zone = if zone.is_empty() {
            args.location.clone().unwrap_or_else(|| config.effective_zone())
        } else {
            zone
        };
        return Ok((project, zone));
    }

    let project = args
        .project
        .clone()
        .or_else(|| config.effective_project())
        .context("No GCP project configured. Set GOOGLE_CLOUD_PROJECT or use --project")?;
    let zone = args.location.clone().unwrap_or_else(|| config.effective_zone());
    Ok((project, zone))
}

/// Scope to query for `item_type`: the explicit one, or the single scope the
/// type's adapter serves
fn query_scope(args: &Args, adapters: &resource::AdapterSet, item_type: &str, project: &str, zone: &str) -> String {
    if let Some(scope) = &args.scope {
        return scope.clone();
    }
    let zonal = format_scope(project, zone);
    let scopes = adapters.scopes(item_type);
    if scopes.iter().any(|s| s == &zonal) {
        zonal
    } else {
        project.to_string()
    }
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling query");
            token.cancel();
        }
    });
    cancel
}

/// Run a list or search, printing errors as they stream in
async fn run_stream(
    adapters: resource::AdapterSet,
    cancel: CancellationToken,
    item_type: String,
    scope: String,
    search: Option<String>,
    ignore_cache: bool,
) -> Result<(Vec<Item>, usize)> {
    let (sink, mut rx) = ChannelSink::channel(STREAM_BUFFER);
    let task = tokio::spawn(async move {
        match search {
            Some(query) => {
                adapters
                    .search(&cancel, &item_type, &scope, &query, ignore_cache, &sink)
                    .await
            },
            None => adapters.list(&cancel, &item_type, &scope, ignore_cache, &sink).await,
        }
    });

    let mut items = Vec::new();
    let mut errors = 0;
    while let Some(result) = rx.recv().await {
        match result {
            QueryResult::Item(item) => items.push(item),
            QueryResult::Error(err) => {
                errors += 1;
                eprintln!("error: {}", err);
            },
        }
    }
    task.await.context("Query task failed")?;

    Ok((items, errors))
}

fn print_types(registry: &MetadataRegistry, format: OutputFormat) -> Result<()> {
    let all: Vec<_> = registry.all().collect();
    print(&all, format)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level)?;

    let config = Config::load();

    match &args.command {
        Command::Types => {
            let registry = resource::metadata_registry()?;
            return print_types(&registry, args.output);
        },
        Command::Config { write } => {
            if *write {
                config.save()?;
                if let Some(path) = Config::config_path() {
                    eprintln!("Wrote {:?}", path);
                }
            }
            return print(&config, args.output);
        },
        _ => {},
    }

    let (project, zone) = resolve_target(&args, &config)?;
    tracing::info!("Using project: {}, zone: {}", project, zone);

    let cache: Arc<dyn Cache> = Arc::new(ConfiguredTtlCache::new(
        Arc::new(MemoryCache::new()),
        config.ttl_policy(),
    ));
    let mut options = BootstrapOptions::new(vec![project.clone()], vec![zone.clone()], cache);
    options.cache_ttl = config.default_ttl();
    options.max_parallel = config.max_parallel;

    let client = GcpClient::new().await?;
    let adapters = resource::bootstrap(&client, &options)?;
    let cancel = cancel_on_ctrl_c();

    let (item_type, search) = match &args.command {
        Command::Get { item_type, query } => {
            let scope = query_scope(&args, &adapters, item_type, &project, &zone);
            let item = adapters.get(&cancel, item_type, &scope, query, args.ignore_cache).await?;
            return print(&item, args.output);
        },
        Command::List { item_type } => (item_type, None),
        Command::Search { item_type, query } => (item_type, Some(query.clone())),
        Command::Types | Command::Config { .. } => return Ok(()),
    };

    let scope = query_scope(&args, &adapters, item_type, &project, &zone);
    let (items, errors) = run_stream(adapters, cancel, item_type.clone(), scope, search, args.ignore_cache).await?;
    print(&items, args.output)?;

    if errors > 0 {
        anyhow::bail!("{} of the query results were errors", errors);
    }
    Ok(())
}
