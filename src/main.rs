use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use entity_seeder::config::{DEFAULT_MAX_CONNECTIONS, DEFAULT_MAX_LINE_BYTES};
use entity_seeder::datasets::Dataset;
use entity_seeder::error::ConfigError;
use entity_seeder::pipeline::{self, SeedOptions, SeedReport};
use entity_seeder::store::memory::MemoryStore;
use entity_seeder::store::postgres::PgConnector;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Connection string used for dry runs when none is configured.
const DRY_RUN_URL: &str = "memory://";

#[derive(Parser)]
#[command(name = "entity-seeder")]
#[command(about = "Seed entity tables from line-delimited JSON exports")]
struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Seed Magic: The Gathering cards (key: sId-cId)
    MtgCards(SeedArgs),
    /// Seed Magic: The Gathering sets (key: id)
    MtgSets(SeedArgs),
    /// Seed Pokémon TCG cards (key: tcgLandPublicId)
    PkmCards(SeedArgs),
    /// Seed Pokémon TCG sets (key: id)
    PkmSets(SeedArgs),
}

impl Commands {
    fn into_parts(self) -> (Dataset, SeedArgs) {
        match self {
            Commands::MtgCards(args) => (Dataset::MtgCards, args),
            Commands::MtgSets(args) => (Dataset::MtgSets, args),
            Commands::PkmCards(args) => (Dataset::PkmCards, args),
            Commands::PkmSets(args) => (Dataset::PkmSets, args),
        }
    }
}

#[derive(Args)]
struct SeedArgs {
    /// Path to the JSONL export
    #[arg(short, long)]
    input: PathBuf,

    /// Target entity table (defaults to the dataset's table)
    #[arg(short, long)]
    table: Option<String>,

    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    /// Number of parallel workers (defaults to available parallelism)
    #[arg(short, long)]
    concurrency: Option<NonZeroUsize>,

    /// Job queue capacity (defaults to twice the worker count)
    #[arg(long)]
    queue_capacity: Option<NonZeroUsize>,

    /// Longest accepted input line in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_LINE_BYTES)]
    max_line_bytes: usize,

    /// UUID namespace for entity ids (defaults to the dataset's namespace)
    #[arg(long)]
    namespace: Option<Uuid>,

    /// Maximum PostgreSQL pool connections
    #[arg(long, default_value_t = DEFAULT_MAX_CONNECTIONS)]
    max_connections: u32,

    /// Run against an in-memory store; nothing is persisted
    #[arg(long)]
    dry_run: bool,
}

fn run_seed(dataset: Dataset, args: SeedArgs, format: LogFormat) -> Result<()> {
    let namespace = args
        .namespace
        .unwrap_or_else(|| dataset.default_namespace());
    if namespace.is_nil() {
        return Err(ConfigError::NilNamespace.into());
    }
    let strategy = Arc::new(dataset.strategy(namespace));

    let table = args
        .table
        .unwrap_or_else(|| dataset.default_table().to_string());
    let database_url = match args.database_url {
        Some(url) => url,
        None if args.dry_run => DRY_RUN_URL.to_string(),
        None => String::new(),
    };

    let mut opts = SeedOptions::new(args.input, table, database_url);
    opts.concurrency = args.concurrency;
    opts.queue_capacity = args.queue_capacity;
    opts.max_line_bytes = args.max_line_bytes;
    opts.progress = true;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .thread_name("entity-seeder-worker")
        .enable_io()
        .enable_time()
        .build()?;

    let dry_run = args.dry_run;
    let max_connections = args.max_connections;
    let report = rt
        .block_on(async {
            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, cancelling seed");
                    on_interrupt.cancel();
                }
            });

            if dry_run {
                info!("Dry run: using in-memory store");
                let store = MemoryStore::new().with_open_schema(&opts.table_name);
                pipeline::run(&opts, strategy, &store, cancel).await
            } else {
                let connector = PgConnector::new(max_connections);
                pipeline::run(&opts, strategy, &connector, cancel).await
            }
        })
        .with_context(|| format!("Seeding {dataset} into {} failed", opts.table_name))?;

    match format {
        LogFormat::Text => print_summary(&report, dry_run),
        LogFormat::Json => println!("{}", serde_json::to_string(&report)?),
    }
    Ok(())
}

fn print_summary(report: &SeedReport, dry_run: bool) {
    println!();
    println!("=== Summary ===");
    println!("Table:              {}", report.table);
    println!("Input:              {}", report.input.display());
    println!("Concurrency:        {}", report.concurrency);
    println!("Time:               {:.2}s", report.elapsed.as_secs_f64());
    println!();
    println!("Lines read:         {}", report.lines_read);
    println!("Processed:          {}", report.stats.processed);
    println!("Skipped:            {}", report.stats.skipped);
    if !report.stats.ignored_fields.is_empty() {
        println!("Ignored fields:");
        for (field, count) in &report.stats.ignored_fields {
            println!("  {field:<24}{count}");
        }
    }
    if dry_run {
        println!();
        println!("Dry run: nothing was persisted");
    }
}

fn init_tracing(verbose: u8, format: LogFormat) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    let result = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    if let Err(e) = result {
        eprintln!("Failed to set tracing subscriber: {e}");
    }
}

fn main() -> ExitCode {
    // A missing .env file is fine; the environment may already carry DATABASE_URL.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    let (dataset, args) = cli.command.into_parts();
    match run_seed(dataset, args, cli.log_format) {
        Ok(()) => {
            info!("Completed successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Error: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
