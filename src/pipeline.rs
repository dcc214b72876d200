//! Seed run orchestration: one stream reader, a fixed pool of workers.
//!
//! A run moves through validation, resource opening (input file, store pool,
//! active schema, entity writer) and streaming. Every task of the streaming
//! stage shares one child [`CancellationToken`]; the first fatal error cancels
//! it, later errors are logged and dropped, and the store is closed whatever
//! the outcome.

use crate::config::{PROGRESS_INTERVAL, QUEUE_DEPTH_PER_WORKER};
use crate::error::{ConfigError, RecordError, SeedError, Stage};
use crate::queue::{self, JobReceiver};
use crate::reader::{self, ReadSummary};
use crate::stats::{SeedStats, StatsSnapshot};
use crate::store::{EntityStore, EntityWriter, NewEntity, StoreConnector, StoreError};
use crate::strategy::Strategy;
use futures::stream::{FuturesUnordered, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs::File;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Configuration of a single seed run.
#[derive(Debug, Clone)]
pub struct SeedOptions {
    pub input_path: PathBuf,
    pub table_name: String,
    pub database_url: String,
    /// Worker count; defaults to the available parallelism
    pub concurrency: Option<NonZeroUsize>,
    /// Job queue slots; defaults to twice the worker count
    pub queue_capacity: Option<NonZeroUsize>,
    pub max_line_bytes: usize,
    /// Draw a spinner on stderr while streaming
    pub progress: bool,
}

impl SeedOptions {
    pub fn new(
        input_path: impl Into<PathBuf>,
        table_name: impl Into<String>,
        database_url: impl Into<String>,
    ) -> Self {
        Self {
            input_path: input_path.into(),
            table_name: table_name.into(),
            database_url: database_url.into(),
            concurrency: None,
            queue_capacity: None,
            max_line_bytes: crate::config::DEFAULT_MAX_LINE_BYTES,
            progress: false,
        }
    }

    /// Sets the worker count; zero keeps the default.
    pub fn with_concurrency(mut self, workers: usize) -> Self {
        self.concurrency = NonZeroUsize::new(workers);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.input_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyInputPath);
        }
        if self.table_name.trim().is_empty() {
            return Err(ConfigError::EmptyTableName);
        }
        if self.database_url.trim().is_empty() {
            return Err(ConfigError::EmptyDatabaseUrl);
        }
        if self.max_line_bytes == 0 {
            return Err(ConfigError::ZeroMaxLineBytes);
        }
        Ok(())
    }

    pub fn worker_count(&self) -> usize {
        self.concurrency
            .map(NonZeroUsize::get)
            .unwrap_or_else(default_concurrency)
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
            .map(NonZeroUsize::get)
            .unwrap_or_else(|| self.worker_count() * QUEUE_DEPTH_PER_WORKER)
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct SeedReport {
    pub table: String,
    pub input: PathBuf,
    pub concurrency: usize,
    pub lines_read: u64,
    pub elapsed: Duration,
    #[serde(flatten)]
    pub stats: StatsSnapshot,
}

/// Seeds `opts.table_name` from the line-delimited JSON file at `opts.input_path`.
///
/// Cancelling `cancel` stops the run promptly; a run that was cancelled from
/// outside without any other failure returns [`SeedError::Cancelled`].
pub async fn run<C>(
    opts: &SeedOptions,
    strategy: Arc<Strategy>,
    connector: &C,
    cancel: CancellationToken,
) -> Result<SeedReport, SeedError>
where
    C: StoreConnector,
{
    opts.validate()?;
    strategy.validate()?;

    let input = File::open(&opts.input_path)
        .await
        .map_err(|source| SeedError::OpenInput {
            path: opts.input_path.clone(),
            source,
        })?;

    let store = connector
        .connect(&opts.database_url)
        .await
        .map_err(SeedError::Connect)?;

    let result = seed_with_store(&store, opts, strategy, input, cancel).await;
    store.close().await;
    result
}

async fn seed_with_store<S>(
    store: &S,
    opts: &SeedOptions,
    strategy: Arc<Strategy>,
    input: File,
    cancel: CancellationToken,
) -> Result<SeedReport, SeedError>
where
    S: EntityStore,
{
    let schema = store
        .resolve_active_schema(&opts.table_name)
        .await
        .map_err(|source| SeedError::ResolveSchema {
            table: opts.table_name.clone(),
            source,
        })?;
    let writer = store.entity_writer(schema).map_err(SeedError::Writer)?;

    let workers = opts.worker_count();
    info!(
        table = %opts.table_name,
        file = %opts.input_path.display(),
        strategy = strategy.name(),
        concurrency = workers,
        queue_capacity = opts.queue_capacity(),
        "Starting seed"
    );

    let start = Instant::now();
    let stats = Arc::new(SeedStats::new());
    let result =
        stream_and_insert(input, writer, strategy, Arc::clone(&stats), opts, &cancel).await;
    let snapshot = stats.snapshot();

    match result {
        Ok(summary) => {
            info!(
                table = %opts.table_name,
                file = %opts.input_path.display(),
                concurrency = workers,
                processed = snapshot.processed,
                skipped = snapshot.skipped,
                ignored_fields = ?snapshot.ignored_fields,
                duration_secs = start.elapsed().as_secs_f64(),
                "Seed completed"
            );
            Ok(SeedReport {
                table: opts.table_name.clone(),
                input: opts.input_path.clone(),
                concurrency: workers,
                lines_read: summary.lines,
                elapsed: start.elapsed(),
                stats: snapshot,
            })
        }
        Err(e) => {
            warn!(
                table = %opts.table_name,
                processed = snapshot.processed,
                skipped = snapshot.skipped,
                error = %e,
                "Seed aborted"
            );
            Err(e)
        }
    }
}

/// Per-run state shared by every worker.
struct WorkerContext {
    strategy: Arc<Strategy>,
    writer: Arc<dyn EntityWriter>,
    stats: Arc<SeedStats>,
    progress: ProgressBar,
    table: String,
}

async fn stream_and_insert<R>(
    input: R,
    writer: Arc<dyn EntityWriter>,
    strategy: Arc<Strategy>,
    stats: Arc<SeedStats>,
    opts: &SeedOptions,
    cancel: &CancellationToken,
) -> Result<ReadSummary, SeedError>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let scope = cancel.child_token();
    let (jobs_tx, jobs_rx) = queue::bounded(opts.queue_capacity());
    let progress = if opts.progress {
        make_spinner(&opts.table_name)
    } else {
        ProgressBar::hidden()
    };

    let ctx = Arc::new(WorkerContext {
        strategy,
        writer,
        stats,
        progress: progress.clone(),
        table: opts.table_name.clone(),
    });

    let mut tasks = FuturesUnordered::new();

    let reader_scope = scope.clone();
    let max_line_bytes = opts.max_line_bytes;
    tasks.push(tokio::spawn(async move {
        reader::stream_lines(input, jobs_tx, reader_scope, max_line_bytes)
            .await
            .map(Some)
            .map_err(SeedError::from)
    }));

    for worker_id in 0..opts.worker_count() {
        let ctx = Arc::clone(&ctx);
        let jobs = jobs_rx.clone();
        let worker_scope = scope.clone();
        tasks.push(tokio::spawn(async move {
            run_worker(worker_id, ctx, jobs, worker_scope)
                .await
                .map(|()| None)
        }));
    }
    drop(jobs_rx);

    let mut first_error: Option<SeedError> = None;
    let mut summary = ReadSummary::default();

    while let Some(joined) = tasks.next().await {
        let outcome = joined
            .map_err(|e| SeedError::TaskFailed(e.to_string()))
            .and_then(|result| result);
        match outcome {
            Ok(Some(read)) => summary = read,
            Ok(None) => {}
            Err(e) if first_error.is_none() => {
                scope.cancel();
                first_error = Some(e);
            }
            Err(e) => debug!(error = %e, "Discarding error raised after cancellation"),
        }
    }

    progress.finish_and_clear();

    if let Some(e) = first_error {
        return Err(e);
    }
    if cancel.is_cancelled() {
        return Err(SeedError::Cancelled);
    }
    Ok(summary)
}

async fn run_worker(
    worker_id: usize,
    ctx: Arc<WorkerContext>,
    jobs: JobReceiver,
    cancel: CancellationToken,
) -> Result<(), SeedError> {
    while let Some(job) = jobs.pop(&cancel).await {
        let line = job.line;
        let prepared = ctx
            .strategy
            .prepare(job.raw)
            .map_err(|(stage, source)| SeedError::Record {
                line,
                stage,
                source,
            })?;
        ctx.stats.add_ignored(&prepared.ignored_fields);

        let slug = ctx
            .writer
            .normalize_slug(&prepared.identity.slug)
            .map_err(|e| SeedError::Record {
                line,
                stage: Stage::Slug,
                source: RecordError::SlugRejected(e.to_string()),
            })?;

        let entity = NewEntity {
            entity_id: prepared.identity.entity_id,
            slug,
            payload: prepared.payload,
        };
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            outcome = ctx.writer.create_entity(entity) => outcome,
        };

        match outcome {
            Ok(()) => {
                let processed = ctx.stats.inc_processed();
                // The running total is shared, so exactly one worker sees each multiple.
                if processed % PROGRESS_INTERVAL == 0 {
                    info!(table = %ctx.table, processed, "Progress");
                    ctx.progress.set_position(processed);
                }
            }
            Err(StoreError::AlreadyExists) => {
                ctx.stats.inc_skipped();
            }
            Err(source) => return Err(SeedError::Insert { line, source }),
        }
    }

    debug!(worker_id, "Worker finished");
    Ok(())
}

fn make_spinner(table: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}: {pos} processed ({per_sec})")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(format!("Seeding {table}"));
    pb
}
