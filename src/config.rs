/// Emit a progress entry every N processed records (cumulative across workers)
pub const PROGRESS_INTERVAL: u64 = 1000;

/// Job queue slots per worker when no explicit capacity is configured
pub const QUEUE_DEPTH_PER_WORKER: usize = 2;

/// Initial read buffer for the stream reader
pub const INITIAL_LINE_BUFFER: usize = 1024 * 1024;

/// Longest accepted input line; longer lines fail the run
pub const DEFAULT_MAX_LINE_BYTES: usize = 16 * 1024 * 1024;

/// Prefix hashed under the URL namespace to build per-dataset UUID namespaces
pub const NAMESPACE_SEED_PREFIX: &str = "entity-seeder";

/// Upper bound the store accepts for a canonical slug
pub const MAX_SLUG_BYTES: usize = 255;

/// Default connection pool size for the Postgres store
pub const DEFAULT_MAX_CONNECTIONS: u32 = 16;

/// Seconds to wait for a pooled connection before failing
pub const POOL_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Table holding the versioned JSON schemas, one active row per entity table
pub const SCHEMA_REPOSITORY_TABLE: &str = "schema_repository";
