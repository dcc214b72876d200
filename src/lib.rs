//! Entity seeder: streaming, concurrent bulk loading of line-delimited JSON into an entity store
//!
//! Each input line is one record. A run turns every record into an entity of a
//! schema-validated table:
//!
//! 1. **Validation** -- Options and record strategy are checked before any I/O
//! 2. **Resource opening** -- Input file, store pool, active table schema, entity writer
//! 3. **Streaming** -- A single reader feeds a bounded queue drained by N workers; each
//!    worker derives the record's key, slug and entity id and creates the entity
//! 4. **Summary** -- Processed, skipped (already present) and ignored-field counts
//!
//! # Architecture
//!
//! - **Bounded queue** -- The reader blocks when workers fall behind, so memory stays flat
//!   on arbitrarily large inputs
//! - **Shared cancellation** -- One child token per run; the first fatal error cancels the
//!   reader and every sibling worker
//! - **Idempotent inserts** -- Entity ids are version-5 UUIDs of the record key, so a rerun
//!   over the same input skips everything it already created
//! - **Atomic statistics** -- Lock-free counters plus a concurrent map for ignored fields
//! - **Pluggable strategies** -- Per-dataset key, slug, id and field allow-list hooks
//!
//! # Key Modules
//!
//! - [`pipeline`] -- Run orchestration, worker pool and [`pipeline::SeedOptions`]
//! - [`strategy`] -- Record strategy hooks and identity derivation
//! - [`datasets`] -- Built-in strategies for the MTG and Pokémon catalogues
//! - [`reader`] -- Line reader with a hard per-line limit
//! - [`queue`] -- Bounded, cancellable job queue
//! - [`store`] -- Entity store traits with PostgreSQL and in-memory implementations
//! - [`slug`] -- Slug normalization
//! - [`payload`] -- Typed JSON payloads and field helpers
//! - [`stats`] -- Thread-safe counters for a run
//! - [`error`] -- Error types annotated with line and stage
//! - [`config`] -- Constants for reading, queueing and the store
//!
//! # Example Usage
//!
//! ```bash
//! # Seed Magic cards into mtg_cards with 16 workers
//! entity-seeder mtg-cards -i cards.jsonl --concurrency 16
//!
//! # Validate a Pokémon card export without touching the database
//! entity-seeder pkm-cards -i pkm-cards.jsonl --dry-run
//! ```

pub mod config;
pub mod datasets;
pub mod error;
pub mod payload;
pub mod pipeline;
pub mod queue;
pub mod reader;
pub mod slug;
pub mod stats;
pub mod store;
pub mod strategy;

pub use error::SeedError;
pub use pipeline::{run, SeedOptions, SeedReport};
