use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics collected by the workers during a seed run
#[derive(Default)]
pub struct SeedStats {
    processed: AtomicU64,
    skipped: AtomicU64,
    ignored_fields: DashMap<String, AtomicU64>,
}

/// Point-in-time copy of [`SeedStats`], taken once all workers are done
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub processed: u64,
    pub skipped: u64,
    pub ignored_fields: BTreeMap<String, u64>,
}

impl SeedStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cumulative processed count including this record.
    pub fn inc_processed(&self) -> u64 {
        self.processed.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn inc_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_ignored<S: AsRef<str>>(&self, fields: &[S]) {
        for field in fields {
            let field = field.as_ref();
            if field.is_empty() {
                continue;
            }
            // Fast path avoids allocating the key once the counter exists.
            if let Some(counter) = self.ignored_fields.get(field) {
                counter.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            self.ignored_fields
                .entry(field.to_string())
                .or_default()
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    pub fn ignored(&self) -> BTreeMap<String, u64> {
        self.ignored_fields
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
            .collect()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            processed: self.processed(),
            skipped: self.skipped(),
            ignored_fields: self.ignored(),
        }
    }
}
