use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::Serialize;

/// Process-wide counters. Every recording method is a no-op while
/// statistics are disabled.
#[derive(Debug, Default)]
pub struct Statistics {
    enabled: AtomicBool,
    query_plan_cache_hits: AtomicU64,
    query_plan_cache_misses: AtomicU64,
    query_compile_micros: AtomicU64,
    query_compile_max_micros: AtomicU64,
    entity_inserts: AtomicU64,
    entity_updates: AtomicU64,
    entity_deletes: AtomicU64,
    prepared_statements: AtomicU64,
    closed_statements: AtomicU64,
    executed_batches: AtomicU64,
    optimistic_failures: AtomicU64,
}

/// Point-in-time copy of [`Statistics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatisticsSnapshot {
    pub query_plan_cache_hits: u64,
    pub query_plan_cache_misses: u64,
    pub query_compile_micros: u64,
    pub query_compile_max_micros: u64,
    pub entity_inserts: u64,
    pub entity_updates: u64,
    pub entity_deletes: u64,
    pub prepared_statements: u64,
    pub closed_statements: u64,
    pub executed_batches: u64,
    pub optimistic_failures: u64,
}

impl Statistics {
    pub fn new(enabled: bool) -> Self {
        let stats = Self::default();
        stats.enabled.store(enabled, Ordering::Relaxed);
        stats
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    fn bump(&self, counter: &AtomicU64) {
        if self.is_enabled() {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn query_plan_cache_hit(&self) {
        self.bump(&self.query_plan_cache_hits);
    }

    pub fn query_plan_cache_miss(&self, compile_micros: u64) {
        if !self.is_enabled() {
            return;
        }
        self.query_plan_cache_misses.fetch_add(1, Ordering::Relaxed);
        self.query_compile_micros
            .fetch_add(compile_micros, Ordering::Relaxed);
        self.query_compile_max_micros
            .fetch_max(compile_micros, Ordering::Relaxed);
    }

    pub fn entity_insert(&self) {
        self.bump(&self.entity_inserts);
    }

    pub fn entity_update(&self) {
        self.bump(&self.entity_updates);
    }

    pub fn entity_delete(&self) {
        self.bump(&self.entity_deletes);
    }

    pub fn statement_prepared(&self) {
        self.bump(&self.prepared_statements);
    }

    pub fn statement_closed(&self) {
        self.bump(&self.closed_statements);
    }

    pub fn batch_executed(&self) {
        self.bump(&self.executed_batches);
    }

    pub fn optimistic_failure(&self) {
        self.bump(&self.optimistic_failures);
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        StatisticsSnapshot {
            query_plan_cache_hits: load(&self.query_plan_cache_hits),
            query_plan_cache_misses: load(&self.query_plan_cache_misses),
            query_compile_micros: load(&self.query_compile_micros),
            query_compile_max_micros: load(&self.query_compile_max_micros),
            entity_inserts: load(&self.entity_inserts),
            entity_updates: load(&self.entity_updates),
            entity_deletes: load(&self.entity_deletes),
            prepared_statements: load(&self.prepared_statements),
            closed_statements: load(&self.closed_statements),
            executed_batches: load(&self.executed_batches),
            optimistic_failures: load(&self.optimistic_failures),
        }
    }

    pub fn clear(&self) {
        for counter in [
            &self.query_plan_cache_hits,
            &self.query_plan_cache_misses,
            &self.query_compile_micros,
            &self.query_compile_max_micros,
            &self.entity_inserts,
            &self.entity_updates,
            &self.entity_deletes,
            &self.prepared_statements,
            &self.closed_statements,
            &self.executed_batches,
            &self.optimistic_failures,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
