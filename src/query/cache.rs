use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use lru::LruCache;

use crate::core::{PersistError, Result};
use crate::query::interpretation::ParameterInterpretation;
use crate::stats::Statistics;

/// Result arity a query was interpreted for. The same text interpreted for
/// a multi-valued result is a different entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultShape {
    Single,
    /// Tuple or multi-column results.
    Multi,
}

/// Collapses whitespace runs so formatting differences share one entry.
pub fn normalize_query(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn interpretation_key(query: &str, shape: ResultShape) -> String {
    let normalized = normalize_query(query);
    match shape {
        ResultShape::Single => normalized,
        ResultShape::Multi => format!("multi_{normalized}"),
    }
}

/// Bounded caches for parsed query interpretations, select plans keyed by
/// `K`, and native-query parameter layouts.
pub struct QueryInterpretationCache<I, K, P> {
    max_size: NonZeroUsize,
    interpretations: Mutex<LruCache<String, Arc<I>>>,
    plans: Mutex<LruCache<K, Arc<P>>>,
    native_parameters: Mutex<LruCache<String, Arc<ParameterInterpretation>>>,
    statistics: Arc<Statistics>,
}

impl<I, K: Hash + Eq, P> QueryInterpretationCache<I, K, P> {
    pub fn new(max_size: usize, statistics: Arc<Statistics>) -> Result<Self> {
        let max_size = NonZeroUsize::new(max_size).ok_or_else(|| {
            PersistError::Configuration("query_plan_cache_max_size must be > 0".into())
        })?;
        log::debug!("Starting QueryPlanCache({max_size})");
        Ok(Self {
            max_size,
            interpretations: Mutex::new(LruCache::new(max_size)),
            plans: Mutex::new(LruCache::new(max_size)),
            native_parameters: Mutex::new(LruCache::new(max_size)),
            statistics,
        })
    }

    pub fn max_size(&self) -> usize {
        self.max_size.get()
    }

    /// Cached interpretation of `query` for `shape`, or the one `creator`
    /// produces. The lock is not held while `creator` runs; concurrent misses
    /// may both compile and the later store wins.
    pub fn resolve_interpretation(
        &self,
        query: &str,
        shape: ResultShape,
        creator: impl FnOnce() -> Result<I>,
    ) -> Result<Arc<I>> {
        let key = interpretation_key(query, shape);
        if let Some(cached) = self.interpretations.lock()?.get(&key) {
            self.statistics.query_plan_cache_hit();
            return Ok(Arc::clone(cached));
        }

        let started = Instant::now();
        let interpretation = Arc::new(creator()?);
        self.statistics
            .query_plan_cache_miss(started.elapsed().as_micros() as u64);
        self.interpretations
            .lock()?
            .put(key, Arc::clone(&interpretation));
        Ok(interpretation)
    }

    pub fn resolve_select_query_plan(
        &self,
        key: K,
        creator: impl FnOnce() -> Result<P>,
    ) -> Result<Arc<P>> {
        if let Some(cached) = self.plans.lock()?.get(&key) {
            self.statistics.query_plan_cache_hit();
            return Ok(Arc::clone(cached));
        }

        let started = Instant::now();
        let plan = Arc::new(creator()?);
        self.statistics
            .query_plan_cache_miss(started.elapsed().as_micros() as u64);
        self.plans.lock()?.put(key, Arc::clone(&plan));
        Ok(plan)
    }

    /// Compute-if-absent under the map's lock.
    pub fn resolve_native_query_parameters(
        &self,
        query: &str,
        creator: impl FnOnce(&str) -> Result<ParameterInterpretation>,
    ) -> Result<Arc<ParameterInterpretation>> {
        let mut parameters = self.native_parameters.lock()?;
        if let Some(cached) = parameters.get(query) {
            return Ok(Arc::clone(cached));
        }
        let interpretation = Arc::new(creator(query)?);
        parameters.put(query.to_string(), Arc::clone(&interpretation));
        Ok(interpretation)
    }

    pub fn number_of_cached_interpretations(&self) -> Result<usize> {
        Ok(self.interpretations.lock()?.len())
    }

    pub fn number_of_cached_plans(&self) -> Result<usize> {
        Ok(self.plans.lock()?.len())
    }

    pub fn number_of_cached_parameter_interpretations(&self) -> Result<usize> {
        Ok(self.native_parameters.lock()?.len())
    }

    pub fn close(&self) -> Result<()> {
        log::debug!("Destroying QueryPlanCache");
        self.interpretations.lock()?.clear();
        self.plans.lock()?.clear();
        self.native_parameters.lock()?.clear();
        Ok(())
    }
}

impl<I, K, P> std::fmt::Debug for QueryInterpretationCache<I, K, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryInterpretationCache")
            .field("max_size", &self.max_size)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(max_size: usize) -> QueryInterpretationCache<String, String, String> {
        QueryInterpretationCache::new(max_size, Arc::new(Statistics::new(true))).unwrap()
    }

    #[test]
    fn test_normalize_query() {
        assert_eq!(normalize_query("  select *\n\tfrom  orders "), "select * from orders");
    }

    #[test]
    fn test_lru_eviction() {
        let cache = cache(2);
        for query in ["select 1", "select 2", "select 3"] {
            cache
                .resolve_interpretation(query, ResultShape::Single, || Ok(query.to_string()))
                .unwrap();
        }
        assert_eq!(cache.number_of_cached_interpretations().unwrap(), 2);

        let mut compiled = false;
        cache
            .resolve_interpretation("select 1", ResultShape::Single, || {
                compiled = true;
                Ok("select 1".to_string())
            })
            .unwrap();
        assert!(compiled);
    }

    #[test]
    fn test_creator_failure_is_not_cached() {
        let cache = cache(4);
        let failed = cache.resolve_interpretation("select", ResultShape::Single, || {
            Err(PersistError::ParseError("incomplete".into()))
        });
        assert!(failed.is_err());
        assert_eq!(cache.number_of_cached_interpretations().unwrap(), 0);
    }

    #[test]
    fn test_zero_size_rejected() {
        assert!(QueryInterpretationCache::<String, String, String>::new(
            0,
            Arc::new(Statistics::new(false))
        )
        .is_err());
    }
}
