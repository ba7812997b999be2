//! Interpretation cache for queries and native SQL.

pub mod cache;
pub mod interpretation;

pub use cache::{QueryInterpretationCache, ResultShape, normalize_query};
pub use interpretation::{NativeQueryInterpretation, ParameterInterpretation, QueryPlan, StatementKind};

use crate::dialect::Limit;

/// Select plans are cached per normalized text, shape and row window.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlanKey {
    pub query: String,
    pub shape: ResultShape,
    pub first_row: Option<u64>,
    pub max_rows: Option<u64>,
}

impl PlanKey {
    pub fn new(query: &str, shape: ResultShape, limit: &Limit) -> Self {
        Self {
            query: normalize_query(query),
            shape,
            first_row: limit.first_row,
            max_rows: limit.max_rows,
        }
    }
}

/// The cache a persistence unit keeps for native SQL.
pub type NativeQueryCache = QueryInterpretationCache<NativeQueryInterpretation, PlanKey, QueryPlan>;
