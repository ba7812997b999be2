// ============================================================================
// relpersist Library
// ============================================================================

pub mod config;
pub mod core;
pub mod dialect;
pub mod factory;
pub mod jdbc;
pub mod mutation;
pub mod persister;
pub mod query;
pub mod session;
pub mod stats;

// Re-export main types for convenience
pub use config::PersistenceSettings;
pub use core::{ConstraintKind, JdbcType, PersistError, Result, Size, Value};
pub use dialect::{DatabaseFamily, DatabaseVersion, Dialect};
pub use factory::{EntityCoordinators, PersistenceUnit, PersistenceUnitBuilder};
pub use jdbc::{JdbcConnection, JdbcStatement, MemoryDatabase, SqlException, TableDefinition};
pub use persister::{
    AttributeMapping, ColumnMapping, DeleteRequest, EntityPersister, IdGeneration, InsertRequest,
    OptimisticLockStyle, UpdateRequest,
};
pub use mutation::TableMapping;
pub use query::ResultShape;
pub use session::MutationSession;
pub use stats::{Statistics, StatisticsSnapshot};
