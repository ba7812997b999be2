//! Statement-level abstraction over a relational driver, plus the executor
//! that drives mutation groups through it.

pub mod batch;
pub mod bindings;
pub mod exception;
pub mod executor;
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;

use crate::core::{JdbcType, Value};
use crate::mutation::RowOutcome;

pub use batch::Batch;
pub use bindings::JdbcValueBindings;
pub use exception::{SqlException, SqlExceptionKind};
pub use executor::{ExecutionStrategy, MutationExecutor, PreparedStatementGroup};
pub use memory::{MemoryDatabase, StatementLog, TableDefinition};

pub type SqlResult<T> = std::result::Result<T, SqlException>;

/// A driver connection. Implementations are shared across sessions, so all
/// methods take `&self`.
#[async_trait]
pub trait JdbcConnection: Send + Sync {
    /// `returns_generated_keys` asks the driver to keep the key generated by
    /// an insert for [`JdbcStatement::generated_key`].
    async fn prepare_statement(
        &self,
        sql: &str,
        returns_generated_keys: bool,
    ) -> SqlResult<Box<dyn JdbcStatement>>;
}

/// A prepared statement. Parameter positions are 1-based.
#[async_trait]
pub trait JdbcStatement: Send {
    fn sql(&self) -> &str;

    fn set_value(&mut self, position: usize, value: Value, jdbc_type: JdbcType) -> SqlResult<()>;

    fn set_query_timeout(&mut self, timeout: Duration);

    /// Queues the current parameter set and clears it.
    fn add_batch(&mut self) -> SqlResult<()>;

    async fn execute_update(&mut self) -> SqlResult<u64>;

    /// Runs every queued parameter set, in order.
    async fn execute_batch(&mut self) -> SqlResult<Vec<RowOutcome>>;

    fn generated_key(&self) -> Option<Value>;

    fn close(&mut self);
}
