use std::sync::Arc;
use std::time::Duration;

use tracing::{Level, event};

use crate::core::{PersistError, Result, Value};
use crate::dialect::Dialect;
use crate::jdbc::batch::{Batch, executable};
use crate::jdbc::bindings::JdbcValueBindings;
use crate::jdbc::{JdbcConnection, JdbcStatement};
use crate::mutation::{MutationOperation, MutationOperationGroup, ParameterUsage, RowIdentity, RowOutcome};
use crate::session::MutationSession;
use crate::stats::Statistics;

/// How one group is driven for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStrategy {
    /// Immediate execution per table, in group order.
    Standard,
    /// Rows are queued on the session batch.
    Batched,
    /// Root insert runs alone so its generated key can feed the other tables.
    IdentityInsert,
}

impl ExecutionStrategy {
    pub fn select(group: &MutationOperationGroup, batch_size: usize) -> Self {
        if group.operations().any(|op| op.returns_generated_keys) {
            Self::IdentityInsert
        } else if batch_size > 1 && group.operations().all(|op| op.batchable) {
            Self::Batched
        } else {
            Self::Standard
        }
    }
}

// ============================================================================
// Prepared statements
// ============================================================================

/// Statements prepared for one non-batched execution, one per table. Closed
/// by [`release`](Self::release) or on drop.
pub struct PreparedStatementGroup {
    statements: Vec<(String, Box<dyn JdbcStatement>)>,
    statistics: Arc<Statistics>,
}

impl PreparedStatementGroup {
    pub fn new(statistics: Arc<Statistics>) -> Self {
        Self {
            statements: Vec::new(),
            statistics,
        }
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub async fn statement_for(
        &mut self,
        connection: &dyn JdbcConnection,
        dialect: &Dialect,
        operation: &MutationOperation,
        query_timeout: Option<Duration>,
    ) -> Result<&mut Box<dyn JdbcStatement>> {
        let idx = match self
            .statements
            .iter()
            .position(|(table, _)| table == operation.table_name())
        {
            Some(idx) => idx,
            None => {
                let mut statement = connection
                    .prepare_statement(&operation.sql, operation.returns_generated_keys)
                    .await
                    .map_err(|e| {
                        dialect.convert_sql_exception(e, "could not prepare statement", &operation.sql)
                    })?;
                self.statistics.statement_prepared();
                if let Some(timeout) = query_timeout {
                    statement.set_query_timeout(timeout);
                }
                self.statements
                    .push((operation.table_name().to_string(), statement));
                self.statements.len() - 1
            }
        };
        Ok(&mut self.statements[idx].1)
    }

    pub fn release(&mut self) {
        for (_, mut statement) in self.statements.drain(..) {
            statement.close();
            self.statistics.statement_closed();
        }
    }
}

impl Drop for PreparedStatementGroup {
    fn drop(&mut self) {
        self.release();
    }
}

// ============================================================================
// Executor
// ============================================================================

/// Drives one operation group through the session's connection.
pub struct MutationExecutor<'a> {
    session: &'a mut MutationSession,
    group: &'a MutationOperationGroup,
    strategy: ExecutionStrategy,
    statements: PreparedStatementGroup,
}

impl<'a> MutationExecutor<'a> {
    pub fn new(session: &'a mut MutationSession, group: &'a MutationOperationGroup) -> Self {
        let strategy = ExecutionStrategy::select(group, session.batch_size());
        let statements = PreparedStatementGroup::new(Arc::clone(session.statistics()));
        Self {
            session,
            group,
            strategy,
            statements,
        }
    }

    pub fn strategy(&self) -> ExecutionStrategy {
        self.strategy
    }

    /// Runs (or queues) the group's statements. Returns the generated key for
    /// identity inserts.
    pub async fn execute(
        &mut self,
        mut bindings: JdbcValueBindings,
        row: &RowIdentity,
    ) -> Result<Option<Value>> {
        match self.strategy {
            ExecutionStrategy::Batched => {
                self.execute_batched(&bindings, row).await?;
                Ok(None)
            }
            ExecutionStrategy::Standard => {
                self.session.flush().await?;
                self.execute_standard(&bindings, row, |_| true).await?;
                Ok(None)
            }
            ExecutionStrategy::IdentityInsert => {
                self.session.flush().await?;
                let key = self.execute_identity_root(&bindings).await?;
                let row = RowIdentity::new(row.entity.clone(), key.clone());
                for operation in self.group.operations().filter(|op| !op.returns_generated_keys) {
                    for column in operation.table.key_columns() {
                        bindings.bind_value(
                            operation.table_name(),
                            column,
                            ParameterUsage::Set,
                            key.clone(),
                        );
                    }
                }
                self.execute_standard(&bindings, &row, |op| !op.returns_generated_keys)
                    .await?;
                Ok(Some(key))
            }
        }
    }

    async fn execute_batched(&mut self, bindings: &JdbcValueBindings, row: &RowIdentity) -> Result<()> {
        let needs_flush = self
            .session
            .pending_batch()
            .is_some_and(|batch| !batch.accepts(self.group, bindings));
        if needs_flush {
            self.session.flush().await?;
        }

        let connection = Arc::clone(self.session.connection());
        let timeout = self.session.query_timeout();
        let batch = self.session.batch_for(self.group.batch_key());
        if let Err(err) = batch.add_to_batch(connection.as_ref(), self.group, bindings, row, timeout).await {
            self.session.abort();
            return Err(err);
        }

        if self.session.pending_batch().is_some_and(Batch::is_full) {
            self.session.flush().await?;
        }
        Ok(())
    }

    async fn execute_standard(
        &mut self,
        bindings: &JdbcValueBindings,
        row: &RowIdentity,
        include: impl Fn(&MutationOperation) -> bool,
    ) -> Result<()> {
        let connection = Arc::clone(self.session.connection());
        let dialect = Arc::clone(self.session.dialect());
        let timeout = self.session.query_timeout();

        for operation in executable(self.group, bindings).filter(|op| include(op)) {
            let values = bindings.resolve(operation)?;
            let statement = self
                .statements
                .statement_for(connection.as_ref(), &dialect, operation, timeout)
                .await?;
            for (slot, value) in operation.parameters.iter().zip(values) {
                statement
                    .set_value(slot.position, value, slot.jdbc_type)
                    .map_err(|e| dialect.convert_sql_exception(e, "could not bind parameter", &operation.sql))?;
            }
            let count = statement.execute_update().await.map_err(|e| {
                dialect.convert_sql_exception(e, "could not execute statement", &operation.sql)
            })?;
            event!(
                Level::TRACE,
                table = %operation.table_name(),
                rows = count,
                "statement executed"
            );
            if let Err(err) = operation
                .expectation
                .verify(RowOutcome::Count(count), 0, &operation.sql, row)
            {
                if err.is_stale_state() {
                    self.session.statistics().optimistic_failure();
                }
                return Err(err);
            }
        }
        Ok(())
    }

    async fn execute_identity_root(&mut self, bindings: &JdbcValueBindings) -> Result<Value> {
        let connection = Arc::clone(self.session.connection());
        let dialect = Arc::clone(self.session.dialect());
        let timeout = self.session.query_timeout();

        let operation = self
            .group
            .operations()
            .find(|op| op.returns_generated_keys)
            .ok_or_else(|| PersistError::ExecutionError("identity insert without a root operation".into()))?;
        let values = bindings.resolve(operation)?;
        let statement = self
            .statements
            .statement_for(connection.as_ref(), &dialect, operation, timeout)
            .await?;
        for (slot, value) in operation.parameters.iter().zip(values) {
            statement
                .set_value(slot.position, value, slot.jdbc_type)
                .map_err(|e| dialect.convert_sql_exception(e, "could not bind parameter", &operation.sql))?;
        }
        statement.execute_update().await.map_err(|e| {
            dialect.convert_sql_exception(e, "could not execute identity insert", &operation.sql)
        })?;
        statement.generated_key().ok_or_else(|| {
            PersistError::ExecutionError(format!(
                "The database returned no natively generated identity value [{}]",
                operation.sql
            ))
        })
    }

    /// Closes statements prepared for non-batched execution. Queued batch
    /// rows stay with the session.
    pub fn release(&mut self) {
        self.statements.release();
    }
}
