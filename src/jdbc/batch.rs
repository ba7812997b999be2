use std::sync::Arc;
use std::time::Duration;

use tracing::{Level, event};

use crate::core::{PersistError, Result};
use crate::dialect::Dialect;
use crate::jdbc::bindings::JdbcValueBindings;
use crate::jdbc::{JdbcConnection, JdbcStatement};
use crate::mutation::{BatchKey, Expectation, MutationOperation, MutationOperationGroup, RowIdentity};
use crate::stats::Statistics;

struct BatchStatement {
    table: String,
    sql: String,
    expectation: Expectation,
    statement: Box<dyn JdbcStatement>,
    rows: Vec<RowIdentity>,
}

/// Pending JDBC batch for one batch key: one prepared statement per table,
/// kept in group order, each remembering which entity row every queued
/// parameter set belongs to.
pub struct Batch {
    key: BatchKey,
    batch_size: usize,
    statements: Vec<BatchStatement>,
    row_count: usize,
    dialect: Arc<Dialect>,
    statistics: Arc<Statistics>,
}

impl Batch {
    pub fn new(
        key: BatchKey,
        batch_size: usize,
        dialect: Arc<Dialect>,
        statistics: Arc<Statistics>,
    ) -> Self {
        Self {
            key,
            batch_size: batch_size.max(1),
            statements: Vec::new(),
            row_count: 0,
            dialect,
            statistics,
        }
    }

    pub fn key(&self) -> &BatchKey {
        &self.key
    }

    /// Entity rows queued so far.
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    pub fn is_full(&self) -> bool {
        self.row_count >= self.batch_size
    }

    /// Whether a row of `group` can join this batch: same key, identical SQL
    /// per table, and no table that would have to be slotted in out of order.
    pub fn accepts(&self, group: &MutationOperationGroup, bindings: &JdbcValueBindings) -> bool {
        if self.key != group.batch_key() {
            return false;
        }
        let mut last_index: Option<usize> = None;
        for operation in executable(group, bindings) {
            match self.position(operation.table_name()) {
                Some(idx) => {
                    if self.statements[idx].sql != operation.sql {
                        return false;
                    }
                    if last_index.is_some_and(|last| idx <= last) {
                        return false;
                    }
                    last_index = Some(idx);
                }
                None if !self.is_empty() => return false,
                None => {}
            }
        }
        true
    }

    fn position(&self, table: &str) -> Option<usize> {
        self.statements.iter().position(|s| s.table == table)
    }

    pub async fn add_to_batch(
        &mut self,
        connection: &dyn JdbcConnection,
        group: &MutationOperationGroup,
        bindings: &JdbcValueBindings,
        row: &RowIdentity,
        query_timeout: Option<Duration>,
    ) -> Result<()> {
        for operation in executable(group, bindings) {
            let values = bindings.resolve(operation)?;
            let idx = match self.position(operation.table_name()) {
                Some(idx) => idx,
                None => {
                    let statement = self.prepare(connection, operation, query_timeout).await?;
                    self.statements.push(BatchStatement {
                        table: operation.table_name().to_string(),
                        sql: operation.sql.clone(),
                        expectation: operation.expectation,
                        statement,
                        rows: Vec::new(),
                    });
                    self.statements.len() - 1
                }
            };

            let dialect = Arc::clone(&self.dialect);
            let entry = &mut self.statements[idx];
            for (slot, value) in operation.parameters.iter().zip(values) {
                entry
                    .statement
                    .set_value(slot.position, value, slot.jdbc_type)
                    .map_err(|e| dialect.convert_sql_exception(e, "could not bind parameter", &entry.sql))?;
            }
            entry
                .statement
                .add_batch()
                .map_err(|e| dialect.convert_sql_exception(e, "could not add to batch", &entry.sql))?;
            entry.rows.push(row.clone());
        }
        self.row_count += 1;
        Ok(())
    }

    async fn prepare(
        &self,
        connection: &dyn JdbcConnection,
        operation: &MutationOperation,
        query_timeout: Option<Duration>,
    ) -> Result<Box<dyn JdbcStatement>> {
        let mut statement = connection
            .prepare_statement(&operation.sql, false)
            .await
            .map_err(|e| {
                self.dialect
                    .convert_sql_exception(e, "could not prepare statement", &operation.sql)
            })?;
        self.statistics.statement_prepared();
        if let Some(timeout) = query_timeout {
            statement.set_query_timeout(timeout);
        }
        Ok(statement)
    }

    /// Executes every statement in table order, verifies each row's count,
    /// then releases the statements whatever the outcome.
    pub async fn execute(&mut self) -> Result<()> {
        let result = self.execute_statements().await;
        self.release();
        result
    }

    async fn execute_statements(&mut self) -> Result<()> {
        for entry in &mut self.statements {
            if entry.rows.is_empty() {
                continue;
            }
            let outcomes = entry.statement.execute_batch().await.map_err(|e| {
                self.dialect
                    .convert_sql_exception(e, "could not execute batch", &entry.sql)
            })?;
            self.statistics.batch_executed();
            event!(
                Level::DEBUG,
                batch_key = %self.key,
                table = %entry.table,
                rows = entry.rows.len(),
                "batch executed"
            );

            if outcomes.len() != entry.rows.len() {
                return Err(PersistError::ExecutionError(format!(
                    "Driver reported {} results for {} batched rows [{}]",
                    outcomes.len(),
                    entry.rows.len(),
                    entry.sql
                )));
            }
            for (position, (outcome, row)) in outcomes.into_iter().zip(&entry.rows).enumerate() {
                if let Err(err) = entry.expectation.verify(outcome, position, &entry.sql, row) {
                    if err.is_stale_state() {
                        self.statistics.optimistic_failure();
                    }
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Closes every statement without executing anything still queued.
    pub fn release(&mut self) {
        for mut entry in self.statements.drain(..) {
            entry.statement.close();
            self.statistics.statement_closed();
        }
        self.row_count = 0;
    }
}

impl Drop for Batch {
    fn drop(&mut self) {
        if !self.statements.is_empty() {
            self.release();
        }
    }
}

/// Operations of `group` that actually run for this call.
pub(crate) fn executable<'g>(
    group: &'g MutationOperationGroup,
    bindings: &'g JdbcValueBindings,
) -> impl Iterator<Item = &'g MutationOperation> {
    group
        .operations()
        .filter(move |operation| !bindings.is_skipped(operation.table_name()))
}
