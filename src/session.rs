use std::sync::Arc;
use std::time::Duration;

use log::warn;
use tracing::{Instrument, info_span};

use crate::core::Result;
use crate::dialect::Dialect;
use crate::jdbc::{Batch, JdbcConnection};
use crate::mutation::BatchKey;
use crate::stats::Statistics;

/// Per-unit-of-work state: the connection handle and the pending batch.
/// Not shared between tasks.
pub struct MutationSession {
    connection: Arc<dyn JdbcConnection>,
    dialect: Arc<Dialect>,
    statistics: Arc<Statistics>,
    batch_size: usize,
    query_timeout: Option<Duration>,
    batch: Option<Batch>,
}

impl MutationSession {
    pub fn new(
        connection: Arc<dyn JdbcConnection>,
        dialect: Arc<Dialect>,
        statistics: Arc<Statistics>,
    ) -> Self {
        Self {
            connection,
            dialect,
            statistics,
            batch_size: 1,
            query_timeout: None,
            batch: None,
        }
    }

    /// Rows per JDBC batch; 1 disables batching.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_query_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub fn connection(&self) -> &Arc<dyn JdbcConnection> {
        &self.connection
    }

    pub fn dialect(&self) -> &Arc<Dialect> {
        &self.dialect
    }

    pub fn statistics(&self) -> &Arc<Statistics> {
        &self.statistics
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout
    }

    pub fn pending_batch(&self) -> Option<&Batch> {
        self.batch.as_ref().filter(|batch| !batch.is_empty())
    }

    pub fn has_pending_batch(&self) -> bool {
        self.pending_batch().is_some()
    }

    /// The batch rows for `key` are queued on, started if needed.
    pub(crate) fn batch_for(&mut self, key: BatchKey) -> &mut Batch {
        if self.batch.as_ref().is_some_and(|batch| *batch.key() != key) {
            self.abort();
        }
        let dialect = &self.dialect;
        let statistics = &self.statistics;
        let batch_size = self.batch_size;
        self.batch.get_or_insert_with(|| {
            Batch::new(key, batch_size, Arc::clone(dialect), Arc::clone(statistics))
        })
    }

    /// Executes the pending batch, if any.
    pub async fn flush(&mut self) -> Result<()> {
        let Some(mut batch) = self.batch.take() else {
            return Ok(());
        };
        if batch.is_empty() {
            return Ok(());
        }
        let span = info_span!("flush_batch", batch_key = %batch.key(), rows = batch.row_count());
        batch.execute().instrument(span).await
    }

    /// Drops the pending batch without executing it.
    pub fn abort(&mut self) {
        if let Some(mut batch) = self.batch.take() {
            batch.release();
        }
    }
}

impl Drop for MutationSession {
    fn drop(&mut self) {
        if let Some(batch) = self.batch.as_mut().filter(|batch| !batch.is_empty()) {
            warn!(
                "Session closed with {} unflushed row(s) for {}; discarding batch",
                batch.row_count(),
                batch.key()
            );
            batch.release();
        }
    }
}
