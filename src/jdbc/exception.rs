use std::error::Error;
use std::fmt;

/// Whether the driver raised the exception for a single statement or while
/// executing a batch (in which case the vendor detail usually sits in `next`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlExceptionKind {
    Standard,
    BatchUpdate,
}

/// Driver-level failure: vendor message, optional SQLState, vendor error code
/// and an optional chained exception.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlException {
    pub message: String,
    pub sql_state: Option<String>,
    pub error_code: i32,
    pub kind: SqlExceptionKind,
    pub next: Option<Box<SqlException>>,
}

impl SqlException {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            sql_state: None,
            error_code: 0,
            kind: SqlExceptionKind::Standard,
            next: None,
        }
    }

    /// A batch-update wrapper around the exception that aborted the batch.
    pub fn batch_update(message: impl Into<String>, cause: SqlException) -> Self {
        Self {
            message: message.into(),
            sql_state: cause.sql_state.clone(),
            error_code: cause.error_code,
            kind: SqlExceptionKind::BatchUpdate,
            next: Some(Box::new(cause)),
        }
    }

    pub fn with_sql_state(mut self, sql_state: impl Into<String>) -> Self {
        self.sql_state = Some(sql_state.into());
        self
    }

    pub fn with_error_code(mut self, error_code: i32) -> Self {
        self.error_code = error_code;
        self
    }

    pub fn with_next(mut self, next: SqlException) -> Self {
        self.next = Some(Box::new(next));
        self
    }

    pub fn is_batch_update(&self) -> bool {
        self.kind == SqlExceptionKind::BatchUpdate
    }

    /// This exception followed by every chained `next` exception.
    pub fn chain(&self) -> SqlExceptionChain<'_> {
        SqlExceptionChain {
            current: Some(self),
        }
    }

    /// First SQLState found walking the chain.
    pub fn effective_sql_state(&self) -> Option<&str> {
        self.chain().find_map(|exc| exc.sql_state.as_deref())
    }

    /// Two-character SQLState class (`23` for integrity violations).
    pub fn sql_state_class(&self) -> Option<&str> {
        self.effective_sql_state()
            .filter(|state| state.len() >= 2)
            .map(|state| &state[..2])
    }
}

impl fmt::Display for SqlException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(state) = &self.sql_state {
            write!(f, " (SQLState: {}", state)?;
            if self.error_code != 0 {
                write!(f, ", error code: {}", self.error_code)?;
            }
            write!(f, ")")?;
        } else if self.error_code != 0 {
            write!(f, " (error code: {})", self.error_code)?;
        }
        Ok(())
    }
}

impl Error for SqlException {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.next.as_deref().map(|next| next as &(dyn Error + 'static))
    }
}

pub struct SqlExceptionChain<'a> {
    current: Option<&'a SqlException>,
}

impl<'a> Iterator for SqlExceptionChain<'a> {
    type Item = &'a SqlException;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current?;
        self.current = current.next.as_deref();
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_walks_batch_wrapper() {
        let cause = SqlException::new("ERROR: duplicate key").with_sql_state("23505");
        let batch = SqlException::batch_update("Batch entry 0 was aborted", cause);

        assert!(batch.is_batch_update());
        assert_eq!(batch.chain().count(), 2);
        assert_eq!(batch.sql_state_class(), Some("23"));
    }

    #[test]
    fn test_effective_state_skips_missing() {
        let exc = SqlException::new("outer")
            .with_next(SqlException::new("inner").with_sql_state("40P01"));
        assert_eq!(exc.effective_sql_state(), Some("40P01"));
        assert_eq!(SqlException::new("bare").sql_state_class(), None);
    }

    #[test]
    fn test_display_includes_vendor_detail() {
        let exc = SqlException::new("Unique constraint (informix.uk_email) violated.")
            .with_sql_state("23000")
            .with_error_code(-268);
        assert_eq!(
            exc.to_string(),
            "Unique constraint (informix.uk_email) violated. (SQLState: 23000, error code: -268)"
        );
    }
}
