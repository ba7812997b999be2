use crate::core::{ConstraintKind, PersistError};
use crate::jdbc::SqlException;

/// Which vendor signal a rule keys on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VendorCode {
    SqlState(&'static str),
    ErrorCode(i32),
}

impl VendorCode {
    pub fn matches(&self, exc: &SqlException) -> bool {
        match self {
            Self::SqlState(state) => exc.sql_state.as_deref() == Some(*state),
            Self::ErrorCode(code) => exc.error_code == *code,
        }
    }
}

/// Constraint name lies between `prefix` and `suffix` in the vendor message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintRule {
    pub code: VendorCode,
    pub kind: ConstraintKind,
    pub prefix: &'static str,
    pub suffix: &'static str,
}

impl ConstraintRule {
    pub const fn new(
        code: VendorCode,
        kind: ConstraintKind,
        prefix: &'static str,
        suffix: &'static str,
    ) -> Self {
        Self {
            code,
            kind,
            prefix,
            suffix,
        }
    }

    fn extract(&self, message: &str) -> Option<String> {
        let start = message.find(self.prefix)? + self.prefix.len();
        let rest = &message[start..];
        let end = rest.find(self.suffix)?;
        let qualified = rest[..end].trim();
        let name = match qualified.find('.') {
            Some(dot) => &qualified[dot + 1..],
            None => qualified,
        };
        (!name.is_empty()).then(|| name.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockFailure {
    LockAcquisition,
    PessimisticLock,
    QueryTimeout,
}

/// Per-family translation of driver exceptions into typed errors.
#[derive(Debug, Clone, Default)]
pub struct SqlExceptionTranslator {
    constraint_rules: Vec<ConstraintRule>,
    lock_rules: Vec<(VendorCode, LockFailure)>,
}

impl SqlExceptionTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_constraint_rule(mut self, rule: ConstraintRule) -> Self {
        self.constraint_rules.push(rule);
        self
    }

    pub fn with_lock_rule(mut self, code: VendorCode, failure: LockFailure) -> Self {
        self.lock_rules.push((code, failure));
        self
    }

    /// Kind and (when the message carries it) name of the violated constraint.
    /// The whole chain is searched so batch-update wrappers are seen through.
    pub fn classify(&self, exc: &SqlException) -> Option<(ConstraintKind, Option<String>)> {
        let mut recognized = None;
        for link in exc.chain() {
            for rule in self.constraint_rules.iter().filter(|r| r.code.matches(link)) {
                if let Some(name) = rule.extract(&link.message) {
                    return Some((rule.kind, Some(name)));
                }
                recognized.get_or_insert(rule.kind);
            }
        }
        recognized.map(|kind| (kind, None))
    }

    pub fn extract_constraint_name(&self, exc: &SqlException) -> Option<String> {
        self.classify(exc).and_then(|(_, name)| name)
    }

    fn lock_failure(&self, exc: &SqlException) -> Option<LockFailure> {
        exc.chain().find_map(|link| {
            self.lock_rules
                .iter()
                .find(|(code, _)| code.matches(link))
                .map(|(_, failure)| *failure)
        })
    }

    pub fn convert(&self, exc: SqlException, message: &str, sql: &str) -> PersistError {
        let message = message.to_string();
        let sql = sql.to_string();

        if let Some(failure) = self.lock_failure(&exc) {
            return match failure {
                LockFailure::LockAcquisition => PersistError::LockAcquisition {
                    message,
                    sql,
                    source: exc,
                },
                LockFailure::PessimisticLock => PersistError::PessimisticLock {
                    message,
                    sql,
                    source: exc,
                },
                LockFailure::QueryTimeout => PersistError::QueryTimeout {
                    message,
                    sql,
                    source: exc,
                },
            };
        }

        let classified = self.classify(&exc).or_else(|| {
            (exc.sql_state_class() == Some("23")).then_some((ConstraintKind::Other, None))
        });
        match classified {
            Some((kind, constraint_name)) => PersistError::ConstraintViolation {
                kind,
                constraint_name,
                message,
                sql,
                source: exc,
            },
            None => PersistError::Jdbc {
                message,
                sql,
                source: exc,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn postgres_like() -> SqlExceptionTranslator {
        SqlExceptionTranslator::new()
            .with_constraint_rule(ConstraintRule::new(
                VendorCode::SqlState("23505"),
                ConstraintKind::Unique,
                "constraint \"",
                "\"",
            ))
            .with_lock_rule(VendorCode::SqlState("40P01"), LockFailure::LockAcquisition)
    }

    #[test]
    fn test_extracts_through_batch_wrapper() {
        let cause = SqlException::new(
            "ERROR: duplicate key value violates unique constraint \"uk_email\"",
        )
        .with_sql_state("23505");
        let batch = SqlException::batch_update("Concurrent Error", cause);

        let translator = postgres_like();
        assert_eq!(translator.extract_constraint_name(&batch).as_deref(), Some("uk_email"));
    }

    #[test]
    fn test_owner_prefix_is_stripped() {
        let translator = SqlExceptionTranslator::new().with_constraint_rule(ConstraintRule::new(
            VendorCode::ErrorCode(-268),
            ConstraintKind::Unique,
            "Unique constraint (",
            ") violated.",
        ));
        let exc = SqlException::new("Unique constraint (informix.uk_email) violated.")
            .with_error_code(-268);
        assert_eq!(translator.extract_constraint_name(&exc).as_deref(), Some("uk_email"));
    }

    #[test]
    fn test_unrecognized_code_returns_none() {
        let exc = SqlException::new("constraint \"uk_email\"").with_sql_state("42601");
        assert_eq!(postgres_like().extract_constraint_name(&exc), None);
        assert!(matches!(
            postgres_like().convert(exc, "could not execute statement", "insert"),
            PersistError::Jdbc { .. }
        ));
    }

    #[test]
    fn test_convert_lock_and_integrity_states() {
        let deadlock = SqlException::new("deadlock detected").with_sql_state("40P01");
        assert!(matches!(
            postgres_like().convert(deadlock, "flush", "update t"),
            PersistError::LockAcquisition { .. }
        ));

        let check = SqlException::new("new row violates check").with_sql_state("23514");
        match postgres_like().convert(check, "flush", "insert") {
            PersistError::ConstraintViolation {
                kind,
                constraint_name,
                ..
            } => {
                assert_eq!(kind, ConstraintKind::Other);
                assert_eq!(constraint_name, None);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
