use crate::core::{PersistError, Result, Value};

/// Requested row window: skip `first_row` rows, return at most `max_rows`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Limit {
    pub first_row: Option<u64>,
    pub max_rows: Option<u64>,
}

impl Limit {
    pub fn max_rows(max_rows: u64) -> Self {
        Self {
            first_row: None,
            max_rows: Some(max_rows),
        }
    }

    pub fn window(first_row: u64, max_rows: u64) -> Self {
        Self {
            first_row: Some(first_row),
            max_rows: Some(max_rows),
        }
    }

    pub fn has_offset(&self) -> bool {
        self.first_row.unwrap_or(0) > 0
    }

    pub fn is_empty(&self) -> bool {
        !self.has_offset() && self.max_rows.is_none()
    }
}

/// SQL rewritten for a limit, with the values to bind before and after the
/// original statement's own parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct LimitedSql {
    pub sql: String,
    pub leading_parameters: Vec<Value>,
    pub trailing_parameters: Vec<Value>,
}

impl LimitedSql {
    fn unchanged(sql: &str) -> Self {
        Self {
            sql: sql.to_string(),
            leading_parameters: Vec::new(),
            trailing_parameters: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitHandler {
    /// `... limit ? offset ?`
    LimitOffset,
    /// `select first N ...`; no offset support.
    First,
    /// `select skip M first N ...`; `variable_limit` when the values may be
    /// bound as parameters.
    SkipFirst { variable_limit: bool },
}

impl LimitHandler {
    pub fn supports_offset(&self) -> bool {
        !matches!(self, Self::First)
    }

    pub fn supports_variable_limit(&self) -> bool {
        match self {
            Self::LimitOffset => true,
            Self::First => false,
            Self::SkipFirst { variable_limit } => *variable_limit,
        }
    }

    pub fn apply(&self, sql: &str, limit: &Limit) -> Result<LimitedSql> {
        if limit.is_empty() {
            return Ok(LimitedSql::unchanged(sql));
        }
        let offset = limit.first_row.unwrap_or(0);
        let bound_offset = bind_row_count(offset)?;
        let bound_max_rows = limit.max_rows.map(bind_row_count).transpose()?;

        match self {
            Self::LimitOffset => {
                let mut limited = LimitedSql::unchanged(sql);
                if let Some(max_rows) = bound_max_rows {
                    limited.sql.push_str(" limit ?");
                    limited.trailing_parameters.push(max_rows);
                }
                if offset > 0 {
                    limited.sql.push_str(" offset ?");
                    limited.trailing_parameters.push(bound_offset);
                }
                Ok(limited)
            }
            Self::First => {
                if offset > 0 {
                    return Err(PersistError::UnsupportedCapability(format!(
                        "'first' limit syntax cannot skip {} rows",
                        offset
                    )));
                }
                let clause = match limit.max_rows {
                    Some(max_rows) => format!("first {}", max_rows),
                    None => return Ok(LimitedSql::unchanged(sql)),
                };
                Ok(LimitedSql {
                    sql: insert_after_select(sql, &clause),
                    leading_parameters: Vec::new(),
                    trailing_parameters: Vec::new(),
                })
            }
            Self::SkipFirst { variable_limit } => {
                let mut parts = Vec::new();
                let mut leading = Vec::new();
                if offset > 0 {
                    if *variable_limit {
                        parts.push("skip ?".to_string());
                        leading.push(bound_offset.clone());
                    } else {
                        parts.push(format!("skip {}", offset));
                    }
                }
                if let (Some(max_rows), Some(bound)) = (limit.max_rows, bound_max_rows) {
                    if *variable_limit {
                        parts.push("first ?".to_string());
                        leading.push(bound);
                    } else {
                        parts.push(format!("first {}", max_rows));
                    }
                }
                Ok(LimitedSql {
                    sql: insert_after_select(sql, &parts.join(" ")),
                    leading_parameters: leading,
                    trailing_parameters: Vec::new(),
                })
            }
        }
    }
}

fn bind_row_count(rows: u64) -> Result<Value> {
    i64::try_from(rows).map(Value::Integer).map_err(|_| {
        PersistError::UnsupportedCapability(format!("row count {} exceeds a bindable integer", rows))
    })
}

/// Inserts `clause` after the leading `select` (and `distinct`, when present).
fn insert_after_select(sql: &str, clause: &str) -> String {
    let trimmed = sql.trim_start();
    let indent = &sql[..sql.len() - trimmed.len()];
    let lower = trimmed.to_ascii_lowercase();

    let mut split = if lower.starts_with("select") { "select".len() } else { 0 };
    if split > 0 && lower[split..].trim_start().starts_with("distinct") {
        let gap = lower[split..].len() - lower[split..].trim_start().len();
        split += gap + "distinct".len();
    }
    if split == 0 {
        return format!("{}{} {}", indent, clause, trimmed);
    }
    format!("{}{} {}{}", indent, &trimmed[..split], clause, &trimmed[split..])
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUERY: &str = "select o.id from orders o where o.status = ?";

    #[test]
    fn test_limit_offset_appends_parameters() {
        let limited = LimitHandler::LimitOffset
            .apply(QUERY, &Limit::window(20, 10))
            .unwrap();
        assert_eq!(limited.sql, format!("{} limit ? offset ?", QUERY));
        assert_eq!(
            limited.trailing_parameters,
            vec![Value::Integer(10), Value::Integer(20)]
        );
    }

    #[test]
    fn test_first_rejects_offset() {
        let limited = LimitHandler::First.apply(QUERY, &Limit::max_rows(5)).unwrap();
        assert_eq!(limited.sql, "select first 5 o.id from orders o where o.status = ?");

        let err = LimitHandler::First
            .apply(QUERY, &Limit::window(1, 5))
            .unwrap_err();
        assert!(matches!(err, PersistError::UnsupportedCapability(_)));
    }

    #[test]
    fn test_skip_first_variants() {
        let bound = LimitHandler::SkipFirst { variable_limit: true }
            .apply("select distinct o.id from orders o", &Limit::window(20, 10))
            .unwrap();
        assert_eq!(bound.sql, "select distinct skip ? first ? o.id from orders o");
        assert_eq!(
            bound.leading_parameters,
            vec![Value::Integer(20), Value::Integer(10)]
        );

        let literal = LimitHandler::SkipFirst {
            variable_limit: false,
        }
        .apply(QUERY, &Limit::window(20, 10))
        .unwrap();
        assert_eq!(
            literal.sql,
            "select skip 20 first 10 o.id from orders o where o.status = ?"
        );
        assert!(literal.leading_parameters.is_empty());
    }

    #[test]
    fn test_unbindable_row_counts_are_rejected() {
        let err = LimitHandler::LimitOffset
            .apply(QUERY, &Limit::max_rows(u64::MAX))
            .unwrap_err();
        assert!(matches!(err, PersistError::UnsupportedCapability(_)));

        let err = LimitHandler::SkipFirst { variable_limit: true }
            .apply(QUERY, &Limit::window(u64::MAX, 10))
            .unwrap_err();
        assert!(matches!(err, PersistError::UnsupportedCapability(_)));
    }

    #[test]
    fn test_empty_limit_is_noop() {
        let limited = LimitHandler::First.apply(QUERY, &Limit::default()).unwrap();
        assert_eq!(limited.sql, QUERY);
    }
}
