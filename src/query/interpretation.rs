use std::collections::BTreeSet;

use sqlparser::ast::Statement;
use sqlparser::dialect::GenericDialect;
use sqlparser::tokenizer::{Token, Tokenizer};

use crate::core::{PersistError, Result};
use crate::dialect::{DatabaseFamily, Dialect, Limit, LimitedSql};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Other,
}

/// Parameter markers found in a native query. Markers inside string
/// literals, comments and `::` casts are not parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterInterpretation {
    /// Number of bare `?` markers.
    pub positional: usize,
    /// Distinct `?N` ordinals.
    pub ordinals: BTreeSet<u32>,
    /// Distinct `:name` parameters, in first-occurrence order.
    pub named: Vec<String>,
}

impl ParameterInterpretation {
    pub fn parse(sql: &str) -> Result<Self> {
        let tokens = Tokenizer::new(&GenericDialect {}, sql)
            .tokenize()
            .map_err(|e| PersistError::ParseError(e.to_string()))?;

        let mut interpretation = Self::default();
        let mut tokens = tokens.iter().peekable();
        while let Some(token) = tokens.next() {
            match token {
                Token::Placeholder(marker) if marker == "?" => interpretation.positional += 1,
                Token::Placeholder(marker) if marker.starts_with('?') => {
                    let ordinal = marker[1..].parse::<u32>().map_err(|_| {
                        PersistError::ParseError(format!("invalid ordinal parameter '{marker}'"))
                    })?;
                    interpretation.ordinals.insert(ordinal);
                }
                Token::Placeholder(marker) if marker.starts_with(':') => {
                    interpretation.add_named(&marker[1..]);
                }
                Token::Colon => {
                    if let Some(Token::Word(word)) = tokens.peek() {
                        interpretation.add_named(&word.value);
                        tokens.next();
                    }
                }
                _ => {}
            }
        }
        Ok(interpretation)
    }

    fn add_named(&mut self, name: &str) {
        if !self.named.iter().any(|existing| existing == name) {
            self.named.push(name.to_string());
        }
    }

    pub fn parameter_count(&self) -> usize {
        self.positional + self.ordinals.len() + self.named.len()
    }

    pub fn is_mixed(&self) -> bool {
        [self.positional > 0, !self.ordinals.is_empty(), !self.named.is_empty()]
            .iter()
            .filter(|present| **present)
            .count()
            > 1
    }
}

/// A native SQL statement checked against the family's grammar.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeQueryInterpretation {
    pub sql: String,
    pub kind: StatementKind,
    pub parameters: ParameterInterpretation,
}

impl NativeQueryInterpretation {
    pub fn parse(sql: &str, dialect: &Dialect) -> Result<Self> {
        let statements = dialect
            .family()
            .parse_sql(sql)
            .map_err(|e| PersistError::ParseError(e.to_string()))?;

        let statement = match statements.as_slice() {
            [statement] => statement,
            [] => return Err(PersistError::ParseError("empty native query".into())),
            _ => {
                return Err(PersistError::ParseError(format!(
                    "expected one statement, found {}",
                    statements.len()
                )));
            }
        };

        let kind = match statement {
            Statement::Query(_) => StatementKind::Select,
            Statement::Insert(_) => StatementKind::Insert,
            Statement::Delete(_) => StatementKind::Delete,
            other if other.to_string().to_ascii_uppercase().starts_with("UPDATE") => {
                StatementKind::Update
            }
            _ => StatementKind::Other,
        };

        if dialect.family() == DatabaseFamily::Informix {
            log::debug!("{dialect} has no native grammar, parsed generically");
        }

        Ok(Self {
            sql: sql.to_string(),
            kind,
            parameters: ParameterInterpretation::parse(sql)?,
        })
    }

    pub fn is_select(&self) -> bool {
        self.kind == StatementKind::Select
    }
}

/// Executable form of a select: the interpretation plus the limit rewrite.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub interpretation: NativeQueryInterpretation,
    pub limit: Limit,
    pub limited: LimitedSql,
}

impl QueryPlan {
    pub fn new(interpretation: NativeQueryInterpretation, limit: Limit, dialect: &Dialect) -> Result<Self> {
        if !interpretation.is_select() && !limit.is_empty() {
            return Err(PersistError::UnsupportedCapability(format!(
                "limits apply to select statements only [{}]",
                interpretation.sql
            )));
        }
        let limited = dialect.limit_handler().apply(&interpretation.sql, &limit)?;
        Ok(Self {
            interpretation,
            limit,
            limited,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::DatabaseVersion;

    #[test]
    fn test_parameter_markers() {
        let params = ParameterInterpretation::parse(
            "select * from t where a = ? and b = :name and c = '?' and d = x::text and e = ?",
        )
        .unwrap();
        assert_eq!(params.positional, 2);
        assert_eq!(params.named, vec!["name".to_string()]);
        assert!(params.ordinals.is_empty());
        assert!(params.is_mixed());
    }

    #[test]
    fn test_ordinal_markers() {
        let params = ParameterInterpretation::parse("select * from t where a = ?1 or b = ?2 or c = ?1").unwrap();
        assert_eq!(params.ordinals.into_iter().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(params.positional, 0);
    }

    #[test]
    fn test_statement_kind() {
        let dialect = Dialect::resolve(DatabaseFamily::MySql, DatabaseVersion::make(8, 0));
        let select = NativeQueryInterpretation::parse("select id from orders where id = ?", &dialect).unwrap();
        assert!(select.is_select());
        let update =
            NativeQueryInterpretation::parse("update orders set status = ? where id = ?", &dialect).unwrap();
        assert_eq!(update.kind, StatementKind::Update);
        assert_eq!(update.parameters.positional, 2);
        assert!(NativeQueryInterpretation::parse("selec id from orders", &dialect).is_err());
    }
}
