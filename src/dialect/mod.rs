pub mod constraint;
pub mod ddl_types;
pub mod dml;
pub mod family;
pub mod function;
pub mod identity;
pub mod limit;
pub mod lock;
pub mod temporal;
pub mod version;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlparser::ast::Statement;
use sqlparser::dialect::{
    Dialect as ParserDialect, GenericDialect, MySqlDialect, PostgreSqlDialect,
};
use sqlparser::parser::{Parser, ParserError};
use sqlparser::tokenizer::{Token, Tokenizer};

use crate::core::{JdbcType, PersistError, Result, Size};
use crate::jdbc::SqlException;

pub use constraint::{ConstraintRule, LockFailure, SqlExceptionTranslator, VendorCode};
pub use ddl_types::{CapacityRule, DdlType, DdlTypeRegistry, SizeDefaults};
pub use dml::UpsertStyle;
pub use function::{InverseDistributionFunction, OrderedSetAggregate};
pub use identity::{IdentityColumnSupport, SequenceSupport};
pub use limit::{Limit, LimitHandler, LimitedSql};
pub use lock::{LockMode, LockOptions, LockTimeout, LockingSupport};
pub use temporal::{ExtractPattern, ExtractSupport, FormatStyle, TemporalSupport, TemporalUnit};
pub use version::DatabaseVersion;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseFamily {
    #[serde(alias = "postgres")]
    PostgreSql,
    #[serde(alias = "cockroach")]
    CockroachDb,
    MySql,
    Informix,
}

impl DatabaseFamily {
    pub const ALL: [DatabaseFamily; 4] = [
        Self::PostgreSql,
        Self::CockroachDb,
        Self::MySql,
        Self::Informix,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::PostgreSql => "postgresql",
            Self::CockroachDb => "cockroachdb",
            Self::MySql => "mysql",
            Self::Informix => "informix",
        }
    }

    /// Oldest version the family builders know about.
    pub fn minimum_version(&self) -> DatabaseVersion {
        match self {
            Self::PostgreSql => DatabaseVersion::make(9, 4),
            Self::CockroachDb => DatabaseVersion::make(19, 2),
            Self::MySql => DatabaseVersion::make(5, 7),
            Self::Informix => DatabaseVersion::make(7, 0),
        }
    }

    /// Parser dialect used to validate native SQL for this family.
    pub fn parser_dialect(&self) -> Box<dyn ParserDialect> {
        match self {
            Self::PostgreSql | Self::CockroachDb => Box::new(PostgreSqlDialect {}),
            Self::MySql => Box::new(MySqlDialect {}),
            Self::Informix => Box::new(GenericDialect {}),
        }
    }

    /// Parses JDBC-style SQL with this family's grammar. Where the grammar
    /// reads `?` as an operator, bare markers are renumbered to `$1..$n`.
    pub fn parse_sql(&self, sql: &str) -> std::result::Result<Vec<Statement>, ParserError> {
        let parser_dialect = self.parser_dialect();
        if !parser_dialect.supports_geometric_types() {
            return Parser::parse_sql(&*parser_dialect, sql);
        }
        let tokens = Tokenizer::new(&GenericDialect {}, sql).tokenize()?;
        let mut ordinal = 0;
        let numbered: String = tokens
            .into_iter()
            .map(|token| match token {
                Token::Placeholder(marker) if marker == "?" => {
                    ordinal += 1;
                    format!("${ordinal}")
                }
                other => other.to_string(),
            })
            .collect();
        Parser::parse_sql(&*parser_dialect, &numbered)
    }
}

impl fmt::Display for DatabaseFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for DatabaseFamily {
    type Err = PersistError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgresql" | "postgres" | "pg" => Ok(Self::PostgreSql),
            "cockroachdb" | "cockroach" => Ok(Self::CockroachDb),
            "mysql" => Ok(Self::MySql),
            "informix" => Ok(Self::Informix),
            other => Err(PersistError::Configuration(format!(
                "Unknown database family '{}'",
                other
            ))),
        }
    }
}

/// Where DDL puts the constraint name relative to the constraint clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintNamePosition {
    /// `add constraint fk_x foreign key ...`
    Leading,
    /// `add constraint foreign key ... constraint fk_x`
    Trailing,
}

/// Version-gated feature flags, resolved once per dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub window_functions: bool,
    pub lateral: bool,
    pub order_by_in_subquery: bool,
    pub filter_clause: bool,
}

/// Everything the mutation and query layers need to know about one
/// database family at one version. Built once and shared.
#[derive(Debug, Clone)]
pub struct Dialect {
    pub(crate) family: DatabaseFamily,
    pub(crate) version: DatabaseVersion,
    pub(crate) ddl_types: DdlTypeRegistry,
    pub(crate) max_varchar_length: i64,
    pub(crate) max_varbinary_length: i64,
    pub(crate) temporal: TemporalSupport,
    pub(crate) limit_handler: LimitHandler,
    pub(crate) identity: IdentityColumnSupport,
    pub(crate) sequences: SequenceSupport,
    pub(crate) locking: LockingSupport,
    pub(crate) exceptions: SqlExceptionTranslator,
    pub(crate) upsert_style: UpsertStyle,
    pub(crate) constraint_name_position: ConstraintNamePosition,
    pub(crate) boolean_literals: (&'static str, &'static str),
    pub(crate) capabilities: Capabilities,
    pub(crate) no_columns_insert: &'static str,
    pub(crate) row_id_column: Option<&'static str>,
}

impl Dialect {
    pub fn resolve(family: DatabaseFamily, version: DatabaseVersion) -> Self {
        match family {
            DatabaseFamily::PostgreSql => self::family::postgres::build(version),
            DatabaseFamily::CockroachDb => self::family::cockroach::build(version),
            DatabaseFamily::MySql => self::family::mysql::build(version),
            DatabaseFamily::Informix => self::family::informix::build(version),
        }
    }

    pub fn family(&self) -> DatabaseFamily {
        self.family
    }

    pub fn version(&self) -> DatabaseVersion {
        self.version
    }

    // ========================================================================
    // Types
    // ========================================================================

    pub fn ddl_types(&self) -> &DdlTypeRegistry {
        &self.ddl_types
    }

    pub fn column_type(&self, code: JdbcType) -> &str {
        self.ddl_types.column_type(code)
    }

    pub fn type_name(&self, code: JdbcType, size: Size) -> String {
        self.ddl_types.type_name(code, size)
    }

    pub fn max_varchar_length(&self) -> i64 {
        self.max_varchar_length
    }

    /// `-1` when the family has no bounded varbinary type.
    pub fn max_varbinary_length(&self) -> i64 {
        self.max_varbinary_length
    }

    pub fn default_decimal_precision(&self) -> u32 {
        self.ddl_types.defaults().decimal_precision
    }

    pub fn default_timestamp_precision(&self) -> u32 {
        self.ddl_types.defaults().timestamp_precision
    }

    // ========================================================================
    // Literals and temporal functions
    // ========================================================================

    pub fn temporal(&self) -> &TemporalSupport {
        &self.temporal
    }

    pub fn extract_pattern(&self, unit: TemporalUnit) -> ExtractPattern {
        self.temporal.extract_pattern(unit)
    }

    pub fn render_extract(&self, unit: TemporalUnit, operand: &str) -> String {
        self.temporal.render_extract(unit, operand)
    }

    pub fn datetime_format(&self, pattern: &str) -> String {
        self.temporal.datetime_format(pattern)
    }

    pub fn current_date(&self) -> &str {
        self.temporal.current_date()
    }

    pub fn current_timestamp(&self) -> &str {
        self.temporal.current_timestamp()
    }

    pub fn boolean_literal(&self, value: bool) -> &'static str {
        if value {
            self.boolean_literals.0
        } else {
            self.boolean_literals.1
        }
    }

    pub fn append_boolean_value_string(&self, sql: &mut String, value: bool) {
        sql.push_str(self.boolean_literal(value));
    }

    // ========================================================================
    // DDL fragments
    // ========================================================================

    pub fn add_foreign_key_constraint(
        &self,
        constraint_name: &str,
        foreign_key: &[&str],
        referenced_table: &str,
        primary_key: &[&str],
        references_primary_key: bool,
    ) -> String {
        let mut clause = format!(
            "foreign key ({}) references {}",
            foreign_key.join(", "),
            referenced_table
        );
        if !references_primary_key {
            clause.push_str(&format!(" ({})", primary_key.join(", ")));
        }
        self.name_constraint(constraint_name, &clause)
    }

    pub fn add_primary_key_constraint(&self, constraint_name: &str) -> String {
        self.name_constraint(constraint_name, "primary key ")
    }

    fn name_constraint(&self, constraint_name: &str, clause: &str) -> String {
        match self.constraint_name_position {
            ConstraintNamePosition::Leading => {
                format!(" add constraint {} {}", constraint_name, clause)
            }
            ConstraintNamePosition::Trailing => format!(
                " add constraint {} constraint {}",
                clause.trim_end(),
                constraint_name
            ),
        }
    }

    // ========================================================================
    // Exceptions
    // ========================================================================

    pub fn extract_constraint_name(&self, exc: &SqlException) -> Option<String> {
        self.exceptions.extract_constraint_name(exc)
    }

    pub fn convert_sql_exception(&self, exc: SqlException, message: &str, sql: &str) -> PersistError {
        self.exceptions.convert(exc, message, sql)
    }

    // ========================================================================
    // Capabilities
    // ========================================================================

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn supports_window_functions(&self) -> bool {
        self.capabilities.window_functions
    }

    pub fn supports_lateral(&self) -> bool {
        self.capabilities.lateral
    }

    pub fn supports_order_by_in_subquery(&self) -> bool {
        self.capabilities.order_by_in_subquery
    }

    pub fn supports_filter_clause(&self) -> bool {
        self.capabilities.filter_clause
    }

    pub fn supports_skip_locked(&self) -> bool {
        self.locking.skip_locked
    }

    pub fn supports_nowait(&self) -> bool {
        self.locking.nowait
    }

    pub fn supports_upsert(&self) -> bool {
        self.upsert_style != UpsertStyle::Unsupported
    }

    pub fn upsert_style(&self) -> UpsertStyle {
        self.upsert_style
    }

    pub fn row_id_column(&self) -> Option<&'static str> {
        self.row_id_column
    }

    pub fn limit_handler(&self) -> LimitHandler {
        self.limit_handler
    }

    pub fn for_update_string(&self, options: &LockOptions) -> String {
        self.locking.for_update_string(options)
    }

    pub fn identity_column_support(&self) -> &IdentityColumnSupport {
        &self.identity
    }

    pub fn sequence_support(&self) -> &SequenceSupport {
        &self.sequences
    }

    pub fn render_ordered_set_aggregate(&self, aggregate: &OrderedSetAggregate) -> Result<String> {
        aggregate.render(self.capabilities.filter_clause)
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.family, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_from_str() {
        assert_eq!("Postgres".parse::<DatabaseFamily>().unwrap(), DatabaseFamily::PostgreSql);
        assert_eq!("cockroach".parse::<DatabaseFamily>().unwrap(), DatabaseFamily::CockroachDb);
        assert!("oracle".parse::<DatabaseFamily>().is_err());
    }

    #[test]
    fn test_family_serde_aliases() {
        let family: DatabaseFamily = serde_json::from_str("\"postgres\"").unwrap();
        assert_eq!(family, DatabaseFamily::PostgreSql);
        let family: DatabaseFamily = serde_json::from_str("\"informix\"").unwrap();
        assert_eq!(family, DatabaseFamily::Informix);
    }

    #[test]
    fn test_parse_sql_accepts_jdbc_markers() {
        for family in DatabaseFamily::ALL {
            let statements = family
                .parse_sql("update orders set status=? where id=? and note = '?'")
                .unwrap();
            assert_eq!(statements.len(), 1, "{family}");
        }
        let statements = DatabaseFamily::PostgreSql
            .parse_sql("delete from orders where id=? and version=?")
            .unwrap();
        assert_eq!(
            statements[0].to_string(),
            "DELETE FROM orders WHERE id = $1 AND version = $2"
        );
    }

    #[test]
    fn test_constraint_name_positions() {
        let pg = Dialect::resolve(DatabaseFamily::PostgreSql, DatabaseVersion::make(15, 0));
        assert_eq!(
            pg.add_foreign_key_constraint("fk_order_customer", &["customer_id"], "customers", &["id"], true),
            " add constraint fk_order_customer foreign key (customer_id) references customers"
        );
        assert_eq!(pg.add_primary_key_constraint("pk_orders"), " add constraint pk_orders primary key ");

        let ifx = Dialect::resolve(DatabaseFamily::Informix, DatabaseVersion::make(14, 10));
        assert_eq!(
            ifx.add_foreign_key_constraint("fk_order_customer", &["customer_id"], "customers", &["code"], false),
            " add constraint foreign key (customer_id) references customers (code) constraint fk_order_customer"
        );
        assert_eq!(
            ifx.add_primary_key_constraint("pk_orders"),
            " add constraint primary key constraint pk_orders"
        );
    }
}
