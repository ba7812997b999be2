//! In-memory driver that parses the DML the dialects render with each
//! family's grammar.
//! Constraint failures are raised with each family's vendor codes and
//! message texts, so the full translation path can be exercised without a
//! database server.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use sqlparser::ast::{
    self as sql, Assignment, AssignmentTarget, BinaryOperator, ConflictTarget, Delete, DoUpdate,
    Expr, FromTable, FunctionArg, FunctionArgExpr, FunctionArguments, Insert, ObjectName,
    ObjectNamePart, OnConflict, OnConflictAction, OnInsert, SetExpr, Statement, TableFactor,
    TableObject, TableWithJoins, UnaryOperator,
};
use tokio::sync::Mutex;

use crate::core::{JdbcType, Value};
use crate::dialect::DatabaseFamily;
use crate::jdbc::{JdbcConnection, JdbcStatement, SqlException, SqlResult};
use crate::mutation::RowOutcome;

const ROW_ID_COLUMNS: [&str; 2] = ["rowid", "ctid"];

// ============================================================================
// Table definitions
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueKey {
    pub name: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub name: String,
    pub columns: Vec<String>,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
    pub cascade_delete: bool,
}

/// Constraints of one in-memory table. Columns are not declared; any column
/// an insert names is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDefinition {
    name: String,
    primary_key: Option<UniqueKey>,
    identity: Option<String>,
    unique_keys: Vec<UniqueKey>,
    foreign_keys: Vec<ForeignKey>,
    not_null: Vec<String>,
}

impl TableDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: None,
            identity: None,
            unique_keys: Vec::new(),
            foreign_keys: Vec::new(),
            not_null: Vec::new(),
        }
    }

    /// Named `<table>_pkey`.
    pub fn primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = Some(UniqueKey {
            name: format!("{}_pkey", self.name),
            columns: to_strings(columns),
        });
        self
    }

    /// Generated from 1 when an insert leaves it out or null.
    pub fn identity(mut self, column: &str) -> Self {
        self.identity = Some(column.to_string());
        self
    }

    pub fn unique(mut self, name: &str, columns: &[&str]) -> Self {
        self.unique_keys.push(UniqueKey {
            name: name.to_string(),
            columns: to_strings(columns),
        });
        self
    }

    pub fn foreign_key(
        mut self,
        name: &str,
        columns: &[&str],
        referenced_table: &str,
        referenced_columns: &[&str],
    ) -> Self {
        self.foreign_keys.push(ForeignKey {
            name: name.to_string(),
            columns: to_strings(columns),
            referenced_table: referenced_table.to_string(),
            referenced_columns: to_strings(referenced_columns),
            cascade_delete: false,
        });
        self
    }

    /// Foreign key with `on delete cascade`.
    pub fn cascading_foreign_key(
        self,
        name: &str,
        columns: &[&str],
        referenced_table: &str,
        referenced_columns: &[&str],
    ) -> Self {
        let mut definition = self.foreign_key(name, columns, referenced_table, referenced_columns);
        if let Some(fk) = definition.foreign_keys.last_mut() {
            fk.cascade_delete = true;
        }
        definition
    }

    pub fn not_null(mut self, column: &str) -> Self {
        self.not_null.push(column.to_string());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

fn to_strings(columns: &[&str]) -> Vec<String> {
    columns.iter().map(|c| c.to_string()).collect()
}

// ============================================================================
// Statement log
// ============================================================================

/// What the driver saw, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatementLog {
    pub prepared: Vec<String>,
    /// SQL of every non-batched execution.
    pub updates: Vec<String>,
    /// SQL and row count of every executed batch.
    pub batches: Vec<(String, usize)>,
    pub timeouts: Vec<Duration>,
}

// ============================================================================
// Parsed statements
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Parameter(usize),
    Literal(Value),
}

#[derive(Debug, Clone, PartialEq)]
enum Predicate {
    Equals(String, Operand),
    IsNull(String),
}

#[derive(Debug, Clone, PartialEq)]
struct UpsertAction {
    /// Key columns of the conflict target; `None` means the primary key.
    conflict_columns: Option<Vec<String>>,
    updates: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
enum Dml {
    Insert {
        table: String,
        columns: Vec<(String, Operand)>,
        upsert: Option<UpsertAction>,
    },
    Update {
        table: String,
        assignments: Vec<(String, Operand)>,
        predicates: Vec<Predicate>,
    },
    Delete {
        table: String,
        predicates: Vec<Predicate>,
    },
}

struct ParseContext {
    parameters: usize,
}

impl ParseContext {
    fn operand(&mut self, expr: &Expr) -> SqlResult<Operand> {
        match expr {
            Expr::Value(value) => match &value.value {
                sql::Value::Placeholder(_) => {
                    self.parameters += 1;
                    Ok(Operand::Parameter(self.parameters))
                }
                other => literal(other)
                    .map(Operand::Literal)
                    .ok_or_else(|| syntax_error(other)),
            },
            Expr::UnaryOp {
                op: UnaryOperator::Minus,
                expr: inner,
            } => match self.operand(inner)? {
                Operand::Literal(Value::Integer(n)) => Ok(Operand::Literal(Value::Integer(-n))),
                Operand::Literal(Value::Float(f)) => Ok(Operand::Literal(Value::Float(-f))),
                _ => Err(syntax_error(expr)),
            },
            Expr::Nested(inner) => self.operand(inner),
            other => Err(syntax_error(other)),
        }
    }

    /// Flattens a conjunction of `col = x` and `col is null` terms.
    fn predicates(&mut self, expr: &Expr, out: &mut Vec<Predicate>) -> SqlResult<()> {
        match expr {
            Expr::BinaryOp {
                left,
                op: BinaryOperator::And,
                right,
            } => {
                self.predicates(left, out)?;
                self.predicates(right, out)
            }
            Expr::BinaryOp {
                left,
                op: BinaryOperator::Eq,
                right,
            } => {
                out.push(Predicate::Equals(column_name(left)?, self.operand(right)?));
                Ok(())
            }
            Expr::IsNull(column) => {
                out.push(Predicate::IsNull(column_name(column)?));
                Ok(())
            }
            Expr::Nested(inner) => self.predicates(inner, out),
            other => Err(syntax_error(other)),
        }
    }

    fn selection(&mut self, selection: Option<&Expr>) -> SqlResult<Vec<Predicate>> {
        let mut predicates = Vec::new();
        if let Some(expr) = selection {
            self.predicates(expr, &mut predicates)?;
        }
        Ok(predicates)
    }

    fn assignments(&mut self, assignments: &[Assignment]) -> SqlResult<Vec<(String, Operand)>> {
        assignments
            .iter()
            .map(|assignment| Ok((assigned_column(assignment)?, self.operand(&assignment.value)?)))
            .collect()
    }

    fn insert(&mut self, insert: &Insert) -> SqlResult<Dml> {
        let table = match &insert.table {
            TableObject::TableName(name) => object_name(name)?,
            other => return Err(syntax_error(other)),
        };

        let row: &[Expr] = match insert.source.as_deref().map(|query| query.body.as_ref()) {
            None => &[][..],
            Some(SetExpr::Values(values)) => match values.rows.as_slice() {
                [row] => row.as_slice(),
                _ => return Err(syntax_error(&insert.table)),
            },
            Some(other) => return Err(syntax_error(other)),
        };
        // Without a column list the row only carries serial placeholders.
        let mut columns = Vec::with_capacity(insert.columns.len());
        if !insert.columns.is_empty() {
            if insert.columns.len() != row.len() {
                return Err(SqlException::new("INSERT has more target columns than expressions")
                    .with_sql_state("42601"));
            }
            for (column, expr) in insert.columns.iter().zip(row) {
                columns.push((column.value.clone(), self.operand(expr)?));
            }
        }

        let upsert = match &insert.on {
            None => None,
            Some(OnInsert::OnConflict(OnConflict {
                conflict_target,
                action: OnConflictAction::DoUpdate(DoUpdate {
                    assignments,
                    selection: None,
                }),
            })) => {
                let conflict_columns = match conflict_target {
                    None => None,
                    Some(ConflictTarget::Columns(idents)) => {
                        Some(idents.iter().map(|ident| ident.value.clone()).collect())
                    }
                    Some(other) => return Err(syntax_error(other)),
                };
                Some(UpsertAction {
                    conflict_columns,
                    updates: inserted_columns(assignments)?,
                })
            }
            Some(OnInsert::DuplicateKeyUpdate(assignments)) => Some(UpsertAction {
                conflict_columns: None,
                updates: inserted_columns(assignments)?,
            }),
            Some(other) => return Err(syntax_error(other)),
        };

        Ok(Dml::Insert {
            table,
            columns,
            upsert,
        })
    }
}

fn literal(value: &sql::Value) -> Option<Value> {
    match value {
        sql::Value::Null => Some(Value::Null),
        sql::Value::Boolean(b) => Some(Value::Boolean(*b)),
        sql::Value::Number(text, _) => text
            .parse::<i64>()
            .map(Value::Integer)
            .ok()
            .or_else(|| text.parse::<f64>().ok().map(Value::Float)),
        sql::Value::SingleQuotedString(text) => Some(Value::Text(text.clone())),
        _ => None,
    }
}

fn syntax_error(fragment: &dyn fmt::Display) -> SqlException {
    SqlException::new(format!("syntax error at or near \"{fragment}\"")).with_sql_state("42601")
}

fn object_name(name: &ObjectName) -> SqlResult<String> {
    match name.0.last() {
        Some(ObjectNamePart::Identifier(ident)) => Ok(ident.value.clone()),
        _ => Err(syntax_error(name)),
    }
}

fn column_name(expr: &Expr) -> SqlResult<String> {
    match expr {
        Expr::Identifier(ident) => Ok(ident.value.clone()),
        Expr::CompoundIdentifier(parts) => parts
            .last()
            .map(|ident| ident.value.clone())
            .ok_or_else(|| syntax_error(expr)),
        other => Err(syntax_error(other)),
    }
}

fn assigned_column(assignment: &Assignment) -> SqlResult<String> {
    match &assignment.target {
        AssignmentTarget::ColumnName(name) => object_name(name),
        AssignmentTarget::Tuple(_) => Err(syntax_error(assignment)),
    }
}

fn table_name(table: &TableWithJoins) -> SqlResult<String> {
    match &table.relation {
        TableFactor::Table { name, .. } if table.joins.is_empty() => object_name(name),
        _ => Err(syntax_error(table)),
    }
}

/// Column an upsert assignment copies from the proposed row:
/// `excluded.col` or `values(col)`.
fn inserted_column(expr: &Expr) -> Option<&str> {
    match expr {
        Expr::CompoundIdentifier(parts) => match parts.as_slice() {
            [source, column] if source.value.eq_ignore_ascii_case("excluded") => {
                Some(column.value.as_str())
            }
            _ => None,
        },
        Expr::Function(function) if function.name.to_string().eq_ignore_ascii_case("values") => {
            match &function.args {
                FunctionArguments::List(list) => match list.args.as_slice() {
                    [FunctionArg::Unnamed(FunctionArgExpr::Expr(Expr::Identifier(column)))] => {
                        Some(column.value.as_str())
                    }
                    _ => None,
                },
                _ => None,
            }
        }
        _ => None,
    }
}

fn inserted_columns(assignments: &[Assignment]) -> SqlResult<Vec<String>> {
    assignments
        .iter()
        .map(|assignment| {
            let column = assigned_column(assignment)?;
            match inserted_column(&assignment.value) {
                Some(source) if source == column => Ok(column),
                _ => Err(syntax_error(assignment)),
            }
        })
        .collect()
}

fn parse(family: DatabaseFamily, sql: &str) -> SqlResult<(Dml, usize)> {
    let is_merge = sql
        .trim_start()
        .get(..5)
        .is_some_and(|keyword| keyword.eq_ignore_ascii_case("merge"));
    if is_merge {
        return Err(
            SqlException::new("MERGE is not supported by the in-memory driver").with_sql_state("0A000"),
        );
    }

    let statements = family
        .parse_sql(sql)
        .map_err(|e| SqlException::new(format!("syntax error: {e}")).with_sql_state("42601"))?;
    let statement = match statements.as_slice() {
        [statement] => statement,
        _ => return Err(syntax_error(&sql)),
    };

    let mut ctx = ParseContext { parameters: 0 };
    let dml = match statement {
        Statement::Insert(insert) => ctx.insert(insert)?,
        Statement::Update {
            table,
            assignments,
            from: None,
            selection,
            ..
        } => Dml::Update {
            table: table_name(table)?,
            assignments: ctx.assignments(assignments)?,
            predicates: ctx.selection(selection.as_ref())?,
        },
        Statement::Delete(Delete {
            from: FromTable::WithFromKeyword(tables),
            selection,
            ..
        }) => match tables.as_slice() {
            [table] => Dml::Delete {
                table: table_name(table)?,
                predicates: ctx.selection(selection.as_ref())?,
            },
            _ => return Err(syntax_error(statement)),
        },
        other => return Err(syntax_error(other)),
    };
    Ok((dml, ctx.parameters))
}

// ============================================================================
// Storage and constraint enforcement
// ============================================================================

#[derive(Debug, Clone)]
struct StoredRow {
    rowid: i64,
    values: HashMap<String, Value>,
}

impl StoredRow {
    fn value(&self, column: &str) -> Value {
        if ROW_ID_COLUMNS.contains(&column.to_ascii_lowercase().as_str()) {
            return Value::Integer(self.rowid);
        }
        self.values.get(column).cloned().unwrap_or(Value::Null)
    }

    fn key(&self, columns: &[String]) -> Option<Vec<Value>> {
        let values: Vec<Value> = columns.iter().map(|c| self.value(c)).collect();
        (!values.iter().any(Value::is_null)).then_some(values)
    }
}

#[derive(Debug)]
struct TableData {
    definition: TableDefinition,
    rows: Vec<StoredRow>,
    next_identity: i64,
}

#[derive(Debug, Default)]
struct DatabaseState {
    tables: HashMap<String, TableData>,
    next_rowid: i64,
    log: StatementLog,
    failures: Vec<(String, SqlException)>,
    success_no_info: bool,
}

fn resolve(operand: &Operand, parameters: &[Value]) -> Value {
    match operand {
        Operand::Parameter(idx) => parameters.get(idx - 1).cloned().unwrap_or(Value::Null),
        Operand::Literal(value) => value.clone(),
    }
}

fn row_matches(row: &StoredRow, predicates: &[Predicate], parameters: &[Value]) -> bool {
    predicates.iter().all(|predicate| match predicate {
        Predicate::IsNull(column) => row.value(column).is_null(),
        Predicate::Equals(column, operand) => {
            let expected = resolve(operand, parameters);
            !expected.is_null() && row.value(column) == expected
        }
    })
}

/// Vendor-styled constraint failures.
struct Violations {
    family: DatabaseFamily,
}

impl Violations {
    fn unique(&self, table: &str, key: &UniqueKey, primary: bool, values: &[Value]) -> SqlException {
        let rendered: Vec<String> = values.iter().map(ToString::to_string).collect();
        match self.family {
            DatabaseFamily::PostgreSql | DatabaseFamily::CockroachDb => SqlException::new(format!(
                "ERROR: duplicate key value violates unique constraint \"{}\"\n  Detail: Key ({})=({}) already exists.",
                key.name,
                key.columns.join(", "),
                rendered.join(", ")
            ))
            .with_sql_state("23505"),
            DatabaseFamily::MySql => {
                let name = if primary { "PRIMARY" } else { key.name.as_str() };
                SqlException::new(format!(
                    "Duplicate entry '{}' for key '{table}.{name}'",
                    rendered.join("-")
                ))
                .with_sql_state("23000")
                .with_error_code(1062)
            }
            DatabaseFamily::Informix => SqlException::new(format!(
                "Unique constraint (informix.{}) violated.",
                key.name
            ))
            .with_sql_state("23000")
            .with_error_code(-268),
        }
    }

    fn missing_parent(&self, table: &str, fk: &ForeignKey) -> SqlException {
        match self.family {
            DatabaseFamily::PostgreSql | DatabaseFamily::CockroachDb => SqlException::new(format!(
                "ERROR: insert or update on table \"{table}\" violates foreign key constraint \"{}\"",
                fk.name
            ))
            .with_sql_state("23503"),
            DatabaseFamily::MySql => SqlException::new(format!(
                "Cannot add or update a child row: a foreign key constraint fails (`{table}`, CONSTRAINT `{}` FOREIGN KEY (`{}`) REFERENCES `{}` (`{}`))",
                fk.name,
                fk.columns.join("`, `"),
                fk.referenced_table,
                fk.referenced_columns.join("`, `")
            ))
            .with_sql_state("23000")
            .with_error_code(1452),
            DatabaseFamily::Informix => SqlException::new(format!(
                "Missing key in referenced table for referential constraint (informix.{}).",
                fk.name
            ))
            .with_sql_state("23000")
            .with_error_code(-691),
        }
    }

    fn still_referenced(
        &self,
        parent: &TableDefinition,
        child: &str,
        fk: &ForeignKey,
    ) -> SqlException {
        match self.family {
            DatabaseFamily::PostgreSql | DatabaseFamily::CockroachDb => SqlException::new(format!(
                "ERROR: update or delete on table \"{}\" violates foreign key constraint \"{}\" on table \"{child}\"",
                parent.name, fk.name
            ))
            .with_sql_state("23503"),
            DatabaseFamily::MySql => SqlException::new(format!(
                "Cannot delete or update a parent row: a foreign key constraint fails (`{child}`, CONSTRAINT `{}` FOREIGN KEY (`{}`) REFERENCES `{}` (`{}`))",
                fk.name,
                fk.columns.join("`, `"),
                parent.name,
                fk.referenced_columns.join("`, `")
            ))
            .with_sql_state("23000")
            .with_error_code(1451),
            DatabaseFamily::Informix => {
                let pk_name = parent
                    .primary_key
                    .as_ref()
                    .map_or(fk.name.as_str(), |pk| pk.name.as_str());
                SqlException::new(format!(
                    "Key value for constraint (informix.{pk_name}) is still being referenced."
                ))
                .with_sql_state("23000")
                .with_error_code(-692)
            }
        }
    }

    fn not_null(&self, table: &str, column: &str) -> SqlException {
        match self.family {
            DatabaseFamily::PostgreSql | DatabaseFamily::CockroachDb => SqlException::new(format!(
                "ERROR: null value in column \"{column}\" of relation \"{table}\" violates not-null constraint"
            ))
            .with_sql_state("23502"),
            DatabaseFamily::MySql => SqlException::new(format!("Column '{column}' cannot be null"))
                .with_sql_state("23000")
                .with_error_code(1048),
            DatabaseFamily::Informix => SqlException::new(format!(
                "Cannot insert a null into column ({table}.{column})."
            ))
            .with_sql_state("23000")
            .with_error_code(-391),
        }
    }
}

impl DatabaseState {
    fn table(&self, name: &str) -> SqlResult<&TableData> {
        self.tables.get(name).ok_or_else(|| missing_table(name))
    }

    fn table_mut(&mut self, name: &str) -> SqlResult<&mut TableData> {
        self.tables.get_mut(name).ok_or_else(|| missing_table(name))
    }

    fn take_failure(&mut self, sql: &str) -> Option<SqlException> {
        let idx = self
            .failures
            .iter()
            .position(|(fragment, _)| sql.contains(fragment.as_str()))?;
        Some(self.failures.remove(idx).1)
    }

    /// Constraint checks for `candidate` as it would be stored; `replacing`
    /// is the rowid being rewritten by an update.
    fn check_row(
        &self,
        violations: &Violations,
        table: &str,
        candidate: &StoredRow,
        replacing: Option<i64>,
    ) -> SqlResult<()> {
        let data = self.table(table)?;
        let definition = &data.definition;

        let required = definition
            .primary_key
            .iter()
            .flat_map(|pk| pk.columns.iter())
            .chain(definition.not_null.iter());
        for column in required {
            if candidate.value(column).is_null() {
                return Err(violations.not_null(table, column));
            }
        }

        let keys = definition
            .primary_key
            .iter()
            .map(|pk| (pk, true))
            .chain(definition.unique_keys.iter().map(|uk| (uk, false)));
        for (key, primary) in keys {
            let Some(values) = candidate.key(&key.columns) else {
                continue;
            };
            let duplicate = data.rows.iter().any(|row| {
                Some(row.rowid) != replacing && row.key(&key.columns).as_ref() == Some(&values)
            });
            if duplicate {
                return Err(violations.unique(table, key, primary, &values));
            }
        }

        for fk in &definition.foreign_keys {
            let Some(values) = candidate.key(&fk.columns) else {
                continue;
            };
            let parent = self.table(&fk.referenced_table)?;
            let found = parent
                .rows
                .iter()
                .any(|row| row.key(&fk.referenced_columns).as_ref() == Some(&values));
            if !found {
                return Err(violations.missing_parent(table, fk));
            }
        }
        Ok(())
    }

    fn insert(
        &mut self,
        violations: &Violations,
        table: &str,
        values: HashMap<String, Value>,
    ) -> SqlResult<Option<Value>> {
        let rowid = self.next_rowid + 1;
        let data = self.table_mut(table)?;
        let mut candidate = StoredRow { rowid, values };
        let mut generated = None;
        if let Some(identity) = data.definition.identity.clone() {
            match candidate.values.get(&identity).and_then(Value::as_i64) {
                Some(explicit) => data.next_identity = data.next_identity.max(explicit),
                None => {
                    data.next_identity += 1;
                    let key = Value::Integer(data.next_identity);
                    candidate.values.insert(identity, key.clone());
                    generated = Some(key);
                }
            }
        }

        self.check_row(violations, table, &candidate, None)?;
        self.next_rowid = rowid;
        self.table_mut(table)?.rows.push(candidate);
        Ok(generated)
    }

    fn update(
        &mut self,
        violations: &Violations,
        table: &str,
        assignments: &[(String, Value)],
        predicates: &[Predicate],
        parameters: &[Value],
    ) -> SqlResult<u64> {
        let targets: Vec<StoredRow> = self
            .table(table)?
            .rows
            .iter()
            .filter(|row| row_matches(row, predicates, parameters))
            .cloned()
            .collect();

        for mut row in targets.iter().cloned() {
            for (column, value) in assignments {
                row.values.insert(column.clone(), value.clone());
            }
            self.check_row(violations, table, &row, Some(row.rowid))?;
            let data = self.table_mut(table)?;
            if let Some(stored) = data.rows.iter_mut().find(|stored| stored.rowid == row.rowid) {
                *stored = row;
            }
        }
        Ok(targets.len() as u64)
    }

    fn upsert(
        &mut self,
        violations: &Violations,
        table: &str,
        values: HashMap<String, Value>,
        action: &UpsertAction,
    ) -> SqlResult<u64> {
        let definition = &self.table(table)?.definition;
        let conflict = match &action.conflict_columns {
            Some(columns) => columns.clone(),
            None => definition
                .primary_key
                .as_ref()
                .map(|pk| pk.columns.clone())
                .unwrap_or_default(),
        };
        let proposed = StoredRow {
            rowid: 0,
            values: values.clone(),
        };
        let existing = proposed.key(&conflict).and_then(|key| {
            self.tables.get(table).and_then(|data| {
                data.rows
                    .iter()
                    .find(|row| row.key(&conflict).as_ref() == Some(&key))
                    .map(|row| row.rowid)
            })
        });

        match existing {
            None => {
                self.insert(violations, table, values)?;
                Ok(1)
            }
            Some(rowid) => {
                let assignments: Vec<(String, Value)> = action
                    .updates
                    .iter()
                    .map(|column| (column.clone(), values.get(column).cloned().unwrap_or(Value::Null)))
                    .collect();
                let by_rowid = [Predicate::Equals(
                    ROW_ID_COLUMNS[0].to_string(),
                    Operand::Literal(Value::Integer(rowid)),
                )];
                self.update(violations, table, &assignments, &by_rowid, &[])?;
                Ok(if violations.family == DatabaseFamily::MySql { 2 } else { 1 })
            }
        }
    }

    /// Rows removed by deleting `rowids` from `table`, cascades included.
    fn plan_delete(
        &self,
        violations: &Violations,
        table: &str,
        rowids: &[i64],
        plan: &mut Vec<(String, i64)>,
    ) -> SqlResult<()> {
        let parent = self.table(table)?;
        for rowid in rowids {
            if plan.iter().any(|(t, r)| t == table && r == rowid) {
                continue;
            }
            plan.push((table.to_string(), *rowid));
            let Some(row) = parent.rows.iter().find(|row| row.rowid == *rowid) else {
                continue;
            };

            for (child_name, child) in &self.tables {
                for fk in child
                    .definition
                    .foreign_keys
                    .iter()
                    .filter(|fk| fk.referenced_table == table)
                {
                    let Some(key) = row.key(&fk.referenced_columns) else {
                        continue;
                    };
                    let children: Vec<i64> = child
                        .rows
                        .iter()
                        .filter(|c| c.key(&fk.columns).as_ref() == Some(&key))
                        .map(|c| c.rowid)
                        .filter(|c| !plan.iter().any(|(t, r)| t == child_name && r == c))
                        .collect();
                    if children.is_empty() {
                        continue;
                    }
                    if !fk.cascade_delete {
                        return Err(violations.still_referenced(&parent.definition, child_name, fk));
                    }
                    self.plan_delete(violations, child_name, &children, plan)?;
                }
            }
        }
        Ok(())
    }

    fn delete(
        &mut self,
        violations: &Violations,
        table: &str,
        predicates: &[Predicate],
        parameters: &[Value],
    ) -> SqlResult<u64> {
        let rowids: Vec<i64> = self
            .table(table)?
            .rows
            .iter()
            .filter(|row| row_matches(row, predicates, parameters))
            .map(|row| row.rowid)
            .collect();
        let mut plan = Vec::new();
        self.plan_delete(violations, table, &rowids, &mut plan)?;
        for (name, rowid) in plan {
            if let Some(data) = self.tables.get_mut(&name) {
                data.rows.retain(|row| row.rowid != rowid);
            }
        }
        Ok(rowids.len() as u64)
    }

    fn run(
        &mut self,
        family: DatabaseFamily,
        dml: &Dml,
        parameters: &[Value],
    ) -> SqlResult<(u64, Option<Value>)> {
        let violations = Violations { family };
        match dml {
            Dml::Insert {
                table,
                columns,
                upsert,
            } => {
                let values: HashMap<String, Value> = columns
                    .iter()
                    .map(|(column, operand)| (column.clone(), resolve(operand, parameters)))
                    .collect();
                match upsert {
                    None => {
                        let generated = self.insert(&violations, table, values)?;
                        Ok((1, generated))
                    }
                    Some(action) => Ok((self.upsert(&violations, table, values, action)?, None)),
                }
            }
            Dml::Update {
                table,
                assignments,
                predicates,
            } => {
                let assignments: Vec<(String, Value)> = assignments
                    .iter()
                    .map(|(column, operand)| (column.clone(), resolve(operand, parameters)))
                    .collect();
                let count = self.update(&violations, table, &assignments, predicates, parameters)?;
                Ok((count, None))
            }
            Dml::Delete { table, predicates } => {
                Ok((self.delete(&violations, table, predicates, parameters)?, None))
            }
        }
    }
}

fn missing_table(name: &str) -> SqlException {
    SqlException::new(format!("ERROR: relation \"{name}\" does not exist")).with_sql_state("42P01")
}

// ============================================================================
// Connection
// ============================================================================

/// Shared handle; clones see the same tables and log.
#[derive(Clone)]
pub struct MemoryDatabase {
    family: DatabaseFamily,
    state: Arc<Mutex<DatabaseState>>,
    open_statements: Arc<AtomicUsize>,
}

impl MemoryDatabase {
    pub fn new(family: DatabaseFamily) -> Self {
        Self {
            family,
            state: Arc::new(Mutex::new(DatabaseState::default())),
            open_statements: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn family(&self) -> DatabaseFamily {
        self.family
    }

    pub async fn create_table(&self, definition: TableDefinition) {
        let mut state = self.state.lock().await;
        state.tables.insert(
            definition.name.clone(),
            TableData {
                definition,
                rows: Vec::new(),
                next_identity: 0,
            },
        );
    }

    /// Rows of `table` in insertion order.
    pub async fn rows(&self, table: &str) -> Vec<HashMap<String, Value>> {
        let state = self.state.lock().await;
        state
            .tables
            .get(table)
            .map(|data| data.rows.iter().map(|row| row.values.clone()).collect())
            .unwrap_or_default()
    }

    pub async fn row_count(&self, table: &str) -> usize {
        let state = self.state.lock().await;
        state.tables.get(table).map_or(0, |data| data.rows.len())
    }

    /// Physical row id of the first row whose `column` equals `value`.
    pub async fn row_id(&self, table: &str, column: &str, value: &Value) -> Option<Value> {
        let state = self.state.lock().await;
        state.tables.get(table).and_then(|data| {
            data.rows
                .iter()
                .find(|row| row.value(column) == *value)
                .map(|row| Value::Integer(row.rowid))
        })
    }

    pub async fn log(&self) -> StatementLog {
        self.state.lock().await.log.clone()
    }

    pub async fn clear_log(&self) {
        self.state.lock().await.log = StatementLog::default();
    }

    /// Statements prepared and not yet closed.
    pub fn open_statements(&self) -> usize {
        self.open_statements.load(Ordering::SeqCst)
    }

    /// The next execution whose SQL contains `fragment` fails with `exc`.
    pub async fn fail_next(&self, fragment: &str, exc: SqlException) {
        self.state
            .lock()
            .await
            .failures
            .push((fragment.to_string(), exc));
    }

    /// Report batch rows as "succeeded, count unknown".
    pub async fn set_success_no_info(&self, enabled: bool) {
        self.state.lock().await.success_no_info = enabled;
    }

    /// Executes `sql` directly, outside any statement.
    pub async fn execute(&self, sql: &str, parameters: Vec<Value>) -> SqlResult<u64> {
        let (dml, _) = parse(self.family, sql)?;
        let mut state = self.state.lock().await;
        state.run(self.family, &dml, &parameters).map(|(count, _)| count)
    }
}

#[async_trait]
impl JdbcConnection for MemoryDatabase {
    async fn prepare_statement(
        &self,
        sql: &str,
        returns_generated_keys: bool,
    ) -> SqlResult<Box<dyn JdbcStatement>> {
        let (dml, parameter_count) = parse(self.family, sql)?;
        self.state.lock().await.log.prepared.push(sql.to_string());
        self.open_statements.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryStatement {
            sql: sql.to_string(),
            dml,
            family: self.family,
            parameters: vec![None; parameter_count],
            queued: Vec::new(),
            returns_generated_keys,
            generated_key: None,
            timeout: None,
            closed: false,
            state: Arc::clone(&self.state),
            open_statements: Arc::clone(&self.open_statements),
        }))
    }
}

struct MemoryStatement {
    sql: String,
    dml: Dml,
    family: DatabaseFamily,
    parameters: Vec<Option<Value>>,
    queued: Vec<Vec<Value>>,
    returns_generated_keys: bool,
    generated_key: Option<Value>,
    timeout: Option<Duration>,
    closed: bool,
    state: Arc<Mutex<DatabaseState>>,
    open_statements: Arc<AtomicUsize>,
}

impl MemoryStatement {
    fn ensure_open(&self) -> SqlResult<()> {
        if self.closed {
            return Err(SqlException::new("This statement has been closed.").with_sql_state("HY010"));
        }
        Ok(())
    }

    fn take_parameters(&mut self) -> SqlResult<Vec<Value>> {
        if let Some(missing) = self.parameters.iter().position(Option::is_none) {
            return Err(SqlException::new(format!(
                "No value specified for parameter {}.",
                missing + 1
            ))
            .with_sql_state("07001"));
        }
        let count = self.parameters.len();
        let parameters = std::mem::replace(&mut self.parameters, vec![None; count]);
        Ok(parameters.into_iter().flatten().collect())
    }
}

#[async_trait]
impl JdbcStatement for MemoryStatement {
    fn sql(&self) -> &str {
        &self.sql
    }

    fn set_value(&mut self, position: usize, value: Value, _jdbc_type: JdbcType) -> SqlResult<()> {
        self.ensure_open()?;
        let count = self.parameters.len();
        let slot = position
            .checked_sub(1)
            .and_then(|idx| self.parameters.get_mut(idx))
            .ok_or_else(|| {
                SqlException::new(format!(
                    "The column index is out of range: {position}, number of columns: {count}."
                ))
                .with_sql_state("22023")
            })?;
        *slot = Some(value);
        Ok(())
    }

    fn set_query_timeout(&mut self, timeout: Duration) {
        self.timeout = Some(timeout);
    }

    fn add_batch(&mut self) -> SqlResult<()> {
        self.ensure_open()?;
        let parameters = self.take_parameters()?;
        self.queued.push(parameters);
        Ok(())
    }

    async fn execute_update(&mut self) -> SqlResult<u64> {
        self.ensure_open()?;
        let parameters = self.take_parameters()?;
        let mut state = self.state.lock().await;
        state.log.updates.push(self.sql.clone());
        if let Some(timeout) = self.timeout {
            state.log.timeouts.push(timeout);
        }
        if let Some(failure) = state.take_failure(&self.sql) {
            return Err(failure);
        }
        let (count, generated) = state.run(self.family, &self.dml, &parameters)?;
        if self.returns_generated_keys {
            self.generated_key = generated;
        }
        Ok(count)
    }

    async fn execute_batch(&mut self) -> SqlResult<Vec<RowOutcome>> {
        self.ensure_open()?;
        let queued = std::mem::take(&mut self.queued);
        let mut state = self.state.lock().await;
        state.log.batches.push((self.sql.clone(), queued.len()));
        if let Some(timeout) = self.timeout {
            state.log.timeouts.push(timeout);
        }

        let mut outcomes = Vec::with_capacity(queued.len());
        for (entry, parameters) in queued.iter().enumerate() {
            let result = match state.take_failure(&self.sql) {
                Some(failure) => Err(failure),
                None => state.run(self.family, &self.dml, parameters),
            };
            match result {
                Ok(_) if state.success_no_info => outcomes.push(RowOutcome::SuccessNoInfo),
                Ok((count, _)) => outcomes.push(RowOutcome::Count(count)),
                Err(cause) => {
                    let message = format!(
                        "Batch entry {entry} {} was aborted: {}  Call getNextException to see other errors in the batch.",
                        self.sql, cause.message
                    );
                    return Err(SqlException::batch_update(message, cause));
                }
            }
        }
        Ok(outcomes)
    }

    fn generated_key(&self) -> Option<Value> {
        self.generated_key.clone()
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.open_statements.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for MemoryStatement {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_rendered_shapes() {
        let pg = DatabaseFamily::PostgreSql;
        let (dml, params) =
            parse(pg, "update orders set status=?,version=? where id=? and version=? and note is null").unwrap();
        assert_eq!(params, 4);
        match dml {
            Dml::Update { predicates, .. } => {
                assert_eq!(predicates.len(), 3);
                assert_eq!(predicates[0], Predicate::Equals("id".into(), Operand::Parameter(3)));
                assert_eq!(predicates[2], Predicate::IsNull("note".into()));
            }
            other => panic!("unexpected {other:?}"),
        }

        let (dml, params) = parse(
            pg,
            "insert into order_audit (order_id,note) values (?,?) on conflict (order_id) do update set note=excluded.note",
        )
        .unwrap();
        assert_eq!(params, 2);
        match dml {
            Dml::Insert { upsert: Some(action), .. } => {
                assert_eq!(action.conflict_columns, Some(vec!["order_id".to_string()]));
                assert_eq!(action.updates, vec!["note".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }

        let err = parse(
            DatabaseFamily::Informix,
            "merge into t as t using (select ? as k from sysmaster:sysdual) as s on (t.k=s.k)",
        )
        .unwrap_err();
        assert_eq!(err.sql_state.as_deref(), Some("0A000"));
        assert_eq!(parse(pg, "select 1").unwrap_err().sql_state.as_deref(), Some("42601"));
        assert!(parse(pg, "update orders set status=lower(?) where id=?").is_err());
    }

    #[test]
    fn test_parses_family_specific_inserts() {
        let (dml, params) = parse(
            DatabaseFamily::MySql,
            "insert into order_audit (order_id,note) values (?,'it''s') on duplicate key update note=values(note)",
        )
        .unwrap();
        assert_eq!(params, 1);
        match dml {
            Dml::Insert { columns, upsert: Some(action), .. } => {
                assert_eq!(columns[1].1, Operand::Literal(Value::Text("it's".into())));
                assert_eq!(action.conflict_columns, None);
                assert_eq!(action.updates, vec!["note".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(parse(
            DatabaseFamily::MySql,
            "insert into order_audit (order_id,note) values (?,?) on duplicate key update note=values(order_id)",
        )
        .is_err());

        for (family, sql) in [
            (DatabaseFamily::PostgreSql, "insert into orders default values"),
            (DatabaseFamily::MySql, "insert into orders () values ()"),
            (DatabaseFamily::Informix, "insert into orders values (0)"),
        ] {
            let (dml, params) = parse(family, sql).unwrap();
            assert_eq!(params, 0, "{sql}");
            assert!(matches!(dml, Dml::Insert { ref columns, upsert: None, .. } if columns.is_empty()), "{sql}");
        }

        let (dml, _) = parse(DatabaseFamily::Informix, "delete from orders where rowid=?").unwrap();
        assert_eq!(
            dml,
            Dml::Delete {
                table: "orders".into(),
                predicates: vec![Predicate::Equals("rowid".into(), Operand::Parameter(1))],
            }
        );
    }

    #[tokio::test]
    async fn test_constraints_and_cascade() {
        let db = MemoryDatabase::new(DatabaseFamily::PostgreSql);
        db.create_table(TableDefinition::new("users").primary_key(&["id"]).unique("uk_email", &["email"]))
            .await;
        db.create_table(
            TableDefinition::new("sessions")
                .primary_key(&["id"])
                .cascading_foreign_key("fk_session_user", &["user_id"], "users", &["id"]),
        )
        .await;

        db.execute("insert into users (id,email) values (?,?)", vec![Value::Integer(1), "a@b.c".into()])
            .await
            .unwrap();
        let dup = db
            .execute("insert into users (id,email) values (?,?)", vec![Value::Integer(2), "a@b.c".into()])
            .await
            .unwrap_err();
        assert_eq!(dup.sql_state.as_deref(), Some("23505"));
        assert!(dup.message.contains("\"uk_email\""));

        let orphan = db
            .execute("insert into sessions (id,user_id) values (?,?)", vec![Value::Integer(1), Value::Integer(9)])
            .await
            .unwrap_err();
        assert_eq!(orphan.sql_state.as_deref(), Some("23503"));

        db.execute("insert into sessions (id,user_id) values (?,?)", vec![Value::Integer(1), Value::Integer(1)])
            .await
            .unwrap();
        assert_eq!(db.execute("delete from users where id=?", vec![Value::Integer(1)]).await.unwrap(), 1);
        assert_eq!(db.row_count("sessions").await, 0);
    }

    #[tokio::test]
    async fn test_batch_failure_is_wrapped() {
        let db = MemoryDatabase::new(DatabaseFamily::MySql);
        db.create_table(TableDefinition::new("users").primary_key(&["id"]).unique("uk_email", &["email"]))
            .await;
        let mut statement = db
            .prepare_statement("insert into users (id,email) values (?,?)", false)
            .await
            .unwrap();
        for id in [1, 2] {
            statement.set_value(1, Value::Integer(id), JdbcType::BigInt).unwrap();
            statement.set_value(2, "same@b.c".into(), JdbcType::Varchar).unwrap();
            statement.add_batch().unwrap();
        }
        let err = statement.execute_batch().await.unwrap_err();
        assert!(err.is_batch_update());
        assert_eq!(err.error_code, 1062);
        assert!(err.message.starts_with("Batch entry 1"));
        assert_eq!(db.row_count("users").await, 1);

        assert_eq!(db.open_statements(), 1);
        statement.close();
        assert_eq!(db.open_statements(), 0);
    }
}
