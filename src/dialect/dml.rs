use crate::core::{PersistError, Result};
use crate::dialect::Dialect;
use crate::mutation::{
    ColumnValueBinding, Expectation, MutationOperation, MutationType, TableMutation,
};

/// How a family writes "insert or update by key".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertStyle {
    /// `insert ... on conflict (k) do update set c=excluded.c`
    OnConflict,
    /// `insert ... on duplicate key update c=values(c)`
    OnDuplicateKey,
    /// `merge into t using (select ... from <dual>) as s on (...) ...`
    Merge { dual: &'static str },
    Unsupported,
}

impl Dialect {
    /// Renders one table-level mutation. Custom SQL, when present, replaces
    /// the generated text but keeps the generated parameter order.
    pub fn create_mutation_operation(&self, mutation: &TableMutation) -> Result<MutationOperation> {
        let sql = match (&mutation.custom_sql, mutation.mutation_type) {
            (Some(custom), ty) if ty != MutationType::Upsert => custom.clone(),
            (_, MutationType::Insert) => self.render_insert(mutation),
            (_, MutationType::Update) => render_update(mutation),
            (_, MutationType::Delete) => render_delete(mutation),
            (_, MutationType::Upsert) => self.render_upsert(mutation)?,
        };

        Ok(MutationOperation {
            table: mutation.table.clone(),
            mutation_type: mutation.mutation_type,
            sql,
            parameters: mutation.parameter_slots(),
            expectation: match mutation.mutation_type {
                MutationType::Upsert => Expectation::None,
                _ => mutation.expectation,
            },
            batchable: mutation.mutation_type != MutationType::Upsert
                && !mutation.returns_generated_keys,
            returns_generated_keys: mutation.returns_generated_keys,
        })
    }

    fn render_insert(&self, mutation: &TableMutation) -> String {
        if mutation.values.is_empty() {
            return format!("insert into {} {}", mutation.table_name(), self.no_columns_insert);
        }
        format!(
            "insert into {} ({}) values ({})",
            mutation.table_name(),
            column_list(&mutation.values),
            mutation
                .values
                .iter()
                .map(|binding| binding.write_expression.as_str())
                .collect::<Vec<_>>()
                .join(",")
        )
    }

    fn render_upsert(&self, mutation: &TableMutation) -> Result<String> {
        let table = mutation.table_name();
        let keys = &mutation.key_restrictions;
        let values = &mutation.values;
        let all: Vec<&ColumnValueBinding> = keys.iter().chain(values.iter()).collect();
        let all_columns = all
            .iter()
            .map(|binding| binding.column.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let all_expressions = all
            .iter()
            .map(|binding| binding.write_expression.as_str())
            .collect::<Vec<_>>()
            .join(",");

        match self.upsert_style {
            UpsertStyle::OnConflict => Ok(format!(
                "insert into {} ({}) values ({}) on conflict ({}) do update set {}",
                table,
                all_columns,
                all_expressions,
                column_list(keys),
                join_map(values, |b| format!("{}=excluded.{}", b.column, b.column))
            )),
            UpsertStyle::OnDuplicateKey => Ok(format!(
                "insert into {} ({}) values ({}) on duplicate key update {}",
                table,
                all_columns,
                all_expressions,
                join_map(values, |b| format!("{}=values({})", b.column, b.column))
            )),
            UpsertStyle::Merge { dual } => Ok(format!(
                "merge into {} as t using (select {} from {}) as s on ({}) \
                 when matched then update set {} \
                 when not matched then insert ({}) values ({})",
                table,
                all.iter()
                    .map(|b| format!("{} as {}", b.write_expression, b.column))
                    .collect::<Vec<_>>()
                    .join(","),
                dual,
                keys.iter()
                    .map(|b| format!("t.{}=s.{}", b.column, b.column))
                    .collect::<Vec<_>>()
                    .join(" and "),
                join_map(values, |b| format!("t.{}=s.{}", b.column, b.column)),
                all_columns,
                all.iter()
                    .map(|b| format!("s.{}", b.column))
                    .collect::<Vec<_>>()
                    .join(",")
            )),
            UpsertStyle::Unsupported => Err(PersistError::UnsupportedCapability(format!(
                "{} does not support upsert (table '{}')",
                self, table
            ))),
        }
    }
}

fn render_update(mutation: &TableMutation) -> String {
    let mut sql = format!(
        "update {} set {}",
        mutation.table_name(),
        join_map(&mutation.values, ColumnValueBinding::render_assignment)
    );
    push_where(&mut sql, mutation);
    sql
}

fn render_delete(mutation: &TableMutation) -> String {
    let mut sql = format!("delete from {}", mutation.table_name());
    push_where(&mut sql, mutation);
    sql
}

fn push_where(sql: &mut String, mutation: &TableMutation) {
    let predicates: Vec<String> = mutation
        .restrictions()
        .map(ColumnValueBinding::render_assignment)
        .collect();
    if !predicates.is_empty() {
        sql.push_str(" where ");
        sql.push_str(&predicates.join(" and "));
    }
}

fn column_list(bindings: &[ColumnValueBinding]) -> String {
    bindings
        .iter()
        .map(|binding| binding.column.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

fn join_map(bindings: &[ColumnValueBinding], render: impl Fn(&ColumnValueBinding) -> String) -> String {
    bindings.iter().map(render).collect::<Vec<_>>().join(",")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::core::JdbcType;
    use crate::dialect::{DatabaseFamily, DatabaseVersion};
    use crate::mutation::{
        MutationDetails, ParameterUsage, StandardTableMutationBuilder, TableMapping,
    };

    fn orders() -> Arc<TableMapping> {
        Arc::new(TableMapping::builder("orders").key_column("id").build().unwrap())
    }

    fn audit() -> Arc<TableMapping> {
        Arc::new(
            TableMapping::builder("order_audit")
                .key_column("order_id")
                .optional()
                .build()
                .unwrap(),
        )
    }

    fn pg() -> Dialect {
        Dialect::resolve(DatabaseFamily::PostgreSql, DatabaseVersion::make(15, 0))
    }

    fn upsert_audit() -> TableMutation {
        let mut builder = StandardTableMutationBuilder::new(audit(), MutationType::Upsert);
        builder
            .add_key_restriction("order_id", JdbcType::BigInt)
            .add_value_column("note", "?", JdbcType::Varchar)
            .add_value_column("reviewed_by", "?", JdbcType::Varchar);
        builder.build()
    }

    #[test]
    fn test_update_with_version_restriction() {
        let mut builder = StandardTableMutationBuilder::new(orders(), MutationType::Update);
        builder
            .add_value_column("total", "?", JdbcType::Decimal)
            .add_value_column("version", "?", JdbcType::Integer)
            .add_key_restriction("id", JdbcType::BigInt)
            .add_lock_restriction("version", JdbcType::Integer, false);
        let op = pg().create_mutation_operation(&builder.build()).unwrap();

        assert_eq!(op.sql, "update orders set total=?,version=? where id=? and version=?");
        let usages: Vec<_> = op.parameters.iter().map(|p| (p.column.as_str(), p.usage)).collect();
        assert_eq!(
            usages,
            vec![
                ("total", ParameterUsage::Set),
                ("version", ParameterUsage::Set),
                ("id", ParameterUsage::Restrict),
                ("version", ParameterUsage::Restrict),
            ]
        );
        assert!(op.batchable);
    }

    #[test]
    fn test_delete_with_null_restriction() {
        let mut builder = StandardTableMutationBuilder::new(orders(), MutationType::Delete);
        builder
            .add_key_restriction("id", JdbcType::BigInt)
            .add_lock_restriction("status", JdbcType::Varchar, false)
            .add_lock_restriction("discount", JdbcType::Decimal, true);
        let op = pg().create_mutation_operation(&builder.build()).unwrap();
        assert_eq!(
            op.sql,
            "delete from orders where id=? and status=? and discount is null"
        );
        assert_eq!(op.parameters.len(), 2);
    }

    #[test]
    fn test_upsert_styles() {
        let op = pg().create_mutation_operation(&upsert_audit()).unwrap();
        assert_eq!(
            op.sql,
            "insert into order_audit (order_id,note,reviewed_by) values (?,?,?) \
             on conflict (order_id) do update set note=excluded.note,reviewed_by=excluded.reviewed_by"
        );
        assert_eq!(op.parameters[0].column, "order_id");
        assert!(!op.batchable);

        let mysql = Dialect::resolve(DatabaseFamily::MySql, DatabaseVersion::make(8, 0));
        assert_eq!(
            mysql.create_mutation_operation(&upsert_audit()).unwrap().sql,
            "insert into order_audit (order_id,note,reviewed_by) values (?,?,?) \
             on duplicate key update note=values(note),reviewed_by=values(reviewed_by)"
        );

        let informix = Dialect::resolve(DatabaseFamily::Informix, DatabaseVersion::make(12, 10));
        assert_eq!(
            informix.create_mutation_operation(&upsert_audit()).unwrap().sql,
            "merge into order_audit as t using (select ? as order_id,? as note,? as reviewed_by \
             from sysmaster:sysdual) as s on (t.order_id=s.order_id) \
             when matched then update set t.note=s.note,t.reviewed_by=s.reviewed_by \
             when not matched then insert (order_id,note,reviewed_by) \
             values (s.order_id,s.note,s.reviewed_by)"
        );
    }

    #[test]
    fn test_upsert_unsupported_version() {
        let old = Dialect::resolve(DatabaseFamily::PostgreSql, DatabaseVersion::make(9, 4));
        assert!(matches!(
            old.create_mutation_operation(&upsert_audit()),
            Err(PersistError::UnsupportedCapability(_))
        ));
    }

    #[test]
    fn test_custom_sql_replaces_text() {
        let table = Arc::new(
            TableMapping::builder("orders")
                .key_column("id")
                .delete_details(MutationDetails::custom_sql(
                    "update orders set deleted=true where id=?",
                ))
                .build()
                .unwrap(),
        );
        let mut builder = StandardTableMutationBuilder::new(table, MutationType::Delete);
        builder.add_key_restriction("id", JdbcType::BigInt);
        let op = pg().create_mutation_operation(&builder.build()).unwrap();
        assert_eq!(op.sql, "update orders set deleted=true where id=?");
        assert_eq!(op.parameters.len(), 1);
    }
}
