use std::collections::{HashMap, HashSet};

use crate::core::{PersistError, Result, Value};
use crate::mutation::{MutationOperation, ParameterUsage};

/// Per-call parameter values, keyed by table then `(column, usage)`.
#[derive(Debug, Clone, Default)]
pub struct JdbcValueBindings {
    tables: HashMap<String, HashMap<(String, ParameterUsage), Value>>,
    skipped: HashSet<String>,
}

impl JdbcValueBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind_value(&mut self, table: &str, column: &str, usage: ParameterUsage, value: Value) {
        self.tables
            .entry(table.to_string())
            .or_default()
            .insert((column.to_string(), usage), value);
    }

    pub fn value(&self, table: &str, column: &str, usage: ParameterUsage) -> Option<&Value> {
        self.tables
            .get(table)
            .and_then(|values| values.get(&(column.to_string(), usage)))
    }

    /// No statement runs for `table` in this call, even when the group has one.
    pub fn skip_table(&mut self, table: &str) {
        self.skipped.insert(table.to_string());
    }

    pub fn is_skipped(&self, table: &str) -> bool {
        self.skipped.contains(table)
    }

    /// Values for the operation's parameter slots, in slot order.
    pub fn resolve(&self, operation: &MutationOperation) -> Result<Vec<Value>> {
        operation
            .parameters
            .iter()
            .map(|slot| {
                self.value(operation.table_name(), &slot.column, slot.usage)
                    .cloned()
                    .ok_or_else(|| {
                        PersistError::ExecutionError(format!(
                            "No value bound for {}.{} ({:?}) [{}]",
                            operation.table_name(),
                            slot.column,
                            slot.usage,
                            operation.sql
                        ))
                    })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::core::JdbcType;
    use crate::mutation::{Expectation, MutationType, ParameterSlot, TableMapping};

    fn delete_op() -> MutationOperation {
        MutationOperation {
            table: Arc::new(TableMapping::builder("orders").key_column("id").build().unwrap()),
            mutation_type: MutationType::Delete,
            sql: "delete from orders where id=?".into(),
            parameters: vec![ParameterSlot {
                position: 1,
                column: "id".into(),
                usage: ParameterUsage::Restrict,
                jdbc_type: JdbcType::BigInt,
            }],
            expectation: Expectation::default(),
            batchable: true,
            returns_generated_keys: false,
        }
    }

    #[test]
    fn test_missing_binding_is_an_error() {
        let mut bindings = JdbcValueBindings::new();
        bindings.bind_value("orders", "id", ParameterUsage::Set, Value::Integer(1));
        assert!(matches!(
            bindings.resolve(&delete_op()),
            Err(PersistError::ExecutionError(_))
        ));

        bindings.bind_value("orders", "id", ParameterUsage::Restrict, Value::Integer(1));
        assert_eq!(bindings.resolve(&delete_op()).unwrap(), vec![Value::Integer(1)]);
    }
}
