use std::sync::Arc;

use crate::core::{JdbcType, Result};
use crate::dialect::Dialect;
use crate::mutation::binding::{BindingRole, ColumnValueBinding};
use crate::mutation::group::{MutationOperationGroup, OperationSlot};
use crate::mutation::operation::{MutationType, TableMutation};
use crate::mutation::table::TableMapping;

/// Collects bindings for one table before the mutation is frozen.
#[derive(Debug, Clone)]
pub struct StandardTableMutationBuilder {
    table: Arc<TableMapping>,
    mutation_type: MutationType,
    values: Vec<ColumnValueBinding>,
    key_restrictions: Vec<ColumnValueBinding>,
    lock_restrictions: Vec<ColumnValueBinding>,
    returns_generated_keys: bool,
}

impl StandardTableMutationBuilder {
    pub fn new(table: Arc<TableMapping>, mutation_type: MutationType) -> Self {
        Self {
            table,
            mutation_type,
            values: Vec::new(),
            key_restrictions: Vec::new(),
            lock_restrictions: Vec::new(),
            returns_generated_keys: false,
        }
    }

    pub fn table(&self) -> &Arc<TableMapping> {
        &self.table
    }

    pub fn mutation_type(&self) -> MutationType {
        self.mutation_type
    }

    pub fn add_value_column(
        &mut self,
        column: &str,
        write_expression: &str,
        jdbc_type: JdbcType,
    ) -> &mut Self {
        self.values.push(ColumnValueBinding::new(
            column,
            write_expression,
            jdbc_type,
            BindingRole::Value,
        ));
        self
    }

    pub fn add_key_restriction(&mut self, column: &str, jdbc_type: JdbcType) -> &mut Self {
        self.key_restrictions
            .push(ColumnValueBinding::key_restriction(column, jdbc_type));
        self
    }

    /// `null_value` turns the restriction into `column is null`.
    pub fn add_lock_restriction(
        &mut self,
        column: &str,
        jdbc_type: JdbcType,
        null_value: bool,
    ) -> &mut Self {
        let binding = if null_value {
            ColumnValueBinding::null_lock_restriction(column, jdbc_type)
        } else {
            ColumnValueBinding::lock_restriction(column, jdbc_type)
        };
        self.lock_restrictions.push(binding);
        self
    }

    pub fn returns_generated_keys(&mut self) -> &mut Self {
        self.returns_generated_keys = true;
        self
    }

    pub fn has_values(&self) -> bool {
        !self.values.is_empty()
    }

    pub fn build(self) -> TableMutation {
        let details = self.table.details(self.mutation_type).clone();
        TableMutation {
            table: self.table,
            mutation_type: self.mutation_type,
            values: self.values,
            key_restrictions: self.key_restrictions,
            lock_restrictions: self.lock_restrictions,
            custom_sql: details.custom_sql,
            expectation: details.expectation,
            returns_generated_keys: self.returns_generated_keys,
        }
    }
}

#[derive(Debug, Clone)]
pub enum TableMutationBuilder {
    Standard(StandardTableMutationBuilder),
    /// The database removes this table's rows itself (FK cascade).
    Skipped(Arc<TableMapping>),
    /// Keeps the table's slot but issues nothing for it in this variant.
    Omitted(Arc<TableMapping>),
}

impl TableMutationBuilder {
    pub fn table(&self) -> &Arc<TableMapping> {
        match self {
            Self::Standard(builder) => builder.table(),
            Self::Skipped(table) | Self::Omitted(table) => table,
        }
    }
}

/// Assembles the per-table builders of one entity-level mutation.
#[derive(Debug, Clone)]
pub struct MutationGroupBuilder {
    mutation_type: MutationType,
    entity_name: String,
    builders: Vec<TableMutationBuilder>,
}

impl MutationGroupBuilder {
    pub fn new(mutation_type: MutationType, entity_name: impl Into<String>) -> Self {
        Self {
            mutation_type,
            entity_name: entity_name.into(),
            builders: Vec::new(),
        }
    }

    pub fn add_table_builder(&mut self, builder: TableMutationBuilder) {
        self.builders.push(builder);
    }

    pub fn find_table_builder_mut(
        &mut self,
        table_name: &str,
    ) -> Option<&mut StandardTableMutationBuilder> {
        self.builders.iter_mut().find_map(|builder| match builder {
            TableMutationBuilder::Standard(standard) if standard.table().name() == table_name => {
                Some(standard)
            }
            _ => None,
        })
    }

    /// Freezes every table builder and renders it through the dialect.
    /// Skipped tables get no slot; updates with nothing to write get an
    /// empty slot.
    pub fn build(self, dialect: &Dialect) -> Result<MutationOperationGroup> {
        self.build_with(dialect, true)
    }

    /// Like [`build`](Self::build), but always generates SQL: custom SQL is
    /// written for the full column set and cannot serve a partial one.
    pub fn build_dynamic(self, dialect: &Dialect) -> Result<MutationOperationGroup> {
        self.build_with(dialect, false)
    }

    fn build_with(self, dialect: &Dialect, honor_custom_sql: bool) -> Result<MutationOperationGroup> {
        let mut slots = Vec::with_capacity(self.builders.len());
        for builder in self.builders {
            match builder {
                TableMutationBuilder::Skipped(_) => {}
                TableMutationBuilder::Omitted(table) => slots.push(OperationSlot {
                    table,
                    operation: None,
                }),
                TableMutationBuilder::Standard(standard) => {
                    let table = Arc::clone(standard.table());
                    let needs_values = matches!(
                        standard.mutation_type(),
                        MutationType::Update | MutationType::Upsert
                    );
                    let operation = if needs_values && !standard.has_values() {
                        None
                    } else {
                        let mut mutation = standard.build();
                        if !honor_custom_sql {
                            mutation.custom_sql = None;
                        }
                        Some(dialect.create_mutation_operation(&mutation)?)
                    };
                    slots.push(OperationSlot { table, operation });
                }
            }
        }
        Ok(MutationOperationGroup::new(
            self.mutation_type,
            self.entity_name,
            slots,
        ))
    }
}
