use std::fmt;
use std::sync::Arc;

use crate::core::{JdbcType, Value};
use crate::mutation::binding::{ColumnValueBinding, ParameterUsage};
use crate::mutation::table::{Expectation, TableMapping};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationType {
    Insert,
    Update,
    Delete,
    Upsert,
}

impl fmt::Display for MutationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Upsert => "UPSERT",
        };
        write!(f, "{label}")
    }
}

/// Entity name and id of the row a statement targets; used in stale-state
/// reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowIdentity {
    pub entity: String,
    pub id: Value,
}

impl RowIdentity {
    pub fn new(entity: impl Into<String>, id: Value) -> Self {
        Self {
            entity: entity.into(),
            id,
        }
    }
}

impl fmt::Display for RowIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.entity, self.id)
    }
}

/// A resolved table-level mutation, ready to be rendered by a dialect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMutation {
    pub table: Arc<TableMapping>,
    pub mutation_type: MutationType,
    pub values: Vec<ColumnValueBinding>,
    pub key_restrictions: Vec<ColumnValueBinding>,
    pub lock_restrictions: Vec<ColumnValueBinding>,
    pub custom_sql: Option<String>,
    pub expectation: Expectation,
    /// The statement returns a generated key (identity insert root).
    pub returns_generated_keys: bool,
}

impl TableMutation {
    pub fn table_name(&self) -> &str {
        self.table.name()
    }

    /// Restrictions in WHERE order: keys first, then optimistic checks.
    pub fn restrictions(&self) -> impl Iterator<Item = &ColumnValueBinding> {
        self.key_restrictions
            .iter()
            .chain(self.lock_restrictions.iter())
    }

    /// Parameter slots in binding order: values then restrictions, except
    /// upserts which lead with the key.
    pub fn parameter_slots(&self) -> Vec<ParameterSlot> {
        let ordered: Vec<&ColumnValueBinding> = match self.mutation_type {
            MutationType::Upsert => self
                .key_restrictions
                .iter()
                .chain(self.values.iter())
                .collect(),
            _ => self.values.iter().chain(self.restrictions()).collect(),
        };
        ordered
            .into_iter()
            .filter(|binding| binding.has_parameter())
            .enumerate()
            .map(|(idx, binding)| ParameterSlot {
                position: idx + 1,
                column: binding.column.clone(),
                usage: binding.usage(),
                jdbc_type: binding.jdbc_type,
            })
            .collect()
    }
}

/// One `?` in a rendered statement; `position` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSlot {
    pub position: usize,
    pub column: String,
    pub usage: ParameterUsage,
    pub jdbc_type: JdbcType,
}

/// Rendered, executable form of a [`TableMutation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationOperation {
    pub table: Arc<TableMapping>,
    pub mutation_type: MutationType,
    pub sql: String,
    pub parameters: Vec<ParameterSlot>,
    pub expectation: Expectation,
    pub batchable: bool,
    pub returns_generated_keys: bool,
}

impl MutationOperation {
    pub fn table_name(&self) -> &str {
        self.table.name()
    }
}
