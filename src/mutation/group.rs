use std::fmt;
use std::sync::Arc;

use crate::mutation::operation::{MutationOperation, MutationType};
use crate::mutation::table::TableMapping;

/// A table's place in a group. `operation` is `None` when the table needs no
/// statement in this variant of the group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationSlot {
    pub table: Arc<TableMapping>,
    pub operation: Option<MutationOperation>,
}

/// Ordered per-table operations for one entity-level mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationOperationGroup {
    mutation_type: MutationType,
    entity_name: String,
    slots: Vec<OperationSlot>,
}

impl MutationOperationGroup {
    pub fn new(mutation_type: MutationType, entity_name: String, slots: Vec<OperationSlot>) -> Self {
        Self {
            mutation_type,
            entity_name,
            slots,
        }
    }

    pub fn mutation_type(&self) -> MutationType {
        self.mutation_type
    }

    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    pub fn slots(&self) -> &[OperationSlot] {
        &self.slots
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.slots.iter().map(|slot| slot.table.name()).collect()
    }

    pub fn slot(&self, table_name: &str) -> Option<&OperationSlot> {
        self.slots.iter().find(|slot| slot.table.name() == table_name)
    }

    pub fn operation(&self, table_name: &str) -> Option<&MutationOperation> {
        self.slot(table_name).and_then(|slot| slot.operation.as_ref())
    }

    /// Operations in execution order, empty slots skipped.
    pub fn operations(&self) -> impl Iterator<Item = &MutationOperation> {
        self.slots.iter().filter_map(|slot| slot.operation.as_ref())
    }

    pub fn number_of_operations(&self) -> usize {
        self.operations().count()
    }

    pub fn is_empty(&self) -> bool {
        self.number_of_operations() == 0
    }

    pub fn batch_key(&self) -> BatchKey {
        BatchKey::new(&self.entity_name, self.mutation_type)
    }
}

/// Statements under the same key may share one JDBC batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BatchKey {
    entity_name: String,
    mutation_type: MutationType,
}

impl BatchKey {
    pub fn new(entity_name: &str, mutation_type: MutationType) -> Self {
        Self {
            entity_name: entity_name.to_string(),
            mutation_type,
        }
    }

    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    pub fn mutation_type(&self) -> MutationType {
        self.mutation_type
    }
}

impl fmt::Display for BatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.entity_name, self.mutation_type)
    }
}
