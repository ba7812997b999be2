use crate::core::{Result, Value};
use crate::jdbc::{JdbcValueBindings, MutationExecutor};
use crate::mutation::{MutationGroupBuilder, MutationOperationGroup, MutationType, ParameterUsage, RowIdentity};
use crate::persister::entity::EntityPersister;
use crate::session::MutationSession;

/// State of a new entity instance. `id` is required unless the identifier
/// is generated by an identity column.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertRequest {
    pub id: Option<Value>,
    pub state: Vec<Value>,
}

impl InsertRequest {
    pub fn new(state: Vec<Value>) -> Self {
        Self { id: None, state }
    }

    pub fn with_id(mut self, id: impl Into<Value>) -> Self {
        self.id = Some(id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRequest {
    pub id: Value,
    pub state: Vec<Value>,
    /// State as loaded from the database.
    pub previous_state: Option<Vec<Value>>,
    /// Indexes of attributes known to have changed.
    pub dirty: Option<Vec<usize>>,
    /// Version the row is expected to carry; defaults to the version in
    /// `previous_state`.
    pub previous_version: Option<Value>,
}

impl UpdateRequest {
    pub fn new(id: impl Into<Value>, state: Vec<Value>) -> Self {
        Self {
            id: id.into(),
            state,
            previous_state: None,
            dirty: None,
            previous_version: None,
        }
    }

    pub fn with_previous_state(mut self, previous_state: Vec<Value>) -> Self {
        self.previous_state = Some(previous_state);
        self
    }

    pub fn with_dirty(mut self, dirty: Vec<usize>) -> Self {
        self.dirty = Some(dirty);
        self
    }

    pub fn with_previous_version(mut self, version: impl Into<Value>) -> Self {
        self.previous_version = Some(version.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteRequest {
    pub id: Value,
    pub version: Option<Value>,
    pub loaded_state: Option<Vec<Value>>,
    pub row_id: Option<Value>,
    /// `false` when deleting by identifier alone, with no managed instance;
    /// no version check applies then.
    pub has_instance: bool,
}

impl DeleteRequest {
    pub fn new(id: impl Into<Value>) -> Self {
        Self {
            id: id.into(),
            version: None,
            loaded_state: None,
            row_id: None,
            has_instance: true,
        }
    }

    pub fn with_version(mut self, version: impl Into<Value>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_loaded_state(mut self, loaded_state: Vec<Value>) -> Self {
        self.loaded_state = Some(loaded_state);
        self
    }

    pub fn with_row_id(mut self, row_id: impl Into<Value>) -> Self {
        self.row_id = Some(row_id.into());
        self
    }

    pub fn without_instance(mut self) -> Self {
        self.has_instance = false;
        self
    }
}

/// Binds the identifier into the key columns of every table in `group`.
pub(crate) fn bind_id(
    persister: &EntityPersister,
    group: &MutationOperationGroup,
    id: &Value,
    usage: ParameterUsage,
    bindings: &mut JdbcValueBindings,
) -> Result<()> {
    let id_values = persister.decompose_id(id)?;
    for slot in group.slots() {
        for (column, value) in slot.table.key_columns().iter().zip(&id_values) {
            bindings.bind_value(slot.table.name(), column, usage, value.clone());
        }
    }
    Ok(())
}

/// Binds every column of every attribute stored in `table` as a written value.
/// Returns `true` when all of them are null.
pub(crate) fn bind_table_values(
    persister: &EntityPersister,
    table: &str,
    state: &[Value],
    bindings: &mut JdbcValueBindings,
) -> Result<bool> {
    let mut all_null = true;
    for (idx, attr) in persister.attributes_of_table(table) {
        for (column, value) in attr.columns().iter().zip(attr.decompose(&state[idx])?) {
            all_null &= value.is_null();
            bindings.bind_value(table, &column.name, ParameterUsage::Set, value);
        }
    }
    Ok(all_null)
}

/// ALL/DIRTY restrictions: one per column of each locked attribute, `is null`
/// for null loaded values. Upserted tables carry no restrictions.
pub(crate) fn add_loaded_state_restrictions(
    persister: &EntityPersister,
    group_builder: &mut MutationGroupBuilder,
    loaded_state: &[Value],
    locked: impl Fn(usize) -> bool,
) -> Result<()> {
    for (idx, attr) in persister.attributes().iter().enumerate() {
        if !attr.is_singular() || !attr.is_versionable() || !locked(idx) {
            continue;
        }
        let Some(table) = attr.table() else {
            continue;
        };
        let Some(builder) = group_builder
            .find_table_builder_mut(table)
            .filter(|builder| builder.mutation_type() != MutationType::Upsert)
        else {
            continue;
        };
        for (column, value) in attr.columns().iter().zip(attr.decompose(&loaded_state[idx])?) {
            builder.add_lock_restriction(&column.name, column.jdbc_type, value.is_null());
        }
    }
    Ok(())
}

/// Binds the non-null loaded values behind [`add_loaded_state_restrictions`].
pub(crate) fn bind_loaded_state(
    persister: &EntityPersister,
    group: &MutationOperationGroup,
    loaded_state: &[Value],
    bindings: &mut JdbcValueBindings,
) -> Result<()> {
    for (idx, attr) in persister.attributes().iter().enumerate() {
        let Some(table) = attr.table() else {
            continue;
        };
        if !attr.is_singular() || group.operation(table).is_none() {
            continue;
        }
        for (column, value) in attr.columns().iter().zip(attr.decompose(&loaded_state[idx])?) {
            if !value.is_null() {
                bindings.bind_value(table, &column.name, ParameterUsage::Restrict, value);
            }
        }
    }
    Ok(())
}

/// Runs `group` and releases the executor on every path.
pub(crate) async fn execute_group(
    session: &mut MutationSession,
    group: &MutationOperationGroup,
    bindings: JdbcValueBindings,
    row: &RowIdentity,
) -> Result<Option<Value>> {
    let mut executor = MutationExecutor::new(session, group);
    let result = executor.execute(bindings, row).await;
    executor.release();
    result
}
