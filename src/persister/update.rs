use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{Instrument, info_span};

use crate::core::{PersistError, Result, Value};
use crate::dialect::Dialect;
use crate::jdbc::JdbcValueBindings;
use crate::mutation::{
    MutationGroupBuilder, MutationOperationGroup, MutationType, ParameterUsage, RowIdentity,
    StandardTableMutationBuilder, TableMutationBuilder,
};
use crate::persister::coordinator::{
    UpdateRequest, add_loaded_state_restrictions, bind_id, bind_loaded_state, bind_table_values,
    execute_group,
};
use crate::persister::entity::{EntityPersister, OptimisticLockStyle};
use crate::session::MutationSession;

/// Shape of a generated update group.
struct UpdateShape<'a> {
    /// Attributes written by the group; `None` writes all of them.
    included: Option<&'a BTreeSet<usize>>,
    /// New state, used to omit optional tables left all-null.
    state: Option<&'a [Value]>,
    loaded_state: Option<&'a [Value]>,
    dirty: Option<&'a BTreeSet<usize>>,
}

/// Updates an entity's rows, upserting optional secondary tables.
#[derive(Debug)]
pub struct UpdateCoordinator {
    persister: Arc<EntityPersister>,
    dialect: Arc<Dialect>,
    static_group: Arc<MutationOperationGroup>,
}

impl UpdateCoordinator {
    pub fn new(persister: Arc<EntityPersister>, dialect: Arc<Dialect>) -> Result<Self> {
        let shape = UpdateShape {
            included: None,
            state: None,
            loaded_state: None,
            dirty: None,
        };
        let static_group = Arc::new(build_group(&persister, &dialect, &shape, false)?);
        Ok(Self {
            persister,
            dialect,
            static_group,
        })
    }

    pub fn static_group(&self) -> &Arc<MutationOperationGroup> {
        &self.static_group
    }

    /// Group writing only `dirty` (plus the version) with restrictions
    /// derived from `loaded_state` under ALL/DIRTY locking.
    pub fn dynamic_group(
        &self,
        state: &[Value],
        dirty: &[usize],
        loaded_state: Option<&[Value]>,
    ) -> Result<MutationOperationGroup> {
        self.persister.check_state(state)?;
        let dirty: BTreeSet<usize> = dirty.iter().copied().collect();
        let included = self.included_attributes(&dirty);
        let shape = UpdateShape {
            included: Some(&included),
            state: Some(state),
            loaded_state,
            dirty: Some(&dirty),
        };
        build_group(&self.persister, &self.dialect, &shape, true)
    }

    /// Returns the version written, if the entity is versioned.
    pub async fn coordinate_update(
        &self,
        session: &mut MutationSession,
        request: UpdateRequest,
    ) -> Result<Option<Value>> {
        let span = info_span!("coordinate_update", entity = %self.persister.entity_name());
        self.update(session, request).instrument(span).await
    }

    fn included_attributes(&self, dirty: &BTreeSet<usize>) -> BTreeSet<usize> {
        if !self.persister.is_dynamic_update() {
            return (0..self.persister.attributes().len()).collect();
        }
        let mut included = dirty.clone();
        included.extend(self.persister.version_index());
        included
    }

    async fn update(
        &self,
        session: &mut MutationSession,
        request: UpdateRequest,
    ) -> Result<Option<Value>> {
        let persister = &self.persister;
        let UpdateRequest {
            id,
            mut state,
            previous_state,
            dirty,
            previous_version,
        } = request;
        persister.check_state(&state)?;
        if let Some(previous) = &previous_state {
            persister.check_state(previous)?;
        }

        let previous_version = match (persister.version_index(), previous_version) {
            (None, _) => None,
            (Some(_), Some(version)) => Some(version),
            (Some(idx), None) => previous_state.as_ref().map(|previous| previous[idx].clone()),
        };
        let new_version = match (persister.version_index(), &previous_version) {
            (Some(idx), Some(previous)) if state[idx] == *previous || state[idx].is_null() => {
                state[idx] = persister.next_version(previous)?;
                Some(state[idx].clone())
            }
            (Some(idx), _) => Some(state[idx].clone()),
            (None, _) => None,
        };

        let dirty: Option<BTreeSet<usize>> = match (dirty, &previous_state) {
            (Some(dirty), _) => Some(dirty.into_iter().collect()),
            (None, Some(previous)) => Some(
                state
                    .iter()
                    .zip(previous)
                    .enumerate()
                    .filter(|(_, (current, loaded))| current != loaded)
                    .map(|(idx, _)| idx)
                    .collect(),
            ),
            (None, None) => None,
        };

        let lock_style = persister.optimistic_lock_style();
        let loaded_state = previous_state.as_deref().filter(|_| lock_style.is_all_or_dirty());
        let dynamic = (persister.is_dynamic_update() && dirty.is_some()) || loaded_state.is_some();

        let dynamic_group;
        let group = if dynamic {
            let dirty = dirty.unwrap_or_default();
            let included = self.included_attributes(&dirty);
            let shape = UpdateShape {
                included: Some(&included),
                state: Some(&state),
                loaded_state,
                dirty: Some(&dirty),
            };
            dynamic_group = build_group(persister, &self.dialect, &shape, true)?;
            &dynamic_group
        } else {
            self.static_group.as_ref()
        };

        if group.is_empty() {
            return Ok(new_version);
        }

        let mut bindings = JdbcValueBindings::new();
        bind_id(persister, group, &id, ParameterUsage::Restrict, &mut bindings)?;
        for slot in group.slots() {
            let all_null = bind_table_values(persister, slot.table.name(), &state, &mut bindings)?;
            if !dynamic && slot.table.is_optional() && all_null {
                bindings.skip_table(slot.table.name());
            }
        }

        if lock_style.is_version() {
            if let (Some(column), Some(version)) = (persister.version_column(), previous_version) {
                let root = persister.identifier_table().name();
                bindings.bind_value(root, &column.name, ParameterUsage::Restrict, version);
            } else {
                return Err(PersistError::Mapping(format!(
                    "update of versioned entity '{}' requires the previous version",
                    persister.entity_name()
                )));
            }
        }
        if let Some(loaded) = loaded_state {
            bind_loaded_state(persister, group, loaded, &mut bindings)?;
        }

        let row = RowIdentity::new(persister.entity_name(), id);
        execute_group(session, group, bindings, &row).await?;
        session.statistics().entity_update();
        Ok(new_version)
    }
}

fn build_group(
    persister: &EntityPersister,
    dialect: &Dialect,
    shape: &UpdateShape<'_>,
    dynamic: bool,
) -> Result<MutationOperationGroup> {
    let lock_style = persister.optimistic_lock_style();
    let mut group_builder = MutationGroupBuilder::new(MutationType::Update, persister.entity_name());

    for table in persister.tables().iter().filter(|table| !table.is_inverse()) {
        let mutation_type = if table.is_optional() {
            MutationType::Upsert
        } else {
            MutationType::Update
        };
        let mut builder = StandardTableMutationBuilder::new(Arc::clone(table), mutation_type);
        let mut has_non_null = false;
        for (idx, attr) in persister.attributes_of_table(table.name()) {
            // Judged on the whole new row; a dirty column set to null must still be written.
            has_non_null |= shape.state.is_none_or(|state| !state[idx].is_all_null());
            if shape.included.is_some_and(|included| !included.contains(&idx)) {
                continue;
            }
            for column in attr.columns().iter().filter(|column| column.updatable) {
                builder.add_value_column(&column.name, &column.write_expression, column.jdbc_type);
            }
        }
        for (column, jdbc_type) in table.key_columns().iter().zip(persister.identifier_types()) {
            builder.add_key_restriction(column, *jdbc_type);
        }

        if lock_style == OptimisticLockStyle::Version && table.is_identifier_table() {
            if let Some(column) = persister.version_column() {
                builder.add_lock_restriction(&column.name, column.jdbc_type, false);
            }
        }

        if dynamic && table.is_optional() && !has_non_null {
            group_builder.add_table_builder(TableMutationBuilder::Omitted(Arc::clone(table)));
        } else {
            group_builder.add_table_builder(TableMutationBuilder::Standard(builder));
        }
    }

    if let Some(loaded) = shape.loaded_state {
        let locked = |idx: usize| match lock_style {
            OptimisticLockStyle::All => true,
            OptimisticLockStyle::Dirty => shape.dirty.is_some_and(|dirty| dirty.contains(&idx)),
            _ => false,
        };
        add_loaded_state_restrictions(persister, &mut group_builder, loaded, locked)?;
    }

    if dynamic {
        group_builder.build_dynamic(dialect)
    } else {
        group_builder.build(dialect)
    }
}
