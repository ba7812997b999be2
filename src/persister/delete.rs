use std::sync::{Arc, OnceLock};

use tracing::{Instrument, info_span};

use crate::core::{PersistError, Result, Value};
use crate::dialect::Dialect;
use crate::jdbc::JdbcValueBindings;
use crate::mutation::{
    MutationGroupBuilder, MutationOperationGroup, MutationType, ParameterUsage, RowIdentity,
    StandardTableMutationBuilder, TableMutationBuilder,
};
use crate::persister::coordinator::{
    DeleteRequest, add_loaded_state_restrictions, bind_id, bind_loaded_state, execute_group,
};
use crate::persister::entity::EntityPersister;
use crate::session::MutationSession;

/// Deletes an entity's rows, secondary tables first.
#[derive(Debug)]
pub struct DeleteCoordinator {
    persister: Arc<EntityPersister>,
    dialect: Arc<Dialect>,
    static_group: Arc<MutationOperationGroup>,
    /// Delete by identifier alone, built on first use.
    no_version_group: OnceLock<Arc<MutationOperationGroup>>,
}

impl DeleteCoordinator {
    pub fn new(persister: Arc<EntityPersister>, dialect: Arc<Dialect>) -> Result<Self> {
        let static_group = Arc::new(generate(&persister, &dialect, None, true, false, false)?);
        let no_version_group = OnceLock::new();
        if !persister.is_versioned() {
            let _ = no_version_group.set(Arc::clone(&static_group));
        }
        Ok(Self {
            persister,
            dialect,
            static_group,
            no_version_group,
        })
    }

    pub fn static_group(&self) -> &Arc<MutationOperationGroup> {
        &self.static_group
    }

    /// The group used when no instance (and so no version) is at hand.
    pub fn no_version_group(&self) -> Result<Arc<MutationOperationGroup>> {
        if let Some(group) = self.no_version_group.get() {
            return Ok(Arc::clone(group));
        }
        let group = Arc::new(generate(
            &self.persister,
            &self.dialect,
            None,
            false,
            false,
            false,
        )?);
        Ok(Arc::clone(self.no_version_group.get_or_init(|| group)))
    }

    pub async fn coordinate_delete(
        &self,
        session: &mut MutationSession,
        request: DeleteRequest,
    ) -> Result<()> {
        let span = info_span!("coordinate_delete", entity = %self.persister.entity_name());
        self.delete(session, request).instrument(span).await
    }

    async fn delete(&self, session: &mut MutationSession, request: DeleteRequest) -> Result<()> {
        let persister = &self.persister;
        let DeleteRequest {
            id,
            version,
            loaded_state,
            row_id,
            has_instance,
        } = request;

        let loaded_state = loaded_state.filter(|_| {
            has_instance && persister.optimistic_lock_style().is_all_or_dirty()
        });
        if let Some(loaded) = &loaded_state {
            persister.check_state(loaded)?;
        }
        let row_id = row_id.filter(|_| persister.has_row_id() && self.dialect.row_id_column().is_some());
        let apply_version = has_instance;

        let group = if loaded_state.is_some() || row_id.is_some() {
            Arc::new(generate(
                persister,
                &self.dialect,
                loaded_state.as_deref(),
                apply_version,
                row_id.is_some(),
                true,
            )?)
        } else if has_instance {
            Arc::clone(&self.static_group)
        } else {
            self.no_version_group()?
        };

        let mut bindings = JdbcValueBindings::new();
        bind_id(persister, &group, &id, ParameterUsage::Restrict, &mut bindings)?;
        if let (Some(row_id), Some(column)) = (row_id, self.dialect.row_id_column()) {
            let root = persister.identifier_table().name();
            bindings.bind_value(root, column, ParameterUsage::Restrict, row_id);
        }
        if apply_version && persister.optimistic_lock_style().is_version() {
            if let (Some(column), Some(version)) = (persister.version_column(), version) {
                let root = persister.identifier_table().name();
                bindings.bind_value(root, &column.name, ParameterUsage::Restrict, version);
            } else {
                return Err(PersistError::Mapping(format!(
                    "delete of versioned entity '{}' requires the current version",
                    persister.entity_name()
                )));
            }
        }
        if let Some(loaded) = &loaded_state {
            bind_loaded_state(persister, &group, loaded, &mut bindings)?;
        }

        let row = RowIdentity::new(persister.entity_name(), id);
        execute_group(session, &group, bindings, &row).await?;
        session.statistics().entity_delete();
        Ok(())
    }
}

fn generate(
    persister: &EntityPersister,
    dialect: &Dialect,
    loaded_state: Option<&[Value]>,
    apply_version: bool,
    use_row_id: bool,
    dynamic: bool,
) -> Result<MutationOperationGroup> {
    let lock_style = persister.optimistic_lock_style();
    let mut group_builder = MutationGroupBuilder::new(MutationType::Delete, persister.entity_name());

    for table in persister.tables().iter().rev().filter(|table| !table.is_inverse()) {
        if table.is_cascade_delete_enabled() {
            group_builder.add_table_builder(TableMutationBuilder::Skipped(Arc::clone(table)));
            continue;
        }
        let mut builder = StandardTableMutationBuilder::new(Arc::clone(table), MutationType::Delete);
        match (use_row_id && table.is_identifier_table(), dialect.row_id_column(), persister.row_id_type()) {
            (true, Some(column), Some(jdbc_type)) => {
                builder.add_key_restriction(column, jdbc_type);
            }
            (true, _, _) => {
                return Err(PersistError::UnsupportedCapability(format!(
                    "{} cannot delete entity '{}' by row id",
                    dialect,
                    persister.entity_name()
                )));
            }
            (false, _, _) => {
                for (column, jdbc_type) in table.key_columns().iter().zip(persister.identifier_types()) {
                    builder.add_key_restriction(column, *jdbc_type);
                }
            }
        }
        if apply_version && lock_style.is_version() && table.is_identifier_table() {
            if let Some(column) = persister.version_column() {
                builder.add_lock_restriction(&column.name, column.jdbc_type, false);
            }
        }
        group_builder.add_table_builder(TableMutationBuilder::Standard(builder));
    }

    if let (true, Some(loaded)) = (apply_version, loaded_state) {
        add_loaded_state_restrictions(persister, &mut group_builder, loaded, |_| true)?;
    }

    if dynamic {
        group_builder.build_dynamic(dialect)
    } else {
        group_builder.build(dialect)
    }
}
