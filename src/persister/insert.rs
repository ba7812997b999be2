use std::sync::Arc;

use tracing::{Instrument, info_span};

use crate::core::{PersistError, Result, Value};
use crate::dialect::Dialect;
use crate::jdbc::JdbcValueBindings;
use crate::mutation::{
    MutationGroupBuilder, MutationOperationGroup, MutationType, ParameterUsage, RowIdentity,
    StandardTableMutationBuilder, TableMutationBuilder,
};
use crate::persister::coordinator::{InsertRequest, bind_id, bind_table_values, execute_group};
use crate::persister::entity::{EntityPersister, IdGeneration};
use crate::session::MutationSession;

/// Inserts one entity row per mapped table, root first.
#[derive(Debug)]
pub struct InsertCoordinator {
    persister: Arc<EntityPersister>,
    dialect: Arc<Dialect>,
    static_group: Arc<MutationOperationGroup>,
}

impl InsertCoordinator {
    pub fn new(persister: Arc<EntityPersister>, dialect: Arc<Dialect>) -> Result<Self> {
        if persister.id_generation() == IdGeneration::Identity
            && !dialect.identity_column_support().supports_identity_columns()
        {
            return Err(PersistError::UnsupportedCapability(format!(
                "{} does not support identity columns (entity '{}')",
                dialect,
                persister.entity_name()
            )));
        }
        let static_group = Arc::new(build_group(&persister, &dialect, None)?);
        Ok(Self {
            persister,
            dialect,
            static_group,
        })
    }

    pub fn static_group(&self) -> &Arc<MutationOperationGroup> {
        &self.static_group
    }

    /// Group inserting only the columns whose values are non-null.
    pub fn dynamic_group(&self, state: &[Value]) -> Result<MutationOperationGroup> {
        self.persister.check_state(state)?;
        build_group(&self.persister, &self.dialect, Some(state))
    }

    /// Returns the identifier, generated or assigned.
    pub async fn coordinate_insert(
        &self,
        session: &mut MutationSession,
        request: InsertRequest,
    ) -> Result<Value> {
        let span = info_span!("coordinate_insert", entity = %self.persister.entity_name());
        self.insert(session, request).instrument(span).await
    }

    async fn insert(&self, session: &mut MutationSession, request: InsertRequest) -> Result<Value> {
        let persister = &self.persister;
        let mut state = request.state;
        persister.check_state(&state)?;
        if let Some(idx) = persister.version_index() {
            if state[idx].is_null() {
                if let Some(seed) = persister.initial_version() {
                    state[idx] = seed;
                }
            }
        }

        let id = match (persister.id_generation(), request.id) {
            (IdGeneration::Identity, _) => None,
            (IdGeneration::Assigned, Some(id)) => Some(id),
            (IdGeneration::Assigned, None) => {
                return Err(PersistError::Mapping(format!(
                    "entity '{}' requires an assigned identifier",
                    persister.entity_name()
                )));
            }
        };

        let dynamic_group;
        let group = if persister.is_dynamic_insert() {
            dynamic_group = build_group(persister, &self.dialect, Some(&state))?;
            &dynamic_group
        } else {
            self.static_group.as_ref()
        };

        let mut bindings = JdbcValueBindings::new();
        if let Some(id) = &id {
            bind_id(persister, group, id, ParameterUsage::Set, &mut bindings)?;
        }
        for slot in group.slots() {
            let all_null = bind_table_values(persister, slot.table.name(), &state, &mut bindings)?;
            if slot.table.is_optional() && all_null {
                bindings.skip_table(slot.table.name());
            }
        }

        let row = RowIdentity::new(persister.entity_name(), id.clone().unwrap_or(Value::Null));
        let generated = execute_group(session, group, bindings, &row).await?;
        session.statistics().entity_insert();

        generated.or(id).ok_or_else(|| {
            PersistError::ExecutionError(format!(
                "no identifier produced for entity '{}'",
                persister.entity_name()
            ))
        })
    }
}

fn build_group(
    persister: &EntityPersister,
    dialect: &Dialect,
    state: Option<&[Value]>,
) -> Result<MutationOperationGroup> {
    let identity = persister.id_generation() == IdGeneration::Identity;
    let mut group_builder = MutationGroupBuilder::new(MutationType::Insert, persister.entity_name());

    for table in persister.tables().iter().filter(|table| !table.is_inverse()) {
        let mut builder = StandardTableMutationBuilder::new(Arc::clone(table), MutationType::Insert);
        if identity && table.is_identifier_table() {
            builder.returns_generated_keys();
        } else {
            for (column, jdbc_type) in table.key_columns().iter().zip(persister.identifier_types()) {
                builder.add_value_column(column, "?", *jdbc_type);
            }
        }

        let mut has_attribute_values = false;
        for (idx, attr) in persister.attributes_of_table(table.name()) {
            if state.is_some_and(|state| state[idx].is_all_null()) {
                continue;
            }
            for column in attr.columns().iter().filter(|column| column.insertable) {
                builder.add_value_column(&column.name, &column.write_expression, column.jdbc_type);
                has_attribute_values = true;
            }
        }

        if state.is_some() && table.is_optional() && !has_attribute_values {
            group_builder.add_table_builder(TableMutationBuilder::Omitted(Arc::clone(table)));
        } else {
            group_builder.add_table_builder(TableMutationBuilder::Standard(builder));
        }
    }

    match state {
        None => group_builder.build(dialect),
        Some(_) => group_builder.build_dynamic(dialect),
    }
}
