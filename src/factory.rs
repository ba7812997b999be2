use std::collections::HashMap;
use std::sync::Arc;

use log::info;

use crate::config::PersistenceSettings;
use crate::core::{PersistError, Result, Value};
use crate::dialect::{Dialect, Limit};
use crate::jdbc::JdbcConnection;
use crate::persister::{
    DeleteCoordinator, DeleteRequest, EntityPersister, InsertCoordinator, InsertRequest,
    UpdateCoordinator, UpdateRequest,
};
use crate::query::{
    NativeQueryCache, NativeQueryInterpretation, ParameterInterpretation, PlanKey, QueryPlan,
    ResultShape,
};
use crate::session::MutationSession;
use crate::stats::Statistics;

/// The mutation coordinators of one entity, built together from its
/// persister.
#[derive(Debug)]
pub struct EntityCoordinators {
    pub persister: Arc<EntityPersister>,
    pub insert: InsertCoordinator,
    pub update: UpdateCoordinator,
    pub delete: DeleteCoordinator,
}

impl EntityCoordinators {
    pub fn new(persister: Arc<EntityPersister>, dialect: &Arc<Dialect>) -> Result<Self> {
        Ok(Self {
            insert: InsertCoordinator::new(Arc::clone(&persister), Arc::clone(dialect))?,
            update: UpdateCoordinator::new(Arc::clone(&persister), Arc::clone(dialect))?,
            delete: DeleteCoordinator::new(Arc::clone(&persister), Arc::clone(dialect))?,
            persister,
        })
    }
}

/// Process-wide persistence state, immutable once built.
#[derive(Debug)]
pub struct PersistenceUnit {
    settings: PersistenceSettings,
    dialect: Arc<Dialect>,
    statistics: Arc<Statistics>,
    entities: HashMap<String, EntityCoordinators>,
    query_cache: NativeQueryCache,
}

pub struct PersistenceUnitBuilder {
    settings: PersistenceSettings,
    persisters: Vec<EntityPersister>,
}

impl PersistenceUnitBuilder {
    pub fn entity(mut self, persister: EntityPersister) -> Self {
        self.persisters.push(persister);
        self
    }

    pub fn build(self) -> Result<PersistenceUnit> {
        self.settings.validate()?;
        let dialect = Arc::new(Dialect::resolve(
            self.settings.family,
            self.settings.database_version()?,
        ));
        let statistics = Arc::new(Statistics::new(self.settings.statistics_enabled));

        let mut entities = HashMap::with_capacity(self.persisters.len());
        for persister in self.persisters {
            let name = persister.entity_name().to_string();
            if entities.contains_key(&name) {
                return Err(PersistError::Configuration(format!(
                    "entity '{name}' registered twice"
                )));
            }
            let coordinators = EntityCoordinators::new(Arc::new(persister), &dialect)?;
            entities.insert(name, coordinators);
        }

        let query_cache =
            NativeQueryCache::new(self.settings.query_plan_cache_max_size, Arc::clone(&statistics))?;

        info!(
            "Persistence unit ready: {} with {} entities",
            dialect,
            entities.len()
        );
        Ok(PersistenceUnit {
            settings: self.settings,
            dialect,
            statistics,
            entities,
            query_cache,
        })
    }
}

impl PersistenceUnit {
    pub fn builder(settings: PersistenceSettings) -> PersistenceUnitBuilder {
        PersistenceUnitBuilder {
            settings,
            persisters: Vec::new(),
        }
    }

    pub fn settings(&self) -> &PersistenceSettings {
        &self.settings
    }

    pub fn dialect(&self) -> &Arc<Dialect> {
        &self.dialect
    }

    pub fn statistics(&self) -> &Arc<Statistics> {
        &self.statistics
    }

    pub fn query_cache(&self) -> &NativeQueryCache {
        &self.query_cache
    }

    pub fn coordinators(&self, entity: &str) -> Result<&EntityCoordinators> {
        self.entities
            .get(entity)
            .ok_or_else(|| PersistError::Mapping(format!("unknown entity '{entity}'")))
    }

    pub fn open_session(&self, connection: Arc<dyn JdbcConnection>) -> MutationSession {
        MutationSession::new(connection, Arc::clone(&self.dialect), Arc::clone(&self.statistics))
            .with_batch_size(self.settings.batch_size)
            .with_query_timeout(self.settings.timeout())
    }

    /// Returns the entity's identifier.
    pub async fn insert(
        &self,
        session: &mut MutationSession,
        entity: &str,
        request: InsertRequest,
    ) -> Result<Value> {
        self.coordinators(entity)?
            .insert
            .coordinate_insert(session, request)
            .await
    }

    /// Returns the version written, if the entity is versioned.
    pub async fn update(
        &self,
        session: &mut MutationSession,
        entity: &str,
        request: UpdateRequest,
    ) -> Result<Option<Value>> {
        self.coordinators(entity)?
            .update
            .coordinate_update(session, request)
            .await
    }

    pub async fn delete(
        &self,
        session: &mut MutationSession,
        entity: &str,
        request: DeleteRequest,
    ) -> Result<()> {
        self.coordinators(entity)?
            .delete
            .coordinate_delete(session, request)
            .await
    }

    /// Parses, checks and limits `sql` once per distinct text, shape and
    /// window.
    pub fn prepare_native_query(
        &self,
        sql: &str,
        shape: ResultShape,
        limit: Limit,
    ) -> Result<Arc<QueryPlan>> {
        let dialect = &self.dialect;
        self.query_cache
            .resolve_select_query_plan(PlanKey::new(sql, shape, &limit), || {
                let interpretation = self.query_cache.resolve_interpretation(sql, shape, || {
                    NativeQueryInterpretation::parse(sql, dialect)
                })?;
                QueryPlan::new((*interpretation).clone(), limit, dialect)
            })
    }

    pub fn native_query_parameters(&self, sql: &str) -> Result<Arc<ParameterInterpretation>> {
        self.query_cache
            .resolve_native_query_parameters(sql, ParameterInterpretation::parse)
    }

    pub fn close(&self) -> Result<()> {
        info!("Closing persistence unit");
        self.query_cache.close()
    }
}
