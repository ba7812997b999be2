use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use relpersist::dialect::Limit;
use relpersist::jdbc::JdbcConnection;
use relpersist::query::StatementKind;
use relpersist::{
    AttributeMapping, DatabaseFamily, DeleteRequest, EntityPersister, InsertRequest, JdbcType,
    MemoryDatabase, PersistError, PersistenceSettings, PersistenceUnit, ResultShape,
    TableDefinition, TableMapping, UpdateRequest, Value,
};
use tempfile::NamedTempFile;

fn product_persister() -> EntityPersister {
    EntityPersister::builder("Product")
        .table(TableMapping::builder("products").key_column("id").build().unwrap())
        .attribute(AttributeMapping::basic("name", "products", "name", JdbcType::Varchar))
        .attribute(AttributeMapping::basic("version", "products", "version", JdbcType::Integer))
        .version("version")
        .build()
        .unwrap()
}

fn unit(settings: PersistenceSettings) -> PersistenceUnit {
    PersistenceUnit::builder(settings)
        .entity(product_persister())
        .build()
        .unwrap()
}

fn postgres_unit() -> PersistenceUnit {
    unit(PersistenceSettings::new(DatabaseFamily::PostgreSql, "16.2").statistics_enabled(true))
}

// ============================================================================
// Configuration
// ============================================================================

#[tokio::test]
async fn test_settings_load_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{"family": "mysql", "version": "8.0.36", "batch_size": 20, "query_timeout_ms": 1500}}"#
    )
    .unwrap();

    let settings = PersistenceSettings::load(file.path()).await.unwrap();
    assert_eq!(settings.family, DatabaseFamily::MySql);
    assert_eq!(settings.batch_size, 20);
    assert_eq!(settings.timeout(), Some(Duration::from_millis(1500)));

    let unit = unit(settings);
    assert_eq!(unit.dialect().family(), DatabaseFamily::MySql);
    assert_eq!(unit.dialect().version().major, 8);
}

#[tokio::test]
async fn test_invalid_settings_file_is_rejected() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, r#"{{"family": "postgresql", "batch_size": 0}}"#).unwrap();
    let err = PersistenceSettings::load(file.path()).await.unwrap_err();
    assert!(matches!(err, PersistError::Configuration(_)));

    let missing = PersistenceSettings::load("/nonexistent/relpersist.json").await;
    assert!(matches!(missing, Err(PersistError::IoError(_))));
}

#[test]
fn test_duplicate_and_unknown_entities() {
    let err = PersistenceUnit::builder(PersistenceSettings::default())
        .entity(product_persister())
        .entity(product_persister())
        .build()
        .unwrap_err();
    assert!(matches!(err, PersistError::Configuration(_)));

    let unit = postgres_unit();
    assert!(unit.coordinators("Product").is_ok());
    assert!(matches!(unit.coordinators("Invoice"), Err(PersistError::Mapping(_))));
}

// ============================================================================
// Entity lifecycle
// ============================================================================

#[tokio::test]
async fn test_entity_lifecycle_through_unit() {
    let unit = unit(
        PersistenceSettings::new(DatabaseFamily::PostgreSql, "16.2")
            .statistics_enabled(true)
            .query_timeout(Duration::from_secs(1)),
    );
    let db = MemoryDatabase::new(DatabaseFamily::PostgreSql);
    db.create_table(TableDefinition::new("products").primary_key(&["id"])).await;
    let connection: Arc<dyn JdbcConnection> = Arc::new(db.clone());
    let mut session = unit.open_session(connection);
    assert_eq!(session.query_timeout(), Some(Duration::from_secs(1)));

    let id = unit
        .insert(
            &mut session,
            "Product",
            InsertRequest::new(vec![Value::from("lamp"), Value::Null]).with_id(5),
        )
        .await
        .unwrap();
    assert_eq!(id, Value::Integer(5));
    assert_eq!(db.rows("products").await[0]["version"], Value::Integer(0));

    let version = unit
        .update(
            &mut session,
            "Product",
            UpdateRequest::new(5, vec![Value::from("desk lamp"), Value::Integer(0)])
                .with_previous_version(0),
        )
        .await
        .unwrap();
    assert_eq!(version, Some(Value::Integer(1)));

    unit.delete(&mut session, "Product", DeleteRequest::new(5).with_version(1))
        .await
        .unwrap();
    session.flush().await.unwrap();
    assert_eq!(db.row_count("products").await, 0);

    let stats = unit.statistics().snapshot();
    assert_eq!(stats.entity_inserts, 1);
    assert_eq!(stats.entity_updates, 1);
    assert_eq!(stats.entity_deletes, 1);
    assert_eq!(stats.prepared_statements, stats.closed_statements);
}

// ============================================================================
// Native query cache
// ============================================================================

#[test]
fn test_plan_cache_hits_and_misses() {
    let unit = postgres_unit();
    let sql = "select id, name from products where name = ?";

    let plan = unit
        .prepare_native_query(sql, ResultShape::Single, Limit::max_rows(10))
        .unwrap();
    assert_eq!(plan.interpretation.kind, StatementKind::Select);
    assert_eq!(plan.limited.sql, format!("{sql} limit ?"));
    assert_eq!(plan.limited.trailing_parameters, vec![Value::Integer(10)]);

    // Whitespace differences share an entry.
    let again = unit
        .prepare_native_query(
            "select id,  name\n from products where name = ?",
            ResultShape::Single,
            Limit::max_rows(10),
        )
        .unwrap();
    assert!(Arc::ptr_eq(&plan, &again));

    let stats = unit.statistics().snapshot();
    assert_eq!(stats.query_plan_cache_misses, 2);
    assert_eq!(stats.query_plan_cache_hits, 1);

    // A new window reuses the parsed interpretation.
    unit.prepare_native_query(sql, ResultShape::Single, Limit::window(20, 10))
        .unwrap();
    let cache = unit.query_cache();
    assert_eq!(cache.number_of_cached_plans().unwrap(), 2);
    assert_eq!(cache.number_of_cached_interpretations().unwrap(), 1);
}

#[test]
fn test_result_shape_separates_entries() {
    let unit = postgres_unit();
    let sql = "select id, name from products";
    unit.prepare_native_query(sql, ResultShape::Single, Limit::default())
        .unwrap();
    unit.prepare_native_query(sql, ResultShape::Multi, Limit::default())
        .unwrap();
    assert_eq!(unit.query_cache().number_of_cached_interpretations().unwrap(), 2);
}

#[test]
fn test_rejected_queries_are_not_cached() {
    let unit = postgres_unit();
    assert!(matches!(
        unit.prepare_native_query("selec id from products", ResultShape::Single, Limit::default()),
        Err(PersistError::ParseError(_))
    ));
    assert!(matches!(
        unit.prepare_native_query(
            "delete from products where id = ?",
            ResultShape::Single,
            Limit::max_rows(1)
        ),
        Err(PersistError::UnsupportedCapability(_))
    ));
    assert_eq!(unit.query_cache().number_of_cached_plans().unwrap(), 0);
}

#[test]
fn test_native_parameters_and_close() {
    let unit = postgres_unit();
    let params = unit
        .native_query_parameters("select * from products where id = :id or parent_id = :id")
        .unwrap();
    assert_eq!(params.named, vec!["id".to_string()]);
    assert_eq!(params.parameter_count(), 1);

    let cached = unit
        .native_query_parameters("select * from products where id = :id or parent_id = :id")
        .unwrap();
    assert!(Arc::ptr_eq(&params, &cached));
    assert_eq!(unit.query_cache().number_of_cached_parameter_interpretations().unwrap(), 1);

    unit.close().unwrap();
    assert_eq!(unit.query_cache().number_of_cached_parameter_interpretations().unwrap(), 0);
}

#[test]
fn test_cache_size_comes_from_settings() {
    let unit = unit(PersistenceSettings::default().query_plan_cache_max_size(1));
    assert_eq!(unit.query_cache().max_size(), 1);
    for sql in ["select 1", "select 2"] {
        unit.prepare_native_query(sql, ResultShape::Single, Limit::default())
            .unwrap();
    }
    assert_eq!(unit.query_cache().number_of_cached_plans().unwrap(), 1);
}
