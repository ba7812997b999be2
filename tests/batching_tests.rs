use std::sync::Arc;
use std::time::Duration;

use relpersist::jdbc::{ExecutionStrategy, JdbcConnection};
use relpersist::persister::{DeleteCoordinator, InsertCoordinator, UpdateCoordinator};
use relpersist::{
    AttributeMapping, DatabaseFamily, DatabaseVersion, DeleteRequest, Dialect, EntityPersister,
    InsertRequest, JdbcType, MemoryDatabase, MutationSession, Statistics, TableDefinition,
    TableMapping, UpdateRequest, Value,
};

fn customer_persister() -> Arc<EntityPersister> {
    Arc::new(
        EntityPersister::builder("Customer")
            .table(TableMapping::builder("customers").key_column("id").build().unwrap())
            .table(TableMapping::builder("customer_profiles").key_column("customer_id").build().unwrap())
            .attribute(AttributeMapping::basic("name", "customers", "name", JdbcType::Varchar))
            .attribute(AttributeMapping::basic("bio", "customer_profiles", "bio", JdbcType::Varchar))
            .build()
            .unwrap(),
    )
}

async fn customer_database() -> MemoryDatabase {
    let db = MemoryDatabase::new(DatabaseFamily::PostgreSql);
    db.create_table(TableDefinition::new("customers").primary_key(&["id"])).await;
    db.create_table(
        TableDefinition::new("customer_profiles")
            .primary_key(&["customer_id"])
            .foreign_key("fk_profile_customer", &["customer_id"], "customers", &["id"]),
    )
    .await;
    db
}

fn dialect() -> Arc<Dialect> {
    Arc::new(Dialect::resolve(DatabaseFamily::PostgreSql, DatabaseVersion::make(16, 0)))
}

fn batched_session(db: &MemoryDatabase, batch_size: usize) -> MutationSession {
    let connection: Arc<dyn JdbcConnection> = Arc::new(db.clone());
    MutationSession::new(connection, dialect(), Arc::new(Statistics::new(true))).with_batch_size(batch_size)
}

fn customer(id: i64) -> InsertRequest {
    InsertRequest::new(vec![Value::from(format!("customer {id}")), Value::from("hello")]).with_id(id)
}

#[tokio::test]
async fn test_rows_are_queued_until_flush() {
    let db = customer_database().await;
    let inserts = InsertCoordinator::new(customer_persister(), dialect()).unwrap();
    let mut session = batched_session(&db, 10);

    for id in 1..=3 {
        inserts.coordinate_insert(&mut session, customer(id)).await.unwrap();
    }
    assert_eq!(session.pending_batch().map(|batch| batch.row_count()), Some(3));
    assert_eq!(db.row_count("customers").await, 0);

    session.flush().await.unwrap();
    assert!(!session.has_pending_batch());
    assert_eq!(db.row_count("customers").await, 3);
    assert_eq!(db.row_count("customer_profiles").await, 3);

    let log = db.log().await;
    assert_eq!(
        log.batches,
        vec![
            ("insert into customers (id,name) values (?,?)".to_string(), 3),
            ("insert into customer_profiles (customer_id,bio) values (?,?)".to_string(), 3),
        ]
    );
    assert_eq!(log.prepared.len(), 2);
    assert_eq!(session.statistics().snapshot().executed_batches, 2);
    assert_eq!(db.open_statements(), 0);
}

#[tokio::test]
async fn test_batch_flushes_when_full() {
    let db = customer_database().await;
    let inserts = InsertCoordinator::new(customer_persister(), dialect()).unwrap();
    let mut session = batched_session(&db, 2);

    for id in 1..=5 {
        inserts.coordinate_insert(&mut session, customer(id)).await.unwrap();
    }
    assert_eq!(db.row_count("customers").await, 4);
    session.flush().await.unwrap();

    let sizes: Vec<usize> = db
        .log()
        .await
        .batches
        .iter()
        .filter(|(sql, _)| sql.starts_with("insert into customers"))
        .map(|(_, rows)| *rows)
        .collect();
    assert_eq!(sizes, vec![2, 2, 1]);
}

#[tokio::test]
async fn test_batch_key_change_flushes_pending_rows() {
    let db = customer_database().await;
    let persister = customer_persister();
    let inserts = InsertCoordinator::new(Arc::clone(&persister), dialect()).unwrap();
    let updates = UpdateCoordinator::new(Arc::clone(&persister), dialect()).unwrap();
    let mut session = batched_session(&db, 10);

    inserts.coordinate_insert(&mut session, customer(1)).await.unwrap();
    inserts.coordinate_insert(&mut session, customer(2)).await.unwrap();
    updates
        .coordinate_update(
            &mut session,
            UpdateRequest::new(1, vec![Value::from("renamed"), Value::from("hello")]),
        )
        .await
        .unwrap();

    // The inserts ran before the update was queued.
    assert_eq!(db.row_count("customers").await, 2);
    assert_eq!(session.pending_batch().map(|batch| batch.key().to_string()), Some("Customer#UPDATE".to_string()));

    session.flush().await.unwrap();
    assert_eq!(db.rows("customers").await[0]["name"], Value::from("renamed"));
}

#[tokio::test]
async fn test_batched_row_count_failure_is_stale_state() {
    let db = customer_database().await;
    let persister = customer_persister();
    let deletes = DeleteCoordinator::new(Arc::clone(&persister), dialect()).unwrap();
    let mut session = batched_session(&db, 10);

    deletes
        .coordinate_delete(&mut session, DeleteRequest::new(42))
        .await
        .unwrap();
    let err = session.flush().await.unwrap_err();
    assert!(err.is_stale_state());
    assert_eq!(session.statistics().snapshot().optimistic_failures, 1);
    assert_eq!(db.open_statements(), 0);
}

#[tokio::test]
async fn test_success_no_info_outcomes_pass_verification() {
    let db = customer_database().await;
    db.set_success_no_info(true).await;
    let deletes = DeleteCoordinator::new(customer_persister(), dialect()).unwrap();
    let mut session = batched_session(&db, 10);

    deletes
        .coordinate_delete(&mut session, DeleteRequest::new(42))
        .await
        .unwrap();
    session.flush().await.unwrap();
}

#[tokio::test]
async fn test_dropping_session_releases_pending_batch() {
    let db = customer_database().await;
    let inserts = InsertCoordinator::new(customer_persister(), dialect()).unwrap();
    {
        let mut session = batched_session(&db, 10);
        inserts.coordinate_insert(&mut session, customer(1)).await.unwrap();
        assert_eq!(db.open_statements(), 2);
    }
    assert_eq!(db.open_statements(), 0);
    assert_eq!(db.row_count("customers").await, 0);
}

#[tokio::test]
async fn test_strategy_selection_and_timeouts() {
    let db = customer_database().await;
    let persister = customer_persister();
    let inserts = InsertCoordinator::new(Arc::clone(&persister), dialect()).unwrap();
    let group = inserts.static_group();
    assert_eq!(ExecutionStrategy::select(group, 1), ExecutionStrategy::Standard);
    assert_eq!(ExecutionStrategy::select(group, 20), ExecutionStrategy::Batched);

    let mut session = batched_session(&db, 1).with_query_timeout(Some(Duration::from_secs(2)));
    inserts.coordinate_insert(&mut session, customer(1)).await.unwrap();
    let log = db.log().await;
    assert_eq!(log.updates.len(), 2);
    assert!(log.batches.is_empty());
    assert_eq!(log.timeouts, vec![Duration::from_secs(2); 2]);
}
