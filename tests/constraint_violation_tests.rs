use std::sync::Arc;

use relpersist::jdbc::JdbcConnection;
use relpersist::persister::{DeleteCoordinator, InsertCoordinator};
use relpersist::{
    AttributeMapping, ConstraintKind, DatabaseFamily, DatabaseVersion, DeleteRequest, Dialect,
    EntityPersister, InsertRequest, JdbcType, MemoryDatabase, MutationSession, PersistError,
    SqlException, Statistics, TableDefinition, TableMapping, Value,
};

fn account_persister() -> Arc<EntityPersister> {
    Arc::new(
        EntityPersister::builder("Account")
            .table(TableMapping::builder("accounts").key_column("id").build().unwrap())
            .attribute(AttributeMapping::basic("email", "accounts", "email", JdbcType::Varchar))
            .attribute(AttributeMapping::basic("owner", "accounts", "owner_id", JdbcType::BigInt))
            .build()
            .unwrap(),
    )
}

fn dialect(family: DatabaseFamily) -> Arc<Dialect> {
    let version = match family {
        DatabaseFamily::MySql => DatabaseVersion::make(8, 0),
        DatabaseFamily::Informix => DatabaseVersion::make(14, 10),
        DatabaseFamily::CockroachDb => DatabaseVersion::make(23, 1),
        DatabaseFamily::PostgreSql => DatabaseVersion::make(16, 0),
    };
    Arc::new(Dialect::resolve(family, version))
}

async fn account_database(family: DatabaseFamily) -> MemoryDatabase {
    let db = MemoryDatabase::new(family);
    db.create_table(TableDefinition::new("owners").primary_key(&["id"])).await;
    db.create_table(
        TableDefinition::new("accounts")
            .primary_key(&["id"])
            .unique("uk_email", &["email"])
            .not_null("email")
            .foreign_key("fk_account_owner", &["owner_id"], "owners", &["id"]),
    )
    .await;
    db
}

fn session(db: &MemoryDatabase, batch_size: usize) -> MutationSession {
    let connection: Arc<dyn JdbcConnection> = Arc::new(db.clone());
    MutationSession::new(connection, dialect(db.family()), Arc::new(Statistics::new(true)))
        .with_batch_size(batch_size)
}

fn account(id: i64, email: Option<&str>) -> InsertRequest {
    InsertRequest::new(vec![email.map_or(Value::Null, Value::from), Value::Null]).with_id(id)
}

async fn insert_duplicate_emails(family: DatabaseFamily, batch_size: usize) -> PersistError {
    let db = account_database(family).await;
    let inserts = InsertCoordinator::new(account_persister(), dialect(family)).unwrap();
    let mut session = session(&db, batch_size);
    inserts
        .coordinate_insert(&mut session, account(1, Some("ann@example.com")))
        .await
        .unwrap();
    let queued = inserts
        .coordinate_insert(&mut session, account(2, Some("ann@example.com")))
        .await;
    match queued {
        Err(err) => err,
        Ok(_) => session.flush().await.unwrap_err(),
    }
}

#[tokio::test]
async fn test_unique_violation_names_constraint_across_families() {
    for family in [DatabaseFamily::PostgreSql, DatabaseFamily::MySql, DatabaseFamily::Informix] {
        let err = insert_duplicate_emails(family, 1).await;
        assert_eq!(err.constraint_name(), Some("uk_email"), "{family:?}: {err}");
        assert!(matches!(
            err,
            PersistError::ConstraintViolation {
                kind: ConstraintKind::Unique,
                ..
            }
        ));
    }
}

#[tokio::test]
async fn test_batched_violation_is_seen_through_batch_wrapper() {
    for family in [DatabaseFamily::PostgreSql, DatabaseFamily::MySql] {
        let err = insert_duplicate_emails(family, 10).await;
        assert_eq!(err.constraint_name(), Some("uk_email"), "{family:?}: {err}");
        assert!(err.sql_exception().is_some_and(SqlException::is_batch_update));
    }
}

#[tokio::test]
async fn test_not_null_and_foreign_key_violations() {
    let db = account_database(DatabaseFamily::PostgreSql).await;
    let inserts = InsertCoordinator::new(account_persister(), dialect(DatabaseFamily::PostgreSql)).unwrap();
    let mut session = session(&db, 1);

    let err = inserts
        .coordinate_insert(&mut session, account(1, None))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PersistError::ConstraintViolation {
            kind: ConstraintKind::NotNull,
            ..
        }
    ));
    assert_eq!(err.constraint_name(), Some("email"));

    let orphan = InsertRequest::new(vec![Value::from("bo@example.com"), Value::from(7)]).with_id(2);
    let err = inserts.coordinate_insert(&mut session, orphan).await.unwrap_err();
    assert_eq!(err.constraint_name(), Some("fk_account_owner"));
}

#[tokio::test]
async fn test_deleting_referenced_parent_is_foreign_key_violation() {
    let db = MemoryDatabase::new(DatabaseFamily::MySql);
    db.create_table(TableDefinition::new("accounts").primary_key(&["id"])).await;
    db.create_table(
        TableDefinition::new("sessions")
            .primary_key(&["id"])
            .foreign_key("fk_session_account", &["account_id"], "accounts", &["id"]),
    )
    .await;
    db.execute("insert into accounts (id,email,owner_id) values (?,?,?)", vec![
        Value::from(1),
        Value::from("ann@example.com"),
        Value::Null,
    ])
    .await
    .unwrap();
    db.execute("insert into sessions (id,account_id) values (?,?)", vec![Value::from(10), Value::from(1)])
        .await
        .unwrap();

    let deletes = DeleteCoordinator::new(account_persister(), dialect(DatabaseFamily::MySql)).unwrap();
    let mut session = session(&db, 1);
    let err = deletes
        .coordinate_delete(&mut session, DeleteRequest::new(1))
        .await
        .unwrap_err();
    assert_eq!(err.constraint_name(), Some("fk_session_account"));
    assert_eq!(db.row_count("accounts").await, 1);
}

#[tokio::test]
async fn test_lock_failures_are_classified() {
    let db = account_database(DatabaseFamily::PostgreSql).await;
    let inserts = InsertCoordinator::new(account_persister(), dialect(DatabaseFamily::PostgreSql)).unwrap();
    let mut session = session(&db, 1);

    db.fail_next(
        "insert into accounts",
        SqlException::new("ERROR: canceling statement due to statement timeout").with_sql_state("57014"),
    )
    .await;
    let err = inserts
        .coordinate_insert(&mut session, account(1, Some("ann@example.com")))
        .await
        .unwrap_err();
    assert!(matches!(err, PersistError::QueryTimeout { .. }));

    db.fail_next(
        "insert into accounts",
        SqlException::new("ERROR: could not obtain lock on row").with_sql_state("55P03"),
    )
    .await;
    let err = inserts
        .coordinate_insert(&mut session, account(1, Some("ann@example.com")))
        .await
        .unwrap_err();
    assert!(matches!(err, PersistError::PessimisticLock { .. }));

    db.fail_next("insert into accounts", SqlException::new("connection reset").with_sql_state("08006"))
        .await;
    let err = inserts
        .coordinate_insert(&mut session, account(1, Some("ann@example.com")))
        .await
        .unwrap_err();
    assert!(matches!(err, PersistError::Jdbc { .. }));
    assert_eq!(err.constraint_name(), None);
}
