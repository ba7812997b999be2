use relpersist::dialect::{Limit, LockOptions, TemporalUnit};
use relpersist::{DatabaseFamily, Dialect, JdbcType, PersistError, Size, SqlException};

fn every_dialect() -> Vec<Dialect> {
    DatabaseFamily::ALL
        .iter()
        .map(|family| Dialect::resolve(*family, family.minimum_version()))
        .collect()
}

#[test]
fn test_column_type_lookup_is_stable() {
    for dialect in every_dialect() {
        for code in [JdbcType::Varchar, JdbcType::Decimal, JdbcType::Timestamp, JdbcType::Boolean] {
            assert_eq!(dialect.column_type(code), dialect.column_type(code), "{dialect}");
            let sized = dialect.type_name(code, Size::length(100));
            assert!(!sized.contains('$'), "{dialect}: unresolved placeholder in {sized}");
        }
    }
}

#[test]
fn test_empty_limit_leaves_sql_untouched() {
    let sql = "select id from orders order by id";
    for dialect in every_dialect() {
        let limited = dialect.limit_handler().apply(sql, &Limit::default()).unwrap();
        assert_eq!(limited.sql, sql, "{dialect}");
        assert!(limited.leading_parameters.is_empty());
        assert!(limited.trailing_parameters.is_empty());
    }
}

#[test]
fn test_every_dialect_renders_extract_and_locking() {
    for dialect in every_dialect() {
        let rendered = dialect.render_extract(TemporalUnit::Year, "created_at");
        assert!(rendered.contains("created_at"), "{dialect}: {rendered}");
        assert!(!dialect.for_update_string(&LockOptions::write()).is_empty(), "{dialect}");
    }
}

#[test]
fn test_unclassified_exception_is_generic_jdbc_error() {
    for dialect in every_dialect() {
        let err = dialect.convert_sql_exception(
            SqlException::new("network is unreachable").with_sql_state("08001"),
            "could not execute statement",
            "update orders set status=? where id=?",
        );
        assert!(matches!(err, PersistError::Jdbc { .. }), "{dialect}: {err}");
        assert_eq!(err.constraint_name(), None);
    }
}

#[test]
fn test_integrity_class_without_rule_is_constraint_violation() {
    let dialect = Dialect::resolve(DatabaseFamily::PostgreSql, DatabaseFamily::PostgreSql.minimum_version());
    let err = dialect.convert_sql_exception(
        SqlException::new("integrity violation").with_sql_state("23000"),
        "could not execute statement",
        "insert into orders (id) values (?)",
    );
    assert!(matches!(err, PersistError::ConstraintViolation { constraint_name: None, .. }));
}
