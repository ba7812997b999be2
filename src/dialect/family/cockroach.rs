use crate::core::JdbcType;
use crate::dialect::constraint::{LockFailure, SqlExceptionTranslator, VendorCode};
use crate::dialect::ddl_types::{DdlType, DdlTypeRegistry, SizeDefaults};
use crate::dialect::dml::UpsertStyle;
use crate::dialect::identity::{IdentityColumnSupport, SequenceSupport};
use crate::dialect::limit::LimitHandler;
use crate::dialect::lock::LockingSupport;
use crate::dialect::temporal::{ExtractSupport, TemporalUnit};
use crate::dialect::version::DatabaseVersion;
use crate::dialect::{Capabilities, ConstraintNamePosition, DatabaseFamily, Dialect};

pub(crate) fn build(version: DatabaseVersion) -> Dialect {
    Dialect {
        family: DatabaseFamily::CockroachDb,
        version,
        ddl_types: ddl_types(),
        max_varchar_length: 10_485_760,
        max_varbinary_length: -1,
        temporal: super::postgres::temporal()
            .with_pattern(
                TemporalUnit::DayOfWeek,
                "(extract(dayofweek from ?2)+1)",
                ExtractSupport::Emulated,
            )
            .with_pattern(
                TemporalUnit::DayOfYear,
                "extract(dayofyear from ?2)",
                ExtractSupport::Emulated,
            ),
        limit_handler: LimitHandler::LimitOffset,
        identity: IdentityColumnSupport::Serial {
            smallint: Some("serial2"),
            integer: "serial4",
            bigint: "serial8",
            identity_columns: false,
            select: "select 1",
        },
        sequences: SequenceSupport::NextVal,
        locking: LockingSupport {
            for_update_of: true,
            nowait: version.is_same_or_after(20, 1),
            skip_locked: version.is_same_or_after(22, 2),
            for_share: version.is_same_or_after(20, 1),
        },
        exceptions: exceptions(),
        upsert_style: UpsertStyle::OnConflict,
        constraint_name_position: ConstraintNamePosition::Leading,
        boolean_literals: ("true", "false"),
        capabilities: Capabilities {
            window_functions: true,
            lateral: version.is_same_or_after(20, 2),
            order_by_in_subquery: true,
            filter_clause: true,
        },
        no_columns_insert: "default values",
        row_id_column: None,
    }
}

fn ddl_types() -> DdlTypeRegistry {
    let mut types = DdlTypeRegistry::standard(SizeDefaults::default());
    types.register(DdlType::simple(JdbcType::TinyInt, "smallint"));
    types.register(DdlType::simple(JdbcType::Double, "double precision"));
    types.register(DdlType::simple(JdbcType::NChar, "char($l)"));
    types.register(DdlType::simple(JdbcType::NVarchar, "varchar($l)"));
    types.register(DdlType::simple(JdbcType::LongVarchar, "string"));
    types.register(DdlType::simple(JdbcType::LongNVarchar, "string"));
    types.register(DdlType::simple(JdbcType::Clob, "string"));
    types.register(DdlType::simple(JdbcType::Binary, "bytes"));
    types.register(DdlType::simple(JdbcType::VarBinary, "bytes"));
    types.register(DdlType::simple(JdbcType::LongVarBinary, "bytes"));
    types.register(DdlType::simple(JdbcType::Blob, "bytes"));
    types.register(DdlType::simple(JdbcType::Uuid, "uuid"));
    types
}

fn exceptions() -> SqlExceptionTranslator {
    super::postgres_constraint_rules()
        .into_iter()
        .fold(SqlExceptionTranslator::new(), |translator, rule| {
            translator.with_constraint_rule(rule)
        })
        // "restart transaction": serialization conflicts surface as lock failures
        .with_lock_rule(VendorCode::SqlState("40001"), LockFailure::LockAcquisition)
        .with_lock_rule(VendorCode::SqlState("40P01"), LockFailure::LockAcquisition)
        .with_lock_rule(VendorCode::SqlState("55P03"), LockFailure::PessimisticLock)
        .with_lock_rule(VendorCode::SqlState("57014"), LockFailure::QueryTimeout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PersistError;

    #[test]
    fn test_serial_identity() {
        let dialect = build(DatabaseVersion::make(23, 1));
        let identity = dialect.identity_column_support();
        assert!(!identity.supports_identity_columns());
        assert!(!identity.has_data_type_in_identity_column());
        assert_eq!(identity.identity_column_string(JdbcType::BigInt).unwrap(), "serial8");
        assert!(matches!(
            identity.identity_column_string(JdbcType::Uuid),
            Err(PersistError::Mapping(_))
        ));
    }

    #[test]
    fn test_upsert_regardless_of_version() {
        assert!(build(DatabaseVersion::make(19, 2)).supports_upsert());
        assert!(!build(DatabaseVersion::make(19, 2)).supports_lateral());
    }
}
