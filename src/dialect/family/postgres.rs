use crate::core::JdbcType;
use crate::dialect::constraint::{LockFailure, SqlExceptionTranslator, VendorCode};
use crate::dialect::ddl_types::{DdlType, DdlTypeRegistry, SizeDefaults};
use crate::dialect::dml::UpsertStyle;
use crate::dialect::identity::{IdentityColumnSupport, SequenceSupport};
use crate::dialect::limit::LimitHandler;
use crate::dialect::lock::LockingSupport;
use crate::dialect::temporal::{ExtractSupport, FormatStyle, TemporalSupport, TemporalUnit};
use crate::dialect::version::DatabaseVersion;
use crate::dialect::{Capabilities, ConstraintNamePosition, DatabaseFamily, Dialect};

const MAX_VARCHAR_LENGTH: u64 = 10_485_760;

pub(crate) fn build(version: DatabaseVersion) -> Dialect {
    Dialect {
        family: DatabaseFamily::PostgreSql,
        version,
        ddl_types: ddl_types(),
        max_varchar_length: MAX_VARCHAR_LENGTH as i64,
        max_varbinary_length: -1,
        temporal: temporal(),
        limit_handler: LimitHandler::LimitOffset,
        identity: IdentityColumnSupport::Standard,
        sequences: SequenceSupport::NextVal,
        locking: LockingSupport {
            for_update_of: true,
            nowait: true,
            skip_locked: version.is_same_or_after(9, 5),
            for_share: true,
        },
        exceptions: exceptions(),
        upsert_style: if version.is_same_or_after(9, 5) {
            UpsertStyle::OnConflict
        } else {
            UpsertStyle::Unsupported
        },
        constraint_name_position: ConstraintNamePosition::Leading,
        boolean_literals: ("true", "false"),
        capabilities: Capabilities {
            window_functions: true,
            lateral: true,
            order_by_in_subquery: true,
            filter_clause: true,
        },
        no_columns_insert: "default values",
        row_id_column: Some("ctid"),
    }
}

fn ddl_types() -> DdlTypeRegistry {
    let mut types = DdlTypeRegistry::standard(SizeDefaults::default());
    types.register(DdlType::simple(JdbcType::TinyInt, "smallint"));
    types.register(DdlType::simple(JdbcType::Double, "float(53)"));
    types.register(DdlType::simple(JdbcType::NChar, "char($l)"));
    types.register(DdlType::simple(JdbcType::LongVarchar, "text"));
    types.register(DdlType::simple(JdbcType::LongNVarchar, "text"));
    types.register(DdlType::simple(JdbcType::Clob, "text"));
    types.register(DdlType::simple(JdbcType::Binary, "bytea"));
    types.register(DdlType::simple(JdbcType::VarBinary, "bytea"));
    types.register(DdlType::simple(JdbcType::LongVarBinary, "bytea"));
    types.register(DdlType::simple(JdbcType::Blob, "bytea"));
    types.register(DdlType::simple(JdbcType::Uuid, "uuid"));
    for code in [JdbcType::Varchar, JdbcType::NVarchar] {
        types.register(
            DdlType::builder(code, "varchar($l)", "text")
                .with_type_capacity(MAX_VARCHAR_LENGTH, "varchar($l)")
                .build(),
        );
    }
    types
}

pub(crate) fn temporal() -> TemporalSupport {
    TemporalSupport::new("extract(?1 from ?2)", FormatStyle::ToChar)
        .with_native_units(&[
            TemporalUnit::Second,
            TemporalUnit::Minute,
            TemporalUnit::Hour,
            TemporalUnit::Day,
            TemporalUnit::Week,
            TemporalUnit::Month,
            TemporalUnit::Quarter,
            TemporalUnit::Year,
            TemporalUnit::Epoch,
        ])
        .with_pattern(
            TemporalUnit::DayOfWeek,
            "(extract(dow from ?2)+1)",
            ExtractSupport::Emulated,
        )
        .with_pattern(
            TemporalUnit::DayOfMonth,
            "extract(day from ?2)",
            ExtractSupport::Emulated,
        )
        .with_pattern(
            TemporalUnit::DayOfYear,
            "extract(doy from ?2)",
            ExtractSupport::Emulated,
        )
        .with_pattern(
            TemporalUnit::Nanosecond,
            "(extract(microseconds from ?2)*1000)",
            ExtractSupport::Emulated,
        )
}

fn exceptions() -> SqlExceptionTranslator {
    super::postgres_constraint_rules()
        .into_iter()
        .fold(SqlExceptionTranslator::new(), |translator, rule| {
            translator.with_constraint_rule(rule)
        })
        .with_lock_rule(VendorCode::SqlState("40P01"), LockFailure::LockAcquisition)
        .with_lock_rule(VendorCode::SqlState("55P03"), LockFailure::PessimisticLock)
        .with_lock_rule(VendorCode::SqlState("57014"), LockFailure::QueryTimeout)
}
