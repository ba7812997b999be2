use crate::core::{ConstraintKind, JdbcType};
use crate::dialect::constraint::{ConstraintRule, LockFailure, SqlExceptionTranslator, VendorCode};
use crate::dialect::ddl_types::{DdlType, DdlTypeRegistry, SizeDefaults};
use crate::dialect::dml::UpsertStyle;
use crate::dialect::identity::{IdentityColumnSupport, SequenceSupport};
use crate::dialect::limit::LimitHandler;
use crate::dialect::lock::LockingSupport;
use crate::dialect::temporal::{ExtractSupport, FormatStyle, TemporalSupport, TemporalUnit};
use crate::dialect::version::DatabaseVersion;
use crate::dialect::{Capabilities, ConstraintNamePosition, DatabaseFamily, Dialect};

const MAX_VARCHAR_LENGTH: u64 = 65_535;
const MAX_MEDIUM_LENGTH: u64 = 16_777_215;

pub(crate) fn build(version: DatabaseVersion) -> Dialect {
    let mysql8 = version.is_same_or_after(8, 0);
    Dialect {
        family: DatabaseFamily::MySql,
        version,
        ddl_types: ddl_types(),
        max_varchar_length: MAX_VARCHAR_LENGTH as i64,
        max_varbinary_length: MAX_VARCHAR_LENGTH as i64,
        temporal: temporal(),
        limit_handler: LimitHandler::LimitOffset,
        identity: IdentityColumnSupport::AutoIncrement,
        sequences: SequenceSupport::None,
        locking: LockingSupport {
            for_update_of: mysql8,
            nowait: mysql8,
            skip_locked: mysql8,
            for_share: mysql8,
        },
        exceptions: exceptions(),
        upsert_style: if version.is_same_or_after(4, 1) {
            UpsertStyle::OnDuplicateKey
        } else {
            UpsertStyle::Unsupported
        },
        constraint_name_position: ConstraintNamePosition::Leading,
        boolean_literals: ("1", "0"),
        capabilities: Capabilities {
            window_functions: mysql8,
            lateral: mysql8,
            order_by_in_subquery: true,
            filter_clause: false,
        },
        no_columns_insert: "() values ()",
        row_id_column: None,
    }
}

fn ddl_types() -> DdlTypeRegistry {
    let defaults = SizeDefaults {
        decimal_precision: 65,
        ..SizeDefaults::default()
    };
    let mut types = DdlTypeRegistry::standard(defaults);
    types.register(DdlType::simple(JdbcType::Boolean, "bit"));
    types.register(DdlType::simple(JdbcType::NChar, "char($l)"));
    types.register(DdlType::simple(JdbcType::Timestamp, "datetime($p)"));
    types.register(DdlType::simple(JdbcType::TimestampWithTimeZone, "timestamp($p)"));
    types.register(DdlType::simple(JdbcType::LongVarchar, "longtext"));
    types.register(DdlType::simple(JdbcType::LongNVarchar, "longtext"));
    types.register(DdlType::simple(JdbcType::Clob, "longtext"));
    types.register(DdlType::simple(JdbcType::LongVarBinary, "longblob"));
    types.register(DdlType::simple(JdbcType::Blob, "longblob"));
    for code in [JdbcType::Varchar, JdbcType::NVarchar] {
        types.register(
            DdlType::builder(code, "varchar($l)", "longtext")
                .with_type_capacity(MAX_VARCHAR_LENGTH, "varchar($l)")
                .with_type_capacity(MAX_MEDIUM_LENGTH, "mediumtext")
                .build(),
        );
    }
    types.register(
        DdlType::builder(JdbcType::VarBinary, "varbinary($l)", "longblob")
            .with_type_capacity(MAX_VARCHAR_LENGTH, "varbinary($l)")
            .with_type_capacity(MAX_MEDIUM_LENGTH, "mediumblob")
            .build(),
    );
    types
}

fn temporal() -> TemporalSupport {
    TemporalSupport::new("extract(?1 from ?2)", FormatStyle::MySqlPercent)
        .with_native_units(&[
            TemporalUnit::Second,
            TemporalUnit::Minute,
            TemporalUnit::Hour,
            TemporalUnit::Day,
            TemporalUnit::Week,
            TemporalUnit::Month,
            TemporalUnit::Quarter,
            TemporalUnit::Year,
        ])
        .with_pattern(TemporalUnit::DayOfWeek, "dayofweek(?2)", ExtractSupport::Emulated)
        .with_pattern(TemporalUnit::DayOfMonth, "dayofmonth(?2)", ExtractSupport::Emulated)
        .with_pattern(TemporalUnit::DayOfYear, "dayofyear(?2)", ExtractSupport::Emulated)
        .with_pattern(TemporalUnit::Epoch, "unix_timestamp(?2)", ExtractSupport::Emulated)
        .with_current_literals("current_date", "current_timestamp(6)")
}

fn exceptions() -> SqlExceptionTranslator {
    SqlExceptionTranslator::new()
        .with_constraint_rule(ConstraintRule::new(
            VendorCode::ErrorCode(1062),
            ConstraintKind::Unique,
            "for key '",
            "'",
        ))
        .with_constraint_rule(ConstraintRule::new(
            VendorCode::ErrorCode(1451),
            ConstraintKind::ForeignKey,
            "CONSTRAINT `",
            "`",
        ))
        .with_constraint_rule(ConstraintRule::new(
            VendorCode::ErrorCode(1452),
            ConstraintKind::ForeignKey,
            "CONSTRAINT `",
            "`",
        ))
        .with_constraint_rule(ConstraintRule::new(
            VendorCode::ErrorCode(3819),
            ConstraintKind::Check,
            "Check constraint '",
            "'",
        ))
        .with_constraint_rule(ConstraintRule::new(
            VendorCode::ErrorCode(1048),
            ConstraintKind::NotNull,
            "Column '",
            "'",
        ))
        .with_lock_rule(VendorCode::ErrorCode(1213), LockFailure::LockAcquisition)
        .with_lock_rule(VendorCode::ErrorCode(1205), LockFailure::PessimisticLock)
        .with_lock_rule(VendorCode::ErrorCode(3572), LockFailure::PessimisticLock)
        .with_lock_rule(VendorCode::ErrorCode(3024), LockFailure::QueryTimeout)
        .with_lock_rule(VendorCode::ErrorCode(1317), LockFailure::QueryTimeout)
}
