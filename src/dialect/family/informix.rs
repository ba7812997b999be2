use crate::core::{ConstraintKind, JdbcType};
use crate::dialect::constraint::{ConstraintRule, SqlExceptionTranslator, VendorCode};
use crate::dialect::ddl_types::{DdlType, DdlTypeRegistry, SizeDefaults};
use crate::dialect::dml::UpsertStyle;
use crate::dialect::identity::{IdentityColumnSupport, SequenceSupport};
use crate::dialect::limit::LimitHandler;
use crate::dialect::lock::LockingSupport;
use crate::dialect::temporal::{ExtractSupport, FormatStyle, TemporalSupport, TemporalUnit};
use crate::dialect::version::DatabaseVersion;
use crate::dialect::{Capabilities, ConstraintNamePosition, DatabaseFamily, Dialect};

const MAX_VARCHAR_LENGTH: u64 = 32_739;
const SYSTABLES_DUAL: &str = "informix.systables where tabid=1";

pub(crate) fn build(version: DatabaseVersion) -> Dialect {
    let v12_10 = version.is_same_or_after(12, 10);
    Dialect {
        family: DatabaseFamily::Informix,
        version,
        ddl_types: ddl_types(),
        max_varchar_length: MAX_VARCHAR_LENGTH as i64,
        max_varbinary_length: -1,
        temporal: temporal(),
        limit_handler: if version.is_before(10, 0) {
            LimitHandler::First
        } else {
            LimitHandler::SkipFirst {
                variable_limit: version.is_same_or_after(11, 0),
            }
        },
        identity: IdentityColumnSupport::Serial {
            smallint: None,
            integer: "serial",
            bigint: "serial8",
            identity_columns: true,
            select: "select dbinfo('sqlca.sqlerrd1') from informix.systables where tabid=1",
        },
        sequences: SequenceSupport::DotNextVal {
            dual: SYSTABLES_DUAL,
        },
        locking: LockingSupport {
            for_update_of: false,
            nowait: false,
            skip_locked: false,
            for_share: false,
        },
        exceptions: exceptions(),
        upsert_style: if version.is_same_or_after(11, 50) {
            UpsertStyle::Merge {
                dual: "sysmaster:sysdual",
            }
        } else {
            UpsertStyle::Unsupported
        },
        constraint_name_position: ConstraintNamePosition::Trailing,
        boolean_literals: ("'t'", "'f'"),
        capabilities: Capabilities {
            window_functions: v12_10,
            lateral: v12_10,
            order_by_in_subquery: false,
            filter_clause: false,
        },
        no_columns_insert: "values (0)",
        row_id_column: Some("rowid"),
    }
}

fn ddl_types() -> DdlTypeRegistry {
    let defaults = SizeDefaults {
        decimal_precision: 32,
        timestamp_precision: 5,
        ..SizeDefaults::default()
    };
    let mut types = DdlTypeRegistry::standard(defaults);
    types.register(DdlType::simple(JdbcType::TinyInt, "smallint"));
    types.register(DdlType::simple(JdbcType::BigInt, "int8"));
    types.register(DdlType::simple(JdbcType::Time, "datetime hour to second"));
    types.register(DdlType::simple(JdbcType::Timestamp, "datetime year to fraction($p)"));
    types.register(DdlType::simple(
        JdbcType::TimestampWithTimeZone,
        "datetime year to fraction($p)",
    ));
    types.register(DdlType::simple(JdbcType::Binary, "byte"));
    types.register(DdlType::simple(JdbcType::VarBinary, "byte"));
    types.register(DdlType::simple(JdbcType::LongVarBinary, "byte"));
    types.register(DdlType::simple(JdbcType::LongVarchar, "text"));
    types.register(DdlType::simple(JdbcType::LongNVarchar, "text"));
    types.register(
        DdlType::builder(JdbcType::Varchar, "lvarchar($l)", "text")
            .with_type_capacity(255, "varchar($l)")
            .with_type_capacity(MAX_VARCHAR_LENGTH, "lvarchar($l)")
            .build(),
    );
    types.register(
        DdlType::builder(JdbcType::NVarchar, "nvarchar($l)", "text")
            .with_type_capacity(255, "nvarchar($l)")
            .with_type_capacity(MAX_VARCHAR_LENGTH, "lvarchar($l)")
            .build(),
    );
    types.register(
        DdlType::builder(JdbcType::Float, "float($p)", "float($p)")
            .with_type_capacity(24, "smallfloat")
            .build(),
    );
    types
}

fn temporal() -> TemporalSupport {
    TemporalSupport::new("?1(?2)", FormatStyle::InformixPercent)
        .with_max_fraction_digits(5)
        .with_native_units(&[
            TemporalUnit::Day,
            TemporalUnit::Month,
            TemporalUnit::Quarter,
            TemporalUnit::Year,
        ])
        .with_pattern(
            TemporalUnit::Second,
            "to_number(to_char(?2,'%S'))",
            ExtractSupport::Emulated,
        )
        .with_pattern(
            TemporalUnit::Minute,
            "to_number(to_char(?2,'%M'))",
            ExtractSupport::Emulated,
        )
        .with_pattern(
            TemporalUnit::Hour,
            "to_number(to_char(?2,'%H'))",
            ExtractSupport::Emulated,
        )
        .with_pattern(TemporalUnit::DayOfWeek, "(weekday(?2)+1)", ExtractSupport::Emulated)
        .with_pattern(TemporalUnit::DayOfMonth, "day(?2)", ExtractSupport::Emulated)
        .with_current_literals("today", "current")
}

fn exceptions() -> SqlExceptionTranslator {
    SqlExceptionTranslator::new()
        .with_constraint_rule(ConstraintRule::new(
            VendorCode::ErrorCode(-268),
            ConstraintKind::Unique,
            "Unique constraint (",
            ") violated.",
        ))
        .with_constraint_rule(ConstraintRule::new(
            VendorCode::ErrorCode(-691),
            ConstraintKind::ForeignKey,
            "Missing key in referenced table for referential constraint (",
            ").",
        ))
        .with_constraint_rule(ConstraintRule::new(
            VendorCode::ErrorCode(-692),
            ConstraintKind::ForeignKey,
            "Key value for constraint (",
            ") is still being referenced.",
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Size;
    use crate::jdbc::SqlException;

    #[test]
    fn test_type_spellings() {
        let dialect = build(DatabaseVersion::make(14, 10));
        assert_eq!(dialect.column_type(JdbcType::BigInt), "int8");
        assert_eq!(dialect.column_type(JdbcType::Varchar), "lvarchar($l)");
        assert_eq!(dialect.type_name(JdbcType::Varchar, Size::length(100)), "varchar(100)");
        assert_eq!(dialect.type_name(JdbcType::Varchar, Size::length(4000)), "lvarchar(4000)");
        assert_eq!(dialect.type_name(JdbcType::Varchar, Size::length(40_000)), "text");
        assert_eq!(dialect.type_name(JdbcType::Float, Size::precision(24)), "smallfloat");
        assert_eq!(dialect.type_name(JdbcType::Float, Size::precision(53)), "float(53)");
        assert_eq!(
            dialect.type_name(JdbcType::Timestamp, Size::default()),
            "datetime year to fraction(5)"
        );
        assert_eq!(dialect.default_decimal_precision(), 32);
        assert_eq!(dialect.max_varbinary_length(), -1);
    }

    #[test]
    fn test_limit_handler_by_version() {
        assert_eq!(build(DatabaseVersion::make(9, 40)).limit_handler(), LimitHandler::First);
        assert_eq!(
            build(DatabaseVersion::make(10, 0)).limit_handler(),
            LimitHandler::SkipFirst {
                variable_limit: false
            }
        );
        assert_eq!(
            build(DatabaseVersion::make(11, 70)).limit_handler(),
            LimitHandler::SkipFirst {
                variable_limit: true
            }
        );
    }

    #[test]
    fn test_referential_constraint_names() {
        let dialect = build(DatabaseVersion::make(14, 10));
        let missing = SqlException::new(
            "Missing key in referenced table for referential constraint (informix.fk_order_customer).",
        )
        .with_error_code(-691);
        assert_eq!(
            dialect.extract_constraint_name(&missing).as_deref(),
            Some("fk_order_customer")
        );
        let referenced =
            SqlException::new("Key value for constraint (informix.pk_customer) is still being referenced.")
                .with_error_code(-692);
        assert_eq!(
            dialect.extract_constraint_name(&referenced).as_deref(),
            Some("pk_customer")
        );
        let other = SqlException::new("Unique constraint (informix.uk_email) violated.").with_error_code(-201);
        assert_eq!(dialect.extract_constraint_name(&other), None);
    }

    #[test]
    fn test_literals_and_flags() {
        let dialect = build(DatabaseVersion::make(12, 10));
        assert_eq!(dialect.boolean_literal(true), "'t'");
        assert_eq!(dialect.current_date(), "today");
        assert_eq!(dialect.current_timestamp(), "current");
        assert!(dialect.supports_window_functions());
        assert!(!dialect.supports_order_by_in_subquery());
        assert!(!build(DatabaseVersion::make(11, 70)).supports_lateral());
    }
}
