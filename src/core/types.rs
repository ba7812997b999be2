use std::fmt;

use serde::{Deserialize, Serialize};

/// Generic (database independent) JDBC type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JdbcType {
    Boolean,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Float,
    Double,
    Numeric,
    Decimal,
    Char,
    NChar,
    Varchar,
    NVarchar,
    LongVarchar,
    LongNVarchar,
    Clob,
    Binary,
    VarBinary,
    LongVarBinary,
    Blob,
    Date,
    Time,
    Timestamp,
    TimestampWithTimeZone,
    Uuid,
}

impl JdbcType {
    pub const ALL: [JdbcType; 26] = [
        Self::Boolean,
        Self::TinyInt,
        Self::SmallInt,
        Self::Integer,
        Self::BigInt,
        Self::Real,
        Self::Float,
        Self::Double,
        Self::Numeric,
        Self::Decimal,
        Self::Char,
        Self::NChar,
        Self::Varchar,
        Self::NVarchar,
        Self::LongVarchar,
        Self::LongNVarchar,
        Self::Clob,
        Self::Binary,
        Self::VarBinary,
        Self::LongVarBinary,
        Self::Blob,
        Self::Date,
        Self::Time,
        Self::Timestamp,
        Self::TimestampWithTimeZone,
        Self::Uuid,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::TinyInt => "tinyint",
            Self::SmallInt => "smallint",
            Self::Integer => "integer",
            Self::BigInt => "bigint",
            Self::Real => "real",
            Self::Float => "float",
            Self::Double => "double",
            Self::Numeric => "numeric",
            Self::Decimal => "decimal",
            Self::Char => "char",
            Self::NChar => "nchar",
            Self::Varchar => "varchar",
            Self::NVarchar => "nvarchar",
            Self::LongVarchar => "long_varchar",
            Self::LongNVarchar => "long_nvarchar",
            Self::Clob => "clob",
            Self::Binary => "binary",
            Self::VarBinary => "varbinary",
            Self::LongVarBinary => "long_varbinary",
            Self::Blob => "blob",
            Self::Date => "date",
            Self::Time => "time",
            Self::Timestamp => "timestamp",
            Self::TimestampWithTimeZone => "timestamp_with_time_zone",
            Self::Uuid => "uuid",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let wanted = name.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        Self::ALL.iter().copied().find(|ty| ty.name() == wanted)
    }

    pub fn is_integral(&self) -> bool {
        matches!(self, Self::TinyInt | Self::SmallInt | Self::Integer | Self::BigInt)
    }

    pub fn is_character(&self) -> bool {
        matches!(
            self,
            Self::Char
                | Self::NChar
                | Self::Varchar
                | Self::NVarchar
                | Self::LongVarchar
                | Self::LongNVarchar
                | Self::Clob
        )
    }

    pub fn is_binary(&self) -> bool {
        matches!(
            self,
            Self::Binary | Self::VarBinary | Self::LongVarBinary | Self::Blob
        )
    }

    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            Self::Date | Self::Time | Self::Timestamp | Self::TimestampWithTimeZone
        )
    }
}

impl fmt::Display for JdbcType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Declared column size. Unset parts fall back to dialect defaults when a
/// DDL type name is rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Size {
    pub length: Option<u64>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
}

impl Size {
    pub const DEFAULT_LENGTH: u64 = 255;
    pub const DEFAULT_SCALE: u32 = 2;

    pub fn length(length: u64) -> Self {
        Self {
            length: Some(length),
            ..Self::default()
        }
    }

    pub fn precision(precision: u32) -> Self {
        Self {
            precision: Some(precision),
            ..Self::default()
        }
    }

    pub fn precision_scale(precision: u32, scale: u32) -> Self {
        Self {
            length: None,
            precision: Some(precision),
            scale: Some(scale),
        }
    }
}
