use crate::core::{JdbcType, PersistError, Result};

/// How a family declares and reads back identity (auto-generated) keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityColumnSupport {
    /// `generated by default as identity`.
    Standard,
    /// Declared through serial pseudo-types sized by the column type.
    Serial {
        smallint: Option<&'static str>,
        integer: &'static str,
        bigint: &'static str,
        /// Whether the dialect treats these columns as real identity columns.
        identity_columns: bool,
        select: &'static str,
    },
    /// `auto_increment` column attribute.
    AutoIncrement,
}

impl IdentityColumnSupport {
    pub fn supports_identity_columns(&self) -> bool {
        match self {
            Self::Standard | Self::AutoIncrement => true,
            Self::Serial {
                identity_columns, ..
            } => *identity_columns,
        }
    }

    /// Whether DDL repeats the column's data type next to the identity clause.
    pub fn has_data_type_in_identity_column(&self) -> bool {
        !matches!(self, Self::Serial { .. })
    }

    pub fn identity_column_string(&self, code: JdbcType) -> Result<String> {
        match self {
            Self::Standard => Ok("generated by default as identity".to_string()),
            Self::AutoIncrement => Ok("not null auto_increment".to_string()),
            Self::Serial {
                smallint,
                integer,
                bigint,
                ..
            } => match (code, smallint) {
                (JdbcType::TinyInt | JdbcType::SmallInt, Some(name)) => Ok(name.to_string()),
                (JdbcType::Integer, _) => Ok(integer.to_string()),
                (JdbcType::BigInt | JdbcType::Numeric, _) => Ok(bigint.to_string()),
                (other, _) => Err(PersistError::Mapping(format!(
                    "illegal identity column type: {}",
                    other
                ))),
            },
        }
    }

    /// Statement returning the last generated key, when the family has one.
    pub fn identity_select_string(&self, table: &str, column: &str) -> Option<String> {
        match self {
            Self::Standard => Some(format!(
                "select currval(pg_get_serial_sequence('{}','{}'))",
                table, column
            )),
            Self::AutoIncrement => Some("select last_insert_id()".to_string()),
            Self::Serial { select, .. } => Some(select.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceSupport {
    /// `select nextval('seq')`
    NextVal,
    /// `select seq.nextval from <dual>`
    DotNextVal { dual: &'static str },
    None,
}

impl SequenceSupport {
    pub fn supports_sequences(&self) -> bool {
        !matches!(self, Self::None)
    }

    pub fn next_value_string(&self, sequence: &str) -> Option<String> {
        match self {
            Self::NextVal => Some(format!("select nextval('{}')", sequence)),
            Self::DotNextVal { dual } => Some(format!("select {}.nextval from {}", sequence, dual)),
            Self::None => None,
        }
    }

    pub fn create_sequence_string(&self, sequence: &str, start: i64, increment: i64) -> Option<String> {
        self.supports_sequences().then(|| {
            format!(
                "create sequence {} start with {} increment by {}",
                sequence, start, increment
            )
        })
    }
}
