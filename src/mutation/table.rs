use crate::core::{PersistError, Result};
use crate::mutation::operation::{MutationType, RowIdentity};

/// What a driver reported for one executed row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    Count(u64),
    /// The statement ran but the driver did not report how many rows it touched.
    SuccessNoInfo,
}

/// Row-count check applied to each executed statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expectation {
    None,
    RowCount(u64),
}

impl Default for Expectation {
    fn default() -> Self {
        Self::RowCount(1)
    }
}

impl Expectation {
    pub fn expected_rows(&self) -> Option<u64> {
        match self {
            Self::None => None,
            Self::RowCount(n) => Some(*n),
        }
    }

    /// Too few rows means the targeted row changed underneath us; too many
    /// means the key did not identify one row.
    pub fn verify(
        &self,
        outcome: RowOutcome,
        batch_position: usize,
        sql: &str,
        row: &RowIdentity,
    ) -> Result<()> {
        let (expected, actual) = match (self.expected_rows(), outcome) {
            (None, _) | (_, RowOutcome::SuccessNoInfo) => return Ok(()),
            (Some(expected), RowOutcome::Count(actual)) => (expected, actual),
        };
        if actual < expected {
            return Err(PersistError::StaleState {
                entity: row.entity.clone(),
                id: row.id.to_string(),
            });
        }
        if actual > expected {
            return Err(PersistError::UnexpectedRowCount {
                expected,
                actual,
                batch_position,
                sql: sql.to_string(),
            });
        }
        Ok(())
    }
}

/// Per-operation overrides for one table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationDetails {
    pub custom_sql: Option<String>,
    pub expectation: Expectation,
}

impl MutationDetails {
    pub fn custom_sql(sql: impl Into<String>) -> Self {
        Self {
            custom_sql: Some(sql.into()),
            expectation: Expectation::default(),
        }
    }

    pub fn with_expectation(mut self, expectation: Expectation) -> Self {
        self.expectation = expectation;
        self
    }
}

/// One physical table taking part in persisting an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMapping {
    name: String,
    key_columns: Vec<String>,
    position: usize,
    join_table: bool,
    inverse: bool,
    identifier_table: bool,
    optional: bool,
    cascade_delete: bool,
    insert_details: MutationDetails,
    update_details: MutationDetails,
    delete_details: MutationDetails,
}

impl TableMapping {
    pub fn builder(name: impl Into<String>) -> TableMappingBuilder {
        TableMappingBuilder {
            mapping: TableMapping {
                name: name.into(),
                key_columns: Vec::new(),
                position: 0,
                join_table: false,
                inverse: false,
                identifier_table: false,
                optional: false,
                cascade_delete: false,
                insert_details: MutationDetails::default(),
                update_details: MutationDetails::default(),
                delete_details: MutationDetails::default(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key_columns(&self) -> &[String] {
        &self.key_columns
    }

    /// Insert-order position within the owning entity.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn is_join_table(&self) -> bool {
        self.join_table
    }

    pub fn is_inverse(&self) -> bool {
        self.inverse
    }

    pub fn is_identifier_table(&self) -> bool {
        self.identifier_table
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn is_cascade_delete_enabled(&self) -> bool {
        self.cascade_delete
    }

    pub fn details(&self, mutation_type: MutationType) -> &MutationDetails {
        match mutation_type {
            MutationType::Insert => &self.insert_details,
            MutationType::Update | MutationType::Upsert => &self.update_details,
            MutationType::Delete => &self.delete_details,
        }
    }

    pub(crate) fn set_position(&mut self, position: usize) {
        self.position = position;
    }

    pub(crate) fn set_identifier_table(&mut self, identifier_table: bool) {
        self.identifier_table = identifier_table;
    }
}

pub struct TableMappingBuilder {
    mapping: TableMapping,
}

impl TableMappingBuilder {
    pub fn key_column(mut self, column: impl Into<String>) -> Self {
        self.mapping.key_columns.push(column.into());
        self
    }

    pub fn key_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mapping
            .key_columns
            .extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn join_table(mut self) -> Self {
        self.mapping.join_table = true;
        self
    }

    pub fn inverse(mut self) -> Self {
        self.mapping.inverse = true;
        self
    }

    /// Rows may be absent, so deletes expect no particular count.
    pub fn optional(mut self) -> Self {
        self.mapping.optional = true;
        self.mapping.delete_details.expectation = Expectation::None;
        self
    }

    pub fn cascade_delete(mut self) -> Self {
        self.mapping.cascade_delete = true;
        self
    }

    pub fn insert_details(mut self, details: MutationDetails) -> Self {
        self.mapping.insert_details = details;
        self
    }

    pub fn update_details(mut self, details: MutationDetails) -> Self {
        self.mapping.update_details = details;
        self
    }

    pub fn delete_details(mut self, details: MutationDetails) -> Self {
        self.mapping.delete_details = details;
        self
    }

    pub fn build(self) -> Result<TableMapping> {
        if self.mapping.name.trim().is_empty() {
            return Err(PersistError::Mapping("table name must not be empty".into()));
        }
        if self.mapping.key_columns.is_empty() {
            return Err(PersistError::Mapping(format!(
                "table '{}' declares no key columns",
                self.mapping.name
            )));
        }
        Ok(self.mapping)
    }
}
