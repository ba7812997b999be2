use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;

use crate::core::{JdbcType, PersistError, Result, Value};
use crate::mutation::TableMapping;

/// Which prior values must still match when a row is updated or deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptimisticLockStyle {
    #[default]
    None,
    Version,
    Dirty,
    All,
}

impl OptimisticLockStyle {
    pub fn is_version(&self) -> bool {
        matches!(self, Self::Version)
    }

    pub fn is_all_or_dirty(&self) -> bool {
        matches!(self, Self::All | Self::Dirty)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdGeneration {
    #[default]
    Assigned,
    /// The root table's key is generated by the database on insert.
    Identity,
}

/// Stores a boolean attribute as a character or number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BooleanConverter {
    /// `'T'` / `'F'`
    TrueFalse,
    /// `'Y'` / `'N'`
    YesNo,
    /// `1` / `0`
    Numeric,
}

impl BooleanConverter {
    pub fn to_relational(&self, value: &Value) -> Value {
        let Value::Boolean(flag) = value else {
            return value.clone();
        };
        match (self, flag) {
            (Self::TrueFalse, true) => Value::Text("T".into()),
            (Self::TrueFalse, false) => Value::Text("F".into()),
            (Self::YesNo, true) => Value::Text("Y".into()),
            (Self::YesNo, false) => Value::Text("N".into()),
            (Self::Numeric, true) => Value::Integer(1),
            (Self::Numeric, false) => Value::Integer(0),
        }
    }

    pub fn jdbc_type(&self) -> JdbcType {
        match self {
            Self::TrueFalse | Self::YesNo => JdbcType::Char,
            Self::Numeric => JdbcType::Integer,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    pub name: String,
    pub write_expression: String,
    pub jdbc_type: JdbcType,
    pub insertable: bool,
    pub updatable: bool,
}

impl ColumnMapping {
    pub fn new(name: impl Into<String>, jdbc_type: JdbcType) -> Self {
        Self {
            name: name.into(),
            write_expression: "?".into(),
            jdbc_type,
            insertable: true,
            updatable: true,
        }
    }

    /// Custom write expression, e.g. `lower(?)`.
    pub fn write_expression(mut self, expression: impl Into<String>) -> Self {
        self.write_expression = expression.into();
        self
    }

    pub fn not_insertable(mut self) -> Self {
        self.insertable = false;
        self
    }

    pub fn not_updatable(mut self) -> Self {
        self.updatable = false;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeNature {
    Singular,
    /// Collection-valued; persisted by its own collection table, never by
    /// the entity's statements.
    Plural,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeMapping {
    name: String,
    table: Option<String>,
    columns: Vec<ColumnMapping>,
    nature: AttributeNature,
    versionable: bool,
    converter: Option<BooleanConverter>,
}

impl AttributeMapping {
    pub fn basic(name: &str, table: &str, column: &str, jdbc_type: JdbcType) -> Self {
        Self::embedded(name, table, vec![ColumnMapping::new(column, jdbc_type)])
    }

    /// Single- or multi-column singular attribute.
    pub fn embedded(name: &str, table: &str, columns: Vec<ColumnMapping>) -> Self {
        Self {
            name: name.to_string(),
            table: Some(table.to_string()),
            columns,
            nature: AttributeNature::Singular,
            versionable: true,
            converter: None,
        }
    }

    pub fn plural(name: &str) -> Self {
        Self {
            name: name.to_string(),
            table: None,
            columns: Vec::new(),
            nature: AttributeNature::Plural,
            versionable: true,
            converter: None,
        }
    }

    /// Changes to this attribute neither bump nor check the optimistic lock.
    pub fn excluded_from_locking(mut self) -> Self {
        self.versionable = false;
        self
    }

    pub fn converter(mut self, converter: BooleanConverter) -> Self {
        self.converter = Some(converter);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn columns(&self) -> &[ColumnMapping] {
        &self.columns
    }

    pub fn nature(&self) -> AttributeNature {
        self.nature
    }

    pub fn is_singular(&self) -> bool {
        self.nature == AttributeNature::Singular
    }

    pub fn is_versionable(&self) -> bool {
        self.versionable
    }

    pub fn boolean_converter(&self) -> Option<BooleanConverter> {
        self.converter
    }

    /// One JDBC value per column. A null attribute value yields a null per
    /// column; multi-column attributes take a `Tuple` of matching width.
    pub fn decompose(&self, value: &Value) -> Result<Vec<Value>> {
        let value = match &self.converter {
            Some(converter) => converter.to_relational(value),
            None => value.clone(),
        };
        match (self.columns.len(), value) {
            (0, _) => Ok(Vec::new()),
            (1, Value::Tuple(mut values)) if values.len() == 1 => Ok(vec![values.remove(0)]),
            (1, value) => Ok(vec![value]),
            (width, Value::Null) => Ok(vec![Value::Null; width]),
            (width, Value::Tuple(values)) if values.len() == width => Ok(values),
            (width, other) => Err(PersistError::Mapping(format!(
                "attribute '{}' maps {} columns but was given {}",
                self.name,
                width,
                other.type_name()
            ))),
        }
    }
}

// ============================================================================
// Persister
// ============================================================================

/// Resolved, validated mapping of one entity type. Immutable once built and
/// shared by the entity's coordinators.
#[derive(Debug, Clone)]
pub struct EntityPersister {
    entity_name: String,
    tables: Vec<Arc<TableMapping>>,
    identifier_types: Vec<JdbcType>,
    attributes: Vec<AttributeMapping>,
    version_index: Option<usize>,
    row_id_type: Option<JdbcType>,
    optimistic_lock: OptimisticLockStyle,
    id_generation: IdGeneration,
    dynamic_insert: bool,
    dynamic_update: bool,
}

impl EntityPersister {
    pub fn builder(entity_name: impl Into<String>) -> EntityPersisterBuilder {
        EntityPersisterBuilder {
            entity_name: entity_name.into(),
            tables: Vec::new(),
            identifier_types: vec![JdbcType::BigInt],
            attributes: Vec::new(),
            version: None,
            row_id_type: None,
            optimistic_lock: None,
            id_generation: IdGeneration::Assigned,
            dynamic_insert: false,
            dynamic_update: false,
        }
    }

    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    /// Tables in insert order; the identifier table comes first.
    pub fn tables(&self) -> &[Arc<TableMapping>] {
        &self.tables
    }

    pub fn identifier_table(&self) -> &Arc<TableMapping> {
        &self.tables[0]
    }

    pub fn table(&self, name: &str) -> Option<&Arc<TableMapping>> {
        self.tables.iter().find(|table| table.name() == name)
    }

    pub fn identifier_types(&self) -> &[JdbcType] {
        &self.identifier_types
    }

    pub fn attributes(&self) -> &[AttributeMapping] {
        &self.attributes
    }

    pub fn attribute_index(&self, name: &str) -> Option<usize> {
        self.attributes.iter().position(|attr| attr.name() == name)
    }

    /// Singular attributes stored in `table`, with their state index.
    pub fn attributes_of_table<'a>(
        &'a self,
        table: &'a str,
    ) -> impl Iterator<Item = (usize, &'a AttributeMapping)> + 'a {
        self.attributes
            .iter()
            .enumerate()
            .filter(move |(_, attr)| attr.is_singular() && attr.table() == Some(table))
    }

    pub fn version_index(&self) -> Option<usize> {
        self.version_index
    }

    pub fn version_attribute(&self) -> Option<&AttributeMapping> {
        self.version_index.map(|idx| &self.attributes[idx])
    }

    pub fn version_column(&self) -> Option<&ColumnMapping> {
        self.version_attribute().and_then(|attr| attr.columns().first())
    }

    pub fn is_versioned(&self) -> bool {
        self.version_index.is_some()
    }

    pub fn has_row_id(&self) -> bool {
        self.row_id_type.is_some()
    }

    pub fn row_id_type(&self) -> Option<JdbcType> {
        self.row_id_type
    }

    pub fn optimistic_lock_style(&self) -> OptimisticLockStyle {
        self.optimistic_lock
    }

    pub fn id_generation(&self) -> IdGeneration {
        self.id_generation
    }

    pub fn is_dynamic_insert(&self) -> bool {
        self.dynamic_insert
    }

    pub fn is_dynamic_update(&self) -> bool {
        self.dynamic_update
    }

    pub fn decompose_id(&self, id: &Value) -> Result<Vec<Value>> {
        let width = self.identifier_types.len();
        match id {
            Value::Null => Err(PersistError::Mapping(format!(
                "null identifier for entity '{}'",
                self.entity_name
            ))),
            Value::Tuple(values) if values.len() == width => Ok(values.clone()),
            single if width == 1 => Ok(vec![single.clone()]),
            other => Err(PersistError::Mapping(format!(
                "entity '{}' has a {}-column identifier but was given {}",
                self.entity_name,
                width,
                other.type_name()
            ))),
        }
    }

    pub fn check_state(&self, state: &[Value]) -> Result<()> {
        if state.len() != self.attributes.len() {
            return Err(PersistError::Mapping(format!(
                "entity '{}' has {} attributes but the state holds {} values",
                self.entity_name,
                self.attributes.len(),
                state.len()
            )));
        }
        Ok(())
    }

    /// Version seed for a new row.
    pub fn initial_version(&self) -> Option<Value> {
        let column = self.version_column()?;
        Some(if column.jdbc_type.is_temporal() {
            Value::Timestamp(Utc::now().naive_utc())
        } else {
            Value::Integer(0)
        })
    }

    /// Version value to write when `current` is being superseded.
    pub fn next_version(&self, current: &Value) -> Result<Value> {
        match current {
            Value::Integer(n) => n.checked_add(1).map(Value::Integer).ok_or_else(|| {
                PersistError::Mapping(format!("version of entity '{}' overflowed", self.entity_name))
            }),
            Value::Timestamp(_) => Ok(Value::Timestamp(Utc::now().naive_utc())),
            Value::Null => self.initial_version().ok_or_else(|| {
                PersistError::Mapping(format!("entity '{}' is not versioned", self.entity_name))
            }),
            other => Err(PersistError::Mapping(format!(
                "cannot increment a {} version of entity '{}'",
                other.type_name(),
                self.entity_name
            ))),
        }
    }
}

/// Unresolved entity mapping; [`build`](Self::build) validates it once.
pub struct EntityPersisterBuilder {
    entity_name: String,
    tables: Vec<TableMapping>,
    identifier_types: Vec<JdbcType>,
    attributes: Vec<AttributeMapping>,
    version: Option<String>,
    row_id_type: Option<JdbcType>,
    optimistic_lock: Option<OptimisticLockStyle>,
    id_generation: IdGeneration,
    dynamic_insert: bool,
    dynamic_update: bool,
}

impl EntityPersisterBuilder {
    /// Tables are inserted in the order they are added; the first is the
    /// identifier table.
    pub fn table(mut self, table: TableMapping) -> Self {
        self.tables.push(table);
        self
    }

    pub fn identifier(mut self, jdbc_type: JdbcType) -> Self {
        self.identifier_types = vec![jdbc_type];
        self
    }

    pub fn composite_identifier(mut self, jdbc_types: &[JdbcType]) -> Self {
        self.identifier_types = jdbc_types.to_vec();
        self
    }

    pub fn attribute(mut self, attribute: AttributeMapping) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Names the version attribute; implies VERSION locking unless another
    /// style is set explicitly.
    pub fn version(mut self, attribute: &str) -> Self {
        self.version = Some(attribute.to_string());
        self
    }

    pub fn row_id(mut self, jdbc_type: JdbcType) -> Self {
        self.row_id_type = Some(jdbc_type);
        self
    }

    pub fn optimistic_lock(mut self, style: OptimisticLockStyle) -> Self {
        self.optimistic_lock = Some(style);
        self
    }

    pub fn id_generation(mut self, generation: IdGeneration) -> Self {
        self.id_generation = generation;
        self
    }

    pub fn dynamic_insert(mut self) -> Self {
        self.dynamic_insert = true;
        self
    }

    pub fn dynamic_update(mut self) -> Self {
        self.dynamic_update = true;
        self
    }

    pub fn build(self) -> Result<EntityPersister> {
        let entity = self.entity_name;
        let invalid = |detail: String| PersistError::Mapping(format!("entity '{entity}': {detail}"));

        if self.tables.is_empty() {
            return Err(invalid("no tables mapped".into()));
        }
        if self.identifier_types.is_empty() {
            return Err(invalid("identifier maps no columns".into()));
        }

        let mut seen = HashSet::new();
        for table in &self.tables {
            if !seen.insert(table.name().to_string()) {
                return Err(invalid(format!("table '{}' mapped twice", table.name())));
            }
            if table.key_columns().len() != self.identifier_types.len() {
                return Err(invalid(format!(
                    "table '{}' has {} key columns for a {}-column identifier",
                    table.name(),
                    table.key_columns().len(),
                    self.identifier_types.len()
                )));
            }
        }

        for attr in &self.attributes {
            match (attr.nature(), attr.table()) {
                (AttributeNature::Singular, Some(table)) => {
                    if !seen.contains(table) {
                        return Err(invalid(format!(
                            "attribute '{}' refers to unmapped table '{table}'",
                            attr.name()
                        )));
                    }
                    if attr.columns().is_empty() {
                        return Err(invalid(format!("attribute '{}' maps no columns", attr.name())));
                    }
                }
                (AttributeNature::Singular, None) => {
                    return Err(invalid(format!("attribute '{}' has no table", attr.name())));
                }
                (AttributeNature::Plural, _) => {}
            }
        }

        let root = self.tables[0].name().to_string();
        let version_index = match &self.version {
            None => None,
            Some(name) => {
                let idx = self
                    .attributes
                    .iter()
                    .position(|attr| attr.name() == name)
                    .ok_or_else(|| invalid(format!("unknown version attribute '{name}'")))?;
                let attr = &self.attributes[idx];
                if !attr.is_singular() || attr.columns().len() != 1 {
                    return Err(invalid(format!("version attribute '{name}' must map one column")));
                }
                if attr.table() != Some(root.as_str()) {
                    return Err(invalid(format!(
                        "version attribute '{name}' must live in the identifier table '{root}'"
                    )));
                }
                Some(idx)
            }
        };

        let optimistic_lock = self.optimistic_lock.unwrap_or(if version_index.is_some() {
            OptimisticLockStyle::Version
        } else {
            OptimisticLockStyle::None
        });
        if optimistic_lock.is_version() && version_index.is_none() {
            return Err(invalid("VERSION locking requires a version attribute".into()));
        }
        if self.id_generation == IdGeneration::Identity && self.identifier_types.len() != 1 {
            return Err(invalid("identity generation requires a single-column identifier".into()));
        }

        let tables = self
            .tables
            .into_iter()
            .enumerate()
            .map(|(position, mut table)| {
                table.set_position(position);
                table.set_identifier_table(position == 0);
                Arc::new(table)
            })
            .collect();

        Ok(EntityPersister {
            entity_name: entity,
            tables,
            identifier_types: self.identifier_types,
            attributes: self.attributes,
            version_index,
            row_id_type: self.row_id_type,
            optimistic_lock,
            id_generation: self.id_generation,
            dynamic_insert: self.dynamic_insert,
            dynamic_update: self.dynamic_update,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orders() -> EntityPersisterBuilder {
        EntityPersister::builder("Order")
            .table(TableMapping::builder("orders").key_column("id").build().unwrap())
            .table(
                TableMapping::builder("order_audit")
                    .key_column("order_id")
                    .optional()
                    .build()
                    .unwrap(),
            )
            .attribute(AttributeMapping::basic("status", "orders", "status", JdbcType::Varchar))
            .attribute(AttributeMapping::basic("version", "orders", "version", JdbcType::Integer))
            .attribute(AttributeMapping::basic("note", "order_audit", "note", JdbcType::Varchar))
    }

    #[test]
    fn test_build_resolves_positions_and_lock_style() {
        let persister = orders().version("version").build().unwrap();
        assert_eq!(persister.optimistic_lock_style(), OptimisticLockStyle::Version);
        assert!(persister.identifier_table().is_identifier_table());
        assert_eq!(persister.tables()[1].position(), 1);
        assert!(!persister.tables()[1].is_identifier_table());
        assert_eq!(
            persister.attributes_of_table("orders").map(|(idx, _)| idx).collect::<Vec<_>>(),
            vec![0, 1]
        );
    }

    #[test]
    fn test_validation_failures() {
        assert!(orders().version("missing").build().is_err());
        assert!(orders().version("note").build().is_err());
        assert!(orders().optimistic_lock(OptimisticLockStyle::Version).build().is_err());
        assert!(orders()
            .attribute(AttributeMapping::basic("x", "nowhere", "x", JdbcType::Integer))
            .build()
            .is_err());
        assert!(orders()
            .composite_identifier(&[JdbcType::BigInt, JdbcType::Integer])
            .build()
            .is_err());
    }

    #[test]
    fn test_decompose_with_converter_and_tuple() {
        let flag = AttributeMapping::basic("active", "orders", "active", JdbcType::Char)
            .converter(BooleanConverter::YesNo);
        assert_eq!(flag.decompose(&Value::Boolean(true)).unwrap(), vec![Value::Text("Y".into())]);
        assert_eq!(flag.decompose(&Value::Null).unwrap(), vec![Value::Null]);

        let money = AttributeMapping::embedded(
            "total",
            "orders",
            vec![
                ColumnMapping::new("amount", JdbcType::Decimal),
                ColumnMapping::new("currency", JdbcType::Char),
            ],
        );
        assert_eq!(money.decompose(&Value::Null).unwrap(), vec![Value::Null, Value::Null]);
        assert!(money.decompose(&Value::Integer(3)).is_err());
    }

    #[test]
    fn test_next_version() {
        let persister = orders().version("version").build().unwrap();
        assert_eq!(persister.next_version(&Value::Integer(4)).unwrap(), Value::Integer(5));
        assert_eq!(persister.next_version(&Value::Null).unwrap(), Value::Integer(0));
        assert!(persister.next_version(&Value::Text("x".into())).is_err());
        assert!(matches!(
            persister.next_version(&Value::Integer(i64::MAX)),
            Err(PersistError::Mapping(_))
        ));
    }
}
