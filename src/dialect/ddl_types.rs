use std::collections::HashMap;

use crate::core::{JdbcType, Size};

/// One capacity tier: usable when the requested length/precision is at most
/// `capacity`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapacityRule {
    pub capacity: u64,
    pub template: String,
}

/// DDL spelling for one type code: the declared column type, an ordered list
/// of capacity tiers and the unbounded template used when no tier is large
/// enough.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DdlType {
    code: JdbcType,
    column_type: String,
    rules: Vec<CapacityRule>,
    fallback: String,
}

impl DdlType {
    pub fn simple(code: JdbcType, template: impl Into<String>) -> Self {
        let template = template.into();
        Self {
            code,
            column_type: template.clone(),
            rules: Vec::new(),
            fallback: template,
        }
    }

    pub fn builder(
        code: JdbcType,
        column_type: impl Into<String>,
        unbounded: impl Into<String>,
    ) -> DdlTypeBuilder {
        DdlTypeBuilder {
            code,
            column_type: column_type.into(),
            rules: Vec::new(),
            fallback: unbounded.into(),
        }
    }

    pub fn code(&self) -> JdbcType {
        self.code
    }

    pub fn column_type(&self) -> &str {
        &self.column_type
    }

    pub fn rules(&self) -> &[CapacityRule] {
        &self.rules
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    /// First tier whose capacity covers `requested`, else the fallback.
    pub fn template_for(&self, requested: u64) -> &str {
        self.rules
            .iter()
            .find(|rule| rule.capacity >= requested)
            .map(|rule| rule.template.as_str())
            .unwrap_or(&self.fallback)
    }
}

pub struct DdlTypeBuilder {
    code: JdbcType,
    column_type: String,
    rules: Vec<CapacityRule>,
    fallback: String,
}

impl DdlTypeBuilder {
    /// Tiers must be added in ascending capacity order.
    pub fn with_type_capacity(mut self, capacity: u64, template: impl Into<String>) -> Self {
        debug_assert!(
            self.rules.last().is_none_or(|last| last.capacity < capacity),
            "capacity tiers must ascend"
        );
        self.rules.push(CapacityRule {
            capacity,
            template: template.into(),
        });
        self
    }

    pub fn build(self) -> DdlType {
        DdlType {
            code: self.code,
            column_type: self.column_type,
            rules: self.rules,
            fallback: self.fallback,
        }
    }
}

/// Size defaults applied when a declared size leaves a placeholder unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeDefaults {
    pub length: u64,
    pub decimal_precision: u32,
    pub timestamp_precision: u32,
    pub float_precision: u32,
    pub scale: u32,
}

impl Default for SizeDefaults {
    fn default() -> Self {
        Self {
            length: Size::DEFAULT_LENGTH,
            decimal_precision: 38,
            timestamp_precision: 6,
            float_precision: 53,
            scale: Size::DEFAULT_SCALE,
        }
    }
}

/// Per-dialect registry of DDL type spellings.
#[derive(Debug, Clone)]
pub struct DdlTypeRegistry {
    types: HashMap<JdbcType, DdlType>,
    defaults: SizeDefaults,
}

impl DdlTypeRegistry {
    /// The generic SQL spellings every family starts from.
    pub fn standard(defaults: SizeDefaults) -> Self {
        let mut registry = Self {
            types: HashMap::new(),
            defaults,
        };
        for code in JdbcType::ALL {
            registry.register(DdlType::simple(code, standard_column_type(code)));
        }
        registry
    }

    pub fn register(&mut self, ddl_type: DdlType) {
        self.types.insert(ddl_type.code(), ddl_type);
    }

    pub fn defaults(&self) -> SizeDefaults {
        self.defaults
    }

    pub fn descriptor(&self, code: JdbcType) -> Option<&DdlType> {
        self.types.get(&code)
    }

    /// The raw template for a type code, placeholders left in place.
    pub fn column_type(&self, code: JdbcType) -> &str {
        self.types
            .get(&code)
            .map(DdlType::column_type)
            .unwrap_or_else(|| standard_column_type(code))
    }

    /// Resolves the concrete DDL type name for a declared size.
    pub fn type_name(&self, code: JdbcType, size: Size) -> String {
        let resolved = self.resolve_size(code, size);
        let requested = match code {
            c if c.is_character() || c.is_binary() => resolved.length.unwrap_or_default(),
            _ => u64::from(resolved.precision.unwrap_or_default()),
        };
        let template = match self.types.get(&code) {
            Some(ddl_type) => ddl_type.template_for(requested),
            None => standard_column_type(code),
        };
        substitute(template, resolved)
    }

    fn resolve_size(&self, code: JdbcType, size: Size) -> Size {
        let precision = size.precision.unwrap_or(match code {
            JdbcType::Numeric | JdbcType::Decimal => self.defaults.decimal_precision,
            JdbcType::Float | JdbcType::Real | JdbcType::Double => self.defaults.float_precision,
            JdbcType::Time | JdbcType::Timestamp | JdbcType::TimestampWithTimeZone => {
                self.defaults.timestamp_precision
            }
            _ => 0,
        });
        Size {
            length: Some(size.length.unwrap_or(self.defaults.length)),
            precision: Some(precision),
            scale: Some(size.scale.unwrap_or(self.defaults.scale)),
        }
    }
}

fn substitute(template: &str, size: Size) -> String {
    template
        .replace("$l", &size.length.unwrap_or_default().to_string())
        .replace("$p", &size.precision.unwrap_or_default().to_string())
        .replace("$s", &size.scale.unwrap_or_default().to_string())
}

fn standard_column_type(code: JdbcType) -> &'static str {
    match code {
        JdbcType::Boolean => "boolean",
        JdbcType::TinyInt => "tinyint",
        JdbcType::SmallInt => "smallint",
        JdbcType::Integer => "integer",
        JdbcType::BigInt => "bigint",
        JdbcType::Real => "real",
        JdbcType::Float => "float($p)",
        JdbcType::Double => "double precision",
        JdbcType::Numeric => "numeric($p,$s)",
        JdbcType::Decimal => "decimal($p,$s)",
        JdbcType::Char => "char($l)",
        JdbcType::NChar => "nchar($l)",
        JdbcType::Varchar => "varchar($l)",
        JdbcType::NVarchar => "nvarchar($l)",
        JdbcType::LongVarchar | JdbcType::LongNVarchar | JdbcType::Clob => "clob",
        JdbcType::Binary => "binary($l)",
        JdbcType::VarBinary => "varbinary($l)",
        JdbcType::LongVarBinary | JdbcType::Blob => "blob",
        JdbcType::Date => "date",
        JdbcType::Time => "time",
        JdbcType::Timestamp => "timestamp($p)",
        JdbcType::TimestampWithTimeZone => "timestamp($p) with time zone",
        JdbcType::Uuid => "char(36)",
    }
}
