use crate::core::JdbcType;

/// Which clause a binding contributes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingRole {
    /// SET / VALUES
    Value,
    /// WHERE, identifying the row
    KeyRestriction,
    /// WHERE, detecting concurrent modification
    OptimisticLockRestriction,
}

/// Distinguishes the written value from the matched value when the same
/// column appears on both sides of an UPDATE (`version=? ... and version=?`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterUsage {
    Set,
    Restrict,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnValueBinding {
    pub column: String,
    /// Written as-is into the SQL; `?` marks the parameter.
    pub write_expression: String,
    pub jdbc_type: JdbcType,
    pub role: BindingRole,
    /// Renders `column is null` and owns no parameter.
    pub null_restriction: bool,
}

impl ColumnValueBinding {
    pub fn key_restriction(column: impl Into<String>, jdbc_type: JdbcType) -> Self {
        Self::new(column, "?", jdbc_type, BindingRole::KeyRestriction)
    }

    pub fn lock_restriction(column: impl Into<String>, jdbc_type: JdbcType) -> Self {
        Self::new(column, "?", jdbc_type, BindingRole::OptimisticLockRestriction)
    }

    pub fn null_lock_restriction(column: impl Into<String>, jdbc_type: JdbcType) -> Self {
        Self {
            null_restriction: true,
            ..Self::lock_restriction(column, jdbc_type)
        }
    }

    pub fn new(
        column: impl Into<String>,
        write_expression: impl Into<String>,
        jdbc_type: JdbcType,
        role: BindingRole,
    ) -> Self {
        Self {
            column: column.into(),
            write_expression: write_expression.into(),
            jdbc_type,
            role,
            null_restriction: false,
        }
    }

    pub fn usage(&self) -> ParameterUsage {
        match self.role {
            BindingRole::Value => ParameterUsage::Set,
            BindingRole::KeyRestriction | BindingRole::OptimisticLockRestriction => {
                ParameterUsage::Restrict
            }
        }
    }

    pub fn has_parameter(&self) -> bool {
        !self.null_restriction && self.write_expression.contains('?')
    }

    pub fn is_restriction(&self) -> bool {
        self.role != BindingRole::Value
    }

    /// `column=expr` for SET lists and restrictions, `column is null` for
    /// null restrictions.
    pub fn render_assignment(&self) -> String {
        if self.null_restriction {
            format!("{} is null", self.column)
        } else {
            format!("{}={}", self.column, self.write_expression)
        }
    }
}
