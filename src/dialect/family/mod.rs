//! Per-family dialect assembly. Each builder composes the shared strategy
//! types with the family's own type table and version gates.

pub mod cockroach;
pub mod informix;
pub mod mysql;
pub mod postgres;

use crate::core::ConstraintKind;
use crate::dialect::constraint::{ConstraintRule, VendorCode};

/// The `constraint "name"` rules shared by the PostgreSQL wire family.
pub(crate) fn postgres_constraint_rules() -> Vec<ConstraintRule> {
    let quoted = |state: &'static str, kind: ConstraintKind| {
        ConstraintRule::new(VendorCode::SqlState(state), kind, "constraint \"", "\"")
    };
    vec![
        quoted("23505", ConstraintKind::Unique),
        quoted("23503", ConstraintKind::ForeignKey),
        quoted("23514", ConstraintKind::Check),
        quoted("23P01", ConstraintKind::Other),
        ConstraintRule::new(
            VendorCode::SqlState("23502"),
            ConstraintKind::NotNull,
            "column \"",
            "\"",
        ),
    ]
}
