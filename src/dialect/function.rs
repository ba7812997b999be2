use std::fmt;

use crate::core::{JdbcType, PersistError, Result};

/// Ordered-set aggregates rendered as `fn(args) within group (order by ...)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InverseDistributionFunction {
    PercentileCont,
    PercentileDisc,
    Mode,
}

impl InverseDistributionFunction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PercentileCont => "percentile_cont",
            Self::PercentileDisc => "percentile_disc",
            Self::Mode => "mode",
        }
    }
}

impl fmt::Display for InverseDistributionFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderedSetAggregate {
    pub function: InverseDistributionFunction,
    pub arguments: Vec<String>,
    pub sort_expression: String,
    pub descending: bool,
    /// Type of the sort expression, when the mapping could be resolved.
    pub sort_type: Option<JdbcType>,
    pub filter: Option<String>,
}

impl OrderedSetAggregate {
    pub fn new(function: InverseDistributionFunction, sort_expression: impl Into<String>) -> Self {
        Self {
            function,
            arguments: Vec::new(),
            sort_expression: sort_expression.into(),
            descending: false,
            sort_type: None,
            filter: None,
        }
    }

    pub fn argument(mut self, argument: impl Into<String>) -> Self {
        self.arguments.push(argument.into());
        self
    }

    pub fn descending(mut self) -> Self {
        self.descending = true;
        self
    }

    pub fn sort_type(mut self, sort_type: JdbcType) -> Self {
        self.sort_type = Some(sort_type);
        self
    }

    pub fn filter(mut self, predicate: impl Into<String>) -> Self {
        self.filter = Some(predicate.into());
        self
    }

    pub fn render(&self, supports_filter_clause: bool) -> Result<String> {
        let mut sql = format!(
            "{}({}) within group (order by {}{})",
            self.function,
            self.arguments.join(","),
            self.sort_expression,
            if self.descending { " desc" } else { "" }
        );
        if let Some(predicate) = &self.filter {
            if !supports_filter_clause {
                return Err(PersistError::UnsupportedCapability(format!(
                    "filter clause on {} is not supported by this dialect",
                    self.function
                )));
            }
            sql.push_str(&format!(" filter (where {})", predicate));
        }
        Ok(sql)
    }

    /// Continuous percentiles interpolate, so only temporal sort types keep
    /// their type. An unresolved sort type yields `Double`, which is exact
    /// for numeric sorts and only approximate for anything else.
    pub fn result_type(&self) -> JdbcType {
        match (self.function, self.sort_type) {
            (InverseDistributionFunction::PercentileCont, Some(ty)) if ty.is_temporal() => ty,
            (InverseDistributionFunction::PercentileCont, _) => JdbcType::Double,
            (_, Some(ty)) => ty,
            (_, None) => JdbcType::Double,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_within_group() {
        let median = OrderedSetAggregate::new(InverseDistributionFunction::PercentileCont, "o.total")
            .argument("0.5")
            .descending();
        assert_eq!(
            median.render(false).unwrap(),
            "percentile_cont(0.5) within group (order by o.total desc)"
        );

        let mode = OrderedSetAggregate::new(InverseDistributionFunction::Mode, "o.status")
            .filter("o.total > 10");
        assert_eq!(
            mode.render(true).unwrap(),
            "mode() within group (order by o.status) filter (where o.total > 10)"
        );
    }

    #[test]
    fn test_filter_without_support_is_rejected() {
        let mode = OrderedSetAggregate::new(InverseDistributionFunction::Mode, "o.status")
            .filter("o.total > 10");
        assert!(matches!(
            mode.render(false),
            Err(PersistError::UnsupportedCapability(_))
        ));
    }

    #[test]
    fn test_result_type_fallback() {
        let unresolved =
            OrderedSetAggregate::new(InverseDistributionFunction::PercentileDisc, "o.placed_at");
        assert_eq!(unresolved.result_type(), JdbcType::Double);

        let resolved = unresolved.clone().sort_type(JdbcType::Timestamp);
        assert_eq!(resolved.result_type(), JdbcType::Timestamp);

        let cont = OrderedSetAggregate::new(InverseDistributionFunction::PercentileCont, "o.qty")
            .sort_type(JdbcType::Integer);
        assert_eq!(cont.result_type(), JdbcType::Double);
    }
}
