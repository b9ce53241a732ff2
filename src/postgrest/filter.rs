//! Filter operations for TableQuery

/// Operator for filter expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    /// Equal to
    Eq,

    /// Not equal to
    Neq,

    /// Greater than
    Gt,

    /// Greater than or equal to
    Gte,

    /// Less than
    Lt,

    /// Less than or equal to
    Lte,

    /// Like (case sensitive)
    Like,

    /// Like (case insensitive)
    ILike,

    /// Is (null, true, false)
    Is,

    /// In a list of values
    In,
}

impl FilterOperator {
    /// Convert the operator to its string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Eq => "eq",
            FilterOperator::Neq => "neq",
            FilterOperator::Gt => "gt",
            FilterOperator::Gte => "gte",
            FilterOperator::Lt => "lt",
            FilterOperator::Lte => "lte",
            FilterOperator::Like => "like",
            FilterOperator::ILike => "ilike",
            FilterOperator::Is => "is",
            FilterOperator::In => "in",
        }
    }
}

/// One `column=op.value` condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: String,
    pub operator: FilterOperator,
    pub negated: bool,
    pub value: String,
}

impl Filter {
    pub fn new(column: &str, operator: FilterOperator, value: impl Into<String>) -> Self {
        Self {
            column: column.to_string(),
            operator,
            negated: false,
            value: value.into(),
        }
    }

    pub fn negate(mut self) -> Self {
        self.negated = !self.negated;
        self
    }

    /// Right-hand side of the query parameter, e.g. `not.is.null`
    pub fn expression(&self) -> String {
        let prefix = if self.negated { "not." } else { "" };
        format!("{}{}.{}", prefix, self.operator.as_str(), self.value)
    }

    /// The condition as used inside an `or=(...)` group, e.g. `status.eq.open`
    pub fn as_group_member(&self) -> String {
        format!("{}.{}", self.column, self.expression())
    }
}

/// Render a list for the `in` operator, quoting items that contain
/// characters PostgREST reserves inside lists.
pub fn in_list_value<T: ToString>(values: &[T]) -> String {
    let items: Vec<String> = values
        .iter()
        .map(|v| {
            let s = v.to_string();
            if s.contains([',', '(', ')', '"']) {
                format!("\"{}\"", s.replace('"', "\\\""))
            } else {
                s
            }
        })
        .collect();
    format!("({})", items.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expressions() {
        let f = Filter::new("status", FilterOperator::Eq, "open");
        assert_eq!(f.expression(), "eq.open");
        assert_eq!(f.as_group_member(), "status.eq.open");

        let f = Filter::new("resolved_at", FilterOperator::Is, "null").negate();
        assert_eq!(f.expression(), "not.is.null");
    }

    #[test]
    fn test_in_list_quotes_reserved_characters() {
        assert_eq!(in_list_value(&["open", "in_progress"]), "(open,in_progress)");
        assert_eq!(in_list_value(&["Acme, Inc"]), "(\"Acme, Inc\")");
    }
}
