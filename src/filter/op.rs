//! Filter operators and their predicate keywords

use std::fmt;

/// Operator of a filter-expression node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Contains,
    /// `is` / `is missing`
    IsMissing,
    /// `not` / `is not missing`
    IsNotMissing,
    In,
    Exclude,
    And,
    Or,
}

impl FilterOp {
    /// All operators, in wire-table order
    pub const ALL: [FilterOp; 13] = [
        FilterOp::Eq,
        FilterOp::Ne,
        FilterOp::Lt,
        FilterOp::Lte,
        FilterOp::Gt,
        FilterOp::Gte,
        FilterOp::Contains,
        FilterOp::IsMissing,
        FilterOp::IsNotMissing,
        FilterOp::In,
        FilterOp::Exclude,
        FilterOp::And,
        FilterOp::Or,
    ];

    /// Parses a wire operator. Short aliases `is` and `not` are accepted.
    pub fn parse(op: &str) -> Option<Self> {
        let parsed = match op {
            "=" => FilterOp::Eq,
            "!=" => FilterOp::Ne,
            "<" => FilterOp::Lt,
            "<=" => FilterOp::Lte,
            ">" => FilterOp::Gt,
            ">=" => FilterOp::Gte,
            "contains" => FilterOp::Contains,
            "is" | "is missing" => FilterOp::IsMissing,
            "not" | "is not missing" => FilterOp::IsNotMissing,
            "in" => FilterOp::In,
            "exclude" => FilterOp::Exclude,
            "and" => FilterOp::And,
            "or" => FilterOp::Or,
            _ => return None,
        };
        Some(parsed)
    }

    /// Canonical wire spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Ne => "!=",
            FilterOp::Lt => "<",
            FilterOp::Lte => "<=",
            FilterOp::Gt => ">",
            FilterOp::Gte => ">=",
            FilterOp::Contains => "contains",
            FilterOp::IsMissing => "is missing",
            FilterOp::IsNotMissing => "is not missing",
            FilterOp::In => "in",
            FilterOp::Exclude => "exclude",
            FilterOp::And => "and",
            FilterOp::Or => "or",
        }
    }

    /// Predicate keyword wrapping the value, if the operator has one.
    ///
    /// `=` compiles to implicit equality and `contains`/existence checks
    /// build their own sub-documents, so they return `None`.
    pub fn keyword(&self) -> Option<&'static str> {
        match self {
            FilterOp::Ne => Some("$ne"),
            FilterOp::Lt => Some("$lt"),
            FilterOp::Lte => Some("$lte"),
            FilterOp::Gt => Some("$gt"),
            FilterOp::Gte => Some("$gte"),
            FilterOp::In => Some("$in"),
            FilterOp::Exclude => Some("$nin"),
            FilterOp::And => Some("$and"),
            FilterOp::Or => Some("$or"),
            _ => None,
        }
    }

    /// Returns true for `and` / `or`
    pub fn is_logical(&self) -> bool {
        matches!(self, FilterOp::And | FilterOp::Or)
    }

    /// Returns true for `in` / `exclude`
    pub fn is_membership(&self) -> bool {
        matches!(self, FilterOp::In | FilterOp::Exclude)
    }

    /// Returns true for operators that need no value
    pub fn is_existence(&self) -> bool {
        matches!(self, FilterOp::IsMissing | FilterOp::IsNotMissing)
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trips_canonical_spelling() {
        for op in FilterOp::ALL {
            assert_eq!(FilterOp::parse(op.as_str()), Some(op));
        }
    }

    #[test]
    fn test_aliases() {
        assert_eq!(FilterOp::parse("is"), Some(FilterOp::IsMissing));
        assert_eq!(FilterOp::parse("not"), Some(FilterOp::IsNotMissing));
        assert_eq!(FilterOp::parse("like"), None);
        assert_eq!(FilterOp::parse(""), None);
    }

    #[test]
    fn test_keywords() {
        assert_eq!(FilterOp::Eq.keyword(), None);
        assert_eq!(FilterOp::Exclude.keyword(), Some("$nin"));
        assert_eq!(FilterOp::Or.keyword(), Some("$or"));
    }
}
