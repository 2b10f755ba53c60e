//! # Filter Expression Builder
//!
//! Typed construction of ADC filter trees. `to_value` produces the wire
//! format the compiler consumes:
//!
//! ```json
//! {"op": "and", "content": [
//!   {"op": "=", "content": {"field": "locus", "value": "TRB"}},
//!   {"op": ">=", "content": {"field": "junction_length", "value": 30}}
//! ]}
//! ```

use serde_json::{Map, Value};

use super::op::FilterOp;

/// A filter expression node
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    /// Field comparison
    Comparison {
        op: FilterOp,
        field: String,
        value: Option<Value>,
    },
    /// Conjunction or disjunction of child expressions
    Logical { op: FilterOp, children: Vec<FilterExpr> },
}

impl FilterExpr {
    /// Create a comparison node
    pub fn comparison(op: FilterOp, field: impl Into<String>, value: Option<Value>) -> Self {
        FilterExpr::Comparison {
            op,
            field: field.into(),
            value,
        }
    }

    /// Create an equality filter
    pub fn eq(field: impl Into<String>, value: Value) -> Self {
        Self::comparison(FilterOp::Eq, field, Some(value))
    }

    /// Create a not-equal filter
    pub fn ne(field: impl Into<String>, value: Value) -> Self {
        Self::comparison(FilterOp::Ne, field, Some(value))
    }

    /// Create a less than filter
    pub fn lt(field: impl Into<String>, value: Value) -> Self {
        Self::comparison(FilterOp::Lt, field, Some(value))
    }

    /// Create a greater than or equal filter
    pub fn gte(field: impl Into<String>, value: Value) -> Self {
        Self::comparison(FilterOp::Gte, field, Some(value))
    }

    /// Create a substring filter
    pub fn contains(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::comparison(FilterOp::Contains, field, Some(Value::String(value.into())))
    }

    /// Create an "is missing" filter
    pub fn is_missing(field: impl Into<String>) -> Self {
        Self::comparison(FilterOp::IsMissing, field, None)
    }

    /// Create an "is not missing" filter
    pub fn is_not_missing(field: impl Into<String>) -> Self {
        Self::comparison(FilterOp::IsNotMissing, field, None)
    }

    /// Create an "in list" filter
    pub fn in_list(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::comparison(FilterOp::In, field, Some(Value::Array(values)))
    }

    /// Create an "exclude list" filter
    pub fn exclude(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::comparison(FilterOp::Exclude, field, Some(Value::Array(values)))
    }

    /// Conjunction of children
    pub fn and(children: Vec<FilterExpr>) -> Self {
        FilterExpr::Logical {
            op: FilterOp::And,
            children,
        }
    }

    /// Disjunction of children
    pub fn or(children: Vec<FilterExpr>) -> Self {
        FilterExpr::Logical {
            op: FilterOp::Or,
            children,
        }
    }

    /// Operator of this node
    pub fn op(&self) -> FilterOp {
        match self {
            FilterExpr::Comparison { op, .. } | FilterExpr::Logical { op, .. } => *op,
        }
    }

    /// Number of nodes in the tree
    pub fn node_count(&self) -> usize {
        match self {
            FilterExpr::Comparison { .. } => 1,
            FilterExpr::Logical { children, .. } => {
                1 + children.iter().map(FilterExpr::node_count).sum::<usize>()
            }
        }
    }

    /// Render as an ADC wire filter
    pub fn to_value(&self) -> Value {
        let mut node = Map::new();
        node.insert("op".to_string(), Value::String(self.op().as_str().to_string()));

        let content = match self {
            FilterExpr::Comparison { field, value, .. } => {
                let mut content = Map::new();
                content.insert("field".to_string(), Value::String(field.clone()));
                if let Some(value) = value {
                    content.insert("value".to_string(), value.clone());
                }
                Value::Object(content)
            }
            FilterExpr::Logical { children, .. } => {
                Value::Array(children.iter().map(FilterExpr::to_value).collect())
            }
        };
        node.insert("content".to_string(), content);

        Value::Object(node)
    }
}
