//! Predicate evaluation for document stores
//!
//! Evaluates the predicate language the filter compiler emits:
//! implicit equality, `$and`, `$or`, `$ne`, `$lt`, `$lte`, `$gt`, `$gte`,
//! `$in`, `$nin`, `$exists` and `$regex` (with `$options: "i"`).
//!
//! Field paths may be dotted. A path that crosses or ends on an array
//! matches if any element matches, the same way array fields behave in a
//! document database.

use std::cmp::Ordering;

use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value};

use super::errors::{StoreError, StoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RangeOp {
    Lt,
    Lte,
    Gt,
    Gte,
}

impl RangeOp {
    fn accepts(&self, ordering: Ordering) -> bool {
        match self {
            RangeOp::Lt => ordering == Ordering::Less,
            RangeOp::Lte => ordering != Ordering::Greater,
            RangeOp::Gt => ordering == Ordering::Greater,
            RangeOp::Gte => ordering != Ordering::Less,
        }
    }
}

#[derive(Debug, Clone)]
enum Condition {
    Eq(Value),
    Ne(Value),
    Range(RangeOp, Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Exists(bool),
    Regex(Regex),
}

#[derive(Debug, Clone)]
enum Node {
    And(Vec<Node>),
    Or(Vec<Node>),
    Field {
        path: Vec<String>,
        conditions: Vec<Condition>,
    },
}

/// A compiled predicate ready for repeated evaluation
#[derive(Debug, Clone)]
pub struct Matcher {
    root: Node,
}

impl Matcher {
    /// Compile a predicate document. `{}` matches everything.
    pub fn compile(filter: &Value) -> StoreResult<Self> {
        let object = filter
            .as_object()
            .ok_or_else(|| StoreError::InvalidFilter("filter must be an object".to_string()))?;
        Ok(Self {
            root: compile_object(object)?,
        })
    }

    /// Matcher accepting every document
    pub fn all() -> Self {
        Self {
            root: Node::And(Vec::new()),
        }
    }

    /// Checks if a document matches
    pub fn matches(&self, document: &Value) -> bool {
        eval(&self.root, document)
    }
}

fn compile_object(object: &Map<String, Value>) -> StoreResult<Node> {
    let mut nodes = Vec::with_capacity(object.len());
    for (key, value) in object {
        let node = match key.as_str() {
            "$and" => Node::And(compile_list(key, value)?),
            "$or" => Node::Or(compile_list(key, value)?),
            other if other.starts_with('$') => {
                return Err(StoreError::InvalidFilter(format!(
                    "unsupported top-level operator '{}'",
                    other
                )))
            }
            field => Node::Field {
                path: field.split('.').map(str::to_string).collect(),
                conditions: compile_conditions(value)?,
            },
        };
        nodes.push(node);
    }
    if nodes.len() == 1 {
        if let Some(node) = nodes.pop() {
            return Ok(node);
        }
    }
    Ok(Node::And(nodes))
}

fn compile_list(key: &str, value: &Value) -> StoreResult<Vec<Node>> {
    let items = value
        .as_array()
        .ok_or_else(|| StoreError::InvalidFilter(format!("'{}' requires an array", key)))?;
    items
        .iter()
        .map(|item| {
            item.as_object()
                .ok_or_else(|| StoreError::InvalidFilter(format!("'{}' items must be objects", key)))
                .and_then(compile_object)
        })
        .collect()
}

fn is_operator_object(value: &Value) -> bool {
    match value.as_object() {
        Some(object) => !object.is_empty() && object.keys().all(|k| k.starts_with('$')),
        None => false,
    }
}

fn compile_conditions(value: &Value) -> StoreResult<Vec<Condition>> {
    if !is_operator_object(value) {
        return Ok(vec![Condition::Eq(value.clone())]);
    }

    let mut conditions = Vec::new();
    let mut case_insensitive = false;
    let mut pattern: Option<&str> = None;

    if let Some(object) = value.as_object() {
        for (op, operand) in object {
            let condition = match op.as_str() {
                "$eq" => Condition::Eq(operand.clone()),
                "$ne" => Condition::Ne(operand.clone()),
                "$lt" => Condition::Range(RangeOp::Lt, operand.clone()),
                "$lte" => Condition::Range(RangeOp::Lte, operand.clone()),
                "$gt" => Condition::Range(RangeOp::Gt, operand.clone()),
                "$gte" => Condition::Range(RangeOp::Gte, operand.clone()),
                "$in" => Condition::In(operand_list(op, operand)?),
                "$nin" => Condition::Nin(operand_list(op, operand)?),
                "$exists" => Condition::Exists(operand.as_bool().unwrap_or(true)),
                "$regex" => {
                    pattern = Some(operand.as_str().ok_or_else(|| {
                        StoreError::InvalidFilter("'$regex' requires a string".to_string())
                    })?);
                    continue;
                }
                "$options" => {
                    case_insensitive = operand.as_str().map_or(false, |o| o.contains('i'));
                    continue;
                }
                other => {
                    return Err(StoreError::InvalidFilter(format!(
                        "unsupported operator '{}'",
                        other
                    )))
                }
            };
            conditions.push(condition);
        }
    }

    if let Some(pattern) = pattern {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(case_insensitive)
            .build()
            .map_err(|e| StoreError::InvalidFilter(format!("invalid regex: {}", e)))?;
        conditions.push(Condition::Regex(regex));
    }

    Ok(conditions)
}

fn operand_list(op: &str, operand: &Value) -> StoreResult<Vec<Value>> {
    operand
        .as_array()
        .cloned()
        .ok_or_else(|| StoreError::InvalidFilter(format!("'{}' requires an array", op)))
}

fn eval(node: &Node, document: &Value) -> bool {
    match node {
        Node::And(nodes) => nodes.iter().all(|n| eval(n, document)),
        Node::Or(nodes) => nodes.iter().any(|n| eval(n, document)),
        Node::Field { path, conditions } => {
            let mut found = Vec::new();
            resolve_path(document, path, &mut found);
            conditions.iter().all(|c| eval_condition(c, &found))
        }
    }
}

fn eval_condition(condition: &Condition, found: &[&Value]) -> bool {
    match condition {
        Condition::Eq(expected) => eq_match(found, expected),
        Condition::Ne(expected) => !eq_match(found, expected),
        Condition::Range(op, bound) => candidates(found)
            .any(|v| compare_values(v, bound).map_or(false, |o| op.accepts(o))),
        Condition::In(list) => list.iter().any(|expected| eq_match(found, expected)),
        Condition::Nin(list) => !list.iter().any(|expected| eq_match(found, expected)),
        Condition::Exists(exists) => found.is_empty() != *exists,
        Condition::Regex(regex) => {
            candidates(found).any(|v| v.as_str().map_or(false, |s| regex.is_match(s)))
        }
    }
}

/// Missing fields equal null
fn eq_match(found: &[&Value], expected: &Value) -> bool {
    if found.is_empty() {
        return expected.is_null();
    }
    found
        .iter()
        .any(|v| values_equal(v, expected))
        || candidates(found).any(|v| values_equal(v, expected))
}

/// Values found at a path, with arrays expanded one level
fn candidates<'a>(found: &'a [&'a Value]) -> impl Iterator<Item = &'a Value> + 'a {
    found.iter().flat_map(|v| match v {
        Value::Array(items) => items.iter().collect::<Vec<_>>(),
        other => vec![*other],
    })
}

fn resolve_path<'a>(value: &'a Value, path: &[String], found: &mut Vec<&'a Value>) {
    let Some((head, rest)) = path.split_first() else {
        found.push(value);
        return;
    };
    match value {
        Value::Object(object) => {
            if let Some(next) = object.get(head) {
                resolve_path(next, rest, found);
            }
        }
        Value::Array(items) => {
            for item in items {
                if item.is_object() {
                    resolve_path(item, path, found);
                }
            }
        }
        _ => {}
    }
}

/// Equality with numbers compared by value (`2 == 2.0`)
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| values_equal(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).map_or(false, |other| values_equal(v, other)))
        }
        _ => a == b,
    }
}

/// Ordering between comparable values: numbers with numbers, strings with
/// strings. Anything else is incomparable.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn matches(filter: Value, doc: Value) -> bool {
        Matcher::compile(&filter).unwrap().matches(&doc)
    }

    #[test]
    fn test_empty_filter_matches_all() {
        assert!(matches(json!({}), json!({"a": 1})));
        assert!(Matcher::all().matches(&json!({})));
    }

    #[test]
    fn test_implicit_equality() {
        assert!(matches(json!({"locus": "TRB"}), json!({"locus": "TRB"})));
        assert!(!matches(json!({"locus": "TRB"}), json!({"locus": "TRA"})));
        assert!(!matches(json!({"locus": "TRB"}), json!({})));
        assert!(matches(json!({"count": 2}), json!({"count": 2.0})));
    }

    #[test]
    fn test_array_element_equality() {
        let doc = json!({"v_call": ["TRBV1*01", "TRBV2*01"]});
        assert!(matches(json!({"v_call": "TRBV2*01"}), doc.clone()));
        assert!(matches(json!({"v_call": ["TRBV1*01", "TRBV2*01"]}), doc.clone()));
        assert!(!matches(json!({"v_call": "TRBV3*01"}), doc));
    }

    #[test]
    fn test_ranges() {
        let doc = json!({"junction_length": 42});
        assert!(matches(json!({"junction_length": {"$gt": 40}}), doc.clone()));
        assert!(matches(json!({"junction_length": {"$gte": 42, "$lte": 42}}), doc.clone()));
        assert!(!matches(json!({"junction_length": {"$lt": 42}}), doc.clone()));
        assert!(!matches(json!({"junction_length": {"$gt": "a"}}), doc));
    }

    #[test]
    fn test_ne_and_missing() {
        assert!(matches(json!({"locus": {"$ne": "TRB"}}), json!({"locus": "TRA"})));
        assert!(matches(json!({"locus": {"$ne": "TRB"}}), json!({})));
        assert!(!matches(json!({"v_call": {"$ne": "A"}}), json!({"v_call": ["A", "B"]})));
    }

    #[test]
    fn test_membership() {
        let doc = json!({"locus": "TRB"});
        assert!(matches(json!({"locus": {"$in": ["TRA", "TRB"]}}), doc.clone()));
        assert!(!matches(json!({"locus": {"$nin": ["TRA", "TRB"]}}), doc.clone()));
        assert!(matches(json!({"locus": {"$nin": ["IGH"]}}), doc));
    }

    #[test]
    fn test_exists() {
        assert!(matches(json!({"d_call": {"$exists": false}}), json!({"v_call": "x"})));
        assert!(!matches(json!({"d_call": {"$exists": false}}), json!({"d_call": "x"})));
        assert!(matches(json!({"d_call": {"$exists": true}}), json!({"d_call": null})));
    }

    #[test]
    fn test_regex_case_insensitive() {
        let filter = json!({"v_call": {"$regex": "trbv20", "$options": "i"}});
        assert!(matches(filter.clone(), json!({"v_call": "TRBV20-1*01"})));
        assert!(!matches(json!({"v_call": {"$regex": "trbv20"}}), json!({"v_call": "TRBV20-1*01"})));
    }

    #[test]
    fn test_regex_prefix_over_array() {
        let doc = json!({"junction_suffixes": ["CASSLG", "ASSLG", "SSLG"]});
        assert!(matches(json!({"junction_suffixes": {"$regex": "^SSL"}}), doc.clone()));
        assert!(!matches(json!({"junction_suffixes": {"$regex": "^LGX"}}), doc));
    }

    #[test]
    fn test_logical_and_dotted_paths() {
        let doc = json!({"subject": {"sex": "F", "age": 40}, "cells": [{"type": "B"}, {"type": "T"}]});
        assert!(matches(
            json!({"$and": [{"subject.sex": "F"}, {"subject.age": {"$gte": 18}}]}),
            doc.clone()
        ));
        assert!(matches(json!({"$or": [{"subject.sex": "M"}, {"cells.type": "T"}]}), doc.clone()));
        assert!(!matches(json!({"$or": [{"subject.sex": "M"}, {"cells.type": "NK"}]}), doc));
    }

    #[test]
    fn test_invalid_filters() {
        assert!(Matcher::compile(&json!([])).is_err());
        assert!(Matcher::compile(&json!({"$where": "1"})).is_err());
        assert!(Matcher::compile(&json!({"a": {"$near": 1}})).is_err());
        assert!(Matcher::compile(&json!({"a": {"$in": 1}})).is_err());
        assert!(Matcher::compile(&json!({"a": {"$regex": "("}})).is_err());
    }
}
