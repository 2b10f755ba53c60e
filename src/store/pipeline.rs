//! Aggregation pipeline evaluation
//!
//! Supports the stages the aggregation builder emits:
//! `$match`, `$skip`, `$limit`, `$count` and `$group` with an `_id` of
//! `"$field"` (or null) and `{"$sum": 1}` / `{"$sum": "$field"}` accumulators.
//!
//! Groups are emitted in first-seen order. An array-valued group key groups
//! by the whole array.

use serde_json::{Map, Value};

use super::errors::{StoreError, StoreResult};
use super::matcher::{values_equal, Matcher};

/// Run a pipeline over an input document stream
pub fn run_pipeline<I>(documents: I, pipeline: &[Value]) -> StoreResult<Vec<Value>>
where
    I: IntoIterator<Item = StoreResult<Value>>,
{
    let mut stages = pipeline.iter();

    // Leading $match stages stream over the input without buffering it
    let mut leading = Vec::new();
    let mut rest: Vec<&Value> = Vec::new();
    for stage in stages.by_ref() {
        match stage.get("$match") {
            Some(filter) if rest.is_empty() => leading.push(Matcher::compile(filter)?),
            _ => {
                rest.push(stage);
                break;
            }
        }
    }
    rest.extend(stages);

    let mut current = Vec::new();
    for document in documents {
        let document = document?;
        if leading.iter().all(|m| m.matches(&document)) {
            current.push(document);
        }
    }

    for stage in rest {
        current = apply_stage(current, stage)?;
    }
    Ok(current)
}

fn apply_stage(documents: Vec<Value>, stage: &Value) -> StoreResult<Vec<Value>> {
    let object = stage
        .as_object()
        .filter(|o| o.len() == 1)
        .ok_or_else(|| StoreError::InvalidPipeline("stage must have exactly one operator".to_string()))?;

    let (name, spec) = match object.iter().next() {
        Some(entry) => entry,
        None => return Err(StoreError::InvalidPipeline("empty stage".to_string())),
    };

    match name.as_str() {
        "$match" => {
            let matcher = Matcher::compile(spec)?;
            Ok(documents.into_iter().filter(|d| matcher.matches(d)).collect())
        }
        "$skip" => Ok(documents.into_iter().skip(stage_count(name, spec)?).collect()),
        "$limit" => Ok(documents.into_iter().take(stage_count(name, spec)?).collect()),
        "$count" => {
            let field = spec
                .as_str()
                .ok_or_else(|| StoreError::InvalidPipeline("'$count' requires a field name".to_string()))?;
            if documents.is_empty() {
                return Ok(Vec::new());
            }
            let mut result = Map::new();
            result.insert(field.to_string(), Value::from(documents.len() as u64));
            Ok(vec![Value::Object(result)])
        }
        "$group" => group(documents, spec),
        other => Err(StoreError::InvalidPipeline(format!("unsupported stage '{}'", other))),
    }
}

fn stage_count(name: &str, spec: &Value) -> StoreResult<usize> {
    spec.as_u64()
        .or_else(|| spec.as_f64().filter(|f| *f >= 0.0).map(|f| f.floor() as u64))
        .map(|n| n as usize)
        .ok_or_else(|| StoreError::InvalidPipeline(format!("'{}' requires a non-negative number", name)))
}

enum Accumulator {
    Constant(f64),
    Field(String),
}

fn field_ref(value: &Value) -> Option<&str> {
    value.as_str().and_then(|s| s.strip_prefix('$'))
}

fn group(documents: Vec<Value>, spec: &Value) -> StoreResult<Vec<Value>> {
    let spec = spec
        .as_object()
        .ok_or_else(|| StoreError::InvalidPipeline("'$group' requires an object".to_string()))?;

    let key_field = match spec.get("_id") {
        None | Some(Value::Null) => None,
        Some(id) => Some(field_ref(id).ok_or_else(|| {
            StoreError::InvalidPipeline("'$group' _id must be a \"$field\" reference".to_string())
        })?),
    };

    let mut accumulators = Vec::new();
    for (name, acc) in spec.iter().filter(|(k, _)| k.as_str() != "_id") {
        let operand = acc
            .get("$sum")
            .ok_or_else(|| StoreError::InvalidPipeline(format!("accumulator '{}' must use $sum", name)))?;
        let accumulator = if let Some(field) = field_ref(operand) {
            Accumulator::Field(field.to_string())
        } else if let Some(constant) = operand.as_f64() {
            Accumulator::Constant(constant)
        } else {
            return Err(StoreError::InvalidPipeline(format!(
                "unsupported $sum operand for '{}'",
                name
            )));
        };
        accumulators.push((name.clone(), accumulator));
    }

    let mut groups: Vec<(Value, Vec<f64>)> = Vec::new();
    for document in &documents {
        let key = match key_field {
            Some(field) => lookup(document, field).cloned().unwrap_or(Value::Null),
            None => Value::Null,
        };
        let index = match groups.iter().position(|(k, _)| values_equal(k, &key)) {
            Some(index) => index,
            None => {
                groups.push((key, vec![0.0; accumulators.len()]));
                groups.len() - 1
            }
        };
        for (slot, (_, accumulator)) in accumulators.iter().enumerate() {
            let amount = match accumulator {
                Accumulator::Constant(c) => *c,
                Accumulator::Field(field) => lookup(document, field).and_then(Value::as_f64).unwrap_or(0.0),
            };
            groups[index].1[slot] += amount;
        }
    }

    Ok(groups
        .into_iter()
        .map(|(key, sums)| {
            let mut result = Map::new();
            result.insert("_id".to_string(), key);
            for ((name, _), sum) in accumulators.iter().zip(sums) {
                result.insert(name.clone(), number(sum));
            }
            Value::Object(result)
        })
        .collect())
}

fn lookup<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(document, |value, part| value.get(part))
}

/// Integral sums render as integers
fn number(sum: f64) -> Value {
    if sum.fract() == 0.0 && sum.abs() < i64::MAX as f64 {
        Value::from(sum as i64)
    } else {
        Value::from(sum)
    }
}
