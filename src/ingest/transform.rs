//! Row normalization
//!
//! Turns a raw parsed row into the record shape that is persisted:
//! - repertoire and data-processing identifiers filled from the job
//! - gene calls split into lists with derived gene and subgroup fields
//! - junction amino-acid suffixes precomputed for `contains` queries
//! - every record tagged with its load set
//!
//! `transform` only derives fields; `clean_object` strips null and empty
//! values afterwards.

use serde_json::{Map, Value};

use crate::filter::{JUNCTION_AA_FIELD, JUNCTION_SUFFIXES_FIELD, MIN_JUNCTION_CONTAINS_LEN};

use super::reader::Row;

/// Field carrying the batch index of a record
pub const LOAD_SET_FIELD: &str = "load_set";
/// Repertoire identifier field
pub const REPERTOIRE_ID_FIELD: &str = "repertoire_id";
/// Data processing identifier field
pub const DATA_PROCESSING_ID_FIELD: &str = "data_processing_id";

/// Gene call prefixes that get gene/subgroup derivation
pub const GENE_CALL_PREFIXES: [&str; 3] = ["v", "d", "j"];

/// Identifiers a load job stamps onto its rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepertoireContext {
    pub repertoire_id: String,
    pub data_processing_id: Option<String>,
}

impl RepertoireContext {
    pub fn new(repertoire_id: impl Into<String>) -> Self {
        Self {
            repertoire_id: repertoire_id.into(),
            data_processing_id: None,
        }
    }

    pub fn with_data_processing_id(mut self, id: impl Into<String>) -> Self {
        self.data_processing_id = Some(id.into());
        self
    }
}

/// Gene and subgroup derived from one call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedGene {
    pub gene: String,
    pub subgroup: String,
}

/// Derive gene and subgroup from an allele call such as `TRBV20-1*01`.
///
/// Returns `None` when the call carries no `*`.
pub fn parse_gene(call: &str) -> Option<ParsedGene> {
    let (gene, _) = call.split_once('*')?;
    let subgroup = match gene.find('-') {
        Some(idx) => &gene[..idx],
        // mouse nomenclature uses an S separator
        None => match gene.find('S') {
            Some(idx) => &gene[..idx],
            None => gene,
        },
    };
    Some(ParsedGene {
        gene: gene.to_string(),
        subgroup: subgroup.to_string(),
    })
}

/// All suffixes of at least `min_len` characters, longest first.
///
/// Returns `None` when `text` is shorter than `min_len`.
pub fn junction_suffixes(text: &str, min_len: usize) -> Option<Vec<String>> {
    let starts: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    if starts.len() < min_len {
        return None;
    }
    Some(
        starts[..=starts.len() - min_len]
            .iter()
            .map(|&i| text[i..].to_string())
            .collect(),
    )
}

/// Normalize one raw row. Pure: the result depends only on the inputs.
pub fn transform(mut row: Row, context: &RepertoireContext, load_set: u64) -> Row {
    if is_blank(row.get(REPERTOIRE_ID_FIELD)) {
        row.insert(
            REPERTOIRE_ID_FIELD.to_string(),
            Value::String(context.repertoire_id.clone()),
        );
    }
    if is_blank(row.get(DATA_PROCESSING_ID_FIELD)) {
        if let Some(dp_id) = &context.data_processing_id {
            row.insert(
                DATA_PROCESSING_ID_FIELD.to_string(),
                Value::String(dp_id.clone()),
            );
        }
    }
    row.insert(LOAD_SET_FIELD.to_string(), Value::from(load_set));

    for prefix in GENE_CALL_PREFIXES {
        normalize_gene_call(&mut row, prefix);
    }

    let suffixes = match row.get(JUNCTION_AA_FIELD) {
        Some(Value::String(junction)) => junction_suffixes(junction, MIN_JUNCTION_CONTAINS_LEN),
        _ => None,
    };
    if let Some(suffixes) = suffixes {
        row.insert(
            JUNCTION_SUFFIXES_FIELD.to_string(),
            Value::Array(suffixes.into_iter().map(Value::String).collect()),
        );
    }

    row
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}

fn normalize_gene_call(row: &mut Row, prefix: &str) {
    let call_field = format!("{}_call", prefix);
    let gene_field = format!("{}_gene", prefix);
    let subgroup_field = format!("{}_subgroup", prefix);

    let calls: Vec<Value> = match row.get(&call_field) {
        Some(Value::String(call)) if call.contains(',') => {
            call.split(',').map(|c| Value::String(c.to_string())).collect()
        }
        Some(Value::String(call)) => {
            if let Some(parsed) = parse_gene(call) {
                if !parsed.subgroup.is_empty() {
                    row.insert(subgroup_field, Value::String(parsed.subgroup));
                }
                row.insert(gene_field, Value::String(parsed.gene));
            }
            return;
        }
        Some(Value::Array(calls)) => calls.clone(),
        _ => return,
    };

    let mut genes = Vec::with_capacity(calls.len());
    let mut subgroups = Vec::with_capacity(calls.len());
    for call in &calls {
        match call.as_str().and_then(parse_gene) {
            Some(parsed) => {
                genes.push(Value::String(parsed.gene));
                subgroups.push(Value::String(parsed.subgroup));
            }
            None => {
                genes.push(Value::Null);
                subgroups.push(Value::Null);
            }
        }
    }
    row.insert(call_field, Value::Array(calls));
    row.insert(gene_field, Value::Array(genes));
    row.insert(subgroup_field, Value::Array(subgroups));
}

/// Recursively drop keys whose value is null or an empty string.
///
/// Objects nested inside arrays are cleaned too; array elements themselves
/// are kept so positional lists (gene per call) stay aligned.
pub fn clean_object(object: &mut Map<String, Value>) {
    object.retain(|_, value| match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    });
    for value in object.values_mut() {
        clean_value(value);
    }
}

fn clean_value(value: &mut Value) {
    match value {
        Value::Object(inner) => clean_object(inner),
        Value::Array(items) => items.iter_mut().for_each(clean_value),
        _ => {}
    }
}
