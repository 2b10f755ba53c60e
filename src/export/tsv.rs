//! TSV writer
//!
//! Column order: schema fields in schema order, then custom fields. With a
//! projection, only projected fields appear and custom ones follow in
//! request order; without one, the first record's custom fields are
//! appended sorted. The header is written once the columns are known (at
//! the first record, or at the end for an empty result).

use std::collections::HashSet;

use serde_json::{Map, Value};

use super::engine::RecordWriter;
use super::errors::ExportResult;
use super::sink::ExportSink;

pub(crate) struct TsvWriter {
    schema_order: Vec<String>,
    projection: Option<Vec<String>>,
    columns: Option<Vec<String>>,
}

impl TsvWriter {
    pub(crate) fn new(schema_order: Vec<String>, projection: Option<Vec<String>>) -> Self {
        Self {
            schema_order,
            projection,
            columns: None,
        }
    }

    fn ensure_header(
        &mut self,
        sink: &mut dyn ExportSink,
        first: Option<&Map<String, Value>>,
    ) -> ExportResult<()> {
        if self.columns.is_none() {
            let columns = columns_for(&self.schema_order, self.projection.as_deref(), first);
            let mut header = columns.join("\t");
            header.push('\n');
            sink.write_all(header.as_bytes())?;
            self.columns = Some(columns);
        }
        Ok(())
    }
}

impl RecordWriter for TsvWriter {
    fn begin(&mut self, _sink: &mut dyn ExportSink) -> ExportResult<()> {
        Ok(())
    }

    fn write_record(&mut self, sink: &mut dyn ExportSink, record: &Map<String, Value>) -> ExportResult<()> {
        self.ensure_header(sink, Some(record))?;
        let Some(columns) = self.columns.as_ref() else {
            return Ok(());
        };
        let mut line = columns
            .iter()
            .map(|column| record.get(column).map(tsv_cell).unwrap_or_default())
            .collect::<Vec<_>>()
            .join("\t");
        line.push('\n');
        sink.write_all(line.as_bytes())?;
        Ok(())
    }

    fn end(&mut self, sink: &mut dyn ExportSink) -> ExportResult<()> {
        self.ensure_header(sink, None)
    }
}

/// Header columns for a result set
pub(crate) fn columns_for(
    schema_order: &[String],
    projection: Option<&[String]>,
    first: Option<&Map<String, Value>>,
) -> Vec<String> {
    let schema_fields: HashSet<&str> = schema_order.iter().map(String::as_str).collect();
    match projection {
        Some(projection) => {
            let mut columns: Vec<String> = schema_order
                .iter()
                .filter(|f| projection.contains(f))
                .cloned()
                .collect();
            for field in projection {
                if !schema_fields.contains(field.as_str()) && !columns.contains(field) {
                    columns.push(field.clone());
                }
            }
            columns
        }
        None => {
            let mut columns = schema_order.to_vec();
            if let Some(record) = first {
                let mut custom: Vec<String> = record
                    .keys()
                    .filter(|k| !schema_fields.contains(k.as_str()))
                    .cloned()
                    .collect();
                custom.sort();
                columns.extend(custom);
            }
            columns
        }
    }
}

/// Encode one value as a TSV cell
pub fn tsv_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "T".to_string(),
        Value::Bool(false) => "F".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => sanitize(s),
        Value::Array(items) => items.iter().map(tsv_cell).collect::<Vec<_>>().join(","),
        Value::Object(_) => sanitize(&value.to_string()),
    }
}

fn sanitize(text: &str) -> String {
    text.replace(['\t', '\n', '\r'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn order() -> Vec<String> {
        ["sequence_id", "v_call", "productive"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_cells() {
        assert_eq!(tsv_cell(&Value::Null), "");
        assert_eq!(tsv_cell(&json!(true)), "T");
        assert_eq!(tsv_cell(&json!(false)), "F");
        assert_eq!(tsv_cell(&json!(12)), "12");
        assert_eq!(tsv_cell(&json!(["a", "b"])), "a,b");
        assert_eq!(tsv_cell(&json!("x\ty\nz")), "x y z");
        assert_eq!(tsv_cell(&json!({"k": 1})), "{\"k\":1}");
    }

    #[test]
    fn test_projected_columns_follow_schema_order() {
        let projection = vec!["productive".to_string(), "my_tag".to_string(), "sequence_id".to_string()];
        assert_eq!(
            columns_for(&order(), Some(&projection), None),
            vec!["sequence_id", "productive", "my_tag"]
        );
    }

    #[test]
    fn test_unprojected_custom_fields_sorted_at_end() {
        let record = json!({"zeta": 1, "alpha": 2, "v_call": "x"});
        assert_eq!(
            columns_for(&order(), None, record.as_object()),
            vec!["sequence_id", "v_call", "productive", "alpha", "zeta"]
        );
    }
}
