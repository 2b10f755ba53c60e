//! Streaming TSV row reader
//!
//! Opens a plain or gzip-compressed AIRR TSV file (gzip is detected by its
//! magic bytes) and yields rows in fixed-size batches. Only one batch is
//! held in memory: the caller pulls the next batch after it has committed
//! the previous one.
//!
//! Cells are mapped through the schema as they are read:
//! - integer → i64, number → f64
//! - boolean → `T/t/TRUE/True/true` or `F/f/FALSE/False/false`
//! - anything else stays a string
//!
//! Empty or unparseable cells become null and are removed by cleanup.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use serde_json::{Map, Number, Value};

use crate::schema::{FieldType, SchemaAdapter};

use super::errors::{LoaderError, LoaderResult};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// One parsed row, keyed by header name
pub type Row = Map<String, Value>;

/// Pull-based batch reader over one source file
pub struct RowReader {
    source: String,
    reader: csv::Reader<Box<dyn Read + Send>>,
    columns: Vec<(String, Option<FieldType>)>,
    record: csv::StringRecord,
    rows_read: u64,
}

impl RowReader {
    /// Open a source file
    pub fn open(path: &Path, schema: &dyn SchemaAdapter) -> LoaderResult<Self> {
        let source = path.display().to_string();
        let file = File::open(path)
            .map_err(|e| LoaderError::source_stream(format!("Failed to open {}", source), e))?;
        Self::from_reader(source, BufReader::new(file), schema)
    }

    /// Wrap an already opened byte stream
    pub fn from_reader<R>(source: impl Into<String>, mut input: R, schema: &dyn SchemaAdapter) -> LoaderResult<Self>
    where
        R: BufRead + Send + 'static,
    {
        let source = source.into();
        let is_gzip = input
            .fill_buf()
            .map_err(|e| LoaderError::source_stream(format!("Failed to read {}", source), e))?
            .starts_with(&GZIP_MAGIC);

        let stream: Box<dyn Read + Send> = if is_gzip {
            Box::new(MultiGzDecoder::new(input))
        } else {
            Box::new(input)
        };

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .quoting(false)
            .from_reader(stream);

        let headers = reader
            .headers()
            .map_err(|e| LoaderError::source_stream(format!("Failed to read header of {}", source), e))?
            .clone();
        let columns = headers
            .iter()
            .map(|name| {
                let field_type = schema.spec_for_field(name).map(|s| s.field_type);
                (name.to_string(), field_type)
            })
            .collect();

        Ok(Self {
            source,
            reader,
            columns,
            record: csv::StringRecord::new(),
            rows_read: 0,
        })
    }

    /// Column names in file order
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    /// Rows read so far
    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    /// Read up to `size` rows. Returns `None` once the file is exhausted.
    pub fn next_batch(&mut self, size: usize) -> LoaderResult<Option<Vec<Row>>> {
        let mut batch = Vec::with_capacity(size.min(1024));
        while batch.len() < size {
            let more = self.reader.read_record(&mut self.record).map_err(|e| {
                LoaderError::source_stream(
                    format!("Failed to parse {} after row {}", self.source, self.rows_read),
                    e,
                )
            })?;
            if !more {
                break;
            }
            self.rows_read += 1;
            batch.push(self.map_record());
        }
        Ok(if batch.is_empty() { None } else { Some(batch) })
    }

    fn map_record(&self) -> Row {
        let mut row = Map::with_capacity(self.columns.len());
        for ((name, field_type), cell) in self.columns.iter().zip(self.record.iter()) {
            row.insert(name.clone(), map_cell(field_type.as_ref(), cell));
        }
        row
    }
}

/// Map one raw cell through its declared type
pub fn map_cell(field_type: Option<&FieldType>, raw: &str) -> Value {
    if raw.is_empty() {
        return Value::Null;
    }
    match field_type {
        Some(FieldType::Integer) => raw.trim().parse::<i64>().map(Value::from).unwrap_or(Value::Null),
        Some(FieldType::Number) => raw
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Some(FieldType::Boolean) => match raw.trim() {
            "T" | "t" | "TRUE" | "True" | "true" => Value::Bool(true),
            "F" | "f" | "FALSE" | "False" | "false" => Value::Bool(false),
            _ => Value::Null,
        },
        _ => Value::String(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::AirrSchema;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use serde_json::json;
    use std::io::{Cursor, Write};

    const TSV: &str = "sequence_id\tproductive\tduplicate_count\tv_score\tv_call\tmy_note\n\
                       s1\tT\t3\t99.5\tTRBV1*01\thello\n\
                       s2\tfalse\t\tx\t\t\n\
                       s3\tF\t7\t1\tTRBV2*01,TRBV3*01\tbye\n";

    fn reader_for(bytes: Vec<u8>) -> RowReader {
        let schema = AirrSchema::builtin_rearrangement().unwrap();
        RowReader::from_reader("test.tsv", Cursor::new(bytes), &schema).unwrap()
    }

    #[test]
    fn test_typed_mapping() {
        let mut reader = reader_for(TSV.as_bytes().to_vec());
        let batch = reader.next_batch(10).unwrap().unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0]["productive"], json!(true));
        assert_eq!(batch[0]["duplicate_count"], json!(3));
        assert_eq!(batch[0]["v_score"], json!(99.5));
        assert_eq!(batch[0]["my_note"], json!("hello"));
        assert_eq!(batch[1]["productive"], json!(false));
        assert_eq!(batch[1]["duplicate_count"], Value::Null);
        assert_eq!(batch[1]["v_score"], Value::Null);
        assert_eq!(batch[1]["v_call"], Value::Null);
        assert!(reader.next_batch(10).unwrap().is_none());
    }

    #[test]
    fn test_batches_are_bounded() {
        let mut reader = reader_for(TSV.as_bytes().to_vec());
        assert_eq!(reader.next_batch(2).unwrap().unwrap().len(), 2);
        assert_eq!(reader.next_batch(2).unwrap().unwrap().len(), 1);
        assert!(reader.next_batch(2).unwrap().is_none());
        assert_eq!(reader.rows_read(), 3);
    }

    #[test]
    fn test_gzip_detected() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(TSV.as_bytes()).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut reader = reader_for(compressed);
        assert_eq!(reader.columns().count(), 6);
        assert_eq!(reader.next_batch(100).unwrap().unwrap().len(), 3);
    }

    #[test]
    fn test_ragged_row_is_stream_error() {
        let mut reader = reader_for(b"a\tb\n1\t2\t3\n".to_vec());
        let err = reader.next_batch(10).unwrap_err();
        assert_eq!(err.code(), crate::ingest::LoaderErrorCode::AdcSourceStreamError);
    }

    #[test]
    fn test_corrupt_gzip_is_stream_error() {
        let mut bytes = vec![0x1f, 0x8b];
        bytes.extend_from_slice(b"definitely not deflate data");
        let schema = AirrSchema::builtin_rearrangement().unwrap();
        let result = RowReader::from_reader("bad.gz", Cursor::new(bytes), &schema)
            .and_then(|mut r| r.next_batch(10));
        assert!(result.is_err());
    }

    #[test]
    fn test_boolean_spellings() {
        for raw in ["T", "t", "TRUE", "True", "true"] {
            assert_eq!(map_cell(Some(&FieldType::Boolean), raw), json!(true));
        }
        for raw in ["F", "f", "FALSE", "False", "false"] {
            assert_eq!(map_cell(Some(&FieldType::Boolean), raw), json!(false));
        }
        assert_eq!(map_cell(Some(&FieldType::Boolean), "yes"), Value::Null);
        assert_eq!(map_cell(None, "TRB"), json!("TRB"));
    }
}
