//! JSON envelope writer
//!
//! ```json
//! {"Info": {...}, "Rearrangement": [
//! {...},
//! {...}
//! ]}
//! ```
//!
//! The array is opened before the first record and closed after the last,
//! so zero matches still yield a valid document.

use serde_json::{Map, Value};

use super::engine::RecordWriter;
use super::errors::ExportResult;
use super::sink::ExportSink;

pub(crate) struct JsonWriter {
    entity: String,
    info: Value,
    records: u64,
}

impl JsonWriter {
    pub(crate) fn new(entity: &str, info: &Value) -> Self {
        Self {
            entity: entity.to_string(),
            info: info.clone(),
            records: 0,
        }
    }
}

impl RecordWriter for JsonWriter {
    fn begin(&mut self, sink: &mut dyn ExportSink) -> ExportResult<()> {
        let opening = format!(
            "{{\"Info\":{},{}:[",
            serde_json::to_string(&self.info)?,
            serde_json::to_string(&self.entity)?
        );
        sink.write_all(opening.as_bytes())?;
        Ok(())
    }

    fn write_record(&mut self, sink: &mut dyn ExportSink, record: &Map<String, Value>) -> ExportResult<()> {
        let separator: &[u8] = if self.records == 0 { b"\n" } else { b",\n" };
        sink.write_all(separator)?;
        sink.write_all(&serde_json::to_vec(record)?)?;
        self.records += 1;
        Ok(())
    }

    fn end(&mut self, sink: &mut dyn ExportSink) -> ExportResult<()> {
        let closing: &[u8] = if self.records == 0 { b"]}\n" } else { b"\n]}\n" };
        sink.write_all(closing)?;
        Ok(())
    }
}
