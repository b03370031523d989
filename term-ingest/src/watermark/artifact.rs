//! The CSV layout of the persisted watermark.
//!
//! ```text
//! partition_id,processed_at
//! 2023-03-17,2023-03-17T06:00:00Z
//! 2023-03-18,2023-03-18T06:00:00Z
//! ```

use std::io::Cursor;
use std::sync::Arc;

use arrow::array::{Array, StringArray};
use arrow::csv::{ReaderBuilder, WriterBuilder};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use chrono::{DateTime, NaiveDate, Utc};

use super::WatermarkRecord;
use crate::partition::PartitionId;

pub(crate) const PARTITION_COLUMN: &str = "partition_id";
pub(crate) const PROCESSED_AT_COLUMN: &str = "processed_at";

/// Header written by the original deployment of this pipeline.
const LEGACY_HEADER: [&str; 2] = ["folder", "Processed date"];

/// Sortable timestamp format of `processed_at`.
pub(crate) const PROCESSED_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

fn schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new(PARTITION_COLUMN, DataType::Utf8, true),
        Field::new(PROCESSED_AT_COLUMN, DataType::Utf8, true),
    ]))
}

fn parse_processed_at(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn check_header(text: &str) -> Result<(), String> {
    let header = text.lines().next().unwrap_or_default().trim_end_matches('\r');
    let columns: Vec<&str> = header.split(',').map(str::trim).collect();
    if columns == [PARTITION_COLUMN, PROCESSED_AT_COLUMN] || columns == LEGACY_HEADER {
        Ok(())
    } else {
        Err(format!(
            "expected header '{PARTITION_COLUMN},{PROCESSED_AT_COLUMN}', found '{header}'"
        ))
    }
}

fn column<'a>(batch: &'a RecordBatch, idx: usize) -> Result<&'a StringArray, String> {
    batch
        .column(idx)
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| format!("column {idx} is not textual"))
}

/// Parses an artifact. Errors are human-readable descriptions of the defect.
pub(crate) fn parse(data: &Bytes) -> Result<Vec<WatermarkRecord>, String> {
    let text = std::str::from_utf8(data).map_err(|e| format!("not valid UTF-8: {e}"))?;
    check_header(text)?;

    let reader = ReaderBuilder::new(schema())
        .with_header(true)
        .build(Cursor::new(data.as_ref()))
        .map_err(|e| e.to_string())?;

    let mut records = Vec::new();
    for batch in reader {
        let batch = batch.map_err(|e| e.to_string())?;
        let ids = column(&batch, 0)?;
        let times = column(&batch, 1)?;
        for row in 0..batch.num_rows() {
            if ids.is_null(row) || times.is_null(row) {
                return Err(format!("record {} has an empty field", records.len() + 1));
            }
            let partition_id = PartitionId::new(ids.value(row).trim())
                .map_err(|e| format!("record {}: {e}", records.len() + 1))?;
            let processed_at = parse_processed_at(times.value(row).trim()).ok_or_else(|| {
                format!(
                    "record {}: unparsable timestamp '{}'",
                    records.len() + 1,
                    times.value(row)
                )
            })?;
            records.push(WatermarkRecord::new(partition_id, processed_at));
        }
    }
    Ok(records)
}

/// Renders records as an artifact, header included.
pub(crate) fn render(records: &[WatermarkRecord]) -> Result<Bytes, arrow::error::ArrowError> {
    let ids = StringArray::from_iter_values(records.iter().map(|r| r.partition_id.as_str()));
    let times = StringArray::from_iter_values(
        records
            .iter()
            .map(|r| r.processed_at.format(PROCESSED_AT_FORMAT).to_string()),
    );
    let batch = RecordBatch::try_new(schema(), vec![Arc::new(ids), Arc::new(times)])?;

    let mut writer = WriterBuilder::new().with_header(true).build(Vec::new());
    writer.write(&batch)?;
    Ok(Bytes::from(writer.into_inner()))
}
