//! CSV encoding and decoding.

use std::io::Cursor;
use std::sync::Arc;

use arrow::csv::reader::Format;
use arrow::csv::{ReaderBuilder, WriterBuilder};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use tracing::{debug, instrument};

use crate::error::{IngestError, Result};
use crate::table::UnifiedTable;

/// Options for reading and writing CSV objects.
#[derive(Debug, Clone)]
pub struct CsvOptions {
    /// Whether the CSV file has a header row
    pub has_header: bool,
    /// Field delimiter (default: ',')
    pub delimiter: u8,
    /// Quote character (default: '"')
    pub quote: u8,
    /// Maximum records to read for schema inference
    pub schema_infer_max_records: usize,
    /// Rows per decoded record batch
    pub batch_size: usize,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            has_header: true,
            delimiter: b',',
            quote: b'"',
            schema_infer_max_records: 1000,
            batch_size: 8192,
        }
    }
}

fn codec_error(err: impl std::fmt::Display) -> IngestError {
    IngestError::codec("csv", err.to_string())
}

#[instrument(skip(data, options), fields(bytes = data.len()))]
pub(super) fn decode(data: &Bytes, options: &CsvOptions) -> Result<UnifiedTable> {
    let format = Format::default()
        .with_header(options.has_header)
        .with_delimiter(options.delimiter)
        .with_quote(options.quote);

    let (schema, _) = format
        .infer_schema(Cursor::new(data.as_ref()), Some(options.schema_infer_max_records))
        .map_err(codec_error)?;
    let schema = Arc::new(schema);

    let reader = ReaderBuilder::new(schema.clone())
        .with_header(options.has_header)
        .with_delimiter(options.delimiter)
        .with_quote(options.quote)
        .with_batch_size(options.batch_size)
        .build(Cursor::new(data.as_ref()))
        .map_err(codec_error)?;

    let batches = reader
        .collect::<std::result::Result<Vec<RecordBatch>, _>>()
        .map_err(codec_error)?;

    debug!(
        columns = schema.fields().len(),
        batches = batches.len(),
        "Decoded CSV object"
    );
    UnifiedTable::from_batches(schema, batches)
}

#[instrument(skip(table, options), fields(rows = table.num_rows()))]
pub(super) fn encode(table: &UnifiedTable, options: &CsvOptions) -> Result<Bytes> {
    let mut writer = WriterBuilder::new()
        .with_header(options.has_header)
        .with_delimiter(options.delimiter)
        .with_quote(options.quote)
        .build(Vec::new());

    if table.batches().is_empty() {
        writer
            .write(&RecordBatch::new_empty(table.schema().clone()))
            .map_err(codec_error)?;
    }
    for batch in table.batches() {
        writer.write(batch).map_err(codec_error)?;
    }

    Ok(Bytes::from(writer.into_inner()))
}
