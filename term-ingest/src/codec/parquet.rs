//! Parquet encoding and decoding.

use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use tracing::{debug, instrument};

use crate::error::{IngestError, Result};
use crate::table::UnifiedTable;

/// Options for reading and writing Parquet objects.
#[derive(Debug, Clone)]
pub struct ParquetOptions {
    /// Compression codec for written files
    pub compression: Compression,
    /// Maximum rows per row group
    pub max_row_group_size: usize,
    /// Batch size for reading
    pub batch_size: usize,
}

impl Default for ParquetOptions {
    fn default() -> Self {
        Self {
            compression: Compression::SNAPPY,
            max_row_group_size: 1024 * 1024,
            batch_size: 8192,
        }
    }
}

fn codec_error(err: impl std::fmt::Display) -> IngestError {
    IngestError::codec("parquet", err.to_string())
}

#[instrument(skip(data, options), fields(bytes = data.len()))]
pub(super) fn decode(data: &Bytes, options: &ParquetOptions) -> Result<UnifiedTable> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(data.clone()).map_err(codec_error)?;
    let schema = builder.schema().clone();
    let reader = builder
        .with_batch_size(options.batch_size)
        .build()
        .map_err(codec_error)?;

    let batches = reader
        .collect::<std::result::Result<Vec<RecordBatch>, _>>()
        .map_err(codec_error)?;

    debug!(
        columns = schema.fields().len(),
        batches = batches.len(),
        "Decoded Parquet object"
    );
    UnifiedTable::from_batches(schema, batches)
}

#[instrument(skip(table, options), fields(rows = table.num_rows()))]
pub(super) fn encode(table: &UnifiedTable, options: &ParquetOptions) -> Result<Bytes> {
    let props = WriterProperties::builder()
        .set_compression(options.compression)
        .set_max_row_group_size(options.max_row_group_size)
        .build();

    let mut writer = ArrowWriter::try_new(Vec::new(), table.schema().clone(), Some(props))
        .map_err(codec_error)?;
    for batch in table.batches() {
        writer.write(batch).map_err(codec_error)?;
    }
    let buffer = writer.into_inner().map_err(codec_error)?;

    Ok(Bytes::from(buffer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{BooleanArray, Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    fn sample_table() -> UnifiedTable {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("team", DataType::Utf8, true),
            Field::new("is_processed", DataType::Boolean, false),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2, 3])),
                Arc::new(StringArray::from(vec![Some("Arsenal"), None, Some("Leeds")])),
                Arc::new(BooleanArray::from(vec![true, true, true])),
            ],
        )
        .unwrap();
        UnifiedTable::from_batch(batch)
    }

    #[test]
    fn test_round_trip() {
        let table = sample_table();
        let encoded = encode(&table, &ParquetOptions::default()).unwrap();
        let decoded = decode(&encoded, &ParquetOptions::default()).unwrap();

        assert_eq!(decoded.schema().fields(), table.schema().fields());
        assert_eq!(decoded.to_batch().unwrap(), table.to_batch().unwrap());
    }

    #[test]
    fn test_uncompressed_round_trip() {
        let options = ParquetOptions {
            compression: Compression::UNCOMPRESSED,
            ..Default::default()
        };
        let table = sample_table();
        let encoded = encode(&table, &options).unwrap();
        let decoded = decode(&encoded, &options).unwrap();
        assert_eq!(decoded.num_rows(), 3);
    }

    #[test]
    fn test_decode_garbage_fails() {
        let err = decode(&Bytes::from_static(b"not parquet"), &ParquetOptions::default())
            .unwrap_err();
        assert!(matches!(err, IngestError::Codec { .. }));
    }
}
