//! In-memory tabular data shared by the codec, transforms and processor.

use std::sync::Arc;

use arrow::array::Array;
use arrow::compute::{cast, concat_batches};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;

use crate::error::{IngestError, Result};

/// The combined row set of one partition.
///
/// A `UnifiedTable` is an Arrow schema plus an ordered list of record
/// batches that all share it. Row order is the order of the batches.
#[derive(Debug, Clone)]
pub struct UnifiedTable {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
}

impl UnifiedTable {
    /// Creates a table with no columns and no rows.
    pub fn empty() -> Self {
        Self {
            schema: Arc::new(Schema::empty()),
            batches: Vec::new(),
        }
    }

    /// Creates a table from batches, which must all match `schema`.
    pub fn from_batches(schema: SchemaRef, batches: Vec<RecordBatch>) -> Result<Self> {
        for batch in &batches {
            if batch.schema().fields() != schema.fields() {
                return Err(IngestError::SchemaMismatch {
                    expected: describe(&schema),
                    found: describe(&batch.schema()),
                });
            }
        }
        Ok(Self { schema, batches })
    }

    /// Creates a table holding a single batch.
    pub fn from_batch(batch: RecordBatch) -> Self {
        Self {
            schema: batch.schema(),
            batches: vec![batch],
        }
    }

    /// Concatenates tables in order.
    ///
    /// Tables with neither columns nor rows (e.g. decoded from an empty
    /// object) contribute nothing. Every other table must have the column
    /// names of the first one, in the same order; otherwise the result is a
    /// [`IngestError::SchemaMismatch`].
    ///
    /// Column types are resolved across tables before the rows are joined,
    /// since per-object type inference can disagree on identical headers.
    /// Tables without rows and columns holding only nulls take whatever type
    /// the other tables agree on. Integer and floating point columns widen
    /// to `Float64`, and a column that is text in any table becomes text.
    /// Any other type conflict is a [`IngestError::SchemaMismatch`].
    pub fn concat(tables: impl IntoIterator<Item = UnifiedTable>) -> Result<Self> {
        let tables: Vec<UnifiedTable> = tables
            .into_iter()
            .filter(|t| t.num_columns() > 0 || t.num_rows() > 0)
            .collect();
        if tables.is_empty() {
            return Ok(Self::empty());
        }

        let schema = resolve_schema(&tables)?;
        let mut batches = Vec::new();
        for table in tables {
            for batch in table.batches {
                batches.push(conform(batch, &schema)?);
            }
        }
        Ok(Self { schema, batches })
    }

    /// True when column `index` holds at least one non-null value.
    fn has_values(&self, index: usize) -> bool {
        self.batches
            .iter()
            .any(|b| b.column(index).logical_null_count() < b.num_rows())
    }

    /// Returns the schema.
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Returns the record batches.
    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    /// Consumes the table, returning its schema and batches.
    pub fn into_parts(self) -> (SchemaRef, Vec<RecordBatch>) {
        (self.schema, self.batches)
    }

    /// Total number of rows.
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }

    /// Number of columns.
    pub fn num_columns(&self) -> usize {
        self.schema.fields().len()
    }

    /// Column names in schema order.
    pub fn column_names(&self) -> Vec<String> {
        self.schema
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    /// True when the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    /// Concatenates all batches into one.
    pub fn to_batch(&self) -> Result<RecordBatch> {
        Ok(concat_batches(&self.schema, &self.batches)?)
    }
}

fn resolve_schema(tables: &[UnifiedTable]) -> Result<SchemaRef> {
    let first = &tables[0].schema;
    let mismatch = |found: &Schema| IngestError::SchemaMismatch {
        expected: describe(first),
        found: describe(found),
    };

    for table in &tables[1..] {
        let same_names = table.schema.fields().len() == first.fields().len()
            && table
                .schema
                .fields()
                .iter()
                .zip(first.fields())
                .all(|(a, b)| a.name() == b.name());
        if !same_names {
            return Err(mismatch(table.schema.as_ref()));
        }
    }

    let mut fields = Vec::with_capacity(first.fields().len());
    for (index, field) in first.fields().iter().enumerate() {
        let mut resolved: Option<DataType> = None;
        let mut nullable = false;
        for table in tables {
            let candidate = table.schema.field(index);
            nullable |= candidate.is_nullable();
            if candidate.data_type() == &DataType::Null || !table.has_values(index) {
                continue;
            }
            resolved = Some(match resolved {
                None => candidate.data_type().clone(),
                Some(current) => widen(&current, candidate.data_type())
                    .ok_or_else(|| mismatch(table.schema.as_ref()))?,
            });
        }
        let data_type = resolved.unwrap_or_else(|| field.data_type().clone());
        fields.push(Field::new(field.name(), data_type, nullable));
    }
    Ok(Arc::new(Schema::new(fields)))
}

fn widen(a: &DataType, b: &DataType) -> Option<DataType> {
    if a == b {
        Some(a.clone())
    } else if a.is_integer() && b.is_integer() {
        Some(DataType::Int64)
    } else if a.is_numeric() && b.is_numeric() {
        Some(DataType::Float64)
    } else if a == &DataType::Utf8 || b == &DataType::Utf8 {
        Some(DataType::Utf8)
    } else {
        None
    }
}

fn conform(batch: RecordBatch, schema: &SchemaRef) -> Result<RecordBatch> {
    if batch.schema().fields() == schema.fields() {
        return Ok(batch);
    }
    let columns = batch
        .columns()
        .iter()
        .zip(schema.fields())
        .map(|(column, field)| {
            if column.data_type() == field.data_type() {
                Ok(column.clone())
            } else {
                cast(column, field.data_type())
            }
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(RecordBatch::try_new(schema.clone(), columns)?)
}

fn describe(schema: &Schema) -> String {
    schema
        .fields()
        .iter()
        .map(|f| format!("{}: {}", f.name(), f.data_type()))
        .collect::<Vec<_>>()
        .join(", ")
}
