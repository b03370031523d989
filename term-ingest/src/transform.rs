//! Pure transformations applied to a partition's combined table.
//!
//! A [`TableTransform`] must be deterministic: the same table and
//! [`TransformContext`] always produce the same output. Wall-clock time is
//! never read inside a transform; when a timestamp is needed it comes from
//! the context.

use std::fmt::Debug;
use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanArray, TimestampMillisecondArray};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use datafusion::prelude::{SessionConfig, SessionContext};
use tracing::{debug, instrument};

use crate::error::{IngestError, Result};
use crate::partition::PartitionId;
use crate::table::UnifiedTable;

/// Name of the flag column added by the default transform.
pub const DEFAULT_FLAG_COLUMN: &str = "is_processed";

/// Inputs a transform may depend on besides the table itself.
#[derive(Debug, Clone)]
pub struct TransformContext {
    pub partition_id: PartitionId,
    pub processed_at: DateTime<Utc>,
}

/// A pure, deterministic table transformation.
#[async_trait]
pub trait TableTransform: Debug + Send + Sync {
    /// Short name used in logs and error messages.
    fn name(&self) -> &str;

    /// Transforms `table`.
    async fn apply(&self, table: UnifiedTable, ctx: &TransformContext) -> Result<UnifiedTable>;
}

/// Appends a column to every batch, deriving its values from the row count.
fn append_column<F>(table: UnifiedTable, field: Field, make: F) -> Result<UnifiedTable>
where
    F: Fn(usize) -> ArrayRef,
{
    if table.schema().field_with_name(field.name()).is_ok() {
        return Err(IngestError::Internal(format!(
            "column '{}' already exists",
            field.name()
        )));
    }

    let (schema, batches) = table.into_parts();
    let mut fields: Vec<Field> = schema.fields().iter().map(|f| f.as_ref().clone()).collect();
    fields.push(field);
    let schema = Arc::new(Schema::new_with_metadata(fields, schema.metadata().clone()));

    let batches = batches
        .into_iter()
        .map(|batch| {
            let mut columns = batch.columns().to_vec();
            columns.push(make(batch.num_rows()));
            RecordBatch::try_new(schema.clone(), columns)
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;

    UnifiedTable::from_batches(schema, batches)
}

/// Adds a constant boolean column marking every row as processed.
#[derive(Debug, Clone)]
pub struct FlagColumn {
    column: String,
    value: bool,
}

impl Default for FlagColumn {
    fn default() -> Self {
        Self::new(DEFAULT_FLAG_COLUMN)
    }
}

impl FlagColumn {
    /// Creates a transform adding `column` set to `true`.
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            value: true,
        }
    }

    /// Sets the constant value.
    pub fn with_value(mut self, value: bool) -> Self {
        self.value = value;
        self
    }
}

#[async_trait]
impl TableTransform for FlagColumn {
    fn name(&self) -> &str {
        "flag_column"
    }

    async fn apply(&self, table: UnifiedTable, _ctx: &TransformContext) -> Result<UnifiedTable> {
        let value = self.value;
        append_column(
            table,
            Field::new(&self.column, DataType::Boolean, false),
            |rows| Arc::new(BooleanArray::from(vec![value; rows])) as ArrayRef,
        )
    }
}

/// Adds the commit timestamp from the context as a UTC timestamp column.
#[derive(Debug, Clone)]
pub struct TimestampColumn {
    column: String,
}

impl TimestampColumn {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
        }
    }
}

#[async_trait]
impl TableTransform for TimestampColumn {
    fn name(&self) -> &str {
        "timestamp_column"
    }

    async fn apply(&self, table: UnifiedTable, ctx: &TransformContext) -> Result<UnifiedTable> {
        let millis = ctx.processed_at.timestamp_millis();
        append_column(
            table,
            Field::new(
                &self.column,
                DataType::Timestamp(TimeUnit::Millisecond, Some("UTC".into())),
                false,
            ),
            |rows| {
                Arc::new(TimestampMillisecondArray::from(vec![millis; rows]).with_timezone("UTC"))
                    as ArrayRef
            },
        )
    }
}

/// Runs a SQL query over the table with DataFusion.
///
/// The table is registered under `table_name`; the query result becomes the
/// output. Queries must not call volatile functions such as `now()` or
/// `random()`. Execution is pinned to a single partition so that row order
/// is preserved for queries that don't reorder rows.
#[derive(Debug, Clone)]
pub struct SqlTransform {
    table_name: String,
    query: String,
}

impl SqlTransform {
    /// Creates a transform running `query` against a table named `partition_data`.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            table_name: "partition_data".to_string(),
            query: query.into(),
        }
    }

    /// Sets the name the input table is registered under.
    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = table_name.into();
        self
    }
}

#[async_trait]
impl TableTransform for SqlTransform {
    fn name(&self) -> &str {
        "sql"
    }

    #[instrument(skip(self, table, ctx), fields(partition.id = %ctx.partition_id, rows = table.num_rows()))]
    async fn apply(&self, table: UnifiedTable, ctx: &TransformContext) -> Result<UnifiedTable> {
        if table.is_empty() {
            return Ok(table);
        }

        let session = SessionContext::new_with_config(SessionConfig::new().with_target_partitions(1));
        session.register_batch(&self.table_name, table.to_batch()?)?;

        let df = session.sql(&self.query).await?;
        let schema = df.schema().inner().clone();
        let batches = df.collect().await?;

        debug!(batches = batches.len(), "Executed SQL transform");
        UnifiedTable::from_batches(schema, batches)
    }
}

/// Applies transforms in order.
#[derive(Debug, Default)]
pub struct TransformChain {
    transforms: Vec<Arc<dyn TableTransform>>,
}

impl TransformChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a transform to the chain.
    pub fn then(mut self, transform: impl TableTransform + 'static) -> Self {
        self.transforms.push(Arc::new(transform));
        self
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
}

#[async_trait]
impl TableTransform for TransformChain {
    fn name(&self) -> &str {
        "chain"
    }

    async fn apply(&self, mut table: UnifiedTable, ctx: &TransformContext) -> Result<UnifiedTable> {
        for transform in &self.transforms {
            table = transform.apply(table, ctx).await.map_err(|e| {
                IngestError::Internal(format!("{} failed: {e}", transform.name()))
            })?;
        }
        Ok(table)
    }
}
