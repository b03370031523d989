//! Encoding and decoding of tabular objects.
//!
//! This module converts raw object bytes into [`UnifiedTable`]s and back.
//! Two formats are supported: delimited text (CSV) and compressed columnar
//! (Parquet). The caller selects the format; [`TableFormat::from_key`] derives
//! it from an object key's extension.

use std::fmt::{self, Debug};
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{IngestError, Result};
use crate::table::UnifiedTable;

mod csv;
mod parquet;

pub use csv::CsvOptions;
pub use parquet::ParquetOptions;

/// File formats understood by the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableFormat {
    /// Comma (or otherwise) delimited text with a header row
    Csv,
    /// Apache Parquet
    Parquet,
}

impl TableFormat {
    /// Returns the file extension for this format, without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Parquet => "parquet",
        }
    }

    /// Detects the format from an object key's extension.
    ///
    /// Returns `None` for keys that are not data files, including folder
    /// markers and extension-less objects.
    pub fn from_key(key: &str) -> Option<Self> {
        let name = key.rsplit('/').next()?;
        let (_, ext) = name.rsplit_once('.')?;
        match ext.to_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "parquet" | "pq" => Some(Self::Parquet),
            _ => None,
        }
    }
}

impl fmt::Display for TableFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for TableFormat {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "parquet" => Ok(Self::Parquet),
            other => Err(IngestError::Configuration(format!(
                "Unsupported table format '{other}', expected 'csv' or 'parquet'"
            ))),
        }
    }
}

/// Converts between raw bytes and tables.
pub trait TableCodec: Debug + Send + Sync {
    /// Decodes an object's bytes into a table.
    fn decode(&self, data: &Bytes, format: TableFormat) -> Result<UnifiedTable>;

    /// Encodes a table into bytes.
    fn encode(&self, table: &UnifiedTable, format: TableFormat) -> Result<Bytes>;
}

/// Arrow-based implementation of [`TableCodec`].
///
/// # Examples
///
/// ```rust
/// use term_ingest::codec::{ArrowTableCodec, TableCodec, TableFormat};
///
/// let codec = ArrowTableCodec::default();
/// let table = codec
///     .decode(&"col1\nx\ny\n".into(), TableFormat::Csv)
///     .unwrap();
/// assert_eq!(table.num_rows(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ArrowTableCodec {
    csv: CsvOptions,
    parquet: ParquetOptions,
}

impl ArrowTableCodec {
    /// Creates a codec with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the CSV options.
    pub fn with_csv_options(mut self, options: CsvOptions) -> Self {
        self.csv = options;
        self
    }

    /// Sets the Parquet options.
    pub fn with_parquet_options(mut self, options: ParquetOptions) -> Self {
        self.parquet = options;
        self
    }
}

impl TableCodec for ArrowTableCodec {
    fn decode(&self, data: &Bytes, format: TableFormat) -> Result<UnifiedTable> {
        if data.is_empty() {
            return Ok(UnifiedTable::empty());
        }
        match format {
            TableFormat::Csv => csv::decode(data, &self.csv),
            TableFormat::Parquet => parquet::decode(data, &self.parquet),
        }
    }

    fn encode(&self, table: &UnifiedTable, format: TableFormat) -> Result<Bytes> {
        match format {
            TableFormat::Csv => csv::encode(table, &self.csv),
            TableFormat::Parquet => parquet::encode(table, &self.parquet),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_key() {
        assert_eq!(
            TableFormat::from_key("football-2023-03-19/data1.csv"),
            Some(TableFormat::Csv)
        );
        assert_eq!(
            TableFormat::from_key("football-2023-03-19/DATA.CSV"),
            Some(TableFormat::Csv)
        );
        assert_eq!(
            TableFormat::from_key("football-2023-03-19/part-0.parquet"),
            Some(TableFormat::Parquet)
        );
        assert_eq!(TableFormat::from_key("football-2023-03-19/"), None);
        assert_eq!(TableFormat::from_key("football-2023-03-19/_SUCCESS"), None);
        assert_eq!(TableFormat::from_key("football.v2/readme"), None);
    }

    #[test]
    fn test_format_parse_and_display() {
        assert_eq!("CSV".parse::<TableFormat>().unwrap(), TableFormat::Csv);
        assert_eq!(
            "parquet".parse::<TableFormat>().unwrap(),
            TableFormat::Parquet
        );
        assert!("avro".parse::<TableFormat>().is_err());
        assert_eq!(TableFormat::Parquet.to_string(), "parquet");
    }

    #[test]
    fn test_empty_object_decodes_to_empty_table() {
        let codec = ArrowTableCodec::new();
        for format in [TableFormat::Csv, TableFormat::Parquet] {
            let table = codec.decode(&Bytes::new(), format).unwrap();
            assert!(table.is_empty());
            assert_eq!(table.num_columns(), 0);
        }
    }
}
