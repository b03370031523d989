//! Partition identity, naming and discovery.
//!
//! Source data is grouped under key prefixes of the form
//! `<prefix><separator><PartitionId>/`, e.g. `football-2023-03-19/`. A
//! [`PartitionId`] is ordered lexically, so the naming convention must make
//! lexical order agree with logical order. Zero-padded `YYYY-MM-DD` dates do.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{IngestError, Result};
use crate::security::KeySecurity;

mod catalog;

pub use catalog::PartitionCatalog;

/// Date format of partition ids in the calendar-date deployment.
pub const PARTITION_DATE_FORMAT: &str = "%Y-%m-%d";

/// Identifier of one partition.
///
/// Opaque apart from its ordering, which is plain string order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PartitionId(String);

impl PartitionId {
    /// Creates a partition id, rejecting values that cannot be a key segment.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        KeySecurity::validate_segment(&id)
            .map_err(|e| IngestError::Configuration(format!("Invalid partition id: {e}")))?;
        Ok(Self(id))
    }

    /// Creates the id of a calendar-date partition.
    pub fn from_date(date: NaiveDate) -> Self {
        Self(date.format(PARTITION_DATE_FORMAT).to_string())
    }

    /// Interprets the id as a calendar date, if it is one.
    pub fn as_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&self.0, PARTITION_DATE_FORMAT).ok()
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PartitionId {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for PartitionId {
    type Error = IngestError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<PartitionId> for String {
    fn from(id: PartitionId) -> Self {
        id.0
    }
}

/// The object keys belonging to one partition at discovery time.
///
/// Keys are sorted ascending and contain only data files. An empty manifest
/// is valid and combines into an empty table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionManifest {
    partition_id: PartitionId,
    keys: Vec<String>,
}

impl PartitionManifest {
    /// Creates a manifest; keys are sorted and deduplicated.
    pub fn new(partition_id: PartitionId, mut keys: Vec<String>) -> Self {
        keys.sort();
        keys.dedup();
        Self { partition_id, keys }
    }

    /// The partition this manifest belongs to.
    pub fn partition_id(&self) -> &PartitionId {
        &self.partition_id
    }

    /// Data keys in ascending order.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// True when the partition holds no data files.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Number of data files.
    pub fn len(&self) -> usize {
        self.keys.len()
    }
}

/// The naming convention that maps source folders to partitions.
#[derive(Debug, Clone)]
pub struct PartitionNaming {
    prefix: String,
    separator: String,
    id_pattern: Option<Regex>,
}

impl Default for PartitionNaming {
    fn default() -> Self {
        Self {
            prefix: "football".to_string(),
            separator: "-".to_string(),
            id_pattern: Some(date_pattern()),
        }
    }
}

fn date_pattern() -> Regex {
    Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("date pattern is valid")
}

impl PartitionNaming {
    /// Creates a convention for `<prefix><separator><id>/` folders with
    /// calendar-date ids.
    pub fn new(prefix: impl Into<String>, separator: impl Into<String>) -> Result<Self> {
        let prefix = prefix.into();
        let separator = separator.into();
        KeySecurity::validate_segment(&format!("{prefix}{separator}x"))
            .map_err(|e| IngestError::Configuration(format!("Invalid partition naming: {e}")))?;
        Ok(Self {
            prefix,
            separator,
            id_pattern: Some(date_pattern()),
        })
    }

    /// Restricts ids to those matching `pattern`.
    pub fn with_id_pattern(mut self, pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|e| {
            IngestError::Configuration(format!("Invalid partition id pattern '{pattern}': {e}"))
        })?;
        self.id_pattern = Some(regex);
        Ok(self)
    }

    /// Accepts any id that is a valid key segment.
    pub fn with_any_id(mut self) -> Self {
        self.id_pattern = None;
        self
    }

    /// The literal folder prefix, e.g. `football`.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The folder name prefix shared by every partition, e.g. `football-`.
    pub fn folder_prefix(&self) -> String {
        format!("{}{}", self.prefix, self.separator)
    }

    /// The key prefix holding a partition's files, e.g. `football-2023-03-19/`.
    pub fn folder_for(&self, id: &PartitionId) -> String {
        format!("{}{}{}/", self.prefix, self.separator, id)
    }

    /// Parses a top-level folder name into a partition id.
    ///
    /// Returns `None` for names that do not follow the convention.
    pub fn parse_folder(&self, folder: &str) -> Option<PartitionId> {
        let folder = folder.strip_suffix('/').unwrap_or(folder);
        let id = folder.strip_prefix(&self.folder_prefix())?;
        if let Some(pattern) = &self.id_pattern {
            if !pattern.is_match(id) {
                return None;
            }
        }
        PartitionId::new(id).ok()
    }
}
