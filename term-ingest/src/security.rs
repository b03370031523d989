//! Security utilities for the Term ingestion engine.
//!
//! This module provides credential handling and validation of the key
//! fragments the engine splices into object store keys.

use once_cell::sync::Lazy;
use regex::Regex;
use zeroize::ZeroizeOnDrop;

/// A secure string that automatically clears its contents when dropped.
#[derive(Clone, ZeroizeOnDrop)]
pub struct SecureString(String);

impl std::fmt::Debug for SecureString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecureString(***)")
    }
}

impl SecureString {
    /// Create a new secure string.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Get the string value. Use carefully and avoid storing the result.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

static KEY_SEGMENT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.\-]+$").expect("key segment pattern is valid"));

/// Maximum length of a single key segment.
pub const MAX_KEY_SEGMENT_LENGTH: usize = 255;

/// Validation of fragments that become part of object store keys.
pub struct KeySecurity;

impl KeySecurity {
    /// Validates a single key segment such as a partition id or a naming prefix.
    ///
    /// A valid segment is non-empty, at most [`MAX_KEY_SEGMENT_LENGTH`] bytes,
    /// contains only ASCII letters, digits, `_`, `.` and `-`, and is not a
    /// relative path component (`.` or `..`).
    ///
    /// # Examples
    /// ```rust
    /// use term_ingest::security::KeySecurity;
    ///
    /// assert!(KeySecurity::validate_segment("2023-03-19").is_ok());
    /// assert!(KeySecurity::validate_segment("../etc").is_err());
    /// ```
    pub fn validate_segment(segment: &str) -> std::result::Result<(), String> {
        if segment.is_empty() {
            return Err("segment cannot be empty".to_string());
        }
        if segment.len() > MAX_KEY_SEGMENT_LENGTH {
            return Err(format!(
                "segment exceeds {MAX_KEY_SEGMENT_LENGTH} characters"
            ));
        }
        if segment == "." || segment == ".." {
            return Err(format!("'{segment}' is a relative path component"));
        }
        if !KEY_SEGMENT_PATTERN.is_match(segment) {
            return Err(format!("'{segment}' contains characters not allowed in a key"));
        }
        Ok(())
    }
}
