//! Type-checked access to BSON configuration documents.
//!
//! Configuration files are parsed into `bson::Document` values by the
//! surrounding runner. This module provides the typed getters used everywhere
//! a configuration value is consumed, with a uniform environment-variable
//! indirection pass for string values.
//!
//! # Contract
//! - A missing key is not an error: getters return `Ok(None)` and callers
//!   decide whether absence is fatal.
//! - A present value of the wrong type is logged at error severity (naming
//!   the key and the expected type) and returned as a configuration error.
//! - A string value beginning with `$` is resolved at read time by looking up
//!   the remainder as a process environment variable, so the same document
//!   can be reused across environments without modification.

use crate::error::MongoSimError;
use crate::Result;
use mongodb::bson::{Bson, Document};

/// Sentinel prefix marking a string value as an environment variable name.
const ENV_SENTINEL: char = '$';

/// Typed reader over a BSON configuration document.
///
/// # Example
/// ```rust
/// use mongodb::bson::doc;
/// use mongosim_core::config::ConfigReader;
///
/// let config = doc! { "tls": true, "tlsCAFile": "/etc/ssl/bundle.pem" };
/// let reader = ConfigReader::new(&config);
///
/// assert_eq!(reader.get_bool("tls").unwrap(), Some(true));
/// assert_eq!(reader.get_bool("missing").unwrap(), None);
/// assert!(reader.get_bool("tlsCAFile").is_err());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ConfigReader<'a> {
    doc: &'a Document,
}

impl<'a> ConfigReader<'a> {
    /// Creates a reader over the given configuration document.
    pub fn new(doc: &'a Document) -> Self {
        Self { doc }
    }

    /// Gets a boolean value.
    pub fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        match self.doc.get(key) {
            None => Ok(None),
            Some(Bson::Boolean(b)) => Ok(Some(*b)),
            Some(other) => Err(self.type_mismatch(key, "boolean", other)),
        }
    }

    /// Gets a string value, applying environment-variable indirection.
    ///
    /// A value of the form `$NAME` resolves to the contents of the `NAME`
    /// environment variable at read time. An unset variable reads as absent.
    pub fn get_str(&self, key: &str) -> Result<Option<String>> {
        match self.doc.get(key) {
            None => Ok(None),
            Some(Bson::String(s)) => Ok(resolve_env(key, s)),
            Some(other) => Err(self.type_mismatch(key, "string", other)),
        }
    }

    /// Gets a 32-bit integer value.
    pub fn get_i32(&self, key: &str) -> Result<Option<i32>> {
        match self.doc.get(key) {
            None => Ok(None),
            Some(Bson::Int32(i)) => Ok(Some(*i)),
            Some(other) => Err(self.type_mismatch(key, "integer", other)),
        }
    }

    /// Gets an integer value widened to 64 bits.
    pub fn get_i64(&self, key: &str) -> Result<Option<i64>> {
        match self.doc.get(key) {
            None => Ok(None),
            Some(Bson::Int32(i)) => Ok(Some(i64::from(*i))),
            Some(Bson::Int64(i)) => Ok(Some(*i)),
            Some(other) => Err(self.type_mismatch(key, "integer", other)),
        }
    }

    /// Gets a numeric value widened to a double.
    ///
    /// Integer inputs are widened to floating-point before use, so callers
    /// may supply either representation interchangeably.
    pub fn get_f64(&self, key: &str) -> Result<Option<f64>> {
        match self.doc.get(key) {
            None => Ok(None),
            Some(Bson::Double(d)) => Ok(Some(*d)),
            Some(Bson::Int32(i)) => Ok(Some(f64::from(*i))),
            Some(Bson::Int64(i)) => Ok(Some(*i as f64)),
            Some(other) => Err(self.type_mismatch(key, "number", other)),
        }
    }

    /// Gets an embedded document.
    pub fn get_document(&self, key: &str) -> Result<Option<&'a Document>> {
        match self.doc.get(key) {
            None => Ok(None),
            Some(Bson::Document(d)) => Ok(Some(d)),
            Some(other) => Err(self.type_mismatch(key, "document", other)),
        }
    }

    /// Gets an array value.
    pub fn get_array(&self, key: &str) -> Result<Option<&'a Vec<Bson>>> {
        match self.doc.get(key) {
            None => Ok(None),
            Some(Bson::Array(a)) => Ok(Some(a)),
            Some(other) => Err(self.type_mismatch(key, "array", other)),
        }
    }

    fn type_mismatch(&self, key: &str, expected: &str, found: &Bson) -> MongoSimError {
        tracing::error!(
            "Invalid configuration: expected {} value for parameter '{}', found {}",
            expected,
            key,
            bson_type_name(found)
        );
        MongoSimError::configuration(format!(
            "Expected {} value for config parameter '{}'",
            expected, key
        ))
    }
}

/// Maps a BSON value to its server-side type name, for diagnostics.
fn bson_type_name(value: &Bson) -> &'static str {
    match value {
        Bson::String(_) => "string",
        Bson::Int32(_) => "int32",
        Bson::Int64(_) => "int64",
        Bson::Double(_) => "double",
        Bson::Boolean(_) => "bool",
        Bson::Document(_) => "object",
        Bson::Array(_) => "array",
        Bson::Null => "null",
        _ => "other",
    }
}

/// Resolves the `$NAME` environment indirection form for a string value.
///
/// Plain strings pass through unchanged. Resolution happens at read time, not
/// at parse time.
fn resolve_env(key: &str, value: &str) -> Option<String> {
    match value.strip_prefix(ENV_SENTINEL) {
        None => Some(value.to_string()),
        Some(var) => match std::env::var(var) {
            Ok(resolved) => Some(resolved),
            Err(_) => {
                tracing::warn!(
                    "Environment variable '{}' referenced by config parameter '{}' is not set",
                    var,
                    key
                );
                None
            }
        },
    }
}
