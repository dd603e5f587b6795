//! The intermediate content document.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ContentError;

/// A single content item as returned by the CMS.
///
/// The schema is opaque apart from the conventional `sys` and `fields`
/// objects; templates decide what to read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Entry(Value);

impl Entry {
    /// Wrap a raw JSON entry.
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// The CMS identifier (`sys.id`), if present.
    pub fn id(&self) -> Option<&str> {
        self.0.pointer("/sys/id").and_then(Value::as_str)
    }

    /// Read `fields.<name>`.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.0.get("fields").and_then(|fields| fields.get(name))
    }

    /// The string value of the URL-bearing field.
    pub fn url(&self, field: &str) -> Option<&str> {
        self.field(field).and_then(Value::as_str)
    }

    /// Borrow the underlying JSON.
    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

impl From<Value> for Entry {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Mapping from content-type identifier to its entries, in fetch order.
///
/// Keys are kept sorted so the serialized document is byte-stable across
/// builds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentDocument {
    types: BTreeMap<String, Vec<Entry>>,
}

impl ContentDocument {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the entries for a content type, replacing any previous list.
    pub fn insert(&mut self, content_type: impl Into<String>, entries: Vec<Entry>) {
        self.types.insert(content_type.into(), entries);
    }

    /// Entries for a content type.
    pub fn get(&self, content_type: &str) -> Option<&[Entry]> {
        self.types.get(content_type).map(Vec::as_slice)
    }

    /// Iterate content types with their entries, in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Entry])> {
        self.types
            .iter()
            .map(|(name, entries)| (name.as_str(), entries.as_slice()))
    }

    /// Content-type identifiers present in the document.
    pub fn content_types(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Number of content types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Total number of entries across all content types.
    pub fn entry_count(&self) -> usize {
        self.types.values().map(Vec::len).sum()
    }

    /// Serialize as pretty-printed JSON.
    pub fn to_json_pretty(&self) -> Result<String, ContentError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the document to disk, overwriting any previous file.
    pub async fn write(&self, path: &Path) -> Result<(), ContentError> {
        let json = self.to_json_pretty()?;
        tokio::fs::write(path, json)
            .await
            .map_err(|e| io_error(path, e))?;
        tracing::debug!(
            "Wrote {} content types ({} entries) to {}",
            self.len(),
            self.entry_count(),
            path.display()
        );
        Ok(())
    }

    /// Read a document previously written with [`ContentDocument::write`].
    pub async fn read(path: &Path) -> Result<Self, ContentError> {
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| io_error(path, e))?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Delete the document file. Returns `false` if it did not exist.
    pub async fn remove(path: &Path) -> Result<bool, ContentError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error(path, e)),
        }
    }
}

fn io_error(path: &Path, source: io::Error) -> ContentError {
    ContentError::Io {
        path: PathBuf::from(path),
        source,
    }
}
