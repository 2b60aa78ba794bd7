//! Persistence trait for record storage.
//!
//! This module defines the trait that any storage backend must implement to
//! hold coordination records, plus typed helpers layered on top of it.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::types::{Namespace, Result, StoreError};

/// Trait for keyed-document persistence.
///
/// Records are JSON documents addressed by a namespace and an id. The trait
/// works on `serde_json::Value` so it stays object safe; use
/// [`RecordStoreExt`] for typed access.
pub trait RecordStore: Send + Sync {
    /// Write (or overwrite) a record. A backend must never expose a
    /// partially written record.
    fn put(&self, namespace: &Namespace, id: &str, record: &Value) -> Result<()>;

    /// Read a record back. Missing records are `Ok(None)`.
    fn get(&self, namespace: &Namespace, id: &str) -> Result<Option<Value>>;

    /// Delete a record, returning whether it existed.
    fn delete(&self, namespace: &Namespace, id: &str) -> Result<bool>;

    /// Enumerate the records directly inside a namespace, ordered by stored name.
    ///
    /// Each entry is the outcome of reading one record so that callers can
    /// decide what to do with unreadable ones.
    fn scan(&self, namespace: &Namespace) -> Result<Vec<Result<Value>>>;

    /// Names of the sub-namespaces directly below a namespace.
    fn children(&self, namespace: &Namespace) -> Result<Vec<String>>;

    /// Enumerate a namespace, skipping (and logging) records that cannot be
    /// read.
    fn list(&self, namespace: &Namespace) -> Result<Vec<Value>> {
        Ok(self
            .scan(namespace)?
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!("Skipping unreadable record: {}", e);
                    None
                }
            })
            .collect())
    }
}

/// Typed access to a [`RecordStore`].
pub trait RecordStoreExt: RecordStore {
    /// Serialize and store a record.
    fn put_record<T: Serialize>(&self, namespace: &Namespace, id: &str, record: &T) -> Result<()> {
        let value = serde_json::to_value(record)?;
        self.put(namespace, id, &value)
    }

    /// Load a record; a document that no longer matches `T` is treated as
    /// absent and logged.
    fn get_record<T: DeserializeOwned>(&self, namespace: &Namespace, id: &str) -> Result<Option<T>> {
        match self.get(namespace, id)? {
            Some(value) => match decode(namespace, id, value) {
                Ok(record) => Ok(Some(record)),
                Err(e) => {
                    warn!("Treating record as absent: {}", e);
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    /// Load every record in a namespace that decodes as `T`.
    fn list_records<T: DeserializeOwned>(&self, namespace: &Namespace) -> Result<Vec<T>> {
        Ok(self
            .list(namespace)?
            .into_iter()
            .filter_map(|value| match decode(namespace, "<listed>", value) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("Skipping record: {}", e);
                    None
                }
            })
            .collect())
    }

    /// Load every record in every sub-namespace of `namespace`.
    fn list_nested<T: DeserializeOwned>(&self, namespace: &Namespace) -> Result<Vec<T>> {
        let mut records = Vec::new();
        for child in self.children(namespace)? {
            records.extend(self.list_records(&namespace.stored_child(&child))?);
        }
        Ok(records)
    }
}

impl<S: RecordStore + ?Sized> RecordStoreExt for S {}

fn decode<T: DeserializeOwned>(namespace: &Namespace, id: &str, value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| StoreError::Corrupt {
        namespace: namespace.to_string(),
        id: id.to_string(),
        reason: e.to_string(),
    })
}
