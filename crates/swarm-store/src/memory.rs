//! In-process record store.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, PoisonError};

use serde_json::Value;

use crate::persistence::RecordStore;
use crate::types::{Namespace, Result};

/// A `RecordStore` that keeps everything in memory. Useful for tests and for
/// short-lived coordinators that do not need durability.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<Namespace, BTreeMap<String, Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of records across all namespaces.
    pub fn len(&self) -> usize {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.values().map(|ns| ns.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RecordStore for MemoryStore {
    fn put(&self, namespace: &Namespace, id: &str, record: &Value) -> Result<()> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records
            .entry(namespace.clone())
            .or_default()
            .insert(id.to_string(), record.clone());
        Ok(())
    }

    fn get(&self, namespace: &Namespace, id: &str) -> Result<Option<Value>> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records.get(namespace).and_then(|ns| ns.get(id)).cloned())
    }

    fn delete(&self, namespace: &Namespace, id: &str) -> Result<bool> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records
            .get_mut(namespace)
            .map(|ns| ns.remove(id).is_some())
            .unwrap_or(false))
    }

    fn scan(&self, namespace: &Namespace) -> Result<Vec<Result<Value>>> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records
            .get(namespace)
            .map(|ns| ns.values().cloned().map(Ok).collect())
            .unwrap_or_default())
    }

    fn children(&self, namespace: &Namespace) -> Result<Vec<String>> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let depth = namespace.segments().len();
        let names: BTreeSet<String> = records
            .iter()
            .filter(|(ns, entries)| {
                !entries.is_empty()
                    && ns.segments().len() > depth
                    && ns.segments()[..depth] == namespace.segments()[..]
            })
            .map(|(ns, _)| ns.segments()[depth].clone())
            .collect();
        Ok(names.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        let ns = Namespace::new("memory/lore/debugging");
        store.put(&ns, "l-1", &json!({"title": "x"})).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&ns, "l-1").unwrap(), Some(json!({"title": "x"})));
        assert_eq!(
            store.children(&Namespace::new("memory/lore")).unwrap(),
            vec!["debugging".to_string()]
        );
        assert_eq!(store.list(&ns).unwrap().len(), 1);
        assert!(store.delete(&ns, "l-1").unwrap());
        assert!(store.is_empty());
    }
}
