/*!
 An in-memory record store, for embedders that already hold the archive's
 records and for building test fixtures.
*/

use std::collections::HashMap;

use crate::{container::RecordStore, error::container::ContainerError};

/// Serves records from a map of name to bytes
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: HashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record, replacing any existing record of the same name
    pub fn insert(&mut self, name: &str, data: Vec<u8>) {
        self.records.insert(name.to_string(), data);
    }
}

impl RecordStore for MemoryStore {
    fn record(&self, name: &str) -> Result<Vec<u8>, ContainerError> {
        self.records
            .get(name)
            .cloned()
            .ok_or_else(|| ContainerError::RecordNotFound(name.to_string()))
    }

    fn has_record(&self, name: &str) -> bool {
        self.records.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use crate::{container::memory::MemoryStore, container::RecordStore, error::container::ContainerError};

    #[test]
    fn can_fetch_records_repeatedly() {
        let mut store = MemoryStore::new();
        store.insert("data.pkl", vec![1, 2, 3]);

        let first = store.record("data.pkl").unwrap();
        let second = store.record("data.pkl").unwrap();

        assert_eq!(first, vec![1, 2, 3]);
        assert_eq!(first, second);
    }

    #[test]
    fn missing_record_is_not_found() {
        let store = MemoryStore::new();

        assert!(!store.has_record("data.pkl"));
        assert!(matches!(
            store.record("data.pkl"),
            Err(ContainerError::RecordNotFound(_))
        ));
    }
}
