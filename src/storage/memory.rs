//! In-process store, used when persistence is disabled and in tests.

use dashmap::DashMap;

use super::AnalysisStore;
use crate::types::Result;

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, serde_json::Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl AnalysisStore for MemoryStore {
    fn save(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        self.entries.insert(key.to_string(), value.clone());
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    fn remove_prefix(&self, prefix: &str) -> Result<usize> {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        Ok(before - self.entries.len())
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_save_load_remove() {
        let store = MemoryStore::new();
        store.save("analysis_b1_summary", &json!({"content": "x"})).unwrap();

        assert_eq!(
            store.load("analysis_b1_summary").unwrap(),
            Some(json!({"content": "x"}))
        );
        assert!(store.remove("analysis_b1_summary").unwrap());
        assert!(!store.remove("analysis_b1_summary").unwrap());
        assert!(store.load("analysis_b1_summary").unwrap().is_none());
    }

    #[test]
    fn test_remove_prefix() {
        let store = MemoryStore::new();
        store.save("analysis_b1_summary", &json!(1)).unwrap();
        store.save("analysis_b1_themes", &json!(2)).unwrap();
        store.save("analysis_b2_summary", &json!(3)).unwrap();

        assert_eq!(store.remove_prefix("analysis_b1_").unwrap(), 2);
        assert_eq!(store.keys("analysis_").unwrap(), vec!["analysis_b2_summary"]);
    }
}
