//! Persistence for finished analyses.
//!
//! Results are stored as JSON documents under `analysis_{bookId}_{type}`
//! keys. The service treats a failed save as a warning, never as a failed
//! analysis.

pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use crate::types::{AnalysisType, Result, analysis_key};

pub use memory::MemoryStore;
pub use sqlite::{PoolConfig, SqliteStore};

/// Key-value sink for persisted analysis results
pub trait AnalysisStore: Send + Sync {
    /// Insert or replace the value stored at `key`
    fn save(&self, key: &str, value: &serde_json::Value) -> Result<()>;

    fn load(&self, key: &str) -> Result<Option<serde_json::Value>>;

    /// Returns whether a value was removed
    fn remove(&self, key: &str) -> Result<bool>;

    /// Remove every key starting with `prefix`, returning how many were removed
    fn remove_prefix(&self, prefix: &str) -> Result<usize>;

    /// Keys starting with `prefix`, sorted
    fn keys(&self, prefix: &str) -> Result<Vec<String>>;
}

pub type SharedStore = Arc<dyn AnalysisStore>;

/// Delete persisted results for one book, or every persisted result.
///
/// A single book is removed key by key so that `b1` never matches `b10`.
pub fn remove_analyses(store: &dyn AnalysisStore, book_id: Option<&str>) -> Result<usize> {
    match book_id {
        Some(id) => {
            let mut removed = 0;
            for analysis_type in AnalysisType::ALL {
                if store.remove(&analysis_key(id, analysis_type))? {
                    removed += 1;
                }
            }
            Ok(removed)
        }
        None => store.remove_prefix("analysis_"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_remove_one_book_leaves_similar_ids() {
        let store = MemoryStore::new();
        store
            .save(&analysis_key("b1", AnalysisType::Summary), &json!({}))
            .unwrap();
        store
            .save(&analysis_key("b1", AnalysisType::Style), &json!({}))
            .unwrap();
        store
            .save(&analysis_key("b10", AnalysisType::Summary), &json!({}))
            .unwrap();

        assert_eq!(remove_analyses(&store, Some("b1")).unwrap(), 2);
        assert_eq!(store.keys("analysis_").unwrap(), vec!["analysis_b10_summary"]);
    }

    #[test]
    fn test_remove_all_analyses() {
        let store = MemoryStore::new();
        store.save("analysis_b1_themes", &json!({})).unwrap();
        store.save("analysis_b2_themes", &json!({})).unwrap();
        store.save("unrelated", &json!({})).unwrap();

        assert_eq!(remove_analyses(&store, None).unwrap(), 2);
        assert_eq!(store.keys("").unwrap(), vec!["unrelated"]);
    }
}
