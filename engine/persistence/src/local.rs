//! Local file-based record store construction

use crate::backend::LocalRecordStore;
use crate::config::PersistenceConfig;
use crate::error::Result;

/// Create a new local record store with default configuration
pub fn create_local_store(data_dir: impl Into<std::path::PathBuf>) -> Result<LocalRecordStore> {
    LocalRecordStore::with_default_config(data_dir)
}

/// Create a new local record store with custom configuration
pub fn create_local_store_with_config(config: PersistenceConfig) -> Result<LocalRecordStore> {
    LocalRecordStore::new(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordSink;
    use crate::record::{EntityKey, UpsertOutcome};
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_store_creation() {
        let temp_dir = TempDir::new().unwrap();

        let store = create_local_store(temp_dir.path()).unwrap();
        assert_eq!(store.config().data_dir, temp_dir.path().to_path_buf());
    }

    #[tokio::test]
    async fn test_local_store_requires_initialization() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_local_store(temp_dir.path()).unwrap();
        let key = EntityKey::parse("league/1").unwrap();

        assert!(store.upsert(&key, "league", json!({})).await.is_err());

        store.initialize().await.unwrap();
        assert!(store.records_dir().exists());
        assert!(store.upsert(&key, "league", json!({})).await.is_ok());
    }

    #[tokio::test]
    async fn test_local_upsert_is_idempotent_across_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let key = EntityKey::parse("league/1/season/2021/week/7/matchup/3-8").unwrap();
        let data = json!({"home_score": "101.5", "away_score": "99.2"});

        {
            let store = create_local_store(temp_dir.path()).unwrap();
            store.initialize().await.unwrap();
            assert_eq!(store.upsert(&key, "matchup", data.clone()).await.unwrap(), UpsertOutcome::Inserted);
        }

        let store = create_local_store(temp_dir.path()).unwrap();
        store.initialize().await.unwrap();
        assert!(store.exists(&key).await.unwrap());
        assert_eq!(store.upsert(&key, "matchup", data.clone()).await.unwrap(), UpsertOutcome::Unchanged);

        let stored = store.get(&key).await.unwrap().unwrap();
        assert_eq!(stored.data, data);
        assert_eq!(stored.kind, "matchup");
        assert!(temp_dir
            .path()
            .join("records/league/1/season/2021/week/7/matchup/3-8.json")
            .is_file());
    }

    #[tokio::test]
    async fn test_local_keys_lists_nested_records() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_local_store(temp_dir.path()).unwrap();
        store.initialize().await.unwrap();

        for raw in ["league/1", "league/1/season/2021", "league/1/season/2021/team/4"] {
            store.upsert(&EntityKey::parse(raw).unwrap(), "x", json!(raw)).await.unwrap();
        }

        let all = store.keys("league/1").await.unwrap();
        assert_eq!(all.len(), 3);
        let season = store.keys("league/1/season").await.unwrap();
        assert_eq!(season.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_upserts_on_distinct_keys() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(create_local_store(temp_dir.path()).unwrap());
        store.initialize().await.unwrap();

        let mut handles = Vec::new();
        for season in 2018..2024 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let key = EntityKey::parse(format!("league/1/season/{season}")).unwrap();
                store.upsert(&key, "season", json!({ "season": season })).await.unwrap()
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), UpsertOutcome::Inserted);
        }
        assert_eq!(store.keys("league/1/season").await.unwrap().len(), 6);
    }
}
