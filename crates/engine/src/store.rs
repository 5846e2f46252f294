//! Prediction persistence
//!
//! Storage is an opaque collaborator behind [`PredictionStore`]: the engine
//! never embeds query logic. Records are scoped to the requesting user and
//! listed newest first. [`MemoryStore`] is the process-local default.

use crate::error::{EngineError, Result};
use crate::models::{PredictionRecord, PredictionResult, StoreStats};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[async_trait]
pub trait PredictionStore: Send + Sync {
    /// Persist a result for a user, returning the new record id
    async fn save(&self, user_id: &str, result: &PredictionResult) -> Result<u64>;

    /// Saved records for a user, newest first
    async fn list(
        &self,
        user_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<PredictionRecord>>;

    async fn get(&self, user_id: &str, id: u64) -> Result<PredictionRecord>;

    async fn delete(&self, user_id: &str, id: u64) -> Result<()>;

    /// Aggregate numbers over a user's saved predictions
    async fn stats(&self, user_id: &str) -> Result<StoreStats>;
}

/// Process-local store backed by a concurrent map, keyed by user
#[derive(Default)]
pub struct MemoryStore {
    records: DashMap<String, Vec<PredictionRecord>>,
    next_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PredictionStore for MemoryStore {
    async fn save(&self, user_id: &str, result: &PredictionResult) -> Result<u64> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let record = PredictionRecord {
            id,
            user_id: user_id.to_string(),
            app_name: result.app_name.clone(),
            model_used: result.model_used.clone(),
            predicted_longevity_days: result.predicted_longevity_days,
            created_at: Utc::now(),
            result: result.clone(),
        };
        self.records.entry(user_id.to_string()).or_default().push(record);
        Ok(id)
    }

    async fn list(
        &self,
        user_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<PredictionRecord>> {
        let records = match self.records.get(user_id) {
            Some(records) => records,
            None => return Ok(Vec::new()),
        };
        Ok(records
            .iter()
            .rev()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get(&self, user_id: &str, id: u64) -> Result<PredictionRecord> {
        self.records
            .get(user_id)
            .and_then(|records| records.iter().find(|r| r.id == id).cloned())
            .ok_or(EngineError::RecordNotFound { id })
    }

    async fn delete(&self, user_id: &str, id: u64) -> Result<()> {
        let mut records = self
            .records
            .get_mut(user_id)
            .ok_or(EngineError::RecordNotFound { id })?;
        let position = records
            .iter()
            .position(|r| r.id == id)
            .ok_or(EngineError::RecordNotFound { id })?;
        records.remove(position);
        Ok(())
    }

    async fn stats(&self, user_id: &str) -> Result<StoreStats> {
        let records = match self.records.get(user_id) {
            Some(records) => records,
            None => {
                return Ok(StoreStats {
                    total: 0,
                    last_30_days: 0,
                    average_days: None,
                })
            }
        };

        let cutoff = Utc::now() - Duration::days(30);
        let total = records.len() as u64;
        let last_30_days = records.iter().filter(|r| r.created_at > cutoff).count() as u64;
        let average_days = if records.is_empty() {
            None
        } else {
            let sum: f64 = records.iter().map(|r| r.predicted_longevity_days).sum();
            Some(sum / records.len() as f64)
        };

        Ok(StoreStats {
            total,
            last_30_days,
            average_days,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insights;

    fn result(app: &str, days: f64) -> PredictionResult {
        PredictionResult {
            app_name: app.to_string(),
            model_used: "rf_model".to_string(),
            predicted_longevity_days: days,
            predicted_longevity_months: days / 30.44,
            predicted_longevity_years: days / 30.44 / 12.0,
            warnings: Vec::new(),
            base_predictions: None,
            interpretation: insights::interpret(days),
            contributing_factors: None,
            recommendations: Vec::new(),
            compare_competitors: false,
            analyzed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_save_and_get_roundtrip() {
        let store = MemoryStore::new();
        let id = store.save("alice", &result("Notes", 400.0)).await.unwrap();

        let record = store.get("alice", id).await.unwrap();
        assert_eq!(record.app_name, "Notes");
        assert_eq!(record.user_id, "alice");
        assert_eq!(record.predicted_longevity_days, 400.0);
    }

    #[tokio::test]
    async fn test_list_is_newest_first_with_paging() {
        let store = MemoryStore::new();
        for (app, days) in [("A", 100.0), ("B", 200.0), ("C", 300.0)] {
            store.save("alice", &result(app, days)).await.unwrap();
        }

        let all = store.list("alice", 0, 10).await.unwrap();
        let names: Vec<&str> = all.iter().map(|r| r.app_name.as_str()).collect();
        assert_eq!(names, vec!["C", "B", "A"]);

        let page = store.list("alice", 1, 1).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].app_name, "B");
    }

    #[tokio::test]
    async fn test_records_are_scoped_per_user() {
        let store = MemoryStore::new();
        let alice_id = store.save("alice", &result("Notes", 100.0)).await.unwrap();
        store.save("bob", &result("Games", 200.0)).await.unwrap();

        assert_eq!(store.list("alice", 0, 10).await.unwrap().len(), 1);
        assert_eq!(store.list("bob", 0, 10).await.unwrap().len(), 1);
        assert!(store.get("bob", alice_id).await.is_err());
    }

    #[tokio::test]
    async fn test_get_and_delete_unknown_id() {
        let store = MemoryStore::new();
        store.save("alice", &result("Notes", 100.0)).await.unwrap();

        assert!(matches!(
            store.get("alice", 999).await.unwrap_err(),
            EngineError::RecordNotFound { id: 999 }
        ));
        assert!(matches!(
            store.delete("alice", 999).await.unwrap_err(),
            EngineError::RecordNotFound { id: 999 }
        ));
    }

    #[tokio::test]
    async fn test_delete_removes_record() {
        let store = MemoryStore::new();
        let id = store.save("alice", &result("Notes", 100.0)).await.unwrap();

        store.delete("alice", id).await.unwrap();
        assert!(store.get("alice", id).await.is_err());
        assert!(store.list("alice", 0, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stats_aggregates() {
        let store = MemoryStore::new();
        let empty = store.stats("alice").await.unwrap();
        assert_eq!(empty.total, 0);
        assert!(empty.average_days.is_none());

        store.save("alice", &result("A", 100.0)).await.unwrap();
        store.save("alice", &result("B", 300.0)).await.unwrap();

        let stats = store.stats("alice").await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.last_30_days, 2);
        assert_eq!(stats.average_days, Some(200.0));
    }
}
