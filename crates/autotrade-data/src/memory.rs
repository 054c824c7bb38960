//! In-memory repositories.

use async_trait::async_trait;
use autotrade_core::error::RepositoryError;
use autotrade_core::traits::{ActionRepository, AlgoRepository, HistoryRepository};
use autotrade_core::types::{ActionRequest, ActionStatus, AlgorithmConfig, HistoryRecord};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Action storage keeping insertion order.
#[derive(Debug, Default)]
pub struct InMemoryActionRepository {
    actions: RwLock<Vec<ActionRequest>>,
}

impl InMemoryActionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: Uuid) -> Option<ActionRequest> {
        self.actions.read().await.iter().find(|a| a.id == id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.actions.read().await.len()
    }
}

#[async_trait]
impl ActionRepository for InMemoryActionRepository {
    async fn save(&self, action: &ActionRequest) -> Result<(), RepositoryError> {
        let mut actions = self.actions.write().await;
        match actions.iter_mut().find(|a| a.id == action.id) {
            Some(existing) => *existing = action.clone(),
            None => actions.push(action.clone()),
        }
        Ok(())
    }

    async fn update_status_with_message(
        &self,
        id: Uuid,
        status: ActionStatus,
        message: Option<String>,
    ) -> Result<(), RepositoryError> {
        let mut actions = self.actions.write().await;
        let action = actions
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        action.status = status;
        action.message = message;
        Ok(())
    }

    async fn find_by_algorithm(&self, algorithm_id: &str) -> Result<Vec<ActionRequest>, RepositoryError> {
        Ok(self
            .actions
            .read()
            .await
            .iter()
            .filter(|a| a.algorithm_id == algorithm_id)
            .cloned()
            .collect())
    }
}

/// History storage with a per-instrument-set query cache.
///
/// Records and cache share one lock so a cached selection always belongs to
/// the current record set.
#[derive(Debug, Default)]
pub struct InMemoryHistoryRepository {
    store: RwLock<HistoryStore>,
}

#[derive(Debug, Default)]
struct HistoryStore {
    records: Vec<HistoryRecord>,
    cache: HashMap<String, Arc<Vec<HistoryRecord>>>,
}

impl InMemoryHistoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate cache key.
    fn cache_key(instrument_ids: &[String]) -> String {
        let mut ids: Vec<&str> = instrument_ids.iter().map(String::as_str).collect();
        ids.sort_unstable();
        ids.dedup();
        ids.join(",")
    }

    pub async fn len(&self) -> usize {
        self.store.read().await.records.len()
    }
}

#[async_trait]
impl HistoryRepository for InMemoryHistoryRepository {
    async fn clear_and_save_all(&self, mut records: Vec<HistoryRecord>) -> Result<(), RepositoryError> {
        records.sort_by_key(|r| r.time);
        let count = records.len();
        let mut store = self.store.write().await;
        store.records = records;
        store.cache.clear();
        debug!(records = count, "History replaced");
        Ok(())
    }

    async fn find_all_by_instruments(
        &self,
        instrument_ids: &[String],
    ) -> Result<Arc<Vec<HistoryRecord>>, RepositoryError> {
        let key = Self::cache_key(instrument_ids);
        if let Some(hit) = self.store.read().await.cache.get(&key) {
            return Ok(hit.clone());
        }

        let mut store = self.store.write().await;
        if let Some(hit) = store.cache.get(&key) {
            return Ok(hit.clone());
        }
        let selected: Arc<Vec<HistoryRecord>> = Arc::new(
            store
                .records
                .iter()
                .filter(|r| instrument_ids.contains(&r.instrument_id))
                .cloned()
                .collect(),
        );
        store.cache.insert(key, selected.clone());
        Ok(selected)
    }
}

/// Algorithm configuration storage.
#[derive(Debug, Default)]
pub struct InMemoryAlgoRepository {
    configs: RwLock<HashMap<String, AlgorithmConfig>>,
}

impl InMemoryAlgoRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AlgoRepository for InMemoryAlgoRepository {
    async fn save(&self, config: &AlgorithmConfig) -> Result<(), RepositoryError> {
        self.configs
            .write()
            .await
            .insert(config.id.clone(), config.clone());
        Ok(())
    }

    async fn set_active_status(&self, id: &str, active: bool) -> Result<(), RepositoryError> {
        let mut configs = self.configs.write().await;
        let config = configs
            .get_mut(id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        config.is_active = active;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<AlgorithmConfig>, RepositoryError> {
        Ok(self.configs.read().await.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<AlgorithmConfig>, RepositoryError> {
        let mut configs: Vec<_> = self.configs.read().await.values().cloned().collect();
        configs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(configs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autotrade_core::types::{OrderType, Side};
    use chrono::{TimeDelta, TimeZone, Utc};

    #[tokio::test]
    async fn test_action_save_and_status_update() {
        let repo = InMemoryActionRepository::new();
        let now = Utc::now();
        let mut action =
            ActionRequest::new("algo", "acc", "SBER", Side::Buy, OrderType::Limit, now, now);
        repo.save(&action).await.unwrap();
        action.mark_posted("order-1");
        repo.save(&action).await.unwrap();
        assert_eq!(repo.len().await, 1);

        repo.update_status_with_message(action.id, ActionStatus::Failed, Some("late".into()))
            .await
            .unwrap();
        let stored = repo.get(action.id).await.unwrap();
        assert_eq!(stored.status, ActionStatus::Failed);
        assert_eq!(stored.order_id.as_deref(), Some("order-1"));

        assert!(repo
            .update_status_with_message(Uuid::new_v4(), ActionStatus::Success, None)
            .await
            .is_err());
        assert_eq!(repo.find_by_algorithm("algo").await.unwrap().len(), 1);
        assert!(repo.find_by_algorithm("other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_history_cache_is_keyed_by_instrument_set() {
        let repo = InMemoryHistoryRepository::new();
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        repo.clear_and_save_all(vec![
            HistoryRecord::new("SBER", t0 + TimeDelta::minutes(1), 270.0),
            HistoryRecord::new("GAZP", t0, 150.0),
        ])
        .await
        .unwrap();

        let ab = repo
            .find_all_by_instruments(&["SBER".into(), "GAZP".into()])
            .await
            .unwrap();
        let ba = repo
            .find_all_by_instruments(&["GAZP".into(), "SBER".into()])
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&ab, &ba));
        assert_eq!(ab[0].instrument_id, "GAZP");

        repo.clear_and_save_all(vec![HistoryRecord::new("SBER", t0, 1.0)])
            .await
            .unwrap();
        let fresh = repo
            .find_all_by_instruments(&["SBER".into(), "GAZP".into()])
            .await
            .unwrap();
        assert_eq!(fresh.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_history_reads_during_replace_never_cache_old_records() {
        let repo = Arc::new(InMemoryHistoryRepository::new());
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let ids = vec!["SBER".to_string()];

        for round in 0..50 {
            let old = (0..=round)
                .map(|i| HistoryRecord::new("SBER", t0 + TimeDelta::minutes(i), 1.0))
                .collect();
            repo.clear_and_save_all(old).await.unwrap();

            let reader = {
                let repo = repo.clone();
                let ids = ids.clone();
                tokio::spawn(async move { repo.find_all_by_instruments(&ids).await })
            };
            let fresh = vec![HistoryRecord::new("SBER", t0, 2.0)];
            repo.clear_and_save_all(fresh).await.unwrap();
            reader.await.unwrap().unwrap();

            let after = repo.find_all_by_instruments(&ids).await.unwrap();
            assert_eq!(after.len(), 1, "round {round}");
            assert_eq!(after[0].price, 2.0);
        }
    }

    #[tokio::test]
    async fn test_algo_repository_active_flag() {
        let repo = InMemoryAlgoRepository::new();
        repo.save(&AlgorithmConfig::new("a1", "trend_crossover"))
            .await
            .unwrap();
        repo.set_active_status("a1", true).await.unwrap();

        assert!(repo.get("a1").await.unwrap().unwrap().is_active);
        assert!(repo.set_active_status("missing", true).await.is_err());
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }
}
