//! Persistence contracts the engine depends on.

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::types::{ActionRequest, ActionStatus, AlgorithmConfig, HistoryRecord};

/// Storage of action requests and their outcomes.
#[async_trait]
pub trait ActionRepository: Send + Sync {
    /// Insert or replace an action.
    async fn save(&self, action: &ActionRequest) -> Result<(), RepositoryError>;

    /// Update only the status and message of a stored action.
    async fn update_status_with_message(
        &self,
        id: Uuid,
        status: ActionStatus,
        message: Option<String>,
    ) -> Result<(), RepositoryError>;

    /// All actions of one algorithm, oldest first.
    async fn find_by_algorithm(&self, algorithm_id: &str) -> Result<Vec<ActionRequest>, RepositoryError>;
}

/// Storage of historical prices used by backtests.
#[async_trait]
pub trait HistoryRepository: Send + Sync {
    /// Replace all stored history with `records`.
    async fn clear_and_save_all(&self, records: Vec<HistoryRecord>) -> Result<(), RepositoryError>;

    /// Records of the given instruments ordered by time.
    ///
    /// Results may be cached per instrument set until the next write.
    async fn find_all_by_instruments(
        &self,
        instrument_ids: &[String],
    ) -> Result<Arc<Vec<HistoryRecord>>, RepositoryError>;
}

/// Storage of algorithm configurations.
#[async_trait]
pub trait AlgoRepository: Send + Sync {
    /// Insert or replace a configuration.
    async fn save(&self, config: &AlgorithmConfig) -> Result<(), RepositoryError>;

    /// Flip the active flag of a stored configuration.
    async fn set_active_status(&self, id: &str, active: bool) -> Result<(), RepositoryError>;

    async fn get(&self, id: &str) -> Result<Option<AlgorithmConfig>, RepositoryError>;

    async fn list(&self) -> Result<Vec<AlgorithmConfig>, RepositoryError>;
}
