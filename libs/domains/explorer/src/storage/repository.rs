use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{ExplorerError, ExplorerResult};
use crate::models::{DataPoint, DataPointId, NewDataPoint};

/// Repository trait for data-point persistence
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DataPointRepository: Send + Sync {
    /// Create a data point referencing an uploaded image
    async fn create(&self, input: NewDataPoint) -> ExplorerResult<DataPoint>;

    /// Get a data point by ID
    async fn get_by_id(&self, id: DataPointId) -> ExplorerResult<Option<DataPoint>>;

    /// Count data points belonging to a project
    async fn count_by_project(&self, project_id: Uuid) -> ExplorerResult<usize>;

    /// Delete every data point of a project, returning how many were removed
    async fn delete_by_project(&self, project_id: Uuid) -> ExplorerResult<usize>;
}

#[derive(Debug, Default)]
struct RepositoryState {
    next_id: DataPointId,
    rows: BTreeMap<DataPointId, DataPoint>,
}

/// In-memory implementation of DataPointRepository (for development/testing)
#[derive(Debug, Default, Clone)]
pub struct InMemoryDataPointRepository {
    state: Arc<RwLock<RepositoryState>>,
}

impl InMemoryDataPointRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// All data points of a project ordered by id
    pub async fn list_by_project(&self, project_id: Uuid) -> Vec<DataPoint> {
        let state = self.state.read().await;
        state
            .rows
            .values()
            .filter(|p| p.project_id == project_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl DataPointRepository for InMemoryDataPointRepository {
    async fn create(&self, input: NewDataPoint) -> ExplorerResult<DataPoint> {
        if input.image_url.is_empty() {
            return Err(ExplorerError::Repository(
                "data point requires an image url".to_string(),
            ));
        }

        let mut state = self.state.write().await;
        state.next_id += 1;

        let point = DataPoint {
            id: state.next_id,
            project_id: input.project_id,
            label: input.label,
            image_url: input.image_url,
            created_at: Utc::now(),
        };
        state.rows.insert(point.id, point.clone());

        tracing::debug!(data_point_id = point.id, project_id = %point.project_id, "Created data point");
        Ok(point)
    }

    async fn get_by_id(&self, id: DataPointId) -> ExplorerResult<Option<DataPoint>> {
        let state = self.state.read().await;
        Ok(state.rows.get(&id).cloned())
    }

    async fn count_by_project(&self, project_id: Uuid) -> ExplorerResult<usize> {
        let state = self.state.read().await;
        Ok(state
            .rows
            .values()
            .filter(|p| p.project_id == project_id)
            .count())
    }

    async fn delete_by_project(&self, project_id: Uuid) -> ExplorerResult<usize> {
        let mut state = self.state.write().await;
        let before = state.rows.len();
        state.rows.retain(|_, p| p.project_id != project_id);
        let removed = before - state.rows.len();

        tracing::info!(project_id = %project_id, removed = removed, "Deleted project data points");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_point(project_id: Uuid, label: &str) -> NewDataPoint {
        NewDataPoint {
            project_id,
            label: label.to_string(),
            image_url: format!("https://cdn.test/{}", label),
        }
    }

    #[tokio::test]
    async fn test_create_assigns_increasing_ids() {
        let repo = InMemoryDataPointRepository::new();
        let project_id = Uuid::new_v4();

        let a = repo.create(new_point(project_id, "a.jpg")).await.unwrap();
        let b = repo.create(new_point(project_id, "b.jpg")).await.unwrap();

        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
        assert_eq!(repo.get_by_id(2).await.unwrap().unwrap().label, "b.jpg");
    }

    #[tokio::test]
    async fn test_create_requires_image_url() {
        let repo = InMemoryDataPointRepository::new();
        let mut input = new_point(Uuid::new_v4(), "a.jpg");
        input.image_url.clear();

        let result = repo.create(input).await;
        assert!(matches!(result, Err(ExplorerError::Repository(_))));
    }

    #[tokio::test]
    async fn test_count_and_delete_are_project_scoped() {
        let repo = InMemoryDataPointRepository::new();
        let mine = Uuid::new_v4();
        let other = Uuid::new_v4();

        repo.create(new_point(mine, "a.jpg")).await.unwrap();
        repo.create(new_point(mine, "b.jpg")).await.unwrap();
        repo.create(new_point(other, "c.jpg")).await.unwrap();

        assert_eq!(repo.count_by_project(mine).await.unwrap(), 2);
        assert_eq!(repo.delete_by_project(mine).await.unwrap(), 2);
        assert_eq!(repo.count_by_project(mine).await.unwrap(), 0);
        assert_eq!(repo.list_by_project(other).await.len(), 1);
    }
}
