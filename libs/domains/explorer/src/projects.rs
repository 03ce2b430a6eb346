use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::ExplorerResult;
use crate::storage::{DataPointRepository, ObjectStorage};

/// Counts of what a purge removed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PurgeSummary {
    pub objects_deleted: usize,
    pub data_points_deleted: usize,
}

/// Project-scoped data maintenance
#[derive(Clone)]
pub struct ProjectDataService {
    storage: Arc<dyn ObjectStorage>,
    repository: Arc<dyn DataPointRepository>,
}

impl ProjectDataService {
    pub fn new(storage: Arc<dyn ObjectStorage>, repository: Arc<dyn DataPointRepository>) -> Self {
        Self {
            storage,
            repository,
        }
    }

    /// Number of data points a project holds
    pub async fn data_point_count(&self, project_id: Uuid) -> ExplorerResult<usize> {
        self.repository.count_by_project(project_id).await
    }

    /// Delete every blob under the project's path and every data point of the project
    #[instrument(skip(self), fields(project_id = %project_id))]
    pub async fn purge_project(&self, project_id: Uuid) -> ExplorerResult<PurgeSummary> {
        let prefix = format!("{}/", project_id);
        let paths = self.storage.list(&prefix).await?;

        let objects_deleted = if paths.is_empty() {
            0
        } else {
            self.storage.delete(&paths).await?
        };
        let data_points_deleted = self.repository.delete_by_project(project_id).await?;

        info!(objects_deleted, data_points_deleted, "Project data purged");
        Ok(PurgeSummary {
            objects_deleted,
            data_points_deleted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExplorerError;
    use crate::models::{ImageKind, NewDataPoint};
    use crate::storage::{
        InMemoryDataPointRepository, InMemoryObjectStorage, MockDataPointRepository,
        MockObjectStorage, StorageConfig, object_path,
    };

    #[tokio::test]
    async fn test_purge_removes_only_project_data() {
        let storage = InMemoryObjectStorage::new(StorageConfig::new("https://cdn.test"));
        let repository = InMemoryDataPointRepository::new();
        let target = Uuid::new_v4();
        let other = Uuid::new_v4();

        for project_id in [target, target, other] {
            let path = object_path(project_id, "a.png", ImageKind::Png);
            storage.upload(&path, vec![1], "image/png").await.unwrap();
            repository
                .create(NewDataPoint {
                    project_id,
                    label: "a.png".into(),
                    image_url: storage.public_url(&path).await.unwrap(),
                })
                .await
                .unwrap();
        }

        let service = ProjectDataService::new(Arc::new(storage.clone()), Arc::new(repository.clone()));
        let summary = service.purge_project(target).await.unwrap();

        assert_eq!(
            summary,
            PurgeSummary {
                objects_deleted: 2,
                data_points_deleted: 2
            }
        );
        assert_eq!(storage.len().await, 1);
        assert_eq!(service.data_point_count(other).await.unwrap(), 1);
        assert_eq!(service.data_point_count(target).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_project_skips_delete_call() {
        let mut storage = MockObjectStorage::new();
        storage.expect_list().returning(|_| Ok(vec![]));
        storage.expect_delete().never();
        let mut repository = MockDataPointRepository::new();
        repository.expect_delete_by_project().returning(|_| Ok(0));

        let service = ProjectDataService::new(Arc::new(storage), Arc::new(repository));
        let summary = service.purge_project(Uuid::new_v4()).await.unwrap();

        assert_eq!(summary, PurgeSummary::default());
    }

    #[tokio::test]
    async fn test_storage_failure_keeps_data_points() {
        let mut storage = MockObjectStorage::new();
        storage
            .expect_list()
            .returning(|_| Err(ExplorerError::Storage("bucket unavailable".into())));
        let mut repository = MockDataPointRepository::new();
        repository.expect_delete_by_project().never();

        let service = ProjectDataService::new(Arc::new(storage), Arc::new(repository));

        assert!(service.purge_project(Uuid::new_v4()).await.is_err());
    }
}
