use async_trait::async_trait;
use uuid::Uuid;

use crate::error::ExplorerResult;
use crate::models::{DataPointRecord, EmbedItem, ProjectedPoint, QueryHit, QueryProbe};

/// Remote embedding, projection and nearest-neighbour service
///
/// Deployment variants differ in endpoint shape; implementations reduce them
/// to the same per-point projection result.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Embed the given images and (re)fit the project's projection in one call
    async fn embed_and_project(
        &self,
        project_id: Uuid,
        items: Vec<EmbedItem>,
    ) -> ExplorerResult<Vec<ProjectedPoint>>;

    /// Fetch every projected point of a project
    async fn retrieve_projected_points(
        &self,
        project_id: Uuid,
    ) -> ExplorerResult<Vec<DataPointRecord>>;

    /// Rank the project's points against a probe
    async fn query(&self, project_id: Uuid, probe: &QueryProbe) -> ExplorerResult<Vec<QueryHit>>;
}
