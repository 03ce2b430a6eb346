use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument};
use uuid::Uuid;

use observability::ExplorerMetrics;

use crate::context::ProjectContext;
use crate::embedding::EmbeddingService;
use crate::error::{ExplorerError, ExplorerResult};
use crate::models::{MAX_TOP_K, MIN_TOP_K, QueryProbe, QueryResult};

/// Check a probe before anything is sent over the wire
pub fn validate_probe(probe: &QueryProbe) -> ExplorerResult<()> {
    let top_k = probe.top_k();
    if !(MIN_TOP_K..=MAX_TOP_K).contains(&top_k) {
        return Err(ExplorerError::InvalidProbe(format!(
            "top_k must be between {} and {}, got {}",
            MIN_TOP_K, MAX_TOP_K, top_k
        )));
    }

    match probe {
        QueryProbe::Text { text, .. } if text.trim().is_empty() => Err(
            ExplorerError::InvalidProbe("text probe is empty".to_string()),
        ),
        QueryProbe::Image { blob, .. } if blob.is_empty() => Err(ExplorerError::InvalidProbe(
            "image probe has no data".to_string(),
        )),
        QueryProbe::Image { blob, .. } if blob.kind().is_none() => {
            Err(ExplorerError::InvalidProbe(format!(
                "unsupported image type '{}'",
                blob.mime_type
            )))
        }
        _ => Ok(()),
    }
}

/// Top-k similarity search against the embedding service
///
/// Results keep the service's ranking; the engine never re-sorts.
#[derive(Clone)]
pub struct QueryEngine {
    embedding: Arc<dyn EmbeddingService>,
    context: Option<ProjectContext>,
}

impl QueryEngine {
    pub fn new(embedding: Arc<dyn EmbeddingService>) -> Self {
        Self {
            embedding,
            context: None,
        }
    }

    /// Discard results that arrive after the project stopped being active
    pub fn with_context(mut self, context: ProjectContext) -> Self {
        self.context = Some(context);
        self
    }

    #[instrument(skip(self, probe), fields(project_id = %project_id, kind = %probe.kind(), top_k = probe.top_k()))]
    pub async fn query(
        &self,
        probe: &QueryProbe,
        project_id: Uuid,
    ) -> ExplorerResult<Vec<QueryResult>> {
        let kind = probe.kind().to_string();
        validate_probe(probe).inspect_err(|_| ExplorerMetrics::record_query_failed(&kind))?;

        let ticket = match &self.context {
            Some(context) => Some(
                context
                    .ticket_for(project_id)
                    .ok_or(ExplorerError::StaleContext { project_id })?,
            ),
            None => None,
        };

        let started = Instant::now();
        let hits = self
            .embedding
            .query(project_id, probe)
            .await
            .inspect_err(|_| ExplorerMetrics::record_query_failed(&kind))?;

        if let (Some(context), Some(ticket)) = (&self.context, ticket) {
            if !context.is_current(&ticket) {
                debug!("Discarding query results for inactive project");
                return Err(ExplorerError::StaleContext { project_id });
            }
        }

        let results: Vec<QueryResult> = hits.into_iter().map(QueryResult::from).collect();
        ExplorerMetrics::record_query(&kind, results.len(), started.elapsed().as_millis() as u64);
        debug!(results = results.len(), "Query answered");

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::MockEmbeddingService;
    use crate::models::{ImageFile, QueryHit};

    fn hit(id: i64, label: &str, similarity: Option<f64>) -> QueryHit {
        QueryHit {
            data_point_id: id,
            label: label.to_string(),
            similarity,
            image_url: None,
        }
    }

    #[tokio::test]
    async fn test_invalid_probes_never_reach_the_service() {
        let engine = QueryEngine::new(Arc::new(MockEmbeddingService::new()));
        let project_id = Uuid::new_v4();

        for probe in [
            QueryProbe::text("", 5),
            QueryProbe::text("   ", 5),
            QueryProbe::text("cat", 11),
            QueryProbe::text("cat", 0),
            QueryProbe::image(ImageFile::new("q.png", "image/png", vec![]), 5),
            QueryProbe::image(ImageFile::new("q.bmp", "image/bmp", vec![1, 2]), 5),
        ] {
            let err = engine.query(&probe, project_id).await.unwrap_err();
            assert!(matches!(err, ExplorerError::InvalidProbe(_)), "{probe:?}");
        }
    }

    #[tokio::test]
    async fn test_results_keep_service_order() {
        let mut embedding = MockEmbeddingService::new();
        embedding.expect_query().times(1).returning(|_, _| {
            Ok(vec![
                hit(3, "c", Some(0.4)),
                hit(1, "a", Some(0.9)),
                hit(2, "b", None),
            ])
        });

        let engine = QueryEngine::new(Arc::new(embedding));
        let results = engine
            .query(&QueryProbe::text("cat", 3), Uuid::new_v4())
            .await
            .unwrap();

        let ids: Vec<_> = results.iter().map(|r| r.data_point_id).collect();
        assert_eq!(ids, vec![3, 1, 2]);
        assert_eq!(results[2].score_label(), "N/A");
        assert_eq!(
            results[1].to_string(),
            "Data Point ID: 1, Similarity Score: 0.90"
        );
    }

    #[tokio::test]
    async fn test_image_probe_is_forwarded() {
        let mut embedding = MockEmbeddingService::new();
        embedding
            .expect_query()
            .withf(|_, probe| matches!(probe, QueryProbe::Image { top_k: 2, .. }))
            .times(1)
            .returning(|_, _| Ok(vec![hit(7, "seven", Some(0.5))]));

        let engine = QueryEngine::new(Arc::new(embedding));
        let probe = QueryProbe::image(ImageFile::new("q.jpg", "image/jpeg", vec![0xFF, 0xD8]), 2);
        let results = engine.query(&probe, Uuid::new_v4()).await.unwrap();

        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_service_error_propagates() {
        let mut embedding = MockEmbeddingService::new();
        embedding.expect_query().returning(|_, _| {
            Err(ExplorerError::RemoteService {
                status: 500,
                message: "index missing".into(),
            })
        });

        let engine = QueryEngine::new(Arc::new(embedding));
        let err = engine
            .query(&QueryProbe::text("cat", 5), Uuid::new_v4())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("index missing"));
    }

    #[tokio::test]
    async fn test_stale_results_are_discarded() {
        let context = ProjectContext::new();
        let project_id = Uuid::new_v4();
        context.activate(project_id);

        let switcher = context.clone();
        let mut embedding = MockEmbeddingService::new();
        embedding.expect_query().returning(move |_, _| {
            switcher.clear();
            Ok(vec![hit(1, "a", Some(0.9))])
        });

        let engine = QueryEngine::new(Arc::new(embedding)).with_context(context);
        let err = engine
            .query(&QueryProbe::text("cat", 5), project_id)
            .await
            .unwrap_err();

        assert!(err.is_stale());
    }
}
