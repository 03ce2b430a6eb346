//! Project-detail owner tying ingestion, refresh, plot and queries to the
//! active project.
//!
//! Results that belong to a project which is no longer open are dropped here
//! and surface as `Ok(None)`.

use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::compression::{ImageCompressor, JpegCompressor};
use crate::config::ExplorerConfig;
use crate::context::ProjectContext;
use crate::embedding::{EmbeddingService, HttpEmbeddingService};
use crate::error::{ExplorerError, ExplorerResult};
use crate::ingestion::{IngestionOrchestrator, IngestionReport};
use crate::models::{Dimensionality, ImageFile, OverlayDirective, QueryProbe, QueryResult, ViewportRange};
use crate::plot::{PlotFrame, PlotSurface};
use crate::query::QueryEngine;
use crate::store::{CoordinateStore, RefreshOutcome, StoreRefresher, StoreSnapshot};
use crate::storage::{DataPointRepository, ObjectStorage};

/// External systems the explorer talks to
#[derive(Clone)]
pub struct Collaborators {
    pub storage: Arc<dyn ObjectStorage>,
    pub repository: Arc<dyn DataPointRepository>,
    pub embedding: Arc<dyn EmbeddingService>,
    pub compressor: Arc<dyn ImageCompressor>,
}

impl Collaborators {
    /// HTTP embedding client and JPEG compressor built from config
    pub fn from_config(
        config: &ExplorerConfig,
        storage: Arc<dyn ObjectStorage>,
        repository: Arc<dyn DataPointRepository>,
    ) -> ExplorerResult<Self> {
        Ok(Self {
            storage,
            repository,
            embedding: Arc::new(HttpEmbeddingService::new(config.embedding.clone())?),
            compressor: Arc::new(JpegCompressor::new(config.ingestion.compression)),
        })
    }
}

/// Keep a result unless it belongs to a project that is no longer open
fn discard_stale<T>(result: ExplorerResult<T>) -> ExplorerResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_stale() => {
            debug!(error = %err, "Discarding stale result");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

pub struct ProjectView {
    context: ProjectContext,
    repository: Arc<dyn DataPointRepository>,
    store: CoordinateStore,
    refresher: StoreRefresher,
    ingestion: IngestionOrchestrator,
    queries: QueryEngine,
    plot: Mutex<PlotSurface>,
}

impl ProjectView {
    pub fn new(collaborators: Collaborators, config: &ExplorerConfig) -> Self {
        let context = ProjectContext::new();
        let store = CoordinateStore::new();

        let refresher = StoreRefresher::new(
            Arc::clone(&collaborators.embedding),
            store.clone(),
            context.clone(),
        );
        let ingestion = IngestionOrchestrator::new(
            collaborators.storage,
            Arc::clone(&collaborators.repository),
            Arc::clone(&collaborators.embedding),
            collaborators.compressor,
        )
        .with_config(config.ingestion.clone())
        .with_context(context.clone());
        let queries = QueryEngine::new(collaborators.embedding).with_context(context.clone());
        let plot = Mutex::new(PlotSurface::new(store.clone(), config.overlay));

        Self {
            context,
            repository: collaborators.repository,
            store,
            refresher,
            ingestion,
            queries,
            plot,
        }
    }

    pub fn active_project(&self) -> Option<Uuid> {
        self.context.current().map(|t| t.project_id)
    }

    fn require_project(&self) -> ExplorerResult<Uuid> {
        self.active_project()
            .ok_or_else(|| ExplorerError::Validation("no project is open".to_string()))
    }

    /// Observe store replacements
    pub fn subscribe(&self) -> watch::Receiver<Arc<StoreSnapshot>> {
        self.store.subscribe()
    }

    pub fn snapshot(&self) -> Arc<StoreSnapshot> {
        self.store.snapshot()
    }

    /// Make `project_id` active and load its points
    #[instrument(skip(self), fields(project_id = %project_id))]
    pub async fn open(&self, project_id: Uuid) -> ExplorerResult<Option<RefreshOutcome>> {
        self.context.activate(project_id);
        self.store.reset(Some(project_id));
        self.plot.lock().await.reset();

        info!("Project opened");
        discard_stale(self.refresher.refresh(project_id).await)
    }

    /// Re-fetch the active project's points
    pub async fn refresh(&self) -> ExplorerResult<Option<RefreshOutcome>> {
        let project_id = self.require_project()?;
        discard_stale(self.refresher.refresh(project_id).await)
    }

    /// Points already in the project; the repository answers when the store has none loaded
    async fn existing_count(&self, project_id: Uuid) -> ExplorerResult<usize> {
        match self.store.len() {
            0 => self.repository.count_by_project(project_id).await,
            loaded => Ok(loaded),
        }
    }

    /// Ingest files into the active project, then refresh the store.
    ///
    /// A failed refresh after a successful ingest is logged and the report is
    /// still returned; the store keeps its previous snapshot until the next refresh.
    pub async fn upload(&self, files: Vec<ImageFile>) -> ExplorerResult<Option<IngestionReport>> {
        let project_id = self.require_project()?;
        let existing_count = self.existing_count(project_id).await?;

        let Some(report) =
            discard_stale(self.ingestion.ingest(files, project_id, existing_count).await)?
        else {
            return Ok(None);
        };

        if !report.succeeded.is_empty() {
            match discard_stale(self.refresher.refresh(project_id).await) {
                Ok(Some(_)) => {}
                Ok(None) => return Ok(None),
                Err(err) => {
                    warn!(
                        project_id = %project_id,
                        error = %err,
                        succeeded = report.succeeded.len(),
                        "Refresh after upload failed"
                    );
                }
            }
        }

        Ok(Some(report))
    }

    /// Similarity search in the active project
    pub async fn query(&self, probe: &QueryProbe) -> ExplorerResult<Option<Vec<QueryResult>>> {
        let project_id = self.require_project()?;
        discard_stale(self.queries.query(probe, project_id).await)
    }

    pub async fn on_viewport_change(&self, range: ViewportRange) -> Vec<OverlayDirective> {
        self.plot.lock().await.on_viewport_change(range).to_vec()
    }

    pub async fn set_view(&self, view: Dimensionality) -> ExplorerResult<()> {
        self.plot.lock().await.set_view(view)
    }

    pub async fn frame(&self) -> PlotFrame {
        self.plot.lock().await.frame()
    }

    /// Leave the project; in-flight work for it becomes stale
    pub async fn close(&self) {
        if let Some(project_id) = self.active_project() {
            info!(project_id = %project_id, "Project closed");
        }
        self.context.clear();
        self.store.reset(None);
        self.plot.lock().await.reset();
    }
}
