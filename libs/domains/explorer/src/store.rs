//! Versioned coordinate store and its refresh coordinator.
//!
//! The store is only ever replaced wholesale. Each replacement bumps the
//! version, which subscribers observe through a watch channel.

use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tokio::task::AbortHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use observability::ExplorerMetrics;

use crate::context::ProjectContext;
use crate::embedding::EmbeddingService;
use crate::error::{ExplorerError, ExplorerResult};
use crate::models::{DataPointRecord, Dimensionality};

/// Immutable view of the store at one version
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreSnapshot {
    pub project_id: Option<Uuid>,
    pub version: u64,
    /// `None` while the store holds no records
    pub dimensionality: Option<Dimensionality>,
    pub records: Vec<DataPointRecord>,
}

impl StoreSnapshot {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Projected records of the active project
#[derive(Debug, Clone)]
pub struct CoordinateStore {
    tx: Arc<watch::Sender<Arc<StoreSnapshot>>>,
}

impl CoordinateStore {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Arc::new(StoreSnapshot::default()));
        Self { tx: Arc::new(tx) }
    }

    pub fn snapshot(&self) -> Arc<StoreSnapshot> {
        Arc::clone(&self.tx.borrow())
    }

    pub fn version(&self) -> u64 {
        self.tx.borrow().version
    }

    pub fn len(&self) -> usize {
        self.tx.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.borrow().is_empty()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<StoreSnapshot>> {
        self.tx.subscribe()
    }

    /// Replace every record. All records must share one 2- or 3-component shape.
    pub fn replace(&self, project_id: Uuid, records: Vec<DataPointRecord>) -> ExplorerResult<u64> {
        let dimensionality = validate_records(project_id, &records)?;
        Ok(self.publish(Some(project_id), dimensionality, records))
    }

    /// Drop every record, e.g. when switching project
    pub fn reset(&self, project_id: Option<Uuid>) -> u64 {
        self.publish(project_id, None, Vec::new())
    }

    fn publish(
        &self,
        project_id: Option<Uuid>,
        dimensionality: Option<Dimensionality>,
        records: Vec<DataPointRecord>,
    ) -> u64 {
        let mut version = 0;
        self.tx.send_modify(|current| {
            version = current.version + 1;
            *current = Arc::new(StoreSnapshot {
                project_id,
                version,
                dimensionality,
                records,
            });
        });
        version
    }
}

impl Default for CoordinateStore {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_records(
    project_id: Uuid,
    records: &[DataPointRecord],
) -> ExplorerResult<Option<Dimensionality>> {
    let Some(first) = records.first() else {
        return Ok(None);
    };

    let dimensionality = Dimensionality::from_components(first.dimension()).ok_or_else(|| {
        ExplorerError::Validation(format!(
            "data point {} has {} projected components",
            first.id,
            first.dimension()
        ))
    })?;

    for record in records {
        if record.dimension() != dimensionality.components() {
            return Err(ExplorerError::Validation(format!(
                "data point {} has {} components, store holds {}",
                record.id,
                record.dimension(),
                dimensionality
            )));
        }
        if record.project_id != project_id {
            return Err(ExplorerError::Validation(format!(
                "data point {} belongs to project {}",
                record.id, record.project_id
            )));
        }
    }

    Ok(Some(dimensionality))
}

/// What happened to a refresh request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Applied { version: u64, points: usize },
    /// A newer request took over before this one could be applied
    Superseded,
}

#[derive(Debug, Default)]
struct RefreshState {
    generation: u64,
    in_flight: Option<AbortHandle>,
}

/// Re-fetches projected points into the store, latest request wins
#[derive(Clone)]
pub struct StoreRefresher {
    embedding: Arc<dyn EmbeddingService>,
    store: CoordinateStore,
    context: ProjectContext,
    state: Arc<Mutex<RefreshState>>,
}

impl StoreRefresher {
    pub fn new(
        embedding: Arc<dyn EmbeddingService>,
        store: CoordinateStore,
        context: ProjectContext,
    ) -> Self {
        Self {
            embedding,
            store,
            context,
            state: Arc::new(Mutex::new(RefreshState::default())),
        }
    }

    pub fn store(&self) -> &CoordinateStore {
        &self.store
    }

    /// Start a refresh in the background
    pub fn request_refresh(
        &self,
        project_id: Uuid,
    ) -> tokio::task::JoinHandle<ExplorerResult<RefreshOutcome>> {
        let refresher = self.clone();
        tokio::spawn(async move { refresher.refresh(project_id).await })
    }

    /// Fetch and apply the project's points, superseding any fetch in flight
    #[instrument(skip(self), fields(project_id = %project_id))]
    pub async fn refresh(&self, project_id: Uuid) -> ExplorerResult<RefreshOutcome> {
        let ticket = self
            .context
            .ticket_for(project_id)
            .ok_or(ExplorerError::StaleContext { project_id })?;

        let embedding = Arc::clone(&self.embedding);
        let (generation, task) = {
            let mut state = self.state.lock().await;
            if let Some(previous) = state.in_flight.take() {
                debug!("Superseding in-flight refresh");
                previous.abort();
            }
            state.generation += 1;

            let task =
                tokio::spawn(async move { embedding.retrieve_projected_points(project_id).await });
            state.in_flight = Some(task.abort_handle());
            (state.generation, task)
        };

        let records = match task.await {
            Ok(Ok(records)) => records,
            Ok(Err(err)) => {
                if !self.finish(generation).await {
                    debug!(error = %err, "Superseded refresh failed");
                    ExplorerMetrics::record_refresh("superseded", None);
                    return Ok(RefreshOutcome::Superseded);
                }
                warn!(error = %err, "Refresh fetch failed");
                ExplorerMetrics::record_refresh("failed", None);
                return Err(err);
            }
            Err(join) if join.is_cancelled() => {
                ExplorerMetrics::record_refresh("superseded", None);
                return Ok(RefreshOutcome::Superseded);
            }
            Err(join) => {
                self.finish(generation).await;
                ExplorerMetrics::record_refresh("failed", None);
                return Err(join.into());
            }
        };

        let mut state = self.state.lock().await;
        if state.generation != generation {
            ExplorerMetrics::record_refresh("superseded", None);
            return Ok(RefreshOutcome::Superseded);
        }
        state.in_flight = None;

        if !self.context.is_current(&ticket) {
            debug!("Discarding refresh for inactive project");
            return Err(ExplorerError::StaleContext { project_id });
        }

        let points = records.len();
        let version = self.store.replace(project_id, records).inspect_err(|_| {
            ExplorerMetrics::record_refresh("failed", None);
        })?;

        ExplorerMetrics::record_refresh("applied", Some(points));
        info!(version, points, "Coordinate store refreshed");
        Ok(RefreshOutcome::Applied { version, points })
    }

    /// Clear the in-flight handle if `generation` is still the latest; returns whether it was
    async fn finish(&self, generation: u64) -> bool {
        let mut state = self.state.lock().await;
        let latest = state.generation == generation;
        if latest {
            state.in_flight = None;
        }
        latest
    }
}
