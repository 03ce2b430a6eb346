use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use observability::ExplorerMetrics;

use super::batch::{BatchEntry, FileStatus, IngestionBatch, IngestionReport};
use crate::compression::{CompressedImage, CompressionPolicy, ImageCompressor};
use crate::context::ProjectContext;
use crate::embedding::EmbeddingService;
use crate::error::{ExplorerError, ExplorerResult};
use crate::models::{DataPointId, Dimensionality, ImageFile, ImageKind, NewDataPoint, ProjectedPoint};
use crate::storage::{DataPointRepository, ObjectStorage, object_path};

/// Ingestion tuning
#[derive(Debug, Clone, PartialEq)]
pub struct IngestionConfig {
    /// Smallest batch accepted for a project with no data points yet
    pub min_cold_start_batch: usize,
    pub accepted_types: Vec<ImageKind>,
    /// Files processed at once; 1 keeps the pipeline sequential
    pub concurrency: usize,
    pub compression: CompressionPolicy,
}

impl IngestionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_min_cold_start_batch(mut self, min: usize) -> Self {
        self.min_cold_start_batch = min;
        self
    }

    pub fn with_accepted_types(mut self, kinds: Vec<ImageKind>) -> Self {
        self.accepted_types = kinds;
        self
    }

    /// Reads `INGEST_CONCURRENCY`, `INGEST_MIN_COLD_START_BATCH` and the
    /// compression variables
    pub fn from_env() -> ExplorerResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            min_cold_start_batch: core_config::env_parse_or(
                "INGEST_MIN_COLD_START_BATCH",
                defaults.min_cold_start_batch,
            )?,
            accepted_types: defaults.accepted_types,
            concurrency: core_config::env_parse_or::<usize>("INGEST_CONCURRENCY", 1)?.max(1),
            compression: CompressionPolicy::from_env()?,
        })
    }

    fn accepts(&self, kind: ImageKind) -> bool {
        self.accepted_types.contains(&kind)
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            min_cold_start_batch: 3,
            accepted_types: vec![ImageKind::Jpeg, ImageKind::Png, ImageKind::Gif],
            concurrency: 1,
            compression: CompressionPolicy::default(),
        }
    }
}

/// Drives a batch of files from selection to projected data points
///
/// Per-file stages (validate, compress, upload, create point) never abort the
/// batch. Every surviving file is then embedded and projected with exactly one
/// call to the embedding service.
#[derive(Clone)]
pub struct IngestionOrchestrator {
    storage: Arc<dyn ObjectStorage>,
    repository: Arc<dyn DataPointRepository>,
    embedding: Arc<dyn EmbeddingService>,
    compressor: Arc<dyn ImageCompressor>,
    context: Option<ProjectContext>,
    config: IngestionConfig,
}

impl IngestionOrchestrator {
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        repository: Arc<dyn DataPointRepository>,
        embedding: Arc<dyn EmbeddingService>,
        compressor: Arc<dyn ImageCompressor>,
    ) -> Self {
        Self {
            storage,
            repository,
            embedding,
            compressor,
            context: None,
            config: IngestionConfig::default(),
        }
    }

    pub fn with_config(mut self, config: IngestionConfig) -> Self {
        self.config = config;
        self
    }

    /// Discard results for projects that stop being active mid-run
    pub fn with_context(mut self, context: ProjectContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn config(&self) -> &IngestionConfig {
        &self.config
    }

    /// Ingest `files` into `project_id`, which currently holds `existing_count` points
    #[instrument(skip(self, files), fields(files = files.len()))]
    pub async fn ingest(
        &self,
        files: Vec<ImageFile>,
        project_id: Uuid,
        existing_count: usize,
    ) -> ExplorerResult<IngestionReport> {
        let started = Instant::now();

        if existing_count == 0 && files.len() < self.config.min_cold_start_batch {
            ExplorerMetrics::record_ingestion_aborted("insufficient_batch");
            return Err(ExplorerError::InsufficientBatchSize {
                required: self.config.min_cold_start_batch,
                provided: files.len(),
            });
        }

        let ticket = match &self.context {
            Some(context) => Some(
                context
                    .ticket_for(project_id)
                    .ok_or(ExplorerError::StaleContext { project_id })?,
            ),
            None => None,
        };

        let mut batch = IngestionBatch::new(files);
        for entry in batch.entries_mut() {
            self.validate(entry);
        }

        let processed: Vec<BatchEntry> = stream::iter(batch.into_entries())
            .map(|entry| self.process_file(project_id, entry))
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;
        let batch = IngestionBatch::from_entries(processed);

        let payload = batch.payload();
        if payload.is_empty() {
            warn!(project_id = %project_id, "No file survived the pipeline, skipping embed call");
            let report = batch.into_report();
            ExplorerMetrics::record_ingestion(0, report.failed.len(), elapsed_ms(started));
            return Ok(report);
        }

        ExplorerMetrics::record_embed_batch(payload.len());
        debug!(project_id = %project_id, items = payload.len(), "Requesting embed and projection");

        let projections = self
            .embedding
            .embed_and_project(project_id, payload)
            .await
            .map_err(|e| {
                ExplorerMetrics::record_ingestion_aborted("embedding_service");
                ExplorerError::embedding_service(e)
            })?;

        if let (Some(context), Some(ticket)) = (&self.context, ticket) {
            if !context.is_current(&ticket) {
                ExplorerMetrics::record_ingestion_aborted("stale_context");
                return Err(ExplorerError::StaleContext { project_id });
            }
        }

        let coordinates = index_projections(projections)?;
        let report = batch.complete(project_id, &coordinates);

        ExplorerMetrics::record_ingestion(
            report.succeeded.len(),
            report.failed.len(),
            elapsed_ms(started),
        );
        info!(
            project_id = %project_id,
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "Ingestion finished"
        );

        Ok(report)
    }

    fn validate(&self, entry: &mut BatchEntry) {
        let outcome = match entry.file.kind() {
            Some(kind) if self.config.accepts(kind) => {
                if entry.file.is_empty() {
                    Err(ExplorerError::Validation(format!(
                        "{} is empty",
                        entry.file.name
                    )))
                } else {
                    entry.advance(FileStatus::Validated)
                }
            }
            _ => Err(ExplorerError::UnsupportedFileType {
                file_name: entry.file.name.clone(),
                mime_type: entry.file.mime_type.clone(),
            }),
        };

        if let Err(err) = outcome {
            warn!(file = %entry.file.name, error = %err, "File rejected");
            ExplorerMetrics::record_file_failure(&FileStatus::Pending.to_string());
            entry.fail(err);
        }
    }

    async fn process_file(&self, project_id: Uuid, mut entry: BatchEntry) -> BatchEntry {
        if entry.status() != FileStatus::Validated {
            return entry;
        }

        if let Err(err) = self.run_file_stages(project_id, &mut entry).await {
            let stage = entry.status();
            warn!(file = %entry.file.name, stage = %stage, error = %err, "File dropped from batch");
            ExplorerMetrics::record_file_failure(&stage.to_string());
            entry.fail(err);
        }

        entry
    }

    async fn run_file_stages(&self, project_id: Uuid, entry: &mut BatchEntry) -> ExplorerResult<()> {
        let compressed = self.compress(entry.file.clone()).await?;
        let kind = compressed.kind;
        let content_type = compressed.content_type();
        let bytes = compressed.bytes.clone();
        entry.record_compressed(compressed)?;

        let path = object_path(project_id, &entry.file.name, kind);
        self.storage.upload(&path, bytes, &content_type).await?;
        let image_url = self.storage.public_url(&path).await?;
        entry.record_uploaded(image_url.clone())?;

        let point = self
            .repository
            .create(NewDataPoint {
                project_id,
                label: entry.file.name.clone(),
                image_url,
            })
            .await?;
        entry.record_point(point.id)?;

        debug!(file = %entry.file.name, data_point_id = point.id, "Data point created");
        Ok(())
    }

    async fn compress(&self, file: ImageFile) -> ExplorerResult<CompressedImage> {
        let compressor = Arc::clone(&self.compressor);
        tokio::task::spawn_blocking(move || compressor.compress(&file)).await?
    }
}

/// Index projections by data point, requiring one shared 2- or 3-component shape
fn index_projections(
    projections: Vec<ProjectedPoint>,
) -> ExplorerResult<HashMap<DataPointId, Vec<f64>>> {
    let mut dimension = None;
    let mut coordinates = HashMap::with_capacity(projections.len());

    for point in projections {
        let components = point.projected_coordinate.len();
        if Dimensionality::from_components(components).is_none() {
            return Err(ExplorerError::embedding_service(ExplorerError::Validation(
                format!(
                    "data point {} has {} projected components",
                    point.data_point_id, components
                ),
            )));
        }
        match dimension {
            None => dimension = Some(components),
            Some(expected) if expected != components => {
                return Err(ExplorerError::embedding_service(ExplorerError::Validation(
                    format!(
                        "mixed projection dimensions: {} and {}",
                        expected, components
                    ),
                )));
            }
            Some(_) => {}
        }
        coordinates.insert(point.data_point_id, point.projected_coordinate);
    }

    Ok(coordinates)
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
