//! Embedding Explorer Domain Library
//!
//! Turns batches of images into projected 2D/3D points and lets a caller
//! explore them: thumbnail overlays while zoomed in, and top-k similarity
//! search by text or image.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                   ProjectView                   │  ← active project, stale results dropped
//! └───────┬──────────────┬───────────────┬──────────┘
//!         │              │               │
//! ┌───────▼───────┐ ┌────▼───────────┐ ┌─▼───────────┐
//! │   Ingestion   │ │ StoreRefresher │ │ QueryEngine │
//! │ Orchestrator  │ └────┬───────────┘ └─┬───────────┘
//! └───┬───────────┘      │               │
//!     │           ┌──────▼──────────┐    │
//!     │           │ CoordinateStore │◄── PlotSurface ← overlay::compute_overlays
//!     │           └─────────────────┘    │
//! ┌───▼──────────────────────────────────▼──────────┐
//! │ ObjectStorage · DataPointRepository ·           │
//! │ EmbeddingService · ImageCompressor   (traits)   │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! # Features
//!
//! - **Partial-failure ingestion**: per-file validate → compress → upload →
//!   create point, then one batched embed/project call for the survivors
//! - **Two service variants**: batched `embed-and-project` or split
//!   `extract-clip-embeddings` + `extract-pca-embeddings`
//! - **Versioned store**: wholesale replacement, latest refresh wins
//! - **Pure overlays**: all-or-nothing below a zoom threshold, inclusive bounds
//! - **Similarity queries**: JSON text probes, multipart image probes
//!
//! # Usage
//!
//! ```rust,no_run
//! use domain_explorer::{
//!     Collaborators, ExplorerConfig, ImageFile, InMemoryDataPointRepository,
//!     InMemoryObjectStorage, ProjectView, QueryProbe, ViewportRange,
//! };
//! use std::sync::Arc;
//! use uuid::Uuid;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ExplorerConfig::from_env()?;
//! let collaborators = Collaborators::from_config(
//!     &config,
//!     Arc::new(InMemoryObjectStorage::new(config.storage.clone())),
//!     Arc::new(InMemoryDataPointRepository::new()),
//! )?;
//! let view = ProjectView::new(collaborators, &config);
//!
//! view.open(Uuid::new_v4()).await?;
//! let files = vec![
//!     ImageFile::new("a.png", "image/png", std::fs::read("a.png")?),
//!     ImageFile::new("b.png", "image/png", std::fs::read("b.png")?),
//!     ImageFile::new("c.png", "image/png", std::fs::read("c.png")?),
//! ];
//! if let Some(report) = view.upload(files).await? {
//!     println!("{} uploaded, {} failed", report.succeeded.len(), report.failed.len());
//! }
//!
//! let overlays = view
//!     .on_viewport_change(ViewportRange::planar((-0.5, 0.5), (-0.5, 0.5)))
//!     .await;
//! println!("{} thumbnails", overlays.len());
//!
//! if let Some(results) = view.query(&QueryProbe::text("a red car", 5)).await? {
//!     for result in results {
//!         println!("{result}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod compression;
pub mod config;
pub mod context;
pub mod embedding;
pub mod error;
pub mod ingestion;
pub mod models;
pub mod overlay;
pub mod plot;
pub mod projects;
pub mod query;
pub mod storage;
pub mod store;
pub mod view;

// Re-export commonly used types
pub use compression::{CompressedImage, CompressionPolicy, ImageCompressor, JpegCompressor};
pub use config::ExplorerConfig;
pub use context::{ContextTicket, ProjectContext};
pub use embedding::{EmbeddingService, EmbeddingServiceConfig, EndpointVariant, HttpEmbeddingService};
pub use error::{ErrorCategory, ExplorerError, ExplorerResult};
pub use ingestion::{
    FailedFile, FileStatus, IngestionBatch, IngestionConfig, IngestionOrchestrator,
    IngestionReport,
};
pub use models::{
    Axis, AxisRange, DataPoint, DataPointId, DataPointRecord, Dimensionality, EmbedItem,
    ImageFile, ImageKind, NewDataPoint, OverlayDirective, OverlayLayer, ProbeKind,
    ProjectedPoint, QueryHit, QueryProbe, QueryResult, ViewportRange, DEFAULT_TOP_K, MAX_TOP_K,
    MIN_TOP_K,
};
pub use overlay::{OverlayConfig, compute_overlays};
pub use plot::{PlotFrame, PlotSurface, ScatterTrace};
pub use projects::{ProjectDataService, PurgeSummary};
pub use query::{QueryEngine, validate_probe};
pub use storage::{
    DataPointRepository, InMemoryDataPointRepository, InMemoryObjectStorage, ObjectStorage,
    StorageConfig, object_path,
};
pub use store::{CoordinateStore, RefreshOutcome, StoreRefresher, StoreSnapshot};
pub use view::{Collaborators, ProjectView};
