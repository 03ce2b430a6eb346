//! Batch ingestion: validate, compress, upload and persist each file, then
//! embed and project the survivors together.

mod batch;
mod orchestrator;

pub use batch::{BatchEntry, FailedFile, FileStatus, IngestionBatch, IngestionReport};
pub use orchestrator::{IngestionConfig, IngestionOrchestrator};
