//! Per-file progress through the ingestion pipeline.

use serde::Serialize;
use std::collections::HashMap;
use strum::Display;
use uuid::Uuid;

use crate::compression::CompressedImage;
use crate::error::{ExplorerError, ExplorerResult};
use crate::models::{DataPointId, DataPointRecord, EmbedItem, ImageFile};

/// Stage a file has reached. Stages only move forward; `Failed` and
/// `Embedded` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FileStatus {
    Pending,
    Validated,
    Compressed,
    Uploaded,
    PointCreated,
    Embedded,
    Failed,
}

impl FileStatus {
    fn rank(self) -> Option<u8> {
        match self {
            FileStatus::Pending => Some(0),
            FileStatus::Validated => Some(1),
            FileStatus::Compressed => Some(2),
            FileStatus::Uploaded => Some(3),
            FileStatus::PointCreated => Some(4),
            FileStatus::Embedded => Some(5),
            FileStatus::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, FileStatus::Embedded | FileStatus::Failed)
    }

    pub fn can_transition_to(self, next: FileStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self.rank(), next.rank()) {
            (Some(_), None) => true,
            (Some(current), Some(next)) => next > current,
            (None, _) => false,
        }
    }
}

/// A file that dropped out of the pipeline
#[derive(Debug)]
pub struct FailedFile {
    pub file_name: String,
    pub mime_type: String,
    /// Last stage completed before the failure
    pub stage: FileStatus,
    pub error: ExplorerError,
}

impl FailedFile {
    pub fn reason(&self) -> String {
        self.error.to_string()
    }
}

/// One file and everything produced for it so far
#[derive(Debug)]
pub struct BatchEntry {
    index: usize,
    pub file: ImageFile,
    pub compressed: Option<CompressedImage>,
    pub image_url: Option<String>,
    pub data_point_id: Option<DataPointId>,
    status: FileStatus,
    failed_at: Option<FileStatus>,
    error: Option<ExplorerError>,
}

impl BatchEntry {
    fn new(index: usize, file: ImageFile) -> Self {
        Self {
            index,
            file,
            compressed: None,
            image_url: None,
            data_point_id: None,
            status: FileStatus::Pending,
            failed_at: None,
            error: None,
        }
    }

    pub fn status(&self) -> FileStatus {
        self.status
    }

    pub fn error(&self) -> Option<&ExplorerError> {
        self.error.as_ref()
    }

    /// Move to a later stage
    pub fn advance(&mut self, next: FileStatus) -> ExplorerResult<()> {
        if next == FileStatus::Failed || !self.status.can_transition_to(next) {
            return Err(ExplorerError::Internal(format!(
                "illegal status transition for {}: {} -> {}",
                self.file.name, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }

    /// Drop the file from the batch. Terminal entries are left untouched.
    pub fn fail(&mut self, error: ExplorerError) {
        if self.status.is_terminal() {
            tracing::warn!(
                file = %self.file.name,
                status = %self.status,
                "Ignoring failure reported for a finished file"
            );
            return;
        }
        self.failed_at = Some(self.status);
        self.status = FileStatus::Failed;
        self.error = Some(error);
    }

    pub fn record_compressed(&mut self, compressed: CompressedImage) -> ExplorerResult<()> {
        self.advance(FileStatus::Compressed)?;
        self.compressed = Some(compressed);
        Ok(())
    }

    pub fn record_uploaded(&mut self, image_url: String) -> ExplorerResult<()> {
        self.advance(FileStatus::Uploaded)?;
        self.image_url = Some(image_url);
        Ok(())
    }

    pub fn record_point(&mut self, id: DataPointId) -> ExplorerResult<()> {
        self.advance(FileStatus::PointCreated)?;
        self.data_point_id = Some(id);
        Ok(())
    }

    /// Payload entry for files that are waiting on the embed call
    pub fn embed_item(&self) -> Option<EmbedItem> {
        match (self.status, self.data_point_id, &self.image_url) {
            (FileStatus::PointCreated, Some(id), Some(url)) => Some(EmbedItem {
                data_point_id: id,
                image_url: url.clone(),
            }),
            _ => None,
        }
    }

    fn into_failed(self) -> FailedFile {
        FailedFile {
            file_name: self.file.name,
            mime_type: self.file.mime_type,
            stage: self.failed_at.unwrap_or(FileStatus::Pending),
            error: self
                .error
                .unwrap_or_else(|| ExplorerError::Internal("file failed without a cause".into())),
        }
    }
}

/// Result of one ingestion run
#[derive(Debug, Default)]
pub struct IngestionReport {
    pub succeeded: Vec<DataPointRecord>,
    pub failed: Vec<FailedFile>,
}

impl IngestionReport {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// All files of one ingestion run, kept in selection order
#[derive(Debug, Default)]
pub struct IngestionBatch {
    entries: Vec<BatchEntry>,
}

impl IngestionBatch {
    pub fn new(files: Vec<ImageFile>) -> Self {
        Self {
            entries: files
                .into_iter()
                .enumerate()
                .map(|(index, file)| BatchEntry::new(index, file))
                .collect(),
        }
    }

    /// Rebuild a batch from entries processed out of order
    pub fn from_entries(mut entries: Vec<BatchEntry>) -> Self {
        entries.sort_by_key(|e| e.index);
        Self { entries }
    }

    pub fn entries(&self) -> &[BatchEntry] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [BatchEntry] {
        &mut self.entries
    }

    pub fn into_entries(self) -> Vec<BatchEntry> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count(&self, status: FileStatus) -> usize {
        self.entries.iter().filter(|e| e.status == status).count()
    }

    /// Items for the single embed/project call
    pub fn payload(&self) -> Vec<EmbedItem> {
        self.entries.iter().filter_map(BatchEntry::embed_item).collect()
    }

    /// Close the batch without an embed call
    pub fn into_report(self) -> IngestionReport {
        self.complete(Uuid::nil(), &HashMap::new())
    }

    /// Attach projections and split entries into succeeded and failed.
    /// A created point without a projection fails at `PointCreated`.
    pub fn complete(
        self,
        project_id: Uuid,
        coordinates: &HashMap<DataPointId, Vec<f64>>,
    ) -> IngestionReport {
        let mut report = IngestionReport::default();

        for mut entry in self.entries {
            if entry.status == FileStatus::PointCreated {
                let projected = entry
                    .data_point_id
                    .and_then(|id| coordinates.get(&id).map(|c| (id, c)));

                match (projected, entry.image_url.clone()) {
                    (Some((id, coordinate)), Some(image_url)) => {
                        if let Err(err) = entry.advance(FileStatus::Embedded) {
                            entry.fail(err);
                        } else {
                            report.succeeded.push(DataPointRecord {
                                id,
                                project_id,
                                label: entry.file.name.clone(),
                                image_url,
                                embedding_vector: None,
                                projected_coordinate: coordinate.clone(),
                            });
                            continue;
                        }
                    }
                    _ => entry.fail(ExplorerError::embedding_service(ExplorerError::Validation(
                        "no projection returned".to_string(),
                    ))),
                }
            } else if entry.status != FileStatus::Failed {
                let status = entry.status;
                entry.fail(ExplorerError::Internal(format!(
                    "file left the pipeline at {}",
                    status
                )));
            }

            report.failed.push(entry.into_failed());
        }

        report
    }
}
