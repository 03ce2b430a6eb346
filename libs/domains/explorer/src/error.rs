use core_config::ConfigError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ExplorerError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Unsupported file type '{mime_type}' for {file_name}")]
    UnsupportedFileType {
        file_name: String,
        mime_type: String,
    },

    #[error("Invalid probe: {0}")]
    InvalidProbe(String),

    #[error("A new project needs at least {required} images, got {provided}")]
    InsufficientBatchSize { required: usize, provided: usize },

    #[error("Compression failed: {0}")]
    Compression(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Remote service returned {status}: {message}")]
    RemoteService { status: u16, message: String },

    #[error("Embedding service error: {0}")]
    EmbeddingService(#[source] Box<ExplorerError>),

    #[error("Result for project {project_id} arrived after the project was closed")]
    StaleContext { project_id: Uuid },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type ExplorerResult<T> = Result<T, ExplorerError>;

/// Coarse error class used for user-facing messages and metric labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCategory {
    Validation,
    Transport,
    Remote,
    State,
    Internal,
}

impl ExplorerError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ExplorerError::Validation(_)
            | ExplorerError::UnsupportedFileType { .. }
            | ExplorerError::InvalidProbe(_)
            | ExplorerError::InsufficientBatchSize { .. } => ErrorCategory::Validation,
            ExplorerError::Storage(_)
            | ExplorerError::Repository(_)
            | ExplorerError::Transport(_) => ErrorCategory::Transport,
            ExplorerError::RemoteService { .. } => ErrorCategory::Remote,
            ExplorerError::EmbeddingService(inner) => inner.category(),
            ExplorerError::StaleContext { .. } => ErrorCategory::State,
            ExplorerError::Compression(_)
            | ExplorerError::Config(_)
            | ExplorerError::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// True when the result belongs to a project that is no longer active
    pub fn is_stale(&self) -> bool {
        matches!(self, ExplorerError::StaleContext { .. })
    }

    /// Wrap a failure of the batched embed/project call
    pub fn embedding_service(err: ExplorerError) -> Self {
        match err {
            already @ ExplorerError::EmbeddingService(_) => already,
            other => ExplorerError::EmbeddingService(Box::new(other)),
        }
    }
}

impl From<reqwest::Error> for ExplorerError {
    fn from(err: reqwest::Error) -> Self {
        ExplorerError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for ExplorerError {
    fn from(err: serde_json::Error) -> Self {
        ExplorerError::Internal(format!("JSON error: {}", err))
    }
}

impl From<image::ImageError> for ExplorerError {
    fn from(err: image::ImageError) -> Self {
        ExplorerError::Compression(err.to_string())
    }
}

impl From<ConfigError> for ExplorerError {
    fn from(err: ConfigError) -> Self {
        ExplorerError::Config(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ExplorerError {
    fn from(err: tokio::task::JoinError) -> Self {
        ExplorerError::Internal(format!("background task failed: {}", err))
    }
}
