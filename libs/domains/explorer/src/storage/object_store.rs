use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{ExplorerError, ExplorerResult};
use crate::models::ImageKind;

/// Object storage for compressed images
///
/// Paths are project-scoped (`{project_id}/...`) so a whole project can be
/// listed and removed by prefix.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store a blob under `path`, overwriting any previous blob
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> ExplorerResult<()>;

    /// Resolve a stored blob to its stable public URL
    async fn public_url(&self, path: &str) -> ExplorerResult<String>;

    /// List blob paths that start with `prefix`
    async fn list(&self, prefix: &str) -> ExplorerResult<Vec<String>>;

    /// Delete blobs, returning how many existed
    async fn delete(&self, paths: &[String]) -> ExplorerResult<usize>;
}

/// Build the storage path for an uploaded image
pub fn object_path(project_id: Uuid, file_name: &str, kind: ImageKind) -> String {
    let stem = file_name
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(file_name);
    let safe: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    format!(
        "{}/{}-{}.{}",
        project_id,
        Uuid::new_v4(),
        safe,
        kind.extension()
    )
}

/// Storage settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub public_base_url: String,
}

impl StorageConfig {
    pub fn new(public_base_url: impl Into<String>) -> Self {
        Self {
            public_base_url: public_base_url.into(),
        }
    }

    pub fn from_env() -> ExplorerResult<Self> {
        Ok(Self::new(core_config::env_or_default(
            "STORAGE_PUBLIC_URL",
            "http://localhost:54321/storage/v1/object/public/images",
        )))
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::new("http://localhost:54321/storage/v1/object/public/images")
    }
}

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    content_type: String,
}

/// In-memory implementation of ObjectStorage (for development/testing)
#[derive(Debug, Clone)]
pub struct InMemoryObjectStorage {
    config: StorageConfig,
    objects: Arc<RwLock<BTreeMap<String, StoredObject>>>,
}

impl InMemoryObjectStorage {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            objects: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Bytes and content type of a stored blob
    pub async fn get(&self, path: &str) -> Option<(Vec<u8>, String)> {
        let objects = self.objects.read().await;
        objects
            .get(path)
            .map(|o| (o.bytes.clone(), o.content_type.clone()))
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

impl Default for InMemoryObjectStorage {
    fn default() -> Self {
        Self::new(StorageConfig::default())
    }
}

#[async_trait]
impl ObjectStorage for InMemoryObjectStorage {
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> ExplorerResult<()> {
        if path.is_empty() {
            return Err(ExplorerError::Storage("empty object path".to_string()));
        }

        let mut objects = self.objects.write().await;
        objects.insert(
            path.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );

        tracing::debug!(path = path, "Stored object");
        Ok(())
    }

    async fn public_url(&self, path: &str) -> ExplorerResult<String> {
        let objects = self.objects.read().await;
        if !objects.contains_key(path) {
            return Err(ExplorerError::Storage(format!("object not found: {}", path)));
        }

        Ok(format!(
            "{}/{}",
            self.config.public_base_url.trim_end_matches('/'),
            path
        ))
    }

    async fn list(&self, prefix: &str) -> ExplorerResult<Vec<String>> {
        let objects = self.objects.read().await;
        Ok(objects
            .keys()
            .filter(|path| path.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn delete(&self, paths: &[String]) -> ExplorerResult<usize> {
        let mut objects = self.objects.write().await;
        let removed = paths
            .iter()
            .filter(|path| objects.remove(path.as_str()).is_some())
            .count();

        tracing::debug!(requested = paths.len(), removed = removed, "Deleted objects");
        Ok(removed)
    }
}
