//! HTTP client for the embedding/projection service.
//!
//! Two deployment variants exist:
//! - **batched**: `POST /embed-and-project` embeds and projects in one call
//! - **split**: `POST /extract-clip-embeddings` followed by
//!   `POST /extract-pca-embeddings` for the whole project
//!
//! Both return one projected coordinate per data point.

use async_trait::async_trait;
use core_config::http_client::HttpClientConfig;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use strum::{Display, EnumString};
use tracing::instrument;
use uuid::Uuid;

use super::EmbeddingService;
use crate::error::{ExplorerError, ExplorerResult};
use crate::models::{DataPointId, DataPointRecord, EmbedItem, ProjectedPoint, QueryHit, QueryProbe};

/// Which endpoint contract the deployed service speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum EndpointVariant {
    #[default]
    Batched,
    Split,
}

/// Embedding service client configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmbeddingServiceConfig {
    pub http: HttpClientConfig,
    pub variant: EndpointVariant,
}

impl EmbeddingServiceConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: HttpClientConfig::new(base_url),
            variant: EndpointVariant::default(),
        }
    }

    pub fn with_variant(mut self, variant: EndpointVariant) -> Self {
        self.variant = variant;
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.http = self.http.with_timeout(secs);
        self
    }

    /// Reads `EMBEDDING_SERVICE_URL`, `EMBEDDING_SERVICE_TIMEOUT_SECS`
    /// and `EMBEDDING_SERVICE_VARIANT` (`batched` | `split`)
    pub fn from_env() -> ExplorerResult<Self> {
        let http = HttpClientConfig::from_env_prefixed("EMBEDDING_SERVICE")?;
        let variant =
            core_config::env_parse_or("EMBEDDING_SERVICE_VARIANT", EndpointVariant::default())?;

        Ok(Self { http, variant })
    }
}

/// reqwest-backed EmbeddingService
#[derive(Debug, Clone)]
pub struct HttpEmbeddingService {
    client: Client,
    config: EmbeddingServiceConfig,
}

impl HttpEmbeddingService {
    pub fn new(config: EmbeddingServiceConfig) -> ExplorerResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.http.timeout_secs))
            .build()?;

        Ok(Self { client, config })
    }

    pub fn from_env() -> ExplorerResult<Self> {
        Self::new(EmbeddingServiceConfig::from_env()?)
    }

    pub fn config(&self) -> &EmbeddingServiceConfig {
        &self.config
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> ExplorerResult<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.config.http.endpoint(path))
            .json(body)
            .send()
            .await?;

        Ok(ensure_success(response).await?.json().await?)
    }

    async fn embed_batched(
        &self,
        project_id: Uuid,
        items: &[EmbedItem],
    ) -> ExplorerResult<Vec<ProjectedPoint>> {
        self.post_json(
            "embed-and-project",
            &EmbedRequest {
                project_id,
                items,
            },
        )
        .await
    }

    async fn embed_split(
        &self,
        project_id: Uuid,
        items: &[EmbedItem],
    ) -> ExplorerResult<Vec<ProjectedPoint>> {
        let embedded: Vec<ExtractedEmbedding> = self
            .post_json(
                "extract-clip-embeddings",
                &EmbedRequest {
                    project_id,
                    items,
                },
            )
            .await?;

        if embedded.len() != items.len() {
            tracing::warn!(
                sent = items.len(),
                embedded = embedded.len(),
                "Embedding extraction returned a different number of rows"
            );
        }

        self.post_json("extract-pca-embeddings", &ProjectRequest { project_id })
            .await
    }
}

/// Map a non-2xx response to `RemoteService`, keeping the server's message
async fn ensure_success(response: Response) -> ExplorerResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ExplorerError::RemoteService {
        status: status.as_u16(),
        message: error_message(&body),
    })
}

/// Pull `error` / `message` / `detail` out of a JSON error body, else use the raw text
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            ["error", "message", "detail"]
                .iter()
                .find_map(|key| value.get(*key).and_then(|m| m.as_str()).map(str::to_string))
        })
        .unwrap_or_else(|| body.trim().to_string())
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    project_id: Uuid,
    items: &'a [EmbedItem],
}

#[derive(Debug, Serialize)]
struct ProjectRequest {
    project_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct ExtractedEmbedding {
    data_point_id: DataPointId,
    #[serde(default)]
    clip_embedding: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct TextQueryRequest<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    top_k: u32,
    text: &'a str,
    project_id: Uuid,
}

#[derive(Debug, Deserialize)]
struct StoredProjection {
    id: DataPointId,
    /// Set when `id` is the projection row rather than the data point
    #[serde(default)]
    data_point_id: Option<DataPointId>,
    embedding: Vec<f64>,
    #[serde(default)]
    data_points: Option<StoredDataPoint>,
}

#[derive(Debug, Default, Deserialize)]
struct StoredDataPoint {
    #[serde(default)]
    label: String,
    #[serde(default)]
    image_url: String,
}

impl StoredProjection {
    fn into_record(self, project_id: Uuid) -> DataPointRecord {
        let point = self.data_points.unwrap_or_default();
        DataPointRecord {
            id: self.data_point_id.unwrap_or(self.id),
            project_id,
            label: point.label,
            image_url: point.image_url,
            embedding_vector: None,
            projected_coordinate: self.embedding,
        }
    }
}

#[async_trait]
impl EmbeddingService for HttpEmbeddingService {
    #[instrument(skip(self, items), fields(project_id = %project_id, items = items.len(), variant = %self.config.variant))]
    async fn embed_and_project(
        &self,
        project_id: Uuid,
        items: Vec<EmbedItem>,
    ) -> ExplorerResult<Vec<ProjectedPoint>> {
        match self.config.variant {
            EndpointVariant::Batched => self.embed_batched(project_id, &items).await,
            EndpointVariant::Split => self.embed_split(project_id, &items).await,
        }
    }

    #[instrument(skip(self), fields(project_id = %project_id))]
    async fn retrieve_projected_points(
        &self,
        project_id: Uuid,
    ) -> ExplorerResult<Vec<DataPointRecord>> {
        let response = self
            .client
            .get(self.config.http.endpoint("retrieve-projected-points"))
            .query(&[("project_id", project_id.to_string())])
            .send()
            .await?;

        let rows: Vec<StoredProjection> = ensure_success(response).await?.json().await?;

        Ok(rows
            .into_iter()
            .map(|row| row.into_record(project_id))
            .collect())
    }

    #[instrument(skip(self, probe), fields(project_id = %project_id, kind = %probe.kind(), top_k = probe.top_k()))]
    async fn query(&self, project_id: Uuid, probe: &QueryProbe) -> ExplorerResult<Vec<QueryHit>> {
        let request = self.client.post(self.config.http.endpoint("query"));

        let request = match probe {
            QueryProbe::Text { text, top_k } => request.json(&TextQueryRequest {
                kind: "text",
                top_k: *top_k,
                text,
                project_id,
            }),
            QueryProbe::Image { blob, top_k } => {
                let file = Part::bytes(blob.bytes.clone())
                    .file_name(blob.name.clone())
                    .mime_str(&blob.mime_type)?;
                let form = Form::new()
                    .part("file", file)
                    .text("top_k", top_k.to_string())
                    .text("type", "image")
                    .text("project_id", project_id.to_string());
                request.multipart(form)
            }
        };

        let response = request.send().await?;
        Ok(ensure_success(response).await?.json().await?)
    }
}
