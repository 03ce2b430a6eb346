//! Stub of the embedding/projection HTTP service.
//!
//! Serves the batched and split embed contracts, point retrieval and `/query`
//! (JSON or multipart) on an ephemeral local port. Every request is counted
//! and its body recorded so tests can assert on what was sent.

use axum::extract::{FromRequest, Multipart, Query, Request, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const EMBED_AND_PROJECT: &str = "/embed-and-project";
pub const EXTRACT_CLIP: &str = "/extract-clip-embeddings";
pub const EXTRACT_PCA: &str = "/extract-pca-embeddings";
pub const RETRIEVE: &str = "/retrieve-projected-points";

/// Retrieve rows carry their own row id, distinct from the data point id
pub const PROJECTION_ROW_OFFSET: i64 = 1000;
pub const QUERY: &str = "/query";

#[derive(Debug, Clone)]
struct StoredPoint {
    id: i64,
    label: String,
    image_url: String,
    projected: bool,
}

#[derive(Debug, Default)]
struct StubInner {
    dimension: usize,
    calls: HashMap<String, usize>,
    bodies: HashMap<String, Vec<Value>>,
    failures: HashMap<String, (u16, String)>,
    omitted: Vec<i64>,
    points: BTreeMap<String, Vec<StoredPoint>>,
    query_hits: Value,
}

#[derive(Debug, Clone)]
struct StubState {
    inner: Arc<Mutex<StubInner>>,
}

impl StubState {
    fn lock(&self) -> std::sync::MutexGuard<'_, StubInner> {
        self.inner.lock().expect("stub state poisoned")
    }

    /// Count and record a request; returns the configured failure, if any
    fn record(&self, route: &str, body: Value) -> Option<Response> {
        let mut inner = self.lock();
        *inner.calls.entry(route.to_string()).or_default() += 1;
        inner.bodies.entry(route.to_string()).or_default().push(body);

        inner.failures.get(route).map(|(status, message)| {
            let status = StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(json!({ "error": message }))).into_response()
        })
    }
}

/// Deterministic coordinate for a data point
pub fn coordinate_for(id: i64, dimension: usize) -> Vec<f64> {
    let id = id as f64;
    [id * 0.1, -id * 0.1, id * 0.05]
        .into_iter()
        .take(dimension)
        .collect()
}

/// Running stub server; shuts down on drop
pub struct StubEmbeddingServer {
    addr: SocketAddr,
    state: StubState,
    handle: JoinHandle<()>,
}

impl StubEmbeddingServer {
    /// Start a stub returning 2D projections
    pub async fn start() -> Self {
        Self::start_with_dimension(2).await
    }

    pub async fn start_with_dimension(dimension: usize) -> Self {
        let state = StubState {
            inner: Arc::new(Mutex::new(StubInner {
                dimension,
                query_hits: json!([{ "data_point_id": 1, "label": "a", "similarity": 0.9 }]),
                ..Default::default()
            })),
        };

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind stub server");
        let addr = listener.local_addr().expect("Failed to read stub address");
        let app = router(state.clone());

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(error = %e, "Stub embedding server stopped");
            }
        });

        tracing::debug!(%addr, dimension, "Stub embedding server started");
        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Number of requests served on `route` (e.g. [`EMBED_AND_PROJECT`])
    pub fn calls(&self, route: &str) -> usize {
        self.state.lock().calls.get(route).copied().unwrap_or(0)
    }

    /// Total requests across every route
    pub fn total_calls(&self) -> usize {
        self.state.lock().calls.values().sum()
    }

    /// Bodies received on `route`; multipart bodies are summarised as JSON
    pub fn bodies(&self, route: &str) -> Vec<Value> {
        self.state.lock().bodies.get(route).cloned().unwrap_or_default()
    }

    /// Make every request on `route` fail with `status` and `{"error": message}`
    pub fn fail_route(&self, route: &str, status: u16, message: &str) {
        self.state
            .lock()
            .failures
            .insert(route.to_string(), (status, message.to_string()));
    }

    /// Leave `id` out of embed/project responses
    pub fn omit_point(&self, id: i64) {
        self.state.lock().omitted.push(id);
    }

    /// Replace the `/query` response body
    pub fn set_query_hits(&self, hits: Value) {
        self.state.lock().query_hits = hits;
    }

    /// Number of projected points held for a project
    pub fn projected_points(&self, project_id: &str) -> usize {
        self.state
            .lock()
            .points
            .get(project_id)
            .map(|points| points.iter().filter(|p| p.projected).count())
            .unwrap_or(0)
    }
}

impl Drop for StubEmbeddingServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn router(state: StubState) -> Router {
    Router::new()
        .route(EMBED_AND_PROJECT, post(embed_and_project))
        .route(EXTRACT_CLIP, post(extract_clip))
        .route(EXTRACT_PCA, post(extract_pca))
        .route(RETRIEVE, get(retrieve))
        .route(QUERY, post(query))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct EmbedItem {
    data_point_id: i64,
    image_url: String,
}

#[derive(Debug, Deserialize)]
struct EmbedBody {
    project_id: String,
    items: Vec<EmbedItem>,
}

#[derive(Debug, Deserialize)]
struct ProjectBody {
    project_id: String,
}

fn label_from_url(url: &str) -> String {
    url.rsplit('/').next().unwrap_or(url).to_string()
}

/// Add items to a project's point set; `projected` marks them as having a projection
fn store_items(inner: &mut StubInner, project_id: &str, items: &[EmbedItem], projected: bool) {
    let points = inner.points.entry(project_id.to_string()).or_default();
    for item in items {
        points.retain(|p| p.id != item.data_point_id);
        points.push(StoredPoint {
            id: item.data_point_id,
            label: label_from_url(&item.image_url),
            image_url: item.image_url.clone(),
            projected,
        });
    }
}

fn bad_request(message: String) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

async fn embed_and_project(State(state): State<StubState>, Json(body): Json<Value>) -> Response {
    if let Some(failure) = state.record(EMBED_AND_PROJECT, body.clone()) {
        return failure;
    }
    let body: EmbedBody = match serde_json::from_value(body) {
        Ok(body) => body,
        Err(e) => return bad_request(e.to_string()),
    };

    let mut inner = state.lock();
    store_items(&mut inner, &body.project_id, &body.items, true);
    let dimension = inner.dimension;
    let projections: Vec<Value> = body
        .items
        .iter()
        .filter(|item| !inner.omitted.contains(&item.data_point_id))
        .map(|item| {
            json!({
                "data_point_id": item.data_point_id,
                "projected_coordinate": coordinate_for(item.data_point_id, dimension),
            })
        })
        .collect();

    Json(projections).into_response()
}

async fn extract_clip(State(state): State<StubState>, Json(body): Json<Value>) -> Response {
    if let Some(failure) = state.record(EXTRACT_CLIP, body.clone()) {
        return failure;
    }
    let body: EmbedBody = match serde_json::from_value(body) {
        Ok(body) => body,
        Err(e) => return bad_request(e.to_string()),
    };

    let mut inner = state.lock();
    store_items(&mut inner, &body.project_id, &body.items, false);
    let embedded: Vec<Value> = body
        .items
        .iter()
        .map(|item| json!({ "data_point_id": item.data_point_id, "clip_embedding": [0.0, 1.0, 0.0, 1.0] }))
        .collect();

    Json(embedded).into_response()
}

/// Re-fit over every embedded point of the project
async fn extract_pca(State(state): State<StubState>, Json(body): Json<Value>) -> Response {
    if let Some(failure) = state.record(EXTRACT_PCA, body.clone()) {
        return failure;
    }
    let body: ProjectBody = match serde_json::from_value(body) {
        Ok(body) => body,
        Err(e) => return bad_request(e.to_string()),
    };

    let mut inner = state.lock();
    let dimension = inner.dimension;
    let omitted = inner.omitted.clone();
    let points = inner.points.entry(body.project_id).or_default();
    let projections: Vec<Value> = points
        .iter_mut()
        .filter(|p| !omitted.contains(&p.id))
        .map(|p| {
            p.projected = true;
            json!({ "data_point_id": p.id, "projected_coordinate": coordinate_for(p.id, dimension) })
        })
        .collect();

    Json(projections).into_response()
}

#[derive(Debug, Deserialize)]
struct RetrieveParams {
    project_id: String,
}

async fn retrieve(State(state): State<StubState>, Query(params): Query<RetrieveParams>) -> Response {
    if let Some(failure) = state.record(RETRIEVE, json!({ "project_id": params.project_id })) {
        return failure;
    }

    let inner = state.lock();
    let rows: Vec<Value> = inner
        .points
        .get(&params.project_id)
        .map(|points| {
            points
                .iter()
                .filter(|p| p.projected)
                .map(|p| {
                    json!({
                        "id": PROJECTION_ROW_OFFSET + p.id,
                        "data_point_id": p.id,
                        "embedding": coordinate_for(p.id, inner.dimension),
                        "data_points": { "label": p.label, "image_url": p.image_url },
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Json(rows).into_response()
}

/// Accepts `{type: "text", ...}` JSON or a multipart image form
async fn query(State(state): State<StubState>, request: Request) -> Response {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"));

    let body = if is_multipart {
        match summarise_multipart(request, &state).await {
            Ok(body) => body,
            Err(message) => return bad_request(message),
        }
    } else {
        match Json::<Value>::from_request(request, &state).await {
            Ok(Json(body)) => body,
            Err(rejection) => return rejection.into_response(),
        }
    };

    if let Some(failure) = state.record(QUERY, body) {
        return failure;
    }
    Json(state.lock().query_hits.clone()).into_response()
}

async fn summarise_multipart(request: Request, state: &StubState) -> Result<Value, String> {
    let mut multipart = Multipart::from_request(request, state)
        .await
        .map_err(|e| e.to_string())?;
    let mut summary = serde_json::Map::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| e.to_string())? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let file_name = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(str::to_string);
            let bytes = field.bytes().await.map_err(|e| e.to_string())?;
            summary.insert("file_name".into(), json!(file_name));
            summary.insert("content_type".into(), json!(content_type));
            summary.insert("file_size".into(), json!(bytes.len()));
        } else {
            let text = field.text().await.map_err(|e| e.to_string())?;
            summary.insert(name, json!(text));
        }
    }

    Ok(Value::Object(summary))
}
