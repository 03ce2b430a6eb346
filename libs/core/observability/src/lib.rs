//! Observability utilities for the embedding explorer.
//!
//! This crate provides:
//! - Prometheus recorder installation and text rendering
//! - `ExplorerMetrics` for ingestion, refresh, overlay and query activity
//!
//! Recording through `ExplorerMetrics` before `init_metrics` is a no-op,
//! so library code can record unconditionally.
//!
//! # Example
//!
//! ```rust,ignore
//! use observability::{init_metrics, render_metrics, ExplorerMetrics};
//!
//! init_metrics()?;
//! ExplorerMetrics::record_ingestion(3, 0, 120);
//! println!("{}", render_metrics());
//! ```

pub mod explorer;

pub use explorer::ExplorerMetrics;

// Re-export metrics macros for convenience
pub use metrics::{counter, gauge, histogram};

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing::info;

static METRICS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the Prometheus metrics recorder.
///
/// Subsequent calls return the handle installed by the first successful call.
pub fn init_metrics() -> Result<&'static PrometheusHandle, BuildError> {
    METRICS_HANDLE.get_or_try_init(|| {
        let handle = PrometheusBuilder::new().install_recorder()?;

        info!("Prometheus metrics recorder initialized");
        register_metric_descriptions();

        Ok(handle)
    })
}

/// Get the metrics handle (must call init_metrics first)
pub fn get_metrics_handle() -> Option<&'static PrometheusHandle> {
    METRICS_HANDLE.get()
}

/// Render the Prometheus exposition text
pub fn render_metrics() -> String {
    match get_metrics_handle() {
        Some(handle) => handle.render(),
        None => "# Metrics not initialized\n".to_string(),
    }
}

fn register_metric_descriptions() {
    use metrics::describe_counter;
    use metrics::describe_gauge;
    use metrics::describe_histogram;

    // Ingestion
    describe_counter!(
        "explorer_ingestion_runs_total",
        "Ingestion runs by outcome"
    );
    describe_counter!(
        "explorer_ingested_files_total",
        "Files processed by ingestion, by result"
    );
    describe_counter!(
        "explorer_file_failures_total",
        "Per-file ingestion failures by pipeline stage"
    );
    describe_histogram!(
        "explorer_ingestion_duration_seconds",
        "Ingestion run duration in seconds"
    );
    describe_histogram!(
        "explorer_embed_batch_size",
        "Items sent in one embed/project call"
    );

    // Coordinate store
    describe_counter!(
        "explorer_refresh_total",
        "Coordinate store refreshes by outcome"
    );
    describe_gauge!(
        "explorer_store_points",
        "Records held by the coordinate store after the last refresh"
    );

    // Overlays
    describe_gauge!(
        "explorer_overlay_directives",
        "Overlay directives produced for the latest viewport"
    );

    // Queries
    describe_counter!(
        "explorer_queries_total",
        "Similarity queries by probe kind and outcome"
    );
    describe_histogram!(
        "explorer_query_duration_seconds",
        "Similarity query latency in seconds"
    );
}
