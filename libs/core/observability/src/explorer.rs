//! Embedding-explorer metrics.

use metrics::{counter, gauge, histogram};

/// Explorer metrics recorder
pub struct ExplorerMetrics;

impl ExplorerMetrics {
    // =========================================================================
    // Ingestion
    // =========================================================================

    /// Record a completed ingestion run
    pub fn record_ingestion(succeeded: usize, failed: usize, duration_ms: u64) {
        counter!("explorer_ingestion_runs_total", "outcome" => "completed").increment(1);
        counter!("explorer_ingested_files_total", "result" => "succeeded")
            .increment(succeeded as u64);
        counter!("explorer_ingested_files_total", "result" => "failed").increment(failed as u64);
        histogram!("explorer_ingestion_duration_seconds").record(duration_ms as f64 / 1000.0);

        tracing::debug!(
            succeeded = succeeded,
            failed = failed,
            duration_ms = duration_ms,
            "Recorded ingestion run"
        );
    }

    /// Record an ingestion run that ended with a batch-level error
    pub fn record_ingestion_aborted(reason: &str) {
        counter!(
            "explorer_ingestion_runs_total",
            "outcome" => "aborted",
            "reason" => reason.to_string()
        )
        .increment(1);
    }

    /// Record a single file dropping out of the pipeline
    pub fn record_file_failure(stage: &str) {
        counter!("explorer_file_failures_total", "stage" => stage.to_string()).increment(1);
    }

    /// Record the size of the batched embed/project payload
    pub fn record_embed_batch(items: usize) {
        histogram!("explorer_embed_batch_size").record(items as f64);
    }

    // =========================================================================
    // Coordinate store
    // =========================================================================

    /// Record a refresh outcome: "applied", "superseded" or "failed"
    pub fn record_refresh(outcome: &str, points: Option<usize>) {
        counter!("explorer_refresh_total", "outcome" => outcome.to_string()).increment(1);
        if let Some(points) = points {
            gauge!("explorer_store_points").set(points as f64);
        }
    }

    // =========================================================================
    // Overlays
    // =========================================================================

    pub fn set_overlay_count(count: usize) {
        gauge!("explorer_overlay_directives").set(count as f64);
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Record a similarity query by probe kind ("text" / "image")
    pub fn record_query(kind: &str, results: usize, duration_ms: u64) {
        counter!("explorer_queries_total", "kind" => kind.to_string(), "outcome" => "ok")
            .increment(1);
        histogram!("explorer_query_duration_seconds", "kind" => kind.to_string())
            .record(duration_ms as f64 / 1000.0);

        tracing::debug!(
            kind = kind,
            results = results,
            duration_ms = duration_ms,
            "Recorded similarity query"
        );
    }

    pub fn record_query_failed(kind: &str) {
        counter!("explorer_queries_total", "kind" => kind.to_string(), "outcome" => "error")
            .increment(1);
    }
}
