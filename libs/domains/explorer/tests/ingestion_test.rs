//! Integration tests for batch ingestion
//!
//! These tests run the orchestrator against:
//! - The stub embedding service over real HTTP
//! - The `image`-backed JPEG compressor
//! - In-memory object storage and data-point repository

use domain_explorer::*;
use std::sync::Arc;
use test_utils::{StubEmbeddingServer, TestDataBuilder, assertions::*, images, stub_server};
use uuid::Uuid;

struct Harness {
    server: StubEmbeddingServer,
    storage: InMemoryObjectStorage,
    repository: InMemoryDataPointRepository,
    orchestrator: IngestionOrchestrator,
}

async fn harness(variant: EndpointVariant, dimension: usize) -> Harness {
    test_utils::init_test_tracing();
    let server = StubEmbeddingServer::start_with_dimension(dimension).await;
    let embedding = HttpEmbeddingService::new(
        EmbeddingServiceConfig::new(server.url())
            .with_variant(variant)
            .with_timeout(5),
    )
    .unwrap();

    let storage = InMemoryObjectStorage::new(StorageConfig::new("https://cdn.test/images"));
    let repository = InMemoryDataPointRepository::new();
    let orchestrator = IngestionOrchestrator::new(
        Arc::new(storage.clone()),
        Arc::new(repository.clone()),
        Arc::new(embedding),
        Arc::new(JpegCompressor::default()),
    );

    Harness {
        server,
        storage,
        repository,
        orchestrator,
    }
}

fn pngs(builder: &TestDataBuilder, count: usize) -> Vec<ImageFile> {
    (0..count)
        .map(|i| {
            ImageFile::new(
                builder.file_name(i, "png"),
                "image/png",
                images::solid_png(64, 48, [i as u8 * 40, 100, 200]),
            )
        })
        .collect()
}

// ============================================================================
// Happy path
// ============================================================================

#[tokio::test]
async fn test_fresh_project_three_images_single_embed_call() {
    let h = harness(EndpointVariant::Batched, 2).await;
    let builder = TestDataBuilder::from_test_name("fresh_three");
    let project_id = builder.project_id();

    let report = h
        .orchestrator
        .ingest(pngs(&builder, 3), project_id, 0)
        .await
        .unwrap();

    assert_eq!(report.succeeded.len(), 3);
    assert!(report.failed.is_empty());
    for record in &report.succeeded {
        assert_uuid_eq(record.project_id, project_id, "record project");
        assert_eq!(record.projected_coordinate.len(), 2);
        assert!(record.image_url.starts_with("https://cdn.test/images/"));
    }

    assert_eq!(h.server.calls(stub_server::EMBED_AND_PROJECT), 1);
    assert_eq!(h.server.total_calls(), 1);
    assert_eq!(h.storage.len().await, 3);
    assert_eq!(h.repository.count_by_project(project_id).await.unwrap(), 3);

    let body = &h.server.bodies(stub_server::EMBED_AND_PROJECT)[0];
    assert_eq!(body["project_id"], project_id.to_string());
    assert_eq!(body["items"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_three_component_projection() {
    let h = harness(EndpointVariant::Batched, 3).await;
    let builder = TestDataBuilder::from_test_name("three_d");

    let report = h
        .orchestrator
        .ingest(pngs(&builder, 3), builder.project_id(), 0)
        .await
        .unwrap();

    assert!(report.succeeded.iter().all(|r| r.projected_coordinate.len() == 3));
}

#[tokio::test]
async fn test_existing_project_accepts_single_image() {
    let h = harness(EndpointVariant::Batched, 2).await;
    let builder = TestDataBuilder::from_test_name("existing_single");

    let report = h
        .orchestrator
        .ingest(pngs(&builder, 1), builder.project_id(), 5)
        .await
        .unwrap();

    assert_eq!(report.succeeded.len(), 1);
}

#[tokio::test]
async fn test_large_image_is_compressed_before_upload() {
    let h = harness(EndpointVariant::Batched, 2).await;
    let builder = TestDataBuilder::from_test_name("large_image");
    let project_id = builder.project_id();

    let mut files = pngs(&builder, 2);
    files.push(ImageFile::new(
        "huge.png",
        "image/png",
        images::noise_png(1200, 900, 11),
    ));

    let report = h.orchestrator.ingest(files, project_id, 0).await.unwrap();
    assert_eq!(report.succeeded.len(), 3);

    let paths = h.storage.list(&format!("{}/", project_id)).await.unwrap();
    let huge = paths
        .iter()
        .find(|p| p.ends_with("-huge.jpg"))
        .expect("compressed upload stored as JPEG");
    let (bytes, content_type) = assert_some(h.storage.get(huge).await, "stored object");

    assert_eq!(content_type, "image/jpeg");
    assert!(bytes.len() <= CompressionPolicy::default().max_bytes);
}

#[tokio::test]
async fn test_split_variant_reduces_to_same_shape() {
    let h = harness(EndpointVariant::Split, 2).await;
    let builder = TestDataBuilder::from_test_name("split_variant");

    let report = h
        .orchestrator
        .ingest(pngs(&builder, 3), builder.project_id(), 0)
        .await
        .unwrap();

    assert_eq!(report.succeeded.len(), 3);
    assert_eq!(h.server.calls(stub_server::EXTRACT_CLIP), 1);
    assert_eq!(h.server.calls(stub_server::EXTRACT_PCA), 1);
    assert_eq!(h.server.calls(stub_server::EMBED_AND_PROJECT), 0);
}

// ============================================================================
// Batch-level rejections
// ============================================================================

#[tokio::test]
async fn test_cold_start_guard_makes_no_network_calls() {
    for variant in [EndpointVariant::Batched, EndpointVariant::Split] {
        let h = harness(variant, 2).await;
        let builder = TestDataBuilder::from_test_name("cold_start");

        let result = h
            .orchestrator
            .ingest(pngs(&builder, 2), builder.project_id(), 0)
            .await;

        assert!(
            matches!(
                result,
                Err(ExplorerError::InsufficientBatchSize {
                    required: 3,
                    provided: 2
                })
            ),
            "Expected InsufficientBatchSize for {variant}, got {:?}",
            result.map(|r| r.total())
        );
        assert_eq!(h.server.total_calls(), 0);
        assert!(h.storage.is_empty().await);
    }
}

#[tokio::test]
async fn test_remote_failure_is_fatal_with_server_message() {
    let h = harness(EndpointVariant::Batched, 2).await;
    h.server
        .fail_route(stub_server::EMBED_AND_PROJECT, 500, "model not loaded");
    let builder = TestDataBuilder::from_test_name("remote_failure");

    let err = h
        .orchestrator
        .ingest(pngs(&builder, 3), builder.project_id(), 0)
        .await
        .unwrap_err();

    match err {
        ExplorerError::EmbeddingService(inner) => match *inner {
            ExplorerError::RemoteService { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "model not loaded");
            }
            other => panic!("Expected RemoteService, got {other:?}"),
        },
        other => panic!("Expected EmbeddingService, got {other:?}"),
    }
}

// ============================================================================
// Per-file failures
// ============================================================================

#[tokio::test]
async fn test_unsupported_types_are_reported_individually() {
    let h = harness(EndpointVariant::Batched, 2).await;
    let builder = TestDataBuilder::from_test_name("unsupported");

    let mut files = pngs(&builder, 3);
    files.insert(1, ImageFile::new("notes.txt", "text/plain", b"hello".to_vec()));
    files.push(ImageFile::new("scan.bmp", "image/bmp", vec![b'B', b'M']));

    let report = h
        .orchestrator
        .ingest(files, builder.project_id(), 0)
        .await
        .unwrap();

    assert_eq!(report.succeeded.len(), 3);
    let failed: Vec<_> = report.failed.iter().map(|f| f.file_name.as_str()).collect();
    assert_eq!(failed, vec!["notes.txt", "scan.bmp"]);
    assert!(report
        .failed
        .iter()
        .all(|f| f.error.category() == ErrorCategory::Validation));

    let body = &h.server.bodies(stub_server::EMBED_AND_PROJECT)[0];
    assert_eq!(body["items"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_corrupt_image_fails_alone() {
    let h = harness(EndpointVariant::Batched, 2).await;
    let builder = TestDataBuilder::from_test_name("corrupt");

    let mut files = pngs(&builder, 3);
    files.push(ImageFile::new("broken.png", "image/png", vec![0x89, 0x50, 0x00]));

    let report = h
        .orchestrator
        .ingest(files, builder.project_id(), 0)
        .await
        .unwrap();

    assert_eq!(report.succeeded.len(), 3);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].stage, FileStatus::Validated);
    assert!(matches!(report.failed[0].error, ExplorerError::Compression(_)));
    assert_eq!(h.storage.len().await, 3);
}

#[tokio::test]
async fn test_point_missing_from_response_fails_that_file() {
    let h = harness(EndpointVariant::Batched, 2).await;
    h.server.omit_point(2);
    let builder = TestDataBuilder::from_test_name("missing_projection");

    let report = h
        .orchestrator
        .ingest(pngs(&builder, 3), builder.project_id(), 0)
        .await
        .unwrap();

    let ids: Vec<_> = report.succeeded.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![1, 3]);
    assert_eq!(report.failed[0].stage, FileStatus::PointCreated);
    assert!(report.failed[0].reason().contains("no projection returned"));
}

#[tokio::test]
async fn test_everything_rejected_skips_embed_call() {
    let h = harness(EndpointVariant::Batched, 2).await;
    let files = (0..3)
        .map(|i| ImageFile::new(format!("{i}.webp"), "image/webp", vec![1, 2, 3]))
        .collect();

    let report = h.orchestrator.ingest(files, Uuid::new_v4(), 0).await.unwrap();

    assert!(report.succeeded.is_empty());
    assert_eq!(report.failed.len(), 3);
    assert_eq!(h.server.total_calls(), 0);
}
