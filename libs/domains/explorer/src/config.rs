use crate::embedding::EmbeddingServiceConfig;
use crate::error::ExplorerResult;
use crate::ingestion::IngestionConfig;
use crate::overlay::OverlayConfig;
use crate::storage::StorageConfig;

/// Complete explorer configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExplorerConfig {
    pub embedding: EmbeddingServiceConfig,
    pub ingestion: IngestionConfig,
    pub overlay: OverlayConfig,
    pub storage: StorageConfig,
}

impl ExplorerConfig {
    pub fn from_env() -> ExplorerResult<Self> {
        let config = Self {
            embedding: EmbeddingServiceConfig::from_env()?,
            ingestion: IngestionConfig::from_env()?,
            overlay: OverlayConfig::from_env()?,
            storage: StorageConfig::from_env()?,
        };

        tracing::debug!(
            embedding_url = %config.embedding.http.base_url,
            variant = %config.embedding.variant,
            concurrency = config.ingestion.concurrency,
            "Loaded explorer configuration"
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EndpointVariant;
    use crate::error::ExplorerError;

    const VARS: [&str; 11] = [
        "EMBEDDING_SERVICE_URL",
        "EMBEDDING_SERVICE_TIMEOUT_SECS",
        "EMBEDDING_SERVICE_VARIANT",
        "INGEST_CONCURRENCY",
        "INGEST_MIN_COLD_START_BATCH",
        "COMPRESSION_MAX_BYTES",
        "COMPRESSION_MAX_DIMENSION",
        "OVERLAY_ZOOM_THRESHOLD",
        "OVERLAY_THUMBNAIL_SIZE",
        "OVERLAY_OPACITY",
        "STORAGE_PUBLIC_URL",
    ];

    #[test]
    fn test_defaults_when_unset() {
        temp_env::with_vars_unset(VARS, || {
            let config = ExplorerConfig::from_env().unwrap();
            assert_eq!(config, ExplorerConfig::default());
            assert_eq!(config.embedding.http.base_url, "http://127.0.0.1:5000");
            assert_eq!(config.ingestion.min_cold_start_batch, 3);
            assert_eq!(config.ingestion.compression.max_bytes, 100 * 1024);
        });
    }

    #[test]
    fn test_reads_overrides() {
        temp_env::with_vars(
            [
                ("EMBEDDING_SERVICE_URL", Some("http://embed.internal:8080")),
                ("EMBEDDING_SERVICE_VARIANT", Some("Split")),
                ("COMPRESSION_MAX_DIMENSION", Some("1024")),
                ("STORAGE_PUBLIC_URL", Some("https://cdn.example.com/images")),
            ],
            || {
                let config = ExplorerConfig::from_env().unwrap();
                assert_eq!(config.embedding.http.base_url, "http://embed.internal:8080");
                assert_eq!(config.embedding.variant, EndpointVariant::Split);
                assert_eq!(config.ingestion.compression.max_dimension, 1024);
                assert_eq!(config.storage.public_base_url, "https://cdn.example.com/images");
            },
        );
    }

    #[test]
    fn test_unknown_variant_is_a_config_error() {
        temp_env::with_var("EMBEDDING_SERVICE_VARIANT", Some("streaming"), || {
            let err = ExplorerConfig::from_env().unwrap_err();
            assert!(matches!(err, ExplorerError::Config(_)));
        });
    }
}
