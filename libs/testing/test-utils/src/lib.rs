//! Shared test utilities for the explorer crates
//!
//! This crate provides reusable test infrastructure:
//! - `StubEmbeddingServer`: local HTTP stand-in for the embedding/projection service
//! - `images`: PNG/JPEG/GIF fixtures generated in memory
//! - `TestDataBuilder`: Deterministic test data generation
//! - `assertions`: Custom assertion helpers
//! - `init_test_tracing`: opt-in log output for debugging tests
//!
//! # Usage
//!
//! ```rust,no_run
//! use test_utils::{StubEmbeddingServer, TestDataBuilder, images, stub_server};
//!
//! #[tokio::test]
//! async fn my_ingestion_test() {
//!     let server = StubEmbeddingServer::start().await;
//!     let builder = TestDataBuilder::from_test_name("my_ingestion_test");
//!
//!     let project_id = builder.project_id();
//!     let png = images::solid_png(64, 64, [255, 0, 0]);
//!
//!     // ... point the client at server.url() ...
//!
//!     assert_eq!(server.calls(stub_server::EMBED_AND_PROJECT), 1);
//! }
//! ```

use uuid::Uuid;

pub mod images;
pub mod stub_server;

pub use stub_server::StubEmbeddingServer;

/// Install a test subscriber honouring `RUST_LOG`; safe to call from every test
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Builder for test data with deterministic randomization
///
/// This ensures tests are reproducible by using seeded random data.
pub struct TestDataBuilder {
    seed: u64,
}

impl TestDataBuilder {
    /// Create a new builder with a seed (for deterministic tests)
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Create from test name (generates seed from test name hash)
    ///
    /// This is the recommended way to create a builder for consistent test data.
    ///
    /// # Example
    ///
    /// ```
    /// use test_utils::TestDataBuilder;
    ///
    /// let builder = TestDataBuilder::from_test_name("test_create_resource");
    /// ```
    pub fn from_test_name(name: &str) -> Self {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        Self::new(hasher.finish())
    }

    /// Generate a unique project ID for testing
    pub fn project_id(&self) -> Uuid {
        // Use seed to generate deterministic UUID
        let bytes = self.seed.to_le_bytes();
        let mut uuid_bytes = [0u8; 16];
        uuid_bytes[..8].copy_from_slice(&bytes);
        uuid_bytes[8..16].copy_from_slice(&bytes);
        Uuid::from_bytes(uuid_bytes)
    }

    /// Generate a unique name for testing
    ///
    /// # Arguments
    ///
    /// * `prefix` - The type of resource (e.g., "project", "image")
    /// * `suffix` - A unique identifier within the test (e.g., "main", "backup")
    ///
    /// # Example
    ///
    /// ```
    /// use test_utils::TestDataBuilder;
    ///
    /// let builder = TestDataBuilder::from_test_name("my_test");
    /// let name = builder.name("project", "main");
    /// // Returns: "test-project-12345-main"
    /// ```
    pub fn name(&self, prefix: &str, suffix: &str) -> String {
        format!("test-{}-{}-{}", prefix, self.seed, suffix)
    }

    /// File name for the `index`-th image of a batch
    pub fn file_name(&self, index: usize, extension: &str) -> String {
        format!("{}.{}", self.name("image", &index.to_string()), extension)
    }
}

/// Test assertion helpers
pub mod assertions {
    use uuid::Uuid;

    /// Assert that two UUIDs are equal with a nice error message
    pub fn assert_uuid_eq(actual: Uuid, expected: Uuid, context: &str) {
        assert_eq!(
            actual, expected,
            "{}: expected UUID {}, got {}",
            context, expected, actual
        );
    }

    /// Assert that an optional value is Some
    pub fn assert_some<T>(value: Option<T>, context: &str) -> T {
        value.unwrap_or_else(|| panic!("{}: expected Some, got None", context))
    }
}
