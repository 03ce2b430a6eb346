mod http;
mod service;

pub use http::{EmbeddingServiceConfig, EndpointVariant, HttpEmbeddingService};
pub use service::EmbeddingService;

#[cfg(test)]
pub use service::MockEmbeddingService;
