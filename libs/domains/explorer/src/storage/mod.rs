//! Collaborator interfaces for durable state: blob storage and the
//! relational data-point store, each with an in-memory implementation.

mod object_store;
mod repository;

pub use object_store::{InMemoryObjectStorage, ObjectStorage, StorageConfig, object_path};
pub use repository::{DataPointRepository, InMemoryDataPointRepository};

#[cfg(test)]
pub use object_store::MockObjectStorage;
#[cfg(test)]
pub use repository::MockDataPointRepository;
