//! Provider abstractions for embeddings and vector storage
//!
//! Pipelines depend only on the `Embedder` and `VectorIndexClient` traits, so
//! local backends and HTTP services are interchangeable.

pub mod embedding;
pub mod local;
pub mod ollama;
pub mod qdrant;
pub mod vector_store;

pub use embedding::Embedder;
pub use local::{HashEmbedder, InMemoryVectorIndex};
pub use ollama::OllamaEmbedder;
pub use qdrant::QdrantIndex;
pub use vector_store::{
    DistanceMetric, EntryManifest, EntryPayload, IndexEntry, ScoredEntry, VectorIndexClient,
};
