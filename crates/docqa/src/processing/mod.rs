//! Indexing pipeline with retry, per-document locking and bounded concurrency

mod indexing;
mod locks;
mod retry;

pub use indexing::{IndexStage, IndexState, IndexingPipeline};
pub use locks::{DocumentGuard, DocumentLocks};
pub use retry::RetryPolicy;
