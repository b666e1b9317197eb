//! Job handlers, one per job type.

pub mod batch_embedding;
pub mod data_migration;
pub mod resume_processing;

pub use batch_embedding::{BatchEmbeddingHandler, BatchEmbeddingPayload, EmbeddingTally};
pub use data_migration::{DataMigrationHandler, DataMigrationPayload, MigrationOperation};
pub use resume_processing::{resolve_upload_path, ResumeJobPayload, ResumeProcessingHandler};
