//! # hireflow-core
//!
//! Core types, traits, and abstractions for hireflow.
//!
//! This crate provides the data model shared by the job queue, the resume
//! ingestion pipeline and the matching engine, together with the repository
//! and backend traits that the database and inference crates implement.

pub mod defaults;
pub mod error;
pub mod lenient;
pub mod logging;
pub mod models;
pub mod traits;
pub mod uuid_utils;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use traits::*;
pub use uuid_utils::new_v7;
