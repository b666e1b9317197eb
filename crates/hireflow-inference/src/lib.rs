//! # hireflow-inference
//!
//! LLM inference backend for hireflow.
//!
//! This crate provides:
//! - An OpenAI-compatible implementation of the embedding and generation
//!   backend traits (OpenAI, Azure OpenAI, vLLM, LocalAI, Ollama's `/v1`)
//! - Helpers that pull a typed JSON document out of free-form model output
//! - Mock backends for tests in dependent crates (feature `mock`)
//!
//! # Example
//!
//! ```rust,no_run
//! use hireflow_inference::OpenAIBackend;
//! use hireflow_core::GenerationBackend;
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = OpenAIBackend::from_env().unwrap();
//!     let reply = backend.generate("Say hello").await.unwrap();
//!     println!("{reply}");
//! }
//! ```

pub mod json;
pub mod openai;

// Mock inference backends for testing
#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use json::{extract_json_object, parse_json, strip_json_fences, strip_think_tags};
pub use openai::{OpenAIBackend, OpenAIConfig};
