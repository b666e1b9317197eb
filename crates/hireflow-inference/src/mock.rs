//! Mock inference backends for deterministic testing.
//!
//! Enabled under `cfg(test)` and by the `mock` feature, so dependent crates
//! can pull them in as a dev-dependency:
//!
//! ```toml
//! [dev-dependencies]
//! hireflow-inference = { workspace = true, features = ["mock"] }
//! ```
//!
//! ```rust,ignore
//! use hireflow_inference::mock::ScriptedGenerationBackend;
//! use hireflow_core::GenerationBackend;
//!
//! let llm = ScriptedGenerationBackend::new()
//!     .with_rule("Ada Lovelace", r#"{"match_score": 82}"#)
//!     .with_default(r#"{"match_score": 40}"#);
//!
//! let reply = llm.generate("Candidate: Ada Lovelace").await?;
//! assert!(reply.contains("82"));
//! assert_eq!(llm.call_count(), 1);
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use hireflow_core::{EmbeddingBackend, Error, GenerationBackend, Result, Vector};

/// A canned reply: text, or a failure surfaced as [`Error::Inference`].
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    Fail(String),
}

impl MockReply {
    fn into_result(self) -> Result<String> {
        match self {
            MockReply::Text(text) => Ok(text),
            MockReply::Fail(message) => Err(Error::Inference(message)),
        }
    }
}

impl From<&str> for MockReply {
    fn from(text: &str) -> Self {
        MockReply::Text(text.to_string())
    }
}

impl From<String> for MockReply {
    fn from(text: String) -> Self {
        MockReply::Text(text)
    }
}

/// One recorded generation call.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub system: String,
    pub prompt: String,
}

#[derive(Default)]
struct ScriptState {
    rules: Vec<(String, MockReply)>,
    queue: VecDeque<MockReply>,
    calls: Vec<MockCall>,
}

/// Generation backend that answers from a script.
///
/// Resolution order per call: the first rule whose needle occurs in the
/// prompt or system text, then the next queued reply, then the default.
#[derive(Clone)]
pub struct ScriptedGenerationBackend {
    state: Arc<Mutex<ScriptState>>,
    default_reply: MockReply,
    model: String,
}

impl ScriptedGenerationBackend {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ScriptState::default())),
            default_reply: MockReply::Text("{}".to_string()),
            model: "mock-gen".to_string(),
        }
    }

    /// Reply used when no rule matches and the queue is empty.
    pub fn with_default(mut self, reply: impl Into<MockReply>) -> Self {
        self.default_reply = reply.into();
        self
    }

    /// Reply with `reply` whenever `needle` occurs in the prompt or system text.
    pub fn with_rule(self, needle: impl Into<String>, reply: impl Into<MockReply>) -> Self {
        self.lock().rules.push((needle.into(), reply.into()));
        self
    }

    /// Queue a one-shot reply.
    pub fn push_reply(&self, reply: impl Into<MockReply>) {
        self.lock().queue.push_back(reply.into());
    }

    /// All calls made so far, in order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    /// Number of calls whose prompt contains `needle`.
    pub fn calls_containing(&self, needle: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.prompt.contains(needle))
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ScriptedGenerationBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerationBackend for ScriptedGenerationBackend {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.generate_with_system("", prompt).await
    }

    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String> {
        let reply = {
            let mut state = self.lock();
            state.calls.push(MockCall {
                system: system.to_string(),
                prompt: prompt.to_string(),
            });
            let ruled = state
                .rules
                .iter()
                .find(|(needle, _)| prompt.contains(needle) || system.contains(needle))
                .map(|(_, reply)| reply.clone());
            ruled
                .or_else(|| state.queue.pop_front())
                .unwrap_or_else(|| self.default_reply.clone())
        };
        reply.into_result()
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Embedding backend producing deterministic unit vectors from text.
#[derive(Clone)]
pub struct MockEmbeddingBackend {
    dimension: usize,
    fail: bool,
    calls: Arc<Mutex<usize>>,
}

impl MockEmbeddingBackend {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            fail: false,
            calls: Arc::new(Mutex::new(0)),
        }
    }

    /// Every call fails with [`Error::Embedding`].
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deterministic embedding derived from character codes, normalized.
    pub fn embedding_for(text: &str, dimension: usize) -> Vec<f32> {
        let mut vec = vec![0.0f32; dimension.max(1)];
        for (i, c) in text.chars().enumerate() {
            let idx = (c as usize + i) % vec.len();
            vec[idx] += 0.1;
        }
        let magnitude: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            vec.iter_mut().for_each(|x| *x /= magnitude);
        }
        vec.truncate(dimension);
        vec
    }
}

#[async_trait]
impl EmbeddingBackend for MockEmbeddingBackend {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        *self.calls.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        if self.fail {
            return Err(Error::Embedding("mock embedding failure".to_string()));
        }
        Ok(texts
            .iter()
            .map(|t| Vector::from(Self::embedding_for(t, self.dimension)))
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "mock-embed"
    }
}
