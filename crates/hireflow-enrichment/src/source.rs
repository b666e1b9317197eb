//! Enrichment source abstraction.

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use hireflow_core::{Candidate, Result};

/// Profile data a source found for a candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedProfile {
    /// Most relevant URL for the profile, if any.
    pub profile_url: Option<String>,
    /// Source response kept for later inspection.
    pub raw_data: Option<JsonValue>,
    /// Text appended to re-match prompts.
    pub summary: String,
}

/// Result of a successful call to a source.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceOutcome {
    Found(FetchedProfile),
    /// The source answered but knows nothing about the candidate.
    NotFound,
}

/// An external provider of candidate profile information.
///
/// `fetch` returns `Err` for anything other than a clean answer (network
/// failure, error status, unreadable body); the caller caches that as FAILED.
#[async_trait]
pub trait EnrichmentSource: Send + Sync {
    /// Stable name, used as the cache key together with the candidate id.
    fn name(&self) -> &str;

    /// One-line description shown to the model when it picks sources.
    fn description(&self) -> &str;

    async fn fetch(&self, candidate: &Candidate) -> Result<SourceOutcome>;
}
