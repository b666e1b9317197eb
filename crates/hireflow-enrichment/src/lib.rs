//! # hireflow-enrichment
//!
//! External profile enrichment for the matching engine's second pass.
//!
//! This crate provides:
//! - The [`EnrichmentSource`] abstraction and a web search source
//! - [`EnrichmentService`], which caches every fetch outcome per
//!   (candidate, source) and refetches once the staleness TTL has passed
//! - A locally synthesized summary used when no source has data
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use hireflow_enrichment::{EnrichmentService, WebSearchSource};
//!
//! let mut service = EnrichmentService::new(Arc::new(db.external_profiles.clone())).with_ttl_days(7);
//! if let Some(search) = WebSearchSource::from_env()? {
//!     service = service.with_source(Arc::new(search));
//! }
//! let context = service.enrich_all(&candidate).await?;
//! println!("{}", context.render());
//! ```

pub mod service;
pub mod source;
pub mod summary;
pub mod web_search;

pub use service::{EnrichedContext, EnrichmentService, ProfileSection, SourceInfo};
pub use source::{EnrichmentSource, FetchedProfile, SourceOutcome};
pub use summary::{local_summary, LOCAL_SOURCE};
pub use web_search::{build_query, WebSearchConfig, WebSearchSource, WEB_SEARCH_SOURCE};

#[cfg(test)]
pub(crate) mod test_fixtures {
    use chrono::Utc;
    use hireflow_core::Candidate;
    use uuid::Uuid;

    /// Active candidate with only a name and resume text.
    pub fn candidate(name: &str) -> Candidate {
        Candidate {
            id: Uuid::new_v4(),
            full_name: name.to_string(),
            email: None,
            phone: None,
            location: None,
            current_title: None,
            years_of_experience: None,
            skills: Vec::new(),
            education: None,
            summary: None,
            experience_summary: None,
            resume_text: format!("{name} resume"),
            content_hash: String::new(),
            source_filename: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}
