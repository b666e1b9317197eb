//! # hireflow-matching
//!
//! Multi-pass LLM matching of candidates against job requirements.
//!
//! A run scores every active candidate once, re-scores the borderline ones
//! with enriched context from [`hireflow_enrichment`], auto-shortlists
//! scores of 70 and above, and records one audit row with totals and an
//! approximate token cost.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use hireflow_db::Database;
//! use hireflow_enrichment::EnrichmentService;
//! use hireflow_matching::{MatchingConfig, MatchingEngine};
//!
//! let db = Database::connect("postgres://...").await?;
//! let llm = Arc::new(hireflow_inference::OpenAIBackend::from_env()?);
//! let enrichment = EnrichmentService::new(Arc::new(db.external_profiles.clone()));
//!
//! let engine = MatchingEngine::from_database(&db, llm, MatchingConfig::from_env()?)
//!     .with_enrichment(enrichment);
//! let summary = engine.run(requirement_id, Some("recruiter@example.com")).await?;
//! println!("{} of {} scored", summary.successful_matches, summary.total_candidates);
//! ```

pub mod config;
pub mod engine;
pub mod prompts;
pub mod scoring;

pub use config::MatchingConfig;
pub use engine::{MatchRunSummary, MatchingEngine};
pub use scoring::{clamp_score, parse_score, parse_source_selection, ScoreReply, SourceSelection};

#[cfg(test)]
pub(crate) mod test_fixtures {
    use chrono::Utc;
    use hireflow_core::{Candidate, JobRequirement};
    use uuid::Uuid;

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
            resume_text: format!("{name}\nSoftware engineer"),
            content_hash: Uuid::new_v4().simple().to_string(),
            source_filename: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    pub fn requirement() -> JobRequirement {
        JobRequirement {
            id: Uuid::new_v4(),
            title: "Platform Engineer".to_string(),
            description: "Own the ingestion platform.".to_string(),
            required_skills: vec!["rust".to_string(), "postgres".to_string()],
            preferred_skills: Vec::new(),
            min_years_experience: Some(4.0),
            education_level: None,
            domain: None,
            is_active: true,
            created_at: Utc::now(),
        }
    }
}
