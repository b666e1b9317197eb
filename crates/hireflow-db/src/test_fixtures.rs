//! Test fixtures for database integration tests.
//!
//! The test database URL is configured via the `DATABASE_URL` environment
//! variable. If not set, defaults to [`DEFAULT_TEST_DATABASE_URL`]. The
//! database must already be migrated (`sqlx migrate run`).

use chrono::Utc;
use uuid::Uuid;

use hireflow_core::{defaults, JobRequirement, NewCandidate};

/// Default test database URL when DATABASE_URL is not set.
///
/// Uses port 15432 to avoid conflicts with production databases.
pub const DEFAULT_TEST_DATABASE_URL: &str = defaults::TEST_DATABASE_URL;

/// Resolve the test database URL from the environment.
pub fn test_database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_TEST_DATABASE_URL.to_string())
}

/// A candidate with a unique email so parallel tests do not collide.
pub fn sample_candidate(name: &str) -> NewCandidate {
    let tag = Uuid::new_v4().simple().to_string();
    NewCandidate {
        full_name: name.to_string(),
        email: Some(format!("{}-{}@example.test", name.to_lowercase().replace(' ', "."), tag)),
        current_title: Some("Backend Engineer".to_string()),
        years_of_experience: Some(6.0),
        skills: vec!["rust".to_string(), "postgres".to_string()],
        summary: Some("Builds data-heavy backend services.".to_string()),
        resume_text: format!("{name}\nBackend Engineer\nRust, Postgres"),
        content_hash: tag,
        source_filename: Some("resume.txt".to_string()),
        ..Default::default()
    }
}

/// An active requirement with a fresh id.
pub fn sample_requirement(title: &str) -> JobRequirement {
    JobRequirement {
        id: Uuid::new_v4(),
        title: title.to_string(),
        description: format!("{title} working on the ingestion platform"),
        required_skills: vec!["rust".to_string()],
        preferred_skills: vec!["kafka".to_string()],
        min_years_experience: Some(3.0),
        education_level: None,
        domain: Some("recruiting".to_string()),
        is_active: true,
        created_at: Utc::now(),
    }
}
