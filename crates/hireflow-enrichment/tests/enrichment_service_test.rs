//! Enrichment cache behaviour over the in-memory profile store.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use hireflow_core::{Candidate, CandidateRepository, Error, ProfileStatus, Result};
use hireflow_db::memory::{MemoryCandidates, MemoryProfiles};
use hireflow_db::test_fixtures::sample_candidate;
use hireflow_enrichment::{
    EnrichmentService, EnrichmentSource, FetchedProfile, SourceOutcome, LOCAL_SOURCE,
};

/// Source that replays a fixed outcome and counts fetches.
struct StubSource {
    name: &'static str,
    outcome: Mutex<Result<SourceOutcome>>,
    fetches: AtomicUsize,
}

impl StubSource {
    fn new(name: &'static str, outcome: Result<SourceOutcome>) -> Arc<Self> {
        Arc::new(Self {
            name,
            outcome: Mutex::new(outcome),
            fetches: AtomicUsize::new(0),
        })
    }

    fn found(name: &'static str, summary: &str) -> Arc<Self> {
        Self::new(
            name,
            Ok(SourceOutcome::Found(FetchedProfile {
                profile_url: Some(format!("https://{name}.example.test/ada")),
                raw_data: None,
                summary: summary.to_string(),
            })),
        )
    }

    fn set_outcome(&self, outcome: Result<SourceOutcome>) {
        *self.outcome.lock().unwrap() = outcome;
    }

    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EnrichmentSource for StubSource {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "stub"
    }

    async fn fetch(&self, _candidate: &Candidate) -> Result<SourceOutcome> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        match &*self.outcome.lock().unwrap() {
            Ok(outcome) => Ok(outcome.clone()),
            Err(e) => Err(Error::Enrichment(e.to_string())),
        }
    }
}

async fn candidate() -> Candidate {
    MemoryCandidates::new()
        .upsert(sample_candidate("Ada Lovelace"))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_fresh_cache_is_reused_and_stale_cache_refetched() {
    let profiles = Arc::new(MemoryProfiles::new());
    let source = StubSource::found("web_search", "Speaker at RustConf");
    let service = EnrichmentService::new(profiles.clone())
        .with_ttl_days(7)
        .with_source(source.clone());
    let ada = candidate().await;

    let first = service.enrich_all(&ada).await.unwrap();
    assert_eq!(first.fetched, 1);
    assert!(!first.fallback);
    assert_eq!(first.render(), "[web_search]\nSpeaker at RustConf");

    let second = service.enrich_all(&ada).await.unwrap();
    assert_eq!(second.cached, 1);
    assert_eq!(second.fetched, 0);
    assert_eq!(second.sections, first.sections);
    assert_eq!(source.fetches(), 1);

    profiles.set_fetched_at(ada.id, "web_search", Utc::now() - Duration::days(8));
    let third = service.enrich_all(&ada).await.unwrap();
    assert_eq!(third.fetched, 1);
    assert_eq!(source.fetches(), 2);
}

#[tokio::test]
async fn test_failures_are_cached_and_fall_back_to_local_summary() {
    let profiles = Arc::new(MemoryProfiles::new());
    let source = StubSource::new(
        "web_search",
        Err(Error::Enrichment("search API returned 502".to_string())),
    );
    let service = EnrichmentService::new(profiles.clone()).with_source(source.clone());
    let ada = candidate().await;

    let context = service.enrich_all(&ada).await.unwrap();
    assert!(context.fallback);
    assert_eq!(context.sections.len(), 1);
    assert_eq!(context.sections[0].source, LOCAL_SOURCE);
    assert!(context.sections[0].summary.contains("Backend Engineer"));

    // The failure is cached: no second call inside the TTL.
    service.enrich_all(&ada).await.unwrap();
    assert_eq!(source.fetches(), 1);

    let failed = service.failed_profiles(10).await.unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].status, ProfileStatus::Failed);
    assert!(failed[0]
        .error_message
        .as_deref()
        .unwrap()
        .contains("502"));
}

#[tokio::test]
async fn test_not_found_is_distinct_from_failed() {
    let profiles = Arc::new(MemoryProfiles::new());
    let source = StubSource::new("github", Ok(SourceOutcome::NotFound));
    let service = EnrichmentService::new(profiles.clone()).with_source(source.clone());
    let ada = candidate().await;

    let context = service.enrich_all(&ada).await.unwrap();
    assert!(context.fallback);

    let failed = service.failed_profiles(10).await.unwrap();
    assert_eq!(failed[0].status, ProfileStatus::NotFound);
    assert!(failed[0].error_message.is_none());
}

#[tokio::test]
async fn test_refresh_bypasses_cache_for_manual_retry() {
    let profiles = Arc::new(MemoryProfiles::new());
    let source = StubSource::new(
        "web_search",
        Err(Error::Enrichment("timeout".to_string())),
    );
    let service = EnrichmentService::new(profiles.clone()).with_source(source.clone());
    let ada = candidate().await;

    service.enrich_all(&ada).await.unwrap();
    source.set_outcome(Ok(SourceOutcome::Found(FetchedProfile {
        profile_url: None,
        raw_data: None,
        summary: "Maintainer of a Postgres extension".to_string(),
    })));

    let refreshed = service.refresh(&ada, "web_search").await.unwrap();
    assert_eq!(refreshed.status, ProfileStatus::Success);
    assert_eq!(source.fetches(), 2);
    assert!(service.failed_profiles(10).await.unwrap().is_empty());

    let context = service.enrich_all(&ada).await.unwrap();
    assert_eq!(context.cached, 1);
    assert_eq!(context.render(), "[web_search]\nMaintainer of a Postgres extension");

    let err = service.refresh(&ada, "nonexistent").await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_only_requested_sources_are_used() {
    let profiles = Arc::new(MemoryProfiles::new());
    let search = StubSource::found("web_search", "from search");
    let github = StubSource::found("github", "from github");
    let service = EnrichmentService::new(profiles)
        .with_source(search.clone())
        .with_source(github.clone());
    let ada = candidate().await;

    let names: Vec<String> = service.sources().into_iter().map(|s| s.name).collect();
    assert_eq!(names, vec!["web_search", "github"]);

    let context = service
        .enrich(&ada, &["github".to_string(), "unknown".to_string()])
        .await
        .unwrap();
    assert_eq!(context.render(), "[github]\nfrom github");
    assert_eq!(search.fetches(), 0);
    assert_eq!(github.fetches(), 1);
}

#[tokio::test]
async fn test_no_sources_uses_local_summary() {
    let service = EnrichmentService::new(Arc::new(MemoryProfiles::new()));
    assert!(!service.has_sources());
    let ada = candidate().await;

    let context = service.enrich_all(&ada).await.unwrap();
    assert!(context.fallback);
    assert!(context.render().starts_with("[local]\nCandidate: Ada Lovelace"));
}
