//! Matching runs over in-memory repositories and a scripted model.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use hireflow_core::{
    AuditOutcome, AuditStatus, Candidate, CandidateRepository, Error, JobRequirement, MatchAudit,
    MatchAuditRepository, MatchRepository, MatchReview, Result,
};
use hireflow_db::memory::{
    MemoryAudits, MemoryCandidates, MemoryMatches, MemoryProfiles, MemoryRequirements,
};
use hireflow_db::test_fixtures::{sample_candidate, sample_requirement};
use hireflow_enrichment::{EnrichmentService, EnrichmentSource, FetchedProfile, SourceOutcome};
use hireflow_inference::mock::ScriptedGenerationBackend;
use hireflow_matching::{MatchingConfig, MatchingEngine};
use serde_json::json;
use uuid::Uuid;

fn reply(score: f64) -> String {
    json!({
        "match_score": score,
        "skills_score": score,
        "experience_score": score,
        "explanation": "Scored by the test script",
        "strengths": ["rust"],
        "gaps": "none"
    })
    .to_string()
}

struct Harness {
    candidates: Arc<MemoryCandidates>,
    matches: Arc<MemoryMatches>,
    audits: Arc<MemoryAudits>,
    requirements: Arc<MemoryRequirements>,
    requirement: JobRequirement,
    llm: ScriptedGenerationBackend,
}

impl Harness {
    fn new(llm: ScriptedGenerationBackend) -> Self {
        let requirements = Arc::new(MemoryRequirements::new());
        let requirement = sample_requirement("Platform Engineer");
        requirements.insert(requirement.clone());
        Self {
            candidates: Arc::new(MemoryCandidates::new()),
            matches: Arc::new(MemoryMatches::new()),
            audits: Arc::new(MemoryAudits::new()),
            requirements,
            requirement,
            llm,
        }
    }

    async fn add(&self, name: &str) -> Candidate {
        self.candidates.upsert(sample_candidate(name)).await.unwrap()
    }

    fn engine(&self, config: MatchingConfig) -> MatchingEngine {
        MatchingEngine::new(
            self.candidates.clone(),
            self.requirements.clone(),
            self.matches.clone(),
            self.audits.clone(),
            Arc::new(self.llm.clone()),
            config,
        )
    }

    async fn score_of(&self, candidate: &Candidate) -> (f64, i16) {
        let m = self
            .matches
            .get(candidate.id, self.requirement.id)
            .await
            .unwrap()
            .expect("match row");
        (m.match_score, m.match_pass)
    }
}

/// Source returning a fixed summary and counting fetches.
struct StubSource {
    name: &'static str,
    fetches: AtomicUsize,
}

impl StubSource {
    fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            fetches: AtomicUsize::new(0),
        })
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
        "stub profile source"
    }

    async fn fetch(&self, _candidate: &Candidate) -> Result<SourceOutcome> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(SourceOutcome::Found(FetchedProfile {
            profile_url: None,
            raw_data: None,
            summary: format!("from {}", self.name),
        }))
    }
}

#[tokio::test]
async fn test_run_rescores_borderline_and_records_audit() {
    let llm = ScriptedGenerationBackend::new()
        // Only the re-match prompt carries the local summary.
        .with_rule("Candidate: Grace Hopper", reply(80.0))
        .with_rule("Grace Hopper", reply(60.0))
        .with_rule("Ada Lovelace", reply(85.0))
        .with_rule("Alan Turing", "I cannot score this candidate.");
    let h = Harness::new(llm);
    let ada = h.add("Ada Lovelace").await;
    let grace = h.add("Grace Hopper").await;
    let alan = h.add("Alan Turing").await;

    let summary = h
        .engine(MatchingConfig::default())
        .run(h.requirement.id, Some("recruiter"))
        .await
        .unwrap();

    assert_eq!(summary.total_candidates, 3);
    assert_eq!(summary.successful_matches, 2);
    assert_eq!(summary.shortlisted_count, 2);
    assert_eq!(summary.rematched_count, 1);
    assert_eq!(summary.failed_candidates, vec![alan.id]);
    assert_eq!(summary.average_match_score, Some(82.5));
    assert_eq!(summary.highest_match_score, Some(85.0));
    // Three first-pass calls plus one re-match.
    assert_eq!(summary.estimated_tokens_used, 4 * 1_500);

    assert_eq!(h.score_of(&ada).await, (85.0, 1));
    assert_eq!(h.score_of(&grace).await, (80.0, 2));
    let grace_match = h.matches.get(grace.id, h.requirement.id).await.unwrap().unwrap();
    assert!(grace_match.is_shortlisted);
    assert!(h
        .matches
        .get(alan.id, h.requirement.id)
        .await
        .unwrap()
        .is_none());
    assert_eq!(h.llm.calls_containing("## Additional profile information"), 1);

    let audits = h.audits.all();
    assert_eq!(audits.len(), 1);
    let audit = &audits[0];
    assert_eq!(audit.id, summary.audit_id);
    assert_eq!(audit.status, AuditStatus::Completed);
    assert_eq!(audit.total_candidates, 3);
    assert_eq!(audit.successful_matches, 2);
    assert_eq!(audit.shortlisted_count, 2);
    assert_eq!(audit.rematched_count, 1);
    assert_eq!(audit.average_match_score, Some(82.5));
    assert_eq!(audit.initiated_by.as_deref(), Some("recruiter"));
    assert!(audit.error_message.is_none());
    assert!(audit.completed_at.is_some());
}

#[tokio::test]
async fn test_borderline_band_bounds_are_inclusive() {
    let llm = ScriptedGenerationBackend::new()
        .with_rule("Candidate: Fifty Smith", reply(51.0))
        .with_rule("Candidate: Seventyfive Smith", reply(74.0))
        .with_rule("Fifty Smith", reply(50.0))
        .with_rule("Seventyfive Smith", reply(75.0))
        .with_rule("Seventysix Smith", reply(76.0))
        .with_rule("Fortynine Smith", reply(49.0));
    let h = Harness::new(llm);
    let at_min = h.add("Fifty Smith").await;
    let at_max = h.add("Seventyfive Smith").await;
    let above = h.add("Seventysix Smith").await;
    let below = h.add("Fortynine Smith").await;

    let summary = h
        .engine(MatchingConfig::default())
        .run(h.requirement.id, None)
        .await
        .unwrap();

    assert_eq!(summary.rematched_count, 2);
    assert_eq!(h.score_of(&at_min).await, (51.0, 2));
    assert_eq!(h.score_of(&at_max).await, (74.0, 2));
    assert_eq!(h.score_of(&above).await, (76.0, 1));
    assert_eq!(h.score_of(&below).await, (49.0, 1));
    assert_eq!(h.llm.calls_containing("Candidate: Seventysix Smith"), 0);
    assert_eq!(h.llm.calls_containing("Candidate: Fortynine Smith"), 0);
}

#[tokio::test]
async fn test_single_pass_when_multi_pass_disabled() {
    let llm = ScriptedGenerationBackend::new().with_default(reply(60.0));
    let h = Harness::new(llm);
    let grace = h.add("Grace Hopper").await;

    let summary = h
        .engine(MatchingConfig::default().with_multi_pass(false))
        .run(h.requirement.id, None)
        .await
        .unwrap();

    assert_eq!(summary.rematched_count, 0);
    assert_eq!(summary.shortlisted_count, 0);
    assert_eq!(h.score_of(&grace).await, (60.0, 1));
    assert_eq!(h.llm.call_count(), 1);
}

#[tokio::test]
async fn test_source_selection_limits_enrichment_fetches() {
    let llm = ScriptedGenerationBackend::new()
        .with_rule("external profile sources", r#"{"sources": ["github"], "reason": "OSS"}"#)
        .with_rule("[github]", reply(78.0))
        .with_rule("Grace Hopper", reply(60.0));
    let h = Harness::new(llm);
    let grace = h.add("Grace Hopper").await;

    let web = StubSource::new("web_search");
    let github = StubSource::new("github");
    let enrichment = EnrichmentService::new(Arc::new(MemoryProfiles::new()))
        .with_source(web.clone())
        .with_source(github.clone());

    let summary = h
        .engine(MatchingConfig::default().with_source_selection(true))
        .with_enrichment(enrichment)
        .run(h.requirement.id, None)
        .await
        .unwrap();

    assert_eq!(github.fetches(), 1);
    assert_eq!(web.fetches(), 0);
    assert_eq!(h.score_of(&grace).await, (78.0, 2));
    assert_eq!(summary.rematched_count, 1);
    assert_eq!(summary.shortlisted_count, 1);
    // First pass, source selection and re-match.
    assert_eq!(summary.estimated_tokens_used, 3 * 1_500);
}

#[tokio::test]
async fn test_rematch_without_selection_consults_every_source() {
    let llm = ScriptedGenerationBackend::new()
        .with_rule("[github]", reply(70.0))
        .with_rule("Grace Hopper", reply(55.0));
    let h = Harness::new(llm);
    let grace = h.add("Grace Hopper").await;

    let web = StubSource::new("web_search");
    let github = StubSource::new("github");
    let enrichment = EnrichmentService::new(Arc::new(MemoryProfiles::new()))
        .with_source(web.clone())
        .with_source(github.clone());

    h.engine(MatchingConfig::default())
        .with_enrichment(enrichment)
        .run(h.requirement.id, None)
        .await
        .unwrap();

    assert_eq!(web.fetches(), 1);
    assert_eq!(github.fetches(), 1);
    assert_eq!(h.score_of(&grace).await, (70.0, 2));
    assert_eq!(h.llm.calls_containing("[web_search]\nfrom web_search"), 1);
}

#[tokio::test]
async fn test_run_fails_when_no_candidate_can_be_scored() {
    let llm = ScriptedGenerationBackend::new().with_default("not json at all");
    let h = Harness::new(llm);
    h.add("Ada Lovelace").await;
    h.add("Grace Hopper").await;

    let err = h
        .engine(MatchingConfig::default())
        .run(h.requirement.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Inference(_)));
    assert!(err.to_string().contains("All 2 candidates failed scoring"));

    let audits = h.audits.all();
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].status, AuditStatus::Failed);
    assert_eq!(audits[0].total_candidates, 2);
    assert_eq!(audits[0].successful_matches, 0);
    assert!(audits[0]
        .error_message
        .as_deref()
        .unwrap()
        .contains("Malformed model response"));
}

#[tokio::test]
async fn test_unknown_requirement_writes_no_audit() {
    let h = Harness::new(ScriptedGenerationBackend::new());
    let err = h
        .engine(MatchingConfig::default())
        .run(Uuid::new_v4(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
    assert!(h.audits.all().is_empty());
}

/// Audit store that cannot record completions.
struct CompletionRejectingAudits(Arc<MemoryAudits>);

#[async_trait]
impl MatchAuditRepository for CompletionRejectingAudits {
    async fn start(&self, requirement_id: Uuid, initiated_by: Option<&str>) -> Result<MatchAudit> {
        self.0.start(requirement_id, initiated_by).await
    }

    async fn finish(&self, _audit_id: Uuid, _outcome: &AuditOutcome) -> Result<()> {
        Err(Error::Internal("audit write timed out".to_string()))
    }

    async fn fail(&self, audit_id: Uuid, outcome: &AuditOutcome, error: &str) -> Result<()> {
        self.0.fail(audit_id, outcome, error).await
    }

    async fn get(&self, audit_id: Uuid) -> Result<Option<MatchAudit>> {
        self.0.get(audit_id).await
    }

    async fn list_for_requirement(&self, requirement_id: Uuid) -> Result<Vec<MatchAudit>> {
        self.0.list_for_requirement(requirement_id).await
    }
}

#[tokio::test]
async fn test_audit_closed_as_failed_when_completion_cannot_be_recorded() {
    let h = Harness::new(ScriptedGenerationBackend::new().with_default(reply(90.0)));
    h.add("Ada Lovelace").await;
    let engine = MatchingEngine::new(
        h.candidates.clone(),
        h.requirements.clone(),
        h.matches.clone(),
        Arc::new(CompletionRejectingAudits(h.audits.clone())),
        Arc::new(h.llm.clone()),
        MatchingConfig::default(),
    );

    let err = engine.run(h.requirement.id, None).await.unwrap_err();
    assert!(matches!(err, Error::Internal(_)));

    let audits = h.audits.all();
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].status, AuditStatus::Failed);
    assert_eq!(audits[0].successful_matches, 1);
    assert!(audits[0]
        .error_message
        .as_deref()
        .unwrap()
        .contains("audit write timed out"));
}

#[tokio::test]
async fn test_empty_pool_completes_with_zero_totals() {
    let h = Harness::new(ScriptedGenerationBackend::new());
    let summary = h
        .engine(MatchingConfig::default())
        .run(h.requirement.id, None)
        .await
        .unwrap();

    assert_eq!(summary.total_candidates, 0);
    assert_eq!(summary.average_match_score, None);
    let audit = &h.audits.all()[0];
    assert_eq!(audit.status, AuditStatus::Completed);
    assert_eq!(audit.estimated_tokens_used, 0);
    assert_eq!(h.llm.call_count(), 0);
}

#[tokio::test]
async fn test_rerun_keeps_recruiter_review_and_adds_audit() {
    let llm = ScriptedGenerationBackend::new().with_default(reply(88.0));
    let h = Harness::new(llm);
    let ada = h.add("Ada Lovelace").await;
    let engine = h.engine(MatchingConfig::default());

    engine.run(h.requirement.id, None).await.unwrap();
    let first = h.matches.get(ada.id, h.requirement.id).await.unwrap().unwrap();
    h.matches
        .update_review(
            first.id,
            MatchReview {
                is_selected: Some(true),
                recruiter_notes: Some("Call back on Monday".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    engine.run(h.requirement.id, None).await.unwrap();
    let second = h.matches.get(ada.id, h.requirement.id).await.unwrap().unwrap();
    assert_eq!(second.id, first.id);
    assert!(second.is_selected);
    assert_eq!(second.recruiter_notes.as_deref(), Some("Call back on Monday"));
    assert_eq!(h.audits.all().len(), 2);
}

#[tokio::test]
async fn test_concurrent_scoring_keeps_totals_consistent() {
    let llm = ScriptedGenerationBackend::new().with_default(reply(90.0));
    let h = Harness::new(llm);
    for i in 0..12 {
        h.add(&format!("Engineer {i}")).await;
    }

    let summary = h
        .engine(MatchingConfig::default().with_max_concurrency(4))
        .run(h.requirement.id, None)
        .await
        .unwrap();

    assert_eq!(summary.total_candidates, 12);
    assert_eq!(summary.successful_matches, 12);
    assert_eq!(summary.shortlisted_count, 12);
    assert!(summary.failed_candidates.is_empty());
    assert_eq!(h.llm.call_count(), 12);

    let audit = &h.audits.all()[0];
    assert_eq!(audit.successful_matches, 12);
    assert_eq!(audit.shortlisted_count, 12);
    assert_eq!(
        h.matches.list_shortlisted(h.requirement.id).await.unwrap().len(),
        12
    );
}
