//! Multi-pass matching of active candidates against one job requirement.
//!
//! Pass 1 scores every active candidate. Candidates whose first score falls
//! inside the borderline band are enriched and scored again; the second
//! score replaces the first. Each run writes exactly one audit row.
//!
//! Scoring calls may run concurrently (`max_concurrency`), but every result
//! flows back through one stream consumer, which is the only writer of the
//! run tally. Audit totals therefore stay consistent regardless of the
//! completion order.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use hireflow_core::{
    AuditOutcome, Candidate, CandidateMatch, CandidateRepository, Error, GenerationBackend,
    JobRequirement, JobRequirementRepository, MatchAuditRepository, MatchRepository, Result,
};
use hireflow_db::Database;
use hireflow_enrichment::{local_summary, EnrichmentService, LOCAL_SOURCE};

use crate::config::MatchingConfig;
use crate::prompts::{
    match_prompt, source_selection_prompt, MATCH_SYSTEM_PROMPT, SOURCE_SELECTION_SYSTEM_PROMPT,
};
use crate::scoring::{parse_score, parse_source_selection};

/// Result of one matching run.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchRunSummary {
    pub audit_id: Uuid,
    pub job_requirement_id: Uuid,
    pub total_candidates: usize,
    pub successful_matches: usize,
    pub shortlisted_count: usize,
    pub rematched_count: usize,
    pub average_match_score: Option<f64>,
    pub highest_match_score: Option<f64>,
    /// Candidates without a score after this run.
    pub failed_candidates: Vec<Uuid>,
    pub estimated_tokens_used: i64,
    pub duration_ms: i64,
}

/// Aggregates of a run, written only by the stream consumer.
#[derive(Debug, Default)]
struct RunTally {
    total: usize,
    scored: HashMap<Uuid, CandidateMatch>,
    failed: Vec<Uuid>,
    first_error: Option<String>,
    rematched: usize,
    model_calls: i64,
}

impl RunTally {
    fn record_first_pass(&mut self, candidate_id: Uuid, result: Result<CandidateMatch>) {
        match result {
            Ok(scored) => {
                self.scored.insert(candidate_id, scored);
            }
            Err(e) => {
                warn!(
                    subsystem = "matching",
                    component = "engine",
                    candidate_id = %candidate_id,
                    error = %e,
                    "Candidate scoring failed"
                );
                self.failed.push(candidate_id);
                self.first_error.get_or_insert_with(|| e.to_string());
            }
        }
    }

    fn record_rematch(&mut self, candidate_id: Uuid, result: Result<CandidateMatch>) {
        match result {
            Ok(rescored) => {
                self.scored.insert(candidate_id, rescored);
                self.rematched += 1;
            }
            Err(e) => warn!(
                subsystem = "matching",
                component = "engine",
                candidate_id = %candidate_id,
                error = %e,
                "Re-match failed, keeping first-pass score"
            ),
        }
    }

    fn shortlisted(&self) -> usize {
        self.scored.values().filter(|m| m.is_shortlisted).count()
    }

    fn average(&self) -> Option<f64> {
        if self.scored.is_empty() {
            return None;
        }
        let sum: f64 = self.scored.values().map(|m| m.match_score).sum();
        Some(sum / self.scored.len() as f64)
    }

    fn highest(&self) -> Option<f64> {
        self.scored
            .values()
            .map(|m| m.match_score)
            .fold(None, |best, s| Some(best.map_or(s, |b: f64| b.max(s))))
    }

    fn outcome(&self, duration_ms: i64, tokens_per_call: i64) -> AuditOutcome {
        AuditOutcome {
            total_candidates: self.total as i32,
            successful_matches: self.scored.len().min(self.total) as i32,
            shortlisted_count: self.shortlisted() as i32,
            rematched_count: self.rematched as i32,
            average_match_score: self.average(),
            highest_match_score: self.highest(),
            duration_ms,
            estimated_tokens_used: self.model_calls * tokens_per_call,
        }
    }

    fn summary(self, audit_id: Uuid, job_requirement_id: Uuid, outcome: &AuditOutcome) -> MatchRunSummary {
        MatchRunSummary {
            audit_id,
            job_requirement_id,
            total_candidates: self.total,
            successful_matches: self.scored.len(),
            shortlisted_count: outcome.shortlisted_count as usize,
            rematched_count: self.rematched,
            average_match_score: outcome.average_match_score,
            highest_match_score: outcome.highest_match_score,
            failed_candidates: self.failed,
            estimated_tokens_used: outcome.estimated_tokens_used,
            duration_ms: outcome.duration_ms,
        }
    }
}

/// Scores candidates against job requirements with an LLM.
pub struct MatchingEngine {
    candidates: Arc<dyn CandidateRepository>,
    requirements: Arc<dyn JobRequirementRepository>,
    matches: Arc<dyn MatchRepository>,
    audits: Arc<dyn MatchAuditRepository>,
    llm: Arc<dyn GenerationBackend>,
    enrichment: Option<Arc<EnrichmentService>>,
    config: MatchingConfig,
}

impl MatchingEngine {
    pub fn new(
        candidates: Arc<dyn CandidateRepository>,
        requirements: Arc<dyn JobRequirementRepository>,
        matches: Arc<dyn MatchRepository>,
        audits: Arc<dyn MatchAuditRepository>,
        llm: Arc<dyn GenerationBackend>,
        config: MatchingConfig,
    ) -> Self {
        Self {
            candidates,
            requirements,
            matches,
            audits,
            llm,
            enrichment: None,
            config,
        }
    }

    /// Engine over the PostgreSQL repositories.
    pub fn from_database(
        db: &Database,
        llm: Arc<dyn GenerationBackend>,
        config: MatchingConfig,
    ) -> Self {
        Self::new(
            Arc::new(db.candidates.clone()),
            Arc::new(db.requirements.clone()),
            Arc::new(db.matches.clone()),
            Arc::new(db.audits.clone()),
            llm,
            config,
        )
    }

    /// Use `service` for the re-match pass. Its cache TTL is taken from the
    /// engine configuration.
    pub fn with_enrichment(mut self, service: EnrichmentService) -> Self {
        self.enrichment = Some(Arc::new(
            service.with_ttl_days(self.config.staleness_ttl_days),
        ));
        self
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    /// Match every active candidate against a requirement.
    ///
    /// Fails with [`Error::NotFound`] before any audit is written when the
    /// requirement does not exist. Otherwise exactly one audit row is
    /// created and closed: COMPLETED when at least one candidate was scored
    /// (or there was nobody to score), FAILED with the error otherwise.
    /// Failed runs are not retried; the caller re-triggers them.
    #[instrument(skip(self), fields(subsystem = "matching", component = "engine", requirement_id = %requirement_id))]
    pub async fn run(
        &self,
        requirement_id: Uuid,
        initiated_by: Option<&str>,
    ) -> Result<MatchRunSummary> {
        let started = Instant::now();
        let requirement = self
            .requirements
            .get(requirement_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("job requirement {requirement_id}")))?;

        let audit = self.audits.start(requirement_id, initiated_by).await?;
        info!(audit_id = %audit.id, title = %requirement.title, "Matching run started");

        let mut tally = RunTally::default();
        let result = self.execute(&requirement, &mut tally).await;
        let outcome = tally.outcome(
            started.elapsed().as_millis() as i64,
            self.config.tokens_per_call,
        );

        let failure = match result {
            Err(e) => Some(e),
            Ok(()) if tally.total > 0 && tally.scored.is_empty() => Some(Error::Inference(format!(
                "All {} candidates failed scoring: {}",
                tally.total,
                tally.first_error.as_deref().unwrap_or("unknown error")
            ))),
            Ok(()) => None,
        };

        if let Some(e) = failure {
            error!(audit_id = %audit.id, error = %e, "Matching run failed");
            if let Err(audit_err) = self.audits.fail(audit.id, &outcome, &e.to_string()).await {
                error!(audit_id = %audit.id, error = %audit_err, "Failed to record failed matching run");
            }
            return Err(e);
        }

        if let Err(e) = self.audits.finish(audit.id, &outcome).await {
            error!(audit_id = %audit.id, error = %e, "Failed to close matching audit");
            let message = format!("could not record completion: {e}");
            if let Err(audit_err) = self.audits.fail(audit.id, &outcome, &message).await {
                error!(audit_id = %audit.id, error = %audit_err, "Failed to record failed matching run");
            }
            return Err(e);
        }
        info!(
            audit_id = %audit.id,
            total = outcome.total_candidates,
            successful = outcome.successful_matches,
            shortlisted = outcome.shortlisted_count,
            rematched = outcome.rematched_count,
            estimated_tokens = outcome.estimated_tokens_used,
            duration_ms = outcome.duration_ms,
            "Matching run completed"
        );
        Ok(tally.summary(audit.id, requirement_id, &outcome))
    }

    async fn execute(&self, requirement: &JobRequirement, tally: &mut RunTally) -> Result<()> {
        let candidates = self.candidates.list_active().await?;
        tally.total = candidates.len();
        let concurrency = self.config.max_concurrency.max(1);

        let mut first_pass = stream::iter(candidates.iter())
            .map(move |candidate| async move {
                let result = self.score(requirement, candidate, None, 1).await;
                (candidate.id, result)
            })
            .buffer_unordered(concurrency);
        while let Some((candidate_id, result)) = first_pass.next().await {
            tally.model_calls += 1;
            tally.record_first_pass(candidate_id, result);
        }

        if !self.config.multi_pass_enabled {
            return Ok(());
        }

        let borderline: Vec<&Candidate> = candidates
            .iter()
            .filter(|c| {
                tally
                    .scored
                    .get(&c.id)
                    .is_some_and(|m| self.config.in_borderline(m.match_score))
            })
            .collect();
        if borderline.is_empty() {
            return Ok(());
        }
        debug!(count = borderline.len(), "Re-matching borderline candidates");

        let mut second_pass = stream::iter(borderline)
            .map(move |candidate| async move {
                let (calls, result) = self.rematch(requirement, candidate).await;
                (candidate.id, calls, result)
            })
            .buffer_unordered(concurrency);
        while let Some((candidate_id, calls, result)) = second_pass.next().await {
            tally.model_calls += calls;
            tally.record_rematch(candidate_id, result);
        }
        Ok(())
    }

    /// One scoring call, persisted on success.
    async fn score(
        &self,
        requirement: &JobRequirement,
        candidate: &Candidate,
        enriched: Option<&str>,
        pass: i16,
    ) -> Result<CandidateMatch> {
        let start = Instant::now();
        let prompt = match_prompt(requirement, candidate, enriched);
        let reply = self
            .llm
            .generate_with_system(MATCH_SYSTEM_PROMPT, &prompt)
            .await?;
        let score = parse_score(&reply, candidate.id, requirement.id, pass)?;
        let stored = self.matches.upsert_score(&score).await?;
        debug!(
            subsystem = "matching",
            component = "engine",
            op = "score",
            candidate_id = %candidate.id,
            pass,
            score = stored.match_score,
            shortlisted = stored.is_shortlisted,
            model = self.llm.model_name(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Candidate scored"
        );
        Ok(stored)
    }

    /// Enrich and re-score one borderline candidate. Returns the number of
    /// model calls made alongside the result.
    async fn rematch(
        &self,
        requirement: &JobRequirement,
        candidate: &Candidate,
    ) -> (i64, Result<CandidateMatch>) {
        let (selection_calls, context) = self.enriched_context(requirement, candidate).await;
        let result = self.score(requirement, candidate, Some(&context), 2).await;
        (selection_calls + 1, result)
    }

    async fn enriched_context(
        &self,
        requirement: &JobRequirement,
        candidate: &Candidate,
    ) -> (i64, String) {
        let Some(service) = self.enrichment.as_ref().filter(|s| s.has_sources()) else {
            return (0, local_context(candidate));
        };

        let mut calls = 0;
        let mut sources: Vec<String> = service.sources().into_iter().map(|s| s.name).collect();
        if self.config.source_selection_enabled {
            calls += 1;
            match self.select_sources(requirement, candidate, service).await {
                Ok(chosen) => {
                    debug!(candidate_id = %candidate.id, sources = ?chosen, "Sources selected");
                    sources = chosen;
                }
                Err(e) => warn!(
                    subsystem = "matching",
                    component = "engine",
                    candidate_id = %candidate.id,
                    error = %e,
                    "Source selection failed, consulting all sources"
                ),
            }
        }

        match service.enrich(candidate, &sources).await {
            Ok(context) => (calls, context.render()),
            Err(e) => {
                warn!(
                    subsystem = "matching",
                    component = "engine",
                    candidate_id = %candidate.id,
                    error = %e,
                    "Enrichment unavailable, using local summary"
                );
                (calls, local_context(candidate))
            }
        }
    }

    async fn select_sources(
        &self,
        requirement: &JobRequirement,
        candidate: &Candidate,
        service: &EnrichmentService,
    ) -> Result<Vec<String>> {
        let available = service.sources();
        let names: Vec<String> = available.iter().map(|s| s.name.clone()).collect();
        let prompt = source_selection_prompt(requirement, candidate, &available);
        let reply = self
            .llm
            .generate_with_system(SOURCE_SELECTION_SYSTEM_PROMPT, &prompt)
            .await?;
        parse_source_selection(&reply, &names)
    }
}

fn local_context(candidate: &Candidate) -> String {
    format!("[{}]\n{}", LOCAL_SOURCE, local_summary(candidate))
}
