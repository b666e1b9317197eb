//! TTL-cached enrichment over the external profile store.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use hireflow_core::{
    defaults, Candidate, CandidateExternalProfile, Error, ExternalProfileRepository,
    ProfileStatus, ProfileUpsert, Result,
};

use crate::source::{EnrichmentSource, SourceOutcome};
use crate::summary::{local_summary, LOCAL_SOURCE};

/// Name and description of a registered source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInfo {
    pub name: String,
    pub description: String,
}

/// One block of enriched context.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileSection {
    pub source: String,
    pub summary: String,
}

/// Context gathered for one candidate, ready to append to a prompt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrichedContext {
    pub sections: Vec<ProfileSection>,
    /// Sources fetched from the network during this call.
    pub fetched: usize,
    /// Sources answered from a fresh cache row.
    pub cached: usize,
    /// Whether the sections are the locally synthesized fallback.
    pub fallback: bool,
}

impl EnrichedContext {
    /// Render as prompt text, one headed block per source.
    pub fn render(&self) -> String {
        self.sections
            .iter()
            .map(|s| format!("[{}]\n{}", s.source, s.summary))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Enriches candidates from the registered sources, reusing cached rows
/// younger than the staleness TTL.
///
/// Failed and not-found fetches are cached like successes, so a dead source
/// is not queried again until the TTL passes or [`Self::refresh`] is called.
pub struct EnrichmentService {
    profiles: Arc<dyn ExternalProfileRepository>,
    sources: Vec<Arc<dyn EnrichmentSource>>,
    ttl_days: i64,
}

impl EnrichmentService {
    pub fn new(profiles: Arc<dyn ExternalProfileRepository>) -> Self {
        Self {
            profiles,
            sources: Vec::new(),
            ttl_days: defaults::STALENESS_TTL_DAYS,
        }
    }

    pub fn with_source(mut self, source: Arc<dyn EnrichmentSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_ttl_days(mut self, days: i64) -> Self {
        self.ttl_days = days.max(0);
        self
    }

    pub fn ttl_days(&self) -> i64 {
        self.ttl_days
    }

    pub fn has_sources(&self) -> bool {
        !self.sources.is_empty()
    }

    /// Registered sources, in registration order.
    pub fn sources(&self) -> Vec<SourceInfo> {
        self.sources
            .iter()
            .map(|s| SourceInfo {
                name: s.name().to_string(),
                description: s.description().to_string(),
            })
            .collect()
    }

    /// Enrich from every registered source.
    pub async fn enrich_all(&self, candidate: &Candidate) -> Result<EnrichedContext> {
        let names: Vec<String> = self.sources.iter().map(|s| s.name().to_string()).collect();
        self.enrich(candidate, &names).await
    }

    /// Enrich from the named sources. Unknown names are ignored.
    ///
    /// Falls back to the local summary when no requested source yields a
    /// successful profile. Only repository errors are returned; source
    /// failures end up cached on the profile row.
    #[instrument(skip(self, candidate), fields(subsystem = "enrichment", component = "service", candidate_id = %candidate.id))]
    pub async fn enrich(&self, candidate: &Candidate, sources: &[String]) -> Result<EnrichedContext> {
        let now = Utc::now();
        let mut context = EnrichedContext::default();

        for name in sources {
            let Some(source) = self.source(name) else {
                debug!(source = %name, "Ignoring unknown enrichment source");
                continue;
            };

            let profile = match self.profiles.get(candidate.id, name).await? {
                Some(cached) if cached.is_fresh(now, self.ttl_days) => {
                    debug!(source = %name, status = cached.status.as_str(), "Using cached profile");
                    context.cached += 1;
                    cached
                }
                _ => {
                    context.fetched += 1;
                    self.fetch_and_store(source.as_ref(), candidate).await?
                }
            };

            if profile.status == ProfileStatus::Success {
                if let Some(summary) = profile.enriched_summary.filter(|s| !s.trim().is_empty()) {
                    context.sections.push(ProfileSection {
                        source: profile.source,
                        summary,
                    });
                }
            }
        }

        if context.sections.is_empty() {
            debug!("No external profile data, using local summary");
            context.sections.push(ProfileSection {
                source: LOCAL_SOURCE.to_string(),
                summary: local_summary(candidate),
            });
            context.fallback = true;
        }
        Ok(context)
    }

    /// Fetch one source regardless of the cache, e.g. to retry a FAILED row.
    pub async fn refresh(
        &self,
        candidate: &Candidate,
        source: &str,
    ) -> Result<CandidateExternalProfile> {
        let source = self
            .source(source)
            .ok_or_else(|| Error::NotFound(format!("enrichment source '{}'", source)))?;
        self.fetch_and_store(source.as_ref(), candidate).await
    }

    /// Cached FAILED and NOT_FOUND rows, oldest first.
    pub async fn failed_profiles(&self, limit: i64) -> Result<Vec<CandidateExternalProfile>> {
        self.profiles.list_failed(limit).await
    }

    fn source(&self, name: &str) -> Option<&Arc<dyn EnrichmentSource>> {
        self.sources.iter().find(|s| s.name() == name)
    }

    async fn fetch_and_store(
        &self,
        source: &dyn EnrichmentSource,
        candidate: &Candidate,
    ) -> Result<CandidateExternalProfile> {
        let name = source.name().to_string();
        let mut upsert = ProfileUpsert {
            candidate_id: candidate.id,
            source: name.clone(),
            status: ProfileStatus::Pending,
            profile_url: None,
            raw_data: None,
            enriched_summary: None,
            error_message: None,
            fetched_at: Utc::now(),
        };

        match source.fetch(candidate).await {
            Ok(SourceOutcome::Found(profile)) => {
                upsert.status = ProfileStatus::Success;
                upsert.profile_url = profile.profile_url;
                upsert.raw_data = profile.raw_data;
                upsert.enriched_summary = Some(profile.summary);
            }
            Ok(SourceOutcome::NotFound) => {
                upsert.status = ProfileStatus::NotFound;
            }
            Err(e) => {
                warn!(
                    subsystem = "enrichment",
                    component = "service",
                    candidate_id = %candidate.id,
                    source = %name,
                    error = %e,
                    "Enrichment fetch failed, caching failure"
                );
                upsert.status = ProfileStatus::Failed;
                upsert.error_message = Some(e.to_string());
            }
        }

        let stored = self.profiles.upsert(upsert).await?;
        info!(
            subsystem = "enrichment",
            component = "service",
            candidate_id = %candidate.id,
            source = %name,
            status = stored.status.as_str(),
            "Fetched external profile"
        );
        Ok(stored)
    }
}
