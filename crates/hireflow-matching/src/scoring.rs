//! Parsing model replies into match scores.

use serde::Deserialize;
use uuid::Uuid;

use hireflow_core::{lenient, Error, MatchScore, Result};
use hireflow_inference::parse_json;

/// Fields the model returns for one scoring call.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScoreReply {
    #[serde(
        default,
        alias = "score",
        alias = "overall_score",
        deserialize_with = "lenient::opt_f64"
    )]
    pub match_score: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub skills_score: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub experience_score: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub education_score: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub domain_score: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub explanation: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub strengths: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub gaps: Option<String>,
}

/// Clamp a score into `0..=100`.
pub fn clamp_score(score: f64) -> f64 {
    score.clamp(0.0, 100.0)
}

impl ScoreReply {
    /// Convert into a score for one pair.
    ///
    /// A reply without a numeric overall score is an
    /// [`Error::Inference`]; sub-scores are optional.
    pub fn into_score(
        self,
        candidate_id: Uuid,
        job_requirement_id: Uuid,
        match_pass: i16,
    ) -> Result<MatchScore> {
        let match_score = self
            .match_score
            .filter(|s| s.is_finite())
            .ok_or_else(|| Error::Inference("Model reply has no numeric match_score".to_string()))?;
        Ok(MatchScore {
            candidate_id,
            job_requirement_id,
            match_score: clamp_score(match_score),
            skills_score: self.skills_score.map(clamp_score),
            experience_score: self.experience_score.map(clamp_score),
            education_score: self.education_score.map(clamp_score),
            domain_score: self.domain_score.map(clamp_score),
            explanation: self.explanation,
            strengths: self.strengths,
            gaps: self.gaps,
            match_pass,
        })
    }
}

/// Parse a raw scoring reply.
pub fn parse_score(
    raw: &str,
    candidate_id: Uuid,
    job_requirement_id: Uuid,
    match_pass: i16,
) -> Result<MatchScore> {
    parse_json::<ScoreReply>(raw)?.into_score(candidate_id, job_requirement_id, match_pass)
}

/// Reply of the source-selection pre-step.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceSelection {
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub sources: Vec<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub reason: Option<String>,
}

/// Parse a source-selection reply, keeping only names in `available`.
pub fn parse_source_selection(raw: &str, available: &[String]) -> Result<Vec<String>> {
    let selection: SourceSelection = parse_json(raw)?;
    let mut chosen: Vec<String> = Vec::new();
    for name in selection.sources {
        let name = name.trim().to_ascii_lowercase();
        if available.contains(&name) && !chosen.contains(&name) {
            chosen.push(name);
        }
    }
    Ok(chosen)
}
