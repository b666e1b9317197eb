//! Field names shared by every `tracing` call in the workspace.
//!
//! `tracing` macros take field identifiers rather than string constants, so
//! these exist as the reference list that log queries and dashboards are
//! written against. A new field goes here before it appears in a macro.
//!
//! Levels: `error` when an operator has to act, `warn` when a fallback was
//! taken (local summary instead of enrichment, job retried), `info` for
//! lifecycle and completed operations, `debug` for per-candidate decisions,
//! `trace` for per-row loops.

/// Originating crate area: `db`, `jobs`, `ingestion`, `inference`,
/// `matching`, `enrichment`.
pub const SUBSYSTEM: &str = "subsystem";
/// Part of a subsystem, e.g. `worker`, `reclaimer`, `engine`, `web_search`.
pub const COMPONENT: &str = "component";
/// Operation name, e.g. `claim_next`, `reclaim_stale`, `score`, `enrich`.
pub const OPERATION: &str = "op";
pub const WORKER_ID: &str = "worker_id";

pub const JOB_ID: &str = "job_id";
pub const JOB_TYPE: &str = "job_type";
pub const CORRELATION_ID: &str = "correlation_id";
pub const TRACKER_ID: &str = "tracker_id";
pub const CANDIDATE_ID: &str = "candidate_id";
pub const REQUIREMENT_ID: &str = "requirement_id";
pub const AUDIT_ID: &str = "audit_id";
/// Enrichment source name.
pub const SOURCE: &str = "source";
pub const MODEL: &str = "model";

pub const DURATION_MS: &str = "duration_ms";
/// Rows or items affected.
pub const RESULT_COUNT: &str = "result_count";
pub const PROMPT_LEN: &str = "prompt_len";
pub const RESPONSE_LEN: &str = "response_len";
/// Score produced by a scoring pass, 0-100.
pub const MATCH_SCORE: &str = "match_score";
pub const SUCCESS: &str = "success";
pub const ERROR_MSG: &str = "error";

/// Every field name above.
pub const ALL_FIELDS: &[&str] = &[
    SUBSYSTEM,
    COMPONENT,
    OPERATION,
    WORKER_ID,
    JOB_ID,
    JOB_TYPE,
    CORRELATION_ID,
    TRACKER_ID,
    CANDIDATE_ID,
    REQUIREMENT_ID,
    AUDIT_ID,
    SOURCE,
    MODEL,
    DURATION_MS,
    RESULT_COUNT,
    PROMPT_LEN,
    RESPONSE_LEN,
    MATCH_SCORE,
    SUCCESS,
    ERROR_MSG,
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_field_names_are_unique_snake_case() {
        let unique: HashSet<_> = ALL_FIELDS.iter().collect();
        assert_eq!(unique.len(), ALL_FIELDS.len());
        for field in ALL_FIELDS {
            assert!(
                field.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "{field}"
            );
        }
    }
}
