//! Locally synthesized profile summary.
//!
//! Used in place of external data when no source is configured or none of
//! them produced anything, so a re-match pass still gets a structured view of
//! the candidate instead of failing.

use hireflow_core::Candidate;

/// Source name recorded for locally synthesized context.
pub const LOCAL_SOURCE: &str = "local";

/// Build a summary from the candidate's own resume fields.
pub fn local_summary(candidate: &Candidate) -> String {
    let mut lines = vec![format!("Candidate: {}", candidate.full_name.trim())];

    if let Some(title) = non_empty(&candidate.current_title) {
        lines.push(format!("Current title: {}", title));
    }
    if let Some(location) = non_empty(&candidate.location) {
        lines.push(format!("Location: {}", location));
    }
    if let Some(years) = candidate.years_of_experience {
        lines.push(format!("Experience: {} years", format_years(years)));
    }
    if !candidate.skills.is_empty() {
        lines.push(format!("Skills: {}", candidate.skills.join(", ")));
    }
    if let Some(education) = non_empty(&candidate.education) {
        lines.push(format!("Education: {}", education));
    }
    if let Some(summary) = non_empty(&candidate.summary) {
        lines.push(format!("Summary: {}", summary));
    }
    if let Some(experience) = non_empty(&candidate.experience_summary) {
        lines.push(format!("Experience highlights: {}", experience));
    }
    if lines.len() == 1 {
        lines.push("No further profile information is available.".to_string());
    }
    lines.join("\n")
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn format_years(years: f64) -> String {
    if years.fract() == 0.0 {
        format!("{}", years as i64)
    } else {
        format!("{:.1}", years)
    }
}
