//! Prompts for candidate scoring and enrichment source selection.

use std::fmt::Write as _;

use hireflow_core::{Candidate, JobRequirement};
use hireflow_enrichment::SourceInfo;

/// Resume characters included in a scoring prompt.
pub const RESUME_EXCERPT_MAX_CHARS: usize = 6_000;

/// System prompt fixing the scoring schema.
pub const MATCH_SYSTEM_PROMPT: &str = "You are a technical recruiter scoring how well a \
candidate fits a job requirement. Respond with a single JSON object and nothing else, \
using exactly these keys: \"match_score\" (number 0-100, overall fit), \"skills_score\", \
\"experience_score\", \"education_score\", \"domain_score\" (numbers 0-100), \
\"explanation\" (string, two or three sentences), \"strengths\" (string), \"gaps\" (string). \
Score 70 or above only when the candidate could be shortlisted without reservations.";

/// System prompt for the source-selection pre-step.
pub const SOURCE_SELECTION_SYSTEM_PROMPT: &str = "You decide which external profile sources \
are worth consulting before re-scoring a borderline candidate. Respond with a single JSON \
object and nothing else: {\"sources\": [names], \"reason\": string}. Only use names from \
the list you are given; return an empty list when none would help.";

/// Heading that introduces enriched context in a re-match prompt.
pub const ENRICHED_CONTEXT_HEADING: &str = "## Additional profile information";

fn excerpt(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none listed".to_string()
    } else {
        items.join(", ")
    }
}

/// Render the requirement block of a prompt.
pub fn render_requirement(requirement: &JobRequirement) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "## Job requirement");
    let _ = writeln!(out, "Title: {}", requirement.title.trim());
    let _ = writeln!(
        out,
        "Required skills: {}",
        list_or_none(&requirement.required_skills)
    );
    let _ = writeln!(
        out,
        "Preferred skills: {}",
        list_or_none(&requirement.preferred_skills)
    );
    if let Some(years) = requirement.min_years_experience {
        let _ = writeln!(out, "Minimum experience: {} years", years);
    }
    if let Some(education) = requirement.education_level.as_deref() {
        let _ = writeln!(out, "Education: {}", education);
    }
    if let Some(domain) = requirement.domain.as_deref() {
        let _ = writeln!(out, "Domain: {}", domain);
    }
    let _ = write!(out, "Description:\n{}", requirement.description.trim());
    out
}

/// Render the candidate block of a prompt.
pub fn render_candidate(candidate: &Candidate) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "## Candidate profile");
    let _ = writeln!(out, "Name: {}", candidate.full_name.trim());
    if let Some(title) = candidate.current_title.as_deref() {
        let _ = writeln!(out, "Title: {}", title);
    }
    if let Some(location) = candidate.location.as_deref() {
        let _ = writeln!(out, "Location: {}", location);
    }
    if let Some(years) = candidate.years_of_experience {
        let _ = writeln!(out, "Years of experience: {}", years);
    }
    let _ = writeln!(out, "Skills: {}", list_or_none(&candidate.skills));
    if let Some(education) = candidate.education.as_deref() {
        let _ = writeln!(out, "Education: {}", education);
    }
    if let Some(summary) = candidate.summary.as_deref() {
        let _ = writeln!(out, "Summary: {}", summary);
    }
    let _ = write!(
        out,
        "Resume excerpt:\n{}",
        excerpt(candidate.resume_text.trim(), RESUME_EXCERPT_MAX_CHARS)
    );
    out
}

/// Build the user prompt for one scoring call.
///
/// `enriched` is appended under [`ENRICHED_CONTEXT_HEADING`] on a re-match.
pub fn match_prompt(
    requirement: &JobRequirement,
    candidate: &Candidate,
    enriched: Option<&str>,
) -> String {
    let mut prompt = format!(
        "{}\n\n{}",
        render_requirement(requirement),
        render_candidate(candidate)
    );
    if let Some(context) = enriched.map(str::trim).filter(|c| !c.is_empty()) {
        let _ = write!(
            prompt,
            "\n\n{}\nThe first score for this candidate was inconclusive. \
             Take the following into account:\n{}",
            ENRICHED_CONTEXT_HEADING, context
        );
    }
    prompt.push_str("\n\nScore this candidate against the job requirement.");
    prompt
}

/// Build the user prompt for the source-selection pre-step.
pub fn source_selection_prompt(
    requirement: &JobRequirement,
    candidate: &Candidate,
    sources: &[SourceInfo],
) -> String {
    let mut prompt = format!(
        "Job title: {}\nRequired skills: {}\nCandidate: {} ({})\n\nAvailable sources:\n",
        requirement.title.trim(),
        list_or_none(&requirement.required_skills),
        candidate.full_name.trim(),
        candidate.current_title.as_deref().unwrap_or("title unknown"),
    );
    for source in sources {
        let _ = writeln!(prompt, "- {}: {}", source.name, source.description);
    }
    prompt.push_str("\nWhich sources should be consulted?");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{candidate, requirement};

    #[test]
    fn test_match_prompt_without_enrichment() {
        let prompt = match_prompt(&requirement(), &candidate("Ada Lovelace"), None);
        assert!(prompt.starts_with("## Job requirement\nTitle: Platform Engineer"));
        assert!(prompt.contains("Required skills: rust, postgres"));
        assert!(prompt.contains("Preferred skills: none listed"));
        assert!(prompt.contains("Name: Ada Lovelace"));
        assert!(!prompt.contains(ENRICHED_CONTEXT_HEADING));
    }

    #[test]
    fn test_match_prompt_appends_enriched_context() {
        let prompt = match_prompt(
            &requirement(),
            &candidate("Ada Lovelace"),
            Some("[web_search]\n- Talk at RustConf"),
        );
        let heading = prompt.find(ENRICHED_CONTEXT_HEADING).unwrap();
        assert!(prompt[heading..].contains("- Talk at RustConf"));
        assert!(prompt.ends_with("Score this candidate against the job requirement."));

        let blank = match_prompt(&requirement(), &candidate("Ada Lovelace"), Some("  "));
        assert!(!blank.contains(ENRICHED_CONTEXT_HEADING));
    }

    #[test]
    fn test_resume_excerpt_is_truncated_on_char_boundary() {
        let mut c = candidate("Ada Lovelace");
        c.resume_text = "é".repeat(RESUME_EXCERPT_MAX_CHARS + 10);
        let rendered = render_candidate(&c);
        let body = rendered.split("Resume excerpt:\n").nth(1).unwrap();
        assert_eq!(body.chars().count(), RESUME_EXCERPT_MAX_CHARS);
    }

    #[test]
    fn test_source_selection_prompt_lists_sources() {
        let sources = vec![
            SourceInfo {
                name: "web_search".to_string(),
                description: "Public web search".to_string(),
            },
            SourceInfo {
                name: "github".to_string(),
                description: "Open source activity".to_string(),
            },
        ];
        let prompt = source_selection_prompt(&requirement(), &candidate("Ada Lovelace"), &sources);
        assert!(prompt.contains("Candidate: Ada Lovelace (title unknown)"));
        assert!(prompt.contains("- web_search: Public web search\n- github: Open source activity"));
    }
}
