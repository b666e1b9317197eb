//! LLM extraction of structured candidate fields from resume text.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use hireflow_core::{defaults, lenient, GenerationBackend, NewCandidate, Result};
use hireflow_inference::parse_json;

/// System prompt fixing the extraction schema.
pub const RESUME_SYSTEM_PROMPT: &str = "You extract structured data from resumes. \
Respond with a single JSON object and nothing else, using exactly these keys: \
\"name\" (string), \"email\" (string or null), \"phone\" (string or null), \
\"location\" (string or null), \"current_title\" (string or null), \
\"years_of_experience\" (number or null), \"skills\" (array of strings), \
\"education\" (string or null), \"summary\" (string, two sentences at most), \
\"experience_summary\" (string or null). Use null for anything the resume does not state.";

/// Fields the model extracts from a resume.
///
/// Every field goes through the lenient adapters: models return lists where
/// strings are expected and numbers as strings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ParsedResume {
    #[serde(default, alias = "full_name", deserialize_with = "lenient::opt_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub phone: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub location: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub current_title: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub years_of_experience: Option<f64>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub skills: Vec<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub education: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub summary: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub experience_summary: Option<String>,
}

impl ParsedResume {
    /// Build the candidate record for this resume.
    ///
    /// The display name falls back to the file stem when the model found none.
    pub fn into_candidate(
        self,
        resume_text: &str,
        source_filename: Option<&str>,
    ) -> NewCandidate {
        let full_name = self
            .name
            .filter(|n| !n.trim().is_empty())
            .or_else(|| source_filename.and_then(name_from_filename))
            .unwrap_or_else(|| "Unknown Candidate".to_string());

        NewCandidate {
            full_name,
            email: self.email.filter(|e| e.contains('@')),
            phone: self.phone,
            location: self.location,
            current_title: self.current_title,
            years_of_experience: self.years_of_experience.filter(|y| *y >= 0.0),
            skills: normalize_skills(&self.skills),
            education: self.education,
            summary: self.summary,
            experience_summary: self.experience_summary,
            resume_text: resume_text.to_string(),
            content_hash: content_hash(resume_text),
            source_filename: source_filename.map(str::to_string),
        }
    }
}

fn name_from_filename(filename: &str) -> Option<String> {
    let stem = Path::new(filename).file_stem()?.to_str()?;
    let name = stem
        .split(['_', '-', '.', ' '])
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Lowercase, trim and dedupe skills, keeping first-seen order.
pub fn normalize_skills(skills: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    skills
        .iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

/// SHA-256 of the resume text, hex encoded.
pub fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Cut text to at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Build the user prompt for one resume.
pub fn resume_prompt(resume_text: &str) -> String {
    format!(
        "Extract the candidate profile from this resume.\n\n--- RESUME ---\n{}\n--- END RESUME ---",
        truncate_chars(resume_text.trim(), defaults::RESUME_PROMPT_MAX_CHARS)
    )
}

/// Runs the extraction prompt against a generation backend.
#[derive(Clone)]
pub struct ResumeAnalyzer {
    llm: Arc<dyn GenerationBackend>,
}

impl ResumeAnalyzer {
    pub fn new(llm: Arc<dyn GenerationBackend>) -> Self {
        Self { llm }
    }

    /// Extract structured fields from resume text.
    ///
    /// A reply that is not a JSON object is an [`hireflow_core::Error::Inference`],
    /// which the job retry policy treats as transient.
    pub async fn analyze(&self, resume_text: &str) -> Result<ParsedResume> {
        let start = Instant::now();
        let prompt = resume_prompt(resume_text);
        let reply = self
            .llm
            .generate_with_system(RESUME_SYSTEM_PROMPT, &prompt)
            .await?;
        let parsed: ParsedResume = parse_json(&reply)?;

        debug!(
            subsystem = "ingestion",
            component = "resume_analyzer",
            op = "analyze",
            model = self.llm.model_name(),
            prompt_len = prompt.len(),
            response_len = reply.len(),
            skills = parsed.skills.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Resume analyzed"
        );
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hireflow_core::Error;
    use hireflow_inference::mock::ScriptedGenerationBackend;

    #[test]
    fn test_parsed_resume_is_lenient() {
        let parsed: ParsedResume = serde_json::from_str(
            r#"{
                "name": "Ada Lovelace",
                "email": "ADA@Example.com",
                "years_of_experience": "7 ",
                "skills": "Rust, Postgres; rust",
                "education": ["BSc Mathematics", "MSc Computing"],
                "summary": null
            }"#,
        )
        .unwrap();
        assert_eq!(parsed.name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(parsed.years_of_experience, Some(7.0));
        assert_eq!(
            parsed.education.as_deref(),
            Some("BSc Mathematics, MSc Computing")
        );
        assert!(parsed.summary.is_none());

        let candidate = parsed.into_candidate("resume body", Some("ada.txt"));
        assert_eq!(candidate.skills, vec!["rust", "postgres"]);
        assert_eq!(candidate.content_hash, content_hash("resume body"));
    }

    #[test]
    fn test_name_falls_back_to_filename() {
        let candidate = ParsedResume::default().into_candidate("text", Some("grace_hopper-cv.pdf"));
        assert_eq!(candidate.full_name, "grace hopper cv");

        let candidate = ParsedResume::default().into_candidate("text", None);
        assert_eq!(candidate.full_name, "Unknown Candidate");
    }

    #[test]
    fn test_invalid_email_dropped() {
        let parsed = ParsedResume {
            email: Some("not provided".to_string()),
            ..Default::default()
        };
        assert!(parsed.into_candidate("t", None).email.is_none());
    }

    #[test]
    fn test_normalize_skills() {
        let skills = vec![
            " Rust ".to_string(),
            "SQL".to_string(),
            "rust".to_string(),
            "".to_string(),
        ];
        assert_eq!(normalize_skills(&skills), vec!["rust", "sql"]);
    }

    #[test]
    fn test_content_hash_is_stable_hex() {
        let hash = content_hash("hello");
        assert_eq!(hash.len(), 64);
        assert_eq!(
            hash,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[tokio::test]
    async fn test_analyzer_parses_fenced_reply() {
        let llm = ScriptedGenerationBackend::new()
            .with_default("```json\n{\"name\": \"Alan Turing\", \"skills\": [\"Cryptanalysis\"]}\n```");
        let analyzer = ResumeAnalyzer::new(Arc::new(llm.clone()));

        let parsed = analyzer.analyze("Alan Turing\nBletchley Park").await.unwrap();
        assert_eq!(parsed.name.as_deref(), Some("Alan Turing"));
        assert_eq!(parsed.skills, vec!["Cryptanalysis"]);

        let calls = llm.calls();
        assert_eq!(calls[0].system, RESUME_SYSTEM_PROMPT);
        assert!(calls[0].prompt.contains("Bletchley Park"));
    }

    #[tokio::test]
    async fn test_analyzer_malformed_reply_is_transient() {
        let llm = ScriptedGenerationBackend::new().with_default("I cannot help with that.");
        let analyzer = ResumeAnalyzer::new(Arc::new(llm));
        let err = analyzer.analyze("text").await.unwrap_err();
        assert!(matches!(err, Error::Inference(_)));
        assert!(err.is_transient());
    }
}
