//! Pulling a JSON document out of free-form model output.
//!
//! Even in JSON mode, chat models wrap replies in markdown fences, prepend
//! a sentence of prose, or (for reasoning models) emit a `<think>` block
//! first. [`parse_json`] peels those layers off before deserializing, and
//! reports anything still unparseable as [`Error::Inference`] so callers treat
//! it like any other failed model call.

use serde::de::DeserializeOwned;

use hireflow_core::{Error, Result};

/// Remove `<think>...</think>` reasoning blocks.
///
/// An unterminated block swallows the rest of the text.
pub fn strip_think_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("<think>") {
        out.push_str(&rest[..start]);
        match rest[start..].find("</think>") {
            Some(end) => rest = &rest[start + end + "</think>".len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Strip a surrounding markdown code fence (```json ... ``` or ``` ... ```).
pub fn strip_json_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let inner = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```JSON"))
        .or_else(|| trimmed.strip_prefix("```"));
    match inner {
        Some(body) => body.strip_suffix("```").unwrap_or(body).trim(),
        None => trimmed,
    }
}

/// Return the first balanced `{...}` object in `text`, honouring string
/// literals and escapes.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Deserialize a model reply into `T`.
pub fn parse_json<T: DeserializeOwned>(raw: &str) -> Result<T> {
    let cleaned = strip_think_tags(raw);
    let body = strip_json_fences(&cleaned);

    let first_err = match serde_json::from_str::<T>(body) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    match extract_json_object(body) {
        Some(object) if object.len() != body.len() => serde_json::from_str::<T>(object)
            .map_err(|e| Error::Inference(format!("Malformed model response: {}", e))),
        _ => Err(Error::Inference(format!(
            "Malformed model response: {}",
            first_err
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Score {
        match_score: f64,
    }

    #[test]
    fn test_strip_json_fences_tagged() {
        let input = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_json_fences(input), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_json_fences_untagged() {
        let input = "```\n{\"a\": 1}\n```";
        assert_eq!(strip_json_fences(input), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_json_fences_no_fences() {
        assert_eq!(strip_json_fences("  {\"a\": 1} "), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_think_tags() {
        let input = "<think>weigh the gaps</think>{\"match_score\": 55}";
        assert_eq!(strip_think_tags(input), "{\"match_score\": 55}");
        assert_eq!(strip_think_tags("<think>never closed"), "");
    }

    #[test]
    fn test_extract_json_object_skips_prose_and_braces_in_strings() {
        let input = "Here you go: {\"note\": \"uses {braces}\", \"n\": {\"x\": 1}} thanks";
        assert_eq!(
            extract_json_object(input),
            Some("{\"note\": \"uses {braces}\", \"n\": {\"x\": 1}}")
        );
    }

    #[test]
    fn test_extract_json_object_unbalanced() {
        assert_eq!(extract_json_object("{\"a\": 1"), None);
        assert_eq!(extract_json_object("no json here"), None);
    }

    #[test]
    fn test_parse_json_through_all_layers() {
        let raw = "<think>ok</think>\n```json\nSure! {\"match_score\": 81.5}\n```";
        let score: Score = parse_json(raw).unwrap();
        assert_eq!(score, Score { match_score: 81.5 });
    }

    #[test]
    fn test_parse_json_failure_is_inference_error() {
        let err = parse_json::<Score>("I cannot score this candidate.").unwrap_err();
        assert!(matches!(err, Error::Inference(_)));
        assert!(err.to_string().contains("Malformed model response"));
    }
}
