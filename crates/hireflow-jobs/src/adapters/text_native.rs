//! Plain text and markdown resumes.

use async_trait::async_trait;

use hireflow_core::Result;

use crate::extraction::{ResumeFormat, TextExtractor};

/// Reads bytes as UTF-8, replacing invalid sequences.
pub struct TextNativeExtractor;

#[async_trait]
impl TextExtractor for TextNativeExtractor {
    fn formats(&self) -> &[ResumeFormat] {
        &[ResumeFormat::PlainText, ResumeFormat::Markdown]
    }

    async fn extract(&self, data: &[u8], _filename: &str) -> Result<String> {
        Ok(String::from_utf8_lossy(data).into_owned())
    }

    fn name(&self) -> &str {
        "text_native"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_text_native_extraction() {
        let text = TextNativeExtractor
            .extract(b"Grace Hopper\nRear Admiral", "grace.txt")
            .await
            .unwrap();
        assert_eq!(text, "Grace Hopper\nRear Admiral");
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_replaced() {
        let text = TextNativeExtractor
            .extract(&[b'A', 0xFF, b'B'], "bad.txt")
            .await
            .unwrap();
        assert_eq!(text, "A\u{FFFD}B");
    }
}
