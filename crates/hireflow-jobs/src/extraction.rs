//! Resume text extraction by file format.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use hireflow_core::{Error, Result};

use crate::adapters::{PdfTextExtractor, TextNativeExtractor};

/// Resume file formats the pipeline can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResumeFormat {
    /// Plain text, read as UTF-8 with lossy conversion.
    PlainText,
    /// Markdown, read like plain text.
    Markdown,
    /// PDF with a text layer.
    Pdf,
}

impl ResumeFormat {
    /// Detect the format from a file name's extension (case-insensitive).
    pub fn from_filename(filename: &str) -> Option<Self> {
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())?
            .to_ascii_lowercase();
        match ext.as_str() {
            "txt" | "text" => Some(ResumeFormat::PlainText),
            "md" | "markdown" => Some(ResumeFormat::Markdown),
            "pdf" => Some(ResumeFormat::Pdf),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResumeFormat::PlainText => "text",
            ResumeFormat::Markdown => "markdown",
            ResumeFormat::Pdf => "pdf",
        }
    }
}

/// Turns the raw bytes of a resume into text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Formats this extractor reads.
    fn formats(&self) -> &[ResumeFormat];

    /// Extract text from file contents.
    async fn extract(&self, data: &[u8], filename: &str) -> Result<String>;

    /// Whether the extractor's external dependencies are available.
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    /// Human-readable name.
    fn name(&self) -> &str;
}

/// Registry mapping resume formats to their extractors.
pub struct ExtractionRegistry {
    extractors: HashMap<ResumeFormat, Arc<dyn TextExtractor>>,
}

impl ExtractionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            extractors: HashMap::new(),
        }
    }

    /// Registry with the built-in text and PDF extractors.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(TextNativeExtractor));
        registry.register(Arc::new(PdfTextExtractor::new()));
        registry
    }

    /// Register an extractor for every format it declares, replacing earlier ones.
    pub fn register(&mut self, extractor: Arc<dyn TextExtractor>) {
        for format in extractor.formats() {
            self.extractors.insert(*format, extractor.clone());
        }
    }

    pub fn has_extractor(&self, format: ResumeFormat) -> bool {
        self.extractors.contains_key(&format)
    }

    /// Extract text from a resume file, choosing the extractor by extension.
    ///
    /// Unknown formats are [`Error::UnsupportedFormat`]; a file without any
    /// text is [`Error::InvalidInput`]. Both are permanent.
    pub async fn extract(&self, data: &[u8], filename: &str) -> Result<String> {
        let format = ResumeFormat::from_filename(filename)
            .ok_or_else(|| Error::UnsupportedFormat(filename.to_string()))?;
        let extractor = self
            .extractors
            .get(&format)
            .ok_or_else(|| Error::UnsupportedFormat(filename.to_string()))?;

        let text = extractor.extract(data, filename).await?;
        if text.trim().is_empty() {
            return Err(Error::InvalidInput(format!(
                "No text could be extracted from '{}'",
                filename
            )));
        }
        Ok(text)
    }

    /// Run health checks on all registered extractors.
    pub async fn health_check_all(&self) -> HashMap<String, bool> {
        let mut results = HashMap::new();
        for extractor in self.extractors.values() {
            let healthy = extractor.health_check().await.unwrap_or(false);
            results.insert(extractor.name().to_string(), healthy);
        }
        results
    }
}

impl Default for ExtractionRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_detection() {
        assert_eq!(
            ResumeFormat::from_filename("ada.TXT"),
            Some(ResumeFormat::PlainText)
        );
        assert_eq!(
            ResumeFormat::from_filename("cv/ada.md"),
            Some(ResumeFormat::Markdown)
        );
        assert_eq!(ResumeFormat::from_filename("ada.pdf"), Some(ResumeFormat::Pdf));
        assert_eq!(ResumeFormat::from_filename("photo.png"), None);
        assert_eq!(ResumeFormat::from_filename("README"), None);
    }

    #[test]
    fn test_default_registry_covers_formats() {
        let registry = ExtractionRegistry::with_defaults();
        assert!(registry.has_extractor(ResumeFormat::PlainText));
        assert!(registry.has_extractor(ResumeFormat::Markdown));
        assert!(registry.has_extractor(ResumeFormat::Pdf));
    }

    #[tokio::test]
    async fn test_unsupported_format_is_permanent() {
        let registry = ExtractionRegistry::with_defaults();
        let err = registry.extract(b"GIF89a", "photo.gif").await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_blank_file_is_invalid_input() {
        let registry = ExtractionRegistry::with_defaults();
        let err = registry.extract(b"  \n\t ", "blank.txt").await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_text_extraction_through_registry() {
        let registry = ExtractionRegistry::with_defaults();
        let text = registry
            .extract(b"# Ada Lovelace\nAnalyst", "ada.md")
            .await
            .unwrap();
        assert!(text.contains("Ada Lovelace"));
    }

    #[tokio::test]
    async fn test_empty_registry_rejects_known_format() {
        let registry = ExtractionRegistry::new();
        let err = registry.extract(b"hello", "a.txt").await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }
}
