//! PDF resumes via `pdftotext` (poppler-utils).

use std::io::{ErrorKind, Write};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::debug;

use hireflow_core::defaults::EXTRACTION_CMD_TIMEOUT_SECS;
use hireflow_core::{Error, Result};

use crate::extraction::{ResumeFormat, TextExtractor};

/// Extracts the text layer of a PDF with `pdftotext`.
///
/// Each invocation is guarded by a timeout. A timeout is transient; a
/// missing binary is a configuration error; a file `pdftotext` rejects is
/// permanent.
pub struct PdfTextExtractor {
    binary: String,
    timeout_secs: u64,
}

impl PdfTextExtractor {
    pub fn new() -> Self {
        Self {
            binary: "pdftotext".to_string(),
            timeout_secs: EXTRACTION_CMD_TIMEOUT_SECS,
        }
    }

    /// Use a different `pdftotext` executable.
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

impl Default for PdfTextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Run a command with a timeout, returning stdout as a string.
async fn run_cmd_with_timeout(cmd: &mut Command, timeout_secs: u64) -> Result<String> {
    cmd.kill_on_drop(true);
    let output = tokio::time::timeout(Duration::from_secs(timeout_secs), cmd.output())
        .await
        .map_err(|_| {
            Error::Io(std::io::Error::new(
                ErrorKind::TimedOut,
                format!("External command timed out after {}s", timeout_secs),
            ))
        })?
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => {
                Error::Config(format!("Extraction tool is not installed: {}", e))
            }
            _ => Error::Io(e),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::InvalidInput(format!(
            "Command failed (exit {}): {}",
            output.status,
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[async_trait]
impl TextExtractor for PdfTextExtractor {
    fn formats(&self) -> &[ResumeFormat] {
        &[ResumeFormat::Pdf]
    }

    async fn extract(&self, data: &[u8], filename: &str) -> Result<String> {
        if data.len() < 4 || &data[0..4] != b"%PDF" {
            return Err(Error::InvalidInput(format!(
                "File '{}' is not a valid PDF (missing %PDF header)",
                filename
            )));
        }

        // pdftotext reads from a file path
        let mut tmpfile = NamedTempFile::new()?;
        tmpfile.write_all(data)?;
        tmpfile.flush()?;
        let tmp_path = tmpfile.path().to_string_lossy().to_string();

        let text = run_cmd_with_timeout(
            Command::new(&self.binary)
                .arg("-layout")
                .arg("-enc")
                .arg("UTF-8")
                .arg(&tmp_path)
                .arg("-"),
            self.timeout_secs,
        )
        .await?;

        debug!(
            subsystem = "ingestion",
            component = "pdf_text",
            filename,
            char_count = text.len(),
            "Extracted PDF text"
        );
        Ok(text)
    }

    async fn health_check(&self) -> Result<bool> {
        match Command::new(&self.binary).arg("-v").output().await {
            // pdftotext -v exits with 0 or 99 depending on the version.
            Ok(output) => Ok(output.status.success() || output.status.code() == Some(99)),
            Err(_) => Ok(false),
        }
    }

    fn name(&self) -> &str {
        "pdf_text"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejects_missing_pdf_header() {
        let err = PdfTextExtractor::new()
            .extract(b"not a pdf", "resume.pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_missing_binary_is_config_error() {
        let err = PdfTextExtractor::new()
            .with_binary("hireflow-no-such-pdftotext")
            .extract(b"%PDF-1.4\n", "resume.pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_health_check_false_for_missing_binary() {
        let healthy = PdfTextExtractor::new()
            .with_binary("hireflow-no-such-pdftotext")
            .health_check()
            .await
            .unwrap();
        assert!(!healthy);
    }
}
