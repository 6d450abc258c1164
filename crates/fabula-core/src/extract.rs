//! Document text extraction.
//!
//! PDFs are converted through the `pdftotext` binary; plain text and
//! markdown are read directly. Extraction runs on the blocking pool since
//! both paths do synchronous IO.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config;
use crate::error::{Error, Result};

/// Extract the readable text of a document. Fails when the format is
/// unsupported or the document yields no text at all.
pub async fn extract_text(path: &Path) -> Result<String> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    if !config::DOCUMENT_EXTENSIONS.contains(&extension.as_str()) {
        return Err(Error::InvalidInput(format!(
            "Unsupported document format '{extension}', expected one of: {}",
            config::DOCUMENT_EXTENSIONS.join(", ")
        )));
    }

    let path: PathBuf = path.to_path_buf();
    let text = tokio::task::spawn_blocking(move || {
        if extension == "pdf" {
            extract_pdf_text(&path)
        } else {
            extract_plain_text(&path)
        }
    })
    .await
    .map_err(|e| Error::Internal(format!("Extraction task failed: {e}")))??;

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(Error::Extraction(
            "Document contains no extractable text".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

fn extract_plain_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| Error::Extraction(format!("Failed to read {}: {e}", path.display())))
}

fn extract_pdf_text(path: &Path) -> Result<String> {
    let output = Command::new("pdftotext")
        .arg("-enc")
        .arg("UTF-8")
        .arg(path)
        .arg("-")
        .output()
        .map_err(|e| Error::Extraction(format!("Failed to launch pdftotext: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Extraction(format!(
            "pdftotext failed for {}: {}",
            path.display(),
            stderr.trim()
        )));
    }

    String::from_utf8(output.stdout)
        .map_err(|e| Error::Extraction(format!("pdftotext produced invalid UTF-8: {e}")))
}
