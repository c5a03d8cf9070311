//! Text extraction for the supported corpus file types.
//!
//! Dispatch is by lowercase file extension. Each extractor returns one or
//! more texts: PDFs yield one text per page, everything else yields a single
//! text. Extraction never panics; the loader turns an [`ExtractError`] into a
//! warning and skips the file.

use std::path::Path;
use std::process::Command;

use thiserror::Error;

/// Executable invoked for image OCR.
const OCR_COMMAND: &str = "tesseract";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Pdf,
    Text,
    Image,
}

impl FileKind {
    /// Classify a path by extension. `None` means the file is not part of the corpus.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(FileKind::Pdf),
            "txt" | "md" => Some(FileKind::Text),
            "png" | "jpg" | "jpeg" => Some(FileKind::Image),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported file type: {0}")]
    Unsupported(String),
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("OCR failed: {0}")]
    Ocr(String),
}

/// Extract raw text from a corpus file.
pub fn extract_file(path: &Path) -> Result<Vec<String>, ExtractError> {
    match FileKind::from_path(path) {
        Some(FileKind::Pdf) => extract_pdf(&std::fs::read(path)?),
        Some(FileKind::Text) => Ok(vec![extract_plain(&std::fs::read(path)?)]),
        Some(FileKind::Image) => extract_image(path).map(|text| vec![text]),
        None => Err(ExtractError::Unsupported(path.display().to_string())),
    }
}

/// One string per page, in page order.
///
/// The PDF parser can panic on malformed input; a panic is reported as an
/// ordinary extraction failure.
pub fn extract_pdf(bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes)) {
        Ok(Ok(pages)) => Ok(pages),
        Ok(Err(e)) => Err(ExtractError::Pdf(e.to_string())),
        Err(_) => Err(ExtractError::Pdf("parser panicked on malformed input".to_string())),
    }
}

fn extract_plain(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn extract_image(path: &Path) -> Result<String, ExtractError> {
    let output = Command::new(OCR_COMMAND)
        .arg(path)
        .arg("stdout")
        .output()
        .map_err(|e| ExtractError::Ocr(format!("could not run {}: {}", OCR_COMMAND, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ExtractError::Ocr(format!(
            "{} exited with {}: {}",
            OCR_COMMAND,
            output.status,
            stderr.trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn classifies_supported_extensions() {
        assert_eq!(FileKind::from_path(Path::new("a.PDF")), Some(FileKind::Pdf));
        assert_eq!(FileKind::from_path(Path::new("a.md")), Some(FileKind::Text));
        assert_eq!(FileKind::from_path(Path::new("a.txt")), Some(FileKind::Text));
        assert_eq!(FileKind::from_path(Path::new("a.jpeg")), Some(FileKind::Image));
        assert_eq!(FileKind::from_path(Path::new("a.docx")), None);
        assert_eq!(FileKind::from_path(Path::new("README")), None);
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract_pdf(b"not a pdf").unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn pdf_yields_one_text_per_page() {
        let fixture = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/two_pages.pdf");
        let pages = extract_file(&fixture).unwrap();
        assert_eq!(pages.len(), 2);
        assert!(pages[0].contains("conveyance"));
        assert!(pages[1].contains("survey"));
    }

    #[test]
    fn truncated_pdf_is_an_error_not_a_panic() {
        let fixture = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/two_pages.pdf");
        let bytes = std::fs::read(fixture).unwrap();
        // Keep the header and first objects, lose the xref and trailer.
        let err = extract_pdf(&bytes[..bytes.len() / 2]).unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn unsupported_extension_returns_error() {
        let err = extract_file(&PathBuf::from("plans.dwg")).unwrap_err();
        assert!(matches!(err, ExtractError::Unsupported(_)));
    }

    #[test]
    fn text_file_is_read_whole() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.md");
        std::fs::write(&path, "# Roof\n\nSlate, replaced 1975.").unwrap();
        let texts = extract_file(&path).unwrap();
        assert_eq!(texts, vec!["# Roof\n\nSlate, replaced 1975.".to_string()]);
    }

    #[test]
    fn invalid_utf8_is_decoded_lossily() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.txt");
        std::fs::write(&path, [b'o', b'k', 0xff]).unwrap();
        let texts = extract_file(&path).unwrap();
        assert!(texts[0].starts_with("ok"));
    }
}
