//! Document text extraction.
//!
//! Extraction runs on the blocking thread pool. Loading a new document
//! supersedes any extraction still in flight.

mod normalize;
pub mod pdf;

pub use normalize::normalize_extracted;
pub use pdf::PdfExtractor;

use crate::error::ExtractError;
use log::{debug, info};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::task::AbortHandle;

/// Trait for text extractors
pub trait TextExtractor: Send + Sync {
    /// Extract the raw text of a document.
    fn extract(&self, data: &[u8]) -> Result<String, ExtractError>;

    /// Extractor name for display
    fn name(&self) -> &'static str;
}

/// Reads UTF-8 text, replacing invalid sequences.
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, data: &[u8]) -> Result<String, ExtractError> {
        Ok(String::from_utf8_lossy(data).into_owned())
    }

    fn name(&self) -> &'static str {
        "text"
    }
}

/// Pick an extractor from the file extension. Anything not PDF is read as text.
pub fn extractor_for(path: &Path) -> Box<dyn TextExtractor> {
    let is_pdf = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));

    if is_pdf {
        Box::new(PdfExtractor)
    } else {
        Box::new(PlainTextExtractor)
    }
}

/// Extracted, normalized text of one document.
#[derive(Debug, Clone)]
pub struct Document {
    pub path: PathBuf,
    pub text: String,
}

impl Document {
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// Read and extract a document synchronously.
pub fn extract_file(path: &Path) -> Result<Document, ExtractError> {
    let data = std::fs::read(path)?;
    let extractor = extractor_for(path);
    debug!("Extracting {} with the {} extractor", path.display(), extractor.name());

    let text = normalize_extracted(&extractor.extract(&data)?);
    if text.trim().is_empty() {
        return Err(ExtractError::NoText);
    }

    Ok(Document {
        path: path.to_path_buf(),
        text,
    })
}

/// Loads documents in the background, one at a time.
#[derive(Default)]
pub struct DocumentLoader {
    generation: AtomicU64,
    in_flight: Mutex<Option<AbortHandle>>,
}

impl DocumentLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extract `path`, cancelling any load still in progress.
    ///
    /// Resolves to [`ExtractError::Cancelled`] if another load starts before
    /// this one finishes.
    pub async fn load(&self, path: impl Into<PathBuf>) -> Result<Document, ExtractError> {
        let path = path.into();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let task = tokio::task::spawn_blocking({
            let path = path.clone();
            move || extract_file(&path)
        });

        let previous = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .replace(task.abort_handle());
        if let Some(previous) = previous {
            previous.abort();
        }

        let result = task.await;

        if self.generation.load(Ordering::SeqCst) != generation {
            debug!("Discarding superseded extraction of {}", path.display());
            return Err(ExtractError::Cancelled);
        }

        match result {
            Ok(Ok(document)) => {
                info!(
                    "Extracted {} (~{} words)",
                    path.display(),
                    document.word_count()
                );
                Ok(document)
            }
            Ok(Err(e)) => Err(e),
            Err(e) if e.is_cancelled() => Err(ExtractError::Cancelled),
            Err(e) if e.is_panic() => Err(ExtractError::Corrupted(
                "extractor crashed on this document".into(),
            )),
            Err(e) => Err(ExtractError::Other(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn text_file(contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_extractor_for_extension() {
        assert_eq!(extractor_for(Path::new("book.PDF")).name(), "pdf");
        assert_eq!(extractor_for(Path::new("notes.txt")).name(), "text");
        assert_eq!(extractor_for(Path::new("README")).name(), "text");
    }

    #[test]
    fn test_plain_text_is_lossy() {
        let text = PlainTextExtractor.extract(b"caf\xc3\xa9 \xff").unwrap();
        assert_eq!(text, "café \u{fffd}");
    }

    #[test]
    fn test_extract_file_normalizes() {
        let file = text_file("Hello\nworld.  Second\tline.");
        let document = extract_file(file.path()).unwrap();
        assert_eq!(document.text, "Hello world. Second line.");
        assert_eq!(document.word_count(), 4);
    }

    #[test]
    fn test_extract_blank_file_has_no_text() {
        let file = text_file(" \n\n\t ");
        assert!(matches!(extract_file(file.path()), Err(ExtractError::NoText)));
    }

    #[test]
    fn test_extract_missing_file() {
        let err = extract_file(Path::new("/nonexistent/narrator/doc.txt")).unwrap_err();
        assert!(matches!(err, ExtractError::Io(_)));
    }

    #[tokio::test]
    async fn test_loader_loads_document() {
        let file = text_file("One. Two.");
        let loader = DocumentLoader::new();
        let document = loader.load(file.path()).await.unwrap();
        assert_eq!(document.text, "One. Two.");
        assert_eq!(document.path, file.path());
    }

    #[tokio::test]
    async fn test_newer_load_cancels_older() {
        let first = text_file("First document.");
        let second = text_file("Second document.");
        let loader = DocumentLoader::new();

        let (older, newer) = tokio::join!(loader.load(first.path()), loader.load(second.path()));

        assert!(matches!(older, Err(ExtractError::Cancelled)));
        assert_eq!(newer.unwrap().text, "Second document.");
    }

    #[tokio::test]
    async fn test_loader_reports_extraction_errors() {
        let file = text_file("\n\n");
        let loader = DocumentLoader::new();
        assert!(matches!(loader.load(file.path()).await, Err(ExtractError::NoText)));
    }
}
