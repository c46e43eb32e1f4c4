use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("Speech engine is not initialized")]
    EngineNotInitialized,

    #[error("Speech engine failed, playback stopped")]
    EngineError,

    #[error("Invalid seek target {index} (document has {len} segments)")]
    InvalidSeekTarget { index: usize, len: usize },

    #[error("Nothing to speak: input text is blank")]
    EmptyInput,

    #[error("Player is no longer running")]
    PlayerClosed,
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Document is password protected")]
    PasswordProtected,

    #[error("Document is encrypted")]
    Encrypted,

    #[error("Document is corrupted: {0}")]
    Corrupted(String),

    #[error("Document contains no extractable text")]
    NoText,

    #[error("Extraction cancelled by a newer document")]
    Cancelled,

    #[error("Extraction failed: {0}")]
    Other(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PlaybackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seek_error_display() {
        let err = PlaybackError::InvalidSeekTarget { index: 7, len: 3 };
        assert_eq!(
            err.to_string(),
            "Invalid seek target 7 (document has 3 segments)"
        );
    }

    #[test]
    fn test_extract_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.pdf");
        let err: ExtractError = io.into();
        assert!(matches!(err, ExtractError::Io(_)));
        assert!(err.to_string().contains("missing.pdf"));
    }
}
