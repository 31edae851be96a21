use std::path::PathBuf;

/// Errors that can occur across the Tessera pipeline.
///
/// The first five variants are the retrieval taxonomy: which of them is
/// fatal depends on the pipeline stage that observed it. The rest are
/// ambient failures (I/O, configuration, serialization, deadlines). The
/// binary renders them through `miette`.
///
/// # Examples
///
/// ```
/// use tessera_core::TesseraError;
///
/// let err = TesseraError::InvalidConfig("overlap must be smaller than window".into());
/// assert!(err.to_string().contains("overlap"));
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum TesseraError {
    /// Chunker or pipeline parameter violation, rejected before any I/O.
    #[error("invalid configuration: {0}")]
    #[diagnostic(code(tessera::invalid_config), help("check the [retrieval] section of .tessera.toml"))]
    InvalidConfig(String),

    /// Embedding provider failure.
    #[error("embedding unavailable: {0}")]
    #[diagnostic(code(tessera::embedding), help("is the embedding provider running? try `tessera doctor`"))]
    EmbeddingUnavailable(String),

    /// Vector store failure.
    #[error("vector index unavailable: {0}")]
    #[diagnostic(code(tessera::index))]
    IndexUnavailable(String),

    /// Note source or web source failure.
    #[error("external source unavailable: {0}")]
    ExternalSourceUnavailable(String),

    /// Completion provider failure.
    #[error("completion failed: {0}")]
    #[diagnostic(code(tessera::completion))]
    CompletionFailure(String),

    /// An embedding does not have the dimension the index was created with.
    #[error("dimension mismatch: index expects {expected}, got {actual}")]
    #[diagnostic(
        code(tessera::dimension_mismatch),
        help("embedding.dimensions must match the model; recreate the collection with `tessera init --reset`")
    )]
    DimensionMismatch {
        /// Dimension recorded for the collection.
        expected: usize,
        /// Dimension of the offending vector.
        actual: usize,
    },

    /// A stage (or the whole run) exceeded its time allowance.
    #[error("timed out during {stage}")]
    Timeout {
        /// Name of the stage that ran out of time.
        stage: String,
    },

    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration file content.
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A required file was not found.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: TesseraError = io_err.into();
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn invalid_config_displays_message() {
        let err = TesseraError::InvalidConfig("bad value".into());
        assert_eq!(err.to_string(), "invalid configuration: bad value");
    }

    #[test]
    fn dimension_mismatch_shows_both_sizes() {
        let err = TesseraError::DimensionMismatch {
            expected: 768,
            actual: 384,
        };
        let msg = err.to_string();
        assert!(msg.contains("768"));
        assert!(msg.contains("384"));
    }

    #[test]
    fn timeout_names_stage() {
        let err = TesseraError::Timeout {
            stage: "embed_query".into(),
        };
        assert_eq!(err.to_string(), "timed out during embed_query");
    }

    #[test]
    fn file_not_found_shows_path() {
        let err = TesseraError::FileNotFound(PathBuf::from("/tmp/vault"));
        assert!(err.to_string().contains("/tmp/vault"));
    }
}
