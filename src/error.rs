use thiserror::Error;

/// Errors raised while loading coefficients, extracting features or
/// computing leakage samples.
///
/// None of these are downgraded to default values: a missing category or a
/// wrongly sized feature vector would silently corrupt the leakage statistics.
#[derive(Debug, Error)]
pub enum LeakageError {
    /// Opcode absent from every category, or interaction term absent for the
    /// resolved category.
    #[error("not found: {0}")]
    NotFound(String),

    /// Feature vector length disagrees with the stored coefficient count.
    #[error("dimension mismatch for term '{term}': expected {expected} values, got {found}")]
    DimensionMismatch {
        term: String,
        expected: usize,
        found: usize,
    },

    /// Coefficient source violates the expected schema.
    #[error("malformed coefficient definition: {0}")]
    MalformedDefinition(String),

    /// The feature extractor does not know how to compute this term.
    #[error("unsupported interaction term '{0}'")]
    UnsupportedTerm(String),

    #[error("emulation failed: {0}")]
    Emulation(String),

    #[error("worker pool: {0}")]
    Worker(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LeakageError>;
