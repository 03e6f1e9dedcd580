use thiserror::Error;

/// Errors that can occur while loading, encoding or tagging Open IE data.
#[derive(Debug, Error)]
pub enum OieError {
    /// Reading a dataset, embedding or model file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The table header does not name a required column.
    #[error("missing column {column:?} in header")]
    MissingColumn {
        /// The column that was looked up.
        column: String,
    },

    /// A data row could not be interpreted.
    #[error("malformed row at line {line}: {reason}")]
    MalformedRow {
        /// 1-based line number in the source file.
        line: usize,
        /// What was wrong with the row.
        reason: String,
    },

    /// Padding was requested over an empty collection of sequences.
    #[error("cannot pad an empty collection of sequences")]
    EmptySequences,

    /// A label is not part of the vocabulary it is being encoded with.
    #[error("label {0:?} is not in the vocabulary")]
    UnknownLabel(String),

    /// A class index is outside the vocabulary.
    #[error("class index {index} is out of range for {num_classes} classes")]
    UnknownClass {
        /// The index that was decoded.
        index: usize,
        /// Number of classes in the vocabulary.
        num_classes: usize,
    },

    /// An index was produced by a different label vocabulary than the one decoding it.
    #[error("label vocabulary mismatch: expected version {expected:016x}, got {found:016x}")]
    VocabularyMismatch {
        /// Version of the decoding vocabulary.
        expected: u64,
        /// Version carried by the encoded value.
        found: u64,
    },

    /// The model has not been built yet; its class count is unknown until a
    /// training set is loaded.
    #[error("model has not been trained")]
    NotTrained,

    /// An embedding table could not be built.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Candle ML framework error.
    #[error("ML framework error: {0}")]
    Candle(String),

    /// JSON (de)serialisation failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for Open IE pipeline operations.
pub type Result<T> = std::result::Result<T, OieError>;
