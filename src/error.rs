use std::path::PathBuf;

use thiserror::Error;

/// Boxed cause attached to failures that wrap lower-level errors.
pub type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum Error {
    /// The audio could not be decoded or transformed. Callers building a
    /// dataset skip the sample; a single prediction reports it.
    #[error("failed to extract features from {}: {source}", path.display())]
    FeatureExtraction {
        path: PathBuf,
        #[source]
        source: Cause,
    },

    #[error("label table not found at {}", .0.display())]
    LabelTableNotFound(PathBuf),

    #[error("invalid label table {}: {source}", path.display())]
    InvalidLabelTable {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("no training data found under {}", .0.display())]
    NoTrainingData(PathBuf),

    #[error("need at least {required} examples to hold out a validation set, got {found}")]
    InsufficientData { required: usize, found: usize },

    #[error("feature tensor shape mismatch: expected {expected}, found {found}")]
    ShapeMismatch { expected: String, found: String },

    #[error("model not trained yet: no artifact at {}; run `mindsight train` first", .0.display())]
    ModelNotTrained(PathBuf),

    #[error("model store error for {}: {message}", path.display())]
    ModelStore { path: PathBuf, message: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
