use std::io;

/// Failures returned by the embedding engine.
///
/// Every variant is recoverable by the caller. The engine itself never logs
/// them; presentation is left to the driver.
#[derive(Debug, thiserror::Error)]
pub enum W2vError {
    #[error("no token reached min_count {min_count}, vocabulary is empty")]
    EmptyVocabulary { min_count: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("corrupt model file: {0}")]
    CorruptModel(String),

    #[error("unsupported model format version {0}")]
    UnsupportedVersion(u32),

    #[error("token '{0}' is not in the vocabulary")]
    UnknownToken(String),

    #[error("{} queried token(s) not in the vocabulary: {}", missing.len(), missing.join(", "))]
    PartialMiss { missing: Vec<String> },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("npy export error: {0}")]
    Npy(#[from] ndarray_npy::WriteNpyError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cannot start training workers: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, W2vError>;
