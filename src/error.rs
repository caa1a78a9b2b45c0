use thiserror::Error;

#[derive(Error, Debug)]
pub enum SubbatchError {
    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("Stage timed out after {0}s")]
    StageTimeout(u64),

    #[error("Stage failed: {0}")]
    StageFailure(String),

    #[error("Ledger I/O failed for {path}: {reason}")]
    LedgerIo { path: String, reason: String },

    #[error("Subtitle serialization failed: {0}")]
    Serialization(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification used for per-unit reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    InvalidIdentity,
    StageTimeout,
    StageFailure,
    LedgerIo,
    Serialization,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::InvalidIdentity => write!(f, "invalid identity"),
            FailureKind::StageTimeout => write!(f, "timeout"),
            FailureKind::StageFailure => write!(f, "stage failure"),
            FailureKind::LedgerIo => write!(f, "ledger i/o"),
            FailureKind::Serialization => write!(f, "serialization"),
        }
    }
}

impl SubbatchError {
    pub fn ledger_io(path: &std::path::Path, reason: impl std::fmt::Display) -> Self {
        SubbatchError::LedgerIo {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    /// Everything a stage can raise collapses into one of the batch-level kinds.
    pub fn kind(&self) -> FailureKind {
        match self {
            SubbatchError::InvalidIdentity(_) => FailureKind::InvalidIdentity,
            SubbatchError::StageTimeout(_) => FailureKind::StageTimeout,
            SubbatchError::LedgerIo { .. } => FailureKind::LedgerIo,
            SubbatchError::Serialization(_) => FailureKind::Serialization,
            _ => FailureKind::StageFailure,
        }
    }

    /// Only a broken durability boundary may abort a batch run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SubbatchError::LedgerIo { .. })
    }
}

pub type Result<T> = std::result::Result<T, SubbatchError>;
