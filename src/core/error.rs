use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopomError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Fleet sync failed: {acknowledged} acknowledged, failed: {}", .failed.join("; "))]
    Sync {
        failed: Vec<String>,
        acknowledged: usize,
    },

    #[error("No slot action is ready to prepare")]
    NothingToDo,

    #[error("Topology manager is closed")]
    Closed,

    #[error("Store is locked: {0}")]
    Locked(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, TopomError>;

impl TopomError {
    /// Bad input or an operation requested in the wrong action state.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::NotFound(_))
    }

    /// Concurrent modification detected by a conditional write.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// One or more proxies did not acknowledge a slot table push.
    pub fn is_sync(&self) -> bool {
        matches!(self, Self::Sync { .. })
    }
}

impl From<std::io::Error> for TopomError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for TopomError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
