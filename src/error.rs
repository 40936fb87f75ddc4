use crate::types::{CategoryId, NomineeId};

/// Result type for ledger, tabulator and store operations
pub type AwardResult<T> = Result<T, AwardError>;

/// Errors surfaced to the API layer. Each variant maps to a distinct,
/// user-actionable error code.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AwardError {
    #[error("Category {0} not found")]
    CategoryNotFound(CategoryId),

    #[error("Nominee {0} not found")]
    NomineeNotFound(NomineeId),

    #[error("Nominee {nominee_id} does not belong to category {category_id}")]
    InvalidNomineeForCategory {
        nominee_id: NomineeId,
        category_id: CategoryId,
    },

    #[error("Voting is locked for category {0}")]
    CategoryLocked(CategoryId),

    #[error("Concurrent write conflict, please retry")]
    StorageConflict,

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

impl AwardError {
    /// Stable machine-readable code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            AwardError::CategoryNotFound(_) => "CATEGORY_NOT_FOUND",
            AwardError::NomineeNotFound(_) => "NOMINEE_NOT_FOUND",
            AwardError::InvalidNomineeForCategory { .. } => "INVALID_NOMINEE_FOR_CATEGORY",
            AwardError::CategoryLocked(_) => "CATEGORY_LOCKED",
            AwardError::StorageConflict => "STORAGE_CONFLICT",
            AwardError::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            AwardError::InvalidSnapshot(_) => "INVALID_SNAPSHOT",
        }
    }

    /// Whether the caller may succeed by simply retrying the same request
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AwardError::StorageConflict | AwardError::StorageUnavailable(_)
        )
    }
}
