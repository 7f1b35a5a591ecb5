//! Error types for the notification service.
//!
//! Only the fatal tier lives here: failures that abort a call with no
//! partial mutation. Per-item failures (an unknown account inside a
//! membership list) are values, not errors — see
//! [`WaitSetError`](crate::waitset::WaitSetError).

use crate::types::{AccountId, WaitSetId};
use thiserror::Error;

/// Fatal error for service operations.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Waitset not found: {0}")]
    WaitSetNotFound(WaitSetId),

    #[error("Permission denied: {requester} does not own waitset {waitset}")]
    PermissionDenied {
        requester: AccountId,
        waitset: WaitSetId,
    },

    #[error("Unknown interest type: {0}")]
    UnknownInterestType(String),

    #[error("Invalid sequence token: {0}")]
    InvalidSequenceToken(String),
}

/// Result type for service operations.
pub type Result<T> = std::result::Result<T, WatchError>;
