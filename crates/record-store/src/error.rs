//! Record store and lifecycle errors.

use crate::lifecycle::Transition;
use crate::types::RecordStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Invalid transition {transition:?} from status {from}")]
    InvalidTransition {
        from: RecordStatus,
        transition: Transition,
    },

    #[error("Record not found: {0}")]
    UnknownRecord(u64),

    #[error(transparent)]
    Store(#[from] StoreError),
}
