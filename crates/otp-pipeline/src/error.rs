//! Pipeline error types.

use record_store::{LifecycleError, StoreError};
use thiserror::Error;

/// Number-rental provider failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The provider has no code for the order yet. Expected while polling.
    #[error("No OTP received yet")]
    NoOtpYet,

    #[error("Provider reported failure: {0}")]
    Upstream(String),

    #[error("Provider transport error: {0}")]
    Transport(String),
}

/// Failure reported by the registration target, with its reason.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct GatewayError {
    pub reason: String,
}

impl GatewayError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Main pipeline error type.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Registration failed: {0}")]
    Registration(String),

    #[error("Login failed: {0}")]
    Login(String),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Export error: {0}")]
    Export(String),
}

impl PipelineError {
    /// Whether the error belongs to a single item and the batch may go on.
    ///
    /// Storage and export failures are not item-level.
    pub fn is_item_level(&self) -> bool {
        !matches!(
            self,
            PipelineError::Store(_)
                | PipelineError::Lifecycle(LifecycleError::Store(_))
                | PipelineError::Export(_)
        )
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        PipelineError::Export(e.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(e: serde_json::Error) -> Self {
        PipelineError::Export(format!("JSON serialization error: {}", e))
    }
}

/// Result type alias for pipeline errors.
pub type PipelineResult<T> = Result<T, PipelineError>;
