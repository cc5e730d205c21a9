//! OTP pipeline orchestration.
//!
//! Rents phone numbers, registers accounts on them, triggers and polls for
//! one-time passwords, and runs multi-round batch logins, persisting every
//! step through [`record_store`].
//!
//! # Flow
//!
//! ```text
//! create ─► pending ─► send_otp ─► waiting ─► check_otp ─► completed
//!                                     └── (expiry) ──────► expired
//! batch_login ─► round 1 ─► retry rounds ─► cohorts + login records
//! ```
//!
//! # Modules
//!
//! - [`phone`] - Phone number canonicalization
//! - [`gateway`] - Provider and registration target traits
//! - [`signup`] - Registration form data synthesis
//! - [`orchestrator`] - Batch workflows
//! - [`aggregator`] - Multi-round login reconciliation and export
//! - [`config`] - Environment configuration

pub mod aggregator;
pub mod config;
pub mod error;
pub mod gateway;
pub mod orchestrator;
pub mod phone;
pub mod signup;

// Re-exports for convenience
pub use aggregator::{BatchSummary, CohortExports, LoginOutcome, OutcomeStatus, ResultAggregator};
pub use config::{Config, PacingConfig, TargetConfig};
pub use error::{GatewayError, PipelineError, PipelineResult, ProviderError};
pub use gateway::{
    extract_otp, AcquiredNumber, NumberProvider, RegistrationData, RegistrationTarget,
};
pub use orchestrator::{
    AutoCompleteReport, BatchLoginReport, ItemFailure, Orchestrator, OtpCheckSummary,
    OtpRetrySummary, PassSummary, ReceivedOtp, StatusReport, MAX_BATCH,
};
pub use phone::{normalize, parse_phone_list, CanonicalPhone, PhoneList};
pub use signup::SignupProfile;
