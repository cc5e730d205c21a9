//! Durable work-record log for the OTP pipeline.
//!
//! Records live in a single JSON array. A missing or corrupt file is reset
//! to an empty collection instead of failing, and time-based expiry is
//! evaluated lazily whenever the log is scanned.

mod error;
pub mod lifecycle;
mod store;
mod types;

pub use error::{LifecycleError, StoreError};
pub use lifecycle::{Lifecycle, Transition, DEFAULT_EXPIRY};
pub use store::{FileStore, MemoryStore, Store};
pub use types::*;
