//! External collaborators: the number-rental provider and the registration
//! target.
//!
//! Both are capability traits. Concrete implementations (HTTP clients,
//! browser drivers, test doubles) live outside the orchestration core and
//! own their transports, timeouts and success detection.

mod provider;
mod registration;

pub use provider::{extract_otp, AcquiredNumber, NumberProvider};
pub use registration::{RegistrationData, RegistrationTarget};

#[cfg(test)]
pub use provider::MockNumberProvider;
#[cfg(test)]
pub use registration::MockRegistrationTarget;
