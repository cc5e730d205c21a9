//! Registration target interface.

use crate::error::GatewayError;
use crate::phone::CanonicalPhone;
use async_trait::async_trait;
use chrono::NaiveDate;
use secrecy::SecretString;

/// Everything submitted to the target's signup form.
#[derive(Debug, Clone)]
pub struct RegistrationData {
    pub full_name: String,
    pub phone: CanonicalPhone,
    pub email: String,
    pub birthdate: NaiveDate,
    pub password: SecretString,
    pub pin: SecretString,
    pub security_answer: String,
    /// Provider order the phone belongs to
    pub order_id: String,
}

/// External signup / login target.
///
/// Implementations apply their own success detection and transient-failure
/// retries; the orchestrator only sees success or a reason string.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RegistrationTarget: Send + Sync {
    /// Create an account bound to `data.phone` and `data.email`.
    async fn register(&self, data: &RegistrationData) -> Result<(), GatewayError>;

    /// Log in, which triggers OTP delivery to `phone`.
    async fn login(&self, phone: &CanonicalPhone, password: &SecretString)
        -> Result<(), GatewayError>;
}
