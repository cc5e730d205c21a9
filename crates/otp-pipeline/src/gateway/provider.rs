//! Number-rental provider interface.

use crate::error::ProviderError;
use crate::phone::CanonicalPhone;
use async_trait::async_trait;

const OTP_MIN_DIGITS: usize = 4;
const OTP_MAX_DIGITS: usize = 8;

/// A rented number and the provider's handle for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquiredNumber {
    /// Opaque order handle used to fetch the OTP later
    pub order_id: String,
    /// Number already in canonical local format
    pub phone: CanonicalPhone,
}

/// Remote number-rental API.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NumberProvider: Send + Sync {
    /// Rent a fresh number.
    async fn acquire_number(&self) -> Result<AcquiredNumber, ProviderError>;

    /// Fetch the OTP delivered to `order_id`.
    ///
    /// Returns [`ProviderError::NoOtpYet`] while nothing has arrived.
    async fn fetch_otp(&self, order_id: &str) -> Result<String, ProviderError>;
}

/// Extract the first run of 4 to 8 digits from provider free text.
pub fn extract_otp(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    let mut start = 0;

    while start < bytes.len() {
        if !bytes[start].is_ascii_digit() {
            start += 1;
            continue;
        }
        let run = bytes[start..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count();
        if run >= OTP_MIN_DIGITS {
            let end = start + run.min(OTP_MAX_DIGITS);
            return Some(text[start..end].to_string());
        }
        start += run;
    }
    None
}
