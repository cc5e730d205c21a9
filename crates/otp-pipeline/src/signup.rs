//! Synthesis of signup form data.

use crate::config::TargetConfig;
use crate::error::PipelineError;
use crate::gateway::{AcquiredNumber, RegistrationData};
use chrono::{Datelike, NaiveDate};
use rand::Rng;
use secrecy::SecretString;

const EMAIL_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const EMAIL_LOCAL_LEN: usize = 15;

/// Birthdates fall between these many years before today.
const MIN_AGE_YEARS: i32 = 20;
const MAX_AGE_YEARS: i32 = 60;

/// Fixed account fields shared by every signup.
#[derive(Debug, Clone)]
pub struct SignupProfile {
    pub full_name: String,
    pub password: SecretString,
    pub pin: SecretString,
    pub security_answer: String,
    pub email_domain: String,
}

impl SignupProfile {
    /// Build the profile from target configuration. A password is required.
    pub fn from_target(target: &TargetConfig) -> Result<Self, PipelineError> {
        let password = target.password.clone().ok_or_else(|| {
            PipelineError::Validation("Target password is not configured".to_string())
        })?;

        Ok(Self {
            full_name: target.full_name.clone(),
            password,
            pin: target.pin.clone(),
            security_answer: target.security_answer.clone(),
            email_domain: target.email_domain.clone(),
        })
    }

    /// Registration data for `number`, generating an email unless one is given.
    pub fn registration_data<R: Rng + ?Sized>(
        &self,
        number: &AcquiredNumber,
        email: Option<&str>,
        rng: &mut R,
        today: NaiveDate,
    ) -> RegistrationData {
        let email = match email {
            Some(email) => email.to_string(),
            None => random_email(rng, &self.email_domain),
        };

        RegistrationData {
            full_name: self.full_name.clone(),
            phone: number.phone.clone(),
            email,
            birthdate: random_birthdate(rng, today),
            password: self.password.clone(),
            pin: self.pin.clone(),
            security_answer: self.security_answer.clone(),
            order_id: number.order_id.clone(),
        }
    }
}

/// A 15-character lowercase alphanumeric local part at `domain`.
pub fn random_email<R: Rng + ?Sized>(rng: &mut R, domain: &str) -> String {
    let local: String = (0..EMAIL_LOCAL_LEN)
        .map(|_| EMAIL_ALPHABET[rng.gen_range(0..EMAIL_ALPHABET.len())] as char)
        .collect();
    format!("{local}@{domain}")
}

/// Year uniform in `[today - 60, today - 20]`, month 1–12, day 1–28.
pub fn random_birthdate<R: Rng + ?Sized>(rng: &mut R, today: NaiveDate) -> NaiveDate {
    let year = rng.gen_range(today.year() - MAX_AGE_YEARS..=today.year() - MIN_AGE_YEARS);
    let month = rng.gen_range(1..=12);
    let day = rng.gen_range(1..=28);
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(today)
}

/// Loose sanity check for caller-supplied emails.
pub fn looks_like_email(email: &str) -> bool {
    email.contains('@') && email.contains('.')
}
