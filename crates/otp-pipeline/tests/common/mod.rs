//! Common test utilities for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use otp_pipeline::{
    AcquiredNumber, CanonicalPhone, GatewayError, NumberProvider, Orchestrator, PacingConfig,
    ProviderError, RegistrationData, RegistrationTarget, TargetConfig,
};
use record_store::{Lifecycle, Store, DEFAULT_EXPIRY};
use secrecy::SecretString;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Provider that replays queued responses.
///
/// An exhausted acquire queue reports `NO_NUMBERS`; an exhausted OTP queue
/// reports no OTP yet.
#[derive(Default)]
pub struct ScriptedProvider {
    numbers: Mutex<VecDeque<Result<AcquiredNumber, ProviderError>>>,
    otps: Mutex<HashMap<String, VecDeque<Result<String, ProviderError>>>>,
    fetches: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_number(self, order_id: &str, phone: &str) -> Self {
        let number = AcquiredNumber {
            order_id: order_id.to_string(),
            phone: otp_pipeline::normalize(phone).expect("test phone must be valid"),
        };
        self.numbers.lock().unwrap().push_back(Ok(number));
        self
    }

    pub fn with_acquire_error(self, error: ProviderError) -> Self {
        self.numbers.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn with_otps(self, order_id: &str, responses: Vec<Result<String, ProviderError>>) -> Self {
        self.otps
            .lock()
            .unwrap()
            .insert(order_id.to_string(), responses.into());
        self
    }

    pub fn fetches(&self) -> Vec<String> {
        self.fetches.lock().unwrap().clone()
    }
}

#[async_trait]
impl NumberProvider for ScriptedProvider {
    async fn acquire_number(&self) -> Result<AcquiredNumber, ProviderError> {
        self.numbers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::Upstream("NO_NUMBERS".into())))
    }

    async fn fetch_otp(&self, order_id: &str) -> Result<String, ProviderError> {
        self.fetches.lock().unwrap().push(order_id.to_string());
        self.otps
            .lock()
            .unwrap()
            .get_mut(order_id)
            .and_then(|queue| queue.pop_front())
            .unwrap_or(Err(ProviderError::NoOtpYet))
    }
}

/// Target that accepts everything unless a phone has queued failures.
#[derive(Default)]
pub struct ScriptedTarget {
    register_failures: Mutex<HashMap<String, String>>,
    login_results: Mutex<HashMap<String, VecDeque<Result<(), String>>>>,
    registered: Mutex<Vec<RegistrationData>>,
    logins: Mutex<Vec<String>>,
}

impl ScriptedTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting_registration(self, phone: &str, reason: &str) -> Self {
        self.register_failures
            .lock()
            .unwrap()
            .insert(phone.to_string(), reason.to_string());
        self
    }

    /// Queue login results for `phone`; `true` succeeds.
    pub fn with_logins(self, phone: &str, results: &[bool]) -> Self {
        let queue = results
            .iter()
            .map(|ok| if *ok { Ok(()) } else { Err("Success indicator not found".to_string()) })
            .collect();
        self.login_results
            .lock()
            .unwrap()
            .insert(phone.to_string(), queue);
        self
    }

    pub fn registered(&self) -> Vec<RegistrationData> {
        self.registered.lock().unwrap().clone()
    }

    pub fn logins(&self) -> Vec<String> {
        self.logins.lock().unwrap().clone()
    }
}

#[async_trait]
impl RegistrationTarget for ScriptedTarget {
    async fn register(&self, data: &RegistrationData) -> Result<(), GatewayError> {
        if let Some(reason) = self.register_failures.lock().unwrap().get(data.phone.as_str()) {
            return Err(GatewayError::new(reason.clone()));
        }
        self.registered.lock().unwrap().push(data.clone());
        Ok(())
    }

    async fn login(
        &self,
        phone: &CanonicalPhone,
        _password: &SecretString,
    ) -> Result<(), GatewayError> {
        self.logins.lock().unwrap().push(phone.to_string());
        self.login_results
            .lock()
            .unwrap()
            .get_mut(phone.as_str())
            .and_then(|queue| queue.pop_front())
            .unwrap_or(Ok(()))
            .map_err(GatewayError::new)
    }
}

/// Target configuration with a test password.
pub fn test_target() -> TargetConfig {
    TargetConfig {
        password: Some(SecretString::new("test-password".into())),
        email_domain: "mail.test".into(),
        ..TargetConfig::default()
    }
}

/// File-backed lifecycle at `path`.
pub async fn file_lifecycle(path: &Path) -> Lifecycle {
    let store = Store::open(path).await.unwrap();
    Lifecycle::new(store, DEFAULT_EXPIRY)
}

/// Orchestrator with zero delays over the given doubles.
pub fn test_orchestrator(
    provider: Arc<ScriptedProvider>,
    target: Arc<ScriptedTarget>,
    lifecycle: Lifecycle,
) -> Orchestrator {
    Orchestrator::new(provider, target, lifecycle)
        .with_pacing(PacingConfig::immediate())
        .with_target(test_target())
}
