//! Sequential batch workflows over the gateways and the record lifecycle.
//!
//! Every workflow processes its items one at a time with a fixed pause
//! between them. A failing item is logged and counted; only precondition
//! and storage failures end a workflow early.

mod create;
mod login;
mod otp;

use crate::aggregator::{BatchSummary, CohortExports, LoginOutcome};
use crate::config::{PacingConfig, TargetConfig};
use crate::error::{PipelineError, PipelineResult};
use crate::gateway::{NumberProvider, RegistrationTarget};
use record_store::{Lifecycle, StatusCounts, WorkRecord};
use secrecy::SecretString;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

/// Largest batch accepted by the create workflows.
pub const MAX_BATCH: usize = 50;

/// Records shown by [`Orchestrator::status`].
const RECENT_LIMIT: usize = 5;

/// A single failed item of a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    /// 1-based position in the pass
    pub item: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub reason: String,
}

/// Outcome counts of a create or send-otp pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub failures: Vec<ItemFailure>,
}

impl PassSummary {
    fn record_success(&mut self) {
        self.attempted += 1;
        self.succeeded += 1;
    }

    fn record_failure(&mut self, item: usize, phone: Option<String>, reason: String) {
        self.attempted += 1;
        self.failed += 1;
        self.failures.push(ItemFailure {
            item,
            phone,
            reason,
        });
    }
}

/// An OTP retrieved for a waiting record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceivedOtp {
    pub id: u64,
    pub phone: String,
    pub otp: String,
}

/// Outcome of one check-otp pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OtpCheckSummary {
    pub checked: usize,
    pub received: Vec<ReceivedOtp>,
    /// Records the provider had no code for yet
    pub no_otp_yet: usize,
    pub failures: Vec<ItemFailure>,
}

/// Outcome of the multi-round OTP poll.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OtpRetrySummary {
    /// OTPs found in each round that ran
    pub found_per_round: Vec<usize>,
    pub completed: Vec<ReceivedOtp>,
    pub still_waiting: usize,
}

impl OtpRetrySummary {
    pub fn rounds(&self) -> usize {
        self.found_per_round.len()
    }
}

/// Result of a batch login run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchLoginReport {
    pub summary: BatchSummary,
    /// Final verdict per accepted phone, in input order
    pub verdicts: Vec<LoginOutcome>,
    /// Input tokens that did not normalize
    pub rejected: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exports: Option<CohortExports>,
}

/// The three stages of an auto-complete run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AutoCompleteReport {
    pub created: PassSummary,
    pub sent: PassSummary,
    pub otp: OtpRetrySummary,
}

/// Per-status counts and the newest records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub counts: StatusCounts,
    pub recent: Vec<WorkRecord>,
}

/// Drives the batch workflows.
pub struct Orchestrator {
    provider: Arc<dyn NumberProvider>,
    target: Arc<dyn RegistrationTarget>,
    lifecycle: Lifecycle,
    pacing: PacingConfig,
    target_config: TargetConfig,
    /// Where batch-login cohorts are written; `None` skips the export
    export_dir: Option<PathBuf>,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn NumberProvider>,
        target: Arc<dyn RegistrationTarget>,
        lifecycle: Lifecycle,
    ) -> Self {
        Self {
            provider,
            target,
            lifecycle,
            pacing: PacingConfig::default(),
            target_config: TargetConfig::default(),
            export_dir: None,
        }
    }

    pub fn with_pacing(mut self, pacing: PacingConfig) -> Self {
        self.pacing = pacing;
        self
    }

    /// Set the signup profile and default login password.
    pub fn with_target(mut self, target_config: TargetConfig) -> Self {
        self.target_config = target_config;
        self
    }

    pub fn with_export_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.export_dir = Some(dir.into());
        self
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn pacing(&self) -> &PacingConfig {
        &self.pacing
    }

    /// Create `count` accounts, wait, trigger their OTPs, wait, then poll.
    #[instrument(skip(self, emails))]
    pub async fn auto_complete(
        &self,
        count: usize,
        emails: Option<&[String]>,
    ) -> PipelineResult<AutoCompleteReport> {
        let created = match emails {
            Some(emails) => self.create_with_emails(count, emails).await?,
            None => self.create(count).await?,
        };

        info!(wait = ?self.pacing.after_create_wait, "Waiting before sending OTPs");
        pause(self.pacing.after_create_wait).await;
        let sent = self.send_otp().await?;

        info!(wait = ?self.pacing.after_send_wait, "Waiting before polling OTPs");
        pause(self.pacing.after_send_wait).await;
        let otp = self.check_otp_retry().await?;

        Ok(AutoCompleteReport { created, sent, otp })
    }

    pub async fn status(&self) -> PipelineResult<StatusReport> {
        let counts = self.lifecycle.status_counts().await?;
        let recent = self.lifecycle.recent(RECENT_LIMIT).await?;
        Ok(StatusReport { counts, recent })
    }

    /// All records, oldest first.
    pub async fn list(&self) -> PipelineResult<Vec<WorkRecord>> {
        Ok(self.lifecycle.list().await?)
    }

    /// Archive and reset the store. Returns the backup file, if any.
    pub async fn clear(&self) -> PipelineResult<Option<PathBuf>> {
        let backup = self.lifecycle.clear().await?;
        info!(backup = ?backup, "Cleared record store");
        Ok(backup)
    }

    /// The explicit password, else the configured one.
    fn resolve_password(&self, password: Option<&SecretString>) -> PipelineResult<SecretString> {
        password
            .or(self.target_config.password.as_ref())
            .cloned()
            .ok_or_else(|| PipelineError::Validation("No login password configured".to_string()))
    }
}

async fn pause(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::gateway::{AcquiredNumber, MockNumberProvider, MockRegistrationTarget};
    use crate::phone::normalize;
    use record_store::{RecordStatus, Store, DEFAULT_EXPIRY};
    use secrecy::ExposeSecret;

    pub(super) fn number(order: &str, phone: &str) -> AcquiredNumber {
        AcquiredNumber {
            order_id: order.to_string(),
            phone: normalize(phone).unwrap(),
        }
    }

    pub(super) fn target_config() -> TargetConfig {
        TargetConfig {
            password: Some(SecretString::new("pw".into())),
            ..TargetConfig::default()
        }
    }

    pub(super) fn orchestrator(
        provider: MockNumberProvider,
        target: MockRegistrationTarget,
    ) -> Orchestrator {
        Orchestrator::new(
            Arc::new(provider),
            Arc::new(target),
            Lifecycle::new(Store::memory(), DEFAULT_EXPIRY),
        )
        .with_pacing(PacingConfig::immediate())
        .with_target(target_config())
    }

    #[tokio::test]
    async fn test_auto_complete_runs_all_stages() {
        let mut provider = MockNumberProvider::new();
        provider
            .expect_acquire_number()
            .times(1)
            .returning(|| Ok(number("o1", "081122334455")));
        provider
            .expect_fetch_otp()
            .withf(|order| order == "o1")
            .returning(|_| Ok("Your code is 123456".into()));

        let mut target = MockRegistrationTarget::new();
        target.expect_register().times(1).returning(|_| Ok(()));
        target.expect_login().times(1).returning(|_, _| Ok(()));

        let orch = orchestrator(provider, target);
        let report = orch.auto_complete(1, None).await.unwrap();

        assert_eq!(report.created.succeeded, 1);
        assert_eq!(report.sent.succeeded, 1);
        assert_eq!(report.otp.completed.len(), 1);
        assert_eq!(report.otp.completed[0].otp, "123456");
        assert_eq!(report.otp.still_waiting, 0);

        let records = orch.list().await.unwrap();
        assert_eq!(records[0].status, RecordStatus::Completed);
        assert_eq!(records[0].details, "OTP received: 123456");
    }

    #[tokio::test]
    async fn test_auto_complete_rejects_bad_count_before_any_call() {
        let orch = orchestrator(MockNumberProvider::new(), MockRegistrationTarget::new());
        let err = orch.auto_complete(0, None).await.unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
    }

    #[tokio::test]
    async fn test_status_reports_counts_and_recent() {
        let mut provider = MockNumberProvider::new();
        let mut seq = 0;
        provider.expect_acquire_number().times(7).returning(move || {
            seq += 1;
            Ok(number(&format!("o{seq}"), &format!("08110000000{seq}")))
        });
        let mut target = MockRegistrationTarget::new();
        target.expect_register().times(7).returning(|_| Ok(()));

        let orch = orchestrator(provider, target);
        orch.create(7).await.unwrap();

        let status = orch.status().await.unwrap();
        assert_eq!(status.counts.total, 7);
        assert_eq!(status.counts.pending, 7);
        assert_eq!(status.recent.len(), 5);
        assert_eq!(status.recent[0].phone, "081100000007");
    }

    #[tokio::test]
    async fn test_clear_empties_store() {
        let mut provider = MockNumberProvider::new();
        provider
            .expect_acquire_number()
            .returning(|| Ok(number("o1", "081122334455")));
        let mut target = MockRegistrationTarget::new();
        target.expect_register().returning(|_| Ok(()));

        let orch = orchestrator(provider, target);
        orch.create(1).await.unwrap();
        assert_eq!(orch.clear().await.unwrap(), None);
        assert!(orch.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_password_resolution() {
        let orch = orchestrator(MockNumberProvider::new(), MockRegistrationTarget::new());
        let explicit = SecretString::new("explicit".into());
        assert_eq!(
            orch.resolve_password(Some(&explicit)).unwrap().expose_secret(),
            "explicit"
        );
        assert_eq!(orch.resolve_password(None).unwrap().expose_secret(), "pw");

        let bare = Orchestrator::new(
            Arc::new(MockNumberProvider::new()),
            Arc::new(MockRegistrationTarget::new()),
            Lifecycle::new(Store::memory(), DEFAULT_EXPIRY),
        );
        assert!(matches!(
            bare.resolve_password(None),
            Err(PipelineError::Validation(_))
        ));
    }

    #[test]
    fn test_provider_errors_are_item_level() {
        assert!(PipelineError::from(ProviderError::Transport("reset".into())).is_item_level());
    }
}
