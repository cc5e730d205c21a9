use super::{pause, Orchestrator, PassSummary, MAX_BATCH};
use crate::error::{PipelineError, PipelineResult};
use crate::gateway::AcquiredNumber;
use crate::signup::{looks_like_email, SignupProfile};
use chrono::Utc;
use record_store::WorkRecord;
use tracing::{info, instrument, warn};

impl Orchestrator {
    /// Register `count` accounts on freshly rented numbers.
    ///
    /// Each success leaves one `pending` record. Failed items leave nothing.
    #[instrument(skip(self))]
    pub async fn create(&self, count: usize) -> PipelineResult<PassSummary> {
        validate_count(count)?;
        self.create_accounts(count, None).await
    }

    /// Like [`Orchestrator::create`], using one supplied email per account.
    #[instrument(skip(self, emails))]
    pub async fn create_with_emails(
        &self,
        count: usize,
        emails: &[String],
    ) -> PipelineResult<PassSummary> {
        validate_count(count)?;
        if emails.len() != count {
            return Err(PipelineError::Validation(format!(
                "Expected {count} emails, got {}",
                emails.len()
            )));
        }
        if let Some(bad) = emails.iter().find(|e| !looks_like_email(e)) {
            return Err(PipelineError::Validation(format!("Invalid email: {bad:?}")));
        }
        self.create_accounts(count, Some(emails)).await
    }

    async fn create_accounts(
        &self,
        count: usize,
        emails: Option<&[String]>,
    ) -> PipelineResult<PassSummary> {
        let profile = SignupProfile::from_target(&self.target_config)?;
        let mut summary = PassSummary::default();

        info!(count, "Creating accounts");
        for index in 0..count {
            let item = index + 1;
            let email = emails.map(|e| e[index].as_str());

            let outcome = match self.provider.acquire_number().await {
                Ok(number) => self
                    .register_number(&profile, &number, item, count, email)
                    .await
                    .map_err(|e| (Some(number.phone.to_string()), e)),
                Err(e) => Err((None, PipelineError::from(e))),
            };

            match outcome {
                Ok(record) => {
                    info!(
                        item,
                        phone = %record.phone,
                        order_id = %record.order_id,
                        "Account registered"
                    );
                    summary.record_success();
                }
                Err((phone, e)) if e.is_item_level() => {
                    warn!(item, phone = ?phone, error = %e, "Account creation failed");
                    summary.record_failure(item, phone, e.to_string());
                }
                Err((_, e)) => return Err(e),
            }

            if item < count {
                pause(self.pacing.create_delay).await;
            }
        }

        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Account creation finished"
        );
        Ok(summary)
    }

    async fn register_number(
        &self,
        profile: &SignupProfile,
        number: &AcquiredNumber,
        item: usize,
        count: usize,
        email: Option<&str>,
    ) -> PipelineResult<WorkRecord> {
        let data = {
            let mut rng = rand::thread_rng();
            profile.registration_data(number, email, &mut rng, Utc::now().date_naive())
        };

        self.target
            .register(&data)
            .await
            .map_err(|e| PipelineError::Registration(e.reason))?;

        let record = self
            .lifecycle
            .register(
                data.phone.as_str(),
                &data.order_id,
                &data.email,
                format!("account {item}/{count} registered"),
            )
            .await?;
        Ok(record)
    }
}

fn validate_count(count: usize) -> PipelineResult<()> {
    if (1..=MAX_BATCH).contains(&count) {
        Ok(())
    } else {
        Err(PipelineError::Validation(format!(
            "Count must be between 1 and {MAX_BATCH}, got {count}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{GatewayError, ProviderError};
    use crate::gateway::{MockNumberProvider, MockRegistrationTarget};
    use crate::orchestrator::tests::{number, orchestrator};
    use mockall::Sequence;
    use record_store::RecordStatus;

    #[tokio::test]
    async fn test_create_rejects_out_of_range_counts() {
        let orch = orchestrator(MockNumberProvider::new(), MockRegistrationTarget::new());

        for count in [0, 51] {
            let err = orch.create(count).await.unwrap_err();
            assert!(matches!(err, PipelineError::Validation(_)), "{count}");
        }
        assert!(orch.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_skips_provider_failures() {
        let mut seq = Sequence::new();
        let mut provider = MockNumberProvider::new();
        provider
            .expect_acquire_number()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Err(ProviderError::Upstream("NO_NUMBERS".into())));
        provider
            .expect_acquire_number()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(number("o2", "081122334455")));
        provider
            .expect_acquire_number()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Err(ProviderError::Transport("connection reset".into())));

        let mut target = MockRegistrationTarget::new();
        target.expect_register().times(1).returning(|_| Ok(()));

        let orch = orchestrator(provider, target);
        let summary = orch.create(3).await.unwrap();

        assert_eq!(summary.attempted, 3);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.failures[0].item, 1);
        assert_eq!(summary.failures[1].item, 3);
        assert!(summary.failures[0].phone.is_none());

        let records = orch.list().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, RecordStatus::Pending);
        assert_eq!(records[0].details, "account 2/3 registered");
        assert_eq!(records[0].order_id, "o2");
    }

    #[tokio::test]
    async fn test_failed_registration_leaves_no_record() {
        let mut provider = MockNumberProvider::new();
        provider
            .expect_acquire_number()
            .returning(|| Ok(number("o1", "081122334455")));
        let mut target = MockRegistrationTarget::new();
        target
            .expect_register()
            .returning(|_| Err(GatewayError::new("Success indicator not found")));

        let orch = orchestrator(provider, target);
        let summary = orch.create(2).await.unwrap();

        assert_eq!(summary.failed, 2);
        assert_eq!(summary.failures[0].phone.as_deref(), Some("081122334455"));
        assert!(summary.failures[0].reason.contains("Success indicator not found"));
        assert!(orch.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_with_emails_uses_supplied_addresses() {
        let mut provider = MockNumberProvider::new();
        let mut seq = 0;
        provider.expect_acquire_number().times(2).returning(move || {
            seq += 1;
            Ok(number(&format!("o{seq}"), &format!("08120000000{seq}")))
        });
        let mut target = MockRegistrationTarget::new();
        target
            .expect_register()
            .withf(|data| data.email.ends_with("@mail.test"))
            .times(2)
            .returning(|_| Ok(()));

        let orch = orchestrator(provider, target);
        let emails = vec!["one@mail.test".to_string(), "two@mail.test".to_string()];
        let summary = orch.create_with_emails(2, &emails).await.unwrap();

        assert_eq!(summary.succeeded, 2);
        let records = orch.list().await.unwrap();
        let stored: Vec<&str> = records.iter().map(|r| r.email.as_str()).collect();
        assert_eq!(stored, vec!["one@mail.test", "two@mail.test"]);
    }

    #[tokio::test]
    async fn test_create_with_emails_validates_count_and_shape() {
        let orch = orchestrator(MockNumberProvider::new(), MockRegistrationTarget::new());

        let err = orch
            .create_with_emails(2, &["a@b.c".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));

        let err = orch
            .create_with_emails(1, &["nope".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
    }

    #[test]
    fn test_validate_count_bounds() {
        assert!(validate_count(1).is_ok());
        assert!(validate_count(MAX_BATCH).is_ok());
        assert!(validate_count(0).is_err());
        assert!(validate_count(MAX_BATCH + 1).is_err());
    }
}
