use super::{pause, BatchLoginReport, Orchestrator};
use crate::aggregator::{LoginOutcome, ResultAggregator};
use crate::error::{PipelineError, PipelineResult};
use crate::phone::{normalize, parse_phone_list, CanonicalPhone};
use secrecy::SecretString;
use std::collections::HashSet;
use tracing::{info, instrument, warn};

const PROGRESS_EVERY: usize = 25;

impl Orchestrator {
    /// Log in with every phone, then retry the failures.
    ///
    /// Round 1 covers all valid phones. Each retry round covers the phones
    /// still without a success and is preceded by the configured pause.
    /// Every success appends a `login` record.
    #[instrument(skip(self, phones, password), fields(count = phones.len()))]
    pub async fn batch_login(
        &self,
        phones: &[String],
        password: Option<&SecretString>,
    ) -> PipelineResult<BatchLoginReport> {
        let mut seen = HashSet::new();
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        for raw in phones {
            match normalize(raw) {
                Some(phone) => {
                    if seen.insert(phone.clone()) {
                        accepted.push(phone);
                    }
                }
                None => rejected.push(raw.clone()),
            }
        }
        self.run_batch_login(accepted, rejected, password).await
    }

    /// [`Orchestrator::batch_login`] over free-form pasted text.
    pub async fn batch_login_text(
        &self,
        text: &str,
        password: Option<&SecretString>,
    ) -> PipelineResult<BatchLoginReport> {
        let list = parse_phone_list(text);
        self.run_batch_login(list.accepted, list.rejected, password).await
    }

    async fn run_batch_login(
        &self,
        accepted: Vec<CanonicalPhone>,
        rejected: Vec<String>,
        password: Option<&SecretString>,
    ) -> PipelineResult<BatchLoginReport> {
        if accepted.is_empty() {
            return Err(PipelineError::Validation(
                "No valid phone numbers to log in".to_string(),
            ));
        }
        let password = self.resolve_password(password)?;

        if !rejected.is_empty() {
            warn!(rejected = rejected.len(), "Skipping invalid phone numbers");
        }
        info!(count = accepted.len(), "Starting batch login");

        let mut aggregator = ResultAggregator::new(accepted.iter().map(|p| p.as_str()));
        let mut cohort = accepted;
        let mut round = 1;

        loop {
            let outcomes = self.login_round(round, &cohort, &password).await?;
            aggregator.record_round(round, outcomes);

            let failed: HashSet<String> = aggregator.failed_phones().into_iter().collect();
            cohort.retain(|p| failed.contains(p.as_str()));

            if cohort.is_empty() || round > self.pacing.login_retry_rounds {
                break;
            }

            round += 1;
            info!(round, remaining = cohort.len(), "Retrying failed logins");
            pause(self.pacing.login_retry_pause).await;
        }

        let summary = aggregator.summary();
        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            success_rate = summary.success_rate,
            "Batch login finished"
        );

        let exports = match &self.export_dir {
            Some(dir) => match aggregator.export(dir).await {
                Ok(exports) => Some(exports),
                Err(e) => {
                    warn!(error = %e, dir = %dir.display(), "Failed to export login cohorts");
                    None
                }
            },
            None => None,
        };

        Ok(BatchLoginReport {
            summary,
            verdicts: aggregator.verdicts(),
            rejected,
            exports,
        })
    }

    async fn login_round(
        &self,
        round: u32,
        cohort: &[CanonicalPhone],
        password: &SecretString,
    ) -> PipelineResult<Vec<LoginOutcome>> {
        let total = cohort.len();
        let mut outcomes = Vec::with_capacity(total);

        for (index, phone) in cohort.iter().enumerate() {
            let item = index + 1;

            match self.target.login(phone, password).await {
                Ok(()) => {
                    let details = if round == 1 {
                        "Batch login succeeded".to_string()
                    } else {
                        format!("Batch login succeeded on retry round {}", round - 1)
                    };
                    self.lifecycle.record_login(phone.as_str(), &details).await?;
                    info!(round, item, phone = %phone, "Login succeeded");
                    outcomes.push(LoginOutcome::success(phone.as_str(), round, details));
                }
                Err(e) => {
                    warn!(round, item, phone = %phone, error = %e, "Login failed");
                    outcomes.push(LoginOutcome::failure(phone.as_str(), round, e.reason));
                }
            }

            if item % PROGRESS_EVERY == 0 {
                info!(round, done = item, total, "Batch login progress");
            }
            if item < total {
                pause(self.pacing.login_item_delay).await;
            }
        }

        Ok(outcomes)
    }
}
