use super::{
    pause, ItemFailure, Orchestrator, OtpCheckSummary, OtpRetrySummary, PassSummary, ReceivedOtp,
};
use crate::error::{PipelineError, PipelineResult, ProviderError};
use crate::gateway::extract_otp;
use crate::phone::normalize_or_err;
use record_store::{Transition, WorkRecord};
use secrecy::SecretString;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// How a single OTP fetch ended.
enum Fetch {
    Received(String),
    NotYet,
}

impl Orchestrator {
    /// Log in with every `pending` record so the target sends its OTP.
    ///
    /// Successes move to `waiting`; failures stay `pending`.
    #[instrument(skip(self))]
    pub async fn send_otp(&self) -> PipelineResult<PassSummary> {
        let password = self.resolve_password(None)?;
        let pending = self.lifecycle.pending().await?;
        let total = pending.len();
        let mut summary = PassSummary::default();

        info!(count = total, "Sending OTPs for pending records");
        for (index, record) in pending.iter().enumerate() {
            let item = index + 1;

            match self.send_one(record, &password).await {
                Ok(()) => {
                    info!(item, phone = %record.phone, "OTP requested");
                    summary.record_success();
                }
                Err(e) if e.is_item_level() => {
                    warn!(item, phone = %record.phone, error = %e, "OTP request failed");
                    summary.record_failure(item, Some(record.phone.clone()), e.to_string());
                }
                Err(e) => return Err(e),
            }

            if item < total {
                pause(self.pacing.send_otp_delay).await;
            }
        }

        Ok(summary)
    }

    async fn send_one(
        &self,
        record: &WorkRecord,
        password: &SecretString,
    ) -> PipelineResult<()> {
        let phone = normalize_or_err(&record.phone)?;
        self.target
            .login(&phone, password)
            .await
            .map_err(|e| PipelineError::Login(e.reason))?;
        self.lifecycle
            .transition(
                record.id,
                Transition::LoginSucceeded,
                "OTP sent, waiting for code",
            )
            .await?;
        Ok(())
    }

    /// Fetch the OTP of every `waiting` record once.
    #[instrument(skip(self))]
    pub async fn check_otp(&self) -> PipelineResult<OtpCheckSummary> {
        self.check_round(self.pacing.check_otp_delay).await
    }

    /// Repeat [`Orchestrator::check_otp`] for the configured number of
    /// rounds, stopping as soon as nothing is left waiting.
    #[instrument(skip(self))]
    pub async fn check_otp_retry(&self) -> PipelineResult<OtpRetrySummary> {
        let rounds = self.pacing.otp_rounds;
        let mut summary = OtpRetrySummary::default();

        for round in 1..=rounds {
            let pass = self.check_round(self.pacing.retry_item_delay).await?;
            info!(round, found = pass.received.len(), "OTP check round finished");
            summary.found_per_round.push(pass.received.len());
            summary.completed.extend(pass.received);

            if self.lifecycle.waiting().await?.is_empty() {
                break;
            }
            if round < rounds {
                pause(self.pacing.otp_round_interval).await;
            }
        }

        summary.still_waiting = self.lifecycle.waiting().await?.len();
        info!(
            completed = summary.completed.len(),
            still_waiting = summary.still_waiting,
            "OTP polling finished"
        );
        Ok(summary)
    }

    async fn check_round(&self, delay: Duration) -> PipelineResult<OtpCheckSummary> {
        let waiting = self.lifecycle.waiting().await?;
        let total = waiting.len();
        let mut summary = OtpCheckSummary::default();

        for (index, record) in waiting.iter().enumerate() {
            let item = index + 1;
            summary.checked += 1;

            match self.check_one(record).await {
                Ok(Fetch::Received(otp)) => {
                    info!(item, phone = %record.phone, "OTP received");
                    summary.received.push(ReceivedOtp {
                        id: record.id,
                        phone: record.phone.clone(),
                        otp,
                    });
                }
                Ok(Fetch::NotYet) => {
                    debug!(item, order_id = %record.order_id, "No OTP yet");
                    summary.no_otp_yet += 1;
                }
                Err(e) if e.is_item_level() => {
                    warn!(
                        item,
                        phone = %record.phone,
                        order_id = %record.order_id,
                        error = %e,
                        "OTP check failed"
                    );
                    summary.failures.push(ItemFailure {
                        item,
                        phone: Some(record.phone.clone()),
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }

            if item < total {
                pause(delay).await;
            }
        }

        Ok(summary)
    }

    async fn check_one(&self, record: &WorkRecord) -> PipelineResult<Fetch> {
        let text = match self.provider.fetch_otp(&record.order_id).await {
            Ok(text) => text,
            Err(ProviderError::NoOtpYet) => return Ok(Fetch::NotYet),
            Err(e) => return Err(e.into()),
        };

        let otp = extract_otp(&text).ok_or_else(|| {
            PipelineError::Provider(ProviderError::Upstream(format!(
                "No code in provider response: {text:?}"
            )))
        })?;

        self.lifecycle
            .transition(
                record.id,
                Transition::OtpReceived,
                format!("OTP received: {otp}"),
            )
            .await?;
        Ok(Fetch::Received(otp))
    }
}
