//! Per-phone reconciliation of multi-round batch login results.

use crate::error::PipelineResult;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const NOT_ATTEMPTED: &str = "not attempted";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeStatus {
    Success,
    Failed,
}

/// Result of one login attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginOutcome {
    pub phone: String,
    /// 1 for the first pass, 2.. for retries
    pub round: u32,
    pub status: OutcomeStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl LoginOutcome {
    pub fn success(phone: impl Into<String>, round: u32, message: impl Into<String>) -> Self {
        Self {
            phone: phone.into(),
            round,
            status: OutcomeStatus::Success,
            message: message.into(),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(phone: impl Into<String>, round: u32, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            phone: phone.into(),
            round,
            status: OutcomeStatus::Failed,
            message: format!("Login failed: {error}"),
            error: Some(error),
            timestamp: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

/// Counts for a single round.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoundSummary {
    pub round: u32,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Aggregate view over all rounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Integer-rounded percentage of `total`
    pub success_rate: u32,
    pub failure_rate: u32,
    /// Rounds run after the first pass
    pub retry_rounds: u32,
    pub rounds: Vec<RoundSummary>,
    /// Successes that only came in a retry round
    pub recovered_by_retry: usize,
}

/// Final verdicts split into the two cohorts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cohorts {
    pub succeeded: Vec<LoginOutcome>,
    pub failed: Vec<LoginOutcome>,
}

/// Paths of the written cohort snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CohortExports {
    pub success_path: PathBuf,
    pub failed_path: PathBuf,
}

#[derive(Serialize)]
struct CohortFile<'a> {
    timestamp: DateTime<Utc>,
    total: usize,
    results: &'a [LoginOutcome],
}

/// Tracks the latest verdict per phone across rounds.
///
/// A success is final. A failure replaces an earlier failure, so the
/// reported error is always the most recent one.
#[derive(Debug, Clone, Default)]
pub struct ResultAggregator {
    phones: Vec<String>,
    members: HashSet<String>,
    verdicts: HashMap<String, LoginOutcome>,
    rounds: Vec<RoundSummary>,
}

impl ResultAggregator {
    /// Start tracking `phones`. Duplicates keep their first position.
    pub fn new<I, S>(phones: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut members = HashSet::new();
        let phones = phones
            .into_iter()
            .map(Into::into)
            .filter(|p: &String| members.insert(p.clone()))
            .collect();

        Self {
            phones,
            members,
            ..Self::default()
        }
    }

    pub fn phones(&self) -> &[String] {
        &self.phones
    }

    /// Merge the outcomes of one round.
    pub fn record_round(&mut self, round: u32, outcomes: Vec<LoginOutcome>) {
        let mut summary = RoundSummary {
            round,
            ..RoundSummary::default()
        };

        for outcome in outcomes {
            if !self.members.contains(&outcome.phone) {
                warn!(
                    phone = %outcome.phone,
                    round,
                    "Ignoring outcome for phone outside the batch"
                );
                continue;
            }

            summary.attempted += 1;
            if outcome.is_success() {
                summary.succeeded += 1;
            } else {
                summary.failed += 1;
            }

            let keep_previous = self
                .verdicts
                .get(&outcome.phone)
                .is_some_and(|v| v.is_success());
            if !keep_previous {
                self.verdicts.insert(outcome.phone.clone(), outcome);
            }
        }

        debug!(
            round,
            attempted = summary.attempted,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Recorded login round"
        );
        self.rounds.push(summary);
    }

    /// Phones without a success yet, in input order.
    pub fn failed_phones(&self) -> Vec<String> {
        self.phones
            .iter()
            .filter(|p| !self.verdicts.get(*p).is_some_and(|v| v.is_success()))
            .cloned()
            .collect()
    }

    /// One verdict per input phone, in input order.
    ///
    /// Phones never attempted count as failed with `not attempted`.
    pub fn verdicts(&self) -> Vec<LoginOutcome> {
        self.phones
            .iter()
            .map(|phone| {
                self.verdicts
                    .get(phone)
                    .cloned()
                    .unwrap_or_else(|| LoginOutcome::failure(phone.clone(), 0, NOT_ATTEMPTED))
            })
            .collect()
    }

    pub fn partition(&self) -> Cohorts {
        let (succeeded, failed) = self.verdicts().into_iter().partition(|v| v.is_success());
        Cohorts { succeeded, failed }
    }

    pub fn summary(&self) -> BatchSummary {
        let verdicts = self.verdicts();
        let total = verdicts.len();
        let succeeded = verdicts.iter().filter(|v| v.is_success()).count();
        let failed = total - succeeded;
        let recovered_by_retry = verdicts
            .iter()
            .filter(|v| v.is_success() && v.round > 1)
            .count();
        let retry_rounds = self.rounds.iter().filter(|r| r.round > 1).count() as u32;

        BatchSummary {
            total,
            succeeded,
            failed,
            success_rate: percentage(succeeded, total),
            failure_rate: percentage(failed, total),
            retry_rounds,
            rounds: self.rounds.clone(),
            recovered_by_retry,
        }
    }

    /// Write `login_success_<ts>.json` and `login_failed_<ts>.json` into
    /// `dir`. Both files are written even when a cohort is empty.
    pub async fn export(&self, dir: &Path) -> PipelineResult<CohortExports> {
        self.export_at(dir, Utc::now()).await
    }

    pub async fn export_at(&self, dir: &Path, now: DateTime<Utc>) -> PipelineResult<CohortExports> {
        tokio::fs::create_dir_all(dir).await?;

        let stamp = file_stamp(now);
        let cohorts = self.partition();
        let exports = CohortExports {
            success_path: dir.join(format!("login_success_{stamp}.json")),
            failed_path: dir.join(format!("login_failed_{stamp}.json")),
        };

        write_cohort(&exports.success_path, now, &cohorts.succeeded).await?;
        write_cohort(&exports.failed_path, now, &cohorts.failed).await?;

        info!(
            succeeded = cohorts.succeeded.len(),
            failed = cohorts.failed.len(),
            success_path = %exports.success_path.display(),
            failed_path = %exports.failed_path.display(),
            "Exported login cohorts"
        );
        Ok(exports)
    }
}

async fn write_cohort(
    path: &Path,
    now: DateTime<Utc>,
    results: &[LoginOutcome],
) -> PipelineResult<()> {
    let file = CohortFile {
        timestamp: now,
        total: results.len(),
        results,
    };
    let json = serde_json::to_vec_pretty(&file)?;
    tokio::fs::write(path, json).await?;
    Ok(())
}

fn percentage(count: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    ((count as f64 * 100.0) / total as f64).round() as u32
}

/// RFC 3339 with `:` and `.` replaced, safe for file names.
fn file_stamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-")
}
