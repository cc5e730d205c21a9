//! Work record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::time::Duration;

/// Lifecycle status of a work record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    /// Registered, number not yet used to log in
    Pending,
    /// Logged in, OTP requested and awaiting delivery
    Waiting,
    /// OTP retrieved
    Completed,
    /// Timed out waiting for the OTP
    Expired,
    /// Successful batch login marker
    Login,
    /// Reserved, never produced by a workflow
    Failed,
    /// Reserved, never produced by a workflow
    Success,
}

impl RecordStatus {
    /// Every status, in display order.
    pub const ALL: [RecordStatus; 7] = [
        RecordStatus::Pending,
        RecordStatus::Waiting,
        RecordStatus::Completed,
        RecordStatus::Login,
        RecordStatus::Success,
        RecordStatus::Failed,
        RecordStatus::Expired,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Pending => "pending",
            RecordStatus::Waiting => "waiting",
            RecordStatus::Completed => "completed",
            RecordStatus::Expired => "expired",
            RecordStatus::Login => "login",
            RecordStatus::Failed => "failed",
            RecordStatus::Success => "success",
        }
    }

    /// Whether no transition leaves this status.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RecordStatus::Pending | RecordStatus::Waiting)
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work tracked from registration to OTP retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkRecord {
    /// Unique within the store, derived from creation time in milliseconds
    pub id: u64,

    /// Creation instant, mirrors `created_at`
    pub timestamp: DateTime<Utc>,

    pub status: RecordStatus,

    /// Canonical local-format phone number
    pub phone: String,

    /// Provider order handle, empty for login markers
    ///
    /// Older files store the marker handle as the number `0`, which reads
    /// back as `"0"`.
    #[serde(default, deserialize_with = "order_id_from_any")]
    pub order_id: String,

    /// Annotation of the most recent transition
    #[serde(default)]
    pub details: String,

    /// Registration email, empty for login markers
    #[serde(default)]
    pub email: String,

    /// Unix milliseconds
    pub created_at: i64,

    /// Unix milliseconds of the last transition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawOrderId {
    Text(String),
    Number(serde_json::Number),
    Null(()),
}

fn order_id_from_any<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match RawOrderId::deserialize(deserializer)? {
        RawOrderId::Text(text) => text,
        RawOrderId::Number(number) => number.to_string(),
        RawOrderId::Null(()) => String::new(),
    })
}

impl WorkRecord {
    fn new(
        status: RecordStatus,
        phone: impl Into<String>,
        order_id: impl Into<String>,
        email: impl Into<String>,
        details: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let created_at = now.timestamp_millis();
        Self {
            id: created_at.max(0) as u64,
            timestamp: now,
            status,
            phone: phone.into(),
            order_id: order_id.into(),
            details: details.into(),
            email: email.into(),
            created_at,
            updated_at: Some(created_at),
        }
    }

    /// Create a record for a freshly registered account.
    pub fn pending(
        phone: impl Into<String>,
        order_id: impl Into<String>,
        email: impl Into<String>,
        details: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self::new(RecordStatus::Pending, phone, order_id, email, details, now)
    }

    /// Create a marker for a successful batch login.
    pub fn login(phone: impl Into<String>, details: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self::new(RecordStatus::Login, phone, "", "", details, now)
    }

    /// Last modification time, falling back to creation time.
    pub fn last_updated(&self) -> i64 {
        self.updated_at.unwrap_or(self.created_at)
    }

    /// Milliseconds elapsed since creation.
    pub fn age_millis(&self, now: DateTime<Utc>) -> i64 {
        now.timestamp_millis() - self.created_at
    }

    /// Whether a waiting record has outlived `expiry`.
    pub fn is_overdue(&self, now: DateTime<Utc>, expiry: Duration) -> bool {
        let limit = i64::try_from(expiry.as_millis()).unwrap_or(i64::MAX);
        self.status == RecordStatus::Waiting && self.age_millis(now) > limit
    }
}

/// Merge-update applied to a stored record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPatch {
    pub status: Option<RecordStatus>,
    pub details: Option<String>,
}

impl RecordPatch {
    pub fn status(status: RecordStatus, details: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            details: Some(details.into()),
        }
    }

    /// Apply the patch, stamping `updated_at`. Fields not named are preserved.
    pub fn apply(&self, record: &mut WorkRecord, now: DateTime<Utc>) {
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(details) = &self.details {
            record.details = details.clone();
        }
        record.updated_at = Some(now.timestamp_millis());
    }
}

/// Per-status record counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub total: usize,
    pub pending: usize,
    pub waiting: usize,
    pub completed: usize,
    pub expired: usize,
    pub login: usize,
    pub failed: usize,
    pub success: usize,
}

impl StatusCounts {
    pub fn from_records(records: &[WorkRecord]) -> Self {
        let mut counts = Self {
            total: records.len(),
            ..Self::default()
        };
        for record in records {
            *counts.slot(record.status) += 1;
        }
        counts
    }

    pub fn get(&self, status: RecordStatus) -> usize {
        match status {
            RecordStatus::Pending => self.pending,
            RecordStatus::Waiting => self.waiting,
            RecordStatus::Completed => self.completed,
            RecordStatus::Expired => self.expired,
            RecordStatus::Login => self.login,
            RecordStatus::Failed => self.failed,
            RecordStatus::Success => self.success,
        }
    }

    fn slot(&mut self, status: RecordStatus) -> &mut usize {
        match status {
            RecordStatus::Pending => &mut self.pending,
            RecordStatus::Waiting => &mut self.waiting,
            RecordStatus::Completed => &mut self.completed,
            RecordStatus::Expired => &mut self.expired,
            RecordStatus::Login => &mut self.login,
            RecordStatus::Failed => &mut self.failed,
            RecordStatus::Success => &mut self.success,
        }
    }
}
