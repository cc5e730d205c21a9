//! Record state machine and the engine that drives it over a [`Store`].

use crate::error::{LifecycleError, StoreError};
use crate::store::Store;
use crate::types::{RecordPatch, RecordStatus, StatusCounts, WorkRecord};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Default time a record may stay `waiting` before it expires.
pub const DEFAULT_EXPIRY: Duration = Duration::from_secs(10 * 60);

/// Events that move a record between statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Login performed and OTP send triggered
    LoginSucceeded,
    /// OTP fetched from the provider
    OtpReceived,
    /// Expiry deadline passed while waiting
    Expire,
}

impl RecordStatus {
    /// Status reached by applying `transition`, if the edge exists.
    ///
    /// `failed` and `success` are reserved and have no incoming edges.
    pub fn next(self, transition: Transition) -> Result<RecordStatus, LifecycleError> {
        use RecordStatus::*;

        match (self, transition) {
            (Pending, Transition::LoginSucceeded) => Ok(Waiting),
            (Waiting, Transition::OtpReceived) => Ok(Completed),
            (Waiting, Transition::Expire) => Ok(Expired),
            (Pending | Waiting | Completed | Expired | Login | Failed | Success, _) => {
                Err(LifecycleError::InvalidTransition {
                    from: self,
                    transition,
                })
            }
        }
    }
}

/// Lifecycle engine over a record store.
///
/// Every read-for-processing first sweeps overdue `waiting` records into
/// `expired`; there is no background timer.
pub struct Lifecycle {
    store: Store,
    expiry: Duration,
}

impl Lifecycle {
    pub fn new(store: Store, expiry: Duration) -> Self {
        Self { store, expiry }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    /// Expire every overdue `waiting` record. Returns how many changed.
    pub async fn sweep_expired(&self) -> Result<usize, StoreError> {
        self.sweep_expired_at(Utc::now()).await
    }

    #[instrument(skip(self))]
    pub async fn sweep_expired_at(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut records = self.store.read_all().await?;
        let patch = RecordPatch::status(
            RecordStatus::Expired,
            format!("OTP expired after {}", describe(self.expiry)),
        );

        let mut expired = 0;
        for record in records
            .iter_mut()
            .filter(|r| r.is_overdue(now, self.expiry))
        {
            patch.apply(record, now);
            expired += 1;
        }

        if expired > 0 {
            self.store.write_all(&records).await?;
            info!(expired, "Expired overdue waiting records");
        }
        Ok(expired)
    }

    /// Pending records, oldest created first.
    pub async fn pending(&self) -> Result<Vec<WorkRecord>, StoreError> {
        self.select(RecordStatus::Pending).await
    }

    /// Waiting records, oldest created first.
    pub async fn waiting(&self) -> Result<Vec<WorkRecord>, StoreError> {
        self.select(RecordStatus::Waiting).await
    }

    async fn select(&self, status: RecordStatus) -> Result<Vec<WorkRecord>, StoreError> {
        let mut records: Vec<WorkRecord> = self
            .list()
            .await?
            .into_iter()
            .filter(|r| r.status == status)
            .collect();
        records.sort_by_key(|r| (r.created_at, r.id));
        Ok(records)
    }

    /// All records, oldest created first.
    pub async fn list(&self) -> Result<Vec<WorkRecord>, StoreError> {
        self.sweep_expired().await?;
        let mut records = self.store.read_all().await?;
        records.sort_by_key(|r| (r.created_at, r.id));
        Ok(records)
    }

    /// The `limit` newest records in store order.
    pub async fn recent(&self, limit: usize) -> Result<Vec<WorkRecord>, StoreError> {
        let mut records = self.store.read_all().await?;
        records.truncate(limit);
        Ok(records)
    }

    pub async fn status_counts(&self) -> Result<StatusCounts, StoreError> {
        self.sweep_expired().await?;
        let records = self.store.read_all().await?;
        Ok(StatusCounts::from_records(&records))
    }

    /// Record a successful registration as a new `pending` record.
    pub async fn register(
        &self,
        phone: &str,
        order_id: &str,
        email: &str,
        details: impl Into<String>,
    ) -> Result<WorkRecord, StoreError> {
        let record = WorkRecord::pending(phone, order_id, email, details, Utc::now());
        let record = self.store.append(record).await?;
        debug!(id = record.id, phone = %record.phone, "Created pending record");
        Ok(record)
    }

    /// Append a fresh `login` marker for a successful batch login.
    pub async fn record_login(
        &self,
        phone: &str,
        details: impl Into<String>,
    ) -> Result<WorkRecord, StoreError> {
        let record = WorkRecord::login(phone, details, Utc::now());
        self.store.append(record).await
    }

    /// Apply `transition` to the record with `id`.
    ///
    /// Only `status`, `details` and `updated_at` change.
    #[instrument(skip(self, details))]
    pub async fn transition(
        &self,
        id: u64,
        transition: Transition,
        details: impl Into<String>,
    ) -> Result<WorkRecord, LifecycleError> {
        let records = self.store.read_all().await?;
        let current = records
            .iter()
            .find(|r| r.id == id)
            .ok_or(LifecycleError::UnknownRecord(id))?;

        let next = current.status.next(transition)?;
        let patch = RecordPatch::status(next, details);

        let updated = self
            .store
            .update(id, &patch)
            .await?
            .ok_or(LifecycleError::UnknownRecord(id))?;

        debug!(id, from = %current.status, to = %next, "Record transitioned");
        Ok(updated)
    }

    /// Archive the whole store and reset it.
    pub async fn clear(&self) -> Result<Option<PathBuf>, StoreError> {
        self.store.clear().await
    }
}

fn describe(expiry: Duration) -> String {
    let secs = expiry.as_secs();
    if secs >= 60 && secs % 60 == 0 {
        format!("{} minutes", secs / 60)
    } else {
        format!("{secs} seconds")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn engine() -> Lifecycle {
        Lifecycle::new(Store::memory(), DEFAULT_EXPIRY)
    }

    #[test]
    fn test_valid_edges() {
        assert_eq!(
            RecordStatus::Pending.next(Transition::LoginSucceeded).unwrap(),
            RecordStatus::Waiting
        );
        assert_eq!(
            RecordStatus::Waiting.next(Transition::OtpReceived).unwrap(),
            RecordStatus::Completed
        );
        assert_eq!(
            RecordStatus::Waiting.next(Transition::Expire).unwrap(),
            RecordStatus::Expired
        );
    }

    #[test]
    fn test_invalid_edges_are_rejected() {
        let transitions = [
            Transition::LoginSucceeded,
            Transition::OtpReceived,
            Transition::Expire,
        ];
        for status in RecordStatus::ALL {
            for transition in transitions {
                let allowed = matches!(
                    (status, transition),
                    (RecordStatus::Pending, Transition::LoginSucceeded)
                        | (RecordStatus::Waiting, Transition::OtpReceived)
                        | (RecordStatus::Waiting, Transition::Expire)
                );
                assert_eq!(status.next(transition).is_ok(), allowed, "{status} {transition:?}");
            }
        }
    }

    #[test]
    fn test_reserved_statuses_are_unreachable() {
        let transitions = [
            Transition::LoginSucceeded,
            Transition::OtpReceived,
            Transition::Expire,
        ];
        for status in RecordStatus::ALL {
            for transition in transitions {
                if let Ok(next) = status.next(transition) {
                    assert_ne!(next, RecordStatus::Failed);
                    assert_ne!(next, RecordStatus::Success);
                }
            }
        }
    }

    #[tokio::test]
    async fn test_happy_path_traverses_pending_waiting_completed() {
        let engine = engine();
        let record = engine
            .register("081122334455", "order-1", "a@example.com", "registered")
            .await
            .unwrap();
        assert_eq!(record.status, RecordStatus::Pending);

        let record = engine
            .transition(record.id, Transition::LoginSucceeded, "OTP sent")
            .await
            .unwrap();
        assert_eq!(record.status, RecordStatus::Waiting);

        let record = engine
            .transition(record.id, Transition::OtpReceived, "OTP received: 1234")
            .await
            .unwrap();
        assert_eq!(record.status, RecordStatus::Completed);
        assert_eq!(record.details, "OTP received: 1234");
        assert_eq!(record.email, "a@example.com");
        assert_eq!(record.order_id, "order-1");
    }

    #[tokio::test]
    async fn test_skipping_waiting_is_rejected() {
        let engine = engine();
        let record = engine
            .register("081122334455", "order-1", "a@example.com", "registered")
            .await
            .unwrap();

        let err = engine
            .transition(record.id, Transition::OtpReceived, "OTP received: 1234")
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTransition { .. }));

        let stored = engine.store().read_all().await.unwrap();
        assert_eq!(stored[0].status, RecordStatus::Pending);
    }

    #[tokio::test]
    async fn test_unknown_record() {
        let engine = engine();
        let err = engine
            .transition(7, Transition::LoginSucceeded, "OTP sent")
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::UnknownRecord(7)));
    }

    #[tokio::test]
    async fn test_overdue_waiting_record_expires_on_sweep() {
        let engine = engine();
        let created = Utc::now() - ChronoDuration::minutes(11);
        let mut stale = WorkRecord::pending("081122334455", "o1", "", "", created);
        stale.status = RecordStatus::Waiting;
        let stale = engine.store().append(stale).await.unwrap();

        let fresh = engine
            .register("081299887766", "o2", "", "registered")
            .await
            .unwrap();
        engine
            .transition(fresh.id, Transition::LoginSucceeded, "OTP sent")
            .await
            .unwrap();

        let waiting = engine.waiting().await.unwrap();
        assert_eq!(waiting.len(), 1);
        assert_eq!(waiting[0].id, fresh.id);

        let records = engine.store().read_all().await.unwrap();
        let expired = records.iter().find(|r| r.id == stale.id).unwrap();
        assert_eq!(expired.status, RecordStatus::Expired);
        assert_eq!(expired.details, "OTP expired after 10 minutes");

        let err = engine
            .transition(stale.id, Transition::LoginSucceeded, "retry")
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_sweep_leaves_pending_records_alone() {
        let engine = engine();
        let created = Utc::now() - ChronoDuration::hours(2);
        let old = WorkRecord::pending("081122334455", "o1", "", "", created);
        engine.store().append(old).await.unwrap();

        assert_eq!(engine.sweep_expired().await.unwrap(), 0);
        assert_eq!(engine.pending().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sweep_respects_custom_expiry() {
        let engine = Lifecycle::new(Store::memory(), Duration::from_secs(30));
        let created = Utc::now() - ChronoDuration::seconds(45);
        let mut record = WorkRecord::pending("081122334455", "o1", "", "", created);
        record.status = RecordStatus::Waiting;
        engine.store().append(record).await.unwrap();

        let now = Utc::now();
        assert_eq!(engine.sweep_expired_at(now).await.unwrap(), 1);
        assert_eq!(engine.sweep_expired_at(now).await.unwrap(), 0);
        let counts = engine.status_counts().await.unwrap();
        assert_eq!(counts.expired, 1);
        assert_eq!(counts.waiting, 0);
    }

    #[tokio::test]
    async fn test_pending_is_oldest_first() {
        let engine = engine();
        let now = Utc::now();
        for (phone, age) in [("081100000001", 1), ("081100000002", 3), ("081100000003", 2)] {
            let record =
                WorkRecord::pending(phone, "o", "", "", now - ChronoDuration::minutes(age));
            engine.store().append(record).await.unwrap();
        }

        let phones: Vec<String> = engine
            .pending()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.phone)
            .collect();
        assert_eq!(phones, vec!["081100000002", "081100000003", "081100000001"]);
    }

    #[tokio::test]
    async fn test_login_markers_are_appended() {
        let engine = engine();
        engine.record_login("081122334455", "login ok").await.unwrap();
        engine.record_login("081122334455", "login ok (retry)").await.unwrap();

        let counts = engine.status_counts().await.unwrap();
        assert_eq!(counts.login, 2);
        assert_eq!(counts.total, 2);

        let recent = engine.recent(1).await.unwrap();
        assert_eq!(recent[0].details, "login ok (retry)");
    }

    #[test]
    fn test_describe_expiry() {
        assert_eq!(describe(Duration::from_secs(600)), "10 minutes");
        assert_eq!(describe(Duration::from_secs(45)), "45 seconds");
    }
}
