use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{QueueError, QueueResult};

/// Status of one waiting customer.
///
/// Legal transitions: `Waiting -> Called -> CheckedIn -> Completed`, with
/// `Cancelled` reachable from `Waiting` or `Called`. `Completed` and
/// `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryStatus {
    Waiting,
    Called,
    CheckedIn,
    Completed,
    Cancelled,
}

impl EntryStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, EntryStatus::Completed | EntryStatus::Cancelled)
    }

    /// Whether the entry counts toward the queue's capacity.
    pub fn counts_toward_capacity(&self) -> bool {
        matches!(self, EntryStatus::Waiting | EntryStatus::Called)
    }
}

/// One customer's record within a queue. Owned exclusively by its
/// `ServiceQueue`; all mutation goes through the guarded transition methods
/// below, which error on illegal transitions rather than silently no-op.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    id: Uuid,
    queue_id: Uuid,
    customer_id: Uuid,
    customer_name: String,
    position: u32,
    status: EntryStatus,
    staff_member_id: Option<Uuid>,
    service_type_id: Option<Uuid>,
    notes: Option<String>,
    entered_at: DateTime<Utc>,
    called_at: Option<DateTime<Utc>>,
    checked_in_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    service_duration_minutes: Option<i64>,
}

impl QueueEntry {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        queue_id: Uuid,
        customer_id: Uuid,
        customer_name: String,
        position: u32,
        staff_member_id: Option<Uuid>,
        service_type_id: Option<Uuid>,
        notes: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            queue_id,
            customer_id,
            customer_name,
            position,
            status: EntryStatus::Waiting,
            staff_member_id,
            service_type_id,
            notes,
            entered_at: Utc::now(),
            called_at: None,
            checked_in_at: None,
            completed_at: None,
            cancelled_at: None,
            service_duration_minutes: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn queue_id(&self) -> Uuid {
        self.queue_id
    }

    pub fn customer_id(&self) -> Uuid {
        self.customer_id
    }

    pub fn customer_name(&self) -> &str {
        &self.customer_name
    }

    pub fn position(&self) -> u32 {
        self.position
    }

    pub fn status(&self) -> EntryStatus {
        self.status
    }

    pub fn staff_member_id(&self) -> Option<Uuid> {
        self.staff_member_id
    }

    pub fn service_type_id(&self) -> Option<Uuid> {
        self.service_type_id
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn entered_at(&self) -> DateTime<Utc> {
        self.entered_at
    }

    pub fn called_at(&self) -> Option<DateTime<Utc>> {
        self.called_at
    }

    pub fn checked_in_at(&self) -> Option<DateTime<Utc>> {
        self.checked_in_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        self.cancelled_at
    }

    pub fn service_duration_minutes(&self) -> Option<i64> {
        self.service_duration_minutes
    }

    /// Call the customer to a staff member. Legal only from `Waiting`.
    pub fn call(&mut self, staff_member_id: Uuid) -> QueueResult<()> {
        if self.status != EntryStatus::Waiting {
            return Err(QueueError::InvalidTransition {
                from: self.status,
                action: "call",
            });
        }
        self.status = EntryStatus::Called;
        self.staff_member_id = Some(staff_member_id);
        self.called_at = Some(Utc::now());
        Ok(())
    }

    /// Check the customer in at the counter. Legal only from `Called`.
    pub fn check_in(&mut self) -> QueueResult<()> {
        if self.status != EntryStatus::Called {
            return Err(QueueError::InvalidTransition {
                from: self.status,
                action: "check in",
            });
        }
        self.status = EntryStatus::CheckedIn;
        self.checked_in_at = Some(Utc::now());
        Ok(())
    }

    /// Finish service. Legal only from `CheckedIn`; the duration must be
    /// positive and is validated regardless of the current status.
    pub fn complete(&mut self, duration_minutes: i64) -> QueueResult<()> {
        if duration_minutes <= 0 {
            return Err(QueueError::InvalidServiceDuration(duration_minutes));
        }
        if self.status != EntryStatus::CheckedIn {
            return Err(QueueError::InvalidTransition {
                from: self.status,
                action: "complete",
            });
        }
        self.status = EntryStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.service_duration_minutes = Some(duration_minutes);
        Ok(())
    }

    /// Cancel the entry. Legal from `Waiting` or `Called`; once service has
    /// started (`CheckedIn`) or the entry is terminal, cancellation is
    /// rejected.
    pub fn cancel(&mut self) -> QueueResult<()> {
        if !matches!(self.status, EntryStatus::Waiting | EntryStatus::Called) {
            return Err(QueueError::InvalidTransition {
                from: self.status,
                action: "cancel",
            });
        }
        self.status = EntryStatus::Cancelled;
        self.cancelled_at = Some(Utc::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn waiting_entry() -> QueueEntry {
        QueueEntry::new(
            Uuid::now_v7(),
            Uuid::now_v7(),
            "Ana".to_string(),
            1,
            None,
            None,
            None,
        )
    }

    #[test]
    fn new_entry_starts_waiting() {
        let entry = waiting_entry();
        assert_eq!(entry.status(), EntryStatus::Waiting);
        assert!(entry.staff_member_id().is_none());
        assert!(entry.called_at().is_none());
        assert!(entry.status().counts_toward_capacity());
    }

    #[test]
    fn call_from_waiting_assigns_staff_and_timestamp() {
        let mut entry = waiting_entry();
        let staff = Uuid::now_v7();

        entry.call(staff).unwrap();

        assert_eq!(entry.status(), EntryStatus::Called);
        assert_eq!(entry.staff_member_id(), Some(staff));
        assert!(entry.called_at().is_some());
    }

    #[test]
    fn call_twice_is_rejected() {
        let mut entry = waiting_entry();
        entry.call(Uuid::now_v7()).unwrap();

        let err = entry.call(Uuid::now_v7()).unwrap_err();
        assert_eq!(
            err,
            QueueError::InvalidTransition {
                from: EntryStatus::Called,
                action: "call",
            }
        );
    }

    #[test]
    fn check_in_requires_called() {
        let mut entry = waiting_entry();

        let err = entry.check_in().unwrap_err();
        assert!(matches!(err, QueueError::InvalidTransition { .. }));

        entry.call(Uuid::now_v7()).unwrap();
        entry.check_in().unwrap();
        assert_eq!(entry.status(), EntryStatus::CheckedIn);
        assert!(entry.checked_in_at().is_some());
    }

    #[test]
    fn complete_full_lifecycle() {
        let mut entry = waiting_entry();
        entry.call(Uuid::now_v7()).unwrap();
        entry.check_in().unwrap();
        entry.complete(25).unwrap();

        assert_eq!(entry.status(), EntryStatus::Completed);
        assert_eq!(entry.service_duration_minutes(), Some(25));
        assert!(entry.completed_at().is_some());
        assert!(entry.status().is_terminal());
    }

    #[test]
    fn complete_rejects_non_positive_duration_regardless_of_status() {
        let mut waiting = waiting_entry();
        assert_eq!(
            waiting.complete(0).unwrap_err(),
            QueueError::InvalidServiceDuration(0)
        );

        let mut checked_in = waiting_entry();
        checked_in.call(Uuid::now_v7()).unwrap();
        checked_in.check_in().unwrap();
        assert_eq!(
            checked_in.complete(-5).unwrap_err(),
            QueueError::InvalidServiceDuration(-5)
        );
        // Status untouched after the rejected completion
        assert_eq!(checked_in.status(), EntryStatus::CheckedIn);
    }

    #[test]
    fn complete_requires_checked_in() {
        let mut entry = waiting_entry();
        entry.call(Uuid::now_v7()).unwrap();

        let err = entry.complete(10).unwrap_err();
        assert_eq!(
            err,
            QueueError::InvalidTransition {
                from: EntryStatus::Called,
                action: "complete",
            }
        );
    }

    #[test]
    fn cancel_legal_from_waiting_and_called() {
        let mut from_waiting = waiting_entry();
        from_waiting.cancel().unwrap();
        assert_eq!(from_waiting.status(), EntryStatus::Cancelled);
        assert!(from_waiting.cancelled_at().is_some());

        let mut from_called = waiting_entry();
        from_called.call(Uuid::now_v7()).unwrap();
        from_called.cancel().unwrap();
        assert_eq!(from_called.status(), EntryStatus::Cancelled);
    }

    #[test]
    fn cancel_illegal_once_service_started_or_terminal() {
        let mut checked_in = waiting_entry();
        checked_in.call(Uuid::now_v7()).unwrap();
        checked_in.check_in().unwrap();
        assert!(matches!(
            checked_in.cancel().unwrap_err(),
            QueueError::InvalidTransition {
                from: EntryStatus::CheckedIn,
                ..
            }
        ));

        let mut completed = waiting_entry();
        completed.call(Uuid::now_v7()).unwrap();
        completed.check_in().unwrap();
        completed.complete(5).unwrap();
        assert!(completed.cancel().is_err());

        let mut cancelled = waiting_entry();
        cancelled.cancel().unwrap();
        assert!(matches!(
            cancelled.cancel().unwrap_err(),
            QueueError::InvalidTransition {
                from: EntryStatus::Cancelled,
                ..
            }
        ));
    }
}
