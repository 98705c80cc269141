mod entry;

pub use entry::{EntryStatus, QueueEntry};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::{QueueError, QueueResult};
use crate::events::QueueEvent;

/// One day's service line at one location. Owns its entries, position
/// assignment and admission control. Not internally synchronized — callers
/// serialize mutations per instance (single-writer-at-a-time), typically via
/// the storage layer's optimistic concurrency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceQueue {
    id: Uuid,
    location_id: Uuid,
    queue_date: NaiveDate,
    is_active: bool,
    max_size: usize,
    /// Minutes a Called customer may keep staff waiting before counting as
    /// overdue for the host's no-show sweep.
    late_client_cap_minutes: i64,
    entries: Vec<QueueEntry>,
}

impl ServiceQueue {
    pub fn new(
        location_id: Uuid,
        queue_date: NaiveDate,
        max_size: usize,
        late_client_cap_minutes: i64,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            location_id,
            queue_date,
            is_active: true,
            max_size,
            late_client_cap_minutes,
            entries: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn location_id(&self) -> Uuid {
        self.location_id
    }

    pub fn queue_date(&self) -> NaiveDate {
        self.queue_date
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }

    pub fn entry(&self, entry_id: Uuid) -> Option<&QueueEntry> {
        self.entries.iter().find(|e| e.id() == entry_id)
    }

    /// Count of entries holding a capacity slot (Waiting or Called).
    pub fn active_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.status().counts_toward_capacity())
            .count()
    }

    /// Queues are deactivated rather than deleted; an inactive queue rejects
    /// new customers but keeps its history.
    pub fn deactivate(&mut self) {
        self.is_active = false;
    }

    /// Admit a customer. Fails with `QueueInactive` or `QueueFull`; otherwise
    /// assigns the next monotonic position (never reused, even after
    /// cancellations — released slots do not release positions) and creates
    /// the entry as `Waiting`.
    pub fn add_customer(
        &mut self,
        customer_id: Uuid,
        customer_name: impl Into<String>,
        staff_member_id: Option<Uuid>,
        service_type_id: Option<Uuid>,
        notes: Option<String>,
    ) -> QueueResult<QueueEvent> {
        if !self.is_active {
            return Err(QueueError::QueueInactive);
        }
        if self.active_count() >= self.max_size {
            return Err(QueueError::QueueFull(self.max_size));
        }

        let position = self.next_position();
        let entry = QueueEntry::new(
            self.id,
            customer_id,
            customer_name.into(),
            position,
            staff_member_id,
            service_type_id,
            notes,
        );
        let entry_id = entry.id();
        debug!(queue_id = %self.id, %entry_id, position, "customer added to queue");
        self.entries.push(entry);

        Ok(QueueEvent::CustomerJoined {
            queue_id: self.id,
            entry_id,
            customer_id,
            position,
        })
    }

    /// Call a waiting customer to a staff member.
    pub fn call_customer(&mut self, entry_id: Uuid, staff_member_id: Uuid) -> QueueResult<QueueEvent> {
        let queue_id = self.id;
        let entry = self.entry_mut(entry_id)?;
        entry.call(staff_member_id)?;
        Ok(QueueEvent::CustomerCalled {
            queue_id,
            entry_id,
            customer_id: entry.customer_id(),
            staff_member_id,
        })
    }

    /// Check a called customer in at the counter.
    pub fn check_in_customer(&mut self, entry_id: Uuid) -> QueueResult<QueueEvent> {
        let queue_id = self.id;
        let entry = self.entry_mut(entry_id)?;
        entry.check_in()?;
        Ok(QueueEvent::CustomerCheckedIn {
            queue_id,
            entry_id,
            customer_id: entry.customer_id(),
        })
    }

    /// Finish service for a checked-in customer.
    pub fn complete_service(&mut self, entry_id: Uuid, duration_minutes: i64) -> QueueResult<QueueEvent> {
        let queue_id = self.id;
        let entry = self.entry_mut(entry_id)?;
        entry.complete(duration_minutes)?;
        Ok(QueueEvent::ServiceCompleted {
            queue_id,
            entry_id,
            customer_id: entry.customer_id(),
            duration_minutes,
        })
    }

    /// Cancel a waiting or called entry. The entry keeps its position for
    /// audit continuity.
    pub fn cancel_entry(&mut self, entry_id: Uuid) -> QueueResult<QueueEvent> {
        let queue_id = self.id;
        let entry = self.entry_mut(entry_id)?;
        entry.cancel()?;
        Ok(QueueEvent::EntryCancelled {
            queue_id,
            entry_id,
            customer_id: entry.customer_id(),
        })
    }

    /// Batched cancellation through the same guarded transition as
    /// `cancel_entry` — bulk paths never bypass the state machine. Stops at
    /// the first domain error, returning events for the entries cancelled so
    /// far alongside it.
    pub fn cancel_entries(&mut self, entry_ids: &[Uuid]) -> QueueResult<Vec<QueueEvent>> {
        let mut events = Vec::with_capacity(entry_ids.len());
        for &entry_id in entry_ids {
            events.push(self.cancel_entry(entry_id)?);
        }
        Ok(events)
    }

    /// Called entries whose customer has kept staff waiting longer than
    /// `late_client_cap_minutes`. Query only — the host decides whether to
    /// cancel them, and does so through `cancel_entry`.
    pub fn overdue_entries(&self, now: DateTime<Utc>) -> Vec<&QueueEntry> {
        let cap = Duration::minutes(self.late_client_cap_minutes);
        self.entries
            .iter()
            .filter(|e| {
                e.status() == EntryStatus::Called
                    && e.called_at().is_some_and(|called| called + cap < now)
            })
            .collect()
    }

    /// Estimated wait in minutes for an entry: the number of Waiting entries
    /// positioned strictly before it, spread across the active staff, times
    /// the average service duration. Returns `-1` when no staff is active
    /// (unknown). Pure and recomputed on demand; never cached here.
    pub fn estimate_wait_minutes(
        &self,
        entry_id: Uuid,
        average_service_minutes: i64,
        active_staff_count: u32,
    ) -> QueueResult<i64> {
        let target = self
            .entry(entry_id)
            .ok_or(QueueError::EntryNotFound(entry_id))?;

        if active_staff_count == 0 {
            return Ok(-1);
        }

        let preceding_waiting = self
            .entries
            .iter()
            .filter(|e| e.status() == EntryStatus::Waiting && e.position() < target.position())
            .count() as i64;

        let staff = i64::from(active_staff_count);
        let rounds = (preceding_waiting + staff - 1) / staff;
        Ok(rounds * average_service_minutes)
    }

    fn entry_mut(&mut self, entry_id: Uuid) -> QueueResult<&mut QueueEntry> {
        self.entries
            .iter_mut()
            .find(|e| e.id() == entry_id)
            .ok_or(QueueError::EntryNotFound(entry_id))
    }

    fn next_position(&self) -> u32 {
        self.entries.iter().map(QueueEntry::position).max().unwrap_or(0) + 1
    }
}
