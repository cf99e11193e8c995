use async_trait::async_trait;
use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

use super::{Engine, EngineError};

/// The slot store contract the booking orchestrator and the work-plan
/// generator are written against.
///
/// `claim` is the only place availability is decided: it must check and
/// reserve as one indivisible step. `release` is its compensating undo and
/// must be idempotent.
#[async_trait]
pub trait SlotStore: Send + Sync + 'static {
    /// Slots of one day, ascending by time.
    async fn list_by_date(&self, date: NaiveDate) -> Result<Vec<Slot>, EngineError>;

    async fn upsert(
        &self,
        date: NaiveDate,
        time: TimeOfDay,
        capacity: u32,
    ) -> Result<Slot, EngineError>;

    async fn delete(&self, date: NaiveDate, time: TimeOfDay) -> Result<bool, EngineError>;

    /// Fails with `SlotNotAvailable` (and mutates nothing) when the slot is
    /// missing, locked or full.
    async fn claim(&self, slot_id: Ulid, customer: &Customer) -> Result<Reservation, EngineError>;

    /// `Ok(false)` when the reservation is already gone.
    async fn release(&self, reservation_id: Ulid) -> Result<bool, EngineError>;

    async fn service(&self, id: Ulid) -> Result<Option<Service>, EngineError>;
}

#[async_trait]
impl SlotStore for Engine {
    async fn list_by_date(&self, date: NaiveDate) -> Result<Vec<Slot>, EngineError> {
        Ok(self.list_slots(date).await)
    }

    async fn upsert(
        &self,
        date: NaiveDate,
        time: TimeOfDay,
        capacity: u32,
    ) -> Result<Slot, EngineError> {
        self.upsert_slot(date, time, capacity, None).await
    }

    async fn delete(&self, date: NaiveDate, time: TimeOfDay) -> Result<bool, EngineError> {
        self.delete_slot(date, time).await
    }

    async fn claim(&self, slot_id: Ulid, customer: &Customer) -> Result<Reservation, EngineError> {
        self.claim_slot(slot_id, customer.clone()).await
    }

    async fn release(&self, reservation_id: Ulid) -> Result<bool, EngineError> {
        self.release_reservation(reservation_id).await
    }

    async fn service(&self, id: Ulid) -> Result<Option<Service>, EngineError> {
        Ok(self.get_service(&id))
    }
}
