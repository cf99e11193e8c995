use chrono::NaiveDate;
use tokio::sync::oneshot;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError, WalCommand};

pub(crate) fn now_ms() -> Ms {
    chrono::Utc::now().timestamp_millis()
}

impl Engine {
    /// Create the slot at `(date, time)` or refresh the capacity of the one
    /// already there. `withdrawn: None` leaves an existing admin lock untouched.
    pub async fn upsert_slot(
        &self,
        date: NaiveDate,
        time: TimeOfDay,
        capacity: u32,
        withdrawn: Option<bool>,
    ) -> Result<Slot, EngineError> {
        if time.minutes() >= 24 * 60 {
            return Err(EngineError::InvalidInput(format!("slot time {time} is past the end of the day")));
        }
        if capacity == 0 {
            return Err(EngineError::InvalidInput("capacity must be at least 1".into()));
        }
        if capacity > MAX_SLOT_CAPACITY {
            return Err(EngineError::LimitExceeded("slot capacity too large"));
        }

        let _gate = self.wal_gate.read().await;
        let day = self.day_or_insert(date);
        let mut guard = day.write().await;
        let id = match guard.slot_at(time) {
            Some(existing) => {
                if capacity < existing.booked_count {
                    return Err(EngineError::InvalidInput(format!(
                        "capacity {capacity} is below the {} reservations already held at {date} {time}",
                        existing.booked_count
                    )));
                }
                existing.id
            }
            None => {
                if guard.slots.len() >= MAX_SLOTS_PER_DAY {
                    return Err(EngineError::LimitExceeded("too many slots on day"));
                }
                Ulid::new()
            }
        };

        let event = Event::SlotUpserted { id, date, time, capacity, withdrawn };
        self.persist_and_apply(&mut guard, &event).await?;
        guard.slot(id).cloned().ok_or(EngineError::NotFound(id))
    }

    /// Remove the slot at `(date, time)`. Reservations already made on it are
    /// kept; returns `false` if there was no such slot.
    pub async fn delete_slot(&self, date: NaiveDate, time: TimeOfDay) -> Result<bool, EngineError> {
        let _gate = self.wal_gate.read().await;
        let Some(day) = self.day(&date) else {
            return Ok(false);
        };
        let mut guard = day.write().await;
        let Some(id) = guard.slot_at(time).map(|s| s.id) else {
            return Ok(false);
        };
        let event = Event::SlotDeleted { id, date };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(true)
    }

    /// The atomic claim: check availability, count the booking and record the
    /// reservation under one day lock and one WAL entry.
    pub async fn claim_slot(&self, slot_id: Ulid, customer: Customer) -> Result<Reservation, EngineError> {
        let customer = customer.validated()?;
        let _gate = self.wal_gate.read().await;
        let Some(mut guard) = self.resolve_entity_write(&slot_id).await else {
            return Err(EngineError::SlotNotAvailable(slot_id));
        };
        let (date, time) = match guard.slot(slot_id) {
            Some(slot) if !slot.locked() => (slot.date, slot.time),
            _ => {
                metrics::counter!(crate::observability::CLAIMS_TOTAL, "outcome" => "unavailable").increment(1);
                return Err(EngineError::SlotNotAvailable(slot_id));
            }
        };
        if guard.reservations.len() >= MAX_RESERVATIONS_PER_DAY {
            return Err(EngineError::LimitExceeded("too many reservations on day"));
        }

        let reservation = Reservation {
            id: Ulid::new(),
            slot_id,
            date,
            time,
            customer,
            created_at: now_ms(),
        };
        let event = Event::SlotClaimed {
            reservation: reservation.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        metrics::counter!(crate::observability::CLAIMS_TOTAL, "outcome" => "claimed").increment(1);
        Ok(reservation)
    }

    /// Undo a claim: drop the reservation and give its capacity back.
    /// Idempotent; `Ok(false)` if the reservation no longer exists.
    pub async fn release_reservation(&self, id: Ulid) -> Result<bool, EngineError> {
        let _gate = self.wal_gate.read().await;
        let Some(mut guard) = self.resolve_entity_write(&id).await else {
            return Ok(false);
        };
        let Some(reservation) = guard.reservations.iter().find(|r| r.id == id) else {
            return Ok(false);
        };
        let event = Event::ReservationReleased {
            id,
            slot_id: reservation.slot_id,
            date: reservation.date,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(true)
    }

    pub async fn save_work_plan(&self, date: NaiveDate, plan: WorkPlan) -> Result<(), EngineError> {
        plan.validate()?;
        let _gate = self.wal_gate.read().await;
        let day = self.day_or_insert(date);
        let mut guard = day.write().await;
        let event = Event::WorkPlanSaved { date, plan };
        self.persist_and_apply(&mut guard, &event).await
    }

    pub async fn create_service(
        &self,
        name: String,
        duration_min: Minutes,
        active: bool,
    ) -> Result<Service, EngineError> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(EngineError::InvalidInput("service name is required".into()));
        }
        if name.len() > MAX_SERVICE_NAME_LEN {
            return Err(EngineError::LimitExceeded("service name too long"));
        }
        if duration_min == 0 || duration_min > MAX_DURATION_MIN {
            return Err(EngineError::InvalidInput(format!(
                "service duration must be between 1 and {MAX_DURATION_MIN} minutes"
            )));
        }

        let _gate = self.wal_gate.read().await;
        let _write = self.services_write.lock().await;
        if self.services.len() >= MAX_SERVICES {
            return Err(EngineError::LimitExceeded("too many services"));
        }
        let service = Service {
            id: Ulid::new(),
            name,
            duration_min,
            active,
        };
        let event = Event::ServiceSaved {
            service: service.clone(),
        };
        self.persist_service_event(&event).await?;
        Ok(service)
    }

    pub async fn delete_service(&self, id: Ulid) -> Result<bool, EngineError> {
        let _gate = self.wal_gate.read().await;
        let _write = self.services_write.lock().await;
        if !self.services.contains_key(&id) {
            return Ok(false);
        }
        self.persist_service_event(&Event::ServiceDeleted { id }).await?;
        Ok(true)
    }

    /// Rewrite the WAL with just the events needed to rebuild current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _gate = self.wal_gate.write().await;
        let mut events = Vec::new();

        for entry in self.services.iter() {
            events.push(Event::ServiceSaved {
                service: entry.value().clone(),
            });
        }

        let days: Vec<_> = self.days.iter().map(|e| e.value().clone()).collect();
        for day in days {
            let guard = day.read().await;
            if guard.is_empty() {
                continue;
            }
            if let Some(plan) = &guard.plan {
                events.push(Event::WorkPlanSaved {
                    date: guard.date,
                    plan: plan.clone(),
                });
            }
            for slot in &guard.slots {
                events.push(Event::SlotUpserted {
                    id: slot.id,
                    date: slot.date,
                    time: slot.time,
                    capacity: slot.capacity,
                    withdrawn: Some(slot.withdrawn),
                });
            }
            // Replaying the claims rebuilds each slot's booked_count.
            for reservation in &guard.reservations {
                events.push(Event::SlotClaimed {
                    reservation: reservation.clone(),
                });
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::StoreUnavailable("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::StoreUnavailable("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::StoreUnavailable(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
