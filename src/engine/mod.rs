mod error;
mod mutations;
mod queries;
mod store;
pub mod workplan;

pub use error::EngineError;
pub use store::SlotStore;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, Mutex, OwnedRwLockWriteGuard, RwLock};
use ulid::Ulid;

use crate::model::*;
use crate::wal::Wal;

pub type SharedDay = Arc<RwLock<DayState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Owns the WAL. Appends that queue up while a flush is in progress are
/// written together and share one fsync.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_control(&mut wal, other);
                continue;
            }
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }
        commit_batch(&mut wal, batch);
        if let Some(cmd) = deferred {
            handle_control(&mut wal, cmd);
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: Vec<PendingAppend>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = std::time::Instant::now();

    let mut result = Ok(());
    for (event, _) in &batch {
        if let Err(e) = wal.append_buffered(event) {
            result = Err(e);
            break;
        }
    }
    // Flush even after a failed append so stale buffered bytes can't leak into
    // the next batch; every caller in this batch is told it failed.
    let flushed = wal.flush_sync();
    let result = result.and(flushed);

    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());

    for (_, tx) in batch {
        let reply = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(reply);
    }
}

fn handle_control(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => commit_batch(wal, vec![(event, response)]),
    }
}

/// One provider's slot store: per-day timelines in memory, every mutation
/// made durable in the WAL before it is applied.
pub struct Engine {
    pub(super) days: DashMap<NaiveDate, SharedDay>,
    pub(super) services: DashMap<Ulid, Service>,
    /// Serializes service writes (they are not day-scoped).
    pub(super) services_write: Mutex<()>,
    /// Mutations hold this shared, before any day lock; compaction holds it
    /// exclusively so its snapshot and file swap see no writes in between.
    pub(super) wal_gate: RwLock<()>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Reverse lookup: slot or reservation id → the day holding it.
    pub(super) entity_to_day: DashMap<Ulid, NaiveDate>,
}

/// Apply a day-scoped event. Caller holds the day's write lock.
fn apply_to_day(day: &mut DayState, event: &Event, entity_map: &DashMap<Ulid, NaiveDate>) {
    match event {
        Event::SlotUpserted {
            id,
            time,
            capacity,
            withdrawn,
            ..
        } => {
            let stored = day.upsert_slot(*id, *time, *capacity, *withdrawn);
            entity_map.insert(stored, day.date);
        }
        Event::SlotDeleted { id, .. } => {
            day.remove_slot(*id);
            entity_map.remove(id);
        }
        Event::SlotClaimed { reservation } => {
            if let Some(slot) = day.slot_mut(reservation.slot_id) {
                slot.booked_count += 1;
            }
            entity_map.insert(reservation.id, day.date);
            day.reservations.push(reservation.clone());
        }
        Event::ReservationReleased { id, slot_id, .. } => {
            if day.remove_reservation(*id).is_some()
                && let Some(slot) = day.slot_mut(*slot_id)
            {
                slot.booked_count = slot.booked_count.saturating_sub(1);
            }
            entity_map.remove(id);
        }
        Event::WorkPlanSaved { plan, .. } => {
            day.plan = Some(plan.clone());
        }
        // Service events are applied at the engine level, not per day
        Event::ServiceSaved { .. } | Event::ServiceDeleted { .. } => {}
    }
}

fn apply_to_services(services: &DashMap<Ulid, Service>, event: &Event) {
    match event {
        Event::ServiceSaved { service } => {
            services.insert(service.id, service.clone());
        }
        Event::ServiceDeleted { id } => {
            services.remove(id);
        }
        _ => {}
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            days: DashMap::new(),
            services: DashMap::new(),
            services_write: Mutex::new(()),
            wal_gate: RwLock::new(()),
            wal_tx,
            entity_to_day: DashMap::new(),
        };

        // Sole owner during replay: try_write never contends. Blocking lock
        // calls are off-limits here since this can run inside the runtime.
        for event in &events {
            match event.date() {
                Some(date) => {
                    let day = engine.day_or_insert(date);
                    let mut guard = day
                        .try_write()
                        .map_err(|_| io::Error::other("replay: day lock contended"))?;
                    apply_to_day(&mut guard, event, &engine.entity_to_day);
                }
                None => apply_to_services(&engine.services, event),
            }
        }

        Ok(engine)
    }

    /// Write an event through the group-commit writer and wait for the fsync.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::StoreUnavailable("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::StoreUnavailable("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::StoreUnavailable(e.to_string()))
    }

    pub(super) fn day(&self, date: &NaiveDate) -> Option<SharedDay> {
        self.days.get(date).map(|e| e.value().clone())
    }

    pub(super) fn day_or_insert(&self, date: NaiveDate) -> SharedDay {
        self.days
            .entry(date)
            .or_insert_with(|| Arc::new(RwLock::new(DayState::new(date))))
            .value()
            .clone()
    }

    pub(super) fn day_for_entity(&self, entity_id: &Ulid) -> Option<NaiveDate> {
        self.entity_to_day.get(entity_id).map(|e| *e.value())
    }

    /// WAL-append then apply, under the caller's day lock.
    pub(super) async fn persist_and_apply(&self, day: &mut DayState, event: &Event) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_day(day, event, &self.entity_to_day);
        Ok(())
    }

    pub(super) async fn persist_service_event(&self, event: &Event) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_services(&self.services, event);
        Ok(())
    }

    /// Lookup entity → day, acquire that day's write lock.
    pub(super) async fn resolve_entity_write(
        &self,
        entity_id: &Ulid,
    ) -> Option<OwnedRwLockWriteGuard<DayState>> {
        let date = self.day_for_entity(entity_id)?;
        let day = self.day(&date)?;
        Some(day.write_owned().await)
    }
}
