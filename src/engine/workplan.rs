//! Expanding a day's work plan into its slot grid.

use std::collections::BTreeSet;

use chrono::NaiveDate;

use crate::model::*;

use super::{EngineError, SlotStore};

/// Slot start times for a plan, sorted and de-duplicated.
///
/// Per window: emit at the cursor, advance by `slot_len + break_min`, and keep
/// going while a whole slot still fits before the window end. Overlapping
/// windows are not merged; a time produced by two windows appears once.
pub fn expand(plan: &WorkPlan) -> Vec<TimeOfDay> {
    let step = plan.slot_len + plan.break_min;
    let mut times = BTreeSet::new();
    for window in &plan.windows {
        let end = window.end.minutes();
        let mut cursor = window.start.minutes();
        while cursor + plan.slot_len <= end {
            if let Some(t) = TimeOfDay::from_minutes(cursor) {
                times.insert(t);
            }
            if step == 0 {
                break;
            }
            cursor += step;
        }
    }
    times.into_iter().collect()
}

/// Upsert every slot of `plan` on `date` with `capacity`.
///
/// Idempotent on `(date, time)`: existing slots keep their id, bookings and
/// admin lock, and only get their capacity refreshed. Nothing is deleted.
/// Returns how many slots were written.
pub async fn generate<S: SlotStore + ?Sized>(
    store: &S,
    date: NaiveDate,
    plan: &WorkPlan,
    capacity: u32,
) -> Result<usize, EngineError> {
    plan.validate()?;
    let times = expand(plan);
    for &time in &times {
        store.upsert(date, time, capacity).await?;
    }
    tracing::info!(%date, slots = times.len(), windows = %plan.format_windows(), "generated slot grid");
    Ok(times.len())
}
