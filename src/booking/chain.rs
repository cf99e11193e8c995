//! Chain planning: which consecutive slots a booking of a given length needs.
//!
//! Pure functions over a day's slot list (ascending by time). Availability
//! is only advisory here; the claims decide.

use crate::model::{Minutes, Slot, TimeOfDay};

use super::BookingError;

/// The slots a booking would claim, in time order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainPlan {
    /// Grid step, measured between the start slot and the one after it.
    pub step: Minutes,
    pub slots: Vec<Slot>,
}

impl ChainPlan {
    pub fn need(&self) -> usize {
        self.slots.len()
    }
}

/// `max(1, ceil(duration / step))`.
pub fn slots_needed(duration: Minutes, step: Minutes) -> usize {
    if step == 0 {
        return 1;
    }
    duration.div_ceil(step).max(1) as usize
}

/// Plan the chain for a booking of `duration` minutes starting at `start`.
///
/// Errors, in the order they are checked: `StartNotAvailable` when there is
/// no open slot at `start`; `InsufficientSlots` when no slot follows it;
/// `InvalidScheduleConfig` when the next slot is not later; `InsufficientSlots`
/// when fewer than `need` slots remain or the grid has a gap;
/// `ChainNotAvailable` when any chained slot is locked.
pub fn plan_chain(slots: &[Slot], start: TimeOfDay, duration: Minutes) -> Result<ChainPlan, BookingError> {
    let first = slots
        .iter()
        .position(|s| s.time == start)
        .filter(|&i| !slots[i].locked())
        .ok_or_else(|| BookingError::StartNotAvailable(start.to_string()))?;

    let Some(next) = slots.get(first + 1) else {
        return Err(BookingError::InsufficientSlots {
            need: None,
            available: 1,
        });
    };
    let step = i64::from(next.time.minutes()) - i64::from(slots[first].time.minutes());
    if step <= 0 {
        return Err(BookingError::InvalidScheduleConfig(format!(
            "slot at {} does not follow {start}",
            next.time
        )));
    }
    let step = step as Minutes;
    let need = slots_needed(duration, step);

    let chain = &slots[first..];
    let contiguous = 1 + chain
        .windows(2)
        .take(need.saturating_sub(1))
        .take_while(|pair| pair[1].time.minutes() == pair[0].time.minutes() + step)
        .count();
    if contiguous < need {
        return Err(BookingError::InsufficientSlots {
            need: Some(need),
            available: contiguous,
        });
    }

    let chain = &chain[..need];
    if let Some(taken) = chain.iter().find(|s| s.locked()) {
        return Err(BookingError::ChainNotAvailable(taken.time));
    }

    Ok(ChainPlan {
        step,
        slots: chain.to_vec(),
    })
}

/// Start times from which a booking of `duration` would currently plan.
pub fn available_starts(slots: &[Slot], duration: Minutes) -> Vec<TimeOfDay> {
    slots
        .iter()
        .filter(|s| !s.locked())
        .filter(|s| plan_chain(slots, s.time, duration).is_ok())
        .map(|s| s.time)
        .collect()
}
