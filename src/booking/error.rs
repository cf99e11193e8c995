use std::fmt;

use ulid::Ulid;

use crate::engine::EngineError;
use crate::model::{InvalidInput, TimeOfDay};

/// Every way a booking can fail. Variants that happen after claims were made
/// carry the reservation ids compensation could not release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingError {
    InvalidInput(String),
    VerificationFailed,
    StartNotAvailable(String),
    /// Adjacent slots are not strictly increasing in time.
    InvalidScheduleConfig(String),
    /// `need` is `None` when no slot follows the start, so the step is unknown.
    InsufficientSlots {
        need: Option<usize>,
        available: usize,
    },
    ChainNotAvailable(TimeOfDay),
    /// A chain slot was taken between planning and claiming.
    ChainRaceLost {
        slot: TimeOfDay,
        orphaned: Vec<Ulid>,
    },
    BookingFailed {
        reason: String,
        orphaned: Vec<Ulid>,
    },
    StoreUnavailable(String),
}

impl BookingError {
    /// HTTP-like status class.
    pub fn status(&self) -> u16 {
        match self {
            BookingError::InvalidInput(_) => 400,
            BookingError::VerificationFailed => 403,
            BookingError::StartNotAvailable(_)
            | BookingError::InsufficientSlots { .. }
            | BookingError::ChainNotAvailable(_)
            | BookingError::ChainRaceLost { .. } => 409,
            BookingError::InvalidScheduleConfig(_) | BookingError::BookingFailed { .. } => 500,
            BookingError::StoreUnavailable(_) => 503,
        }
    }

    /// Short stable name, used as a metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            BookingError::InvalidInput(_) => "invalid_input",
            BookingError::VerificationFailed => "verification_failed",
            BookingError::StartNotAvailable(_) => "start_not_available",
            BookingError::InvalidScheduleConfig(_) => "invalid_schedule_config",
            BookingError::InsufficientSlots { .. } => "insufficient_slots",
            BookingError::ChainNotAvailable(_) => "chain_not_available",
            BookingError::ChainRaceLost { .. } => "chain_race_lost",
            BookingError::BookingFailed { .. } => "booking_failed",
            BookingError::StoreUnavailable(_) => "store_unavailable",
        }
    }

    /// Reservations left behind after a failed compensation.
    pub fn orphaned(&self) -> &[Ulid] {
        match self {
            BookingError::ChainRaceLost { orphaned, .. }
            | BookingError::BookingFailed { orphaned, .. } => orphaned,
            _ => &[],
        }
    }
}

impl fmt::Display for BookingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookingError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            BookingError::VerificationFailed => write!(f, "verification failed"),
            BookingError::StartNotAvailable(what) => write!(f, "start not available: {what}"),
            BookingError::InvalidScheduleConfig(msg) => {
                write!(f, "invalid schedule configuration: {msg}")
            }
            BookingError::InsufficientSlots {
                need: Some(need),
                available,
            } => write!(
                f,
                "not enough consecutive slots: need {need}, found {available}"
            ),
            BookingError::InsufficientSlots { need: None, .. } => {
                write!(f, "not enough consecutive slots: nothing follows the start")
            }
            BookingError::ChainNotAvailable(at) => {
                write!(f, "chain not available: slot at {at} is taken")
            }
            BookingError::ChainRaceLost { slot, orphaned } => {
                write!(f, "slot at {slot} was taken during booking")?;
                write_orphans(f, orphaned)
            }
            BookingError::BookingFailed { reason, orphaned } => {
                write!(f, "booking failed: {reason}")?;
                write_orphans(f, orphaned)
            }
            BookingError::StoreUnavailable(msg) => write!(f, "slot store unavailable: {msg}"),
        }
    }
}

fn write_orphans(f: &mut fmt::Formatter<'_>, orphaned: &[Ulid]) -> fmt::Result {
    if orphaned.is_empty() {
        return Ok(());
    }
    let ids: Vec<String> = orphaned.iter().map(Ulid::to_string).collect();
    write!(f, " (unreleased reservations: {})", ids.join(", "))
}

impl std::error::Error for BookingError {}

impl From<InvalidInput> for BookingError {
    fn from(e: InvalidInput) -> Self {
        BookingError::InvalidInput(e.0)
    }
}

/// Store errors outside the claim loop (listing, service lookup).
impl From<EngineError> for BookingError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::InvalidInput(msg) => BookingError::InvalidInput(msg),
            EngineError::LimitExceeded(what) => BookingError::InvalidInput(what.to_string()),
            EngineError::NotFound(id) => BookingError::InvalidInput(format!("not found: {id}")),
            EngineError::SlotNotAvailable(id) => BookingError::StartNotAvailable(format!("slot {id}")),
            EngineError::StoreUnavailable(msg) => BookingError::StoreUnavailable(msg),
        }
    }
}
