use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::limits::*;

/// Unix milliseconds, used for creation timestamps.
pub type Ms = i64;

/// Whole minutes: slot lengths, breaks, service durations.
pub type Minutes = u32;

const MINUTES_PER_DAY: u32 = 24 * 60;

/// Rejected input, carried up as `InvalidInput` by the store and the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidInput(pub String);

impl fmt::Display for InvalidInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for InvalidInput {}

fn invalid(msg: impl Into<String>) -> InvalidInput {
    InvalidInput(msg.into())
}

/// Parse a strict `YYYY-MM-DD` calendar date.
pub fn parse_date(s: &str) -> Result<NaiveDate, InvalidInput> {
    let b = s.as_bytes();
    let shaped = b.len() == 10
        && b[4] == b'-'
        && b[7] == b'-'
        && b.iter()
            .enumerate()
            .all(|(i, c)| i == 4 || i == 7 || c.is_ascii_digit());
    if !shaped {
        return Err(invalid(format!("bad date '{s}': expected YYYY-MM-DD")));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| invalid(format!("bad date '{s}': no such calendar day")))
}

/// Time of day at minute resolution, stored as minutes since midnight.
///
/// `24:00` is representable so that a window may end at midnight; slots
/// themselves always start before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeOfDay(u16);

impl TimeOfDay {
    pub fn from_minutes(minutes: u32) -> Option<Self> {
        (minutes <= MINUTES_PER_DAY).then_some(Self(minutes as u16))
    }

    pub fn minutes(self) -> u32 {
        u32::from(self.0)
    }

    /// Parse a strict `HH:MM` start time (00:00 through 23:59).
    pub fn parse(s: &str) -> Result<Self, InvalidInput> {
        let t = Self::parse_any(s)?;
        if t.minutes() >= MINUTES_PER_DAY {
            return Err(invalid(format!("bad time '{s}': must be before 24:00")));
        }
        Ok(t)
    }

    /// Like [`TimeOfDay::parse`] but also accepts `24:00`, for window ends.
    pub fn parse_end(s: &str) -> Result<Self, InvalidInput> {
        Self::parse_any(s)
    }

    fn parse_any(s: &str) -> Result<Self, InvalidInput> {
        let b = s.as_bytes();
        let shaped = b.len() == 5
            && b[2] == b':'
            && b.iter().enumerate().all(|(i, c)| i == 2 || c.is_ascii_digit());
        if !shaped {
            return Err(invalid(format!("bad time '{s}': expected HH:MM")));
        }
        let hour = u32::from(b[0] - b'0') * 10 + u32::from(b[1] - b'0');
        let minute = u32::from(b[3] - b'0') * 10 + u32::from(b[4] - b'0');
        if hour > 24 || minute >= 60 || (hour == 24 && minute != 0) {
            return Err(invalid(format!("bad time '{s}': out of range")));
        }
        Ok(Self((hour * 60 + minute) as u16))
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        format_minutes(f, self.minutes())
    }
}

/// `HH:MM` for any minute count; hours past 23 are printed as-is (e.g. `24:30`).
pub fn hhmm(minutes: u32) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

fn format_minutes(f: &mut fmt::Formatter<'_>, minutes: u32) -> fmt::Result {
    write!(f, "{:02}:{:02}", minutes / 60, minutes % 60)
}

// ── Slots & reservations ─────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub id: Ulid,
    pub date: NaiveDate,
    pub time: TimeOfDay,
    /// Max concurrent reservations (>= 1).
    pub capacity: u32,
    pub booked_count: u32,
    /// Administratively taken off sale regardless of remaining capacity.
    pub withdrawn: bool,
}

impl Slot {
    pub fn new(id: Ulid, date: NaiveDate, time: TimeOfDay, capacity: u32) -> Self {
        Self {
            id,
            date,
            time,
            capacity,
            booked_count: 0,
            withdrawn: false,
        }
    }

    pub fn locked(&self) -> bool {
        self.withdrawn || self.booked_count >= self.capacity
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub name: String,
    pub email: String,
    pub phone: String,
}

impl Customer {
    pub fn new(name: impl Into<String>, email: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            phone: phone.into(),
        }
    }

    /// Trim every field and check presence, length and a minimal email shape.
    pub fn validated(self) -> Result<Self, InvalidInput> {
        let name = required("name", &self.name, MAX_CUSTOMER_NAME_LEN)?;
        let email = required("email", &self.email, MAX_EMAIL_LEN)?;
        let phone = required("phone", &self.phone, MAX_PHONE_LEN)?;
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {}
            _ => return Err(invalid(format!("bad email '{email}'"))),
        }
        Ok(Self { name, email, phone })
    }
}

fn required(field: &str, value: &str, max: usize) -> Result<String, InvalidInput> {
    let v = value.trim();
    if v.is_empty() {
        return Err(invalid(format!("{field} is required")));
    }
    if v.len() > max {
        return Err(invalid(format!("{field} too long (max {max})")));
    }
    Ok(v.to_string())
}

/// Output of one successful claim. Date and time are copied from the slot so the
/// record stays meaningful if the slot is later deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub slot_id: Ulid,
    pub date: NaiveDate,
    pub time: TimeOfDay,
    pub customer: Customer,
    pub created_at: Ms,
}

// ── Work plans & services ────────────────────────────────────────

/// Half-open working window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start: TimeOfDay,
    pub end: TimeOfDay,
}

impl Window {
    pub fn new(start: TimeOfDay, end: TimeOfDay) -> Self {
        Self { start, end }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkPlan {
    pub windows: Vec<Window>,
    pub slot_len: Minutes,
    pub break_min: Minutes,
}

impl WorkPlan {
    pub fn validate(&self) -> Result<(), InvalidInput> {
        if self.windows.is_empty() {
            return Err(invalid("work plan needs at least one window"));
        }
        if self.windows.len() > MAX_WINDOWS_PER_PLAN {
            return Err(invalid(format!("too many windows (max {MAX_WINDOWS_PER_PLAN})")));
        }
        if self.slot_len == 0 || self.slot_len > MINUTES_PER_DAY {
            return Err(invalid("slot_len must be between 1 and 1440 minutes"));
        }
        if self.break_min > MINUTES_PER_DAY {
            return Err(invalid("break_min must be at most 1440 minutes"));
        }
        for w in &self.windows {
            if w.start >= w.end {
                return Err(invalid(format!("window {}-{} is empty", w.start, w.end)));
            }
        }
        Ok(())
    }

    /// Parse `"09:00-12:00,13:00-16:00"`.
    pub fn parse_windows(s: &str) -> Result<Vec<Window>, InvalidInput> {
        s.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| {
                let (start, end) = part
                    .split_once('-')
                    .ok_or_else(|| invalid(format!("bad window '{part}': expected HH:MM-HH:MM")))?;
                Ok(Window::new(
                    TimeOfDay::parse(start.trim())?,
                    TimeOfDay::parse_end(end.trim())?,
                ))
            })
            .collect()
    }

    pub fn format_windows(&self) -> String {
        self.windows
            .iter()
            .map(|w| format!("{}-{}", w.start, w.end))
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: Ulid,
    pub name: String,
    pub duration_min: Minutes,
    pub active: bool,
}

// ── Per-day state ────────────────────────────────────────────────

/// One provider's timeline for one calendar day.
#[derive(Debug, Clone)]
pub struct DayState {
    pub date: NaiveDate,
    /// Sorted by `time`; times are unique.
    pub slots: Vec<Slot>,
    pub reservations: Vec<Reservation>,
    pub plan: Option<WorkPlan>,
}

impl DayState {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            slots: Vec::new(),
            reservations: Vec::new(),
            plan: None,
        }
    }

    pub fn slot_at(&self, time: TimeOfDay) -> Option<&Slot> {
        self.slots
            .binary_search_by_key(&time, |s| s.time)
            .ok()
            .map(|i| &self.slots[i])
    }

    pub fn slot(&self, id: Ulid) -> Option<&Slot> {
        self.slots.iter().find(|s| s.id == id)
    }

    pub fn slot_mut(&mut self, id: Ulid) -> Option<&mut Slot> {
        self.slots.iter_mut().find(|s| s.id == id)
    }

    /// Insert a slot, or update capacity (and optionally the withdrawn flag) of
    /// the one already at that time. Returns the id of the stored slot.
    pub fn upsert_slot(&mut self, id: Ulid, time: TimeOfDay, capacity: u32, withdrawn: Option<bool>) -> Ulid {
        match self.slots.binary_search_by_key(&time, |s| s.time) {
            Ok(pos) => {
                let slot = &mut self.slots[pos];
                slot.capacity = capacity;
                if let Some(w) = withdrawn {
                    slot.withdrawn = w;
                }
                slot.id
            }
            Err(pos) => {
                let mut slot = Slot::new(id, self.date, time, capacity);
                slot.withdrawn = withdrawn.unwrap_or(false);
                self.slots.insert(pos, slot);
                id
            }
        }
    }

    pub fn remove_slot(&mut self, id: Ulid) -> Option<Slot> {
        let pos = self.slots.iter().position(|s| s.id == id)?;
        Some(self.slots.remove(pos))
    }

    pub fn remove_reservation(&mut self, id: Ulid) -> Option<Reservation> {
        let pos = self.reservations.iter().position(|r| r.id == id)?;
        Some(self.reservations.remove(pos))
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty() && self.reservations.is_empty() && self.plan.is_none()
    }
}

/// The event types. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    SlotUpserted {
        id: Ulid,
        date: NaiveDate,
        time: TimeOfDay,
        capacity: u32,
        withdrawn: Option<bool>,
    },
    SlotDeleted {
        id: Ulid,
        date: NaiveDate,
    },
    SlotClaimed {
        reservation: Reservation,
    },
    ReservationReleased {
        id: Ulid,
        slot_id: Ulid,
        date: NaiveDate,
    },
    WorkPlanSaved {
        date: NaiveDate,
        plan: WorkPlan,
    },
    ServiceSaved {
        service: Service,
    },
    ServiceDeleted {
        id: Ulid,
    },
}

impl Event {
    /// The day this event mutates, if it is a day-scoped event.
    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            Event::SlotUpserted { date, .. }
            | Event::SlotDeleted { date, .. }
            | Event::ReservationReleased { date, .. }
            | Event::WorkPlanSaved { date, .. } => Some(*date),
            Event::SlotClaimed { reservation } => Some(reservation.date),
            Event::ServiceSaved { .. } | Event::ServiceDeleted { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> TimeOfDay {
        TimeOfDay::parse(s).unwrap()
    }

    fn day() -> NaiveDate {
        parse_date("2025-09-24").unwrap()
    }

    #[test]
    fn date_requires_strict_shape() {
        assert!(parse_date("2025-09-24").is_ok());
        assert!(parse_date("2025-9-24").is_err());
        assert!(parse_date("24.09.2025").is_err());
        assert!(parse_date("2025-02-30").is_err());
        assert!(parse_date("").is_err());
    }

    #[test]
    fn time_requires_strict_shape() {
        assert_eq!(t("09:05").minutes(), 545);
        assert_eq!(t("00:00").minutes(), 0);
        assert!(TimeOfDay::parse("9:05").is_err());
        assert!(TimeOfDay::parse("09:60").is_err());
        assert!(TimeOfDay::parse("24:00").is_err());
        assert!(TimeOfDay::parse("14:30:00").is_err());
        assert_eq!(TimeOfDay::parse_end("24:00").unwrap().minutes(), 1440);
        assert!(TimeOfDay::parse_end("24:01").is_err());
    }

    #[test]
    fn time_display_roundtrips() {
        assert_eq!(t("07:45").to_string(), "07:45");
        assert_eq!(hhmm(1470), "24:30");
    }

    #[test]
    fn customer_fields_are_trimmed_and_required() {
        let c = Customer::new("  Jana ", "jana@example.com ", " 0900 123 456")
            .validated()
            .unwrap();
        assert_eq!(c.name, "Jana");
        assert_eq!(c.email, "jana@example.com");
        assert_eq!(c.phone, "0900 123 456");

        assert!(Customer::new("", "a@b", "1").validated().is_err());
        assert!(Customer::new("A", "no-at-sign", "1").validated().is_err());
        assert!(Customer::new("A", "a@b", "   ").validated().is_err());
        let long = "x".repeat(MAX_CUSTOMER_NAME_LEN + 1);
        assert!(Customer::new(long, "a@b", "1").validated().is_err());
    }

    #[test]
    fn locked_when_full_or_withdrawn() {
        let mut s = Slot::new(Ulid::new(), day(), t("09:00"), 2);
        assert!(!s.locked());
        s.booked_count = 1;
        assert!(!s.locked());
        s.booked_count = 2;
        assert!(s.locked());
        s.booked_count = 0;
        s.withdrawn = true;
        assert!(s.locked());
    }

    #[test]
    fn parse_and_format_windows() {
        let windows = WorkPlan::parse_windows("09:00-12:00, 13:00-24:00").unwrap();
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[1].end.minutes(), 1440);
        let plan = WorkPlan { windows, slot_len: 20, break_min: 0 };
        assert_eq!(plan.format_windows(), "09:00-12:00,13:00-24:00");

        assert!(WorkPlan::parse_windows("09:00").is_err());
        assert!(WorkPlan::parse_windows("09:00-25:00").is_err());
    }

    #[test]
    fn plan_validation() {
        let w = vec![Window::new(t("09:00"), t("12:00"))];
        assert!(WorkPlan { windows: w.clone(), slot_len: 15, break_min: 5 }.validate().is_ok());
        assert!(WorkPlan { windows: w.clone(), slot_len: 0, break_min: 0 }.validate().is_err());
        assert!(WorkPlan { windows: vec![], slot_len: 15, break_min: 0 }.validate().is_err());
        let backwards = vec![Window::new(t("12:00"), t("09:00"))];
        assert!(WorkPlan { windows: backwards, slot_len: 15, break_min: 0 }.validate().is_err());
    }

    #[test]
    fn upsert_keeps_sort_order_and_identity() {
        let mut d = DayState::new(day());
        let a = d.upsert_slot(Ulid::new(), t("10:00"), 1, None);
        d.upsert_slot(Ulid::new(), t("09:00"), 1, None);
        d.upsert_slot(Ulid::new(), t("11:00"), 1, None);
        let times: Vec<_> = d.slots.iter().map(|s| s.time.to_string()).collect();
        assert_eq!(times, ["09:00", "10:00", "11:00"]);

        // Same key: capacity refreshed, id kept, withdrawn untouched when None
        d.slot_mut(a).unwrap().withdrawn = true;
        let again = d.upsert_slot(Ulid::new(), t("10:00"), 3, None);
        assert_eq!(again, a);
        assert_eq!(d.slots.len(), 3);
        assert_eq!(d.slot(a).unwrap().capacity, 3);
        assert!(d.slot(a).unwrap().withdrawn);

        d.upsert_slot(Ulid::new(), t("10:00"), 3, Some(false));
        assert!(!d.slot(a).unwrap().withdrawn);
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::SlotClaimed {
            reservation: Reservation {
                id: Ulid::new(),
                slot_id: Ulid::new(),
                date: day(),
                time: t("09:20"),
                customer: Customer::new("A", "a@b", "1"),
                created_at: 1_700_000_000_000,
            },
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
