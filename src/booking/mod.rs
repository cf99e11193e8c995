//! Booking orchestration on top of a [`SlotStore`].
//!
//! A booking longer than one slot is a chain of independent atomic claims.
//! If any claim fails, the claims already made are released in reverse order
//! so the day ends up as it was before the attempt.

pub mod chain;
mod error;

pub use error::BookingError;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use tracing::{debug, error, info, warn};
use ulid::Ulid;

use crate::engine::{EngineError, SlotStore};
use crate::gate::AbuseGate;
use crate::limits::*;
use crate::model::*;
use crate::notify::{self, CalendarEvent, Message, Notifier};
use crate::observability::{
    BOOKINGS_TOTAL, BOOKING_DURATION_SECONDS, COMPENSATION_FAILURES_TOTAL, COMPENSATIONS_TOTAL,
};

#[derive(Debug, Clone)]
pub struct BookingPolicy {
    /// Release attempts per reservation when compensating (at least one).
    pub compensation_attempts: u32,
    /// Reported duration of a booking made by slot id.
    pub single_slot_minutes: Minutes,
    /// Shown in confirmations.
    pub location: String,
    /// IANA zone name written into calendar attachments.
    pub timezone: Option<String>,
    /// Receives a notice for every new booking.
    pub provider_email: Option<String>,
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self {
            compensation_attempts: 3,
            single_slot_minutes: 60,
            location: String::new(),
            timezone: None,
            provider_email: None,
        }
    }
}

/// How long a chain booking runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Length {
    Minutes(Minutes),
    /// Duration taken from an active service.
    Service(Ulid),
}

#[derive(Debug, Clone)]
pub struct ChainRequest {
    pub date: NaiveDate,
    pub start: TimeOfDay,
    pub length: Length,
    pub customer: Customer,
    pub token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SlotRequest {
    pub slot_id: Ulid,
    pub customer: Customer,
    pub token: Option<String>,
}

/// A confirmed booking: every reservation that makes it up, in time order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingConfirmation {
    pub date: NaiveDate,
    pub start: TimeOfDay,
    pub duration_min: Minutes,
    pub reservations: Vec<Reservation>,
}

impl BookingConfirmation {
    /// Minutes since midnight; may run past 24:00.
    pub fn end_minute(&self) -> u32 {
        self.start.minutes() + self.duration_min
    }

    pub fn reservation_ids(&self) -> Vec<Ulid> {
        self.reservations.iter().map(|r| r.id).collect()
    }
}

pub struct BookingService<S: SlotStore> {
    store: Arc<S>,
    gate: Arc<dyn AbuseGate>,
    notifier: Arc<dyn Notifier>,
    policy: Arc<BookingPolicy>,
}

impl<S: SlotStore> Clone for BookingService<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            gate: self.gate.clone(),
            notifier: self.notifier.clone(),
            policy: self.policy.clone(),
        }
    }
}

impl<S: SlotStore> BookingService<S> {
    pub fn new(
        store: Arc<S>,
        gate: Arc<dyn AbuseGate>,
        notifier: Arc<dyn Notifier>,
        policy: BookingPolicy,
    ) -> Self {
        Self {
            store,
            gate,
            notifier,
            policy: Arc::new(policy),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Book `length` starting at `start` by claiming consecutive slots.
    ///
    /// Once verification passes, the claims run in their own task: dropping
    /// the returned future does not stop a half-made chain from being
    /// completed or compensated.
    pub async fn book_chain(&self, req: ChainRequest) -> Result<BookingConfirmation, BookingError> {
        let customer = req.customer.validated()?;
        if let Length::Minutes(minutes) = req.length {
            check_duration(minutes)?;
        }
        self.verify(req.token.as_deref()).await?;
        let duration = self.resolve_length(req.length).await?;

        let this = self.clone();
        let (date, start) = (req.date, req.start);
        let task = tokio::spawn(async move { this.run_chain(date, start, duration, customer).await });
        match task.await {
            Ok(result) => result,
            Err(e) => Err(BookingError::BookingFailed {
                reason: format!("booking task ended abnormally: {e}"),
                orphaned: Vec::new(),
            }),
        }
    }

    /// Book one slot by id.
    pub async fn book_slot(&self, req: SlotRequest) -> Result<BookingConfirmation, BookingError> {
        let customer = req.customer.validated()?;
        self.verify(req.token.as_deref()).await?;

        let started = Instant::now();
        let result = match self.store.claim(req.slot_id, &customer).await {
            Ok(reservation) => Ok(BookingConfirmation {
                date: reservation.date,
                start: reservation.time,
                duration_min: self.policy.single_slot_minutes,
                reservations: vec![reservation],
            }),
            Err(EngineError::SlotNotAvailable(id)) => {
                Err(BookingError::StartNotAvailable(format!("slot {id}")))
            }
            Err(EngineError::InvalidInput(msg)) => Err(BookingError::InvalidInput(msg)),
            Err(e) => Err(BookingError::BookingFailed {
                reason: e.to_string(),
                orphaned: Vec::new(),
            }),
        };
        self.finish(result, started)
    }

    /// Start times on `date` from which `length` can currently be booked.
    pub async fn available_starts(&self, date: NaiveDate, length: Length) -> Result<Vec<TimeOfDay>, BookingError> {
        if let Length::Minutes(minutes) = length {
            check_duration(minutes)?;
        }
        let duration = self.resolve_length(length).await?;
        let slots = self
            .store
            .list_by_date(date)
            .await
            .map_err(|e| BookingError::StoreUnavailable(e.to_string()))?;
        Ok(chain::available_starts(&slots, duration))
    }

    async fn verify(&self, token: Option<&str>) -> Result<(), BookingError> {
        if token.is_some_and(|t| t.len() > MAX_TOKEN_LEN) {
            return Err(BookingError::InvalidInput("verification token too long".into()));
        }
        if self.gate.verify(token).await {
            Ok(())
        } else {
            metrics::counter!(BOOKINGS_TOTAL, "outcome" => "verification_failed").increment(1);
            Err(BookingError::VerificationFailed)
        }
    }

    async fn resolve_length(&self, length: Length) -> Result<Minutes, BookingError> {
        match length {
            Length::Minutes(minutes) => Ok(minutes),
            Length::Service(id) => match self.store.service(id).await? {
                Some(service) if service.active => Ok(service.duration_min),
                Some(_) => Err(BookingError::InvalidInput(format!("service {id} is not active"))),
                None => Err(BookingError::InvalidInput(format!("unknown service {id}"))),
            },
        }
    }

    async fn run_chain(
        &self,
        date: NaiveDate,
        start: TimeOfDay,
        duration: Minutes,
        customer: Customer,
    ) -> Result<BookingConfirmation, BookingError> {
        let started = Instant::now();
        let result = self.claim_chain(date, start, duration, &customer).await;
        self.finish(result, started)
    }

    async fn claim_chain(
        &self,
        date: NaiveDate,
        start: TimeOfDay,
        duration: Minutes,
        customer: &Customer,
    ) -> Result<BookingConfirmation, BookingError> {
        let slots = self
            .store
            .list_by_date(date)
            .await
            .map_err(|e| BookingError::StoreUnavailable(e.to_string()))?;
        let plan = chain::plan_chain(&slots, start, duration)?;
        debug!(%date, %start, duration, need = plan.need(), step = plan.step, "claiming chain");

        let mut claimed: Vec<Reservation> = Vec::with_capacity(plan.need());
        for slot in &plan.slots {
            match self.store.claim(slot.id, customer).await {
                Ok(reservation) => claimed.push(reservation),
                Err(e) => {
                    let ids: Vec<Ulid> = claimed.iter().map(|r| r.id).collect();
                    warn!(%date, %start, at = %slot.time, error = %e, claimed = ids.len(), "chain claim failed, compensating");
                    let orphaned = self.compensate(&ids).await;
                    return Err(match e {
                        EngineError::SlotNotAvailable(_) => BookingError::ChainRaceLost {
                            slot: slot.time,
                            orphaned,
                        },
                        other => BookingError::BookingFailed {
                            reason: other.to_string(),
                            orphaned,
                        },
                    });
                }
            }
        }

        Ok(BookingConfirmation {
            date,
            start,
            duration_min: duration,
            reservations: claimed,
        })
    }

    /// Release `reservation_ids` newest first. Returns the ids that could not
    /// be released, in claim order.
    pub(crate) async fn compensate(&self, reservation_ids: &[Ulid]) -> Vec<Ulid> {
        if reservation_ids.is_empty() {
            return Vec::new();
        }
        metrics::counter!(COMPENSATIONS_TOTAL).increment(1);

        let mut orphaned = Vec::new();
        for &id in reservation_ids.iter().rev() {
            if !self.release_with_retry(id).await {
                orphaned.push(id);
            }
        }
        orphaned.reverse();

        if !orphaned.is_empty() {
            metrics::counter!(COMPENSATION_FAILURES_TOTAL).increment(orphaned.len() as u64);
            let ids: Vec<String> = orphaned.iter().map(Ulid::to_string).collect();
            error!(orphaned = %ids.join(","), "compensation incomplete; reservations need manual release");
        }
        orphaned
    }

    /// An already-released reservation counts as released.
    async fn release_with_retry(&self, id: Ulid) -> bool {
        let attempts = self.policy.compensation_attempts.max(1);
        for attempt in 1..=attempts {
            match self.store.release(id).await {
                Ok(_) => return true,
                Err(e) => {
                    warn!(%id, attempt, error = %e, "compensating release failed");
                    if attempt < attempts {
                        tokio::time::sleep(Duration::from_millis(25 * u64::from(attempt))).await;
                    }
                }
            }
        }
        false
    }

    fn finish(
        &self,
        result: Result<BookingConfirmation, BookingError>,
        started: Instant,
    ) -> Result<BookingConfirmation, BookingError> {
        let outcome = match &result {
            Ok(_) => "confirmed",
            Err(e) => e.kind(),
        };
        metrics::counter!(BOOKINGS_TOTAL, "outcome" => outcome).increment(1);
        metrics::histogram!(BOOKING_DURATION_SECONDS).record(started.elapsed().as_secs_f64());

        if let Ok(confirmation) = &result {
            info!(
                date = %confirmation.date,
                start = %confirmation.start,
                duration = confirmation.duration_min,
                slots = confirmation.reservations.len(),
                "booking confirmed"
            );
            self.send_confirmation(confirmation);
        }
        result
    }

    /// Fire-and-forget; the booking result never depends on delivery.
    fn send_confirmation(&self, confirmation: &BookingConfirmation) {
        let messages = [
            confirmation_message(confirmation, &self.policy),
            provider_notice(confirmation, &self.policy),
        ];
        for message in messages.into_iter().flatten() {
            let notifier = self.notifier.clone();
            tokio::spawn(async move {
                if let Err(e) = notifier.notify(message).await {
                    warn!("{e}");
                }
            });
        }
    }
}

fn check_duration(minutes: Minutes) -> Result<(), BookingError> {
    if minutes == 0 || minutes > MAX_DURATION_MIN {
        return Err(BookingError::InvalidInput(format!(
            "duration must be between 1 and {MAX_DURATION_MIN} minutes"
        )));
    }
    Ok(())
}

/// Customer-facing confirmation with a calendar attachment.
pub fn confirmation_message(confirmation: &BookingConfirmation, policy: &BookingPolicy) -> Option<Message> {
    let first = confirmation.reservations.first()?;
    let customer = &first.customer;
    let start = confirmation.date.and_time(chrono::NaiveTime::MIN)
        + chrono::Duration::minutes(i64::from(confirmation.start.minutes()));
    let end = start + chrono::Duration::minutes(i64::from(confirmation.duration_min));

    let summary = format!("Reservation {} {}", confirmation.date, confirmation.start);
    let description = format!(
        "{} ({}, {}), {} min",
        customer.name, customer.email, customer.phone, confirmation.duration_min
    );
    let attachment = notify::calendar_attachment(&CalendarEvent {
        uid: format!("{}@slotchain", first.id),
        start,
        end,
        summary: &summary,
        description: &description,
        location: &policy.location,
        timezone: policy.timezone.as_deref(),
    });

    let mut body = format!(
        "Hello {},\n\nyour reservation is confirmed for {} from {} to {} ({} min).\n",
        customer.name,
        confirmation.date,
        confirmation.start,
        hhmm(confirmation.end_minute()),
        confirmation.duration_min
    );
    if !policy.location.is_empty() {
        body.push_str(&format!("Location: {}\n", policy.location));
    }
    body.push_str(&format!("Reference: {}\n", first.id));

    Some(Message {
        to: customer.email.clone(),
        subject: format!("Reservation confirmed: {} {}", confirmation.date, confirmation.start),
        body,
        attachment: Some(attachment),
    })
}

/// Provider-facing notice of a new booking, when a provider address is set.
pub fn provider_notice(confirmation: &BookingConfirmation, policy: &BookingPolicy) -> Option<Message> {
    let to = policy.provider_email.clone()?;
    let customer = &confirmation.reservations.first()?.customer;
    let slots: Vec<String> = confirmation
        .reservations
        .iter()
        .map(|r| format!("  {} ({})", r.time, r.id))
        .collect();
    let body = format!(
        "New reservation on {} from {} to {} ({} min).\n\nName: {}\nEmail: {}\nPhone: {}\n\nSlots:\n{}\n",
        confirmation.date,
        confirmation.start,
        hhmm(confirmation.end_minute()),
        confirmation.duration_min,
        customer.name,
        customer.email,
        customer.phone,
        slots.join("\n")
    );
    Some(Message {
        to,
        subject: format!("New reservation: {} {}", confirmation.date, confirmation.start),
        body,
        attachment: None,
    })
}
