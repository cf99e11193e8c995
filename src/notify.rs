use std::fmt;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub content: String,
}

/// A confirmation handed to whatever delivers mail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachment: Option<Attachment>,
}

#[derive(Debug, Clone)]
pub struct NotifyError(pub String);

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "notification failed: {}", self.0)
    }
}

impl std::error::Error for NotifyError {}

/// Outbound notification channel. Callers never wait on it for a booking
/// result; errors are only logged.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: Message) -> Result<(), NotifyError>;
}

/// Broadcast hub for booking confirmations. Mail relays subscribe to it.
pub struct NotifyHub {
    sender: broadcast::Sender<Message>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            sender: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl Notifier for NotifyHub {
    /// No-op if nobody is listening.
    async fn notify(&self, message: Message) -> Result<(), NotifyError> {
        let _ = self.sender.send(message);
        Ok(())
    }
}

/// Writes confirmations to the log instead of delivering them.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, message: Message) -> Result<(), NotifyError> {
        tracing::info!(to = %message.to, subject = %message.subject, "confirmation (log only)");
        Ok(())
    }
}

// ── iCalendar ────────────────────────────────────────────────────

/// One VEVENT. Times are wall-clock; with `timezone` set they are emitted
/// with a TZID parameter, otherwise as floating local times.
#[derive(Debug, Clone)]
pub struct CalendarEvent<'a> {
    pub uid: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub summary: &'a str,
    pub description: &'a str,
    pub location: &'a str,
    pub timezone: Option<&'a str>,
}

const ICS_FORMAT: &str = "%Y%m%dT%H%M%S";

/// Render a single-event calendar as an `.ics` attachment.
pub fn calendar_attachment(event: &CalendarEvent<'_>) -> Attachment {
    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%SZ");
    let when = |t: NaiveDateTime, key: &str| match event.timezone {
        Some(tz) => format!("{key};TZID={tz}:{}", t.format(ICS_FORMAT)),
        None => format!("{key}:{}", t.format(ICS_FORMAT)),
    };

    let mut lines = vec![
        "BEGIN:VCALENDAR".to_string(),
        "VERSION:2.0".to_string(),
        "PRODID:-//slotchain//booking//EN".to_string(),
        "METHOD:PUBLISH".to_string(),
        "BEGIN:VEVENT".to_string(),
        format!("UID:{}", event.uid),
        format!("DTSTAMP:{stamp}"),
        when(event.start, "DTSTART"),
        when(event.end, "DTEND"),
        format!("SUMMARY:{}", ics_escape(event.summary)),
    ];
    if !event.description.is_empty() {
        lines.push(format!("DESCRIPTION:{}", ics_escape(event.description)));
    }
    if !event.location.is_empty() {
        lines.push(format!("LOCATION:{}", ics_escape(event.location)));
    }
    lines.push("END:VEVENT".to_string());
    lines.push("END:VCALENDAR".to_string());

    let mut content = lines.join("\r\n");
    content.push_str("\r\n");
    Attachment {
        filename: "reservation.ics".to_string(),
        content_type: "text/calendar; charset=utf-8; method=PUBLISH".to_string(),
        content,
    }
}

fn ics_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            c => out.push(c),
        }
    }
    out
}
