//! Process configuration, read once at startup from `SLOTCHAIN_*` variables.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::booking::BookingPolicy;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub bind: String,
    pub data_dir: PathBuf,
    /// Password for customer sessions (any user name but the admin's).
    pub password: String,
    pub admin_user: String,
    pub admin_password: String,
    pub max_connections: usize,
    /// WAL appends between compactions.
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    pub tls_cert: Option<String>,
    pub tls_key: Option<String>,
    /// Enables Turnstile verification when set.
    pub turnstile_secret: Option<String>,
    pub booking: BookingPolicy,
}

#[derive(Debug)]
pub struct ConfigError {
    pub var: &'static str,
    pub reason: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.var, self.reason)
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys take their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let text = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = BookingPolicy::default();

        let config = Self {
            port: parsed(&text, "SLOTCHAIN_PORT")?.unwrap_or(5433),
            bind: text("SLOTCHAIN_BIND").unwrap_or_else(|| "0.0.0.0".into()),
            data_dir: PathBuf::from(text("SLOTCHAIN_DATA_DIR").unwrap_or_else(|| "./data".into())),
            password: text("SLOTCHAIN_PASSWORD").unwrap_or_else(|| "slotchain".into()),
            admin_user: text("SLOTCHAIN_ADMIN_USER").unwrap_or_else(|| "admin".into()),
            admin_password: text("SLOTCHAIN_ADMIN_PASSWORD").unwrap_or_else(|| "admin".into()),
            max_connections: parsed(&text, "SLOTCHAIN_MAX_CONNECTIONS")?.unwrap_or(256),
            compact_threshold: parsed(&text, "SLOTCHAIN_COMPACT_THRESHOLD")?.unwrap_or(1000),
            metrics_port: parsed(&text, "SLOTCHAIN_METRICS_PORT")?,
            tls_cert: text("SLOTCHAIN_TLS_CERT"),
            tls_key: text("SLOTCHAIN_TLS_KEY"),
            turnstile_secret: text("SLOTCHAIN_TURNSTILE_SECRET"),
            booking: BookingPolicy {
                compensation_attempts: parsed(&text, "SLOTCHAIN_COMPENSATION_ATTEMPTS")?
                    .unwrap_or(defaults.compensation_attempts),
                single_slot_minutes: parsed(&text, "SLOTCHAIN_SINGLE_SLOT_MINUTES")?
                    .unwrap_or(defaults.single_slot_minutes),
                location: text("SLOTCHAIN_LOCATION").unwrap_or(defaults.location),
                timezone: text("SLOTCHAIN_TIMEZONE").or(defaults.timezone),
                provider_email: text("SLOTCHAIN_PROVIDER_EMAIL").or(defaults.provider_email),
            },
        };

        if config.max_connections == 0 {
            return Err(ConfigError {
                var: "SLOTCHAIN_MAX_CONNECTIONS",
                reason: "must be at least 1".into(),
            });
        }
        if config.booking.compensation_attempts == 0 {
            return Err(ConfigError {
                var: "SLOTCHAIN_COMPENSATION_ATTEMPTS",
                reason: "must be at least 1".into(),
            });
        }
        Ok(config)
    }
}

fn parsed<T: FromStr>(
    text: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T::Err: fmt::Display,
{
    text(var)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| ConfigError {
                var,
                reason: format!("cannot parse '{raw}': {e}"),
            })
        })
        .transpose()
}
