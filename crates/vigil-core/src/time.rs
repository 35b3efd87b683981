//! Time sources and the ledger's timestamp encoding.
//!
//! All persisted timestamps are RFC 3339 UTC strings with microsecond
//! precision and a `Z` suffix (`2025-03-01T12:00:00.000000Z`). Because every
//! row uses the same fixed-width encoding, lexicographic order in `SQLite`
//! equals chronological order, which the `(timestamp, id)` ordering and the
//! whole-day date bounds rely on.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, TimeDelta, Utc};

use crate::error::LedgerError;

/// Date format accepted for `date_from` / `date_to` bounds.
pub const DAY_FORMAT: &str = "%Y-%m-%d";

/// Abstraction over wall-clock time so tests can pin "now".
pub trait Clock: Send + Sync + fmt::Debug {
    /// Returns the current UTC time.
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A manually driven clock.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    /// Creates a clock frozen at `now`.
    #[must_use]
    pub const fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Moves the clock to `now`.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    /// Moves the clock forward by `delta`.
    pub fn advance(&self, delta: TimeDelta) {
        let mut guard = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *guard += delta;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Encodes a timestamp in the ledger's storage format.
#[must_use]
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Encodes a timestamp at second precision, used for export stamps.
#[must_use]
pub fn format_timestamp_secs(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parses a caller-supplied RFC 3339 timestamp with any offset and
/// re-encodes it in the storage format.
///
/// # Errors
///
/// Returns `InvalidArgument` if `raw` is not RFC 3339.
pub fn normalize_timestamp(raw: &str) -> Result<String, LedgerError> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|dt| format_timestamp(dt.with_timezone(&Utc)))
        .map_err(|e| LedgerError::invalid("timestamp", format!("'{raw}' is not RFC 3339: {e}")))
}

/// Parses a `YYYY-MM-DD` day.
///
/// # Errors
///
/// Returns `InvalidArgument` naming `field` if the value is malformed.
pub fn parse_day(raw: &str, field: &'static str) -> Result<NaiveDate, LedgerError> {
    NaiveDate::parse_from_str(raw.trim(), DAY_FORMAT)
        .map_err(|_| LedgerError::invalid(field, format!("'{raw}' is not a YYYY-MM-DD date")))
}

/// First instant of `day` in UTC (`00:00:00.000000`).
#[must_use]
pub fn day_start(day: NaiveDate) -> String {
    format_timestamp(day.and_time(NaiveTime::MIN).and_utc())
}

/// Last instant of `day` in UTC: one microsecond before the next midnight.
#[must_use]
pub fn day_end(day: NaiveDate) -> String {
    day.and_hms_micro_opt(23, 59, 59, 999_999)
        .map_or_else(|| day_start(day), |dt| format_timestamp(dt.and_utc()))
}
