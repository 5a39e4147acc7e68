//! Snapshot timestamps.
//!
//! pfctl reports its "Cleared" marker in ctime form, saved samples carry
//! ISO strings or raw epoch seconds, and live captures use the wall clock.
//! All of them must compare and subtract cleanly, so everything is folded
//! into one naive-local instant with microsecond precision.

use chrono::{DateTime, Local, NaiveDateTime, TimeDelta};
use chrono::Timelike;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("unrecognized timestamp: {input:?}")]
pub struct TimestampParseError {
    pub input: String,
}

/// An absolute point in time, local-naive, microsecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(NaiveDateTime);

impl Timestamp {
    /// Current wall-clock time.
    pub fn now() -> Self {
        Self(Local::now().naive_local())
    }

    /// Parse any of the accepted textual forms, tried in order:
    /// epoch seconds (float), ISO `YYYY-MM-DDTHH:MM:SS[.ffffff]`, then
    /// ctime `"Www Mon  d HH:MM:SS[ TZ] YYYY"`.
    pub fn parse(input: &str) -> Result<Self, TimestampParseError> {
        let trimmed = input.trim();

        if let Ok(epoch) = trimmed.parse::<f64>() {
            return Self::from_epoch(epoch).ok_or_else(|| TimestampParseError {
                input: input.to_string(),
            });
        }

        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f") {
            return Ok(Self(dt));
        }

        if let Some(ts) = Self::parse_ctime(trimmed) {
            return Ok(ts);
        }

        Err(TimestampParseError {
            input: input.to_string(),
        })
    }

    /// Epoch seconds via the local timezone. Returns `None` only for
    /// values outside chrono's representable range.
    pub fn from_epoch(seconds: f64) -> Option<Self> {
        let micros = (seconds * 1_000_000.0).round() as i64;
        let utc = DateTime::from_timestamp_micros(micros)?;
        Some(Self(utc.with_timezone(&Local).naive_local()))
    }

    /// ctime form, e.g. `Fri Apr 22 14:22:28 2016`. pfctl pads single-digit
    /// days with a second space, and some variants carry a timezone token
    /// before the year; the token is accepted and dropped (the instant stays
    /// naive, matching how the rest of the tool treats time).
    fn parse_ctime(input: &str) -> Option<Self> {
        let mut tokens: Vec<&str> = input.split_whitespace().collect();
        if tokens.len() == 6 {
            tokens.remove(4); // timezone abbreviation
        }
        if tokens.len() != 5 {
            return None;
        }
        let normalized = tokens.join(" ");
        NaiveDateTime::parse_from_str(&normalized, "%a %b %e %H:%M:%S %Y")
            .ok()
            .map(Self)
    }

    /// Canonical ISO form. The fraction is emitted only when non-zero and
    /// no timezone suffix is ever produced.
    pub fn format(&self) -> String {
        let base = self.0.format("%Y-%m-%dT%H:%M:%S");
        let micros = self.0.nanosecond() / 1_000;
        if micros == 0 {
            base.to_string()
        } else {
            format!("{}.{:06}", base, micros)
        }
    }

    /// Signed elapsed seconds since `earlier`, exact to the microsecond.
    pub fn seconds_since(&self, earlier: &Timestamp) -> f64 {
        let delta = self.0 - earlier.0;
        match delta.num_microseconds() {
            Some(us) => us as f64 / 1_000_000.0,
            None => delta.num_milliseconds() as f64 / 1_000.0,
        }
    }
}

impl std::ops::Sub for Timestamp {
    type Output = TimeDelta;

    fn sub(self, rhs: Self) -> TimeDelta {
        self.0 - rhs.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format())
    }
}
