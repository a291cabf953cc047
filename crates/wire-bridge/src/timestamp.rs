//! Wire-level expiry timestamp.
//!
//! Stored internally as milliseconds since the Unix epoch, following the
//! same "small numeric wrapper with custom (de)serialization" idiom as the
//! teacher's `UnixTimestamp`; the RFC3339 conversion is hand-rolled rather
//! than pulled from a date-time crate, since none of the chain adapters need
//! one either.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A prepare's `expiresAt`, millisecond-precision, UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Expiry(pub u64);

impl Expiry {
    pub fn now_plus_millis(millis: u64) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Expiry(now + millis)
    }

    pub fn has_passed(&self) -> bool {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        now >= self.0
    }

    /// Shrinks expiry by one second, applied when forwarding a prepare one
    /// hop further upstream.
    pub fn shrink_by_one_second(&self) -> Self {
        Expiry(self.0.saturating_sub(1_000))
    }

    pub fn to_rfc3339(self) -> String {
        let total_secs = self.0 / 1_000;
        let millis = self.0 % 1_000;
        let days = (total_secs / 86_400) as i64;
        let secs_of_day = total_secs % 86_400;
        let (year, month, day) = civil_from_days(days);
        let hour = secs_of_day / 3_600;
        let minute = (secs_of_day % 3_600) / 60;
        let second = secs_of_day % 60;
        format!(
            "{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}.{millis:03}Z"
        )
    }

    pub fn from_rfc3339(s: &str) -> Option<Self> {
        let s = s.trim_end_matches('Z');
        let (date, time) = s.split_once('T')?;
        let mut date_parts = date.split('-');
        let year: i64 = date_parts.next()?.parse().ok()?;
        let month: i64 = date_parts.next()?.parse().ok()?;
        let day: i64 = date_parts.next()?.parse().ok()?;

        let (hms, millis) = match time.split_once('.') {
            Some((hms, frac)) => (hms, frac.get(0..3).unwrap_or(frac).parse().unwrap_or(0)),
            None => (time, 0u64),
        };
        let mut time_parts = hms.split(':');
        let hour: u64 = time_parts.next()?.parse().ok()?;
        let minute: u64 = time_parts.next()?.parse().ok()?;
        let second: u64 = time_parts.next()?.parse().ok()?;

        let days = days_from_civil(year, month, day);
        let total_secs = (days * 86_400) as u64 + hour * 3_600 + minute * 60 + second;
        Some(Expiry(total_secs * 1_000 + millis))
    }
}

impl fmt::Display for Expiry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_rfc3339())
    }
}

impl Serialize for Expiry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_rfc3339())
    }
}

impl<'de> Deserialize<'de> for Expiry {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Expiry::from_rfc3339(&s).ok_or_else(|| serde::de::Error::custom("invalid RFC3339 timestamp"))
    }
}

/// Howard Hinnant's `civil_from_days`, adapted to return `(year, month, day)`.
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let year = if m <= 2 { y + 1 } else { y };
    (year, m, d)
}

/// Inverse of [`civil_from_days`].
fn days_from_civil(y: i64, m: i64, d: i64) -> i64 {
    let y = if m <= 2 { y - 1 } else { y };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = (y - era * 400) as u64;
    let mp = if m > 2 { m - 3 } else { m + 9 } as u64;
    let doy = (153 * mp + 2) / 5 + d as u64 - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe as i64 - 719_468
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_rfc3339() {
        let expiry = Expiry(1_700_000_000_000);
        let formatted = expiry.to_rfc3339();
        let parsed = Expiry::from_rfc3339(&formatted).unwrap();
        assert_eq!(expiry, parsed);
    }

    #[test]
    fn shrink_by_one_second_subtracts_exactly_one_thousand_millis() {
        let expiry = Expiry(10_000);
        assert_eq!(expiry.shrink_by_one_second(), Expiry(9_000));
    }

    #[test]
    fn known_instant_formats_as_expected() {
        // 2023-11-14T22:13:20.000Z
        let expiry = Expiry(1_700_000_000_000);
        assert_eq!(expiry.to_rfc3339(), "2023-11-14T22:13:20.000Z");
    }
}
