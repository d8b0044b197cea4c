//! Station-local calendar arithmetic
//!
//! History samples live on a 5-minute grid aligned to the station's local
//! time, and daily summaries reset at local midnight.

use crate::types::Timestamp;
use chrono::{DateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;

/// History bucket width in seconds
pub const BUCKET_SECONDS: i64 = 300;

const DAY_SECONDS: i64 = 86_400;

/// Parse an IANA timezone name; blank or unknown names yield `None`
pub fn parse_timezone(name: &str) -> Option<Tz> {
    name.trim().parse::<Tz>().ok()
}

fn to_local(ts: Timestamp, tz: Tz) -> Option<DateTime<Tz>> {
    Utc.timestamp_opt(ts, 0).single().map(|dt| dt.with_timezone(&tz))
}

/// Seconds the local clock is ahead of UTC at `ts`
pub fn utc_offset(ts: Timestamp, tz: Tz) -> i64 {
    to_local(ts, tz)
        .map(|dt| i64::from(dt.offset().fix().local_minus_utc()))
        .unwrap_or(0)
}

/// Nearest local 5-minute grid point. Samples in the last 2.5 minutes of a
/// local day therefore land on the next day's 00:00.
pub fn bucket_of(ts: Timestamp, tz: Tz) -> Timestamp {
    let offset = utc_offset(ts, tz);
    let local = ts + offset;
    let rounded = (local + BUCKET_SECONDS / 2).div_euclid(BUCKET_SECONDS) * BUCKET_SECONDS;
    rounded - offset
}

/// Start of the local day containing `ts`
pub fn local_midnight(ts: Timestamp, tz: Tz) -> Timestamp {
    let exact = to_local(ts, tz)
        .and_then(|dt| dt.date_naive().and_hms_opt(0, 0, 0))
        .and_then(|midnight| tz.from_local_datetime(&midnight).earliest())
        .map(|dt| dt.timestamp());

    exact.unwrap_or_else(|| {
        let offset = utc_offset(ts, tz);
        (ts + offset).div_euclid(DAY_SECONDS) * DAY_SECONDS - offset
    })
}
