use chrono::{Duration, FixedOffset, NaiveDateTime, Offset, Utc};
use log::*;

use crate::{AnalyzeError, Result};

/// Format of the `#timestamp` column.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Parse a `YYYY-MM-DD HH:MM:SS` timestamp.
pub fn parse_timestamp(timestamp: &str) -> Result<NaiveDateTime>
{
    NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT).map_err(|_| AnalyzeError::Timestamp(timestamp.to_string()))
}

/// Parse either the ISO form the engine sends (`2019-07-22T13:55:00.000Z`)
/// or the `#timestamp` form.
fn parse_any(timestamp: &str) -> Result<NaiveDateTime>
{
    NaiveDateTime::parse_from_str(timestamp, ISO_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT))
        .map_err(|_| AnalyzeError::Timestamp(timestamp.to_string()))
}

/// `UTC` or `GMT+hh:mm` / `GMT-hh:mm`.
pub fn parse_timezone(timezone: &str) -> Result<FixedOffset>
{
    let invalid = || AnalyzeError::Timezone(timezone.to_string());
    if timezone.eq_ignore_ascii_case("UTC") || timezone.eq_ignore_ascii_case("GMT")
    {
        return Ok(Utc.fix());
    }
    let offset = timezone.strip_prefix("GMT").ok_or_else(invalid)?;
    let (sign, hours_minutes) = match offset.as_bytes().first()
    {
        Some(b'+') => (1, &offset[1..]),
        Some(b'-') => (-1, &offset[1..]),
        _ => return Err(invalid()),
    };
    let (hours, minutes) = hours_minutes.split_once(':').ok_or_else(invalid)?;
    let digits = |text: &str| -> Result<i32> {
        if text.is_empty() || text.len() > 2 || !text.bytes().all(|byte| byte.is_ascii_digit()) { return Err(invalid()) };
        text.parse().map_err(|_| invalid())
    };
    let hours = digits(hours)?;
    let minutes = digits(minutes)?;
    if minutes >= 60 { return Err(invalid()) };
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

/// Convert a UTC timestamp into local time at `offset`, as `#timestamp` text.
pub fn convert_from_utc(
    timestamp: &str,
    offset: FixedOffset,
) -> Result<String>
{
    let utc = parse_any(timestamp)?;
    let local = utc + Duration::seconds(i64::from(offset.local_minus_utc()));
    debug!("timestamp {} utc -> {} {}", timestamp, local, offset);
    Ok(local.format(TIMESTAMP_FORMAT).to_string())
}
