//! Parsing of the device-local timestamps attached to `received` events.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};

/// Parse a device timestamp into UTC.
///
/// Accepts RFC 3339 and the modem's `yy/MM/dd,HH:mm:ss±zz` form, where `zz`
/// is the zone offset in quarter hours (`+04` is UTC+1). Surrounding quotes
/// are ignored. Returns `None` for anything else.
pub fn parse_device_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim().trim_matches('"');
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    parse_modem(raw)
}

fn parse_modem(raw: &str) -> Option<DateTime<Utc>> {
    // The zone sign is the last '+' or '-' after the date/time comma.
    let comma = raw.find(',')?;
    let sign_at = comma + raw[comma..].rfind(['+', '-'])?;
    let (local, zone) = raw.split_at(sign_at);

    let quarters: i32 = zone.parse().ok()?;
    let offset = FixedOffset::east_opt(quarters.checked_mul(15 * 60)?)?;
    let naive = NaiveDateTime::parse_from_str(local, "%y/%m/%d,%H:%M:%S").ok()?;

    naive
        .and_local_timezone(offset)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}
