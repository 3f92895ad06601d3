use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time};

const CSV_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
const DAY_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");
const DAY_TIME_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");

/// Which end of a day a bare `YYYY-MM-DD` should land on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DayBound {
    Start,
    End,
}

/// Parse `YYYY-MM-DD` or `YYYY-MM-DDTHH:MM:SS` (UTC) into unix seconds.
pub fn parse_unix(s: &str, bound: DayBound) -> Result<i64, String> {
    let s = s.trim();
    if let Ok(dt) = PrimitiveDateTime::parse(s, DAY_TIME_FORMAT) {
        return Ok(dt.assume_utc().unix_timestamp());
    }
    let day = Date::parse(s, DAY_FORMAT)
        .map_err(|_| format!("expected YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS, got {s:?}"))?;
    let t = match bound {
        DayBound::Start => Time::MIDNIGHT,
        DayBound::End => Time::from_hms(23, 59, 59).map_err(|e| e.to_string())?,
    };
    Ok(PrimitiveDateTime::new(day, t).assume_utc().unix_timestamp())
}

/// Render unix seconds as `YYYY-MM-DD HH:MM:SS` (UTC). Out-of-range values
/// fall back to the raw number.
pub fn format_unix(ts: i64) -> String {
    OffsetDateTime::from_unix_timestamp(ts)
        .ok()
        .and_then(|dt| dt.format(CSV_FORMAT).ok())
        .unwrap_or_else(|| ts.to_string())
}
