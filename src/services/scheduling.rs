use chrono::{Duration, NaiveDateTime};
use rusqlite::Connection;

use crate::db::queries;
use crate::models::BOOKING_DURATION_MIN;

/// Business window the auto-slot finder scans, hours of day.
const WINDOW_START_HOUR: u32 = 8;
const WINDOW_END_HOUR: u32 = 18;
/// How many days ahead the finder looks for a free slot.
const SEARCH_DAYS: i64 = 7;

/// True when any scheduled booking of the tenant intersects
/// `[start, end)`. A booking ending exactly at `start` (or starting
/// exactly at `end`) is not a conflict.
pub fn has_conflict(
    conn: &Connection,
    tenant_id: i64,
    start: &NaiveDateTime,
    end: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let overlapping = queries::find_overlapping(conn, tenant_id, start, end)?;
    Ok(!overlapping.is_empty())
}

/// First conflict-free slot within the business window over the next
/// `SEARCH_DAYS` days, starting from `from`'s date. Slots are aligned
/// to the fixed booking duration and must lie after `now`.
pub fn find_next_free_slot(
    conn: &Connection,
    tenant_id: i64,
    from: &NaiveDateTime,
    now: &NaiveDateTime,
) -> anyhow::Result<Option<NaiveDateTime>> {
    let duration = Duration::minutes(BOOKING_DURATION_MIN);

    for day_offset in 0..SEARCH_DAYS {
        let date = from.date() + Duration::days(day_offset);
        let window_end = match date.and_hms_opt(WINDOW_END_HOUR, 0, 0) {
            Some(end) => end,
            None => continue,
        };

        let mut slot_start = match date.and_hms_opt(WINDOW_START_HOUR, 0, 0) {
            Some(start) => start,
            None => continue,
        };

        while slot_start + duration <= window_end {
            let slot_end = slot_start + duration;
            if slot_start > *now && !has_conflict(conn, tenant_id, &slot_start, &slot_end)? {
                return Ok(Some(slot_start));
            }
            slot_start += duration;
        }
    }

    Ok(None)
}
