//! Time helpers and pagination estimation shared across fetchers.
//!
//! Several sources only paginate by page number, not by time window, so the
//! starting page for a query near a target time has to be guessed from how
//! a day's flight volume is distributed. [`estimate_page_by_time`] does the
//! guess from a five-band empirical ratio table.

use chrono::{DateTime, FixedOffset, NaiveTime, Timelike, Utc};
use tracing::debug;

/// Fraction of a day's flights in each of the 00–06, 06–10, 10–15, 15–20
/// and 20–24 bands, measured on a week of board snapshots. Sources without
/// their own table use this one.
pub const DEFAULT_TRAFFIC_RATIOS: [f64; 5] = [0.02352, 0.270588, 0.2823529, 0.2823529, 0.1411764];

/// Band boundaries in minutes from midnight: 0, 6, 10, 15, 20, 24 hours.
const BAND_BOUNDARIES: [f64; 6] = [0.0, 360.0, 600.0, 900.0, 1200.0, 1440.0];

/// Parse a "+08:00" / "-05:30" style offset into minutes. `None` for
/// anything that doesn't look like an offset.
pub fn offset_minutes_from_str(offset: &str) -> Option<i32> {
    let (sign, rest) = match offset.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, offset.strip_prefix('+').unwrap_or(offset)),
    };
    let (h, m) = rest.split_once(':')?;
    let hours: i32 = h.parse().ok()?;
    let minutes: i32 = m.parse().ok()?;
    Some(sign * (hours * 60 + minutes))
}

/// Current wall-clock time at a fixed UTC offset given in minutes.
pub fn now_at_offset(offset_minutes: i32) -> DateTime<FixedOffset> {
    let offset = FixedOffset::east_opt(offset_minutes * 60)
        .unwrap_or_else(|| FixedOffset::east_opt(0).unwrap());
    Utc::now().with_timezone(&offset)
}

/// Guess the page a flight near `time` sits on, for a source with
/// `max_page` pages and the given per-band traffic `ratios`.
///
/// The cumulative share of the day's flights before `time` is computed by
/// summing whole bands and linearly interpolating inside the band `time`
/// falls in, then mapped onto the page range. `day_offset` shifts the
/// query a number of days forward (a next-day query lands on the last
/// page). The result is clamped to `1..=max_page`.
pub fn estimate_page_by_time(time: NaiveTime, max_page: u32, ratios: &[f64; 5], day_offset: u32) -> u32 {
    let max_page = max_page.max(1);
    let minutes = time.hour() as f64 * 60.0
        + time.minute() as f64
        + time.second() as f64 / 60.0
        + day_offset as f64 * 1440.0;

    let mut cumulative = 0.0;
    for i in 0..5 {
        let lower = BAND_BOUNDARIES[i];
        let upper = BAND_BOUNDARIES[i + 1];
        if minutes < upper {
            cumulative += (minutes - lower) / (upper - lower) * ratios[i];
            break;
        }
        cumulative += ratios[i];
    }

    let page = (cumulative * max_page as f64) as u32 + 1;
    let page = page.clamp(1, max_page);
    debug!(%time, max_page, page, "estimated start page");
    page
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_offset_minutes_from_str() {
        assert_eq!(offset_minutes_from_str("+09:00"), Some(540));
        assert_eq!(offset_minutes_from_str("+08:00"), Some(480));
        assert_eq!(offset_minutes_from_str("-05:30"), Some(-330));
        assert_eq!(offset_minutes_from_str("08:00"), Some(480));
        assert_eq!(offset_minutes_from_str("Asia/Shanghai"), None);
    }

    #[test]
    fn test_estimate_page_bounds() {
        let ratios = DEFAULT_TRAFFIC_RATIOS;
        assert_eq!(estimate_page_by_time(t(0, 0), 43, &ratios, 0), 1);
        // End of day accumulates everything.
        assert_eq!(estimate_page_by_time(t(23, 59), 43, &ratios, 0), 43);
        // Day offset pushes past the table: clamp at the last page.
        assert_eq!(estimate_page_by_time(t(0, 15), 43, &ratios, 1), 43);
    }

    #[test]
    fn test_estimate_page_monotonic_within_day() {
        let ratios = DEFAULT_TRAFFIC_RATIOS;
        let mut last = 0;
        for minutes in (0..1440).step_by(7) {
            let page = estimate_page_by_time(
                t(minutes as u32 / 60, minutes as u32 % 60),
                37,
                &ratios,
                0,
            );
            assert!(page >= last, "page went backwards at minute {minutes}");
            assert!((1..=37).contains(&page));
            last = page;
        }
    }

    #[test]
    fn test_estimate_page_single_page_source() {
        assert_eq!(estimate_page_by_time(t(18, 0), 1, &DEFAULT_TRAFFIC_RATIOS, 0), 1);
        // A zero page count behaves like one page rather than panicking.
        assert_eq!(estimate_page_by_time(t(18, 0), 0, &DEFAULT_TRAFFIC_RATIOS, 0), 1);
    }

    #[test]
    fn test_now_at_offset_applies_offset() {
        let cst = now_at_offset(480);
        let kst = now_at_offset(540);
        let diff = kst.naive_local() - cst.naive_local();
        assert_eq!(diff.num_minutes(), 60);
    }
}
