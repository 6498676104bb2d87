//! Canonical data models shared by every fetcher.
//!
//! This module defines the two structures the whole pipeline converges on:
//! - [`QueryFlightForm`]: normalized user-query parameters, consumed
//!   read-only by fetchers and filters
//! - [`FlightRecord`]: the common record shape every source's rows are
//!   parsed into, whatever the source's own schema looks like
//!
//! Supporting types: [`Direction`] (departure vs. arrival board) and
//! [`ReportedTime`] (an actual-or-estimated time that keeps the
//! distinction explicit instead of guessing a suffix convention).

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use std::fmt;

/// Which side of the board a query (and each parsed row) belongs to.
///
/// The direction selects the source endpoint, the row-parsing variant, and
/// which of `dep_time`/`arr_time` a record meaningfully populates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Departure,
    Arrival,
}

impl Direction {
    pub fn is_departure(self) -> bool {
        matches!(self, Direction::Departure)
    }

    /// Board label used in replies.
    pub fn label(self) -> &'static str {
        match self {
            Direction::Departure => "出发",
            Direction::Arrival => "到达",
        }
    }
}

/// Whether a reported off-schedule time is confirmed or still a prediction.
///
/// The sources are inconsistent here: some mark estimated times, some mark
/// actual ones, some mark neither and hide the distinction in a status
/// string. Each row parser maps its source's convention onto this tag, so
/// downstream code never has to re-derive it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TimeKind {
    Actual,
    Estimated,
}

/// An actual-or-estimated "HH:MM" time with its [`TimeKind`] tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportedTime {
    pub time: String,
    pub kind: TimeKind,
}

impl ReportedTime {
    pub fn actual(time: impl Into<String>) -> Self {
        Self {
            time: time.into(),
            kind: TimeKind::Actual,
        }
    }

    pub fn estimated(time: impl Into<String>) -> Self {
        Self {
            time: time.into(),
            kind: TimeKind::Estimated,
        }
    }
}

impl fmt::Display for ReportedTime {
    /// Renders with the board suffixes the bot replies always used:
    /// `(实)` for actual, `(预)` for estimated.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TimeKind::Actual => write!(f, "{}(实)", self.time),
            TimeKind::Estimated => write!(f, "{}(预)", self.time),
        }
    }
}

/// Normalized query parameters, immutable once constructed.
#[derive(Debug, Clone, Default)]
pub struct QueryFlightForm {
    /// Case-insensitive substring match against the flight number.
    pub flight_no: Option<String>,
    /// Substring match against the airline display name, as typed.
    pub airlines: Option<String>,
    /// Other-end airport: display-name substring or exact IATA code.
    pub airport: Option<String>,
    /// Reference instant; `None` means "now" at the airport's local offset.
    pub at_time: Option<NaiveDateTime>,
    /// Uppercase aircraft model codes; empty means no filter.
    pub aircraft_models: Vec<String>,
    /// Two-letter IATA carrier codes; empty means no filter.
    pub airlines_codes: Vec<String>,
    /// Alliance name or synonym, resolved through the synonym table.
    pub alliance: Option<String>,
}

/// One flight on a board, in the canonical shape all sources produce.
///
/// Exactly one of `dep_time`/`arr_time` is meaningfully populated,
/// depending on whether the row was parsed as a departure or an arrival;
/// a row with neither is dropped by its parser. `date` is the flight's
/// calendar date in the airport's local frame.
#[derive(Debug, Clone, Serialize)]
pub struct FlightRecord {
    pub flight_no: String,
    /// Codeshare flight numbers marketed alongside `flight_no`.
    pub shared_codes: Vec<String>,
    pub airlines: Option<String>,
    /// Two-letter carrier code; when absent, the first two characters of
    /// `flight_no` stand in (see [`FlightRecord::carrier_code`]).
    pub airlines_code: Option<String>,
    pub dep_airport: String,
    pub dep_airport_code: Option<String>,
    pub arr_airport: String,
    pub arr_airport_code: Option<String>,
    pub via_airports: Vec<String>,
    /// Scheduled local departure "HH:MM".
    pub dep_time: Option<String>,
    /// Scheduled local arrival "HH:MM".
    pub arr_time: Option<String>,
    pub act_dep_time: Option<ReportedTime>,
    pub act_arr_time: Option<ReportedTime>,
    pub date: NaiveDate,
    pub terminal: Option<String>,
    pub gate: Option<String>,
    pub carousel: Option<String>,
    pub stand: Option<String>,
    pub status: Option<String>,
    pub aircraft_model: Option<String>,
}

impl FlightRecord {
    /// The carrier code used for alliance and code filtering: the explicit
    /// `airlines_code` when present, otherwise the first two characters of
    /// the flight number.
    pub fn carrier_code(&self) -> Option<String> {
        if let Some(code) = &self.airlines_code {
            return Some(code.to_uppercase());
        }
        if self.flight_no.chars().count() >= 2 {
            let prefix: String = self.flight_no.chars().take(2).collect();
            return Some(prefix.to_uppercase());
        }
        None
    }

    /// Derive the scheduled timestamp from `date` plus the directional
    /// "HH:MM" string. Absent or malformed time strings yield `None`,
    /// never an error.
    pub fn get_time(&self, direction: Direction) -> Option<NaiveDateTime> {
        let raw = if direction.is_departure() {
            self.dep_time.as_deref()?
        } else {
            self.arr_time.as_deref()?
        };
        let time = NaiveTime::parse_from_str(raw, "%H:%M").ok()?;
        Some(self.date.and_time(time))
    }

    /// True when the record's derived timestamp is at or after `instant`.
    /// Records with no derivable timestamp pass (they may still carry
    /// useful status text and are sorted last downstream).
    pub fn is_after(&self, instant: NaiveDateTime, direction: Direction) -> bool {
        match self.get_time(direction) {
            Some(t) => t >= instant,
            None => true,
        }
    }

    /// A record with neither scheduled time is not a usable board row.
    pub fn has_schedule(&self) -> bool {
        self.dep_time.is_some() || self.arr_time.is_some()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn blank_record() -> FlightRecord {
        FlightRecord {
            flight_no: "MU2809".to_string(),
            shared_codes: vec![],
            airlines: None,
            airlines_code: None,
            dep_airport: "南京".to_string(),
            dep_airport_code: Some("NKG".to_string()),
            arr_airport: "广州".to_string(),
            arr_airport_code: Some("CAN".to_string()),
            via_airports: vec![],
            dep_time: None,
            arr_time: None,
            act_dep_time: None,
            act_arr_time: None,
            date: NaiveDate::from_ymd_opt(2025, 4, 14).unwrap(),
            terminal: None,
            gate: None,
            carousel: None,
            stand: None,
            status: None,
            aircraft_model: None,
        }
    }

    #[test]
    fn test_get_time_combines_date_and_dep_time() {
        let mut r = blank_record();
        r.dep_time = Some("08:35".to_string());
        let expected = NaiveDate::from_ymd_opt(2025, 4, 14)
            .unwrap()
            .and_hms_opt(8, 35, 0)
            .unwrap();
        assert_eq!(r.get_time(Direction::Departure), Some(expected));
        // The arrival side was never populated.
        assert_eq!(r.get_time(Direction::Arrival), None);
    }

    #[test]
    fn test_get_time_malformed_is_none_not_error() {
        let mut r = blank_record();
        r.dep_time = Some("8点35".to_string());
        assert_eq!(r.get_time(Direction::Departure), None);
        r.dep_time = None;
        assert_eq!(r.get_time(Direction::Departure), None);
    }

    #[test]
    fn test_carrier_code_falls_back_to_flight_no_prefix() {
        let mut r = blank_record();
        assert_eq!(r.carrier_code(), Some("MU".to_string()));
        r.airlines_code = Some("cz".to_string());
        assert_eq!(r.carrier_code(), Some("CZ".to_string()));
        r.airlines_code = None;
        r.flight_no = "9".to_string();
        assert_eq!(r.carrier_code(), None);
    }

    #[test]
    fn test_is_after() {
        let mut r = blank_record();
        r.dep_time = Some("10:00".to_string());
        let before = r.date.and_hms_opt(9, 0, 0).unwrap();
        let after = r.date.and_hms_opt(11, 0, 0).unwrap();
        assert!(r.is_after(before, Direction::Departure));
        assert!(!r.is_after(after, Direction::Departure));
        // No derivable time: keep the record.
        r.dep_time = None;
        assert!(r.is_after(after, Direction::Departure));
    }

    #[test]
    fn test_reported_time_display_keeps_the_distinction() {
        assert_eq!(ReportedTime::actual("08:12").to_string(), "08:12(实)");
        assert_eq!(ReportedTime::estimated("08:12").to_string(), "08:12(预)");
    }

    #[test]
    fn test_direction_labels() {
        assert_eq!(Direction::Departure.label(), "出发");
        assert_eq!(Direction::Arrival.label(), "到达");
        assert!(Direction::Departure.is_departure());
        assert!(!Direction::Arrival.is_departure());
    }
}
