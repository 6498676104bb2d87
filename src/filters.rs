//! Post-fetch filter pipeline applied uniformly to every source's records.
//!
//! Each filter is a pure predicate over one field and a no-op when its
//! option is unset, so the pipeline can run per fetched page and again over
//! the merged result with identical output. Order is fixed for efficiency
//! only; the filters commute.
//!
//! Alliance filtering goes through two static tables: a synonym table that
//! normalizes language-local names ("天合", "星盟", "ow", ...) onto a
//! canonical alliance, and the carrier-code membership tables that
//! partition every known code into exactly one group.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use tracing::debug;

use crate::errors::QueryError;
use crate::models::{Direction, FlightRecord, QueryFlightForm};

/// Star Alliance member carrier codes.
pub const STAR_ALLIANCE: &[&str] = &[
    "A3", "AC", "CA", "AI", "NZ", "NH", "OZ", "OS", "AV", "SN", "CM", "OU", "MS", "ET", "BR",
    "LO", "LH", "ZH", "SQ", "SA", "LX", "TP", "TG", "TK", "UA",
];

/// SkyTeam member carrier codes.
pub const SKYTEAM: &[&str] = &[
    "SU", "AR", "AM", "UX", "AF", "CI", "MU", "DL", "GA", "KQ", "KL", "KE", "ME", "SV", "SK",
    "RO", "VN", "VS", "MF",
];

/// Oneworld member carrier codes.
pub const ONEWORLD: &[&str] = &[
    "AS", "AA", "BA", "CX", "FJ", "AY", "IB", "JL", "MH", "QF", "QR", "AT", "RJ", "UL",
];

/// HNA group carriers, filterable as their own bucket.
pub const HNA: &[&str] = &[
    "HU", "GS", "8L", "JD", "PN", "UQ", "FU", "GX", "9H", "Y8", "GT", "HX",
];

/// A named carrier grouping. [`Alliance::Other`] is the total-mapping
/// fallback for unknown codes and is never a requestable filter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Alliance {
    StarAlliance,
    Skyteam,
    Oneworld,
    Hna,
    Other,
}

static ALLIANCE_SYNONYMS: Lazy<HashMap<&'static str, Alliance>> = Lazy::new(|| {
    HashMap::from([
        ("skyteam", Alliance::Skyteam),
        ("sky", Alliance::Skyteam),
        ("st", Alliance::Skyteam),
        ("天合", Alliance::Skyteam),
        ("天合联盟", Alliance::Skyteam),
        ("鸟合", Alliance::Skyteam),
        ("oneworld", Alliance::Oneworld),
        ("ow", Alliance::Oneworld),
        ("一球", Alliance::Oneworld),
        ("寰宇一家", Alliance::Oneworld),
        ("星盟", Alliance::StarAlliance),
        ("星空联盟", Alliance::StarAlliance),
        ("星", Alliance::StarAlliance),
        ("star", Alliance::StarAlliance),
        ("star_alliance", Alliance::StarAlliance),
        ("sa", Alliance::StarAlliance),
        ("海航", Alliance::Hna),
        ("方威", Alliance::Hna),
        ("hna", Alliance::Hna),
    ])
});

impl Alliance {
    /// Normalize a user-supplied alliance name through the synonym table.
    ///
    /// Unrecognized names are a request-validation error, never a silent
    /// no-match.
    pub fn resolve(name: &str) -> Result<Alliance, QueryError> {
        let key = name.trim().to_lowercase();
        ALLIANCE_SYNONYMS
            .get(key.as_str())
            .copied()
            .ok_or_else(|| QueryError::UnknownAlliance(name.to_string()))
    }

    /// Map a carrier code to its group. Total: every code lands in exactly
    /// one of the named groups or [`Alliance::Other`], membership checked
    /// in a fixed precedence order.
    pub fn of_carrier(code: &str) -> Alliance {
        let code = code.to_uppercase();
        let code = code.as_str();
        if STAR_ALLIANCE.contains(&code) {
            Alliance::StarAlliance
        } else if SKYTEAM.contains(&code) {
            Alliance::Skyteam
        } else if ONEWORLD.contains(&code) {
            Alliance::Oneworld
        } else if HNA.contains(&code) {
            Alliance::Hna
        } else {
            Alliance::Other
        }
    }
}

/// Keep records whose carrier code belongs to `alliance`. Records with no
/// derivable carrier code fall in the `Other` bucket and never match.
pub fn filter_alliance(records: Vec<FlightRecord>, alliance: Alliance) -> Vec<FlightRecord> {
    records
        .into_iter()
        .filter(|r| {
            r.carrier_code()
                .map(|code| Alliance::of_carrier(&code) == alliance)
                .unwrap_or(false)
        })
        .collect()
}

/// Exact set-membership against the requested model codes.
pub fn filter_aircraft_model(records: Vec<FlightRecord>, models: &[String]) -> Vec<FlightRecord> {
    records
        .into_iter()
        .filter(|r| {
            r.aircraft_model
                .as_deref()
                .map(|m| models.iter().any(|want| want == m))
                .unwrap_or(false)
        })
        .collect()
}

/// Set-membership against the requested two-letter carrier codes.
pub fn filter_airlines_by_code(records: Vec<FlightRecord>, codes: &[String]) -> Vec<FlightRecord> {
    records
        .into_iter()
        .filter(|r| {
            r.carrier_code()
                .map(|code| codes.iter().any(|want| want.eq_ignore_ascii_case(&code)))
                .unwrap_or(false)
        })
        .collect()
}

/// Substring match, case-sensitive as typed, against the display name.
pub fn filter_airlines_by_name(records: Vec<FlightRecord>, name: &str) -> Vec<FlightRecord> {
    records
        .into_iter()
        .filter(|r| r.airlines.as_deref().map(|a| a.contains(name)).unwrap_or(false))
        .collect()
}

/// Case-insensitive substring match against the flight number.
pub fn filter_flight_no(records: Vec<FlightRecord>, flight_no: &str) -> Vec<FlightRecord> {
    let want = flight_no.to_uppercase();
    records
        .into_iter()
        .filter(|r| r.flight_no.to_uppercase().contains(&want))
        .collect()
}

/// Match the other-end airport: display-name substring OR exact
/// case-insensitive IATA code. For a departure board the other end is the
/// arrival side, and vice versa.
pub fn filter_airport(
    records: Vec<FlightRecord>,
    direction: Direction,
    target: &str,
) -> Vec<FlightRecord> {
    records
        .into_iter()
        .filter(|r| {
            let (name, code) = if direction.is_departure() {
                (&r.arr_airport, r.arr_airport_code.as_deref())
            } else {
                (&r.dep_airport, r.dep_airport_code.as_deref())
            };
            name.contains(target)
                || code.map(|c| c.eq_ignore_ascii_case(target)).unwrap_or(false)
        })
        .collect()
}

/// Run the full pipeline for one query form. Pure and stateless: applying
/// it per page and once more over the merged set yields the same records.
pub fn apply_filters(
    records: Vec<FlightRecord>,
    form: &QueryFlightForm,
    direction: Direction,
) -> Result<Vec<FlightRecord>, QueryError> {
    let before = records.len();
    // A parser may legitimately produce a row with no usable schedule.
    let mut records: Vec<FlightRecord> =
        records.into_iter().filter(|r| r.has_schedule()).collect();

    if let Some(name) = &form.alliance {
        let alliance = Alliance::resolve(name)?;
        records = filter_alliance(records, alliance);
    }
    if !form.aircraft_models.is_empty() {
        records = filter_aircraft_model(records, &form.aircraft_models);
    }
    if !form.airlines_codes.is_empty() {
        records = filter_airlines_by_code(records, &form.airlines_codes);
    }
    if let Some(name) = &form.airlines {
        records = filter_airlines_by_name(records, name);
    }
    if let Some(no) = &form.flight_no {
        records = filter_flight_no(records, no);
    }
    if let Some(target) = &form.airport {
        records = filter_airport(records, direction, target);
    }

    debug!(before, after = records.len(), "filter pipeline applied");
    Ok(records)
}
