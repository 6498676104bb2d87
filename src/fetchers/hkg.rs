//! Hong Kong (HKG) board fetcher.
//!
//! The airport's REST API returns rows grouped by date, with the other-end
//! airports given only as IATA codes. A second endpoint lists every code
//! with its display name; that table is fetched once per process and
//! memoized, so concurrent queries don't race to populate it. Status text
//! carries the time semantics: "启航 HH:MM" is an actual departure,
//! "预计 HH:MM" an estimate, "到闸口" an actual arrival.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashMap;
use tokio::sync::OnceCell;
use tracing::{info, instrument, warn};

use super::{FetchContext, FlightSource, SourcePage};
use crate::errors::QueryError;
use crate::models::{Direction, FlightRecord, ReportedTime};

const FLIGHTS_URL: &str = "https://www.hongkongairport.com/flightinfo-rest/rest/flights";
const AIRPORTS_URL: &str = "https://www.hongkongairport.com/flightinfo-rest/rest/airports";

/// Airport-code table, populated once for the whole process.
static AIRPORTS: OnceCell<HashMap<String, Airport>> = OnceCell::const_new();

#[derive(Debug, Clone)]
pub struct Airport {
    pub code: String,
    pub description: String,
}

#[derive(Debug, Deserialize)]
struct AirportRow {
    #[serde(default)]
    code: Option<String>,
    /// `[english, chinese]` name pair; the Chinese entry is used.
    #[serde(default)]
    description: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct DateGroup {
    date: String,
    #[serde(default)]
    list: Vec<BoardRow>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BoardRow {
    time: Option<String>,
    flight: Vec<FlightCode>,
    status: Option<String>,
    destination: Vec<String>,
    origin: Vec<String>,
    terminal: Option<String>,
    gate: Option<String>,
    baggage: Option<String>,
    stand: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FlightCode {
    no: String,
    #[serde(default)]
    airline: Option<String>,
}

async fn airports_table(
    client: &reqwest::Client,
) -> Result<&'static HashMap<String, Airport>, QueryError> {
    AIRPORTS
        .get_or_try_init(|| async {
            let rows: Vec<AirportRow> = client
                .get(AIRPORTS_URL)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            let mut table = HashMap::new();
            for row in rows {
                let Some(code) = row.code.filter(|c| !c.is_empty()) else {
                    continue;
                };
                let Some(description) = row
                    .description
                    .get(1)
                    .or_else(|| row.description.first())
                    .cloned()
                else {
                    continue;
                };
                table.insert(code.clone(), Airport { code, description });
            }
            info!(count = table.len(), "loaded HKG airport table");
            Ok(table)
        })
        .await
}

pub struct HkgFetcher;

impl HkgFetcher {
    pub fn new() -> Self {
        Self
    }

    /// Resolve a list of IATA codes to a joined display name plus the
    /// last leg's code. Unknown codes keep the code as their name.
    fn describe_airports(table: &HashMap<String, Airport>, codes: &[String]) -> (String, Option<String>) {
        if codes.is_empty() {
            return ("UNKNOWN".to_string(), None);
        }
        let resolved: Vec<Airport> = codes
            .iter()
            .map(|code| {
                table.get(code).cloned().unwrap_or_else(|| {
                    warn!(%code, "airport code not in table");
                    Airport {
                        code: code.clone(),
                        description: code.clone(),
                    }
                })
            })
            .collect();
        let names: Vec<String> = resolved.iter().map(|a| a.description.clone()).collect();
        (names.join(" / "), resolved.last().map(|a| a.code.clone()))
    }

    /// "启航 00:20" → actual, "预计 00:35" → estimated (departures);
    /// "到闸口 00:41" → actual (arrivals).
    fn reported_time(status: &str, direction: Direction) -> Option<ReportedTime> {
        if direction.is_departure() {
            if status.contains("启航") {
                return Some(ReportedTime::actual(status.replace("启航", "").trim()));
            }
        } else if status.contains("到闸口") {
            return Some(ReportedTime::actual(status.to_string()));
        }
        if status.contains("预计") {
            return Some(ReportedTime::estimated(status.replace("预计", "").trim()));
        }
        None
    }

    fn parse_row(
        &self,
        row: BoardRow,
        date: NaiveDate,
        table: &HashMap<String, Airport>,
        direction: Direction,
    ) -> Option<FlightRecord> {
        let mut codes = row.flight.iter().map(|f| f.no.replace(' ', ""));
        let flight_no = match codes.next() {
            Some(no) if !no.is_empty() => no,
            _ => {
                warn!("row without flight number dropped");
                return None;
            }
        };
        let shared_codes: Vec<String> = codes.collect();
        let airlines = row.flight.first().and_then(|f| f.airline.clone());

        let other_codes = if direction.is_departure() {
            &row.destination
        } else {
            &row.origin
        };
        let (other_airport, other_code) = Self::describe_airports(table, other_codes);

        let reported = row
            .status
            .as_deref()
            .and_then(|s| Self::reported_time(s, direction));

        let record = if direction.is_departure() {
            FlightRecord {
                flight_no,
                shared_codes,
                airlines,
                airlines_code: None,
                dep_airport: self.airport_name().to_string(),
                dep_airport_code: Some(self.airport_code().to_string()),
                arr_airport: other_airport,
                arr_airport_code: other_code,
                via_airports: vec![],
                dep_time: row.time,
                arr_time: None,
                act_dep_time: reported,
                act_arr_time: None,
                date,
                terminal: row.terminal,
                gate: row.gate,
                carousel: None,
                stand: None,
                status: row.status,
                aircraft_model: None,
            }
        } else {
            FlightRecord {
                flight_no,
                shared_codes,
                airlines,
                airlines_code: None,
                dep_airport: other_airport,
                dep_airport_code: other_code,
                arr_airport: self.airport_name().to_string(),
                arr_airport_code: Some(self.airport_code().to_string()),
                via_airports: vec![],
                dep_time: None,
                arr_time: row.time,
                act_dep_time: None,
                act_arr_time: reported,
                date,
                terminal: row.terminal,
                gate: None,
                carousel: row.baggage,
                stand: row.stand,
                status: row.status,
                aircraft_model: None,
            }
        };
        Some(record)
    }
}

#[async_trait]
impl FlightSource for HkgFetcher {
    fn airport_name(&self) -> &'static str {
        "香港"
    }

    fn airport_code(&self) -> &'static str {
        "HKG"
    }

    #[instrument(level = "info", skip(self, ctx))]
    async fn fetch_page(
        &mut self,
        ctx: &FetchContext<'_>,
        page: u32,
    ) -> Result<SourcePage, QueryError> {
        let table = airports_table(ctx.client).await?;
        let date = ctx.target.format("%Y-%m-%d").to_string();
        let groups: Vec<DateGroup> = ctx
            .client
            .get(FLIGHTS_URL)
            .query(&[
                ("span", "1"),
                ("date", date.as_str()),
                ("lang", "zh_CN"),
                ("cargo", if ctx.options.cargo { "true" } else { "false" }),
                ("arrival", if ctx.direction.is_departure() { "false" } else { "true" }),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut records: Vec<FlightRecord> = Vec::new();
        for group in groups {
            let Ok(date) = NaiveDate::parse_from_str(&group.date, "%Y-%m-%d") else {
                warn!(date = %group.date, "date group with unparseable date skipped");
                continue;
            };
            records.extend(
                group
                    .list
                    .into_iter()
                    .filter_map(|row| self.parse_row(row, date, table, ctx.direction)),
            );
        }
        // The API returns the whole day; rows before the target instant
        // are yesterday's news on a live board.
        records.retain(|r| r.is_after(ctx.target, ctx.direction));
        info!(page, count = records.len(), "parsed board page");
        Ok(SourcePage {
            records,
            has_next: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TimeKind;

    fn table() -> HashMap<String, Airport> {
        let mut t = HashMap::new();
        t.insert(
            "PER".to_string(),
            Airport {
                code: "PER".to_string(),
                description: "珀斯".to_string(),
            },
        );
        t.insert(
            "BKK".to_string(),
            Airport {
                code: "BKK".to_string(),
                description: "曼谷".to_string(),
            },
        );
        t
    }

    fn row(status: &str, destination: Vec<&str>) -> BoardRow {
        BoardRow {
            time: Some("00:05".to_string()),
            flight: vec![
                FlightCode {
                    no: "CX 143".to_string(),
                    airline: Some("CPA".to_string()),
                },
                FlightCode {
                    no: "QF 4032".to_string(),
                    airline: Some("QFA".to_string()),
                },
            ],
            status: Some(status.to_string()),
            destination: destination.into_iter().map(str::to_string).collect(),
            origin: vec!["BKK".to_string()],
            terminal: Some("T1".to_string()),
            gate: Some("61".to_string()),
            baggage: Some("7".to_string()),
            stand: None,
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, 14).unwrap()
    }

    #[test]
    fn test_codeshare_codes_split_and_despace() {
        let record = HkgFetcher::new()
            .parse_row(row("启航 00:20", vec!["PER"]), date(), &table(), Direction::Departure)
            .unwrap();
        assert_eq!(record.flight_no, "CX143");
        assert_eq!(record.shared_codes, vec!["QF4032"]);
        assert_eq!(record.arr_airport, "珀斯");
        assert_eq!(record.arr_airport_code.as_deref(), Some("PER"));
    }

    #[test]
    fn test_departed_status_is_actual() {
        let record = HkgFetcher::new()
            .parse_row(row("启航 00:20", vec!["PER"]), date(), &table(), Direction::Departure)
            .unwrap();
        let act = record.act_dep_time.unwrap();
        assert_eq!(act.kind, TimeKind::Actual);
        assert_eq!(act.time, "00:20");
    }

    #[test]
    fn test_estimated_status_keeps_the_tag() {
        let record = HkgFetcher::new()
            .parse_row(row("预计 00:35", vec!["PER"]), date(), &table(), Direction::Departure)
            .unwrap();
        assert_eq!(record.act_dep_time.unwrap().kind, TimeKind::Estimated);
    }

    #[test]
    fn test_arrival_at_gate_is_actual() {
        let record = HkgFetcher::new()
            .parse_row(row("到闸口 00:41", vec![]), date(), &table(), Direction::Arrival)
            .unwrap();
        assert_eq!(record.dep_airport, "曼谷");
        assert_eq!(record.arr_airport, "香港");
        assert_eq!(record.act_arr_time.unwrap().kind, TimeKind::Actual);
        assert_eq!(record.carousel.as_deref(), Some("7"));
    }

    #[test]
    fn test_multi_stop_destination_joined() {
        let record = HkgFetcher::new()
            .parse_row(
                row("预计 00:35", vec!["BKK", "PER"]),
                date(),
                &table(),
                Direction::Departure,
            )
            .unwrap();
        assert_eq!(record.arr_airport, "曼谷 / 珀斯");
        assert_eq!(record.arr_airport_code.as_deref(), Some("PER"));
    }

    #[test]
    fn test_unknown_code_keeps_code_as_name() {
        let record = HkgFetcher::new()
            .parse_row(row("预计 00:35", vec!["XXX"]), date(), &table(), Direction::Departure)
            .unwrap();
        assert_eq!(record.arr_airport, "XXX");
    }
}
