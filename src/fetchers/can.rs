//! Guangzhou Baiyun (CAN) board fetcher.
//!
//! The airport exposes a JSON API with two endpoints: a plain board
//! listing and a keyword search used when the query names a flight or a
//! city. Both paginate with `pageNum`/`pages` in the response, and both
//! serve passenger and cargo boards behind a `type` discriminator.
//! Scheduled/actual/predicted times arrive as full local datetimes and are
//! reduced to "HH:MM".

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use super::{FetchContext, FlightSource, SourcePage};
use crate::errors::QueryError;
use crate::models::{Direction, FlightRecord, ReportedTime};

const LIST_URL: &str = "https://www.baiyunairport.com/byairport-flight/flight/list";
const SEARCH_URL: &str = "https://www.baiyunairport.com/byairport-flight/flight/searchFlight";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListParams {
    /// 0 = today, 1 = tomorrow.
    day: u32,
    page_num: u32,
    page_size: u32,
    terminal: String,
    /// "1" departures, "2" arrivals.
    dep_or_arr: &'static str,
    /// "1" passenger, "2" cargo.
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchParams {
    keyword: String,
    #[serde(flatten)]
    list: ListParams,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BoardResponse {
    #[serde(default)]
    pages: u32,
    #[serde(default)]
    data: Option<BoardData>,
}

#[derive(Debug, Deserialize)]
struct BoardData {
    #[serde(default)]
    list: Vec<BoardRow>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct BoardRow {
    flight_no: Option<String>,
    share_flight: Vec<String>,
    airline_cn: Option<String>,
    airline: Option<String>,
    /// The API's own spelling.
    plane_modle: Option<String>,
    dst_city_cn: Option<String>,
    dst_city: Option<String>,
    org_city_cn: Option<String>,
    org_city: Option<String>,
    via_airport: Option<String>,
    setoff_time_plan: Option<String>,
    setoff_time_act: Option<String>,
    setoff_time_pred: Option<String>,
    arri_time_plan: Option<String>,
    arri_time_act: Option<String>,
    arri_time_pred: Option<String>,
    flight_date: Option<String>,
    terminal: Option<String>,
    boarding_gate: Option<String>,
    baggage_table: Option<String>,
    flight_status_cn: Option<String>,
}

pub struct CanFetcher {
    total_pages: Option<u32>,
}

impl CanFetcher {
    pub fn new() -> Self {
        Self { total_pages: None }
    }

    /// Reduce a "2025-04-14 08:35:00" datetime to "08:35".
    fn parse_flight_time(raw: Option<&str>) -> Option<String> {
        let raw = raw?;
        match NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
            Ok(t) => Some(t.format("%H:%M").to_string()),
            Err(_) => {
                warn!(raw, "unparseable flight time");
                None
            }
        }
    }

    fn parse_row(&self, row: BoardRow, direction: Direction) -> Option<FlightRecord> {
        let flight_no = match row.flight_no {
            Some(no) if !no.is_empty() => no,
            _ => {
                warn!("row without flight number dropped");
                return None;
            }
        };
        let date = match row
            .flight_date
            .as_deref()
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        {
            Some(date) => date,
            None => {
                warn!(%flight_no, "row without flight date dropped");
                return None;
            }
        };

        let dep_time = Self::parse_flight_time(row.setoff_time_plan.as_deref());
        let arr_time = Self::parse_flight_time(row.arri_time_plan.as_deref());
        let airlines = row.airline_cn.or(row.airline);
        let via_airports = row.via_airport.into_iter().collect();

        let record = if direction.is_departure() {
            let act_dep_time = Self::parse_flight_time(row.setoff_time_act.as_deref())
                .map(ReportedTime::actual)
                .or_else(|| {
                    Self::parse_flight_time(row.setoff_time_pred.as_deref())
                        .map(ReportedTime::estimated)
                });
            FlightRecord {
                flight_no,
                shared_codes: row.share_flight,
                airlines,
                airlines_code: None,
                dep_airport: self.airport_name().to_string(),
                dep_airport_code: Some(self.airport_code().to_string()),
                arr_airport: row
                    .dst_city_cn
                    .or_else(|| row.dst_city.clone())
                    .unwrap_or_else(|| "未知".to_string()),
                arr_airport_code: row.dst_city,
                via_airports,
                dep_time,
                arr_time,
                act_dep_time,
                act_arr_time: None,
                date,
                terminal: row.terminal,
                gate: row.boarding_gate,
                carousel: None,
                stand: None,
                status: row.flight_status_cn,
                aircraft_model: row.plane_modle,
            }
        } else {
            let act_arr_time = Self::parse_flight_time(row.arri_time_act.as_deref())
                .map(ReportedTime::actual)
                .or_else(|| {
                    Self::parse_flight_time(row.arri_time_pred.as_deref())
                        .map(ReportedTime::estimated)
                });
            FlightRecord {
                flight_no,
                shared_codes: row.share_flight,
                airlines,
                airlines_code: None,
                dep_airport: row
                    .org_city_cn
                    .or_else(|| row.org_city.clone())
                    .unwrap_or_else(|| "未知".to_string()),
                dep_airport_code: row.org_city,
                arr_airport: self.airport_name().to_string(),
                arr_airport_code: Some(self.airport_code().to_string()),
                via_airports,
                dep_time,
                arr_time,
                act_dep_time: None,
                act_arr_time,
                date,
                terminal: row.terminal,
                gate: None,
                carousel: row.baggage_table,
                stand: None,
                status: row.flight_status_cn,
                aircraft_model: row.plane_modle,
            }
        };
        Some(record)
    }

    fn build_list_params(&self, ctx: &FetchContext<'_>, page: u32) -> ListParams {
        ListParams {
            day: 0,
            page_num: page,
            page_size: 15,
            terminal: ctx
                .options
                .terminal
                .as_deref()
                .unwrap_or("")
                .to_uppercase(),
            dep_or_arr: if ctx.direction.is_departure() { "1" } else { "2" },
            kind: if ctx.options.cargo { "2" } else { "1" },
        }
    }

    /// The search endpoint takes one keyword slot for either a flight
    /// number or a city name.
    fn search_keyword(ctx: &FetchContext<'_>) -> Option<String> {
        ctx.form
            .flight_no
            .clone()
            .or_else(|| ctx.form.airport.clone())
    }
}

#[async_trait]
impl FlightSource for CanFetcher {
    fn airport_name(&self) -> &'static str {
        "广州"
    }

    fn airport_code(&self) -> &'static str {
        "CAN"
    }

    #[instrument(level = "info", skip(self, ctx))]
    async fn fetch_page(
        &mut self,
        ctx: &FetchContext<'_>,
        page: u32,
    ) -> Result<SourcePage, QueryError> {
        let list = self.build_list_params(ctx, page);
        let request = match Self::search_keyword(ctx) {
            Some(keyword) => ctx
                .client
                .post(SEARCH_URL)
                .json(&SearchParams { keyword, list }),
            None => ctx.client.post(LIST_URL).json(&list),
        };
        let body: BoardResponse = request.send().await?.error_for_status()?.json().await?;

        let total = body.pages.max(1);
        self.total_pages = Some(total);
        let rows = body.data.map(|d| d.list).unwrap_or_default();
        let records: Vec<FlightRecord> = rows
            .into_iter()
            .filter_map(|row| self.parse_row(row, ctx.direction))
            .collect();
        info!(page, total, count = records.len(), "parsed board page");
        Ok(SourcePage {
            records,
            has_next: page < total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TimeKind;

    fn dep_row_json(flight_no: Option<&str>) -> String {
        let no = match flight_no {
            Some(no) => format!(r#""flightNo": "{no}","#),
            None => String::new(),
        };
        format!(
            r#"{{
                {no}
                "shareFlight": ["HU432"],
                "airlineCn": "中国南方航空",
                "planeModle": "A321",
                "dstCityCn": "北京",
                "dstCity": "PEK",
                "setoffTimePlan": "2025-04-14 08:35:00",
                "setoffTimePred": "2025-04-14 08:50:00",
                "flightDate": "2025-04-14",
                "terminal": "T2",
                "boardingGate": "B12",
                "flightStatusCn": "登机"
            }}"#
        )
    }

    #[test]
    fn test_rows_missing_required_fields_are_dropped() {
        let json = format!(
            "[{},{},{}]",
            dep_row_json(Some("CZ3104")),
            dep_row_json(None),
            dep_row_json(Some("CZ3999"))
        );
        let rows: Vec<BoardRow> = serde_json::from_str(&json).unwrap();
        let fetcher = CanFetcher::new();
        let records: Vec<FlightRecord> = rows
            .into_iter()
            .filter_map(|row| fetcher.parse_row(row, Direction::Departure))
            .collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].flight_no, "CZ3104");
        assert_eq!(records[1].flight_no, "CZ3999");
    }

    #[test]
    fn test_departure_row_parse() {
        let row: BoardRow = serde_json::from_str(&dep_row_json(Some("CZ3104"))).unwrap();
        let record = CanFetcher::new()
            .parse_row(row, Direction::Departure)
            .unwrap();
        assert_eq!(record.dep_time.as_deref(), Some("08:35"));
        assert_eq!(record.dep_airport, "广州");
        assert_eq!(record.arr_airport, "北京");
        assert_eq!(record.arr_airport_code.as_deref(), Some("PEK"));
        assert_eq!(record.shared_codes, vec!["HU432"]);
        // No actual time reported: the prediction carries the tag.
        let act = record.act_dep_time.unwrap();
        assert_eq!(act.time, "08:50");
        assert_eq!(act.kind, TimeKind::Estimated);
    }

    #[test]
    fn test_arrival_row_parse_uses_origin_and_carousel() {
        let json = r#"{
            "flightNo": "CZ300",
            "airlineCn": "中国南方航空",
            "orgCityCn": "上海",
            "orgCity": "SHA",
            "arriTimePlan": "2025-04-14 21:10:00",
            "arriTimeAct": "2025-04-14 21:02:00",
            "flightDate": "2025-04-14",
            "baggageTable": "C5"
        }"#;
        let row: BoardRow = serde_json::from_str(json).unwrap();
        let record = CanFetcher::new().parse_row(row, Direction::Arrival).unwrap();
        assert_eq!(record.dep_airport, "上海");
        assert_eq!(record.arr_airport, "广州");
        assert_eq!(record.arr_time.as_deref(), Some("21:10"));
        assert_eq!(record.carousel.as_deref(), Some("C5"));
        let act = record.act_arr_time.unwrap();
        assert_eq!(act.kind, TimeKind::Actual);
        assert_eq!(act.time, "21:02");
    }

    #[test]
    fn test_malformed_time_becomes_none_and_row_survives() {
        let json = r#"{
            "flightNo": "CZ3104",
            "setoffTimePlan": "soon",
            "arriTimePlan": "2025-04-14 10:40:00",
            "flightDate": "2025-04-14"
        }"#;
        let row: BoardRow = serde_json::from_str(json).unwrap();
        let record = CanFetcher::new()
            .parse_row(row, Direction::Departure)
            .unwrap();
        assert_eq!(record.dep_time, None);
        assert_eq!(record.arr_time.as_deref(), Some("10:40"));
    }
}
