//! Shanghai Hongqiao (SHA) / Pudong (PVG) board fetcher.
//!
//! Both airports sit behind one site whose board is driven by an XHR
//! endpoint: a JSON POST with the airport discriminator, passenger/cargo
//! toggle and page number. The endpoint paginates only by page number with
//! no time addressing, so the start page is estimated from the empirical
//! traffic-ratio table (the default table was measured on this very
//! board). The first query doubles as discovery of the page count.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use super::{dump_page_snapshot, FetchContext, FlightSource, PagePlan, SourcePage};
use crate::errors::QueryError;
use crate::models::{Direction, FlightRecord, ReportedTime};

const API_URL: &str = "https://www.shairport.com/flights/api/list";
const PAGE_SIZE: u32 = 15;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListParams<'a> {
    airport: &'static str,
    /// "DEP" or "ARR".
    query_type: &'static str,
    /// "1" passenger, "2" cargo.
    flight_type: &'static str,
    flight_no: &'a str,
    airline: &'a str,
    city: &'a str,
    page_no: u32,
    page_size: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BoardResponse {
    #[serde(default)]
    pages: u32,
    #[serde(default)]
    list: Vec<BoardRow>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct BoardRow {
    flight_date: Option<String>,
    /// Marketed number first, codeshares after.
    flight_nos: Vec<String>,
    airline: Option<String>,
    aircraft_type: Option<String>,
    via_city: Option<String>,
    city: Option<String>,
    sched_time: Option<String>,
    estimate_time: Option<String>,
    actual_time: Option<String>,
    terminal: Option<String>,
    gate: Option<String>,
    carousel: Option<String>,
    status: Option<String>,
}

pub struct ShanghaiFetcher {
    airport_name: &'static str,
    airport_code: &'static str,
    pages: u32,
    first_page: Option<SourcePage>,
}

impl ShanghaiFetcher {
    pub fn hongqiao() -> Self {
        Self {
            airport_name: "上海虹桥",
            airport_code: "SHA",
            pages: 1,
            first_page: None,
        }
    }

    pub fn pudong() -> Self {
        Self {
            airport_name: "上海浦东",
            airport_code: "PVG",
            pages: 1,
            first_page: None,
        }
    }

    fn parse_row(&self, row: BoardRow, direction: Direction) -> Option<FlightRecord> {
        let mut codes = row
            .flight_nos
            .iter()
            .map(|no| no.replace(' ', ""))
            .filter(|no| !no.is_empty());
        let Some(flight_no) = codes.next() else {
            warn!("row without flight number dropped");
            return None;
        };
        let shared_codes: Vec<String> = codes.collect();
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

        let reported = row
            .actual_time
            .filter(|s| !s.is_empty())
            .map(ReportedTime::actual)
            .or_else(|| {
                row.estimate_time
                    .filter(|s| !s.is_empty())
                    .map(ReportedTime::estimated)
            });
        let scheduled = row.sched_time.filter(|s| !s.is_empty());
        let other_city = row.city.unwrap_or_else(|| "未知".to_string());
        let via_airports: Vec<String> = row
            .via_city
            .filter(|s| !s.is_empty())
            .into_iter()
            .collect();

        let record = if direction.is_departure() {
            FlightRecord {
                flight_no,
                shared_codes,
                airlines: row.airline,
                airlines_code: None,
                dep_airport: self.airport_name.to_string(),
                dep_airport_code: Some(self.airport_code.to_string()),
                arr_airport: other_city,
                arr_airport_code: None,
                via_airports,
                dep_time: scheduled,
                arr_time: None,
                act_dep_time: reported,
                act_arr_time: None,
                date,
                terminal: row.terminal,
                gate: row.gate,
                carousel: None,
                stand: None,
                status: row.status,
                aircraft_model: row.aircraft_type,
            }
        } else {
            FlightRecord {
                flight_no,
                shared_codes,
                airlines: row.airline,
                airlines_code: None,
                dep_airport: other_city,
                dep_airport_code: None,
                arr_airport: self.airport_name.to_string(),
                arr_airport_code: Some(self.airport_code.to_string()),
                via_airports,
                dep_time: None,
                arr_time: scheduled,
                act_dep_time: None,
                act_arr_time: reported,
                date,
                terminal: row.terminal,
                gate: None,
                carousel: row.carousel,
                stand: None,
                status: row.status,
                aircraft_model: row.aircraft_type,
            }
        };
        Some(record)
    }

    async fn query_page(
        &self,
        ctx: &FetchContext<'_>,
        page: u32,
    ) -> Result<(u32, Vec<FlightRecord>), QueryError> {
        let params = ListParams {
            airport: self.airport_code,
            query_type: if ctx.direction.is_departure() { "DEP" } else { "ARR" },
            flight_type: if ctx.options.cargo { "2" } else { "1" },
            flight_no: ctx.form.flight_no.as_deref().unwrap_or(""),
            airline: ctx.form.airlines.as_deref().unwrap_or(""),
            city: ctx.form.airport.as_deref().unwrap_or(""),
            page_no: page,
            page_size: PAGE_SIZE,
        };
        let raw = ctx
            .client
            .post(API_URL)
            .json(&params)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let body: BoardResponse = match serde_json::from_str(&raw) {
            Ok(body) => body,
            Err(e) => {
                dump_page_snapshot(ctx.options, self.airport_name, &raw).await;
                return Err(QueryError::BadResponse {
                    source_name: "Shanghai",
                    reason: format!("board payload not understood: {e}"),
                });
            }
        };
        let records = body
            .list
            .into_iter()
            .filter_map(|row| self.parse_row(row, ctx.direction))
            .collect();
        Ok((body.pages.max(1), records))
    }
}

#[async_trait]
impl FlightSource for ShanghaiFetcher {
    fn airport_name(&self) -> &'static str {
        self.airport_name
    }

    fn airport_code(&self) -> &'static str {
        self.airport_code
    }

    fn inter_page_delay(&self) -> bool {
        true
    }

    #[instrument(level = "info", skip(self, ctx))]
    async fn begin(&mut self, ctx: &FetchContext<'_>) -> Result<PagePlan, QueryError> {
        // The page count only shows up in a response, so the first query
        // is also the discovery probe; its rows are kept for page 1.
        let (pages, records) = self.query_page(ctx, 1).await?;
        self.pages = pages;
        self.first_page = Some(SourcePage {
            records,
            has_next: pages > 1,
        });
        let start_page = self.estimate_start_page(ctx.target, pages);
        info!(pages, start_page, "discovered page bounds");
        Ok(PagePlan {
            start_page,
            max_page: Some(pages),
        })
    }

    #[instrument(level = "info", skip(self, ctx))]
    async fn fetch_page(
        &mut self,
        ctx: &FetchContext<'_>,
        page: u32,
    ) -> Result<SourcePage, QueryError> {
        if page == 1 {
            if let Some(cached) = self.first_page.take() {
                info!(page, count = cached.records.len(), "serving cached first page");
                return Ok(cached);
            }
        }
        let (pages, records) = self.query_page(ctx, page).await?;
        self.pages = pages;
        info!(page, count = records.len(), "parsed board page");
        Ok(SourcePage {
            records,
            has_next: page < pages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TimeKind;

    fn row_json() -> &'static str {
        r#"{
            "flightDate": "2025-04-14",
            "flightNos": ["MU 5137", "JL 5695"],
            "airline": "中国东方航空",
            "aircraftType": "B77W",
            "city": "北京首都",
            "schedTime": "15:00",
            "estimateTime": "15:24",
            "terminal": "T2",
            "gate": "C89",
            "carousel": "32",
            "status": "登机"
        }"#
    }

    #[test]
    fn test_departure_row_parse() {
        let row: BoardRow = serde_json::from_str(row_json()).unwrap();
        let record = ShanghaiFetcher::hongqiao()
            .parse_row(row, Direction::Departure)
            .unwrap();
        assert_eq!(record.flight_no, "MU5137");
        assert_eq!(record.shared_codes, vec!["JL5695"]);
        assert_eq!(record.dep_airport, "上海虹桥");
        assert_eq!(record.dep_airport_code.as_deref(), Some("SHA"));
        assert_eq!(record.arr_airport, "北京首都");
        assert_eq!(record.dep_time.as_deref(), Some("15:00"));
        let act = record.act_dep_time.unwrap();
        assert_eq!(act.kind, TimeKind::Estimated);
        assert_eq!(act.time, "15:24");
        assert_eq!(record.aircraft_model.as_deref(), Some("B77W"));
    }

    #[test]
    fn test_actual_time_beats_estimate() {
        let mut row: BoardRow = serde_json::from_str(row_json()).unwrap();
        row.actual_time = Some("15:31".to_string());
        let record = ShanghaiFetcher::pudong()
            .parse_row(row, Direction::Departure)
            .unwrap();
        let act = record.act_dep_time.unwrap();
        assert_eq!(act.kind, TimeKind::Actual);
        assert_eq!(act.time, "15:31");
    }

    #[test]
    fn test_arrival_row_uses_carousel() {
        let row: BoardRow = serde_json::from_str(row_json()).unwrap();
        let record = ShanghaiFetcher::pudong()
            .parse_row(row, Direction::Arrival)
            .unwrap();
        assert_eq!(record.arr_airport, "上海浦东");
        assert_eq!(record.dep_airport, "北京首都");
        assert_eq!(record.arr_time.as_deref(), Some("15:00"));
        assert_eq!(record.carousel.as_deref(), Some("32"));
    }

    #[test]
    fn test_rows_without_date_or_codes_dropped() {
        let fetcher = ShanghaiFetcher::hongqiao();
        let no_date: BoardRow =
            serde_json::from_str(r#"{"flightNos": ["MU5137"], "schedTime": "15:00"}"#).unwrap();
        assert!(fetcher.parse_row(no_date, Direction::Departure).is_none());
        let no_codes: BoardRow =
            serde_json::from_str(r#"{"flightDate": "2025-04-14", "schedTime": "15:00"}"#).unwrap();
        assert!(fetcher.parse_row(no_codes, Direction::Departure).is_none());
    }

    #[test]
    fn test_both_airports_share_the_fetcher() {
        assert_eq!(ShanghaiFetcher::hongqiao().airport_code(), "SHA");
        assert_eq!(ShanghaiFetcher::pudong().airport_code(), "PVG");
        assert_eq!(ShanghaiFetcher::hongqiao().airport_name(), "上海虹桥");
    }
}
