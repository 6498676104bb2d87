//! Shenzhen Bao'an (SZX) board fetcher.
//!
//! One JSON GET returns the whole board. Codeshare numbers arrive as an
//! `hbh` list whose first entry is the marketed flight; the other-end
//! airport is only a three-letter code. The source has no estimated-time
//! column, only scheme/real pairs.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, instrument, warn};

use super::{FetchContext, FlightSource, SourcePage};
use crate::errors::QueryError;
use crate::models::{FlightRecord, ReportedTime};
#[cfg(test)]
use crate::models::Direction;

const API_URL: &str = "https://www.szairport.com/szjchbjk/hbcx/flightInfo";

#[derive(Debug, Deserialize)]
struct BoardResponse {
    #[serde(rename = "flightList", default)]
    flight_list: Vec<BoardRow>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct BoardRow {
    hbh: Vec<CodeEntry>,
    craft_type: Option<String>,
    start_scheme_takeoff_time: Option<String>,
    start_real_takeoff_time: Option<String>,
    terminal_scheme_landin_time: Option<String>,
    terminal_real_landin_time: Option<String>,
    start_station_threecharcode: Option<String>,
    terminal_station_threecharcode: Option<String>,
    /// Terminal building.
    apot: Option<String>,
    gate_code: Option<String>,
    /// Baggage carousel.
    blls: Option<String>,
    flt_normal_status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CodeEntry {
    flight_no: Option<String>,
}

pub struct SzxFetcher;

impl SzxFetcher {
    pub fn new() -> Self {
        Self
    }

    fn parse_row(&self, row: BoardRow, ctx: &FetchContext<'_>) -> Option<FlightRecord> {
        let mut codes = row
            .hbh
            .iter()
            .filter_map(|entry| entry.flight_no.clone())
            .filter(|no| !no.is_empty());
        let flight_no = match codes.next() {
            Some(no) => no,
            None => {
                warn!("row without any flight number dropped");
                return None;
            }
        };
        let shared_codes: Vec<String> = codes.collect();

        let dep_time = row.start_scheme_takeoff_time.filter(|s| !s.is_empty());
        let arr_time = row.terminal_scheme_landin_time.filter(|s| !s.is_empty());
        let act_dep_time = row
            .start_real_takeoff_time
            .filter(|s| !s.is_empty())
            .map(ReportedTime::actual);
        let act_arr_time = row
            .terminal_real_landin_time
            .filter(|s| !s.is_empty())
            .map(ReportedTime::actual);
        // The API serves only the live day, with no date column.
        let date = ctx.target.date();

        let record = if ctx.direction.is_departure() {
            FlightRecord {
                flight_no,
                shared_codes,
                airlines: None,
                airlines_code: None,
                dep_airport: self.airport_name().to_string(),
                dep_airport_code: Some(self.airport_code().to_string()),
                arr_airport: row
                    .terminal_station_threecharcode
                    .clone()
                    .unwrap_or_else(|| "未知".to_string()),
                arr_airport_code: row.terminal_station_threecharcode,
                via_airports: vec![],
                dep_time,
                arr_time,
                act_dep_time,
                act_arr_time,
                date,
                terminal: row.apot,
                gate: row.gate_code,
                carousel: None,
                stand: None,
                status: row.flt_normal_status,
                aircraft_model: row.craft_type,
            }
        } else {
            FlightRecord {
                flight_no,
                shared_codes,
                airlines: None,
                airlines_code: None,
                dep_airport: row
                    .start_station_threecharcode
                    .clone()
                    .unwrap_or_else(|| "未知".to_string()),
                dep_airport_code: row.start_station_threecharcode,
                arr_airport: self.airport_name().to_string(),
                arr_airport_code: Some(self.airport_code().to_string()),
                via_airports: vec![],
                dep_time,
                arr_time,
                act_dep_time,
                act_arr_time,
                date,
                terminal: row.apot,
                gate: None,
                carousel: row.blls,
                stand: None,
                status: row.flt_normal_status,
                aircraft_model: row.craft_type,
            }
        };
        Some(record)
    }
}

#[async_trait]
impl FlightSource for SzxFetcher {
    fn airport_name(&self) -> &'static str {
        "深圳"
    }

    fn airport_code(&self) -> &'static str {
        "SZX"
    }

    #[instrument(level = "info", skip(self, ctx))]
    async fn fetch_page(
        &mut self,
        ctx: &FetchContext<'_>,
        page: u32,
    ) -> Result<SourcePage, QueryError> {
        let keyword = ctx
            .form
            .flight_no
            .clone()
            .or_else(|| ctx.form.airport.clone())
            .unwrap_or_default();
        let body: BoardResponse = ctx
            .client
            .get(API_URL)
            .query(&[
                ("type", "cn"),
                ("flag", if ctx.direction.is_departure() { "D" } else { "A" }),
                ("currentDate", "1"),
                // 12 spans the whole day; 0..11 are two-hour windows.
                ("currentTime", "12"),
                ("hbxx_hbh", keyword.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let records: Vec<FlightRecord> = body
            .flight_list
            .into_iter()
            .filter_map(|row| self.parse_row(row, ctx))
            .collect();
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
    use crate::fetchers::FetchOptions;
    use crate::models::{QueryFlightForm, TimeKind};
    use chrono::NaiveDate;

    fn ctx_parts() -> (reqwest::Client, QueryFlightForm, FetchOptions) {
        (
            reqwest::Client::new(),
            QueryFlightForm::default(),
            FetchOptions::default(),
        )
    }

    fn ctx<'a>(
        client: &'a reqwest::Client,
        form: &'a QueryFlightForm,
        options: &'a FetchOptions,
        direction: Direction,
    ) -> FetchContext<'a> {
        FetchContext {
            client,
            form,
            options,
            direction,
            target: NaiveDate::from_ymd_opt(2025, 4, 14)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
        }
    }

    fn row_json() -> &'static str {
        r#"{
            "hbh": [{"flightNo": "ZH9101"}, {"flightNo": "CA6702"}],
            "craftType": "A332",
            "startSchemeTakeoffTime": "13:05",
            "startRealTakeoffTime": "13:18",
            "terminalSchemeLandinTime": "15:45",
            "startStationThreecharcode": "SZX",
            "terminalStationThreecharcode": "PEK",
            "apot": "T3",
            "gateCode": "28",
            "blls": "6",
            "fltNormalStatus": "已起飞"
        }"#
    }

    #[test]
    fn test_departure_row_parse() {
        let row: BoardRow = serde_json::from_str(row_json()).unwrap();
        let (client, form, options) = ctx_parts();
        let ctx = ctx(&client, &form, &options, Direction::Departure);
        let record = SzxFetcher::new().parse_row(row, &ctx).unwrap();
        assert_eq!(record.flight_no, "ZH9101");
        assert_eq!(record.shared_codes, vec!["CA6702"]);
        assert_eq!(record.arr_airport_code.as_deref(), Some("PEK"));
        assert_eq!(record.dep_time.as_deref(), Some("13:05"));
        assert_eq!(record.act_dep_time.as_ref().unwrap().kind, TimeKind::Actual);
        assert_eq!(record.aircraft_model.as_deref(), Some("A332"));
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2025, 4, 14).unwrap());
    }

    #[test]
    fn test_arrival_row_uses_origin_and_carousel() {
        let row: BoardRow = serde_json::from_str(row_json()).unwrap();
        let (client, form, options) = ctx_parts();
        let ctx = ctx(&client, &form, &options, Direction::Arrival);
        let record = SzxFetcher::new().parse_row(row, &ctx).unwrap();
        assert_eq!(record.dep_airport, "SZX");
        assert_eq!(record.arr_airport, "深圳");
        assert_eq!(record.carousel.as_deref(), Some("6"));
    }

    #[test]
    fn test_row_without_codes_dropped() {
        let row: BoardRow = serde_json::from_str(r#"{"hbh": []}"#).unwrap();
        let (client, form, options) = ctx_parts();
        let ctx = ctx(&client, &form, &options, Direction::Departure);
        assert!(SzxFetcher::new().parse_row(row, &ctx).is_none());
    }
}
