//! Seoul Gimpo (GMP) board fetcher.
//!
//! A single form POST returns the whole window in one page. Times come as
//! 4-digit "HHMM" strings; the remark field ("DEPARTED" / "ARRIVED")
//! decides whether the estimated-time column is already an actual time.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use super::{FetchContext, FlightSource, SourcePage};
use crate::errors::QueryError;
use crate::models::{Direction, FlightRecord, ReportedTime};
use crate::utils;

const API_URL: &str = "https://www.airport.co.kr/gimpochn/ajaxf/frPryInfoSvc/getPryInfoList.do";
const TIMEZONE: &str = "+09:00";

#[derive(Debug, Serialize)]
struct SearchParams {
    /// "O" outbound, "I" inbound.
    #[serde(rename = "pInoutGbn")]
    inout: &'static str,
    #[serde(rename = "pAirport")]
    airport: &'static str,
    #[serde(rename = "pActDate")]
    act_date: String,
    #[serde(rename = "pSthourMin")]
    start_hour_min: String,
    #[serde(rename = "pEnhourMin")]
    end_hour_min: String,
    #[serde(rename = "pCity")]
    city: String,
    #[serde(rename = "pAirline")]
    airline: String,
    #[serde(rename = "pAirlinenum")]
    airline_num: String,
    #[serde(rename = "p0")]
    p0: &'static str,
}

#[derive(Debug, Deserialize)]
struct BoardResponse {
    #[serde(default)]
    data: Option<BoardData>,
}

#[derive(Debug, Deserialize)]
struct BoardData {
    #[serde(default)]
    list: Vec<BoardRow>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BoardRow {
    #[serde(rename = "AIR_FLN")]
    flight_no: Option<String>,
    #[serde(rename = "AIR_ENG")]
    airline_eng: Option<String>,
    #[serde(rename = "AIR_IATA")]
    airline_iata: Option<String>,
    #[serde(rename = "STD")]
    std: Option<String>,
    #[serde(rename = "ETD")]
    etd: Option<String>,
    #[serde(rename = "RMK_ENG")]
    remark_eng: Option<String>,
    #[serde(rename = "RMK_CHN")]
    remark_chn: Option<String>,
    #[serde(rename = "ACT_C_DATE")]
    act_date: Option<String>,
    #[serde(rename = "CITY")]
    city: Option<String>,
    #[serde(rename = "ARRIVED_ENG")]
    arrived_eng: Option<String>,
    #[serde(rename = "GATE")]
    gate: Option<String>,
}

pub struct GmpFetcher;

impl GmpFetcher {
    pub fn new() -> Self {
        Self
    }

    /// "0835" → "08:35"; anything already colon-separated passes through.
    fn format_time(raw: &str) -> String {
        if raw.len() == 4 && raw.chars().all(|c| c.is_ascii_digit()) {
            format!("{}:{}", &raw[0..2], &raw[2..4])
        } else {
            raw.to_string()
        }
    }

    /// Best available name for the other-end airport.
    fn extract_airport(row: &BoardRow) -> String {
        row.arrived_eng
            .clone()
            .filter(|s| !s.is_empty())
            .or_else(|| row.city.clone().filter(|s| !s.is_empty()))
            .unwrap_or_else(|| "未知".to_string())
    }

    fn parse_row(&self, row: BoardRow, direction: Direction) -> Option<FlightRecord> {
        let flight_no = match &row.flight_no {
            Some(no) if !no.is_empty() => no.clone(),
            _ => {
                warn!("row without flight number dropped");
                return None;
            }
        };
        let date = match row
            .act_date
            .as_deref()
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y%m%d").ok())
        {
            Some(date) => date,
            None => {
                warn!(%flight_no, "row without flight date dropped");
                return None;
            }
        };

        let scheduled = row.std.as_deref().map(Self::format_time);
        let remark = row.remark_eng.as_deref().unwrap_or("").trim();
        let reported = row.etd.as_deref().map(Self::format_time).map(|etd| {
            let confirmed = if direction.is_departure() {
                remark == "DEPARTED"
            } else {
                remark == "ARRIVED"
            };
            if confirmed {
                ReportedTime::actual(etd)
            } else {
                ReportedTime::estimated(etd)
            }
        });

        let other_airport = Self::extract_airport(&row);
        let airlines = row.airline_eng.or_else(|| row.airline_iata.clone());
        let record = if direction.is_departure() {
            FlightRecord {
                flight_no,
                shared_codes: vec![],
                airlines,
                airlines_code: row.airline_iata,
                dep_airport: self.airport_name().to_string(),
                dep_airport_code: Some(self.airport_code().to_string()),
                arr_airport: other_airport,
                arr_airport_code: row.city,
                via_airports: vec![],
                dep_time: scheduled,
                arr_time: None,
                act_dep_time: reported,
                act_arr_time: None,
                date,
                terminal: None,
                gate: row.gate,
                carousel: None,
                stand: None,
                status: row.remark_chn,
                aircraft_model: None,
            }
        } else {
            FlightRecord {
                flight_no,
                shared_codes: vec![],
                airlines,
                airlines_code: row.airline_iata,
                dep_airport: other_airport,
                dep_airport_code: row.city,
                arr_airport: self.airport_name().to_string(),
                arr_airport_code: Some(self.airport_code().to_string()),
                via_airports: vec![],
                dep_time: None,
                arr_time: scheduled,
                act_dep_time: None,
                act_arr_time: reported,
                date,
                terminal: None,
                gate: None,
                carousel: row.gate,
                stand: None,
                status: row.remark_chn,
                aircraft_model: None,
            }
        };
        Some(record)
    }

    fn build_search_params(&self, ctx: &FetchContext<'_>) -> SearchParams {
        let now = utils::now_at_offset(self.utc_offset_minutes());
        SearchParams {
            inout: if ctx.direction.is_departure() { "O" } else { "I" },
            airport: self.airport_code(),
            act_date: now.format("%Y%m%d").to_string(),
            start_hour_min: now.format("%H:00").to_string(),
            end_hour_min: "23:59".to_string(),
            city: ctx.form.airport.clone().unwrap_or_default(),
            airline: ctx.form.airlines.clone().unwrap_or_default(),
            airline_num: ctx.form.flight_no.clone().unwrap_or_default(),
            p0: "",
        }
    }
}

#[async_trait]
impl FlightSource for GmpFetcher {
    fn airport_name(&self) -> &'static str {
        "首尔金浦"
    }

    fn airport_code(&self) -> &'static str {
        "GMP"
    }

    fn utc_offset_minutes(&self) -> i32 {
        utils::offset_minutes_from_str(TIMEZONE).unwrap_or(540)
    }

    #[instrument(level = "info", skip(self, ctx))]
    async fn fetch_page(
        &mut self,
        ctx: &FetchContext<'_>,
        page: u32,
    ) -> Result<SourcePage, QueryError> {
        let params = self.build_search_params(ctx);
        let body: BoardResponse = ctx
            .client
            .post(API_URL)
            .form(&params)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let rows = body.data.map(|d| d.list).unwrap_or_default();
        let records: Vec<FlightRecord> = rows
            .into_iter()
            .filter_map(|row| self.parse_row(row, ctx.direction))
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
    use crate::models::TimeKind;

    fn row(remark: &str) -> BoardRow {
        BoardRow {
            flight_no: Some("KE2711".to_string()),
            airline_eng: Some("KOREAN AIR".to_string()),
            airline_iata: Some("KE".to_string()),
            std: Some("0835".to_string()),
            etd: Some("0851".to_string()),
            remark_eng: Some(remark.to_string()),
            remark_chn: Some("出发".to_string()),
            act_date: Some("20250414".to_string()),
            city: Some("KIX".to_string()),
            arrived_eng: Some("OSAKA/KANSAI".to_string()),
            gate: Some("12".to_string()),
        }
    }

    #[test]
    fn test_format_time_inserts_colon() {
        assert_eq!(GmpFetcher::format_time("0835"), "08:35");
        assert_eq!(GmpFetcher::format_time("08:35"), "08:35");
    }

    #[test]
    fn test_departed_remark_makes_time_actual() {
        let record = GmpFetcher::new()
            .parse_row(row("DEPARTED"), Direction::Departure)
            .unwrap();
        assert_eq!(record.dep_time.as_deref(), Some("08:35"));
        let act = record.act_dep_time.unwrap();
        assert_eq!(act.kind, TimeKind::Actual);
        assert_eq!(act.time, "08:51");
        assert_eq!(record.airlines_code.as_deref(), Some("KE"));
        assert_eq!(record.arr_airport, "OSAKA/KANSAI");
    }

    #[test]
    fn test_pending_remark_keeps_time_estimated() {
        let record = GmpFetcher::new()
            .parse_row(row("BOARDING"), Direction::Departure)
            .unwrap();
        assert_eq!(record.act_dep_time.unwrap().kind, TimeKind::Estimated);
    }

    #[test]
    fn test_arrival_parse_swaps_sides() {
        let record = GmpFetcher::new()
            .parse_row(row("ARRIVED"), Direction::Arrival)
            .unwrap();
        assert_eq!(record.arr_airport, "首尔金浦");
        assert_eq!(record.dep_airport, "OSAKA/KANSAI");
        assert_eq!(record.arr_time.as_deref(), Some("08:35"));
        assert_eq!(record.act_arr_time.unwrap().kind, TimeKind::Actual);
    }

    #[test]
    fn test_row_without_date_is_dropped() {
        let mut bad = row("DEPARTED");
        bad.act_date = None;
        assert!(GmpFetcher::new().parse_row(bad, Direction::Departure).is_none());
    }
}
