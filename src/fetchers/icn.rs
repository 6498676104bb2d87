//! Seoul Incheon (ICN) board fetcher.
//!
//! Departures and arrivals live on separate form-POST endpoints that share
//! one row schema. Codeshare rows are duplicated by the source with a
//! `codeshare = "Slave"` marker and are skipped, keeping only the master
//! row. Up to three via airports arrive as `airportName2..4`.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::{FetchContext, FlightSource, SourcePage};
use crate::errors::QueryError;
use crate::models::{Direction, FlightRecord, ReportedTime};
use crate::utils;

const DEP_API_URL: &str = "https://www.airport.kr/dep/ap_ch/getDepPasSchList.do";
const ARR_API_URL: &str = "https://www.airport.kr/arr/ap_ch/getArrPasSchList.do";
const TIMEZONE: &str = "+09:00";

/// The endpoint wants the time window stated four different ways; all of
/// them are required or the query silently returns nothing.
#[derive(Debug, Serialize)]
struct SearchParams {
    intg: &'static str,
    #[serde(rename = "keyWord")]
    key_word: &'static str,
    #[serde(rename = "curDate")]
    cur_date: String,
    #[serde(rename = "startTime")]
    start_time: String,
    #[serde(rename = "endTime")]
    end_time: String,
    #[serde(rename = "todayDate")]
    today_date: String,
    #[serde(rename = "tomorrowDate")]
    tomorrow_date: String,
    #[serde(rename = "todayTime")]
    today_time: String,
    #[serde(rename = "curSTime")]
    cur_s_time: String,
    #[serde(rename = "curETime")]
    cur_e_time: String,
    #[serde(rename = "fromTime")]
    from_time: String,
    #[serde(rename = "toTime")]
    to_time: String,
    #[serde(rename = "siteId")]
    site_id: &'static str,
    #[serde(rename = "langSe")]
    lang: &'static str,
    #[serde(rename = "scheduleListLength")]
    schedule_list_length: &'static str,
    #[serde(rename = "termId")]
    terminal: String,
    #[serde(rename = "daySel")]
    day_sel: String,
    airport: String,
    airline: String,
    airplane: String,
}

#[derive(Debug, Deserialize)]
struct BoardResponse {
    #[serde(rename = "scheduleList", default)]
    schedule_list: Vec<BoardRow>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BoardRow {
    codeshare: Option<String>,
    masterflight: Option<String>,
    #[serde(rename = "airlineNameCh")]
    airline_name_ch: Option<String>,
    #[serde(rename = "flightCarrier")]
    flight_carrier: Option<String>,
    /// Scheduled "HH:MM".
    stime: Option<String>,
    /// Estimated "HH:MM".
    etime: Option<String>,
    /// Confirmed block time, "%Y%m%d%H%M".
    btime: Option<String>,
    sdate: Option<String>,
    #[serde(rename = "airportName1")]
    airport_name1: Option<String>,
    #[serde(rename = "airportName1En")]
    airport_name1_en: Option<String>,
    #[serde(rename = "airportName2")]
    airport_name2: Option<String>,
    #[serde(rename = "airportName3")]
    airport_name3: Option<String>,
    #[serde(rename = "airportName4")]
    airport_name4: Option<String>,
    p1code: Option<String>,
    terminal: Option<String>,
    gatenumber: Option<String>,
    carousel: Option<String>,
    stattxt: Option<String>,
}

pub struct IcnFetcher;

impl IcnFetcher {
    pub fn new() -> Self {
        Self
    }

    fn extract_airport(row: &BoardRow) -> String {
        row.airport_name1
            .clone()
            .filter(|s| !s.is_empty())
            .or_else(|| row.airport_name1_en.clone().filter(|s| !s.is_empty()))
            .or_else(|| row.p1code.clone().filter(|s| !s.is_empty()))
            .unwrap_or_else(|| "未知".to_string())
    }

    fn via_airports(row: &BoardRow) -> Vec<String> {
        [&row.airport_name2, &row.airport_name3, &row.airport_name4]
            .into_iter()
            .map_while(|name| name.clone().filter(|s| !s.is_empty()))
            .collect()
    }

    /// Confirmed block time beats the estimate; either way the tag says
    /// which one survived.
    fn reported_time(row: &BoardRow) -> Option<ReportedTime> {
        if let Some(btime) = row.btime.as_deref().filter(|s| !s.is_empty()) {
            match NaiveDateTime::parse_from_str(btime, "%Y%m%d%H%M") {
                Ok(t) => return Some(ReportedTime::actual(t.format("%H:%M").to_string())),
                Err(_) => warn!(btime, "unparseable block time"),
            }
        }
        row.etime
            .clone()
            .filter(|s| !s.is_empty())
            .map(ReportedTime::estimated)
    }

    fn parse_row(&self, row: BoardRow, direction: Direction) -> Option<FlightRecord> {
        if row.codeshare.as_deref() == Some("Slave") {
            debug!("codeshare slave row skipped");
            return None;
        }
        let flight_no = match &row.masterflight {
            Some(no) if !no.is_empty() => no.clone(),
            _ => {
                warn!("row without flight number dropped");
                return None;
            }
        };
        let date = match row
            .sdate
            .as_deref()
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y%m%d").ok())
        {
            Some(date) => date,
            None => {
                warn!(%flight_no, "row without flight date dropped");
                return None;
            }
        };

        let reported = Self::reported_time(&row);
        let other_airport = Self::extract_airport(&row);
        let via_airports = Self::via_airports(&row);
        let airlines = row
            .airline_name_ch
            .clone()
            .or_else(|| row.flight_carrier.clone());

        let record = if direction.is_departure() {
            FlightRecord {
                flight_no,
                shared_codes: vec![],
                airlines,
                airlines_code: row.flight_carrier,
                dep_airport: self.airport_name().to_string(),
                dep_airport_code: Some(self.airport_code().to_string()),
                arr_airport: other_airport,
                arr_airport_code: row.p1code,
                via_airports,
                dep_time: row.stime,
                arr_time: None,
                act_dep_time: reported,
                act_arr_time: None,
                date,
                terminal: row.terminal,
                gate: row.gatenumber,
                carousel: None,
                stand: None,
                status: row.stattxt,
                aircraft_model: None,
            }
        } else {
            FlightRecord {
                flight_no,
                shared_codes: vec![],
                airlines,
                airlines_code: row.flight_carrier,
                dep_airport: other_airport,
                dep_airport_code: row.p1code,
                arr_airport: self.airport_name().to_string(),
                arr_airport_code: Some(self.airport_code().to_string()),
                via_airports,
                dep_time: None,
                arr_time: row.stime,
                act_dep_time: None,
                act_arr_time: reported,
                date,
                terminal: row.terminal,
                gate: None,
                carousel: row.carousel,
                stand: None,
                status: row.stattxt,
                aircraft_model: None,
            }
        };
        Some(record)
    }

    fn build_search_params(&self, ctx: &FetchContext<'_>) -> SearchParams {
        let now = utils::now_at_offset(self.utc_offset_minutes());
        let today = now.format("%Y%m%d").to_string();
        let tomorrow = (now + Duration::days(1)).format("%Y%m%d").to_string();
        let window_start = now.format("%H00").to_string();
        let window_end = now.format("%H59").to_string();
        SearchParams {
            intg: "",
            key_word: "",
            cur_date: today.clone(),
            start_time: window_start.clone(),
            end_time: window_end.clone(),
            today_date: today.clone(),
            tomorrow_date: tomorrow,
            today_time: now.format("%H:%M").to_string(),
            cur_s_time: window_start.clone(),
            cur_e_time: window_end.clone(),
            from_time: window_start,
            to_time: window_end,
            site_id: "ap_ch",
            lang: "zh",
            schedule_list_length: "",
            terminal: ctx
                .options
                .terminal
                .as_deref()
                .unwrap_or("")
                .to_uppercase(),
            day_sel: today,
            airport: ctx.form.airport.clone().unwrap_or_default(),
            airline: ctx.form.airlines.clone().unwrap_or_default(),
            airplane: ctx.form.flight_no.clone().unwrap_or_default(),
        }
    }
}

#[async_trait]
impl FlightSource for IcnFetcher {
    fn airport_name(&self) -> &'static str {
        "首尔仁川"
    }

    fn airport_code(&self) -> &'static str {
        "ICN"
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
        let url = if ctx.direction.is_departure() {
            DEP_API_URL
        } else {
            ARR_API_URL
        };
        let params = self.build_search_params(ctx);
        let body: BoardResponse = ctx
            .client
            .post(url)
            .form(&params)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let records: Vec<FlightRecord> = body
            .schedule_list
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
