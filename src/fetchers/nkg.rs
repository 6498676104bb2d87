//! Nanjing Lukou (NKG) board fetcher.
//!
//! The board is a server-rendered table driven by a search form. The form
//! selects (airline, destination city) take the site's internal codes, so
//! the base page is loaded first to read the option lists and translate
//! the user's text into codes. Rows stack codeshare numbers in one cell,
//! one per line; the header row is skipped.
//!
//! When a page comes back without the expected table at all, the body is
//! snapshotted to the diagnostics directory before failing — the markup
//! shifts occasionally and the snapshot is what fixes the selectors.

use async_trait::async_trait;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};

use super::{dump_page_snapshot, FetchContext, FlightSource, PagePlan, SourcePage};
use crate::errors::QueryError;
use crate::models::{Direction, FlightRecord, ReportedTime};

const DEP_URL: &str = "https://www.njiairport.com/cn/flightInformation1.html";
const ARR_URL: &str = "https://www.njiairport.com/cn/flightInformation2.html";

/// Board slang the site uses for some airframes.
static MODEL_TRANSLATOR: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| HashMap::from([("土狗", "A319")]));

#[derive(Debug, Default)]
struct PageQuery {
    flight_no: Option<String>,
    airline_code: Option<String>,
    city_code: Option<String>,
}

pub struct NkgFetcher {
    query: PageQuery,
    first_page_html: Option<String>,
}

impl NkgFetcher {
    pub fn new() -> Self {
        Self {
            query: PageQuery::default(),
            first_page_html: None,
        }
    }

    fn board_url(direction: Direction) -> &'static str {
        if direction.is_departure() { DEP_URL } else { ARR_URL }
    }

    /// Resolve option text like "中国东方航空" (or an exact code) to the
    /// site's internal value, skipping the catch-all entry.
    fn discover_option(document: &Html, selector: &str, wanted: &str, catch_all: &str) -> Option<String> {
        let sel = Selector::parse(selector).ok()?;
        for option in document.select(&sel) {
            let name = option.text().collect::<String>().trim().to_string();
            let code = option.value().attr("value").unwrap_or("").to_string();
            if name.contains(catch_all) || code.is_empty() {
                continue;
            }
            if name.contains(wanted) || code.eq_ignore_ascii_case(wanted) {
                return Some(code);
            }
        }
        warn!(wanted, selector, "option not found");
        None
    }

    /// One table cell as trimmed lines (codeshare cells stack one flight
    /// number per line).
    fn cell_lines(cell: &ElementRef<'_>) -> Vec<String> {
        cell.text()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn cell_at(cells: &[ElementRef<'_>], index: usize) -> Option<String> {
        cells
            .get(index)
            .map(|c| Self::cell_lines(c).join(" "))
            .filter(|s| !s.is_empty())
    }

    fn parse_row(&self, cells: &[ElementRef<'_>], direction: Direction) -> Option<FlightRecord> {
        let date = match Self::cell_at(cells, 0)
            .and_then(|d| NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").ok())
        {
            Some(date) => date,
            None => {
                warn!("row without flight date dropped");
                return None;
            }
        };
        let codes = cells.get(1).map(|c| Self::cell_lines(c)).unwrap_or_default();
        let Some(flight_no) = codes.first().cloned() else {
            warn!("row without flight number dropped");
            return None;
        };
        let shared_codes = codes[1..].to_vec();

        let airlines = Self::cell_at(cells, 2);
        let aircraft_model = Self::cell_at(cells, 3).map(|m| {
            MODEL_TRANSLATOR
                .get(m.as_str())
                .map(|t| t.to_string())
                .unwrap_or(m)
        });
        let scheduled = Self::cell_at(cells, 6);
        let estimated = Self::cell_at(cells, 7);
        let actual = Self::cell_at(cells, 8);
        let reported = actual
            .map(ReportedTime::actual)
            .or(estimated.map(ReportedTime::estimated));
        let terminal = Self::cell_at(cells, 9);
        let status = Self::cell_at(cells, 11);

        let record = if direction.is_departure() {
            FlightRecord {
                flight_no,
                shared_codes,
                airlines,
                airlines_code: None,
                dep_airport: self.airport_name().to_string(),
                dep_airport_code: Some(self.airport_code().to_string()),
                arr_airport: Self::cell_at(cells, 5).unwrap_or_else(|| "未知".to_string()),
                arr_airport_code: None,
                via_airports: Self::cell_at(cells, 4).into_iter().collect(),
                dep_time: scheduled,
                arr_time: None,
                act_dep_time: reported,
                act_arr_time: None,
                date,
                terminal,
                gate: Self::cell_at(cells, 10),
                carousel: None,
                stand: None,
                status,
                aircraft_model,
            }
        } else {
            FlightRecord {
                flight_no,
                shared_codes,
                airlines,
                airlines_code: None,
                dep_airport: Self::cell_at(cells, 4).unwrap_or_else(|| "未知".to_string()),
                dep_airport_code: None,
                arr_airport: self.airport_name().to_string(),
                arr_airport_code: Some(self.airport_code().to_string()),
                via_airports: Self::cell_at(cells, 5).into_iter().collect(),
                dep_time: None,
                arr_time: scheduled,
                act_dep_time: None,
                act_arr_time: reported,
                date,
                terminal,
                gate: None,
                carousel: Self::cell_at(cells, 10),
                stand: None,
                status,
                aircraft_model,
            }
        };
        Some(record)
    }

    /// Parse one board page into rows plus the has-next signal. `None`
    /// when the page carries no flight table at all.
    fn parse_page_html(&self, html: &str, direction: Direction) -> Option<SourcePage> {
        let document = Html::parse_document(html);
        let table_sel = Selector::parse("div.hangbanList table").unwrap();
        let row_sel = Selector::parse("tr").unwrap();
        let cell_sel = Selector::parse("td").unwrap();
        let next_sel = Selector::parse("ul.pagination li a").unwrap();

        let table = document.select(&table_sel).next()?;
        let mut records = Vec::new();
        // First row is the header.
        for row in table.select(&row_sel).skip(1) {
            let cells: Vec<ElementRef<'_>> = row.select(&cell_sel).collect();
            if cells.is_empty() {
                continue;
            }
            if let Some(record) = self.parse_row(&cells, direction) {
                records.push(record);
            }
        }
        let has_next = document
            .select(&next_sel)
            .any(|a| a.text().collect::<String>().trim() == "»");
        Some(SourcePage { records, has_next })
    }

    fn page_params(&self, page: u32) -> Vec<(&'static str, String)> {
        let mut params = vec![("page", page.to_string())];
        if let Some(no) = &self.query.flight_no {
            params.push(("flightnumber", no.clone()));
        }
        if let Some(code) = &self.query.airline_code {
            params.push(("airlines", code.clone()));
        }
        if let Some(code) = &self.query.city_code {
            params.push(("address", code.clone()));
        }
        params
    }
}

#[async_trait]
impl FlightSource for NkgFetcher {
    fn airport_name(&self) -> &'static str {
        "南京"
    }

    fn airport_code(&self) -> &'static str {
        "NKG"
    }

    fn inter_page_delay(&self) -> bool {
        true
    }

    #[instrument(level = "info", skip(self, ctx))]
    async fn begin(&mut self, ctx: &FetchContext<'_>) -> Result<PagePlan, QueryError> {
        let url = Self::board_url(ctx.direction);
        let html = ctx
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        {
            let document = Html::parse_document(&html);
            if let Some(wanted) = &ctx.form.airlines {
                self.query.airline_code =
                    Self::discover_option(&document, "select#airlines option", wanted, "所有航空公司");
            }
            if let Some(wanted) = &ctx.form.airport {
                self.query.city_code =
                    Self::discover_option(&document, "select[name=\"address\"] option", wanted, "所有城市");
            }
        }
        self.query.flight_no = ctx.form.flight_no.clone();

        let filtered = self.query.flight_no.is_some()
            || self.query.airline_code.is_some()
            || self.query.city_code.is_some();
        if !filtered {
            // The plain board page is already page 1 of the unfiltered
            // query; keep it instead of fetching again.
            self.first_page_html = Some(html);
        }
        debug!(filtered, "query prepared");
        Ok(PagePlan::default())
    }

    #[instrument(level = "info", skip(self, ctx))]
    async fn fetch_page(
        &mut self,
        ctx: &FetchContext<'_>,
        page: u32,
    ) -> Result<SourcePage, QueryError> {
        let html = match self.first_page_html.take().filter(|_| page == 1) {
            Some(html) => html,
            None => {
                ctx.client
                    .get(Self::board_url(ctx.direction))
                    .query(&self.page_params(page))
                    .send()
                    .await?
                    .error_for_status()?
                    .text()
                    .await?
            }
        };

        match self.parse_page_html(&html, ctx.direction) {
            Some(parsed) => {
                info!(page, count = parsed.records.len(), "parsed board page");
                Ok(parsed)
            }
            None => {
                dump_page_snapshot(ctx.options, self.airport_name(), &html).await;
                Err(QueryError::BadResponse {
                    source_name: "NKG",
                    reason: "flight table not found in page".to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TimeKind;

    const PAGE_HTML: &str = r#"
        <html><body>
        <select id="airlines">
            <option value="">所有航空公司</option>
            <option value="CZ">中国南方航空</option>
            <option value="MU">中国东方航空</option>
        </select>
        <select name="address">
            <option value="">所有城市</option>
            <option value="PEK">北京</option>
        </select>
        <div class="hangbanList">
        <table>
            <tr><th>日期</th><th>航班号</th></tr>
            <tr>
                <td>2025-04-14</td>
                <td><p>MU2809</p><p>FM9321</p></td>
                <td>中国东方航空</td>
                <td>土狗</td>
                <td></td>
                <td>广州</td>
                <td>10:25</td>
                <td>10:40</td>
                <td></td>
                <td>T2</td>
                <td>23</td>
                <td>延误</td>
            </tr>
            <tr>
                <td>not-a-date</td>
                <td><p>XX123</p></td>
            </tr>
            <tr>
                <td>2025-04-14</td>
                <td><p>CZ3104</p></td>
                <td>中国南方航空</td>
                <td>A380</td>
                <td></td>
                <td>北京首都</td>
                <td>09:00</td>
                <td></td>
                <td>09:02</td>
                <td>T2</td>
                <td>27</td>
                <td>已起飞</td>
            </tr>
        </table>
        </div>
        <ul class="pagination"><li><a>1</a></li><li><a>»</a></li></ul>
        </body></html>
    "#;

    #[test]
    fn test_parse_page_drops_bad_row_and_keeps_rest() {
        let fetcher = NkgFetcher::new();
        let page = fetcher
            .parse_page_html(PAGE_HTML, Direction::Departure)
            .unwrap();
        // Three body rows, one without a parseable date.
        assert_eq!(page.records.len(), 2);
        assert!(page.has_next);
    }

    #[test]
    fn test_codeshare_and_model_translation() {
        let fetcher = NkgFetcher::new();
        let page = fetcher
            .parse_page_html(PAGE_HTML, Direction::Departure)
            .unwrap();
        let record = &page.records[0];
        assert_eq!(record.flight_no, "MU2809");
        assert_eq!(record.shared_codes, vec!["FM9321"]);
        // Board slang translated to the airframe code.
        assert_eq!(record.aircraft_model.as_deref(), Some("A319"));
        assert_eq!(record.dep_time.as_deref(), Some("10:25"));
        let act = record.act_dep_time.as_ref().unwrap();
        assert_eq!(act.kind, TimeKind::Estimated);
        assert_eq!(act.time, "10:40");
    }

    #[test]
    fn test_actual_time_wins_over_estimate() {
        let fetcher = NkgFetcher::new();
        let page = fetcher
            .parse_page_html(PAGE_HTML, Direction::Departure)
            .unwrap();
        let record = &page.records[1];
        assert_eq!(record.flight_no, "CZ3104");
        let act = record.act_dep_time.as_ref().unwrap();
        assert_eq!(act.kind, TimeKind::Actual);
        assert_eq!(act.time, "09:02");
    }

    #[test]
    fn test_arrival_parse_swaps_city_columns() {
        let fetcher = NkgFetcher::new();
        let page = fetcher
            .parse_page_html(PAGE_HTML, Direction::Arrival)
            .unwrap();
        let record = &page.records[0];
        // Column 4 is the origin on the arrival board.
        assert_eq!(record.arr_airport, "南京");
        assert_eq!(record.arr_time.as_deref(), Some("10:25"));
        assert_eq!(record.carousel.as_deref(), Some("23"));
    }

    #[test]
    fn test_option_discovery() {
        let document = Html::parse_document(PAGE_HTML);
        assert_eq!(
            NkgFetcher::discover_option(&document, "select#airlines option", "东方", "所有航空公司"),
            Some("MU".to_string())
        );
        assert_eq!(
            NkgFetcher::discover_option(&document, "select#airlines option", "cz", "所有航空公司"),
            Some("CZ".to_string())
        );
        assert_eq!(
            NkgFetcher::discover_option(&document, "select[name=\"address\"] option", "北京", "所有城市"),
            Some("PEK".to_string())
        );
        assert_eq!(
            NkgFetcher::discover_option(&document, "select#airlines option", "不存在", "所有航空公司"),
            None
        );
    }

    #[test]
    fn test_missing_table_is_a_structural_failure() {
        let fetcher = NkgFetcher::new();
        assert!(fetcher
            .parse_page_html("<html><body>维护中</body></html>", Direction::Departure)
            .is_none());
    }
}
