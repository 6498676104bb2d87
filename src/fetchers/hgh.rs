//! Hangzhou Xiaoshan (HGH) board fetcher.
//!
//! Server-rendered HTML. The first page doubles as discovery: it carries
//! the airline filter options (display name + internal id) that later
//! queries need, and the pagination widget that reveals the page count.
//! Deeper pages are addressed by URL path segments
//! (`/flight/index/airline/<name>/p/<n>`), so the filter values have to be
//! resolved before the real query — querying by a name the site doesn't
//! know just serves page 1 again.
//!
//! Pages cover the day in equal slices starting at the 04:00 operational
//! reset, so the start page is a linear estimate rather than the shared
//! traffic-ratio table.

use async_trait::async_trait;
use chrono::{NaiveDateTime, Timelike};
use scraper::{Html, Selector};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::{FetchContext, FlightSource, PagePlan, SourcePage};
use crate::errors::QueryError;
use crate::models::{Direction, FlightRecord, ReportedTime};

const BASE_URL: &str = "https://www.hzairport.com";

#[derive(Debug, Default)]
struct PageQuery {
    city: Option<String>,
    identity: Option<String>,
    airline: Option<String>,
}

pub struct HghFetcher {
    query: PageQuery,
    first_page_html: Option<String>,
    max_page: u32,
}

impl HghFetcher {
    pub fn new() -> Self {
        Self {
            query: PageQuery::default(),
            first_page_html: None,
            max_page: 1,
        }
    }

    fn first_url(direction: Direction) -> &'static str {
        if direction.is_departure() {
            "https://www.hzairport.com/flight/index.html"
        } else {
            "https://www.hzairport.com/flight/arrive.html"
        }
    }

    fn build_page_url(&self, page: u32, direction: Direction) -> Result<Url, QueryError> {
        let mut path = String::from(if direction.is_departure() {
            "/flight/index/"
        } else {
            "/flight/arrive/"
        });
        if let Some(city) = &self.query.city {
            path.push_str(&format!("city/{}/", urlencoding::encode(city)));
        }
        if let Some(identity) = &self.query.identity {
            path.push_str(&format!("identity/{}/", urlencoding::encode(identity)));
        }
        if let Some(airline) = &self.query.airline {
            path.push_str(&format!("airline/{}/", urlencoding::encode(airline)));
        }
        path.push_str(&format!("p/{page}"));
        Url::parse(BASE_URL)
            .and_then(|base| base.join(&path))
            .map_err(|e| QueryError::BadResponse {
                source_name: "HGH",
                reason: format!("bad page url: {e}"),
            })
    }

    /// Match the user's airline text against the site's option list:
    /// name substring or exact id.
    fn discover_airline(document: &Html, wanted: &str) -> Option<String> {
        let option_sel = Selector::parse("div.flight_select li").unwrap();
        for option in document.select(&option_sel) {
            let name = option.text().collect::<String>().trim().to_string();
            let code = option.value().attr("data-id").unwrap_or("");
            if name.is_empty() {
                continue;
            }
            if name.contains(wanted) || code.eq_ignore_ascii_case(wanted) {
                return Some(name);
            }
        }
        warn!(wanted, "airline not in option list");
        None
    }

    /// The pagination widget lists page numbers with the tail hidden
    /// behind a "..N" entry; fewer than three entries means one page.
    fn discover_max_page(document: &Html) -> u32 {
        let num_sel = Selector::parse("div.page_con a.num").unwrap();
        let nums: Vec<String> = document
            .select(&num_sel)
            .map(|a| a.text().collect::<String>())
            .collect();
        if nums.len() <= 2 {
            return 1;
        }
        nums[nums.len() - 2]
            .trim()
            .trim_matches('.')
            .parse()
            .unwrap_or(1)
    }

    fn cell_text(row: &scraper::ElementRef<'_>, selector: &Selector) -> Option<String> {
        row.select(selector).next().map(|el| {
            el.text()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        })
    }

    fn parse_page_html(&self, html: &str, ctx: &FetchContext<'_>) -> Vec<FlightRecord> {
        let document = Html::parse_document(html);
        let row_sel = Selector::parse("div.timetable_item").unwrap();
        let code_sel = Selector::parse("div.flight p span.no").unwrap();
        let airline_sel = Selector::parse("div.flight p span.airline").unwrap();
        let time_sel = Selector::parse("div.time").unwrap();
        let city_sel = Selector::parse("div.city").unwrap();
        let terminal_sel = Selector::parse("div.terminal").unwrap();
        let gate_sel = Selector::parse("div.gate").unwrap();
        let baggage_sel = Selector::parse("div.baggage").unwrap();
        let stand_sel = Selector::parse("div.stand").unwrap();
        let status_sel = Selector::parse("div.status").unwrap();

        let mut records = Vec::new();
        for row in document.select(&row_sel) {
            let mut codes = row
                .select(&code_sel)
                .map(|el| el.text().collect::<String>().replace(' ', ""))
                .filter(|no| !no.is_empty());
            let Some(flight_no) = codes.next() else {
                warn!("row without flight number dropped");
                continue;
            };
            let shared_codes: Vec<String> = codes.collect();
            let airlines = row
                .select(&airline_sel)
                .next()
                .map(|el| el.text().collect::<String>().trim().to_string());

            let time = Self::cell_text(&row, &time_sel).filter(|s| !s.is_empty());
            let status = Self::cell_text(&row, &status_sel).filter(|s| !s.is_empty());
            let city = Self::cell_text(&row, &city_sel).filter(|s| !s.is_empty());
            let terminal = Self::cell_text(&row, &terminal_sel);
            let date = ctx.target.date();

            let record = if ctx.direction.is_departure() {
                let act_dep_time = status.as_deref().and_then(|s| {
                    if s.contains("启航") {
                        Some(ReportedTime::actual(s.replace("启航", "").trim()))
                    } else if s.contains("预计") {
                        Some(ReportedTime::estimated(s.replace("预计", "").trim()))
                    } else {
                        None
                    }
                });
                FlightRecord {
                    flight_no,
                    shared_codes,
                    airlines,
                    airlines_code: None,
                    dep_airport: self.airport_name().to_string(),
                    dep_airport_code: Some(self.airport_code().to_string()),
                    arr_airport: city.unwrap_or_else(|| "未知".to_string()),
                    arr_airport_code: None,
                    via_airports: vec![],
                    dep_time: time,
                    arr_time: None,
                    act_dep_time,
                    act_arr_time: None,
                    date,
                    terminal,
                    gate: Self::cell_text(&row, &gate_sel),
                    carousel: None,
                    stand: None,
                    status,
                    aircraft_model: None,
                }
            } else {
                let act_arr_time = status.as_deref().and_then(|s| {
                    if s.contains("到闸口") {
                        Some(ReportedTime::actual(s.to_string()))
                    } else if s.contains("预计") {
                        Some(ReportedTime::estimated(s.replace("预计", "").trim()))
                    } else {
                        None
                    }
                });
                FlightRecord {
                    flight_no,
                    shared_codes,
                    airlines,
                    airlines_code: None,
                    dep_airport: city.unwrap_or_else(|| "未知".to_string()),
                    dep_airport_code: None,
                    arr_airport: self.airport_name().to_string(),
                    arr_airport_code: Some(self.airport_code().to_string()),
                    via_airports: vec![],
                    dep_time: None,
                    arr_time: time,
                    act_dep_time: None,
                    act_arr_time,
                    date,
                    terminal,
                    gate: None,
                    carousel: Self::cell_text(&row, &baggage_sel),
                    stand: Self::cell_text(&row, &stand_sel),
                    status,
                    aircraft_model: None,
                }
            };
            records.push(record);
        }
        // A live board: rows before the target instant have already left.
        records.retain(|r| r.is_after(ctx.target, ctx.direction));
        records
    }
}

#[async_trait]
impl FlightSource for HghFetcher {
    fn airport_name(&self) -> &'static str {
        "杭州"
    }

    fn airport_code(&self) -> &'static str {
        "HGH"
    }

    fn inter_page_delay(&self) -> bool {
        true
    }

    /// Equal day slices from the 04:00 reset, stepped back one page so an
    /// exact boundary hit doesn't skip the flight just before it.
    fn estimate_start_page(&self, target: NaiveDateTime, max_page: u32) -> u32 {
        let max_page = max_page.max(1);
        let minutes_per_page = 1440.0 / max_page as f64;
        let current = target.time().hour() as f64 * 60.0
            + target.time().minute() as f64
            + target.time().second() as f64 / 60.0;
        let mut since_reset = current - 240.0;
        if since_reset < 0.0 {
            since_reset += 1440.0;
        }
        let page = (since_reset / minutes_per_page) as u32 + 1;
        let page = page.clamp(1, max_page);
        if page > 1 { page - 1 } else { page }
    }

    #[instrument(level = "info", skip(self, ctx))]
    async fn begin(&mut self, ctx: &FetchContext<'_>) -> Result<PagePlan, QueryError> {
        let first_url = Self::first_url(ctx.direction);
        let html = ctx
            .client
            .post(first_url)
            .form(&[("city", ""), ("identity", ""), ("airline", "")])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        {
            let document = Html::parse_document(&html);
            if let Some(wanted) = &ctx.form.airlines {
                self.query.airline = Self::discover_airline(&document, wanted);
            }
            self.max_page = Self::discover_max_page(&document);
        }
        self.query.identity = ctx.form.flight_no.clone();
        self.query.city = ctx.form.airport.clone();
        self.first_page_html = Some(html);

        let start_page = self.estimate_start_page(ctx.target, self.max_page);
        info!(max_page = self.max_page, start_page, "discovered page bounds");
        Ok(PagePlan {
            start_page,
            max_page: Some(self.max_page),
        })
    }

    #[instrument(level = "info", skip(self, ctx))]
    async fn fetch_page(
        &mut self,
        ctx: &FetchContext<'_>,
        page: u32,
    ) -> Result<SourcePage, QueryError> {
        let records = if page == 1 {
            let html = self.first_page_html.take().ok_or(QueryError::BadResponse {
                source_name: "HGH",
                reason: "first page requested before begin".to_string(),
            })?;
            self.parse_page_html(&html, ctx)
        } else {
            let url = self.build_page_url(page, ctx.direction)?;
            debug!(%url, "fetching board page");
            let html = ctx
                .client
                .get(url)
                .send()
                .await?
                .error_for_status()?
                .text()
                .await?;
            self.parse_page_html(&html, ctx)
        };
        info!(page, count = records.len(), "parsed board page");
        Ok(SourcePage {
            records,
            has_next: page < self.max_page,
        })
    }
}
