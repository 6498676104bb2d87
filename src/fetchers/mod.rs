//! Per-airport flight-board fetchers and the shared fetch orchestration.
//!
//! Every airport publishes its board differently — JSON APIs, form posts,
//! server-rendered HTML — so each source gets a small adapter implementing
//! [`FlightSource`], and one orchestrator ([`fetch_flights`]) owns the
//! control flow they all share: estimate a start page, fetch page by page,
//! parse and filter incrementally, stop on the result or page budget, sort
//! and truncate.
//!
//! # Supported airports
//!
//! | Airport | Module | Method | Notes |
//! |---------|--------|--------|-------|
//! | Guangzhou CAN | [`can`] | JSON POST | `pageNum`/`pages` pagination, cargo + terminal params |
//! | Seoul Gimpo GMP | [`gmp`] | form POST | single page, `HHMM` times, DEPARTED/ARRIVED remark |
//! | Hangzhou HGH | [`hgh`] | HTML | airline-option discovery, page count from pagination widget |
//! | Hong Kong HKG | [`hkg`] | JSON REST | memoized airport-code table, status-text time tags |
//! | Seoul Incheon ICN | [`icn`] | form POST | separate dep/arr endpoints, codeshare Slave rows skipped |
//! | Nanjing NKG | [`nkg`] | HTML | table rows with stacked flight codes, next-page paging |
//! | Shenzhen SZX | [`szx`] | JSON GET | `hbh` codeshare list, single page |
//! | Shanghai SHA/PVG | [`shanghai`] | JSON POST | one fetcher for both airports, traffic-ratio paging |
//!
//! Fetchers parse rows into [`FlightRecord`](crate::models::FlightRecord);
//! a row missing a required field is logged and dropped, never replaced
//! with a half-empty record.

pub mod can;
pub mod gmp;
pub mod hgh;
pub mod hkg;
pub mod icn;
pub mod nkg;
pub mod shanghai;
pub mod szx;

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use itertools::Itertools;
use rand::{rng, Rng};
use std::cmp::Ordering;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use crate::errors::QueryError;
use crate::filters::{apply_filters, Alliance};
use crate::models::{Direction, FlightRecord, QueryFlightForm};
use crate::utils;

/// Recognized per-fetch options with their defaults.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Query the arrival board instead of departures.
    pub arrivals: bool,
    /// Query cargo flights where the source distinguishes them.
    pub cargo: bool,
    /// Cap on returned records.
    pub max_result: usize,
    /// Hard ceiling on page round-trips, whether or not `max_result` was
    /// reached. Protects against runaway paging on noisy sources.
    pub max_fetch_page: u32,
    /// Start from this page instead of the source's estimate.
    pub from_page: Option<u32>,
    /// Terminal filter, where the source supports one.
    pub terminal: Option<String>,
    /// Where failing page snapshots are written; `None` disables them.
    pub diagnostics_dir: Option<PathBuf>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            arrivals: false,
            cargo: false,
            max_result: 20,
            max_fetch_page: 3,
            from_page: None,
            terminal: None,
            diagnostics_dir: None,
        }
    }
}

/// Everything a source needs to build its requests for one query.
pub struct FetchContext<'a> {
    pub client: &'a reqwest::Client,
    pub form: &'a QueryFlightForm,
    pub options: &'a FetchOptions,
    pub direction: Direction,
    /// Reference instant in the airport's local frame: `form.at_time`, or
    /// "now" at the airport's offset.
    pub target: NaiveDateTime,
}

/// Where to start paging, produced by [`FlightSource::begin`].
#[derive(Debug, Clone, Copy)]
pub struct PagePlan {
    pub start_page: u32,
    /// Total pages when the source reveals them up front.
    pub max_page: Option<u32>,
}

impl Default for PagePlan {
    fn default() -> Self {
        Self {
            start_page: 1,
            max_page: None,
        }
    }
}

/// One fetched-and-parsed page of board rows.
#[derive(Debug, Clone, Default)]
pub struct SourcePage {
    pub records: Vec<FlightRecord>,
    /// Whether the source reports further pages after this one.
    pub has_next: bool,
}

/// Capability interface one airport source implements.
///
/// Implementations own the source-specific request building, row parsing
/// and paging signals; [`fetch_flights`] owns everything else. Instances
/// are created per query by the registry, so they may cache discovered
/// state (option lists, page counts, a held first page) in `&mut self`.
#[async_trait]
pub trait FlightSource: Send {
    /// Display name used in replies and diagnostics.
    fn airport_name(&self) -> &'static str;
    /// IATA code of the airport this source covers.
    fn airport_code(&self) -> &'static str;
    /// The airport's UTC offset in minutes.
    fn utc_offset_minutes(&self) -> i32 {
        480
    }
    /// Per-band traffic distribution used for start-page estimation.
    fn traffic_ratios(&self) -> [f64; 5] {
        utils::DEFAULT_TRAFFIC_RATIOS
    }
    /// Guess which page holds flights near `target`.
    fn estimate_start_page(&self, target: NaiveDateTime, max_page: u32) -> u32 {
        utils::estimate_page_by_time(target.time(), max_page, &self.traffic_ratios(), 0)
    }
    /// Whether to pause between page fetches (sources that watch for
    /// scraping get a 1–2 s jitter).
    fn inter_page_delay(&self) -> bool {
        false
    }
    /// Prepare the session: discover filter-option values, read page
    /// bounds, pick a start page. The default plan starts at page 1 with
    /// unknown bounds.
    async fn begin(&mut self, _ctx: &FetchContext<'_>) -> Result<PagePlan, QueryError> {
        Ok(PagePlan::default())
    }
    /// Fetch and parse one page (1-based). Unparseable rows are dropped
    /// inside the implementation.
    async fn fetch_page(&mut self, ctx: &FetchContext<'_>, page: u32) -> Result<SourcePage, QueryError>;
}

/// Run one flight-board query against a source.
///
/// Control flow shared by every source: begin (discover options, estimate
/// the start page) → fetch a page → parse → filter → accumulate, stopping
/// when `max_result` records are collected, the `max_fetch_page` budget is
/// spent, or the source reports no further pages. If a fetched page's last
/// flight is still before the target instant and pages remain, the start
/// estimate undershot: advance a page and reset the budget instead of
/// spending it on the seek. Results are deduplicated by flight number and
/// date, sorted by the derived scheduled timestamp — records with no
/// derivable timestamp sort last, in arrival order — and truncated.
///
/// A page failure after at least one good page returns the partial result;
/// a failure on the first page propagates.
#[instrument(level = "info", skip_all, fields(airport = source.airport_code()))]
pub async fn fetch_flights(
    source: &mut dyn FlightSource,
    client: &reqwest::Client,
    form: &QueryFlightForm,
    options: &FetchOptions,
) -> Result<Vec<FlightRecord>, QueryError> {
    let direction = if options.arrivals {
        Direction::Arrival
    } else {
        Direction::Departure
    };
    // Fail an unknown alliance name before any network traffic.
    if let Some(name) = &form.alliance {
        Alliance::resolve(name)?;
    }

    let now = utils::now_at_offset(source.utc_offset_minutes()).naive_local();
    let target = form.at_time.unwrap_or(now);
    let ctx = FetchContext {
        client,
        form,
        options,
        direction,
        target,
    };

    let plan = source.begin(&ctx).await?;
    let mut page = options.from_page.unwrap_or(plan.start_page).max(1);
    if let Some(max) = plan.max_page {
        page = page.min(max.max(1));
    }
    info!(start_page = page, max_page = ?plan.max_page, %target, "fetch plan ready");

    // The undershoot rule below resets the page budget, so a second,
    // absolute ceiling keeps a source that always claims another page
    // from seeking forever.
    const TOTAL_PAGE_CEILING: u32 = 64;

    let mut flights: Vec<FlightRecord> = Vec::new();
    let mut fetched_pages = 0u32;
    let mut total_fetches = 0u32;
    loop {
        if fetched_pages >= options.max_fetch_page {
            info!(fetched_pages, "page budget exhausted");
            break;
        }
        if total_fetches >= TOTAL_PAGE_CEILING {
            warn!(total_fetches, "absolute page ceiling reached");
            break;
        }
        let fetched = match source.fetch_page(&ctx, page).await {
            Ok(fetched) => fetched,
            Err(e) if !flights.is_empty() => {
                warn!(error = %e, page, "page fetch failed, keeping partial results");
                break;
            }
            Err(e) => return Err(e),
        };
        fetched_pages += 1;
        total_fetches += 1;

        let more_pages = fetched.has_next && plan.max_page.map(|max| page < max).unwrap_or(true);
        let last_time = fetched
            .records
            .iter()
            .rev()
            .find_map(|r| r.get_time(direction));
        let page_records = apply_filters(fetched.records, form, direction)?;
        debug!(page, kept = page_records.len(), "page processed");
        flights.extend(page_records);

        if flights.len() >= options.max_result {
            info!(count = flights.len(), "reached max result count");
            break;
        }
        if !more_pages {
            break;
        }
        if last_time.is_some_and(|last| last < ctx.target) {
            // The start-page estimate undershot the target; seeking
            // forward doesn't spend the page budget.
            debug!(page, "page ends before target, advancing");
            fetched_pages = 0;
        }
        page += 1;
        if source.inter_page_delay() {
            sleep(Duration::from_millis(rng().random_range(1000..=2000))).await;
        }
    }

    let mut flights: Vec<FlightRecord> = flights
        .into_iter()
        .unique_by(|f| (f.flight_no.clone(), f.date))
        .collect();
    flights.sort_by(|a, b| match (a.get_time(direction), b.get_time(direction)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
    flights.truncate(options.max_result);
    info!(count = flights.len(), "fetch complete");
    Ok(flights)
}

/// Resolve a user-supplied airport token — city name or IATA code,
/// case-insensitive — to a fetcher. Unknown tokens are rejected, never
/// silently defaulted.
pub fn airport_fetcher(token: &str) -> Result<Box<dyn FlightSource>, QueryError> {
    let normalized = token.trim().to_uppercase();
    let fetcher: Box<dyn FlightSource> = match normalized.as_str() {
        "广州" | "CAN" => Box::new(can::CanFetcher::new()),
        "金浦" | "首尔金浦" | "GMP" => Box::new(gmp::GmpFetcher::new()),
        "杭州" | "HGH" => Box::new(hgh::HghFetcher::new()),
        "香港" | "HKG" => Box::new(hkg::HkgFetcher::new()),
        "仁川" | "首尔仁川" | "ICN" => Box::new(icn::IcnFetcher::new()),
        "南京" | "NKG" => Box::new(nkg::NkgFetcher::new()),
        "深圳" | "SZX" => Box::new(szx::SzxFetcher::new()),
        "上海" | "虹桥" | "SHA" => Box::new(shanghai::ShanghaiFetcher::hongqiao()),
        "浦东" | "PVG" => Box::new(shanghai::ShanghaiFetcher::pudong()),
        _ => return Err(QueryError::UnsupportedAirport(token.to_string())),
    };
    Ok(fetcher)
}

/// Build the HTTP client every fetcher shares for one query.
pub fn build_client(user_agent: &str) -> Result<reqwest::Client, QueryError> {
    Ok(reqwest::Client::builder().user_agent(user_agent).build()?)
}

/// Write a failing page body next to the other diagnostics so the row
/// parser can be fixed against what the source actually served.
pub(crate) async fn dump_page_snapshot(options: &FetchOptions, airport_name: &str, body: &str) {
    let Some(dir) = &options.diagnostics_dir else {
        return;
    };
    let filename = format!(
        "{}_fetcher_error_{}.html",
        airport_name,
        Local::now().format("%Y_%m_%d_%H%M%S")
    );
    let path = dir.join(filename);
    if let Err(e) = tokio::fs::create_dir_all(dir).await {
        warn!(error = %e, dir = %dir.display(), "could not create diagnostics dir");
        return;
    }
    match tokio::fs::write(&path, body).await {
        Ok(()) => info!(path = %path.display(), "wrote page snapshot"),
        Err(e) => warn!(error = %e, "could not write page snapshot"),
    }
}
