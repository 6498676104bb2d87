//! # airboard
//!
//! A flight-board query tool that scrapes each supported airport's public
//! website and normalizes the inconsistent responses into one record
//! shape. Originally the civil-aviation half of a chat bot; the CLI here
//! stands in for the chat transport.
//!
//! ## Features
//!
//! - Eight airport sources (CAN, GMP, HGH, HKG, ICN, NKG, SZX, SHA/PVG),
//!   each reverse-engineering a different site's API or DOM
//! - One shared orchestrator: page estimation, incremental filtering,
//!   result/page budgets, time-ordered output
//! - Filterable by flight number, airline, alliance, carrier code,
//!   aircraft model and destination
//! - METAR airport weather reports as a second query mode
//!
//! ## Usage
//!
//! ```sh
//! airboard 南京 --alliance 天合 --max-result 10
//! airboard --metar ZSNJ
//! ```
//!
//! ## Architecture
//!
//! One query flows: CLI → `QueryFlightForm` + `FetchOptions` → registry
//! picks the fetcher → `fetch_flights` orchestrates page fetches through
//! the filter pipeline → sorted records → table (or JSON) on stdout.

use chrono::NaiveTime;
use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info};
use tracing_subscriber::{fmt as tfmt, EnvFilter};

mod cli;
mod config;
mod errors;
mod fetchers;
mod filters;
mod format;
mod models;
mod utils;
mod weather;

use cli::Cli;
use errors::QueryError;
use fetchers::{airport_fetcher, build_client, fetch_flights, FetchOptions};
use models::{Direction, QueryFlightForm};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");
    let config = config::load_config(args.config.as_deref())?;
    let client = build_client(&config.user_agent)?;

    // --- Weather mode ---
    if let Some(icao) = &args.metar {
        let report = match weather::get_airport_weather_report(&client, icao).await {
            Ok(report) => report,
            Err(e @ QueryError::UnknownWeatherStation(_)) => {
                error!(error = %e, "weather query rejected");
                return Err(e.into());
            }
            Err(e) => {
                error!(error = %e, %icao, "weather query failed");
                println!("气象查询暂时不可用");
                return Err(e.into());
            }
        };
        println!("{report}");
        return Ok(());
    }

    // --- Flight-board mode ---
    let Some(airport) = &args.airport else {
        return Err("an airport token (or --metar) is required".into());
    };
    let mut source = airport_fetcher(airport)?;

    let at_time = match &args.at_time {
        Some(raw) => {
            let time = NaiveTime::parse_from_str(raw, "%H:%M")
                .map_err(|e| format!("bad --at-time {raw:?}: {e}"))?;
            let today = utils::now_at_offset(source.utc_offset_minutes()).date_naive();
            Some(today.and_time(time))
        }
        None => None,
    };

    let form = QueryFlightForm {
        flight_no: args.flight_no.clone(),
        airlines: args.airlines.clone(),
        airport: args.destination.clone(),
        at_time,
        aircraft_models: args
            .aircraft_models
            .iter()
            .map(|m| m.trim().to_uppercase())
            .collect(),
        airlines_codes: args.airline_codes.clone(),
        alliance: args.alliance.clone(),
    };
    let options = FetchOptions {
        arrivals: args.arrivals,
        cargo: args.cargo,
        max_result: args.max_result.unwrap_or(config.max_result),
        max_fetch_page: args.max_fetch_page.unwrap_or(config.max_fetch_page),
        from_page: args.from_page,
        terminal: args.terminal.clone(),
        diagnostics_dir: config.diagnostics_dir.clone(),
    };
    info!(airport = source.airport_code(), ?form, "querying flight board");

    let flights = match fetch_flights(source.as_mut(), &client, &form, &options).await {
        Ok(flights) => flights,
        Err(e) if e.is_validation() => {
            error!(error = %e, "query rejected");
            return Err(e.into());
        }
        Err(e) => {
            error!(error = %e, %airport, "board query failed");
            println!("{airport}机场查询暂时不可用");
            return Err(e.into());
        }
    };

    let direction = if args.arrivals {
        Direction::Arrival
    } else {
        Direction::Departure
    };
    if args.json {
        println!("{}", serde_json::to_string_pretty(&flights)?);
    } else {
        print!("{}", format::render_flight_board(airport, direction, &flights));
    }
    Ok(())
}
