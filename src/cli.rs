//! Command-line interface definitions for airboard.
//!
//! One invocation is one query: a flight board for an airport, or a METAR
//! weather report when `--metar` is given instead.

use clap::Parser;

/// Command-line arguments for the airboard query tool.
///
/// # Examples
///
/// ```sh
/// # Departure board for Nanjing (city name or IATA code both work)
/// airboard 南京
/// airboard nkg --arrivals
///
/// # SkyTeam departures from Pudong towards Beijing
/// airboard pvg --alliance 天合 --destination 北京
///
/// # METAR weather for an ICAO station
/// airboard --metar ZSNJ
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Airport to query: city name (南京, 上海, ...) or IATA code (NKG, PVG, ...)
    pub airport: Option<String>,

    /// Query the arrival board instead of departures
    #[arg(short, long)]
    pub arrivals: bool,

    /// Query cargo flights where the source distinguishes them
    #[arg(long)]
    pub cargo: bool,

    /// Flight-number filter (case-insensitive substring)
    #[arg(short = 'n', long)]
    pub flight_no: Option<String>,

    /// Airline display-name filter (substring, as typed)
    #[arg(long)]
    pub airlines: Option<String>,

    /// Other-end airport filter: display-name substring or IATA code
    #[arg(short, long)]
    pub destination: Option<String>,

    /// Aircraft model codes, comma separated (exact match)
    #[arg(long, value_delimiter = ',')]
    pub aircraft_models: Vec<String>,

    /// Two-letter carrier codes, comma separated
    #[arg(long, value_delimiter = ',')]
    pub airline_codes: Vec<String>,

    /// Alliance name or synonym (skyteam / 天合 / 星盟 / ow / hna ...)
    #[arg(long)]
    pub alliance: Option<String>,

    /// Reference time "HH:MM" at the airport; defaults to now
    #[arg(long)]
    pub at_time: Option<String>,

    /// Maximum records to return
    #[arg(long)]
    pub max_result: Option<usize>,

    /// Hard ceiling on page fetches per query
    #[arg(long)]
    pub max_fetch_page: Option<u32>,

    /// Start from this page instead of the estimated one
    #[arg(long)]
    pub from_page: Option<u32>,

    /// Terminal filter, where the source supports one
    #[arg(short, long)]
    pub terminal: Option<String>,

    /// Fetch a METAR weather report for this ICAO code instead of a board
    #[arg(long)]
    pub metar: Option<String>,

    /// Print records as JSON instead of the text table
    #[arg(long)]
    pub json: bool,

    /// Optional path to a YAML config file
    #[arg(short, long)]
    pub config: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from(["airboard", "南京", "--arrivals", "--max-result", "5"]);
        assert_eq!(cli.airport.as_deref(), Some("南京"));
        assert!(cli.arrivals);
        assert_eq!(cli.max_result, Some(5));
        assert!(cli.metar.is_none());
    }

    #[test]
    fn test_cli_comma_separated_sets() {
        let cli = Cli::parse_from([
            "airboard",
            "pvg",
            "--aircraft-models",
            "A320,B77W",
            "--airline-codes",
            "MU,CZ",
        ]);
        assert_eq!(cli.aircraft_models, vec!["A320", "B77W"]);
        assert_eq!(cli.airline_codes, vec!["MU", "CZ"]);
    }

    #[test]
    fn test_cli_metar_mode_needs_no_airport() {
        let cli = Cli::parse_from(["airboard", "--metar", "ZSNJ"]);
        assert!(cli.airport.is_none());
        assert_eq!(cli.metar.as_deref(), Some("ZSNJ"));
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = Cli::parse_from(["airboard", "hkg", "-a", "-n", "cx1", "-d", "曼谷", "-t", "T1"]);
        assert!(cli.arrivals);
        assert_eq!(cli.flight_no.as_deref(), Some("cx1"));
        assert_eq!(cli.destination.as_deref(), Some("曼谷"));
        assert_eq!(cli.terminal.as_deref(), Some("T1"));
    }
}
