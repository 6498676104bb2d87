//! Text rendering of query results for the reply surface.
//!
//! Thin presentation layer: a flight list becomes the board table the bot
//! always replied with (flight number, scheduled/actual time pair, the
//! other-end airport, aircraft model).

use crate::models::{Direction, FlightRecord};

/// The scheduled/actual time cell: `08:00/08:12(实)` when an actual or
/// estimated time is known, otherwise just the scheduled time, with
/// `--:--` standing in for anything missing.
fn format_time_cell(flight: &FlightRecord, direction: Direction) -> String {
    let (scheduled, reported) = if direction.is_departure() {
        (flight.dep_time.as_deref(), flight.act_dep_time.as_ref())
    } else {
        (flight.arr_time.as_deref(), flight.act_arr_time.as_ref())
    };
    let scheduled = scheduled.unwrap_or("--:--");
    match reported {
        Some(time) => format!("{scheduled}/{time}"),
        None => scheduled.to_string(),
    }
}

/// Render the flight-board reply for one query.
pub fn render_flight_board(
    airport: &str,
    direction: Direction,
    flights: &[FlightRecord],
) -> String {
    let headers = [
        "航班号",
        "时刻",
        if direction.is_departure() { "目的地" } else { "出发地" },
        "机型",
    ];

    let rows: Vec<[String; 4]> = flights
        .iter()
        .map(|flight| {
            [
                flight.flight_no.clone(),
                format_time_cell(flight, direction),
                if direction.is_departure() {
                    flight.arr_airport.clone()
                } else {
                    flight.dep_airport.clone()
                },
                flight.aircraft_model.clone().unwrap_or_else(|| "--".to_string()),
            ]
        })
        .collect();

    let mut widths = headers.map(|h| h.chars().count());
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let render_row = |cells: [&str; 4]| -> String {
        cells
            .iter()
            .enumerate()
            .map(|(i, cell)| format!("{:<width$}", cell, width = widths[i]))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut out = format!("{}机场{}大屏:\n", airport, direction.label());
    out.push_str(&render_row(headers));
    out.push('\n');
    out.push_str(
        &widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("  "),
    );
    out.push('\n');
    for row in &rows {
        out.push_str(&render_row([&row[0], &row[1], &row[2], &row[3]]));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tests::blank_record;
    use crate::models::ReportedTime;

    #[test]
    fn test_time_cell_pairs_scheduled_and_actual() {
        let mut r = blank_record();
        r.dep_time = Some("08:00".to_string());
        assert_eq!(format_time_cell(&r, Direction::Departure), "08:00");
        r.act_dep_time = Some(ReportedTime::actual("08:12"));
        assert_eq!(format_time_cell(&r, Direction::Departure), "08:00/08:12(实)");
        r.dep_time = None;
        assert_eq!(format_time_cell(&r, Direction::Departure), "--:--/08:12(实)");
    }

    #[test]
    fn test_render_board_header_and_rows() {
        let mut r = blank_record();
        r.dep_time = Some("09:30".to_string());
        r.aircraft_model = Some("A320".to_string());
        let out = render_flight_board("南京", Direction::Departure, &[r]);
        assert!(out.starts_with("南京机场出发大屏:\n"));
        assert!(out.contains("航班号"));
        assert!(out.contains("目的地"));
        assert!(out.contains("MU2809"));
        assert!(out.contains("广州"));
        assert!(out.contains("A320"));
    }

    #[test]
    fn test_render_board_arrival_shows_origin() {
        let mut r = blank_record();
        r.arr_time = Some("21:05".to_string());
        let out = render_flight_board("广州", Direction::Arrival, &[r]);
        assert!(out.contains("出发地"));
        assert!(out.contains("南京"));
        // Missing model renders as a placeholder.
        assert!(out.contains("--"));
    }
}
