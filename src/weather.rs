//! Airport weather reports from the aviationweather.gov METAR API.
//!
//! One request per query: the latest METAR (with TAF attached) for an ICAO
//! code, decoded just far enough for a readable reply. The wind group is
//! re-parsed from the raw report because the structured fields drop the
//! unit that the reply needs.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::fmt;
use tracing::{info, instrument};

use crate::errors::QueryError;

const METAR_API_URL: &str = "https://aviationweather.gov/api/data/metar";

/// Wind group in a raw METAR: `dddff(Ggg)KT` or `...MPS`, e.g. `08013KT`.
static WIND_GROUP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{3})(\d{2,3})(?:G\d{2,3})?(KT|MPS)\b").unwrap());

/// One cloud layer of a report.
#[derive(Debug, Clone, Deserialize)]
pub struct Cloud {
    pub cover: String,
    #[serde(default)]
    pub base: Option<i64>,
}

/// The subset of a METAR report the reply renders.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherReport {
    pub icao_id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub report_time: String,
    pub receipt_time: String,
    #[serde(default)]
    pub temp: Option<f64>,
    #[serde(default)]
    pub dewp: Option<f64>,
    /// Visibility is sometimes a number, sometimes a string like `"6+"`.
    #[serde(default)]
    pub visib: Option<serde_json::Value>,
    #[serde(default)]
    pub altim: Option<f64>,
    #[serde(default)]
    pub clouds: Vec<Cloud>,
    pub raw_ob: String,
    #[serde(default)]
    pub raw_taf: Option<String>,
}

/// A decoded wind group.
#[derive(Debug, Clone, PartialEq)]
pub struct Wind {
    pub direction_degrees: u32,
    /// Chinese compass name for the reply.
    pub direction: &'static str,
    pub speed: u32,
    /// Unit label as reported: 节 (knots) or 米每秒.
    pub unit: &'static str,
    pub speed_knots: f64,
    pub speed_kmh: f64,
    pub speed_ms: f64,
}

/// Compass name for a wind direction in degrees.
pub fn wind_direction_to_text(degrees: u32) -> &'static str {
    match degrees % 361 {
        0..=22 => "北风",
        23..=67 => "东北风",
        68..=112 => "东风",
        113..=157 => "东南风",
        158..=202 => "南风",
        203..=247 => "西南风",
        248..=292 => "西风",
        293..=337 => "西北风",
        _ => "北风",
    }
}

/// Pull the wind group out of a raw METAR report. `None` when the report
/// carries no parseable group (calm or variable winds).
pub fn parse_wind(raw_ob: &str) -> Option<Wind> {
    let caps = WIND_GROUP.captures(raw_ob)?;
    let direction_degrees: u32 = caps[1].parse().ok()?;
    let speed: u32 = caps[2].parse().ok()?;
    let (unit, speed_knots, speed_kmh, speed_ms) = match &caps[3] {
        "KT" => ("节", speed as f64, speed as f64 * 1.852, speed as f64 * 0.514444),
        _ => ("米每秒", speed as f64 / 0.514444, speed as f64 * 3.6, speed as f64),
    };
    Some(Wind {
        direction_degrees,
        direction: wind_direction_to_text(direction_degrees),
        speed,
        unit,
        speed_knots,
        speed_kmh,
        speed_ms,
    })
}

impl fmt::Display for WeatherReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.name.as_deref().unwrap_or(&self.icao_id);
        writeln!(f, "机场: {} (ICAO代码: {})", name, self.icao_id)?;
        writeln!(f, "报告时间: {} (UTC)", self.report_time)?;
        writeln!(f, "接收时间: {} (UTC)", self.receipt_time)?;
        if let (Some(temp), Some(dewp)) = (self.temp, self.dewp) {
            writeln!(f, "温度: {temp}°C, 露点: {dewp}°C")?;
        }
        if let Some(wind) = parse_wind(&self.raw_ob) {
            writeln!(f, "风向: {} 风速: {} {}", wind.direction, wind.speed, wind.unit)?;
        }
        if let Some(visib) = &self.visib {
            let visib = visib.as_str().map(str::to_string).unwrap_or_else(|| visib.to_string());
            writeln!(f, "能见度: {visib}")?;
        }
        if let Some(altim) = self.altim {
            writeln!(f, "气压: {altim} hPa")?;
        }
        if !self.clouds.is_empty() {
            let layers = self
                .clouds
                .iter()
                .map(|c| match c.base {
                    Some(base) => format!("{} {}ft", c.cover, base),
                    None => c.cover.clone(),
                })
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(f, "云层信息: {layers}")?;
        }
        writeln!(f)?;
        writeln!(f, "METAR原始报告: {}", self.raw_ob)?;
        if let Some(taf) = &self.raw_taf {
            writeln!(f, "TAF原始预报: {taf}")?;
        }
        Ok(())
    }
}

/// Fetch the latest METAR+TAF report for an ICAO code.
///
/// An empty response means the station doesn't exist, reported as a
/// validation error naming the code.
#[instrument(level = "info", skip(client))]
pub async fn get_airport_weather_report(
    client: &reqwest::Client,
    icao_code: &str,
) -> Result<WeatherReport, QueryError> {
    let resp = client
        .get(METAR_API_URL)
        .query(&[("ids", icao_code), ("format", "json"), ("taf", "true")])
        .send()
        .await?
        .error_for_status()?;
    let mut reports: Vec<WeatherReport> = resp.json().await?;
    if reports.is_empty() {
        return Err(QueryError::UnknownWeatherStation(icao_code.to_string()));
    }
    let report = reports.remove(0);
    info!(icao = %report.icao_id, "Fetched METAR report");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wind_direction_bands() {
        assert_eq!(wind_direction_to_text(0), "北风");
        assert_eq!(wind_direction_to_text(45), "东北风");
        assert_eq!(wind_direction_to_text(90), "东风");
        assert_eq!(wind_direction_to_text(180), "南风");
        assert_eq!(wind_direction_to_text(270), "西风");
        assert_eq!(wind_direction_to_text(350), "北风");
    }

    #[test]
    fn test_parse_wind_knots() {
        let wind = parse_wind("ZSNJ 140500Z 08013KT 9999 FEW020 24/18 Q1012 NOSIG").unwrap();
        assert_eq!(wind.direction_degrees, 80);
        assert_eq!(wind.direction, "东风");
        assert_eq!(wind.speed, 13);
        assert_eq!(wind.unit, "节");
        assert!((wind.speed_kmh - 24.076).abs() < 0.001);
    }

    #[test]
    fn test_parse_wind_mps_and_gusts() {
        let wind = parse_wind("UUEE 140500Z 24007G14MPS CAVOK 12/03 Q1019").unwrap();
        assert_eq!(wind.direction, "西南风");
        assert_eq!(wind.unit, "米每秒");
        assert!((wind.speed_kmh - 25.2).abs() < 0.001);
    }

    #[test]
    fn test_parse_wind_absent() {
        assert_eq!(parse_wind("ZSNJ 140500Z VRB02KT CAVOK 24/18 Q1012"), None);
    }

    #[test]
    fn test_report_deserialization_and_display() {
        let json = r#"{
            "icaoId": "VHHH",
            "name": "Hong Kong Intl",
            "reportTime": "2025-04-14 05:00:00",
            "receiptTime": "2025-04-14 05:03:12",
            "temp": 26.0,
            "dewp": 21.0,
            "visib": "6+",
            "altim": 1013.2,
            "clouds": [{"cover": "FEW", "base": 2000}, {"cover": "SCT"}],
            "rawOb": "VHHH 140500Z 12008KT 9999 FEW020 26/21 Q1013 NOSIG",
            "rawTaf": "TAF VHHH 140500Z 1406/1512 12010KT 9999 FEW020"
        }"#;
        let report: WeatherReport = serde_json::from_str(json).unwrap();
        assert_eq!(report.icao_id, "VHHH");
        let rendered = report.to_string();
        assert!(rendered.contains("Hong Kong Intl"));
        assert!(rendered.contains("东南风"));
        assert!(rendered.contains("FEW 2000ft, SCT"));
        assert!(rendered.contains("METAR原始报告"));
    }
}
