//! Error taxonomy for flight-board and weather queries.
//!
//! Three kinds of failure move through the crate:
//! - **Input validation** ([`QueryError::UnsupportedAirport`],
//!   [`QueryError::UnknownAlliance`], [`QueryError::UnknownWeatherStation`]):
//!   raised immediately, before any network traffic, and the message names
//!   the offending value.
//! - **Transport** ([`QueryError::Transport`]): a request that failed or
//!   returned a non-2xx status. Callers may report these as a generic
//!   "query failed" message or fall back to partial results.
//! - **Malformed payloads** ([`QueryError::BadResponse`]): the source
//!   answered, but not in a shape we can work with.
//!
//! Row-level parse problems are NOT errors — a bad row is logged and
//! dropped, and the fetch continues.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueryError {
    /// The airport token did not resolve to any registered fetcher.
    #[error("不支持的机场: {0}")]
    UnsupportedAirport(String),

    /// The alliance name survived none of the synonym table entries.
    #[error("不支持的联盟: {0}")]
    UnknownAlliance(String),

    /// The weather service has no report for this ICAO code.
    #[error("没有该机场的气象报文: {0}")]
    UnknownWeatherStation(String),

    /// Network or HTTP-status failure from the underlying transport.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The source responded with a payload we could not interpret.
    #[error("unexpected response from {source_name}: {reason}")]
    BadResponse {
        source_name: &'static str,
        reason: String,
    },
}

impl QueryError {
    /// True for errors the user caused (bad token/name), as opposed to
    /// failures of the source or the network.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            QueryError::UnsupportedAirport(_)
                | QueryError::UnknownAlliance(_)
                | QueryError::UnknownWeatherStation(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_name_the_value() {
        let e = QueryError::UnsupportedAirport("合肥".to_string());
        assert!(e.to_string().contains("合肥"));
        let e = QueryError::UnknownAlliance("no_such_alliance".to_string());
        assert!(e.to_string().contains("no_such_alliance"));
    }

    #[test]
    fn test_is_validation() {
        assert!(QueryError::UnknownAlliance("x".into()).is_validation());
        assert!(
            !QueryError::BadResponse {
                source_name: "HKG",
                reason: "not json".into()
            }
            .is_validation()
        );
    }
}
