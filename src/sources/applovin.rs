//! AppLovin MAX revenue report source

use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value;

use super::{build_client, decode_rows, get_bytes, ReportSource};
use crate::config::{Config, ENV_API_KEY};
use crate::types::{DateWindow, RawRevenueEntry, Result, RoastrackError};

/// Columns requested from the MAX report
pub const REPORT_COLUMNS: &str = "day,application,impressions,network,package_name,country,attempts,responses,fill_rate,estimated_revenue,ecpm";

#[derive(Deserialize)]
#[serde(untagged)]
enum RevenuePayload {
    Report { results: Vec<Value> },
    Rows(Vec<Value>),
}

/// Parse a MAX report body: `{"results": [...]}` or a bare array.
///
/// Only an unrecognized envelope is an error; malformed rows are skipped.
pub fn parse_revenue_payload(body: &mut [u8]) -> Result<Vec<RawRevenueEntry>> {
    let payload: RevenuePayload = simd_json::from_slice(body)
        .map_err(|e| RoastrackError::Parse(format!("revenue payload: {}", e)))?;
    let rows = match payload {
        RevenuePayload::Report { results } => results,
        RevenuePayload::Rows(rows) => rows,
    };
    Ok(decode_rows("applovin", rows))
}

pub struct ApplovinSource {
    client: Client,
    url: String,
    api_key: Option<String>,
    window: DateWindow,
}

impl ApplovinSource {
    pub fn new(client: Client, url: &str, api_key: Option<String>, window: DateWindow) -> Self {
        Self {
            client,
            url: url.to_string(),
            api_key,
            window,
        }
    }

    pub fn from_config(config: &Config, window: DateWindow) -> Result<Self> {
        let client = build_client(config.request_timeout_secs)?;
        Ok(Self::new(
            client,
            &config.revenue_url,
            config.revenue_api_key.clone(),
            window,
        ))
    }

    fn query(&self, api_key: &str) -> Vec<(&'static str, String)> {
        vec![
            ("api_key", api_key.to_string()),
            ("start", self.window.start.to_string()),
            ("end", self.window.end.to_string()),
            ("columns", REPORT_COLUMNS.to_string()),
            ("sort_day", "ASC".to_string()),
            ("format", "json".to_string()),
        ]
    }
}

impl ReportSource for ApplovinSource {
    type Entry = RawRevenueEntry;

    fn name(&self) -> &str {
        "applovin"
    }

    fn cache_key(&self) -> String {
        format!("applovin:{}:{}", self.window.start, self.window.end)
    }

    fn fetch(&self) -> Result<Vec<RawRevenueEntry>> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            RoastrackError::Config(format!("missing AppLovin api key (set {})", ENV_API_KEY))
        })?;
        let mut body = get_bytes(&self.client, &self.url, &self.query(api_key))?;
        parse_revenue_payload(&mut body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Scalar;
    use chrono::NaiveDate;

    fn window() -> DateWindow {
        DateWindow::new(
            NaiveDate::from_ymd_opt(2024, 11, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 11, 28).unwrap(),
        )
    }

    #[test]
    fn test_parse_results_envelope() {
        let mut body = br#"{
            "code": 200,
            "results": [
                {"day": "2024-11-01", "application": "Dino Water World", "impressions": "120",
                 "network": "APPLOVIN_BIDDING", "package_name": "com.tapmonkey.dinovillage2014",
                 "country": "us", "attempts": "300", "responses": "200", "fill_rate": "0.66",
                 "estimated_revenue": "1.234567", "ecpm": "10.28"}
            ]
        }"#
        .to_vec();

        let rows = parse_revenue_payload(&mut body).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].day.as_deref(), Some("2024-11-01"));
        assert_eq!(rows[0].country.as_deref(), Some("us"));
        assert_eq!(
            rows[0].estimated_revenue,
            Some(Scalar::Text("1.234567".into()))
        );
    }

    #[test]
    fn test_parse_bare_array() {
        let mut body = br#"[{"day": "2024-11-02", "estimated_revenue": 2.5}]"#.to_vec();
        let rows = parse_revenue_payload(&mut body).unwrap();
        assert_eq!(rows[0].estimated_revenue, Some(Scalar::Float(2.5)));
    }

    #[test]
    fn test_parse_keeps_good_rows_next_to_malformed_ones() {
        let mut body = br#"{"results": [
            {"day": "2024-11-01", "package_name": "com.a", "country": "US", "estimated_revenue": "1.5"},
            {"day": 20241102, "package_name": "com.a", "country": "US", "impressions": true, "estimated_revenue": 2},
            "not a row"
        ]}"#
        .to_vec();

        let rows = parse_revenue_payload(&mut body).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].day.as_deref(), Some("20241102"));
        assert_eq!(rows[1].impressions, None);
        assert_eq!(rows[1].estimated_revenue, Some(Scalar::Int(2)));
    }

    #[test]
    fn test_parse_rejects_unknown_shape() {
        let mut body = br#"{"error": "invalid api key"}"#.to_vec();
        assert!(matches!(
            parse_revenue_payload(&mut body),
            Err(RoastrackError::Parse(_))
        ));
    }

    #[test]
    fn test_query_parameters() {
        let source = ApplovinSource::new(Client::new(), "http://localhost", None, window());
        let query = source.query("k");

        assert!(query.contains(&("start", "2024-11-01".to_string())));
        assert!(query.contains(&("end", "2024-11-28".to_string())));
        assert!(query.contains(&("format", "json".to_string())));
        assert!(query.contains(&("columns", REPORT_COLUMNS.to_string())));
    }

    #[test]
    fn test_missing_api_key_fails_before_request() {
        let source = ApplovinSource::new(Client::new(), "http://localhost:9", None, window());
        assert!(matches!(source.fetch(), Err(RoastrackError::Config(_))));
    }

    #[test]
    fn test_cache_key_includes_window() {
        let source = ApplovinSource::new(Client::new(), "http://localhost", None, window());
        assert_eq!(source.cache_key(), "applovin:2024-11-01:2024-11-28");
    }
}
