//! Mintegral spend report source

use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value;

use super::{build_client, decode_rows, get_bytes, ReportSource};
use crate::config::{Config, ENV_SPEND_URL};
use crate::types::{DateWindow, RawSpendEntry, Result, RoastrackError};

#[derive(Deserialize)]
#[serde(untagged)]
enum SpendData {
    Rows(Vec<Value>),
    Paged { lists: Vec<Value> },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SpendPayload {
    Envelope { data: SpendData },
    Rows(Vec<Value>),
}

/// Parse a spend body: `{"data": [...]}`, `{"data": {"lists": [...]}}`, or
/// a bare array. Malformed rows are skipped, not fatal.
pub fn parse_spend_payload(body: &mut [u8]) -> Result<Vec<RawSpendEntry>> {
    let payload: SpendPayload = simd_json::from_slice(body)
        .map_err(|e| RoastrackError::Parse(format!("spend payload: {}", e)))?;
    let rows = match payload {
        SpendPayload::Envelope {
            data: SpendData::Rows(rows),
        }
        | SpendPayload::Envelope {
            data: SpendData::Paged { lists: rows },
        }
        | SpendPayload::Rows(rows) => rows,
    };
    Ok(decode_rows("mintegral", rows))
}

pub struct MintegralSource {
    client: Client,
    url: Option<String>,
    window: Option<DateWindow>,
}

impl MintegralSource {
    pub fn new(client: Client, url: Option<&str>, window: Option<DateWindow>) -> Self {
        Self {
            client,
            url: url.map(String::from),
            window,
        }
    }

    /// A missing `spend_url` is reported when fetching, not here
    pub fn from_config(config: &Config, window: Option<DateWindow>) -> Result<Self> {
        let client = build_client(config.request_timeout_secs)?;
        Ok(Self::new(client, config.spend_url.as_deref(), window))
    }

    fn query(&self) -> Vec<(&'static str, String)> {
        match &self.window {
            Some(w) => vec![
                ("start_date", w.start.to_string()),
                ("end_date", w.end.to_string()),
            ],
            None => Vec::new(),
        }
    }
}

impl ReportSource for MintegralSource {
    type Entry = RawSpendEntry;

    fn name(&self) -> &str {
        "mintegral"
    }

    fn cache_key(&self) -> String {
        match &self.window {
            Some(w) => format!("mintegral:{}:{}", w.start, w.end),
            None => "mintegral".to_string(),
        }
    }

    fn fetch(&self) -> Result<Vec<RawSpendEntry>> {
        let url = self.url.as_deref().ok_or_else(|| {
            RoastrackError::Config(format!(
                "no spend endpoint configured (set spend_url or {})",
                ENV_SPEND_URL
            ))
        })?;
        let mut body = get_bytes(&self.client, url, &self.query())?;
        parse_spend_payload(&mut body)
    }
}
