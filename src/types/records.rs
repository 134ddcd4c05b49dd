//! Record types for revenue/spend reconciliation

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;

/// Scalar value as sent by the report APIs: numbers arrive either as JSON
/// numbers or as numeric strings, dates as `20241101` or `"20241101"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    /// Parse as a finite float. `None` for text that is not a number.
    pub fn as_f64(&self) -> Option<f64> {
        let value = match self {
            Scalar::Int(i) => *i as f64,
            Scalar::Float(f) => *f,
            Scalar::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        value.is_finite().then_some(value)
    }

    /// Render as text the way it would have been written in the payload.
    pub fn as_text(&self) -> String {
        match self {
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => (*f as i64).to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Text(s) => s.trim().to_string(),
        }
    }
}

/// One row of the AppLovin MAX report (`results[]`).
///
/// Fields are read leniently: a value of an unexpected JSON type reads as
/// missing instead of failing the row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawRevenueEntry {
    #[serde(deserialize_with = "lenient::text")]
    pub day: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub application: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub package_name: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub country: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub network: Option<String>,
    #[serde(deserialize_with = "lenient::scalar")]
    pub estimated_revenue: Option<Scalar>,
    #[serde(
        deserialize_with = "lenient::scalar",
        skip_serializing_if = "Option::is_none"
    )]
    pub impressions: Option<Scalar>,
    #[serde(
        deserialize_with = "lenient::scalar",
        skip_serializing_if = "Option::is_none"
    )]
    pub ecpm: Option<Scalar>,
}

/// One row of the Mintegral spend report, read as leniently as
/// [`RawRevenueEntry`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawSpendEntry {
    #[serde(deserialize_with = "lenient::scalar")]
    pub date: Option<Scalar>,
    /// Store id, e.g. `id739067593`
    #[serde(deserialize_with = "lenient::text")]
    pub package_name: Option<String>,
    /// Country list for campaign-level rows; spend is split across it.
    /// A comma-separated string is accepted too.
    #[serde(deserialize_with = "lenient::countries")]
    pub geo: Option<Vec<String>>,
    /// Single country for per-location rows
    #[serde(deserialize_with = "lenient::text")]
    pub location: Option<String>,
    #[serde(deserialize_with = "lenient::scalar")]
    pub spend: Option<Scalar>,
    #[serde(
        deserialize_with = "lenient::text",
        skip_serializing_if = "Option::is_none"
    )]
    pub preview_link: Option<String>,
}

mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    use super::Scalar;

    /// Strings as-is, numbers as their text
    pub fn text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }

    pub fn scalar<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Scalar>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Number(n) => n
                .as_i64()
                .map(Scalar::Int)
                .or_else(|| n.as_f64().map(Scalar::Float)),
            Value::String(s) => Some(Scalar::Text(s)),
            _ => None,
        })
    }

    /// A list of codes (non-strings skipped) or one comma-separated string
    pub fn countries<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<String>>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Array(items) => Some(
                items
                    .into_iter()
                    .filter_map(|v| match v {
                        Value::String(s) => Some(s),
                        _ => None,
                    })
                    .collect(),
            ),
            Value::String(s) => Some(
                s.split(',')
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(String::from)
                    .collect(),
            ),
            _ => None,
        })
    }
}

/// Normalized revenue tuple
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevenueRecord {
    pub date: NaiveDate,
    /// Bundle id; `None` keeps the record out of game-keyed joins
    pub package_name: Option<String>,
    pub application: Option<String>,
    pub country: String,
    pub revenue: f64,
}

/// Normalized spend tuple (one per apportioned country)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpendRecord {
    /// `None` when the upstream date was not a valid calendar day
    pub date: Option<NaiveDate>,
    /// Bundle id, translated from the store id
    pub package_name: String,
    pub country: String,
    pub spend: f64,
    /// Display name taken from the App Store preview link
    pub game_name: Option<String>,
}

/// Country placeholder for records with no country information
pub const UNKNOWN_COUNTRY: &str = "Unknown";

/// Closed date interval `[start, end]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Window covering `days` days back from `today`, inclusive on both ends
    pub fn last_days(days: u32, today: NaiveDate) -> Self {
        Self {
            start: today - Duration::days(i64::from(days)),
            end: today,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Return on ad spend
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Roas {
    Finite(f64),
    /// Spend was zero
    Infinite,
}

impl Roas {
    pub fn from_totals(revenue: f64, spend: f64) -> Self {
        if spend > 0.0 {
            Roas::Finite(revenue / spend)
        } else {
            Roas::Infinite
        }
    }

    /// Contribution to the NET ROAS sum: finite positive values only
    pub fn net_contribution(&self) -> f64 {
        match self {
            Roas::Finite(v) if v.is_finite() && *v > 0.0 => *v,
            _ => 0.0,
        }
    }

    /// Total order with `Infinite` above every finite value
    pub fn total_cmp(&self, other: &Roas) -> Ordering {
        match (self, other) {
            (Roas::Finite(a), Roas::Finite(b)) => a.total_cmp(b),
            (Roas::Finite(_), Roas::Infinite) => Ordering::Less,
            (Roas::Infinite, Roas::Finite(_)) => Ordering::Greater,
            (Roas::Infinite, Roas::Infinite) => Ordering::Equal,
        }
    }
}

impl fmt::Display for Roas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Roas::Finite(v) => write!(f, "{:.2}", v),
            Roas::Infinite => f.write_str("INFINITY"),
        }
    }
}

impl Serialize for Roas {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Roas::Finite(v) => serializer.serialize_f64(*v),
            Roas::Infinite => serializer.serialize_str("INFINITY"),
        }
    }
}

/// One reconciled row. Key fields are set according to the granularity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    pub revenue: f64,
    pub spend: f64,
    pub profit: f64,
    pub roas: Roas,
}

impl AggregatedRow {
    pub fn new(key: GroupKey, revenue: f64, spend: f64) -> Self {
        Self {
            date: key.date,
            game: key.game,
            country: key.country,
            revenue,
            spend,
            profit: revenue - spend,
            roas: Roas::from_totals(revenue, spend),
        }
    }
}

/// Spend-only total (no revenue join)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpendTotal {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    pub spend: f64,
}

/// Grouping key; a `None` field means the dimension is not part of the key
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey {
    pub date: Option<NaiveDate>,
    pub game: Option<String>,
    pub country: Option<String>,
}

/// Totals across a set of reconciled rows
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSummary {
    pub rows: usize,
    pub revenue: f64,
    pub spend: f64,
    pub profit: f64,
    /// Ratio of totals
    pub roas: Roas,
    /// Sum of per-row ROAS over finite, positive rows
    pub net_roas: f64,
}

impl ReportSummary {
    pub fn from_rows(rows: &[AggregatedRow]) -> Self {
        let revenue: f64 = rows.iter().map(|r| r.revenue).sum();
        let spend: f64 = rows.iter().map(|r| r.spend).sum();
        let net_roas = rows.iter().map(|r| r.roas.net_contribution()).sum();

        Self {
            rows: rows.len(),
            revenue,
            spend,
            profit: revenue - spend,
            roas: Roas::from_totals(revenue, spend),
            net_roas,
        }
    }

    /// NET ROAS as shown in reports; an empty sum reads `INFINITY`
    pub fn net_roas_display(&self) -> String {
        if self.net_roas == 0.0 {
            "INFINITY".to_string()
        } else {
            format!("{:.2}", self.net_roas)
        }
    }
}

/// Counters for records excluded or defaulted during normalization
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NormalizeStats {
    pub accepted: usize,
    pub outside_window: usize,
    pub invalid_date: usize,
    pub unmapped: usize,
    pub missing_package: usize,
    /// Amount field unparsable, replaced with 0
    pub defaulted_amount: usize,
}

/// Normalizer output: records plus what happened to the rest
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized<T> {
    pub records: Vec<T>,
    pub stats: NormalizeStats,
}

impl<T> Default for Normalized<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            stats: NormalizeStats::default(),
        }
    }
}
