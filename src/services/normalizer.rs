//! Record normalization service
//!
//! Turns raw AppLovin revenue rows and Mintegral spend rows into typed
//! records sharing one calendar-date and country representation, so the
//! reconciler can join them.

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use tracing::{debug, info, warn};

use super::mapping::PackageMapping;
use crate::types::{
    DateWindow, Normalized, RawRevenueEntry, RawSpendEntry, RevenueRecord, Scalar, SpendRecord,
    UNKNOWN_COUNTRY,
};

/// Parse a report day.
///
/// Accepts `YYYY-MM-DD` (optionally followed by a `T`/space time part) and
/// compact `YYYYMMDD`.
///
/// # Examples
/// ```
/// use roastrack::services::normalizer::parse_report_date;
///
/// assert_eq!(parse_report_date("2024-11-01"), parse_report_date("20241101"));
/// assert!(parse_report_date("2024-11-01T00:00:00Z").is_some());
/// assert!(parse_report_date("Nov 1").is_none());
/// ```
pub fn parse_report_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.len() == 8 {
        return parse_compact_date(text);
    }
    let day = match text.char_indices().nth(10) {
        Some((idx, 'T')) | Some((idx, ' ')) => &text[..idx],
        Some(_) => return None,
        None => text,
    };
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

/// Normalize a spend date: exactly 8 digits (`YYYYMMDD`) or an ISO
/// `YYYY-MM-DD` string. Anything else is an invalid date.
pub fn normalize_spend_date(raw: &Scalar) -> Option<NaiveDate> {
    let text = raw.as_text();
    match text.len() {
        8 => parse_compact_date(&text),
        10 => NaiveDate::parse_from_str(&text, "%Y-%m-%d").ok(),
        _ => None,
    }
}

fn parse_compact_date(text: &str) -> Option<NaiveDate> {
    if !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(text, "%Y%m%d").ok()
}

/// Canonical country code: trimmed and upper-cased, blank → "Unknown"
pub fn normalize_country(country: Option<&str>) -> String {
    match country.map(str::trim) {
        Some(c) if !c.is_empty() && !c.eq_ignore_ascii_case(UNKNOWN_COUNTRY) => {
            c.to_ascii_uppercase()
        }
        _ => UNKNOWN_COUNTRY.to_string(),
    }
}

/// Split `spend` evenly across `countries`. An empty list puts the full
/// amount on "Unknown".
pub fn apportion(spend: f64, countries: &[String]) -> Vec<(String, f64)> {
    if countries.is_empty() {
        return vec![(UNKNOWN_COUNTRY.to_string(), spend)];
    }
    let share = spend / countries.len() as f64;
    countries
        .iter()
        .map(|c| (normalize_country(Some(c)), share))
        .collect()
}

/// Extract a display name from an App Store preview link.
///
/// `https://apps.apple.com/us/app/dino-water-world/id739067593` → "Dino Water World"
pub fn extract_game_name(link: &str) -> Option<String> {
    static APP_STORE_LINK: OnceLock<Regex> = OnceLock::new();
    let re = APP_STORE_LINK.get_or_init(|| {
        Regex::new(r"^https?://apps\.apple\.com/[A-Za-z]{2}/app/(.+)/id\d+").expect("valid regex")
    });

    let slug = re.captures(link.trim())?.get(1)?.as_str();
    let name = slug
        .split('-')
        .filter(|w| !w.is_empty())
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ");
    (!name.is_empty()).then_some(name)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn non_blank(value: Option<&String>) -> Option<String> {
    value
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Normalize raw revenue rows, keeping those inside `window` (all rows when
/// `None`). Never fails: bad amounts become 0, bad days are excluded.
pub fn normalize_revenue(
    raw: &[RawRevenueEntry],
    window: Option<DateWindow>,
) -> Normalized<RevenueRecord> {
    let mut out = Normalized {
        records: Vec::with_capacity(raw.len()),
        ..Default::default()
    };

    for entry in raw {
        let Some(date) = entry.day.as_deref().and_then(parse_report_date) else {
            debug!(day = ?entry.day, "revenue row dropped: invalid day");
            out.stats.invalid_date += 1;
            continue;
        };

        if window.is_some_and(|w| !w.contains(date)) {
            out.stats.outside_window += 1;
            continue;
        }

        let revenue = match entry.estimated_revenue.as_ref().and_then(Scalar::as_f64) {
            Some(v) => v,
            None => {
                out.stats.defaulted_amount += 1;
                0.0
            }
        };

        let package_name = non_blank(entry.package_name.as_ref());
        if package_name.is_none() {
            out.stats.missing_package += 1;
        }

        out.records.push(RevenueRecord {
            date,
            package_name,
            application: non_blank(entry.application.as_ref()),
            country: normalize_country(entry.country.as_deref()),
            revenue,
        });
        out.stats.accepted += 1;
    }

    info!(
        accepted = out.stats.accepted,
        outside_window = out.stats.outside_window,
        invalid_date = out.stats.invalid_date,
        "normalized revenue rows"
    );
    out
}

/// Normalize raw spend rows: translate store ids through `mapping`,
/// normalize dates, and apportion multi-country spend.
pub fn normalize_spend(raw: &[RawSpendEntry], mapping: &PackageMapping) -> Normalized<SpendRecord> {
    let mut out = Normalized {
        records: Vec::with_capacity(raw.len()),
        ..Default::default()
    };

    for entry in raw {
        let store_id = entry.package_name.as_deref().unwrap_or_default();
        let Some(bundle_id) = mapping.bundle_for_store(store_id) else {
            debug!(store_id, "spend row dropped: no package mapping");
            out.stats.unmapped += 1;
            continue;
        };

        let date = entry.date.as_ref().and_then(normalize_spend_date);
        if date.is_none() {
            debug!(date = ?entry.date, store_id, "spend row has an invalid date");
            out.stats.invalid_date += 1;
        }

        let spend = match entry.spend.as_ref().and_then(Scalar::as_f64) {
            Some(v) => v,
            None => {
                out.stats.defaulted_amount += 1;
                0.0
            }
        };

        let countries: Vec<String> = match (&entry.geo, non_blank(entry.location.as_ref())) {
            (Some(geo), _) if !geo.is_empty() => geo.clone(),
            (_, Some(location)) => vec![location],
            _ => Vec::new(),
        };

        let game_name = entry.preview_link.as_deref().and_then(extract_game_name);

        for (country, share) in apportion(spend, &countries) {
            out.records.push(SpendRecord {
                date,
                package_name: bundle_id.to_string(),
                country,
                spend: share,
                game_name: game_name.clone(),
            });
        }
        out.stats.accepted += 1;
    }

    if out.stats.unmapped > 0 {
        warn!(
            unmapped = out.stats.unmapped,
            "spend rows excluded: store id not in package mapping"
        );
    }
    info!(
        accepted = out.stats.accepted,
        records = out.records.len(),
        invalid_date = out.stats.invalid_date,
        "normalized spend rows"
    );
    out
}
