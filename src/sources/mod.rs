//! Upstream report sources (AppLovin revenue, Mintegral spend)

mod applovin;
pub mod cache;
mod mintegral;

pub use applovin::{parse_revenue_payload, ApplovinSource, REPORT_COLUMNS};
pub use cache::ResponseCache;
pub use mintegral::{parse_spend_payload, MintegralSource};

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::types::{RawRevenueEntry, RawSpendEntry, Result, RoastrackError, SourceStatus};

/// A source of raw report rows
pub trait ReportSource: Send + Sync {
    type Entry: Serialize + DeserializeOwned + Send;

    /// Source name (e.g., "applovin")
    fn name(&self) -> &str;

    /// Cache key: the name plus anything that changes the payload
    fn cache_key(&self) -> String;

    /// Fetch all rows. Errors cover network, HTTP status, timeout and
    /// payload parsing.
    fn fetch(&self) -> Result<Vec<Self::Entry>>;
}

/// Rows from one source together with where they came from
#[derive(Debug, Clone)]
pub struct SourceData<T> {
    pub entries: Vec<T>,
    pub status: SourceStatus,
}

impl<T> SourceData<T> {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            entries: Vec::new(),
            status: SourceStatus::Unavailable(reason.into()),
        }
    }
}

/// Both sides of a report, fetched together
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub revenue: SourceData<RawRevenueEntry>,
    pub spend: SourceData<RawSpendEntry>,
}

/// Load one source: fresh cache first, then the network, then a stale
/// cache. Never fails; an unreachable source yields no rows.
pub fn load_source<S: ReportSource + ?Sized>(
    source: &S,
    cache: Option<&ResponseCache>,
    refresh: bool,
) -> SourceData<S::Entry> {
    let key = source.cache_key();
    let cached = cache.and_then(|c| c.load::<S::Entry>(&key));

    if !refresh {
        let is_fresh = match (cache, cached.as_ref()) {
            (Some(c), Some(hit)) => c.is_fresh(hit),
            _ => false,
        };
        if is_fresh {
            debug!(source = source.name(), "serving from cache");
            return SourceData {
                entries: cached.map(|c| c.entries).unwrap_or_default(),
                status: SourceStatus::Cached,
            };
        }
    }

    match source.fetch() {
        Ok(entries) => {
            info!(source = source.name(), rows = entries.len(), "fetched report");
            if let Some(c) = cache {
                if let Err(e) = c.save(&key, &entries) {
                    warn!(source = source.name(), error = %e, "failed to write response cache");
                }
            }
            SourceData {
                entries,
                status: SourceStatus::Fresh,
            }
        }
        Err(e) => {
            warn!(source = source.name(), error = %e, "report unavailable");
            match cached {
                Some(stale) => SourceData {
                    entries: stale.entries,
                    status: SourceStatus::Stale(e.to_string()),
                },
                None => SourceData::unavailable(e.to_string()),
            }
        }
    }
}

/// Fetch revenue and spend concurrently and wait for both
pub fn fetch_snapshot<R, S>(
    revenue: &R,
    spend: &S,
    cache: Option<&ResponseCache>,
    refresh: bool,
) -> Snapshot
where
    R: ReportSource<Entry = RawRevenueEntry> + ?Sized,
    S: ReportSource<Entry = RawSpendEntry> + ?Sized,
{
    let (revenue, spend) = rayon::join(
        || load_source(revenue, cache, refresh),
        || load_source(spend, cache, refresh),
    );
    Snapshot { revenue, spend }
}

/// Blocking HTTP client with a bounded timeout
pub(crate) fn build_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| RoastrackError::Fetch(format!("HTTP client error: {}", e)))
}

/// GET `url` with `query` and return the body. Non-2xx is an error.
pub(crate) fn get_bytes(client: &Client, url: &str, query: &[(&str, String)]) -> Result<Vec<u8>> {
    debug!(url, "requesting report");
    let response = client
        .get(url)
        .query(query)
        .send()
        .map_err(|e| RoastrackError::Fetch(format!("HTTP request failed: {}", e.without_url())))?;

    let status = response.status();
    if !status.is_success() {
        return Err(RoastrackError::Fetch(format!("HTTP {} from {}", status, url)));
    }

    let body = response
        .bytes()
        .map_err(|e| RoastrackError::Fetch(format!("Failed to read body: {}", e.without_url())))?;
    Ok(body.to_vec())
}

/// Convert payload rows one at a time. Rows that are not objects are
/// skipped and counted; the rest of the payload is kept.
pub(crate) fn decode_rows<T: DeserializeOwned>(
    source: &str,
    rows: Vec<serde_json::Value>,
) -> Vec<T> {
    let total = rows.len();
    let decoded: Vec<T> = rows
        .into_iter()
        .enumerate()
        .filter_map(|(index, row)| match serde_json::from_value(row) {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!(source, index, error = %e, "payload row skipped");
                None
            }
        })
        .collect();

    let skipped = total - decoded.len();
    if skipped > 0 {
        warn!(source, skipped, total, "malformed payload rows skipped");
    }
    decoded
}

/// Rows read from a local JSON file in the same shape the API returns
pub struct FileSource<T> {
    name: String,
    path: PathBuf,
    parse: fn(&mut [u8]) -> Result<Vec<T>>,
}

impl FileSource<RawRevenueEntry> {
    pub fn revenue(path: &Path) -> Self {
        Self {
            name: "applovin-file".into(),
            path: path.to_path_buf(),
            parse: parse_revenue_payload,
        }
    }
}

impl FileSource<RawSpendEntry> {
    pub fn spend(path: &Path) -> Self {
        Self {
            name: "mintegral-file".into(),
            path: path.to_path_buf(),
            parse: parse_spend_payload,
        }
    }
}

impl<T> ReportSource for FileSource<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    type Entry = T;

    fn name(&self) -> &str {
        &self.name
    }

    fn cache_key(&self) -> String {
        format!("{}:{}", self.name, self.path.display())
    }

    fn fetch(&self) -> Result<Vec<T>> {
        let mut content = fs::read(&self.path)?;
        (self.parse)(&mut content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Scalar;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct FakeSpend {
        result: std::result::Result<Vec<RawSpendEntry>, String>,
        calls: AtomicUsize,
    }

    impl FakeSpend {
        fn ok(entries: Vec<RawSpendEntry>) -> Self {
            Self {
                result: Ok(entries),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(reason: &str) -> Self {
            Self {
                result: Err(reason.to_string()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl ReportSource for FakeSpend {
        type Entry = RawSpendEntry;

        fn name(&self) -> &str {
            "fake-spend"
        }

        fn cache_key(&self) -> String {
            "fake-spend".into()
        }

        fn fetch(&self) -> Result<Vec<RawSpendEntry>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone().map_err(RoastrackError::Fetch)
        }
    }

    struct FakeRevenue(Vec<RawRevenueEntry>);

    impl ReportSource for FakeRevenue {
        type Entry = RawRevenueEntry;

        fn name(&self) -> &str {
            "fake-revenue"
        }

        fn cache_key(&self) -> String {
            "fake-revenue".into()
        }

        fn fetch(&self) -> Result<Vec<RawRevenueEntry>> {
            Ok(self.0.clone())
        }
    }

    fn spend_entry(amount: i64) -> RawSpendEntry {
        RawSpendEntry {
            date: Some(Scalar::Int(20241101)),
            package_name: Some("idA".into()),
            spend: Some(Scalar::Int(amount)),
            ..Default::default()
        }
    }

    fn cache(ttl_secs: i64) -> (ResponseCache, TempDir) {
        let temp = TempDir::new().unwrap();
        (ResponseCache::with_cache_dir(temp.path().to_path_buf(), ttl_secs), temp)
    }

    // ========== load_source ==========

    #[test]
    fn test_fetch_without_cache() {
        let source = FakeSpend::ok(vec![spend_entry(1)]);
        let data = load_source(&source, None, false);

        assert_eq!(data.status, SourceStatus::Fresh);
        assert_eq!(data.entries.len(), 1);
    }

    #[test]
    fn test_failure_without_cache_is_unavailable_and_empty() {
        let source = FakeSpend::failing("timed out");
        let data = load_source(&source, None, false);

        assert!(data.entries.is_empty());
        assert!(matches!(data.status, SourceStatus::Unavailable(ref r) if r.contains("timed out")));
        assert!(!data.status.is_available());
    }

    #[test]
    fn test_fresh_cache_skips_fetch() {
        let (cache, _temp) = cache(3600);
        cache.save("fake-spend", &[spend_entry(7)]).unwrap();

        let source = FakeSpend::ok(vec![spend_entry(1), spend_entry(2)]);
        let data = load_source(&source, Some(&cache), false);

        assert_eq!(data.status, SourceStatus::Cached);
        assert_eq!(data.entries, vec![spend_entry(7)]);
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_refresh_bypasses_cache_and_rewrites_it() {
        let (cache, _temp) = cache(3600);
        cache.save("fake-spend", &[spend_entry(7)]).unwrap();

        let source = FakeSpend::ok(vec![spend_entry(1), spend_entry(2)]);
        let data = load_source(&source, Some(&cache), true);

        assert_eq!(data.status, SourceStatus::Fresh);
        assert_eq!(data.entries.len(), 2);
        let stored = cache.load::<RawSpendEntry>("fake-spend").unwrap();
        assert_eq!(stored.entries.len(), 2);
    }

    #[test]
    fn test_failure_falls_back_to_expired_cache() {
        let (cache, _temp) = cache(-1);
        cache.save("fake-spend", &[spend_entry(7)]).unwrap();

        let source = FakeSpend::failing("HTTP 502");
        let data = load_source(&source, Some(&cache), false);

        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert!(matches!(data.status, SourceStatus::Stale(_)));
        assert!(data.status.is_available());
        assert_eq!(data.entries, vec![spend_entry(7)]);
    }

    // ========== fetch_snapshot ==========

    #[test]
    fn test_snapshot_one_side_down() {
        let revenue = FakeRevenue(vec![RawRevenueEntry {
            day: Some("2024-11-01".into()),
            ..Default::default()
        }]);
        let spend = FakeSpend::failing("connection refused");

        let snapshot = fetch_snapshot(&revenue, &spend, None, false);

        assert_eq!(snapshot.revenue.status, SourceStatus::Fresh);
        assert_eq!(snapshot.revenue.entries.len(), 1);
        assert!(!snapshot.spend.status.is_available());
        assert!(snapshot.spend.entries.is_empty());
    }

    // ========== decode_rows ==========

    #[test]
    fn test_decode_rows_keeps_good_rows() {
        let rows: Vec<serde_json::Value> = serde_json::from_str(
            r#"[{"date": 20241101, "spend": 1}, null, "oops", 7, {"spend": "2"}]"#,
        )
        .unwrap();

        let entries: Vec<RawSpendEntry> = decode_rows("test", rows);

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].spend, Some(Scalar::Int(1)));
        assert_eq!(entries[1].spend, Some(Scalar::Text("2".into())));
    }

    // ========== FileSource ==========

    #[test]
    fn test_file_source_reads_envelope() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("spend.json");
        fs::write(
            &path,
            r#"{"code": 200, "data": [{"date": 20241101, "package_name": "idA", "geo": ["US"], "spend": "1.5"}]}"#,
        )
        .unwrap();

        let entries = FileSource::spend(&path).fetch().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].spend, Some(Scalar::Text("1.5".into())));
    }

    #[test]
    fn test_file_source_missing_file_is_unavailable() {
        let temp = TempDir::new().unwrap();
        let source = FileSource::revenue(&temp.path().join("nope.json"));
        let data = load_source(&source, None, false);
        assert!(!data.status.is_available());
    }
}
