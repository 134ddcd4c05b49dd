//! Reconciler service: joins revenue and spend and computes profit/ROAS

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use tracing::debug;

use super::mapping::PackageMapping;
use super::normalizer::{normalize_revenue, normalize_spend};
use crate::types::{
    AggregatedRow, DateWindow, GroupKey, NormalizeStats, RawRevenueEntry, RawSpendEntry,
    ReportSummary, RevenueRecord, SpendRecord, SpendTotal,
};

/// Join/grouping key of a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Granularity {
    Date,
    DateCountry,
    DateGame,
    /// Finest key: one row per (date, game, country)
    #[default]
    DateGameCountry,
    Game,
    GameCountry,
    Country,
    Overall,
}

impl Granularity {
    pub const ALL: [Granularity; 8] = [
        Granularity::Date,
        Granularity::DateCountry,
        Granularity::DateGame,
        Granularity::DateGameCountry,
        Granularity::Game,
        Granularity::GameCountry,
        Granularity::Country,
        Granularity::Overall,
    ];

    pub fn has_date(self) -> bool {
        matches!(
            self,
            Self::Date | Self::DateCountry | Self::DateGame | Self::DateGameCountry
        )
    }

    pub fn has_game(self) -> bool {
        matches!(
            self,
            Self::DateGame | Self::DateGameCountry | Self::Game | Self::GameCountry
        )
    }

    pub fn has_country(self) -> bool {
        matches!(
            self,
            Self::DateCountry | Self::DateGameCountry | Self::GameCountry | Self::Country
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Date => "date",
            Self::DateCountry => "date-country",
            Self::DateGame => "date-game",
            Self::DateGameCountry => "date-game-country",
            Self::Game => "game",
            Self::GameCountry => "game-country",
            Self::Country => "country",
            Self::Overall => "overall",
        }
    }

    fn revenue_key(self, record: &RevenueRecord) -> Option<GroupKey> {
        let game = if self.has_game() {
            Some(record.package_name.clone()?)
        } else {
            None
        };
        Some(GroupKey {
            date: self.has_date().then_some(record.date),
            game,
            country: self.has_country().then(|| record.country.clone()),
        })
    }

    fn spend_key(self, record: &SpendRecord) -> Option<GroupKey> {
        let date = if self.has_date() {
            Some(record.date?)
        } else {
            None
        };
        Some(GroupKey {
            date,
            game: self.has_game().then(|| record.package_name.clone()),
            country: self.has_country().then(|| record.country.clone()),
        })
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|g| g.as_str() == s)
            .or(match s.as_str() {
                "row" | "rows" => Some(Self::DateGameCountry),
                "total" => Some(Self::Overall),
                _ => None,
            })
            .ok_or_else(|| {
                let names: Vec<&str> = Self::ALL.iter().map(|g| g.as_str()).collect();
                format!("unknown granularity '{}' (expected one of: {})", s, names.join(", "))
            })
    }
}

/// Optional record filters, applied to both sides before joining
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filters {
    pub date_range: Option<DateWindow>,
    /// Bundle id or display name, case-insensitive
    pub game: Option<String>,
    /// Country code, case-insensitive
    pub country: Option<String>,
}

/// Name seen in the upstream data (revenue `application`, spend preview link)
fn observed_name_is(name: Option<&str>, game: &str) -> bool {
    name.is_some_and(|n| n.trim().eq_ignore_ascii_case(game.trim()))
}

impl Filters {
    fn accepts_revenue(&self, mapping: &PackageMapping, record: &RevenueRecord) -> bool {
        if let Some(range) = self.date_range {
            if !range.contains(record.date) {
                return false;
            }
        }
        if let Some(game) = &self.game {
            let by_mapping = record
                .package_name
                .as_deref()
                .is_some_and(|pkg| mapping.matches_game(pkg, game));
            if !by_mapping && !observed_name_is(record.application.as_deref(), game) {
                return false;
            }
        }
        if let Some(country) = &self.country {
            if !record.country.eq_ignore_ascii_case(country.trim()) {
                return false;
            }
        }
        true
    }

    fn accepts_spend(&self, mapping: &PackageMapping, record: &SpendRecord) -> bool {
        if let Some(range) = self.date_range {
            if !record.date.is_some_and(|d| range.contains(d)) {
                return false;
            }
        }
        if let Some(game) = &self.game {
            if !observed_name_is(record.game_name.as_deref(), game)
                && !mapping.matches_game(&record.package_name, game)
            {
                return false;
            }
        }
        if let Some(country) = &self.country {
            if !record.country.eq_ignore_ascii_case(country.trim()) {
                return false;
            }
        }
        true
    }
}

/// Sortable report column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortColumn {
    #[default]
    Date,
    Game,
    Country,
    Revenue,
    Spend,
    Profit,
    Roas,
}

impl FromStr for SortColumn {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "date" | "day" => Ok(Self::Date),
            "game" | "package" | "package_name" => Ok(Self::Game),
            "country" => Ok(Self::Country),
            "revenue" => Ok(Self::Revenue),
            "spend" => Ok(Self::Spend),
            "profit" => Ok(Self::Profit),
            "roas" => Ok(Self::Roas),
            other => Err(format!(
                "unknown sort column '{}' (expected date, game, country, revenue, spend, profit or roas)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SortSpec {
    pub column: SortColumn,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn new(column: SortColumn, direction: SortDirection) -> Self {
        Self { column, direction }
    }
}

/// Case-insensitive order with an exact-compare tie break
fn compare_text(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

fn compare_opt_text(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => compare_text(a, b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Chronological; missing dates after present ones
fn compare_opt_date(a: Option<chrono::NaiveDate>, b: Option<chrono::NaiveDate>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn compare_keys(a: &AggregatedRow, b: &AggregatedRow) -> Ordering {
    compare_opt_date(a.date, b.date)
        .then_with(|| compare_opt_text(a.game.as_deref(), b.game.as_deref()))
        .then_with(|| compare_opt_text(a.country.as_deref(), b.country.as_deref()))
}

/// Sort rows by one column; ties fall back to key order so output is stable
pub fn sort_rows(rows: &mut [AggregatedRow], spec: SortSpec) {
    rows.sort_by(|a, b| {
        let primary = match spec.column {
            SortColumn::Date => compare_opt_date(a.date, b.date),
            SortColumn::Game => compare_opt_text(a.game.as_deref(), b.game.as_deref()),
            SortColumn::Country => compare_opt_text(a.country.as_deref(), b.country.as_deref()),
            SortColumn::Revenue => a.revenue.total_cmp(&b.revenue),
            SortColumn::Spend => a.spend.total_cmp(&b.spend),
            SortColumn::Profit => a.profit.total_cmp(&b.profit),
            SortColumn::Roas => a.roas.total_cmp(&b.roas),
        };
        let primary = match spec.direction {
            SortDirection::Ascending => primary,
            SortDirection::Descending => primary.reverse(),
        };
        primary.then_with(|| compare_keys(a, b))
    });
}

/// Everything a report query needs besides the data and the mapping
#[derive(Debug, Clone, Default)]
pub struct ReportOptions {
    pub granularity: Granularity,
    /// Revenue rows outside this window are dropped during normalization
    pub window: Option<DateWindow>,
    pub filters: Filters,
    /// `None` sorts by key (date, game, country) ascending
    pub sort: Option<SortSpec>,
}

/// Reconciled rows plus totals and normalization counters
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub granularity: Granularity,
    pub rows: Vec<AggregatedRow>,
    pub summary: ReportSummary,
    pub revenue_stats: NormalizeStats,
    pub spend_stats: NormalizeStats,
}

/// Reconciler for revenue and spend records
pub struct Reconciler<'a> {
    mapping: &'a PackageMapping,
}

impl<'a> Reconciler<'a> {
    pub fn new(mapping: &'a PackageMapping) -> Self {
        Self { mapping }
    }

    /// Normalize raw upstream rows and reconcile them
    pub fn aggregate(
        &self,
        revenue_raw: &[RawRevenueEntry],
        spend_raw: &[RawSpendEntry],
        options: &ReportOptions,
    ) -> Vec<AggregatedRow> {
        self.report(revenue_raw, spend_raw, options).rows
    }

    /// Like [`Reconciler::aggregate`], keeping the summary and counters
    pub fn report(
        &self,
        revenue_raw: &[RawRevenueEntry],
        spend_raw: &[RawSpendEntry],
        options: &ReportOptions,
    ) -> Report {
        let revenue = normalize_revenue(revenue_raw, options.window);
        let spend = normalize_spend(spend_raw, self.mapping);
        let rows = self.reconcile(&revenue.records, &spend.records, options);

        Report {
            granularity: options.granularity,
            summary: ReportSummary::from_rows(&rows),
            rows,
            revenue_stats: revenue.stats,
            spend_stats: spend.stats,
        }
    }

    /// Join normalized records on the granularity key.
    ///
    /// Spend is summed per key into a lookup; revenue is summed per key and
    /// each revenue group picks up its spend. Keys with spend but no revenue
    /// produce no row.
    pub fn reconcile(
        &self,
        revenue: &[RevenueRecord],
        spend: &[SpendRecord],
        options: &ReportOptions,
    ) -> Vec<AggregatedRow> {
        let granularity = options.granularity;
        let filters = &options.filters;

        let mut spend_lookup: HashMap<GroupKey, f64> = HashMap::new();
        for record in spend {
            if !filters.accepts_spend(self.mapping, record) {
                continue;
            }
            if let Some(key) = granularity.spend_key(record) {
                *spend_lookup.entry(key).or_insert(0.0) += record.spend;
            }
        }

        let mut revenue_groups: HashMap<GroupKey, f64> = HashMap::new();
        for record in revenue {
            if !filters.accepts_revenue(self.mapping, record) {
                continue;
            }
            if let Some(key) = granularity.revenue_key(record) {
                *revenue_groups.entry(key).or_insert(0.0) += record.revenue;
            }
        }

        let unmatched_spend = spend_lookup
            .keys()
            .filter(|k| !revenue_groups.contains_key(k))
            .count();
        if unmatched_spend > 0 {
            debug!(
                unmatched_spend,
                granularity = granularity.as_str(),
                "spend keys without revenue"
            );
        }

        let mut rows: Vec<AggregatedRow> = revenue_groups
            .into_iter()
            .map(|(key, revenue)| {
                let spend = spend_lookup.get(&key).copied().unwrap_or(0.0);
                AggregatedRow::new(key, revenue, spend)
            })
            .collect();

        match options.sort {
            Some(spec) => sort_rows(&mut rows, spec),
            None => rows.sort_by(compare_keys),
        }
        rows
    }

    /// Spend grouped by the granularity key, without a revenue join.
    /// Groups whose total is not positive are dropped. Sorted by spend,
    /// highest first.
    pub fn spend_totals(
        &self,
        spend: &[SpendRecord],
        granularity: Granularity,
        filters: &Filters,
    ) -> Vec<SpendTotal> {
        let mut groups: HashMap<GroupKey, f64> = HashMap::new();
        for record in spend {
            if !filters.accepts_spend(self.mapping, record) {
                continue;
            }
            if let Some(key) = granularity.spend_key(record) {
                *groups.entry(key).or_insert(0.0) += record.spend;
            }
        }

        let mut totals: Vec<(GroupKey, f64)> =
            groups.into_iter().filter(|(_, spend)| *spend > 0.0).collect();
        totals.sort_by(|(ka, a), (kb, b)| {
            b.total_cmp(a)
                .then_with(|| compare_opt_date(ka.date, kb.date))
                .then_with(|| compare_opt_text(ka.game.as_deref(), kb.game.as_deref()))
                .then_with(|| compare_opt_text(ka.country.as_deref(), kb.country.as_deref()))
        });

        totals
            .into_iter()
            .map(|(key, spend)| SpendTotal {
                date: key.date,
                game: key.game,
                country: key.country,
                spend,
            })
            .collect()
    }
}

/// Normalize and reconcile in one call
pub fn aggregate(
    revenue_raw: &[RawRevenueEntry],
    spend_raw: &[RawSpendEntry],
    mapping: &PackageMapping,
    options: &ReportOptions,
) -> Vec<AggregatedRow> {
    Reconciler::new(mapping).aggregate(revenue_raw, spend_raw, options)
}
