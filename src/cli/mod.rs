mod format;
mod report;

use std::path::PathBuf;

use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use tracing::warn;

use crate::config::Config;
use crate::services::Filters;
use crate::sources::{
    ApplovinSource, FileSource, MintegralSource, ReportSource, ResponseCache, SourceData,
};
use crate::types::{
    DateWindow, RawRevenueEntry, RawSpendEntry, Result, RoastrackError, SourceStatus,
};

pub use report::{AppsArgs, ReportArgs, SpendArgs};

/// Ad revenue vs. UA spend reconciliation
#[derive(Parser)]
#[command(name = "roastrack")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file (default: ~/.roastrack/config.json)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Revenue, spend, profit and ROAS per key
    Report(ReportArgs),

    /// Spend totals without the revenue join
    Spend(SpendArgs),

    /// List the package mapping
    Apps(AppsArgs),
}

impl Cli {
    pub fn run(self) -> anyhow::Result<()> {
        let config = Config::load(self.config.as_deref())?;
        match self.command {
            Commands::Report(args) => args.run(&config)?,
            Commands::Spend(args) => args.run(&config)?,
            Commands::Apps(args) => args.run(&config)?,
        }
        Ok(())
    }
}

/// Date range, filters and data-source options shared by `report` and `spend`
#[derive(Args, Debug, Clone, Default)]
pub struct QueryArgs {
    /// First day to include (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub from: Option<NaiveDate>,

    /// Last day to include (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub to: Option<NaiveDate>,

    /// Only this game (bundle id or name)
    #[arg(long)]
    pub game: Option<String>,

    /// Only this country code
    #[arg(long)]
    pub country: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Ignore cached responses
    #[arg(long)]
    pub refresh: bool,

    /// Read revenue from a JSON file instead of AppLovin. The whole file is
    /// reported unless --from/--to narrow it
    #[arg(long, value_name = "FILE")]
    pub revenue_file: Option<PathBuf>,

    /// Read spend from a JSON file instead of Mintegral
    #[arg(long, value_name = "FILE")]
    pub spend_file: Option<PathBuf>,
}

impl QueryArgs {
    /// Report window: `--from`/`--to` when given, otherwise the last
    /// `days` days up to `today`
    pub fn window(&self, days: u32, today: NaiveDate) -> Result<DateWindow> {
        let window = match (self.from, self.to) {
            (Some(from), Some(to)) => DateWindow::new(from, to),
            (Some(from), None) => DateWindow::new(from, today.max(from)),
            (None, Some(to)) => DateWindow::last_days(days, to),
            (None, None) => DateWindow::last_days(days, today),
        };
        if window.start > window.end {
            return Err(RoastrackError::Config(format!(
                "--from {} is after --to {}",
                window.start, window.end
            )));
        }
        Ok(window)
    }

    fn has_range(&self) -> bool {
        self.from.is_some() || self.to.is_some()
    }

    /// Window applied to revenue rows. A revenue file holds a recorded
    /// period, so only an explicit range cuts it
    pub fn revenue_window(&self, window: DateWindow) -> Option<DateWindow> {
        if self.revenue_file.is_some() && !self.has_range() {
            None
        } else {
            Some(window)
        }
    }

    /// Explicit `--from`/`--to` also restrict spend; the default window only
    /// bounds the revenue query
    pub fn filters(&self, window: DateWindow) -> Filters {
        Filters {
            date_range: self.has_range().then_some(window),
            game: self.game.clone(),
            country: self.country.clone(),
        }
    }

    fn uses_files(&self) -> bool {
        self.revenue_file.is_some() || self.spend_file.is_some()
    }

    fn revenue_source(
        &self,
        config: &Config,
        window: DateWindow,
    ) -> Result<Box<dyn ReportSource<Entry = RawRevenueEntry>>> {
        let source: Box<dyn ReportSource<Entry = RawRevenueEntry>> = match &self.revenue_file {
            Some(path) => Box::new(FileSource::revenue(path)),
            None => Box::new(ApplovinSource::from_config(config, window)?),
        };
        Ok(source)
    }

    fn spend_source(
        &self,
        config: &Config,
        window: DateWindow,
    ) -> Result<Box<dyn ReportSource<Entry = RawSpendEntry>>> {
        let source: Box<dyn ReportSource<Entry = RawSpendEntry>> = match &self.spend_file {
            Some(path) => Box::new(FileSource::spend(path)),
            None => Box::new(MintegralSource::from_config(config, Some(window))?),
        };
        Ok(source)
    }

    /// Response cache for network sources; local files are never cached
    fn cache(&self, config: &Config) -> Option<ResponseCache> {
        if self.uses_files() {
            return None;
        }
        match ResponseCache::new(config.cache_ttl_secs) {
            Ok(cache) => Some(cache),
            Err(e) => {
                warn!(error = %e, "response cache disabled");
                None
            }
        }
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Tell the user on stderr when a source had to fall back
fn report_source_status<T>(name: &str, data: &SourceData<T>) {
    match &data.status {
        SourceStatus::Fresh | SourceStatus::Cached => {}
        SourceStatus::Stale(reason) => {
            eprintln!(
                "[roastrack] Warning: {} unavailable ({}), using cached data",
                name, reason
            );
        }
        SourceStatus::Unavailable(reason) => {
            eprintln!(
                "[roastrack] Warning: {} unavailable ({}), no {} data",
                name, reason, name
            );
        }
    }
}

fn write_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json =
        serde_json::to_string_pretty(value).map_err(|e| RoastrackError::Parse(e.to_string()))?;
    println!("{}", json);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{Granularity, SortColumn};
    use std::path::Path;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    // ========== Parsing ==========

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["roastrack"]).is_err());
    }

    #[test]
    fn test_cli_parse_report_defaults() {
        let cli = Cli::try_parse_from(["roastrack", "report"]).unwrap();
        let Commands::Report(args) = cli.command else {
            panic!("expected report");
        };
        assert_eq!(args.by, Granularity::DateGameCountry);
        assert!(args.sort.is_none());
        assert!(!args.desc);
        assert!(!args.query.json);
    }

    #[test]
    fn test_cli_parse_report_options() {
        let cli = Cli::try_parse_from([
            "roastrack",
            "report",
            "--by",
            "game-country",
            "--from",
            "2024-11-01",
            "--to",
            "2024-11-07",
            "--sort",
            "roas",
            "--desc",
            "--json",
            "--config",
            "/tmp/roastrack.json",
        ])
        .unwrap();

        assert_eq!(cli.config.as_deref(), Some(Path::new("/tmp/roastrack.json")));
        let Commands::Report(args) = cli.command else {
            panic!("expected report");
        };
        assert_eq!(args.by, Granularity::GameCountry);
        assert_eq!(args.sort, Some(SortColumn::Roas));
        assert!(args.desc);
        assert_eq!(args.query.from, Some(date(2024, 11, 1)));
        assert_eq!(args.query.to, Some(date(2024, 11, 7)));
        assert!(args.query.json);
    }

    #[test]
    fn test_cli_rejects_unknown_granularity() {
        assert!(Cli::try_parse_from(["roastrack", "report", "--by", "week"]).is_err());
    }

    #[test]
    fn test_cli_rejects_bad_date() {
        assert!(Cli::try_parse_from(["roastrack", "report", "--from", "11/01/2024"]).is_err());
    }

    #[test]
    fn test_cli_parse_spend_defaults_to_country() {
        let cli = Cli::try_parse_from(["roastrack", "spend"]).unwrap();
        let Commands::Spend(args) = cli.command else {
            panic!("expected spend");
        };
        assert_eq!(args.by, Granularity::Country);
    }

    #[test]
    fn test_cli_parse_apps_json() {
        let cli = Cli::try_parse_from(["roastrack", "apps", "--json"]).unwrap();
        assert!(matches!(cli.command, Commands::Apps(AppsArgs { json: true })));
    }

    // ========== Window ==========

    #[test]
    fn test_window_defaults_to_last_days() {
        let query = QueryArgs::default();
        let window = query.window(7, date(2024, 11, 8)).unwrap();
        assert_eq!(window, DateWindow::new(date(2024, 11, 1), date(2024, 11, 8)));
        assert_eq!(query.filters(window).date_range, None);
    }

    #[test]
    fn test_window_from_explicit_range() {
        let query = QueryArgs {
            from: Some(date(2024, 10, 1)),
            to: Some(date(2024, 10, 31)),
            ..Default::default()
        };
        let window = query.window(7, date(2024, 11, 8)).unwrap();
        assert_eq!(window, DateWindow::new(date(2024, 10, 1), date(2024, 10, 31)));
        assert_eq!(query.filters(window).date_range, Some(window));
    }

    #[test]
    fn test_window_from_only_runs_to_today() {
        let query = QueryArgs {
            from: Some(date(2024, 11, 3)),
            ..Default::default()
        };
        let window = query.window(7, date(2024, 11, 8)).unwrap();
        assert_eq!(window, DateWindow::new(date(2024, 11, 3), date(2024, 11, 8)));
    }

    #[test]
    fn test_window_reversed_range_is_error() {
        let query = QueryArgs {
            from: Some(date(2024, 11, 8)),
            to: Some(date(2024, 11, 1)),
            ..Default::default()
        };
        assert!(matches!(
            query.window(7, date(2024, 11, 8)),
            Err(RoastrackError::Config(_))
        ));
    }

    #[test]
    fn test_revenue_window_bounds_network_revenue() {
        let query = QueryArgs::default();
        let window = query.window(7, date(2024, 11, 8)).unwrap();
        assert_eq!(query.revenue_window(window), Some(window));
    }

    #[test]
    fn test_revenue_file_ignores_default_window() {
        let query = QueryArgs {
            revenue_file: Some(PathBuf::from("revenue.json")),
            ..Default::default()
        };
        let window = query.window(7, date(2026, 10, 17)).unwrap();
        assert_eq!(query.revenue_window(window), None);
        assert_eq!(query.filters(window).date_range, None);
    }

    #[test]
    fn test_revenue_file_with_range_is_cut() {
        let query = QueryArgs {
            to: Some(date(2024, 11, 1)),
            revenue_file: Some(PathBuf::from("revenue.json")),
            ..Default::default()
        };
        let window = query.window(7, date(2026, 10, 17)).unwrap();
        assert_eq!(query.revenue_window(window), Some(window));
    }
}
