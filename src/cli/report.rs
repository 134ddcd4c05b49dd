//! `report`, `spend` and `apps` subcommands

use clap::Args;

use super::format::{render_apps, render_report, render_spend, GameLabels};
use super::{report_source_status, today, write_json, QueryArgs};
use crate::config::Config;
use crate::services::{
    normalize_spend, Granularity, Reconciler, Report, ReportOptions, SortColumn, SortDirection,
    SortSpec,
};
use crate::sources::{fetch_snapshot, load_source, Snapshot};
use crate::types::{DateWindow, Result};

/// Reconcile revenue and spend
#[derive(Args, Debug)]
pub struct ReportArgs {
    /// Grouping key: date, date-country, date-game, date-game-country,
    /// game, game-country, country, overall
    #[arg(long, default_value = "date-game-country", value_name = "KEY")]
    pub by: Granularity,

    /// Sort column: date, game, country, revenue, spend, profit, roas
    #[arg(long, value_name = "COLUMN")]
    pub sort: Option<SortColumn>,

    /// Sort descending
    #[arg(long)]
    pub desc: bool,

    #[command(flatten)]
    pub query: QueryArgs,
}

impl ReportArgs {
    fn sort_spec(&self) -> Option<SortSpec> {
        let direction = if self.desc {
            SortDirection::Descending
        } else {
            SortDirection::Ascending
        };
        match self.sort {
            Some(column) => Some(SortSpec::new(column, direction)),
            None if self.desc => Some(SortSpec::new(SortColumn::Date, direction)),
            None => None,
        }
    }

    /// Fetch both sides and reconcile them over `window`
    fn reconcile(&self, config: &Config, window: DateWindow) -> Result<(Report, Snapshot)> {
        let mapping = config.mapping();

        let revenue_source = self.query.revenue_source(config, window)?;
        let spend_source = self.query.spend_source(config, window)?;
        let cache = self.query.cache(config);
        let snapshot = fetch_snapshot(
            revenue_source.as_ref(),
            spend_source.as_ref(),
            cache.as_ref(),
            self.query.refresh,
        );
        report_source_status("revenue", &snapshot.revenue);
        report_source_status("spend", &snapshot.spend);

        let options = ReportOptions {
            granularity: self.by,
            window: self.query.revenue_window(window),
            filters: self.query.filters(window),
            sort: self.sort_spec(),
        };
        let report = Reconciler::new(&mapping).report(
            &snapshot.revenue.entries,
            &snapshot.spend.entries,
            &options,
        );
        Ok((report, snapshot))
    }

    pub fn run(self, config: &Config) -> Result<()> {
        let window = self.query.window(config.window_days, today())?;
        let (report, snapshot) = self.reconcile(config, window)?;

        if self.query.json {
            return write_json(&report);
        }

        if report.rows.is_empty() {
            match self.query.revenue_window(window) {
                Some(window) => println!("No revenue between {} and {}", window.start, window.end),
                None => println!("No revenue in the revenue file"),
            }
            return Ok(());
        }

        let mapping = config.mapping();
        let mut labels = GameLabels::new(&mapping);
        for entry in &snapshot.revenue.entries {
            if let (Some(pkg), Some(app)) = (&entry.package_name, &entry.application) {
                labels.observe(pkg.trim(), app);
            }
        }
        print!(
            "{}",
            render_report(report.granularity, &report.rows, &report.summary, &labels)
        );
        Ok(())
    }
}

/// Spend totals per key, no revenue join
#[derive(Args, Debug)]
pub struct SpendArgs {
    /// Grouping key (see `report --by`)
    #[arg(long, default_value = "country", value_name = "KEY")]
    pub by: Granularity,

    #[command(flatten)]
    pub query: QueryArgs,
}

impl SpendArgs {
    pub fn run(self, config: &Config) -> Result<()> {
        let window = self.query.window(config.window_days, today())?;
        let mapping = config.mapping();

        let source = self.query.spend_source(config, window)?;
        let cache = self.query.cache(config);
        let data = load_source(source.as_ref(), cache.as_ref(), self.query.refresh);
        report_source_status("spend", &data);

        let spend = normalize_spend(&data.entries, &mapping);
        let totals = Reconciler::new(&mapping).spend_totals(
            &spend.records,
            self.by,
            &self.query.filters(window),
        );

        if self.query.json {
            return write_json(&totals);
        }

        if totals.is_empty() {
            println!("No spend recorded");
            return Ok(());
        }

        let mut labels = GameLabels::new(&mapping);
        for record in &spend.records {
            if let Some(name) = &record.game_name {
                labels.observe(&record.package_name, name);
            }
        }
        print!("{}", render_spend(self.by, &totals, &labels));
        Ok(())
    }
}

/// List tracked apps
#[derive(Args, Debug)]
pub struct AppsArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AppsArgs {
    pub fn run(self, config: &Config) -> Result<()> {
        if self.json {
            return write_json(&config.apps);
        }
        print!("{}", render_apps(&config.mapping()));
        Ok(())
    }
}
