//! Plain-text table rendering for report output

use std::collections::HashMap;

use crate::services::{Granularity, PackageMapping};
use crate::types::{AggregatedRow, ReportSummary, SpendTotal};

/// Format a dollar amount with thousand separators and 2 decimals
/// (e.g., -1234.5 -> "-$1,234.50")
pub fn format_money(amount: f64) -> String {
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let len = whole.len();
    let mut result = String::with_capacity(len + len / 3 + 5);

    if amount < 0.0 && cents > 0 {
        result.push('-');
    }
    result.push('$');
    // Digits are ASCII, so byte indexing is safe
    for (i, ch) in whole.bytes().enumerate() {
        if i > 0 && (len - i).is_multiple_of(3) {
            result.push(',');
        }
        result.push(ch as char);
    }
    result.push_str(&format!(".{:02}", cents % 100));
    result
}

/// Game labels: mapping name first, then a name seen in the data, then the
/// bundle id
pub struct GameLabels<'a> {
    mapping: &'a PackageMapping,
    fallback: HashMap<String, String>,
}

impl<'a> GameLabels<'a> {
    pub fn new(mapping: &'a PackageMapping) -> Self {
        Self {
            mapping,
            fallback: HashMap::new(),
        }
    }

    /// Remember `name` for `bundle_id` unless one is already known
    pub fn observe(&mut self, bundle_id: &str, name: &str) {
        if name.trim().is_empty() {
            return;
        }
        self.fallback
            .entry(bundle_id.to_string())
            .or_insert_with(|| name.trim().to_string());
    }

    pub fn label<'b>(&'b self, bundle_id: &'b str) -> &'b str {
        let mapped = self.mapping.display_name(bundle_id);
        if mapped != bundle_id {
            return mapped;
        }
        self.fallback
            .get(bundle_id)
            .map(String::as_str)
            .unwrap_or(bundle_id)
    }
}

/// Left-aligned key columns followed by right-aligned numeric columns
struct Table {
    headers: Vec<&'static str>,
    key_columns: usize,
    rows: Vec<Vec<String>>,
}

impl Table {
    fn new(headers: Vec<&'static str>, key_columns: usize) -> Self {
        Self {
            headers,
            key_columns,
            rows: Vec::new(),
        }
    }

    fn push(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    fn render(&self, footer: Option<Vec<String>>) -> String {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.len()).collect();
        for row in self.rows.iter().chain(footer.iter()) {
            for (w, cell) in widths.iter_mut().zip(row) {
                *w = (*w).max(cell.chars().count());
            }
        }

        let line = |cells: &[String]| -> String {
            let mut out = String::new();
            for (i, (cell, width)) in cells.iter().zip(&widths).enumerate() {
                if i > 0 {
                    out.push_str("  ");
                }
                if i < self.key_columns {
                    out.push_str(&format!("{:<width$}", cell, width = *width));
                } else {
                    out.push_str(&format!("{:>width$}", cell, width = *width));
                }
            }
            out.trim_end().to_string()
        };

        let header: Vec<String> = self.headers.iter().map(|h| h.to_string()).collect();
        let total_width = widths.iter().sum::<usize>() + 2 * widths.len().saturating_sub(1);

        let mut out = String::new();
        out.push_str(&line(&header));
        out.push('\n');
        out.push_str(&"-".repeat(total_width));
        out.push('\n');
        for row in &self.rows {
            out.push_str(&line(row));
            out.push('\n');
        }
        if let Some(footer) = footer {
            out.push_str(&"-".repeat(total_width));
            out.push('\n');
            out.push_str(&line(&footer));
            out.push('\n');
        }
        out
    }
}

fn key_headers(granularity: Granularity) -> Vec<&'static str> {
    let mut headers = Vec::with_capacity(3);
    if granularity.has_date() {
        headers.push("Date");
    }
    if granularity.has_game() {
        headers.push("Game");
    }
    if granularity.has_country() {
        headers.push("Country");
    }
    headers
}

fn key_cells(
    granularity: Granularity,
    date: Option<chrono::NaiveDate>,
    game: Option<&str>,
    country: Option<&str>,
    labels: &GameLabels<'_>,
) -> Vec<String> {
    let mut cells = Vec::with_capacity(3);
    if granularity.has_date() {
        cells.push(date.map(|d| d.to_string()).unwrap_or_default());
    }
    if granularity.has_game() {
        cells.push(game.map(|g| labels.label(g).to_string()).unwrap_or_default());
    }
    if granularity.has_country() {
        cells.push(country.unwrap_or_default().to_string());
    }
    cells
}

/// Footer cells: "TOTAL" in the first key column, blanks in the rest
fn total_cells(key_columns: usize) -> Vec<String> {
    let mut cells = vec![String::new(); key_columns];
    match cells.first_mut() {
        Some(first) => *first = "TOTAL".to_string(),
        None => cells.push("TOTAL".to_string()),
    }
    cells
}

/// Reconciled rows with a TOTAL line and the NET ROAS figure
pub fn render_report(
    granularity: Granularity,
    rows: &[AggregatedRow],
    summary: &ReportSummary,
    labels: &GameLabels<'_>,
) -> String {
    let mut headers = key_headers(granularity);
    let key_columns = headers.len().max(1);
    if headers.is_empty() {
        headers.push("");
    }
    headers.extend(["Revenue", "Spend", "Profit", "ROAS"]);

    let mut table = Table::new(headers, key_columns);
    for row in rows {
        let mut cells = key_cells(
            granularity,
            row.date,
            row.game.as_deref(),
            row.country.as_deref(),
            labels,
        );
        if cells.is_empty() {
            cells.push(String::new());
        }
        cells.extend([
            format_money(row.revenue),
            format_money(row.spend),
            format_money(row.profit),
            row.roas.to_string(),
        ]);
        table.push(cells);
    }

    let mut footer = total_cells(key_columns);
    footer.extend([
        format_money(summary.revenue),
        format_money(summary.spend),
        format_money(summary.profit),
        summary.roas.to_string(),
    ]);

    let mut out = table.render(Some(footer));
    out.push_str(&format!("NET ROAS: {}\n", summary.net_roas_display()));
    out
}

/// Spend-only totals with a TOTAL line
pub fn render_spend(
    granularity: Granularity,
    totals: &[SpendTotal],
    labels: &GameLabels<'_>,
) -> String {
    let mut headers = key_headers(granularity);
    let key_columns = headers.len().max(1);
    if headers.is_empty() {
        headers.push("");
    }
    headers.push("Spend");

    let mut table = Table::new(headers, key_columns);
    for total in totals {
        let mut cells = key_cells(
            granularity,
            total.date,
            total.game.as_deref(),
            total.country.as_deref(),
            labels,
        );
        if cells.is_empty() {
            cells.push(String::new());
        }
        cells.push(format_money(total.spend));
        table.push(cells);
    }

    let mut footer = total_cells(key_columns);
    footer.push(format_money(totals.iter().map(|t| t.spend).sum()));
    table.render(Some(footer))
}

/// Package mapping listing
pub fn render_apps(mapping: &PackageMapping) -> String {
    let mut table = Table::new(vec!["Name", "Bundle ID", "Store ID"], 3);
    for app in mapping.apps() {
        table.push(vec![
            app.name.clone().unwrap_or_default(),
            app.bundle_id.clone(),
            app.store_id.clone(),
        ]);
    }
    table.render(None)
}
