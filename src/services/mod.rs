//! Services for normalization and reconciliation

pub mod aggregator;
pub mod mapping;
pub mod normalizer;

pub use aggregator::{
    aggregate, sort_rows, Filters, Granularity, Reconciler, Report, ReportOptions, SortColumn,
    SortDirection, SortSpec,
};
pub use mapping::{AppEntry, PackageMapping};
pub use normalizer::{normalize_revenue, normalize_spend};
