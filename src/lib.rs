//! roastrack: reconcile ad revenue against user-acquisition spend
//!
//! Revenue comes from AppLovin MAX, spend from Mintegral. Both are
//! normalized to one date/country/package representation and joined on a
//! chosen key to report profit and ROAS.

pub mod cli;
pub mod config;
pub mod services;
pub mod sources;
pub mod types;

pub use services::{aggregate, Granularity, ReportOptions};
