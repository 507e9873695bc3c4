#![doc = include_str!("../README.md")]

pub mod analysis;
pub mod calendar;
pub mod config;
pub mod error;
pub mod export;
pub mod generate;
pub mod io;
pub mod money;
pub mod normalize;
pub mod report;
pub mod summary;
pub mod table;

pub use analysis::{by_category, by_period, by_region, Analysis, Capabilities, ResultNode};
pub use calendar::{build_calendar, calendar_table, DateRange};
pub use config::Config;
pub use error::{Error, Result, Warning};
pub use export::Exporter;
pub use generate::{Generator, SalesRecord};
pub use io::{read_table, write_table};
pub use money::Money;
pub use normalize::{NormalizeReport, Normalizer};
pub use report::markdown_report;
pub use summary::{summarize, TableSummary};
pub use table::{Column, Table, Value};
