use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{Result, Warning};
use crate::table::{Column, ColumnType, Table, Value};

/// Primary timestamp format, tried first on every date-like column.
pub(crate) const PRIMARY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Fallback date formats, tried in order.
pub(crate) const FALLBACK_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y"];

/// Identifier columns that must be non-null; offending rows are removed.
const CRITICAL_COLUMNS: [&str; 4] = ["order_id", "transaction_id", "customer_id", "product_id"];

/// Columns expected to hold non-negative numbers.
const NON_NEGATIVE_COLUMNS: [&str; 4] = ["price", "quantity", "total_value", "shipping_cost"];

/// What [`Normalizer::normalize`] did to the table.
#[derive(Debug, Default, Clone)]
pub struct NormalizeReport {
    /// Rows removed because a critical identifier column was null.
    pub dropped_rows: usize,
    /// True when the stored `total_value` column looked implausible and was
    /// recomputed from `price * quantity`.
    pub recomputed_total: bool,
    /// Date-like columns successfully converted to timestamps.
    pub converted_columns: Vec<String>,
    /// (column, offending row count) for columns with negative minimums.
    pub negative_values: Vec<(String, usize)>,
    /// Non-fatal problems found along the way.
    pub warnings: Vec<Warning>,
}

/// Standardizes a raw table: column names, date columns, the computed
/// total, and critical identifier nulls.
///
/// Construct once with a [`Config`] and reuse across tables.
#[derive(Debug)]
pub struct Normalizer<'a> {
    config: &'a Config,
    word_sep: Regex,
}

impl<'a> Normalizer<'a> {
    pub fn new(config: &'a Config) -> Result<Self> {
        Ok(Self {
            config,
            word_sep: Regex::new(r"[^a-z0-9]+")?,
        })
    }

    /// Runs the full normalization pass. Degraded steps are recorded in the
    /// report; only the table itself is returned alongside it, never an
    /// error. An empty table passes through untouched.
    pub fn normalize(&self, mut table: Table) -> (Table, NormalizeReport) {
        let mut report = NormalizeReport::default();
        if table.is_empty() {
            warn!("empty table, nothing to normalize");
            return (table, report);
        }
        info!(rows = table.n_rows(), cols = table.n_cols(), "normalizing table");

        self.standardize_names(&mut table);
        self.convert_date_columns(&mut table, &mut report);
        self.reconcile_total(&mut table, &mut report);
        self.drop_null_critical_rows(&mut table, &mut report);
        self.audit_non_negative(&table, &mut report);

        info!(
            rows = table.n_rows(),
            dropped = report.dropped_rows,
            warnings = report.warnings.len(),
            "normalization finished"
        );
        (table, report)
    }

    /// Lowercases column names and collapses separator runs to `_`.
    fn standardize_names(&self, table: &mut Table) {
        table.rename_columns(|name| {
            let lowered = name.to_lowercase();
            self.word_sep
                .replace_all(&lowered, "_")
                .trim_matches('_')
                .to_string()
        });
    }

    fn convert_date_columns(&self, table: &mut Table, report: &mut NormalizeReport) {
        let candidates: Vec<String> = table
            .column_names()
            .iter()
            .filter(|n| n.contains("date") || n.contains("time"))
            .map(|n| (*n).to_string())
            .collect();
        for name in candidates {
            let Some(column) = table.column(&name) else {
                continue;
            };
            match column.dtype() {
                ColumnType::Timestamp | ColumnType::Date => continue,
                ColumnType::Str => {}
                other => {
                    report.warnings.push(Warning::new(
                        "normalize",
                        format!("date-like column {name:?} has type {other:?}, left unconverted"),
                    ));
                    continue;
                }
            }
            match parse_timestamp_column(column.values()) {
                Some(converted) => {
                    info!(column = %name, "date column converted");
                    report.converted_columns.push(name.clone());
                    table.set_column(Column::new(name, converted));
                }
                None => {
                    warn!(column = %name, "no date format matched, column left unconverted");
                    report.warnings.push(Warning::new(
                        "normalize",
                        format!("column {name:?} matched no known date format"),
                    ));
                }
            }
        }
    }

    /// Computes `total_value` when absent; when present, recomputes the
    /// whole column if its maximum exceeds `max(price) * max(quantity)` by
    /// more than the anomaly factor. The formula is trusted over stored
    /// data that looks implausible.
    fn reconcile_total(&self, table: &mut Table, report: &mut NormalizeReport) {
        let (Some(price), Some(quantity)) = (table.column("price"), table.column("quantity"))
        else {
            return;
        };
        let computed: Vec<Value> = price
            .values()
            .iter()
            .zip(quantity.values())
            .map(|(p, q)| match (p.as_f64(), q.as_f64()) {
                (Some(p), Some(q)) => Value::Float(p * q),
                _ => Value::Null,
            })
            .collect();

        match table.column("total_value") {
            None => {
                info!("computing missing total_value column");
                table.set_column(Column::new("total_value", computed));
            }
            Some(total) => {
                let bounds = (total.max_f64(), price.max_f64(), quantity.max_f64());
                let (Some(max_total), Some(max_price), Some(max_qty)) = bounds else {
                    report.warnings.push(Warning::new(
                        "normalize",
                        "could not validate total_value against price and quantity",
                    ));
                    return;
                };
                let expected = max_price * max_qty;
                if max_total > expected * self.config.anomaly_threshold {
                    warn!(
                        max_total,
                        expected, "implausible total_value column, recomputing from price * quantity"
                    );
                    report.recomputed_total = true;
                    table.set_column(Column::new("total_value", computed));
                }
            }
        }
    }

    fn drop_null_critical_rows(&self, table: &mut Table, report: &mut NormalizeReport) {
        let present: Vec<&str> = CRITICAL_COLUMNS
            .into_iter()
            .filter(|name| table.has_column(name))
            .collect();
        if present.is_empty() {
            return;
        }
        let before = table.n_rows();
        let mut keep = vec![true; before];
        for name in &present {
            if let Some(column) = table.column(name) {
                for (row, value) in column.values().iter().enumerate() {
                    if value.is_null() {
                        keep[row] = false;
                    }
                }
            }
        }
        table.retain_rows(&keep);
        report.dropped_rows = before - table.n_rows();
        if report.dropped_rows > 0 {
            warn!(
                dropped = report.dropped_rows,
                "removed rows with null critical identifiers"
            );
        }
    }

    fn audit_non_negative(&self, table: &Table, report: &mut NormalizeReport) {
        for name in NON_NEGATIVE_COLUMNS {
            let Some(column) = table.column(name) else {
                continue;
            };
            if !matches!(column.dtype(), ColumnType::Int | ColumnType::Float) {
                continue;
            }
            if column.min_f64().is_some_and(|min| min < 0.0) {
                let offending = column.numbers().filter(|x| *x < 0.0).count();
                warn!(column = name, offending, "negative values found");
                report.negative_values.push((name.to_string(), offending));
                report.warnings.push(Warning::new(
                    "normalize",
                    format!("column {name:?} has {offending} negative values"),
                ));
            }
        }
    }
}

/// Parses every non-null cell of a text column with the first format that
/// accepts all of them. Returns `None` when no format matches.
pub(crate) fn parse_timestamp_column(values: &[Value]) -> Option<Vec<Value>> {
    std::iter::once(PRIMARY_FORMAT)
        .chain(FALLBACK_FORMATS)
        .find_map(|format| {
            let mut converted = Vec::with_capacity(values.len());
            for value in values {
                match value {
                    Value::Null => converted.push(Value::Null),
                    Value::Str(s) => converted.push(Value::Timestamp(parse_with(s, format)?)),
                    _ => return None,
                }
            }
            Some(converted)
        })
}

/// Parses a single timestamp, accepting date-only formats as midnight.
fn parse_with(s: &str, format: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, format).ok().or_else(|| {
        NaiveDate::parse_from_str(s, format)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
    })
}
