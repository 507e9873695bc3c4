use std::collections::HashMap;

use serde::Serialize;

use crate::error::Result;
use crate::table::{Column, ColumnType, Table, Value};

/// A statistical profile of a table, serializable to JSON.
#[derive(Debug, Serialize)]
pub struct TableSummary {
    pub rows: usize,
    pub cols: usize,
    pub columns: Vec<ColumnSummary>,
}

#[derive(Debug, Serialize)]
pub struct ColumnSummary {
    pub name: String,
    pub dtype: &'static str,
    pub nulls: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numeric: Option<NumericStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_span: Option<TimeSpan>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub top_values: Vec<ValueCount>,
}

#[derive(Debug, Serialize)]
pub struct NumericStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub std: f64,
}

#[derive(Debug, Serialize)]
pub struct TimeSpan {
    pub min: String,
    pub max: String,
    pub days: i64,
}

#[derive(Debug, Serialize)]
pub struct ValueCount {
    pub value: String,
    pub count: usize,
}

impl TableSummary {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Profiles every column: type, null count, numeric statistics, timestamp
/// span, and the ten most frequent values of text columns.
#[must_use]
pub fn summarize(table: &Table) -> TableSummary {
    TableSummary {
        rows: table.n_rows(),
        cols: table.n_cols(),
        columns: table.columns().iter().map(summarize_column).collect(),
    }
}

fn summarize_column(column: &Column) -> ColumnSummary {
    let dtype = column.dtype();
    ColumnSummary {
        name: column.name().to_string(),
        dtype: dtype_name(dtype),
        nulls: column.null_count(),
        numeric: matches!(dtype, ColumnType::Int | ColumnType::Float)
            .then(|| numeric_stats(column))
            .flatten(),
        time_span: matches!(dtype, ColumnType::Date | ColumnType::Timestamp)
            .then(|| time_span(column))
            .flatten(),
        top_values: if dtype == ColumnType::Str {
            top_values(column)
        } else {
            Vec::new()
        },
    }
}

fn dtype_name(dtype: ColumnType) -> &'static str {
    match dtype {
        ColumnType::Int => "int",
        ColumnType::Float => "float",
        ColumnType::Bool => "bool",
        ColumnType::Str => "str",
        ColumnType::Date => "date",
        ColumnType::Timestamp => "timestamp",
    }
}

fn numeric_stats(column: &Column) -> Option<NumericStats> {
    let mut numbers: Vec<f64> = column.numbers().collect();
    if numbers.is_empty() {
        return None;
    }
    numbers.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = numbers.len();
    let mean = numbers.iter().sum::<f64>() / n as f64;
    let median = if n % 2 == 1 {
        numbers[n / 2]
    } else {
        (numbers[n / 2 - 1] + numbers[n / 2]) / 2.0
    };
    let std = if n < 2 {
        0.0
    } else {
        let variance = numbers.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        variance.sqrt()
    };
    Some(NumericStats {
        min: numbers[0],
        max: numbers[n - 1],
        mean,
        median,
        std,
    })
}

fn time_span(column: &Column) -> Option<TimeSpan> {
    let timestamps = column.values().iter().filter_map(Value::as_timestamp);
    let min = timestamps.clone().min()?;
    let max = timestamps.max()?;
    Some(TimeSpan {
        min: min.format("%Y-%m-%d %H:%M:%S").to_string(),
        max: max.format("%Y-%m-%d %H:%M:%S").to_string(),
        days: (max - min).num_days(),
    })
}

fn top_values(column: &Column) -> Vec<ValueCount> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for value in column.values() {
        if let Some(s) = value.as_str() {
            *counts.entry(s).or_default() += 1;
        }
    }
    let mut pairs: Vec<(&str, usize)> = counts.into_iter().collect();
    pairs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    pairs
        .into_iter()
        .take(10)
        .map(|(value, count)| ValueCount {
            value: value.to_string(),
            count,
        })
        .collect()
}
