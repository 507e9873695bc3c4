use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use tracing::{info, warn};

use crate::calendar::WEEKDAY_NAMES;
use crate::error::{Error, Result, Warning};
use crate::normalize::parse_timestamp_column;
use crate::table::{Column, ColumnType, Table, Value};

/// Region column candidates, tried in order when none is supplied.
const REGION_CANDIDATES: [&str; 4] = ["region", "state", "city", "country"];

/// A tree of aggregation results: either one flat table, or a named
/// collection of sub-results (at most two levels in practice).
#[derive(Debug, Clone, PartialEq)]
pub enum ResultNode {
    Leaf(Table),
    Group(BTreeMap<String, ResultNode>),
}

impl ResultNode {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ResultNode> {
        match self {
            Self::Leaf(_) => None,
            Self::Group(children) => children.get(name),
        }
    }

    #[must_use]
    pub fn as_leaf(&self) -> Option<&Table> {
        match self {
            Self::Leaf(table) => Some(table),
            Self::Group(_) => None,
        }
    }

    /// Flattens the tree into `(underscore_joined_path, table)` pairs in
    /// deterministic (sorted) order. A root leaf yields one pair with an
    /// empty path.
    #[must_use]
    pub fn leaves(&self) -> Vec<(String, &Table)> {
        fn walk<'a>(node: &'a ResultNode, path: String, out: &mut Vec<(String, &'a Table)>) {
            match node {
                ResultNode::Leaf(table) => out.push((path, table)),
                ResultNode::Group(children) => {
                    for (name, child) in children {
                        let next = if path.is_empty() {
                            name.clone()
                        } else {
                            format!("{path}_{name}")
                        };
                        walk(child, next, out);
                    }
                }
            }
        }
        let mut out = Vec::new();
        walk(self, String::new(), &mut out);
        out
    }
}

/// The outcome of one analysis call: the result tree plus any warnings
/// from optional breakdowns that had to be skipped.
#[derive(Debug)]
pub struct Analysis {
    pub node: ResultNode,
    pub warnings: Vec<Warning>,
}

/// What the input schema supports, checked once per call and consumed by
/// name instead of re-inspecting columns in every function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub has_quantity: bool,
    pub has_cost: bool,
    pub has_subcategory: bool,
}

impl Capabilities {
    #[must_use]
    pub fn of(table: &Table) -> Self {
        Self {
            has_quantity: table.has_column("quantity"),
            has_cost: table.has_column("cost_value"),
            has_subcategory: table.has_column("product_subcategory"),
        }
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Mean with a defined zero: an empty group averages to 0.0 instead of
/// raising a division fault.
fn ratio(sum: f64, count: i64) -> f64 {
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Views the date column as timestamps, converting a text column with the
/// usual format ladder first.
fn coerce_timestamps(table: &Table, date_col: &str) -> Result<Vec<Option<NaiveDateTime>>> {
    let column = table.require(date_col)?;
    match column.dtype() {
        ColumnType::Timestamp | ColumnType::Date => {
            Ok(column.values().iter().map(Value::as_timestamp).collect())
        }
        ColumnType::Str => {
            let converted = parse_timestamp_column(column.values())
                .ok_or_else(|| Error::Conversion(date_col.to_string()))?;
            Ok(converted.iter().map(Value::as_timestamp).collect())
        }
        _ => Err(Error::Conversion(date_col.to_string())),
    }
}

/// Breaks sales down by calendar day, month, weekday, and (when the data
/// spans at least three distinct months) quarter.
///
/// # Errors
///
/// Fails when either column is missing, the table is empty, or the date
/// column cannot be read as timestamps. Individual breakdowns cannot fail
/// past that point; the quarter breakdown is simply omitted when the
/// policy gate is not met.
pub fn by_period(table: &Table, date_col: &str, value_col: &str) -> Result<Analysis> {
    table.require(date_col)?;
    let values = table.require(value_col)?;
    if table.is_empty() {
        return Err(Error::Validation("cannot analyse an empty table".into()));
    }
    info!(date_col, value_col, "analysing sales by period");

    let timestamps = coerce_timestamps(table, date_col)?;
    let rows: Vec<(NaiveDateTime, f64)> = timestamps
        .iter()
        .zip(values.values())
        .filter_map(|(ts, v)| Some(((*ts)?, v.as_f64()?)))
        .collect();

    let mut children = BTreeMap::new();
    children.insert("by_day".to_string(), ResultNode::Leaf(by_day(&rows)));
    children.insert("by_month".to_string(), ResultNode::Leaf(by_month(&rows)));
    children.insert("by_weekday".to_string(), ResultNode::Leaf(by_weekday(&rows)));

    let distinct_months: HashSet<u32> = rows.iter().map(|(ts, _)| ts.month()).collect();
    if distinct_months.len() >= 3 {
        children.insert("by_quarter".to_string(), ResultNode::Leaf(by_quarter(&rows)));
    } else {
        info!(
            months = distinct_months.len(),
            "quarter breakdown skipped, fewer than 3 distinct months"
        );
    }

    Ok(Analysis {
        node: ResultNode::Group(children),
        warnings: Vec::new(),
    })
}

fn by_day(rows: &[(NaiveDateTime, f64)]) -> Table {
    let mut groups: BTreeMap<NaiveDate, (f64, i64)> = BTreeMap::new();
    for (ts, v) in rows {
        let entry = groups.entry(ts.date()).or_insert((0.0, 0));
        entry.0 += v;
        entry.1 += 1;
    }
    let mut table = Table::new();
    table.set_column(Column::new(
        "date",
        groups.keys().map(|d| Value::Date(*d)).collect(),
    ));
    push_measures(&mut table, groups.values());
    table
}

fn by_month(rows: &[(NaiveDateTime, f64)]) -> Table {
    let mut groups: BTreeMap<(i32, u32), (f64, i64)> = BTreeMap::new();
    for (ts, v) in rows {
        let entry = groups.entry((ts.year(), ts.month())).or_insert((0.0, 0));
        entry.0 += v;
        entry.1 += 1;
    }
    let mut table = Table::new();
    table.set_column(Column::new(
        "year",
        groups.keys().map(|(y, _)| Value::Int(i64::from(*y))).collect(),
    ));
    table.set_column(Column::new(
        "month",
        groups.keys().map(|(_, m)| Value::Int(i64::from(*m))).collect(),
    ));
    table.set_column(Column::new(
        "month_label",
        groups
            .keys()
            .map(|(y, m)| Value::Str(format!("{y}-{m:02}")))
            .collect(),
    ));
    push_measures(&mut table, groups.values());
    table
}

fn by_weekday(rows: &[(NaiveDateTime, f64)]) -> Table {
    let mut groups: BTreeMap<u32, (f64, i64)> = BTreeMap::new();
    for (ts, v) in rows {
        let weekday = ts.weekday().num_days_from_monday();
        let entry = groups.entry(weekday).or_insert((0.0, 0));
        entry.0 += v;
        entry.1 += 1;
    }
    let mut table = Table::new();
    table.set_column(Column::new(
        "weekday",
        groups.keys().map(|w| Value::Int(i64::from(*w))).collect(),
    ));
    table.set_column(Column::new(
        "weekday_name",
        groups
            .keys()
            .map(|w| Value::Str(WEEKDAY_NAMES[*w as usize].to_string()))
            .collect(),
    ));
    push_measures(&mut table, groups.values());
    table
}

fn by_quarter(rows: &[(NaiveDateTime, f64)]) -> Table {
    let mut groups: BTreeMap<(i32, u32), (f64, i64)> = BTreeMap::new();
    for (ts, v) in rows {
        let quarter = (ts.month() - 1) / 3 + 1;
        let entry = groups.entry((ts.year(), quarter)).or_insert((0.0, 0));
        entry.0 += v;
        entry.1 += 1;
    }
    let mut table = Table::new();
    table.set_column(Column::new(
        "year",
        groups.keys().map(|(y, _)| Value::Int(i64::from(*y))).collect(),
    ));
    table.set_column(Column::new(
        "quarter",
        groups.keys().map(|(_, q)| Value::Int(i64::from(*q))).collect(),
    ));
    table.set_column(Column::new(
        "quarter_label",
        groups
            .keys()
            .map(|(y, q)| Value::Str(format!("{y}-Q{q}")))
            .collect(),
    ));
    push_measures(&mut table, groups.values());
    table
}

/// Appends the shared sum/count/mean measure columns.
fn push_measures<'a>(table: &mut Table, groups: impl Iterator<Item = &'a (f64, i64)> + Clone) {
    table.set_column(Column::new(
        "total_value",
        groups.clone().map(|(sum, _)| Value::Float(*sum)).collect(),
    ));
    table.set_column(Column::new(
        "transactions",
        groups.clone().map(|(_, count)| Value::Int(*count)).collect(),
    ));
    table.set_column(Column::new(
        "avg_ticket",
        groups
            .map(|(sum, count)| Value::Float(ratio(*sum, *count)))
            .collect(),
    ));
}

#[derive(Debug, Default, Clone, Copy)]
struct Acc {
    sum: f64,
    count: i64,
    quantity: f64,
    cost: f64,
}

/// Breaks sales down by category, adding quantity and cost measures when
/// the schema carries them, and a subcategory secondary breakdown when a
/// `product_subcategory` column exists.
///
/// # Errors
///
/// Fails when either named column is missing or the table is empty. A
/// failed subcategory breakdown degrades to the primary result with a
/// warning.
pub fn by_category(table: &Table, category_col: &str, value_col: &str) -> Result<Analysis> {
    table.require(category_col)?;
    table.require(value_col)?;
    if table.is_empty() {
        return Err(Error::Validation("cannot analyse an empty table".into()));
    }
    let caps = Capabilities::of(table);
    info!(category_col, value_col, ?caps, "analysing sales by category");

    let primary = aggregate_categories(table, category_col, value_col, caps)?;
    let mut warnings = Vec::new();
    let node = if caps.has_subcategory {
        match aggregate_subcategories(table, category_col, value_col, caps) {
            Ok(secondary) => {
                let mut children = BTreeMap::new();
                children.insert("categories".to_string(), ResultNode::Leaf(primary));
                children.insert("subcategories".to_string(), ResultNode::Leaf(secondary));
                ResultNode::Group(children)
            }
            Err(warning) => {
                warn!(%warning, "subcategory breakdown degraded");
                warnings.push(warning);
                ResultNode::Leaf(primary)
            }
        }
    } else {
        ResultNode::Leaf(primary)
    };

    Ok(Analysis { node, warnings })
}

fn aggregate_categories(
    table: &Table,
    category_col: &str,
    value_col: &str,
    caps: Capabilities,
) -> Result<Table> {
    let keys = table.require(category_col)?.values();
    let values = table.require(value_col)?.values();
    let quantities = table.column("quantity").map(Column::values);
    let costs = table.column("cost_value").map(Column::values);

    let mut groups: HashMap<&str, Acc> = HashMap::new();
    for row in 0..keys.len() {
        let Some(key) = keys[row].as_str() else {
            continue;
        };
        let acc = groups.entry(key).or_default();
        if let Some(v) = values[row].as_f64() {
            acc.sum += v;
            acc.count += 1;
        }
        if let Some(q) = quantities.and_then(|cells| cells[row].as_f64()) {
            acc.quantity += q;
        }
        if let Some(c) = costs.and_then(|cells| cells[row].as_f64()) {
            acc.cost += c;
        }
    }

    let mut rows: Vec<(&str, Acc)> = groups.into_iter().collect();
    rows.sort_by(|a, b| {
        b.1.sum
            .partial_cmp(&a.1.sum)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    });
    let grand_total: f64 = rows.iter().map(|(_, acc)| acc.sum).sum();

    let mut result = Table::new();
    result.set_column(Column::new(
        category_col,
        rows.iter().map(|(k, _)| Value::Str((*k).to_string())).collect(),
    ));
    result.set_column(Column::new(
        "total_value",
        rows.iter().map(|(_, a)| Value::Float(a.sum)).collect(),
    ));
    result.set_column(Column::new(
        "transactions",
        rows.iter().map(|(_, a)| Value::Int(a.count)).collect(),
    ));
    result.set_column(Column::new(
        "avg_ticket",
        rows.iter()
            .map(|(_, a)| Value::Float(ratio(a.sum, a.count)))
            .collect(),
    ));
    if caps.has_quantity {
        result.set_column(Column::new(
            "total_quantity",
            rows.iter().map(|(_, a)| Value::Float(a.quantity)).collect(),
        ));
    }
    if caps.has_cost {
        result.set_column(Column::new(
            "total_cost",
            rows.iter().map(|(_, a)| Value::Float(a.cost)).collect(),
        ));
    }
    result.set_column(Column::new(
        "pct_of_total",
        rows.iter()
            .map(|(_, a)| {
                Value::Float(if grand_total == 0.0 {
                    0.0
                } else {
                    round2(a.sum / grand_total * 100.0)
                })
            })
            .collect(),
    ));
    if caps.has_cost {
        result.set_column(Column::new(
            "margin_pct",
            rows.iter()
                .map(|(_, a)| {
                    Value::Float(if a.sum == 0.0 {
                        0.0
                    } else {
                        round2((a.sum - a.cost) / a.sum * 100.0)
                    })
                })
                .collect(),
        ));
    }
    Ok(result)
}

fn aggregate_subcategories(
    table: &Table,
    category_col: &str,
    value_col: &str,
    caps: Capabilities,
) -> std::result::Result<Table, Warning> {
    let degraded = |message: &str| Warning::new("by_category", message);
    let keys = table
        .column(category_col)
        .ok_or_else(|| degraded("category column disappeared"))?
        .values();
    let subkeys = table
        .column("product_subcategory")
        .ok_or_else(|| degraded("subcategory column disappeared"))?
        .values();
    let values = table
        .column(value_col)
        .ok_or_else(|| degraded("value column disappeared"))?
        .values();
    let quantities = table.column("quantity").map(Column::values);
    let costs = table.column("cost_value").map(Column::values);

    let mut groups: HashMap<(&str, &str), Acc> = HashMap::new();
    for row in 0..keys.len() {
        let (Some(category), Some(subcategory)) = (keys[row].as_str(), subkeys[row].as_str())
        else {
            continue;
        };
        let acc = groups.entry((category, subcategory)).or_default();
        if let Some(v) = values[row].as_f64() {
            acc.sum += v;
            acc.count += 1;
        }
        if let Some(q) = quantities.and_then(|cells| cells[row].as_f64()) {
            acc.quantity += q;
        }
        if let Some(c) = costs.and_then(|cells| cells[row].as_f64()) {
            acc.cost += c;
        }
    }
    if groups.is_empty() {
        return Err(degraded(
            "subcategory breakdown skipped: no rows with both category and subcategory",
        ));
    }

    let mut rows: Vec<((&str, &str), Acc)> = groups.into_iter().collect();
    rows.sort_by(|a, b| {
        b.1.sum
            .partial_cmp(&a.1.sum)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });

    let mut result = Table::new();
    result.set_column(Column::new(
        category_col,
        rows.iter()
            .map(|((c, _), _)| Value::Str((*c).to_string()))
            .collect(),
    ));
    result.set_column(Column::new(
        "product_subcategory",
        rows.iter()
            .map(|((_, s), _)| Value::Str((*s).to_string()))
            .collect(),
    ));
    result.set_column(Column::new(
        "total_value",
        rows.iter().map(|(_, a)| Value::Float(a.sum)).collect(),
    ));
    result.set_column(Column::new(
        "transactions",
        rows.iter().map(|(_, a)| Value::Int(a.count)).collect(),
    ));
    result.set_column(Column::new(
        "avg_ticket",
        rows.iter()
            .map(|(_, a)| Value::Float(ratio(a.sum, a.count)))
            .collect(),
    ));
    if caps.has_quantity {
        result.set_column(Column::new(
            "total_quantity",
            rows.iter().map(|(_, a)| Value::Float(a.quantity)).collect(),
        ));
    }
    if caps.has_cost {
        result.set_column(Column::new(
            "total_cost",
            rows.iter().map(|(_, a)| Value::Float(a.cost)).collect(),
        ));
    }
    Ok(result)
}

/// Breaks sales down by region, auto-detecting the region column when none
/// is supplied. When grouping by `state` and a separate `region` column
/// exists, a `macro_region` column is attached opportunistically.
///
/// # Errors
///
/// Fails when no region candidate column exists, the value column is
/// missing, or the table is empty. A failed macro-region enrichment only
/// produces a warning.
pub fn by_region(table: &Table, region_col: Option<&str>, value_col: &str) -> Result<Analysis> {
    let region_col = match region_col {
        Some(name) => {
            table.require(name)?;
            name
        }
        None => REGION_CANDIDATES
            .into_iter()
            .find(|candidate| table.has_column(candidate))
            .ok_or_else(|| Error::ColumnNotFound("region/state/city/country".to_string()))?,
    };
    let values = table.require(value_col)?;
    if table.is_empty() {
        return Err(Error::Validation("cannot analyse an empty table".into()));
    }
    info!(region_col, value_col, "analysing sales by region");

    let keys = table.require(region_col)?.values();
    let mut groups: HashMap<&str, (f64, i64)> = HashMap::new();
    for (key, value) in keys.iter().zip(values.values()) {
        let Some(key) = key.as_str() else { continue };
        let entry = groups.entry(key).or_insert((0.0, 0));
        if let Some(v) = value.as_f64() {
            entry.0 += v;
            entry.1 += 1;
        }
    }

    let mut rows: Vec<(&str, (f64, i64))> = groups.into_iter().collect();
    rows.sort_by(|a, b| {
        b.1 .0
            .partial_cmp(&a.1 .0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    });
    let grand_total: f64 = rows.iter().map(|(_, (sum, _))| sum).sum();

    let mut result = Table::new();
    result.set_column(Column::new(
        region_col,
        rows.iter().map(|(k, _)| Value::Str((*k).to_string())).collect(),
    ));
    result.set_column(Column::new(
        "total_value",
        rows.iter().map(|(_, (sum, _))| Value::Float(*sum)).collect(),
    ));
    result.set_column(Column::new(
        "transactions",
        rows.iter()
            .map(|(_, (_, count))| Value::Int(*count))
            .collect(),
    ));
    result.set_column(Column::new(
        "avg_ticket",
        rows.iter()
            .map(|(_, (sum, count))| Value::Float(ratio(*sum, *count)))
            .collect(),
    ));
    result.set_column(Column::new(
        "pct_of_total",
        rows.iter()
            .map(|(_, (sum, _))| {
                Value::Float(if grand_total == 0.0 {
                    0.0
                } else {
                    round2(sum / grand_total * 100.0)
                })
            })
            .collect(),
    ));

    let mut warnings = Vec::new();
    if region_col == "state" && table.has_column("region") {
        match state_region_lookup(table) {
            Ok(lookup) => {
                result.set_column(Column::new(
                    "macro_region",
                    rows.iter()
                        .map(|(state, _)| {
                            lookup
                                .get(state)
                                .map_or(Value::Null, |r| Value::Str((*r).to_string()))
                        })
                        .collect(),
                ));
            }
            Err(warning) => {
                warn!(%warning, "macro-region enrichment degraded");
                warnings.push(warning);
            }
        }
    }

    Ok(Analysis {
        node: ResultNode::Leaf(result),
        warnings,
    })
}

/// Builds a state-to-region lookup from the distinct pairs in the table.
fn state_region_lookup(table: &Table) -> std::result::Result<HashMap<&str, &str>, Warning> {
    let degraded = |message: &str| Warning::new("by_region", message);
    let states = table
        .column("state")
        .ok_or_else(|| degraded("state column disappeared"))?
        .values();
    let regions = table
        .column("region")
        .ok_or_else(|| degraded("region column disappeared"))?
        .values();
    let mut lookup = HashMap::new();
    for (state, region) in states.iter().zip(regions) {
        if let (Some(state), Some(region)) = (state.as_str(), region.as_str()) {
            lookup.entry(state).or_insert(region);
        }
    }
    if lookup.is_empty() {
        return Err(degraded(
            "macro-region mapping skipped: no rows with both state and region",
        ));
    }
    Ok(lookup)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn str_col(name: &str, cells: &[&str]) -> Column {
        Column::new(
            name,
            cells.iter().map(|s| Value::Str((*s).to_string())).collect(),
        )
    }

    fn float_col(name: &str, cells: &[f64]) -> Column {
        Column::new(name, cells.iter().map(|x| Value::Float(*x)).collect())
    }

    fn period_table(dates: &[&str], values: &[f64]) -> Table {
        let mut t = Table::new();
        t.set_column(str_col("date", dates));
        t.set_column(float_col("total_value", values));
        t
    }

    #[test]
    fn by_period_fn_fails_for_missing_columns() {
        let t = period_table(&["2025-01-01 10:00:00"], &[1.0]);
        assert!(matches!(
            by_period(&t, "nope", "total_value"),
            Err(Error::ColumnNotFound(_))
        ));
        assert!(matches!(
            by_period(&t, "date", "nope"),
            Err(Error::ColumnNotFound(_))
        ));
    }

    #[test]
    fn by_period_fn_fails_for_empty_tables() {
        let t = period_table(&[], &[]);
        assert!(matches!(
            by_period(&t, "date", "total_value"),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn by_period_fn_fails_for_unconvertible_date_column() {
        let mut t = Table::new();
        t.set_column(float_col("date", &[1.0, 2.0]));
        t.set_column(float_col("total_value", &[1.0, 2.0]));
        assert!(matches!(
            by_period(&t, "date", "total_value"),
            Err(Error::Conversion(_))
        ));
    }

    #[test]
    fn by_period_fn_groups_by_day_in_ascending_order() {
        let t = period_table(
            &[
                "2025-01-02 10:00:00",
                "2025-01-01 09:00:00",
                "2025-01-02 15:00:00",
            ],
            &[10.0, 5.0, 20.0],
        );
        let analysis = by_period(&t, "date", "total_value").unwrap();
        let days = analysis.node.get("by_day").unwrap().as_leaf().unwrap();
        assert_eq!(days.n_rows(), 2);
        assert_eq!(
            days.value("date", 0),
            Some(&Value::Date(
                NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
            ))
        );
        assert_eq!(days.value("total_value", 1), Some(&Value::Float(30.0)));
        assert_eq!(days.value("transactions", 1), Some(&Value::Int(2)));
        assert_eq!(days.value("avg_ticket", 1), Some(&Value::Float(15.0)));
    }

    #[test]
    fn by_period_fn_labels_months_and_weekdays() {
        let t = period_table(
            &["2025-01-06 10:00:00", "2025-02-08 10:00:00"],
            &[10.0, 20.0],
        );
        let analysis = by_period(&t, "date", "total_value").unwrap();

        let months = analysis.node.get("by_month").unwrap().as_leaf().unwrap();
        assert_eq!(
            months.value("month_label", 0),
            Some(&Value::Str("2025-01".into()))
        );

        // 2025-01-06 is a Monday, 2025-02-08 a Saturday.
        let weekdays = analysis.node.get("by_weekday").unwrap().as_leaf().unwrap();
        assert_eq!(weekdays.value("weekday", 0), Some(&Value::Int(0)));
        assert_eq!(
            weekdays.value("weekday_name", 0),
            Some(&Value::Str("Monday".into()))
        );
        assert_eq!(weekdays.value("weekday", 1), Some(&Value::Int(5)));
        assert_eq!(
            weekdays.value("weekday_name", 1),
            Some(&Value::Str("Saturday".into()))
        );
    }

    #[test]
    fn by_period_fn_omits_quarter_breakdown_under_three_months() {
        let t = period_table(
            &["2025-01-01 10:00:00", "2025-02-01 10:00:00"],
            &[1.0, 2.0],
        );
        let analysis = by_period(&t, "date", "total_value").unwrap();
        assert!(analysis.node.get("by_quarter").is_none());
    }

    #[test]
    fn by_period_fn_includes_quarter_breakdown_from_three_months() {
        let t = period_table(
            &[
                "2025-01-01 10:00:00",
                "2025-02-01 10:00:00",
                "2025-04-01 10:00:00",
            ],
            &[1.0, 2.0, 4.0],
        );
        let analysis = by_period(&t, "date", "total_value").unwrap();
        let quarters = analysis.node.get("by_quarter").unwrap().as_leaf().unwrap();
        assert_eq!(quarters.n_rows(), 2);
        assert_eq!(
            quarters.value("quarter_label", 0),
            Some(&Value::Str("2025-Q1".into()))
        );
        assert_eq!(quarters.value("total_value", 0), Some(&Value::Float(3.0)));
        assert_eq!(
            quarters.value("quarter_label", 1),
            Some(&Value::Str("2025-Q2".into()))
        );
    }

    fn category_table() -> Table {
        let mut t = Table::new();
        t.set_column(str_col(
            "product_category",
            &["Books", "Toys", "Books", "Tools"],
        ));
        t.set_column(float_col("total_value", &[10.0, 40.0, 30.0, 20.0]));
        t
    }

    #[test]
    fn by_category_fn_sorts_descending_and_conserves_totals() {
        let t = category_table();
        let analysis = by_category(&t, "product_category", "total_value").unwrap();
        let leaf = analysis.node.as_leaf().unwrap();

        assert_eq!(
            leaf.value("product_category", 0),
            Some(&Value::Str("Books".into()))
        );
        assert_eq!(leaf.value("total_value", 0), Some(&Value::Float(40.0)));
        assert_eq!(leaf.value("transactions", 0), Some(&Value::Int(2)));

        let sum: f64 = leaf.column("total_value").unwrap().sum_f64();
        assert!((sum - 100.0).abs() < 1e-9);
        let pct: f64 = leaf.column("pct_of_total").unwrap().sum_f64();
        assert!((pct - 100.0).abs() < 0.02);
    }

    #[test]
    fn by_category_fn_adds_quantity_cost_and_margin_when_present() {
        let mut t = category_table();
        t.set_column(Column::new(
            "quantity",
            vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)],
        ));
        t.set_column(float_col("cost_value", &[5.0, 30.0, 15.0, 10.0]));
        let analysis = by_category(&t, "product_category", "total_value").unwrap();
        let leaf = analysis.node.as_leaf().unwrap();

        // Books: value 40, cost 20, quantity 4; margin (40-20)/40 = 50%.
        assert_eq!(leaf.value("total_quantity", 0), Some(&Value::Float(4.0)));
        assert_eq!(leaf.value("total_cost", 0), Some(&Value::Float(20.0)));
        assert_eq!(leaf.value("margin_pct", 0), Some(&Value::Float(50.0)));
    }

    #[test]
    fn by_category_fn_groups_subcategories_when_present() {
        let mut t = category_table();
        t.set_column(str_col(
            "product_subcategory",
            &["Fiction", "Puzzles", "Comics", "Hammers"],
        ));
        let analysis = by_category(&t, "product_category", "total_value").unwrap();
        let categories = analysis.node.get("categories").unwrap().as_leaf().unwrap();
        let subcategories = analysis
            .node
            .get("subcategories")
            .unwrap()
            .as_leaf()
            .unwrap();
        assert_eq!(categories.n_rows(), 3);
        assert_eq!(subcategories.n_rows(), 4);
        assert_eq!(
            subcategories.value("product_subcategory", 0),
            Some(&Value::Str("Puzzles".into()))
        );
        assert!(analysis.warnings.is_empty());
    }

    #[test]
    fn by_category_fn_degrades_to_primary_when_subcategories_unusable() {
        let mut t = category_table();
        t.set_column(Column::new(
            "product_subcategory",
            vec![Value::Null, Value::Null, Value::Null, Value::Null],
        ));
        let analysis = by_category(&t, "product_category", "total_value").unwrap();
        assert!(analysis.node.as_leaf().is_some());
        assert_eq!(analysis.warnings.len(), 1);
        assert_eq!(analysis.warnings[0].scope, "by_category");
    }

    #[test]
    fn by_region_fn_auto_detects_state_column() {
        let mut t = Table::new();
        t.set_column(str_col("state", &["SP", "RJ", "SP"]));
        t.set_column(float_col("total_value", &[10.0, 5.0, 20.0]));
        let analysis = by_region(&t, None, "total_value").unwrap();
        let leaf = analysis.node.as_leaf().unwrap();
        assert_eq!(leaf.value("state", 0), Some(&Value::Str("SP".into())));
        assert_eq!(leaf.value("total_value", 0), Some(&Value::Float(30.0)));
        assert_eq!(leaf.value("pct_of_total", 0), Some(&Value::Float(85.71)));
    }

    #[test]
    fn by_region_fn_fails_when_no_candidate_column_exists() {
        let mut t = Table::new();
        t.set_column(float_col("total_value", &[1.0]));
        assert!(matches!(
            by_region(&t, None, "total_value"),
            Err(Error::ColumnNotFound(_))
        ));
    }

    #[test]
    fn by_region_fn_attaches_macro_region_from_state_pairs() {
        let mut t = Table::new();
        t.set_column(str_col("state", &["SP", "BA", "SP"]));
        t.set_column(str_col("region", &["Southeast", "Northeast", "Southeast"]));
        t.set_column(float_col("total_value", &[10.0, 5.0, 20.0]));
        let analysis = by_region(&t, Some("state"), "total_value").unwrap();
        let leaf = analysis.node.as_leaf().unwrap();
        assert_eq!(
            leaf.value("macro_region", 0),
            Some(&Value::Str("Southeast".into()))
        );
        assert_eq!(
            leaf.value("macro_region", 1),
            Some(&Value::Str("Northeast".into()))
        );
    }

    #[test]
    fn by_region_fn_warns_when_macro_region_pairs_unusable() {
        let mut t = Table::new();
        t.set_column(str_col("state", &["SP"]));
        t.set_column(Column::new("region", vec![Value::Null]));
        t.set_column(float_col("total_value", &[10.0]));
        let analysis = by_region(&t, Some("state"), "total_value").unwrap();
        assert_eq!(analysis.warnings.len(), 1);
        assert!(!analysis.node.as_leaf().unwrap().has_column("macro_region"));
    }

    #[test]
    fn leaves_fn_joins_nested_names_with_underscores() {
        let inner = ResultNode::Group(BTreeMap::from([
            ("categories".to_string(), ResultNode::Leaf(category_table())),
            (
                "subcategories".to_string(),
                ResultNode::Leaf(category_table()),
            ),
        ]));
        let node = ResultNode::Group(BTreeMap::from([("category".to_string(), inner)]));
        let names: Vec<String> = node.leaves().into_iter().map(|(name, _)| name).collect();
        assert_eq!(
            names,
            vec!["category_categories", "category_subcategories"]
        );
    }
}
