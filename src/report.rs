use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::Local;

use crate::analysis::{Analysis, ResultNode};
use crate::money::Money;
use crate::table::{Table, Value};

/// Builds a narrative Markdown summary of a dataset and its analyses.
///
/// `analyses` is keyed by analysis name (`"period"`, `"category"`,
/// `"region"`); missing entries simply drop their section, so a partial
/// run still produces a coherent report.
#[must_use]
pub fn markdown_report(
    title: &str,
    table: &Table,
    analyses: &BTreeMap<String, Analysis>,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {title}\n");
    let _ = writeln!(
        out,
        "Generated: {}\n",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    );

    overview_section(&mut out, table);
    if let Some(leaf) = category_leaf(analyses) {
        ranking_section(&mut out, "Top categories", leaf, 5);
    }
    if let Some(leaf) = region_leaf(analyses) {
        ranking_section(&mut out, "Top regions", leaf, 5);
    }
    if let Some(leaf) = period_leaf(analyses, "by_month") {
        monthly_section(&mut out, leaf);
    }
    if let Some(leaf) = period_leaf(analyses, "by_weekday") {
        weekday_section(&mut out, leaf);
    }

    let warnings: Vec<String> = analyses
        .values()
        .flat_map(|a| a.warnings.iter().map(ToString::to_string))
        .collect();
    if !warnings.is_empty() {
        let _ = writeln!(out, "## Warnings\n");
        for warning in warnings {
            let _ = writeln!(out, "- {warning}");
        }
        let _ = writeln!(out);
    }
    out
}

fn overview_section(out: &mut String, table: &Table) {
    let revenue = table
        .column("total_value")
        .map(|c| Money::from_f64(c.sum_f64()));
    let rows = table.n_rows();
    let _ = writeln!(out, "## Overview\n");
    let _ = writeln!(out, "- Transactions: {rows}");
    let _ = writeln!(out, "- Columns: {}", table.n_cols());
    if let Some(revenue) = revenue {
        let _ = writeln!(out, "- Total revenue: {revenue}");
        if rows > 0 {
            let _ = writeln!(
                out,
                "- Average ticket: {}",
                Money::from_cents(revenue.cents() / rows as i64)
            );
        }
    }
    let _ = writeln!(out);
}

fn ranking_section(out: &mut String, heading: &str, leaf: &Table, limit: usize) {
    let Some(names) = leaf.columns().first() else {
        return;
    };
    let _ = writeln!(out, "## {heading}\n");
    let _ = writeln!(out, "| {} | Revenue | Share |", capitalized(names.name()));
    let _ = writeln!(out, "| --- | ---: | ---: |");
    for row in 0..leaf.n_rows().min(limit) {
        let name = names.values()[row].render();
        let revenue = cell_f64(leaf, "total_value", row)
            .map_or_else(String::new, |x| Money::from_f64(x).to_string());
        let share = cell_f64(leaf, "pct_of_total", row)
            .map_or_else(String::new, |x| format!("{x:.2}%"));
        let _ = writeln!(out, "| {name} | {revenue} | {share} |");
    }
    let _ = writeln!(out);
}

fn monthly_section(out: &mut String, leaf: &Table) {
    let _ = writeln!(out, "## Monthly revenue\n");
    let _ = writeln!(out, "| Month | Revenue | Transactions |");
    let _ = writeln!(out, "| --- | ---: | ---: |");
    for row in 0..leaf.n_rows() {
        let month = leaf
            .value("month_label", row)
            .map_or_else(String::new, Value::render);
        let revenue = cell_f64(leaf, "total_value", row)
            .map_or_else(String::new, |x| Money::from_f64(x).to_string());
        let transactions = leaf
            .value("transactions", row)
            .map_or_else(String::new, Value::render);
        let _ = writeln!(out, "| {month} | {revenue} | {transactions} |");
    }
    let _ = writeln!(out);
}

fn weekday_section(out: &mut String, leaf: &Table) {
    let busiest = (0..leaf.n_rows())
        .filter_map(|row| {
            Some((
                leaf.value("weekday_name", row)?.render(),
                cell_f64(leaf, "total_value", row)?,
            ))
        })
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
    if let Some((name, revenue)) = busiest {
        let _ = writeln!(out, "## Peak weekday\n");
        let _ = writeln!(
            out,
            "{name} is the strongest day, with {} in total sales.\n",
            Money::from_f64(revenue)
        );
    }
}

fn category_leaf(analyses: &BTreeMap<String, Analysis>) -> Option<&Table> {
    let node = &analyses.get("category")?.node;
    node.as_leaf()
        .or_else(|| node.get("categories").and_then(ResultNode::as_leaf))
}

fn region_leaf(analyses: &BTreeMap<String, Analysis>) -> Option<&Table> {
    analyses.get("region")?.node.as_leaf()
}

fn period_leaf<'a>(analyses: &'a BTreeMap<String, Analysis>, key: &str) -> Option<&'a Table> {
    analyses
        .get("period")?
        .node
        .get(key)
        .and_then(ResultNode::as_leaf)
}

fn cell_f64(table: &Table, column: &str, row: usize) -> Option<f64> {
    table.value(column, row).and_then(Value::as_f64)
}

fn capitalized(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
