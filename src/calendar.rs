use chrono::{Datelike, Duration, Local, NaiveDate};
use tracing::{info, warn};

use crate::config::MAX_CALENDAR_DAYS;
use crate::error::{Error, Result};
use crate::table::{Column, Table, Value};

pub(crate) const WEEKDAY_NAMES: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Parses a `YYYY-MM-DD` date string; anything else is a hard error.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| Error::InvalidDate(s.to_string()))
}

/// An inclusive date range. An inverted range is swapped, not rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    #[must_use]
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        if end < start {
            warn!(%start, %end, "end date precedes start date, swapping");
            Self {
                start: end,
                end: start,
            }
        } else {
            Self { start, end }
        }
    }

    /// Resolves optional `YYYY-MM-DD` boundaries; the default range is the
    /// trailing 365 days ending today.
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self> {
        let today = Local::now().date_naive();
        let end = match end {
            Some(s) => parse_date(s)?,
            None => today,
        };
        let start = match start {
            Some(s) => parse_date(s)?,
            None => today - Duration::days(365),
        };
        Ok(Self::new(start, end))
    }

    /// Number of days between the boundaries (0 for a single-day range).
    #[must_use]
    pub fn num_days(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

/// Builds a calendar dimension table with one row per day in `range`,
/// truncated to [`MAX_CALENDAR_DAYS`] days after the start.
#[must_use]
pub fn calendar_table(range: DateRange) -> Table {
    let mut range = range;
    if range.num_days() > MAX_CALENDAR_DAYS {
        warn!(
            days = range.num_days(),
            cap = MAX_CALENDAR_DAYS,
            "date span too large, truncating calendar"
        );
        range.end = range.start + Duration::days(MAX_CALENDAR_DAYS);
    }

    let n = (range.num_days() + 1) as usize;
    let mut dates = Vec::with_capacity(n);
    let mut years = Vec::with_capacity(n);
    let mut months = Vec::with_capacity(n);
    let mut days = Vec::with_capacity(n);
    let mut weekdays = Vec::with_capacity(n);
    let mut weekday_names = Vec::with_capacity(n);
    let mut month_names = Vec::with_capacity(n);
    let mut quarters = Vec::with_capacity(n);
    let mut halves = Vec::with_capacity(n);
    let mut days_of_year = Vec::with_capacity(n);
    let mut weeks_of_year = Vec::with_capacity(n);
    let mut date_keys = Vec::with_capacity(n);
    let mut year_months = Vec::with_capacity(n);
    let mut year_quarters = Vec::with_capacity(n);
    let mut weekends = Vec::with_capacity(n);
    let mut business_days = Vec::with_capacity(n);

    let mut date = range.start;
    while date <= range.end {
        let weekday = date.weekday().num_days_from_monday();
        let quarter = (date.month() - 1) / 3 + 1;
        dates.push(Value::Date(date));
        years.push(Value::Int(i64::from(date.year())));
        months.push(Value::Int(i64::from(date.month())));
        days.push(Value::Int(i64::from(date.day())));
        weekdays.push(Value::Int(i64::from(weekday)));
        weekday_names.push(Value::Str(WEEKDAY_NAMES[weekday as usize].to_string()));
        month_names.push(Value::Str(
            MONTH_NAMES[(date.month() - 1) as usize].to_string(),
        ));
        quarters.push(Value::Int(i64::from(quarter)));
        halves.push(Value::Int(if date.month() <= 6 { 1 } else { 2 }));
        days_of_year.push(Value::Int(i64::from(date.ordinal())));
        // Monday-started week-of-year; days before the year's first Monday
        // fall in week 0.
        weeks_of_year.push(Value::Int(i64::from((date.ordinal0() + 7 - weekday) / 7)));
        date_keys.push(Value::Str(date.format("%Y-%m-%d").to_string()));
        year_months.push(Value::Str(date.format("%Y-%m").to_string()));
        year_quarters.push(Value::Str(format!("{}-Q{quarter}", date.year())));
        weekends.push(Value::Bool(weekday >= 5));
        business_days.push(Value::Bool(weekday < 5));
        date += Duration::days(1);
    }

    let mut table = Table::new();
    table.set_column(Column::new("date", dates));
    table.set_column(Column::new("year", years));
    table.set_column(Column::new("month", months));
    table.set_column(Column::new("day", days));
    table.set_column(Column::new("weekday", weekdays));
    table.set_column(Column::new("weekday_name", weekday_names));
    table.set_column(Column::new("month_name", month_names));
    table.set_column(Column::new("quarter", quarters));
    table.set_column(Column::new("half_year", halves));
    table.set_column(Column::new("day_of_year", days_of_year));
    table.set_column(Column::new("week_of_year", weeks_of_year));
    table.set_column(Column::new("date_key", date_keys));
    table.set_column(Column::new("year_month", year_months));
    table.set_column(Column::new("year_quarter", year_quarters));
    table.set_column(Column::new("is_weekend", weekends));
    table.set_column(Column::new("is_business_day", business_days));
    info!(rows = table.n_rows(), "calendar table built");
    table
}

/// Builds a calendar table from `YYYY-MM-DD` boundary strings.
///
/// # Errors
///
/// Returns [`Error::InvalidDate`] when either boundary is malformed.
pub fn build_calendar(start: &str, end: &str) -> Result<Table> {
    let range = DateRange::new(parse_date(start)?, parse_date(end)?);
    Ok(calendar_table(range))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_calendar_fn_produces_one_row_per_day() {
        let table = build_calendar("2025-01-01", "2025-01-31").unwrap();
        assert_eq!(table.n_rows(), 31);
    }

    #[test]
    fn build_calendar_fn_truncates_spans_over_the_cap() {
        let table = build_calendar("2010-01-01", "2030-01-01").unwrap();
        assert_eq!(table.n_rows(), MAX_CALENDAR_DAYS as usize + 1);
    }

    #[test]
    fn build_calendar_fn_swaps_inverted_ranges() {
        let table = build_calendar("2025-01-31", "2025-01-01").unwrap();
        assert_eq!(table.n_rows(), 31);
        assert_eq!(table.value("date_key", 0), Some(&Value::Str("2025-01-01".into())));
    }

    #[test]
    fn build_calendar_fn_rejects_malformed_dates() {
        assert!(matches!(
            build_calendar("2025-13-40", "2025-01-01"),
            Err(Error::InvalidDate(_))
        ));
        assert!(matches!(
            build_calendar("01/02/2025", "2025-01-01"),
            Err(Error::InvalidDate(_))
        ));
    }

    #[test]
    fn calendar_fields_are_correct_for_a_known_sunday() {
        // 2025-03-09 is a Sunday in the first quarter.
        let table = build_calendar("2025-03-09", "2025-03-09").unwrap();
        assert_eq!(table.value("weekday", 0), Some(&Value::Int(6)));
        assert_eq!(
            table.value("weekday_name", 0),
            Some(&Value::Str("Sunday".into()))
        );
        assert_eq!(table.value("month_name", 0), Some(&Value::Str("March".into())));
        assert_eq!(table.value("quarter", 0), Some(&Value::Int(1)));
        assert_eq!(table.value("half_year", 0), Some(&Value::Int(1)));
        assert_eq!(table.value("day_of_year", 0), Some(&Value::Int(68)));
        assert_eq!(table.value("week_of_year", 0), Some(&Value::Int(9)));
        assert_eq!(
            table.value("year_month", 0),
            Some(&Value::Str("2025-03".into()))
        );
        assert_eq!(
            table.value("year_quarter", 0),
            Some(&Value::Str("2025-Q1".into()))
        );
        assert_eq!(table.value("is_weekend", 0), Some(&Value::Bool(true)));
        assert_eq!(table.value("is_business_day", 0), Some(&Value::Bool(false)));
    }

    #[test]
    fn date_range_parse_fn_defaults_to_trailing_year() {
        let range = DateRange::parse(None, None).unwrap();
        assert_eq!(range.num_days(), 365);
    }
}
