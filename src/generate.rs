use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::calendar::DateRange;
use crate::config::Config;
use crate::error::Result;
use crate::money::Money;
use crate::table::{Column, Table, Value};

const CATEGORIES: [&str; 10] = [
    "Electronics",
    "Clothing",
    "Books",
    "Home & Garden",
    "Sports",
    "Beauty",
    "Toys",
    "Groceries",
    "Health",
    "Tools",
];

const PAYMENT_METHODS: [&str; 7] = [
    "Credit Card",
    "Debit Card",
    "Bank Transfer",
    "Pix",
    "PayPal",
    "Apple Pay",
    "Google Pay",
];

const STATES: [&str; 20] = [
    "SP", "RJ", "MG", "RS", "PR", "SC", "BA", "PE", "CE", "GO", "DF", "PA", "AM", "MA", "ES",
    "PB", "RN", "MT", "MS", "AL",
];

/// Order status distribution. The weights are a policy choice and must be
/// kept as-is for output parity with downstream consumers.
const ORDER_STATUSES: [(&str, u32); 4] = [
    ("Delivered", 70),
    ("Processing", 10),
    ("Shipped", 15),
    ("Cancelled", 5),
];

/// Customer segment distribution; weights are policy, same as above.
const SEGMENTS: [(&str, u32); 3] = [("Regular", 70), ("Premium", 20), ("VIP", 10)];

const FIRST_NAMES: [&str; 19] = [
    "John", "Mary", "Peter", "Anna", "Carl", "Fern", "Joseph", "Marian", "Paul", "Julia",
    "Lucas", "Amanda", "Richard", "Patricia", "Michael", "Camila", "Fernando", "Louise",
    "Gabriel",
];

const LAST_NAMES: [&str; 13] = [
    "Silva", "Santos", "Oliveira", "Souza", "Rodrigues", "Ferreira", "Alves", "Pereira",
    "Lima", "Gomes", "Costa", "Ribeiro", "Martins",
];

/// Maps a state code to its macro-region.
#[must_use]
pub fn region_of(state: &str) -> &'static str {
    match state {
        "AC" | "AM" | "AP" | "PA" | "RO" | "RR" | "TO" => "North",
        "AL" | "BA" | "CE" | "MA" | "PB" | "PE" | "PI" | "RN" | "SE" => "Northeast",
        "DF" | "GO" | "MS" | "MT" => "Central-West",
        "ES" | "MG" | "RJ" | "SP" => "Southeast",
        "PR" | "RS" | "SC" => "South",
        _ => "Unknown",
    }
}

/// One synthetic sales transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesRecord {
    pub transaction_id: String,
    #[serde(with = "timestamp_format")]
    pub date: NaiveDateTime,
    pub customer_id: String,
    pub product_id: String,
    pub product_category: String,
    pub price: Money,
    pub quantity: u32,
    pub total_value: Money,
    pub payment_method: String,
    pub shipping_cost: Money,
    pub state: String,
    pub region: String,
    pub order_status: String,
}

/// One synthetic customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerRecord {
    pub customer_id: String,
    pub name: String,
    pub email: String,
    pub age: u32,
    pub gender: String,
    pub state: String,
    pub region: String,
    pub segment: String,
    #[serde(with = "date_format")]
    pub registration_date: NaiveDate,
}

mod timestamp_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S: Serializer>(
        ts: &NaiveDateTime,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ts.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<NaiveDateTime, D::Error> {
        let s = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&s, FORMAT).map_err(serde::de::Error::custom)
    }
}

mod date_format {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d";

    pub fn serialize<S: Serializer>(d: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&d.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<NaiveDate, D::Error> {
        let s = String::deserialize(deserializer)?;
        NaiveDate::parse_from_str(&s, FORMAT).map_err(serde::de::Error::custom)
    }
}

/// Produces synthetic sales and customer records with plausible attribute
/// distributions.
///
/// Use [`Generator::with_seed`] when reproducibility matters (tests, demo
/// datasets); [`Generator::new`] seeds from entropy.
#[derive(Debug)]
pub struct Generator {
    rng: StdRng,
}

impl Generator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Generates exactly `count` sales records dated within `range`
    /// (inclusive). A non-positive `count` falls back to the configured
    /// default rather than failing.
    pub fn sales(&mut self, count: i64, range: &DateRange, config: &Config) -> Vec<SalesRecord> {
        let count = if count <= 0 {
            warn!(
                requested = count,
                substituted = config.default_sales_rows,
                "non-positive record count, using default"
            );
            config.default_sales_rows
        } else {
            count as usize
        };
        info!(count, start = %range.start, end = %range.end, "generating sales records");

        let span_days = range.num_days();
        let mut records = Vec::with_capacity(count);
        for _ in 0..count {
            let date = range.start + Duration::days(self.rng.gen_range(0..=span_days));
            let time = NaiveTime::from_hms_opt(
                self.rng.gen_range(8..=23),
                self.rng.gen_range(0..=59),
                self.rng.gen_range(0..=59),
            )
            .unwrap_or(NaiveTime::MIN);
            let price = Money::from_f64(self.rng.gen_range(10.0..=500.0));
            let quantity: u32 = self.rng.gen_range(1..=5);
            let state = self.pick(&STATES);

            records.push(SalesRecord {
                transaction_id: format!("TRX-{}", self.rng.gen_range(100_000..=999_999)),
                date: NaiveDateTime::new(date, time),
                customer_id: format!("CUST-{}", self.rng.gen_range(1000..=9999)),
                product_id: format!("PROD-{}", self.rng.gen_range(10_000..=99_999)),
                product_category: self.pick(&CATEGORIES).to_string(),
                price,
                quantity,
                total_value: price * i64::from(quantity),
                payment_method: self.pick(&PAYMENT_METHODS).to_string(),
                shipping_cost: Money::from_f64(self.rng.gen_range(5.0..=30.0)),
                state: state.to_string(),
                region: region_of(state).to_string(),
                order_status: self.pick_weighted(&ORDER_STATUSES).to_string(),
            });
        }
        records
    }

    /// Generates exactly `count` customer records; a non-positive `count`
    /// falls back to the configured default.
    pub fn customers(&mut self, count: i64, config: &Config) -> Vec<CustomerRecord> {
        let count = if count <= 0 {
            warn!(
                requested = count,
                substituted = config.default_customer_rows,
                "non-positive customer count, using default"
            );
            config.default_customer_rows
        } else {
            count as usize
        };
        info!(count, "generating customer records");

        let today = Local::now().date_naive();
        let mut records = Vec::with_capacity(count);
        for i in 1..=count {
            let first = self.pick(&FIRST_NAMES);
            let last = self.pick(&LAST_NAMES);
            let state = self.pick(&STATES);
            records.push(CustomerRecord {
                customer_id: format!("CUST-{i:04}"),
                name: format!("{first} {last}"),
                email: format!(
                    "{}.{}{}@example.com",
                    first.to_lowercase(),
                    last.to_lowercase(),
                    self.rng.gen_range(1..=999)
                ),
                age: self.rng.gen_range(18..=80),
                gender: self.pick(&["M", "F"]).to_string(),
                state: state.to_string(),
                region: region_of(state).to_string(),
                segment: self.pick_weighted(&SEGMENTS).to_string(),
                registration_date: today - Duration::days(self.rng.gen_range(30..=5 * 365)),
            });
        }
        records
    }

    fn pick<'a>(&mut self, items: &[&'a str]) -> &'a str {
        items[self.rng.gen_range(0..items.len())]
    }

    fn pick_weighted<'a>(&mut self, choices: &[(&'a str, u32)]) -> &'a str {
        let total: u32 = choices.iter().map(|(_, w)| w).sum();
        let mut roll = self.rng.gen_range(0..total);
        for (value, weight) in choices {
            if roll < *weight {
                return value;
            }
            roll -= weight;
        }
        choices[0].0
    }
}

impl Default for Generator {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds an in-memory table from generated sales records, typed the same
/// way the loader would type them after normalization.
#[must_use]
pub fn sales_to_table(records: &[SalesRecord]) -> Table {
    let mut table = Table::new();
    let col =
        |name: &str, f: &dyn Fn(&SalesRecord) -> Value| Column::new(name, records.iter().map(f).collect());
    table.set_column(col("transaction_id", &|r| Value::Str(r.transaction_id.clone())));
    table.set_column(col("date", &|r| Value::Timestamp(r.date)));
    table.set_column(col("customer_id", &|r| Value::Str(r.customer_id.clone())));
    table.set_column(col("product_id", &|r| Value::Str(r.product_id.clone())));
    table.set_column(col("product_category", &|r| {
        Value::Str(r.product_category.clone())
    }));
    table.set_column(col("price", &|r| Value::Float(r.price.as_f64())));
    table.set_column(col("quantity", &|r| Value::Int(i64::from(r.quantity))));
    table.set_column(col("total_value", &|r| Value::Float(r.total_value.as_f64())));
    table.set_column(col("payment_method", &|r| {
        Value::Str(r.payment_method.clone())
    }));
    table.set_column(col("shipping_cost", &|r| {
        Value::Float(r.shipping_cost.as_f64())
    }));
    table.set_column(col("state", &|r| Value::Str(r.state.clone())));
    table.set_column(col("region", &|r| Value::Str(r.region.clone())));
    table.set_column(col("order_status", &|r| Value::Str(r.order_status.clone())));
    table
}

/// Writes sales records as a timestamped CSV under `dir` and returns the
/// path.
pub fn write_sales_csv(records: &[SalesRecord], dir: &Path) -> Result<PathBuf> {
    write_records(records, dir, "ecommerce_sales_synthetic")
}

/// Writes customer records as a timestamped CSV under `dir` and returns
/// the path.
pub fn write_customers_csv(records: &[CustomerRecord], dir: &Path) -> Result<PathBuf> {
    write_records(records, dir, "ecommerce_customers")
}

fn write_records<T: Serialize>(records: &[T], dir: &Path, stem: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("{stem}_{timestamp}.csv"));
    let mut wtr = csv::Writer::from_path(&path)?;
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    info!(?path, count = records.len(), "dataset written");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_range() -> DateRange {
        DateRange::parse(Some("2025-01-01"), Some("2025-06-30")).unwrap()
    }

    #[test]
    fn sales_fn_generates_requested_count() {
        let mut gen = Generator::with_seed(1);
        let records = gen.sales(250, &fixed_range(), &Config::default());
        assert_eq!(records.len(), 250);
    }

    #[test]
    fn sales_fn_substitutes_default_for_non_positive_count() {
        let mut gen = Generator::with_seed(1);
        let config = Config::default();
        let records = gen.sales(0, &fixed_range(), &config);
        assert_eq!(records.len(), config.default_sales_rows);
        let records = gen.sales(-7, &fixed_range(), &config);
        assert_eq!(records.len(), config.default_sales_rows);
    }

    #[test]
    fn sales_fn_totals_equal_price_times_quantity() {
        let mut gen = Generator::with_seed(42);
        for record in gen.sales(500, &fixed_range(), &Config::default()) {
            assert_eq!(
                record.total_value.cents(),
                record.price.cents() * i64::from(record.quantity),
                "total mismatch for {}",
                record.transaction_id
            );
            assert!((1..=5).contains(&record.quantity));
        }
    }

    #[test]
    fn sales_fn_dates_stay_inside_range() {
        let range = fixed_range();
        let mut gen = Generator::with_seed(7);
        for record in gen.sales(300, &range, &Config::default()) {
            let date = record.date.date();
            assert!(date >= range.start && date <= range.end);
            assert!((8..=23).contains(&chrono::Timelike::hour(&record.date)));
        }
    }

    #[test]
    fn sales_fn_draws_statuses_from_fixed_vocabulary() {
        let mut gen = Generator::with_seed(3);
        let statuses: Vec<&str> = ORDER_STATUSES.iter().map(|(s, _)| *s).collect();
        for record in gen.sales(200, &fixed_range(), &Config::default()) {
            assert!(statuses.contains(&record.order_status.as_str()));
            assert_eq!(record.region, region_of(&record.state));
        }
    }

    #[test]
    fn sales_fn_is_reproducible_for_a_fixed_seed() {
        let a = Generator::with_seed(99).sales(50, &fixed_range(), &Config::default());
        let b = Generator::with_seed(99).sales(50, &fixed_range(), &Config::default());
        let ids_a: Vec<_> = a.iter().map(|r| r.transaction_id.clone()).collect();
        let ids_b: Vec<_> = b.iter().map(|r| r.transaction_id.clone()).collect();
        assert_eq!(ids_a, ids_b);
    }

    #[test]
    fn customers_fn_generates_sequential_ids_and_valid_segments() {
        let mut gen = Generator::with_seed(5);
        let records = gen.customers(10, &Config::default());
        assert_eq!(records.len(), 10);
        assert_eq!(records[0].customer_id, "CUST-0001");
        assert_eq!(records[9].customer_id, "CUST-0010");
        for record in &records {
            assert!(["Regular", "Premium", "VIP"].contains(&record.segment.as_str()));
            assert!((18..=80).contains(&record.age));
            assert!(record.email.ends_with("@example.com"));
        }
    }

    #[test]
    fn region_of_fn_covers_every_generator_state() {
        for state in STATES {
            assert_ne!(region_of(state), "Unknown", "unmapped state {state}");
        }
        assert_eq!(region_of("XX"), "Unknown");
    }

    #[test]
    fn sales_to_table_fn_builds_one_column_per_field() {
        let mut gen = Generator::with_seed(11);
        let records = gen.sales(20, &fixed_range(), &Config::default());
        let table = sales_to_table(&records);
        assert_eq!(table.n_rows(), 20);
        assert_eq!(table.n_cols(), 13);
        assert!(table.has_column("total_value"));
        assert!(table.has_column("order_status"));
    }

    #[test]
    fn write_sales_csv_fn_round_trips_through_serde() {
        let dir = tempfile::tempdir().unwrap();
        let mut gen = Generator::with_seed(8);
        let records = gen.sales(25, &fixed_range(), &Config::default());
        let path = write_sales_csv(&records, dir.path()).unwrap();
        let mut rdr = csv::Reader::from_path(&path).unwrap();
        let back: Vec<SalesRecord> = rdr.deserialize().map(|r| r.unwrap()).collect();
        assert_eq!(back.len(), records.len());
        assert_eq!(back[0].transaction_id, records[0].transaction_id);
        assert_eq!(back[0].total_value, records[0].total_value);
        assert_eq!(back[0].date, records[0].date);
    }
}
