use std::env;
use std::path::PathBuf;

/// Multiplicative bound used to decide whether a stored `total_value`
/// column looks implausible relative to `price * quantity`. Policy
/// constant, preserved for output compatibility.
pub const ANOMALY_THRESHOLD: f64 = 2.0;

/// Maximum calendar span in days; longer ranges are truncated.
pub const MAX_CALENDAR_DAYS: i64 = 3650;

/// Runtime configuration, passed by reference into each component.
///
/// There is no ambient global state: construct one [`Config`] (usually via
/// [`Config::from_env`]) and hand it to whatever needs it.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory where exported artifacts are written.
    pub export_dir: PathBuf,
    /// Directory where generated raw datasets are written.
    pub data_dir: PathBuf,
    /// Anomaly factor for total-value reconciliation.
    pub anomaly_threshold: f64,
    /// Substitute row count when a non-positive sales count is requested.
    pub default_sales_rows: usize,
    /// Substitute row count when a non-positive customer count is requested.
    pub default_customer_rows: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            export_dir: PathBuf::from("exports"),
            data_dir: PathBuf::from("data/raw"),
            anomaly_threshold: ANOMALY_THRESHOLD,
            default_sales_rows: 1000,
            default_customer_rows: 500,
        }
    }
}

impl Config {
    /// Builds a configuration from the environment, falling back to
    /// defaults. `SALESCOPE_EXPORT_DIR` and `SALESCOPE_DATA_DIR` override
    /// the output directories.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(dir) = env::var("SALESCOPE_EXPORT_DIR") {
            config.export_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = env::var("SALESCOPE_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        config
    }
}
