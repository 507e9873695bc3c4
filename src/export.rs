use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{debug, info};

use crate::analysis::ResultNode;
use crate::config::Config;
use crate::error::Result;
use crate::io;
use crate::table::Table;

/// Writes analysis results as timestamped artifacts under one directory.
///
/// Filenames follow `{logical_name}_{YYYYMMDD_HHMMSS}.{ext}`; nested
/// result keys are joined into the logical name with underscores. The
/// timestamp is taken once per export call, so artifacts from one run
/// share it and repeated runs cannot collide.
#[derive(Debug)]
pub struct Exporter {
    export_dir: PathBuf,
}

impl Exporter {
    /// Creates the export directory if needed.
    pub fn new(export_dir: impl Into<PathBuf>) -> Result<Self> {
        let export_dir = export_dir.into();
        fs::create_dir_all(&export_dir)?;
        Ok(Self { export_dir })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.export_dir.clone())
    }

    #[must_use]
    pub fn export_dir(&self) -> &Path {
        &self.export_dir
    }

    /// Writes every non-empty leaf of `node` as its own CSV file and
    /// returns the `(logical name, path)` pairs produced. An empty result
    /// tree produces an empty list, not an error.
    pub fn export(&self, name: &str, node: &ResultNode) -> Result<Vec<(String, PathBuf)>> {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let mut produced = Vec::new();
        for (path_name, table) in node.leaves() {
            let logical = if path_name.is_empty() {
                name.to_string()
            } else {
                format!("{name}_{path_name}")
            };
            if table.is_empty() {
                debug!(%logical, "skipping empty leaf");
                continue;
            }
            let path = self
                .export_dir
                .join(format!("{logical}_{timestamp}.csv"));
            io::write_table(table, &path)?;
            info!(%logical, ?path, rows = table.n_rows(), "leaf exported");
            produced.push((logical, path));
        }
        Ok(produced)
    }

    /// Writes a single table as a timestamped CSV and returns the path.
    pub fn write_table(&self, table: &Table, name: &str) -> Result<PathBuf> {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let path = self.export_dir.join(format!("{name}_{timestamp}.csv"));
        io::write_table(table, &path)?;
        info!(name, ?path, rows = table.n_rows(), "table exported");
        Ok(path)
    }

    /// Writes a text artifact (Markdown report, JSON summary) with the
    /// same timestamped naming scheme.
    pub fn write_text(&self, name: &str, ext: &str, content: &str) -> Result<PathBuf> {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let path = self.export_dir.join(format!("{name}_{timestamp}.{ext}"));
        fs::write(&path, content)?;
        info!(name, ?path, "artifact written");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{Column, Value};
    use std::collections::BTreeMap;

    fn leaf(rows: usize) -> ResultNode {
        let mut table = Table::new();
        table.set_column(Column::new(
            "n",
            (0..rows).map(|i| Value::Int(i as i64)).collect(),
        ));
        ResultNode::Leaf(table)
    }

    #[test]
    fn export_fn_writes_one_file_per_leaf_with_joined_names() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = Exporter::new(dir.path()).unwrap();
        let node = ResultNode::Group(BTreeMap::from([
            ("categories".to_string(), leaf(2)),
            ("subcategories".to_string(), leaf(3)),
        ]));
        let produced = exporter.export("sales_by_category", &node).unwrap();
        assert_eq!(produced.len(), 2);
        assert_eq!(produced[0].0, "sales_by_category_categories");
        assert_eq!(produced[1].0, "sales_by_category_subcategories");
        for (_, path) in &produced {
            assert!(path.exists());
            let stem = path.file_name().unwrap().to_str().unwrap();
            assert!(stem.ends_with(".csv"));
        }
    }

    #[test]
    fn export_fn_uses_the_bare_name_for_a_root_leaf() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = Exporter::new(dir.path()).unwrap();
        let produced = exporter.export("sales_by_region", &leaf(1)).unwrap();
        assert_eq!(produced.len(), 1);
        assert_eq!(produced[0].0, "sales_by_region");
    }

    #[test]
    fn export_fn_skips_empty_leaves_and_empty_groups() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = Exporter::new(dir.path()).unwrap();

        let node = ResultNode::Group(BTreeMap::from([
            ("full".to_string(), leaf(2)),
            ("hollow".to_string(), leaf(0)),
        ]));
        let produced = exporter.export("sales", &node).unwrap();
        assert_eq!(produced.len(), 1);
        assert_eq!(produced[0].0, "sales_full");

        let empty = ResultNode::Group(BTreeMap::new());
        assert!(exporter.export("sales", &empty).unwrap().is_empty());
    }

    #[test]
    fn exported_leaves_parse_back_with_matching_row_counts() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = Exporter::new(dir.path()).unwrap();
        let produced = exporter.export("roundtrip", &leaf(5)).unwrap();
        let back = crate::io::read_table(&produced[0].1).unwrap();
        assert_eq!(back.n_rows(), 5);
    }
}
