use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BooleanArray, Date32Array, Float64Array, Int64Array, StringArray,
    TimestampMicrosecondArray,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::ipc::reader::FileReader;
use arrow::ipc::writer::FileWriter;
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Duration, NaiveDate};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::table::{Column, ColumnType, Table, Value};

/// Supported file formats, dispatched on extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Json,
    Arrow,
}

impl FileFormat {
    /// Determines the format from a path's extension.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedFormat`] for unrecognized extensions.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("csv") => Ok(Self::Csv),
            Some("json") => Ok(Self::Json),
            Some("arrow") => Ok(Self::Arrow),
            _ => Err(Error::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

/// Reads a table from `path`, dispatching on the file extension.
///
/// # Errors
///
/// Returns [`Error::NotFound`] if the path does not exist, and
/// [`Error::UnsupportedFormat`] if the extension is unrecognized.
pub fn read_table(path: impl AsRef<Path>) -> Result<Table> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::NotFound(path.to_path_buf()));
    }
    let format = FileFormat::from_path(path)?;
    debug!(?path, ?format, "reading table");
    let table = match format {
        FileFormat::Csv => read_csv(path),
        FileFormat::Json => read_json(path),
        FileFormat::Arrow => read_arrow(path),
    }?;
    info!(
        ?path,
        rows = table.n_rows(),
        cols = table.n_cols(),
        "table loaded"
    );
    Ok(table)
}

/// Writes `table` to `path`, dispatching on the file extension.
pub fn write_table(table: &Table, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    match FileFormat::from_path(path)? {
        FileFormat::Csv => write_csv(table, path),
        FileFormat::Json => write_json(table, path),
        FileFormat::Arrow => write_arrow(table, path),
    }
}

fn read_csv(path: &Path) -> Result<Table> {
    let mut rdr = csv::Reader::from_path(path)?;
    let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
    let mut cells: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
    for record in rdr.records() {
        let record = record?;
        for (i, cell) in cells.iter_mut().enumerate() {
            cell.push(record.get(i).unwrap_or("").to_string());
        }
    }
    let mut table = Table::new();
    for (name, raw) in headers.into_iter().zip(cells) {
        table.set_column(Column::new(name, infer_cells(&raw)));
    }
    Ok(table)
}

/// Turns raw text cells into typed values. A column is `Int` when every
/// non-empty cell parses as an integer, then `Float`, then `Bool`;
/// otherwise it stays text. Empty cells are null.
fn infer_cells(raw: &[String]) -> Vec<Value> {
    let non_empty: Vec<&str> = raw.iter().filter(|s| !s.is_empty()).map(String::as_str).collect();
    let all = |pred: fn(&str) -> bool| !non_empty.is_empty() && non_empty.iter().all(|s| pred(s));
    let dtype = if all(|s| s.parse::<i64>().is_ok()) {
        ColumnType::Int
    } else if all(|s| s.parse::<f64>().is_ok()) {
        ColumnType::Float
    } else if all(|s| s == "true" || s == "false") {
        ColumnType::Bool
    } else {
        ColumnType::Str
    };
    raw.iter()
        .map(|s| {
            if s.is_empty() {
                return Value::Null;
            }
            match dtype {
                ColumnType::Int => s.parse().map_or(Value::Null, Value::Int),
                ColumnType::Float => s.parse().map_or(Value::Null, Value::Float),
                ColumnType::Bool => Value::Bool(s == "true"),
                _ => Value::Str(s.clone()),
            }
        })
        .collect()
}

fn write_csv(table: &Table, path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(table.column_names())?;
    for row in 0..table.n_rows() {
        let record: Vec<String> = table
            .columns()
            .iter()
            .map(|c| c.values()[row].render())
            .collect();
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

fn read_json(path: &Path) -> Result<Table> {
    let file = BufReader::new(File::open(path)?);
    let parsed: serde_json::Value = serde_json::from_reader(file)?;
    let rows = parsed
        .as_array()
        .ok_or_else(|| Error::Validation("JSON input must be an array of objects".into()))?;

    let mut names: Vec<String> = Vec::new();
    for row in rows {
        let object = row
            .as_object()
            .ok_or_else(|| Error::Validation("JSON input must be an array of objects".into()))?;
        for key in object.keys() {
            if !names.iter().any(|n| n == key) {
                names.push(key.clone());
            }
        }
    }

    let mut table = Table::new();
    for name in names {
        let mut values: Vec<Value> = rows
            .iter()
            .map(|row| match row.get(&name) {
                None | Some(serde_json::Value::Null) => Value::Null,
                Some(serde_json::Value::Bool(b)) => Value::Bool(*b),
                Some(serde_json::Value::Number(n)) => match n.as_i64() {
                    Some(i) => Value::Int(i),
                    None => n.as_f64().map_or(Value::Null, Value::Float),
                },
                Some(serde_json::Value::String(s)) => Value::Str(s.clone()),
                Some(other) => Value::Str(other.to_string()),
            })
            .collect();
        promote_mixed_numbers(&mut values);
        table.set_column(Column::new(name, values));
    }
    Ok(table)
}

/// JSON number columns can mix integers and floats; unify them as floats.
fn promote_mixed_numbers(values: &mut [Value]) {
    let has_float = values.iter().any(|v| matches!(v, Value::Float(_)));
    let has_int = values.iter().any(|v| matches!(v, Value::Int(_)));
    if has_float && has_int {
        for v in values.iter_mut() {
            if let Value::Int(n) = v {
                *v = Value::Float(*n as f64);
            }
        }
    }
}

fn write_json(table: &Table, path: &Path) -> Result<()> {
    let mut rows = Vec::with_capacity(table.n_rows());
    for row in 0..table.n_rows() {
        let mut object = serde_json::Map::new();
        for column in table.columns() {
            let cell = match &column.values()[row] {
                Value::Null => serde_json::Value::Null,
                Value::Int(n) => serde_json::Value::from(*n),
                Value::Float(x) => {
                    serde_json::Number::from_f64(*x).map_or(serde_json::Value::Null, Into::into)
                }
                Value::Bool(b) => serde_json::Value::from(*b),
                other => serde_json::Value::from(other.render()),
            };
            object.insert(column.name().to_string(), cell);
        }
        rows.push(serde_json::Value::Object(object));
    }
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, &rows)?;
    Ok(())
}

fn write_arrow(table: &Table, path: &Path) -> Result<()> {
    let mut fields = Vec::with_capacity(table.n_cols());
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(table.n_cols());
    for column in table.columns() {
        let (data_type, array) = column_to_arrow(column);
        fields.push(Field::new(column.name(), data_type, true));
        arrays.push(array);
    }
    let schema = Schema::new(fields);
    let mut writer = FileWriter::try_new(File::create(path)?, &schema)?;
    if table.n_cols() > 0 {
        let batch = RecordBatch::try_new(Arc::new(schema.clone()), arrays)?;
        writer.write(&batch)?;
    }
    writer.finish()?;
    Ok(())
}

fn column_to_arrow(column: &Column) -> (DataType, ArrayRef) {
    let values = column.values();
    match column.dtype() {
        ColumnType::Int => {
            let data: Vec<Option<i64>> = values
                .iter()
                .map(|v| match v {
                    Value::Int(n) => Some(*n),
                    _ => None,
                })
                .collect();
            (DataType::Int64, Arc::new(Int64Array::from(data)))
        }
        ColumnType::Float => {
            let data: Vec<Option<f64>> = values.iter().map(Value::as_f64).collect();
            (DataType::Float64, Arc::new(Float64Array::from(data)))
        }
        ColumnType::Bool => {
            let data: Vec<Option<bool>> = values
                .iter()
                .map(|v| match v {
                    Value::Bool(b) => Some(*b),
                    _ => None,
                })
                .collect();
            (DataType::Boolean, Arc::new(BooleanArray::from(data)))
        }
        ColumnType::Date => {
            let epoch = NaiveDate::default();
            let data: Vec<Option<i32>> = values
                .iter()
                .map(|v| match v {
                    Value::Date(d) => Some(d.signed_duration_since(epoch).num_days() as i32),
                    _ => None,
                })
                .collect();
            (DataType::Date32, Arc::new(Date32Array::from(data)))
        }
        ColumnType::Timestamp => {
            let data: Vec<Option<i64>> = values
                .iter()
                .map(|v| v.as_timestamp().map(|ts| ts.and_utc().timestamp_micros()))
                .collect();
            (
                DataType::Timestamp(TimeUnit::Microsecond, None),
                Arc::new(TimestampMicrosecondArray::from(data)),
            )
        }
        ColumnType::Str => {
            let data: Vec<Option<String>> = values
                .iter()
                .map(|v| match v {
                    Value::Null => None,
                    other => Some(other.render()),
                })
                .collect();
            (DataType::Utf8, Arc::new(StringArray::from(data)))
        }
    }
}

fn read_arrow(path: &Path) -> Result<Table> {
    let reader = FileReader::try_new(File::open(path)?, None)?;
    let schema = reader.schema();
    let mut columns: Vec<Vec<Value>> = vec![Vec::new(); schema.fields().len()];
    for batch in reader {
        let batch = batch?;
        for (i, values) in columns.iter_mut().enumerate() {
            append_arrow_column(batch.column(i), values)?;
        }
    }
    let mut table = Table::new();
    for (field, values) in schema.fields().iter().zip(columns) {
        table.set_column(Column::new(field.name().clone(), values));
    }
    Ok(table)
}

fn append_arrow_column(array: &ArrayRef, out: &mut Vec<Value>) -> Result<()> {
    let unsupported =
        |dt: &DataType| Error::Validation(format!("unsupported arrow column type: {dt}"));
    match array.data_type() {
        DataType::Int64 => {
            let typed = array
                .as_any()
                .downcast_ref::<Int64Array>()
                .ok_or_else(|| unsupported(array.data_type()))?;
            for i in 0..typed.len() {
                out.push(if typed.is_null(i) {
                    Value::Null
                } else {
                    Value::Int(typed.value(i))
                });
            }
        }
        DataType::Float64 => {
            let typed = array
                .as_any()
                .downcast_ref::<Float64Array>()
                .ok_or_else(|| unsupported(array.data_type()))?;
            for i in 0..typed.len() {
                out.push(if typed.is_null(i) {
                    Value::Null
                } else {
                    Value::Float(typed.value(i))
                });
            }
        }
        DataType::Boolean => {
            let typed = array
                .as_any()
                .downcast_ref::<BooleanArray>()
                .ok_or_else(|| unsupported(array.data_type()))?;
            for i in 0..typed.len() {
                out.push(if typed.is_null(i) {
                    Value::Null
                } else {
                    Value::Bool(typed.value(i))
                });
            }
        }
        DataType::Date32 => {
            let typed = array
                .as_any()
                .downcast_ref::<Date32Array>()
                .ok_or_else(|| unsupported(array.data_type()))?;
            let epoch = NaiveDate::default();
            for i in 0..typed.len() {
                let value = if typed.is_null(i) {
                    Value::Null
                } else {
                    epoch
                        .checked_add_signed(Duration::days(i64::from(typed.value(i))))
                        .map_or(Value::Null, Value::Date)
                };
                out.push(value);
            }
        }
        DataType::Timestamp(TimeUnit::Microsecond, _) => {
            let typed = array
                .as_any()
                .downcast_ref::<TimestampMicrosecondArray>()
                .ok_or_else(|| unsupported(array.data_type()))?;
            for i in 0..typed.len() {
                let value = if typed.is_null(i) {
                    Value::Null
                } else {
                    DateTime::from_timestamp_micros(typed.value(i))
                        .map_or(Value::Null, |ts| Value::Timestamp(ts.naive_utc()))
                };
                out.push(value);
            }
        }
        DataType::Utf8 => {
            let typed = array
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| unsupported(array.data_type()))?;
            for i in 0..typed.len() {
                out.push(if typed.is_null(i) {
                    Value::Null
                } else {
                    Value::Str(typed.value(i).to_string())
                });
            }
        }
        other => return Err(unsupported(other)),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn read_table_fn_fails_for_missing_file() {
        assert!(matches!(
            read_table("no/such/file.csv"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn read_table_fn_rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.xlsx");
        std::fs::write(&path, b"whatever").unwrap();
        assert!(matches!(
            read_table(&path),
            Err(Error::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn read_csv_infers_column_types() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.csv");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "id,price,quantity,active").unwrap();
        writeln!(file, "TRX-1,19.99,2,true").unwrap();
        writeln!(file, "TRX-2,5.00,,false").unwrap();
        drop(file);

        let table = read_table(&path).unwrap();
        assert_eq!(table.n_rows(), 2);
        assert_eq!(table.column("id").unwrap().dtype(), ColumnType::Str);
        assert_eq!(table.column("price").unwrap().dtype(), ColumnType::Float);
        assert_eq!(table.column("quantity").unwrap().dtype(), ColumnType::Int);
        assert_eq!(table.column("active").unwrap().dtype(), ColumnType::Bool);
        assert_eq!(table.value("quantity", 1), Some(&Value::Null));
    }

    #[test]
    fn csv_write_then_read_preserves_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roundtrip.csv");
        let mut table = Table::new();
        table.set_column(Column::new(
            "region",
            vec![Value::Str("South".into()), Value::Str("North".into())],
        ));
        table.set_column(Column::new(
            "total_value",
            vec![Value::Float(10.5), Value::Float(20.25)],
        ));
        write_table(&table, &path).unwrap();
        let back = read_table(&path).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn json_read_handles_missing_keys_and_mixed_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.json");
        std::fs::write(
            &path,
            r#"[{"a": 1, "b": "x"}, {"a": 2.5}, {"b": "y"}]"#,
        )
        .unwrap();
        let table = read_table(&path).unwrap();
        assert_eq!(table.n_rows(), 3);
        assert_eq!(table.column("a").unwrap().dtype(), ColumnType::Float);
        assert_eq!(table.value("a", 0), Some(&Value::Float(1.0)));
        assert_eq!(table.value("b", 1), Some(&Value::Null));
    }

    #[test]
    fn arrow_write_then_read_preserves_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roundtrip.arrow");
        let date = chrono::NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let mut table = Table::new();
        table.set_column(Column::new(
            "day",
            vec![Value::Date(date), Value::Null],
        ));
        table.set_column(Column::new(
            "seen_at",
            vec![
                Value::Timestamp(date.and_hms_opt(9, 30, 0).unwrap()),
                Value::Null,
            ],
        ));
        table.set_column(Column::new("count", vec![Value::Int(3), Value::Int(4)]));
        write_table(&table, &path).unwrap();
        let back = read_table(&path).unwrap();
        assert_eq!(back, table);
    }
}
