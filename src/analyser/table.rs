//! In-memory tables of loosely typed cells.
//!
//! Every pipeline stage consumes a [Table] and produces a new one. Cells keep whatever
//! type could be inferred from the source; the flow normaliser is responsible for
//! coercing the columns it knows about.
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use serde::ser::{Serialize, Serializer};
use serde_json::{Map, Value as JsonValue};

use super::error::InputError;

/// A single cell.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Missing,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Infers a cell from raw text the way a CSV reader would: empty is missing, then
    /// integer, float, boolean, and finally plain text.
    pub fn infer(raw: &str) -> Self {
        if raw.is_empty() {
            return Value::Missing;
        }
        if let Ok(int) = raw.parse::<i64>() {
            return Value::Int(int);
        }
        if let Ok(float) = raw.parse::<f64>() {
            if float.is_finite() {
                return Value::Float(float);
            }
        }
        match raw {
            "True" | "true" => Value::Bool(true),
            "False" | "false" => Value::Bool(false),
            _ => Value::Text(raw.to_string()),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    /// Numeric view of the cell. Text is not parsed here; use [Value::to_numeric] first.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(int) => Some(*int as f64),
            Value::Float(float) => Some(*float),
            Value::Bool(flag) => Some(if *flag { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Coerces the cell to a number. Anything that is not a number becomes `Int(0)`.
    pub fn to_numeric(&self) -> Value {
        match self {
            Value::Int(int) => Value::Int(*int),
            Value::Float(float) if float.is_finite() => Value::Float(*float),
            Value::Bool(flag) => Value::Int(i64::from(*flag)),
            Value::Text(text) => match Value::infer(text.trim()) {
                number @ (Value::Int(_) | Value::Float(_)) => number,
                _ => Value::Int(0),
            },
            Value::Float(_) | Value::Missing => Value::Int(0),
        }
    }

    /// Adds two numeric cells, keeping integers as integers.
    pub fn add(&self, other: &Value) -> Value {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Value::Int(a.saturating_add(*b)),
            _ => Value::Float(self.as_f64().unwrap_or(0.0) + other.as_f64().unwrap_or(0.0)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Missing => Ok(()),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Int(int) => write!(f, "{int}"),
            Value::Float(float) => write!(f, "{float:?}"),
            Value::Text(text) => write!(f, "{text}"),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Missing => serializer.serialize_none(),
            Value::Bool(flag) => serializer.serialize_bool(*flag),
            Value::Int(int) => serializer.serialize_i64(*int),
            Value::Float(float) if float.is_finite() => serializer.serialize_f64(*float),
            Value::Float(_) => serializer.serialize_none(),
            Value::Text(text) => serializer.serialize_str(text),
        }
    }
}

impl From<&JsonValue> for Value {
    fn from(json: &JsonValue) -> Self {
        match json {
            JsonValue::Null => Value::Missing,
            JsonValue::Bool(flag) => Value::Bool(*flag),
            JsonValue::Number(number) => match number.as_i64() {
                Some(int) => Value::Int(int),
                None => number.as_f64().map(Value::Float).unwrap_or(Value::Missing),
            },
            JsonValue::String(text) => Value::Text(text.clone()),
            other => Value::Text(other.to_string()),
        }
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::Text(text.to_string())
    }
}

/// Column-ordered table. Every row has exactly `columns.len()` cells.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns, rows: Vec::new() }
    }

    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let mut table = Self::new(columns);
        for row in rows {
            table.push_row(row);
        }
        table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Appends a row, padding short rows with [Value::Missing] and dropping extra cells.
    pub fn push_row(&mut self, mut row: Vec<Value>) {
        row.resize(self.columns.len(), Value::Missing);
        self.rows.push(row);
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let index = self.column_index(name)?;
        Some(self.rows.iter().map(|row| &row[index]).collect())
    }

    pub fn cell(&self, row: usize, name: &str) -> Option<&Value> {
        let index = self.column_index(name)?;
        self.rows.get(row).map(|row| &row[index])
    }

    pub fn rename_column(&mut self, from: &str, to: &str) {
        if let Some(index) = self.column_index(from) {
            self.columns[index] = to.to_string();
        }
    }

    pub fn trim_column_names(&mut self) {
        for column in self.columns.iter_mut() {
            let trimmed = column.trim();
            if trimmed.len() != column.len() {
                *column = trimmed.to_string();
            }
        }
    }

    /// Rewrites every cell of `name` in place. Returns false when the column is absent.
    pub fn map_column<F>(&mut self, name: &str, mut f: F) -> bool
    where
        F: FnMut(&Value) -> Value,
    {
        let Some(index) = self.column_index(name) else {
            return false;
        };
        for row in self.rows.iter_mut() {
            row[index] = f(&row[index]);
        }
        true
    }

    /// Replaces the column if it exists, otherwise appends it.
    pub fn set_column(&mut self, name: &str, values: Vec<Value>) {
        debug_assert_eq!(values.len(), self.rows.len());
        let index = match self.column_index(name) {
            Some(index) => index,
            None => {
                self.columns.push(name.to_string());
                for row in self.rows.iter_mut() {
                    row.push(Value::Missing);
                }
                self.columns.len() - 1
            }
        };
        for (row, value) in self.rows.iter_mut().zip(values) {
            row[index] = value;
        }
    }

    /// New table holding only the given column indexes, in that order.
    pub fn project(&self, indexes: &[usize]) -> Table {
        Table {
            columns: indexes.iter().map(|&i| self.columns[i].clone()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| indexes.iter().map(|&i| row[i].clone()).collect())
                .collect(),
        }
    }

    /// Rows as JSON objects, the shape the classification service expects.
    pub fn records(&self) -> Vec<Map<String, JsonValue>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row)
                    .map(|(column, value)| {
                        let json = serde_json::to_value(value).unwrap_or(JsonValue::Null);
                        (column.clone(), json)
                    })
                    .collect()
            })
            .collect()
    }

    /// Parses a delimited table with a header row.
    pub fn from_reader<R: Read>(reader: R, delimiter: u8) -> Result<Table, csv::Error> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .from_reader(reader);

        let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let mut table = Table::new(columns);
        for record in reader.records() {
            let record = record?;
            table.push_row(record.iter().map(Value::infer).collect());
        }
        Ok(table)
    }

    /// Loads a comma or pipe delimited file.
    pub fn read_delimited(path: &Path, delimiter: u8) -> Result<Table, InputError> {
        log::info!("Reading delimited table {}", path.display());
        let file = open(path)?;
        let table = Table::from_reader(file, delimiter).map_err(|source| InputError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        if table.width() == 0 {
            return Err(InputError::Malformed {
                path: path.to_path_buf(),
                reason: "no header row".to_string(),
            });
        }
        Ok(table)
    }

    /// Loads a JSON array of row objects. Columns appear in first-seen order.
    pub fn read_json(path: &Path) -> Result<Table, InputError> {
        log::info!("Reading JSON table {}", path.display());
        let file = open(path)?;
        let json: JsonValue = serde_json::from_reader(file).map_err(|source| InputError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        Table::from_json(&json).map_err(|reason| InputError::Malformed {
            path: path.to_path_buf(),
            reason,
        })
    }

    pub fn from_json(json: &JsonValue) -> Result<Table, String> {
        let JsonValue::Array(items) = json else {
            return Err("expected a JSON array of row objects".to_string());
        };

        let mut objects = Vec::with_capacity(items.len());
        let mut columns: Vec<String> = Vec::new();
        for (index, item) in items.iter().enumerate() {
            let JsonValue::Object(object) = item else {
                return Err(format!("row {index} is not a JSON object"));
            };
            for key in object.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
            objects.push(object);
        }

        let mut table = Table::new(columns);
        for object in objects {
            let row = table
                .columns
                .iter()
                .map(|column| object.get(column).map(Value::from).unwrap_or(Value::Missing))
                .collect();
            table.rows.push(row);
        }
        Ok(table)
    }

    /// Writes the rows as a pretty-printed JSON array of objects.
    pub fn write_json(&self, path: &Path) -> Result<(), InputError> {
        let write_error = |reason: String| InputError::Write {
            path: path.to_path_buf(),
            reason,
        };

        let file = File::create(path).map_err(|e| write_error(e.to_string()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &self.records()).map_err(|e| write_error(e.to_string()))?;
        writer.flush().map_err(|e| write_error(e.to_string()))?;
        log::info!("Wrote {} rows to {}", self.rows.len(), path.display());
        Ok(())
    }

    pub fn write_csv(&self, path: &Path) -> Result<(), InputError> {
        let write_error = |reason: String| InputError::Write {
            path: path.to_path_buf(),
            reason,
        };

        let mut writer = csv::Writer::from_path(path).map_err(|e| write_error(e.to_string()))?;
        writer.write_record(&self.columns).map_err(|e| write_error(e.to_string()))?;
        for row in &self.rows {
            writer
                .write_record(row.iter().map(|value| value.to_string()))
                .map_err(|e| write_error(e.to_string()))?;
        }
        writer.flush().map_err(|e| write_error(e.to_string()))?;
        log::info!("Wrote {} rows to {}", self.rows.len(), path.display());
        Ok(())
    }
}

fn open(path: &Path) -> Result<File, InputError> {
    if !path.exists() {
        return Err(InputError::NotFound(path.to_path_buf()));
    }
    File::open(path).map_err(|source| InputError::Read {
        path: path.to_path_buf(),
        source,
    })
}
