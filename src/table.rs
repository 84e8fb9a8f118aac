//! The typed tabular result of a read, and the input of a write.

use std::fmt::{self, Display, Formatter};

use chrono::NaiveDateTime;

use crate::errors::{OgrioError, Result};
use crate::geometry::{Geometry, GeometryKind, GeometryType};

/// Name given to the geometry column appended by a read.
pub const GEOMETRY_COLUMN: &str = "geometry";

/// Column type tag, resolved once per read from the layer's field definitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Int64,
    Float64,
    Utf8,
    /// Naive timestamp with millisecond precision.
    Timestamp,
    Geometry,
}

impl Display for ColumnType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ColumnType::Int64 => "Int64",
            ColumnType::Float64 => "Float64",
            ColumnType::Utf8 => "Utf8",
            ColumnType::Timestamp => "Timestamp",
            ColumnType::Geometry => "Geometry",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Column {
            name: name.into(),
            column_type,
        }
    }
}

/// One cell. `Null` is the only missing-value marker; it is never folded into
/// a zero or an empty string.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Int64(i64),
    Float64(f64),
    Utf8(String),
    Timestamp(NaiveDateTime),
    Geometry(Geometry),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The column type this value belongs to, `None` for nulls.
    pub fn column_type(&self) -> Option<ColumnType> {
        match self {
            Value::Null => None,
            Value::Int64(_) => Some(ColumnType::Int64),
            Value::Float64(_) => Some(ColumnType::Float64),
            Value::Utf8(_) => Some(ColumnType::Utf8),
            Value::Timestamp(_) => Some(ColumnType::Timestamp),
            Value::Geometry(_) => Some(ColumnType::Geometry),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float64(v) => Some(*v),
            Value::Int64(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Utf8(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Timestamp(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_geometry(&self) -> Option<&Geometry> {
        match self {
            Value::Geometry(g) => Some(g),
            _ => None,
        }
    }

    fn approx_eq(&self, other: &Value, epsilon: f64) -> bool {
        match (self, other) {
            (Value::Float64(a), Value::Float64(b)) => (a - b).abs() <= epsilon,
            (Value::Geometry(a), Value::Geometry(b)) => a.approx_eq(b, epsilon),
            (a, b) => a == b,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Utf8(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Utf8(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(v)
    }
}

impl From<Geometry> for Value {
    fn from(v: Geometry) -> Self {
        Value::Geometry(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Ordered columns and rows, with the geometry column (if any) last.
#[derive(Clone, Debug, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    rows: Vec<Vec<Value>>,
    crs: Option<String>,
}

impl Table {
    /// Create an empty table.
    ///
    /// At most one `Geometry` column is allowed and it must come last. A CRS
    /// is only kept when a geometry column is present.
    pub fn new(columns: Vec<Column>, crs: Option<String>) -> Result<Table> {
        let geometry_columns = columns
            .iter()
            .filter(|c| c.column_type == ColumnType::Geometry)
            .count();
        if geometry_columns > 1 {
            return Err(OgrioError::Schema(
                "a table can hold at most one geometry column".to_string(),
            ));
        }
        if geometry_columns == 1
            && columns.last().map(|c| c.column_type) != Some(ColumnType::Geometry)
        {
            return Err(OgrioError::Schema(
                "the geometry column must be the last column".to_string(),
            ));
        }
        for (idx, column) in columns.iter().enumerate() {
            if columns[..idx].iter().any(|c| c.name == column.name) {
                return Err(OgrioError::Schema(format!(
                    "duplicate column name '{}'",
                    column.name
                )));
            }
        }
        let crs = if geometry_columns == 1 { crs } else { None };
        Ok(Table {
            columns,
            rows: Vec::new(),
            crs,
        })
    }

    /// Append a row, checking its arity and that every non-null value has the
    /// type of its column.
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(OgrioError::Schema(format!(
                "row has {} values but the table has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        for (value, column) in row.iter().zip(&self.columns) {
            if let Some(value_type) = value.column_type() {
                if value_type != column.column_type {
                    return Err(OgrioError::Schema(format!(
                        "column '{}' expects {} but got {}",
                        column.name, column.column_type, value_type
                    )));
                }
            }
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.column_index(name).map(|idx| self.columns[idx].column_type)
    }

    /// Iterate the values of one column, `None` if the column does not exist.
    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &Value> + '_> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |row| &row[idx]))
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn row(&self, idx: usize) -> Option<&[Value]> {
        self.rows.get(idx).map(Vec::as_slice)
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).map(|r| &r[idx])
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn crs(&self) -> Option<&str> {
        self.crs.as_deref()
    }

    pub fn has_geometry(&self) -> bool {
        self.geometry_index().is_some()
    }

    pub fn geometry_index(&self) -> Option<usize> {
        match self.columns.last() {
            Some(c) if c.column_type == ColumnType::Geometry => Some(self.columns.len() - 1),
            _ => None,
        }
    }

    /// Geometry of a row, `None` for non-spatial tables and null geometries.
    pub fn geometry(&self, row: usize) -> Option<&Geometry> {
        let idx = self.geometry_index()?;
        self.rows.get(row)?[idx].as_geometry()
    }

    /// The geometry type a layer needs to hold every geometry of this table.
    ///
    /// A single kind maps to itself, mixed kinds map to `Unknown`. `None` when
    /// the table has no geometry column.
    pub fn geometry_type(&self) -> Option<GeometryType> {
        let idx = self.geometry_index()?;
        let mut kind: Option<GeometryKind> = None;
        let mut has_z = false;
        for geometry in self.rows.iter().filter_map(|r| r[idx].as_geometry()) {
            has_z |= geometry.has_z();
            kind = match kind {
                None => Some(geometry.kind()),
                Some(k) if k == geometry.kind() => Some(k),
                Some(_) => Some(GeometryKind::Unknown),
            };
        }
        Some(GeometryType::new(
            kind.unwrap_or(GeometryKind::Unknown),
            has_z,
        ))
    }

    /// Remove a column by name. Returns `false` if it did not exist.
    pub fn drop_column(&mut self, name: &str) -> bool {
        let Some(idx) = self.column_index(name) else {
            return false;
        };
        self.columns.remove(idx);
        for row in &mut self.rows {
            row.remove(idx);
        }
        if !self.has_geometry() {
            self.crs = None;
        }
        true
    }

    /// Equality up to `epsilon` on floats and coordinates. Column order, CRS,
    /// nulls and every other value must match exactly.
    pub fn approx_eq(&self, other: &Table, epsilon: f64) -> bool {
        self.columns == other.columns
            && self.crs == other.crs
            && self.rows.len() == other.rows.len()
            && self
                .rows
                .iter()
                .zip(&other.rows)
                .all(|(a, b)| a.iter().zip(b).all(|(x, y)| x.approx_eq(y, epsilon)))
    }
}
