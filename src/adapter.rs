//! Turns an engine's layers and features into [`Table`]s and back.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use log::{debug, warn};

use crate::drivers::Driver;
use crate::engine::{
    Feature, FeatureSink, FieldDefn, FieldType, FieldValue, LayerDefinition, LayerInfo,
    LayerMeta, LayerQuery, VectorEngine,
};
use crate::errors::{OgrioError, Result};
use crate::options::{ReadOptions, WriteOptions};
use crate::path::DatasetPath;
use crate::table::{Column, ColumnType, Table, Value, GEOMETRY_COLUMN};


/// Reads and writes [`Table`]s through a [`VectorEngine`].
///
/// Each call is a complete open/operate/close cycle on the engine; the adapter
/// holds no state besides the engine itself.
#[derive(Debug, Default)]
pub struct DatasetAdapter<E> {
    engine: E,
}

impl<E: VectorEngine> DatasetAdapter<E> {
    pub fn new(engine: E) -> Self {
        DatasetAdapter { engine }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Layers of the dataset with their geometry types, in native order.
    pub fn list_layers(&self, dataset: impl Into<DatasetPath>) -> Result<Vec<LayerInfo>> {
        self.engine.list_layers(&dataset.into())
    }

    /// Read one layer into a [`Table`].
    ///
    /// Attribute columns keep the layer's field order and the geometry column,
    /// named [`GEOMETRY_COLUMN`], comes last when geometry is read.
    pub fn read(&self, dataset: impl Into<DatasetPath>, options: &ReadOptions) -> Result<Table> {
        let dataset = dataset.into();
        let query = LayerQuery {
            where_clause: options.where_clause.as_deref(),
            max_features: options.max_features,
            force_2d: options.force_2d,
            read_geometry: options.read_geometry,
            columns: options.columns.as_deref(),
        };
        debug!("Reading layer {} of '{dataset}'", options.layer);

        let mut builder = TableBuilder::new(options.columns.as_deref());
        self.engine
            .read_layer(&dataset, &options.layer, &query, &mut builder)?;
        let table = builder.finish()?;
        debug!("Read {} rows from '{dataset}'", table.len());
        Ok(table)
    }

    /// Write `table` as the single layer of a new dataset, replacing whatever
    /// was at `dataset` before.
    pub fn write(
        &self,
        table: &Table,
        dataset: impl Into<DatasetPath>,
        options: &WriteOptions,
    ) -> Result<()> {
        let dataset = dataset.into();
        if options.driver.trim().is_empty() {
            return Err(OgrioError::BadArgument(
                "a driver is required to write a dataset".to_string(),
            ));
        }
        let name = match &options.layer {
            Some(name) => name.clone(),
            None => dataset
                .file_stem()
                .ok_or_else(|| {
                    OgrioError::BadArgument(format!("cannot derive a layer name from '{dataset}'"))
                })?
                .to_string(),
        };
        let definition = LayerDefinition {
            driver: options.driver.clone(),
            name,
            fields: table
                .columns()
                .iter()
                .filter(|c| c.column_type != ColumnType::Geometry)
                .map(field_defn)
                .collect(),
            geometry_type: table.geometry_type(),
            crs: table.crs().map(str::to_string),
            dataset_options: options.dataset_options.clone(),
            layer_options: options.layer_options.clone(),
        };

        let geometry_index = table.geometry_index();
        let mut features = table.rows().iter().map(|row| to_feature(row, geometry_index));
        self.engine
            .write_layer(&dataset, &definition, &mut features)
            .map_err(|err| err.into_write_error(dataset.as_str()))?;
        debug!(
            "Wrote {} rows to layer '{}' of '{dataset}' with driver '{}'",
            table.len(),
            definition.name,
            definition.driver
        );
        Ok(())
    }

    /// [`write`](Self::write) with the driver inferred from the file extension.
    pub fn write_inferred(
        &self,
        table: &Table,
        dataset: impl Into<DatasetPath>,
        layer: Option<&str>,
    ) -> Result<()> {
        let dataset = dataset.into();
        let driver = Driver::for_path(&dataset)?;
        let mut options = WriteOptions::new(driver.short_name);
        options.layer = layer.map(str::to_string);
        self.write(table, dataset, &options)
    }
}

/// The column type a field is read as.
fn column_type(field: &FieldDefn) -> Result<ColumnType> {
    match &field.field_type {
        FieldType::Integer | FieldType::Integer64 | FieldType::Boolean => Ok(ColumnType::Int64),
        FieldType::Real => Ok(ColumnType::Float64),
        FieldType::String => Ok(ColumnType::Utf8),
        FieldType::Date | FieldType::Time | FieldType::DateTime => Ok(ColumnType::Timestamp),
        FieldType::Other(name) => Err(OgrioError::UnsupportedFieldType {
            field: field.name.clone(),
            field_type: name.clone(),
        }),
    }
}

fn field_defn(column: &Column) -> FieldDefn {
    let field_type = match column.column_type {
        ColumnType::Int64 => FieldType::Integer64,
        ColumnType::Float64 => FieldType::Real,
        ColumnType::Timestamp => FieldType::DateTime,
        ColumnType::Utf8 | ColumnType::Geometry => FieldType::String,
    };
    FieldDefn::new(&column.name, field_type)
}

fn to_feature(row: &[Value], geometry_index: Option<usize>) -> Feature {
    let values = row
        .iter()
        .enumerate()
        .filter(|(idx, _)| Some(*idx) != geometry_index)
        .map(|(_, value)| match value {
            Value::Int64(v) => FieldValue::Integer(*v),
            Value::Float64(v) => FieldValue::Real(*v),
            Value::Utf8(v) => FieldValue::String(v.clone()),
            Value::Timestamp(v) => FieldValue::DateTime(*v),
            Value::Null | Value::Geometry(_) => FieldValue::Null,
        })
        .collect();
    let geometry = geometry_index
        .and_then(|idx| row[idx].as_geometry())
        .cloned();
    Feature { values, geometry }
}

fn truncate_to_millis(dt: NaiveDateTime) -> NaiveDateTime {
    dt.with_nanosecond(dt.nanosecond() / 1_000_000 * 1_000_000)
        .unwrap_or(dt)
}

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

/// Convert an engine value for a column of type `column_type`.
fn coerce(value: FieldValue, column_type: ColumnType, field: &str) -> Result<Value> {
    let value = match (value, column_type) {
        (FieldValue::Null, _) => Value::Null,
        (FieldValue::Integer(v), ColumnType::Int64) => Value::Int64(v),
        (FieldValue::Integer(v), ColumnType::Float64) => Value::Float64(v as f64),
        (FieldValue::Real(v), ColumnType::Float64) => Value::Float64(v),
        (FieldValue::String(v), ColumnType::Utf8) => Value::Utf8(v),
        (FieldValue::Date(d), ColumnType::Timestamp) => Value::Timestamp(d.and_time(NaiveTime::MIN)),
        (FieldValue::Time(t), ColumnType::Timestamp) => {
            Value::Timestamp(truncate_to_millis(epoch().and_time(t)))
        }
        (FieldValue::DateTime(dt), ColumnType::Timestamp) => {
            Value::Timestamp(truncate_to_millis(dt))
        }
        (FieldValue::DateTimeTz(dt), ColumnType::Timestamp) => {
            Value::Timestamp(truncate_to_millis(dt.naive_utc()))
        }
        (other, column_type) => {
            return Err(OgrioError::Schema(format!(
                "field '{field}' produced {other:?} for a {column_type} column"
            )))
        }
    };
    Ok(value)
}

/// Collects a read into a [`Table`], resolving column types once from the
/// layer's schema.
struct TableBuilder<'a> {
    requested: Option<&'a [String]>,
    types: Vec<ColumnType>,
    names: Vec<String>,
    with_geometry: bool,
    table: Option<Table>,
}

impl<'a> TableBuilder<'a> {
    fn new(requested: Option<&'a [String]>) -> Self {
        TableBuilder {
            requested,
            types: Vec::new(),
            names: Vec::new(),
            with_geometry: false,
            table: None,
        }
    }

    fn finish(self) -> Result<Table> {
        self.table.ok_or_else(|| {
            OgrioError::Schema("the engine finished a read without announcing a layer".to_string())
        })
    }
}

impl FeatureSink for TableBuilder<'_> {
    fn begin(&mut self, layer: &LayerMeta) -> Result<()> {
        if let Some(requested) = self.requested {
            for name in requested {
                if !layer.fields.iter().any(|f| &f.name == name) {
                    warn!("Column '{name}' is not a field of layer '{}', ignoring it", layer.name);
                }
            }
        }

        let mut columns = Vec::with_capacity(layer.fields.len() + 1);
        for field in &layer.fields {
            let column_type = column_type(field)?;
            self.types.push(column_type);
            self.names.push(field.name.clone());
            columns.push(Column::new(&field.name, column_type));
        }
        self.with_geometry = layer.geometry_type.is_some();
        if self.with_geometry {
            columns.push(Column::new(GEOMETRY_COLUMN, ColumnType::Geometry));
        }
        self.table = Some(Table::new(columns, layer.crs.clone())?);
        Ok(())
    }

    fn feature(&mut self, feature: Feature) -> Result<()> {
        let Some(table) = self.table.as_mut() else {
            return Err(OgrioError::Schema(
                "the engine sent a feature before announcing its layer".to_string(),
            ));
        };
        if feature.values.len() != self.types.len() {
            return Err(OgrioError::Schema(format!(
                "feature has {} values but the layer announced {} fields",
                feature.values.len(),
                self.types.len()
            )));
        }
        let mut row = Vec::with_capacity(self.types.len() + 1);
        let columns = self.types.iter().zip(&self.names);
        for (value, (column_type, name)) in feature.values.into_iter().zip(columns) {
            row.push(coerce(value, *column_type, name)?);
        }
        if self.with_geometry {
            row.push(feature.geometry.map_or(Value::Null, Value::Geometry));
        }
        table.push_row(row)
    }
}
