//! The seam between the dataset adapter and a vector I/O engine.
//!
//! An engine speaks in layers and features with engine-native field types; the
//! adapter turns those into [`Table`](crate::Table)s. Each call opens what it
//! needs and releases it before returning.

use std::fmt::{self, Display, Formatter};

use chrono::{FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};

use crate::errors::Result;
use crate::geometry::{Geometry, GeometryType};
use crate::path::DatasetPath;

pub mod filter;
pub mod memory;

/// A layer addressed by name or by position in the dataset's native order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LayerSelector {
    Name(String),
    Index(usize),
}

impl Default for LayerSelector {
    fn default() -> Self {
        LayerSelector::Index(0)
    }
}

impl Display for LayerSelector {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            LayerSelector::Name(name) => write!(f, "'{name}'"),
            LayerSelector::Index(idx) => write!(f, "at index {idx}"),
        }
    }
}

impl From<&str> for LayerSelector {
    fn from(name: &str) -> Self {
        LayerSelector::Name(name.to_string())
    }
}

impl From<String> for LayerSelector {
    fn from(name: String) -> Self {
        LayerSelector::Name(name)
    }
}

impl From<usize> for LayerSelector {
    fn from(idx: usize) -> Self {
        LayerSelector::Index(idx)
    }
}

/// One entry of a dataset's layer listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayerInfo {
    pub name: String,
    /// `None` for layers without a geometry field.
    pub geometry_type: Option<GeometryType>,
}

/// Engine-native attribute types.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldType {
    Integer,
    Integer64,
    Boolean,
    Real,
    String,
    Date,
    Time,
    DateTime,
    /// Anything the engine knows but the table model does not (lists, binary...).
    Other(String),
}

impl Display for FieldType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Other(name) => f.write_str(name),
            other => write!(f, "{other:?}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDefn {
    pub name: String,
    pub field_type: FieldType,
}

impl FieldDefn {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        FieldDefn {
            name: name.into(),
            field_type,
        }
    }
}

/// Engine-native attribute values.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Null,
    Integer(i64),
    Real(f64),
    String(String),
    Date(NaiveDate),
    Time(NaiveTime),
    /// A datetime with no known UTC offset.
    DateTime(NaiveDateTime),
    /// A datetime carrying an explicit UTC offset.
    DateTimeTz(chrono::DateTime<FixedOffset>),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

/// One record: values aligned with the fields announced in [`LayerMeta`].
#[derive(Clone, Debug, PartialEq)]
pub struct Feature {
    pub values: Vec<FieldValue>,
    pub geometry: Option<Geometry>,
}

/// What an engine announces before streaming features.
#[derive(Clone, Debug, PartialEq)]
pub struct LayerMeta {
    pub name: String,
    /// The selected fields, in the layer's native order.
    pub fields: Vec<FieldDefn>,
    /// `None` when the layer has no geometry or geometry was not requested.
    pub geometry_type: Option<GeometryType>,
    pub crs: Option<String>,
}

/// Read parameters forwarded to the engine.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayerQuery<'a> {
    /// Attribute filter. `None` and empty strings both mean "no filter".
    pub where_clause: Option<&'a str>,
    pub max_features: Option<usize>,
    pub force_2d: bool,
    pub read_geometry: bool,
    /// Restrict the fields read. Names the layer lacks are skipped.
    pub columns: Option<&'a [String]>,
}

impl LayerQuery<'_> {
    /// The filter to apply, with blank filters normalised away.
    pub fn filter(&self) -> Option<&str> {
        self.where_clause
            .map(str::trim)
            .filter(|clause| !clause.is_empty())
    }

    /// Whether the field named `name` is part of the selection.
    pub fn selects(&self, name: &str) -> bool {
        self.columns
            .map_or(true, |columns| columns.iter().any(|c| c == name))
    }
}

/// Receives the outcome of a read, schema first.
pub trait FeatureSink {
    /// Called exactly once, before the first feature.
    fn begin(&mut self, layer: &LayerMeta) -> Result<()>;

    /// Called for each feature in output order. Returning an error aborts the read.
    fn feature(&mut self, feature: Feature) -> Result<()>;
}

/// Everything needed to create a layer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayerDefinition {
    pub driver: String,
    pub name: String,
    pub fields: Vec<FieldDefn>,
    pub geometry_type: Option<GeometryType>,
    pub crs: Option<String>,
    /// Dataset creation options as `(KEY, VALUE)` pairs.
    pub dataset_options: Vec<(String, String)>,
    /// Layer creation options as `(KEY, VALUE)` pairs.
    pub layer_options: Vec<(String, String)>,
}

/// A vector I/O engine.
///
/// Every method is a complete open/operate/close cycle; implementations must
/// not keep handles alive between calls.
pub trait VectorEngine {
    /// Layers of a dataset in native order.
    fn list_layers(&self, dataset: &DatasetPath) -> Result<Vec<LayerInfo>>;

    /// Stream one layer into `sink`, honoring the query.
    fn read_layer(
        &self,
        dataset: &DatasetPath,
        layer: &LayerSelector,
        query: &LayerQuery<'_>,
        sink: &mut dyn FeatureSink,
    ) -> Result<()>;

    /// Create (or replace) a dataset holding a single layer and fill it with
    /// `features`. On error the destination must not be left looking complete.
    fn write_layer(
        &self,
        dataset: &DatasetPath,
        definition: &LayerDefinition,
        features: &mut dyn Iterator<Item = Feature>,
    ) -> Result<()>;
}

impl<E: VectorEngine + ?Sized> VectorEngine for &E {
    fn list_layers(&self, dataset: &DatasetPath) -> Result<Vec<LayerInfo>> {
        (**self).list_layers(dataset)
    }

    fn read_layer(
        &self,
        dataset: &DatasetPath,
        layer: &LayerSelector,
        query: &LayerQuery<'_>,
        sink: &mut dyn FeatureSink,
    ) -> Result<()> {
        (**self).read_layer(dataset, layer, query, sink)
    }

    fn write_layer(
        &self,
        dataset: &DatasetPath,
        definition: &LayerDefinition,
        features: &mut dyn Iterator<Item = Feature>,
    ) -> Result<()> {
        (**self).write_layer(dataset, definition, features)
    }
}
