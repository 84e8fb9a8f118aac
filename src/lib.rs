//! Read and write [OGR](https://gdal.org/) vector datasets as typed tables.
//!
//! A [`DatasetAdapter`] sits on top of a [`VectorEngine`] and turns layers into
//! [`Table`]s: one column per attribute field, in the layer's field order, and
//! a trailing [`GEOMETRY_COLUMN`] when geometry is read. Writing goes the other
//! way and always produces a fresh single-layer dataset.
//!
//! ## Use
//!
//! ```
//! use ogrio::{
//!     Column, ColumnType, DatasetAdapter, Geometry, Coord, MemoryEngine, ReadOptions, Table,
//!     Value, WriteOptions, GEOMETRY_COLUMN,
//! };
//!
//! let mut table = Table::new(
//!     vec![
//!         Column::new("name", ColumnType::Utf8),
//!         Column::new(GEOMETRY_COLUMN, ColumnType::Geometry),
//!     ],
//!     Some("EPSG:4326".to_string()),
//! )?;
//! table.push_row(vec![
//!     Value::from("Ottawa"),
//!     Value::Geometry(Geometry::Point(Coord::xy(-75.7, 45.4))),
//! ])?;
//!
//! let adapter = DatasetAdapter::new(MemoryEngine::new());
//! adapter.write(&table, "cities.gpkg", &WriteOptions::new("GPKG"))?;
//!
//! let read = adapter.read("cities.gpkg", &ReadOptions::default().where_clause("name = 'Ottawa'"))?;
//! assert_eq!(read.len(), 1);
//! # Ok::<(), ogrio::OgrioError>(())
//! ```
//!
//! With the `ogr` feature, [`OgrEngine`] does the same against GDAL and the
//! free functions [`list_layers`], [`read`] and [`write`] use a default one.

#![crate_name = "ogrio"]
#![crate_type = "lib"]

mod adapter;
pub mod drivers;
pub mod engine;
pub mod errors;
pub mod geometry;
mod options;
pub mod path;
pub mod table;

#[cfg(feature = "ogr")]
pub mod ogr;

#[cfg(test)]
mod test_utils;

pub use adapter::DatasetAdapter;
pub use drivers::{Driver, DriverCaps, RoundTrip};
pub use engine::memory::{MemoryDataset, MemoryEngine, MemoryLayer};
pub use engine::{LayerInfo, LayerSelector, VectorEngine};
pub use errors::{OgrioError, Result};
pub use geometry::{Coord, Geometry, GeometryKind, GeometryType};
pub use options::{ReadOptions, WriteOptions};
pub use path::DatasetPath;
pub use table::{Column, ColumnType, Table, Value, GEOMETRY_COLUMN};

#[cfg(feature = "ogr")]
pub use ogr::{list_layers, read, write, OgrEngine, OgrEngineBuilder};
