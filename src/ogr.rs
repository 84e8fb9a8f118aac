//! The native GDAL/OGR engine.
//!
//! Every call opens the dataset it needs, does its work and closes the handle
//! again before returning, so an [`OgrEngine`] can be shared freely.
//!
//! ```no_run
//! use ogrio::{OgrEngine, ReadOptions};
//!
//! let engine = OgrEngine::builder()
//!     .config_option("OGR_GEOJSON_MAX_OBJ_SIZE", "0")
//!     .route_errors_to_log(true)
//!     .build()?;
//! let adapter = ogrio::DatasetAdapter::new(engine);
//! let table = adapter.read("countries.geojson", &ReadOptions::default())?;
//! println!("{} rows", table.len());
//! # Ok::<(), ogrio::OgrioError>(())
//! ```

use std::ffi::c_int;
use std::fs;

use log::{debug, warn};

use crate::adapter::DatasetAdapter;
use crate::engine::{
    Feature, FeatureSink, FieldDefn, LayerDefinition, LayerInfo, LayerMeta, LayerQuery,
    LayerSelector, VectorEngine,
};
use crate::errors::{OgrioError, Result};
use crate::geometry::GeometryType;
use crate::options::{ReadOptions, WriteOptions};
use crate::path::DatasetPath;
use crate::table::Table;

use self::cpl::CslStringList;
use self::dataset::{Dataset, GdalDriver, GdalOpenFlags};
use self::layer::Layer;
use self::srs::SpatialRef;

pub mod config;
mod cpl;
mod dataset;
mod feature;
mod geometry;
mod layer;
mod srs;
mod utils;

#[cfg(test)]
mod tests;

/// [`VectorEngine`] backed by GDAL/OGR.
#[derive(Clone, Debug, Default)]
pub struct OgrEngine {
    config_options: Vec<(String, String)>,
}

impl OgrEngine {
    pub fn builder() -> OgrEngineBuilder {
        OgrEngineBuilder::default()
    }

    /// The GDAL config options this engine was built with.
    pub fn config_options(&self) -> &[(String, String)] {
        &self.config_options
    }
}

/// Sets up the process-wide GDAL state an [`OgrEngine`] runs with.
#[derive(Clone, Debug, Default)]
pub struct OgrEngineBuilder {
    config_options: Vec<(String, String)>,
    route_errors_to_log: bool,
}

impl OgrEngineBuilder {
    /// Set a GDAL config option (`CPLSetConfigOption`) when the engine is built.
    pub fn config_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config_options.push((key.into(), value.into()));
        self
    }

    /// Send GDAL diagnostics to the `log` facade instead of stderr.
    pub fn route_errors_to_log(mut self, route: bool) -> Self {
        self.route_errors_to_log = route;
        self
    }

    pub fn build(self) -> Result<OgrEngine> {
        for (key, value) in &self.config_options {
            config::set_config_option(key, value)?;
        }
        if self.route_errors_to_log {
            config::route_errors_to_log();
        }
        Ok(OgrEngine {
            config_options: self.config_options,
        })
    }
}

impl VectorEngine for OgrEngine {
    fn list_layers(&self, dataset: &DatasetPath) -> Result<Vec<LayerInfo>> {
        let ds = Dataset::open(dataset, GdalOpenFlags::default())?;
        Ok(ds.layers().map(|layer| layer.info()).collect())
    }

    fn read_layer(
        &self,
        dataset: &DatasetPath,
        layer: &LayerSelector,
        query: &LayerQuery<'_>,
        sink: &mut dyn FeatureSink,
    ) -> Result<()> {
        let ds = Dataset::open(dataset, GdalOpenFlags::default())?;
        let mut source = ds.select_layer(dataset, layer)?;
        if let Some(clause) = query.filter() {
            debug!("Applying attribute filter '{clause}' to layer '{}'", source.name());
            source.set_attribute_filter(clause)?;
        }

        let selected: Vec<(c_int, FieldDefn)> = (0..)
            .zip(source.fields())
            .filter(|(_, field)| query.selects(&field.name))
            .collect();
        let geometry_type = source
            .geometry_type()
            .filter(|_| query.read_geometry)
            .map(|t| {
                if query.force_2d {
                    GeometryType::new(t.kind, false)
                } else {
                    t
                }
            });
        let crs = match geometry_type {
            Some(_) => source.crs()?,
            None => None,
        };
        sink.begin(&LayerMeta {
            name: source.name(),
            fields: selected.iter().map(|(_, field)| field.clone()).collect(),
            geometry_type,
            crs,
        })?;

        let limit = query.max_features.unwrap_or(usize::MAX);
        for feature in source.features().take(limit) {
            let values = selected
                .iter()
                .map(|(idx, field)| feature.field(*idx, field))
                .collect::<Result<_>>()?;
            let geometry = match geometry_type {
                Some(_) => feature.geometry(query.force_2d)?,
                None => None,
            };
            sink.feature(Feature { values, geometry })?;
        }
        Ok(())
    }

    fn write_layer(
        &self,
        dataset: &DatasetPath,
        definition: &LayerDefinition,
        features: &mut dyn Iterator<Item = Feature>,
    ) -> Result<()> {
        let driver = GdalDriver::get_by_name(&definition.driver)?;
        remove_existing(&driver, dataset);

        let options = CslStringList::from_pairs(&definition.dataset_options)?;
        let ds = driver
            .create_vector_only(dataset, &options)
            .map_err(|err| err.into_write_error(dataset.as_str()))?;
        let written =
            fill_layer(&ds, dataset, definition, features).and_then(|count| ds.close().map(|_| count));

        match written {
            Ok(count) => {
                debug!(
                    "Wrote {count} features to layer '{}' of '{dataset}' ({})",
                    definition.name,
                    driver.short_name()
                );
                Ok(())
            }
            Err(err) => {
                if let Err(cleanup) = driver.delete(dataset) {
                    warn!("Failed to remove incomplete dataset '{dataset}': {cleanup}");
                }
                Err(err.into_write_error(dataset.as_str()))
            }
        }
    }
}

/// Clear the destination so the driver creates the dataset from scratch.
fn remove_existing(driver: &GdalDriver, dataset: &DatasetPath) {
    if let Some(local) = dataset.local_path() {
        if !local.exists() {
            return;
        }
    }
    if driver.delete(dataset).is_ok() {
        return;
    }
    // the existing file may belong to another driver
    if let Some(local) = dataset.local_path() {
        if let Err(err) = fs::remove_file(local) {
            warn!("Could not remove existing '{dataset}': {err}");
        }
    }
}

fn fill_layer(
    ds: &Dataset,
    dataset: &DatasetPath,
    definition: &LayerDefinition,
    features: &mut dyn Iterator<Item = Feature>,
) -> Result<usize> {
    let srs = definition
        .crs
        .as_deref()
        .filter(|_| definition.geometry_type.is_some())
        .map(SpatialRef::from_definition)
        .transpose()?;
    let options = CslStringList::from_pairs(&definition.layer_options)?;
    let mut layer = ds.create_layer(
        &definition.name,
        definition.geometry_type,
        srs.as_ref(),
        &options,
    )?;
    for field in &definition.fields {
        layer.create_field(field)?;
    }

    let transaction = ds.start_transaction()?;
    let mut count = 0;
    for (idx, feature) in features.enumerate() {
        write_feature(&mut layer, definition, &feature).map_err(|err| OgrioError::Write {
            path: dataset.to_string(),
            msg: format!("feature {idx}: {err}"),
        })?;
        count += 1;
    }
    if let Some(transaction) = transaction {
        transaction.commit()?;
    }
    Ok(count)
}

fn write_feature(layer: &mut Layer<'_>, definition: &LayerDefinition, feature: &Feature) -> Result<()> {
    if feature.values.len() != definition.fields.len() {
        return Err(OgrioError::Schema(format!(
            "feature has {} values but layer '{}' has {} fields",
            feature.values.len(),
            definition.name,
            definition.fields.len()
        )));
    }
    let mut c_feature = layer.new_feature()?;
    for (idx, value) in (0..).zip(&feature.values) {
        c_feature.set_field(idx, value)?;
    }
    if let (Some(_), Some(geometry)) = (definition.geometry_type, &feature.geometry) {
        c_feature.set_geometry(geometry)?;
    }
    layer.create_feature(&c_feature)
}

/// Layers of the dataset at `dataset`, read with a default [`OgrEngine`].
pub fn list_layers(dataset: impl Into<DatasetPath>) -> Result<Vec<LayerInfo>> {
    DatasetAdapter::new(OgrEngine::default()).list_layers(dataset)
}

/// Read one layer into a [`Table`] with a default [`OgrEngine`].
pub fn read(dataset: impl Into<DatasetPath>, options: &ReadOptions) -> Result<Table> {
    DatasetAdapter::new(OgrEngine::default()).read(dataset, options)
}

/// Write `table` with a default [`OgrEngine`].
pub fn write(table: &Table, dataset: impl Into<DatasetPath>, options: &WriteOptions) -> Result<()> {
    DatasetAdapter::new(OgrEngine::default()).write(table, dataset, options)
}
