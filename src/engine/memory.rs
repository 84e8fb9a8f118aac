//! A vector engine that keeps datasets in process memory.
//!
//! Datasets are keyed by their normalised path. Writes honour the round-trip
//! behaviour the [driver registry](crate::drivers) declares for the target
//! driver, so a table written as GeoJSON comes back with 15 decimal places
//! just as it would from disk.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use log::debug;

use crate::drivers::{Driver, DriverCaps};
use crate::engine::filter::AttributeFilter;
use crate::engine::{
    Feature, FeatureSink, FieldDefn, FieldType, FieldValue, LayerDefinition, LayerInfo,
    LayerMeta, LayerQuery, LayerSelector, VectorEngine,
};
use crate::errors::{OgrioError, Result};
use crate::geometry::GeometryType;
use crate::path::DatasetPath;

/// A layer held by the [`MemoryEngine`].
#[derive(Clone, Debug, PartialEq)]
pub struct MemoryLayer {
    pub name: String,
    /// `None` for non-spatial layers.
    pub geometry_type: Option<GeometryType>,
    pub crs: Option<String>,
    pub fields: Vec<FieldDefn>,
    pub features: Vec<Feature>,
}

impl MemoryLayer {
    pub fn new(name: impl Into<String>, geometry_type: Option<GeometryType>) -> Self {
        MemoryLayer {
            name: name.into(),
            geometry_type,
            crs: None,
            fields: Vec::new(),
            features: Vec::new(),
        }
    }

    pub fn with_crs(mut self, crs: impl Into<String>) -> Self {
        self.crs = Some(crs.into());
        self
    }

    pub fn with_fields(mut self, fields: Vec<FieldDefn>) -> Self {
        self.fields = fields;
        self
    }

    /// Append a feature. Its values must line up with the layer's fields.
    pub fn push_feature(&mut self, feature: Feature) -> Result<()> {
        if feature.values.len() != self.fields.len() {
            return Err(OgrioError::Schema(format!(
                "feature has {} values but layer '{}' has {} fields",
                feature.values.len(),
                self.name,
                self.fields.len()
            )));
        }
        self.features.push(feature);
        Ok(())
    }

    fn info(&self) -> LayerInfo {
        LayerInfo {
            name: self.name.clone(),
            geometry_type: self.geometry_type,
        }
    }
}

/// A dataset held by the [`MemoryEngine`]: a driver name and its layers in
/// native order.
#[derive(Clone, Debug, PartialEq)]
pub struct MemoryDataset {
    pub driver: String,
    pub layers: Vec<MemoryLayer>,
}

impl MemoryDataset {
    pub fn new(driver: impl Into<String>) -> Self {
        MemoryDataset {
            driver: driver.into(),
            layers: Vec::new(),
        }
    }

    pub fn with_layer(mut self, layer: MemoryLayer) -> Self {
        self.layers.push(layer);
        self
    }

    fn layer(&self, selector: &LayerSelector) -> Option<&MemoryLayer> {
        match selector {
            LayerSelector::Index(idx) => self.layers.get(*idx),
            LayerSelector::Name(name) => self.layers.iter().find(|l| &l.name == name),
        }
    }
}

/// In-process [`VectorEngine`].
#[derive(Debug, Default)]
pub struct MemoryEngine {
    datasets: RwLock<BTreeMap<DatasetPath, MemoryDataset>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `dataset` under `path`, returning what was there before.
    pub fn insert(
        &self,
        path: impl Into<DatasetPath>,
        dataset: MemoryDataset,
    ) -> Option<MemoryDataset> {
        self.datasets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.into(), dataset)
    }

    /// A copy of the dataset stored under `path`.
    pub fn get(&self, path: impl Into<DatasetPath>) -> Option<MemoryDataset> {
        self.datasets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&path.into())
            .cloned()
    }

    pub fn remove(&self, path: impl Into<DatasetPath>) -> Option<MemoryDataset> {
        self.datasets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&path.into())
    }

    pub fn contains(&self, path: impl Into<DatasetPath>) -> bool {
        self.datasets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&path.into())
    }

    fn not_found(dataset: &DatasetPath) -> OgrioError {
        OgrioError::DatasetNotFound {
            path: dataset.to_string(),
            msg: "No such file or directory".to_string(),
        }
    }
}

impl VectorEngine for MemoryEngine {
    fn list_layers(&self, dataset: &DatasetPath) -> Result<Vec<LayerInfo>> {
        let datasets = self.datasets.read().unwrap_or_else(PoisonError::into_inner);
        let stored = datasets
            .get(dataset)
            .ok_or_else(|| Self::not_found(dataset))?;
        Ok(stored.layers.iter().map(MemoryLayer::info).collect())
    }

    fn read_layer(
        &self,
        dataset: &DatasetPath,
        layer: &LayerSelector,
        query: &LayerQuery<'_>,
        sink: &mut dyn FeatureSink,
    ) -> Result<()> {
        let datasets = self.datasets.read().unwrap_or_else(PoisonError::into_inner);
        let stored = datasets
            .get(dataset)
            .ok_or_else(|| Self::not_found(dataset))?;
        let source = stored
            .layer(layer)
            .ok_or_else(|| OgrioError::LayerNotFound {
                path: dataset.to_string(),
                layer: layer.clone(),
            })?;

        let filter = query
            .filter()
            .map(|clause| {
                debug!("Applying attribute filter '{clause}' to layer '{}'", source.name);
                AttributeFilter::parse(clause, &source.fields).map_err(|msg| {
                    OgrioError::InvalidFilter {
                        filter: clause.to_string(),
                        msg,
                    }
                })
            })
            .transpose()?;

        let selected: Vec<usize> = source
            .fields
            .iter()
            .enumerate()
            .filter(|(_, f)| query.selects(&f.name))
            .map(|(idx, _)| idx)
            .collect();

        let geometry_type = source.geometry_type.filter(|_| query.read_geometry).map(|t| {
            if query.force_2d {
                GeometryType::new(t.kind, false)
            } else {
                t
            }
        });
        let meta = LayerMeta {
            name: source.name.clone(),
            fields: selected.iter().map(|&i| source.fields[i].clone()).collect(),
            geometry_type,
            crs: source.crs.clone().filter(|_| geometry_type.is_some()),
        };
        sink.begin(&meta)?;

        let matching = source
            .features
            .iter()
            .filter(|f| filter.as_ref().map_or(true, |flt| flt.matches(&f.values)));
        let limit = query.max_features.unwrap_or(usize::MAX);
        for feature in matching.take(limit) {
            let geometry = if geometry_type.is_some() {
                feature.geometry.clone().map(|mut g| {
                    if query.force_2d {
                        g.force_2d();
                    }
                    g
                })
            } else {
                None
            };
            sink.feature(Feature {
                values: selected.iter().map(|&i| feature.values[i].clone()).collect(),
                geometry,
            })?;
        }
        Ok(())
    }

    fn write_layer(
        &self,
        dataset: &DatasetPath,
        definition: &LayerDefinition,
        features: &mut dyn Iterator<Item = Feature>,
    ) -> Result<()> {
        let driver = Driver::by_name(&definition.driver)
            .ok_or_else(|| OgrioError::DriverNotFound(definition.driver.clone()))?;
        let decimal_places = driver.round_trip.decimal_places();
        let native_datetime = driver.caps.contains(DriverCaps::DATETIME);

        let fields = definition
            .fields
            .iter()
            .map(|f| match f.field_type {
                FieldType::DateTime if !native_datetime => FieldDefn::new(&f.name, FieldType::Date),
                _ => f.clone(),
            })
            .collect();
        let mut layer = MemoryLayer::new(&definition.name, definition.geometry_type)
            .with_fields(fields);
        layer.crs = definition.crs.clone();

        for (idx, mut feature) in features.enumerate() {
            if !native_datetime {
                for value in &mut feature.values {
                    if let FieldValue::DateTime(dt) = value {
                        *value = FieldValue::Date(dt.date());
                    }
                }
            }
            if let (Some(places), Some(geometry)) = (decimal_places, feature.geometry.as_mut()) {
                geometry.round_to_decimals(places);
            }
            if layer.geometry_type.is_none() {
                feature.geometry = None;
            }
            layer.push_feature(feature).map_err(|err| OgrioError::Write {
                path: dataset.to_string(),
                msg: format!("feature {idx}: {err}"),
            })?;
        }

        let count = layer.features.len();
        self.insert(
            dataset.clone(),
            MemoryDataset::new(driver.short_name).with_layer(layer),
        );
        debug!(
            "Wrote {count} features to layer '{}' of '{dataset}' ({})",
            definition.name, driver.short_name
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::geometry::{Coord, Geometry, GeometryKind};

    struct Collect {
        meta: Option<LayerMeta>,
        features: Vec<Feature>,
    }

    impl Collect {
        fn new() -> Self {
            Collect {
                meta: None,
                features: Vec::new(),
            }
        }
    }

    impl FeatureSink for Collect {
        fn begin(&mut self, layer: &LayerMeta) -> Result<()> {
            self.meta = Some(layer.clone());
            Ok(())
        }

        fn feature(&mut self, feature: Feature) -> Result<()> {
            self.features.push(feature);
            Ok(())
        }
    }

    fn engine() -> MemoryEngine {
        let mut layer = MemoryLayer::new(
            "points",
            Some(GeometryType::new(GeometryKind::Point, true)),
        )
        .with_crs("EPSG:4326")
        .with_fields(vec![
            FieldDefn::new("id", FieldType::Integer),
            FieldDefn::new("name", FieldType::String),
        ]);
        for (id, name) in [(1, Some("a")), (2, None), (3, Some("c"))] {
            layer
                .push_feature(Feature {
                    values: vec![
                        FieldValue::Integer(id),
                        name.map_or(FieldValue::Null, |n| FieldValue::String(n.to_string())),
                    ],
                    geometry: Some(Geometry::Point(Coord::xyz(id as f64, 0.5, 10.0))),
                })
                .unwrap();
        }
        let engine = MemoryEngine::new();
        engine.insert(
            "/data/points.gpkg",
            MemoryDataset::new("GPKG")
                .with_layer(MemoryLayer::new("empty", None))
                .with_layer(layer),
        );
        engine
    }

    fn read(engine: &MemoryEngine, query: &LayerQuery<'_>) -> Result<Collect> {
        let mut sink = Collect::new();
        engine.read_layer(
            &DatasetPath::new("/data/points.gpkg"),
            &LayerSelector::from("points"),
            query,
            &mut sink,
        )?;
        Ok(sink)
    }

    #[test]
    fn test_list_layers() {
        let layers = engine()
            .list_layers(&DatasetPath::new("/data/points.gpkg"))
            .unwrap();
        let names: Vec<&str> = layers.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["empty", "points"]);
        assert_eq!(layers[0].geometry_type, None);
    }

    #[test]
    fn test_missing_dataset_and_layer() {
        let engine = engine();
        let err = engine
            .list_layers(&DatasetPath::new("/data/nope.gpkg"))
            .unwrap_err();
        assert!(matches!(err, OgrioError::DatasetNotFound { .. }));

        let err = engine
            .read_layer(
                &DatasetPath::new("/data/points.gpkg"),
                &LayerSelector::Index(5),
                &LayerQuery::default(),
                &mut Collect::new(),
            )
            .unwrap_err();
        assert!(matches!(err, OgrioError::LayerNotFound { .. }));
    }

    #[test]
    fn test_filter_then_limit() {
        let query = LayerQuery {
            where_clause: Some("id >= 2"),
            max_features: Some(1),
            read_geometry: true,
            ..Default::default()
        };
        let sink = read(&engine(), &query).unwrap();
        assert_eq!(sink.features.len(), 1);
        assert_eq!(sink.features[0].values[0], FieldValue::Integer(2));
        assert_eq!(sink.meta.unwrap().crs.as_deref(), Some("EPSG:4326"));
    }

    #[test]
    fn test_invalid_filter() {
        let query = LayerQuery {
            where_clause: Some("invalid"),
            ..Default::default()
        };
        let err = read(&engine(), &query).err().unwrap();
        assert!(err.to_string().starts_with("Invalid SQL filter"));
    }

    #[test]
    fn test_column_selection_and_force_2d() {
        let columns = vec!["name".to_string()];
        let query = LayerQuery {
            columns: Some(&columns),
            force_2d: true,
            read_geometry: true,
            ..Default::default()
        };
        let sink = read(&engine(), &query).unwrap();
        let meta = sink.meta.unwrap();
        assert_eq!(meta.fields.len(), 1);
        assert_eq!(meta.fields[0].name, "name");
        assert_eq!(
            meta.geometry_type,
            Some(GeometryType::new(GeometryKind::Point, false))
        );
        assert_eq!(sink.features[1].values, vec![FieldValue::Null]);
        assert_eq!(
            sink.features[2].geometry,
            Some(Geometry::Point(Coord::xy(3.0, 0.5)))
        );
    }

    #[test]
    fn test_no_geometry_no_crs() {
        let sink = read(&engine(), &LayerQuery::default()).unwrap();
        let meta = sink.meta.unwrap();
        assert_eq!(meta.geometry_type, None);
        assert_eq!(meta.crs, None);
        assert!(sink.features.iter().all(|f| f.geometry.is_none()));
    }

    #[test]
    fn test_write_rounds_for_text_drivers() {
        let engine = MemoryEngine::new();
        let definition = LayerDefinition {
            driver: "GeoJSON".to_string(),
            name: "out".to_string(),
            geometry_type: Some(GeometryType::new(GeometryKind::Point, false)),
            ..Default::default()
        };
        let mut features = vec![Feature {
            values: vec![],
            geometry: Some(Geometry::Point(Coord::xy(0.123456789012345678, 1.0))),
        }]
        .into_iter();
        let path = DatasetPath::new("/tmp/out.geojson");
        engine.write_layer(&path, &definition, &mut features).unwrap();

        let stored = engine.get("/tmp/out.geojson").unwrap();
        assert_eq!(stored.driver, "GeoJSON");
        let Some(Geometry::Point(c)) = &stored.layers[0].features[0].geometry else {
            panic!("expected a point");
        };
        assert_ne!(c.x, 0.123456789012345678);
        assert!((c.x - 0.123456789012345678).abs() < 1e-15);
    }

    #[test]
    fn test_write_degrades_datetime_without_native_support() {
        let engine = MemoryEngine::new();
        let definition = LayerDefinition {
            driver: "ESRI Shapefile".to_string(),
            name: "out".to_string(),
            fields: vec![FieldDefn::new("when", FieldType::DateTime)],
            ..Default::default()
        };
        let when = NaiveDate::from_ymd_opt(2020, 5, 6)
            .unwrap()
            .and_hms_opt(7, 8, 9)
            .unwrap();
        let mut features = vec![Feature {
            values: vec![FieldValue::DateTime(when)],
            geometry: None,
        }]
        .into_iter();
        engine
            .write_layer(&DatasetPath::new("/tmp/out.shp"), &definition, &mut features)
            .unwrap();
        let layer = &engine.get("/tmp/out.shp").unwrap().layers[0];
        assert_eq!(layer.fields[0].field_type, FieldType::Date);
        assert_eq!(
            layer.features[0].values[0],
            FieldValue::Date(when.date())
        );
    }

    #[test]
    fn test_failed_write_leaves_nothing_behind() {
        let engine = MemoryEngine::new();
        let definition = LayerDefinition {
            driver: "GPKG".to_string(),
            name: "out".to_string(),
            fields: vec![FieldDefn::new("a", FieldType::Integer64)],
            ..Default::default()
        };
        let mut features = vec![Feature {
            values: vec![],
            geometry: None,
        }]
        .into_iter();
        let err = engine
            .write_layer(&DatasetPath::new("/tmp/out.gpkg"), &definition, &mut features)
            .unwrap_err();
        assert!(matches!(err, OgrioError::Write { .. }));
        assert!(!engine.contains("/tmp/out.gpkg"));

        let definition = LayerDefinition {
            driver: "NotADriver".to_string(),
            ..definition
        };
        let err = engine
            .write_layer(
                &DatasetPath::new("/tmp/out.gpkg"),
                &definition,
                &mut std::iter::empty(),
            )
            .unwrap_err();
        assert!(matches!(err, OgrioError::DriverNotFound(_)));
    }
}
