use crate::engine::LayerSelector;

/// Options for [`DatasetAdapter::read`](crate::DatasetAdapter::read).
///
/// ```
/// use ogrio::ReadOptions;
///
/// let options = ReadOptions::default()
///     .layer("countries")
///     .columns(["ISO_A3", "POP_EST"])
///     .where_clause("POP_EST > 1000000")
///     .force_2d(true);
/// assert!(options.read_geometry);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct ReadOptions {
    /// The layer to read. Defaults to the first layer.
    pub layer: LayerSelector,
    /// Attribute fields to return, `None` for all. Output keeps source order.
    pub columns: Option<Vec<String>>,
    /// Append a geometry column. Defaults to `true`.
    pub read_geometry: bool,
    /// Strip Z from every geometry.
    pub force_2d: bool,
    /// Attribute filter in OGR SQL. Empty means no filter.
    pub where_clause: Option<String>,
    /// Upper bound on the number of rows, applied after filtering.
    pub max_features: Option<usize>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        ReadOptions {
            layer: LayerSelector::default(),
            columns: None,
            read_geometry: true,
            force_2d: false,
            where_clause: None,
            max_features: None,
        }
    }
}

impl ReadOptions {
    pub fn layer(mut self, layer: impl Into<LayerSelector>) -> Self {
        self.layer = layer.into();
        self
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn read_geometry(mut self, read_geometry: bool) -> Self {
        self.read_geometry = read_geometry;
        self
    }

    pub fn force_2d(mut self, force_2d: bool) -> Self {
        self.force_2d = force_2d;
        self
    }

    pub fn where_clause(mut self, where_clause: impl Into<String>) -> Self {
        self.where_clause = Some(where_clause.into());
        self
    }

    pub fn max_features(mut self, max_features: usize) -> Self {
        self.max_features = Some(max_features);
        self
    }
}

/// Options for [`DatasetAdapter::write`](crate::DatasetAdapter::write).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WriteOptions {
    /// Short name of the output driver, e.g. `"GPKG"`.
    pub driver: String,
    /// Layer name. Defaults to the file stem of the destination.
    pub layer: Option<String>,
    /// Driver-specific dataset creation options, as `(KEY, VALUE)` pairs.
    pub dataset_options: Vec<(String, String)>,
    /// Driver-specific layer creation options, as `(KEY, VALUE)` pairs.
    pub layer_options: Vec<(String, String)>,
}

impl WriteOptions {
    pub fn new(driver: impl Into<String>) -> Self {
        WriteOptions {
            driver: driver.into(),
            ..Default::default()
        }
    }

    pub fn layer(mut self, layer: impl Into<String>) -> Self {
        self.layer = Some(layer.into());
        self
    }

    pub fn dataset_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.dataset_options.push((key.into(), value.into()));
        self
    }

    pub fn layer_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.layer_options.push((key.into(), value.into()));
        self
    }
}
