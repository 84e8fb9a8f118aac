use chrono::NaiveDate;

use crate::adapter::DatasetAdapter;
use crate::engine::memory::{MemoryDataset, MemoryEngine, MemoryLayer};
use crate::engine::{Feature, FieldDefn, FieldType, FieldValue};
use crate::geometry::{Coord, Geometry, GeometryKind, GeometryType};

#[cfg(feature = "ogr")]
use std::path::{Path, PathBuf};

pub const NATURALEARTH: &str = "/fixtures/naturalearth_lowres.shp";
pub const NHD_HR: &str = "/fixtures/nhd_hr.gpkg";

/// Number of countries in [`NATURALEARTH`].
pub const COUNTRY_COUNT: usize = 177;

/// A struct that contains a temporary directory and a path to a file in that directory.
#[cfg(feature = "ogr")]
pub struct TempFixture {
    _temp_dir: tempfile::TempDir,
    temp_path: PathBuf,
}

#[cfg(feature = "ogr")]
impl TempFixture {
    /// Creates a temporary directory and path to a non-existent file with given `name`.
    /// Useful for writing results to during testing.
    pub fn empty(name: &str) -> Self {
        let _temp_dir = tempfile::tempdir().unwrap();
        let temp_path = _temp_dir.path().join(name);
        Self {
            _temp_dir,
            temp_path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.temp_path
    }
}

/// Returns the fully qualified path to `filename` in `${CARGO_MANIFEST_DIR}/fixtures`.
#[cfg(feature = "ogr")]
pub fn fixture(filename: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("fixtures")
        .join(filename)
}

/// Assert numerical difference between two expressions is less than
/// 64-bit machine epsilon or a specified epsilon.
macro_rules! assert_near {
    ($left:expr, $right:expr) => {
        assert_near!($left, $right, epsilon = f64::EPSILON)
    };
    ($left:expr, $right:expr, epsilon = $ep:expr) => {
        assert!(
            ($left - $right).abs() < $ep,
            "|{} - {}| = {} is greater than epsilon {:.4e}",
            $left,
            $right,
            ($left - $right).abs(),
            $ep
        )
    };
}
pub(crate) use assert_near;

fn square(x: f64, y: f64, size: f64) -> Vec<Coord> {
    vec![
        Coord::xy(x, y),
        Coord::xy(x + size, y),
        Coord::xy(x + size, y + size),
        Coord::xy(x, y + size),
        Coord::xy(x, y),
    ]
}

fn text(value: &str) -> FieldValue {
    FieldValue::String(value.to_string())
}

/// A 177 country layer shaped like Natural Earth's low resolution countries.
///
/// Exactly 75 countries have `POP_EST` in `[10_000_000, 100_000_000)`, each
/// ISO code is unique and some `NAME_ZH` values are null.
pub fn naturalearth_lowres() -> MemoryDataset {
    let mut layer = MemoryLayer::new(
        "naturalearth_lowres",
        Some(GeometryType::new(GeometryKind::MultiPolygon, false)),
    )
    .with_crs("EPSG:4326")
    .with_fields(vec![
        FieldDefn::new("POP_EST", FieldType::Integer64),
        FieldDefn::new("CONTINENT", FieldType::String),
        FieldDefn::new("NAME", FieldType::String),
        FieldDefn::new("ISO_A3", FieldType::String),
        FieldDefn::new("GDP_MD_EST", FieldType::Real),
        FieldDefn::new("NAME_ZH", FieldType::String),
    ]);

    let known = [
        (35_623_680, "North America", "Canada", "CAN", 1_674_000.0, Some("加拿大")),
        (326_625_791, "North America", "United States of America", "USA", 18_560_000.0, Some("美国")),
        (124_574_795, "North America", "Mexico", "MEX", 2_307_000.0, Some("墨西哥")),
    ];
    let mut rows: Vec<(i64, &str, String, String, f64, Option<&str>)> = known
        .iter()
        .map(|(pop, continent, name, iso, gdp, zh)| {
            (*pop, *continent, name.to_string(), iso.to_string(), *gdp, *zh)
        })
        .collect();

    let continents = ["Africa", "Asia", "Europe", "Oceania", "South America"];
    for i in 0..COUNTRY_COUNT - known.len() {
        // 74 countries in range, together with Canada that makes 75
        let pop = match i {
            0..=73 => 10_000_000 + i as i64 * 1_000_000,
            74..=79 => 150_000_000 + i as i64 * 10_000_000,
            _ => 5_000 + i as i64 * 40_000,
        };
        let iso = format!(
            "Z{}{}",
            (b'A' + (i / 26) as u8) as char,
            (b'A' + (i % 26) as u8) as char
        );
        let zh = (i % 10 != 0).then_some("国家");
        rows.push((
            pop,
            continents[i % continents.len()],
            format!("Country {iso}"),
            iso,
            pop as f64 * 0.0125,
            zh,
        ));
    }

    for (i, (pop, continent, name, iso, gdp, zh)) in rows.into_iter().enumerate() {
        let x = -180.0 + (i % 36) as f64 * 10.0;
        let y = -80.0 + (i / 36) as f64 * 20.0;
        layer
            .push_feature(Feature {
                values: vec![
                    FieldValue::Integer(pop),
                    text(continent),
                    FieldValue::String(name),
                    FieldValue::String(iso),
                    FieldValue::Real(gdp),
                    zh.map_or(FieldValue::Null, text),
                ],
                geometry: Some(Geometry::MultiPolygon(vec![
                    vec![square(x, y, 5.0), square(x + 1.0, y + 1.0, 1.5)],
                    vec![square(x + 6.0, y + 6.0, 2.123456789012345)],
                ])),
            })
            .unwrap();
    }
    MemoryDataset::new("ESRI Shapefile").with_layer(layer)
}

/// Three layers shaped like the NHDPlus HR hydrography package: an empty
/// non-spatial table, 3D flowlines with a datetime field, and basin polygons.
pub fn nhd_hr() -> MemoryDataset {
    let empty = MemoryLayer::new("NHDPlusFlow", None).with_fields(vec![
        FieldDefn::new("FromNHDPID", FieldType::Real),
        FieldDefn::new("ToNHDPID", FieldType::Real),
    ]);

    let mut flowlines = MemoryLayer::new(
        "NHDFlowline",
        Some(GeometryType::new(GeometryKind::MultiLineString, true)),
    )
    .with_crs("EPSG:4269")
    .with_fields(vec![
        FieldDefn::new("Permanent_Identifier", FieldType::String),
        FieldDefn::new("FDate", FieldType::DateTime),
        FieldDefn::new("LengthKM", FieldType::Real),
        FieldDefn::new("GNIS_Name", FieldType::String),
        FieldDefn::new("FType", FieldType::Integer),
    ]);
    for i in 0..10 {
        let fdate = NaiveDate::from_ymd_opt(2011, 1 + i % 12, 5)
            .unwrap()
            .and_hms_milli_opt(9, 30, 15, 250)
            .unwrap();
        let x = -86.5 + f64::from(i) * 0.01;
        flowlines
            .push_feature(Feature {
                values: vec![
                    text(&format!("{{{:08}-FLOW}}", 149_000_000 + i)),
                    FieldValue::DateTime(fdate),
                    FieldValue::Real(0.25 + f64::from(i) / 100.0),
                    if i % 3 == 0 {
                        FieldValue::Null
                    } else {
                        text("Tombigbee River")
                    },
                    FieldValue::Integer(460),
                ],
                geometry: Some(Geometry::MultiLineString(vec![vec![
                    Coord::xyz(x, 34.1, 120.0),
                    Coord::xyz(x + 0.004, 34.105, 118.5),
                    Coord::xyz(x + 0.009, 34.11, 117.25),
                ]])),
            })
            .unwrap();
    }

    let mut basins = MemoryLayer::new(
        "WBDHU2",
        Some(GeometryType::new(GeometryKind::MultiPolygon, false)),
    )
    .with_crs("EPSG:4269")
    .with_fields(vec![
        FieldDefn::new("HUC2", FieldType::String),
        FieldDefn::new("Name", FieldType::String),
        FieldDefn::new("LoadDate", FieldType::DateTime),
    ]);
    basins
        .push_feature(Feature {
            values: vec![
                text("03"),
                text("South Atlantic-Gulf Region"),
                FieldValue::DateTimeTz(
                    NaiveDate::from_ymd_opt(2019, 3, 1)
                        .unwrap()
                        .and_hms_opt(12, 0, 0)
                        .unwrap()
                        .and_local_timezone(chrono::FixedOffset::west_opt(5 * 3600).unwrap())
                        .unwrap(),
                ),
            ],
            geometry: Some(Geometry::MultiPolygon(vec![vec![square(-88.0, 30.0, 4.0)]])),
        })
        .unwrap();

    MemoryDataset::new("GPKG")
        .with_layer(empty)
        .with_layer(flowlines)
        .with_layer(basins)
}

/// An adapter over a memory engine holding [`NATURALEARTH`] and [`NHD_HR`].
pub fn fixture_adapter() -> DatasetAdapter<MemoryEngine> {
    let engine = MemoryEngine::new();
    engine.insert(NATURALEARTH, naturalearth_lowres());
    engine.insert(NHD_HR, nhd_hr());
    DatasetAdapter::new(engine)
}
