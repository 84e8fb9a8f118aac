use chrono::NaiveDate;

use super::*;
use crate::geometry::{Geometry, GeometryKind};
use crate::table::{ColumnType, Value, GEOMETRY_COLUMN};
use crate::test_utils::{fixture, TempFixture};

fn countries(options: &ReadOptions) -> Result<Table> {
    read(fixture("countries.geojson").as_path(), options)
}

#[test]
fn test_list_layers() {
    let layers = list_layers(fixture("countries.geojson").as_path()).unwrap();
    assert_eq!(layers.len(), 1);
    assert_eq!(layers[0].name, "countries");
    assert_eq!(
        layers[0].geometry_type,
        Some(GeometryType::new(GeometryKind::Polygon, false))
    );
}

#[test]
fn test_read_columns() {
    let table = countries(&ReadOptions::default()).unwrap();
    assert_eq!(
        table.column_names(),
        vec![
            "POP_EST",
            "CONTINENT",
            "NAME",
            "ISO_A3",
            "GDP_MD_EST",
            "NAME_ZH",
            GEOMETRY_COLUMN
        ]
    );
    assert_eq!(table.len(), 4);
    assert!(table.crs().is_some());
    assert_eq!(table.column_type("POP_EST"), Some(ColumnType::Int64));
    assert_eq!(table.column_type("GDP_MD_EST"), Some(ColumnType::Float64));
}

#[test]
fn test_where() {
    let count = |clause: &str| {
        countries(&ReadOptions::default().where_clause(clause))
            .unwrap()
            .len()
    };
    assert_eq!(count(""), 4);
    assert_eq!(count("ISO_A3 = 'CAN'"), 1);
    assert_eq!(count("ISO_A3 IN ('CAN', 'USA', 'MEX')"), 3);
    assert_eq!(count("POP_EST >= 100000000"), 2);
    assert_eq!(count("ISO_A3 = 'INVALID'"), 0);
}

#[test]
fn test_invalid_filter() {
    let err = countries(&ReadOptions::default().where_clause("invalid")).unwrap_err();
    assert!(matches!(err, OgrioError::InvalidFilter { .. }));
    assert!(err.to_string().starts_with("Invalid SQL filter"));
}

#[test]
fn test_nulls_and_limits() {
    let table = countries(&ReadOptions::default().max_features(3)).unwrap();
    assert_eq!(table.len(), 3);
    assert_eq!(table.value(2, "NAME_ZH"), Some(&Value::Null));
    assert_eq!(table.value(0, "NAME_ZH").and_then(Value::as_str), Some("加拿大"));

    let table = countries(&ReadOptions::default().max_features(0)).unwrap();
    assert!(table.is_empty());
}

#[test]
fn test_no_geometry() {
    let table = countries(
        &ReadOptions::default()
            .read_geometry(false)
            .columns(["ISO_A3", "MISSING"]),
    )
    .unwrap();
    assert_eq!(table.column_names(), vec!["ISO_A3"]);
    assert_eq!(table.crs(), None);
}

#[test]
fn test_missing_dataset_and_layer() {
    let err = read(fixture("nope.geojson").as_path(), &ReadOptions::default()).unwrap_err();
    assert!(matches!(err, OgrioError::DatasetNotFound { .. }));

    let err = countries(&ReadOptions::default().layer("rivers")).unwrap_err();
    assert!(matches!(err, OgrioError::LayerNotFound { .. }));

    let err = countries(&ReadOptions::default().layer(1)).unwrap_err();
    assert!(matches!(err, OgrioError::LayerNotFound { .. }));
}

#[test]
fn test_force_2d() {
    let path = fixture("flowlines.geojson");
    let table = read(path.as_path(), &ReadOptions::default()).unwrap();
    assert_eq!(
        table.geometry_type(),
        Some(GeometryType::new(GeometryKind::LineString, true))
    );
    assert_eq!(table.geometry(0).unwrap().coords().next().unwrap().z, Some(12.5));

    let flat = read(path.as_path(), &ReadOptions::default().force_2d(true)).unwrap();
    let geometry = flat.geometry(0).unwrap();
    assert!(!geometry.has_z());
    let first = geometry.coords().next().unwrap();
    assert_eq!((first.x, first.y), (-73.95, 42.6));
}

#[test]
fn test_datetime() {
    let table = read(fixture("flowlines.geojson").as_path(), &ReadOptions::default()).unwrap();
    assert_eq!(table.column_type("FDate"), Some(ColumnType::Timestamp));
    let expected = NaiveDate::from_ymd_opt(2012, 3, 5)
        .unwrap()
        .and_hms_milli_opt(14, 30, 15, 250)
        .unwrap();
    assert_eq!(
        table.value(0, "FDate").and_then(Value::as_timestamp),
        Some(expected)
    );
    assert_eq!(table.value(1, "GNIS_Name"), Some(&Value::Null));
}

#[test]
fn test_gpkg_round_trip() {
    let table = countries(&ReadOptions::default()).unwrap();
    let temp = TempFixture::empty("countries.gpkg");
    write(&table, temp.path(), &WriteOptions::new("GPKG")).unwrap();

    let layers = list_layers(temp.path()).unwrap();
    assert_eq!(layers[0].name, "countries");

    let back = read(temp.path(), &ReadOptions::default()).unwrap();
    assert_eq!(back.columns(), table.columns());
    assert_eq!(back.rows(), table.rows());

    // writing again replaces the dataset
    write(&table, temp.path(), &WriteOptions::new("GPKG").layer("again")).unwrap();
    let layers = list_layers(temp.path()).unwrap();
    assert_eq!(layers.len(), 1);
    assert_eq!(layers[0].name, "again");
}

#[test]
fn test_write_non_spatial() {
    let mut table = countries(&ReadOptions::default().read_geometry(false)).unwrap();
    table.drop_column("GDP_MD_EST");
    let temp = TempFixture::empty("attributes.gpkg");
    write(&table, temp.path(), &WriteOptions::new("GPKG")).unwrap();

    let layers = list_layers(temp.path()).unwrap();
    assert_eq!(layers[0].geometry_type, None);
    let back = read(temp.path(), &ReadOptions::default()).unwrap();
    assert!(!back.has_geometry());
    assert_eq!(back.len(), 4);
}

#[test]
fn test_write_errors() {
    let table = countries(&ReadOptions::default()).unwrap();
    let temp = TempFixture::empty("countries.gpkg");

    let err = write(&table, temp.path(), &WriteOptions::new("NoSuchDriver")).unwrap_err();
    assert!(matches!(err, OgrioError::DriverNotFound(_)));

    let missing_dir = temp.path().join("missing").join("countries.gpkg");
    let err = write(&table, missing_dir.as_path(), &WriteOptions::new("GPKG")).unwrap_err();
    match err {
        OgrioError::Write { path, .. } => assert!(path.ends_with("countries.gpkg")),
        other => panic!("unexpected error {other:?}"),
    }
    assert!(!missing_dir.exists());
}

#[test]
fn test_engine_builder() {
    let engine = OgrEngine::builder()
        .config_option("OGRIO_BUILDER_OPTION", "YES")
        .build()
        .unwrap();
    assert_eq!(
        config::get_config_option("OGRIO_BUILDER_OPTION", "NO").unwrap(),
        "YES"
    );
    assert_eq!(engine.config_options().len(), 1);
    config::clear_config_option("OGRIO_BUILDER_OPTION").unwrap();

    let adapter = DatasetAdapter::new(engine);
    let table = adapter
        .read(fixture("countries.geojson").as_path(), &ReadOptions::default())
        .unwrap();
    assert!(matches!(table.geometry(0), Some(Geometry::Polygon(_))));
}
