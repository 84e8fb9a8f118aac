//! Registry of the vector drivers this crate knows how to talk about.
//!
//! The engine decides what is actually available at runtime; this table only
//! records what a caller may expect from a round trip through each format and
//! which file extensions map to it.

use bitflags::bitflags;

use crate::errors::{OgrioError, Result};
use crate::path::DatasetPath;

bitflags! {
    /// What a driver can hold.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct DriverCaps: u8 {
        /// Native datetime fields (otherwise degraded to dates).
        const DATETIME = 0x01;
    }
}

/// What a write followed by a read gives back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoundTrip {
    /// Same values and coordinates, bit for bit.
    Exact,
    /// Coordinates are written as text with at most this many digits after
    /// the decimal point (OGR's `COORDINATE_PRECISION`).
    Approximate { decimal_places: u32 },
    /// Features or ring vertices may come back in another order; no equality
    /// guarantee at all.
    Unordered { decimal_places: u32 },
}

impl RoundTrip {
    /// Decimal places kept for coordinates, `None` when exact.
    pub fn decimal_places(&self) -> Option<u32> {
        match self {
            RoundTrip::Exact => None,
            RoundTrip::Approximate { decimal_places }
            | RoundTrip::Unordered { decimal_places } => Some(*decimal_places),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Driver {
    /// Name passed to the engine, e.g. `"ESRI Shapefile"`.
    pub short_name: &'static str,
    pub extensions: &'static [&'static str],
    pub round_trip: RoundTrip,
    pub caps: DriverCaps,
}

/// Known drivers.
///
/// The GeoJSON entries mirror OGR's default of 15 decimal places. Values whose
/// shortest decimal form is longer than that may still differ in the last bit
/// after a real round trip, so treat the declared precision as approximate.
pub static DRIVERS: &[Driver] = &[
    Driver {
        short_name: "ESRI Shapefile",
        extensions: &["shp", "dbf"],
        round_trip: RoundTrip::Exact,
        caps: DriverCaps::empty(),
    },
    Driver {
        short_name: "GeoJSON",
        extensions: &["geojson", "json"],
        round_trip: RoundTrip::Approximate {
            decimal_places: 15,
        },
        caps: DriverCaps::DATETIME,
    },
    Driver {
        short_name: "GeoJSONSeq",
        extensions: &["geojsons", "geojsonl"],
        round_trip: RoundTrip::Unordered {
            decimal_places: 15,
        },
        caps: DriverCaps::DATETIME,
    },
    Driver {
        short_name: "GPKG",
        extensions: &["gpkg"],
        round_trip: RoundTrip::Exact,
        caps: DriverCaps::all(),
    },
    Driver {
        short_name: "FlatGeobuf",
        extensions: &["fgb"],
        round_trip: RoundTrip::Exact,
        caps: DriverCaps::DATETIME,
    },
];

impl Driver {
    /// Look a driver up by short name, ignoring case.
    pub fn by_name(name: &str) -> Option<&'static Driver> {
        DRIVERS
            .iter()
            .find(|d| d.short_name.eq_ignore_ascii_case(name))
    }

    /// Infer the driver from the extension of `path`.
    pub fn for_path(path: &DatasetPath) -> Result<&'static Driver> {
        let extension = path.extension().ok_or_else(|| {
            OgrioError::BadArgument(format!(
                "cannot infer a driver for '{path}' without a file extension"
            ))
        })?;
        DRIVERS
            .iter()
            .find(|d| d.extensions.contains(&extension.as_str()))
            .ok_or_else(|| {
                OgrioError::BadArgument(format!(
                    "no known driver for extension '.{extension}' of '{path}'"
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_by_name() {
        assert_eq!(Driver::by_name("gpkg").unwrap().short_name, "GPKG");
        assert_eq!(
            Driver::by_name("ESRI Shapefile").unwrap().round_trip,
            RoundTrip::Exact
        );
        assert!(Driver::by_name("KML").is_none());
    }

    #[test]
    fn test_for_path() {
        let driver = Driver::for_path(&DatasetPath::new("/tmp/test.GeoJSON")).unwrap();
        assert_eq!(driver.short_name, "GeoJSON");
        assert_eq!(driver.round_trip.decimal_places(), Some(15));

        let driver = Driver::for_path(&DatasetPath::new("/tmp/test.geojsons")).unwrap();
        assert!(matches!(driver.round_trip, RoundTrip::Unordered { .. }));

        assert!(Driver::for_path(&DatasetPath::new("/tmp/test")).is_err());
        assert!(Driver::for_path(&DatasetPath::new("/tmp/test.xyz")).is_err());
    }

    #[test]
    fn test_caps() {
        let gpkg = Driver::by_name("GPKG").unwrap();
        assert!(gpkg.caps.contains(DriverCaps::DATETIME));
        let shp = Driver::by_name("ESRI Shapefile").unwrap();
        assert!(!shp.caps.contains(DriverCaps::DATETIME));
    }
}
