//! Conversion between OGR geometry handles and [`Geometry`] values.

use std::ptr;

use gdal_sys::{OGRErr, OGRGeometryH, OGRwkbGeometryType};

use crate::errors::{OgrioError, Result};
use crate::geometry::{Coord, Geometry, GeometryKind, GeometryType, Ring};
use crate::ogr::utils::{_last_null_pointer_err, _string};

fn type_name(ogr_type: OGRwkbGeometryType::Type) -> String {
    _string(unsafe { gdal_sys::OGRGeometryTypeToName(ogr_type) })
}

fn kind_of(flat: OGRwkbGeometryType::Type) -> Option<GeometryKind> {
    let kind = match flat {
        OGRwkbGeometryType::wkbUnknown => GeometryKind::Unknown,
        OGRwkbGeometryType::wkbPoint => GeometryKind::Point,
        OGRwkbGeometryType::wkbLineString => GeometryKind::LineString,
        OGRwkbGeometryType::wkbPolygon => GeometryKind::Polygon,
        OGRwkbGeometryType::wkbMultiPoint => GeometryKind::MultiPoint,
        OGRwkbGeometryType::wkbMultiLineString => GeometryKind::MultiLineString,
        OGRwkbGeometryType::wkbMultiPolygon => GeometryKind::MultiPolygon,
        OGRwkbGeometryType::wkbGeometryCollection => GeometryKind::GeometryCollection,
        _ => return None,
    };
    Some(kind)
}

/// Geometry type declared by a layer. `None` for non-spatial layers; kinds
/// without a table counterpart (curves, surfaces...) are reported as `Unknown`.
pub(crate) fn layer_geometry_type(ogr_type: OGRwkbGeometryType::Type) -> Option<GeometryType> {
    if ogr_type == OGRwkbGeometryType::wkbNone {
        return None;
    }
    let flat = unsafe { gdal_sys::OGR_GT_Flatten(ogr_type) };
    let has_z = unsafe { gdal_sys::OGR_GT_HasZ(ogr_type) } != 0;
    Some(GeometryType::new(
        kind_of(flat).unwrap_or(GeometryKind::Unknown),
        has_z,
    ))
}

/// The OGR type a layer is created with.
pub(crate) fn ogr_geometry_type(geometry_type: Option<GeometryType>) -> OGRwkbGeometryType::Type {
    let Some(geometry_type) = geometry_type else {
        return OGRwkbGeometryType::wkbNone;
    };
    let flat = match geometry_type.kind {
        GeometryKind::Unknown => OGRwkbGeometryType::wkbUnknown,
        GeometryKind::Point => OGRwkbGeometryType::wkbPoint,
        GeometryKind::LineString => OGRwkbGeometryType::wkbLineString,
        GeometryKind::Polygon => OGRwkbGeometryType::wkbPolygon,
        GeometryKind::MultiPoint => OGRwkbGeometryType::wkbMultiPoint,
        GeometryKind::MultiLineString => OGRwkbGeometryType::wkbMultiLineString,
        GeometryKind::MultiPolygon => OGRwkbGeometryType::wkbMultiPolygon,
        GeometryKind::GeometryCollection => OGRwkbGeometryType::wkbGeometryCollection,
    };
    if geometry_type.has_z {
        unsafe { gdal_sys::OGR_GT_SetZ(flat) }
    } else {
        flat
    }
}

/// Decode a geometry owned by a feature.
///
/// Empty points have no coordinate to hold and decode as `None`.
///
/// # Safety
/// `c_geom` must be a valid geometry handle.
pub(crate) unsafe fn decode(c_geom: OGRGeometryH) -> Result<Option<Geometry>> {
    let flat = gdal_sys::OGR_GT_Flatten(gdal_sys::OGR_G_GetGeometryType(c_geom));
    if flat == OGRwkbGeometryType::wkbPoint && gdal_sys::OGR_G_IsEmpty(c_geom) != 0 {
        return Ok(None);
    }
    decode_inner(c_geom).map(Some)
}

unsafe fn decode_inner(c_geom: OGRGeometryH) -> Result<Geometry> {
    let ogr_type = gdal_sys::OGR_G_GetGeometryType(c_geom);
    let flat = gdal_sys::OGR_GT_Flatten(ogr_type);
    let geometry = match flat {
        OGRwkbGeometryType::wkbPoint => {
            let coords = points(c_geom);
            match coords.first() {
                Some(c) => Geometry::Point(*c),
                None => {
                    return Err(OgrioError::UnsupportedGeometry(
                        "empty point inside a collection".to_string(),
                    ))
                }
            }
        }
        OGRwkbGeometryType::wkbLineString | OGRwkbGeometryType::wkbLinearRing => {
            Geometry::LineString(points(c_geom))
        }
        OGRwkbGeometryType::wkbPolygon => Geometry::Polygon(rings(c_geom)),
        OGRwkbGeometryType::wkbMultiPoint => Geometry::MultiPoint(
            parts(c_geom)
                .into_iter()
                .flat_map(|part| points(part))
                .collect(),
        ),
        OGRwkbGeometryType::wkbMultiLineString => {
            Geometry::MultiLineString(parts(c_geom).into_iter().map(|p| points(p)).collect())
        }
        OGRwkbGeometryType::wkbMultiPolygon => {
            Geometry::MultiPolygon(parts(c_geom).into_iter().map(|p| rings(p)).collect())
        }
        OGRwkbGeometryType::wkbGeometryCollection => Geometry::GeometryCollection(
            parts(c_geom)
                .into_iter()
                .map(|p| decode_inner(p))
                .collect::<Result<Vec<_>>>()?,
        ),
        _ => return Err(OgrioError::UnsupportedGeometry(type_name(ogr_type))),
    };
    Ok(geometry)
}

unsafe fn points(c_geom: OGRGeometryH) -> Ring {
    let has_z = gdal_sys::OGR_G_Is3D(c_geom) != 0;
    let count = gdal_sys::OGR_G_GetPointCount(c_geom);
    (0..count)
        .map(|i| {
            let (mut x, mut y, mut z) = (0.0, 0.0, 0.0);
            gdal_sys::OGR_G_GetPoint(c_geom, i, &mut x, &mut y, &mut z);
            if has_z {
                Coord::xyz(x, y, z)
            } else {
                Coord::xy(x, y)
            }
        })
        .collect()
}

unsafe fn parts(c_geom: OGRGeometryH) -> Vec<OGRGeometryH> {
    let count = gdal_sys::OGR_G_GetGeometryCount(c_geom);
    (0..count)
        .map(|i| gdal_sys::OGR_G_GetGeometryRef(c_geom, i))
        .filter(|part| !part.is_null())
        .collect()
}

unsafe fn rings(c_polygon: OGRGeometryH) -> Vec<Ring> {
    parts(c_polygon).into_iter().map(|r| points(r)).collect()
}

/// A geometry built on the Rust side, destroyed unless handed over to GDAL.
#[derive(Debug)]
pub(crate) struct OwnedGeometry {
    c_geom: OGRGeometryH,
}

impl Drop for OwnedGeometry {
    fn drop(&mut self) {
        if !self.c_geom.is_null() {
            unsafe { gdal_sys::OGR_G_DestroyGeometry(self.c_geom) };
        }
    }
}

impl OwnedGeometry {
    fn empty(ogr_type: OGRwkbGeometryType::Type) -> Result<OwnedGeometry> {
        let c_geom = unsafe { gdal_sys::OGR_G_CreateGeometry(ogr_type) };
        if c_geom.is_null() {
            return Err(_last_null_pointer_err("OGR_G_CreateGeometry"));
        }
        Ok(OwnedGeometry { c_geom })
    }

    /// Give up ownership, e.g. to `OGR_F_SetGeometryDirectly`.
    pub fn into_c_geometry(mut self) -> OGRGeometryH {
        std::mem::replace(&mut self.c_geom, ptr::null_mut())
    }

    fn add_points(&mut self, coords: &[Coord]) {
        for c in coords {
            match c.z {
                Some(z) => unsafe { gdal_sys::OGR_G_AddPoint(self.c_geom, c.x, c.y, z) },
                None => unsafe { gdal_sys::OGR_G_AddPoint_2D(self.c_geom, c.x, c.y) },
            }
        }
    }

    fn add_part(&mut self, part: OwnedGeometry) -> Result<()> {
        let rv = unsafe { gdal_sys::OGR_G_AddGeometryDirectly(self.c_geom, part.into_c_geometry()) };
        if rv != OGRErr::OGRERR_NONE {
            return Err(OgrioError::OgrError {
                err: rv,
                method_name: "OGR_G_AddGeometryDirectly",
            });
        }
        Ok(())
    }

    fn line(ogr_type: OGRwkbGeometryType::Type, coords: &[Coord]) -> Result<OwnedGeometry> {
        let mut geom = Self::empty(ogr_type)?;
        geom.add_points(coords);
        Ok(geom)
    }

    fn polygon(rings: &[Ring]) -> Result<OwnedGeometry> {
        let mut geom = Self::empty(OGRwkbGeometryType::wkbPolygon)?;
        for ring in rings {
            geom.add_part(Self::line(OGRwkbGeometryType::wkbLinearRing, ring)?)?;
        }
        Ok(geom)
    }

    pub fn encode(geometry: &Geometry) -> Result<OwnedGeometry> {
        match geometry {
            Geometry::Point(c) => Self::line(OGRwkbGeometryType::wkbPoint, std::slice::from_ref(c)),
            Geometry::LineString(coords) => Self::line(OGRwkbGeometryType::wkbLineString, coords),
            Geometry::Polygon(rings) => Self::polygon(rings),
            Geometry::MultiPoint(coords) => {
                let mut geom = Self::empty(OGRwkbGeometryType::wkbMultiPoint)?;
                for c in coords {
                    geom.add_part(Self::line(
                        OGRwkbGeometryType::wkbPoint,
                        std::slice::from_ref(c),
                    )?)?;
                }
                Ok(geom)
            }
            Geometry::MultiLineString(lines) => {
                let mut geom = Self::empty(OGRwkbGeometryType::wkbMultiLineString)?;
                for line in lines {
                    geom.add_part(Self::line(OGRwkbGeometryType::wkbLineString, line)?)?;
                }
                Ok(geom)
            }
            Geometry::MultiPolygon(polygons) => {
                let mut geom = Self::empty(OGRwkbGeometryType::wkbMultiPolygon)?;
                for rings in polygons {
                    geom.add_part(Self::polygon(rings)?)?;
                }
                Ok(geom)
            }
            Geometry::GeometryCollection(items) => {
                let mut geom = Self::empty(OGRwkbGeometryType::wkbGeometryCollection)?;
                for item in items {
                    geom.add_part(Self::encode(item)?)?;
                }
                Ok(geom)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(geometry: &Geometry) -> Geometry {
        let owned = OwnedGeometry::encode(geometry).unwrap();
        unsafe { decode(owned.c_geom) }.unwrap().unwrap()
    }

    #[test]
    fn test_encode_decode() {
        let polygon = Geometry::Polygon(vec![
            vec![
                Coord::xy(0.0, 0.0),
                Coord::xy(4.0, 0.0),
                Coord::xy(4.0, 4.0),
                Coord::xy(0.0, 0.0),
            ],
            vec![
                Coord::xy(1.0, 1.0),
                Coord::xy(2.0, 1.0),
                Coord::xy(2.0, 2.0),
                Coord::xy(1.0, 1.0),
            ],
        ]);
        assert_eq!(round_trip(&polygon), polygon);

        let lines = Geometry::MultiLineString(vec![vec![
            Coord::xyz(0.0, 0.0, 1.0),
            Coord::xyz(1.0, 1.0, 2.0),
        ]]);
        assert_eq!(round_trip(&lines), lines);

        let collection = Geometry::GeometryCollection(vec![
            Geometry::Point(Coord::xy(1.0, 2.0)),
            Geometry::MultiPoint(vec![Coord::xy(3.0, 4.0), Coord::xy(5.0, 6.0)]),
        ]);
        assert_eq!(round_trip(&collection), collection);
    }

    #[test]
    fn test_empty_point_is_none() {
        let empty = OwnedGeometry::empty(OGRwkbGeometryType::wkbPoint).unwrap();
        assert_eq!(unsafe { decode(empty.c_geom) }.unwrap(), None);
    }

    #[test]
    fn test_unsupported_geometry() {
        let curve = OwnedGeometry::empty(OGRwkbGeometryType::wkbCircularString).unwrap();
        let err = unsafe { decode(curve.c_geom) }.unwrap_err();
        assert!(matches!(err, OgrioError::UnsupportedGeometry(_)));
    }

    #[test]
    fn test_layer_types() {
        assert_eq!(layer_geometry_type(OGRwkbGeometryType::wkbNone), None);
        let line_z = GeometryType::new(GeometryKind::LineString, true);
        assert_eq!(
            layer_geometry_type(ogr_geometry_type(Some(line_z))),
            Some(line_z)
        );
        assert_eq!(
            layer_geometry_type(OGRwkbGeometryType::wkbCurvePolygon),
            Some(GeometryType::unknown())
        );
    }
}
