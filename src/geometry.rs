//! Structured geometry values carried in the geometry column of a [`Table`](crate::Table).
//!
//! Coordinates keep an optional Z so that 3D sources survive a read unchanged.
//! Conversions to and from [`geo_types`] are provided for interop with the rest
//! of the georust ecosystem; `geo-types` is 2D only, so Z is dropped on the way out.

use std::fmt::{self, Display, Formatter};

/// A single coordinate. `z` is `None` for 2D geometries.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
}

impl Coord {
    pub fn xy(x: f64, y: f64) -> Self {
        Coord { x, y, z: None }
    }

    pub fn xyz(x: f64, y: f64, z: f64) -> Self {
        Coord { x, y, z: Some(z) }
    }

    fn map(self, f: &impl Fn(f64) -> f64) -> Coord {
        Coord {
            x: f(self.x),
            y: f(self.y),
            z: self.z.map(f),
        }
    }
}

/// A line string or polygon ring.
pub type Ring = Vec<Coord>;

#[derive(Clone, Debug, PartialEq)]
pub enum Geometry {
    Point(Coord),
    LineString(Ring),
    /// Exterior ring first, then holes.
    Polygon(Vec<Ring>),
    MultiPoint(Vec<Coord>),
    MultiLineString(Vec<Ring>),
    MultiPolygon(Vec<Vec<Ring>>),
    GeometryCollection(Vec<Geometry>),
}

/// The kind of a geometry, without dimensionality.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GeometryKind {
    /// Declared by layers that accept mixed geometry kinds.
    Unknown,
    Point,
    LineString,
    Polygon,
    MultiPoint,
    MultiLineString,
    MultiPolygon,
    GeometryCollection,
}

impl GeometryKind {
    pub fn name(&self) -> &'static str {
        match self {
            GeometryKind::Unknown => "Unknown",
            GeometryKind::Point => "Point",
            GeometryKind::LineString => "LineString",
            GeometryKind::Polygon => "Polygon",
            GeometryKind::MultiPoint => "MultiPoint",
            GeometryKind::MultiLineString => "MultiLineString",
            GeometryKind::MultiPolygon => "MultiPolygon",
            GeometryKind::GeometryCollection => "GeometryCollection",
        }
    }
}

/// A geometry kind plus Z flag, as declared by a layer or carried by a value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GeometryType {
    pub kind: GeometryKind,
    pub has_z: bool,
}

impl GeometryType {
    pub fn new(kind: GeometryKind, has_z: bool) -> Self {
        GeometryType { kind, has_z }
    }

    pub fn unknown() -> Self {
        GeometryType::new(GeometryKind::Unknown, false)
    }
}

impl Display for GeometryType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.has_z {
            write!(f, "{} Z", self.kind.name())
        } else {
            f.write_str(self.kind.name())
        }
    }
}

impl Geometry {
    pub fn kind(&self) -> GeometryKind {
        match self {
            Geometry::Point(_) => GeometryKind::Point,
            Geometry::LineString(_) => GeometryKind::LineString,
            Geometry::Polygon(_) => GeometryKind::Polygon,
            Geometry::MultiPoint(_) => GeometryKind::MultiPoint,
            Geometry::MultiLineString(_) => GeometryKind::MultiLineString,
            Geometry::MultiPolygon(_) => GeometryKind::MultiPolygon,
            Geometry::GeometryCollection(_) => GeometryKind::GeometryCollection,
        }
    }

    pub fn geometry_type(&self) -> GeometryType {
        GeometryType::new(self.kind(), self.has_z())
    }

    /// Visit every coordinate in storage order.
    pub fn coords(&self) -> Box<dyn Iterator<Item = &Coord> + '_> {
        match self {
            Geometry::Point(c) => Box::new(std::iter::once(c)),
            Geometry::LineString(ring) | Geometry::MultiPoint(ring) => Box::new(ring.iter()),
            Geometry::Polygon(rings) | Geometry::MultiLineString(rings) => {
                Box::new(rings.iter().flatten())
            }
            Geometry::MultiPolygon(polygons) => Box::new(polygons.iter().flatten().flatten()),
            Geometry::GeometryCollection(items) => Box::new(items.iter().flat_map(|g| g.coords())),
        }
    }

    pub fn has_z(&self) -> bool {
        self.coords().any(|c| c.z.is_some())
    }

    /// Drop the Z dimension of every coordinate, leaving X/Y untouched.
    pub fn force_2d(&mut self) {
        self.map_coords_in_place(&|c| Coord::xy(c.x, c.y));
    }

    /// Round every ordinate to `places` digits after the decimal point.
    pub fn round_to_decimals(&mut self, places: u32) {
        let scale = 10f64.powi(places.min(300) as i32);
        self.map_coords_in_place(&|c| c.map(&|v| round_decimals(v, scale)));
    }

    fn map_coords_in_place(&mut self, f: &impl Fn(Coord) -> Coord) {
        let ring = |r: &mut Ring| r.iter_mut().for_each(|c| *c = f(*c));
        match self {
            Geometry::Point(c) => *c = f(*c),
            Geometry::LineString(r) | Geometry::MultiPoint(r) => ring(r),
            Geometry::Polygon(rings) | Geometry::MultiLineString(rings) => {
                rings.iter_mut().for_each(ring)
            }
            Geometry::MultiPolygon(polygons) => polygons.iter_mut().flatten().for_each(ring),
            Geometry::GeometryCollection(items) => {
                items.iter_mut().for_each(|g| g.map_coords_in_place(f))
            }
        }
    }

    /// Compare two geometries coordinate by coordinate with a tolerance.
    pub fn approx_eq(&self, other: &Geometry, epsilon: f64) -> bool {
        if self.kind() != other.kind() || self.shape() != other.shape() {
            return false;
        }
        let near = |a: f64, b: f64| (a - b).abs() <= epsilon;
        self.coords().zip(other.coords()).all(|(a, b)| {
            near(a.x, b.x)
                && near(a.y, b.y)
                && match (a.z, b.z) {
                    (Some(za), Some(zb)) => near(za, zb),
                    (None, None) => true,
                    _ => false,
                }
        })
    }

    /// Part and vertex counts, used to check structural equality.
    fn shape(&self) -> Vec<usize> {
        match self {
            Geometry::Point(_) => vec![1],
            Geometry::LineString(r) | Geometry::MultiPoint(r) => vec![r.len()],
            Geometry::Polygon(rings) | Geometry::MultiLineString(rings) => {
                rings.iter().map(Vec::len).collect()
            }
            Geometry::MultiPolygon(polygons) => polygons
                .iter()
                .flat_map(|p| std::iter::once(p.len()).chain(p.iter().map(Vec::len)))
                .collect(),
            Geometry::GeometryCollection(items) => items
                .iter()
                .flat_map(|g| std::iter::once(g.coords().count()).chain(g.shape()))
                .collect(),
        }
    }
}

/// 2^52: from here on an `f64` has no fractional bits left.
const INTEGRAL_LIMIT: f64 = 4_503_599_627_370_496.0;

fn round_decimals(value: f64, scale: f64) -> f64 {
    let scaled = value * scale;
    // already coarser than the requested precision
    if !scaled.is_finite() || scaled.abs() >= INTEGRAL_LIMIT {
        return value;
    }
    scaled.round() / scale
}

impl From<&Coord> for geo_types::Coord<f64> {
    fn from(c: &Coord) -> Self {
        geo_types::Coord { x: c.x, y: c.y }
    }
}

impl From<geo_types::Coord<f64>> for Coord {
    fn from(c: geo_types::Coord<f64>) -> Self {
        Coord::xy(c.x, c.y)
    }
}

fn to_geo_line(ring: &[Coord]) -> geo_types::LineString<f64> {
    geo_types::LineString(ring.iter().map(Into::into).collect())
}

fn to_geo_polygon(rings: &[Ring]) -> geo_types::Polygon<f64> {
    let mut rings = rings.iter().map(|r| to_geo_line(r));
    let exterior = rings
        .next()
        .unwrap_or_else(|| geo_types::LineString(Vec::new()));
    geo_types::Polygon::new(exterior, rings.collect())
}

fn from_geo_line(line: geo_types::LineString<f64>) -> Ring {
    line.0.into_iter().map(Into::into).collect()
}

fn from_geo_polygon(polygon: geo_types::Polygon<f64>) -> Vec<Ring> {
    let (exterior, interiors) = polygon.into_inner();
    std::iter::once(exterior)
        .chain(interiors)
        .map(from_geo_line)
        .collect()
}

impl From<&Geometry> for geo_types::Geometry<f64> {
    fn from(geometry: &Geometry) -> Self {
        match geometry {
            Geometry::Point(c) => geo_types::Geometry::Point(geo_types::Point(c.into())),
            Geometry::LineString(r) => geo_types::Geometry::LineString(to_geo_line(r)),
            Geometry::Polygon(rings) => geo_types::Geometry::Polygon(to_geo_polygon(rings)),
            Geometry::MultiPoint(points) => geo_types::Geometry::MultiPoint(geo_types::MultiPoint(
                points.iter().map(|c| geo_types::Point(c.into())).collect(),
            )),
            Geometry::MultiLineString(lines) => geo_types::Geometry::MultiLineString(
                geo_types::MultiLineString(lines.iter().map(|l| to_geo_line(l)).collect()),
            ),
            Geometry::MultiPolygon(polygons) => geo_types::Geometry::MultiPolygon(
                geo_types::MultiPolygon(polygons.iter().map(|p| to_geo_polygon(p)).collect()),
            ),
            Geometry::GeometryCollection(items) => geo_types::Geometry::GeometryCollection(
                geo_types::GeometryCollection(items.iter().map(Into::into).collect()),
            ),
        }
    }
}

impl From<geo_types::Geometry<f64>> for Geometry {
    fn from(geometry: geo_types::Geometry<f64>) -> Self {
        match geometry {
            geo_types::Geometry::Point(p) => Geometry::Point(p.0.into()),
            geo_types::Geometry::LineString(l) => Geometry::LineString(from_geo_line(l)),
            geo_types::Geometry::Polygon(p) => Geometry::Polygon(from_geo_polygon(p)),
            geo_types::Geometry::MultiPoint(mp) => {
                Geometry::MultiPoint(mp.0.into_iter().map(|p| p.0.into()).collect())
            }
            geo_types::Geometry::MultiLineString(ml) => {
                Geometry::MultiLineString(ml.0.into_iter().map(from_geo_line).collect())
            }
            geo_types::Geometry::MultiPolygon(mp) => {
                Geometry::MultiPolygon(mp.0.into_iter().map(from_geo_polygon).collect())
            }
            geo_types::Geometry::GeometryCollection(gc) => {
                Geometry::GeometryCollection(gc.0.into_iter().map(Geometry::from).collect())
            }
            geo_types::Geometry::Line(l) => {
                Geometry::LineString(vec![l.start.into(), l.end.into()])
            }
            geo_types::Geometry::Rect(r) => Geometry::Polygon(from_geo_polygon(r.to_polygon())),
            geo_types::Geometry::Triangle(t) => {
                Geometry::Polygon(from_geo_polygon(t.to_polygon()))
            }
        }
    }
}
