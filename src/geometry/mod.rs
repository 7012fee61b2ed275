//! Geometry reprojection and GeoJSON serialization.
//!
//! The pipeline is decode -> linearize -> reproject -> axis order -> round.
//! Output is deterministic: the same blob and directive always serialize to
//! the same document.

mod decode;
mod linearize;

use serde_json::{Value as JsonValue, json};

use crate::crs::{CrsId, CrsTransform};
use crate::error::Result;

pub(crate) use decode::decode;
#[cfg(test)]
pub(crate) use decode::tests as fixtures;

/// Decimal digits kept for geographic coordinates.
pub const GEOGRAPHIC_PRECISION: u32 = 6;
/// Decimal digits kept for projected coordinates.
pub const PROJECTED_PRECISION: u32 = 2;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
}

/// A linear geometry, expressible in GeoJSON.
#[derive(Clone, Debug, PartialEq)]
pub enum Geometry {
    Point(Option<Coord>),
    LineString(Vec<Coord>),
    Polygon(Vec<Vec<Coord>>),
    MultiPoint(Vec<Coord>),
    MultiLineString(Vec<Vec<Coord>>),
    MultiPolygon(Vec<Vec<Vec<Coord>>>),
    GeometryCollection(Vec<Geometry>),
}

impl Geometry {
    /// Decode a binary geometry and convert it into its linear form.
    pub fn from_blob(blob: &[u8], linearize: bool) -> Result<Self> {
        let decoded = decode(blob)?;
        linearize::to_linear(decoded.geometry, linearize)
    }

    /// Apply `f` to every coordinate in place.
    pub fn try_map_coords<F>(&mut self, f: &mut F) -> Result<()>
    where
        F: FnMut(Coord) -> Result<Coord>,
    {
        fn map_all<F: FnMut(Coord) -> Result<Coord>>(coords: &mut [Coord], f: &mut F) -> Result<()> {
            for c in coords.iter_mut() {
                *c = f(*c)?;
            }
            Ok(())
        }

        match self {
            Geometry::Point(Some(c)) => *c = f(*c)?,
            Geometry::Point(None) => {}
            Geometry::LineString(coords) | Geometry::MultiPoint(coords) => map_all(coords, f)?,
            Geometry::Polygon(rings) | Geometry::MultiLineString(rings) => {
                for ring in rings.iter_mut() {
                    map_all(ring, f)?;
                }
            }
            Geometry::MultiPolygon(polygons) => {
                for rings in polygons.iter_mut() {
                    for ring in rings.iter_mut() {
                        map_all(ring, f)?;
                    }
                }
            }
            Geometry::GeometryCollection(members) => {
                for member in members.iter_mut() {
                    member.try_map_coords(f)?;
                }
            }
        }
        Ok(())
    }

    /// Visit every coordinate.
    pub fn for_each_coord<F: FnMut(&Coord)>(&self, f: &mut F) {
        match self {
            Geometry::Point(Some(c)) => f(c),
            Geometry::Point(None) => {}
            Geometry::LineString(coords) | Geometry::MultiPoint(coords) => coords.iter().for_each(f),
            Geometry::Polygon(rings) | Geometry::MultiLineString(rings) => {
                rings.iter().flatten().for_each(f)
            }
            Geometry::MultiPolygon(polygons) => polygons.iter().flatten().flatten().for_each(f),
            Geometry::GeometryCollection(members) => {
                for member in members {
                    member.for_each_coord(f);
                }
            }
        }
    }

    /// Serialize as a GeoJSON geometry object, rounding to `precision` digits.
    pub fn to_geojson(&self, precision: u32) -> JsonValue {
        let factor = 10f64.powi(precision as i32);
        match self {
            Geometry::Point(coord) => json!({
                "type": "Point",
                "coordinates": coord.map(|c| position(&c, factor)).unwrap_or_else(|| json!([])),
            }),
            Geometry::LineString(coords) => json!({
                "type": "LineString",
                "coordinates": positions(coords, factor),
            }),
            Geometry::Polygon(rings) => json!({
                "type": "Polygon",
                "coordinates": rings.iter().map(|r| positions(r, factor)).collect::<Vec<_>>(),
            }),
            Geometry::MultiPoint(coords) => json!({
                "type": "MultiPoint",
                "coordinates": positions(coords, factor),
            }),
            Geometry::MultiLineString(lines) => json!({
                "type": "MultiLineString",
                "coordinates": lines.iter().map(|l| positions(l, factor)).collect::<Vec<_>>(),
            }),
            Geometry::MultiPolygon(polygons) => json!({
                "type": "MultiPolygon",
                "coordinates": polygons
                    .iter()
                    .map(|rings| rings.iter().map(|r| positions(r, factor)).collect::<Vec<_>>())
                    .collect::<Vec<_>>(),
            }),
            Geometry::GeometryCollection(members) => json!({
                "type": "GeometryCollection",
                "geometries": members.iter().map(|m| m.to_geojson(precision)).collect::<Vec<_>>(),
            }),
        }
    }
}

fn round(v: f64, factor: f64) -> JsonValue {
    let r = (v * factor).round() / factor;
    // Avoid emitting "-0.0".
    let r = if r == 0.0 { 0.0 } else { r };
    serde_json::Number::from_f64(r)
        .map(JsonValue::Number)
        .unwrap_or(JsonValue::Null)
}

fn position(c: &Coord, factor: f64) -> JsonValue {
    let mut out = vec![round(c.x, factor), round(c.y, factor)];
    if let Some(z) = c.z {
        out.push(round(z, factor));
    }
    JsonValue::Array(out)
}

fn positions(coords: &[Coord], factor: f64) -> JsonValue {
    JsonValue::Array(coords.iter().map(|c| position(c, factor)).collect())
}

/// Converts stored geometry blobs into GeoJSON geometry objects.
#[derive(Clone, Copy, Debug)]
pub struct Reprojector {
    linearize: bool,
}

impl Reprojector {
    pub fn new(linearize: bool) -> Self {
        Self { linearize }
    }

    /// Decimal digits used for output in `target`.
    pub fn precision(target: &CrsId, transform: Option<&CrsTransform>) -> u32 {
        let geographic = match transform {
            Some(transform) => target.is_geographic() || transform.target_is_latlong(),
            None => target.is_geographic(),
        };
        if geographic {
            GEOGRAPHIC_PRECISION
        } else {
            PROJECTED_PRECISION
        }
    }

    /// Render `blob` as a GeoJSON geometry in `target`.
    ///
    /// A missing blob renders as `null`. Decode and transform failures are
    /// returned as errors; nothing is emitted for a partially converted geometry.
    pub fn render(
        &self,
        blob: Option<&[u8]>,
        transform: Option<&CrsTransform>,
        target: &CrsId,
    ) -> Result<JsonValue> {
        let Some(blob) = blob else {
            return Ok(JsonValue::Null);
        };

        let mut geometry = Geometry::from_blob(blob, self.linearize)?;

        if let Some(transform) = transform {
            geometry.try_map_coords(&mut |c| {
                let (x, y, z) = transform.apply(c.x, c.y, c.z.unwrap_or(0.0))?;
                Ok(Coord {
                    x,
                    y,
                    z: c.z.map(|_| z),
                })
            })?;
        }

        if target.swaps_axes() {
            geometry.try_map_coords(&mut |c| {
                Ok(Coord {
                    x: c.y,
                    y: c.x,
                    z: c.z,
                })
            })?;
        }

        Ok(geometry.to_geojson(Self::precision(target, transform)))
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{ewkb_point, wkb_circular_string, wkb_from_geometry};
    use super::{Geometry, Reprojector};
    use crate::Result;
    use crate::crs::{CrsId, CrsTransform, CrsTransformSpec};
    use crate::error::FeatureError;
    use geo_types::{LineString, Point};
    use serde_json::json;

    #[test]
    fn epsg_4326_swaps_axes_and_crs84_does_not() -> Result<()> {
        let reprojector = Reprojector::new(true);
        let blob = ewkb_point(4326, 1.0, 2.0);

        let swapped = reprojector.render(Some(&blob), None, &CrsId::epsg(4326))?;
        assert_eq!(swapped, json!({"type": "Point", "coordinates": [2.0, 1.0]}));

        let kept = reprojector.render(Some(&blob), None, &CrsId::crs84())?;
        assert_eq!(kept, json!({"type": "Point", "coordinates": [1.0, 2.0]}));
        Ok(())
    }

    #[test]
    fn precision_depends_on_target_crs() -> Result<()> {
        let reprojector = Reprojector::new(true);
        let blob = wkb_from_geometry(Point::new(1.23456789, -0.0000001));

        let geographic = reprojector.render(Some(&blob), None, &CrsId::crs84())?;
        assert_eq!(geographic["coordinates"], json!([1.234568, 0.0]));

        let projected = reprojector.render(Some(&blob), None, &CrsId::epsg(25832))?;
        assert_eq!(projected["coordinates"], json!([1.23, 0.0]));
        Ok(())
    }

    #[test]
    fn null_blob_renders_null() -> Result<()> {
        let reprojector = Reprojector::new(true);
        assert_eq!(reprojector.render(None, None, &CrsId::crs84())?, json!(null));
        Ok(())
    }

    #[test]
    fn rendering_is_deterministic() -> Result<()> {
        let reprojector = Reprojector::new(true);
        let blob = wkb_circular_string(&[(0.0, 0.0), (1.0, 1.0), (2.0, 0.0)]);
        let a = serde_json::to_string(&reprojector.render(Some(&blob), None, &CrsId::crs84())?)?;
        let b = serde_json::to_string(&reprojector.render(Some(&blob), None, &CrsId::crs84())?)?;
        assert_eq!(a, b);
        assert!(a.starts_with(r#"{"type":"LineString","coordinates":[[0.0,0.0],"#));
        Ok(())
    }

    #[test]
    fn reprojects_before_rounding() -> Result<()> {
        let transform = CrsTransform::from_spec(&CrsTransformSpec {
            source_crs: "+proj=longlat +datum=WGS84 +no_defs".to_string(),
            target_crs: "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 +k=1 +units=m +no_defs".to_string(),
            target_crs_uri: "http://www.opengis.net/def/crs/EPSG/0/3857".to_string(),
        })?;
        let reprojector = Reprojector::new(true);
        let blob = wkb_from_geometry(LineString::from(vec![(0.0, 0.0), (10.0, 0.0)]));

        let rendered =
            reprojector.render(Some(&blob), Some(&transform), transform.target_crs())?;
        assert_eq!(
            rendered["coordinates"],
            json!([[0.0, 0.0], [1113194.91, 0.0]])
        );
        Ok(())
    }

    #[test]
    fn broken_blob_is_an_error() {
        let reprojector = Reprojector::new(true);
        let err = reprojector
            .render(Some(&[0x01, 0x01]), None, &CrsId::crs84())
            .expect_err("truncated blob");
        assert!(err.is_geometry_failure());
    }

    #[test]
    fn curves_fail_without_linearization() {
        let reprojector = Reprojector::new(false);
        let blob = wkb_circular_string(&[(0.0, 0.0), (1.0, 1.0), (2.0, 0.0)]);
        assert!(matches!(
            reprojector.render(Some(&blob), None, &CrsId::crs84()),
            Err(FeatureError::CurvedGeometry)
        ));
    }

    #[test]
    fn empty_point_has_empty_coordinates() {
        let geometry = Geometry::Point(None);
        assert_eq!(
            geometry.to_geojson(6),
            json!({"type": "Point", "coordinates": []})
        );
    }
}
