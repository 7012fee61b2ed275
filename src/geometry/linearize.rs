use std::f64::consts::{PI, TAU};

use crate::error::{FeatureError, Result};

use super::decode::RawGeometry;
use super::{Coord, Geometry};

/// Largest angle swept by one straight segment of a linearized arc.
const MAX_SEGMENT_ANGLE: f64 = 4.0 * PI / 180.0;

/// Convert a decoded geometry into its linear form.
///
/// Circular arcs are replaced with chords when `linearize` is set; otherwise
/// any arc is an error since the output format has no curve types.
pub(crate) fn to_linear(raw: RawGeometry, linearize: bool) -> Result<Geometry> {
    if !linearize && raw.has_curves() {
        return Err(FeatureError::CurvedGeometry);
    }
    convert(raw)
}

fn convert(raw: RawGeometry) -> Result<Geometry> {
    let geometry = match raw {
        RawGeometry::Point(coord) => Geometry::Point(coord),
        RawGeometry::LineString(_)
        | RawGeometry::CircularString(_)
        | RawGeometry::CompoundCurve(_) => Geometry::LineString(curve_coords(raw)?),
        RawGeometry::Polygon(rings) => Geometry::Polygon(rings),
        RawGeometry::CurvePolygon(rings) => Geometry::Polygon(
            rings
                .into_iter()
                .map(curve_coords)
                .collect::<Result<Vec<_>>>()?,
        ),
        RawGeometry::MultiPoint(points) => Geometry::MultiPoint(
            points
                .into_iter()
                .filter_map(|point| match point {
                    RawGeometry::Point(coord) => coord,
                    _ => None,
                })
                .collect(),
        ),
        RawGeometry::MultiLineString(lines) | RawGeometry::MultiCurve(lines) => {
            Geometry::MultiLineString(
                lines
                    .into_iter()
                    .map(curve_coords)
                    .collect::<Result<Vec<_>>>()?,
            )
        }
        RawGeometry::MultiPolygon(polygons) | RawGeometry::MultiSurface(polygons) => {
            let mut out = Vec::with_capacity(polygons.len());
            for polygon in polygons {
                match convert(polygon)? {
                    Geometry::Polygon(rings) => out.push(rings),
                    other => {
                        return Err(FeatureError::InvalidGeometry(format!(
                            "surface member is not a polygon: {other:?}"
                        )));
                    }
                }
            }
            Geometry::MultiPolygon(out)
        }
        RawGeometry::GeometryCollection(members) => Geometry::GeometryCollection(
            members
                .into_iter()
                .map(convert)
                .collect::<Result<Vec<_>>>()?,
        ),
    };
    Ok(geometry)
}

/// Flatten any curve (linear, circular or compound) into a coordinate list.
fn curve_coords(curve: RawGeometry) -> Result<Vec<Coord>> {
    match curve {
        RawGeometry::LineString(coords) => Ok(coords),
        RawGeometry::CircularString(coords) => circular_string_coords(&coords),
        RawGeometry::CompoundCurve(parts) => {
            let mut out: Vec<Coord> = Vec::new();
            for part in parts {
                let coords = curve_coords(part)?;
                let skip = match (out.last(), coords.first()) {
                    (Some(last), Some(first)) if last == first => 1,
                    _ => 0,
                };
                out.extend(coords.into_iter().skip(skip));
            }
            Ok(out)
        }
        other => Err(FeatureError::InvalidGeometry(format!(
            "expected a curve, got {other:?}"
        ))),
    }
}

fn circular_string_coords(coords: &[Coord]) -> Result<Vec<Coord>> {
    if coords.is_empty() {
        return Ok(Vec::new());
    }
    if coords.len() < 3 || coords.len() % 2 == 0 {
        return Err(FeatureError::InvalidGeometry(format!(
            "circular string needs an odd number of at least 3 points, got {}",
            coords.len()
        )));
    }

    let mut out = vec![coords[0]];
    for arc in coords.windows(3).step_by(2) {
        append_arc(&mut out, arc[0], arc[1], arc[2]);
    }
    Ok(out)
}

/// Append the points of the arc p0 -> p1 -> p2, excluding p0.
fn append_arc(out: &mut Vec<Coord>, p0: Coord, p1: Coord, p2: Coord) {
    let Some((cx, cy, radius)) = arc_circle(p0, p1, p2) else {
        // Collinear control points: the arc is a straight line through p1.
        out.push(p1);
        out.push(p2);
        return;
    };

    let a0 = (p0.y - cy).atan2(p0.x - cx);
    let a2 = (p2.y - cy).atan2(p2.x - cx);

    let sweep = if p0.x == p2.x && p0.y == p2.y {
        // Full circle: orientation is taken as counter-clockwise.
        TAU
    } else {
        let cross = (p1.x - p0.x) * (p2.y - p0.y) - (p1.y - p0.y) * (p2.x - p0.x);
        if cross > 0.0 {
            positive_angle(a2 - a0)
        } else {
            -positive_angle(a0 - a2)
        }
    };

    let segments = (sweep.abs() / MAX_SEGMENT_ANGLE - 1e-9).ceil().max(1.0) as usize;
    for step in 1..segments {
        let t = step as f64 / segments as f64;
        let angle = a0 + sweep * t;
        let z = match (p0.z, p2.z) {
            (Some(z0), Some(z2)) => Some(z0 + (z2 - z0) * t),
            _ => None,
        };
        out.push(Coord {
            x: cx + radius * angle.cos(),
            y: cy + radius * angle.sin(),
            z,
        });
    }
    out.push(p2);
}

/// Normalize an angle into (0, 2π].
fn positive_angle(angle: f64) -> f64 {
    let a = angle.rem_euclid(TAU);
    if a == 0.0 { TAU } else { a }
}

/// Center and radius of the circle through three points, or `None` when the
/// points are collinear.
fn arc_circle(p0: Coord, p1: Coord, p2: Coord) -> Option<(f64, f64, f64)> {
    if p0.x == p2.x && p0.y == p2.y {
        // p1 is diametrically opposite p0.
        let cx = (p0.x + p1.x) / 2.0;
        let cy = (p0.y + p1.y) / 2.0;
        let radius = ((p1.x - p0.x).hypot(p1.y - p0.y)) / 2.0;
        return (radius > 0.0).then_some((cx, cy, radius));
    }

    let d = 2.0 * (p0.x * (p1.y - p2.y) + p1.x * (p2.y - p0.y) + p2.x * (p0.y - p1.y));
    let scale = [p0.x, p0.y, p1.x, p1.y, p2.x, p2.y]
        .iter()
        .fold(1.0f64, |acc, v| acc.max(v.abs()));
    if d.abs() <= 1e-12 * scale * scale {
        return None;
    }

    let s0 = p0.x * p0.x + p0.y * p0.y;
    let s1 = p1.x * p1.x + p1.y * p1.y;
    let s2 = p2.x * p2.x + p2.y * p2.y;
    let cx = (s0 * (p1.y - p2.y) + s1 * (p2.y - p0.y) + s2 * (p0.y - p1.y)) / d;
    let cy = (s0 * (p2.x - p1.x) + s1 * (p0.x - p2.x) + s2 * (p1.x - p0.x)) / d;
    let radius = (p0.x - cx).hypot(p0.y - cy);
    Some((cx, cy, radius))
}
